use std::io::{self, Write};

use colored::Colorize;
use log::{Level, LevelFilter, Metadata, Record};

/// Stderr logger used by the `deess` binary. Debug and trace lines carry the
/// emitting module.
#[derive(Clone)]
pub struct ColorLogger {
    max_level: LevelFilter,
}

impl ColorLogger {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        // fatal errors are reported through the logger, so quiet keeps them
        let max_level = if quiet {
            LevelFilter::Error
        } else if verbose {
            LevelFilter::Trace
        } else {
            LevelFilter::Info
        };
        Self { max_level }
    }

    pub fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    fn short_target(target: &str) -> &str {
        target.rsplit("::").next().unwrap_or(target)
    }
}

impl log::Log for ColorLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Error => eprintln!(
                "{} {}",
                "[ERROR]".red().bold(),
                format!("{}", record.args()).red().bold()
            ),
            Level::Warn => eprintln!(
                "{} {}",
                "[WARN]".yellow().bold(),
                format!("{}", record.args()).yellow()
            ),
            Level::Info => eprintln!(
                "[{}] {}",
                record.level().to_string().blue(),
                record.args()
            ),
            _ => eprintln!(
                "[{}] {}: {}",
                record.level().to_string().blue(),
                Self::short_target(record.target()).dimmed(),
                record.args()
            ),
        }
        self.flush();
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}
