/*
 Copyright (c) 2023 clone206

 This file is part of deess

 deess is free software: you can redistribute it and/or modify it
 under the terms of the GNU General Public License as published by the
 Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 deess is distributed in the hope that it will be useful, but
 WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU General Public License for more details.
 You should have received a copy of the GNU General Public License
 along with deess. If not, see <https://www.gnu.org/licenses/>.
*/

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use colored::Colorize;
use deess::config::{
    DEFAULT_DELTA1_MS, DEFAULT_DELTA2_MS, DEFAULT_EQ1_FILE, DEFAULT_EQ2_FILE,
    DEFAULT_FUNDAMENTAL_HZ, DEFAULT_NOISE_FLOOR,
};
use deess::{
    ColorLogger, DeEssConfig, DeEssContext, DeEssError, DeEssResult, OverflowPolicy, Profiles,
    TermResult, write_detection_report,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::{info, trace, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "deess", version, about)]
struct Cli {
    /// Detect ess bursts in FILE and print one line per burst
    #[arg(short = 'd', long = "detect", value_name = "FILE")]
    detect: Option<PathBuf>,

    /// Attenuate ess bursts in FILE and write the result to the
    /// output file
    #[arg(short = 'a', long = "attenuate", value_name = "FILE")]
    attenuate: Option<PathBuf>,

    /// Output file for attenuation
    #[arg(short = 'o', long = "output", default_value = "out.wav")]
    output: PathBuf,

    /// Print every sample of FILE as "index: value"
    #[arg(short = 'p', long = "print", value_name = "FILE")]
    print: Option<PathBuf>,

    /// Bursts up to this many milliseconds are left untouched
    #[arg(short = 't', long = "time", default_value_t = DEFAULT_DELTA1_MS)]
    delta1_ms: u32,

    /// Bursts longer than this many milliseconds use the second
    /// equalizer profile
    #[arg(short = 'T', long = "long-time", default_value_t = DEFAULT_DELTA2_MS)]
    delta2_ms: u32,

    /// Frequency in Hz above every voice fundamental in the material.
    /// Half-cycles longer than half its period end a burst.
    #[arg(short = 'f', long = "fundamental", default_value_t = DEFAULT_FUNDAMENTAL_HZ)]
    fundamental_hz: u32,

    /// Sliding mean below which audio counts as silence
    #[arg(short = 'n', long = "noise-floor", default_value_t = DEFAULT_NOISE_FLOOR)]
    noise_floor: u16,

    /// Magnitude profile for bursts longer than --time
    #[arg(long = "eq1", default_value = DEFAULT_EQ1_FILE)]
    eq1: PathBuf,

    /// Magnitude profile for bursts longer than --long-time
    #[arg(long = "eq2", default_value = DEFAULT_EQ2_FILE)]
    eq2: PathBuf,

    /// Saturate filtered samples instead of letting them wrap
    #[arg(long = "clamp")]
    clamp: bool,

    /// Print diagnostic messages
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Quiet mode: suppress all log output except errors
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

impl Cli {
    fn config(&self) -> DeEssConfig {
        DeEssConfig {
            delta1_ms: self.delta1_ms,
            delta2_ms: self.delta2_ms,
            fundamental_hz: self.fundamental_hz,
            noise_floor: self.noise_floor,
            overflow: if self.clamp {
                OverflowPolicy::Clamp
            } else {
                OverflowPolicy::Wrap
            },
            eq1: self.eq1.clone(),
            eq2: self.eq2.clone(),
            ..DeEssConfig::default()
        }
    }
}

fn main() -> TermResult {
    TermResult(run())
}

fn run() -> DeEssResult<()> {
    if std::env::args_os().len() <= 1 {
        Cli::command().print_help()?;
        return Ok(());
    }
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            return Ok(());
        }
        Err(e) => {
            e.print()?;
            return Err(DeEssError::Usage(e.kind().to_string()));
        }
    };

    let logger = ColorLogger::new(cli.quiet, cli.verbose);
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger)
        .try_init()
        .map_err(|e| DeEssError::Message(e.to_string()))?;

    let ctx = DeEssContext::new(cli.config())?;
    trace!("{:?}", ctx.config());

    if cli.print.is_none() && cli.detect.is_none() && cli.attenuate.is_none() {
        warn!("Nothing to do: pass one of --print, --detect or --attenuate");
    }

    if let Some(path) = &cli.print {
        let count = ctx.dump_file(path, io::stdout().lock())?;
        trace!("Printed {} samples", count);
    }

    if let Some(path) = &cli.detect {
        let report = ctx.detect_file(path)?;
        write_detection_report(io::stdout().lock(), &report)?;
    }

    if let Some(path) = &cli.attenuate {
        attenuate(&cli, &ctx, path, &multi)?;
    }

    Ok(())
}

fn attenuate(
    cli: &Cli,
    ctx: &DeEssContext,
    input: &Path,
    multi: &MultiProgress,
) -> DeEssResult<()> {
    let config = ctx.config();
    let profiles = Profiles::load(&config.eq1, &config.eq2, config.taps)?;
    let start = Instant::now();

    let style = ProgressStyle::with_template("{prefix} {bar:20.cyan/blue} {percent}{msg}")
        .map_err(|e| DeEssError::Message(e.to_string()))?;
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pg = if cli.quiet {
        ProgressBar::hidden()
    } else {
        multi
            .add(ProgressBar::new(0))
            .with_style(style)
            .with_prefix(format!("{} {}", "[Attenuating]".bold(), file_name.bold()))
            .with_message("%")
    };

    let result = ctx.attenuate_file(input, &cli.output, &profiles, |update| {
        pg.set_length(update.total);
        pg.set_position(update.position);
    });
    pg.finish_and_clear();
    let report = result?;

    info!(
        "Wrote {} samples to {} in {:.2}s: {} bursts, {} filtered short, {} filtered long, {} untouched (file RMS {})",
        report.samples_written,
        cli.output.display(),
        start.elapsed().as_secs_f64(),
        report.bursts,
        report.short_profile,
        report.long_profile,
        report.passed_through,
        report.file_rms
    );
    if report.overflowed_samples > 0 {
        warn!(
            "{} filtered samples exceeded the 16-bit range",
            report.overflowed_samples
        );
    }
    Ok(())
}
