use core::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitCode, Termination};

use log::error;

pub const EXIT_DETECT_OPEN: u8 = 1;
pub const EXIT_DETECT_HEADER: u8 = 2;
pub const EXIT_USAGE: u8 = 3;
pub const EXIT_PRINT_OPEN: u8 = 4;
pub const EXIT_PRINT_HEADER: u8 = 5;
pub const EXIT_OUTPUT_CREATE: u8 = 7;
pub const EXIT_TRUNCATED: u8 = 8;
pub const EXIT_ATTENUATE_OPEN: u8 = 9;
pub const EXIT_ATTENUATE_HEADER: u8 = 10;
pub const EXIT_CAPACITY: u8 = 11;
pub const EXIT_ATTENUATE_RATE: u8 = 12;
pub const EXIT_DETECT_RATE: u8 = 13;
pub const EXIT_PROFILE_OPEN: u8 = 14;
pub const EXIT_PROFILE: u8 = 15;
pub const EXIT_IO: u8 = 16;
pub const EXIT_OTHER: u8 = 17;

/// The pass an input file was opened for. Input failures exit with a
/// different code for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Print,
    Detect,
    Attenuate,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Print => write!(f, "print"),
            Mode::Detect => write!(f, "detect"),
            Mode::Attenuate => write!(f, "attenuate"),
        }
    }
}

#[derive(Debug)]
pub enum DeEssError {
    /// Input wave file could not be opened.
    InputOpen(Mode, PathBuf, io::Error),
    /// Input too short for the 44 byte header.
    Header(Mode, PathBuf, io::Error),
    /// Sample rate field at byte 24 is zero.
    SampleRate(Mode, PathBuf),
    OutputCreate(PathBuf, io::Error),
    ProfileOpen(PathBuf, io::Error),
    /// Malformed or short frequency response profile.
    Profile(String),
    /// The input ran out before every burst sample could be read.
    Truncated { expected: u64, written: u64 },
    /// Burst list reached its capacity.
    Capacity(usize),
    Usage(String),
    Io(io::Error),
    Message(String),
}

impl DeEssError {
    pub fn exit_code(&self) -> u8 {
        match self {
            DeEssError::InputOpen(mode, ..) => match mode {
                Mode::Print => EXIT_PRINT_OPEN,
                Mode::Detect => EXIT_DETECT_OPEN,
                Mode::Attenuate => EXIT_ATTENUATE_OPEN,
            },
            DeEssError::Header(mode, ..) => match mode {
                Mode::Print => EXIT_PRINT_HEADER,
                Mode::Detect => EXIT_DETECT_HEADER,
                Mode::Attenuate => EXIT_ATTENUATE_HEADER,
            },
            // print mode never looks at the rate
            DeEssError::SampleRate(mode, _) => match mode {
                Mode::Print => EXIT_PRINT_HEADER,
                Mode::Detect => EXIT_DETECT_RATE,
                Mode::Attenuate => EXIT_ATTENUATE_RATE,
            },
            DeEssError::OutputCreate(..) => EXIT_OUTPUT_CREATE,
            DeEssError::ProfileOpen(..) => EXIT_PROFILE_OPEN,
            DeEssError::Profile(_) => EXIT_PROFILE,
            DeEssError::Truncated { .. } => EXIT_TRUNCATED,
            DeEssError::Capacity(_) => EXIT_CAPACITY,
            DeEssError::Usage(_) => EXIT_USAGE,
            DeEssError::Io(_) => EXIT_IO,
            DeEssError::Message(_) => EXIT_OTHER,
        }
    }
}

impl fmt::Display for DeEssError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeEssError::InputOpen(mode, path, e) => write!(
                f,
                "Cannot open file named {} for {}: {}",
                path.display(),
                mode,
                e
            ),
            DeEssError::Header(mode, path, e) => write!(
                f,
                "Could not read the 44 byte header of {} for {}: {}",
                path.display(),
                mode,
                e
            ),
            DeEssError::SampleRate(mode, path) => write!(
                f,
                "Sample rate in the header of {} is 0, cannot {}",
                path.display(),
                mode
            ),
            DeEssError::OutputCreate(path, e) => {
                write!(f, "Cannot create output file {}: {}", path.display(), e)
            }
            DeEssError::ProfileOpen(path, e) => {
                write!(f, "Could not open config file {}: {}", path.display(), e)
            }
            DeEssError::Profile(msg) => write!(f, "{}", msg),
            DeEssError::Truncated { expected, written } => write!(
                f,
                "Unexpected end of input: wrote {} of {} samples",
                written, expected
            ),
            DeEssError::Capacity(max) => {
                write!(f, "Exceeded max burst list size ({})", max)
            }
            DeEssError::Usage(msg) => write!(f, "{}", msg),
            DeEssError::Io(e) => write!(f, "I/O error: {}", e),
            DeEssError::Message(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DeEssError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeEssError::InputOpen(_, _, e)
            | DeEssError::Header(_, _, e)
            | DeEssError::OutputCreate(_, e)
            | DeEssError::ProfileOpen(_, e)
            | DeEssError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DeEssError {
    fn from(err: io::Error) -> Self {
        DeEssError::Io(err)
    }
}

pub type DeEssResult<T> = Result<T, DeEssError>;

pub struct TermResult(pub DeEssResult<()>);

impl Termination for TermResult {
    fn report(self) -> ExitCode {
        match self.0 {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{}", err);
                ExitCode::from(err.exit_code())
            }
        }
    }
}
