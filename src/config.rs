use std::path::PathBuf;

use crate::fir_convolve::OverflowPolicy;
use crate::impulse::DEFAULT_TAPS;
use crate::model::{DeEssError, DeEssResult};

pub const DEFAULT_DELTA1_MS: u32 = 80;
pub const DEFAULT_DELTA2_MS: u32 = 200;
pub const DEFAULT_FUNDAMENTAL_HZ: u32 = 2000;
pub const DEFAULT_NOISE_FLOOR: u16 = 100;
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_MAX_BURSTS: usize = 100_000;
pub const DEFAULT_EQ1_FILE: &str = "/etc/eq1.cfg";
pub const DEFAULT_EQ2_FILE: &str = "/etc/eq2.cfg";

/// Consecutive short half-cycles needed before a burst is confirmed.
pub const QUALIFYING_HALF_CYCLES_THRESHOLD: u32 = 100;

/// Burst RMS thresholds are the whole-file RMS divided by this.
pub const THRESHOLD_DIVISOR: u32 = 8;

/// Tunables shared by every pass. Built once, then only borrowed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeEssConfig {
    /// Bursts up to this long (ms) are left alone.
    pub delta1_ms: u32,
    /// Bursts longer than this (ms) use the long-burst profile.
    pub delta2_ms: u32,
    /// Must be above every voice fundamental in the material.
    pub fundamental_hz: u32,
    pub noise_floor: u16,
    pub taps: usize,
    pub overflow: OverflowPolicy,
    pub max_bursts: usize,
    pub eq1: PathBuf,
    pub eq2: PathBuf,
}

impl Default for DeEssConfig {
    fn default() -> Self {
        Self {
            delta1_ms: DEFAULT_DELTA1_MS,
            delta2_ms: DEFAULT_DELTA2_MS,
            fundamental_hz: DEFAULT_FUNDAMENTAL_HZ,
            noise_floor: DEFAULT_NOISE_FLOOR,
            taps: DEFAULT_TAPS,
            overflow: OverflowPolicy::Wrap,
            max_bursts: DEFAULT_MAX_BURSTS,
            eq1: PathBuf::from(DEFAULT_EQ1_FILE),
            eq2: PathBuf::from(DEFAULT_EQ2_FILE),
        }
    }
}

impl DeEssConfig {
    pub fn validate(&self) -> DeEssResult<()> {
        if self.fundamental_hz == 0 {
            return Err(DeEssError::Usage(
                "Fundamental frequency must be greater than 0 Hz".into(),
            ));
        }
        if self.taps == 0 || self.taps % 2 == 0 {
            return Err(DeEssError::Usage(format!(
                "Number of filter taps must be odd, got {}",
                self.taps
            )));
        }
        if self.max_bursts == 0 {
            return Err(DeEssError::Usage("Burst capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Sample-count versions of the tunables for a file at `sample_rate`.
    pub fn for_rate(&self, sample_rate: u32) -> DeEssResult<RateParams> {
        if sample_rate == 0 {
            return Err(DeEssError::Message("Sample rate in header is 0".into()));
        }
        self.validate()?;
        let rate = sample_rate as u64;
        Ok(RateParams {
            sample_rate,
            half_cycle_limit: (sample_rate / self.fundamental_hz) / 2,
            delta1_samples: rate * self.delta1_ms as u64 / 1000,
            delta2_samples: rate * self.delta2_ms as u64 / 1000,
            noise_floor: self.noise_floor,
        })
    }
}

/// Tunables converted to sample counts for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateParams {
    pub sample_rate: u32,
    /// Longest half-cycle, in samples, still counted as fricative.
    pub half_cycle_limit: u32,
    pub delta1_samples: u64,
    pub delta2_samples: u64,
    pub noise_floor: u16,
}

impl RateParams {
    pub fn samples_to_ms(&self, samples: u64) -> u64 {
        samples * 1000 / self.sample_rate as u64
    }
}

/// RMS floors a burst must exceed to be filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub threshold1: u32,
    pub threshold2: u32,
}

impl Thresholds {
    pub fn from_file_rms(file_rms: u32) -> Self {
        Self {
            threshold1: file_rms / THRESHOLD_DIVISOR,
            threshold2: file_rms / THRESHOLD_DIVISOR,
        }
    }
}
