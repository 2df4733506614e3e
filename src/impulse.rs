//! Frequency response profiles and the FIR impulse responses built from them.
//!
//! A profile is a list of magnitude samples `H[0..=alpha]` (one decimal value
//! per line in its config file) describing the positive half of a real,
//! symmetric frequency response. Summing the cosine series turns it into an
//! odd-length, linear-phase impulse response of `2 * alpha + 1` taps.

use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use crate::model::{DeEssError, DeEssResult};

/// Default number of filter taps. Must be odd.
pub const DEFAULT_TAPS: usize = 81;

/// Number of magnitude samples needed for a filter of `taps` taps.
pub const fn magnitudes_for(taps: usize) -> usize {
    (taps - 1) / 2 + 1
}

#[derive(Debug, Clone, PartialEq)]
pub struct MagnitudeProfile {
    magnitudes: Vec<f64>,
}

impl MagnitudeProfile {
    pub fn new(magnitudes: Vec<f64>) -> Self {
        Self { magnitudes }
    }

    /// Parse one magnitude per line, keeping the first `count` values.
    ///
    /// Blank lines are skipped and anything after the first `count` values is
    /// ignored. `source` only labels error messages.
    pub fn from_reader<R: BufRead>(reader: R, count: usize, source: &str) -> DeEssResult<Self> {
        let mut magnitudes = Vec::with_capacity(count);
        for (line_no, line) in reader.lines().enumerate() {
            if magnitudes.len() == count {
                break;
            }
            let line = line?;
            let value = line.trim();
            if value.is_empty() {
                continue;
            }
            let parsed = value.parse::<f64>().map_err(|e| {
                DeEssError::Profile(format!(
                    "{}:{}: invalid magnitude \"{}\": {}",
                    source,
                    line_no + 1,
                    value,
                    e
                ))
            })?;
            magnitudes.push(parsed);
        }

        if magnitudes.len() < count {
            return Err(DeEssError::Profile(format!(
                "Not enough frequency samples in {}: found {}, need {}",
                source,
                magnitudes.len(),
                count
            )));
        }
        Ok(Self { magnitudes })
    }

    pub fn load(path: &Path, count: usize) -> DeEssResult<Self> {
        let file = File::open(path).map_err(|e| DeEssError::ProfileOpen(path.to_path_buf(), e))?;
        let profile = Self::from_reader(BufReader::new(file), count, &path.display().to_string())?;
        debug!("Loaded {} magnitudes from {}", count, path.display());
        Ok(profile)
    }

    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    taps: Vec<f64>,
}

impl ImpulseResponse {
    /// Use `taps` as-is. Length must be odd.
    pub fn from_taps(taps: Vec<f64>) -> DeEssResult<Self> {
        if taps.len() % 2 == 0 {
            return Err(DeEssError::Profile(format!(
                "Impulse response must have an odd number of taps, got {}",
                taps.len()
            )));
        }
        Ok(Self { taps })
    }

    /// A single tap of 1.0 at `h[0]` followed by zeros: passes input through.
    pub fn unit(len: usize) -> DeEssResult<Self> {
        let mut taps = vec![0.0; len];
        if let Some(first) = taps.first_mut() {
            *first = 1.0;
        }
        Self::from_taps(taps)
    }

    /// Build a `len`-tap linear-phase response from `profile`.
    ///
    /// `h[n] = 1/N * sum_{k=1..alpha} (2 H[k] cos(2 pi k (n - alpha) / N) + H[0])`
    /// for `n <= alpha`, mirrored for the upper half. `H[0]` is accumulated
    /// once per harmonic, not once overall, which scales the DC term by
    /// `alpha`.
    pub fn synthesize(profile: &MagnitudeProfile, len: usize) -> DeEssResult<Self> {
        if len == 0 || len % 2 == 0 {
            return Err(DeEssError::Profile(format!(
                "Filter length must be odd and non-zero, got {}",
                len
            )));
        }
        let alpha = (len - 1) / 2;
        let h_mag = profile.magnitudes();
        if h_mag.len() < alpha + 1 {
            return Err(DeEssError::Profile(format!(
                "Not enough frequency samples: found {}, need {}",
                h_mag.len(),
                alpha + 1
            )));
        }

        let n_f = len as f64;
        let mut taps = vec![0.0; len];
        for n in 0..=alpha {
            let offset = n as f64 - alpha as f64;
            let mut sum = 0.0;
            for k in 1..=alpha {
                sum += 2.0 * h_mag[k] * (2.0 * PI * k as f64 * offset / n_f).cos() + h_mag[0];
            }
            taps[n] = sum / n_f;
        }
        for n in alpha..len {
            taps[n] = taps[len - 1 - n];
        }

        Ok(Self { taps })
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}

/// The two responses used by the attenuator: one for bursts longer than
/// delta1, one for bursts longer than delta2.
#[derive(Debug, Clone)]
pub struct Profiles {
    pub short: ImpulseResponse,
    pub long: ImpulseResponse,
}

impl Profiles {
    pub fn load(eq1: &Path, eq2: &Path, taps: usize) -> DeEssResult<Self> {
        let count = magnitudes_for(taps);
        let short = ImpulseResponse::synthesize(&MagnitudeProfile::load(eq1, count)?, taps)?;
        let long = ImpulseResponse::synthesize(&MagnitudeProfile::load(eq2, count)?, taps)?;
        Ok(Self { short, long })
    }

    /// Both profiles set to the unit impulse.
    pub fn identity(taps: usize) -> DeEssResult<Self> {
        Ok(Self {
            short: ImpulseResponse::unit(taps)?,
            long: ImpulseResponse::unit(taps)?,
        })
    }

    /// Length of the filter history both profiles need.
    pub fn history_len(&self) -> usize {
        self.short.len().max(self.long.len())
    }
}
