// Causal FIR convolution over 16-bit PCM blocks.
// Samples are normalized to [-1, 1] by 32767, convolved in f64 and scaled back.
// Callers prepend the filter history to the block, so output index n only ever
// looks back into the same buffer and block edges stay continuous.

use crate::impulse::ImpulseResponse;

const FULL_SCALE: f64 = 0x7fff as f64;
const SAMPLE_MIN: f64 = i16::MIN as f64;
const SAMPLE_MAX: f64 = i16::MAX as f64;

/// What to do with a rescaled result that does not fit in an i16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Keep the low 16 bits, wrapping around.
    #[default]
    Wrap,
    /// Saturate to `i16::MIN..=i16::MAX`.
    Clamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    /// Samples whose rounded, rescaled value fell outside the i16 range.
    pub overflowed_samples: usize,
}

impl FilterReport {
    pub fn overflowed(&self) -> bool {
        self.overflowed_samples > 0
    }
}

pub struct FirConvolve<'a> {
    taps: &'a [f64],
    policy: OverflowPolicy,
}

impl<'a> FirConvolve<'a> {
    pub fn new(response: &'a ImpulseResponse, policy: OverflowPolicy) -> Self {
        Self {
            taps: response.taps(),
            policy,
        }
    }

    /// Convolve `x` into `y` (same length; extra output slots are left alone).
    pub fn process(&self, x: &[i16], y: &mut [i16]) -> FilterReport {
        let mut report = FilterReport::default();
        for (n, out) in y.iter_mut().enumerate().take(x.len()) {
            let scaled = (self.convolve_at(x, n) * FULL_SCALE).round();
            if (SAMPLE_MIN..=SAMPLE_MAX).contains(&scaled) {
                *out = scaled as i16;
                continue;
            }
            report.overflowed_samples += 1;
            *out = match self.policy {
                // f64 -> i32 saturates, i32 -> i16 keeps the low 16 bits
                OverflowPolicy::Wrap => scaled as i32 as i16,
                OverflowPolicy::Clamp => scaled.clamp(SAMPLE_MIN, SAMPLE_MAX) as i16,
            };
        }
        report
    }

    #[inline]
    fn convolve_at(&self, x: &[i16], n: usize) -> f64 {
        // k runs up to min(n, N-1): no samples before the start of x
        self.taps
            .iter()
            .take(n + 1)
            .enumerate()
            .map(|(k, &h)| h * (x[n - k] as f64 / FULL_SCALE))
            .sum()
    }
}
