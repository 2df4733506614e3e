//! Sliding absolute-mean envelope and noise-gated RMS.

use std::io::{self, Read};

use crate::isqrt::isqrt;
use crate::pcm::SampleReader;

pub const WINDOW_LEN: usize = 16;
const WINDOW_SHIFT: u32 = 4;

/// Mean of the absolute value of the last 16 samples, updated per sample.
#[derive(Debug, Clone)]
pub struct SlidingAbsMean {
    window: [u32; WINDOW_LEN],
    pos: usize,
    sum: u32,
}

impl Default for SlidingAbsMean {
    fn default() -> Self {
        Self::new()
    }
}

impl SlidingAbsMean {
    pub fn new() -> Self {
        Self {
            window: [0; WINDOW_LEN],
            pos: 0,
            sum: 0,
        }
    }

    /// Push one sample and return the updated mean.
    #[inline]
    pub fn push(&mut self, sample: i16) -> u32 {
        let abs = sample.unsigned_abs() as u32;
        self.sum = self.sum + abs - self.window[self.pos];
        self.window[self.pos] = abs;
        self.pos = (self.pos + 1) % WINDOW_LEN;
        self.mean()
    }

    #[inline]
    pub fn mean(&self) -> u32 {
        self.sum >> WINDOW_SHIFT
    }
}

/// Running sum of squares and sample count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnergyAccumulator {
    sum_of_squares: u64,
    count: u64,
}

impl EnergyAccumulator {
    #[inline]
    pub fn add(&mut self, sample: i16) {
        let s = sample as i64;
        self.sum_of_squares += (s * s) as u64;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum_of_squares(&self) -> u64 {
        self.sum_of_squares
    }

    /// `isqrt(sum / count)`, or 0 when nothing was accumulated.
    pub fn rms(&self) -> u32 {
        if self.count == 0 {
            return 0;
        }
        isqrt(self.sum_of_squares / self.count) as u32
    }
}

/// RMS over the samples whose sliding mean is at or above the noise floor.
#[derive(Debug, Clone)]
pub struct GatedRms {
    envelope: SlidingAbsMean,
    energy: EnergyAccumulator,
    noise_floor: u32,
}

impl GatedRms {
    pub fn new(noise_floor: u16) -> Self {
        Self {
            envelope: SlidingAbsMean::new(),
            energy: EnergyAccumulator::default(),
            noise_floor: noise_floor as u32,
        }
    }

    #[inline]
    pub fn push(&mut self, sample: i16) {
        if self.envelope.push(sample) >= self.noise_floor {
            self.energy.add(sample);
        }
    }

    pub fn energy(&self) -> &EnergyAccumulator {
        &self.energy
    }

    pub fn rms(&self) -> u32 {
        self.energy.rms()
    }
}

/// Whole-stream gated RMS, consuming `reader` to the end.
pub fn file_rms<R: Read>(reader: &mut SampleReader<R>, noise_floor: u16) -> io::Result<u32> {
    let mut gated = GatedRms::new(noise_floor);
    while let Some(sample) = reader.next_sample()? {
        gated.push(sample);
    }
    Ok(gated.rms())
}
