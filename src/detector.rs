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

//! Ess burst detection.
//!
//! The signal is walked one half-cycle at a time: a run of samples with the
//! same sign bit, closed by (and including) the first sample whose sign
//! differs. Sibilants show up as long runs of short, loud half-cycles; vowels
//! have half-cycles longer than half a period of the highest expected voice
//! fundamental, and silence keeps the sliding mean under the noise floor.

use std::io::{self, Read};

use log::trace;

use crate::config::{QUALIFYING_HALF_CYCLES_THRESHOLD, RateParams};
use crate::model::{DeEssError, DeEssResult};
use crate::pcm::SampleReader;
use crate::rms::{EnergyAccumulator, SlidingAbsMean};

/// A detected fricative region. `end - start` samples are treated as the
/// burst by the attenuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Burst {
    pub start: u64,
    pub end: u64,
    pub rms: u32,
}

impl Burst {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    Idle,
    /// Counting short half-cycles, not yet a burst.
    Qualifying,
    Detected { start: u64 },
}

/// Resumable burst scanner. Each [`next_burst`](Self::next_burst) call starts
/// from a clean envelope and energy sum; only the read position carries over.
pub struct EssDetector<R> {
    reader: SampleReader<R>,
    params: RateParams,
    position: u64,
}

impl<R: Read> EssDetector<R> {
    pub fn new(reader: SampleReader<R>, params: RateParams) -> Self {
        Self {
            reader,
            params,
            position: 0,
        }
    }

    /// Samples consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Scan forward to the end of the next burst.
    ///
    /// Returns `Ok(None)` once the input runs out, including when it runs out
    /// in the middle of a burst.
    pub fn next_burst(&mut self) -> io::Result<Option<Burst>> {
        let half_cycle_limit = self.params.half_cycle_limit as u64;
        let noise_floor = self.params.noise_floor as u32;

        let mut envelope = SlidingAbsMean::new();
        let mut energy = EnergyAccumulator::default();
        let mut qualifying_half_cycles = 0u32;
        let mut qualifying_samples = 0u64;
        let mut state = DetectorState::Idle;
        let mut sample: i16 = 0;

        loop {
            let mut half_len = 0u64;
            let mean = loop {
                let prev = sample;
                let Some(s) = self.reader.next_sample()? else {
                    if let DetectorState::Detected { start } = state {
                        trace!("Input ended inside burst starting at {}", start);
                    }
                    return Ok(None);
                };
                self.position += 1;
                sample = s;
                let mean = envelope.push(s);
                energy.add(s);
                half_len += 1;
                if (s < 0) != (prev < 0) {
                    break mean;
                }
            };
            let sample_no = self.position - 1;

            if mean < noise_floor || half_len > half_cycle_limit {
                if let DetectorState::Detected { start } = state {
                    let burst = Burst {
                        start,
                        end: sample_no.saturating_sub(half_len),
                        rms: energy.rms(),
                    };
                    trace!(
                        "Burst closed at {} by {} sample half-cycle (mean {})",
                        burst.end,
                        half_len,
                        mean
                    );
                    return Ok(Some(burst));
                }
                if state == DetectorState::Qualifying {
                    trace!(
                        "Dropped {} qualifying half-cycles at {}",
                        qualifying_half_cycles,
                        sample_no
                    );
                }
                state = DetectorState::Idle;
                energy = EnergyAccumulator::default();
                qualifying_half_cycles = 0;
                qualifying_samples = 0;
                continue;
            }

            qualifying_half_cycles += 1;
            qualifying_samples += half_len;

            state = match state {
                DetectorState::Detected { .. } => state,
                _ if qualifying_half_cycles > QUALIFYING_HALF_CYCLES_THRESHOLD => {
                    let start = sample_no.saturating_sub(qualifying_samples);
                    trace!("Burst confirmed at {}, backdated to {}", sample_no, start);
                    DetectorState::Detected { start }
                }
                _ => DetectorState::Qualifying,
            };
        }
    }
}

impl<R: Read> Iterator for EssDetector<R> {
    type Item = io::Result<Burst>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_burst().transpose()
    }
}

/// Run `detector` to the end of its input and collect every burst.
///
/// Fails with [`DeEssError::Capacity`] once `capacity` bursts are found.
pub fn detect_bursts<R: Read>(
    detector: &mut EssDetector<R>,
    capacity: usize,
) -> DeEssResult<Vec<Burst>> {
    let mut bursts = Vec::new();
    while let Some(burst) = detector.next_burst()? {
        bursts.push(burst);
        if bursts.len() >= capacity {
            return Err(DeEssError::Capacity(capacity));
        }
    }
    Ok(bursts)
}
