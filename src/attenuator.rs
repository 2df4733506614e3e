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

use std::io::{Read, Write};

use log::{debug, warn};

use crate::config::{RateParams, Thresholds};
use crate::detector::Burst;
use crate::fir_convolve::{FirConvolve, OverflowPolicy};
use crate::impulse::{ImpulseResponse, Profiles};
use crate::model::{DeEssError, DeEssResult};
use crate::pcm::{SampleReader, SampleWriter};

// Samples copied per read while passing audio through untouched
const COPY_BLOCK: usize = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstClass {
    /// Up to delta1 samples.
    Short,
    /// Over delta1, up to delta2 samples.
    Medium,
    Long,
}

impl BurstClass {
    pub fn of(len: u64, params: &RateParams) -> Self {
        if len <= params.delta1_samples {
            BurstClass::Short
        } else if len <= params.delta2_samples {
            BurstClass::Medium
        } else {
            BurstClass::Long
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    PassThrough,
    /// Filtered with the delta1 profile.
    ShortProfile,
    /// Filtered with the delta2 profile.
    LongProfile,
}

pub fn treatment_for(burst: &Burst, params: &RateParams, thresholds: &Thresholds) -> Treatment {
    match BurstClass::of(burst.len(), params) {
        BurstClass::Short => Treatment::PassThrough,
        BurstClass::Medium if burst.rms > thresholds.threshold1 => Treatment::ShortProfile,
        BurstClass::Long if burst.rms > thresholds.threshold2 => Treatment::LongProfile,
        _ => Treatment::PassThrough,
    }
}

/// Position of the attenuation pass, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub position: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttenuationReport {
    pub bursts: usize,
    pub short_profile: usize,
    pub long_profile: usize,
    pub passed_through: usize,
    pub samples_written: u64,
    pub overflowed_samples: usize,
    /// Gated RMS of the whole input, set by the caller.
    pub file_rms: u32,
}

/// The last `len` input samples seen, oldest first. Starts as silence.
struct FilterHistory {
    samples: Vec<i16>,
}

impl FilterHistory {
    fn new(len: usize) -> Self {
        Self {
            samples: vec![0; len],
        }
    }

    fn absorb(&mut self, input: &[i16]) {
        let len = self.samples.len();
        if input.len() >= len {
            self.samples.copy_from_slice(&input[input.len() - len..]);
        } else {
            self.samples.rotate_left(input.len());
            self.samples[len - input.len()..].copy_from_slice(input);
        }
    }

    fn as_slice(&self) -> &[i16] {
        &self.samples
    }
}

/// Second pass: replays a burst list over the input samples.
pub struct Attenuator<'a> {
    params: RateParams,
    thresholds: Thresholds,
    profiles: &'a Profiles,
    policy: OverflowPolicy,
}

impl<'a> Attenuator<'a> {
    pub fn new(
        params: RateParams,
        thresholds: Thresholds,
        profiles: &'a Profiles,
        policy: OverflowPolicy,
    ) -> Self {
        Self {
            params,
            thresholds,
            profiles,
            policy,
        }
    }

    /// Copy `reader` to `writer`, filtering the bursts that qualify.
    ///
    /// `bursts` must be ordered and non-overlapping, as produced by the
    /// detector over the same samples. `total` only feeds `progress`.
    pub fn run<R, W, F>(
        &self,
        bursts: &[Burst],
        reader: &mut SampleReader<R>,
        writer: &mut SampleWriter<W>,
        total: u64,
        mut progress: F,
    ) -> DeEssResult<AttenuationReport>
    where
        R: Read,
        W: Write,
        F: FnMut(ProgressUpdate),
    {
        let mut history = FilterHistory::new(self.profiles.history_len());
        let mut report = AttenuationReport::default();
        let mut position = 0u64;

        for burst in bursts {
            let gap = burst.start.saturating_sub(position);
            if gap > 0 {
                self.copy_through(gap, reader, writer, &mut history)?;
                position += gap;
            }

            let treatment = treatment_for(burst, &self.params, &self.thresholds);
            debug!(
                "Burst {}..{} ({} ms, RMS {}): {:?}",
                burst.start,
                burst.end,
                self.params.samples_to_ms(burst.len()),
                burst.rms,
                treatment
            );
            let response = match treatment {
                Treatment::PassThrough => {
                    report.passed_through += 1;
                    None
                }
                Treatment::ShortProfile => {
                    report.short_profile += 1;
                    Some(&self.profiles.short)
                }
                Treatment::LongProfile => {
                    report.long_profile += 1;
                    Some(&self.profiles.long)
                }
            };
            report.overflowed_samples +=
                self.process_burst(burst.len(), response, reader, writer, &mut history)?;
            report.bursts += 1;
            position += burst.len();
            progress(ProgressUpdate { position, total });
        }

        // Trailing audio after the last burst
        let mut buf = vec![0i16; COPY_BLOCK];
        loop {
            let n = reader.read_into(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_samples(&buf[..n])?;
            position += n as u64;
            progress(ProgressUpdate { position, total });
        }
        writer.flush()?;

        report.samples_written = writer.samples_written();
        Ok(report)
    }

    fn copy_through<R: Read, W: Write>(
        &self,
        count: u64,
        reader: &mut SampleReader<R>,
        writer: &mut SampleWriter<W>,
        history: &mut FilterHistory,
    ) -> DeEssResult<()> {
        let mut buf = vec![0i16; COPY_BLOCK.min(count as usize)];
        let mut remaining = count;
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            let n = reader.read_into(&mut buf[..want])?;
            history.absorb(&buf[..n]);
            writer.write_samples(&buf[..n])?;
            if n < want {
                return Err(Self::truncated(writer, remaining - n as u64));
            }
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Pass one burst through, filtered with `response` if given. Returns the
    /// number of overflowed samples.
    fn process_burst<R: Read, W: Write>(
        &self,
        len: u64,
        response: Option<&ImpulseResponse>,
        reader: &mut SampleReader<R>,
        writer: &mut SampleWriter<W>,
        history: &mut FilterHistory,
    ) -> DeEssResult<usize> {
        let prefix = history.as_slice().len();
        let len = len as usize;
        let mut buf = Vec::with_capacity(prefix + len);
        buf.extend_from_slice(history.as_slice());
        buf.resize(prefix + len, 0);

        let n = reader.read_into(&mut buf[prefix..])?;
        if n < len {
            writer.write_samples(&buf[prefix..prefix + n])?;
            return Err(Self::truncated(writer, (len - n) as u64));
        }
        history.absorb(&buf[prefix..]);

        let Some(response) = response else {
            writer.write_samples(&buf[prefix..])?;
            return Ok(0);
        };

        let mut out = vec![0i16; buf.len()];
        let filtered = FirConvolve::new(response, self.policy).process(&buf, &mut out);
        if filtered.overflowed() {
            warn!(
                "Convolution overflow on {} samples ({})",
                filtered.overflowed_samples,
                match self.policy {
                    OverflowPolicy::Wrap => "wrapped",
                    OverflowPolicy::Clamp => "clamped",
                }
            );
        }
        writer.write_samples(&out[prefix..])?;
        Ok(filtered.overflowed_samples)
    }

    fn truncated<W: Write>(writer: &mut SampleWriter<W>, missing: u64) -> DeEssError {
        if let Err(e) = writer.flush() {
            return DeEssError::Io(e);
        }
        let written = writer.samples_written();
        DeEssError::Truncated {
            expected: written + missing,
            written,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeEssConfig;
    use crate::detector::signals::*;
    use crate::pcm::wav::{sample_bytes, samples_of};
    use std::io::Cursor;

    fn params() -> RateParams {
        DeEssConfig::default().for_rate(44100).unwrap()
    }

    fn delayed(taps: usize, delay: usize) -> ImpulseResponse {
        let mut h = vec![0.0; taps];
        h[delay] = 1.0;
        ImpulseResponse::from_taps(h).unwrap()
    }

    fn run(
        samples: &[i16],
        bursts: &[Burst],
        profiles: &Profiles,
        thresholds: Thresholds,
    ) -> DeEssResult<(AttenuationReport, Vec<i16>)> {
        let mut reader = SampleReader::new(Cursor::new(sample_bytes(samples)));
        let mut out = Vec::new();
        let mut writer = SampleWriter::new(&mut out);
        let att = Attenuator::new(params(), thresholds, profiles, OverflowPolicy::Wrap);
        let report = att.run(bursts, &mut reader, &mut writer, samples.len() as u64, |_| {})?;
        Ok((report, samples_of(&out)))
    }

    fn low_thresholds() -> Thresholds {
        Thresholds {
            threshold1: 10,
            threshold2: 10,
        }
    }

    #[test]
    fn classification_boundaries() {
        let p = params();
        assert_eq!(BurstClass::of(0, &p), BurstClass::Short);
        assert_eq!(BurstClass::of(3528, &p), BurstClass::Short);
        assert_eq!(BurstClass::of(3529, &p), BurstClass::Medium);
        assert_eq!(BurstClass::of(8820, &p), BurstClass::Medium);
        assert_eq!(BurstClass::of(8821, &p), BurstClass::Long);
    }

    #[test]
    fn treatment_needs_rms_above_threshold() {
        let p = params();
        let t = Thresholds {
            threshold1: 500,
            threshold2: 700,
        };
        let medium = |rms| Burst { start: 0, end: 4000, rms };
        let long = |rms| Burst { start: 0, end: 9000, rms };
        assert_eq!(treatment_for(&medium(500), &p, &t), Treatment::PassThrough);
        assert_eq!(treatment_for(&medium(501), &p, &t), Treatment::ShortProfile);
        assert_eq!(treatment_for(&long(700), &p, &t), Treatment::PassThrough);
        assert_eq!(treatment_for(&long(701), &p, &t), Treatment::LongProfile);
        let short = Burst { start: 0, end: 100, rms: u32::MAX };
        assert_eq!(treatment_for(&short, &p, &t), Treatment::PassThrough);
    }

    #[test]
    fn history_keeps_latest_samples() {
        let mut h = FilterHistory::new(4);
        h.absorb(&[1, 2]);
        assert_eq!(h.as_slice(), &[0, 0, 1, 2]);
        h.absorb(&[3]);
        assert_eq!(h.as_slice(), &[0, 1, 2, 3]);
        h.absorb(&[4, 5, 6, 7, 8, 9]);
        assert_eq!(h.as_slice(), &[6, 7, 8, 9]);
        h.absorb(&[]);
        assert_eq!(h.as_slice(), &[6, 7, 8, 9]);
    }

    #[test]
    fn unfiltered_bursts_pass_unchanged() {
        let signal = concat(&[dither(300), hiss(1000), dither(300)]);
        let profiles = Profiles {
            short: delayed(81, 3),
            long: delayed(81, 3),
        };
        let bursts = [
            Burst { start: 300, end: 400, rms: 1000 },
            Burst { start: 500, end: 4500, rms: 5 },
            Burst { start: 4500, end: 4600, rms: 0 },
        ];
        let (report, out) = run(&signal, &bursts, &profiles, low_thresholds()).unwrap();
        assert_eq!(out, signal);
        assert_eq!(report.passed_through, 3);
        assert_eq!(report.short_profile + report.long_profile, 0);
        assert_eq!(report.samples_written, signal.len() as u64);
    }

    #[test]
    fn filtered_burst_uses_history_from_preceding_audio() {
        let signal: Vec<i16> = (0..20_000).map(|i| (i % 2000) as i16 - 1000).collect();
        let profiles = Profiles {
            short: delayed(81, 5),
            long: delayed(81, 9),
        };
        let medium = Burst { start: 1000, end: 5000, rms: 900 };
        let long = Burst { start: 5000, end: 15_000, rms: 900 };
        let (report, out) = run(&signal, &[medium, long], &profiles, low_thresholds()).unwrap();
        assert_eq!(report.short_profile, 1);
        assert_eq!(report.long_profile, 1);
        assert_eq!(out.len(), signal.len());
        assert_eq!(&out[..1000], &signal[..1000]);
        // a pure delay shows the carried-over input on both sides of each splice
        for n in 1000..5000 {
            assert_eq!(out[n], signal[n - 5], "sample {}", n);
        }
        for n in 5000..15_000 {
            assert_eq!(out[n], signal[n - 9], "sample {}", n);
        }
        assert_eq!(&out[15_000..], &signal[15_000..]);
    }

    #[test]
    fn history_starts_as_silence() {
        let signal = vec![100i16; 5000];
        let profiles = Profiles {
            short: delayed(81, 2),
            long: delayed(81, 2),
        };
        let bursts = [Burst { start: 0, end: 4000, rms: 100 }];
        let (_, out) = run(&signal, &bursts, &profiles, low_thresholds()).unwrap();
        assert_eq!(&out[..2], &[0, 0]);
        assert!(out[2..].iter().all(|&s| s == 100));
    }

    #[test]
    fn unit_profiles_reproduce_input() {
        let signal = concat(&[dither(300), hiss(5000), dither(300)]);
        let profiles = Profiles::identity(81).unwrap();
        let bursts = [
            Burst { start: 300, end: 4000, rms: 1000 },
            Burst { start: 4000, end: 20_000, rms: 1000 },
        ];
        let (report, out) = run(&signal, &bursts, &profiles, low_thresholds()).unwrap();
        assert_eq!(report.short_profile, 1);
        assert_eq!(report.long_profile, 1);
        assert_eq!(out, signal);
    }

    #[test]
    fn no_bursts_copies_everything() {
        let signal = hiss(10_000);
        let profiles = Profiles::identity(81).unwrap();
        let (report, out) = run(&signal, &[], &profiles, low_thresholds()).unwrap();
        assert_eq!(report.bursts, 0);
        assert_eq!(out, signal);
    }

    #[test]
    fn short_input_flushes_and_fails() {
        let signal = vec![7i16; 3000];
        let profiles = Profiles::identity(81).unwrap();
        let bursts = [Burst { start: 1000, end: 5000, rms: 500 }];
        let mut reader = SampleReader::new(Cursor::new(sample_bytes(&signal)));
        let mut out = Vec::new();
        let mut writer = SampleWriter::new(&mut out);
        let att = Attenuator::new(params(), low_thresholds(), &profiles, OverflowPolicy::Wrap);
        let err = att
            .run(&bursts, &mut reader, &mut writer, 3000, |_| {})
            .unwrap_err();
        match err {
            DeEssError::Truncated { expected, written } => {
                assert_eq!(written, 3000);
                assert_eq!(expected, 5000);
            }
            other => panic!("unexpected error {}", other),
        }
        assert_eq!(out.len(), 6000);
    }

    #[test]
    fn progress_reaches_total() {
        let signal = concat(&[dither(300), hiss(1000), dither(20_000)]);
        let profiles = Profiles::identity(81).unwrap();
        let mut reader = SampleReader::new(Cursor::new(sample_bytes(&signal)));
        let mut writer = SampleWriter::new(Vec::new());
        let att = Attenuator::new(params(), low_thresholds(), &profiles, OverflowPolicy::Wrap);
        let mut last = None;
        let bursts = [Burst { start: 300, end: 4300, rms: 1000 }];
        att.run(&bursts, &mut reader, &mut writer, signal.len() as u64, |p| {
            last = Some(p)
        })
        .unwrap();
        let last = last.unwrap();
        assert_eq!(last.position, signal.len() as u64);
        assert_eq!(last.total, signal.len() as u64);
    }
}
