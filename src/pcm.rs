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

//! Canonical 44 byte WAV header and little-endian 16-bit sample streams.
//!
//! The header is never interpreted beyond the sample rate; it is copied to
//! the output verbatim. Everything from byte 44 on is treated as mono `i16`
//! samples.

use std::io::{self, ErrorKind, Read, Write};

use log::warn;

pub const HEADER_LEN: usize = 44;
pub const SAMPLE_RATE_OFFSET: usize = 24;
pub const BYTES_PER_SAMPLE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    bytes: [u8; HEADER_LEN],
}

impl WavHeader {
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; HEADER_LEN];
        reader.read_exact(&mut bytes)?;
        Ok(Self { bytes })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.bytes)
    }

    /// Little-endian u32 at byte 24.
    pub fn sample_rate(&self) -> u32 {
        let mut rate = [0u8; 4];
        rate.copy_from_slice(&self.bytes[SAMPLE_RATE_OFFSET..SAMPLE_RATE_OFFSET + 4]);
        u32::from_le_bytes(rate)
    }
}

/// Number of whole samples after the header in a stream of `total_bytes`.
pub fn samples_in(total_bytes: u64) -> u64 {
    total_bytes.saturating_sub(HEADER_LEN as u64) / BYTES_PER_SAMPLE as u64
}

pub struct SampleReader<R> {
    inner: R,
    samples_read: u64,
}

impl<R: Read> SampleReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            samples_read: 0,
        }
    }

    /// Next sample, or `None` at end of input. A dangling odd byte is dropped.
    pub fn next_sample(&mut self) -> io::Result<Option<i16>> {
        let mut buf = [0u8; BYTES_PER_SAMPLE];
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        match filled {
            0 => Ok(None),
            1 => {
                warn!(
                    "Ignoring odd trailing byte after sample {}",
                    self.samples_read
                );
                Ok(None)
            }
            _ => {
                self.samples_read += 1;
                Ok(Some(i16::from_le_bytes(buf)))
            }
        }
    }

    /// Fill `out` from the stream. Returns how many samples were read, which
    /// is less than `out.len()` only at end of input.
    pub fn read_into(&mut self, out: &mut [i16]) -> io::Result<usize> {
        for (i, slot) in out.iter_mut().enumerate() {
            match self.next_sample()? {
                Some(s) => *slot = s,
                None => return Ok(i),
            }
        }
        Ok(out.len())
    }

    pub fn samples_read(&self) -> u64 {
        self.samples_read
    }
}

impl<R: Read> Iterator for SampleReader<R> {
    type Item = io::Result<i16>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_sample().transpose()
    }
}

pub struct SampleWriter<W> {
    inner: W,
    scratch: Vec<u8>,
    samples_written: u64,
}

impl<W: Write> SampleWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            scratch: Vec::new(),
            samples_written: 0,
        }
    }

    pub fn write_samples(&mut self, samples: &[i16]) -> io::Result<()> {
        self.scratch.clear();
        self.scratch.reserve(samples.len() * BYTES_PER_SAMPLE);
        for s in samples {
            self.scratch.extend_from_slice(&s.to_le_bytes());
        }
        self.inner.write_all(&self.scratch)?;
        self.samples_written += samples.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }
}
