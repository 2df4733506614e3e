use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info};

use crate::attenuator::{AttenuationReport, Attenuator, ProgressUpdate};
use crate::config::{DeEssConfig, RateParams, Thresholds};
use crate::detector::{Burst, EssDetector, detect_bursts};
use crate::impulse::Profiles;
use crate::model::{DeEssError, DeEssResult, Mode};
use crate::pcm::{HEADER_LEN, SampleReader, SampleWriter, WavHeader, samples_in};
use crate::rms::file_rms;

#[derive(Debug)]
pub struct DetectionReport {
    pub header: WavHeader,
    pub params: RateParams,
    pub bursts: Vec<Burst>,
}

/// One line per burst: `start: S\tend: E\tMSms\tRMS: R`.
pub fn write_detection_report<W: Write>(mut out: W, report: &DetectionReport) -> DeEssResult<()> {
    for b in &report.bursts {
        writeln!(
            out,
            "start: {}\tend: {}\t{}ms\tRMS: {}",
            b.start,
            b.end,
            report.params.samples_to_ms(b.len()),
            b.rms
        )?;
    }
    out.flush()?;
    Ok(())
}

fn read_header<R: Read>(input: &mut R, name: &Path, mode: Mode) -> DeEssResult<WavHeader> {
    WavHeader::read_from(input).map_err(|e| DeEssError::Header(mode, name.to_path_buf(), e))
}

fn open_input(path: &Path, mode: Mode) -> DeEssResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| DeEssError::InputOpen(mode, path.to_path_buf(), e))
}

/// Everything the attenuation pass needs to know before it writes anything.
struct AttenuationPlan {
    detection: DetectionReport,
    thresholds: Thresholds,
    file_rms: u32,
    total: u64,
}

/// Runs the detect, dump and attenuate passes with one set of tunables.
pub struct DeEssContext {
    config: DeEssConfig,
}

impl DeEssContext {
    pub fn new(config: DeEssConfig) -> DeEssResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DeEssConfig {
        &self.config
    }

    /// Read the header from `input` and collect every burst after it.
    /// `name` only labels errors.
    pub fn detect<R: Read>(&self, input: R, name: &Path) -> DeEssResult<DetectionReport> {
        self.scan(input, name, Mode::Detect)
    }

    pub fn detect_file(&self, path: &Path) -> DeEssResult<DetectionReport> {
        self.detect(open_input(path, Mode::Detect)?, path)
    }

    fn scan<R: Read>(&self, mut input: R, name: &Path, mode: Mode) -> DeEssResult<DetectionReport> {
        let header = read_header(&mut input, name, mode)?;
        if header.sample_rate() == 0 {
            return Err(DeEssError::SampleRate(mode, name.to_path_buf()));
        }
        let params = self.config.for_rate(header.sample_rate())?;
        debug!(
            "{} Hz: half-cycle limit {} samples, delta1 {} samples, delta2 {} samples",
            params.sample_rate, params.half_cycle_limit, params.delta1_samples, params.delta2_samples
        );

        let mut detector = EssDetector::new(SampleReader::new(input), params);
        let bursts = detect_bursts(&mut detector, self.config.max_bursts)?;
        info!(
            "Found {} bursts in {} samples of {}",
            bursts.len(),
            detector.position(),
            name.display()
        );
        Ok(DetectionReport {
            header,
            params,
            bursts,
        })
    }

    /// Write every sample after the header as `index:\tvalue`. Returns the
    /// number of samples written.
    pub fn dump<R: Read, W: Write>(&self, mut input: R, name: &Path, mut out: W) -> DeEssResult<u64> {
        read_header(&mut input, name, Mode::Print)?;
        let mut count = 0u64;
        for sample in SampleReader::new(input) {
            writeln!(out, "{}:\t{}", count, sample?)?;
            count += 1;
        }
        out.flush()?;
        Ok(count)
    }

    pub fn dump_file<W: Write>(&self, path: &Path, out: W) -> DeEssResult<u64> {
        self.dump(open_input(path, Mode::Print)?, path, out)
    }

    /// Detect, measure the gated RMS of the whole input, then write the
    /// header and the attenuated samples to `output`.
    pub fn attenuate<R, W, F>(
        &self,
        mut input: R,
        name: &Path,
        output: W,
        profiles: &Profiles,
        progress: F,
    ) -> DeEssResult<AttenuationReport>
    where
        R: Read + Seek,
        W: Write,
        F: FnMut(ProgressUpdate),
    {
        let plan = self.plan(&mut input, name)?;
        self.render(plan, input, output, profiles, progress)
    }

    /// Like [`attenuate`](Self::attenuate), but `output` is only created once
    /// the input has been scanned successfully.
    pub fn attenuate_file<F: FnMut(ProgressUpdate)>(
        &self,
        input: &Path,
        output: &Path,
        profiles: &Profiles,
        progress: F,
    ) -> DeEssResult<AttenuationReport> {
        let mut reader = open_input(input, Mode::Attenuate)?;
        let plan = self.plan(&mut reader, input)?;
        let writer = File::create(output)
            .map(BufWriter::new)
            .map_err(|e| DeEssError::OutputCreate(output.to_path_buf(), e))?;
        self.render(plan, reader, writer, profiles, progress)
    }

    fn plan<R: Read + Seek>(&self, input: &mut R, name: &Path) -> DeEssResult<AttenuationPlan> {
        let total = samples_in(input.seek(SeekFrom::End(0))?);
        input.seek(SeekFrom::Start(0))?;
        let detection = self.scan(&mut *input, name, Mode::Attenuate)?;

        input.seek(SeekFrom::Start(HEADER_LEN as u64))?;
        let rms = file_rms(&mut SampleReader::new(&mut *input), self.config.noise_floor)?;
        let thresholds = Thresholds::from_file_rms(rms);
        debug!(
            "File RMS {}, thresholds {} / {}",
            rms, thresholds.threshold1, thresholds.threshold2
        );
        Ok(AttenuationPlan {
            detection,
            thresholds,
            file_rms: rms,
            total,
        })
    }

    fn render<R, W, F>(
        &self,
        plan: AttenuationPlan,
        mut input: R,
        mut output: W,
        profiles: &Profiles,
        progress: F,
    ) -> DeEssResult<AttenuationReport>
    where
        R: Read + Seek,
        W: Write,
        F: FnMut(ProgressUpdate),
    {
        input.seek(SeekFrom::Start(HEADER_LEN as u64))?;
        plan.detection.header.write_to(&mut output)?;
        let mut reader = SampleReader::new(input);
        let mut writer = SampleWriter::new(output);
        let attenuator = Attenuator::new(
            plan.detection.params,
            plan.thresholds,
            profiles,
            self.config.overflow,
        );
        let mut report =
            attenuator.run(&plan.detection.bursts, &mut reader, &mut writer, plan.total, progress)?;
        report.file_rms = plan.file_rms;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::signals::*;
    use crate::impulse::ImpulseResponse;
    use crate::pcm::wav::{cd_rate, decode};
    use std::fs;
    use std::io::{self, Cursor};
    use std::path::PathBuf;

    fn ctx() -> DeEssContext {
        DeEssContext::new(DeEssConfig::default()).unwrap()
    }

    fn name() -> &'static Path {
        Path::new("test.wav")
    }

    fn scratch_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("deess-{}-{}.wav", std::process::id(), tag))
    }

    fn delayed(delay: usize) -> ImpulseResponse {
        let mut taps = vec![0.0; 81];
        taps[delay] = 1.0;
        ImpulseResponse::from_taps(taps).unwrap()
    }

    #[test]
    fn detect_reports_burst() {
        let signal = concat(&[dither(500), hiss(250), dither(500)]);
        let report = ctx().detect(Cursor::new(cd_rate(&signal)), name()).unwrap();
        assert_eq!(report.params.sample_rate, 44100);
        assert_eq!(
            report.bursts,
            vec![Burst {
                start: 500,
                end: 1513,
                rms: 992
            }]
        );

        let mut out = Vec::new();
        write_detection_report(&mut out, &report).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "start: 500\tend: 1513\t22ms\tRMS: 992\n");
    }

    #[test]
    fn short_header_is_a_header_error() {
        let err = ctx().detect(Cursor::new(vec![0u8; 30]), name()).unwrap_err();
        assert!(matches!(err, DeEssError::Header(Mode::Detect, ref p, _) if p == name()));
        assert_eq!(err.exit_code(), 2);

        let err = ctx()
            .dump(Cursor::new(vec![0u8; 30]), name(), io::sink())
            .unwrap_err();
        assert_eq!(err.exit_code(), 5);

        let profiles = Profiles::identity(81).unwrap();
        let err = ctx()
            .attenuate(Cursor::new(vec![0u8; 30]), name(), io::sink(), &profiles, |_| {})
            .unwrap_err();
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn zero_sample_rate_is_a_header_fault() {
        let mut bytes = cd_rate(&dither(100));
        bytes[24..28].copy_from_slice(&0u32.to_le_bytes());
        let err = ctx().detect(Cursor::new(bytes.clone()), name()).unwrap_err();
        assert!(matches!(err, DeEssError::SampleRate(Mode::Detect, _)));
        assert_eq!(err.exit_code(), 13);

        let profiles = Profiles::identity(81).unwrap();
        let err = ctx()
            .attenuate(Cursor::new(bytes), name(), io::sink(), &profiles, |_| {})
            .unwrap_err();
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn missing_input_exit_code_depends_on_mode() {
        let missing = Path::new("/nonexistent/in.wav");
        let err = ctx().detect_file(missing).unwrap_err();
        assert!(matches!(err, DeEssError::InputOpen(Mode::Detect, ..)));
        assert_eq!(err.exit_code(), 1);

        let err = ctx().dump_file(missing, io::sink()).unwrap_err();
        assert_eq!(err.exit_code(), 4);

        let profiles = Profiles::identity(81).unwrap();
        let out = scratch_path("missing-out");
        let err = ctx()
            .attenuate_file(missing, &out, &profiles, |_| {})
            .unwrap_err();
        assert_eq!(err.exit_code(), 9);
        assert!(!out.exists());
    }

    #[test]
    fn bad_input_leaves_no_output_file() {
        let input = scratch_path("stub-in");
        let output = scratch_path("stub-out");
        fs::write(&input, [0u8; 5]).unwrap();
        let profiles = Profiles::identity(81).unwrap();
        let err = ctx()
            .attenuate_file(&input, &output, &profiles, |_| {})
            .unwrap_err();
        fs::remove_file(&input).unwrap();
        assert!(matches!(err, DeEssError::Header(Mode::Attenuate, ..)));
        assert!(!output.exists());
    }

    #[test]
    fn attenuate_file_writes_output() {
        let input = scratch_path("file-in");
        let output = scratch_path("file-out");
        let bytes = cd_rate(&concat(&[dither(500), hiss(2500), dither(500)]));
        fs::write(&input, &bytes).unwrap();
        let profiles = Profiles::identity(81).unwrap();
        let report = ctx()
            .attenuate_file(&input, &output, &profiles, |_| {})
            .unwrap();
        let written = fs::read(&output).unwrap();
        fs::remove_file(&input).unwrap();
        fs::remove_file(&output).unwrap();
        assert_eq!(report.long_profile, 1);
        assert_eq!(written, bytes);
    }

    #[test]
    fn dump_lists_samples() {
        let mut out = Vec::new();
        let n = ctx()
            .dump(Cursor::new(cd_rate(&[1, -2, 3])), name(), &mut out)
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(String::from_utf8(out).unwrap(), "0:\t1\n1:\t-2\n2:\t3\n");
    }

    #[test]
    fn silent_input_stays_silent() {
        let input = cd_rate(&[0i16; 20_000]);
        let profiles = Profiles {
            short: delayed(3),
            long: ImpulseResponse::from_taps(vec![0.5, 0.25, 0.25]).unwrap(),
        };
        let mut out = Vec::new();
        let report = ctx()
            .attenuate(Cursor::new(input.clone()), name(), &mut out, &profiles, |_| {})
            .unwrap();
        assert_eq!(report.bursts, 0);
        assert_eq!(report.samples_written, 20_000);
        assert_eq!(out.len(), input.len());
        assert_eq!(out, input);
    }

    #[test]
    fn default_durations_with_unit_profiles_reproduce_input() {
        // short, medium and long bursts at 80 / 200 ms
        let signal = concat(&[
            dither(500),
            hiss(250),
            dither(500),
            hiss(1000),
            dither(500),
            hiss(2500),
            dither(500),
        ]);
        let input = cd_rate(&signal);
        let mut out = Vec::new();
        let report = ctx()
            .attenuate(
                Cursor::new(input.clone()),
                name(),
                &mut out,
                &Profiles::identity(81).unwrap(),
                |_| {},
            )
            .unwrap();
        assert_eq!(report.bursts, 3);
        assert_eq!(report.passed_through, 1);
        assert_eq!(report.short_profile, 1);
        assert_eq!(report.long_profile, 1);
        assert_eq!(report.overflowed_samples, 0);
        assert_eq!(report.samples_written, signal.len() as u64);
        assert_eq!(out, input);
    }

    #[test]
    fn identity_profiles_reproduce_input() {
        let signal = concat(&[dither(500), hiss(2500), dither(500), hiss(250), dither(500)]);
        let input = cd_rate(&signal);
        let config = DeEssConfig {
            delta1_ms: 10,
            delta2_ms: 20,
            ..DeEssConfig::default()
        };
        let ctx = DeEssContext::new(config).unwrap();
        let mut out = Vec::new();
        let report = ctx
            .attenuate(
                Cursor::new(input.clone()),
                name(),
                &mut out,
                &Profiles::identity(81).unwrap(),
                |_| {},
            )
            .unwrap();
        assert_eq!(report.bursts, 2);
        assert_eq!(report.long_profile + report.short_profile, 2);
        assert_eq!(report.samples_written, signal.len() as u64);
        assert_eq!(out, input);
    }

    #[test]
    fn long_burst_is_filtered() {
        let signal = concat(&[dither(500), hiss(250), dither(500)]);
        let config = DeEssConfig {
            delta1_ms: 10,
            delta2_ms: 20,
            ..DeEssConfig::default()
        };
        let ctx = DeEssContext::new(config).unwrap();
        let profiles = Profiles {
            short: ImpulseResponse::unit(81).unwrap(),
            long: delayed(1),
        };
        let mut out = Vec::new();
        let report = ctx
            .attenuate(Cursor::new(cd_rate(&signal)), name(), &mut out, &profiles, |_| {})
            .unwrap();
        assert_eq!(report.long_profile, 1);
        assert!(report.file_rms > 900);

        let (header, samples) = decode(&out).unwrap();
        assert_eq!(header.sample_rate(), 44100);
        assert_eq!(samples.len(), signal.len());
        assert_eq!(&samples[..500], &signal[..500]);
        for n in 500..1513 {
            assert_eq!(samples[n], signal[n - 1]);
        }
        assert_eq!(&samples[1513..], &signal[1513..]);
    }

    #[test]
    fn default_durations_leave_short_burst_alone() {
        let signal = concat(&[dither(500), hiss(250), dither(500)]);
        let input = cd_rate(&signal);
        let profiles = Profiles {
            short: ImpulseResponse::from_taps(vec![0.5, 0.0, 0.0]).unwrap(),
            long: ImpulseResponse::from_taps(vec![0.5, 0.0, 0.0]).unwrap(),
        };
        let mut out = Vec::new();
        let report = ctx()
            .attenuate(Cursor::new(input.clone()), name(), &mut out, &profiles, |_| {})
            .unwrap();
        assert_eq!(report.passed_through, 1);
        assert_eq!(out, input);
    }
}
