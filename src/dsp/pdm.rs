//! PDM bitstream recovery and conversion to PCM audio
//!
//! The decoder latches the data line on every rising edge of the clock line, low-pass
//! filters the resulting one-bit stream at the PDM clock rate and keeps every
//! `decimation`-th filtered sample.

use super::filters::{ButterworthLowpass, SETTLING_TOLERANCE};
use super::DecodeError;
use crate::scope::DigitalCapture;
use crate::types::{DecoderConfig, TrimPolicy};

/// Decoded audio and the rate it is sampled at
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Indices `i` where `clk[i] == 0` and `clk[i + 1] == 1`
///
/// Matches a first difference padded with a trailing zero, so the last sample can
/// never be reported as an edge.
pub fn rising_edges(clk: &[u8]) -> Vec<usize> {
    clk.windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1] as i16 - pair[0] as i16 == 1)
        .map(|(i, _)| i)
        .collect()
}

/// Data bits at each edge index, as 0.0 / 1.0
pub fn latch_bits(dat: &[u8], edges: &[usize]) -> Vec<f64> {
    edges.iter().map(|&i| f64::from(dat[i])).collect()
}

/// Keep every `factor`-th sample starting from the first
pub fn decimate(samples: &[f64], factor: usize) -> Vec<f64> {
    samples.iter().step_by(factor.max(1)).copied().collect()
}

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Drop `trim` leading samples and subtract the mean of what is left
///
/// Returns the removed DC offset.
pub fn trim_and_remove_dc(samples: &mut Vec<f64>, trim: usize) -> Result<f64, DecodeError> {
    if trim >= samples.len() {
        return Err(DecodeError::TooShort {
            what: "decimated waveform after trim",
            needed: trim,
            got: samples.len(),
        });
    }
    samples.drain(..trim);
    let dc = mean(samples);
    for sample in samples.iter_mut() {
        *sample -= dc;
    }
    Ok(dc)
}

/// Check that `source_rate / decimation` is exactly `audio_rate`
pub fn check_rates(source_rate: u32, decimation: usize, audio_rate: u32) -> Result<(), DecodeError> {
    if decimation == 0 {
        return Err(DecodeError::ZeroDecimation);
    }
    let exact = u64::from(audio_rate) * decimation as u64 == u64::from(source_rate);
    if !exact {
        return Err(DecodeError::RateMismatch {
            source_rate,
            decimation,
            expected: audio_rate,
            actual: source_rate as f64 / decimation as f64,
        });
    }
    Ok(())
}

/// Intermediate results of one decode, for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeReport {
    /// Rising clock edges found in the capture
    pub edges: usize,
    /// Samples left after decimation, before trimming
    pub decimated: usize,
    /// Leading output samples dropped
    pub trimmed: usize,
    /// DC offset removed from the output
    pub dc_offset: f64,
}

/// Validated PDM-to-PCM converter
#[derive(Clone)]
pub struct PdmDecoder {
    config: DecoderConfig,
    lowpass: ButterworthLowpass,
    trim: usize,
}

impl PdmDecoder {
    /// Validate rates and design the low-pass stage
    ///
    /// Nothing is decoded here, so this can run before any acquisition.
    pub fn new(config: DecoderConfig) -> Result<Self, DecodeError> {
        check_rates(config.pdm_clock_hz, config.decimation, config.audio_rate_hz)?;

        let lowpass = ButterworthLowpass::design(
            config.filter_order,
            config.cutoff_hz,
            config.pdm_clock_hz as f64,
        )?;

        let trim = match config.trim {
            TrimPolicy::Fixed(n) => n,
            TrimPolicy::Auto => {
                let settle = lowpass.settling_samples(SETTLING_TOLERANCE)?;
                (settle + config.decimation - 1) / config.decimation
            }
        };

        log::info!(
            "PDM decoder: {} Hz / {} -> {} Hz, order-{} low-pass at {} Hz, trim {} samples ({:?})",
            config.pdm_clock_hz,
            config.decimation,
            config.audio_rate_hz,
            config.filter_order,
            config.cutoff_hz,
            trim,
            config.trim
        );

        // Whatever passes above the output Nyquist folds back into the audio band
        let nyquist_hz = f64::from(config.audio_rate_hz) / 2.0;
        let rejection_db = -20.0 * lowpass.magnitude_at(nyquist_hz).max(1e-12).log10();
        log::debug!("Alias rejection at {} Hz: {:.1} dB", nyquist_hz, rejection_db);
        if rejection_db < 20.0 {
            log::warn!(
                "Low-pass only attenuates {:.1} dB at {} Hz; expect aliasing",
                rejection_db,
                nyquist_hz
            );
        }

        Ok(Self {
            config,
            lowpass,
            trim,
        })
    }

    /// Output samples dropped from the start of every decode
    #[cfg(test)]
    pub fn trim_samples(&self) -> usize {
        self.trim
    }

    #[cfg(test)]
    pub fn lowpass(&self) -> &ButterworthLowpass {
        &self.lowpass
    }

    /// Decode a clock/data pair
    #[cfg(test)]
    pub fn decode(&self, clk: &[u8], dat: &[u8]) -> Result<Waveform, DecodeError> {
        self.decode_with_report(clk, dat).map(|(waveform, _)| waveform)
    }

    /// Decode a clock/data pair and return the intermediate counts as well
    pub fn decode_with_report(
        &self,
        clk: &[u8],
        dat: &[u8],
    ) -> Result<(Waveform, DecodeReport), DecodeError> {
        if clk.len() != dat.len() {
            return Err(DecodeError::LengthMismatch {
                clk: clk.len(),
                dat: dat.len(),
            });
        }
        if clk.is_empty() {
            return Err(DecodeError::EmptyInput);
        }
        if clk.len() < 2 {
            return Err(DecodeError::TooShort {
                what: "clock/data sequences",
                needed: 1,
                got: clk.len(),
            });
        }

        let edges = rising_edges(clk);
        log::debug!("Found {} rising clock edges in {} samples", edges.len(), clk.len());

        let mut pdm = latch_bits(dat, &edges);
        self.lowpass.filter(&mut pdm);

        let mut samples = decimate(&pdm, self.config.decimation);
        let decimated = samples.len();
        let dc_offset = trim_and_remove_dc(&mut samples, self.trim)?;

        let report = DecodeReport {
            edges: edges.len(),
            decimated,
            trimmed: self.trim,
            dc_offset,
        };

        Ok((Waveform::new(samples, self.config.audio_rate_hz), report))
    }

    /// Decode the configured clock and data lines of a capture
    pub fn decode_capture(
        &self,
        capture: &DigitalCapture,
    ) -> Result<(Waveform, DecodeReport), DecodeError> {
        let clk = capture.line(self.config.clk_line)?;
        let dat = capture.line(self.config.dat_line)?;

        if capture.sample_rate() < 2.0 * self.config.pdm_clock_hz as f64 {
            log::warn!(
                "Capture rate {:.0} Hz is below twice the PDM clock ({} Hz); edges will be missed",
                capture.sample_rate(),
                self.config.pdm_clock_hz
            );
        }

        let (waveform, report) = self.decode_with_report(&clk, &dat)?;

        let measured_clock = report.edges as f64 / capture.duration();
        let deviation = (measured_clock - self.config.pdm_clock_hz as f64).abs()
            / self.config.pdm_clock_hz as f64;
        log::info!(
            "Measured PDM clock {:.0} Hz from {} edges ({:.2}% off nominal)",
            measured_clock,
            report.edges,
            deviation * 100.0
        );
        if deviation > 0.01 {
            log::warn!(
                "Measured PDM clock differs from configured {} Hz; audio pitch will be off",
                self.config.pdm_clock_hz
            );
        }

        Ok((waveform, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::ErrorKind;

    fn square_clock(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 2) as u8).collect()
    }

    fn config_with_trim(trim: TrimPolicy) -> DecoderConfig {
        DecoderConfig {
            trim,
            ..DecoderConfig::default()
        }
    }

    #[test]
    fn test_rising_edges_count_and_order() {
        // three 0 -> 1 transitions, one 1 -> 0 at the very end
        let clk = [0, 0, 1, 1, 0, 1, 0, 0, 0, 1, 1, 0];
        let edges = rising_edges(&clk);
        assert_eq!(edges, vec![1, 4, 8]);
        assert!(edges.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_rising_edges_ignore_final_sample() {
        assert!(rising_edges(&[1, 1, 1]).is_empty());
        assert!(rising_edges(&[0]).is_empty());
        assert_eq!(rising_edges(&[0, 1]), vec![0]);
        assert!(rising_edges(&[1, 0, 0]).is_empty());
    }

    #[test]
    fn test_latch_length_bounded_by_input() {
        for len in [2usize, 3, 10, 101] {
            let clk: Vec<u8> = (0..len).map(|i| ((i * 7 + 3) % 5 < 2) as u8).collect();
            let dat: Vec<u8> = (0..len).map(|i| (i % 3 == 0) as u8).collect();
            let edges = rising_edges(&clk);
            let bits = latch_bits(&dat, &edges);
            assert_eq!(bits.len(), edges.len());
            assert!(bits.len() <= len - 1);
        }
    }

    #[test]
    fn test_latch_takes_sample_before_edge() {
        let clk = [0, 1, 0, 1, 0, 1];
        let dat = [1, 0, 0, 1, 1, 0];
        let edges = rising_edges(&clk);
        assert_eq!(latch_bits(&dat, &edges), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_decimate_keeps_first_sample() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        assert_eq!(decimate(&x, 4), vec![0.0, 4.0, 8.0]);
        assert_eq!(decimate(&x, 1), x);
        assert!(decimate(&[], 64).is_empty());
    }

    #[test]
    fn test_rate_check() {
        assert!(check_rates(3_072_000, 64, 48_000).is_ok());

        let err = check_rates(3_072_000, 63, 48_000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(matches!(err, DecodeError::RateMismatch { decimation: 63, .. }));

        assert!(check_rates(3_072_000, 32, 48_000).is_err());
        assert_eq!(check_rates(3_072_000, 0, 48_000), Err(DecodeError::ZeroDecimation));
    }

    #[test]
    fn test_decoder_rejects_bad_config_up_front() {
        let config = DecoderConfig {
            decimation: 63,
            ..DecoderConfig::default()
        };
        assert_eq!(
            PdmDecoder::new(config).err().map(|e| e.kind()),
            Some(ErrorKind::Configuration)
        );

        let config = DecoderConfig {
            cutoff_hz: 2_000_000.0,
            ..DecoderConfig::default()
        };
        assert_eq!(
            PdmDecoder::new(config).err().map(|e| e.kind()),
            Some(ErrorKind::Numerical)
        );

        let config = DecoderConfig {
            filter_order: 0,
            ..DecoderConfig::default()
        };
        assert_eq!(PdmDecoder::new(config).err(), Some(DecodeError::InvalidOrder));
    }

    #[test]
    fn test_input_errors() {
        let decoder = PdmDecoder::new(DecoderConfig::default()).unwrap();
        assert_eq!(
            decoder.decode(&[0, 1, 0], &[1, 1]),
            Err(DecodeError::LengthMismatch { clk: 3, dat: 2 })
        );
        assert_eq!(decoder.decode(&[], &[]), Err(DecodeError::EmptyInput));
        assert_eq!(
            decoder.decode(&[0], &[1]).unwrap_err().kind(),
            ErrorKind::Input
        );
    }

    #[test]
    fn test_trim_longer_than_output_fails() {
        let decoder = PdmDecoder::new(config_with_trim(TrimPolicy::Fixed(500))).unwrap();
        let clk = square_clock(2 * 64 * 100);
        let dat = vec![1u8; clk.len()];
        let err = decoder.decode(&clk, &dat).unwrap_err();
        assert!(matches!(err, DecodeError::TooShort { .. }));
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn test_dc_removed() {
        let decoder = PdmDecoder::new(DecoderConfig::default()).unwrap();
        let len = 2 * 64 * 400;
        let clk = square_clock(len);
        // Density-modulated data: runs of mostly-ones and mostly-zeros
        let dat: Vec<u8> = (0..len)
            .map(|i| {
                let slow = (i / 4096) % 2 == 0;
                let fast = (i / 2) % 4 != 0;
                (slow && fast || !slow && !fast) as u8
            })
            .collect();
        let waveform = decoder.decode(&clk, &dat).unwrap();
        assert!(!waveform.is_empty());
        assert!(mean(&waveform.samples).abs() < 1e-9);
    }

    #[test]
    fn test_constant_data_end_to_end() {
        let decoder = PdmDecoder::new(DecoderConfig::default()).unwrap();
        let len = 2 * 64 * 1000 + 1;
        let clk = square_clock(len);
        let dat = vec![1u8; len];

        let (waveform, report) = decoder.decode_with_report(&clk, &dat).unwrap();
        assert_eq!(report.edges, len / 2);

        let expected_len = (len / 2 + 63) / 64 - decoder.trim_samples();
        assert_eq!(waveform.len(), expected_len);
        assert_eq!(waveform.sample_rate, 48_000);
        assert!((report.dc_offset - 1.0).abs() < 1e-3);
        for &x in &waveform.samples {
            assert!(x.abs() < 5e-3, "sample {} not near zero", x);
        }
    }

    #[test]
    fn test_all_ones_latched_from_square_clock() {
        let len = 1001;
        let clk = square_clock(len);
        let dat = vec![1u8; len];
        let bits = latch_bits(&dat, &rising_edges(&clk));
        assert_eq!(bits.len(), len / 2);
        assert!(bits.iter().all(|&b| b == 1.0));
    }

    #[test]
    fn test_single_decimation_pass() {
        let decoder = PdmDecoder::new(config_with_trim(TrimPolicy::Fixed(0))).unwrap();
        let len = 2 * 64 * 64 * 8;
        let clk = square_clock(len);
        let dat: Vec<u8> = (0..len).map(|i| ((i / 2) % 3 == 0) as u8).collect();

        let (waveform, report) = decoder.decode_with_report(&clk, &dat).unwrap();
        assert_eq!(report.decimated, (report.edges + 63) / 64);
        assert_eq!(waveform.len(), report.decimated);

        // Filtering and decimating again is not the same as one pass at the product factor
        let mut once = latch_bits(&dat, &rising_edges(&clk));
        decoder.lowpass().filter(&mut once);
        let mut twice = decimate(&once, 64);
        decoder.lowpass().filter(&mut twice);
        let twice = decimate(&twice, 64);
        let product = decimate(&once, 64 * 64);
        assert_eq!(twice.len(), product.len());
        assert!(twice.iter().zip(&product).any(|(a, b)| (a - b).abs() > 1e-6));
    }

    #[test]
    fn test_auto_trim_covers_settling() {
        let decoder = PdmDecoder::new(DecoderConfig::default()).unwrap();
        let settle = decoder.lowpass().settling_samples(SETTLING_TOLERANCE).unwrap();
        assert!(decoder.trim_samples() * 64 >= settle);
        assert!(decoder.trim_samples() > 0);

        let fixed = PdmDecoder::new(config_with_trim(TrimPolicy::Fixed(500))).unwrap();
        assert_eq!(fixed.trim_samples(), 500);
    }

    #[test]
    fn test_auto_trim_with_very_low_cutoff_fails_fast() {
        let config = DecoderConfig {
            cutoff_hz: 0.01,
            ..DecoderConfig::default()
        };
        let err = PdmDecoder::new(config.clone()).err().unwrap();
        assert!(matches!(err, DecodeError::Unsettled { .. }));
        assert_eq!(err.kind(), ErrorKind::Numerical);

        // A fixed trim skips the settling search entirely
        let fixed = PdmDecoder::new(DecoderConfig {
            trim: TrimPolicy::Fixed(10),
            ..config
        })
        .unwrap();
        assert_eq!(fixed.trim_samples(), 10);
    }
}
