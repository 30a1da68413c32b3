use rustfft::{num_complex::Complex64, FftPlanner};
use std::f64::consts::PI;

/// Magnitude floor for dB conversion
const DB_FLOOR: f64 = -200.0;

/// Spectrum analyzer for real-valued audio
pub struct SpectrumAnalyzer {
    /// FFT size
    size: usize,
    /// FFT planner (reused for efficiency)
    planner: FftPlanner<f64>,
    /// Work buffer for the in-place FFT
    buffer: Vec<Complex64>,
    /// Window function coefficients
    window: Vec<f64>,
}

impl SpectrumAnalyzer {
    /// Create a new analyzer
    pub fn new(size: usize) -> Self {
        Self {
            size,
            planner: FftPlanner::new(),
            buffer: vec![Complex64::new(0.0, 0.0); size],
            window: Self::hann_window(size),
        }
    }

    /// One-sided magnitude spectrum in dB, `size / 2 + 1` bins
    ///
    /// Takes at most `size` samples; shorter input is zero-padded.
    pub fn process(&mut self, samples: &[f64]) -> Vec<f64> {
        let count = samples.len().min(self.size);

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            *slot = if i < count {
                Complex64::new(samples[i] * self.window[i], 0.0)
            } else {
                Complex64::new(0.0, 0.0)
            };
        }

        let fft = self.planner.plan_fft_forward(self.size);
        fft.process(&mut self.buffer);

        // Normalize so a full-scale sine lands near 0 dB
        let scale = 2.0 / self.window.iter().sum::<f64>().max(f64::EPSILON);
        self.buffer[..self.size / 2 + 1]
            .iter()
            .map(|bin| {
                let magnitude = bin.norm() * scale;
                if magnitude > 1e-10 {
                    20.0 * magnitude.log10()
                } else {
                    DB_FLOOR
                }
            })
            .collect()
    }

    /// Frequency in Hz of bin `index`
    pub fn bin_frequency(&self, index: usize, sample_rate: u32) -> f64 {
        index as f64 * sample_rate as f64 / self.size as f64
    }

    /// Generate Hann window coefficients
    fn hann_window(size: usize) -> Vec<f64> {
        if size < 2 {
            return vec![1.0; size];
        }
        (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (size - 1) as f64).cos()))
            .collect()
    }
}

/// Frequency of the strongest non-DC component, `None` for fewer than 4 samples
pub fn dominant_frequency(samples: &[f64], sample_rate: u32) -> Option<f64> {
    if samples.len() < 4 {
        return None;
    }
    // Largest power of two that fits, for a fast transform
    let size = 1usize << (usize::BITS - 1 - samples.len().leading_zeros());
    let mut analyzer = SpectrumAnalyzer::new(size);
    let start = samples.len() - size;
    let spectrum = analyzer.process(&samples[start..]);

    spectrum
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(index, _)| analyzer.bin_frequency(index, sample_rate))
}

/// RMS of the signal around its mean, in dB relative to a full-scale sine
pub fn rms_dbfs(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return DB_FLOOR;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let power = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / samples.len() as f64;
    let rms = power.sqrt();
    if rms <= 0.0 {
        return DB_FLOOR;
    }
    // 20 * log10(sqrt(2)): a +/-1.0 sine reads 0 dBFS
    20.0 * rms.log10() + 3.0103
}

/// Sum of sines as `(frequency, amplitude)` pairs
#[cfg(test)]
pub fn generate_tones(num_samples: usize, sample_rate: u32, tones: &[(f64, f64)]) -> Vec<f64> {
    (0..num_samples)
        .map(|n| {
            let t = n as f64 / sample_rate as f64;
            tones
                .iter()
                .map(|&(freq, amplitude)| amplitude * (2.0 * PI * freq * t).sin())
                .sum()
        })
        .collect()
}
