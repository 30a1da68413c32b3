use crate::dsp::DecodeError;

/// Lines on one PicoScope digital port
pub const DIGITAL_LINES: usize = 8;

/// One block of digital samples, one byte per sample with bit `i` holding line `i`
#[derive(Debug, Clone, PartialEq)]
pub struct DigitalCapture {
    words: Vec<u8>,
    sample_rate: f64,
}

impl DigitalCapture {
    pub fn from_words(words: Vec<u8>, sample_rate: f64) -> Self {
        Self { words, sample_rate }
    }

    /// Build from raw port values as returned by the SDK
    ///
    /// The 16-bit buffer carries the port's eight lines in its low byte.
    pub fn from_port_values(values: &[i16], sample_rate: f64) -> Self {
        let words = values.iter().map(|&v| (v & 0xFF) as u8).collect();
        Self::from_words(words, sample_rate)
    }

    /// Build from a `[lines x samples]` row-major array of 0/1 values
    pub fn from_line_major(
        data: &[u8],
        lines: usize,
        samples: usize,
        sample_rate: f64,
    ) -> Result<Self, DecodeError> {
        if lines > DIGITAL_LINES {
            return Err(DecodeError::LineOutOfRange {
                line: lines - 1,
                available: DIGITAL_LINES,
            });
        }
        if data.len() != lines * samples {
            return Err(DecodeError::TooShort {
                what: "line-major capture data",
                needed: lines * samples,
                got: data.len(),
            });
        }

        let mut words = vec![0u8; samples];
        for (line, row) in data.chunks_exact(samples.max(1)).enumerate().take(lines) {
            for (word, &bit) in words.iter_mut().zip(row) {
                if bit != 0 {
                    *word |= 1 << line;
                }
            }
        }
        Ok(Self::from_words(words, sample_rate))
    }

    /// Bits of one line, as 0/1
    pub fn line(&self, index: usize) -> Result<Vec<u8>, DecodeError> {
        if index >= DIGITAL_LINES {
            return Err(DecodeError::LineOutOfRange {
                line: index,
                available: DIGITAL_LINES,
            });
        }
        Ok(self.words.iter().map(|&w| (w >> index) & 1).collect())
    }

    /// All lines as a `[8 x samples]` row-major array of 0/1
    pub fn to_line_major(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(DIGITAL_LINES * self.words.len());
        for line in 0..DIGITAL_LINES {
            data.extend(self.words.iter().map(|&w| (w >> line) & 1));
        }
        data
    }

    pub fn words(&self) -> &[u8] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Realized sample rate in Hz
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Capture length in seconds
    pub fn duration(&self) -> f64 {
        self.words.len() as f64 / self.sample_rate
    }
}
