/// Linear interpolation resampler for playback rate conversion
pub struct Resampler {
    /// Input sample rate
    input_rate: u32,
    /// Output sample rate
    output_rate: u32,
    /// Input samples advanced per output sample
    step: f64,
}

impl Resampler {
    /// Create a new resampler
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            input_rate,
            output_rate,
            step: input_rate as f64 / output_rate as f64,
        }
    }

    /// Resample a complete clip
    ///
    /// Passes the input through untouched when the rates match.
    pub fn resample(&self, input: &[f32]) -> Vec<f32> {
        if self.input_rate == self.output_rate || input.len() < 2 {
            return input.to_vec();
        }

        let output_len =
            ((input.len() - 1) as f64 / self.step).floor() as usize + 1;
        let mut output = Vec::with_capacity(output_len);

        for n in 0..output_len {
            let pos = n as f64 * self.step;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let next = input[(idx + 1).min(input.len() - 1)];
            output.push(input[idx] * (1.0 - frac) + next * frac);
        }

        output
    }

    /// Output samples per input sample
    pub fn ratio(&self) -> f64 {
        1.0 / self.step
    }
}
