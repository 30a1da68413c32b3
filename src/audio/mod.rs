#[cfg(feature = "audio")]
pub mod output;

#[cfg(feature = "audio")]
pub use output::AudioOutput;

use crate::dsp::Waveform;
use dasp::Sample;
use std::time::Duration;

/// Scale by `gain`, clamp to full scale and convert to `f32`
pub fn playback_samples(samples: &[f64], gain: f32) -> Vec<f32> {
    let gain = f64::from(gain);
    samples
        .iter()
        .map(|&x| (x * gain).clamp(-1.0, 1.0).to_sample::<f32>())
        .collect()
}

/// Repeat each mono sample across `channels` interleaved channels
pub fn interleave(mono: &[f32], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    mono.iter()
        .flat_map(|&s| std::iter::repeat(s).take(channels))
        .collect()
}

/// Time the device needs to play one callback buffer of `samples` interleaved values
pub fn buffer_period(samples: usize, channels: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let frames = samples / channels.max(1);
    Duration::from_secs_f64(frames as f64 / f64::from(sample_rate))
}

/// Play a waveform on the default output device
#[cfg(feature = "audio")]
pub fn play(waveform: &Waveform, gain: f32) -> anyhow::Result<()> {
    AudioOutput::open_default()?.play(waveform, gain)
}

#[cfg(not(feature = "audio"))]
pub fn play(waveform: &Waveform, _gain: f32) -> anyhow::Result<()> {
    log::warn!(
        "Built without audio support, skipping playback of {:.2} s",
        waveform.duration()
    );
    Ok(())
}
