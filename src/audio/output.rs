use super::{buffer_period, interleave, playback_samples};
use crate::dsp::resampler::Resampler;
use crate::dsp::Waveform;
use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::time::Duration;

/// Extra time allowed past the clip length before giving up on playback
const DRAIN_MARGIN: Duration = Duration::from_secs(1);

/// Audio output manager
pub struct AudioOutput {
    _host: Host,
    device: Device,
    config: StreamConfig,
}

impl AudioOutput {
    /// Open the default output device
    pub fn open_default() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("No default audio output device"))?;

        log::info!("Audio output device: {}", device.name()?);

        let config = device.default_output_config()?;
        log::info!(
            "Audio config: {} Hz, {} channels",
            config.sample_rate().0,
            config.channels()
        );

        Ok(Self {
            _host: host,
            device,
            config: config.into(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> usize {
        self.config.channels as usize
    }

    /// Play a waveform to the end, blocking until it has been handed to the device
    pub fn play(&self, waveform: &Waveform, gain: f32) -> Result<()> {
        let mono = playback_samples(&waveform.samples, gain);
        let resampler = Resampler::new(waveform.sample_rate, self.sample_rate());
        log::debug!(
            "Resampling {} Hz -> {} Hz (x{:.4})",
            waveform.sample_rate,
            self.sample_rate(),
            resampler.ratio()
        );
        let mono = resampler.resample(&mono);
        let frames = interleave(&mono, self.channels());

        let ring = HeapRb::<f32>::new(frames.len().max(1));
        let (mut producer, mut consumer) = ring.split();
        producer.push_slice(&frames);

        // Carries the length of the callback buffer that emptied the ring
        let (done_tx, done_rx) = crossbeam::channel::bounded::<usize>(1);

        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    *sample = consumer.try_pop().unwrap_or(0.0);
                }
                if consumer.is_empty() {
                    let _ = done_tx.try_send(data.len());
                }
            },
            |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        log::info!(
            "Playing {:.2} s at {} Hz (gain {})",
            waveform.duration(),
            self.sample_rate(),
            gain
        );

        let timeout = Duration::from_secs_f64(waveform.duration()) + DRAIN_MARGIN;
        match done_rx.recv_timeout(timeout) {
            // The last buffer has been handed over but not played yet
            Ok(last_buffer) => std::thread::sleep(buffer_period(
                last_buffer,
                self.channels(),
                self.sample_rate(),
            )),
            Err(_) => log::warn!("Playback did not finish within {:?}", timeout),
        }

        stream.pause()?;
        log::info!("Audio output stopped");
        Ok(())
    }
}
