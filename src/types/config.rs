use crate::dsp::DecodeError;
use crate::scope::config::defaults;
use crate::scope::{DigitalPort, DIGITAL_LINES};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub scope: ScopeConfig,
    pub decoder: DecoderConfig,
    pub output: OutputConfig,
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Validate everything that can be checked before touching hardware
    pub fn validate(&self) -> anyhow::Result<()> {
        self.scope.validate()?;
        self.decoder.validate()?;
        if self.audio.gain <= 0.0 || !self.audio.gain.is_finite() {
            anyhow::bail!("Playback gain {} must be a positive number", self.audio.gain);
        }
        Ok(())
    }
}

/// Setting for one digital port of the instrument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortSetting {
    pub port: DigitalPort,
    pub enabled: bool,
    /// Logic threshold in volts
    pub logic_level_v: f32,
}

/// Instrument acquisition configuration
#[derive(Debug, Clone)]
pub struct ScopeConfig {
    /// Digital ports to configure
    pub ports: Vec<PortSetting>,
    /// Turn off every analog channel (frees up faster timebases)
    pub disable_analog: bool,
    /// Requested sample rate in Hz
    pub sample_rate: f64,
    /// Record length in seconds
    pub duration_s: f64,
    /// How long to wait for a block capture to complete
    pub ready_timeout: Duration,
    /// Interval between ready polls
    pub poll_interval: Duration,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        let logic_level_v = defaults::SUPPLY_V * 0.5;
        Self {
            ports: vec![
                PortSetting {
                    port: DigitalPort::Port0,
                    enabled: true,
                    logic_level_v,
                },
                PortSetting {
                    port: DigitalPort::Port1,
                    enabled: true,
                    logic_level_v,
                },
            ],
            disable_analog: true,
            sample_rate: defaults::SAMPLE_RATE,
            duration_s: defaults::DURATION_S,
            ready_timeout: Duration::from_millis(defaults::READY_TIMEOUT_MS),
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
        }
    }
}

impl ScopeConfig {
    /// Number of enabled digital ports
    pub fn enabled_ports(&self) -> usize {
        self.ports.iter().filter(|p| p.enabled).count()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.enabled_ports() == 0 {
            anyhow::bail!("At least one digital port must be enabled");
        }
        if !self
            .ports
            .iter()
            .any(|p| p.enabled && p.port == DigitalPort::Port0)
        {
            anyhow::bail!("Digital port 0 carries the microphone lines and must be enabled");
        }
        if !(self.duration_s > 0.0) {
            anyhow::bail!("Record duration {} s must be positive", self.duration_s);
        }
        crate::scope::config::validate_sample_rate(self.sample_rate)?;
        if self.poll_interval.is_zero() {
            anyhow::bail!("Ready poll interval must be non-zero");
        }
        Ok(())
    }
}

/// How many leading output samples to discard after filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimPolicy {
    /// Derive from the designed filter's step-response settling time
    Auto,
    /// Fixed count of output samples
    Fixed(usize),
}

impl Default for TrimPolicy {
    fn default() -> Self {
        TrimPolicy::Auto
    }
}

/// PDM decoding configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    /// Digital line carrying the PDM clock
    pub clk_line: usize,
    /// Digital line carrying the PDM data
    pub dat_line: usize,
    /// PDM bit clock in Hz
    pub pdm_clock_hz: u32,
    /// Ratio between PDM clock and audio rate
    pub decimation: usize,
    /// Expected audio sample rate in Hz
    pub audio_rate_hz: u32,
    /// Low-pass cutoff in Hz
    pub cutoff_hz: f64,
    /// Low-pass order
    pub filter_order: usize,
    pub trim: TrimPolicy,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            clk_line: 0,
            dat_line: 1,
            pdm_clock_hz: 3_072_000,
            decimation: 64,
            audio_rate_hz: 48_000,
            cutoff_hz: 10e3,
            filter_order: 8,
            trim: TrimPolicy::Auto,
        }
    }
}

impl DecoderConfig {
    /// Check line selection and rates without designing the filter
    pub fn validate(&self) -> Result<(), DecodeError> {
        for line in [self.clk_line, self.dat_line] {
            if line >= DIGITAL_LINES {
                return Err(DecodeError::LineOutOfRange {
                    line,
                    available: DIGITAL_LINES,
                });
            }
        }
        crate::dsp::pdm::check_rates(self.pdm_clock_hz, self.decimation, self.audio_rate_hz)
    }
}

/// Where and whether results are written
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Directory for raw and processed dumps
    pub results_dir: PathBuf,
    /// Write `.npy` dumps
    pub save: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            save: true,
        }
    }
}

/// Audio playback configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Play the decoded waveform
    pub play: bool,
    /// Linear gain applied before playback
    pub gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            play: true,
            gain: 20.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scope.enabled_ports(), 2);
        assert_eq!(config.decoder.trim, TrimPolicy::Auto);
    }

    #[test]
    fn test_decoder_line_out_of_range() {
        let config = DecoderConfig {
            dat_line: 8,
            ..DecoderConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(DecodeError::LineOutOfRange {
                line: 8,
                available: 8
            })
        );
    }

    #[test]
    fn test_scope_config_rejections() {
        let mut config = ScopeConfig::default();
        config.duration_s = 0.0;
        assert!(config.validate().is_err());

        let mut config = ScopeConfig::default();
        for port in config.ports.iter_mut() {
            port.enabled = false;
        }
        assert!(config.validate().is_err());

        let mut config = ScopeConfig::default();
        config.ports[0].enabled = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gain_must_be_positive() {
        let mut config = AppConfig::default();
        config.audio.gain = 0.0;
        assert!(config.validate().is_err());
    }
}
