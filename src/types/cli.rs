use super::config::{AppConfig, TrimPolicy};
use crate::scope::config::defaults;
use crate::scope::SimConfig;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Record a PDM microphone with a PicoScope logic analyzer and turn it into audio
#[derive(Parser, Debug, Clone)]
#[command(name = "pdm-scope", version)]
pub struct Cli {
    /// Use the built-in simulated scope and microphone instead of hardware
    #[arg(long, conflicts_with = "input")]
    pub simulate: bool,

    /// Decode a raw capture saved by an earlier run instead of recording
    #[arg(long, value_name = "RAW_NPY")]
    pub input: Option<PathBuf>,

    /// List connected oscilloscopes and exit
    #[arg(long)]
    pub list: bool,

    /// Directory for raw and processed dumps
    #[arg(long, default_value = "results", value_name = "DIR")]
    pub results_dir: PathBuf,

    /// Do not write .npy dumps
    #[arg(long)]
    pub no_save: bool,

    /// Do not play the decoded audio
    #[arg(long)]
    pub no_play: bool,

    /// Record length in seconds
    #[arg(long, default_value_t = defaults::DURATION_S)]
    pub duration: f64,

    /// Digital sample rate in Hz (also the rate assumed for --input files)
    #[arg(long, default_value_t = defaults::SAMPLE_RATE)]
    pub sample_rate: f64,

    /// Microphone supply voltage; the logic threshold is half of it
    #[arg(long, default_value_t = defaults::SUPPLY_V)]
    pub supply_voltage: f32,

    /// Digital line carrying the PDM clock
    #[arg(long, default_value_t = 0)]
    pub clk_line: usize,

    /// Digital line carrying the PDM data
    #[arg(long, default_value_t = 1)]
    pub dat_line: usize,

    /// PDM clock in Hz
    #[arg(long, default_value_t = 3_072_000)]
    pub pdm_clock: u32,

    /// PDM clock to audio rate ratio
    #[arg(long, default_value_t = 64)]
    pub decimation: usize,

    /// Expected audio rate in Hz
    #[arg(long, default_value_t = 48_000)]
    pub audio_rate: u32,

    /// Low-pass cutoff in Hz
    #[arg(long, default_value_t = 10e3)]
    pub cutoff: f64,

    /// Low-pass filter order
    #[arg(long, default_value_t = 8)]
    pub order: usize,

    /// Output samples to drop after filtering (default: derived from the filter)
    #[arg(long)]
    pub trim: Option<usize>,

    /// Playback gain
    #[arg(long, default_value_t = 20.0)]
    pub gain: f32,

    /// Seconds between "Prepare for recording" and the capture
    #[arg(long, default_value_t = 2.0)]
    pub countdown: f64,

    /// Tone frequency of the simulated microphone in Hz
    #[arg(long, default_value_t = 1_000.0)]
    pub tone: f64,
}

/// Where the digital capture comes from
#[derive(Debug, Clone)]
pub enum Source {
    /// PicoScope hardware
    Hardware,
    /// Simulated scope with a PDM microphone model
    Simulated(SimConfig),
    /// Raw capture file from an earlier run
    File(PathBuf),
}

impl Cli {
    /// Build the application configuration on top of the defaults
    pub fn to_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::default();

        let logic_level_v = self.supply_voltage * 0.5;
        for port in config.scope.ports.iter_mut() {
            port.logic_level_v = logic_level_v;
        }
        config.scope.sample_rate = self.sample_rate;
        config.scope.duration_s = self.duration;

        // Captures of several seconds take longer than the default wait
        let busy = seconds("--duration", self.duration)?;
        let wait = busy
            .checked_mul(2)
            .ok_or_else(|| anyhow::anyhow!("--duration {} is too long", self.duration))?;
        config.scope.ready_timeout = config.scope.ready_timeout.max(wait);

        config.decoder.clk_line = self.clk_line;
        config.decoder.dat_line = self.dat_line;
        config.decoder.pdm_clock_hz = self.pdm_clock;
        config.decoder.decimation = self.decimation;
        config.decoder.audio_rate_hz = self.audio_rate;
        config.decoder.cutoff_hz = self.cutoff;
        config.decoder.filter_order = self.order;
        config.decoder.trim = match self.trim {
            Some(n) => TrimPolicy::Fixed(n),
            None => TrimPolicy::Auto,
        };

        config.output.results_dir = self.results_dir.clone();
        config.output.save = !self.no_save;
        config.audio.play = !self.no_play;
        config.audio.gain = self.gain;

        Ok(config)
    }

    pub fn source(&self) -> Source {
        if let Some(path) = &self.input {
            Source::File(path.clone())
        } else if self.simulate {
            Source::Simulated(SimConfig {
                pdm_clock_hz: f64::from(self.pdm_clock),
                tone_hz: self.tone,
                clk_line: self.clk_line,
                dat_line: self.dat_line,
                ..SimConfig::default()
            })
        } else {
            Source::Hardware
        }
    }

    pub fn countdown(&self) -> Result<Duration> {
        seconds("--countdown", self.countdown)
    }
}

/// Seconds given on the command line; negative values count as zero
fn seconds(flag: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value.max(0.0))
        .map_err(|e| anyhow::anyhow!("{} {} is not a usable number of seconds: {}", flag, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_lab_setup() {
        let cli = Cli::parse_from(["pdm-scope"]);
        let config = cli.to_config().unwrap();

        assert_eq!(config.scope.sample_rate, 25e6);
        assert_eq!(config.scope.duration_s, 2.0);
        assert!(config.scope.ports.iter().all(|p| (p.logic_level_v - 0.9).abs() < 1e-6));
        assert_eq!(config.decoder, crate::types::DecoderConfig::default());
        assert_eq!(config.audio.gain, 20.0);
        assert!(config.output.save);
        assert!(matches!(cli.source(), Source::Hardware));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "pdm-scope",
            "--simulate",
            "--tone",
            "440",
            "--duration",
            "0.5",
            "--trim",
            "500",
            "--no-save",
            "--no-play",
            "--dat-line",
            "3",
        ]);
        let config = cli.to_config().unwrap();

        assert_eq!(config.decoder.trim, TrimPolicy::Fixed(500));
        assert_eq!(config.decoder.dat_line, 3);
        assert!(!config.output.save);
        assert!(!config.audio.play);
        match cli.source() {
            Source::Simulated(sim) => {
                assert_eq!(sim.tone_hz, 440.0);
                assert_eq!(sim.dat_line, 3);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_input_conflicts_with_simulate() {
        assert!(Cli::try_parse_from(["pdm-scope", "--simulate", "--input", "raw.npy"]).is_err());

        let cli = Cli::parse_from(["pdm-scope", "--input", "raw.npy"]);
        assert!(matches!(cli.source(), Source::File(_)));
    }

    #[test]
    fn test_long_capture_extends_ready_timeout() {
        let cli = Cli::parse_from(["pdm-scope", "--duration", "10"]);
        assert_eq!(cli.to_config().unwrap().scope.ready_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_unrepresentable_times_rejected() {
        let cli = Cli::parse_from(["pdm-scope", "--duration", "inf"]);
        assert!(cli.to_config().is_err());

        let cli = Cli::parse_from(["pdm-scope", "--duration", "1e19"]);
        assert!(cli.to_config().is_err());

        let cli = Cli::parse_from(["pdm-scope", "--countdown", "inf"]);
        assert!(cli.countdown().is_err());

        let cli = Cli::parse_from(["pdm-scope", "--countdown=-3"]);
        assert_eq!(cli.countdown().unwrap(), Duration::ZERO);
    }
}
