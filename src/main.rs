// Module declarations
mod audio;
mod dsp;
mod recorder;
mod scope;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use dsp::{dominant_frequency, rms_dbfs, DecodeReport, PdmDecoder, Waveform};
use scope::{DigitalCapture, Scope, ScopeDriver, SimulatedDriver};
use std::thread;
use std::time::Duration;
use types::{AppConfig, Cli, Source};

fn main() {
    // Initialize logging, RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("pdm-scope v{} starting...", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        log::error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.to_config()?;
    config.validate()?;

    // Design the filter before touching the instrument so bad settings fail fast
    let decoder = PdmDecoder::new(config.decoder.clone())?;

    let source = cli.source();
    if cli.list {
        return list_units(&source);
    }

    let capture = match &source {
        Source::File(path) => recorder::load_capture(path, config.scope.sample_rate)
            .with_context(|| format!("Failed to load capture {}", path.display()))?,
        Source::Simulated(sim) => {
            record(SimulatedDriver::new(sim.clone()), &config, cli.countdown()?)?
        }
        Source::Hardware => record_hardware(&config, cli.countdown()?)?,
    };

    // A file input is already on disk
    if config.output.save && !matches!(source, Source::File(_)) {
        recorder::save_capture(&config.output.results_dir, &capture).with_context(|| {
            format!(
                "Failed to save raw capture in {}",
                config.output.results_dir.display()
            )
        })?;
    }

    let (waveform, report) = decoder.decode_capture(&capture)?;
    summarize(&waveform, &report);

    if config.audio.play {
        if let Err(e) = audio::play(&waveform, config.audio.gain) {
            log::warn!("Playback failed: {:#}", e);
        }
    }

    if config.output.save {
        recorder::save_waveform(&config.output.results_dir, &waveform).with_context(|| {
            format!(
                "Failed to save decoded audio in {}",
                config.output.results_dir.display()
            )
        })?;
    }

    log::info!("pdm-scope finished");
    Ok(())
}

/// Set up the instrument, count down and take one capture
fn record<D: ScopeDriver>(driver: D, config: &AppConfig, countdown: Duration) -> Result<DigitalCapture> {
    let mut scope = Scope::open(driver)?
        .configure_digital(&config.scope)?
        .configure_timebase(&config.scope)?;

    println!("\nPrepare for recording...\n");
    thread::sleep(countdown);
    println!("Go!");

    let capture = scope.acquire()?;
    scope.close()?;
    Ok(capture)
}

#[cfg(feature = "picoscope")]
fn record_hardware(config: &AppConfig, countdown: Duration) -> Result<DigitalCapture> {
    record(scope::PicoScopeDriver::new(), config, countdown)
}

#[cfg(not(feature = "picoscope"))]
fn record_hardware(_config: &AppConfig, _countdown: Duration) -> Result<DigitalCapture> {
    Err(scope::DeviceError::Unsupported(
        "built without PicoScope support; use --simulate or --input, or enable the `picoscope` feature"
            .to_string(),
    )
    .into())
}

fn list_units(source: &Source) -> Result<()> {
    let units = match source {
        Source::Simulated(sim) => scope::find_units(&mut SimulatedDriver::new(sim.clone()))?,
        Source::Hardware => list_hardware_units()?,
        Source::File(path) => anyhow::bail!("--list needs an instrument, not {}", path.display()),
    };
    for serial in units {
        println!("{}", serial);
    }
    Ok(())
}

#[cfg(feature = "picoscope")]
fn list_hardware_units() -> Result<Vec<String>> {
    Ok(scope::find_units(&mut scope::PicoScopeDriver::new())?)
}

#[cfg(not(feature = "picoscope"))]
fn list_hardware_units() -> Result<Vec<String>> {
    Err(scope::DeviceError::Unsupported(
        "built without PicoScope support; enable the `picoscope` feature".to_string(),
    )
    .into())
}

fn summarize(waveform: &Waveform, report: &DecodeReport) {
    log::info!(
        "Decoded {} samples ({:.2} s at {} Hz) from {} PDM bits, trimmed {}, DC offset {:.4}",
        waveform.len(),
        waveform.duration(),
        waveform.sample_rate,
        report.edges,
        report.trimmed,
        report.dc_offset
    );
    match dominant_frequency(&waveform.samples, waveform.sample_rate) {
        Some(freq) => log::info!(
            "Level {:.1} dBFS, dominant frequency {:.0} Hz",
            rms_dbfs(&waveform.samples),
            freq
        ),
        None => log::info!("Level {:.1} dBFS", rms_dbfs(&waveform.samples)),
    }
}
