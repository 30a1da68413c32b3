//! Raw capture and decoded waveform dumps
//!
//! Files land in the results directory as `raw_<timestamp>.npy` (the eight digital
//! lines, `|i1`, shape `(8, N)`) and `proc_<timestamp>.npy` (decoded audio, `<f8`).

pub mod npy;

use crate::dsp::{DecodeError, Waveform};
use crate::scope::{DigitalCapture, DIGITAL_LINES};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name timestamp layout
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed .npy data: {0}")]
    Format(String),

    #[error("invalid capture file: {0}")]
    Capture(#[from] DecodeError),
}

/// Local time formatted for file names
pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `dir/<prefix><timestamp>.<ext>`
pub fn timestamped_path(dir: &Path, prefix: &str, ext: &str) -> PathBuf {
    dir.join(format!("{}{}.{}", prefix, timestamp(), ext))
}

fn create(path: &Path) -> Result<BufWriter<File>, RecorderError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// Write all eight lines of a capture
pub fn write_capture(path: &Path, capture: &DigitalCapture) -> Result<(), RecorderError> {
    let mut writer = create(path)?;
    npy::write_i8_matrix(
        &mut writer,
        DIGITAL_LINES,
        capture.len(),
        &capture.to_line_major(),
    )?;
    writer.flush()?;
    Ok(())
}

/// Save a capture as `raw_<timestamp>.npy` under `dir`
pub fn save_capture(dir: &Path, capture: &DigitalCapture) -> Result<PathBuf, RecorderError> {
    let path = timestamped_path(dir, "raw_", "npy");
    write_capture(&path, capture)?;
    log::info!("Saved raw capture to {}", path.display());
    Ok(path)
}

/// Load a capture written by `save_capture`
///
/// The file holds no timing, so the sample rate has to be supplied.
pub fn load_capture(path: &Path, sample_rate: f64) -> Result<DigitalCapture, RecorderError> {
    let mut reader = BufReader::new(File::open(path)?);
    let (rows, cols, data) = npy::read_i8_matrix(&mut reader)?;
    let capture = DigitalCapture::from_line_major(&data, rows, cols, sample_rate)?;
    log::info!(
        "Loaded {} samples x {} lines from {}",
        cols,
        rows,
        path.display()
    );
    Ok(capture)
}

pub fn write_waveform(path: &Path, waveform: &Waveform) -> Result<(), RecorderError> {
    let mut writer = create(path)?;
    npy::write_f64(&mut writer, &waveform.samples)?;
    writer.flush()?;
    Ok(())
}

/// Save decoded audio as `proc_<timestamp>.npy` under `dir`
pub fn save_waveform(dir: &Path, waveform: &Waveform) -> Result<PathBuf, RecorderError> {
    let path = timestamped_path(dir, "proc_", "npy");
    write_waveform(&path, waveform)?;
    log::info!("Saved decoded audio to {}", path.display());
    Ok(path)
}

#[cfg(test)]
pub fn load_waveform(path: &Path, sample_rate: u32) -> Result<Waveform, RecorderError> {
    let mut reader = BufReader::new(File::open(path)?);
    let samples = npy::read_f64(&mut reader)?;
    Ok(Waveform::new(samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pdm-scope-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_timestamped_path() {
        let path = timestamped_path(Path::new("results"), "raw_", "npy");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("raw_"));
        assert!(name.ends_with(".npy"));
        // raw_ + YYYY-mm-dd_HH-MM-SS + .npy
        assert_eq!(name.len(), 4 + 19 + 4);
        assert_eq!(path.parent(), Some(Path::new("results")));
    }

    #[test]
    fn test_capture_file_keeps_lines() {
        let dir = scratch_dir("capture");
        let capture = DigitalCapture::from_words(vec![0b01, 0b10, 0b11, 0b1000_0000], 25e6);

        let path = save_capture(&dir, &capture).unwrap();
        assert!(path.starts_with(&dir));
        let loaded = load_capture(&path, 25e6).unwrap();
        assert_eq!(loaded, capture);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_waveform_file() {
        let dir = scratch_dir("waveform");
        let waveform = Waveform::new(vec![0.25, -0.5, 1e-9], 48_000);

        let path = save_waveform(&dir, &waveform).unwrap();
        let loaded = load_waveform(&path, 48_000).unwrap();
        assert_eq!(loaded, waveform);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_capture(Path::new("/nonexistent/raw.npy"), 25e6).unwrap_err();
        assert!(matches!(err, RecorderError::Io(_)));
    }
}
