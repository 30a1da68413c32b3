pub mod error;
pub mod fft;
pub mod filters;
pub mod pdm;
pub mod resampler;

// Re-export commonly used types
pub use error::{DecodeError, ErrorKind};
pub use fft::{dominant_frequency, rms_dbfs};
pub use pdm::{DecodeReport, PdmDecoder, Waveform};
