pub mod capture;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
#[cfg(feature = "picoscope")]
pub mod picoscope;
pub mod sim;
pub mod status;

pub use capture::{DigitalCapture, DIGITAL_LINES};
pub use device::{find_units, Scope};
pub use driver::{DigitalPort, ScopeDriver};
pub use error::DeviceError;
#[cfg(feature = "picoscope")]
pub use picoscope::PicoScopeDriver;
pub use sim::{SimConfig, SimulatedDriver};
pub use status::PicoStatus;
