use super::status::PicoStatus;
use std::time::Duration;
use thiserror::Error;

/// Errors raised at the instrument boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("{call} failed: {status}")]
    Status {
        call: &'static str,
        status: PicoStatus,
    },

    #[error("block capture not ready after {0:?}")]
    Timeout(Duration),

    #[error("invalid acquisition setting: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Unsupported(String),
}

impl DeviceError {
    /// Status code of a failed SDK call, if that is what this is
    #[cfg(test)]
    pub fn status(&self) -> Option<PicoStatus> {
        match self {
            DeviceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Turn an SDK return code into a result
#[cfg(any(feature = "picoscope", test))]
pub fn check(call: &'static str, code: u32) -> Result<(), DeviceError> {
    let status = PicoStatus::from_code(code);
    if status.is_ok() {
        Ok(())
    } else {
        log::error!("{} returned {}", call, status);
        Err(DeviceError::Status { call, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check() {
        assert!(check("ps3000aStop", 0).is_ok());

        let err = check("ps3000aGetTimebase2", 0x0E).unwrap_err();
        assert_eq!(err.status(), Some(PicoStatus::InvalidTimebase));
        assert_eq!(
            err.to_string(),
            "ps3000aGetTimebase2 failed: PICO_INVALID_TIMEBASE, 0x0e"
        );
    }

    #[test]
    fn test_non_status_errors() {
        let err = DeviceError::Timeout(Duration::from_secs(5));
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("5s"));
    }
}
