/// PicoScope status codes returned by every SDK call
///
/// `Unknown` keeps codes outside the table so nothing is lost in error reports.
macro_rules! pico_status {
    ($($variant:ident = $code:literal => $name:literal,)*) => {
        // Most codes only ever come back from hardware
        #[cfg_attr(not(feature = "picoscope"), allow(dead_code))]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum PicoStatus {
            $($variant,)*
            Unknown(u32),
        }

        impl PicoStatus {
            #[cfg(any(feature = "picoscope", test))]
            pub fn from_code(code: u32) -> Self {
                match code {
                    $($code => PicoStatus::$variant,)*
                    other => PicoStatus::Unknown(other),
                }
            }

            pub fn code(&self) -> u32 {
                match self {
                    $(PicoStatus::$variant => $code,)*
                    PicoStatus::Unknown(code) => *code,
                }
            }

            /// SDK name of the status, `UNKNOWN_ERROR` for codes outside the table
            pub fn name(&self) -> &'static str {
                match self {
                    $(PicoStatus::$variant => $name,)*
                    PicoStatus::Unknown(_) => "UNKNOWN_ERROR",
                }
            }
        }
    };
}

pico_status! {
    Ok = 0x00 => "PICO_OK",
    MaxUnitsOpened = 0x01 => "PICO_MAX_UNITS_OPENED",
    MemoryFail = 0x02 => "PICO_MEMORY_FAIL",
    NotFound = 0x03 => "PICO_NOT_FOUND",
    FwFail = 0x04 => "PICO_FW_FAIL",
    OpenOperationInProgress = 0x05 => "PICO_OPEN_OPERATION_IN_PROGRESS",
    OperationFailed = 0x06 => "PICO_OPERATION_FAILED",
    NotResponding = 0x07 => "PICO_NOT_RESPONDING",
    ConfigFail = 0x08 => "PICO_CONFIG_FAIL",
    KernelDriverTooOld = 0x09 => "PICO_KERNEL_DRIVER_TOO_OLD",
    EepromCorrupt = 0x0A => "PICO_EEPROM_CORRUPT",
    OsNotSupported = 0x0B => "PICO_OS_NOT_SUPPORTED",
    InvalidHandle = 0x0C => "PICO_INVALID_HANDLE",
    InvalidParameter = 0x0D => "PICO_INVALID_PARAMETER",
    InvalidTimebase = 0x0E => "PICO_INVALID_TIMEBASE",
    InvalidVoltageRange = 0x0F => "PICO_INVALID_VOLTAGE_RANGE",
    InvalidChannel = 0x10 => "PICO_INVALID_CHANNEL",
    InvalidTriggerChannel = 0x11 => "PICO_INVALID_TRIGGER_CHANNEL",
    InvalidConditionChannel = 0x12 => "PICO_INVALID_CONDITION_CHANNEL",
    NoSignalGenerator = 0x13 => "PICO_NO_SIGNAL_GENERATOR",
    StreamingFailed = 0x14 => "PICO_STREAMING_FAILED",
    BlockModeFailed = 0x15 => "PICO_BLOCK_MODE_FAILED",
    NullParameter = 0x16 => "PICO_NULL_PARAMETER",
    EtsModeSet = 0x17 => "PICO_ETS_MODE_SET",
    DataNotAvailable = 0x18 => "PICO_DATA_NOT_AVAILABLE",
    StringBufferTooSmall = 0x19 => "PICO_STRING_BUFFER_TO_SMALL",
    EtsNotSupported = 0x1A => "PICO_ETS_NOT_SUPPORTED",
    AutoTriggerTimeTooShort = 0x1B => "PICO_AUTO_TRIGGER_TIME_TO_SHORT",
    BufferStall = 0x1C => "PICO_BUFFER_STALL",
    TooManySamples = 0x1D => "PICO_TOO_MANY_SAMPLES",
    TooManySegments = 0x1E => "PICO_TOO_MANY_SEGMENTS",
    PulseWidthQualifier = 0x1F => "PICO_PULSE_WIDTH_QUALIFIER",
    Delay = 0x20 => "PICO_DELAY",
    SourceDetails = 0x21 => "PICO_SOURCE_DETAILS",
    Conditions = 0x22 => "PICO_CONDITIONS",
    UserCallback = 0x23 => "PICO_USER_CALLBACK",
    DeviceSampling = 0x24 => "PICO_DEVICE_SAMPLING",
    NoSamplesAvailable = 0x25 => "PICO_NO_SAMPLES_AVAILABLE",
    SegmentOutOfRange = 0x26 => "PICO_SEGMENT_OUT_OF_RANGE",
    Busy = 0x27 => "PICO_BUSY",
    StartIndexInvalid = 0x28 => "PICO_STARTINDEX_INVALID",
    InvalidInfo = 0x29 => "PICO_INVALID_INFO",
    InfoUnavailable = 0x2A => "PICO_INFO_UNAVAILABLE",
    InvalidSampleInterval = 0x2B => "PICO_INVALID_SAMPLE_INTERVAL",
    PowerSupplyNotConnected = 0x119 => "PICO_POWER_SUPPLY_NOT_CONNECTED",
    PowerSupplyConnected = 0x11A => "PICO_POWER_SUPPLY_CONNECTED",
    Usb3DeviceNonUsb3Port = 0x11E => "PICO_USB3_0_DEVICE_NON_USB3_0_PORT",
}

impl PicoStatus {
    #[cfg(any(feature = "picoscope", test))]
    pub fn is_ok(&self) -> bool {
        *self == PicoStatus::Ok
    }
}

impl std::fmt::Display for PicoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {:#04x}", self.name(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(PicoStatus::from_code(0), PicoStatus::Ok);
        assert!(PicoStatus::from_code(0).is_ok());
        assert_eq!(PicoStatus::from_code(0x0E), PicoStatus::InvalidTimebase);
        assert_eq!(PicoStatus::InvalidTimebase.code(), 0x0E);
        assert_eq!(
            PicoStatus::from_code(0x11A),
            PicoStatus::PowerSupplyConnected
        );
    }

    #[test]
    fn test_unknown_code_round_trips() {
        let status = PicoStatus::from_code(0x4242);
        assert_eq!(status, PicoStatus::Unknown(0x4242));
        assert_eq!(status.code(), 0x4242);
        assert_eq!(status.name(), "UNKNOWN_ERROR");
    }

    #[test]
    fn test_display_matches_sdk_names() {
        assert_eq!(
            PicoStatus::InvalidParameter.to_string(),
            "PICO_INVALID_PARAMETER, 0x0d"
        );
        assert_eq!(PicoStatus::Unknown(7777).to_string(), "UNKNOWN_ERROR, 0x1e61");
    }
}
