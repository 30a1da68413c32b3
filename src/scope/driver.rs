//! Low-level instrument interface
//!
//! One trait method per SDK call, so the acquisition sequence in `device.rs` can run
//! against real hardware or the simulator alike. Implementations translate SDK status
//! codes into `DeviceError` before returning.

use super::DeviceError;

/// Unit handle returned by `open_unit`
pub type Handle = i16;

/// Analog input channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
    C,
    D,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::A, Channel::B, Channel::C, Channel::D];

    #[cfg(any(feature = "picoscope", test))]
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Analog input coupling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coupling {
    Ac = 0,
    Dc = 1,
}

/// Analog input range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageRange {
    Mv10 = 0,
    Mv20,
    Mv50,
    Mv100,
    Mv200,
    Mv500,
    V1,
    V2,
    V5,
    V10,
    V20,
    V50,
}

impl VoltageRange {
    #[cfg(any(feature = "picoscope", test))]
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Mixed-signal digital port, eight lines each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitalPort {
    Port0 = 0x80,
    Port1 = 0x81,
}

impl DigitalPort {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn index(self) -> usize {
        (self.code() - DigitalPort::Port0.code()) as usize
    }
}

impl std::fmt::Display for DigitalPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PORT{}", self.index())
    }
}

/// Result of a timebase query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimebaseInfo {
    /// Realized sampling interval in nanoseconds
    pub interval_ns: f32,
    /// Samples available per channel at this timebase
    pub max_samples: i32,
}

/// Values read back from one digital port
#[derive(Debug, Clone, PartialEq)]
pub struct PortBlock {
    pub values: Vec<i16>,
    /// Overvoltage flags, zero when no channel overflowed
    pub overflow: i16,
}

/// Calls the acquisition sequence needs from an instrument
pub trait ScopeDriver {
    /// Serial numbers of connected units
    fn enumerate_units(&mut self) -> Result<Vec<String>, DeviceError>;

    fn open_unit(&mut self) -> Result<Handle, DeviceError>;

    fn close_unit(&mut self, handle: Handle) -> Result<(), DeviceError>;

    fn stop(&mut self, handle: Handle) -> Result<(), DeviceError>;

    fn set_channel(
        &mut self,
        handle: Handle,
        channel: Channel,
        enabled: bool,
        coupling: Coupling,
        range: VoltageRange,
        offset_v: f32,
    ) -> Result<(), DeviceError>;

    /// Enable a digital port; `logic_level` is in ADC counts, +/-32767 = +/-5 V
    fn set_digital_port(
        &mut self,
        handle: Handle,
        port: DigitalPort,
        enabled: bool,
        logic_level: i16,
    ) -> Result<(), DeviceError>;

    /// Split capture memory into `segments`; returns samples per segment
    fn memory_segments(&mut self, handle: Handle, segments: u32) -> Result<i32, DeviceError>;

    fn max_segments(&mut self, handle: Handle) -> Result<u32, DeviceError>;

    fn get_timebase(
        &mut self,
        handle: Handle,
        timebase: u32,
        samples: i32,
        segment: u32,
    ) -> Result<TimebaseInfo, DeviceError>;

    /// Start a block capture; returns the time the unit will be busy in ms
    fn run_block(
        &mut self,
        handle: Handle,
        pre_trigger: i32,
        post_trigger: i32,
        timebase: u32,
        segment: u32,
    ) -> Result<i32, DeviceError>;

    fn is_ready(&mut self, handle: Handle) -> Result<bool, DeviceError>;

    /// Register a buffer for `port` and copy the captured values into it
    fn get_digital_values(
        &mut self,
        handle: Handle,
        port: DigitalPort,
        samples: u32,
        segment: u32,
    ) -> Result<PortBlock, DeviceError>;
}
