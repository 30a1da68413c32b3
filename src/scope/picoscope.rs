//! PicoScope 3000A driver over the vendor `ps3000a` shared library
use super::driver::{
    Channel, Coupling, DigitalPort, Handle, PortBlock, ScopeDriver, TimebaseInfo, VoltageRange,
};
use super::error::check;
use super::DeviceError;
use libc::{c_char, c_void};
use std::ptr;

type PicoStatusCode = u32;

/// `PS3000A_RATIO_MODE_NONE`
const RATIO_MODE_NONE: i32 = 0;

#[link(name = "ps3000a")]
extern "C" {
    fn ps3000aOpenUnit(handle: *mut i16, serial: *mut c_char) -> PicoStatusCode;
    fn ps3000aCloseUnit(handle: i16) -> PicoStatusCode;
    fn ps3000aStop(handle: i16) -> PicoStatusCode;
    fn ps3000aEnumerateUnits(
        count: *mut i16,
        serials: *mut c_char,
        serial_length: *mut i16,
    ) -> PicoStatusCode;
    fn ps3000aSetChannel(
        handle: i16,
        channel: i32,
        enabled: i16,
        coupling: i32,
        range: i32,
        analog_offset: f32,
    ) -> PicoStatusCode;
    fn ps3000aSetDigitalPort(
        handle: i16,
        port: i32,
        enabled: i16,
        logic_level: i16,
    ) -> PicoStatusCode;
    fn ps3000aMemorySegments(
        handle: i16,
        segments: u32,
        max_samples: *mut i32,
    ) -> PicoStatusCode;
    fn ps3000aGetMaxSegments(handle: i16, max_segments: *mut u32) -> PicoStatusCode;
    fn ps3000aGetTimebase2(
        handle: i16,
        timebase: u32,
        samples: i32,
        interval_ns: *mut f32,
        oversample: i16,
        max_samples: *mut i32,
        segment: u32,
    ) -> PicoStatusCode;
    fn ps3000aRunBlock(
        handle: i16,
        pre_trigger: i32,
        post_trigger: i32,
        timebase: u32,
        oversample: i16,
        time_indisposed_ms: *mut i32,
        segment: u32,
        ready: Option<extern "C" fn(i16, PicoStatusCode, *mut c_void)>,
        parameter: *mut c_void,
    ) -> PicoStatusCode;
    fn ps3000aIsReady(handle: i16, ready: *mut i16) -> PicoStatusCode;
    fn ps3000aSetDataBuffer(
        handle: i16,
        source: i32,
        buffer: *mut i16,
        length: i32,
        segment: u32,
        ratio_mode: i32,
    ) -> PicoStatusCode;
    fn ps3000aGetValues(
        handle: i16,
        start: u32,
        samples: *mut u32,
        ratio: u32,
        ratio_mode: i32,
        segment: u32,
        overflow: *mut i16,
    ) -> PicoStatusCode;
}

/// Real hardware through `libps3000a`
#[derive(Debug, Default)]
pub struct PicoScopeDriver {
    _private: (),
}

impl PicoScopeDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScopeDriver for PicoScopeDriver {
    fn enumerate_units(&mut self) -> Result<Vec<String>, DeviceError> {
        let mut count: i16 = 0;
        let mut serials = vec![0 as c_char; 512];
        let mut length = serials.len() as i16;
        check("ps3000aEnumerateUnits", unsafe {
            ps3000aEnumerateUnits(&mut count, serials.as_mut_ptr(), &mut length)
        })?;

        let bytes: Vec<u8> = serials[..(length.max(0) as usize).min(serials.len())]
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        let list = String::from_utf8_lossy(&bytes);
        Ok(list
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn open_unit(&mut self) -> Result<Handle, DeviceError> {
        let mut handle: i16 = 0;
        let status = unsafe { ps3000aOpenUnit(&mut handle, ptr::null_mut()) };
        check("ps3000aOpenUnit", status)?;
        Ok(handle)
    }

    fn close_unit(&mut self, handle: Handle) -> Result<(), DeviceError> {
        check("ps3000aCloseUnit", unsafe { ps3000aCloseUnit(handle) })
    }

    fn stop(&mut self, handle: Handle) -> Result<(), DeviceError> {
        check("ps3000aStop", unsafe { ps3000aStop(handle) })
    }

    fn set_channel(
        &mut self,
        handle: Handle,
        channel: Channel,
        enabled: bool,
        coupling: Coupling,
        range: VoltageRange,
        offset_v: f32,
    ) -> Result<(), DeviceError> {
        check("ps3000aSetChannel", unsafe {
            ps3000aSetChannel(
                handle,
                channel.code(),
                enabled as i16,
                coupling as i32,
                range.code(),
                offset_v,
            )
        })
    }

    fn set_digital_port(
        &mut self,
        handle: Handle,
        port: DigitalPort,
        enabled: bool,
        logic_level: i16,
    ) -> Result<(), DeviceError> {
        check("ps3000aSetDigitalPort", unsafe {
            ps3000aSetDigitalPort(handle, port.code(), enabled as i16, logic_level)
        })
    }

    fn memory_segments(&mut self, handle: Handle, segments: u32) -> Result<i32, DeviceError> {
        let mut samples: i32 = 0;
        check("ps3000aMemorySegments", unsafe {
            ps3000aMemorySegments(handle, segments, &mut samples)
        })?;
        Ok(samples)
    }

    fn max_segments(&mut self, handle: Handle) -> Result<u32, DeviceError> {
        let mut segments: u32 = 0;
        check("ps3000aGetMaxSegments", unsafe {
            ps3000aGetMaxSegments(handle, &mut segments)
        })?;
        Ok(segments)
    }

    fn get_timebase(
        &mut self,
        handle: Handle,
        timebase: u32,
        samples: i32,
        segment: u32,
    ) -> Result<TimebaseInfo, DeviceError> {
        let mut interval_ns: f32 = 0.0;
        let mut max_samples: i32 = 0;
        check("ps3000aGetTimebase2", unsafe {
            ps3000aGetTimebase2(
                handle,
                timebase,
                samples,
                &mut interval_ns,
                0,
                &mut max_samples,
                segment,
            )
        })?;
        Ok(TimebaseInfo {
            interval_ns,
            max_samples,
        })
    }

    fn run_block(
        &mut self,
        handle: Handle,
        pre_trigger: i32,
        post_trigger: i32,
        timebase: u32,
        segment: u32,
    ) -> Result<i32, DeviceError> {
        let mut busy_ms: i32 = 0;
        check("ps3000aRunBlock", unsafe {
            ps3000aRunBlock(
                handle,
                pre_trigger,
                post_trigger,
                timebase,
                0,
                &mut busy_ms,
                segment,
                None,
                ptr::null_mut(),
            )
        })?;
        Ok(busy_ms)
    }

    fn is_ready(&mut self, handle: Handle) -> Result<bool, DeviceError> {
        let mut ready: i16 = 0;
        check("ps3000aIsReady", unsafe { ps3000aIsReady(handle, &mut ready) })?;
        Ok(ready != 0)
    }

    fn get_digital_values(
        &mut self,
        handle: Handle,
        port: DigitalPort,
        samples: u32,
        segment: u32,
    ) -> Result<PortBlock, DeviceError> {
        let mut values = vec![0i16; samples as usize];
        let length = i32::try_from(values.len())
            .map_err(|_| DeviceError::InvalidConfig(format!("{} samples", samples)))?;

        check("ps3000aSetDataBuffer", unsafe {
            ps3000aSetDataBuffer(
                handle,
                port.code(),
                values.as_mut_ptr(),
                length,
                segment,
                RATIO_MODE_NONE,
            )
        })?;

        let mut returned = samples;
        let mut overflow: i16 = 0;
        let status = unsafe {
            ps3000aGetValues(
                handle,
                0,
                &mut returned,
                1,
                RATIO_MODE_NONE,
                segment,
                &mut overflow,
            )
        };

        // Unregister the buffer before it can move or drop
        let released = unsafe {
            ps3000aSetDataBuffer(
                handle,
                port.code(),
                ptr::null_mut(),
                0,
                segment,
                RATIO_MODE_NONE,
            )
        };
        check("ps3000aGetValues", status)?;
        check("ps3000aSetDataBuffer", released)?;

        values.truncate(returned as usize);
        Ok(PortBlock { values, overflow })
    }
}
