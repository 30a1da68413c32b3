//! In-process stand-in for a mixed-signal oscilloscope with a PDM microphone attached
//!
//! The clock line is a square wave at the PDM clock. The data line carries a
//! second-order delta-sigma encoding of a sine tone and changes on the falling clock
//! edge, the way a PDM microphone drives it, so it is stable around every rising edge.

use super::config::constraints;
use super::driver::{
    Channel, Coupling, DigitalPort, Handle, PortBlock, ScopeDriver, TimebaseInfo, VoltageRange,
};
use super::{DeviceError, PicoStatus, DIGITAL_LINES};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// What the simulated microphone and instrument look like
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// PDM bit clock in Hz
    pub pdm_clock_hz: f64,
    /// Frequency of the encoded tone in Hz
    pub tone_hz: f64,
    /// Tone amplitude relative to modulator full scale, keep below ~0.7
    pub amplitude: f64,
    /// Sample memory shared by all enabled ports
    pub memory_samples: i32,
    pub max_segments: u32,
    /// Ready polls answered with "busy" before a capture completes
    pub busy_polls: usize,
    pub clk_line: usize,
    pub dat_line: usize,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            pdm_clock_hz: 3.072e6,
            tone_hz: 1_000.0,
            amplitude: 0.5,
            memory_samples: 256_000_000,
            max_segments: 10_000,
            busy_polls: 1,
            clk_line: 0,
            dat_line: 1,
            seed: 0x5eed,
        }
    }
}

const SIM_HANDLE: Handle = 1;
const SIM_SERIAL: &str = "SIM00/0001";

/// Second-order delta-sigma modulator producing one bit per call
struct DeltaSigma {
    integrator1: f64,
    integrator2: f64,
    output: f64,
    rng: StdRng,
}

impl DeltaSigma {
    fn new(seed: u64) -> Self {
        Self {
            integrator1: 0.0,
            integrator2: 0.0,
            output: -1.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn step(&mut self, input: f64) -> u8 {
        self.integrator1 += input - self.output;
        self.integrator2 += self.integrator1 - self.output;
        let dither = self.rng.gen_range(-1e-3..1e-3);
        self.output = if self.integrator2 + dither >= 0.0 { 1.0 } else { -1.0 };
        (self.output > 0.0) as u8
    }
}

#[derive(Debug, Clone, Copy)]
struct Capture {
    samples: u32,
    interval_s: f64,
    polls_left: usize,
}

/// Driver backed by a synthetic signal instead of hardware
pub struct SimulatedDriver {
    config: SimConfig,
    handle: Option<Handle>,
    ports_enabled: [bool; 2],
    segments: u32,
    timebase: Option<(u32, f64)>,
    capture: Option<Capture>,
}

impl SimulatedDriver {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            handle: None,
            ports_enabled: [false; 2],
            segments: 1,
            timebase: None,
            capture: None,
        }
    }

    fn fail(call: &'static str, status: PicoStatus) -> DeviceError {
        log::error!("{} returned {}", call, status);
        DeviceError::Status { call, status }
    }

    fn check_handle(&self, call: &'static str, handle: Handle) -> Result<(), DeviceError> {
        match self.handle {
            Some(h) if h == handle => Ok(()),
            _ => Err(Self::fail(call, PicoStatus::InvalidHandle)),
        }
    }

    /// Samples per port that fit in one segment
    fn capacity(&self) -> i32 {
        let ports = self.ports_enabled.iter().filter(|&&e| e).count().max(1) as i32;
        self.config.memory_samples / self.segments as i32 / ports
    }

    /// Port 0 values for a capture of `samples` at `interval_s`
    fn synthesize(&self, samples: u32, interval_s: f64) -> Vec<i16> {
        let mut modulator = DeltaSigma::new(self.config.seed);
        let clock = self.config.pdm_clock_hz;
        let step = 2.0 * std::f64::consts::PI * self.config.tone_hz / clock;

        let mut bit = 0u8;
        let mut next_bit: i64 = 0;
        let mut values = Vec::with_capacity(samples as usize);

        for i in 0..samples {
            let cycles = f64::from(i) * interval_s * clock;
            let clk = (cycles.fract() < 0.5) as u8;

            // Data advances on each falling edge
            let falling_edges = (cycles - 0.5).floor() as i64 + 1;
            while next_bit < falling_edges {
                let input = self.config.amplitude * (step * next_bit as f64).sin();
                bit = modulator.step(input);
                next_bit += 1;
            }

            let word = (clk << self.config.clk_line) | (bit << self.config.dat_line);
            values.push(i16::from(word));
        }
        values
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl ScopeDriver for SimulatedDriver {
    fn enumerate_units(&mut self) -> Result<Vec<String>, DeviceError> {
        Ok(vec![SIM_SERIAL.to_string()])
    }

    fn open_unit(&mut self) -> Result<Handle, DeviceError> {
        if self.handle.is_some() {
            return Err(Self::fail("open_unit", PicoStatus::MaxUnitsOpened));
        }
        if self.config.clk_line >= DIGITAL_LINES || self.config.dat_line >= DIGITAL_LINES {
            return Err(DeviceError::InvalidConfig(format!(
                "simulated lines {}/{} outside port 0",
                self.config.clk_line, self.config.dat_line
            )));
        }
        log::info!("Opening simulated oscilloscope {}", SIM_SERIAL);
        self.handle = Some(SIM_HANDLE);
        Ok(SIM_HANDLE)
    }

    fn close_unit(&mut self, handle: Handle) -> Result<(), DeviceError> {
        self.check_handle("close_unit", handle)?;
        self.handle = None;
        self.capture = None;
        self.timebase = None;
        Ok(())
    }

    fn stop(&mut self, handle: Handle) -> Result<(), DeviceError> {
        self.check_handle("stop", handle)?;
        if let Some(capture) = self.capture.as_mut() {
            capture.polls_left = 0;
        }
        Ok(())
    }

    fn set_channel(
        &mut self,
        handle: Handle,
        _channel: Channel,
        _enabled: bool,
        _coupling: Coupling,
        _range: VoltageRange,
        _offset_v: f32,
    ) -> Result<(), DeviceError> {
        self.check_handle("set_channel", handle)
    }

    fn set_digital_port(
        &mut self,
        handle: Handle,
        port: DigitalPort,
        enabled: bool,
        _logic_level: i16,
    ) -> Result<(), DeviceError> {
        self.check_handle("set_digital_port", handle)?;
        self.ports_enabled[port.index()] = enabled;
        Ok(())
    }

    fn memory_segments(&mut self, handle: Handle, segments: u32) -> Result<i32, DeviceError> {
        self.check_handle("memory_segments", handle)?;
        if segments == 0 || segments > self.config.max_segments {
            return Err(Self::fail("memory_segments", PicoStatus::TooManySegments));
        }
        self.segments = segments;
        Ok(self.config.memory_samples / segments as i32)
    }

    fn max_segments(&mut self, handle: Handle) -> Result<u32, DeviceError> {
        self.check_handle("max_segments", handle)?;
        Ok(self.config.max_segments)
    }

    fn get_timebase(
        &mut self,
        handle: Handle,
        timebase: u32,
        samples: i32,
        segment: u32,
    ) -> Result<TimebaseInfo, DeviceError> {
        self.check_handle("get_timebase", handle)?;
        if timebase < constraints::MIN_TIMEBASE {
            return Err(Self::fail("get_timebase", PicoStatus::InvalidTimebase));
        }
        if segment >= self.segments {
            return Err(Self::fail("get_timebase", PicoStatus::SegmentOutOfRange));
        }
        let capacity = self.capacity();
        if samples > capacity {
            return Err(Self::fail("get_timebase", PicoStatus::TooManySamples));
        }

        let interval_ns = (timebase - constraints::TIMEBASE_OFFSET) as f64 * 1e9
            / constraints::TIMEBASE_CLOCK_HZ;
        self.timebase = Some((timebase, interval_ns * 1e-9));
        Ok(TimebaseInfo {
            interval_ns: interval_ns as f32,
            max_samples: capacity,
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
        self.check_handle("run_block", handle)?;
        let interval_s = match self.timebase {
            Some((tb, interval_s)) if tb == timebase => interval_s,
            _ => return Err(Self::fail("run_block", PicoStatus::InvalidTimebase)),
        };
        if segment >= self.segments {
            return Err(Self::fail("run_block", PicoStatus::SegmentOutOfRange));
        }
        let total = pre_trigger.saturating_add(post_trigger);
        if pre_trigger < 0 || post_trigger < 0 || total > self.capacity() {
            return Err(Self::fail("run_block", PicoStatus::TooManySamples));
        }

        self.capture = Some(Capture {
            samples: total as u32,
            interval_s,
            polls_left: self.config.busy_polls,
        });
        Ok((f64::from(total) * interval_s * 1e3).ceil() as i32)
    }

    fn is_ready(&mut self, handle: Handle) -> Result<bool, DeviceError> {
        self.check_handle("is_ready", handle)?;
        match self.capture.as_mut() {
            Some(capture) if capture.polls_left == 0 => Ok(true),
            Some(capture) => {
                capture.polls_left -= 1;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn get_digital_values(
        &mut self,
        handle: Handle,
        port: DigitalPort,
        samples: u32,
        segment: u32,
    ) -> Result<PortBlock, DeviceError> {
        self.check_handle("get_digital_values", handle)?;
        let capture = match self.capture {
            Some(capture) if capture.polls_left == 0 => capture,
            _ => return Err(Self::fail("get_digital_values", PicoStatus::DataNotAvailable)),
        };
        if segment >= self.segments {
            return Err(Self::fail("get_digital_values", PicoStatus::SegmentOutOfRange));
        }
        if !self.ports_enabled[port.index()] {
            return Err(Self::fail("get_digital_values", PicoStatus::InvalidParameter));
        }

        let count = samples.min(capture.samples);
        let values = match port {
            DigitalPort::Port0 => self.synthesize(count, capture.interval_s),
            DigitalPort::Port1 => vec![0; count as usize],
        };
        Ok(PortBlock {
            values,
            overflow: 0,
        })
    }
}
