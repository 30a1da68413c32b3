//! Block-mode digital acquisition session
//!
//! Opening the unit, port setup, timebase setup and capture are separate states. Each
//! setup step consumes the session and hands back the next state, so a capture can
//! only be started on a unit whose ports and timebase have been configured. A session
//! that is dropped without `close` still stops and closes the unit.

use super::config::{logic_level_counts, segment_count, timebase_index, timebase_interval_s};
use super::driver::{Channel, Coupling, DigitalPort, Handle, ScopeDriver, VoltageRange};
use super::{DeviceError, DigitalCapture};
use crate::types::ScopeConfig;
use std::time::{Duration, Instant};

/// Unit is open, nothing configured yet
#[derive(Debug)]
pub struct Opened;

/// Digital ports are set up
#[derive(Debug)]
pub struct PortsConfigured {
    enabled_ports: usize,
}

/// Timebase and memory are set up, ready to capture
#[derive(Debug)]
pub struct Armed {
    timebase: Timebase,
    ready_timeout: Duration,
    poll_interval: Duration,
}

/// Realized acquisition timing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timebase {
    /// SDK timebase index
    pub index: u32,
    /// Sampling interval reported by the unit, in seconds
    pub interval_s: f64,
    /// Samples per capture
    pub samples: u32,
    /// Memory segments the buffer was split into
    pub segments: u32,
}

impl Timebase {
    pub fn sample_rate(&self) -> f64 {
        1.0 / self.interval_s
    }
}

struct Session<D: ScopeDriver> {
    driver: D,
    handle: Handle,
    open: bool,
}

impl<D: ScopeDriver> Session<D> {
    fn shutdown(&mut self) -> Result<(), DeviceError> {
        self.open = false;
        let stopped = self.driver.stop(self.handle);
        let closed = self.driver.close_unit(self.handle);
        log::info!("Closed oscilloscope (handle {})", self.handle);
        stopped.and(closed)
    }
}

impl<D: ScopeDriver> Drop for Session<D> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.shutdown() {
                log::warn!("Failed to close oscilloscope cleanly: {}", e);
            }
        }
    }
}

/// Open oscilloscope in acquisition state `S`
pub struct Scope<D: ScopeDriver, S> {
    session: Session<D>,
    state: S,
}

impl<D: ScopeDriver, S> Scope<D, S> {
    #[cfg(test)]
    pub fn handle(&self) -> Handle {
        self.session.handle
    }

    #[cfg(test)]
    pub fn driver(&self) -> &D {
        &self.session.driver
    }

    /// Stop any capture and close the unit
    pub fn close(mut self) -> Result<(), DeviceError> {
        self.session.shutdown()
    }

    fn advance<T>(self, state: T) -> Scope<D, T> {
        Scope {
            session: self.session,
            state,
        }
    }
}

impl<D: ScopeDriver> Scope<D, Opened> {
    /// Open the first available unit
    pub fn open(mut driver: D) -> Result<Self, DeviceError> {
        let handle = driver.open_unit()?;
        log::info!("Opened oscilloscope (handle {})", handle);
        Ok(Self {
            session: Session {
                driver,
                handle,
                open: true,
            },
            state: Opened,
        })
    }

    /// Enable the configured digital ports and switch off the analog channels
    pub fn configure_digital(
        mut self,
        config: &ScopeConfig,
    ) -> Result<Scope<D, PortsConfigured>, DeviceError> {
        let enabled_ports = config.enabled_ports();
        if enabled_ports == 0 {
            return Err(DeviceError::InvalidConfig(
                "no digital port enabled".to_string(),
            ));
        }

        let handle = self.session.handle;
        for setting in &config.ports {
            let level = logic_level_counts(setting.logic_level_v);
            self.session
                .driver
                .set_digital_port(handle, setting.port, setting.enabled, level)?;
            log::debug!(
                "{} {} at {} V ({} counts)",
                setting.port,
                if setting.enabled { "enabled" } else { "disabled" },
                setting.logic_level_v,
                level
            );
        }

        if config.disable_analog {
            for channel in Channel::ALL {
                self.session.driver.set_channel(
                    handle,
                    channel,
                    false,
                    Coupling::Dc,
                    VoltageRange::V5,
                    0.0,
                )?;
            }
            log::debug!("Analog channels disabled");
        }

        Ok(self.advance(PortsConfigured { enabled_ports }))
    }
}

impl<D: ScopeDriver> Scope<D, PortsConfigured> {
    /// Pick the timebase for the requested rate and size memory for the record length
    pub fn configure_timebase(
        mut self,
        config: &ScopeConfig,
    ) -> Result<Scope<D, Armed>, DeviceError> {
        let index = timebase_index(config.sample_rate)?;
        let per_channel = (config.duration_s * config.sample_rate).round() as i64;
        if per_channel < 1 {
            return Err(DeviceError::InvalidConfig(format!(
                "{} s at {} Hz is less than one sample",
                config.duration_s, config.sample_rate
            )));
        }

        let handle = self.session.handle;
        let ports = self.state.enabled_ports as i64;
        let driver = &mut self.session.driver;

        // Whole memory as one segment tells how much there is to share
        let total = driver.memory_segments(handle, 1)?;
        let max_segments = driver.max_segments(handle)?;
        let segments = segment_count(total, per_channel * ports, max_segments);
        let per_segment = driver.memory_segments(handle, segments)?;

        let request = (i64::from(per_segment) / ports)
            .min(per_channel)
            .min(i64::from(i32::MAX)) as i32;
        let info = driver.get_timebase(handle, index, request, 0)?;
        if !(info.interval_ns > 0.0) {
            return Err(DeviceError::InvalidConfig(format!(
                "timebase {} reported interval {} ns",
                index, info.interval_ns
            )));
        }

        let samples = per_channel.min(i64::from(info.max_samples)).max(0) as u32;
        if samples == 0 {
            return Err(DeviceError::InvalidConfig(format!(
                "timebase {} leaves no room for samples",
                index
            )));
        }
        if i64::from(samples) < per_channel {
            log::warn!(
                "Capture shortened to {} of {} requested samples",
                samples,
                per_channel
            );
        }

        let timebase = Timebase {
            index,
            interval_s: f64::from(info.interval_ns) * 1e-9,
            samples,
            segments,
        };
        log::info!(
            "Timebase {}: {:.0} Hz (expected {:.0} Hz), {} samples, {} segment(s)",
            index,
            timebase.sample_rate(),
            1.0 / timebase_interval_s(index),
            samples,
            segments
        );

        Ok(self.advance(Armed {
            timebase,
            ready_timeout: config.ready_timeout,
            poll_interval: config.poll_interval,
        }))
    }
}

impl<D: ScopeDriver> Scope<D, Armed> {
    pub fn timebase(&self) -> Timebase {
        self.state.timebase
    }

    /// Run one block capture and read back digital port 0
    pub fn acquire(&mut self) -> Result<DigitalCapture, DeviceError> {
        let timebase = self.state.timebase;
        let handle = self.session.handle;
        let driver = &mut self.session.driver;

        let busy_ms = driver.run_block(handle, 0, timebase.samples as i32, timebase.index, 0)?;
        log::debug!("Block capture started, unit busy for {} ms", busy_ms);

        let started = Instant::now();
        while !driver.is_ready(handle)? {
            if started.elapsed() >= self.state.ready_timeout {
                log::error!("Data timeout after {:?}", self.state.ready_timeout);
                if let Err(e) = driver.stop(handle) {
                    log::warn!("Failed to stop capture: {}", e);
                }
                return Err(DeviceError::Timeout(self.state.ready_timeout));
            }
            std::thread::sleep(self.state.poll_interval);
        }

        let block = driver.get_digital_values(handle, DigitalPort::Port0, timebase.samples, 0)?;
        if block.overflow != 0 {
            log::warn!("Overvoltage flags set: {:#06x}", block.overflow);
        }
        if block.values.len() < timebase.samples as usize {
            log::warn!(
                "Unit returned {} of {} samples",
                block.values.len(),
                timebase.samples
            );
        }

        let capture = DigitalCapture::from_port_values(&block.values, timebase.sample_rate());
        log::info!(
            "Captured {} samples ({:.3} s) in {:?}",
            capture.len(),
            capture.duration(),
            started.elapsed()
        );
        Ok(capture)
    }
}

/// Serial numbers of every connected unit
pub fn find_units<D: ScopeDriver>(driver: &mut D) -> Result<Vec<String>, DeviceError> {
    let units = driver.enumerate_units()?;
    if units.is_empty() {
        log::warn!("No oscilloscope found");
    }
    for serial in &units {
        log::info!("Found oscilloscope {}", serial);
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::driver::{PortBlock, TimebaseInfo};
    use crate::scope::PicoStatus;
    use std::cell::RefCell;
    use std::rc::Rc;

    type CallLog = Rc<RefCell<Vec<&'static str>>>;

    struct ScriptedDriver {
        calls: CallLog,
        memory: i32,
        max_segments: u32,
        polls_until_ready: Option<usize>,
        fail_on: Option<&'static str>,
        segments: u32,
    }

    impl ScriptedDriver {
        fn new(calls: CallLog) -> Self {
            Self {
                calls,
                memory: 1_000_000,
                max_segments: 32,
                polls_until_ready: Some(2),
                fail_on: None,
                segments: 1,
            }
        }

        fn record(&mut self, call: &'static str) -> Result<(), DeviceError> {
            self.calls.borrow_mut().push(call);
            if self.fail_on == Some(call) {
                return Err(DeviceError::Status {
                    call,
                    status: PicoStatus::InvalidParameter,
                });
            }
            Ok(())
        }
    }

    impl ScopeDriver for ScriptedDriver {
        fn enumerate_units(&mut self) -> Result<Vec<String>, DeviceError> {
            self.record("enumerate_units")?;
            Ok(vec!["AB123/0001".to_string()])
        }

        fn open_unit(&mut self) -> Result<Handle, DeviceError> {
            self.record("open_unit")?;
            Ok(7)
        }

        fn close_unit(&mut self, _handle: Handle) -> Result<(), DeviceError> {
            self.record("close_unit")
        }

        fn stop(&mut self, _handle: Handle) -> Result<(), DeviceError> {
            self.record("stop")
        }

        fn set_channel(
            &mut self,
            _handle: Handle,
            _channel: Channel,
            enabled: bool,
            _coupling: Coupling,
            _range: VoltageRange,
            _offset_v: f32,
        ) -> Result<(), DeviceError> {
            assert!(!enabled);
            self.record("set_channel")
        }

        fn set_digital_port(
            &mut self,
            _handle: Handle,
            _port: DigitalPort,
            _enabled: bool,
            logic_level: i16,
        ) -> Result<(), DeviceError> {
            assert_eq!(logic_level, 5898);
            self.record("set_digital_port")
        }

        fn memory_segments(&mut self, _handle: Handle, segments: u32) -> Result<i32, DeviceError> {
            self.record("memory_segments")?;
            self.segments = segments;
            Ok(self.memory / segments as i32)
        }

        fn max_segments(&mut self, _handle: Handle) -> Result<u32, DeviceError> {
            self.record("max_segments")?;
            Ok(self.max_segments)
        }

        fn get_timebase(
            &mut self,
            _handle: Handle,
            timebase: u32,
            samples: i32,
            _segment: u32,
        ) -> Result<TimebaseInfo, DeviceError> {
            self.record("get_timebase")?;
            Ok(TimebaseInfo {
                interval_ns: (timebase - 2) as f32 * 8.0,
                max_samples: samples,
            })
        }

        fn run_block(
            &mut self,
            _handle: Handle,
            _pre_trigger: i32,
            _post_trigger: i32,
            _timebase: u32,
            _segment: u32,
        ) -> Result<i32, DeviceError> {
            self.record("run_block")?;
            Ok(1)
        }

        fn is_ready(&mut self, _handle: Handle) -> Result<bool, DeviceError> {
            self.record("is_ready")?;
            match self.polls_until_ready.as_mut() {
                Some(0) => Ok(true),
                Some(n) => {
                    *n -= 1;
                    Ok(false)
                }
                None => Ok(false),
            }
        }

        fn get_digital_values(
            &mut self,
            _handle: Handle,
            _port: DigitalPort,
            samples: u32,
            _segment: u32,
        ) -> Result<PortBlock, DeviceError> {
            self.record("get_digital_values")?;
            Ok(PortBlock {
                values: (0..samples).map(|i| (i % 4) as i16 | 0x0300).collect(),
                overflow: 0,
            })
        }
    }

    fn test_config() -> ScopeConfig {
        ScopeConfig {
            duration_s: 400e-6,
            ready_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(1),
            ..ScopeConfig::default()
        }
    }

    #[test]
    fn test_full_acquisition_sequence() {
        let calls = CallLog::default();
        let config = test_config();

        let scope = Scope::open(ScriptedDriver::new(calls.clone())).unwrap();
        assert_eq!(scope.handle(), 7);
        let mut scope = scope
            .configure_digital(&config)
            .unwrap()
            .configure_timebase(&config)
            .unwrap();

        let timebase = scope.timebase();
        assert_eq!(timebase.index, 7);
        assert_eq!(timebase.samples, 10_000);
        assert!((timebase.sample_rate() - 25e6).abs() < 1.0);

        let capture = scope.acquire().unwrap();
        assert_eq!(capture.len(), 10_000);
        assert_eq!(&capture.words()[..4], &[0, 1, 2, 3]);
        assert!((capture.sample_rate() - 25e6).abs() < 1.0);

        scope.close().unwrap();

        let calls = calls.borrow();
        let expected_prefix = [
            "open_unit",
            "set_digital_port",
            "set_digital_port",
            "set_channel",
            "set_channel",
            "set_channel",
            "set_channel",
            "memory_segments",
            "max_segments",
            "memory_segments",
            "get_timebase",
            "run_block",
        ];
        assert_eq!(&calls[..expected_prefix.len()], &expected_prefix);
        assert_eq!(calls.iter().filter(|c| **c == "is_ready").count(), 3);
        assert_eq!(
            &calls[calls.len() - 3..],
            &["get_digital_values", "stop", "close_unit"]
        );
    }

    #[test]
    fn test_segments_clamped_to_maximum() {
        let calls = CallLog::default();
        let config = test_config();
        let scope = Scope::open(ScriptedDriver::new(calls))
            .unwrap()
            .configure_digital(&config)
            .unwrap()
            .configure_timebase(&config)
            .unwrap();

        // 1_000_000 / (10_000 * 2 ports) = 50 segments, above the 32 allowed
        assert_eq!(scope.timebase().segments, 32);
        assert_eq!(scope.driver().segments, 32);
    }

    #[test]
    fn test_short_memory_shortens_capture() {
        let calls = CallLog::default();
        let config = test_config();
        let mut driver = ScriptedDriver::new(calls);
        driver.memory = 6_000;

        let scope = Scope::open(driver)
            .unwrap()
            .configure_digital(&config)
            .unwrap()
            .configure_timebase(&config)
            .unwrap();
        assert_eq!(scope.timebase().segments, 1);
        assert_eq!(scope.timebase().samples, 3_000);
    }

    #[test]
    fn test_failed_setup_closes_unit() {
        let calls = CallLog::default();
        let mut driver = ScriptedDriver::new(calls.clone());
        driver.fail_on = Some("set_channel");

        let result = Scope::open(driver)
            .unwrap()
            .configure_digital(&test_config());
        let err = result.err().unwrap();
        assert_eq!(err.status(), Some(PicoStatus::InvalidParameter));

        let calls = calls.borrow();
        assert_eq!(&calls[calls.len() - 2..], &["stop", "close_unit"]);
    }

    #[test]
    fn test_ready_timeout() {
        let calls = CallLog::default();
        let mut driver = ScriptedDriver::new(calls.clone());
        driver.polls_until_ready = None;
        let config = ScopeConfig {
            ready_timeout: Duration::from_millis(20),
            ..test_config()
        };

        let mut scope = Scope::open(driver)
            .unwrap()
            .configure_digital(&config)
            .unwrap()
            .configure_timebase(&config)
            .unwrap();
        let err = scope.acquire().unwrap_err();
        assert_eq!(err, DeviceError::Timeout(Duration::from_millis(20)));
        assert!(!calls.borrow().contains(&"get_digital_values"));

        drop(scope);
        assert_eq!(calls.borrow().last(), Some(&"close_unit"));
    }

    #[test]
    fn test_close_only_once() {
        let calls = CallLog::default();
        let scope = Scope::open(ScriptedDriver::new(calls.clone())).unwrap();
        scope.close().unwrap();
        assert_eq!(
            calls.borrow().iter().filter(|c| **c == "close_unit").count(),
            1
        );
    }

    #[test]
    fn test_find_units() {
        let calls = CallLog::default();
        let mut driver = ScriptedDriver::new(calls);
        assert_eq!(find_units(&mut driver).unwrap(), vec!["AB123/0001"]);
    }
}
