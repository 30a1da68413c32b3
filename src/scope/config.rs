/// PicoScope 3000A specific constants and conversions
use super::DeviceError;

/// Default acquisition values used by the lab setup
pub mod defaults {
    /// Requested digital sample rate (25 MHz)
    pub const SAMPLE_RATE: f64 = 25e6;

    /// Record length in seconds
    pub const DURATION_S: f64 = 2.0;

    /// Microphone supply voltage; the logic threshold sits at half of it
    pub const SUPPLY_V: f32 = 1.8;

    /// Block capture ready timeout in milliseconds
    pub const READY_TIMEOUT_MS: u64 = 5_000;

    /// Ready poll interval in milliseconds
    pub const POLL_INTERVAL_MS: u64 = 50;
}

/// 3000A hardware constraints
pub mod constraints {
    /// Timebase reference clock: interval = (n - 2) / 125 MHz for n >= 3
    pub const TIMEBASE_CLOCK_HZ: f64 = 125e6;

    /// Offset subtracted from the timebase index
    pub const TIMEBASE_OFFSET: u32 = 2;

    /// Smallest timebase index the formula applies to
    pub const MIN_TIMEBASE: u32 = 3;

    /// Fastest digital sample rate reachable with the formula (125 MHz)
    pub const MAX_SAMPLE_RATE: f64 = 125e6;

    /// Digital threshold range in volts
    pub const MAX_LOGIC_LEVEL_V: f32 = 5.0;

    /// ADC counts at +5 V threshold
    pub const LOGIC_LEVEL_FULL_SCALE: f32 = 32767.0;
}

/// Convert a logic threshold in volts to the SDK's count scale, clamping to +/-5 V
pub fn logic_level_counts(volts: f32) -> i16 {
    let clamped = volts.clamp(-constraints::MAX_LOGIC_LEVEL_V, constraints::MAX_LOGIC_LEVEL_V);
    if clamped != volts {
        log::warn!("Logic level {} V clamped to {} V", volts, clamped);
    }
    (clamped / constraints::MAX_LOGIC_LEVEL_V * constraints::LOGIC_LEVEL_FULL_SCALE).round() as i16
}

/// Timebase index closest to `sample_rate`
pub fn timebase_index(sample_rate: f64) -> Result<u32, DeviceError> {
    let steps = (constraints::TIMEBASE_CLOCK_HZ / sample_rate).round();
    if !steps.is_finite() || steps < 1.0 || steps > (u32::MAX - constraints::TIMEBASE_OFFSET) as f64 {
        return Err(DeviceError::InvalidConfig(format!(
            "sample rate {} Hz has no timebase (max {} Hz)",
            sample_rate,
            constraints::MAX_SAMPLE_RATE
        )));
    }
    Ok(steps as u32 + constraints::TIMEBASE_OFFSET)
}

/// Sampling interval in seconds of a timebase index
pub fn timebase_interval_s(index: u32) -> f64 {
    index.saturating_sub(constraints::TIMEBASE_OFFSET) as f64 / constraints::TIMEBASE_CLOCK_HZ
}

/// Number of memory segments so each holds at least `requested` samples
///
/// Clamped to [1, `max_segments`].
pub fn segment_count(total_samples: i32, requested: i64, max_segments: u32) -> u32 {
    if requested <= 0 {
        return 1;
    }
    let fit = i64::from(total_samples) / requested;
    if fit < 1 {
        log::warn!(
            "Requested {} samples but device memory holds {}; capture will be shorter",
            requested,
            total_samples
        );
        return 1;
    }
    if fit > i64::from(max_segments) {
        log::info!(
            "{} segments would fit, using the maximum of {}",
            fit,
            max_segments
        );
        return max_segments.max(1);
    }
    fit as u32
}

/// Validate requested sample rate is reachable
pub fn validate_sample_rate(rate: f64) -> anyhow::Result<()> {
    if !(rate > 0.0) || !rate.is_finite() {
        anyhow::bail!("Sample rate {} Hz must be positive", rate);
    } else if rate > constraints::MAX_SAMPLE_RATE {
        anyhow::bail!(
            "Sample rate {} Hz is above maximum {} Hz",
            rate,
            constraints::MAX_SAMPLE_RATE
        );
    }

    // Warn if the timebase grid cannot hit the rate closely
    let realized = 1.0 / timebase_interval_s(timebase_index(rate)?);
    if (realized - rate).abs() / rate > 0.01 {
        log::warn!(
            "Sample rate {} Hz will be realized as {:.0} Hz",
            rate,
            realized
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logic_level_counts() {
        assert_eq!(logic_level_counts(0.9), 5898);
        assert_eq!(logic_level_counts(5.0), 32767);
        assert_eq!(logic_level_counts(7.5), 32767);
        assert_eq!(logic_level_counts(-9.0), -32767);
        assert_eq!(logic_level_counts(0.0), 0);
    }

    #[test]
    fn test_timebase_index() {
        assert_eq!(timebase_index(25e6).unwrap(), 7);
        assert_eq!(timebase_index(125e6).unwrap(), 3);
        assert_eq!(timebase_index(62.5e6).unwrap(), 4);
        assert!(timebase_index(400e6).is_err());
        assert!(timebase_index(0.0).is_err());
    }

    #[test]
    fn test_timebase_interval() {
        assert!((timebase_interval_s(7) - 40e-9).abs() < 1e-18);
        assert!((timebase_interval_s(3) - 8e-9).abs() < 1e-18);
    }

    #[test]
    fn test_segment_count() {
        assert_eq!(segment_count(1_000_000, 100_000, 32), 10);
        assert_eq!(segment_count(1_000_000, 10_000, 32), 32);
        assert_eq!(segment_count(1_000, 100_000, 32), 1);
        assert_eq!(segment_count(1_000, 0, 32), 1);
    }

    #[test]
    fn test_validate_sample_rate() {
        assert!(validate_sample_rate(25e6).is_ok());
        assert!(validate_sample_rate(6.144e6).is_ok());
        assert!(validate_sample_rate(0.0).is_err());
        assert!(validate_sample_rate(500e6).is_err());
    }
}
