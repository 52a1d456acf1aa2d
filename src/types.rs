//! Core types, settings and sensor capabilities

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fusion::MAX_HEADING_WINDOW;
use crate::tachometer::MAX_WINDOW;

/// Monotonic microsecond clock
///
/// Any `Fn() -> u64` closure is a clock, which keeps tests and board glue short.
///
/// # Example
/// ```
/// use dash_core::Clock;
///
/// let clock = || 1_500_u64;
/// assert_eq!(clock.now_us(), 1_500);
/// ```
pub trait Clock {
    /// Microseconds since an arbitrary fixed origin
    fn now_us(&self) -> u64;
}

impl<F: Fn() -> u64> Clock for F {
    fn now_us(&self) -> u64 {
        self()
    }
}

/// Nine-axis IMU readings in consistent physical units
///
/// Acceleration in g, angular rate in degrees per second and magnetic field in
/// raw magnetometer counts. Bus failures are reported through `Error` so the
/// caller can skip a tick instead of feeding the engine bad data.
pub trait ImuSource {
    /// Driver-specific bus error
    type Error: core::fmt::Debug;

    /// Accelerometer triple (ax, ay, az)
    fn acceleration(&mut self) -> core::result::Result<(f64, f64, f64), Self::Error>;

    /// Gyroscope triple (gx, gy, gz)
    fn gyro(&mut self) -> core::result::Result<(f64, f64, f64), Self::Error>;

    /// Magnetometer triple (mx, my, mz)
    fn magnetic(&mut self) -> core::result::Result<(f64, f64, f64), Self::Error>;
}

/// One captured IMU sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawImuSample {
    /// Acceleration in g
    pub accel: Vector3<f64>,
    /// Angular rate in degrees per second
    pub gyro: Vector3<f64>,
    /// Magnetic field in raw counts
    pub mag: Vector3<f64>,
    /// Capture time in microseconds
    pub timestamp_us: u64,
}

impl RawImuSample {
    /// Build a sample from plain triples
    pub fn new(
        accel: (f64, f64, f64),
        gyro: (f64, f64, f64),
        mag: (f64, f64, f64),
        timestamp_us: u64,
    ) -> Self {
        Self {
            accel: Vector3::new(accel.0, accel.1, accel.2),
            gyro: Vector3::new(gyro.0, gyro.1, gyro.2),
            mag: Vector3::new(mag.0, mag.1, mag.2),
            timestamp_us,
        }
    }

    /// Read all three triples and stamp them with the clock.
    ///
    /// The first failing read aborts the capture and its error is returned
    /// unchanged, so a tick with a bus fault never reaches the fusion engine.
    pub fn acquire<S: ImuSource, C: Clock>(
        source: &mut S,
        clock: &C,
    ) -> core::result::Result<Self, S::Error> {
        let accel = source.acceleration()?;
        let gyro = source.gyro()?;
        let mag = source.magnetic()?;
        Ok(Self::new(accel, gyro, mag, clock.now_us()))
    }
}

/// Roll, pitch and heading published by the fusion engine
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationEstimate {
    /// Roll in degrees, relative to the resting attitude
    pub roll: f64,
    /// Pitch in degrees, relative to the resting attitude
    pub pitch: f64,
    /// Heading in degrees, always within `[0, 360)`
    pub heading: f64,
    /// Timestamp of the sample that produced this estimate
    pub timestamp_us: u64,
}

/// Fusion engine settings
///
/// # Example
/// ```
/// use dash_core::FusionSettings;
///
/// let settings = FusionSettings {
///     declination: Some(-8.12), // true north for Kyoto
///     heading_window: 5,
///     ..Default::default()
/// };
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    /// Complementary filter weight on the gyro-integrated angle (typically 0.99)
    ///
    /// The remainder goes to the accelerometer tilt, which slowly pulls the
    /// estimate back and cancels gyro drift.
    pub complementary_gain: f64,
    /// Weight of the newest value in the display low-pass (typically 0.8)
    pub lowpass_gain: f64,
    /// Rotate the magnetometer into the horizontal plane before computing heading
    pub tilt_compensation: bool,
    /// Magnetic declination in degrees; `None` reports magnetic north
    pub declination: Option<f64>,
    /// Subtract the first stable roll/pitch so the resting attitude reads zero
    pub zero_at_rest: bool,
    /// Number of headings averaged (wrap-aware) before publishing; 1 disables
    pub heading_window: usize,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            complementary_gain: 0.99,
            lowpass_gain: 0.8,
            tilt_compensation: true,
            declination: None,
            zero_at_rest: true,
            heading_window: 1,
        }
    }
}

impl FusionSettings {
    /// Check the gains are blend weights, the declination is finite and the
    /// heading window fits [`MAX_HEADING_WINDOW`]
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.complementary_gain) {
            return Err(Error::InvalidSettings("complementary gain must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.lowpass_gain) {
            return Err(Error::InvalidSettings("low-pass gain must be within [0, 1]"));
        }
        if self.declination.is_some_and(|d| !d.is_finite()) {
            return Err(Error::InvalidSettings("declination must be finite"));
        }
        if self.heading_window > MAX_HEADING_WINDOW {
            return Err(Error::InvalidSettings("heading window exceeds MAX_HEADING_WINDOW"));
        }
        Ok(())
    }
}

/// Two calibration points of the averaging-window remap
///
/// Between `low_hz` and `high_hz` the window length is interpolated linearly
/// from `low_window` to `high_window`; outside that span it holds the nearer
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowMapping {
    /// Frequency of the low calibration point in Hz
    pub low_hz: f64,
    /// Window length at `low_hz`
    pub low_window: usize,
    /// Frequency of the high calibration point in Hz
    pub high_hz: f64,
    /// Window length at `high_hz`
    pub high_window: usize,
}

impl Default for WindowMapping {
    fn default() -> Self {
        Self {
            low_hz: 150.0,
            low_window: 50,
            high_hz: 1500.0,
            high_window: 20,
        }
    }
}

/// Tachometer estimator settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TachometerSettings {
    /// RPM per Hz of the pulse line (pulses-per-revolution conversion)
    pub scale_factor: f64,
    /// Edge silence in microseconds after which the watchdog declares a stall
    pub timeout_us: u64,
    /// Frequency-to-window remap
    pub window: WindowMapping,
}

impl Default for TachometerSettings {
    fn default() -> Self {
        Self {
            scale_factor: 10.0,
            timeout_us: 1_000_000,
            window: WindowMapping::default(),
        }
    }
}

impl TachometerSettings {
    /// Check the scale factor and window mapping can produce a finite RPM
    pub fn validate(&self) -> Result<()> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(Error::InvalidSettings("scale factor must be positive"));
        }
        if self.timeout_us == 0 {
            return Err(Error::InvalidSettings("timeout must be non-zero"));
        }
        let WindowMapping {
            low_hz,
            low_window,
            high_hz,
            high_window,
        } = self.window;
        if !(low_hz.is_finite() && high_hz.is_finite()) || high_hz <= low_hz {
            return Err(Error::InvalidSettings("window mapping needs low_hz < high_hz"));
        }
        if low_window > MAX_WINDOW || high_window > MAX_WINDOW {
            return Err(Error::InvalidSettings("window length exceeds MAX_WINDOW"));
        }
        Ok(())
    }
}

/// Averaging calibration settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Number of samples averaged per channel
    pub samples: u32,
    /// Spacing between samples in milliseconds
    pub sample_period_ms: u32,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            samples: 1000,
            sample_period_ms: 20,
        }
    }
}

/// Tachometer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TachometerState {
    /// Armed, no edge measured yet
    #[default]
    Idle,
    /// Edges arriving within the timeout
    Tracking,
    /// Watchdog fired; edges are ignored until reset
    TimedOut,
}

/// Snapshot of the tachometer estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RpmEstimate {
    /// Pulse frequency in Hz
    pub frequency_hz: f64,
    /// Engine speed in revolutions per minute
    pub rpm: f64,
    /// High time as a percentage of the last cycle
    pub duty_percent: f64,
    /// Current averaging window length
    pub n_repeats: usize,
    /// Sticky stall flag, cleared only by reset
    pub timed_out: bool,
}

impl Default for RpmEstimate {
    fn default() -> Self {
        Self {
            frequency_hz: 0.0,
            rpm: 0.0,
            duty_percent: 50.0,
            n_repeats: 1,
            timed_out: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingGyro;

    impl ImuSource for FailingGyro {
        type Error = &'static str;

        fn acceleration(&mut self) -> core::result::Result<(f64, f64, f64), Self::Error> {
            Ok((0.0, 0.0, 1.0))
        }

        fn gyro(&mut self) -> core::result::Result<(f64, f64, f64), Self::Error> {
            Err("nack")
        }

        fn magnetic(&mut self) -> core::result::Result<(f64, f64, f64), Self::Error> {
            Ok((1.0, 0.0, 0.0))
        }
    }

    #[test]
    fn test_acquire_propagates_bus_error() {
        let clock = || 42_u64;
        assert_eq!(RawImuSample::acquire(&mut FailingGyro, &clock), Err("nack"));
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(FusionSettings::default().validate().is_ok());
        assert!(TachometerSettings::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let fusion = FusionSettings {
            complementary_gain: 1.5,
            ..Default::default()
        };
        assert!(matches!(fusion.validate(), Err(Error::InvalidSettings(_))));

        let tacho = TachometerSettings {
            scale_factor: 0.0,
            ..Default::default()
        };
        assert!(tacho.validate().is_err());

        let tacho = TachometerSettings {
            window: WindowMapping {
                low_hz: 1500.0,
                high_hz: 150.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(tacho.validate().is_err());
    }

    #[test]
    fn test_oversized_windows_rejected() {
        let fusion = FusionSettings {
            heading_window: MAX_HEADING_WINDOW + 1,
            ..Default::default()
        };
        assert!(matches!(fusion.validate(), Err(Error::InvalidSettings(_))));
        let fusion = FusionSettings {
            heading_window: MAX_HEADING_WINDOW,
            ..Default::default()
        };
        assert!(fusion.validate().is_ok());

        for (low_window, high_window) in [(MAX_WINDOW + 1, 20), (50, MAX_WINDOW + 1)] {
            let tacho = TachometerSettings {
                window: WindowMapping {
                    low_window,
                    high_window,
                    ..Default::default()
                },
                ..Default::default()
            };
            assert!(matches!(tacho.validate(), Err(Error::InvalidSettings(_))));
        }
        let tacho = TachometerSettings {
            window: WindowMapping {
                low_window: MAX_WINDOW,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(tacho.validate().is_ok());
    }

    #[test]
    fn test_rpm_estimate_neutral_default() {
        let estimate = RpmEstimate::default();
        assert_eq!(estimate.rpm, 0.0);
        assert_eq!(estimate.n_repeats, 1);
        assert!(!estimate.timed_out);
    }
}
