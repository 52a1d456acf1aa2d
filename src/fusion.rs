//! Complementary-filter orientation engine for the instrument cluster

use log::debug;
use nalgebra::Vector3;

use crate::calibration::CalibrationOffsets;
use crate::compass::{calculate_heading, tilt_compensate};
use crate::error::Result;
use crate::math::{DEG_TO_RAD, guarded_atan2_deg};
use crate::smoothing::{HeadingAverage, lowpass};
use crate::types::{FusionSettings, OrientationEstimate, RawImuSample};

/// Upper bound on the heading averaging window
pub const MAX_HEADING_WINDOW: usize = 16;

/// Roll/pitch/heading estimator
///
/// Blends gyro integration with accelerometer tilt through a complementary
/// filter, smooths the result for display and derives a compass heading from
/// the magnetometer. It is driven synchronously from the acquisition loop and
/// never fails: every call produces an estimate from the previous state plus
/// the new sample.
///
/// # Example
/// ```
/// use dash_core::{CalibrationOffsets, RawImuSample, SensorFusionEngine};
///
/// let mut engine = SensorFusionEngine::new(CalibrationOffsets::default());
/// let sample = RawImuSample::new((0.0, 0.0, 1.0), (0.0, 0.0, 0.0), (1.0, 0.0, 0.0), 0);
/// let estimate = engine.update(&sample);
///
/// assert!(estimate.roll.abs() < 1e-9);
/// assert!((0.0..360.0).contains(&estimate.heading));
/// ```
#[derive(Debug, Clone)]
pub struct SensorFusionEngine {
    settings: FusionSettings,
    offsets: CalibrationOffsets,
    /// Timestamp of the previous sample, `None` before the first update
    last_timestamp_us: Option<u64>,
    /// Complementary filter output (roll, pitch), seeded by the first sample
    complementary: Option<(f64, f64)>,
    /// Display low-pass output (roll, pitch)
    smoothed: (f64, f64),
    /// Resting attitude removed from published angles
    level_bias: Option<(f64, f64)>,
    /// Low-passed horizontal magnetometer components
    horizontal_field: Option<(f64, f64)>,
    heading_average: HeadingAverage<MAX_HEADING_WINDOW>,
    estimate: OrientationEstimate,
}

impl SensorFusionEngine {
    /// Create an engine with default settings
    pub fn new(offsets: CalibrationOffsets) -> Self {
        Self::build(FusionSettings::default(), offsets)
    }

    /// Create an engine with specified settings
    pub fn with_settings(settings: FusionSettings, offsets: CalibrationOffsets) -> Result<Self> {
        settings.validate()?;
        Ok(Self::build(settings, offsets))
    }

    fn build(settings: FusionSettings, offsets: CalibrationOffsets) -> Self {
        Self {
            settings,
            offsets,
            last_timestamp_us: None,
            complementary: None,
            smoothed: (0.0, 0.0),
            level_bias: None,
            horizontal_field: None,
            heading_average: HeadingAverage::new(settings.heading_window),
            estimate: OrientationEstimate::default(),
        }
    }

    /// Return to the state before the first sample, keeping settings and offsets
    pub fn reset(&mut self) {
        *self = Self::build(self.settings, self.offsets);
    }

    /// Current algorithm settings
    pub fn settings(&self) -> FusionSettings {
        self.settings
    }

    /// Calibration offsets applied to every sample
    pub fn offsets(&self) -> CalibrationOffsets {
        self.offsets
    }

    /// Replace the calibration offsets as a whole
    pub fn set_offsets(&mut self, offsets: CalibrationOffsets) {
        self.offsets = offsets;
    }

    /// Most recent estimate
    pub fn estimate(&self) -> OrientationEstimate {
        self.estimate
    }

    /// Whether the resting attitude has been captured
    pub fn is_leveled(&self) -> bool {
        self.level_bias.is_some()
    }

    /// Capture the current smoothed attitude as the new zero
    ///
    /// Has no effect before the first update.
    pub fn rezero(&mut self) {
        if self.complementary.is_none() {
            return;
        }
        self.level_bias = Some(self.smoothed);
        self.estimate.roll = 0.0;
        self.estimate.pitch = 0.0;
        debug!("orientation re-zeroed at roll {:.2} pitch {:.2}", self.smoothed.0, self.smoothed.1);
    }

    /// Fuse one sample and return the updated estimate
    ///
    /// Timestamps are expected to be non-decreasing; a sample older than its
    /// predecessor is treated as `dt = 0`.
    pub fn update(&mut self, sample: &RawImuSample) -> OrientationEstimate {
        let delta_time = match self.last_timestamp_us {
            Some(previous) => sample.timestamp_us.saturating_sub(previous) as f64 / 1_000_000.0,
            None => 0.0,
        };
        self.last_timestamp_us = Some(sample.timestamp_us);

        let accel = sample.accel - self.offsets.accel;
        let gyro = sample.gyro - self.offsets.gyro;

        self.update_attitude(accel, gyro, delta_time);
        let heading = self.update_heading(sample.mag);

        if self.level_bias.is_none() && self.settings.zero_at_rest {
            self.level_bias = Some(self.smoothed);
            debug!("resting attitude roll {:.2} pitch {:.2}", self.smoothed.0, self.smoothed.1);
        }
        let (roll_bias, pitch_bias) = self.level_bias.unwrap_or((0.0, 0.0));

        self.estimate = OrientationEstimate {
            roll: self.smoothed.0 - roll_bias,
            pitch: self.smoothed.1 - pitch_bias,
            heading,
            timestamp_us: sample.timestamp_us,
        };
        self.estimate
    }

    /// Complementary filter followed by the display low-pass
    fn update_attitude(&mut self, accel: Vector3<f64>, gyro: Vector3<f64>, delta_time: f64) {
        let (ax, ay, az) = (accel.x, accel.y, accel.z);

        // Incremental gyro angles in degrees, yaw in radians for the coupling term
        let gyro_roll = gyro.x * delta_time;
        let gyro_pitch = gyro.y * delta_time;
        let yaw_increment = gyro.z * delta_time * DEG_TO_RAD;

        let mut accel_roll = guarded_atan2_deg(ay, libm::sqrt(ax * ax + az * az));
        let mut accel_pitch = guarded_atan2_deg(-ax, libm::sqrt(ay * ay + az * az));

        // Frame rotation between samples leaks yaw into roll/pitch
        let coupling = libm::sin(yaw_increment);
        accel_roll -= accel_pitch * coupling;
        accel_pitch += accel_roll * coupling;

        let alpha = self.settings.complementary_gain;
        let complementary = match self.complementary {
            None => (accel_roll, accel_pitch),
            Some((roll, pitch)) => (
                alpha * (roll + gyro_roll) + (1.0 - alpha) * accel_roll,
                alpha * (pitch + gyro_pitch) + (1.0 - alpha) * accel_pitch,
            ),
        };

        self.smoothed = if self.complementary.is_none() {
            complementary
        } else {
            let gain = self.settings.lowpass_gain;
            (
                lowpass(gain, complementary.0, self.smoothed.0),
                lowpass(gain, complementary.1, self.smoothed.1),
            )
        };
        self.complementary = Some(complementary);
    }

    /// Heading from the (optionally tilt-compensated) magnetometer
    fn update_heading(&mut self, magnetometer: Vector3<f64>) -> f64 {
        let (mx, my) = if self.settings.tilt_compensation {
            tilt_compensate(magnetometer, self.smoothed.0, self.smoothed.1)
        } else {
            (magnetometer.x, magnetometer.y)
        };

        // Overflowed readings must not poison the filtered field
        if !mx.is_finite() || !my.is_finite() {
            return self.estimate.heading;
        }

        let gain = self.settings.lowpass_gain;
        let field = match self.horizontal_field {
            None => (mx, my),
            Some((old_x, old_y)) => (lowpass(gain, mx, old_x), lowpass(gain, my, old_y)),
        };
        if !field.0.is_finite() || !field.1.is_finite() {
            return self.estimate.heading;
        }
        self.horizontal_field = Some(field);

        match calculate_heading(field.0, field.1, self.settings.declination) {
            Some(heading) if self.settings.heading_window > 1 => self.heading_average.push(heading),
            Some(heading) => heading,
            // No horizontal field: keep showing the last direction
            None => self.estimate.heading,
        }
    }
}

impl Default for SensorFusionEngine {
    fn default() -> Self {
        Self::new(CalibrationOffsets::default())
    }
}
