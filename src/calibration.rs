//! Accelerometer and gyroscope bias calibration
//!
//! Offsets are either loaded from persistent storage or measured once at
//! startup by averaging a burst of samples while the vehicle is at rest. The
//! averaging loop is the only long blocking operation in the crate and must
//! complete before the fusion engine is handed to consumers.

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};
use nalgebra::Vector3;

use crate::error::{Error, Result};
use crate::persist::{self, CalibrationStorage, RECORD_CAPACITY};
use crate::types::{CalibrationSettings, ImuSource};

/// Added to the averaged Z acceleration to cancel the 1 g resting baseline
pub const GRAVITY_OFFSET: f64 = 1.0;

/// Bias offsets subtracted from every raw accelerometer and gyroscope sample
///
/// The set is replaced as a whole; there is no way to update a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationOffsets {
    /// Accelerometer offsets (aXerr, aYerr, aZerr) in g
    pub accel: Vector3<f64>,
    /// Gyroscope offsets (gXerr, gYerr, gZerr) in degrees per second
    pub gyro: Vector3<f64>,
}

impl CalibrationOffsets {
    /// Build offsets from plain triples
    pub fn new(accel: (f64, f64, f64), gyro: (f64, f64, f64)) -> Self {
        Self {
            accel: Vector3::new(accel.0, accel.1, accel.2),
            gyro: Vector3::new(gyro.0, gyro.1, gyro.2),
        }
    }

    /// Whether all six values are finite
    pub fn is_finite(&self) -> bool {
        self.accel.iter().chain(self.gyro.iter()).all(|v| v.is_finite())
    }

    /// Measure offsets by averaging `settings.samples` readings.
    ///
    /// Blocks for `samples * sample_period_ms`. Any bus error aborts the run;
    /// retrying is left to the caller.
    ///
    /// # Example
    /// ```
    /// use dash_core::{CalibrationOffsets, CalibrationSettings, ImuSource};
    /// use embedded_hal::delay::DelayNs;
    ///
    /// struct Resting;
    ///
    /// impl ImuSource for Resting {
    ///     type Error = ();
    ///     fn acceleration(&mut self) -> Result<(f64, f64, f64), ()> { Ok((0.02, -0.01, 1.0)) }
    ///     fn gyro(&mut self) -> Result<(f64, f64, f64), ()> { Ok((0.5, 0.0, -0.25)) }
    ///     fn magnetic(&mut self) -> Result<(f64, f64, f64), ()> { Ok((1.0, 0.0, 0.0)) }
    /// }
    ///
    /// struct NoDelay;
    ///
    /// impl DelayNs for NoDelay {
    ///     fn delay_ns(&mut self, _ns: u32) {}
    /// }
    ///
    /// let settings = CalibrationSettings { samples: 10, sample_period_ms: 1 };
    /// let offsets = CalibrationOffsets::average(&mut Resting, &mut NoDelay, settings).unwrap();
    /// assert!((offsets.accel.z - 2.0).abs() < 1e-9);
    /// assert!((offsets.gyro.x - 0.5).abs() < 1e-9);
    /// ```
    pub fn average<S: ImuSource, D: DelayNs>(
        source: &mut S,
        delay: &mut D,
        settings: CalibrationSettings,
    ) -> Result<Self> {
        if settings.samples == 0 {
            return Err(Error::InvalidSettings("calibration needs at least one sample"));
        }

        let mut accel_sum = Vector3::<f64>::zeros();
        let mut gyro_sum = Vector3::<f64>::zeros();
        for _ in 0..settings.samples {
            let (ax, ay, az) = source.acceleration().map_err(|e| {
                error!("accelerometer read failed during calibration: {:?}", e);
                Error::SensorRead
            })?;
            let (gx, gy, gz) = source.gyro().map_err(|e| {
                error!("gyroscope read failed during calibration: {:?}", e);
                Error::SensorRead
            })?;
            accel_sum += Vector3::new(ax, ay, az);
            gyro_sum += Vector3::new(gx, gy, gz);
            delay.delay_ms(settings.sample_period_ms);
        }

        let count = settings.samples as f64;
        let mut offsets = Self {
            accel: accel_sum / count,
            gyro: gyro_sum / count,
        };
        offsets.accel.z += GRAVITY_OFFSET;
        Ok(offsets)
    }
}

/// Loads, measures and persists calibration offsets
pub struct CalibrationStore<S> {
    storage: S,
}

impl<S: CalibrationStorage> CalibrationStore<S> {
    /// Wrap a storage backend
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Release the storage backend
    pub fn into_inner(self) -> S {
        self.storage
    }

    /// Load persisted offsets
    ///
    /// # Returns
    /// `Ok(None)` when nothing has been stored yet, or
    /// `Err(Error::CorruptCalibration)` when a record exists but is unusable.
    pub fn load(&mut self) -> Result<Option<CalibrationOffsets>> {
        let mut buf = [0u8; RECORD_CAPACITY];
        let len = match self.storage.read(&mut buf) {
            Ok(Some(len)) => len,
            Ok(None) => return Ok(None),
            Err(e) => {
                error!("calibration storage read failed: {:?}", e);
                return Err(Error::StorageRead);
            }
        };
        let offsets = persist::decode(&buf[..len])?;
        info!("calibration loaded");
        Ok(Some(offsets))
    }

    /// Write all six offsets as one record
    ///
    /// A failure here is fatal for startup: running on offsets that would not
    /// survive a reset leads to silently drifting calibration.
    pub fn persist(&mut self, offsets: &CalibrationOffsets) -> Result<()> {
        let mut buf = [0u8; RECORD_CAPACITY];
        let len = persist::encode(offsets, &mut buf)?;
        self.storage.write(&buf[..len]).map_err(|e| {
            error!("calibration storage write failed: {:?}", e);
            Error::StorageWrite
        })?;
        info!("calibration persisted");
        Ok(())
    }

    /// Return persisted offsets, or measure and persist new ones when absent
    ///
    /// A corrupt record is returned as an error rather than recomputed.
    pub fn load_or_compute<I: ImuSource, D: DelayNs>(
        &mut self,
        source: &mut I,
        delay: &mut D,
        settings: CalibrationSettings,
    ) -> Result<CalibrationOffsets> {
        if let Some(offsets) = self.load()? {
            return Ok(offsets);
        }
        warn!("no stored calibration, keep the vehicle still");
        self.recalibrate(source, delay, settings)
    }

    /// Measure a fresh set of offsets and persist it, replacing any stored set
    pub fn recalibrate<I: ImuSource, D: DelayNs>(
        &mut self,
        source: &mut I,
        delay: &mut D,
        settings: CalibrationSettings,
    ) -> Result<CalibrationOffsets> {
        info!(
            "averaging {} samples every {} ms",
            settings.samples, settings.sample_period_ms
        );
        let offsets = CalibrationOffsets::average(source, delay, settings)?;
        self.persist(&offsets)?;
        Ok(offsets)
    }
}
