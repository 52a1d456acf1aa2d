//! Error type shared by the fallible edges of the crate
//!
//! Only startup paths (calibration, persistence, settings validation) and the
//! busy-poll tachometer fallback can fail. The per-sample fusion update, the
//! edge handler and the watchdog tick never return errors.

/// Errors reported by calibration, persistence and the polled tachometer
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The IMU driver failed while sampling for calibration
    #[error("sensor read failed during calibration")]
    SensorRead,
    /// The calibration backend could not be read
    #[error("calibration storage read failed")]
    StorageRead,
    /// The calibration backend could not be written
    #[error("calibration storage write failed")]
    StorageWrite,
    /// A calibration record exists but is partial, malformed or non-finite
    #[error("calibration record is corrupt")]
    CorruptCalibration,
    /// An encoded calibration record does not fit the storage buffer
    #[error("calibration record exceeds {0} bytes")]
    RecordTooLarge(usize),
    /// The pulse input pin could not be read
    #[error("pulse input read failed")]
    PinRead,
    /// A settings value would break an estimator invariant
    #[error("invalid settings: {0}")]
    InvalidSettings(&'static str),
}

/// Crate-wide result alias
pub type Result<T> = core::result::Result<T, Error>;
