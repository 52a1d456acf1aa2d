//! Calibration record encoding and storage backends
//!
//! The record is a JSON object holding exactly six named fields:
//!
//! ```text
//! {"aXerr":0.01,"aYerr":-0.02,"aZerr":0.98,"gXerr":1.2,"gYerr":-0.4,"gZerr":0.05}
//! ```
//!
//! It is always read and written as a whole. A missing field, an extra field
//! or a non-finite value makes the record corrupt.

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationOffsets;
use crate::error::{Error, Result};

/// Largest encoded record accepted by the store
pub const RECORD_CAPACITY: usize = 256;

/// Byte-level backend for the calibration record
pub trait CalibrationStorage {
    /// Backend-specific failure
    type Error: core::fmt::Debug;

    /// Copy the stored record into `buf`
    ///
    /// # Returns
    /// The record length, or `None` when no record has ever been written.
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<Option<usize>, Self::Error>;

    /// Replace the stored record with `bytes`
    fn write(&mut self, bytes: &[u8]) -> core::result::Result<(), Self::Error>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CalibrationRecord {
    #[serde(rename = "aXerr")]
    accel_x: f64,
    #[serde(rename = "aYerr")]
    accel_y: f64,
    #[serde(rename = "aZerr")]
    accel_z: f64,
    #[serde(rename = "gXerr")]
    gyro_x: f64,
    #[serde(rename = "gYerr")]
    gyro_y: f64,
    #[serde(rename = "gZerr")]
    gyro_z: f64,
}

impl From<&CalibrationOffsets> for CalibrationRecord {
    fn from(offsets: &CalibrationOffsets) -> Self {
        Self {
            accel_x: offsets.accel.x,
            accel_y: offsets.accel.y,
            accel_z: offsets.accel.z,
            gyro_x: offsets.gyro.x,
            gyro_y: offsets.gyro.y,
            gyro_z: offsets.gyro.z,
        }
    }
}

impl From<CalibrationRecord> for CalibrationOffsets {
    fn from(record: CalibrationRecord) -> Self {
        CalibrationOffsets::new(
            (record.accel_x, record.accel_y, record.accel_z),
            (record.gyro_x, record.gyro_y, record.gyro_z),
        )
    }
}

/// Encode offsets into `buf`, returning the number of bytes used
pub fn encode(offsets: &CalibrationOffsets, buf: &mut [u8]) -> Result<usize> {
    if !offsets.is_finite() {
        return Err(Error::CorruptCalibration);
    }
    serde_json_core::to_slice(&CalibrationRecord::from(offsets), buf)
        .map_err(|_| Error::RecordTooLarge(buf.len()))
}

/// Decode a complete record
pub fn decode(bytes: &[u8]) -> Result<CalibrationOffsets> {
    let (record, _) = serde_json_core::from_slice::<CalibrationRecord>(bytes).map_err(|e| {
        log::error!("calibration record rejected: {:?}", e);
        Error::CorruptCalibration
    })?;
    let offsets = CalibrationOffsets::from(record);
    if !offsets.is_finite() {
        return Err(Error::CorruptCalibration);
    }
    Ok(offsets)
}

/// The record does not fit the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError;

/// RAM-backed storage
///
/// Useful on boards whose flash driver copies a block in at boot and out on
/// demand, and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    record: Option<heapless::Vec<u8, RECORD_CAPACITY>>,
}

impl MemoryStorage {
    /// Empty storage, as on a board that was never calibrated
    pub fn new() -> Self {
        Self { record: None }
    }

    /// Storage pre-loaded with raw bytes
    pub fn with_bytes(bytes: &[u8]) -> core::result::Result<Self, CapacityError> {
        let record = heapless::Vec::from_slice(bytes).map_err(|_| CapacityError)?;
        Ok(Self { record: Some(record) })
    }

    /// Currently stored bytes
    pub fn bytes(&self) -> Option<&[u8]> {
        self.record.as_deref()
    }
}

impl CalibrationStorage for MemoryStorage {
    type Error = CapacityError;

    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<Option<usize>, Self::Error> {
        let Some(record) = &self.record else {
            return Ok(None);
        };
        let target = buf.get_mut(..record.len()).ok_or(CapacityError)?;
        target.copy_from_slice(record);
        Ok(Some(record.len()))
    }

    fn write(&mut self, bytes: &[u8]) -> core::result::Result<(), Self::Error> {
        self.record = Some(heapless::Vec::from_slice(bytes).map_err(|_| CapacityError)?);
        Ok(())
    }
}

/// JSON file storage, `calib.json` in the working directory by default
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: std::path::PathBuf,
}

#[cfg(feature = "std")]
impl FileStorage {
    /// Default file name
    pub const DEFAULT_PATH: &'static str = "calib.json";

    /// Storage backed by the file at `path`
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(feature = "std")]
impl Default for FileStorage {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PATH)
    }
}

#[cfg(feature = "std")]
impl CalibrationStorage for FileStorage {
    type Error = std::io::Error;

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<Option<usize>> {
        let contents = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let target = buf.get_mut(..contents.len()).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "calibration file too large")
        })?;
        target.copy_from_slice(&contents);
        Ok(Some(contents.len()))
    }

    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::write(&self.path, bytes)
    }
}
