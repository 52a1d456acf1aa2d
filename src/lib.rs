#![cfg_attr(not(feature = "std"), no_std)]

//! Orientation and engine-speed core for a vehicle instrument cluster
//!
//! This crate turns raw sensor input into the values a dashboard renders:
//!
//! - [`SensorFusionEngine`] blends gyroscope, accelerometer and magnetometer
//!   samples into roll, pitch and compass heading with a complementary filter.
//! - [`CalibrationStore`] loads persisted bias offsets or measures them at rest
//!   and writes them back as a single JSON record.
//! - [`Tachometer`] estimates RPM from the edges of the ignition pulse line,
//!   with an adaptive averaging window and a stall watchdog.
//!   [`SharedTachometer`] makes it safe to drive from interrupts while the
//!   renderer reads without blocking, and [`PolledTachometer`] drives it from a
//!   busy-polled pin.
//!
//! The crate is `no_std` with the default `std` feature disabled; only the
//! file-backed calibration storage needs `std`.
//!
//! # Quick Start
//!
//! ```rust
//! use dash_core::{
//!     CalibrationOffsets, RawImuSample, SensorFusionEngine, Tachometer, TachometerSettings,
//! };
//!
//! let mut engine = SensorFusionEngine::new(CalibrationOffsets::default());
//!
//! // 50 Hz samples of a level, stationary board facing magnetic east
//! for tick in 0..50u64 {
//!     let (accel, gyro, mag) = ((0.0, 0.0, 1.0), (0.0, 0.0, 0.0), (1.0, 0.0, 0.0));
//!     engine.update(&RawImuSample::new(accel, gyro, mag, tick * 20_000));
//! }
//! let attitude = engine.estimate();
//! assert!(attitude.roll.abs() < 1e-6 && attitude.pitch.abs() < 1e-6);
//!
//! let mut tacho = Tachometer::new(TachometerSettings::default()).unwrap();
//! tacho.start(0);
//! tacho.on_falling_edge(10_000);
//! tacho.on_falling_edge(20_000);
//! assert!((tacho.rpm() - 1_000.0).abs() < 1e-9); // 100 Hz * 10 rpm/Hz
//! ```

pub mod calibration;
pub mod compass;
mod error;
pub mod fusion;
pub mod math;
pub mod persist;
pub mod smoothing;
pub mod tachometer;
mod types;

pub use calibration::{CalibrationOffsets, CalibrationStore, GRAVITY_OFFSET};
pub use error::{Error, Result};
pub use fusion::SensorFusionEngine;
#[cfg(feature = "std")]
pub use persist::FileStorage;
pub use persist::{CalibrationStorage, MemoryStorage};
pub use smoothing::{HeadingAverage, MovingAverage};
pub use tachometer::{PollSettings, PolledTachometer, SharedTachometer, Tachometer};
pub use types::*;
