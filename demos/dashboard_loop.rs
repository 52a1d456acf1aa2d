//! Host simulation of the cluster: calibration at boot, a 50 Hz fusion loop,
//! an edge thread standing in for the pulse interrupt and a 1 Hz watchdog.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use dash_core::{
    CalibrationSettings, CalibrationStore, FileStorage, FusionSettings, ImuSource, RawImuSample,
    SensorFusionEngine, SharedTachometer, Tachometer, TachometerSettings,
};
use embedded_hal::delay::DelayNs;

/// IMU slowly rocking about the roll axis
struct SimulatedImu {
    start: Instant,
}

impl SimulatedImu {
    fn roll(&self) -> f64 {
        10.0 * (self.start.elapsed().as_secs_f64() * 0.5).sin()
    }
}

impl ImuSource for SimulatedImu {
    type Error = ();

    fn acceleration(&mut self) -> Result<(f64, f64, f64), ()> {
        let roll = self.roll().to_radians();
        Ok((0.01, roll.sin(), roll.cos() - 0.02))
    }

    fn gyro(&mut self) -> Result<(f64, f64, f64), ()> {
        let rate = 5.0 * (self.start.elapsed().as_secs_f64() * 0.5).cos();
        Ok((rate + 0.4, -0.2, 0.1))
    }

    fn magnetic(&mut self) -> Result<(f64, f64, f64), ()> {
        Ok((20.0, 5.0, -30.0))
    }
}

struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }
}

fn main() {
    let boot = Instant::now();
    let now_us = move || boot.elapsed().as_micros() as u64;

    let mut imu = SimulatedImu { start: boot };
    let path = std::env::temp_dir().join(FileStorage::DEFAULT_PATH);
    let mut store = CalibrationStore::new(FileStorage::new(&path));
    let settings = CalibrationSettings {
        samples: 50,
        ..Default::default()
    };
    let offsets = match store.load_or_compute(&mut imu, &mut StdDelay, settings) {
        Ok(offsets) => offsets,
        Err(e) => {
            eprintln!("calibration failed: {}", e);
            std::process::exit(1);
        }
    };
    println!("calibration from {}: {:?}", path.display(), offsets);

    let fusion_settings = FusionSettings {
        heading_window: 5,
        ..Default::default()
    };
    let mut engine = match SensorFusionEngine::with_settings(fusion_settings, offsets) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("invalid fusion settings: {}", e);
            std::process::exit(1);
        }
    };

    let tachometer = match Tachometer::new(TachometerSettings::default()) {
        Ok(tachometer) => Arc::new(SharedTachometer::new(tachometer)),
        Err(e) => {
            eprintln!("invalid tachometer settings: {}", e);
            std::process::exit(1);
        }
    };
    tachometer.start(now_us());

    let running = Arc::new(AtomicBool::new(true));

    // Pulse line: accelerates from 40 Hz to 400 Hz, then goes silent
    let edges = {
        let tachometer = Arc::clone(&tachometer);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut frequency = 40.0;
            while running.load(Ordering::Relaxed) && frequency < 400.0 {
                thread::sleep(Duration::from_secs_f64(1.0 / frequency));
                tachometer.on_falling_edge(now_us());
                frequency *= 1.002;
            }
        })
    };

    let watchdog = {
        let tachometer = Arc::clone(&tachometer);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_secs(1));
                if tachometer.watchdog_tick(now_us()) {
                    println!("engine stalled");
                }
            }
        })
    };

    for frame in 0..500 {
        match RawImuSample::acquire(&mut imu, &now_us) {
            Ok(sample) => {
                engine.update(&sample);
            }
            Err(()) => continue,
        }

        if frame % 25 == 0 {
            let attitude = engine.estimate();
            println!(
                "roll {:6.2}  pitch {:6.2}  heading {:6.2}  rpm {:7.0}{}",
                attitude.roll,
                attitude.pitch,
                attitude.heading,
                tachometer.rpm(),
                if tachometer.timed_out() { "  (stalled)" } else { "" }
            );
        }
        thread::sleep(Duration::from_millis(20));
    }

    running.store(false, Ordering::Relaxed);
    let _ = edges.join();
    let _ = watchdog.join();
}
