use dash_core::{CalibrationOffsets, RawImuSample, SensorFusionEngine};

const SAMPLE_PERIOD_US: u64 = 20_000; // 50 Hz acquisition loop

fn main() {
    let mut engine = SensorFusionEngine::new(CalibrationOffsets::default());

    for tick in 0..10 {
        // this loop should repeat each time a new IMU sample is available
        let accelerometer = (0.0, 0.0, 1.0); // replace with accelerometer data in g
        let gyroscope = (0.0, 0.0, 0.0); // replace with gyroscope data in degrees/s
        let magnetometer = (20.0, 5.0, -30.0); // replace with magnetometer data

        let timestamp = tick * SAMPLE_PERIOD_US;
        let sample = RawImuSample::new(accelerometer, gyroscope, magnetometer, timestamp);
        let estimate = engine.update(&sample);

        println!(
            "Roll: {:.2}, Pitch: {:.2}, Heading: {:.2}",
            estimate.roll, estimate.pitch, estimate.heading
        );
    }
}
