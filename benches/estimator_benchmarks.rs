use criterion::{Criterion, black_box, criterion_group, criterion_main};
use dash_core::{
    CalibrationOffsets, RawImuSample, SensorFusionEngine, SharedTachometer, Tachometer,
    TachometerSettings,
};
use rand::prelude::*;
use rand_pcg::Pcg64;
use std::f64::consts::PI;

// Pre-generated samples so RNG cost stays out of the measured loop
struct PreGeneratedSamples {
    samples: Vec<RawImuSample>,
    index: usize,
}

impl PreGeneratedSamples {
    fn new(count: usize, seed: u64) -> Self {
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut samples = Vec::with_capacity(count);

        for i in 0..count {
            let time = i as f64 * 0.02; // 50Hz acquisition loop
            let phase = time * 0.5 * 2.0 * PI;

            let accel = (
                -0.1 * phase.sin() + rng.random_range(-0.002..0.002),
                0.1 * phase.cos() + rng.random_range(-0.002..0.002),
                1.0 + rng.random_range(-0.002..0.002),
            );
            let gyro = (
                5.0 * phase.sin() + rng.random_range(-0.1..0.1),
                5.0 * (phase * 1.3).cos() + rng.random_range(-0.1..0.1),
                2.0 * (phase * 0.7).sin() + rng.random_range(-0.1..0.1),
            );
            let mag = (
                25.0 + 2.0 * phase.cos() + rng.random_range(-0.5..0.5),
                3.0 * phase.sin() + rng.random_range(-0.5..0.5),
                -15.0 + rng.random_range(-0.5..0.5),
            );

            samples.push(RawImuSample::new(accel, gyro, mag, i as u64 * 20_000));
        }

        Self { samples, index: 0 }
    }

    fn next(&mut self) -> RawImuSample {
        let sample = self.samples[self.index];
        self.index = (self.index + 1) % self.samples.len();
        sample
    }
}

/// Benchmark one fusion step on a settled engine
fn bench_fusion_update(c: &mut Criterion) {
    let mut engine = SensorFusionEngine::new(CalibrationOffsets::default());
    let mut data = PreGeneratedSamples::new(1000, 42);
    for _ in 0..100 {
        engine.update(&data.next());
    }

    c.bench_function("fusion_update", |b| {
        b.iter(|| engine.update(black_box(&data.next())))
    });
}

/// Benchmark the falling-edge handler with a full averaging window
fn bench_falling_edge(c: &mut Criterion) {
    let mut tacho = Tachometer::new(TachometerSettings::default()).unwrap();
    tacho.start(0);
    let mut now = 0u64;

    c.bench_function("tachometer_falling_edge", |b| {
        b.iter(|| {
            now += 6_667; // ~150 Hz, widest window
            tacho.on_falling_edge(black_box(now))
        })
    });
}

/// Benchmark the interrupt path through the critical section
fn bench_shared_edge(c: &mut Criterion) {
    let shared = SharedTachometer::new(Tachometer::new(TachometerSettings::default()).unwrap());
    shared.start(0);
    let mut now = 0u64;

    c.bench_function("shared_tachometer_edge", |b| {
        b.iter(|| {
            now += 1_000;
            shared.on_falling_edge(black_box(now))
        })
    });
}

/// Benchmark the renderer's lock-free read
fn bench_shared_read(c: &mut Criterion) {
    let shared = SharedTachometer::new(Tachometer::new(TachometerSettings::default()).unwrap());

    c.bench_function("shared_tachometer_rpm", |b| b.iter(|| black_box(shared.rpm())));
}

criterion_group!(
    benches,
    bench_fusion_update,
    bench_falling_edge,
    bench_shared_edge,
    bench_shared_read
);
criterion_main!(benches);
