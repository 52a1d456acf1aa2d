use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;

use dash_core::{
    Error, PollSettings, PolledTachometer, SharedTachometer, Tachometer,
    TachometerSettings, TachometerState,
};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin};
use rand::prelude::*;
use rand_pcg::Pcg64;

fn armed() -> Tachometer {
    let mut tacho = Tachometer::new(TachometerSettings::default()).unwrap();
    tacho.start(0);
    tacho
}

/// Feed `cycles` evenly spaced falling edges after `start_us`, returning the last edge time
fn feed(tacho: &mut Tachometer, start_us: u64, period_us: u64, cycles: u64) -> u64 {
    let mut now = start_us;
    for _ in 0..cycles {
        now += period_us;
        tacho.on_falling_edge(now);
    }
    now
}

#[test]
fn test_constant_pulse_train() {
    let mut tacho = armed();
    feed(&mut tacho, 0, 1_000, 100);

    let estimate = tacho.estimate();
    assert_eq!(estimate.frequency_hz, 1_000.0);
    assert_eq!(estimate.rpm, 10_000.0);
    assert_eq!(estimate.n_repeats, 31);
    assert!(!estimate.timed_out);
    assert_eq!(tacho.state(), TachometerState::Tracking);
}

#[test]
fn test_window_follows_frequency() {
    let mut slow = armed();
    feed(&mut slow, 0, 10_000, 60); // 100 Hz, below the low point
    assert_eq!(slow.n_repeats(), 50);

    let mut fast = armed();
    feed(&mut fast, 0, 250, 60); // 4 kHz, above the high point
    assert_eq!(fast.n_repeats(), 20);
}

#[test]
fn test_speed_change_converges_within_window() {
    let mut tacho = armed();
    let now = feed(&mut tacho, 0, 10_000, 80);
    assert!((tacho.rpm() - 1_000.0).abs() < 1e-9);

    // window is at most 50 entries, so 50 new cycles flush the old speed
    feed(&mut tacho, now, 1_000, 50);
    assert!((tacho.rpm() - 10_000.0).abs() < 1e-6, "rpm {}", tacho.rpm());
}

#[test]
fn test_jittered_edges_average_out() {
    let mut rng = Pcg64::seed_from_u64(7);
    let mut tacho = armed();
    let mut now = 0u64;
    for _ in 0..500 {
        now += rng.random_range(950..=1_050);
        tacho.on_falling_edge(now);
    }

    let rpm = tacho.rpm();
    assert!((rpm - 10_000.0).abs() < 300.0, "rpm {}", rpm);
}

#[test]
fn test_watchdog_timeout_and_reset() {
    let mut tacho = armed();
    let last_edge = feed(&mut tacho, 0, 1_000, 40);
    let before = tacho.rpm();

    // 1 Hz watchdog; the first tick is still within the timeout
    assert!(!tacho.watchdog_tick(last_edge + 1_000_000));
    assert!(tacho.watchdog_tick(last_edge + 2_000_000));
    assert!(tacho.timed_out());
    assert_eq!(tacho.state(), TachometerState::TimedOut);
    assert_eq!(tacho.rpm(), before);

    // edges are ignored until reset
    feed(&mut tacho, last_edge + 2_000_000, 2_000, 10);
    assert_eq!(tacho.rpm(), before);

    let now = last_edge + 3_000_000;
    tacho.reset(now);
    let estimate = tacho.estimate();
    assert!(!estimate.timed_out);
    assert_eq!(estimate.rpm, 0.0);
    assert_eq!(estimate.n_repeats, 1);
    assert_eq!(estimate.duty_percent, 50.0);
    assert_eq!(tacho.state(), TachometerState::Idle);

    feed(&mut tacho, now, 2_000, 5);
    assert_eq!(tacho.rpm(), 5_000.0);
}

#[test]
fn test_never_seen_edge_times_out() {
    let mut tacho = armed();
    assert!(!tacho.watchdog_tick(999_999));
    assert!(tacho.watchdog_tick(1_000_001));
    assert_eq!(tacho.estimate().rpm, 0.0);
}

#[test]
fn test_invalid_settings_rejected() {
    let settings = TachometerSettings {
        timeout_us: 0,
        ..Default::default()
    };
    assert!(matches!(Tachometer::new(settings), Err(Error::InvalidSettings(_))));
}

/// The renderer only ever sees fully published values while edges arrive on another thread
#[test]
fn test_shared_reads_while_edges_arrive() {
    let shared = Arc::new(SharedTachometer::new(armed()));

    let producer = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            let mut now = 0;
            for _ in 0..20_000 {
                now += 1_000;
                shared.on_falling_edge(now);
            }
        })
    };

    for _ in 0..20_000 {
        let rpm = shared.rpm();
        assert!(rpm == 0.0 || rpm == 10_000.0, "torn read {}", rpm);
        assert!(!shared.timed_out());
    }
    producer.join().unwrap();

    assert_eq!(shared.rpm(), 10_000.0);
    assert_eq!(shared.snapshot().n_repeats, 31);
}

#[test]
fn test_shared_watchdog_from_timer_thread() {
    let shared = Arc::new(SharedTachometer::new(armed()));
    shared.on_falling_edge(1_000);
    shared.on_falling_edge(2_000);

    let timer = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || shared.watchdog_tick(5_000_000))
    };
    assert!(timer.join().unwrap());
    assert!(shared.timed_out());

    shared.stop();
    shared.reset(6_000_000);
    assert!(!shared.timed_out());
}

struct SquareWave {
    now: Rc<Cell<u64>>,
    period_us: u64,
    high_us: u64,
}

impl ErrorType for SquareWave {
    type Error = Infallible;
}

impl InputPin for SquareWave {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.now.get() % self.period_us < self.high_us)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

struct SimDelay {
    now: Rc<Cell<u64>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.now.set(self.now.get() + (ns / 1_000) as u64);
    }

    fn delay_us(&mut self, us: u32) {
        self.now.set(self.now.get() + us as u64);
    }
}

/// Polling and interrupt capture of the same waveform produce the same estimate
#[test]
fn test_polled_matches_interrupt_driven() {
    let now = Rc::new(Cell::new(0));
    let pin = SquareWave {
        now: now.clone(),
        period_us: 1_000,
        high_us: 500,
    };
    let delay = SimDelay { now: now.clone() };
    let clock = {
        let now = now.clone();
        move || now.get()
    };
    let settings = PollSettings {
        poll_interval_us: 10,
        timeout_polls: 1_000,
    };
    let tacho = Tachometer::new(TachometerSettings::default()).unwrap();
    let mut polled = PolledTachometer::new(pin, delay, clock, tacho, settings);
    for _ in 0..5 {
        polled.measure().unwrap();
    }

    let mut interrupt = armed();
    let mut edge = 500;
    interrupt.on_falling_edge(edge);
    for _ in 0..100 {
        interrupt.on_rising_edge(edge + 500);
        edge += 1_000;
        interrupt.on_falling_edge(edge);
    }

    assert_eq!(polled.estimate(), interrupt.estimate());
    assert!(polled.tachometer().is_armed());
    assert!(now.get() > 0);
}
