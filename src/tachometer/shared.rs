//! Tachometer shared between the edge interrupt, the watchdog timer and the renderer

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;

use super::Tachometer;
use crate::types::RpmEstimate;

/// Interrupt-safe handle around a [`Tachometer`]
///
/// Every mutation runs inside a short critical section and then republishes
/// the RPM and stall flag through atomics. The render path reads those atomics
/// with [`rpm`](Self::rpm) and [`timed_out`](Self::timed_out) and never waits
/// on the edge handler.
///
/// # Example
/// ```
/// use dash_core::{SharedTachometer, Tachometer, TachometerSettings};
///
/// let tacho = Tachometer::new(TachometerSettings::default()).unwrap();
/// let shared = SharedTachometer::new(tacho);
/// shared.start(0);
///
/// // edge interrupt
/// shared.on_falling_edge(1_000);
/// shared.on_falling_edge(2_000);
///
/// // render loop
/// assert_eq!(shared.rpm(), 10_000.0);
/// assert!(!shared.timed_out());
/// ```
pub struct SharedTachometer {
    inner: Mutex<RefCell<Tachometer>>,
    rpm_bits: AtomicU32,
    timed_out: AtomicBool,
}

impl SharedTachometer {
    /// Share an estimator; its current values are published immediately
    pub fn new(tachometer: Tachometer) -> Self {
        let estimate = tachometer.estimate();
        Self {
            inner: Mutex::new(RefCell::new(tachometer)),
            rpm_bits: AtomicU32::new((estimate.rpm as f32).to_bits()),
            timed_out: AtomicBool::new(estimate.timed_out),
        }
    }

    /// Latest RPM, lock-free
    pub fn rpm(&self) -> f32 {
        f32::from_bits(self.rpm_bits.load(Ordering::Acquire))
    }

    /// Sticky stall flag, lock-free
    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    /// Full estimate, taken inside a critical section
    pub fn snapshot(&self) -> RpmEstimate {
        critical_section::with(|cs| self.inner.borrow_ref(cs).estimate())
    }

    /// Falling-edge interrupt handler
    pub fn on_falling_edge(&self, now_us: u64) {
        self.update(|tacho| tacho.on_falling_edge(now_us));
    }

    /// Rising-edge interrupt handler
    pub fn on_rising_edge(&self, now_us: u64) {
        self.update(|tacho| tacho.on_rising_edge(now_us));
    }

    /// Periodic watchdog handler; `true` when this tick declared a stall
    pub fn watchdog_tick(&self, now_us: u64) -> bool {
        self.update(|tacho| tacho.watchdog_tick(now_us))
    }

    /// See [`Tachometer::start`]
    pub fn start(&self, now_us: u64) {
        self.update(|tacho| tacho.start(now_us));
    }

    /// See [`Tachometer::stop`]
    pub fn stop(&self) {
        self.update(|tacho| tacho.stop());
    }

    /// See [`Tachometer::reset`]
    pub fn reset(&self, now_us: u64) {
        self.update(|tacho| tacho.reset(now_us));
    }

    fn update<R>(&self, f: impl FnOnce(&mut Tachometer) -> R) -> R {
        critical_section::with(|cs| {
            let mut tacho = self.inner.borrow_ref_mut(cs);
            let result = f(&mut tacho);
            self.rpm_bits.store((tacho.rpm() as f32).to_bits(), Ordering::Release);
            self.timed_out.store(tacho.timed_out(), Ordering::Release);
            result
        })
    }
}

impl core::fmt::Debug for SharedTachometer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedTachometer")
            .field("rpm", &self.rpm())
            .field("timed_out", &self.timed_out())
            .finish()
    }
}
