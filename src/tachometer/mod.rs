//! Engine speed from the tachometer pulse line
//!
//! [`Tachometer`] holds the estimator state and the per-edge arithmetic. It is
//! plain data driven through `&mut self`; [`SharedTachometer`] wraps it for the
//! interrupt and timer contexts, and [`PolledTachometer`] drives it from a
//! busy-polled pin on boards without edge interrupts.
//!
//! Each falling edge closes one cycle. The cycle duration enters a moving
//! window whose length shrinks at high RPM for faster response and grows at
//! low RPM for noise rejection. A periodic watchdog declares a stall when no
//! edge arrives within the timeout; the stall flag stays set until
//! [`Tachometer::reset`].

mod poll;
mod shared;

pub use poll::{PollSettings, PolledTachometer};
pub use shared::SharedTachometer;

use log::{info, trace, warn};

use crate::error::Result;
use crate::smoothing::{MovingAverage, map_range};
use crate::types::{RpmEstimate, TachometerSettings, TachometerState};

/// Upper bound on the averaging window
pub const MAX_WINDOW: usize = 64;

/// Duty cycle reported before a full high/low cycle has been seen
const DEFAULT_DUTY_PERCENT: f64 = 50.0;

/// Pulse-train RPM estimator
///
/// # Example
/// ```
/// use dash_core::{Tachometer, TachometerSettings, TachometerState};
///
/// let mut tacho = Tachometer::new(TachometerSettings::default()).unwrap();
/// tacho.start(0);
///
/// // 1 kHz pulse train
/// for edge in 1..=100u64 {
///     tacho.on_falling_edge(edge * 1_000);
/// }
/// assert_eq!(tacho.state(), TachometerState::Tracking);
/// assert!((tacho.rpm() - 10_000.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct Tachometer {
    settings: TachometerSettings,
    state: TachometerState,
    /// Edges and watchdog ticks are ignored while disarmed
    armed: bool,
    /// Last falling edge, or the arm time before the first edge
    last_edge_us: u64,
    /// Whether `last_edge_us` is a real edge
    edge_latched: bool,
    last_rise_us: Option<u64>,
    durations: MovingAverage<MAX_WINDOW>,
    n_repeats: usize,
    frequency_hz: f64,
    rpm: f64,
    duty_percent: f64,
    timed_out: bool,
}

impl Tachometer {
    /// Create a disarmed estimator; call [`start`](Self::start) to accept edges
    pub fn new(settings: TachometerSettings) -> Result<Self> {
        settings.validate()?;
        let mut durations = MovingAverage::new();
        durations.set_window(1);
        Ok(Self {
            settings,
            state: TachometerState::Idle,
            armed: false,
            last_edge_us: 0,
            edge_latched: false,
            last_rise_us: None,
            durations,
            n_repeats: 1,
            frequency_hz: 0.0,
            rpm: 0.0,
            duty_percent: DEFAULT_DUTY_PERCENT,
            timed_out: false,
        })
    }

    /// Estimator settings
    pub fn settings(&self) -> TachometerSettings {
        self.settings
    }

    /// Lifecycle state
    pub fn state(&self) -> TachometerState {
        self.state
    }

    /// Whether edges and watchdog ticks are being processed
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Current engine speed
    pub fn rpm(&self) -> f64 {
        self.rpm
    }

    /// Sticky stall flag
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Current averaging window length
    pub fn n_repeats(&self) -> usize {
        self.n_repeats
    }

    /// Snapshot of every published value
    pub fn estimate(&self) -> RpmEstimate {
        RpmEstimate {
            frequency_hz: self.frequency_hz,
            rpm: self.rpm,
            duty_percent: self.duty_percent,
            n_repeats: self.n_repeats,
            timed_out: self.timed_out,
        }
    }

    /// Arm edge capture and the watchdog
    ///
    /// The stall timer starts counting from `now_us`. A timed-out estimator
    /// stays timed out; only [`reset`](Self::reset) recovers it.
    pub fn start(&mut self, now_us: u64) {
        if self.timed_out {
            warn!("tachometer start ignored while timed out, reset first");
            return;
        }
        self.armed = true;
        self.resync(now_us);
        info!("tachometer armed");
    }

    /// Detach edge capture and the watchdog; state is frozen until re-armed
    pub fn stop(&mut self) {
        self.armed = false;
        info!("tachometer stopped");
    }

    /// Clear the estimate and stall flag, then re-arm
    pub fn reset(&mut self, now_us: u64) {
        self.durations.clear();
        self.durations.set_window(1);
        self.n_repeats = 1;
        self.frequency_hz = 0.0;
        self.rpm = 0.0;
        self.duty_percent = DEFAULT_DUTY_PERCENT;
        self.timed_out = false;
        self.state = TachometerState::Idle;
        self.armed = true;
        self.resync(now_us);
        info!("tachometer reset");
    }

    /// Record a rising edge; only used for the duty-cycle diagnostic
    pub fn on_rising_edge(&mut self, now_us: u64) {
        if self.armed {
            self.last_rise_us = Some(now_us);
        }
    }

    /// Close one pulse cycle at a falling edge and update the estimate
    ///
    /// Runs in bounded time over a window of at most [`MAX_WINDOW`] entries.
    pub fn on_falling_edge(&mut self, now_us: u64) {
        if !self.armed {
            return;
        }
        let previous_edge_us = self.last_edge_us;
        self.last_edge_us = now_us;

        // The first edge after arming only marks the start of a cycle
        if !self.edge_latched {
            self.edge_latched = true;
            self.last_rise_us = None;
            return;
        }

        let cycle_us = now_us.saturating_sub(previous_edge_us);
        if cycle_us == 0 {
            trace!("zero-length cycle dropped");
            return;
        }

        if let Some(rise_us) = self.last_rise_us.take() {
            if rise_us >= previous_edge_us && rise_us <= now_us {
                self.duty_percent = (now_us - rise_us) as f64 / cycle_us as f64 * 100.0;
            }
        }

        self.durations.set_window(self.n_repeats);
        let duration_avg = self.durations.push(cycle_us as f64);

        self.frequency_hz = 1_000_000.0 / duration_avg;
        self.n_repeats = self.window_for(self.frequency_hz);
        self.rpm = self.frequency_hz * self.settings.scale_factor;
        self.state = TachometerState::Tracking;
    }

    /// Periodic stall check
    ///
    /// # Returns
    /// `true` when this tick declared the timeout.
    pub fn watchdog_tick(&mut self, now_us: u64) -> bool {
        if !self.armed {
            return false;
        }
        if now_us.saturating_sub(self.last_edge_us) > self.settings.timeout_us {
            self.mark_timed_out();
            return true;
        }
        false
    }

    /// Enter the sticky timed-out state and stop accepting edges
    pub(crate) fn mark_timed_out(&mut self) {
        self.armed = false;
        self.timed_out = true;
        self.state = TachometerState::TimedOut;
        warn!("tachometer timed out at {:.0} rpm", self.rpm);
    }

    /// Restart cycle timing at `now_us` without touching the estimate
    pub(crate) fn resync(&mut self, now_us: u64) {
        self.last_edge_us = now_us;
        self.edge_latched = false;
        self.last_rise_us = None;
    }

    /// Averaging window for a pulse frequency
    fn window_for(&self, frequency_hz: f64) -> usize {
        let mapping = self.settings.window;
        let frequency = frequency_hz.clamp(mapping.low_hz, mapping.high_hz);
        let window = map_range(
            frequency,
            (mapping.low_hz, mapping.high_hz),
            (mapping.low_window as f64, mapping.high_window as f64),
        );
        (libm::round(window) as usize).clamp(1, MAX_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WindowMapping;

    fn armed() -> Tachometer {
        let mut tacho = Tachometer::new(TachometerSettings::default()).unwrap();
        tacho.start(0);
        tacho
    }

    #[test]
    fn test_new_is_idle_and_disarmed() {
        let tacho = Tachometer::new(TachometerSettings::default()).unwrap();
        assert_eq!(tacho.state(), TachometerState::Idle);
        assert!(!tacho.is_armed());
        assert_eq!(tacho.estimate(), RpmEstimate::default());
    }

    #[test]
    fn test_first_edge_only_latches() {
        let mut tacho = armed();
        tacho.on_falling_edge(5_000);
        assert_eq!(tacho.state(), TachometerState::Idle);
        assert_eq!(tacho.rpm(), 0.0);

        tacho.on_falling_edge(6_000);
        assert_eq!(tacho.state(), TachometerState::Tracking);
        assert!((tacho.rpm() - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_mapping_endpoints() {
        let tacho = armed();
        assert_eq!(tacho.window_for(150.0), 50);
        assert_eq!(tacho.window_for(1500.0), 20);
        assert_eq!(tacho.window_for(825.0), 35);
        // flat outside the calibration points
        assert_eq!(tacho.window_for(10.0), 50);
        assert_eq!(tacho.window_for(20_000.0), 20);
    }

    #[test]
    fn test_window_never_below_one() {
        let settings = TachometerSettings {
            window: WindowMapping {
                low_window: 0,
                high_window: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let tacho = Tachometer::new(settings).unwrap();
        assert_eq!(tacho.window_for(500.0), 1);
    }

    #[test]
    fn test_window_capacity_follows_n_repeats() {
        let mut tacho = armed();
        let mut t = 0;
        for _ in 0..200 {
            t += 1_000;
            tacho.on_falling_edge(t);
        }
        // 1 kHz maps to 31 entries
        assert_eq!(tacho.n_repeats(), 31);
        assert!(tacho.durations.len() <= tacho.n_repeats());
    }

    #[test]
    fn test_duty_from_rising_edge() {
        let mut tacho = armed();
        tacho.on_falling_edge(1_000);
        tacho.on_rising_edge(1_750);
        tacho.on_falling_edge(2_000);
        // high for 250 of 1000 us
        assert!((tacho.estimate().duty_percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_length_cycle_dropped() {
        let mut tacho = armed();
        tacho.on_falling_edge(1_000);
        tacho.on_falling_edge(2_000);
        tacho.on_falling_edge(2_000);
        assert!(tacho.rpm().is_finite());
        assert!((tacho.rpm() - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_freezes_state() {
        let mut tacho = armed();
        tacho.on_falling_edge(1_000);
        tacho.on_falling_edge(2_000);
        tacho.stop();

        let before = tacho.estimate();
        tacho.on_falling_edge(2_100);
        assert!(!tacho.watchdog_tick(10_000_000));
        assert_eq!(tacho.estimate(), before);

        tacho.start(10_000_000);
        assert!(tacho.is_armed());
    }

    #[test]
    fn test_start_cannot_clear_timeout() {
        let mut tacho = armed();
        assert!(tacho.watchdog_tick(2_000_000));
        tacho.start(2_000_000);
        assert!(!tacho.is_armed());
        assert!(tacho.timed_out());

        tacho.reset(2_000_000);
        assert!(tacho.is_armed());
        assert!(!tacho.timed_out());
    }
}
