//! Busy-poll tachometer for pins without edge interrupts

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;
use log::{debug, error};
use serde::{Deserialize, Serialize};

use super::Tachometer;
use crate::error::{Error, Result};
use crate::types::{Clock, RpmEstimate};

/// Pin polling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Delay between two pin reads in microseconds
    pub poll_interval_us: u32,
    /// Reads without the awaited level before the line is declared stalled
    pub timeout_polls: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval_us: 100,
            timeout_polls: 1000,
        }
    }
}

/// Drives a [`Tachometer`] by polling the pulse line
///
/// Each [`measure`](Self::measure) call waits for a falling edge to start a
/// cycle and then times `n_repeats` further cycles, feeding every detected
/// edge to the same estimator the interrupt path uses. Waiting for a level
/// longer than `timeout_polls` reads puts the estimator in its timed-out state.
pub struct PolledTachometer<P, D, C> {
    pin: P,
    delay: D,
    clock: C,
    settings: PollSettings,
    tachometer: Tachometer,
}

impl<P: InputPin, D: DelayNs, C: Clock> PolledTachometer<P, D, C> {
    /// Take ownership of the pin and arm the estimator
    pub fn new(
        pin: P,
        delay: D,
        clock: C,
        mut tachometer: Tachometer,
        settings: PollSettings,
    ) -> Self {
        tachometer.start(clock.now_us());
        Self {
            pin,
            delay,
            clock,
            settings,
            tachometer,
        }
    }

    /// Underlying estimator
    pub fn tachometer(&self) -> &Tachometer {
        &self.tachometer
    }

    /// Latest estimate without touching the pin
    pub fn estimate(&self) -> RpmEstimate {
        self.tachometer.estimate()
    }

    /// Clear the estimate and stall flag
    pub fn reset(&mut self) {
        self.tachometer.reset(self.clock.now_us());
    }

    /// Release the pin, delay and clock
    pub fn release(self) -> (P, D, C) {
        (self.pin, self.delay, self.clock)
    }

    /// Time up to `n_repeats` pulse cycles and return the updated estimate
    ///
    /// Returns immediately once timed out; call [`reset`](Self::reset) to
    /// measure again.
    pub fn measure(&mut self) -> Result<RpmEstimate> {
        if self.tachometer.timed_out() {
            return Ok(self.tachometer.estimate());
        }

        // Time spent outside this call is not part of any cycle
        self.tachometer.resync(self.clock.now_us());

        let cycles = self.tachometer.n_repeats();
        for _ in 0..=cycles {
            if !self.wait_for_level(true)? {
                break;
            }
            self.tachometer.on_rising_edge(self.clock.now_us());
            if !self.wait_for_level(false)? {
                break;
            }
            self.tachometer.on_falling_edge(self.clock.now_us());
        }

        debug!("polled {} cycles", cycles);
        Ok(self.tachometer.estimate())
    }

    /// Poll until the pin reads `high`; `false` when the poll budget ran out
    fn wait_for_level(&mut self, high: bool) -> Result<bool> {
        let mut polls = 0;
        loop {
            let level = self.pin.is_high().map_err(|e| {
                error!("tachometer pin read failed: {:?}", e);
                Error::PinRead
            })?;
            if level == high {
                return Ok(true);
            }
            polls += 1;
            if polls > self.settings.timeout_polls {
                self.tachometer.mark_timed_out();
                return Ok(false);
            }
            self.delay.delay_us(self.settings.poll_interval_us);
        }
    }
}
