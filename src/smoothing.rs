//! Smoothing helpers shared by the fusion engine and the tachometer
//!
//! [`lowpass`] and [`map_range`] are pure functions. The window types own their
//! history, so each component keeps its own instance and nothing is shared
//! between timing domains.

use heapless::Deque;

/// Exponential low-pass step: `alpha * new + (1 - alpha) * old`
///
/// # Example
/// ```
/// use dash_core::smoothing::lowpass;
///
/// assert_eq!(lowpass(1.0, 5.0, 2.0), 5.0); // alpha 1 passes the new value
/// assert_eq!(lowpass(0.0, 5.0, 2.0), 2.0); // alpha 0 holds the old value
/// ```
pub fn lowpass(alpha: f64, new_value: f64, old_value: f64) -> f64 {
    alpha * new_value + (1.0 - alpha) * old_value
}

/// Linearly remap `value` from `input` onto `output`.
///
/// No clamping is applied; values outside `input` extrapolate.
pub fn map_range(value: f64, input: (f64, f64), output: (f64, f64)) -> f64 {
    let (a, b) = input;
    let (c, d) = output;
    (value - a) / (b - a) * (d - c) + c
}

/// Fixed-capacity moving average with an adjustable active window.
///
/// `N` bounds the storage; [`set_window`](Self::set_window) picks how many of
/// the most recent values take part (at least one, at most `N`). Shrinking the
/// window evicts the oldest values immediately.
#[derive(Debug, Clone)]
pub struct MovingAverage<const N: usize> {
    values: Deque<f64, N>,
    window: usize,
    sum: f64,
}

impl<const N: usize> MovingAverage<N> {
    /// Create an empty average using the full capacity as its window
    pub const fn new() -> Self {
        Self {
            values: Deque::new(),
            window: N,
            sum: 0.0,
        }
    }

    /// Current window length
    pub fn window(&self) -> usize {
        self.window
    }

    /// Change the active window, clamped to `1..=N`
    pub fn set_window(&mut self, window: usize) {
        self.window = window.clamp(1, N);
        while self.values.len() > self.window {
            self.evict();
        }
    }

    /// Push a value, evicting the oldest when the window is full, and return
    /// the mean of the retained values
    pub fn push(&mut self, value: f64) -> f64 {
        while self.values.len() >= self.window {
            self.evict();
        }
        // capacity is N >= window, so this cannot fail
        let _ = self.values.push_back(value);
        self.sum += value;
        self.mean()
    }

    /// Mean of the retained values, or zero when empty
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.sum / self.values.len() as f64
    }

    /// Number of retained values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no values are retained
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the window holds as many values as it can
    pub fn is_full(&self) -> bool {
        self.values.len() >= self.window
    }

    /// Drop every retained value, keeping the window length
    pub fn clear(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }

    fn evict(&mut self) {
        if self.values.pop_front().is_some() {
            // Subtracting a large evicted value would cancel the small ones left
            self.sum = self.values.iter().sum();
        }
    }
}

impl<const N: usize> Default for MovingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Moving average of compass headings in degrees.
///
/// When the window straddles north (some headings above 270° and some below
/// 90°) the high values are unwrapped by -360° before averaging, so a window of
/// 350° and 10° averages to 0° rather than 180°.
#[derive(Debug, Clone)]
pub struct HeadingAverage<const N: usize> {
    headings: Deque<f64, N>,
    window: usize,
}

impl<const N: usize> HeadingAverage<N> {
    /// Create an empty average with the given window, clamped to `1..=N`
    pub fn new(window: usize) -> Self {
        Self {
            headings: Deque::new(),
            window: window.clamp(1, N),
        }
    }

    /// Push a heading and return the wrap-aware mean in `[0, 360)`
    pub fn push(&mut self, heading: f64) -> f64 {
        while self.headings.len() >= self.window {
            self.headings.pop_front();
        }
        let _ = self.headings.push_back(heading);
        self.mean()
    }

    /// Wrap-aware mean of the retained headings, or zero when empty
    pub fn mean(&self) -> f64 {
        if self.headings.is_empty() {
            return 0.0;
        }
        let straddles_north = self.headings.iter().any(|&h| h > 270.0)
            && self.headings.iter().any(|&h| h < 90.0);
        let sum: f64 = self
            .headings
            .iter()
            .map(|&h| if straddles_north && h > 270.0 { h - 360.0 } else { h })
            .sum();
        crate::math::wrap_degrees(sum / self.headings.len() as f64)
    }

    /// Drop every retained heading
    pub fn clear(&mut self) {
        self.headings.clear();
    }
}
