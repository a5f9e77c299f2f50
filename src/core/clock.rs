use std::thread;
use std::time::{Duration, Instant};

/// Time source for stage onsets, reaction times and blocking delays.
///
/// Timestamps are seconds since the clock's epoch.
pub trait Clock {
    fn now(&self) -> f64;

    fn sleep(&mut self, d: Duration);

    /// Called with the timestamp of each choice event (or the deadline on
    /// timeout). Wall clocks have nothing to do; virtual clocks jump forward.
    fn observe(&mut self, _timestamp: f64) {}
}

/// Monotonic wall clock. Copies share the same epoch.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn sleep(&mut self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

/// Simulated time: sleeping advances the clock instantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualClock {
    now: f64,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> f64 {
        self.now
    }

    fn sleep(&mut self, d: Duration) {
        self.now += d.as_secs_f64();
    }

    fn observe(&mut self, timestamp: f64) {
        if timestamp > self.now {
            self.now = timestamp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_advances_on_sleep_and_observe() {
        let mut c = VirtualClock::new();
        assert_eq!(c.now(), 0.0);
        c.sleep(Duration::from_millis(1500));
        assert!((c.now() - 1.5).abs() < 1e-12);
        c.observe(2.0);
        assert_eq!(c.now(), 2.0);
        // Never runs backwards.
        c.observe(1.0);
        assert_eq!(c.now(), 2.0);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let mut c = SystemClock::new();
        let t0 = c.now();
        c.sleep(Duration::from_millis(2));
        assert!(c.now() >= t0 + 0.002);
    }
}
