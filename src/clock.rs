//! Active-duration accounting and the monotonic time sources that feed it.

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// A time source reporting seconds since an arbitrary fixed origin.
///
/// Implementations are expected never to run backwards; the engine treats a
/// reading below the previous one as a fatal clock regression.
pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> f64;
}

/// `std::time::Instant` based source, immune to wall-clock adjustments
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Externally driven clock for replay and tests. Clones share the same reading.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    reading: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            reading: Arc::new(Mutex::new(start)),
        }
    }

    /// Set the reading. Going backwards is allowed so regressions can be replayed.
    pub fn set(&self, seconds: f64) {
        if let Ok(mut reading) = self.reading.lock() {
            *reading = seconds;
        }
    }

    pub fn advance(&self, seconds: f64) {
        if let Ok(mut reading) = self.reading.lock() {
            *reading += seconds;
        }
    }
}

impl MonotonicClock for ManualClock {
    fn now(&self) -> f64 {
        self.reading.lock().map(|r| *r).unwrap_or(0.0)
    }
}

/// Elapsed active time across pause/resume cycles
#[derive(Clone, Debug, Default)]
pub struct SessionClock {
    active_seconds: f64,
    running_since: Option<f64>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn resume(&mut self, now: f64) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn pause(&mut self, now: f64) {
        if let Some(since) = self.running_since.take() {
            self.active_seconds += (now - since).max(0.0);
        }
    }

    /// Accumulated seconds plus the open interval, if any
    pub fn elapsed(&self, now: f64) -> f64 {
        let open = self
            .running_since
            .map(|since| (now - since).max(0.0))
            .unwrap_or(0.0);
        self.active_seconds + open
    }

    /// Seconds banked by completed intervals only
    pub fn active_seconds(&self) -> f64 {
        self.active_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_while_running() {
        let mut clock = SessionClock::new();
        clock.resume(100.0);
        assert_eq!(clock.elapsed(100.0), 0.0);
        assert_eq!(clock.elapsed(112.5), 12.5);
    }

    #[test]
    fn test_pause_excludes_gap() {
        let mut clock = SessionClock::new();
        clock.resume(0.0);
        clock.pause(5.0);
        assert_eq!(clock.elapsed(40.0), 5.0);
        clock.resume(50.0);
        assert_eq!(clock.elapsed(60.0), 15.0);
    }

    #[test]
    fn test_repeated_pause_resume_are_noops() {
        let mut clock = SessionClock::new();
        clock.resume(0.0);
        clock.resume(3.0); // ignored, already running
        clock.pause(4.0);
        clock.pause(9.0); // ignored, already paused
        assert_eq!(clock.active_seconds(), 4.0);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_elapsed_non_decreasing_over_cycles() {
        let mut clock = SessionClock::new();
        let mut previous = 0.0;
        let mut t = 0.0;
        for _ in 0..20 {
            clock.resume(t);
            t += 1.5;
            let e = clock.elapsed(t);
            assert!(e >= previous);
            previous = e;
            clock.pause(t);
            t += 7.0;
            assert_eq!(clock.elapsed(t), previous);
        }
        assert_eq!(clock.active_seconds(), 30.0);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(1.0);
        let view = clock.clone();
        clock.advance(2.5);
        assert_eq!(view.now(), 3.5);
        clock.set(0.5);
        assert_eq!(view.now(), 0.5);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
