// Copyright (c) 2024 Mike Tsao

use crate::traits::HostClock;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Wall-clock time, in seconds since this [SystemClock] was created.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}
impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}
impl HostClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that moves only when told to. Useful for tests and for rendering
/// faster than real time. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock(Arc<AtomicU64>);
impl HostClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}
impl ManualClock {
    /// Moves the clock to `time`. Requests to move backwards are ignored.
    pub fn set(&self, time: f64) {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let current_time = f64::from_bits(current);
            if time.is_nan() || time <= current_time {
                if time < current_time {
                    log::warn!("ManualClock: refusing to move back from {current_time} to {time}");
                }
                return;
            }
            match self.0.compare_exchange_weak(
                current,
                time.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds.max(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_and_monotonic() {
        let clock = ManualClock::default();
        assert_eq!(clock.now(), 0.0);

        let other = clock.clone();
        other.set(1.5);
        assert_eq!(clock.now(), 1.5);

        clock.set(1.0);
        assert_eq!(clock.now(), 1.5, "time never runs backwards");

        clock.advance(0.25);
        assert_eq!(other.now(), 1.75);
    }

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock::default();
        let a = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(clock.now() > a);
    }
}
