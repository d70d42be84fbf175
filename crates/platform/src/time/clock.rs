use std::cell::Cell;
use std::rc::Rc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A nanosecond time source.
pub trait Clock {
    fn now_ns(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }
}

/// Deterministic clock for tests and scripted runs.
///
/// Clones share the same time value, so a test can hand one clone to a device and advance the
/// other.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ns: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now_ns: u64) -> Self {
        let clock = Self::new();
        clock.set_ns(now_ns);
        clock
    }

    pub fn set_ns(&self, now_ns: u64) {
        self.now_ns.set(now_ns);
    }

    /// # Panics
    ///
    /// Panics if advancing would overflow `u64`.
    pub fn advance_ns(&self, delta_ns: u64) {
        let next = self
            .now_ns
            .get()
            .checked_add(delta_ns)
            .expect("manual clock overflowed u64::MAX");
        self.now_ns.set(next);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.get()
    }
}

/// Monotonic nanoseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Host wall clock in nanoseconds since the Unix epoch, at whole-second resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        secs.saturating_mul(NANOS_PER_SEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let device_view = clock.clone();
        clock.advance_ns(1_500);
        assert_eq!(device_view.now_ns(), 1_500);
        device_view.set_ns(42);
        assert_eq!(clock.now_ns(), 42);
    }

    #[test]
    fn system_clock_is_whole_seconds() {
        let now = SystemClock.now_ns();
        assert_eq!(now % NANOS_PER_SEC, 0);
        assert!(now > 0);
    }

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }
}
