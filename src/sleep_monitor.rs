//! Suspend/resume detection from wall-clock gaps.
//!
//! A monotonic clock stops while the host is suspended, so gaps are measured
//! on the wall clock instead.

use std::time::{Duration, SystemTime};

/// Source of wall-clock time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepWakeMonitor {
    threshold: Duration,
}

impl SleepWakeMonitor {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// True when more than the threshold passed between `last` and `now`.
    /// A clock that went backwards never counts as a gap.
    pub fn check(&self, last: SystemTime, now: SystemTime) -> bool {
        now.duration_since(last)
            .map(|gap| gap > self.threshold)
            .unwrap_or(false)
    }
}

/// Start time of the previous loop iteration.
#[derive(Debug, Clone, Copy)]
pub struct LoopClock {
    monitor: SleepWakeMonitor,
    last: Option<SystemTime>,
}

impl LoopClock {
    pub fn new(monitor: SleepWakeMonitor) -> Self {
        Self {
            monitor,
            last: None,
        }
    }

    /// Records the start of an iteration and reports whether the host slept
    /// since the previous one. Always updates the stored timestamp.
    pub fn observe(&mut self, now: SystemTime) -> bool {
        let slept = self
            .last
            .is_some_and(|last| self.monitor.check(last, now));
        self.last = Some(now);
        slept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> SleepWakeMonitor {
        SleepWakeMonitor::new(Duration::from_secs(30))
    }

    #[test]
    fn short_gap_is_not_sleep() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        assert!(!monitor().check(t0, t0 + Duration::from_secs(29)));
    }

    #[test]
    fn long_gap_is_sleep() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        assert!(monitor().check(t0, t0 + Duration::from_secs(31)));
    }

    #[test]
    fn threshold_itself_is_not_sleep() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        assert!(!monitor().check(t0, t0 + Duration::from_secs(30)));
    }

    #[test]
    fn clock_going_backwards_is_ignored() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        assert!(!monitor().check(t0, t0 - Duration::from_secs(3_600)));
    }

    #[test]
    fn loop_clock_tracks_last_iteration() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut clock = LoopClock::new(monitor());

        assert!(!clock.observe(t0));
        assert!(!clock.observe(t0 + Duration::from_secs(2)));
        assert!(clock.observe(t0 + Duration::from_secs(120)));
        // Measured from the resumed iteration, not the first one.
        assert!(!clock.observe(t0 + Duration::from_secs(122)));
    }
}
