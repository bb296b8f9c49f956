use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Write timestamp source: wall-clock nanoseconds, strictly increasing per
/// clock even when the system time stalls or steps backwards.
#[derive(Debug, Default)]
pub struct TimestampClock {
    last: AtomicI64,
}

impl TimestampClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let now = now_nanos();
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        now.max(previous.saturating_add(1))
    }
}

pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_strictly_increase() {
        let clock = TimestampClock::new();
        let mut previous = clock.next();
        for _ in 0..10_000 {
            let current = clock.next();
            assert!(current > previous, "{} should be > {}", current, previous);
            previous = current;
        }
    }

    #[test]
    fn test_timestamps_track_wall_clock() {
        let clock = TimestampClock::new();
        let before = now_nanos();
        let ts = clock.next();
        assert!(ts >= before);
    }
}
