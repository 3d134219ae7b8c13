//! Time helpers.

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

/// Milliseconds since the UNIX epoch, or 0 if the clock is set before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Exponential backoff step: doubles `current`, capped at `max`.
///
/// A zero `current` starts the sequence at one millisecond.
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    if current.is_zero() {
        return Duration::from_millis(1).min(max);
    }
    current.saturating_mul(2).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let max = Duration::from_millis(10);
        let mut d = Duration::ZERO;
        let mut seen = Vec::new();
        for _ in 0..6 {
            d = next_backoff(d, max);
            seen.push(d.as_millis());
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn backoff_respects_tiny_cap() {
        let max = Duration::from_micros(500);
        assert_eq!(next_backoff(Duration::ZERO, max), max);
    }
}
