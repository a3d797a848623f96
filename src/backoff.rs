//! Geometric retry schedule shared by the collector and the dispatcher.
//!
//! Delay after attempt `k` (0-indexed) of `attempts` is
//! `first * (last / first) ^ (k / (attempts - 1))`, so the first retry waits
//! `first` and the final one waits `last`. With `first = 1s`, `last = 5s`,
//! `attempts = 10` this is the collector's `5^(k/9)` seconds; with
//! `last = 60s` it is the dispatcher's `60^(k/(attempts-1))`.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    attempts: u32,
    first: Duration,
    last: Duration,
}

impl Backoff {
    /// `attempts` of zero is treated as one.
    pub fn new(attempts: u32, first: Duration, last: Duration) -> Self {
        let (first, last) = if last < first { (last, first) } else { (first, last) };
        Self {
            attempts: attempts.max(1),
            first,
            last,
        }
    }

    /// Collector schedule: 10 attempts, 1s growing to 5s.
    pub fn collect_default() -> Self {
        Self::new(10, Duration::from_secs(1), Duration::from_secs(5))
    }

    /// Dispatcher schedule: 10 attempts, 1s growing to 60s.
    pub fn push_default() -> Self {
        Self::new(10, Duration::from_secs(1), Duration::from_secs(60))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay to wait after the failed attempt `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.first.is_zero() {
            return Duration::ZERO;
        }

        let steps = (self.attempts - 1).max(1) as f64;
        let progress = (attempt.min(self.attempts - 1) as f64 / steps).min(1.0);
        let ratio = self.last.as_secs_f64() / self.first.as_secs_f64();
        let secs = self.first.as_secs_f64() * ratio.powf(progress);

        Duration::from_secs_f64(secs).clamp(self.first, self.last)
    }

    /// All delays in order, one per attempt.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.attempts).map(|attempt| self.delay(attempt))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::collect_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_schedule_bounds() {
        let backoff = Backoff::collect_default();
        let delays: Vec<_> = backoff.delays().collect();

        assert_eq!(delays.len(), 10);
        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[9], Duration::from_secs(5));
        for delay in &delays {
            assert!(*delay >= Duration::from_secs(1) && *delay <= Duration::from_secs(5));
        }
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_collect_matches_fifth_root_formula() {
        let backoff = Backoff::collect_default();
        for k in 0..10u32 {
            let expected = 5f64.powf(k as f64 / 9.0);
            let actual = backoff.delay(k).as_secs_f64();
            assert!((expected - actual).abs() < 1e-6, "k={k}: {expected} != {actual}");
        }
    }

    #[test]
    fn test_push_schedule_bounds() {
        for attempts in [2u32, 5, 10, 25] {
            let backoff = Backoff::new(attempts, Duration::from_secs(1), Duration::from_secs(60));
            let delays: Vec<_> = backoff.delays().collect();
            assert_eq!(delays.first(), Some(&Duration::from_secs(1)));
            assert_eq!(delays.last(), Some(&Duration::from_secs(60)));
            for delay in delays {
                assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(60));
            }
        }
    }

    #[test]
    fn test_single_attempt_does_not_divide_by_zero() {
        let backoff = Backoff::new(1, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(backoff.attempts(), 1);
        assert_eq!(backoff.delay(0), Duration::from_secs(1));

        let zero = Backoff::new(0, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(zero.attempts(), 1);
    }

    #[test]
    fn test_zero_first_delay_disables_waiting() {
        let backoff = Backoff::new(5, Duration::ZERO, Duration::from_secs(5));
        assert!(backoff.delays().all(|d| d.is_zero()));
    }
}
