use std::time::Duration;

pub const DEFAULT_PERIOD: Duration = Duration::from_millis(3_000);
pub const DEFAULT_MAX_PERIOD: Duration = Duration::from_millis(900_000);
const BACKOFF_FACTOR: u32 = 2;

/// Polling period of one fetch loop.
///
/// Keeps `base <= current <= max`: every failure doubles the current period up
/// to `max`, and any success puts it straight back to `base`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            consecutive_failures: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current = self.base;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current = self.current.saturating_mul(BACKOFF_FACTOR).min(self.max);
    }

    pub fn current_period(&self) -> Duration {
        self.current
    }

    #[allow(dead_code)]
    pub fn base_period(&self) -> Duration {
        self.base
    }

    #[allow(dead_code)]
    pub fn max_period(&self) -> Duration {
        self.max
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[allow(dead_code)]
    pub fn is_in_backoff(&self) -> bool {
        self.consecutive_failures > 0
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD, DEFAULT_MAX_PERIOD)
    }
}
