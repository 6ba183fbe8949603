//! Retry pacing for mission checkpoints.
//!
//! After a failed store write, routine checkpoints are skipped until a delay
//! has passed. The delay doubles per consecutive failure up to a ceiling, with
//! up to 20 % random extra so many runners don't retry in lockstep.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

const JITTER_RATIO: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    failures: u32,
    retry_at: Option<Instant>,
}

impl Backoff {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            ceiling: ceiling.max(base),
            failures: 0,
            retry_at: None,
        }
    }

    /// True when no failure is pending or its delay has elapsed.
    pub fn should_attempt(&self) -> bool {
        self.retry_at.map_or(true, |at| Instant::now() >= at)
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.retry_at = None;
    }

    /// Register a failed attempt and return how long to wait before the next one.
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = with_jitter(self.delay_for(self.failures), &mut rand::rng());
        self.retry_at = Some(Instant::now() + delay);
        delay
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn delay_for(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.ceiling)
    }
}

fn with_jitter(delay: Duration, rng: &mut impl Rng) -> Duration {
    let spread_ms = (delay.as_millis() as f64 * JITTER_RATIO) as u64;
    if spread_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rng.random_range(0..=spread_ms))
}
