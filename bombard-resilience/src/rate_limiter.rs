//! Slow-start token-bucket rate limiter
//!
//! Each testing flow paces its stage-pipeline launches through one of
//! these. The bucket refills smoothly from a monotonic clock rather than
//! wall-clock sleeps, and the slow-start ramp raises the working rate in
//! fixed steps until the target is reached.

use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Ramp policy for a flow's launch pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowStartPolicy {
    /// Whether to ramp up from a fraction of the target rate
    pub slow_start: bool,

    /// How often the ramp raises the current rate
    #[serde(with = "humantime_serde")]
    pub ramp_interval: Duration,
}

impl Default for SlowStartPolicy {
    fn default() -> Self {
        Self {
            slow_start: true,
            ramp_interval: Duration::from_secs(1),
        }
    }
}

impl SlowStartPolicy {
    /// Policy with the ramp disabled
    pub fn disabled() -> Self {
        Self {
            slow_start: false,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    started_at: Instant,
}

/// Token bucket paced at the scheduled rate, with FIFO acquisition
#[derive(Debug)]
pub struct SlowStartRateLimiter {
    target_rate: u32,
    policy: SlowStartPolicy,
    state: Mutex<BucketState>,
}

impl SlowStartRateLimiter {
    /// Create a limiter for `target_rate` permits per second
    pub fn new(target_rate: u32, policy: SlowStartPolicy) -> Self {
        let now = Instant::now();
        debug!(
            "Creating rate limiter: target {}/s, slow_start {}",
            target_rate, policy.slow_start
        );
        Self {
            target_rate: target_rate.max(1),
            policy,
            state: Mutex::new(BucketState {
                tokens: 1.0,
                last_refill: now,
                started_at: now,
            }),
        }
    }

    /// The configured target rate
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Rate the ramp schedules at `since_start` into the flow
    fn scheduled_rate(&self, since_start: Duration) -> u32 {
        if !self.policy.slow_start {
            return self.target_rate;
        }
        let initial = (self.target_rate / 10).max(1);
        let step = (self.target_rate + 9) / 10;
        let intervals = (since_start.as_nanos() / self.policy.ramp_interval.as_nanos()) as u32;
        initial
            .saturating_add(step.saturating_mul(intervals))
            .min(self.target_rate)
    }

    /// Rate currently in effect
    pub async fn current_rate(&self) -> u32 {
        let state = self.state.lock().await;
        self.scheduled_rate(state.started_at.elapsed())
    }

    fn refill(&self, state: &mut BucketState) -> u32 {
        let now = Instant::now();
        let rate = self.scheduled_rate(now - state.started_at);
        let elapsed = now - state.last_refill;
        // Capacity equals the rate currently in effect
        state.tokens = (state.tokens + elapsed.as_secs_f64() * rate as f64).min(rate as f64);
        state.last_refill = now;
        rate
    }

    /// Suspend until one permit is available.
    ///
    /// The bucket mutex is held across the wait, so concurrent callers
    /// queue behind each other in arrival order.
    pub async fn tick_blocking(&self) {
        let mut state = self.state.lock().await;
        loop {
            let rate = self.refill(&mut state);
            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return;
            }
            let deficit = 1.0 - state.tokens;
            let wait = Duration::from_secs_f64(deficit / rate as f64);
            tokio::time::sleep(wait).await;
        }
    }
}
