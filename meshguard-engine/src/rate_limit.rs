//! Per-sender token bucket
//!
//! Tokens live on the sender record so the bucket and the decay memory are
//! updated under the same lock.

use meshguard_core::{RateLimitParams, SenderState};

/// Slack for float accumulation when refilling in small steps
const TOKEN_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    enabled: bool,
    capacity: f64,
    refill_per_sec: f64,
}

impl RateLimiter {
    pub fn from_params(params: &RateLimitParams) -> Self {
        Self {
            enabled: params.enabled,
            capacity: params.capacity,
            refill_per_sec: params.refill_per_sec,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Restore tokens for `elapsed_secs` of silence, never beyond capacity
    pub fn refill(&self, state: &mut SenderState, elapsed_secs: f64) {
        let restored = state.token_bucket_level + elapsed_secs.max(0.0) * self.refill_per_sec;
        state.token_bucket_level = restored.clamp(0.0, self.capacity);
    }

    /// Take one token. False means the sender is over its rate.
    pub fn try_acquire(&self, state: &mut SenderState) -> bool {
        if !self.enabled {
            return true;
        }
        if state.token_bucket_level + TOKEN_EPSILON >= 1.0 {
            state.token_bucket_level = (state.token_bucket_level - 1.0).max(0.0);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state(level: f64) -> SenderState {
        SenderState::new("node-7", Utc::now(), 0.5, level)
    }

    #[test]
    fn test_burst_up_to_capacity() {
        let limiter = RateLimiter::from_params(&RateLimitParams::default());
        let mut s = state(5.0);
        for _ in 0..5 {
            assert!(limiter.try_acquire(&mut s));
        }
        assert!(!limiter.try_acquire(&mut s));
        assert_eq!(s.token_bucket_level, 0.0);
    }

    #[test]
    fn test_refill_restores_one_token_every_three_seconds() {
        let limiter = RateLimiter::from_params(&RateLimitParams::default());
        let mut s = state(0.0);
        limiter.refill(&mut s, 1.0);
        assert!(!limiter.try_acquire(&mut s));
        limiter.refill(&mut s, 2.0);
        assert!(limiter.try_acquire(&mut s));
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let limiter = RateLimiter::from_params(&RateLimitParams::default());
        let mut s = state(4.0);
        limiter.refill(&mut s, 3600.0);
        assert_eq!(s.token_bucket_level, 5.0);
    }

    #[test]
    fn test_shrunk_capacity_clamps_level() {
        let params = RateLimitParams {
            capacity: 2.0,
            ..RateLimitParams::default()
        };
        let limiter = RateLimiter::from_params(&params);
        let mut s = state(5.0);
        limiter.refill(&mut s, 0.0);
        assert_eq!(s.token_bucket_level, 2.0);
    }

    #[test]
    fn test_disabled_limiter_always_admits() {
        let params = RateLimitParams {
            enabled: false,
            ..RateLimitParams::default()
        };
        let limiter = RateLimiter::from_params(&params);
        let mut s = state(0.0);
        assert!(limiter.try_acquire(&mut s));
        assert_eq!(s.token_bucket_level, 0.0);
    }
}
