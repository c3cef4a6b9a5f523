//! Inbound rate limiter
//!
//! Two token buckets gate every local request: one lazily created per
//! thing, and one aggregate bucket shared across all things. Both must
//! have a token available; a denial from the aggregate bucket rolls
//! back the per-thing bucket's provisional debit so a throttled caller
//! never loses a token it didn't actually spend.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Bucket {
    capacity: f64,
    refill_rate: f64,
    tokens: Mutex<(f64, Instant)>,
}

impl Bucket {
    fn new(capacity: u32) -> Self {
        Self {
            capacity: capacity as f64,
            refill_rate: capacity as f64,
            tokens: Mutex::new((capacity as f64, Instant::now())),
        }
    }

    fn refill_locked(&self, state: &mut (f64, Instant)) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.1).as_secs_f64();
        if elapsed > 0.0 {
            state.0 = (state.0 + elapsed * self.refill_rate).min(self.capacity);
            state.1 = now;
        }
    }

    /// Attempts to debit one token, returning whether it succeeded.
    fn try_debit(&self) -> bool {
        let mut state = self.tokens.lock().expect("bucket mutex poisoned");
        self.refill_locked(&mut state);
        if state.0 >= 1.0 {
            state.0 -= 1.0;
            true
        } else {
            false
        }
    }

    /// Credits one token back (rollback of a provisional debit).
    fn credit(&self) {
        let mut state = self.tokens.lock().expect("bucket mutex poisoned");
        state.0 = (state.0 + 1.0).min(self.capacity);
    }

    /// Rescales the current token count proportionally to a capacity
    /// change, driven by external configuration rather than adaptive
    /// telemetry: `new_tokens = old_tokens * new_capacity / old_capacity`.
    fn rescale(&mut self, new_capacity: u32) {
        let mut state = self.tokens.lock().expect("bucket mutex poisoned");
        self.refill_locked(&mut state);
        let ratio = new_capacity as f64 / self.capacity;
        state.0 = (state.0 * ratio).min(new_capacity as f64);
        self.capacity = new_capacity as f64;
        self.refill_rate = new_capacity as f64;
    }
}

/// Dual-bucket inbound rate limiter: per-thing plus aggregate.
pub struct InboundRateLimiter {
    per_thing_rate: Mutex<u32>,
    per_thing: DashMap<String, Bucket>,
    aggregate: Mutex<Bucket>,
    aggregate_rate: Mutex<u32>,
}

impl InboundRateLimiter {
    /// Creates a limiter with `per_thing_rate` tokens/second/thing and
    /// `aggregate_rate` tokens/second overall; burst is one second of
    /// tokens for both.
    #[must_use]
    pub fn new(per_thing_rate: u32, aggregate_rate: u32) -> Self {
        Self {
            per_thing_rate: Mutex::new(per_thing_rate),
            per_thing: DashMap::new(),
            aggregate: Mutex::new(Bucket::new(aggregate_rate)),
            aggregate_rate: Mutex::new(aggregate_rate),
        }
    }

    /// Attempts to acquire one token from both the per-thing bucket for
    /// `thing` and the aggregate bucket. An empty `thing` is treated as
    /// a no-op (never throttled).
    #[must_use]
    pub fn try_acquire(&self, thing: &str) -> bool {
        if thing.is_empty() {
            return true;
        }

        let rate = *self.per_thing_rate.lock().expect("rate mutex poisoned");
        let bucket = self.per_thing.entry(thing.to_string()).or_insert_with(|| Bucket::new(rate));
        if !bucket.try_debit() {
            return false;
        }

        let aggregate = self.aggregate.lock().expect("aggregate mutex poisoned");
        if aggregate.try_debit() {
            true
        } else {
            bucket.credit();
            false
        }
    }

    /// Updates both configured rates, proportionally rescaling any
    /// already-created buckets' current token counts.
    pub fn set_rates(&self, per_thing_rate: u32, aggregate_rate: u32) {
        *self.per_thing_rate.lock().expect("rate mutex poisoned") = per_thing_rate;
        for mut entry in self.per_thing.iter_mut() {
            entry.rescale(per_thing_rate);
        }

        *self.aggregate_rate.lock().expect("aggregate rate mutex poisoned") = aggregate_rate;
        self.aggregate.lock().expect("aggregate mutex poisoned").rescale(aggregate_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_thing_never_throttled() {
        let limiter = InboundRateLimiter::new(0, 0);
        assert!(limiter.try_acquire(""));
    }

    #[test]
    fn test_exhausts_per_thing_bucket() {
        let limiter = InboundRateLimiter::new(1, 100);
        assert!(limiter.try_acquire("T1"));
        assert!(!limiter.try_acquire("T1"));
    }

    #[test]
    fn test_aggregate_denial_rolls_back_per_thing() {
        let limiter = InboundRateLimiter::new(10, 1);
        assert!(limiter.try_acquire("T1"));
        assert!(!limiter.try_acquire("T2"));
        // T1's bucket should still have its token available since the
        // aggregate denial for T2 must not have consumed it, and T1's
        // own token was restored after the (successful) first call's
        // natural spend -- verify a distinct thing is unaffected by
        // another thing's rollback.
        limiter.set_rates(10, 10);
        assert!(limiter.try_acquire("T1"));
    }

    #[test]
    fn test_distinct_things_independent() {
        let limiter = InboundRateLimiter::new(1, 100);
        assert!(limiter.try_acquire("T1"));
        assert!(limiter.try_acquire("T2"));
    }

    #[test]
    fn test_rescale_preserves_proportional_tokens() {
        let limiter = InboundRateLimiter::new(10, 10);
        limiter.try_acquire("T1");
        limiter.set_rates(20, 20);
        assert!(limiter.try_acquire("T1"));
    }
}
