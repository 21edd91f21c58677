//! Per-identity cool-down gate.
//!
//! State lives in process memory only: it is not shared between instances
//! and does not survive a restart.

use std::time::{Duration, Instant};

use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { retry_after_secs: u64 },
}

/// Admission control keyed by caller identity.  The pipeline only depends on
/// this trait so the in-memory map can be replaced by a shared store.
pub trait RateLimit: Send + Sync {
    fn admit(&self, identity: &str, now: Instant) -> Admission;
    /// Drop entries that can no longer deny anything.  Returns how many were removed.
    fn evict_stale(&self, now: Instant) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct CooldownLimiter {
    cooldown: Duration,
    sweep_threshold: usize,
    last_accepted: DashMap<String, Instant, RandomState>,
}

impl CooldownLimiter {
    pub fn new(cooldown: Duration, sweep_threshold: usize) -> Self {
        Self {
            cooldown,
            sweep_threshold,
            last_accepted: DashMap::with_hasher(RandomState::new()),
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

impl RateLimit for CooldownLimiter {
    fn admit(&self, identity: &str, now: Instant) -> Admission {
        // The shard lock held by the entry makes read-compare-write atomic per key.
        let decision = match self.last_accepted.entry(identity.to_owned()) {
            Entry::Occupied(mut slot) => {
                let elapsed = now.saturating_duration_since(*slot.get());
                if elapsed < self.cooldown {
                    Admission::Denied {
                        retry_after_secs: ceil_secs(self.cooldown - elapsed),
                    }
                } else {
                    slot.insert(now);
                    Admission::Allowed
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                Admission::Allowed
            }
        };

        if decision == Admission::Allowed && self.last_accepted.len() > self.sweep_threshold {
            let removed = self.evict_stale(now);
            tracing::debug!(removed, remaining = self.last_accepted.len(), "rate limit sweep");
        }
        decision
    }

    fn evict_stale(&self, now: Instant) -> usize {
        let horizon = self.cooldown * 2;
        let before = self.last_accepted.len();
        self.last_accepted
            .retain(|_, last| now.saturating_duration_since(*last) < horizon);
        before.saturating_sub(self.last_accepted.len())
    }

    fn len(&self) -> usize {
        self.last_accepted.len()
    }
}
