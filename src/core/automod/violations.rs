// Violation counters used by the rules to pick a punishment rung.
//
// The tracker is synchronous on purpose: rules run while the guild-state
// read lock is held and must not await.

use super::automod_models::RuleKind;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Records rule violations per (guild, user, rule kind).
pub trait ViolationTracker: Send + Sync {
    /// Record a violation at `now` and return how many unexpired
    /// violations (including this one) the user has for this rule.
    fn push(
        &self,
        guild_id: u64,
        user_id: u64,
        kind: RuleKind,
        now: DateTime<Utc>,
        expire_after: Duration,
    ) -> u32;
}

#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct ViolationKey {
    guild_id: u64,
    user_id: u64,
    kind: RuleKind,
}

/// In-memory tracker. Each entry keeps the expiry time of every live
/// violation; a key is pruned on push and dropped by `sweep` once empty.
pub struct InMemoryViolationTracker {
    entries: DashMap<ViolationKey, Vec<DateTime<Utc>>>,
}

impl InMemoryViolationTracker {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl InMemoryViolationTracker {
    /// Drop every expired violation and every key left with none.
    /// Returns how many keys were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expiries| {
            expiries.retain(|expires| *expires > now);
            !expiries.is_empty()
        });
        before.saturating_sub(self.entries.len())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for InMemoryViolationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ViolationTracker for InMemoryViolationTracker {
    fn push(
        &self,
        guild_id: u64,
        user_id: u64,
        kind: RuleKind,
        now: DateTime<Utc>,
        expire_after: Duration,
    ) -> u32 {
        let key = ViolationKey {
            guild_id,
            user_id,
            kind,
        };

        let mut expiries = self.entries.entry(key).or_default();
        expiries.retain(|expires| *expires > now);
        expiries.push(now + expire_after);
        expiries.len() as u32
    }
}
