//! Last-writer-wins register CRDT over an integer counter.
//!
//! Replicas converge regardless of delivery order: a newer timestamp wins,
//! and an exact timestamp tie breaks lexically on the origin id. The
//! tie-break is deterministic, commutative, and idempotent, so every
//! replica that sees the same update set ends at the same value.

use serde::{Deserialize, Serialize};

/// The broadcastable delta of one counter mutation. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterUpdate {
    pub value: i64,
    pub timestamp: u64,
    pub origin: String,
}

/// A single-register LWW counter.
#[derive(Debug, Clone, Default)]
pub struct LwwCounter {
    value: i64,
    timestamp: u64,
    origin: String,
}

impl LwwCounter {
    pub fn new(initial: i64) -> Self {
        Self {
            value: initial,
            ..Self::default()
        }
    }

    /// Bump the local value and return the delta for broadcast.
    pub fn increment(&mut self, origin: &str) -> CounterUpdate {
        self.value += 1;
        self.timestamp = now_millis();
        self.origin = origin.to_string();
        CounterUpdate {
            value: self.value,
            timestamp: self.timestamp,
            origin: self.origin.clone(),
        }
    }

    /// Merge a remote update. Returns whether local state changed, so the
    /// caller knows whether to re-persist or re-render.
    pub fn merge(&mut self, update: &CounterUpdate) -> bool {
        let wins = update.timestamp > self.timestamp
            || (update.timestamp == self.timestamp && update.origin > self.origin);
        if wins {
            self.value = update.value;
            self.timestamp = update.timestamp;
            self.origin = update.origin.clone();
        }
        wins
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
