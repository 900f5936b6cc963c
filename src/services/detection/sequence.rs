// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::{DEFAULT_SEQUENCE_CAPACITY, DEFAULT_SEQUENCE_WINDOW_SECS};
use alloy::primitives::{Address, B256};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;

/// Reference to an observed transaction inside an address window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    pub hash: B256,
    pub seen_at_ms: u64,
    /// Whether the transaction was addressed to the monitored contract.
    pub targets_monitored: bool,
}

/// Bounded, time-windowed history per sender.
///
/// Writes for one address are serialized by the map's shard lock, so insertion order is
/// observation order. Different addresses never contend beyond their shard.
pub struct SequenceTracker {
    windows: DashMap<Address, VecDeque<WindowEntry>>,
    capacity: usize,
    max_age_ms: u64,
}

impl SequenceTracker {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: capacity.max(1),
            max_age_ms: max_age.as_millis() as u64,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append to `address`'s window and return the window as it stands afterwards.
    pub fn record(&self, address: Address, entry: WindowEntry) -> Vec<WindowEntry> {
        let mut window = self.windows.entry(address).or_default();
        let cutoff = entry.seen_at_ms.saturating_sub(self.max_age_ms);
        window.retain(|e| e.seen_at_ms >= cutoff);
        window.push_back(entry);
        while window.len() > self.capacity {
            window.pop_front();
        }
        window.iter().copied().collect()
    }

    /// Entries for `address`, oldest first.
    pub fn window_for(&self, address: &Address) -> Vec<WindowEntry> {
        self.windows
            .get(address)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop aged entries everywhere and forget empty windows. Returns entries evicted.
    pub fn prune(&self, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(self.max_age_ms);
        let mut evicted = 0usize;
        self.windows.retain(|_, window| {
            let before = window.len();
            window.retain(|e| e.seen_at_ms >= cutoff);
            evicted += before - window.len();
            !window.is_empty()
        });
        evicted
    }

    pub fn tracked_addresses(&self) -> usize {
        self.windows.len()
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new(
            DEFAULT_SEQUENCE_CAPACITY,
            Duration::from_secs(DEFAULT_SEQUENCE_WINDOW_SECS),
        )
    }
}
