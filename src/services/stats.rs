// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GuardStats {
    pub observed: AtomicU64,
    pub lookup_miss: AtomicU64,
    pub lookup_error: AtomicU64,
    pub feed_reconnects: AtomicU64,
    pub feed_dropped: AtomicU64,
    pub classified: AtomicU64,
    pub detections: AtomicU64,
    pub triggers_accepted: AtomicU64,
    pub triggers_dropped: AtomicU64,
    pub attempts: AtomicU64,
    pub pauses: AtomicU64,
    pub exhausted: AtomicU64,
    pub reports_dropped: AtomicU64,
    pub reports_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub observed: u64,
    pub lookup_miss: u64,
    pub lookup_error: u64,
    pub feed_reconnects: u64,
    pub feed_dropped: u64,
    pub classified: u64,
    pub detections: u64,
    pub triggers_accepted: u64,
    pub triggers_dropped: u64,
    pub attempts: u64,
    pub pauses: u64,
    pub exhausted: u64,
    pub reports_dropped: u64,
    pub reports_failed: u64,
}

impl GuardStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            observed: get(&self.observed),
            lookup_miss: get(&self.lookup_miss),
            lookup_error: get(&self.lookup_error),
            feed_reconnects: get(&self.feed_reconnects),
            feed_dropped: get(&self.feed_dropped),
            classified: get(&self.classified),
            detections: get(&self.detections),
            triggers_accepted: get(&self.triggers_accepted),
            triggers_dropped: get(&self.triggers_dropped),
            attempts: get(&self.attempts),
            pauses: get(&self.pauses),
            exhausted: get(&self.exhausted),
            reports_dropped: get(&self.reports_dropped),
            reports_failed: get(&self.reports_failed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!(
            target: "stats",
            observed = s.observed,
            lookup_miss = s.lookup_miss,
            lookup_error = s.lookup_error,
            reconnects = s.feed_reconnects,
            feed_dropped = s.feed_dropped,
            classified = s.classified,
            detections = s.detections,
            triggers_accepted = s.triggers_accepted,
            triggers_dropped = s.triggers_dropped,
            attempts = s.attempts,
            pauses = s.pauses,
            exhausted = s.exhausted,
            reports_dropped = s.reports_dropped,
            reports_failed = s.reports_failed,
            "sentinel counters"
        );
    }
}
