// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

/// Fixed-point denominator for every multiplier expressed in basis points.
pub const BPS_DENOMINATOR: u64 = 10_000;

pub const GWEI: u128 = 1_000_000_000;

/// Floor for any offered max fee, so panic scaling always has something to scale.
pub const MIN_BID_WEI: u128 = GWEI;

/// Priority fee is `max_fee / PRIORITY_FEE_DIVISOR`.
pub const PRIORITY_FEE_DIVISOR: u128 = 2;

pub const DEFAULT_FALLBACK_MAX_FEE_GWEI: u64 = 100;
pub const DEFAULT_FALLBACK_PRIORITY_FEE_GWEI: u64 = 2;

pub const DEFAULT_PAUSE_GAS_LIMIT: u64 = 500_000;
pub const DEFAULT_PAUSE_GAS_LIMIT_STEP: u64 = 100_000;

pub const DEFAULT_SEQUENCE_CAPACITY: usize = 20;
pub const DEFAULT_SEQUENCE_WINDOW_SECS: u64 = 60;
pub const DEFAULT_SEQUENCE_MAX_DIRECT_CALLS: usize = 2;

pub const DEFAULT_COOLDOWN_MS: u64 = 100;
pub const DEFAULT_PANIC_DURATION_MS: u64 = 30_000;
pub const DEFAULT_PANIC_MULTIPLIER_BPS: u64 = 30_000;
pub const DEFAULT_ESCALATION_BASE_BPS: u64 = 20_000;
pub const DEFAULT_ESCALATION_STEP_BPS: u64 = 10_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Attempt records kept on the coordinator for reporting.
pub const ATTEMPT_HISTORY_MAX: usize = 256;

/// Bound on one report sink write, and how often a transient failure is retried.
pub const REPORT_WRITE_TIMEOUT_MS: u64 = 2_000;
pub const REPORT_WRITE_ATTEMPTS: usize = 3;
pub const REPORT_RETRY_BACKOFF_MS: u64 = 100;

/// Number of pending hashes remembered by the feed for dedup.
pub const SEEN_HASHES_MAX: usize = 50_000;

pub fn gwei_to_wei(gwei: u64) -> u128 {
    (gwei as u128).saturating_mul(GWEI)
}
