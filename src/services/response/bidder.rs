// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::{
    BPS_DENOMINATOR, DEFAULT_ESCALATION_BASE_BPS, DEFAULT_ESCALATION_STEP_BPS,
    DEFAULT_PANIC_MULTIPLIER_BPS, MIN_BID_WEI, PRIORITY_FEE_DIVISOR,
};
use crate::domain::types::{FeeBid, NetworkFees, PendingTransaction};
use alloy::primitives::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidderConfig {
    /// Multiple of the attacker's max fee offered on attempt 1.
    pub escalation_base_bps: u64,
    /// Added to the multiplier for every further attempt.
    pub escalation_step_bps: u64,
    /// Applied on top while panic mode is active. Must exceed `BPS_DENOMINATOR`.
    pub panic_multiplier_bps: u64,
}

impl Default for BidderConfig {
    fn default() -> Self {
        Self {
            escalation_base_bps: DEFAULT_ESCALATION_BASE_BPS,
            escalation_step_bps: DEFAULT_ESCALATION_STEP_BPS,
            panic_multiplier_bps: DEFAULT_PANIC_MULTIPLIER_BPS,
        }
    }
}

/// Fee escalation for mitigation attempts.
///
/// For attempt `n` (1-based) with multiplier `m(n) = base + step * (n - 1)`:
///
/// ```text
/// attacker_part = attacker_max_fee * m(n)
/// network_part  = network_max_fee * (1 + step * (n - 1))
/// max_fee       = max(attacker_part, network_part, MIN_BID_WEI) * (panic ? panic_multiplier : 1)
/// priority_fee  = max_fee / 2
/// ```
///
/// All arithmetic is integer in wei with basis-point multipliers, so the result is
/// non-decreasing in `n` and strictly larger with panic on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasBidder {
    config: BidderConfig,
}

impl GasBidder {
    pub fn new(config: BidderConfig) -> Self {
        Self {
            config: BidderConfig {
                panic_multiplier_bps: config.panic_multiplier_bps.max(BPS_DENOMINATOR + 1),
                ..config
            },
        }
    }

    pub fn config(&self) -> BidderConfig {
        self.config
    }

    pub fn escalation_bps(&self, attempt: u32) -> u64 {
        let extra = self
            .config
            .escalation_step_bps
            .saturating_mul(u64::from(attempt.max(1) - 1));
        self.config.escalation_base_bps.saturating_add(extra)
    }

    fn network_escalation_bps(&self, attempt: u32) -> u64 {
        let extra = self
            .config
            .escalation_step_bps
            .saturating_mul(u64::from(attempt.max(1) - 1));
        BPS_DENOMINATOR.saturating_add(extra)
    }

    pub fn compute_fee(
        &self,
        suspicious: Option<&PendingTransaction>,
        attempt: u32,
        panic_active: bool,
        network: &NetworkFees,
    ) -> FeeBid {
        let multiplier_bps = self.escalation_bps(attempt);

        let network_part = scale_bps(network.max_fee_per_gas, self.network_escalation_bps(attempt));
        let attacker_part = suspicious
            .and_then(|tx| tx.fees.offered_max_fee())
            .map(|fee| scale_bps(fee, multiplier_bps))
            .unwrap_or(0);

        let mut max_fee_per_gas = network_part.max(attacker_part).max(MIN_BID_WEI);
        if panic_active {
            max_fee_per_gas = scale_bps(max_fee_per_gas, self.config.panic_multiplier_bps);
        }
        let max_priority_fee_per_gas = (max_fee_per_gas / PRIORITY_FEE_DIVISOR).min(max_fee_per_gas);

        tracing::trace!(
            target: "bidder",
            attempt,
            panic = panic_active,
            multiplier_bps,
            network_part,
            attacker_part,
            max_fee_per_gas,
            "computed pause bid"
        );

        FeeBid {
            max_fee_per_gas,
            max_priority_fee_per_gas,
            multiplier_bps,
            panic: panic_active,
        }
    }
}

impl Default for GasBidder {
    fn default() -> Self {
        Self::new(BidderConfig::default())
    }
}

fn scale_bps(value: u128, bps: u64) -> u128 {
    let scaled = U256::from(value).saturating_mul(U256::from(bps)) / U256::from(BPS_DENOMINATOR);
    scaled.saturating_to::<u128>()
}
