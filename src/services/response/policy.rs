// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_PAUSE_GAS_LIMIT, DEFAULT_PAUSE_GAS_LIMIT_STEP,
};
use crate::domain::types::{FeeBid, NetworkFees, PendingTransaction};
use crate::services::response::bidder::GasBidder;

/// Everything a bid depends on besides the attempt number.
#[derive(Debug, Clone, Copy)]
pub struct BidInputs<'a> {
    pub suspicious: Option<&'a PendingTransaction>,
    pub network: NetworkFees,
    pub panic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPlan {
    pub attempt: u32,
    pub bid: FeeBid,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(AttemptPlan),
    Exhausted { attempts: u32 },
}

/// Pure retry policy: no clocks, no I/O, no sleeping between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_gas_limit: u64,
    gas_limit_step: u64,
    bidder: GasBidder,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_gas_limit: u64,
        gas_limit_step: u64,
        bidder: GasBidder,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_gas_limit,
            gas_limit_step,
            bidder,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn bidder(&self) -> &GasBidder {
        &self.bidder
    }

    pub fn gas_limit(&self, attempt: u32) -> u64 {
        let extra = self
            .gas_limit_step
            .saturating_mul(u64::from(attempt.max(1) - 1));
        self.base_gas_limit.saturating_add(extra)
    }

    pub fn plan(&self, attempt: u32, inputs: &BidInputs<'_>) -> AttemptPlan {
        let attempt = attempt.max(1);
        AttemptPlan {
            attempt,
            bid: self
                .bidder
                .compute_fee(inputs.suspicious, attempt, inputs.panic, &inputs.network),
            gas_limit: self.gas_limit(attempt),
        }
    }

    pub fn first_attempt(&self, inputs: &BidInputs<'_>) -> AttemptPlan {
        self.plan(1, inputs)
    }

    /// Decide what follows a failed attempt.
    pub fn after_failure(&self, failed_attempt: u32, inputs: &BidInputs<'_>) -> RetryDecision {
        if failed_attempt >= self.max_attempts {
            return RetryDecision::Exhausted {
                attempts: failed_attempt,
            };
        }
        RetryDecision::Retry(self.plan(failed_attempt + 1, inputs))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_PAUSE_GAS_LIMIT,
            DEFAULT_PAUSE_GAS_LIMIT_STEP,
            GasBidder::default(),
        )
    }
}
