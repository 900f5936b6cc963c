// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod bidder;
pub mod coordinator;
pub mod policy;

pub use bidder::{BidderConfig, GasBidder};
pub use coordinator::{
    CoordinatorConfig, CoordinatorState, DropReason, PauseCoordinator, SessionOutcome,
    TriggerOutcome,
};
pub use policy::{AttemptPlan, BidInputs, RetryDecision, RetryPolicy};

use crate::common::error::AppError;
use crate::domain::types::{FeeBid, NetworkFees, ReceiptStatus};
use alloy::primitives::B256;
use async_trait::async_trait;

/// The monitored contract's privileged pause surface.
#[async_trait]
pub trait PauseTarget: Send + Sync {
    async fn is_paused(&self) -> Result<bool, AppError>;

    /// Broadcast `pause()` with the given fees. Returns the transaction hash.
    async fn submit_pause(&self, bid: &FeeBid, gas_limit: u64) -> Result<B256, AppError>;

    /// Bounded wait for inclusion of a submitted transaction.
    async fn await_receipt(&self, tx_hash: B256) -> Result<ReceiptStatus, AppError>;
}

#[async_trait]
pub trait FeeOracle: Send + Sync {
    async fn network_fees(&self) -> Result<NetworkFees, AppError>;
}
