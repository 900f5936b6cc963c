// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::primitives::{Address, B256, Bytes, U256};
use std::fmt;
use std::sync::Arc;

/// Fee fields as observed on a pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFees {
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    Legacy {
        gas_price: u128,
    },
}

impl TxFees {
    /// Highest per-gas price the sender is willing to pay, if it is observable.
    pub fn offered_max_fee(&self) -> Option<u128> {
        let fee = match *self {
            TxFees::Eip1559 {
                max_fee_per_gas, ..
            } => max_fee_per_gas,
            TxFees::Legacy { gas_price } => gas_price,
        };
        (fee > 0).then_some(fee)
    }
}

/// Normalized mempool entry. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub fees: TxFees,
    pub first_seen_at_ms: u64,
}

impl PendingTransaction {
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.input
            .get(..4)
            .and_then(|s| <[u8; 4]>::try_from(s).ok())
    }

    pub fn is_call_to(&self, contract: Address) -> bool {
        self.to == Some(contract)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspicionKind {
    DirectCall,
    HighValue,
    RepeatedSequence,
}

impl SuspicionKind {
    pub fn severity(self) -> u8 {
        match self {
            SuspicionKind::RepeatedSequence => 3,
            SuspicionKind::DirectCall => 2,
            SuspicionKind::HighValue => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SuspicionKind::DirectCall => "direct_call",
            SuspicionKind::HighValue => "high_value",
            SuspicionKind::RepeatedSequence => "repeated_sequence",
        }
    }
}

impl fmt::Display for SuspicionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded call against the monitored contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultCall {
    Deposit,
    Withdraw { amount: U256 },
    Pause,
    Unpause,
    Unknown { selector: Option<[u8; 4]> },
}

impl VaultCall {
    pub fn name(&self) -> &'static str {
        match self {
            VaultCall::Deposit => "deposit",
            VaultCall::Withdraw { .. } => "withdraw",
            VaultCall::Pause => "pause",
            VaultCall::Unpause => "unpause",
            VaultCall::Unknown { .. } => "unknown",
        }
    }

    /// Withdrawals are the entry point a reentrancy exploit is staged through.
    pub fn is_reentrancy_setup(&self) -> bool {
        matches!(self, VaultCall::Withdraw { .. })
    }
}

/// Classifier verdict for a single transaction. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct SuspicionEvent {
    /// Highest-severity rule that fired.
    pub kind: SuspicionKind,
    /// Every rule that fired, highest severity first.
    pub matched: Vec<SuspicionKind>,
    pub source: Arc<PendingTransaction>,
    pub call: Option<VaultCall>,
    pub detected_at_ms: u64,
}

impl SuspicionEvent {
    pub fn matches(&self, kind: SuspicionKind) -> bool {
        self.matched.contains(&kind)
    }
}

/// Current network-suggested fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkFees {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Fee offer for one mitigation attempt. `max_priority_fee_per_gas <= max_fee_per_gas` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBid {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub multiplier_bps: u64,
    pub panic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Pending,
    Confirmed,
    Reverted,
    /// Mined successfully but `paused()` still reads false.
    Ineffective,
    NoReceipt,
    Error(String),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseAttempt {
    pub session: u64,
    pub attempt: u32,
    pub bid: FeeBid,
    pub gas_limit: u64,
    pub submitted_at_ms: u64,
    pub tx_hash: Option<B256>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Cooldown,
    AttemptInFlight,
    Paused,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Cooldown => "cooldown",
            Phase::AttemptInFlight => "attempt_in_flight",
            Phase::Paused => "paused",
        }
    }
}

/// Result of waiting for a submitted mitigation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    ConfirmedSuccess,
    ConfirmedRevert,
    UnknownTimeout,
}
