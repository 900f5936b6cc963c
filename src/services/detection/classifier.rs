// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::data::abi::decode_vault_call;
use crate::domain::constants::DEFAULT_SEQUENCE_MAX_DIRECT_CALLS;
use crate::domain::types::{PendingTransaction, SuspicionEvent, SuspicionKind};
use crate::services::detection::sequence::WindowEntry;
use alloy::primitives::{Address, U256};
use std::sync::Arc;

/// Named heuristic behind [`SuspicionKind::RepeatedSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceRule {
    Disabled,
    /// Fires when the sender's window holds more than `max_direct_calls` calls to the
    /// monitored contract. The window includes the transaction being classified.
    DirectCallBurst { max_direct_calls: usize },
}

impl SequenceRule {
    pub fn from_name(name: &str, max_direct_calls: usize) -> Result<Self, AppError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(SequenceRule::Disabled),
            "direct_call_burst" => Ok(SequenceRule::DirectCallBurst { max_direct_calls }),
            other => Err(AppError::Validation {
                field: "sequence_rule".into(),
                message: format!("unknown rule '{other}'"),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SequenceRule::Disabled => "disabled",
            SequenceRule::DirectCallBurst { .. } => "direct_call_burst",
        }
    }

    fn fires(&self, window: &[WindowEntry]) -> bool {
        match *self {
            SequenceRule::Disabled => false,
            SequenceRule::DirectCallBurst { max_direct_calls } => {
                window.iter().filter(|e| e.targets_monitored).count() > max_direct_calls
            }
        }
    }
}

impl Default for SequenceRule {
    fn default() -> Self {
        SequenceRule::DirectCallBurst {
            max_direct_calls: DEFAULT_SEQUENCE_MAX_DIRECT_CALLS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionRules {
    pub monitored: Address,
    /// Strictly greater values are flagged.
    pub value_threshold: U256,
    pub sequence: SequenceRule,
}

/// Stateless rule evaluation. Every rule runs; the event carries all matches and the
/// highest-severity one as its kind.
#[derive(Debug, Clone)]
pub struct SuspicionClassifier {
    rules: DetectionRules,
}

impl SuspicionClassifier {
    pub fn new(rules: DetectionRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &DetectionRules {
        &self.rules
    }

    /// Window reference to record for `tx` before classifying it.
    pub fn window_entry(&self, tx: &PendingTransaction) -> WindowEntry {
        WindowEntry {
            hash: tx.hash,
            seen_at_ms: tx.first_seen_at_ms,
            targets_monitored: tx.is_call_to(self.rules.monitored),
        }
    }

    pub fn classify(
        &self,
        tx: &Arc<PendingTransaction>,
        window: &[WindowEntry],
        now_ms: u64,
    ) -> Option<SuspicionEvent> {
        let direct = tx.is_call_to(self.rules.monitored);
        let mut matched = Vec::with_capacity(3);

        if self.rules.sequence.fires(window) {
            matched.push(SuspicionKind::RepeatedSequence);
        }
        if direct {
            matched.push(SuspicionKind::DirectCall);
        }
        if tx.value > self.rules.value_threshold {
            matched.push(SuspicionKind::HighValue);
        }

        matched.sort_by_key(|k| std::cmp::Reverse(k.severity()));
        let kind = *matched.first()?;

        Some(SuspicionEvent {
            kind,
            matched,
            source: Arc::clone(tx),
            call: direct.then(|| decode_vault_call(&tx.input)),
            detected_at_ms: now_ms,
        })
    }
}
