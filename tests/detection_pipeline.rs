// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

mod common;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use common::{Harness, MONITORED, ScriptedTarget, Step, attacker_tx};
use oxidity_sentinel::data::abi::IPausableVault;
use oxidity_sentinel::domain::types::{Phase, SuspicionKind, VaultCall};
use oxidity_sentinel::services::detection::{
    DetectionRules, SequenceRule, SequenceTracker, SuspicionClassifier,
};
use oxidity_sentinel::services::reporting::AlertKind;
use oxidity_sentinel::services::response::{DropReason, SessionOutcome, TriggerOutcome};
use oxidity_sentinel::services::sentinel::{Sentinel, SentinelConfig};
use std::sync::Arc;
use std::time::Duration;

const ONE_ETH: u128 = 1_000_000_000_000_000_000;

fn sentinel(h: &Harness) -> Sentinel {
    let classifier = SuspicionClassifier::new(DetectionRules {
        monitored: MONITORED,
        value_threshold: U256::from(ONE_ETH),
        sequence: SequenceRule::DirectCallBurst {
            max_direct_calls: 2,
        },
    });
    Sentinel::new(
        Arc::new(SequenceTracker::new(20, Duration::from_secs(60))),
        Arc::new(classifier),
        h.coordinator.clone(),
        h.reporter.clone(),
        h.clock.clone(),
        h.stats.clone(),
        SentinelConfig::default(),
    )
}

fn withdraw(n: u8) -> oxidity_sentinel::domain::types::PendingTransaction {
    let mut tx = attacker_tx(n, 50);
    tx.input = Bytes::from(
        IPausableVault::withdrawCall {
            amount: U256::from(1_000u64),
        }
        .abi_encode(),
    );
    tx
}

#[tokio::test]
async fn repeated_withdrawals_pause_once() {
    let h = Harness::new(ScriptedTarget::new([Step::Success]), 3);
    let sentinel = sentinel(&h);

    let mut outcomes = Vec::new();
    let mut kinds = Vec::new();
    for n in 1..=4u8 {
        let detection = sentinel
            .handle_transaction(withdraw(n))
            .expect("direct call is always suspicious");
        kinds.push(detection.event.kind);
        assert_eq!(
            detection.event.call,
            Some(VaultCall::Withdraw {
                amount: U256::from(1_000u64)
            })
        );
        outcomes.push(detection.trigger.await.unwrap());
    }

    assert_eq!(
        kinds,
        vec![
            SuspicionKind::DirectCall,
            SuspicionKind::DirectCall,
            SuspicionKind::RepeatedSequence,
            SuspicionKind::RepeatedSequence,
        ]
    );
    assert!(matches!(
        outcomes[0],
        TriggerOutcome::Completed(SessionOutcome::Paused { attempts: 1, .. })
    ));
    for later in &outcomes[1..] {
        assert_eq!(*later, TriggerOutcome::Dropped(DropReason::AlreadyPaused));
    }
    assert_eq!(h.coordinator.phase(), Phase::Paused);
    assert_eq!(h.target.submissions().len(), 1);

    h.settle().await;
    assert_eq!(h.sink.transactions.lock().unwrap().len(), 4);
    assert_eq!(
        h.sink
            .alerts_of(AlertKind::Suspicion(SuspicionKind::RepeatedSequence)),
        2
    );
    let snap = h.stats.snapshot();
    assert_eq!(snap.detections, 4);
    assert_eq!(snap.pauses, 1);
}

#[tokio::test]
async fn unrelated_traffic_is_neither_flagged_nor_reported() {
    let h = Harness::new(ScriptedTarget::default(), 3);
    let sentinel = sentinel(&h);

    let mut tx = attacker_tx(9, 50);
    tx.to = Some(Address::repeat_byte(0x42));
    tx.value = U256::from(ONE_ETH);
    assert!(sentinel.handle_transaction(tx).is_none());

    h.settle().await;
    assert!(h.sink.transactions.lock().unwrap().is_empty());
    assert!(h.target.submissions().is_empty());
    assert_eq!(h.stats.snapshot().classified, 1);
}

#[tokio::test]
async fn high_value_transfer_elsewhere_is_flagged() {
    let h = Harness::new(ScriptedTarget::new([Step::Success]), 3);
    let sentinel = sentinel(&h);

    let mut tx = attacker_tx(7, 50);
    tx.to = Some(Address::repeat_byte(0x42));
    tx.value = U256::from(ONE_ETH + 1);
    let detection = sentinel.handle_transaction(tx).expect("above threshold");
    assert_eq!(detection.event.kind, SuspicionKind::HighValue);
    assert_eq!(detection.event.call, None);
    detection.trigger.await.unwrap();

    h.settle().await;
    let reported = h.sink.transactions.lock().unwrap().clone();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].suspicion.as_deref(), Some("high_value"));
}
