// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>
#![allow(dead_code)]

use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use oxidity_sentinel::common::clock::ManualClock;
use oxidity_sentinel::domain::constants::GWEI;
use oxidity_sentinel::domain::error::AppError;
use oxidity_sentinel::domain::types::{
    FeeBid, NetworkFees, PendingTransaction, ReceiptStatus, SuspicionEvent, SuspicionKind, TxFees,
};
use oxidity_sentinel::services::reporting::{AlertKind, ReportSink, Reporter, TransactionReport};
use oxidity_sentinel::services::response::{
    CoordinatorConfig, FeeOracle, GasBidder, PauseCoordinator, PauseTarget, RetryPolicy,
};
use oxidity_sentinel::services::stats::GuardStats;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MONITORED: Address = Address::new([0xcc; 20]);
pub const ATTACKER: Address = Address::new([0xa7; 20]);
pub const START_MS: u64 = 1_700_000_000_000;

/// What the chain does with one submitted `pause()`.
#[derive(Debug, Clone)]
pub enum Step {
    /// Mined, and `paused()` reads true afterwards.
    Success,
    /// Mined without reverting but `paused()` still reads false.
    Ineffective,
    Revert,
    /// Reverted because somebody else paused first.
    RevertPausedElsewhere,
    NoReceipt,
    SubmitError(&'static str),
}

/// In-memory monitored contract driven by a script of per-attempt outcomes.
/// Once the script runs dry every attempt reverts.
#[derive(Default)]
pub struct ScriptedTarget {
    paused: AtomicBool,
    script: Mutex<VecDeque<Step>>,
    pending: Mutex<HashMap<B256, Step>>,
    submissions: Mutex<Vec<(FeeBid, u64)>>,
    next_hash: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    submit_delay_ms: AtomicU64,
    status_delay_ms: AtomicU64,
    status_reads: AtomicUsize,
}

impl ScriptedTarget {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        let target = Self::default();
        target.push_steps(script);
        target
    }

    pub fn push_steps(&self, steps: impl IntoIterator<Item = Step>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn with_submit_delay(self, delay: Duration) -> Self {
        self.submit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Delay only the next `is_paused` answer. The value is read before the delay.
    pub fn with_status_delay(self, delay: Duration) -> Self {
        self.status_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    pub fn submissions(&self) -> Vec<(FeeBid, u64)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn status_reads(&self) -> usize {
        self.status_reads.load(Ordering::SeqCst)
    }

    fn finish(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PauseTarget for ScriptedTarget {
    async fn is_paused(&self) -> Result<bool, AppError> {
        self.status_reads.fetch_add(1, Ordering::SeqCst);
        let paused = self.paused();
        let delay = self.status_delay_ms.swap(0, Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(paused)
    }

    async fn submit_pause(&self, bid: &FeeBid, gas_limit: u64) -> Result<B256, AppError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.submit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.submissions.lock().unwrap().push((*bid, gas_limit));
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Revert);
        if let Step::SubmitError(reason) = step {
            self.finish();
            return Err(AppError::Mitigation(reason.to_string()));
        }

        let n = self.next_hash.fetch_add(1, Ordering::SeqCst) + 1;
        let hash = B256::from(U256::from(n));
        self.pending.lock().unwrap().insert(hash, step);
        Ok(hash)
    }

    async fn await_receipt(&self, tx_hash: B256) -> Result<ReceiptStatus, AppError> {
        let step = self.pending.lock().unwrap().remove(&tx_hash);
        self.finish();
        Ok(match step {
            Some(Step::Success) => {
                self.set_paused(true);
                ReceiptStatus::ConfirmedSuccess
            }
            Some(Step::Ineffective) => ReceiptStatus::ConfirmedSuccess,
            Some(Step::RevertPausedElsewhere) => {
                self.set_paused(true);
                ReceiptStatus::ConfirmedRevert
            }
            Some(Step::NoReceipt) => ReceiptStatus::UnknownTimeout,
            Some(Step::Revert) | Some(Step::SubmitError(_)) | None => {
                ReceiptStatus::ConfirmedRevert
            }
        })
    }
}

/// Fee oracle returning a constant, or failing when `fees` is `None`.
pub struct FixedFeeOracle {
    pub fees: Option<NetworkFees>,
}

impl FixedFeeOracle {
    pub fn gwei(max_fee: u128) -> Self {
        Self {
            fees: Some(NetworkFees {
                max_fee_per_gas: max_fee * GWEI,
                max_priority_fee_per_gas: 2 * GWEI,
            }),
        }
    }

    pub fn failing() -> Self {
        Self { fees: None }
    }
}

#[async_trait]
impl FeeOracle for FixedFeeOracle {
    async fn network_fees(&self) -> Result<NetworkFees, AppError> {
        self.fees
            .ok_or_else(|| AppError::Connection("fee oracle offline".into()))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub transactions: Mutex<Vec<TransactionReport>>,
    pub alerts: Mutex<Vec<(AlertKind, String)>>,
    pub pause_events: Mutex<Vec<(B256, bool)>>,
}

impl RecordingSink {
    pub fn alerts_of(&self, kind: AlertKind) -> usize {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn pause_events(&self) -> Vec<(B256, bool)> {
        self.pause_events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for RecordingSink {
    async fn log_transaction(&self, record: &TransactionReport) -> Result<(), AppError> {
        self.transactions.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn log_alert(&self, kind: AlertKind, message: &str) -> Result<(), AppError> {
        self.alerts.lock().unwrap().push((kind, message.to_string()));
        Ok(())
    }

    async fn log_pause_event(&self, tx_hash: B256, success: bool) -> Result<(), AppError> {
        self.pause_events.lock().unwrap().push((tx_hash, success));
        Ok(())
    }
}

pub struct Harness {
    pub coordinator: Arc<PauseCoordinator>,
    pub target: Arc<ScriptedTarget>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    pub stats: Arc<GuardStats>,
    pub reporter: Reporter,
}

impl Harness {
    pub fn new(target: ScriptedTarget, max_attempts: u32) -> Self {
        Self::with(target, FixedFeeOracle::gwei(10), max_attempts, test_config())
    }

    pub fn with(
        target: ScriptedTarget,
        fees: FixedFeeOracle,
        max_attempts: u32,
        config: CoordinatorConfig,
    ) -> Self {
        let target = Arc::new(target);
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(ManualClock::new(START_MS));
        let stats = Arc::new(GuardStats::default());
        let (reporter, _worker) = Reporter::spawn(sink.clone(), 256, stats.clone());
        let coordinator = Arc::new(PauseCoordinator::new(
            target.clone(),
            Arc::new(fees),
            RetryPolicy::new(max_attempts, 500_000, 100_000, GasBidder::default()),
            config,
            reporter.clone(),
            clock.clone(),
            stats.clone(),
        ));
        Self {
            coordinator,
            target,
            sink,
            clock,
            stats,
            reporter,
        }
    }

    /// Wait until every report queued so far reached the sink.
    pub async fn settle(&self) {
        self.reporter.flush().await;
    }
}

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        cooldown_ms: 100,
        panic_duration_ms: 30_000,
        rpc_timeout: Duration::from_secs(2),
        confirmation_timeout: Duration::from_secs(2),
        ..CoordinatorConfig::default()
    }
}

pub fn attacker_tx(n: u8, gas_price_gwei: u128) -> PendingTransaction {
    PendingTransaction {
        hash: B256::repeat_byte(n),
        from: ATTACKER,
        to: Some(MONITORED),
        value: U256::ZERO,
        input: Bytes::new(),
        fees: TxFees::Legacy {
            gas_price: gas_price_gwei * GWEI,
        },
        first_seen_at_ms: START_MS,
    }
}

pub fn suspicion(gas_price_gwei: u128) -> SuspicionEvent {
    SuspicionEvent {
        kind: SuspicionKind::DirectCall,
        matched: vec![SuspicionKind::DirectCall],
        source: Arc::new(attacker_tx(0xee, gas_price_gwei)),
        call: None,
        detected_at_ms: START_MS,
    }
}
