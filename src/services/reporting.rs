// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::common::retry::retry_async_when;
use crate::domain::constants::{
    REPORT_RETRY_BACKOFF_MS, REPORT_WRITE_ATTEMPTS, REPORT_WRITE_TIMEOUT_MS,
};
use crate::domain::types::{PendingTransaction, SuspicionEvent, SuspicionKind};
use crate::services::stats::GuardStats;
use alloy::primitives::B256;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    Suspicion(SuspicionKind),
    PausedExternally,
    PauseExhausted,
    Unpaused,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Suspicion(kind) => kind.as_str(),
            AlertKind::PausedExternally => "paused_externally",
            AlertKind::PauseExhausted => "pause_exhausted",
            AlertKind::Unpaused => "unpaused",
        }
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, AlertKind::PauseExhausted)
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReport {
    pub tx_hash: String,
    pub from: String,
    pub to: Option<String>,
    pub value_wei: String,
    pub function: Option<String>,
    pub suspicion: Option<String>,
    pub observed_at_ms: u64,
}

impl TransactionReport {
    pub fn new(tx: &PendingTransaction, event: Option<&SuspicionEvent>) -> Self {
        Self {
            tx_hash: format!("{:#x}", tx.hash),
            from: format!("{:#x}", tx.from),
            to: tx.to.map(|a| format!("{a:#x}")),
            value_wei: tx.value.to_string(),
            function: event
                .and_then(|e| e.call.as_ref())
                .map(|c| c.name().to_string()),
            suspicion: event.map(|e| {
                e.matched
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            }),
            observed_at_ms: tx.first_seen_at_ms,
        }
    }
}

/// Persistence/analytics collaborator. Calls may fail; callers never depend on them succeeding.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn log_transaction(&self, record: &TransactionReport) -> Result<(), AppError>;
    async fn log_alert(&self, kind: AlertKind, message: &str) -> Result<(), AppError>;
    async fn log_pause_event(&self, tx_hash: B256, success: bool) -> Result<(), AppError>;
}

/// Sink used when no report store is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ReportSink for TracingSink {
    async fn log_transaction(&self, record: &TransactionReport) -> Result<(), AppError> {
        tracing::debug!(
            target: "reporting",
            tx_hash = %record.tx_hash,
            from = %record.from,
            to = ?record.to,
            value_wei = %record.value_wei,
            function = ?record.function,
            suspicion = ?record.suspicion,
            "transaction"
        );
        Ok(())
    }

    async fn log_alert(&self, kind: AlertKind, message: &str) -> Result<(), AppError> {
        if kind.is_fatal() {
            tracing::error!(target: "reporting", kind = %kind, "{message}");
        } else {
            tracing::warn!(target: "reporting", kind = %kind, "{message}");
        }
        Ok(())
    }

    async fn log_pause_event(&self, tx_hash: B256, success: bool) -> Result<(), AppError> {
        tracing::info!(target: "reporting", tx_hash = %format!("{tx_hash:#x}"), success, "pause event");
        Ok(())
    }
}

enum ReportMsg {
    Transaction(TransactionReport),
    Alert { kind: AlertKind, message: String },
    PauseEvent { tx_hash: B256, success: bool },
    Flush(oneshot::Sender<()>),
}

/// Bounds on a single sink write.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    pub write_timeout: Duration,
    /// Total tries for a write that fails transiently.
    pub attempts: usize,
    pub backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_millis(REPORT_WRITE_TIMEOUT_MS),
            attempts: REPORT_WRITE_ATTEMPTS,
            backoff: Duration::from_millis(REPORT_RETRY_BACKOFF_MS),
        }
    }
}

/// Non-blocking handle to a [`ReportSink`]. Records are queued with `try_send`; a full
/// queue drops the record.
///
/// Transactions and events (alerts, pause events) have separate queues, and the worker
/// drains events first, so a transaction flood cannot crowd out an alert.
#[derive(Clone)]
pub struct Reporter {
    records: mpsc::Sender<TransactionReport>,
    events: mpsc::Sender<ReportMsg>,
    stats: Arc<GuardStats>,
}

/// Background task draining the report queues into the sink.
pub struct ReportWorker {
    records: mpsc::Receiver<TransactionReport>,
    events: mpsc::Receiver<ReportMsg>,
    sink: Arc<dyn ReportSink>,
    policy: DeliveryPolicy,
    stats: Arc<GuardStats>,
}

impl Reporter {
    /// `capacity` bounds each of the two queues.
    pub fn new(
        sink: Arc<dyn ReportSink>,
        capacity: usize,
        stats: Arc<GuardStats>,
    ) -> (Self, ReportWorker) {
        let (records_tx, records) = mpsc::channel(capacity.max(1));
        let (events_tx, events) = mpsc::channel(capacity.max(1));
        let worker = ReportWorker {
            records,
            events,
            sink,
            policy: DeliveryPolicy::default(),
            stats: stats.clone(),
        };
        (
            Self {
                records: records_tx,
                events: events_tx,
                stats,
            },
            worker,
        )
    }

    /// Convenience for callers that own the runtime.
    pub fn spawn(
        sink: Arc<dyn ReportSink>,
        capacity: usize,
        stats: Arc<GuardStats>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (reporter, worker) = Self::new(sink, capacity, stats);
        (reporter, tokio::spawn(worker.run()))
    }

    pub fn transaction(&self, record: TransactionReport) {
        if let Err(e) = self.records.try_send(record) {
            self.dropped(e);
        }
    }

    pub fn alert(&self, kind: AlertKind, message: impl Into<String>) {
        self.enqueue(ReportMsg::Alert {
            kind,
            message: message.into(),
        });
    }

    pub fn pause_event(&self, tx_hash: B256, success: bool) {
        self.enqueue(ReportMsg::PauseEvent { tx_hash, success });
    }

    /// Wait until everything queued before this call reached the sink (or failed to).
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.events.send(ReportMsg::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    fn enqueue(&self, msg: ReportMsg) {
        if let Err(e) = self.events.try_send(msg) {
            self.dropped(e);
        }
    }

    fn dropped(&self, e: impl fmt::Display) {
        self.stats.reports_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(target: "reporting", error = %e, "report queue rejected record; dropping");
    }
}

impl ReportWorker {
    pub fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = DeliveryPolicy {
            attempts: policy.attempts.max(1),
            ..policy
        };
        self
    }

    pub async fn run(mut self) {
        loop {
            let msg = tokio::select! {
                biased;
                Some(msg) = self.events.recv() => msg,
                Some(record) = self.records.recv() => ReportMsg::Transaction(record),
                else => break,
            };
            match msg {
                ReportMsg::Flush(ack) => {
                    // Transactions queued before the flush sit in the other queue.
                    while let Ok(record) = self.records.try_recv() {
                        self.deliver(&ReportMsg::Transaction(record)).await;
                    }
                    let _ = ack.send(());
                }
                msg => self.deliver(&msg).await,
            }
        }
        tracing::debug!(target: "reporting", "report worker stopped");
    }

    async fn deliver(&self, msg: &ReportMsg) {
        let res = retry_async_when(
            |_| self.write_once(msg),
            self.policy.attempts,
            self.policy.backoff,
            AppError::is_transient,
        )
        .await;
        if let Err(e) = res {
            self.stats.reports_failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(target: "reporting", error = %e, "report sink write failed");
        }
    }

    async fn write_once(&self, msg: &ReportMsg) -> Result<(), AppError> {
        let write = async {
            match msg {
                ReportMsg::Transaction(record) => self.sink.log_transaction(record).await,
                ReportMsg::Alert { kind, message } => self.sink.log_alert(*kind, message).await,
                ReportMsg::PauseEvent { tx_hash, success } => {
                    self.sink.log_pause_event(*tx_hash, *success).await
                }
                ReportMsg::Flush(_) => Ok(()),
            }
        };
        timeout(self.policy.write_timeout, write)
            .await
            .map_err(|_| AppError::Timeout("report sink write".into()))?
    }
}
