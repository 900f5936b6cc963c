// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::clock::Clock;
use crate::domain::types::{PendingTransaction, Phase, SuspicionEvent};
use crate::services::detection::{SequenceTracker, SuspicionClassifier};
use crate::services::reporting::{AlertKind, Reporter, TransactionReport};
use crate::services::response::{PauseCoordinator, TriggerOutcome};
use crate::services::stats::GuardStats;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct SentinelConfig {
    pub prune_interval: Duration,
    pub status_poll_interval: Duration,
    pub stats_interval: Duration,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            prune_interval: Duration::from_secs(10),
            status_poll_interval: Duration::from_secs(15),
            stats_interval: Duration::from_secs(60),
        }
    }
}

/// A classified hit and the coordinator session it was handed to.
pub struct Detection {
    pub event: SuspicionEvent,
    pub trigger: JoinHandle<TriggerOutcome>,
}

/// Feed consumer: record, classify, report, and hand hits to the coordinator.
pub struct Sentinel {
    tracker: Arc<SequenceTracker>,
    classifier: Arc<SuspicionClassifier>,
    coordinator: Arc<PauseCoordinator>,
    reporter: Reporter,
    clock: Arc<dyn Clock>,
    stats: Arc<GuardStats>,
    config: SentinelConfig,
}

impl Sentinel {
    pub fn new(
        tracker: Arc<SequenceTracker>,
        classifier: Arc<SuspicionClassifier>,
        coordinator: Arc<PauseCoordinator>,
        reporter: Reporter,
        clock: Arc<dyn Clock>,
        stats: Arc<GuardStats>,
        config: SentinelConfig,
    ) -> Self {
        Self {
            tracker,
            classifier,
            coordinator,
            reporter,
            clock,
            stats,
            config,
        }
    }

    pub fn coordinator(&self) -> &Arc<PauseCoordinator> {
        &self.coordinator
    }

    /// Never waits on the coordinator; the trigger runs on its own task.
    pub fn handle_transaction(&self, tx: PendingTransaction) -> Option<Detection> {
        let tx = Arc::new(tx);
        let window = self
            .tracker
            .record(tx.from, self.classifier.window_entry(&tx));
        self.stats.classified.fetch_add(1, Ordering::Relaxed);

        let event = self
            .classifier
            .classify(&tx, &window, self.clock.now_ms());

        if event.is_some() || tx.is_call_to(self.classifier.rules().monitored) {
            self.reporter
                .transaction(TransactionReport::new(&tx, event.as_ref()));
        }

        let event = event?;
        self.stats.detections.fetch_add(1, Ordering::Relaxed);
        let function = event.call.as_ref().map(|c| c.name()).unwrap_or("-");
        tracing::warn!(
            target: "classifier",
            kind = %event.kind,
            matched = ?event.matched,
            tx_hash = %tx.hash,
            from = %tx.from,
            value_wei = %tx.value,
            function,
            reentrancy_setup = event.call.as_ref().is_some_and(|c| c.is_reentrancy_setup()),
            "suspicious transaction"
        );
        self.reporter.alert(
            AlertKind::Suspicion(event.kind),
            format!(
                "{} from {:#x} (tx {:#x}, value {} wei, call {})",
                event.kind, tx.from, tx.hash, tx.value, function
            ),
        );

        let coordinator = self.coordinator.clone();
        let handed = event.clone();
        let trigger = tokio::spawn(async move { coordinator.trigger(&handed).await });
        Some(Detection { event, trigger })
    }

    pub async fn run(
        self,
        mut rx: mpsc::Receiver<PendingTransaction>,
        shutdown: CancellationToken,
    ) {
        let mut prune = interval(self.config.prune_interval);
        let mut status = interval(self.config.status_poll_interval);
        let mut stats = interval(self.config.stats_interval);
        for ticker in [&mut prune, &mut status, &mut stats] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }
        // First ticks fire immediately; startup already synced and logged.
        prune.tick().await;
        status.tick().await;
        stats.tick().await;

        tracing::info!(target: "sentinel", "Sentinel loop started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "sentinel", "Shutdown requested; stopping sentinel");
                    break;
                }
                maybe_tx = rx.recv() => {
                    match maybe_tx {
                        Some(tx) => {
                            self.handle_transaction(tx);
                        }
                        None => {
                            tracing::warn!(target: "sentinel", "Feed channel closed");
                            break;
                        }
                    }
                }
                _ = prune.tick() => {
                    let evicted = self.tracker.prune(self.clock.now_ms());
                    tracing::trace!(target: "sentinel", evicted, "sequence windows pruned");
                }
                _ = status.tick() => self.spawn_status_sync(),
                _ = stats.tick() => self.stats.log_summary(),
            }
        }
    }

    fn spawn_status_sync(&self) {
        if !matches!(self.coordinator.phase(), Phase::Idle | Phase::Paused) {
            return;
        }
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.sync_pause_status().await {
                tracing::debug!(target: "sentinel", error = %e, "pause status poll failed");
            }
        });
    }
}
