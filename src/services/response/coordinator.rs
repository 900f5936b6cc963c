// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::clock::Clock;
use crate::common::error::AppError;
use crate::domain::constants::{
    ATTEMPT_HISTORY_MAX, DEFAULT_COOLDOWN_MS, DEFAULT_FALLBACK_MAX_FEE_GWEI,
    DEFAULT_FALLBACK_PRIORITY_FEE_GWEI, DEFAULT_PANIC_DURATION_MS, gwei_to_wei,
};
use crate::domain::types::{
    AttemptOutcome, FeeBid, NetworkFees, PauseAttempt, Phase, ReceiptStatus, SuspicionEvent,
};
use crate::services::reporting::{AlertKind, Reporter};
use crate::services::response::policy::{AttemptPlan, BidInputs, RetryDecision, RetryPolicy};
use crate::services::response::{FeeOracle, PauseTarget};
use crate::services::stats::GuardStats;
use alloy::primitives::B256;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Minimum gap between the starts of two sessions.
    pub cooldown_ms: u64,
    pub panic_duration_ms: u64,
    /// Bound on every single RPC the coordinator makes (status read, fee read, submission).
    pub rpc_timeout: Duration,
    /// Outer bound on waiting for one attempt's receipt.
    pub confirmation_timeout: Duration,
    /// Used when the fee oracle fails or times out.
    pub fallback_fees: NetworkFees,
    pub dry_run: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            panic_duration_ms: DEFAULT_PANIC_DURATION_MS,
            rpc_timeout: Duration::from_secs(5),
            confirmation_timeout: Duration::from_secs(35),
            fallback_fees: NetworkFees {
                max_fee_per_gas: gwei_to_wei(DEFAULT_FALLBACK_MAX_FEE_GWEI),
                max_priority_fee_per_gas: gwei_to_wei(DEFAULT_FALLBACK_PRIORITY_FEE_GWEI),
            },
            dry_run: false,
        }
    }
}

/// Singleton per monitored contract. Only [`PauseCoordinator`] mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorState {
    pub phase: Phase,
    pub panic_until_ms: Option<u64>,
    pub last_attempt_started_at_ms: Option<u64>,
    /// Bumped on every observed external unpause.
    pub epoch: u64,
    pub sessions: u64,
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            panic_until_ms: None,
            last_attempt_started_at_ms: None,
            epoch: 0,
            sessions: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Admission {
    pub session: u64,
    pub epoch: u64,
    pub panic: bool,
}

impl CoordinatorState {
    pub fn panic_active(&self, now_ms: u64) -> bool {
        self.panic_until_ms.is_some_and(|until| now_ms < until)
    }

    fn extend_panic(&mut self, until_ms: u64) {
        self.panic_until_ms = Some(self.panic_until_ms.map_or(until_ms, |u| u.max(until_ms)));
    }

    /// The trigger transition. Panic is sampled before this trigger extends it.
    pub(crate) fn admit(
        &mut self,
        now_ms: u64,
        cooldown_ms: u64,
        panic_duration_ms: u64,
    ) -> Result<Admission, DropReason> {
        if self.phase == Phase::Paused {
            return Err(DropReason::AlreadyPaused);
        }

        let panic = self.panic_active(now_ms);
        self.extend_panic(now_ms.saturating_add(panic_duration_ms));

        if self.phase != Phase::Idle {
            return Err(DropReason::Busy(self.phase));
        }
        if let Some(last) = self.last_attempt_started_at_ms {
            let elapsed = now_ms.saturating_sub(last);
            if elapsed <= cooldown_ms {
                return Err(DropReason::Cooldown {
                    remaining_ms: cooldown_ms - elapsed,
                });
            }
        }

        self.phase = Phase::Cooldown;
        self.last_attempt_started_at_ms = Some(now_ms);
        self.sessions += 1;
        Ok(Admission {
            session: self.sessions,
            epoch: self.epoch,
            panic,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    AlreadyPaused,
    Busy(Phase),
    /// Remaining time until a trigger would be accepted.
    Cooldown { remaining_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Paused { attempts: u32, tx_hash: B256 },
    /// `paused()` read true before we needed to (re)submit.
    PausedExternally { attempts: u32 },
    Exhausted { attempts: u32 },
    DryRun { bid: FeeBid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Dropped(DropReason),
    Completed(SessionOutcome),
}

impl TriggerOutcome {
    pub fn was_dropped(&self) -> bool {
        matches!(self, TriggerOutcome::Dropped(_))
    }
}

pub struct PauseCoordinator {
    target: Arc<dyn PauseTarget>,
    fees: Arc<dyn FeeOracle>,
    policy: RetryPolicy,
    config: CoordinatorConfig,
    reporter: Reporter,
    clock: Arc<dyn Clock>,
    stats: Arc<GuardStats>,
    state: Mutex<CoordinatorState>,
    history: Mutex<VecDeque<PauseAttempt>>,
}

impl PauseCoordinator {
    pub fn new(
        target: Arc<dyn PauseTarget>,
        fees: Arc<dyn FeeOracle>,
        policy: RetryPolicy,
        config: CoordinatorConfig,
        reporter: Reporter,
        clock: Arc<dyn Clock>,
        stats: Arc<GuardStats>,
    ) -> Self {
        Self {
            target,
            fees,
            policy,
            config,
            reporter,
            clock,
            stats,
            state: Mutex::new(CoordinatorState::default()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Read-only copy of the current state.
    pub fn state(&self) -> CoordinatorState {
        self.lock_state().clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock_state().phase
    }

    /// Attempt history, oldest first.
    pub fn attempts(&self) -> Vec<PauseAttempt> {
        self.lock_history().iter().cloned().collect()
    }

    /// Align the phase with on-chain `paused()` while no session is running.
    ///
    /// `Idle` + paused becomes `Paused`; `Paused` + unpaused is an external unpause and
    /// starts a new epoch in `Idle`.
    ///
    /// A read that raced a session or another sync is discarded: the result is applied only
    /// if phase, session count and epoch are unchanged since the read started.
    pub async fn sync_pause_status(&self) -> Result<Phase, AppError> {
        let before = self.sync_marker();
        let paused = self.read_paused().await?;
        let mut unpaused_epoch = None;
        let phase = {
            let mut state = self.lock_state();
            if (state.phase, state.sessions, state.epoch) != before {
                tracing::debug!(
                    target: "coordinator",
                    paused,
                    phase = state.phase.as_str(),
                    "coordinator moved during pause status read; result discarded"
                );
                return Ok(state.phase);
            }
            match (state.phase, paused) {
                (Phase::Idle, true) => {
                    state.phase = Phase::Paused;
                }
                (Phase::Paused, false) => {
                    state.phase = Phase::Idle;
                    state.epoch += 1;
                    unpaused_epoch = Some(state.epoch);
                }
                _ => {}
            }
            state.phase
        };

        if let Some(epoch) = unpaused_epoch {
            tracing::warn!(target: "coordinator", epoch, "contract unpaused externally; coordinator re-armed");
            self.reporter.alert(
                AlertKind::Unpaused,
                format!("contract unpaused externally; epoch {epoch} started"),
            );
        } else {
            tracing::debug!(target: "coordinator", paused, phase = phase.as_str(), "pause status synced");
        }
        Ok(phase)
    }

    /// Entry point for suspicion events. Safe to call concurrently: a trigger that finds a
    /// session running, the contract paused, or the cooldown unexpired returns immediately.
    pub async fn trigger(&self, event: &SuspicionEvent) -> TriggerOutcome {
        let now = self.clock.now_ms();
        let admission = {
            let mut state = self.lock_state();
            state.admit(now, self.config.cooldown_ms, self.config.panic_duration_ms)
        };

        let admission = match admission {
            Ok(a) => a,
            Err(reason) => {
                self.stats.triggers_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    target: "coordinator",
                    tx_hash = %event.source.hash,
                    reason = ?reason,
                    "trigger dropped"
                );
                return TriggerOutcome::Dropped(reason);
            }
        };

        self.stats.triggers_accepted.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            target: "coordinator",
            session = admission.session,
            epoch = admission.epoch,
            kind = %event.kind,
            tx_hash = %event.source.hash,
            panic = admission.panic,
            "mitigation session started"
        );

        let outcome = self.run_session(admission, event).await;
        tracing::info!(
            target: "coordinator",
            session = admission.session,
            outcome = ?outcome,
            "mitigation session finished"
        );
        TriggerOutcome::Completed(outcome)
    }

    async fn run_session(&self, admission: Admission, event: &SuspicionEvent) -> SessionOutcome {
        if self.check_paused("pre-flight").await {
            return self.finish_external(0);
        }

        let inputs = self.bid_inputs(event, admission.panic).await;
        let mut plan = self.policy.first_attempt(&inputs);

        if self.config.dry_run {
            tracing::warn!(
                target: "coordinator",
                session = admission.session,
                max_fee_per_gas = plan.bid.max_fee_per_gas,
                max_priority_fee_per_gas = plan.bid.max_priority_fee_per_gas,
                gas_limit = plan.gas_limit,
                "dry run: pause not submitted"
            );
            self.set_phase(Phase::Idle);
            return SessionOutcome::DryRun { bid: plan.bid };
        }

        self.set_phase(Phase::AttemptInFlight);
        loop {
            let (tx_hash, outcome) = self.execute(admission.session, &plan).await;
            if let Some(hash) = tx_hash {
                self.reporter.pause_event(hash, outcome.is_success());
            }

            if outcome.is_success()
                && let Some(hash) = tx_hash
            {
                self.set_phase(Phase::Paused);
                self.stats.pauses.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    target: "coordinator",
                    session = admission.session,
                    attempt = plan.attempt,
                    tx_hash = %hash,
                    "contract paused"
                );
                return SessionOutcome::Paused {
                    attempts: plan.attempt,
                    tx_hash: hash,
                };
            }

            tracing::warn!(
                target: "coordinator",
                session = admission.session,
                attempt = plan.attempt,
                outcome = ?outcome,
                "pause attempt failed"
            );

            let inputs = self.bid_inputs(event, admission.panic).await;
            match self.policy.after_failure(plan.attempt, &inputs) {
                RetryDecision::Exhausted { attempts } => {
                    // The last revert may be somebody else's pause landing first.
                    if self.check_paused("final").await {
                        return self.finish_external(attempts);
                    }
                    self.set_phase(Phase::Idle);
                    self.stats.exhausted.fetch_add(1, Ordering::Relaxed);
                    let message = format!(
                        "pause not achieved after {attempts} attempts (trigger {:#x})",
                        event.source.hash
                    );
                    tracing::error!(target: "coordinator", session = admission.session, "{message}");
                    self.reporter.alert(AlertKind::PauseExhausted, message);
                    return SessionOutcome::Exhausted { attempts };
                }
                RetryDecision::Retry(next) => {
                    if self.check_paused("retry").await {
                        return self.finish_external(plan.attempt);
                    }
                    plan = next;
                }
            }
        }
    }

    /// Submit one attempt and wait for its verdict. The attempt is recorded as `Pending`
    /// as soon as it has a hash.
    async fn execute(&self, session: u64, plan: &AttemptPlan) -> (Option<B256>, AttemptOutcome) {
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);
        let mut record = PauseAttempt {
            session,
            attempt: plan.attempt,
            bid: plan.bid,
            gas_limit: plan.gas_limit,
            submitted_at_ms: self.clock.now_ms(),
            tx_hash: None,
            outcome: AttemptOutcome::Pending,
        };

        let submitted = timeout(
            self.config.rpc_timeout,
            self.target.submit_pause(&plan.bid, plan.gas_limit),
        )
        .await;
        let hash = match submitted {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => {
                record.outcome = AttemptOutcome::Error(e.to_string());
                let outcome = record.outcome.clone();
                self.push_attempt(record);
                return (None, outcome);
            }
            Err(_) => {
                record.outcome = AttemptOutcome::Error("submission timed out".into());
                let outcome = record.outcome.clone();
                self.push_attempt(record);
                return (None, outcome);
            }
        };

        record.tx_hash = Some(hash);
        self.push_attempt(record);
        tracing::info!(
            target: "coordinator",
            session,
            attempt = plan.attempt,
            tx_hash = %hash,
            max_fee_per_gas = plan.bid.max_fee_per_gas,
            panic = plan.bid.panic,
            "pause submitted"
        );

        let outcome = self.confirm(hash).await;
        self.update_attempt(session, plan.attempt, outcome.clone());
        (Some(hash), outcome)
    }

    async fn confirm(&self, hash: B256) -> AttemptOutcome {
        match timeout(self.config.confirmation_timeout, self.target.await_receipt(hash)).await {
            Err(_) => AttemptOutcome::NoReceipt,
            Ok(Err(e)) => AttemptOutcome::Error(e.to_string()),
            Ok(Ok(ReceiptStatus::UnknownTimeout)) => AttemptOutcome::NoReceipt,
            Ok(Ok(ReceiptStatus::ConfirmedRevert)) => AttemptOutcome::Reverted,
            Ok(Ok(ReceiptStatus::ConfirmedSuccess)) => match self.read_paused().await {
                Ok(true) => AttemptOutcome::Confirmed,
                Ok(false) => AttemptOutcome::Ineffective,
                Err(e) => AttemptOutcome::Error(format!("pause verification failed: {e}")),
            },
        }
    }

    async fn bid_inputs<'a>(&self, event: &'a SuspicionEvent, panic: bool) -> BidInputs<'a> {
        let network = match timeout(self.config.rpc_timeout, self.fees.network_fees()).await {
            Ok(Ok(fees)) => fees,
            Ok(Err(e)) => {
                tracing::warn!(target: "coordinator", error = %e, "fee oracle failed; using fallback fees");
                self.config.fallback_fees
            }
            Err(_) => {
                tracing::warn!(target: "coordinator", "fee oracle timed out; using fallback fees");
                self.config.fallback_fees
            }
        };
        BidInputs {
            suspicious: Some(event.source.as_ref()),
            network,
            panic,
        }
    }

    async fn read_paused(&self) -> Result<bool, AppError> {
        timeout(self.config.rpc_timeout, self.target.is_paused())
            .await
            .map_err(|_| AppError::Timeout("paused() read timed out".into()))?
    }

    /// Status read used to short-circuit a session. Read failures count as not paused.
    async fn check_paused(&self, stage: &'static str) -> bool {
        match self.read_paused().await {
            Ok(paused) => paused,
            Err(e) => {
                tracing::warn!(target: "coordinator", stage, error = %e, "pause status unavailable");
                false
            }
        }
    }

    fn finish_external(&self, attempts: u32) -> SessionOutcome {
        self.set_phase(Phase::Paused);
        tracing::info!(target: "coordinator", attempts, "contract already paused; session stopped");
        self.reporter.alert(
            AlertKind::PausedExternally,
            format!("contract found paused after {attempts} own attempts"),
        );
        SessionOutcome::PausedExternally { attempts }
    }

    fn sync_marker(&self) -> (Phase, u64, u64) {
        let state = self.lock_state();
        (state.phase, state.sessions, state.epoch)
    }

    fn set_phase(&self, phase: Phase) {
        let mut state = self.lock_state();
        tracing::trace!(
            target: "coordinator",
            from = state.phase.as_str(),
            to = phase.as_str(),
            "phase transition"
        );
        state.phase = phase;
    }

    fn push_attempt(&self, record: PauseAttempt) {
        let mut history = self.lock_history();
        if history.len() >= ATTEMPT_HISTORY_MAX {
            history.pop_front();
        }
        history.push_back(record);
    }

    fn update_attempt(&self, session: u64, attempt: u32, outcome: AttemptOutcome) {
        let mut history = self.lock_history();
        if let Some(record) = history
            .iter_mut()
            .rev()
            .find(|r| r.session == session && r.attempt == attempt)
        {
            record.outcome = outcome;
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<PauseAttempt>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}
