// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::clock::Clock;
use crate::common::error::AppError;
use crate::common::retry::Backoff;
use crate::common::seen_cache::SeenCache;
use crate::domain::constants::SEEN_HASHES_MAX;
use crate::domain::types::{PendingTransaction, TxFees};
use crate::network::provider::{ConnectionFactory, WsProvider};
use crate::services::stats::GuardStats;
use alloy::consensus::Transaction as ConsensusTx;
use alloy::network::TransactionResponse;
use alloy::primitives::B256;
use alloy::providers::Provider;
use alloy::rpc::types::Transaction;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Hash lookups allowed in flight at once.
    pub lookup_concurrency: usize,
    pub poll_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            lookup_concurrency: 64,
            poll_interval: Duration::from_millis(1200),
        }
    }
}

/// Pending-transaction stream for the sentinel. Best effort: nothing missed during a
/// disconnect is replayed.
pub struct ChainFeed {
    provider: WsProvider,
    /// Websocket URL to redial after a dropped connection. `None` keeps the given provider.
    endpoint: Option<String>,
    out: mpsc::Sender<PendingTransaction>,
    stats: Arc<GuardStats>,
    clock: Arc<dyn Clock>,
    config: FeedConfig,
    shutdown: CancellationToken,
    seen: Arc<SeenCache<B256>>,
    lookups: Arc<Semaphore>,
}

#[cfg(test)]
const SEEN_MAX: usize = 4;
#[cfg(not(test))]
const SEEN_MAX: usize = SEEN_HASHES_MAX;

impl ChainFeed {
    pub fn new(
        provider: WsProvider,
        out: mpsc::Sender<PendingTransaction>,
        stats: Arc<GuardStats>,
        clock: Arc<dyn Clock>,
        config: FeedConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            provider,
            endpoint: None,
            out,
            stats,
            clock,
            config,
            shutdown,
            seen: Arc::new(SeenCache::new(SEEN_MAX)),
            lookups: Arc::new(Semaphore::new(config.lookup_concurrency.max(1))),
        }
    }

    /// Dial `ws_url` and keep it for reconnects.
    pub async fn connect(
        ws_url: &str,
        out: mpsc::Sender<PendingTransaction>,
        stats: Arc<GuardStats>,
        clock: Arc<dyn Clock>,
        config: FeedConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, AppError> {
        let provider = ConnectionFactory::ws(ws_url).await?;
        let mut feed = Self::new(provider, out, stats, clock, config, shutdown);
        feed.endpoint = Some(ws_url.to_string());
        Ok(feed)
    }

    pub async fn run(mut self) -> Result<(), AppError> {
        tracing::info!(target: "mempool", "Chain feed started...");
        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);

        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!(target: "mempool", "Shutdown requested; stopping feed");
                return Ok(());
            }

            match self.provider.subscribe_pending_transactions().await {
                Ok(sub) => {
                    tracing::info!(target: "mempool", "Subscribed to pending tx hashes");
                    backoff.reset();
                    let mut stream = sub.into_stream();
                    loop {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => {
                                tracing::info!(target: "mempool", "Shutdown requested; exiting pending hash stream");
                                return Ok(());
                            }
                            maybe_hash = stream.next() => {
                                match maybe_hash {
                                    Some(hash) => self.dispatch(hash).await,
                                    None => break,
                                }
                            }
                        }
                    }
                    tracing::warn!(target: "mempool", "Pending hash subscription ended, retrying after backoff");
                }
                Err(e) => {
                    tracing::warn!(
                        target: "mempool",
                        error = %e,
                        "Hash subscription failed; falling back to polling filter"
                    );
                    if let Err(err) = self.poll_filter_loop().await {
                        tracing::warn!(target: "mempool", error = %err, "Polling filter unavailable");
                    }
                }
            }

            self.stats.feed_reconnects.fetch_add(1, Ordering::Relaxed);
            let delay = backoff.next_delay();
            tracing::debug!(target: "mempool", delay_ms = delay.as_millis() as u64, "reconnect backoff");
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(target: "mempool", "Shutdown requested during reconnect backoff");
                    return Ok(());
                }
                _ = sleep(delay) => {}
            }
            self.redial().await;
        }
    }

    /// Replace the provider with a fresh connection. A failed dial keeps the old one and
    /// the next round backs off further.
    async fn redial(&mut self) {
        let Some(url) = self.endpoint.as_deref() else {
            return;
        };
        match ConnectionFactory::ws(url).await {
            Ok(provider) => {
                tracing::info!(target: "mempool", "Websocket reconnected");
                self.provider = provider;
            }
            Err(e) => {
                tracing::warn!(target: "mempool", error = %e, "Websocket redial failed");
            }
        }
    }

    async fn poll_filter_loop(&self) -> Result<(), AppError> {
        let filter_id = self
            .provider
            .new_pending_transactions_filter(false)
            .await
            .map_err(|err| AppError::Connection(format!("Filter create failed: {}", err)))?;
        tracing::info!(target: "mempool", "Polling pending tx filter");

        loop {
            match self.provider.get_filter_changes::<B256>(filter_id).await {
                Ok(hashes) => {
                    for hash in hashes {
                        self.dispatch(hash).await;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        target: "mempool",
                        error = %err,
                        "poll get_filter_changes failed"
                    );
                    break;
                }
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(target: "mempool", "Shutdown requested during poll sleep");
                    break;
                }
                _ = sleep(self.config.poll_interval) => {}
            }
        }

        Ok(())
    }

    /// Resolve a hash off the stream's task. Waits for a lookup slot, so a slow node
    /// slows the stream down instead of piling up tasks.
    async fn dispatch(&self, hash: B256) {
        if !self.mark_seen(hash) {
            return;
        }
        let Ok(permit) = self.lookups.clone().acquire_owned().await else {
            return;
        };

        let provider = self.provider.clone();
        let out = self.out.clone();
        let stats = self.stats.clone();
        let clock = self.clock.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match provider.get_transaction_by_hash(hash).await {
                Ok(Some(tx)) => {
                    stats.observed.fetch_add(1, Ordering::Relaxed);
                    forward(&out, &stats, normalize_pending(&tx, clock.now_ms()));
                }
                Ok(None) => {
                    // Already evicted from the node's pool.
                    stats.lookup_miss.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(target: "mempool", tx_hash = %hash, "pending tx vanished before lookup");
                }
                Err(err) => {
                    stats.lookup_error.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        target: "mempool",
                        error = %err,
                        tx_hash = %hash,
                        "Failed to fetch pending tx by hash"
                    );
                }
            }
        });
    }

    fn mark_seen(&self, hash: B256) -> bool {
        self.seen.remember(hash)
    }
}

fn forward(
    out: &mpsc::Sender<PendingTransaction>,
    stats: &GuardStats,
    tx: PendingTransaction,
) {
    if let Err(err) = out.try_send(tx) {
        stats.feed_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(target: "mempool", error = %err, "sentinel queue full; dropped pending tx");
    }
}

/// Flatten an RPC transaction into the sentinel's record. Typed transactions with a
/// dynamic fee keep both caps; everything else is treated as a legacy gas price.
pub fn normalize_pending(tx: &Transaction, seen_at_ms: u64) -> PendingTransaction {
    let fees = if ConsensusTx::is_dynamic_fee(tx) {
        TxFees::Eip1559 {
            max_fee_per_gas: ConsensusTx::max_fee_per_gas(tx),
            max_priority_fee_per_gas: ConsensusTx::max_priority_fee_per_gas(tx).unwrap_or(0),
        }
    } else {
        TxFees::Legacy {
            gas_price: ConsensusTx::gas_price(tx)
                .unwrap_or_else(|| ConsensusTx::max_fee_per_gas(tx)),
        }
    };

    PendingTransaction {
        hash: TransactionResponse::tx_hash(tx),
        from: TransactionResponse::from(tx),
        to: ConsensusTx::to(tx),
        value: ConsensusTx::value(tx),
        input: ConsensusTx::input(tx).clone(),
        fees,
        first_seen_at_ms: seen_at_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::ManualClock;
    use alloy::primitives::{Address, U256, address};
    use alloy::providers::ProviderBuilder;
    use alloy::transports::mock::Asserter;
    use url::Url;

    fn rpc_tx(json: &str) -> Transaction {
        serde_json::from_str(json).unwrap()
    }

    const EIP1559_TX: &str = r#"{
        "type": "0x2",
        "chainId": "0x1",
        "nonce": "0x5",
        "gas": "0x5208",
        "maxFeePerGas": "0xba43b7400",
        "maxPriorityFeePerGas": "0x77359400",
        "to": "0x00000000000000000000000000000000000000aa",
        "value": "0xde0b6b3a7640000",
        "input": "0x2e1a7d4d000000000000000000000000000000000000000000000000000000000000002a",
        "accessList": [],
        "v": "0x0",
        "yParity": "0x0",
        "r": "0x1111111111111111111111111111111111111111111111111111111111111111",
        "s": "0x2222222222222222222222222222222222222222222222222222222222222222",
        "hash": "0x0101010101010101010101010101010101010101010101010101010101010101",
        "from": "0x00000000000000000000000000000000000000bb",
        "blockHash": null,
        "blockNumber": null,
        "transactionIndex": null
    }"#;

    const LEGACY_TX: &str = r#"{
        "type": "0x0",
        "nonce": "0x1",
        "gas": "0x5208",
        "gasPrice": "0x4a817c800",
        "to": null,
        "value": "0x0",
        "input": "0x",
        "chainId": "0x1",
        "v": "0x25",
        "r": "0x1111111111111111111111111111111111111111111111111111111111111111",
        "s": "0x2222222222222222222222222222222222222222222222222222222222222222",
        "hash": "0x0202020202020202020202020202020202020202020202020202020202020202",
        "from": "0x00000000000000000000000000000000000000cc",
        "blockHash": null,
        "blockNumber": null,
        "transactionIndex": null
    }"#;

    #[test]
    fn normalizes_dynamic_fee_tx() {
        let pending = normalize_pending(&rpc_tx(EIP1559_TX), 1_234);
        assert_eq!(pending.hash, B256::repeat_byte(0x01));
        assert_eq!(
            pending.from,
            address!("00000000000000000000000000000000000000bb")
        );
        assert_eq!(
            pending.to,
            Some(address!("00000000000000000000000000000000000000aa"))
        );
        assert_eq!(pending.value, U256::from(1_000_000_000_000_000_000u128));
        assert_eq!(pending.selector(), Some([0x2e, 0x1a, 0x7d, 0x4d]));
        assert_eq!(
            pending.fees,
            TxFees::Eip1559 {
                max_fee_per_gas: 50_000_000_000,
                max_priority_fee_per_gas: 2_000_000_000,
            }
        );
        assert_eq!(pending.first_seen_at_ms, 1_234);
    }

    #[test]
    fn normalizes_legacy_contract_creation() {
        let pending = normalize_pending(&rpc_tx(LEGACY_TX), 0);
        assert_eq!(pending.to, None::<Address>);
        assert_eq!(
            pending.fees,
            TxFees::Legacy {
                gas_price: 20_000_000_000
            }
        );
        assert!(pending.input.is_empty());
    }

    #[tokio::test]
    async fn dedup_marks_and_bounds() {
        let provider = WsProvider::new_http(Url::parse("http://localhost:8545").unwrap());
        let (tx, _rx) = mpsc::channel(4);
        let feed = ChainFeed::new(
            provider,
            tx,
            Arc::new(GuardStats::default()),
            Arc::new(ManualClock::new(0)),
            FeedConfig::default(),
            CancellationToken::new(),
        );

        let h1 = B256::from_slice(&[1u8; 32]);
        let h2 = B256::from_slice(&[2u8; 32]);
        assert!(feed.mark_seen(h1));
        assert!(!feed.mark_seen(h1));
        assert!(feed.mark_seen(h2));
        feed.mark_seen(B256::from_slice(&[3u8; 32]));
        feed.mark_seen(B256::from_slice(&[4u8; 32]));
        feed.mark_seen(B256::from_slice(&[5u8; 32]));
        assert!(feed.mark_seen(h1));
    }

    #[test]
    fn full_sentinel_queue_counts_drops() {
        let (out, _rx) = mpsc::channel(1);
        let stats = GuardStats::default();
        let pending = normalize_pending(&rpc_tx(LEGACY_TX), 0);
        forward(&out, &stats, pending.clone());
        forward(&out, &stats, pending);
        assert_eq!(stats.feed_dropped.load(Ordering::Relaxed), 1);
    }

    fn mocked_feed(
        asserter: &Asserter,
    ) -> (ChainFeed, mpsc::Receiver<PendingTransaction>, Arc<GuardStats>) {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_mocked_client(asserter.clone());
        let (out, rx) = mpsc::channel(8);
        let stats = Arc::new(GuardStats::default());
        let config = FeedConfig {
            lookup_concurrency: 1,
            ..FeedConfig::default()
        };
        let feed = ChainFeed::new(
            provider,
            out,
            stats.clone(),
            Arc::new(ManualClock::new(7)),
            config,
            CancellationToken::new(),
        );
        (feed, rx, stats)
    }

    /// Dispatch one hash and wait for its lookup task to finish.
    async fn resolve(feed: &ChainFeed, hash: B256) {
        feed.dispatch(hash).await;
        let _idle = feed.lookups.acquire_many(1).await.unwrap();
    }

    #[tokio::test]
    async fn lookup_misses_and_errors_forward_nothing() {
        let asserter = Asserter::new();
        let (feed, mut rx, stats) = mocked_feed(&asserter);

        asserter.push_success(&serde_json::Value::Null);
        resolve(&feed, B256::repeat_byte(0x10)).await;
        asserter.push_failure_msg("node overloaded");
        resolve(&feed, B256::repeat_byte(0x11)).await;

        assert_eq!(stats.lookup_miss.load(Ordering::Relaxed), 1);
        assert_eq!(stats.lookup_error.load(Ordering::Relaxed), 1);
        assert_eq!(stats.observed.load(Ordering::Relaxed), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn found_transaction_is_forwarded_once() {
        let asserter = Asserter::new();
        let (feed, mut rx, stats) = mocked_feed(&asserter);
        let body: serde_json::Value = serde_json::from_str(EIP1559_TX).unwrap();

        asserter.push_success(&body);
        let hash = B256::repeat_byte(0x01);
        resolve(&feed, hash).await;
        // Already seen, so no second lookup is issued.
        resolve(&feed, hash).await;

        assert_eq!(stats.observed.load(Ordering::Relaxed), 1);
        let forwarded = rx.try_recv().unwrap();
        assert_eq!(forwarded.hash, hash);
        assert_eq!(forwarded.first_seen_at_ms, 7);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connect_reports_an_unreachable_websocket() {
        let (out, _rx) = mpsc::channel(1);
        let res = ChainFeed::connect(
            "ws://127.0.0.1:1",
            out,
            Arc::new(GuardStats::default()),
            Arc::new(ManualClock::new(0)),
            FeedConfig::default(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(res, Err(AppError::Connection(_))));
    }
}
