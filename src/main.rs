// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::providers::Provider;
use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use oxidity_sentinel::app::config::GlobalSettings;
use oxidity_sentinel::app::logging::setup_logging;
use oxidity_sentinel::common::clock::{Clock, SystemClock};
use oxidity_sentinel::domain::error::AppError;
use oxidity_sentinel::infrastructure::data::db::Database;
use oxidity_sentinel::infrastructure::network::gas::GasOracle;
use oxidity_sentinel::infrastructure::network::mempool::ChainFeed;
use oxidity_sentinel::infrastructure::network::pause_target::AlloyPauseTarget;
use oxidity_sentinel::infrastructure::network::provider::ConnectionFactory;
use oxidity_sentinel::services::detection::{SequenceTracker, SuspicionClassifier};
use oxidity_sentinel::services::reporting::{ReportSink, Reporter, TracingSink};
use oxidity_sentinel::services::response::PauseCoordinator;
use oxidity_sentinel::services::sentinel::Sentinel;
use oxidity_sentinel::services::stats::GuardStats;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "oxidity sentinel")]
struct Cli {
    /// Path to config file (default: config.toml when present)
    #[arg(long)]
    config: Option<String>,

    /// Compute and log pause bids without sending transactions
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    log_json: bool,

    /// Store a static-analysis JSON report in the report store and exit
    #[arg(long)]
    analysis_report: Option<String>,

    /// Print report-store analytics as JSON and exit
    #[arg(long, default_value_t = false)]
    analytics: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let mut settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    settings.dry_run |= cli.dry_run;
    settings.log_json |= cli.log_json;
    setup_logging(settings.log_level(), settings.log_json);

    let db = match settings.database_url.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(url) => Some(Database::new(url).await?),
        None => None,
    };

    if cli.analysis_report.is_some() || cli.analytics {
        let db = db.ok_or_else(|| {
            AppError::Config("database_url is required for report-store commands".into())
        })?;
        return report_store_command(&db, cli.analysis_report.as_deref(), cli.analytics).await;
    }

    settings.validate()?;
    run(settings, db).await
}

async fn report_store_command(
    db: &Database,
    analysis_report: Option<&str>,
    print_analytics: bool,
) -> Result<(), AppError> {
    if let Some(path) = analysis_report {
        let body = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Cannot read {path}: {e}")))?;
        let report: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| AppError::Decode(format!("Analysis report {path}: {e}")))?;
        let id = db.save_analysis_report(&report).await?;
        tracing::info!(target: "db", id, path, "Analysis report stored");
    }
    if print_analytics {
        let analytics = db.analytics().await?;
        let rendered = serde_json::to_string_pretty(&analytics)
            .map_err(|e| AppError::Report(format!("Analytics render failed: {e}")))?;
        println!("{rendered}");
    }
    Ok(())
}

async fn run(settings: GlobalSettings, db: Option<Database>) -> Result<(), AppError> {
    let stats = Arc::new(GuardStats::default());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let shutdown = CancellationToken::new();

    let signer = PrivateKeySigner::from_str(settings.wallet_key.trim())
        .map_err(|e| AppError::Config(format!("Invalid wallet key: {}", e)))?;
    let http_provider = ConnectionFactory::http(&settings.http_provider)?;

    // Auto-detect chain if not explicitly configured
    let chain_id = match settings.chain_id {
        Some(id) => id,
        None => {
            let detected = http_provider
                .get_chain_id()
                .await
                .map_err(|e| AppError::Connection(format!("chain_id detect failed: {e}")))?;
            tracing::info!(target: "config", detected_chain = detected, rpc = %settings.http_provider, "Auto-detected chain_id from RPC");
            detected
        }
    };

    let contract = settings.monitored_contract()?;
    tracing::info!(
        target: "config",
        chain_id,
        contract = %contract,
        operator = %signer.address(),
        dry_run = settings.dry_run,
        sequence_rule = %settings.sequence_rule,
        max_attempts = settings.max_attempts_value(),
        "Sentinel configured"
    );

    let sink: Arc<dyn ReportSink> = match db {
        Some(db) => Arc::new(db),
        None => {
            tracing::info!(target: "config", "No database_url; reports go to the log only");
            Arc::new(TracingSink)
        }
    };
    let (reporter, report_worker) =
        Reporter::spawn(sink, settings.report_channel_capacity_value(), stats.clone());

    let target = Arc::new(AlloyPauseTarget::new(
        http_provider.clone(),
        signer,
        contract,
        chain_id,
        settings.receipt_wait(),
    ));
    let coordinator = Arc::new(PauseCoordinator::new(
        target,
        Arc::new(GasOracle::new(http_provider)),
        settings.retry_policy(),
        settings.coordinator_config(),
        reporter.clone(),
        clock.clone(),
        stats.clone(),
    ));
    match coordinator.sync_pause_status().await {
        Ok(phase) => tracing::info!(target: "coordinator", phase = phase.as_str(), "Initial pause status"),
        Err(e) => tracing::warn!(target: "coordinator", error = %e, "Initial pause status unavailable; assuming unpaused"),
    }

    let tracker = Arc::new(SequenceTracker::new(
        settings.sequence_window_capacity_value(),
        settings.sequence_window(),
    ));
    let classifier = Arc::new(SuspicionClassifier::new(settings.detection_rules()?));
    let sentinel = Sentinel::new(
        tracker,
        classifier,
        coordinator,
        reporter.clone(),
        clock.clone(),
        stats.clone(),
        settings.sentinel_config(),
    );

    let (tx_out, tx_in) = mpsc::channel(settings.feed_channel_capacity_value());
    let feed = ChainFeed::connect(
        &settings.websocket_provider,
        tx_out,
        stats.clone(),
        clock,
        settings.feed_config(),
        shutdown.clone(),
    )
    .await?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "sentinel", "Ctrl-C received; shutting down");
        }
        signal_token.cancel();
    });

    let feed_task = tokio::spawn(feed.run());
    sentinel.run(tx_in, shutdown.clone()).await;
    shutdown.cancel();

    match feed_task.await {
        Ok(Err(e)) => tracing::warn!(target: "mempool", error = %e, "Feed stopped with error"),
        Err(e) => tracing::warn!(target: "mempool", error = %e, "Feed task join failed"),
        Ok(Ok(())) => {}
    }

    reporter.flush().await;
    drop(reporter);
    report_worker.abort();
    stats.log_summary();
    Ok(())
}
