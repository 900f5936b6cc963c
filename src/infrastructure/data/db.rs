// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::error::AppError;
use crate::data::schema::{AlertRecord, Analytics, PauseEventRecord, TransactionRecord};
use crate::services::reporting::{AlertKind, ReportSink, TransactionReport};
use alloy::primitives::B256;
use async_trait::async_trait;
use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

/// SQLite-backed report store.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?
            .create_if_missing(true);

        // Every connection to `:memory:` is its own database, so pin a single one.
        let in_memory = database_url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Migration failed: {}", e)))?;

        tracing::info!(target: "db", in_memory, "Report store ready");
        Ok(Self { pool })
    }

    pub async fn save_transaction(&self, record: &TransactionReport) -> Result<i64, AppError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO transactions (tx_hash, from_address, to_address, value_wei, function, suspicion, observed_at_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&record.tx_hash)
        .bind(&record.from)
        .bind(record.to.as_deref())
        .bind(&record.value_wei)
        .bind(record.function.as_deref())
        .bind(record.suspicion.as_deref())
        .bind(record.observed_at_ms as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("Transaction insert failed", e))?;
        Ok(id)
    }

    pub async fn save_alert(&self, kind: &str, message: &str) -> Result<i64, AppError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO alerts (kind, message) VALUES (?, ?) RETURNING id",
        )
        .bind(kind)
        .bind(message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("Alert insert failed", e))?;
        Ok(id)
    }

    pub async fn save_pause_event(&self, tx_hash: &str, success: bool) -> Result<i64, AppError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO pause_events (tx_hash, success) VALUES (?, ?) RETURNING id",
        )
        .bind(tx_hash)
        .bind(success)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("Pause event insert failed", e))?;
        Ok(id)
    }

    /// Store a report produced by an external static analyzer, verbatim.
    pub async fn save_analysis_report(&self, report: &serde_json::Value) -> Result<i64, AppError> {
        let body = serde_json::to_string(report)
            .map_err(|e| AppError::Report(format!("Analysis report encode failed: {e}")))?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO analysis_reports (report) VALUES (?) RETURNING id",
        )
        .bind(body)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("Analysis report insert failed", e))?;
        Ok(id)
    }

    pub async fn recent_transactions(&self, limit: i64) -> Result<Vec<TransactionRecord>, AppError> {
        let rows = sqlx::query_as::<_, TransactionRecord>(
            "SELECT id, tx_hash, from_address, to_address, value_wei, function, suspicion, observed_at_ms, timestamp
             FROM transactions ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn recent_alerts(&self, limit: i64) -> Result<Vec<AlertRecord>, AppError> {
        let rows = sqlx::query_as::<_, AlertRecord>(
            "SELECT id, kind, message, timestamp FROM alerts ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn recent_pause_events(&self, limit: i64) -> Result<Vec<PauseEventRecord>, AppError> {
        let rows = sqlx::query_as::<_, PauseEventRecord>(
            "SELECT id, tx_hash, success, timestamp FROM pause_events ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn analytics(&self) -> Result<Analytics, AppError> {
        let transaction_count = self.count("SELECT COUNT(1) FROM transactions").await?;
        let alert_count = self.count("SELECT COUNT(1) FROM alerts").await?;
        let pause_event_count = self.count("SELECT COUNT(1) FROM pause_events").await?;
        let successful_pauses = self
            .count("SELECT COUNT(1) FROM pause_events WHERE success = 1")
            .await?;

        let latest_raw = sqlx::query_scalar::<_, String>(
            "SELECT report FROM analysis_reports ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        let latest_analysis_report = match latest_raw {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| AppError::Decode(format!("Stored analysis report: {e}")))?,
            ),
            None => None,
        };

        let pause_effectiveness_pct = if pause_event_count > 0 {
            successful_pauses as f64 / pause_event_count as f64 * 100.0
        } else {
            0.0
        };

        Ok(Analytics {
            transaction_count,
            alert_count,
            pause_event_count,
            successful_pauses,
            pause_effectiveness_pct,
            latest_analysis_report,
        })
    }

    async fn count(&self, sql: &str) -> Result<i64, AppError> {
        let n = sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

/// Add context to a store error without losing its transient classification.
fn store_error(context: &str, err: sqlx::Error) -> AppError {
    match AppError::from(err) {
        AppError::Report(msg) => AppError::Report(format!("{context}: {msg}")),
        transient => transient,
    }
}

#[async_trait]
impl ReportSink for Database {
    async fn log_transaction(&self, record: &TransactionReport) -> Result<(), AppError> {
        self.save_transaction(record).await.map(|_| ())
    }

    async fn log_alert(&self, kind: AlertKind, message: &str) -> Result<(), AppError> {
        self.save_alert(kind.as_str(), message).await.map(|_| ())
    }

    async fn log_pause_event(&self, tx_hash: B256, success: bool) -> Result<(), AppError> {
        self.save_pause_event(&format!("{tx_hash:#x}"), success)
            .await
            .map(|_| ())
    }
}
