// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct TransactionRecord {
    pub id: i64,
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: Option<String>,
    pub value_wei: String,
    pub function: Option<String>,
    pub suspicion: Option<String>,
    pub observed_at_ms: i64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, FromRow)]
pub struct AlertRecord {
    pub id: i64,
    pub kind: String,
    pub message: String,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, FromRow)]
pub struct PauseEventRecord {
    pub id: i64,
    pub tx_hash: String,
    pub success: bool,
    pub timestamp: NaiveDateTime,
}

/// Aggregate counters over the report store.
#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    pub transaction_count: i64,
    pub alert_count: i64,
    pub pause_event_count: i64,
    pub successful_pauses: i64,
    pub pause_effectiveness_pct: f64,
    pub latest_analysis_report: Option<serde_json::Value>,
}
