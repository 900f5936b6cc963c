// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    #[error("Transaction failed: {hash:?}, reason: {reason}")]
    Transaction { hash: String, reason: String },

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Validation failed for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Mitigation failed: {0}")]
    Mitigation(String),

    #[error("Report sink error: {0}")]
    Report(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl AppError {
    /// Transient I/O that callers retry instead of surfacing.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Connection(_) | AppError::Timeout(_))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    /// Pool exhaustion, I/O and a locked database are transient; everything else is a
    /// store failure.
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => AppError::Timeout(err.to_string()),
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed => AppError::Connection(err.to_string()),
            sqlx::Error::Database(db) if db.message().contains("locked") => {
                AppError::Timeout(err.to_string())
            }
            _ => AppError::Report(err.to_string()),
        }
    }
}
