// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::error::AppError;
use crate::common::retry::retry_async;
use crate::network::provider::HttpProvider;
use alloy::primitives::{Address, B256};
use alloy::providers::Provider;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Picks nonces for mitigation transactions so an unmined attempt is replaced, not queued behind.
#[derive(Clone)]
pub struct NonceManager {
    provider: HttpProvider,
    address: Address,
    in_flight: Arc<Mutex<Option<(u64, B256)>>>,
}

/// What the next submission should do with its nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceChoice {
    Fresh(u64),
    Replace(u64),
}

impl NonceChoice {
    pub fn value(self) -> u64 {
        match self {
            NonceChoice::Fresh(n) | NonceChoice::Replace(n) => n,
        }
    }
}

impl NonceManager {
    pub fn new(provider: HttpProvider, address: Address) -> Self {
        Self {
            provider,
            address,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn next_for_submission(&self) -> Result<NonceChoice, AppError> {
        let previous = *self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((nonce, hash)) = previous {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(None) => return Ok(NonceChoice::Replace(nonce)),
                Ok(Some(_)) => self.clear(),
                Err(e) => {
                    tracing::debug!(
                        target: "nonce",
                        error = %e,
                        "Receipt lookup failed; replacing previous attempt"
                    );
                    return Ok(NonceChoice::Replace(nonce));
                }
            }
        }

        let provider = self.provider.clone();
        let address = self.address;
        let pending: u64 = retry_async(
            move |_| {
                let provider = provider.clone();
                async move { provider.get_transaction_count(address).pending().await }
            },
            3,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Failed to fetch nonce: {}", e)))?;

        Ok(NonceChoice::Fresh(pending))
    }

    pub fn record_submission(&self, nonce: u64, hash: B256) {
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = Some((nonce, hash));
    }

    pub fn clear(&self) {
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
