// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::common::retry::retry_async;
use crate::domain::types::NetworkFees;
use crate::network::provider::HttpProvider;
use crate::services::response::FeeOracle;
use alloy::providers::Provider;
use alloy::rpc::types::BlockNumberOrTag;
use alloy::rpc::types::eth::FeeHistory;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default tip when the node reports no reward percentiles.
const DEFAULT_TIP_WEI: u128 = 2_000_000_000;

#[derive(Clone)]
pub struct GasOracle {
    provider: HttpProvider,
    last_good: Arc<Mutex<Option<NetworkFees>>>,
}

impl GasOracle {
    pub fn new(provider: HttpProvider) -> Self {
        Self {
            provider,
            last_good: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn estimate_eip1559_fees(&self) -> Result<NetworkFees, AppError> {
        match self.with_retry_history().await {
            Ok(history) => {
                let fees = Self::fees_from_history(&history)?;
                if let Ok(mut guard) = self.last_good.lock() {
                    *guard = Some(fees);
                }
                Ok(fees)
            }
            Err(e) => {
                tracing::debug!(target: "gas", error = %e, "fee history unavailable");
                if let Some(fees) = self.last_good.lock().ok().and_then(|g| *g) {
                    return Ok(fees);
                }
                self.fallback_estimate().await
            }
        }
    }

    async fn with_retry_history(&self) -> Result<FeeHistory, AppError> {
        let provider = self.provider.clone();
        retry_async(
            move |_| {
                let provider = provider.clone();
                async move {
                    // p90 tips: the pause has to land ahead of the attacker, not at the median.
                    provider
                        .get_fee_history(5, BlockNumberOrTag::Latest, &[90.0f64])
                        .await
                }
            },
            3,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Fee History failed: {}", e)))
    }

    fn fees_from_history(history: &FeeHistory) -> Result<NetworkFees, AppError> {
        let latest_base_fee = history
            .latest_block_base_fee()
            .or_else(|| history.base_fee_per_gas.iter().rev().nth(1).copied())
            .ok_or(AppError::Initialization("No base fee history".into()))?;

        let raw_next_base = history.next_block_base_fee().unwrap_or(latest_base_fee);
        // 12.5% is the most the base fee can move in one block.
        let next_base_fee = if raw_next_base == 0 {
            latest_base_fee.saturating_mul(1125) / 1000
        } else {
            raw_next_base
        };

        let tips: Vec<u128> = history
            .reward
            .as_ref()
            .map(|rewards| rewards.iter().filter_map(|r| r.first().copied()).collect())
            .unwrap_or_default();
        let tip = if tips.is_empty() {
            DEFAULT_TIP_WEI
        } else {
            tips.iter().fold(0u128, |acc, t| acc.saturating_add(*t)) / tips.len() as u128
        };

        Ok(NetworkFees {
            max_fee_per_gas: next_base_fee.saturating_add(tip),
            max_priority_fee_per_gas: tip,
        })
    }

    async fn fallback_estimate(&self) -> Result<NetworkFees, AppError> {
        // Some public RPCs disable feeHistory.
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| AppError::Connection(format!("Latest block fetch failed: {}", e)))?;

        let base: u128 = block
            .as_ref()
            .and_then(|b| b.header.base_fee_per_gas)
            .map(|v| v as u128)
            .unwrap_or(1_500_000_000u128);

        let priority: u128 = self
            .provider
            .get_max_priority_fee_per_gas()
            .await
            .unwrap_or(DEFAULT_TIP_WEI);

        let next_base = base.saturating_mul(1125) / 1000;
        Ok(NetworkFees {
            max_fee_per_gas: next_base.saturating_add(priority),
            max_priority_fee_per_gas: priority,
        })
    }
}

#[async_trait]
impl FeeOracle for GasOracle {
    async fn network_fees(&self) -> Result<NetworkFees, AppError> {
        self.estimate_eip1559_fees().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(base: Vec<u128>, rewards: Option<Vec<Vec<u128>>>) -> FeeHistory {
        FeeHistory {
            base_fee_per_gas: base,
            gas_used_ratio: vec![0.5; 2],
            reward: rewards,
            oldest_block: 100,
            ..Default::default()
        }
    }

    #[test]
    fn history_uses_next_base_and_average_tip() {
        let h = history(vec![10, 12, 14], Some(vec![vec![4], vec![6]]));
        let fees = GasOracle::fees_from_history(&h).unwrap();
        assert_eq!(fees.max_priority_fee_per_gas, 5);
        assert_eq!(fees.max_fee_per_gas, 14 + 5);
    }

    #[test]
    fn history_without_rewards_uses_default_tip() {
        let h = history(vec![1_000, 1_000], None);
        let fees = GasOracle::fees_from_history(&h).unwrap();
        assert_eq!(fees.max_priority_fee_per_gas, DEFAULT_TIP_WEI);
    }

    #[test]
    fn empty_history_is_an_error() {
        let h = history(Vec::new(), None);
        assert!(GasOracle::fees_from_history(&h).is_err());
    }
}
