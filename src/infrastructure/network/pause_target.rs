// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::data::abi::{decode_paused_return, pause_calldata, paused_calldata};
use crate::domain::types::{FeeBid, ReceiptStatus};
use crate::network::nonce::{NonceChoice, NonceManager};
use crate::network::provider::HttpProvider;
use crate::services::response::PauseTarget;
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy::providers::Provider;
use alloy::rpc::types::eth::{TransactionInput, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct ReceiptWait {
    pub poll: Duration,
    pub timeout: Duration,
    pub confirm_blocks: u64,
}

/// `pause()`/`paused()` against the monitored contract over JSON-RPC.
pub struct AlloyPauseTarget {
    provider: HttpProvider,
    signer: PrivateKeySigner,
    contract: Address,
    chain_id: u64,
    nonces: NonceManager,
    receipts: ReceiptWait,
}

impl AlloyPauseTarget {
    pub fn new(
        provider: HttpProvider,
        signer: PrivateKeySigner,
        contract: Address,
        chain_id: u64,
        receipts: ReceiptWait,
    ) -> Self {
        let nonces = NonceManager::new(provider.clone(), signer.address());
        Self {
            provider,
            signer,
            contract,
            chain_id,
            nonces,
            receipts,
        }
    }

    pub fn operator(&self) -> Address {
        self.signer.address()
    }

    fn sign_pause(
        &self,
        bid: &FeeBid,
        gas_limit: u64,
        nonce: u64,
    ) -> Result<(Vec<u8>, B256), AppError> {
        let mut tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            max_priority_fee_per_gas: bid.max_priority_fee_per_gas,
            max_fee_per_gas: bid.max_fee_per_gas,
            gas_limit,
            to: TxKind::Call(self.contract),
            value: U256::ZERO,
            access_list: Default::default(),
            input: Bytes::from(pause_calldata()),
        };

        let sig = TxSignerSync::sign_transaction_sync(&self.signer, &mut tx)
            .map_err(|e| AppError::Mitigation(format!("Sign pause failed: {}", e)))?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        Ok((signed.encoded_2718(), *signed.tx_hash()))
    }

    fn receipt_is_confirmed(current_head: u64, receipt_block: u64, confirm_blocks: u64) -> bool {
        let needed_head = receipt_block.saturating_add(confirm_blocks.saturating_sub(1));
        current_head >= needed_head
    }
}

#[async_trait]
impl PauseTarget for AlloyPauseTarget {
    async fn is_paused(&self) -> Result<bool, AppError> {
        let request = TransactionRequest::default()
            .to(self.contract)
            .input(TransactionInput::new(Bytes::from(paused_calldata())));
        let output = self
            .provider
            .call(request)
            .await
            .map_err(|e| AppError::Connection(format!("paused() call failed: {}", e)))?;
        decode_paused_return(&output)
    }

    async fn submit_pause(&self, bid: &FeeBid, gas_limit: u64) -> Result<B256, AppError> {
        let choice = self.nonces.next_for_submission().await?;
        let nonce = choice.value();
        let (raw, hash) = self.sign_pause(bid, gas_limit, nonce)?;

        // Recorded before the broadcast so a send cut short by a timeout is still
        // replaced on the next attempt rather than queued behind.
        self.nonces.record_submission(nonce, hash);
        if let Err(e) = self.provider.send_raw_transaction(&raw).await {
            let msg = e.to_string();
            if matches!(choice, NonceChoice::Replace(_)) && msg.contains("nonce too low") {
                // Previous attempt was mined between the receipt check and this broadcast.
                self.nonces.clear();
            }
            return Err(AppError::Transaction {
                hash: format!("{:#x}", hash),
                reason: msg,
            });
        }

        tracing::debug!(
            target: "rpc",
            tx_hash = %format!("{:#x}", hash),
            nonce,
            replacement = matches!(choice, NonceChoice::Replace(_)),
            "pause broadcast"
        );
        Ok(hash)
    }

    async fn await_receipt(&self, tx_hash: B256) -> Result<ReceiptStatus, AppError> {
        let timeout = self.receipts.timeout.max(Duration::from_millis(1));
        let poll = self.receipts.poll.max(Duration::from_millis(1));
        let started = Instant::now();

        while started.elapsed() < timeout {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(rcpt)) => {
                    if !rcpt.status() {
                        self.nonces.clear();
                        return Ok(ReceiptStatus::ConfirmedRevert);
                    }
                    let Some(receipt_block) = rcpt.block_number else {
                        self.nonces.clear();
                        return Ok(ReceiptStatus::ConfirmedSuccess);
                    };
                    let head = self.provider.get_block_number().await.unwrap_or(receipt_block);
                    if Self::receipt_is_confirmed(
                        head.max(receipt_block),
                        receipt_block,
                        self.receipts.confirm_blocks.max(1),
                    ) {
                        self.nonces.clear();
                        return Ok(ReceiptStatus::ConfirmedSuccess);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        target: "rpc",
                        error = %e,
                        hash = %format!("{:#x}", tx_hash),
                        "Receipt lookup error; retrying"
                    );
                }
            }

            tokio::time::sleep(poll).await;
        }

        Ok(ReceiptStatus::UnknownTimeout)
    }
}
