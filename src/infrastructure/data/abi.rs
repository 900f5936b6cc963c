// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::error::AppError;
use crate::domain::types::VaultCall;
use alloy::sol;
use alloy::sol_types::{SolCall, SolInterface};

sol! {
    /// Surface of the monitored contract this crate touches.
    interface IPausableVault {
        function deposit() external payable;
        function withdraw(uint256 amount) external;
        function pause() external;
        function unpause() external;
        function paused() external view returns (bool);
    }
}

/// Decode calldata sent to the monitored contract. Unknown selectors are not an error.
pub fn decode_vault_call(input: &[u8]) -> VaultCall {
    match IPausableVault::IPausableVaultCalls::abi_decode(input) {
        Ok(IPausableVault::IPausableVaultCalls::deposit(_)) => VaultCall::Deposit,
        Ok(IPausableVault::IPausableVaultCalls::withdraw(call)) => VaultCall::Withdraw {
            amount: call.amount,
        },
        Ok(IPausableVault::IPausableVaultCalls::pause(_)) => VaultCall::Pause,
        Ok(IPausableVault::IPausableVaultCalls::unpause(_)) => VaultCall::Unpause,
        Ok(IPausableVault::IPausableVaultCalls::paused(_)) | Err(_) => VaultCall::Unknown {
            selector: input.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok()),
        },
    }
}

pub fn pause_calldata() -> Vec<u8> {
    IPausableVault::pauseCall {}.abi_encode()
}

pub fn paused_calldata() -> Vec<u8> {
    IPausableVault::pausedCall {}.abi_encode()
}

pub fn decode_paused_return(output: &[u8]) -> Result<bool, AppError> {
    IPausableVault::pausedCall::abi_decode_returns(output)
        .map_err(|e| AppError::Decode(format!("paused() return: {e}")))
}
