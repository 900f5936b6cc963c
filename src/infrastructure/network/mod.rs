// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod gas;
pub mod ingest;
pub use ingest::mempool;

pub mod nonce;
pub mod pause_target;
pub mod provider;
