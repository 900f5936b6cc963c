// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod detection;
pub mod reporting;
pub mod response;
pub mod sentinel;
pub mod stats;
