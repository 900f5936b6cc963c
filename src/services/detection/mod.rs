// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod classifier;
pub mod sequence;

pub use classifier::{DetectionRules, SequenceRule, SuspicionClassifier};
pub use sequence::{SequenceTracker, WindowEntry};
