// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use dashmap::DashSet;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Mutex;

/// Bounded first-seen set. The oldest key is forgotten once `max_len` is exceeded.
pub struct SeenCache<T> {
    seen: DashSet<T>,
    order: Mutex<VecDeque<T>>,
    max_len: usize,
}

impl<T> SeenCache<T>
where
    T: Copy + Eq + Hash,
{
    pub fn new(max_len: usize) -> Self {
        Self {
            seen: DashSet::new(),
            order: Mutex::new(VecDeque::new()),
            max_len: max_len.max(1),
        }
    }

    /// Returns `true` only for keys not currently remembered.
    pub fn remember(&self, key: T) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        order.push_back(key);
        while order.len() > self.max_len {
            if let Some(oldest) = order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
