// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use dashmap::DashMap;

/// Revoked token ids mapped to the token's original expiry. Entries are kept
/// until the token would have expired anyway and are pruned on lookup.
#[derive(Debug, Default)]
pub struct RevocationList {
    entries: DashMap<String, i64>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, token_id: impl Into<String>, expires_at: i64) {
        self.entries.insert(token_id.into(), expires_at);
    }

    pub fn is_revoked(&self, token_id: &str, now: i64) -> bool {
        self.prune(now);
        self.entries.contains_key(token_id)
    }

    fn prune(&self, now: i64) {
        self.entries.retain(|_, expires_at| *expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
