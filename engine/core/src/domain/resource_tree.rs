// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! URI → aggregate directory.
//!
//! Mappings are only installed and removed by the lifecycle observer in
//! `crate::application::tree_observer`, so the tree reflects committed
//! events only.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::aggregate::AggregateId;

#[derive(Debug, Default)]
pub struct ResourceTree {
    entries: RwLock<HashMap<String, AggregateId>>,
}

impl ResourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact match first, then one retry with trailing slashes removed.
    pub fn lookup(&self, uri: &str) -> Option<AggregateId> {
        let entries = self.entries.read();
        if let Some(id) = entries.get(uri) {
            return Some(*id);
        }
        let trimmed = uri.trim_end_matches('/');
        if trimmed.len() == uri.len() || trimmed.is_empty() {
            return None;
        }
        entries.get(trimmed).copied()
    }

    pub fn lookup_exact(&self, uri: &str) -> Option<AggregateId> {
        self.entries.read().get(uri).copied()
    }

    /// Install a mapping, returning the identity it displaced.
    pub fn set_mapping(&self, uri: &str, id: AggregateId) -> Option<AggregateId> {
        self.entries
            .write()
            .insert(uri.to_string(), id)
            .filter(|previous| *previous != id)
    }

    /// Remove the mapping only if it still points at `id`.
    pub fn delete_mapping(&self, uri: &str, id: AggregateId) -> bool {
        let mut entries = self.entries.write();
        match entries.get(uri) {
            Some(current) if *current == id => {
                entries.remove(uri);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.entries.read().keys().cloned().collect();
        uris.sort();
        uris
    }
}
