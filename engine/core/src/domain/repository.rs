// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Aggregate Repository Interface
//!
//! Persistence contract for resource aggregates. The engine ships with
//! `InMemoryAggregateRepository` in `crate::infrastructure::repositories`;
//! the store is not durable across restarts.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::aggregate::{Aggregate, AggregateId};

/// Repository interface for resource aggregates.
///
/// `save` is called while the store holds the aggregate's state write lock,
/// so implementations must not try to lock the aggregate themselves.
#[async_trait]
pub trait AggregateRepository: Send + Sync {
    /// Find aggregate by ID
    async fn find(&self, id: AggregateId) -> Result<Option<Arc<Aggregate>>, RepositoryError>;

    /// Save aggregate (create or update)
    async fn save(&self, aggregate: &Arc<Aggregate>) -> Result<(), RepositoryError>;

    /// Remove aggregate; removing an unknown id is not an error
    async fn remove(&self, id: AggregateId) -> Result<(), RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Aggregate not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
