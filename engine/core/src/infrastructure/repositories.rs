// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::aggregate::{Aggregate, AggregateId};
use crate::domain::repository::{AggregateRepository, RepositoryError};

/// Non-durable aggregate storage.
#[derive(Clone, Default)]
pub struct InMemoryAggregateRepository {
    aggregates: Arc<DashMap<AggregateId, Arc<Aggregate>>>,
}

impl InMemoryAggregateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AggregateRepository for InMemoryAggregateRepository {
    async fn find(&self, id: AggregateId) -> Result<Option<Arc<Aggregate>>, RepositoryError> {
        Ok(self.aggregates.get(&id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, aggregate: &Arc<Aggregate>) -> Result<(), RepositoryError> {
        self.aggregates.insert(aggregate.id(), aggregate.clone());
        Ok(())
    }

    async fn remove(&self, id: AggregateId) -> Result<(), RepositoryError> {
        self.aggregates.remove(&id);
        Ok(())
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.aggregates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_find_remove() {
        let repo = InMemoryAggregateRepository::new();
        let aggregate = Arc::new(Aggregate::new(AggregateId::new()));

        assert!(repo.find(aggregate.id()).await.unwrap().is_none());
        repo.save(&aggregate).await.unwrap();
        let found = repo.find(aggregate.id()).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &aggregate));
        assert_eq!(repo.count().await.unwrap(), 1);

        repo.remove(aggregate.id()).await.unwrap();
        repo.remove(aggregate.id()).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
