// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Aggregate Store - load/commit/publish on top of the repository
//
// `load` never fails for an unknown id: it synthesizes a zero-value aggregate
// so that a create command has something to act on. `commit` persists while
// holding the aggregate's state write lock and always drains the pending
// buffer; a failed save discards those events and publishes nothing. Publishing happens after every aggregate lock is gone.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::aggregate::{Aggregate, AggregateId};
use crate::domain::events::ResourceEvent;
use crate::domain::repository::{AggregateRepository, RepositoryError};
use crate::infrastructure::event_bus::EventBus;

pub struct AggregateStore {
    repository: Arc<dyn AggregateRepository>,
    bus: EventBus,
}

impl AggregateStore {
    pub fn new(repository: Arc<dyn AggregateRepository>, bus: EventBus) -> Self {
        Self { repository, bus }
    }

    pub fn repository(&self) -> &Arc<dyn AggregateRepository> {
        &self.repository
    }

    /// Existing aggregate, or a fresh uncreated one with that identity.
    pub async fn load(&self, id: AggregateId) -> Result<Arc<Aggregate>, RepositoryError> {
        match self.repository.find(id).await? {
            Some(aggregate) => Ok(aggregate),
            None => {
                debug!(aggregate_id = %id, "Synthesizing new aggregate");
                Ok(Arc::new(Aggregate::new(id)))
            }
        }
    }

    pub async fn find(&self, id: AggregateId) -> Result<Option<Arc<Aggregate>>, RepositoryError> {
        self.repository.find(id).await
    }

    /// Persist the aggregate and hand back the events to publish:
    /// the drained pending buffer followed by `extra`.
    pub async fn commit(
        &self,
        aggregate: &Arc<Aggregate>,
        extra: Vec<ResourceEvent>,
    ) -> Result<Vec<ResourceEvent>, RepositoryError> {
        let mut state = aggregate.write().await;
        if let Err(e) = self.repository.save(aggregate).await {
            let discarded = state.take_pending().len() + extra.len();
            warn!(aggregate_id = %aggregate.id(), error = %e, discarded, "Save failed, discarding events");
            return Err(e);
        }
        let mut events = state.take_pending();
        events.extend(extra);
        Ok(events)
    }

    pub async fn publish(&self, events: Vec<ResourceEvent>) {
        if events.is_empty() {
            return;
        }
        self.bus.publish_all(events).await;
    }

    /// Commit and publish in one step. Used where no other lock needs to be
    /// released between the two.
    pub async fn save(&self, aggregate: &Arc<Aggregate>) -> Result<(), RepositoryError> {
        let events = self.commit(aggregate, Vec::new()).await?;
        self.publish(events).await;
        Ok(())
    }

    pub async fn remove(&self, id: AggregateId) -> Result<(), RepositoryError> {
        self.repository.remove(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregate::ResourceDefinition;
    use crate::infrastructure::repositories::InMemoryAggregateRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_load_synthesizes_then_save_persists() {
        let repository = Arc::new(InMemoryAggregateRepository::new());
        let bus = EventBus::new("main", 16);
        let mut listener = bus.listen(|_| true);
        let store = AggregateStore::new(repository.clone(), bus);

        let id = AggregateId::new();
        let aggregate = store.load(id).await.unwrap();
        assert!(!aggregate.read().await.is_created());
        assert!(store.find(id).await.unwrap().is_none());

        aggregate
            .write()
            .await
            .create(ResourceDefinition {
                resource_uri: "/redfish/v1".to_string(),
                ..Default::default()
            })
            .unwrap();
        store.save(&aggregate).await.unwrap();

        assert!(store.find(id).await.unwrap().is_some());
        assert!(matches!(
            listener.try_recv(),
            Some(ResourceEvent::ResourceCreated { .. })
        ));
        assert!(aggregate.read().await.pending_events().is_empty());
    }

    /// Rejects the first save, accepts the rest.
    struct FlakyRepository {
        inner: InMemoryAggregateRepository,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl AggregateRepository for FlakyRepository {
        async fn find(&self, id: AggregateId) -> Result<Option<Arc<Aggregate>>, RepositoryError> {
            self.inner.find(id).await
        }

        async fn save(&self, aggregate: &Arc<Aggregate>) -> Result<(), RepositoryError> {
            if self.saves.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(RepositoryError::Storage("disk full".to_string()));
            }
            self.inner.save(aggregate).await
        }

        async fn remove(&self, id: AggregateId) -> Result<(), RepositoryError> {
            self.inner.remove(id).await
        }

        async fn count(&self) -> Result<usize, RepositoryError> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn test_failed_commit_drops_events_for_good() {
        let repository = Arc::new(FlakyRepository {
            inner: InMemoryAggregateRepository::new(),
            saves: AtomicUsize::new(0),
        });
        let bus = EventBus::new("main", 16);
        let mut listener = bus.listen(|_| true);
        let store = AggregateStore::new(repository, bus);

        let aggregate = store.load(AggregateId::new()).await.unwrap();
        aggregate
            .write()
            .await
            .create(ResourceDefinition {
                resource_uri: "/redfish/v1/Systems/1".to_string(),
                ..Default::default()
            })
            .unwrap();
        let extra = vec![ResourceEvent::Injected {
            name: "Extra".to_string(),
            data: serde_json::json!({}),
            injected_at: chrono::Utc::now(),
        }];

        assert!(store.commit(&aggregate, extra).await.is_err());
        assert!(aggregate.read().await.pending_events().is_empty());

        let events = store.commit(&aggregate, Vec::new()).await.unwrap();
        assert!(events.is_empty());
        store.publish(events).await;
        assert!(listener.try_recv().is_none());
    }
}
