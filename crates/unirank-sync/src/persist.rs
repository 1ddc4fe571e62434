//! Batched, failure-tolerant upsert of merged records.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};
use unirank_core::{PersistFailure, UniversityRecord};
use unirank_storage::{StoreError, UniversityStore};

pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, Default)]
pub struct PersistOutcome {
    pub created_count: usize,
    pub updated_count: usize,
    pub failures: Vec<PersistFailure>,
    /// Input order; successfully stored records carry their id.
    pub records: Vec<UniversityRecord>,
}

pub struct PersistenceGateway {
    store: Arc<dyn UniversityStore>,
    batch_size: usize,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn UniversityStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Look up by name, then update the existing row or insert a new one.
    pub async fn upsert(&self, record: &UniversityRecord) -> Result<(UpsertAction, UniversityRecord), StoreError> {
        match self.store.find_by_name(&record.name).await? {
            Some(existing) => {
                let stored = self.store.update(existing.id, record).await?;
                Ok((UpsertAction::Updated, stored.record))
            }
            None => {
                let stored = self.store.insert(record).await?;
                Ok((UpsertAction::Created, stored.record))
            }
        }
    }

    /// Batches run one after another; upserts inside a batch run concurrently.
    pub async fn persist(&self, records: Vec<UniversityRecord>) -> PersistOutcome {
        let mut outcome = PersistOutcome::default();
        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            let results = join_all(batch.iter().map(|record| self.upsert(record))).await;
            for (record, result) in batch.iter().zip(results) {
                match result {
                    Ok((action, stored)) => {
                        match action {
                            UpsertAction::Created => outcome.created_count += 1,
                            UpsertAction::Updated => outcome.updated_count += 1,
                        }
                        outcome.records.push(stored);
                    }
                    Err(err) => {
                        warn!(name = %record.name, error = %err, "failed to persist record");
                        outcome.failures.push(PersistFailure {
                            name: record.name.clone(),
                            message: err.to_string(),
                        });
                        outcome.records.push(record.clone());
                    }
                }
            }
            debug!(batch = index, size = batch.len(), backend = self.store.backend(), "persisted batch");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use unirank_storage::{InMemoryUniversityStore, StoredUniversity};
    use uuid::Uuid;

    use super::*;

    fn record(name: &str) -> UniversityRecord {
        UniversityRecord {
            id: None,
            name: name.to_string(),
            country: "Japan".to_string(),
            city: None,
            location: None,
            rank: None,
            score: None,
            website: None,
            image_url: None,
            description: None,
            sources: BTreeSet::from(["synthetic".to_string()]),
            source_urls: vec![],
            rating: 4.0,
            tuition: None,
            majors: None,
            facilities: None,
        }
    }

    /// Delegates to memory but rejects one name.
    struct FailingStore {
        inner: InMemoryUniversityStore,
        poison: String,
    }

    #[async_trait::async_trait]
    impl UniversityStore for FailingStore {
        fn backend(&self) -> &'static str {
            "failing"
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<StoredUniversity>, StoreError> {
            self.inner.find_by_name(name).await
        }

        async fn insert(&self, record: &UniversityRecord) -> Result<StoredUniversity, StoreError> {
            if record.name == self.poison {
                return Err(StoreError::Constraint("simulated failure".to_string()));
            }
            self.inner.insert(record).await
        }

        async fn update(&self, id: Uuid, record: &UniversityRecord) -> Result<StoredUniversity, StoreError> {
            self.inner.update(id, record).await
        }

        async fn count(&self) -> Result<usize, StoreError> {
            self.inner.count().await
        }

        async fn list(&self) -> Result<Vec<StoredUniversity>, StoreError> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn first_run_creates_second_run_updates() {
        let store = Arc::new(InMemoryUniversityStore::new());
        let gateway = PersistenceGateway::new(store.clone(), 2);
        let input: Vec<_> = (1..=5).map(|i| record(&format!("Japan {i} University"))).collect();

        let first = gateway.persist(input.clone()).await;
        assert_eq!((first.created_count, first.updated_count), (5, 0));
        assert!(first.records.iter().all(|r| r.id.is_some()));

        let second = gateway.persist(input).await;
        assert_eq!((second.created_count, second.updated_count), (0, 5));
        assert_eq!(store.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let store = Arc::new(FailingStore {
            inner: InMemoryUniversityStore::new(),
            poison: "Japan 7 University".to_string(),
        });
        let gateway = PersistenceGateway::new(store, DEFAULT_BATCH_SIZE);
        let input: Vec<_> = (1..=50).map(|i| record(&format!("Japan {i} University"))).collect();

        let outcome = gateway.persist(input).await;
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].name, "Japan 7 University");
        assert_eq!(outcome.created_count + outcome.updated_count, 49);
        assert_eq!(outcome.records.len(), 50);
        assert!(outcome.records[6].id.is_none());
    }

    #[tokio::test]
    async fn zero_batch_size_is_clamped() {
        let store = Arc::new(InMemoryUniversityStore::new());
        let gateway = PersistenceGateway::new(store, 0);
        assert_eq!(gateway.batch_size(), 1);
        let outcome = gateway.persist(vec![record("Kyoto University")]).await;
        assert_eq!(outcome.created_count, 1);
    }
}
