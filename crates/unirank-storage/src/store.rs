use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use unirank_core::{normalize_name_key, university_id, UniversityRecord};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredUniversity {
    pub id: Uuid,
    pub record: UniversityRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no university with id {0}")]
    NotFound(Uuid),
    #[error("a university named `{0}` already exists")]
    Duplicate(String),
    #[error("record rejected: {0}")]
    Constraint(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Message(String),
}

/// Keyed lookup plus create/update against the durable university table.
#[async_trait]
pub trait UniversityStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Lookup by trimmed, case-insensitive name.
    async fn find_by_name(&self, name: &str) -> Result<Option<StoredUniversity>, StoreError>;

    async fn insert(&self, record: &UniversityRecord) -> Result<StoredUniversity, StoreError>;

    /// Overwrites every field of the row identified by `id`.
    async fn update(&self, id: Uuid, record: &UniversityRecord) -> Result<StoredUniversity, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    async fn list(&self) -> Result<Vec<StoredUniversity>, StoreError>;
}

pub(crate) fn validate_record(record: &UniversityRecord) -> Result<(), StoreError> {
    if record.name.trim().is_empty() {
        return Err(StoreError::Constraint("name must not be empty".to_string()));
    }
    if record.country.trim().is_empty() {
        return Err(StoreError::Constraint(format!(
            "country missing for `{}`",
            record.name
        )));
    }
    if !record.rating.is_finite() {
        return Err(StoreError::Constraint(format!(
            "rating is not a number for `{}`",
            record.name
        )));
    }
    Ok(())
}

/// Process-local store used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct InMemoryUniversityStore {
    rows: Mutex<HashMap<String, StoredUniversity>>,
}

impl InMemoryUniversityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UniversityStore for InMemoryUniversityStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<StoredUniversity>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.get(&normalize_name_key(name)).cloned())
    }

    async fn insert(&self, record: &UniversityRecord) -> Result<StoredUniversity, StoreError> {
        validate_record(record)?;
        let key = record.name_key();
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&key) {
            return Err(StoreError::Duplicate(record.name.clone()));
        }
        let id = university_id(&key);
        let now = Utc::now();
        let mut stored_record = record.clone();
        stored_record.id = Some(id);
        let stored = StoredUniversity {
            id,
            record: stored_record,
            created_at: now,
            updated_at: now,
        };
        rows.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: Uuid, record: &UniversityRecord) -> Result<StoredUniversity, StoreError> {
        validate_record(record)?;
        let mut rows = self.rows.lock().await;
        let old_key = rows
            .iter()
            .find(|(_, row)| row.id == id)
            .map(|(key, _)| key.clone())
            .ok_or(StoreError::NotFound(id))?;
        let new_key = record.name_key();
        if new_key != old_key && rows.contains_key(&new_key) {
            return Err(StoreError::Duplicate(record.name.clone()));
        }
        let Some(previous) = rows.remove(&old_key) else {
            return Err(StoreError::NotFound(id));
        };
        let mut stored_record = record.clone();
        stored_record.id = Some(id);
        let stored = StoredUniversity {
            id,
            record: stored_record,
            created_at: previous.created_at,
            updated_at: Utc::now(),
        };
        rows.insert(new_key, stored.clone());
        Ok(stored)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.rows.lock().await.len())
    }

    async fn list(&self) -> Result<Vec<StoredUniversity>, StoreError> {
        let rows = self.rows.lock().await;
        let mut out: Vec<_> = rows.values().cloned().collect();
        out.sort_by(|a, b| {
            a.record
                .country
                .cmp(&b.record.country)
                .then_with(|| a.record.name.cmp(&b.record.name))
        });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn record(name: &str, rating: f64) -> UniversityRecord {
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
            sources: BTreeSet::from(["qs-rankings".to_string()]),
            source_urls: vec![],
            rating,
            tuition: None,
            majors: None,
            facilities: None,
        }
    }

    #[tokio::test]
    async fn insert_then_find_is_case_insensitive() {
        let store = InMemoryUniversityStore::new();
        let stored = store.insert(&record("Kyoto University", 4.0)).await.unwrap();
        assert_eq!(stored.record.id, Some(stored.id));

        let found = store.find_by_name("  KYOTO university").await.unwrap().unwrap();
        assert_eq!(found.id, stored.id);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryUniversityStore::new();
        store.insert(&record("Kyoto University", 4.0)).await.unwrap();
        let err = store.insert(&record("kyoto university", 4.5)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn update_overwrites_fields_and_keeps_created_at() {
        let store = InMemoryUniversityStore::new();
        let first = store.insert(&record("Kyoto University", 4.0)).await.unwrap();
        let updated = store.update(first.id, &record("Kyoto University", 4.8)).await.unwrap();
        assert_eq!(updated.record.rating, 4.8);
        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found() {
        let store = InMemoryUniversityStore::new();
        let err = store
            .update(Uuid::new_v4(), &record("Kyoto University", 4.0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn blank_country_violates_constraint() {
        let store = InMemoryUniversityStore::new();
        let mut bad = record("Nowhere College", 3.0);
        bad.country = " ".to_string();
        assert!(matches!(
            store.insert(&bad).await.unwrap_err(),
            StoreError::Constraint(_)
        ));
    }
}
