use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::RwLock;

use carecall_core::domain::intake::IntakeRecord;

use super::{IntakeRepository, RepositoryError};

/// Map-backed stand-in for `SqlIntakeRepository`. Writes can be toggled off
/// to exercise the persistence-failure path without a broken pool.
#[derive(Default)]
pub struct InMemoryIntakeRepository {
    records: RwLock<HashMap<String, IntakeRecord>>,
    reject_writes: AtomicBool,
    upsert_calls: AtomicUsize,
}

impl InMemoryIntakeRepository {
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of upsert attempts, counting rejected ones.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IntakeRepository for InMemoryIntakeRepository {
    async fn upsert(&self, record: IntakeRecord) -> Result<(), RepositoryError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolClosed));
        }

        let mut records = self.records.write().await;
        records.insert(record.phone_number.clone(), record);
        Ok(())
    }

    async fn find_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<IntakeRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(phone_number).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use carecall_core::domain::intake::IntakeRecord;

    use crate::repositories::{InMemoryIntakeRepository, IntakeRepository};

    fn record(phone_number: &str, full_name: &str) -> IntakeRecord {
        IntakeRecord {
            full_name: Some(full_name.to_string()),
            phone_number: phone_number.to_string(),
            address: None,
            health_condition: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_intake_repo_round_trip() {
        let repo = InMemoryIntakeRepository::default();
        let saved = record("+15550142", "Rosa Delgado");

        repo.upsert(saved.clone()).await.expect("save record");
        let found = repo.find_by_phone_number("+15550142").await.expect("find record");

        assert_eq!(found, Some(saved));
        assert_eq!(repo.upsert_calls(), 1);
    }

    #[tokio::test]
    async fn later_upsert_replaces_earlier_record() {
        let repo = InMemoryIntakeRepository::default();

        repo.upsert(record("+15550142", "Rosa Delgado")).await.expect("first save");
        repo.upsert(record("+15550142", "Rosa Delgado-Marsh")).await.expect("second save");

        let found = repo.find_by_phone_number("+15550142").await.expect("find record");
        assert_eq!(found.and_then(|r| r.full_name).as_deref(), Some("Rosa Delgado-Marsh"));
    }

    #[tokio::test]
    async fn rejected_writes_surface_an_error_and_store_nothing() {
        let repo = InMemoryIntakeRepository::default();
        repo.reject_writes(true);

        let error = repo.upsert(record("+15550142", "Rosa Delgado")).await;
        assert!(error.is_err());
        assert_eq!(repo.upsert_calls(), 1);

        let found = repo.find_by_phone_number("+15550142").await.expect("lookup");
        assert_eq!(found, None);
    }
}
