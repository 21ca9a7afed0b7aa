use async_trait::async_trait;
use thiserror::Error;

use carecall_core::domain::intake::IntakeRecord;

pub mod intake;
pub mod memory;

pub use intake::SqlIntakeRepository;
pub use memory::InMemoryIntakeRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Sink for completed intake conversations, keyed by the called number.
#[async_trait]
pub trait IntakeRepository: Send + Sync {
    /// Inserts the record, or replaces every column (including the
    /// timestamp) when the phone number already has one.
    async fn upsert(&self, record: IntakeRecord) -> Result<(), RepositoryError>;

    async fn find_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<IntakeRecord>, RepositoryError>;
}
