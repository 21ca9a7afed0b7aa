use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use carecall_core::domain::intake::IntakeRecord;

use super::{IntakeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlIntakeRepository {
    pool: DbPool,
}

impl SqlIntakeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IntakeRepository for SqlIntakeRepository {
    async fn upsert(&self, record: IntakeRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO intake_records (
                phone_number,
                full_name,
                address,
                health_condition,
                created_at
             ) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(phone_number) DO UPDATE SET
                full_name = excluded.full_name,
                address = excluded.address,
                health_condition = excluded.health_condition,
                created_at = excluded.created_at",
        )
        .bind(&record.phone_number)
        .bind(record.full_name.as_deref())
        .bind(record.address.as_deref())
        .bind(record.health_condition.as_deref())
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<IntakeRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                phone_number,
                full_name,
                address,
                health_condition,
                created_at
             FROM intake_records
             WHERE phone_number = ?",
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }
}

fn record_from_row(row: SqliteRow) -> Result<IntakeRecord, RepositoryError> {
    Ok(IntakeRecord {
        phone_number: row.try_get("phone_number")?,
        full_name: row.try_get("full_name")?,
        address: row.try_get("address")?,
        health_condition: row.try_get("health_condition")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
