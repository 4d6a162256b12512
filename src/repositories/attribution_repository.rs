use crate::error::RepositoryError;
use crate::models::{AttributionRecord, UserId};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Storage for `code -> true inviter` records of bot-authored invites
#[async_trait]
pub trait AttributionStore: Send + Sync {
    /// Record that `code` was issued on behalf of `inviter`
    async fn create(&self, code: &str, inviter: UserId) -> Result<AttributionRecord, RepositoryError>;

    /// Look up a record without consuming it
    async fn get(&self, code: &str) -> Result<Option<AttributionRecord>, RepositoryError>;

    /// Delete a record, returning whether one existed
    async fn delete(&self, code: &str) -> Result<bool, RepositoryError>;

    /// Remove and return a record in one step
    ///
    /// Two concurrent calls for the same code never both see the record.
    async fn take(&self, code: &str) -> Result<Option<AttributionRecord>, RepositoryError>;
}

/// Repository for attribution records backed by Postgres
pub struct AttributionRepository {
    pool: PgPool,
}

impl AttributionRepository {
    /// Create a new AttributionRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttributionStore for AttributionRepository {
    async fn create(&self, code: &str, inviter: UserId) -> Result<AttributionRecord, RepositoryError> {
        let record = sqlx::query_as::<_, AttributionRecord>(
            r#"
            INSERT INTO invite_attributions (code, inviter_id)
            VALUES ($1, $2)
            RETURNING code, inviter_id, created_at
            "#,
        )
        .bind(code)
        .bind(inviter.get() as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get(&self, code: &str) -> Result<Option<AttributionRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, AttributionRecord>(
            r#"
            SELECT code, inviter_id, created_at
            FROM invite_attributions
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete(&self, code: &str) -> Result<bool, RepositoryError> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM invite_attributions
            WHERE code = $1
            "#,
        )
        .bind(code)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn take(&self, code: &str) -> Result<Option<AttributionRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, AttributionRecord>(
            r#"
            DELETE FROM invite_attributions
            WHERE code = $1
            RETURNING code, inviter_id, created_at
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

/// Process-local attribution store
///
/// Used when no database is configured; records do not survive a restart.
#[derive(Default)]
pub struct InMemoryAttributionStore {
    records: Mutex<HashMap<String, AttributionRecord>>,
}

impl InMemoryAttributionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl AttributionStore for InMemoryAttributionStore {
    async fn create(&self, code: &str, inviter: UserId) -> Result<AttributionRecord, RepositoryError> {
        let mut records = self.records.lock().await;
        if records.contains_key(code) {
            return Err(RepositoryError::Duplicate(code.to_string()));
        }

        let record = AttributionRecord::new(code.to_string(), inviter);
        records.insert(code.to_string(), record.clone());
        Ok(record)
    }

    async fn get(&self, code: &str) -> Result<Option<AttributionRecord>, RepositoryError> {
        Ok(self.records.lock().await.get(code).cloned())
    }

    async fn delete(&self, code: &str) -> Result<bool, RepositoryError> {
        Ok(self.records.lock().await.remove(code).is_some())
    }

    async fn take(&self, code: &str) -> Result<Option<AttributionRecord>, RepositoryError> {
        Ok(self.records.lock().await.remove(code))
    }
}
