//! Database Repository
//!
//! Data access layer for stored API credentials.

use super::models::{ApiKeyRow, CreateApiKey};
use super::{DatabaseError, DbPool};
use crate::credentials::{ApiKeyRecord, CredentialError, CredentialStore};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

/// API key repository backed by SQLite
pub struct ApiKeyRepository {
    pool: DbPool,
}

impl ApiKeyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Store a new encrypted credential pair
    pub async fn create(&self, input: CreateApiKey) -> Result<ApiKeyRow, DatabaseError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            INSERT INTO api_keys (
                id, user_id, label, encrypted_api_key, encrypted_secret,
                is_active, created_at, last_used_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, NULL)
            RETURNING *
            "#,
        )
        .bind(&input.id)
        .bind(&input.user_id)
        .bind(&input.label)
        .bind(&input.encrypted_api_key)
        .bind(&input.encrypted_secret)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create api key: {}", e);
            DatabaseError::QueryError(format!("Failed to create api key: {}", e))
        })?;

        debug!("Stored api key {} for user {}", row.id, row.user_id);
        Ok(row)
    }

    /// Soft-delete a credential pair
    pub async fn deactivate(&self, id: &str) -> Result<(), DatabaseError> {
        let rows_affected = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to deactivate api key {}: {}", id, e);
                DatabaseError::QueryError(format!("Failed to deactivate api key: {}", e))
            })?
            .rows_affected();

        if rows_affected == 0 {
            return Err(DatabaseError::QueryError(format!("Api key not found: {}", id)));
        }

        debug!("Deactivated api key {}", id);
        Ok(())
    }

    /// Get a key row by ID (active or not)
    pub async fn get(&self, id: &str) -> Result<Option<ApiKeyRow>, DatabaseError> {
        sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to get api key {}: {}", id, e);
                DatabaseError::QueryError(format!("Failed to get api key: {}", e))
            })
    }
}

#[async_trait]
impl CredentialStore for ApiKeyRepository {
    async fn find_active_keys_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ApiKeyRecord>, CredentialError> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT * FROM api_keys
            WHERE user_id = ?1 AND is_active = 1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list api keys for {}: {}", user_id, e);
            CredentialError::Storage(e.to_string())
        })?;

        Ok(rows.into_iter().map(ApiKeyRecord::from).collect())
    }

    async fn mark_used(&self, id: &str) -> Result<(), CredentialError> {
        sqlx::query("UPDATE api_keys SET last_used_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to mark api key {} used: {}", id, e);
                CredentialError::Storage(e.to_string())
            })?;
        Ok(())
    }
}
