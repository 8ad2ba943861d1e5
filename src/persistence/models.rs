//! Database Models
//!
//! Persistent data structures for stored API credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// API key row in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKeyRow {
    pub id: String,
    pub user_id: String,
    pub label: String,
    pub encrypted_api_key: String,
    pub encrypted_secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Create API key input
#[derive(Debug, Clone)]
pub struct CreateApiKey {
    pub id: String,
    pub user_id: String,
    pub label: String,
    pub encrypted_api_key: String,
    pub encrypted_secret: String,
}

impl From<ApiKeyRow> for crate::credentials::ApiKeyRecord {
    fn from(row: ApiKeyRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            label: row.label,
            encrypted_api_key: row.encrypted_api_key,
            encrypted_secret: row.encrypted_secret,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        }
    }
}
