//! Push subscription models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use campo_core::types::{DbId, Timestamp};

/// A row from the `push_subscriptions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PushSubscription {
    pub id: DbId,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub user_id: Option<DbId>,
    pub is_admin: bool,
    pub user_agent: Option<String>,
    pub error_count: i32,
    pub last_error_at: Option<Timestamp>,
    pub last_success_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering (or refreshing) a device subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertPushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub user_id: Option<DbId>,
    #[serde(default)]
    pub is_admin: bool,
    pub user_agent: Option<String>,
}
