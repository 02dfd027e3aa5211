//! Notification job models and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use campo_core::notification::NotificationKind;
use campo_core::types::{DbId, Timestamp};

use super::status::{NotificationStatus, StatusId};

/// A row from the `notification_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationJob {
    pub id: DbId,
    pub kind: String,
    pub target_ids: Vec<DbId>,
    pub payload: serde_json::Value,
    pub status_id: StatusId,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub send_after: Timestamp,
    pub last_error: Option<String>,
    pub sent_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl NotificationJob {
    /// Typed view of `status_id`; `None` only if the lookup table drifted.
    pub fn status(&self) -> Option<NotificationStatus> {
        NotificationStatus::from_id(self.status_id)
    }
}

/// DTO for inserting a job. Built by the enqueue facade after validation.
#[derive(Debug, Clone)]
pub struct NewNotificationJob {
    pub kind: NotificationKind,
    pub target_ids: Vec<DbId>,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub max_attempts: i32,
    /// `None` means "now" (database clock).
    pub send_after: Option<Timestamp>,
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub in_flight: i64,
    pub sent: i64,
    pub failed: i64,
}
