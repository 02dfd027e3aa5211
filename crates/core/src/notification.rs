//! Notification job vocabulary: audience kinds, enqueue options and payload
//! checks.
//!
//! The payload is an opaque JSON blob. The only thing the pipeline insists
//! on is that it is an object carrying a non-empty `title` and `body`;
//! every other field (icon, url, tag, requireInteraction, ...) is passed
//! through untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Attempts granted to a job when the caller does not specify any.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Priority used when the caller does not specify any.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Longest `last_error` stored on a job row.
pub const MAX_ERROR_LEN: usize = 500;

/// Topic used for admin notifications without an explicit `tag`.
pub const ADMIN_TOPIC: &str = "admin";

/// Topic used for broadcast notifications without an explicit `tag`.
pub const BROADCAST_TOPIC: &str = "broadcast";

/// Topic used for user notifications without an explicit `tag`.
pub const GENERAL_TOPIC: &str = "general";

// ---------------------------------------------------------------------------
// NotificationKind
// ---------------------------------------------------------------------------

/// Audience of a notification job; selects how recipients are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Every subscription flagged as admin.
    Admin,
    /// Subscriptions owned by the job's `target_ids`.
    User,
    /// Every subscription.
    Broadcast,
}

impl NotificationKind {
    /// The value stored in `notification_jobs.kind`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            "broadcast" => Ok(Self::Broadcast),
            other => Err(CoreError::Validation(format!(
                "Unknown notification kind: \"{other}\""
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Enqueue options
// ---------------------------------------------------------------------------

/// Optional scheduling knobs accepted by enqueue.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct EnqueueOptions {
    /// Higher values are claimed first. Defaults to [`DEFAULT_PRIORITY`].
    pub priority: Option<i32>,
    /// Earliest claim time. Defaults to now.
    pub send_after: Option<Timestamp>,
    /// Total delivery attempts before the job is failed.
    #[validate(range(min = 1, max = 25))]
    pub max_attempts: Option<i32>,
}

impl EnqueueOptions {
    pub fn priority(&self) -> i32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }

    pub fn max_attempts(&self) -> i32 {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Check the recipient list against the audience kind.
///
/// `user` jobs need at least one target; the list is ignored otherwise.
pub fn validate_targets(kind: NotificationKind, target_ids: &[DbId]) -> Result<(), CoreError> {
    if kind == NotificationKind::User && target_ids.is_empty() {
        return Err(CoreError::Validation(
            "User notifications require at least one target id".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Validate that a payload carries a non-empty `title` and `body`.
pub fn validate_payload(payload: &serde_json::Value) -> Result<(), CoreError> {
    let Some(object) = payload.as_object() else {
        return Err(CoreError::Validation(
            "Payload must be a JSON object".to_string(),
        ));
    };
    for field in ["title", "body"] {
        match object.get(field).and_then(|v| v.as_str()) {
            Some(value) if !value.trim().is_empty() => {}
            _ => {
                return Err(CoreError::Validation(format!(
                    "Payload must have a non-empty \"{field}\""
                )));
            }
        }
    }
    Ok(())
}

/// Push topic for a payload: its `tag` when present, otherwise a default
/// per audience.
pub fn payload_topic(payload: &serde_json::Value, kind: NotificationKind) -> String {
    match payload.get("tag").and_then(|v| v.as_str()) {
        Some(tag) if !tag.is_empty() => tag.to_string(),
        _ => match kind {
            NotificationKind::Admin => ADMIN_TOPIC,
            NotificationKind::User => GENERAL_TOPIC,
            NotificationKind::Broadcast => BROADCAST_TOPIC,
        }
        .to_string(),
    }
}

/// Clamp an error message to [`MAX_ERROR_LEN`] bytes on a char boundary.
pub fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_ERROR_LEN {
        return message.to_string();
    }
    let mut end = MAX_ERROR_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
