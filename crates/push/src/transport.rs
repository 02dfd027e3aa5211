//! Push transport contract.
//!
//! A transport takes one subscription and an already-serialized payload
//! and reports either success or a classified [`PushError`]. Retrying is
//! not the transport's business; the worker decides that from the class.

use std::time::Duration;

use async_trait::async_trait;
use campo_core::delivery::{classify_status, FailureClass};
use campo_core::notification::NotificationKind;
use serde::Serialize;

use crate::directory::Subscription;

/// Default time-to-live the push service keeps an undelivered message.
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

// ---------------------------------------------------------------------------
// SendOptions
// ---------------------------------------------------------------------------

/// Web Push urgency hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    VeryLow,
    Low,
    Normal,
    High,
}

impl Urgency {
    /// Default urgency of a notification kind. Broadcasts are not
    /// time-critical and may be deferred by the device.
    pub fn for_kind(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::Admin | NotificationKind::User => Self::High,
            NotificationKind::Broadcast => Self::Normal,
        }
    }
}

/// Per-message delivery options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOptions {
    pub ttl: Duration,
    pub urgency: Urgency,
    /// Replaces an undelivered message with the same topic on the device.
    pub topic: String,
}

impl SendOptions {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            ttl: DEFAULT_TTL,
            urgency: Urgency::High,
            topic: topic.into(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Classified failure of a single push send.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The endpoint expired or was unsubscribed.
    #[error("Subscription gone (HTTP {status})")]
    Gone { status: u16 },

    /// The push service rejected our credentials.
    #[error("Push service rejected credentials (HTTP {status}): {message}")]
    Forbidden { status: u16, message: String },

    /// The push service rejected the request itself.
    #[error("Push service rejected request (HTTP {status}): {message}")]
    Invalid { status: u16, message: String },

    /// Network failure, timeout, or the push service is unavailable.
    #[error("Transient push failure: {0}")]
    Transient(String),
}

impl PushError {
    /// Build the error matching a non-success HTTP status.
    ///
    /// Returns `None` for 2xx.
    pub fn from_status(status: u16, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        classify_status(status).map(|class| match class {
            FailureClass::Gone => Self::Gone { status },
            FailureClass::Forbidden => Self::Forbidden { status, message },
            FailureClass::Invalid => Self::Invalid { status, message },
            FailureClass::Transient => {
                Self::Transient(format!("push service returned HTTP {status}: {message}"))
            }
        })
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::Gone { .. } => FailureClass::Gone,
            Self::Forbidden { .. } => FailureClass::Forbidden,
            Self::Invalid { .. } => FailureClass::Invalid,
            Self::Transient(_) => FailureClass::Transient,
        }
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transient(format!("request timed out: {err}"))
        } else {
            Self::Transient(format!("request failed: {err}"))
        }
    }
}

// ---------------------------------------------------------------------------
// PushTransport
// ---------------------------------------------------------------------------

/// A channel able to deliver a payload to one subscription.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(
        &self,
        subscription: &Subscription,
        payload: &[u8],
        options: &SendOptions,
    ) -> Result<(), PushError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
