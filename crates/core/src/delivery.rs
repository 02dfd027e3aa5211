//! Delivery failure taxonomy and the job-level verdict.
//!
//! Each push send ends in success or one [`FailureClass`]. Per-subscription
//! outcomes are folded into a [`DeliveryTally`]; [`job_verdict`] then
//! decides whether the job as a whole succeeded, and if not, whether the
//! failure is worth retrying.

use std::fmt;

// ---------------------------------------------------------------------------
// FailureClass
// ---------------------------------------------------------------------------

/// Classified outcome of a single failed push send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The endpoint no longer exists (404/410). Subscription-level only.
    Gone,
    /// Credentials or configuration rejected (401/403).
    Forbidden,
    /// The request itself was rejected (other 4xx).
    Invalid,
    /// Network failure, timeout, rate limiting or a 5xx.
    Transient,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gone => "gone",
            Self::Forbidden => "forbidden",
            Self::Invalid => "invalid",
            Self::Transient => "transient",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a push-service HTTP status to a failure class.
///
/// Returns `None` for 2xx (delivered).
pub fn classify_status(status: u16) -> Option<FailureClass> {
    match status {
        200..=299 => None,
        404 | 410 => Some(FailureClass::Gone),
        401 | 403 => Some(FailureClass::Forbidden),
        408 | 429 => Some(FailureClass::Transient),
        400..=499 => Some(FailureClass::Invalid),
        _ => Some(FailureClass::Transient),
    }
}

// ---------------------------------------------------------------------------
// JobFailure
// ---------------------------------------------------------------------------

/// Why a job attempt failed, at job level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobFailure {
    /// Malformed payload, unknown kind, empty recipient list.
    #[error("[validation] {0}")]
    Permanent(String),

    /// The transport rejected our credentials.
    #[error("[auth] {0}")]
    Unauthorized(String),

    /// Timeout, network error, push service unavailable.
    #[error("[transient] {0}")]
    Transient(String),
}

impl JobFailure {
    /// Only transient failures go through backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

// ---------------------------------------------------------------------------
// DeliveryTally
// ---------------------------------------------------------------------------

/// Per-subscription outcomes of one job attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryTally {
    pub delivered: usize,
    pub gone: usize,
    pub forbidden: usize,
    pub invalid: usize,
    pub transient: usize,
    /// Most recent failure description, kept for `last_error`.
    pub last_error: Option<String>,
}

impl DeliveryTally {
    pub fn record_success(&mut self) {
        self.delivered += 1;
    }

    pub fn record_failure(&mut self, class: FailureClass, message: impl Into<String>) {
        match class {
            FailureClass::Gone => self.gone += 1,
            FailureClass::Forbidden => self.forbidden += 1,
            FailureClass::Invalid => self.invalid += 1,
            FailureClass::Transient => self.transient += 1,
        }
        self.last_error = Some(message.into());
    }

    /// Number of recipients a send was attempted for.
    pub fn attempted(&self) -> usize {
        self.delivered + self.gone + self.forbidden + self.invalid + self.transient
    }

    /// Failures that count against the job (gone endpoints do not).
    pub fn job_failures(&self) -> usize {
        self.forbidden + self.invalid + self.transient
    }
}

/// Decide the job-level outcome of an attempt.
///
/// The job succeeds when at least one send was delivered, when there was
/// nobody to send to, or when the only failures were gone endpoints.
/// Otherwise the most frequent failure class wins; ties go to the
/// retryable class, then to authorization.
pub fn job_verdict(tally: &DeliveryTally) -> Result<(), JobFailure> {
    if tally.delivered > 0 || tally.job_failures() == 0 {
        return Ok(());
    }

    let summary = format!(
        "{} of {} sends failed (forbidden: {}, invalid: {}, transient: {}, gone: {}){}",
        tally.job_failures() + tally.gone,
        tally.attempted(),
        tally.forbidden,
        tally.invalid,
        tally.transient,
        tally.gone,
        tally
            .last_error
            .as_deref()
            .map(|e| format!("; last error: {e}"))
            .unwrap_or_default(),
    );

    if tally.transient >= tally.forbidden && tally.transient >= tally.invalid {
        Err(JobFailure::Transient(summary))
    } else if tally.forbidden >= tally.invalid {
        Err(JobFailure::Unauthorized(summary))
    } else {
        Err(JobFailure::Permanent(summary))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
