//! Subscription directory contract.
//!
//! Delivery reads the directory once per batch and writes back what it
//! learned about each endpoint: gone endpoints are removed, failures bump
//! the error counter, successes reset it.

use async_trait::async_trait;
use campo_core::types::DbId;
use campo_db::models::push_subscription::PushSubscription;
use campo_db::repositories::PushSubscriptionRepo;
use campo_db::DbPool;
use serde::Serialize;

/// Credential material the push service needs to address a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A delivery target as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    pub owner_id: Option<DbId>,
    pub is_admin: bool,
    pub error_count: i32,
}

impl From<PushSubscription> for Subscription {
    fn from(row: PushSubscription) -> Self {
        Self {
            endpoint: row.endpoint,
            keys: SubscriptionKeys {
                p256dh: row.p256dh,
                auth: row.auth,
            },
            owner_id: row.user_id,
            is_admin: row.is_admin,
            error_count: row.error_count,
        }
    }
}

/// Read/maintain access to registered push endpoints.
#[async_trait]
pub trait SubscriptionDirectory: Send + Sync {
    /// Every subscription currently eligible for delivery.
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, sqlx::Error>;

    /// Drop a subscription. Returns `true` if it existed.
    async fn remove_subscription(&self, endpoint: &str) -> Result<bool, sqlx::Error>;

    /// Record the outcome of a send that did not report the endpoint gone.
    async fn record_delivery_outcome(&self, endpoint: &str, success: bool) -> Result<(), sqlx::Error>;
}

/// [`SubscriptionDirectory`] over the `push_subscriptions` table.
///
/// Subscriptions whose `error_count` passed `error_ceiling` are hidden
/// from delivery until retention prunes them or the device re-registers.
#[derive(Debug, Clone)]
pub struct PgSubscriptionDirectory {
    pool: DbPool,
    error_ceiling: i32,
}

impl PgSubscriptionDirectory {
    pub fn new(pool: DbPool, error_ceiling: i32) -> Self {
        Self {
            pool,
            error_ceiling,
        }
    }
}

#[async_trait]
impl SubscriptionDirectory for PgSubscriptionDirectory {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, sqlx::Error> {
        let rows = PushSubscriptionRepo::list_healthy(&self.pool, self.error_ceiling).await?;
        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn remove_subscription(&self, endpoint: &str) -> Result<bool, sqlx::Error> {
        PushSubscriptionRepo::delete_by_endpoint(&self.pool, endpoint).await
    }

    async fn record_delivery_outcome(&self, endpoint: &str, success: bool) -> Result<(), sqlx::Error> {
        if success {
            PushSubscriptionRepo::record_success(&self.pool, endpoint).await
        } else {
            PushSubscriptionRepo::record_failure(&self.pool, endpoint).await
        }
    }
}
