//! Repository for the `push_subscriptions` table.

use sqlx::PgPool;

use crate::models::push_subscription::{PushSubscription, UpsertPushSubscription};

/// Column list for `push_subscriptions` queries.
const COLUMNS: &str = "\
    id, endpoint, p256dh, auth, user_id, is_admin, user_agent, \
    error_count, last_error_at, last_success_at, created_at, updated_at";

/// Provides directory operations for push subscriptions.
pub struct PushSubscriptionRepo;

impl PushSubscriptionRepo {
    /// Register a device, or refresh it if the endpoint is already known.
    ///
    /// Re-registering resets `error_count` so a device that came back is
    /// not pruned for its past failures.
    pub async fn upsert(
        pool: &PgPool,
        input: &UpsertPushSubscription,
    ) -> Result<PushSubscription, sqlx::Error> {
        let query = format!(
            "INSERT INTO push_subscriptions (endpoint, p256dh, auth, user_id, is_admin, user_agent) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (endpoint) DO UPDATE SET \
                 p256dh = EXCLUDED.p256dh, \
                 auth = EXCLUDED.auth, \
                 user_id = EXCLUDED.user_id, \
                 is_admin = EXCLUDED.is_admin, \
                 user_agent = EXCLUDED.user_agent, \
                 error_count = 0, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PushSubscription>(&query)
            .bind(&input.endpoint)
            .bind(&input.p256dh)
            .bind(&input.auth)
            .bind(input.user_id)
            .bind(input.is_admin)
            .bind(&input.user_agent)
            .fetch_one(pool)
            .await
    }

    /// Find a subscription by its endpoint.
    pub async fn find_by_endpoint(
        pool: &PgPool,
        endpoint: &str,
    ) -> Result<Option<PushSubscription>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM push_subscriptions WHERE endpoint = $1");
        sqlx::query_as::<_, PushSubscription>(&query)
            .bind(endpoint)
            .fetch_optional(pool)
            .await
    }

    /// List subscriptions whose `error_count` has not passed `error_ceiling`,
    /// newest first.
    pub async fn list_healthy(
        pool: &PgPool,
        error_ceiling: i32,
    ) -> Result<Vec<PushSubscription>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM push_subscriptions \
             WHERE error_count <= $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, PushSubscription>(&query)
            .bind(error_ceiling)
            .fetch_all(pool)
            .await
    }

    /// Delete a subscription. Returns `true` if a row was removed.
    pub async fn delete_by_endpoint(pool: &PgPool, endpoint: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = $1")
            .bind(endpoint)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful delivery: reset the error counter.
    pub async fn record_success(pool: &PgPool, endpoint: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE push_subscriptions \
             SET error_count = 0, last_success_at = NOW(), updated_at = NOW() \
             WHERE endpoint = $1",
        )
        .bind(endpoint)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a failed (but not gone) delivery: bump the error counter.
    pub async fn record_failure(pool: &PgPool, endpoint: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE push_subscriptions \
             SET error_count = error_count + 1, last_error_at = NOW(), updated_at = NOW() \
             WHERE endpoint = $1",
        )
        .bind(endpoint)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete subscriptions whose `error_count` exceeds `error_ceiling`.
    ///
    /// Returns the number of rows deleted.
    pub async fn prune_failing(pool: &PgPool, error_ceiling: i32) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE error_count > $1")
            .bind(error_ceiling)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
