//! Integration tests for the push subscription directory repository.

use campo_db::models::push_subscription::UpsertPushSubscription;
use campo_db::repositories::PushSubscriptionRepo;
use sqlx::PgPool;

fn device(endpoint: &str, user_id: Option<i64>, is_admin: bool) -> UpsertPushSubscription {
    UpsertPushSubscription {
        endpoint: endpoint.to_string(),
        p256dh: "BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA_0QTpQtUbVlUls0VJXg7A8u-Ts1XbjhazAkj7I99e8QcYP7DkM".to_string(),
        auth: "tBHItJI5svbpez7KI4CCXg".to_string(),
        user_id,
        is_admin,
        user_agent: Some("Mozilla/5.0".to_string()),
    }
}

async fn set_error_count(pool: &PgPool, endpoint: &str, count: i32) {
    sqlx::query("UPDATE push_subscriptions SET error_count = $2 WHERE endpoint = $1")
        .bind(endpoint)
        .bind(count)
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn upsert_inserts_then_refreshes(pool: PgPool) {
    let first = PushSubscriptionRepo::upsert(&pool, &device("https://push.example/a", Some(1), false))
        .await
        .unwrap();
    set_error_count(&pool, "https://push.example/a", 4).await;

    let second = PushSubscriptionRepo::upsert(&pool, &device("https://push.example/a", Some(2), true))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.user_id, Some(2));
    assert!(second.is_admin);
    assert_eq!(second.error_count, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_healthy_excludes_subscriptions_past_ceiling(pool: PgPool) {
    PushSubscriptionRepo::upsert(&pool, &device("https://push.example/ok", Some(1), false))
        .await
        .unwrap();
    PushSubscriptionRepo::upsert(&pool, &device("https://push.example/flaky", Some(2), false))
        .await
        .unwrap();
    PushSubscriptionRepo::upsert(&pool, &device("https://push.example/dead", Some(3), false))
        .await
        .unwrap();
    set_error_count(&pool, "https://push.example/flaky", 5).await;
    set_error_count(&pool, "https://push.example/dead", 6).await;

    let healthy = PushSubscriptionRepo::list_healthy(&pool, 5).await.unwrap();
    let endpoints: Vec<&str> = healthy.iter().map(|s| s.endpoint.as_str()).collect();

    assert_eq!(endpoints.len(), 2);
    assert!(endpoints.contains(&"https://push.example/ok"));
    assert!(endpoints.contains(&"https://push.example/flaky"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failure_and_success_update_counters(pool: PgPool) {
    let endpoint = "https://push.example/counter";
    PushSubscriptionRepo::upsert(&pool, &device(endpoint, None, true))
        .await
        .unwrap();

    PushSubscriptionRepo::record_failure(&pool, endpoint).await.unwrap();
    PushSubscriptionRepo::record_failure(&pool, endpoint).await.unwrap();
    let failing = PushSubscriptionRepo::find_by_endpoint(&pool, endpoint)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failing.error_count, 2);
    assert!(failing.last_error_at.is_some());

    PushSubscriptionRepo::record_success(&pool, endpoint).await.unwrap();
    let recovered = PushSubscriptionRepo::find_by_endpoint(&pool, endpoint)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recovered.error_count, 0);
    assert!(recovered.last_success_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_by_endpoint_reports_removal(pool: PgPool) {
    let endpoint = "https://push.example/gone";
    PushSubscriptionRepo::upsert(&pool, &device(endpoint, Some(9), false))
        .await
        .unwrap();

    assert!(PushSubscriptionRepo::delete_by_endpoint(&pool, endpoint).await.unwrap());
    assert!(!PushSubscriptionRepo::delete_by_endpoint(&pool, endpoint).await.unwrap());
    assert!(PushSubscriptionRepo::find_by_endpoint(&pool, endpoint)
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn prune_failing_removes_only_past_ceiling(pool: PgPool) {
    PushSubscriptionRepo::upsert(&pool, &device("https://push.example/at", Some(1), false))
        .await
        .unwrap();
    PushSubscriptionRepo::upsert(&pool, &device("https://push.example/over", Some(2), false))
        .await
        .unwrap();
    set_error_count(&pool, "https://push.example/at", 5).await;
    set_error_count(&pool, "https://push.example/over", 6).await;

    let pruned = PushSubscriptionRepo::prune_failing(&pool, 5).await.unwrap();

    assert_eq!(pruned, 1);
    assert!(PushSubscriptionRepo::find_by_endpoint(&pool, "https://push.example/at")
        .await
        .unwrap()
        .is_some());
}
