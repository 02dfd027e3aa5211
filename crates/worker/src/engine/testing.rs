//! In-memory doubles for the transport and directory seams.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use campo_core::types::DbId;
use campo_db::models::notification_job::NotificationJob;
use campo_db::models::status::NotificationStatus;
use campo_push::{
    PushError, PushTransport, SendOptions, Subscription, SubscriptionDirectory, SubscriptionKeys, Urgency,
};
use chrono::Utc;
use serde_json::json;

type Responder = Box<dyn Fn() -> Result<(), PushError> + Send + Sync>;

pub fn subscription(endpoint: &str, owner_id: Option<DbId>, is_admin: bool) -> Subscription {
    Subscription {
        endpoint: endpoint.to_string(),
        keys: SubscriptionKeys {
            p256dh: "p256dh".to_string(),
            auth: "auth".to_string(),
        },
        owner_id,
        is_admin,
        error_count: 0,
    }
}

/// An in-flight job as returned by a claim.
pub fn job(kind: &str, target_ids: Vec<DbId>) -> NotificationJob {
    let now = Utc::now();
    NotificationJob {
        id: 1,
        kind: kind.to_string(),
        target_ids,
        payload: json!({"title": "Court booked", "body": "Court 3, Saturday 10:00"}),
        status_id: NotificationStatus::InFlight.id(),
        priority: 0,
        attempts: 0,
        max_attempts: 3,
        send_after: now,
        last_error: None,
        sent_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Transport that succeeds unless told otherwise per endpoint.
#[derive(Default)]
pub struct FakeTransport {
    responders: Mutex<HashMap<String, Responder>>,
    delays: Mutex<HashMap<String, Duration>>,
    sent: Mutex<Vec<(String, SendOptions)>>,
}

impl FakeTransport {
    pub fn respond<F>(&self, endpoint: &str, responder: F)
    where
        F: Fn() -> Result<(), PushError> + Send + Sync + 'static,
    {
        self.responders
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Box::new(responder));
    }

    pub fn delay(&self, endpoint: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(endpoint.to_string(), delay);
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, o)| o.topic.clone()).collect()
    }

    pub fn urgencies(&self) -> Vec<Urgency> {
        self.sent.lock().unwrap().iter().map(|(_, o)| o.urgency).collect()
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn send(&self, subscription: &Subscription, _payload: &[u8], options: &SendOptions) -> Result<(), PushError> {
        let delay = self.delays.lock().unwrap().get(&subscription.endpoint).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), options.clone()));
        match self.responders.lock().unwrap().get(&subscription.endpoint) {
            Some(responder) => responder(),
            None => Ok(()),
        }
    }
}

/// Directory held in memory, counting the outcomes it is told about.
#[derive(Default)]
pub struct MemoryDirectory {
    subscriptions: Mutex<Vec<Subscription>>,
    successes: Mutex<usize>,
    failures: Mutex<usize>,
}

impl MemoryDirectory {
    pub fn with(subscriptions: Vec<Subscription>) -> Self {
        Self {
            subscriptions: Mutex::new(subscriptions),
            ..Default::default()
        }
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.endpoint.clone())
            .collect()
    }

    pub fn successes(&self) -> usize {
        *self.successes.lock().unwrap()
    }

    pub fn failures(&self) -> usize {
        *self.failures.lock().unwrap()
    }
}

#[async_trait]
impl SubscriptionDirectory for MemoryDirectory {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, sqlx::Error> {
        Ok(self.subscriptions.lock().unwrap().clone())
    }

    async fn remove_subscription(&self, endpoint: &str) -> Result<bool, sqlx::Error> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.endpoint != endpoint);
        Ok(subscriptions.len() < before)
    }

    async fn record_delivery_outcome(&self, _endpoint: &str, success: bool) -> Result<(), sqlx::Error> {
        if success {
            *self.successes.lock().unwrap() += 1;
        } else {
            *self.failures.lock().unwrap() += 1;
        }
        Ok(())
    }
}
