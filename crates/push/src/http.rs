//! HTTP push gateway transport.
//!
//! [`HttpPushTransport`] hands each message to a push gateway over HTTP.
//! The gateway owns VAPID signing and payload encryption, forwards the
//! message to the browser push service, and answers with that service's
//! status code, which is classified here.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::directory::{Subscription, SubscriptionKeys};
use crate::transport::{PushError, PushTransport, SendOptions, Urgency};

/// HTTP request timeout for a single gateway call.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body kept in an error message.
const MAX_BODY_SNIPPET: usize = 200;

// ---------------------------------------------------------------------------
// GatewayConfig
// ---------------------------------------------------------------------------

/// Where and how to reach the push gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Full URL of the gateway's send endpoint.
    pub url: String,
    /// Optional bearer token sent as `Authorization`.
    pub token: Option<String>,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GatewayTarget<'a> {
    endpoint: &'a str,
    keys: &'a SubscriptionKeys,
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    subscription: GatewayTarget<'a>,
    payload: std::borrow::Cow<'a, str>,
    ttl: u64,
    urgency: Urgency,
    topic: &'a str,
}

// ---------------------------------------------------------------------------
// HttpPushTransport
// ---------------------------------------------------------------------------

/// Delivers push messages through an HTTP push gateway.
pub struct HttpPushTransport {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl HttpPushTransport {
    /// Create a transport with a pre-configured HTTP client.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn send(
        &self,
        subscription: &Subscription,
        payload: &[u8],
        options: &SendOptions,
    ) -> Result<(), PushError> {
        let body = GatewayRequest {
            subscription: GatewayTarget {
                endpoint: &subscription.endpoint,
                keys: &subscription.keys,
            },
            payload: String::from_utf8_lossy(payload),
            ttl: options.ttl.as_secs(),
            urgency: options.urgency,
            topic: &options.topic,
        };

        let mut request = self.client.post(&self.config.url).json(&body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let snippet: String = text.chars().take(MAX_BODY_SNIPPET).collect();
        Err(PushError::from_status(status.as_u16(), snippet).unwrap_or_else(|| {
            PushError::Transient(format!("unexpected gateway status {status}"))
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
