//! Webhook notification system.
//!
//! Sessions push every recorded [`WatchdogEvent`] through an mpsc channel.
//! The [`WebhookDispatcher`] reads from that channel and POSTs JSON payloads
//! to all configured webhook endpoints.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::watchdog::event::WatchdogEvent;

/// Configuration for a single webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// The URL to POST payloads to.
    pub url: String,

    /// Which event kinds to deliver (`reloaded`, `cache_stuck`, ...). Empty means all.
    #[serde(default)]
    pub events: Vec<String>,

    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_webhook_retries")]
    pub max_retries: u32,

    /// Optional HMAC-SHA256 signing secret for the `X-Reload-Signature-256` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

fn default_webhook_retries() -> u32 {
    2
}

impl WebhookConfig {
    pub fn accepts(&self, notification_type: &str) -> bool {
        if self.events.is_empty() {
            return true;
        }
        self.events.iter().any(|e| e == notification_type)
    }
}

/// An event recorded by a session, on its way to the webhooks.
#[derive(Debug, Clone)]
pub struct Notification {
    pub session_id: String,
    pub event: WatchdogEvent,
}

impl Notification {
    pub fn notification_type(&self) -> &'static str {
        self.event.kind.as_str()
    }
}

/// The JSON envelope POSTed to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub version: u8,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub session_id: String,
    pub data: serde_json::Value,
}

impl WebhookPayload {
    pub fn from_notification(notification: &Notification) -> Self {
        let event = &notification.event;
        Self {
            version: 1,
            id: Uuid::new_v4().to_string(),
            timestamp: event.timestamp,
            notification_type: notification.notification_type().to_string(),
            session_id: notification.session_id.clone(),
            data: serde_json::json!({
                "event_id": event.id,
                "kind": event.kind,
                "reason": event.reason,
                "details": event.details,
            }),
        }
    }
}

/// Asynchronous webhook dispatcher.
///
/// Spawned as a background tokio task, it reads from the notification channel
/// and POSTs payloads to all configured webhook endpoints.
pub struct WebhookDispatcher {
    rx: mpsc::UnboundedReceiver<Notification>,
    webhooks: Vec<WebhookConfig>,
    client: Client,
}

impl WebhookDispatcher {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Notification>,
        webhooks: Vec<WebhookConfig>,
        client: Client,
    ) -> Self {
        Self {
            rx,
            webhooks,
            client,
        }
    }

    /// Run the dispatcher loop. Returns when all senders are dropped.
    pub async fn run(mut self) {
        debug!(
            webhook_count = self.webhooks.len(),
            "Webhook dispatcher started"
        );

        while let Some(notification) = self.rx.recv().await {
            let payload = WebhookPayload::from_notification(&notification);
            let notification_type = notification.notification_type();

            for wh in &self.webhooks {
                if !wh.accepts(notification_type) {
                    continue;
                }

                let json_bytes = match serde_json::to_vec(&payload) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize webhook payload");
                        continue;
                    }
                };

                let timeout = Duration::from_millis(wh.timeout_ms);

                if let Err(e) = deliver(
                    &self.client,
                    &wh.url,
                    &json_bytes,
                    wh.secret.as_deref(),
                    timeout,
                    wh.max_retries,
                )
                .await
                {
                    warn!(
                        url = %wh.url,
                        notification_type,
                        error = %e,
                        "Webhook delivery failed"
                    );
                } else {
                    debug!(url = %wh.url, notification_type, "Webhook delivered");
                }
            }
        }

        debug!("Webhook dispatcher shutting down");
    }
}

pub fn notification_channel() -> (mpsc::UnboundedSender<Notification>, mpsc::UnboundedReceiver<Notification>) {
    mpsc::unbounded_channel()
}

pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
}

async fn deliver(
    client: &Client,
    url: &str,
    body: &[u8],
    secret: Option<&str>,
    timeout: Duration,
    max_retries: u32,
) -> Result<(), String> {
    let mut last_error = String::new();

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = Duration::from_millis(500 * 2u64.pow(attempt - 1));
            tokio::time::sleep(backoff).await;
        }

        let mut req = client
            .post(url)
            .header("Content-Type", "application/json")
            .header("User-Agent", concat!("mpv-reload/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .body(body.to_vec());

        if let Some(secret) = secret {
            let signature = sign_payload(body, secret);
            req = req.header("X-Reload-Signature-256", format!("sha256={}", signature));
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => {
                let status = resp.status();
                last_error = format!("HTTP {} from {}", status, url);
                if status.as_u16() >= 400 && status.as_u16() < 500 && status.as_u16() != 429 {
                    return Err(last_error);
                }
            }
            Err(e) => {
                last_error = format!("Request to {} failed: {}", url, e);
            }
        }
    }

    Err(last_error)
}

fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
