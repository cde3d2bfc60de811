//! Outbound alert delivery.

use crate::alert::{AlertLevel, AuthHealthAlert, HealthMetric};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;

/// Request timeout for webhook posts.
const WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum AlertDeliveryError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Webhook answered with a non-success status
    #[error("Webhook rejected alert: HTTP {0}")]
    Rejected(u16),
}

/// Receives alerts after in-process subscribers have run.
///
/// Implementations must not block and must swallow their own failures.
pub trait AlertNotifier: Send + Sync {
    fn notify(&self, alert: &AuthHealthAlert);
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: String,
    level: AlertLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    metric: Option<HealthMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    timestamp: &'a DateTime<Utc>,
}

impl<'a> WebhookPayload<'a> {
    fn from_alert(alert: &'a AuthHealthAlert) -> Self {
        Self {
            text: format!("[auth-health:{}] {}", alert.level, alert.message),
            level: alert.level,
            metric: alert.metric,
            value: alert.value,
            timestamp: &alert.timestamp,
        }
    }
}

/// Posts critical alerts as JSON to a webhook on a background tokio task.
///
/// Fire-and-forget: delivery failures are logged, never surfaced.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url) -> Result<Self, AlertDeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Deliver one alert and wait for the response.
    pub async fn send(&self, alert: &AuthHealthAlert) -> Result<(), AlertDeliveryError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&WebhookPayload::from_alert(alert))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertDeliveryError::Rejected(status.as_u16()));
        }
        debug!(url = %self.url, level = %alert.level, "Alert delivered to webhook");
        Ok(())
    }
}

impl AlertNotifier for WebhookNotifier {
    fn notify(&self, alert: &AuthHealthAlert) {
        if alert.level != AlertLevel::Critical {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            debug!(url = %self.url, "No async runtime, dropping webhook alert");
            return;
        };

        let notifier = self.clone();
        let alert = alert.clone();
        handle.spawn(async move {
            if let Err(err) = notifier.send(&alert).await {
                warn!(url = %notifier.url, error = %err, "Failed to deliver alert webhook");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn critical_alert() -> AuthHealthAlert {
        AuthHealthAlert::new(AlertLevel::Critical, "3 storage errors", Utc::now())
            .with_metric(HealthMetric::StorageErrors, 3.0)
    }

    /// Accept one HTTP request, answer 200 and hand back the request body.
    async fn capture_one_request(listener: TcpListener, body_tx: oneshot::Sender<String>) {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let Ok(read) = socket.read(&mut buf).await else {
                return;
            };
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..read]);
            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let content_length = text[..split]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                let body = &text[split + 4..];
                if body.len() >= content_length {
                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                        .await;
                    let _ = body_tx.send(body.to_string());
                    return;
                }
            }
        }
    }

    #[test]
    fn test_payload_carries_text_and_metric() {
        let alert = critical_alert();
        let json = serde_json::to_value(WebhookPayload::from_alert(&alert)).unwrap();
        assert_eq!(json["level"], "critical");
        assert_eq!(json["metric"], "storage_errors");
        assert_eq!(json["value"], 3.0);
        assert!(json["text"].as_str().unwrap().contains("3 storage errors"));
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_notify_without_runtime_is_a_no_op() {
        let notifier = WebhookNotifier::new(Url::parse("http://127.0.0.1:9/hook").unwrap()).unwrap();
        notifier.notify(&critical_alert());
    }

    #[tokio::test]
    async fn test_send_posts_json_to_webhook() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (body_tx, body_rx) = oneshot::channel();
        tokio::spawn(capture_one_request(listener, body_tx));

        let url = Url::parse(&format!("http://{addr}/alerts")).unwrap();
        let notifier = WebhookNotifier::new(url).unwrap();
        notifier.send(&critical_alert()).await.unwrap();

        let body = body_rx.await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["level"], "critical");
    }

    #[tokio::test]
    async fn test_notify_spawns_delivery_for_critical_alerts_only() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (body_tx, body_rx) = oneshot::channel();
        tokio::spawn(capture_one_request(listener, body_tx));

        let url = Url::parse(&format!("http://{addr}/alerts")).unwrap();
        let notifier = WebhookNotifier::new(url).unwrap();
        notifier.notify(&AuthHealthAlert::new(AlertLevel::Warning, "slow polling", Utc::now()));
        notifier.notify(&critical_alert());

        let body = tokio::time::timeout(Duration::from_secs(5), body_rx)
            .await
            .unwrap()
            .unwrap();
        assert!(body.contains("storage errors"));
    }
}
