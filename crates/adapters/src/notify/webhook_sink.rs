use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use domain::report::error::NotifyError;
use ports::secondary::notification_sink::NotificationSink;
use serde::Serialize;

/// Payload posted to the webhook. `text` keeps it compatible with
/// Slack-style incoming webhooks.
#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Notification sink that POSTs the report digest as JSON.
///
/// Retries belong to the calling activity; a single send makes one
/// request.
pub struct WebhookNotificationSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotificationSink {
    pub fn new(url: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Rejected(format!("webhook client: {e}")))?;
        Ok(Self { client, url })
    }
}

impl NotificationSink for WebhookNotificationSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn send<'a>(
        &'a self,
        summary: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&WebhookPayload { text: summary })
                .send()
                .await
                .map_err(|e| NotifyError::Unreachable(format!("webhook POST failed: {e}")))?;

            let status = response.status();
            if status.is_success() {
                tracing::debug!(sink = "webhook", status = status.as_u16(), "report summary delivered");
                Ok(())
            } else if status.is_server_error() || status.as_u16() == 429 {
                Err(NotifyError::Unreachable(format!("webhook returned HTTP {status}")))
            } else {
                Err(NotifyError::Rejected(format!("webhook returned HTTP {status}")))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        // Port 1 on loopback refuses connections.
        let sink =
            WebhookNotificationSink::new("http://127.0.0.1:1/hook".to_string(), Duration::from_secs(1))
                .unwrap();
        let err = sink.send("summary").await.unwrap_err();
        assert!(matches!(err, NotifyError::Unreachable(_)));
    }

    #[test]
    fn payload_serializes_text_field() {
        let json = serde_json::to_value(WebhookPayload { text: "hi" }).unwrap();
        assert_eq!(json, serde_json::json!({"text": "hi"}));
    }
}
