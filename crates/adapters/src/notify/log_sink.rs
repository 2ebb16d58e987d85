use std::future::Future;
use std::pin::Pin;

use domain::report::error::NotifyError;
use ports::secondary::notification_sink::NotificationSink;

/// Notification sink that writes the report digest to the log.
///
/// Used when no webhook is configured.
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn name(&self) -> &str {
        "log"
    }

    fn send<'a>(
        &'a self,
        summary: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(sink = "log", summary = %summary, "audit report summary");
            Ok(())
        })
    }
}
