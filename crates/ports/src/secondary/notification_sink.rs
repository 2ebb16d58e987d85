use std::future::Future;
use std::pin::Pin;

use domain::report::error::NotifyError;

/// Secondary port for delivering a report digest to operators.
///
/// Delivery is best-effort: the audit workflow logs a failed send and
/// carries on.
pub trait NotificationSink: Send + Sync {
    /// Short name used in logs and metrics labels.
    fn name(&self) -> &str;

    fn send<'a>(
        &'a self,
        summary: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;
}
