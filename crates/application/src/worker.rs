use std::future::Future;
use std::sync::Arc;

use domain::workflow::error::ActivityError;
use ports::secondary::metrics_port::MetricsPort;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::retry::{ActivityOptions, retry_with_backoff};

/// Aborts the spawned attempt when the caller stops waiting for it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Bounded pool that executes activity attempts.
///
/// Each attempt holds one permit while it runs, so at most
/// `max_concurrent` activities touch the stores at once. An attempt runs
/// on its own task: a timed-out or cancelled attempt is aborted, and a
/// panicking one surfaces as `ActivityError::Internal`.
#[derive(Clone)]
pub struct ActivityWorker {
    permits: Arc<Semaphore>,
    metrics: Arc<dyn MetricsPort>,
}

impl ActivityWorker {
    pub fn new(max_concurrent: usize, metrics: Arc<dyn MetricsPort>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            metrics,
        }
    }

    /// Run `f` under `options`: one timeout per attempt, retries per the
    /// policy. `f` is called once per attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        activity: &str,
        options: &ActivityOptions,
        f: F,
    ) -> Result<T, ActivityError>
    where
        T: Send + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ActivityError>> + Send + 'static,
    {
        let timeout = options.start_to_close_timeout;
        retry_with_backoff(activity, &options.retry_policy, self.metrics.as_ref(), || {
            let permits = Arc::clone(&self.permits);
            let attempt = f();
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| ActivityError::Cancelled)?;
                let mut task = AbortOnDrop(tokio::spawn(attempt));
                match tokio::time::timeout(timeout, &mut task.0).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) if e.is_panic() => {
                        Err(ActivityError::Internal("activity panicked".to_string()))
                    }
                    Ok(Err(_)) => Err(ActivityError::Cancelled),
                    Err(_) => Err(ActivityError::Timeout(
                        u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    )),
                }
            }
        })
        .await
    }

    /// Permits not currently held by a running attempt.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}
