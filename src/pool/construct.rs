//! Bounded construction with retries
//!
//! One dispatch runs up to `max_attempts` attempts, `retry_delay` apart.
//! Only transient failures are retried. Each attempt initializes under the
//! locator's timeout, and a resource whose attempt is abandoned (failure,
//! timeout or cancellation) is disposed before the attempt returns.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::content::ContentId;

use super::config::PoolConfig;
use super::engine::{PlaybackEngine, PlaybackResource, ResourceError};

/// Result of one construction dispatch
pub(crate) enum Dispatch {
    Ready {
        resource: Box<dyn PlaybackResource>,
        attempts: u32,
    },
    Failed {
        error: ResourceError,
        attempts: u32,
    },
    Cancelled,
}

pub(crate) async fn dispatch(
    engine: &dyn PlaybackEngine,
    content_id: &ContentId,
    locator: &str,
    config: &PoolConfig,
    cancel: &CancellationToken,
) -> Dispatch {
    let timeout = config.timeout_for(locator);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match attempt_once(engine, content_id, locator, timeout, cancel).await {
            None => return Dispatch::Cancelled,
            Some(Ok(resource)) => {
                return Dispatch::Ready {
                    resource,
                    attempts: attempt,
                }
            }
            Some(Err(error)) => error,
        };

        if !error.is_transient() || attempt >= config.max_attempts {
            return Dispatch::Failed {
                error,
                attempts: attempt,
            };
        }

        tracing::debug!(
            content_id = %content_id,
            attempt,
            error = %error,
            delay_ms = config.retry_delay.as_millis() as u64,
            "Construction failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Dispatch::Cancelled,
            _ = tokio::time::sleep(config.retry_delay) => {}
        }
    }
}

async fn attempt_once(
    engine: &dyn PlaybackEngine,
    content_id: &ContentId,
    locator: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Option<Result<Box<dyn PlaybackResource>, ResourceError>> {
    let mut resource = match engine.create(content_id, locator) {
        Ok(resource) => resource,
        Err(err) => return Some(Err(err)),
    };

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = tokio::time::timeout(timeout, resource.initialize()) => Some(result),
    };

    match outcome {
        Some(Ok(Ok(()))) => Some(Ok(resource)),
        Some(Ok(Err(err))) => {
            resource.dispose().await;
            Some(Err(err))
        }
        Some(Err(_)) => {
            resource.dispose().await;
            Some(Err(ResourceError::transient(format!(
                "initialization timed out after {}s",
                timeout.as_secs()
            ))))
        }
        None => {
            resource.dispose().await;
            None
        }
    }
}
