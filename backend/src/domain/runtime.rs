//! Runtime helpers shared by the background components.

use std::time::Duration;

use async_trait::async_trait;

/// Async clock-independent sleeping abstraction for grace periods and
/// inter-vehicle pacing.
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use rental_core::domain::Sleeper;
/// use std::sync::Mutex;
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct CountingSleeper {
///     calls: Mutex<u32>,
/// }
///
/// #[async_trait]
/// impl Sleeper for CountingSleeper {
///     async fn sleep(&self, _duration: Duration) {
///         *self.calls.lock().expect("calls mutex") += 1;
///     }
/// }
/// ```
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `future` under `limit`, mapping an elapsed deadline with `on_timeout`.
pub(crate) async fn with_deadline<T, E, F>(
    limit: Duration,
    future: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_maps_elapsed_future() {
        let result: Result<(), String> = with_deadline(
            Duration::from_secs(1),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            |limit| format!("timed out after {}s", limit.as_secs()),
        )
        .await;
        assert_eq!(result, Err("timed out after 1s".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_passes_through_results() {
        let result: Result<u8, String> =
            with_deadline(Duration::from_secs(1), async { Ok(7) }, |_| String::new()).await;
        assert_eq!(result, Ok(7));
    }
}
