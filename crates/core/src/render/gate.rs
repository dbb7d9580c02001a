//! Concurrency gate in front of the renderer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::RenderError;

/// Counting semaphore bounding simultaneous renderer invocations.
///
/// Callers wait up to the acquire timeout for a slot and then fail with
/// [`RenderError::RendererBusy`]. The permit frees the slot on drop.
#[derive(Clone)]
pub struct RenderGate {
    semaphore: Arc<Semaphore>,
    max: usize,
    acquire_timeout: Duration,
}

impl RenderGate {
    pub fn new(max: usize, acquire_timeout: Duration) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            acquire_timeout,
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, RenderError> {
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        match tokio::time::timeout(self.acquire_timeout, acquire).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_closed)) => Err(RenderError::Unavailable("render gate closed".into())),
            Err(_elapsed) => {
                tracing::warn!(
                    max = self.max,
                    waited_ms = self.acquire_timeout.as_millis() as u64,
                    "Render gate saturated"
                );
                Err(RenderError::RendererBusy {
                    waited: self.acquire_timeout,
                })
            }
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn second_caller_fails_busy_after_timeout() {
        let gate = RenderGate::new(1, Duration::from_millis(100));
        let _held = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);
        assert_matches!(
            gate.acquire().await,
            Err(RenderError::RendererBusy { waited }) if waited == Duration::from_millis(100)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_caller_waits_for_release() {
        let gate = RenderGate::new(1, Duration::from_millis(100));
        let held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn zero_max_is_clamped() {
        assert_eq!(RenderGate::new(0, Duration::from_secs(1)).max(), 1);
    }
}
