//! Periodic removal of stale files from the image cache directory.

use std::sync::Arc;
use std::time::Duration;

use docforge_core::render::ImageCache;
use tokio_util::sync::CancellationToken;

/// Run the image cache cleanup loop until `cancel` is triggered.
pub async fn run(cache: Arc<ImageCache>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        dir = %cache.dir().display(),
        interval_secs = interval.as_secs(),
        "Image cache cleanup started"
    );

    let mut interval = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Image cache cleanup stopping");
                break;
            }
            _ = interval.tick() => {
                match cache.cleanup().await {
                    Ok(report) if report.removed > 0 => {
                        tracing::info!(
                            removed = report.removed,
                            kept = report.kept,
                            "Image cache cleanup: removed stale files"
                        );
                    }
                    Ok(report) => {
                        tracing::debug!(kept = report.kept, "Image cache cleanup: nothing to remove");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Image cache cleanup failed");
                    }
                }
            }
        }
    }
}
