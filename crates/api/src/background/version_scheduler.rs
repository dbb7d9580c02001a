//! Applies scheduled publishes and archives once they fall due.

use std::time::Duration;

use chrono::Utc;
use docforge_core::version::{VersionService, VersionStore};
use tokio_util::sync::CancellationToken;

/// Actor recorded on versions the scheduler publishes or archives.
pub const SCHEDULER_ACTOR: &str = "scheduler";

/// Run the version scheduler loop until `cancel` is triggered.
pub async fn run<S>(versions: VersionService<S>, interval: Duration, cancel: CancellationToken)
where
    S: VersionStore + ?Sized,
{
    tracing::info!(interval_secs = interval.as_secs(), "Version scheduler started");

    let mut interval = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Version scheduler stopping");
                break;
            }
            _ = interval.tick() => {
                match versions.run_due_transitions(Utc::now(), SCHEDULER_ACTOR).await {
                    Ok(report) if report.published.is_empty() && report.archived.is_empty() => {
                        tracing::debug!(failed = report.failed.len(), "Version scheduler: nothing due");
                    }
                    Ok(report) => {
                        tracing::info!(
                            published = ?report.published,
                            archived = ?report.archived,
                            failed = report.failed.len(),
                            "Version scheduler: applied due transitions"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Version scheduler: sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;
    use docforge_core::version::{InMemoryVersionStore, NewTemplateVersion, VersionStatus};
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn due_versions_are_published() {
        let versions = VersionService::new(Arc::new(InMemoryVersionStore::new()));
        let now = Utc::now();
        let draft = versions
            .create_draft(
                NewTemplateVersion {
                    template_id: 1,
                    name: "spring".into(),
                    content: json!({ "type": "doc", "content": [] }),
                },
                now,
            )
            .await
            .unwrap();
        versions
            .schedule_publish(draft.id, now + ChronoDuration::milliseconds(20), now)
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            versions.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        let published = versions.get(draft.id).await.unwrap();
        assert_eq!(published.status, VersionStatus::Published);
        assert_eq!(published.published_by.as_deref(), Some(SCHEDULER_ACTOR));
    }
}
