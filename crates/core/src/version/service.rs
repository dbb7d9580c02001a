use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::content::validate_content;
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

use super::{TemplateVersion, VersionError, VersionStatus};

/// DTO for creating a draft version.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTemplateVersion {
    pub template_id: DbId,
    pub name: String,
    pub content: serde_json::Value,
}

/// Persistence for template versions.
#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn find(&self, id: DbId) -> Result<Option<TemplateVersion>, CoreError>;

    async fn list_for_template(&self, template_id: DbId) -> Result<Vec<TemplateVersion>, CoreError>;

    /// Insert a DRAFT with the next version number of its template.
    async fn insert(&self, input: &NewTemplateVersion, now: Timestamp) -> Result<TemplateVersion, CoreError>;

    /// Persist every given version in one unit of work.
    async fn save_all(&self, versions: &[TemplateVersion]) -> Result<(), CoreError>;

    /// SCHEDULED versions whose publish time has passed, and PUBLISHED
    /// versions whose archive time has passed.
    async fn list_due(&self, now: Timestamp) -> Result<Vec<TemplateVersion>, CoreError>;
}

/// Result of one scheduler sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DueTransitionReport {
    pub published: Vec<DbId>,
    pub archived: Vec<DbId>,
    pub failed: Vec<(DbId, String)>,
}

pub struct VersionService<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for VersionService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: VersionStore + ?Sized> VersionService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: DbId) -> Result<TemplateVersion, CoreError> {
        Ok(self
            .store
            .find(id)
            .await?
            .ok_or(VersionError::NotFound(id))?)
    }

    fn check_content(content: &serde_json::Value) -> Result<(), VersionError> {
        let violations = validate_content(content);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(VersionError::InvalidContent(violations))
        }
    }

    async fn save(&self, version: TemplateVersion) -> Result<TemplateVersion, CoreError> {
        self.store.save_all(std::slice::from_ref(&version)).await?;
        Ok(version)
    }

    pub async fn create_draft(
        &self,
        input: NewTemplateVersion,
        now: Timestamp,
    ) -> Result<TemplateVersion, CoreError> {
        Self::check_content(&input.content)?;
        let siblings = self.store.list_for_template(input.template_id).await?;
        if siblings.iter().any(|v| v.name == input.name) {
            return Err(VersionError::DuplicateName(input.name).into());
        }
        let version = self.store.insert(&input, now).await?;
        tracing::info!(
            version_id = version.id,
            template_id = version.template_id,
            version_number = version.version_number,
            "Draft version created"
        );
        Ok(version)
    }

    pub async fn update_content(
        &self,
        id: DbId,
        content: serde_json::Value,
        now: Timestamp,
    ) -> Result<TemplateVersion, CoreError> {
        let mut version = self.get(id).await?;
        version.ensure_editable()?;
        Self::check_content(&content)?;
        version.set_content(content, now)?;
        self.save(version).await
    }

    pub async fn schedule_publish(
        &self,
        id: DbId,
        at: Timestamp,
        now: Timestamp,
    ) -> Result<TemplateVersion, CoreError> {
        let mut version = self.get(id).await?;
        version.schedule_publish(at, now)?;
        tracing::info!(version_id = id, at = %at, "Publish scheduled");
        self.save(version).await
    }

    pub async fn schedule_archive(
        &self,
        id: DbId,
        at: Timestamp,
        now: Timestamp,
    ) -> Result<TemplateVersion, CoreError> {
        let mut version = self.get(id).await?;
        version.schedule_archive(at, now)?;
        tracing::info!(version_id = id, at = %at, "Archive scheduled");
        self.save(version).await
    }

    pub async fn cancel_schedule(&self, id: DbId, now: Timestamp) -> Result<TemplateVersion, CoreError> {
        let mut version = self.get(id).await?;
        version.cancel_schedule(now);
        self.save(version).await
    }

    /// Publish a version, archiving the template's currently published
    /// version in the same unit of work.
    pub async fn publish(&self, id: DbId, actor: &str, now: Timestamp) -> Result<TemplateVersion, CoreError> {
        let mut version = self.get(id).await?;
        version.publish(actor, now)?;

        let mut changed: Vec<TemplateVersion> = Vec::with_capacity(2);
        for mut sibling in self.store.list_for_template(version.template_id).await? {
            if sibling.id != id && sibling.status == VersionStatus::Published {
                sibling.archive(actor, now)?;
                tracing::info!(version_id = sibling.id, "Previously published version archived");
                changed.push(sibling);
            }
        }
        changed.push(version.clone());
        self.store.save_all(&changed).await?;

        tracing::info!(version_id = id, template_id = version.template_id, actor, "Version published");
        Ok(version)
    }

    pub async fn archive(&self, id: DbId, actor: &str, now: Timestamp) -> Result<TemplateVersion, CoreError> {
        let mut version = self.get(id).await?;
        version.archive(actor, now)?;
        tracing::info!(version_id = id, actor, "Version archived");
        self.save(version).await
    }

    /// Apply every scheduled publish and archive that is due at `now`.
    /// One failing version does not stop the others.
    pub async fn run_due_transitions(
        &self,
        now: Timestamp,
        actor: &str,
    ) -> Result<DueTransitionReport, CoreError> {
        let mut report = DueTransitionReport::default();
        for version in self.store.list_due(now).await? {
            let outcome = if version.is_publish_due(now) {
                self.publish(version.id, actor, now)
                    .await
                    .map(|v| report.published.push(v.id))
            } else if version.is_archive_due(now) {
                self.archive(version.id, actor, now)
                    .await
                    .map(|v| report.archived.push(v.id))
            } else {
                Ok(())
            };
            if let Err(e) = outcome {
                tracing::error!(version_id = version.id, error = %e, "Scheduled transition failed");
                report.failed.push((version.id, e.to_string()));
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::*;
    use crate::version::InMemoryVersionStore;

    fn service() -> VersionService<InMemoryVersionStore> {
        VersionService::new(Arc::new(InMemoryVersionStore::new()))
    }

    fn input(name: &str) -> NewTemplateVersion {
        NewTemplateVersion {
            template_id: 7,
            name: name.into(),
            content: json!({ "type": "doc", "content": [] }),
        }
    }

    #[tokio::test]
    async fn drafts_get_increasing_numbers_and_unique_names() {
        let svc = service();
        let now = Utc::now();
        let v1 = svc.create_draft(input("first"), now).await.unwrap();
        let v2 = svc.create_draft(input("second"), now).await.unwrap();
        assert_eq!((v1.version_number, v2.version_number), (1, 2));
        assert_eq!(v1.status, VersionStatus::Draft);
        assert_matches!(
            svc.create_draft(input("first"), now).await,
            Err(CoreError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn invalid_content_is_rejected_with_violations() {
        let svc = service();
        let mut bad = input("bad");
        bad.content = json!({ "type": "doc", "content": [{ "type": "injectable" }] });
        assert_matches!(
            svc.create_draft(bad, Utc::now()).await,
            Err(CoreError::InvalidContent(v)) if v.len() == 1
        );
    }

    #[tokio::test]
    async fn publish_archives_previous_version() {
        let svc = service();
        let now = Utc::now();
        let v1 = svc.create_draft(input("first"), now).await.unwrap();
        let v2 = svc.create_draft(input("second"), now).await.unwrap();
        svc.publish(v1.id, "ana", now).await.unwrap();
        svc.publish(v2.id, "ana", now).await.unwrap();

        assert_eq!(svc.get(v1.id).await.unwrap().status, VersionStatus::Archived);
        assert_eq!(svc.get(v2.id).await.unwrap().status, VersionStatus::Published);
    }

    #[tokio::test]
    async fn published_content_is_frozen() {
        let svc = service();
        let now = Utc::now();
        let v = svc.create_draft(input("first"), now).await.unwrap();
        svc.publish(v.id, "ana", now).await.unwrap();
        assert_matches!(
            svc.update_content(v.id, json!({ "type": "doc", "content": [] }), now).await,
            Err(CoreError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn due_transitions_are_applied() {
        let svc = service();
        let now = Utc::now();
        let live = svc.create_draft(input("live"), now).await.unwrap();
        svc.publish(live.id, "ana", now).await.unwrap();
        svc.schedule_archive(live.id, now + Duration::minutes(5), now)
            .await
            .unwrap();
        let next = svc.create_draft(input("next"), now).await.unwrap();
        svc.schedule_publish(next.id, now + Duration::minutes(10), now)
            .await
            .unwrap();

        let report = svc
            .run_due_transitions(now + Duration::minutes(7), "scheduler")
            .await
            .unwrap();
        assert_eq!(report.archived, vec![live.id]);
        assert!(report.published.is_empty());

        let report = svc
            .run_due_transitions(now + Duration::minutes(11), "scheduler")
            .await
            .unwrap();
        assert_eq!(report.published, vec![next.id]);
        let next = svc.get(next.id).await.unwrap();
        assert_eq!(next.published_by.as_deref(), Some("scheduler"));
    }

    #[tokio::test]
    async fn unknown_version_is_not_found() {
        assert_matches!(
            service().get(404).await,
            Err(CoreError::NotFound { entity: "TemplateVersion", id: 404 })
        );
    }
}
