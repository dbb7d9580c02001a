//! In-memory [`VersionStore`].

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

use super::service::{NewTemplateVersion, VersionStore};
use super::{TemplateVersion, VersionStatus};

#[derive(Default)]
struct Rows {
    versions: Vec<TemplateVersion>,
    next_id: DbId,
}

#[derive(Default)]
pub struct InMemoryVersionStore {
    rows: Mutex<Rows>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn find(&self, id: DbId) -> Result<Option<TemplateVersion>, CoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.versions.iter().find(|v| v.id == id).cloned())
    }

    async fn list_for_template(&self, template_id: DbId) -> Result<Vec<TemplateVersion>, CoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .versions
            .iter()
            .filter(|v| v.template_id == template_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, input: &NewTemplateVersion, now: Timestamp) -> Result<TemplateVersion, CoreError> {
        let mut rows = self.rows.lock().await;
        rows.next_id += 1;
        let version_number = rows
            .versions
            .iter()
            .filter(|v| v.template_id == input.template_id)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;
        let version = TemplateVersion {
            id: rows.next_id,
            template_id: input.template_id,
            version_number,
            name: input.name.clone(),
            status: VersionStatus::Draft,
            content: input.content.clone(),
            scheduled_publish_at: None,
            scheduled_archive_at: None,
            published_at: None,
            archived_at: None,
            published_by: None,
            archived_by: None,
            created_at: now,
            updated_at: now,
        };
        rows.versions.push(version.clone());
        Ok(version)
    }

    async fn save_all(&self, versions: &[TemplateVersion]) -> Result<(), CoreError> {
        let mut rows = self.rows.lock().await;
        if let Some(missing) = versions
            .iter()
            .find(|v| !rows.versions.iter().any(|r| r.id == v.id))
        {
            return Err(CoreError::NotFound {
                entity: "TemplateVersion",
                id: missing.id,
            });
        }
        for version in versions {
            if let Some(row) = rows.versions.iter_mut().find(|r| r.id == version.id) {
                *row = version.clone();
            }
        }
        Ok(())
    }

    async fn list_due(&self, now: Timestamp) -> Result<Vec<TemplateVersion>, CoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .versions
            .iter()
            .filter(|v| v.is_publish_due(now) || v.is_archive_due(now))
            .cloned()
            .collect())
    }
}
