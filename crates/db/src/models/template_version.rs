//! Rows of `template_versions`.

use docforge_core::error::CoreError;
use docforge_core::types::{DbId, Timestamp};
use docforge_core::version::{TemplateVersion, VersionStatus};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `template_versions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TemplateVersionRow {
    pub id: DbId,
    pub template_id: DbId,
    pub version_number: i32,
    pub name: String,
    pub status: String,
    pub content: serde_json::Value,
    pub scheduled_publish_at: Option<Timestamp>,
    pub scheduled_archive_at: Option<Timestamp>,
    pub published_at: Option<Timestamp>,
    pub archived_at: Option<Timestamp>,
    pub published_by: Option<String>,
    pub archived_by: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<TemplateVersionRow> for TemplateVersion {
    type Error = CoreError;

    fn try_from(row: TemplateVersionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            template_id: row.template_id,
            version_number: row.version_number,
            name: row.name,
            status: VersionStatus::from_str(&row.status)?,
            content: row.content,
            scheduled_publish_at: row.scheduled_publish_at,
            scheduled_archive_at: row.scheduled_archive_at,
            published_at: row.published_at,
            archived_at: row.archived_at,
            published_by: row.published_by,
            archived_by: row.archived_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
