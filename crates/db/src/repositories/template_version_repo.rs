//! Repository for the `template_versions` table.

use docforge_core::types::{DbId, Timestamp};
use docforge_core::version::TemplateVersion;
use sqlx::{PgConnection, PgPool};

use crate::models::template_version::TemplateVersionRow;

const COLUMNS: &str = "\
    id, template_id, version_number, name, status, content, \
    scheduled_publish_at, scheduled_archive_at, published_at, archived_at, \
    published_by, archived_by, created_at, updated_at";

pub struct TemplateVersionRepo;

impl TemplateVersionRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<TemplateVersionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM template_versions WHERE id = $1");
        sqlx::query_as::<_, TemplateVersionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_template(
        pool: &PgPool,
        template_id: DbId,
    ) -> Result<Vec<TemplateVersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM template_versions \
             WHERE template_id = $1 \
             ORDER BY version_number"
        );
        sqlx::query_as::<_, TemplateVersionRow>(&query)
            .bind(template_id)
            .fetch_all(pool)
            .await
    }

    /// Insert a DRAFT numbered one past the template's highest version.
    pub async fn create_draft(
        pool: &PgPool,
        template_id: DbId,
        name: &str,
        content: &serde_json::Value,
        now: Timestamp,
    ) -> Result<TemplateVersionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO template_versions \
                (template_id, version_number, name, status, content, created_at, updated_at) \
             SELECT $1, COALESCE(MAX(version_number), 0) + 1, $2, 'DRAFT', $3, $4, $4 \
             FROM template_versions WHERE template_id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TemplateVersionRow>(&query)
            .bind(template_id)
            .bind(name)
            .bind(content)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Write every mutable column of `version`. Returns `true` if the row
    /// exists.
    pub async fn update(conn: &mut PgConnection, version: &TemplateVersion) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE template_versions SET \
                 name = $2, status = $3, content = $4, \
                 scheduled_publish_at = $5, scheduled_archive_at = $6, \
                 published_at = $7, archived_at = $8, \
                 published_by = $9, archived_by = $10, updated_at = $11 \
             WHERE id = $1",
        )
        .bind(version.id)
        .bind(&version.name)
        .bind(version.status.as_str())
        .bind(&version.content)
        .bind(version.scheduled_publish_at)
        .bind(version.scheduled_archive_at)
        .bind(version.published_at)
        .bind(version.archived_at)
        .bind(&version.published_by)
        .bind(&version.archived_by)
        .bind(version.updated_at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// SCHEDULED versions due for publishing and PUBLISHED versions due for
    /// archiving at `now`.
    pub async fn list_due(pool: &PgPool, now: Timestamp) -> Result<Vec<TemplateVersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM template_versions \
             WHERE (status = 'SCHEDULED' AND scheduled_publish_at <= $1) \
                OR (status = 'PUBLISHED' AND scheduled_archive_at <= $1) \
             ORDER BY COALESCE(scheduled_publish_at, scheduled_archive_at), id"
        );
        sqlx::query_as::<_, TemplateVersionRow>(&query)
            .bind(now)
            .fetch_all(pool)
            .await
    }
}
