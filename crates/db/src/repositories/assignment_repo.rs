//! Repository for the `system_injectable_assignments` table.

use docforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::system_injectable::AssignmentRow;

const COLUMNS: &str = "\
    id, injectable_key, scope_type, tenant_id, workspace_id, is_active, created_at";

pub struct AssignmentRepo;

impl AssignmentRepo {
    pub async fn list_for_keys(pool: &PgPool, keys: &[String]) -> Result<Vec<AssignmentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM system_injectable_assignments \
             WHERE injectable_key = ANY($1) \
             ORDER BY injectable_key, id"
        );
        sqlx::query_as::<_, AssignmentRow>(&query)
            .bind(keys)
            .fetch_all(pool)
            .await
    }

    /// Find the assignment of `key` for exactly this scope.
    pub async fn find_by_scope(
        pool: &PgPool,
        key: &str,
        scope_type: &str,
        tenant_id: Option<DbId>,
        workspace_id: Option<DbId>,
    ) -> Result<Option<AssignmentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM system_injectable_assignments \
             WHERE injectable_key = $1 AND scope_type = $2 \
               AND tenant_id IS NOT DISTINCT FROM $3 \
               AND workspace_id IS NOT DISTINCT FROM $4"
        );
        sqlx::query_as::<_, AssignmentRow>(&query)
            .bind(key)
            .bind(scope_type)
            .bind(tenant_id)
            .bind(workspace_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(
        pool: &PgPool,
        key: &str,
        scope_type: &str,
        tenant_id: Option<DbId>,
        workspace_id: Option<DbId>,
        is_active: bool,
    ) -> Result<AssignmentRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO system_injectable_assignments \
                (injectable_key, scope_type, tenant_id, workspace_id, is_active) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AssignmentRow>(&query)
            .bind(key)
            .bind(scope_type)
            .bind(tenant_id)
            .bind(workspace_id)
            .bind(is_active)
            .fetch_one(pool)
            .await
    }

    /// Returns `true` if the assignment exists.
    pub async fn set_active(pool: &PgPool, id: DbId, is_active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE system_injectable_assignments SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM system_injectable_assignments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
