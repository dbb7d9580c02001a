//! Core store traits backed by PostgreSQL.

use async_trait::async_trait;
use docforge_core::error::CoreError;
use docforge_core::scope::{
    AssignmentScope, NewAssignment, ScopeStore, SystemInjectable, SystemInjectableAssignment,
};
use docforge_core::types::{DbId, Timestamp};
use docforge_core::version::{NewTemplateVersion, TemplateVersion, VersionStore};

use crate::repositories::{AssignmentRepo, SystemInjectableRepo, TemplateVersionRepo};
use crate::{map_db_error, DbPool};

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, CoreError>
where
    T: TryFrom<R, Error = CoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgScopeStore {
    pool: DbPool,
}

impl PgScopeStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScopeStore for PgScopeStore {
    async fn list_injectables(&self) -> Result<Vec<SystemInjectable>, CoreError> {
        let rows = SystemInjectableRepo::list(&self.pool)
            .await
            .map_err(map_db_error)?;
        convert_all(rows)
    }

    async fn find_injectables(&self, keys: &[String]) -> Result<Vec<SystemInjectable>, CoreError> {
        let rows = SystemInjectableRepo::find_by_keys(&self.pool, keys)
            .await
            .map_err(map_db_error)?;
        convert_all(rows)
    }

    async fn insert_injectable_if_missing(
        &self,
        injectable: &SystemInjectable,
    ) -> Result<bool, CoreError> {
        SystemInjectableRepo::insert_if_missing(
            &self.pool,
            &injectable.key,
            injectable.data_type.as_str(),
            injectable.is_active,
        )
        .await
        .map_err(map_db_error)
    }

    async fn set_injectable_active(&self, key: &str, is_active: bool) -> Result<bool, CoreError> {
        SystemInjectableRepo::set_active(&self.pool, key, is_active)
            .await
            .map_err(map_db_error)
    }

    async fn assignments_for_keys(
        &self,
        keys: &[String],
    ) -> Result<Vec<SystemInjectableAssignment>, CoreError> {
        let rows = AssignmentRepo::list_for_keys(&self.pool, keys)
            .await
            .map_err(map_db_error)?;
        convert_all(rows)
    }

    async fn find_assignment(
        &self,
        key: &str,
        scope: &AssignmentScope,
    ) -> Result<Option<SystemInjectableAssignment>, CoreError> {
        AssignmentRepo::find_by_scope(
            &self.pool,
            key,
            scope.scope_type().as_str(),
            scope.tenant_id(),
            scope.workspace_id(),
        )
        .await
        .map_err(map_db_error)?
        .map(SystemInjectableAssignment::try_from)
        .transpose()
    }

    async fn insert_assignment(
        &self,
        input: &NewAssignment,
    ) -> Result<SystemInjectableAssignment, CoreError> {
        let row = AssignmentRepo::create(
            &self.pool,
            &input.injectable_key,
            input.scope.scope_type().as_str(),
            input.scope.tenant_id(),
            input.scope.workspace_id(),
            input.is_active,
        )
        .await
        .map_err(map_db_error)?;
        SystemInjectableAssignment::try_from(row)
    }

    async fn set_assignment_active(&self, id: DbId, is_active: bool) -> Result<bool, CoreError> {
        AssignmentRepo::set_active(&self.pool, id, is_active)
            .await
            .map_err(map_db_error)
    }

    async fn delete_assignment(&self, id: DbId) -> Result<bool, CoreError> {
        AssignmentRepo::delete(&self.pool, id)
            .await
            .map_err(map_db_error)
    }
}

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgVersionStore {
    pool: DbPool,
}

impl PgVersionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionStore for PgVersionStore {
    async fn find(&self, id: DbId) -> Result<Option<TemplateVersion>, CoreError> {
        TemplateVersionRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_db_error)?
            .map(TemplateVersion::try_from)
            .transpose()
    }

    async fn list_for_template(&self, template_id: DbId) -> Result<Vec<TemplateVersion>, CoreError> {
        let rows = TemplateVersionRepo::list_for_template(&self.pool, template_id)
            .await
            .map_err(map_db_error)?;
        convert_all(rows)
    }

    async fn insert(&self, input: &NewTemplateVersion, now: Timestamp) -> Result<TemplateVersion, CoreError> {
        let row = TemplateVersionRepo::create_draft(
            &self.pool,
            input.template_id,
            &input.name,
            &input.content,
            now,
        )
        .await
        .map_err(map_db_error)?;
        TemplateVersion::try_from(row)
    }

    /// Updates run in order inside one transaction, so archiving the old
    /// published version precedes publishing the new one.
    async fn save_all(&self, versions: &[TemplateVersion]) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        for version in versions {
            let found = TemplateVersionRepo::update(&mut *tx, version)
                .await
                .map_err(map_db_error)?;
            if !found {
                return Err(CoreError::NotFound {
                    entity: "TemplateVersion",
                    id: version.id,
                });
            }
        }
        tx.commit().await.map_err(map_db_error)?;
        Ok(())
    }

    async fn list_due(&self, now: Timestamp) -> Result<Vec<TemplateVersion>, CoreError> {
        let rows = TemplateVersionRepo::list_due(&self.pool, now)
            .await
            .map_err(map_db_error)?;
        convert_all(rows)
    }
}
