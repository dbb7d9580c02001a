//! Administrative operations on system injectables and their assignments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{CoreError, ErrorKind};
use crate::injectable::InjectorRegistry;
use crate::resolution::ScopeFilter;
use crate::types::DbId;

use super::{
    effective_is_active, AssignmentScope, NewAssignment, ScopeStore, SystemInjectable,
    SystemInjectableAssignment,
};

/// Outcome of a bulk operation. Failures are collected per key; one
/// failing key never aborts the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkOperationResult {
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub key: String,
    pub kind: ErrorKind,
    pub error: String,
}

impl BulkOperationResult {
    fn record(&mut self, key: &str, outcome: Result<(), CoreError>) {
        match outcome {
            Ok(()) => self.succeeded.push(key.to_string()),
            Err(e) => {
                tracing::debug!(key, error = %e, "Bulk item failed");
                self.failed.push(BulkFailure {
                    key: key.to_string(),
                    kind: e.kind(),
                    error: e.to_string(),
                });
            }
        }
    }
}

pub struct ScopeService<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for ScopeService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ScopeStore + ?Sized> ScopeService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create a system injectable row, active by default, for every
    /// registered injector that has none yet. Returns how many were added.
    pub async fn sync_registry(&self, registry: &InjectorRegistry) -> Result<usize, CoreError> {
        let mut inserted = 0;
        for injector in registry.list() {
            let row = SystemInjectable {
                key: injector.code().to_string(),
                data_type: injector.data_type(),
                is_active: true,
            };
            if self.store.insert_injectable_if_missing(&row).await? {
                inserted += 1;
            }
        }
        tracing::info!(inserted, total = registry.len(), "System injectables synced");
        Ok(inserted)
    }

    async fn require_injectable(&self, key: &str) -> Result<SystemInjectable, CoreError> {
        self.store
            .find_injectables(&[key.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFoundByKey {
                entity: "SystemInjectable",
                key: key.to_string(),
            })
    }

    async fn require_assignment(
        &self,
        key: &str,
        scope: &AssignmentScope,
    ) -> Result<SystemInjectableAssignment, CoreError> {
        self.store
            .find_assignment(key, scope)
            .await?
            .ok_or_else(|| CoreError::NotFoundByKey {
                entity: "SystemInjectableAssignment",
                key: format!("{key}@{}", scope.scope_type()),
            })
    }

    /// Effective availability of one key for a request scope.
    pub async fn is_active(
        &self,
        key: &str,
        tenant_id: Option<DbId>,
        workspace_id: Option<DbId>,
    ) -> Result<bool, CoreError> {
        let injectable = self.require_injectable(key).await?;
        let assignments = self.store.assignments_for_keys(&[key.to_string()]).await?;
        Ok(effective_is_active(&injectable, &assignments, tenant_id, workspace_id))
    }

    /// Every system injectable key available to the request scope.
    pub async fn active_keys(
        &self,
        tenant_id: Option<DbId>,
        workspace_id: Option<DbId>,
    ) -> Result<Vec<String>, CoreError> {
        let injectables = self.store.list_injectables().await?;
        let keys: Vec<String> = injectables.iter().map(|i| i.key.clone()).collect();
        let assignments = self.store.assignments_for_keys(&keys).await?;
        Ok(injectables
            .into_iter()
            .filter(|i| effective_is_active(i, &assignments, tenant_id, workspace_id))
            .map(|i| i.key)
            .collect())
    }

    pub async fn create_assignment(
        &self,
        input: NewAssignment,
    ) -> Result<SystemInjectableAssignment, CoreError> {
        self.require_injectable(&input.injectable_key).await?;
        if self
            .store
            .find_assignment(&input.injectable_key, &input.scope)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict(format!(
                "'{}' already has a {} assignment for this scope",
                input.injectable_key,
                input.scope.scope_type()
            )));
        }
        let created = self.store.insert_assignment(&input).await?;
        tracing::info!(
            key = %created.injectable_key,
            scope = %created.scope.scope_type(),
            id = created.id,
            "Assignment created"
        );
        Ok(created)
    }

    pub async fn delete_assignment(&self, id: DbId) -> Result<(), CoreError> {
        if !self.store.delete_assignment(id).await? {
            return Err(CoreError::NotFound {
                entity: "SystemInjectableAssignment",
                id,
            });
        }
        tracing::info!(id, "Assignment deleted");
        Ok(())
    }

    /// Switch an existing assignment off, keeping the row.
    pub async fn exclude(&self, key: &str, scope: &AssignmentScope) -> Result<(), CoreError> {
        self.set_assignment_active(key, scope, false).await
    }

    /// Switch an existing assignment back on.
    pub async fn include(&self, key: &str, scope: &AssignmentScope) -> Result<(), CoreError> {
        self.set_assignment_active(key, scope, true).await
    }

    async fn set_assignment_active(
        &self,
        key: &str,
        scope: &AssignmentScope,
        is_active: bool,
    ) -> Result<(), CoreError> {
        let assignment = self.require_assignment(key, scope).await?;
        self.store
            .set_assignment_active(assignment.id, is_active)
            .await?;
        tracing::info!(key, scope = %scope.scope_type(), is_active, "Assignment toggled");
        Ok(())
    }

    /// Set the global flag of an injectable.
    pub async fn activate(&self, key: &str) -> Result<(), CoreError> {
        self.set_global(key, true).await
    }

    pub async fn deactivate(&self, key: &str) -> Result<(), CoreError> {
        self.set_global(key, false).await
    }

    async fn set_global(&self, key: &str, is_active: bool) -> Result<(), CoreError> {
        if !self.store.set_injectable_active(key, is_active).await? {
            return Err(CoreError::NotFoundByKey {
                entity: "SystemInjectable",
                key: key.to_string(),
            });
        }
        tracing::info!(key, is_active, "System injectable flag changed");
        Ok(())
    }

    // -- bulk ---------------------------------------------------------------

    pub async fn bulk_create_assignments(
        &self,
        keys: &[String],
        scope: AssignmentScope,
        is_active: bool,
    ) -> BulkOperationResult {
        let mut result = BulkOperationResult::default();
        for key in keys {
            let outcome = self
                .create_assignment(NewAssignment {
                    injectable_key: key.clone(),
                    scope,
                    is_active,
                })
                .await
                .map(|_| ());
            result.record(key, outcome);
        }
        result
    }

    /// Delete the assignment of each key for `scope`.
    pub async fn bulk_delete_assignments(
        &self,
        keys: &[String],
        scope: AssignmentScope,
    ) -> BulkOperationResult {
        let mut result = BulkOperationResult::default();
        for key in keys {
            let outcome = match self.require_assignment(key, &scope).await {
                Ok(a) => self.delete_assignment(a.id).await,
                Err(e) => Err(e),
            };
            result.record(key, outcome);
        }
        result
    }

    pub async fn bulk_activate(&self, keys: &[String]) -> BulkOperationResult {
        let mut result = BulkOperationResult::default();
        for key in keys {
            result.record(key, self.activate(key).await);
        }
        result
    }

    pub async fn bulk_deactivate(&self, keys: &[String]) -> BulkOperationResult {
        let mut result = BulkOperationResult::default();
        for key in keys {
            result.record(key, self.deactivate(key).await);
        }
        result
    }
}

#[async_trait]
impl<S: ScopeStore + ?Sized + 'static> ScopeFilter for ScopeService<S> {
    async fn inactive_codes(
        &self,
        codes: &[String],
        tenant_id: Option<DbId>,
        workspace_id: Option<DbId>,
    ) -> Result<Vec<String>, CoreError> {
        let injectables: HashMap<String, SystemInjectable> = self
            .store
            .find_injectables(codes)
            .await?
            .into_iter()
            .map(|i| (i.key.clone(), i))
            .collect();
        if injectables.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = injectables.keys().cloned().collect();
        let assignments = self.store.assignments_for_keys(&keys).await?;

        Ok(codes
            .iter()
            .filter(|code| {
                injectables
                    .get(*code)
                    .is_some_and(|i| !effective_is_active(i, &assignments, tenant_id, workspace_id))
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::injectable::{DataType, RegistryBuilder};
    use crate::scope::InMemoryScopeStore;

    async fn service() -> ScopeService<InMemoryScopeStore> {
        let store = InMemoryScopeStore::new();
        for key in ["client_name", "due_date", "secret"] {
            store
                .insert_injectable_if_missing(&SystemInjectable {
                    key: key.into(),
                    data_type: DataType::Text,
                    is_active: true,
                })
                .await
                .unwrap();
        }
        ScopeService::new(Arc::new(store))
    }

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    const WS: AssignmentScope = AssignmentScope::Workspace {
        tenant_id: 1,
        workspace_id: 10,
    };

    #[tokio::test]
    async fn create_requires_existing_injectable_and_free_scope() {
        let svc = service().await;
        let input = NewAssignment {
            injectable_key: "client_name".into(),
            scope: WS,
            is_active: false,
        };
        svc.create_assignment(input.clone()).await.unwrap();
        assert_matches!(svc.create_assignment(input).await, Err(CoreError::Conflict(_)));
        assert_matches!(
            svc.create_assignment(NewAssignment {
                injectable_key: "nope".into(),
                scope: AssignmentScope::Public,
                is_active: true,
            })
            .await,
            Err(CoreError::NotFoundByKey { .. })
        );
    }

    #[tokio::test]
    async fn exclude_and_include_toggle_effective_state() {
        let svc = service().await;
        svc.create_assignment(NewAssignment {
            injectable_key: "secret".into(),
            scope: WS,
            is_active: true,
        })
        .await
        .unwrap();

        svc.exclude("secret", &WS).await.unwrap();
        assert!(!svc.is_active("secret", Some(1), Some(10)).await.unwrap());
        assert!(svc.is_active("secret", Some(1), Some(11)).await.unwrap());

        svc.include("secret", &WS).await.unwrap();
        assert!(svc.is_active("secret", Some(1), Some(10)).await.unwrap());

        assert_matches!(
            svc.exclude("secret", &AssignmentScope::Public).await,
            Err(CoreError::NotFoundByKey { .. })
        );
    }

    #[tokio::test]
    async fn deactivate_hides_key_unless_assigned() {
        let svc = service().await;
        svc.deactivate("due_date").await.unwrap();
        let active = svc.active_keys(Some(1), Some(10)).await.unwrap();
        assert!(!active.contains(&"due_date".to_string()));

        svc.create_assignment(NewAssignment {
            injectable_key: "due_date".into(),
            scope: AssignmentScope::Tenant { tenant_id: 1 },
            is_active: true,
        })
        .await
        .unwrap();
        let active = svc.active_keys(Some(1), Some(10)).await.unwrap();
        assert!(active.contains(&"due_date".to_string()));
    }

    #[tokio::test]
    async fn bulk_operations_collect_failures() {
        let svc = service().await;
        let result = svc.bulk_deactivate(&keys(&["client_name", "ghost", "due_date"])).await;
        assert_eq!(result.succeeded, keys(&["client_name", "due_date"]));
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].key, "ghost");
        assert_eq!(result.failed[0].kind, ErrorKind::NotFound);

        let created = svc
            .bulk_create_assignments(&keys(&["client_name", "ghost"]), AssignmentScope::Public, true)
            .await;
        assert_eq!(created.succeeded, keys(&["client_name"]));

        let deleted = svc
            .bulk_delete_assignments(&keys(&["client_name", "due_date"]), AssignmentScope::Public)
            .await;
        assert_eq!(deleted.succeeded, keys(&["client_name"]));
        assert_eq!(deleted.failed[0].key, "due_date");

        let activated = svc.bulk_activate(&keys(&["client_name"])).await;
        assert!(activated.failed.is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_assignment_is_not_found() {
        let svc = service().await;
        assert_matches!(svc.delete_assignment(999).await, Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn filter_reports_only_governed_inactive_codes() {
        let svc = service().await;
        svc.create_assignment(NewAssignment {
            injectable_key: "secret".into(),
            scope: AssignmentScope::Public,
            is_active: false,
        })
        .await
        .unwrap();
        let inactive = svc
            .inactive_codes(&keys(&["client_name", "secret", "plugin_only"]), None, None)
            .await
            .unwrap();
        assert_eq!(inactive, keys(&["secret"]));
    }

    #[tokio::test]
    async fn sync_registry_adds_missing_rows_once() {
        let svc = ScopeService::new(Arc::new(InMemoryScopeStore::new()));
        let registry = RegistryBuilder::new().build();
        assert_eq!(svc.sync_registry(&registry).await.unwrap(), registry.len());
        assert_eq!(svc.sync_registry(&registry).await.unwrap(), 0);
    }
}
