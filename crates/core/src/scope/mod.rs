//! Per-scope availability of system injectables.
//!
//! A system injectable has a global `is_active` flag and any number of
//! assignments binding it to a scope (public, one tenant, one workspace).
//! The most specific assignment matching a request decides whether the
//! injectable is available; see [`effective_is_active`].

pub mod memory;
pub mod service;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CoreError;
use crate::injectable::DataType;
use crate::types::{DbId, Timestamp};

pub use memory::InMemoryScopeStore;
pub use service::{BulkFailure, BulkOperationResult, ScopeService};

// ---------------------------------------------------------------------------
// Scope types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeType {
    Public,
    Tenant,
    Workspace,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Tenant => "TENANT",
            Self::Workspace => "WORKSPACE",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "PUBLIC" => Ok(Self::Public),
            "TENANT" => Ok(Self::Tenant),
            "WORKSPACE" => Ok(Self::Workspace),
            _ => Err(CoreError::Validation(format!(
                "Invalid scope_type: '{s}'. Must be one of: PUBLIC, TENANT, WORKSPACE"
            ))),
        }
    }
}

impl std::fmt::Display for ScopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an assignment applies. Each variant carries exactly the ids its
/// scope needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "scope_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentScope {
    Public,
    Tenant { tenant_id: DbId },
    Workspace { tenant_id: DbId, workspace_id: DbId },
}

impl AssignmentScope {
    /// Build a scope from its stored columns, rejecting id combinations
    /// that do not fit the scope type.
    pub fn from_parts(
        scope_type: ScopeType,
        tenant_id: Option<DbId>,
        workspace_id: Option<DbId>,
    ) -> Result<Self, CoreError> {
        match (scope_type, tenant_id, workspace_id) {
            (ScopeType::Public, None, None) => Ok(Self::Public),
            (ScopeType::Tenant, Some(tenant_id), None) => Ok(Self::Tenant { tenant_id }),
            (ScopeType::Workspace, Some(tenant_id), Some(workspace_id)) => Ok(Self::Workspace {
                tenant_id,
                workspace_id,
            }),
            (scope_type, _, _) => Err(CoreError::Validation(format!(
                "{scope_type} scope requires {}",
                match scope_type {
                    ScopeType::Public => "no tenant or workspace id",
                    ScopeType::Tenant => "a tenant id and no workspace id",
                    ScopeType::Workspace => "both a tenant id and a workspace id",
                }
            ))),
        }
    }

    pub fn scope_type(&self) -> ScopeType {
        match self {
            Self::Public => ScopeType::Public,
            Self::Tenant { .. } => ScopeType::Tenant,
            Self::Workspace { .. } => ScopeType::Workspace,
        }
    }

    pub fn tenant_id(&self) -> Option<DbId> {
        match self {
            Self::Public => None,
            Self::Tenant { tenant_id } | Self::Workspace { tenant_id, .. } => Some(*tenant_id),
        }
    }

    pub fn workspace_id(&self) -> Option<DbId> {
        match self {
            Self::Workspace { workspace_id, .. } => Some(*workspace_id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInjectable {
    pub key: String,
    pub data_type: DataType,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInjectableAssignment {
    pub id: DbId,
    pub injectable_key: String,
    #[serde(flatten)]
    pub scope: AssignmentScope,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// DTO for creating an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    pub injectable_key: String,
    pub scope: AssignmentScope,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Precedence
// ---------------------------------------------------------------------------

/// Effective availability of `injectable` for a request scope.
///
/// The most specific matching assignment wins: this workspace, then this
/// tenant, then public, then the injectable's own flag. An inactive
/// assignment is an authoritative `false`. Assignments for other keys are
/// ignored, and the order of `assignments` does not matter.
pub fn effective_is_active(
    injectable: &SystemInjectable,
    assignments: &[SystemInjectableAssignment],
    tenant_id: Option<DbId>,
    workspace_id: Option<DbId>,
) -> bool {
    let mut tenant_match = None;
    let mut public_match = None;

    for a in assignments.iter().filter(|a| a.injectable_key == injectable.key) {
        match a.scope {
            AssignmentScope::Workspace {
                workspace_id: ws, ..
            } if Some(ws) == workspace_id => return a.is_active,
            AssignmentScope::Tenant { tenant_id: t } if Some(t) == tenant_id => {
                tenant_match = Some(a.is_active);
            }
            AssignmentScope::Public => public_match = Some(a.is_active),
            _ => {}
        }
    }

    tenant_match.or(public_match).unwrap_or(injectable.is_active)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Persistence for system injectables and their assignments.
#[async_trait]
pub trait ScopeStore: Send + Sync {
    async fn list_injectables(&self) -> Result<Vec<SystemInjectable>, CoreError>;

    async fn find_injectables(&self, keys: &[String]) -> Result<Vec<SystemInjectable>, CoreError>;

    /// Insert the injectable unless its key exists. Returns whether a row
    /// was inserted.
    async fn insert_injectable_if_missing(
        &self,
        injectable: &SystemInjectable,
    ) -> Result<bool, CoreError>;

    /// Returns `false` when the key does not exist.
    async fn set_injectable_active(&self, key: &str, is_active: bool) -> Result<bool, CoreError>;

    async fn assignments_for_keys(
        &self,
        keys: &[String],
    ) -> Result<Vec<SystemInjectableAssignment>, CoreError>;

    async fn find_assignment(
        &self,
        key: &str,
        scope: &AssignmentScope,
    ) -> Result<Option<SystemInjectableAssignment>, CoreError>;

    async fn insert_assignment(
        &self,
        input: &NewAssignment,
    ) -> Result<SystemInjectableAssignment, CoreError>;

    /// Returns `false` when the assignment does not exist.
    async fn set_assignment_active(&self, id: DbId, is_active: bool) -> Result<bool, CoreError>;

    /// Returns `false` when the assignment does not exist.
    async fn delete_assignment(&self, id: DbId) -> Result<bool, CoreError>;
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn injectable(is_active: bool) -> SystemInjectable {
        SystemInjectable {
            key: "client_name".into(),
            data_type: DataType::Text,
            is_active,
        }
    }

    fn assignment(id: DbId, scope: AssignmentScope, is_active: bool) -> SystemInjectableAssignment {
        SystemInjectableAssignment {
            id,
            injectable_key: "client_name".into(),
            scope,
            is_active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn from_parts_enforces_ids() {
        assert_eq!(
            AssignmentScope::from_parts(ScopeType::Public, None, None).unwrap(),
            AssignmentScope::Public
        );
        assert_eq!(
            AssignmentScope::from_parts(ScopeType::Workspace, Some(1), Some(2)).unwrap(),
            AssignmentScope::Workspace {
                tenant_id: 1,
                workspace_id: 2
            }
        );
        assert_matches!(
            AssignmentScope::from_parts(ScopeType::Public, Some(1), None),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            AssignmentScope::from_parts(ScopeType::Tenant, None, None),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            AssignmentScope::from_parts(ScopeType::Workspace, Some(1), None),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn global_flag_applies_without_assignments() {
        assert!(effective_is_active(&injectable(true), &[], Some(1), Some(2)));
        assert!(!effective_is_active(&injectable(false), &[], Some(1), Some(2)));
    }

    #[test]
    fn workspace_wins_regardless_of_order() {
        let ws = assignment(1, AssignmentScope::Workspace { tenant_id: 1, workspace_id: 2 }, true);
        let tenant = assignment(2, AssignmentScope::Tenant { tenant_id: 1 }, false);
        let public = assignment(3, AssignmentScope::Public, false);

        let orders = [
            vec![ws.clone(), tenant.clone(), public.clone()],
            vec![public.clone(), tenant.clone(), ws.clone()],
            vec![tenant.clone(), ws.clone(), public.clone()],
        ];
        for order in orders {
            assert!(effective_is_active(&injectable(false), &order, Some(1), Some(2)));
        }
    }

    #[test]
    fn tenant_beats_public() {
        let all = vec![
            assignment(1, AssignmentScope::Public, true),
            assignment(2, AssignmentScope::Tenant { tenant_id: 7 }, false),
        ];
        assert!(!effective_is_active(&injectable(true), &all, Some(7), Some(99)));
        assert!(effective_is_active(&injectable(true), &all, Some(8), None));
    }

    #[test]
    fn excluded_public_assignment_is_authoritative() {
        let all = vec![assignment(1, AssignmentScope::Public, false)];
        assert!(!effective_is_active(&injectable(true), &all, None, None));
    }

    #[test]
    fn other_workspaces_do_not_apply() {
        let all = vec![assignment(
            1,
            AssignmentScope::Workspace { tenant_id: 1, workspace_id: 3 },
            false,
        )];
        assert!(effective_is_active(&injectable(true), &all, Some(1), Some(2)));
    }

    #[test]
    fn scope_type_round_trips() {
        for t in [ScopeType::Public, ScopeType::Tenant, ScopeType::Workspace] {
            assert_eq!(ScopeType::from_str(t.as_str()).unwrap(), t);
        }
        assert_matches!(ScopeType::from_str("GLOBAL"), Err(CoreError::Validation(_)));
    }
}
