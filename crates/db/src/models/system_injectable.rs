//! Rows of `system_injectables` and `system_injectable_assignments`.

use docforge_core::error::CoreError;
use docforge_core::injectable::DataType;
use docforge_core::scope::{AssignmentScope, ScopeType, SystemInjectable, SystemInjectableAssignment};
use docforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `system_injectables` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SystemInjectableRow {
    pub key: String,
    pub data_type: String,
    pub is_active: bool,
}

impl TryFrom<SystemInjectableRow> for SystemInjectable {
    type Error = CoreError;

    fn try_from(row: SystemInjectableRow) -> Result<Self, Self::Error> {
        Ok(Self {
            key: row.key,
            data_type: DataType::from_str(&row.data_type)?,
            is_active: row.is_active,
        })
    }
}

/// A row from the `system_injectable_assignments` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssignmentRow {
    pub id: DbId,
    pub injectable_key: String,
    pub scope_type: String,
    pub tenant_id: Option<DbId>,
    pub workspace_id: Option<DbId>,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl TryFrom<AssignmentRow> for SystemInjectableAssignment {
    type Error = CoreError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        let scope_type = ScopeType::from_str(&row.scope_type)?;
        Ok(Self {
            id: row.id,
            injectable_key: row.injectable_key,
            scope: AssignmentScope::from_parts(scope_type, row.tenant_id, row.workspace_id)?,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn row(scope_type: &str, tenant_id: Option<DbId>, workspace_id: Option<DbId>) -> AssignmentRow {
        AssignmentRow {
            id: 1,
            injectable_key: "current_date".into(),
            scope_type: scope_type.into(),
            tenant_id,
            workspace_id,
            is_active: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn assignment_row_converts_scope() {
        let a = SystemInjectableAssignment::try_from(row("WORKSPACE", Some(3), Some(9))).unwrap();
        assert_eq!(
            a.scope,
            AssignmentScope::Workspace {
                tenant_id: 3,
                workspace_id: 9
            }
        );
        assert!(!a.is_active);
    }

    #[test]
    fn inconsistent_scope_columns_are_rejected() {
        assert_matches!(
            SystemInjectableAssignment::try_from(row("TENANT", None, None)),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            SystemInjectableAssignment::try_from(row("GLOBAL", None, None)),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn injectable_row_parses_data_type() {
        let row = SystemInjectableRow {
            key: "current_year".into(),
            data_type: "number".into(),
            is_active: true,
        };
        let injectable = SystemInjectable::try_from(row).unwrap();
        assert_eq!(injectable.data_type, DataType::Number);
    }
}
