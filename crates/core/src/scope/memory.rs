//! In-memory [`ScopeStore`] for tests and single-process deployments.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::CoreError;
use crate::types::DbId;

use super::{
    AssignmentScope, NewAssignment, ScopeStore, SystemInjectable, SystemInjectableAssignment,
};

#[derive(Default)]
struct Tables {
    injectables: Vec<SystemInjectable>,
    assignments: Vec<SystemInjectableAssignment>,
    next_id: DbId,
}

#[derive(Default)]
pub struct InMemoryScopeStore {
    tables: Mutex<Tables>,
}

impl InMemoryScopeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScopeStore for InMemoryScopeStore {
    async fn list_injectables(&self) -> Result<Vec<SystemInjectable>, CoreError> {
        Ok(self.tables.lock().await.injectables.clone())
    }

    async fn find_injectables(&self, keys: &[String]) -> Result<Vec<SystemInjectable>, CoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .injectables
            .iter()
            .filter(|i| keys.contains(&i.key))
            .cloned()
            .collect())
    }

    async fn insert_injectable_if_missing(
        &self,
        injectable: &SystemInjectable,
    ) -> Result<bool, CoreError> {
        let mut tables = self.tables.lock().await;
        if tables.injectables.iter().any(|i| i.key == injectable.key) {
            return Ok(false);
        }
        tables.injectables.push(injectable.clone());
        Ok(true)
    }

    async fn set_injectable_active(&self, key: &str, is_active: bool) -> Result<bool, CoreError> {
        let mut tables = self.tables.lock().await;
        match tables.injectables.iter_mut().find(|i| i.key == key) {
            Some(row) => {
                row.is_active = is_active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn assignments_for_keys(
        &self,
        keys: &[String],
    ) -> Result<Vec<SystemInjectableAssignment>, CoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .assignments
            .iter()
            .filter(|a| keys.contains(&a.injectable_key))
            .cloned()
            .collect())
    }

    async fn find_assignment(
        &self,
        key: &str,
        scope: &AssignmentScope,
    ) -> Result<Option<SystemInjectableAssignment>, CoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .assignments
            .iter()
            .find(|a| a.injectable_key == key && a.scope == *scope)
            .cloned())
    }

    async fn insert_assignment(
        &self,
        input: &NewAssignment,
    ) -> Result<SystemInjectableAssignment, CoreError> {
        let mut tables = self.tables.lock().await;
        tables.next_id += 1;
        let row = SystemInjectableAssignment {
            id: tables.next_id,
            injectable_key: input.injectable_key.clone(),
            scope: input.scope,
            is_active: input.is_active,
            created_at: Utc::now(),
        };
        tables.assignments.push(row.clone());
        Ok(row)
    }

    async fn set_assignment_active(&self, id: DbId, is_active: bool) -> Result<bool, CoreError> {
        let mut tables = self.tables.lock().await;
        match tables.assignments.iter_mut().find(|a| a.id == id) {
            Some(row) => {
                row.is_active = is_active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_assignment(&self, id: DbId) -> Result<bool, CoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.assignments.len();
        tables.assignments.retain(|a| a.id != id);
        Ok(tables.assignments.len() != before)
    }
}
