//! In-memory connection pool with serializable transactions.
//!
//! A [`Transaction`] holds the pool lock for its whole lifetime and works on a
//! private copy of the tables.  `commit` swaps the copy in; dropping the
//! transaction (or calling `rollback`) discards every staged write.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::DbError;
use crate::models::{
    InstanceParameterRow, ParameterRow, TaskInstanceRow, TriggerEventRow, WorkflowInstanceRow,
    WorkflowRow,
};

/// Every table of the schema.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub(crate) workflows: HashMap<(String, String), WorkflowRow>,
    pub(crate) workflow_instances: Vec<WorkflowInstanceRow>,
    pub(crate) task_instances: Vec<TaskInstanceRow>,
    pub(crate) instance_parameters: Vec<InstanceParameterRow>,
    pub(crate) parameters: HashMap<String, ParameterRow>,
    pub(crate) trigger_events: HashMap<String, TriggerEventRow>,
}

/// Shared pool handle.  Cloning is cheap; all clones see the same tables.
#[derive(Debug, Clone, Default)]
pub struct DbPool {
    tables: Arc<Mutex<Tables>>,
}

/// Create a new, empty pool.
pub fn create_pool() -> DbPool {
    info!("Creating in-memory database pool");
    DbPool::default()
}

impl DbPool {
    /// Start a transaction.  Waits until every other open transaction has
    /// committed or rolled back.
    pub async fn begin(&self) -> Result<Transaction, DbError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(Transaction { guard, staged })
    }
}

/// A unit of work over the pool.
pub struct Transaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

impl Transaction {
    /// Publish every staged write atomically.
    pub async fn commit(self) -> Result<(), DbError> {
        let Transaction { mut guard, staged } = self;
        *guard = staged;
        debug!("transaction committed");
        Ok(())
    }

    /// Discard every staged write.
    pub async fn rollback(self) -> Result<(), DbError> {
        debug!("transaction rolled back");
        Ok(())
    }

    pub(crate) fn tables(&self) -> &Tables {
        &self.staged
    }

    pub(crate) fn tables_mut(&mut self) -> &mut Tables {
        &mut self.staged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::parameters;

    fn row(id: &str) -> ParameterRow {
        ParameterRow {
            id: id.into(),
            type_name: "STRING".into(),
            value: "v".into(),
        }
    }

    #[tokio::test]
    async fn committed_writes_are_visible_to_later_transactions() {
        let pool = create_pool();
        let mut tx = pool.begin().await.unwrap();
        parameters::insert_all(&mut tx, vec![row("p1")]).unwrap();
        tx.commit().await.unwrap();

        let tx = pool.begin().await.unwrap();
        let found = parameters::find_by_ids(&tx, &["p1".to_string()]).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_partial_writes() {
        let pool = create_pool();
        {
            let mut tx = pool.begin().await.unwrap();
            parameters::insert_all(&mut tx, vec![row("p1"), row("p2")]).unwrap();
            // dropped without commit
        }

        let tx = pool.begin().await.unwrap();
        let found = parameters::find_by_ids(&tx, &["p1".to_string(), "p2".to_string()]).unwrap();
        assert!(found.is_empty());
    }
}
