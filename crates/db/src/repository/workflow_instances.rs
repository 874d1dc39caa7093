//! Workflow instance storage.

use crate::{DbError, Transaction, models::WorkflowInstanceRow};

pub fn insert(tx: &mut Transaction, row: WorkflowInstanceRow) -> Result<(), DbError> {
    let instances = &mut tx.tables_mut().workflow_instances;
    if instances.iter().any(|existing| existing.id == row.id) {
        return Err(DbError::DuplicateKey(row.id));
    }
    instances.push(row);
    Ok(())
}

/// Every trigger starts at most one workflow instance.
pub fn find_by_trigger_id(
    tx: &Transaction,
    trigger_id: &str,
) -> Result<Option<WorkflowInstanceRow>, DbError> {
    Ok(tx
        .tables()
        .workflow_instances
        .iter()
        .find(|row| row.trigger_id == trigger_id)
        .cloned())
}

/// Overwrite the status columns of an existing instance.
pub fn update_status(tx: &mut Transaction, row: &WorkflowInstanceRow) -> Result<(), DbError> {
    let existing = tx
        .tables_mut()
        .workflow_instances
        .iter_mut()
        .find(|existing| existing.id == row.id)
        .ok_or(DbError::NotFound)?;
    existing.status = row.status.clone();
    existing.end_time = row.end_time;
    Ok(())
}
