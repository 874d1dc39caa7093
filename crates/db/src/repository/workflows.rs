//! Workflow definition storage, keyed by `(workflow_ref, version)`.

use crate::{DbError, Transaction, models::WorkflowRow};

/// Insert a new workflow version.
///
/// Returns `DbError::DuplicateKey` if the `(workflow_ref, version)` pair is
/// already stored; versions are never overwritten.
pub fn insert_workflow(tx: &mut Transaction, row: WorkflowRow) -> Result<(), DbError> {
    let key = (row.workflow_ref.clone(), row.version.clone());
    let workflows = &mut tx.tables_mut().workflows;
    if workflows.contains_key(&key) {
        return Err(DbError::DuplicateKey(format!("{}@{}", key.0, key.1)));
    }
    workflows.insert(key, row);
    Ok(())
}

/// Fetch a single workflow version.
pub fn find_by_ref_and_version(
    tx: &Transaction,
    workflow_ref: &str,
    version: &str,
) -> Result<Option<WorkflowRow>, DbError> {
    Ok(tx
        .tables()
        .workflows
        .get(&(workflow_ref.to_owned(), version.to_owned()))
        .cloned())
}

/// Return every stored version of a workflow, oldest first.
pub fn find_by_ref(tx: &Transaction, workflow_ref: &str) -> Result<Vec<WorkflowRow>, DbError> {
    let mut rows: Vec<WorkflowRow> = tx
        .tables()
        .workflows
        .values()
        .filter(|row| row.workflow_ref == workflow_ref)
        .cloned()
        .collect();
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.version.cmp(&b.version)));
    Ok(rows)
}

/// Permanently delete a workflow version.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub fn delete_by_ref_and_version(
    tx: &mut Transaction,
    workflow_ref: &str,
    version: &str,
) -> Result<(), DbError> {
    tx.tables_mut()
        .workflows
        .remove(&(workflow_ref.to_owned(), version.to_owned()))
        .map(|_| ())
        .ok_or(DbError::NotFound)
}
