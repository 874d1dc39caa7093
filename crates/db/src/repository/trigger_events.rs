//! Trigger event storage.

use crate::{DbError, Transaction, models::TriggerEventRow};

pub fn insert(tx: &mut Transaction, row: TriggerEventRow) -> Result<(), DbError> {
    let events = &mut tx.tables_mut().trigger_events;
    if events.contains_key(&row.id) {
        return Err(DbError::DuplicateKey(row.id));
    }
    events.insert(row.id.clone(), row);
    Ok(())
}

pub fn find_by_id(tx: &Transaction, id: &str) -> Result<Option<TriggerEventRow>, DbError> {
    Ok(tx.tables().trigger_events.get(id).cloned())
}
