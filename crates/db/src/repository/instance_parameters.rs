//! Instance parameter storage.  Append-only.

use std::collections::HashMap;

use crate::{DbError, Transaction, models::InstanceParameterRow};

pub const KIND_OUTPUT: &str = "OUTPUT";

pub fn insert_all(tx: &mut Transaction, rows: Vec<InstanceParameterRow>) -> Result<(), DbError> {
    tx.tables_mut().instance_parameters.extend(rows);
    Ok(())
}

/// Every binding of one task instance, in insertion order.
pub fn find_by_instance_id(
    tx: &Transaction,
    instance_id: &str,
) -> Result<Vec<InstanceParameterRow>, DbError> {
    Ok(tx
        .tables()
        .instance_parameters
        .iter()
        .filter(|row| row.instance_id == instance_id)
        .cloned()
        .collect())
}

/// The most recent OUTPUT binding per `(async_task_ref, ref_name)` of a
/// trigger run.  Later attempts (higher `serial_no`) win.
pub fn find_last_output_by_trigger_id(
    tx: &Transaction,
    trigger_id: &str,
) -> Result<Vec<InstanceParameterRow>, DbError> {
    let mut latest: HashMap<(&str, &str), &InstanceParameterRow> = HashMap::new();
    for row in tx
        .tables()
        .instance_parameters
        .iter()
        .filter(|row| row.trigger_id == trigger_id && row.kind == KIND_OUTPUT)
    {
        let key = (row.async_task_ref.as_str(), row.ref_name.as_str());
        match latest.get(&key) {
            Some(existing) if existing.serial_no > row.serial_no => {}
            _ => {
                latest.insert(key, row);
            }
        }
    }

    let mut rows: Vec<InstanceParameterRow> = latest.into_values().cloned().collect();
    rows.sort_by(|a, b| {
        a.async_task_ref
            .cmp(&b.async_task_ref)
            .then_with(|| a.ref_name.cmp(&b.ref_name))
    });
    Ok(rows)
}
