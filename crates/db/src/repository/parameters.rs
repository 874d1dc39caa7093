//! Parameter value storage.  Append-only: rows are never updated.

use crate::{DbError, Transaction, models::ParameterRow};

/// Insert every row.  Fails without writing anything if any id is taken.
pub fn insert_all(tx: &mut Transaction, rows: Vec<ParameterRow>) -> Result<(), DbError> {
    let parameters = &mut tx.tables_mut().parameters;
    if let Some(taken) = rows.iter().find(|row| parameters.contains_key(&row.id)) {
        return Err(DbError::DuplicateKey(taken.id.clone()));
    }
    for row in rows {
        parameters.insert(row.id.clone(), row);
    }
    Ok(())
}

/// Fetch the rows whose id is in `ids`.  Unknown ids are skipped.
pub fn find_by_ids(tx: &Transaction, ids: &[String]) -> Result<Vec<ParameterRow>, DbError> {
    let parameters = &tx.tables().parameters;
    Ok(ids.iter().filter_map(|id| parameters.get(id).cloned()).collect())
}
