//! Task instance storage.

use crate::{DbError, Transaction, models::TaskInstanceRow};

pub fn insert(tx: &mut Transaction, row: TaskInstanceRow) -> Result<(), DbError> {
    let instances = &mut tx.tables_mut().task_instances;
    if instances.iter().any(|existing| existing.id == row.id) {
        return Err(DbError::DuplicateKey(row.id));
    }
    instances.push(row);
    Ok(())
}

pub fn find_by_id(tx: &Transaction, id: &str) -> Result<Option<TaskInstanceRow>, DbError> {
    Ok(tx.tables().task_instances.iter().find(|row| row.id == id).cloned())
}

/// Every attempt sharing `business_id`, ordered by `serial_no`.
pub fn find_by_business_id(
    tx: &Transaction,
    business_id: &str,
) -> Result<Vec<TaskInstanceRow>, DbError> {
    let mut rows: Vec<TaskInstanceRow> = tx
        .tables()
        .task_instances
        .iter()
        .filter(|row| row.business_id == business_id)
        .cloned()
        .collect();
    rows.sort_by_key(|row| row.serial_no);
    Ok(rows)
}

/// The latest attempt for `business_id`.
pub fn find_by_business_id_and_max_serial_no(
    tx: &Transaction,
    business_id: &str,
) -> Result<Option<TaskInstanceRow>, DbError> {
    Ok(tx
        .tables()
        .task_instances
        .iter()
        .filter(|row| row.business_id == business_id)
        .max_by_key(|row| row.serial_no)
        .cloned())
}

/// Every task instance of one trigger run, in insertion order.
pub fn find_by_trigger_id(
    tx: &Transaction,
    trigger_id: &str,
) -> Result<Vec<TaskInstanceRow>, DbError> {
    Ok(tx
        .tables()
        .task_instances
        .iter()
        .filter(|row| row.trigger_id == trigger_id)
        .cloned()
        .collect())
}

pub fn find_by_status(tx: &Transaction, status: &str) -> Result<Vec<TaskInstanceRow>, DbError> {
    Ok(tx
        .tables()
        .task_instances
        .iter()
        .filter(|row| row.status == status)
        .cloned()
        .collect())
}

/// Overwrite the mutable columns (`status`, `end_time`, `worker_id`).
pub fn update_status(tx: &mut Transaction, row: &TaskInstanceRow) -> Result<(), DbError> {
    let existing = tx
        .tables_mut()
        .task_instances
        .iter_mut()
        .find(|existing| existing.id == row.id)
        .ok_or(DbError::NotFound)?;
    existing.status = row.status.clone();
    existing.end_time = row.end_time;
    existing.worker_id = row.worker_id.clone();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::create_pool;
    use chrono::Utc;

    fn row(id: &str, business_id: &str, serial_no: i32) -> TaskInstanceRow {
        TaskInstanceRow {
            id: id.into(),
            serial_no,
            def_key: "shell".into(),
            node_info: serde_json::Value::Null,
            async_task_ref: "build".into(),
            workflow_ref: "wf".into(),
            workflow_version: "1".into(),
            business_id: business_id.into(),
            trigger_id: "t1".into(),
            status: "WAITING".into(),
            start_time: Utc::now(),
            end_time: None,
            worker_id: None,
        }
    }

    #[tokio::test]
    async fn max_serial_no_picks_latest_attempt() {
        let pool = create_pool();
        let mut tx = pool.begin().await.unwrap();
        insert(&mut tx, row("a", "biz", 1)).unwrap();
        insert(&mut tx, row("c", "biz", 3)).unwrap();
        insert(&mut tx, row("b", "biz", 2)).unwrap();
        insert(&mut tx, row("x", "other", 9)).unwrap();

        let latest = find_by_business_id_and_max_serial_no(&tx, "biz").unwrap().unwrap();
        assert_eq!(latest.id, "c");

        let all = find_by_business_id(&tx, "biz").unwrap();
        let serials: Vec<i32> = all.iter().map(|r| r.serial_no).collect();
        assert_eq!(serials, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let pool = create_pool();
        let mut tx = pool.begin().await.unwrap();
        insert(&mut tx, row("a", "biz", 1)).unwrap();
        assert!(matches!(
            insert(&mut tx, row("a", "biz", 2)),
            Err(DbError::DuplicateKey(id)) if id == "a"
        ));
    }

    #[tokio::test]
    async fn updating_unknown_row_is_not_found() {
        let pool = create_pool();
        let mut tx = pool.begin().await.unwrap();
        assert!(matches!(update_status(&mut tx, &row("ghost", "b", 1)), Err(DbError::NotFound)));
    }
}
