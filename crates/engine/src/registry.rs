//! Versioned workflow storage.  A `(ref, version)` pair, once registered,
//! always resolves to the same definition.

use db::DbPool;
use db::repository::workflows as workflow_repo;
use tracing::{info, instrument};

use crate::EngineError;
use crate::models::Workflow;

#[derive(Clone)]
pub struct WorkflowRegistry {
    pool: DbPool,
}

impl WorkflowRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Store `workflow`.  If the version already exists the stored
    /// definition is returned unchanged.
    #[instrument(skip(self, workflow), fields(workflow_ref = %workflow.workflow_ref(), version = %workflow.version()))]
    pub async fn register(&self, workflow: Workflow) -> Result<Workflow, EngineError> {
        let mut tx = self.pool.begin().await?;
        if let Some(existing) =
            workflow_repo::find_by_ref_and_version(&tx, workflow.workflow_ref(), workflow.version())?
        {
            tx.rollback().await?;
            info!("workflow version already registered");
            return Workflow::from_row(existing);
        }
        workflow_repo::insert_workflow(&mut tx, workflow.to_row()?)?;
        tx.commit().await?;
        info!("workflow registered");
        Ok(workflow)
    }

    pub async fn find(&self, workflow_ref: &str, version: &str) -> Result<Workflow, EngineError> {
        let tx = self.pool.begin().await?;
        let row = workflow_repo::find_by_ref_and_version(&tx, workflow_ref, version)?;
        tx.rollback().await?;
        row.map(Workflow::from_row)
            .unwrap_or_else(|| Err(EngineError::not_found("workflow", format!("{workflow_ref}@{version}"))))
    }

    /// Every stored version, oldest first.
    pub async fn versions(&self, workflow_ref: &str) -> Result<Vec<Workflow>, EngineError> {
        let tx = self.pool.begin().await?;
        let rows = workflow_repo::find_by_ref(&tx, workflow_ref)?;
        tx.rollback().await?;
        rows.into_iter().map(Workflow::from_row).collect()
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, workflow_ref: &str, version: &str) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;
        match workflow_repo::delete_by_ref_and_version(&mut tx, workflow_ref, version) {
            Ok(()) => {}
            Err(db::DbError::NotFound) => {
                return Err(EngineError::not_found("workflow", format!("{workflow_ref}@{version}")))
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;
        info!("workflow version deleted");
        Ok(())
    }
}
