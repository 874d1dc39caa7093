//! Engine-level error types.

use thiserror::Error;

use crate::expression::ExpressionError;
use crate::parameter::ParameterError;
use crate::scope::ScopeError;
use crate::task::TaskStatus;

/// Errors produced by the workflow engine (validation + orchestration).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// Two or more nodes share the same ref.
    #[error("duplicate node ref: '{0}'")]
    DuplicateNodeId(String),

    /// A dependency references a node ref that doesn't exist in the workflow.
    #[error("node '{node_ref}' depends on unknown node '{dependency}'")]
    UnknownNodeReference { node_ref: String, dependency: String },

    /// A declared node uses a ref reserved for volume nodes.
    #[error("node ref '{0}' is reserved")]
    ReservedNodeRef(String),

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    // ------ Orchestration errors ------

    /// An inbound trigger could not be turned into parameters.
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),

    /// A referenced workflow, node, task instance, trigger event or
    /// workflow instance is absent.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A node input expression could not be evaluated.
    #[error("expression evaluation failed: {0}")]
    ExpressionEvaluation(#[from] ExpressionError),

    /// The worker result is unparseable, empty, or matches no declared output.
    #[error("malformed result payload: {0}")]
    MalformedResultPayload(String),

    /// Another attempt of the same async task is still in flight.
    #[error("async task '{business_id}' already has an attempt in flight")]
    ConcurrentActivationConflict { business_id: String },

    /// A status change that the state machine does not allow.
    #[error("cannot move {entity} '{id}' from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// A stored status or type name no longer maps onto a known value.
    #[error("unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// Two scope entries were registered under the same path.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// Node catalog lookup failed.
    #[error("node catalog error: {0}")]
    Catalog(#[from] nodes::CatalogError),

    /// Dispatch or deferred-wait failure from the queue crate.
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// Stored JSON could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub(crate) fn task_transition(id: &str, from: TaskStatus, to: TaskStatus) -> Self {
        Self::InvalidTransition {
            entity: "task instance",
            id: id.to_owned(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
