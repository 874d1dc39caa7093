//! `engine` crate — workflow model, parameter scoping, task-instance state
//! machine and the activation/completion orchestrator.

pub mod binder;
pub mod config;
pub mod context;
pub mod dag;
pub mod error;
pub mod expression;
pub mod instance_parameter;
pub mod models;
pub mod orchestrator;
pub mod parameter;
pub mod registry;
pub mod scheduler;
pub mod scope;
pub mod task;
pub mod trigger;
pub mod workflow_instance;

pub use config::EngineConfig;
pub use context::CallContext;
pub use dag::validate_dag;
pub use error::EngineError;
pub use expression::{ExpressionError, ExpressionLanguage, TemplateExpressionLanguage};
pub use instance_parameter::{InstanceParameter, InstanceParameterKind};
pub use models::{Workflow, WorkflowDefinition, WorkflowType};
pub use orchestrator::{Orchestrator, TaskActivatingCmd, TaskDispatch, TerminateOutcome, WorkerWait};
pub use parameter::{find_parameters, Parameter, ParameterType, ParameterValue};
pub use registry::WorkflowRegistry;
pub use scope::ScopeContext;
pub use task::{TaskInstance, TaskStatus};
pub use trigger::{ManualParameter, TriggerOutcome, TriggerService, TriggerSource};
pub use workflow_instance::{ProcessStatus, WorkflowInstance};

#[cfg(test)]
mod orchestrator_tests;
#[cfg(test)]
mod test_support;
