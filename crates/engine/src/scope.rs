//! Scope context: the `scope.name → Parameter` mapping an expression is
//! evaluated against.
//!
//! Paths are stored fully qualified (`global.env`, `trigger.repo`,
//! `FLOW.build.version`, `build.version`).  Node outputs are registered
//! under both the workflow-type-qualified path and the short path.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::parameter::Parameter;

pub const GLOBAL_SCOPE: &str = "global";
pub const TRIGGER_SCOPE: &str = "trigger";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// Two entries were registered under the same path.
    #[error("duplicate scope entry: '{0}'")]
    Duplicate(String),
}

#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
    entries: BTreeMap<String, Parameter>,
}

impl ScopeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `parameter` under `scope.name`.
    pub fn add(&mut self, scope: &str, name: &str, parameter: Parameter) -> Result<(), ScopeError> {
        self.add_path(format!("{scope}.{name}"), parameter)
    }

    /// Register `parameter` under an already qualified path.
    pub fn add_path(&mut self, path: String, parameter: Parameter) -> Result<(), ScopeError> {
        if self.entries.contains_key(&path) {
            return Err(ScopeError::Duplicate(path));
        }
        self.entries.insert(path, parameter);
        Ok(())
    }

    /// Register a node output under `<workflowType>.<taskRef>.<ref>` and
    /// `<taskRef>.<ref>`.
    pub fn add_output(
        &mut self,
        workflow_type: &str,
        async_task_ref: &str,
        output_ref: &str,
        parameter: Parameter,
    ) -> Result<(), ScopeError> {
        self.add_path(
            format!("{workflow_type}.{async_task_ref}.{output_ref}"),
            parameter.clone(),
        )?;
        self.add_path(format!("{async_task_ref}.{output_ref}"), parameter)
    }

    pub fn get(&self, path: &str) -> Option<&Parameter> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
