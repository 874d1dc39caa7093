//! Parameter value store types.
//!
//! A [`Parameter`] is an immutable typed value with a generated identity.
//! Everything else refers to parameters by id; two bindings may share one
//! parameter.  New values are always created through
//! [`ParameterType::new_parameter`] so the type tag decides the conversion.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use db::models::ParameterRow;
use db::repository::parameters as parameter_repo;
use db::{DbPool, Transaction};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::EngineError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("unknown parameter type: '{0}'")]
    UnknownType(String),

    #[error("value {value} is not a valid {parameter_type}")]
    InvalidValue {
        parameter_type: ParameterType,
        value: String,
    },
}

/// The fixed set of value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    String,
    Number,
    Bool,
    Secret,
}

impl ParameterType {
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Bool => "BOOL",
            Self::Secret => "SECRET",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ParameterError> {
        match name {
            "STRING" => Ok(Self::String),
            "NUMBER" => Ok(Self::Number),
            "BOOL" => Ok(Self::Bool),
            "SECRET" => Ok(Self::Secret),
            other => Err(ParameterError::UnknownType(other.to_owned())),
        }
    }

    /// Typed constructor: convert a raw JSON value into a fresh parameter
    /// of this type.
    pub fn new_parameter(self, raw: &Value) -> Result<Parameter, ParameterError> {
        let value = match (self, raw) {
            (_, Value::Null) => return Err(self.invalid("null")),
            (Self::String, Value::String(s)) => ParameterValue::String(s.clone()),
            (Self::String, other) => ParameterValue::String(other.to_string()),
            (Self::Secret, Value::String(s)) => ParameterValue::Secret(s.clone()),
            (Self::Secret, Value::Number(n)) => ParameterValue::Secret(n.to_string()),
            (Self::Secret, Value::Bool(b)) => ParameterValue::Secret(b.to_string()),
            (Self::Number, Value::Number(n)) => ParameterValue::Number(parse_decimal(&n.to_string()).ok_or_else(|| self.invalid(n))?),
            (Self::Number, Value::String(s)) => ParameterValue::Number(parse_decimal(s.trim()).ok_or_else(|| self.invalid(s))?),
            (Self::Bool, Value::Bool(b)) => ParameterValue::Bool(*b),
            (Self::Bool, Value::String(s)) => ParameterValue::Bool(parse_bool(s).ok_or_else(|| self.invalid(s))?),
            (_, other) => return Err(self.invalid(other)),
        };
        Ok(Parameter::new(value))
    }

    /// Convert a canonical string form into a fresh parameter.
    pub fn parse(self, raw: &str) -> Result<Parameter, ParameterError> {
        self.new_parameter(&Value::String(raw.to_owned()))
    }

    fn invalid(self, value: impl fmt::Display) -> ParameterError {
        ParameterError::InvalidValue {
            parameter_type: self,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParameterType {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    String(String),
    Number(Decimal),
    Bool(bool),
    Secret(String),
}

/// An immutable typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    id: String,
    value: ParameterValue,
}

impl Parameter {
    fn new(value: ParameterValue) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            value,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value(&self) -> &ParameterValue {
        &self.value
    }

    pub fn parameter_type(&self) -> ParameterType {
        match self.value {
            ParameterValue::String(_) => ParameterType::String,
            ParameterValue::Number(_) => ParameterType::Number,
            ParameterValue::Bool(_) => ParameterType::Bool,
            ParameterValue::Secret(_) => ParameterType::Secret,
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self.value, ParameterValue::Secret(_))
    }

    /// Canonical string form, unmasked.  Numbers print without exponent.
    pub fn string_value(&self) -> String {
        match &self.value {
            ParameterValue::String(s) | ParameterValue::Secret(s) => s.clone(),
            ParameterValue::Number(n) => n.normalize().to_string(),
            ParameterValue::Bool(b) => b.to_string(),
        }
    }

    pub(crate) fn to_row(&self) -> ParameterRow {
        ParameterRow {
            id: self.id.clone(),
            type_name: self.parameter_type().name().to_owned(),
            value: self.string_value(),
        }
    }

    pub(crate) fn from_row(row: ParameterRow) -> Result<Self, ParameterError> {
        let parsed = ParameterType::from_name(&row.type_name)?.parse(&row.value)?;
        Ok(Self {
            id: row.id,
            value: parsed.value,
        })
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_secret() {
            f.write_str("******")
        } else {
            f.write_str(&self.string_value())
        }
    }
}

/// Load stored parameters by id, keyed by id.  Unknown ids are skipped.
pub(crate) fn load_parameters(
    tx: &Transaction,
    ids: &[String],
) -> Result<HashMap<String, Parameter>, EngineError> {
    parameter_repo::find_by_ids(tx, ids)?
        .into_iter()
        .map(|row| {
            let parameter = Parameter::from_row(row)?;
            Ok((parameter.id.clone(), parameter))
        })
        .collect()
}

pub(crate) fn save_parameters<'a>(
    tx: &mut Transaction,
    parameters: impl IntoIterator<Item = &'a Parameter>,
) -> Result<(), EngineError> {
    let rows = parameters.into_iter().map(Parameter::to_row).collect();
    parameter_repo::insert_all(tx, rows)?;
    Ok(())
}

/// Fetch stored parameters for display.  SECRET values are never returned.
pub async fn find_parameters(pool: &DbPool, ids: &[String]) -> Result<Vec<Parameter>, EngineError> {
    let tx = pool.begin().await?;
    let loaded = load_parameters(&tx, ids)?;
    tx.rollback().await?;
    Ok(ids
        .iter()
        .filter_map(|id| loaded.get(id))
        .filter(|p| !p.is_secret())
        .cloned()
        .collect())
}
