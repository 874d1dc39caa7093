//! Expression language used to compute node inputs.
//!
//! The engine only depends on the [`ExpressionLanguage`] trait.
//! [`TemplateExpressionLanguage`] is the bundled implementation: `${path}`
//! placeholders resolved against a [`ScopeContext`].
//!
//! ```text
//! ${trigger.repo}              -> the referenced value, converted to the input type
//! release-${build.version}     -> interpolated string, converted to the input type
//! 3                            -> literal, converted to the input type
//! ```

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::parameter::{Parameter, ParameterError, ParameterType};
use crate::scope::ScopeContext;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    /// A placeholder names a path that is not in the context.
    #[error("unresolved reference '${{{0}}}'")]
    UnresolvedReference(String),

    /// The evaluated value cannot be converted to the declared type.
    #[error("type mismatch: {0}")]
    TypeMismatch(#[from] ParameterError),

    #[error("syntax error in '{expression}': {message}")]
    Syntax { expression: String, message: String },

    /// Wraps any of the above with the input it was raised for.
    #[error("input '{input_ref}': {source}")]
    Input {
        input_ref: String,
        #[source]
        source: Box<ExpressionError>,
    },
}

impl ExpressionError {
    pub fn for_input(self, input_ref: &str) -> Self {
        Self::Input {
            input_ref: input_ref.to_owned(),
            source: Box::new(self),
        }
    }
}

/// Evaluates one expression into a fresh parameter of `result_type`.
pub trait ExpressionLanguage: Send + Sync {
    fn evaluate(
        &self,
        expression: &str,
        result_type: ParameterType,
        context: &ScopeContext,
    ) -> Result<Parameter, ExpressionError>;
}

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z0-9_\-]+)*)\s*\}")
        .expect("placeholder pattern is valid")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateExpressionLanguage;

impl TemplateExpressionLanguage {
    pub fn new() -> Self {
        Self
    }

    fn resolve<'a>(context: &'a ScopeContext, path: &str) -> Result<&'a Parameter, ExpressionError> {
        context
            .get(path)
            .ok_or_else(|| ExpressionError::UnresolvedReference(path.to_owned()))
    }
}

impl ExpressionLanguage for TemplateExpressionLanguage {
    fn evaluate(
        &self,
        expression: &str,
        result_type: ParameterType,
        context: &ScopeContext,
    ) -> Result<Parameter, ExpressionError> {
        let trimmed = expression.trim();

        // A lone reference keeps the referenced value as-is before conversion.
        if let Some(caps) = PLACEHOLDER.captures(trimmed) {
            if caps.get(0).is_some_and(|m| m.as_str().len() == trimmed.len()) {
                let referenced = Self::resolve(context, &caps[1])?;
                return Ok(result_type.parse(&referenced.string_value())?);
            }
        }

        let malformed = || ExpressionError::Syntax {
            expression: expression.to_owned(),
            message: "unterminated or malformed placeholder".into(),
        };
        let mut rendered = String::with_capacity(expression.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(expression) {
            let Some(whole) = caps.get(0) else { continue };
            let literal = &expression[last..whole.start()];
            if literal.contains("${") {
                return Err(malformed());
            }
            rendered.push_str(literal);
            rendered.push_str(&Self::resolve(context, &caps[1])?.string_value());
            last = whole.end();
        }
        let tail = &expression[last..];
        if tail.contains("${") {
            return Err(malformed());
        }
        rendered.push_str(tail);

        Ok(result_type.parse(&rendered)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterValue;
    use crate::scope::{GLOBAL_SCOPE, TRIGGER_SCOPE};
    use rust_decimal::Decimal;

    fn context() -> ScopeContext {
        let mut ctx = ScopeContext::new();
        ctx.add(TRIGGER_SCOPE, "repo", ParameterType::String.parse("acme/app").unwrap()).unwrap();
        ctx.add(GLOBAL_SCOPE, "env", ParameterType::String.parse("prod").unwrap()).unwrap();
        ctx.add(GLOBAL_SCOPE, "replicas", ParameterType::Number.parse("3").unwrap()).unwrap();
        ctx.add_output("FLOW", "build", "version", ParameterType::String.parse("1.2.0").unwrap())
            .unwrap();
        ctx
    }

    fn eval(expression: &str, t: ParameterType) -> Result<Parameter, ExpressionError> {
        TemplateExpressionLanguage::new().evaluate(expression, t, &context())
    }

    #[test]
    fn lone_reference_resolves_to_a_fresh_copy() {
        let ctx = context();
        let p = TemplateExpressionLanguage::new()
            .evaluate("${trigger.repo}", ParameterType::String, &ctx)
            .unwrap();
        assert_eq!(p.string_value(), "acme/app");
        assert_ne!(p.id(), ctx.get("trigger.repo").unwrap().id());
    }

    #[test]
    fn reference_is_converted_to_declared_type() {
        let p = eval("${global.replicas}", ParameterType::Number).unwrap();
        assert_eq!(p.value(), &ParameterValue::Number(Decimal::from(3)));
        let s = eval("${global.replicas}", ParameterType::String).unwrap();
        assert_eq!(s.value(), &ParameterValue::String("3".into()));
    }

    #[test]
    fn both_output_aliases_resolve() {
        let long = eval("${FLOW.build.version}", ParameterType::String).unwrap();
        let short = eval("${build.version}", ParameterType::String).unwrap();
        assert_eq!(long.string_value(), short.string_value());
    }

    #[test]
    fn mixed_text_is_interpolated() {
        let p = eval("deploy ${trigger.repo} to ${global.env}", ParameterType::String).unwrap();
        assert_eq!(p.string_value(), "deploy acme/app to prod");
    }

    #[test]
    fn literal_is_converted() {
        let p = eval(" 10 ", ParameterType::Number).unwrap();
        assert_eq!(p.value(), &ParameterValue::Number(Decimal::from(10)));
        assert_eq!(eval("true", ParameterType::Bool).unwrap().value(), &ParameterValue::Bool(true));
    }

    #[test]
    fn unresolved_reference_fails() {
        assert_eq!(
            eval("${trigger.branch}", ParameterType::String),
            Err(ExpressionError::UnresolvedReference("trigger.branch".into()))
        );
        assert!(matches!(
            eval("x-${deploy.url}", ParameterType::String),
            Err(ExpressionError::UnresolvedReference(path)) if path == "deploy.url"
        ));
    }

    #[test]
    fn type_mismatch_fails() {
        assert!(matches!(
            eval("${trigger.repo}", ParameterType::Number),
            Err(ExpressionError::TypeMismatch(_))
        ));
    }

    #[test]
    fn unterminated_placeholder_is_a_syntax_error() {
        assert!(matches!(
            eval("${trigger.repo", ParameterType::String),
            Err(ExpressionError::Syntax { .. })
        ));
    }
}
