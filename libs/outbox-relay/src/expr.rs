//! Aggregate-id extraction expressions.
//!
//! The interception layer above the writer resolves aggregate ids from the
//! intercepted call: the return value, a positional argument, or a named
//! parameter, each with an optional dotted path into the JSON shape of the
//! value. Examples: `result.order_id`, `args[0]`, `customer.id`.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("empty aggregate id expression")]
    Empty,

    #[error("malformed expression: {0}")]
    Malformed(String),

    #[error("no return value captured for 'result'")]
    NoResult,

    #[error("argument index {0} out of bounds")]
    ArgOutOfBounds(usize),

    #[error("unknown parameter: {0}")]
    UnknownParam(String),

    #[error("path segment '{0}' not found")]
    MissingField(String),

    #[error("expression resolved to null or a non-scalar value")]
    NotScalar,
}

/// What the expression starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Root {
    Result,
    Arg(usize),
    Param(String),
}

/// Parsed aggregate-id expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateIdExpr {
    root: Root,
    path: Vec<String>,
}

impl AggregateIdExpr {
    pub fn parse(expr: &str) -> Result<Self, ExprError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ExprError::Empty);
        }

        let mut segments = expr.split('.');
        let head = segments.next().expect("split yields at least one segment");

        let root = if head == "result" {
            Root::Result
        } else if let Some(rest) = head.strip_prefix("args[") {
            let index = rest
                .strip_suffix(']')
                .and_then(|raw| raw.parse::<usize>().ok())
                .ok_or_else(|| ExprError::Malformed(expr.to_string()))?;
            Root::Arg(index)
        } else if is_identifier(head) {
            Root::Param(head.to_string())
        } else {
            return Err(ExprError::Malformed(expr.to_string()));
        };

        let path = segments
            .map(|segment| {
                if is_identifier(segment) {
                    Ok(segment.to_string())
                } else {
                    Err(ExprError::Malformed(expr.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { root, path })
    }

    /// Evaluate against a captured call, producing the aggregate id string.
    pub fn resolve(&self, call: &CallContext) -> Result<String, ExprError> {
        let mut value = match &self.root {
            Root::Result => call.result.as_ref().ok_or(ExprError::NoResult)?,
            Root::Arg(index) => call
                .args
                .get(*index)
                .ok_or(ExprError::ArgOutOfBounds(*index))?,
            Root::Param(name) => call
                .params
                .get(name)
                .ok_or_else(|| ExprError::UnknownParam(name.clone()))?,
        };

        for segment in &self.path {
            value = value
                .get(segment)
                .ok_or_else(|| ExprError::MissingField(segment.clone()))?;
        }

        scalar_to_string(value)
    }
}

/// JSON view of one intercepted call.
#[derive(Debug, Default, Clone)]
pub struct CallContext {
    args: Vec<Value>,
    params: BTreeMap<String, Value>,
    result: Option<Value>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn with_result(mut self, value: Value) -> Self {
        self.result = Some(value);
        self
    }
}

fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn scalar_to_string(value: &Value) -> Result<String, ExprError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ExprError::NotScalar),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn resolves_result_path() {
        let expr = AggregateIdExpr::parse("result.order_id").unwrap();
        let call = CallContext::new().with_result(json!({"order_id": "O-77"}));
        assert_eq!(expr.resolve(&call).unwrap(), "O-77");
    }

    #[test]
    fn resolves_positional_argument() {
        let expr = AggregateIdExpr::parse("args[1]").unwrap();
        let call = CallContext::new()
            .with_arg(json!("ignored"))
            .with_arg(json!(42));
        assert_eq!(expr.resolve(&call).unwrap(), "42");
    }

    #[test]
    fn resolves_named_parameter_with_path() {
        let expr = AggregateIdExpr::parse("order.customer.id").unwrap();
        let call = CallContext::new().with_param(
            "order",
            json!({"customer": {"id": "C-9"}}),
        );
        assert_eq!(expr.resolve(&call).unwrap(), "C-9");
    }

    #[test]
    fn bare_result_resolves_scalar_return() {
        let expr = AggregateIdExpr::parse("result").unwrap();
        let call = CallContext::new().with_result(json!("O-1"));
        assert_eq!(expr.resolve(&call).unwrap(), "O-1");
    }

    #[test]
    fn missing_pieces_are_reported_precisely() {
        let call = CallContext::new().with_result(json!({"order_id": "O-1"}));

        assert_eq!(
            AggregateIdExpr::parse("result.missing")
                .unwrap()
                .resolve(&call),
            Err(ExprError::MissingField("missing".to_string()))
        );
        assert_eq!(
            AggregateIdExpr::parse("args[3]").unwrap().resolve(&call),
            Err(ExprError::ArgOutOfBounds(3))
        );
        assert_eq!(
            AggregateIdExpr::parse("nope").unwrap().resolve(&call),
            Err(ExprError::UnknownParam("nope".to_string()))
        );
        assert_eq!(
            AggregateIdExpr::parse("result").unwrap().resolve(
                &CallContext::new().with_result(json!(null))
            ),
            Err(ExprError::NotScalar)
        );
    }

    #[test]
    fn malformed_expressions_are_rejected_at_parse() {
        assert_eq!(AggregateIdExpr::parse("  "), Err(ExprError::Empty));
        assert!(matches!(
            AggregateIdExpr::parse("args[x]"),
            Err(ExprError::Malformed(_))
        ));
        assert!(matches!(
            AggregateIdExpr::parse("result..id"),
            Err(ExprError::Malformed(_))
        ));
        assert!(matches!(
            AggregateIdExpr::parse("or der.id"),
            Err(ExprError::Malformed(_))
        ));
    }

    #[test]
    fn objects_and_nulls_are_not_aggregate_ids() {
        let expr = AggregateIdExpr::parse("result").unwrap();
        let call = CallContext::new().with_result(json!({"nested": true}));
        assert_eq!(expr.resolve(&call), Err(ExprError::NotScalar));
    }
}
