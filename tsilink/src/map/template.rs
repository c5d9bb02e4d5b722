//! Leaf template classification
//!
//! A leaf string is one of:
//!
//! - `'text'` - a constant
//! - `incident_id` - a reference to a row column
//! - anything else - an [`Expr`] evaluated per row
//!
//! optionally wrapped as `/<regex>/:<template>` to validate the result.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::context::ExpressionContext;
use super::expr::Expr;
use crate::error::{MappingError, MappingResult};
use crate::models::Row;

static VALIDATION_WRAPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^/(.*)/:(.*)$").expect("static regex"));

static CONSTANT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^'([^'\\$]*)'$").expect("static regex"));

static FIELD_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[_a-zA-Z][_\-a-zA-Z0-9]*$").expect("static regex"));

/// How a leaf produces its value.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateKind {
    Constant(String),
    FieldReference(String),
    Expression(Expr),
}

impl TemplateKind {
    pub fn label(&self) -> &'static str {
        match self {
            TemplateKind::Constant(_) => "constant",
            TemplateKind::FieldReference(_) => "field-reference",
            TemplateKind::Expression(_) => "expression",
        }
    }
}

/// A classified leaf, ready to evaluate against any row.
#[derive(Debug, Clone)]
pub struct LeafTemplate {
    pub kind: TemplateKind,
    pub validation: Option<Regex>,
}

impl LeafTemplate {
    /// Classify and compile `text`. `path` is only used for error context.
    pub fn compile(path: &str, text: &str) -> MappingResult<Self> {
        let (validation, body) = match VALIDATION_WRAPPER.captures(text) {
            Some(caps) => {
                let pattern = caps.get(1).map_or("", |m| m.as_str());
                let regex = Regex::new(pattern).map_err(|source| MappingError::InvalidRegex {
                    path: path.to_string(),
                    source,
                })?;
                (Some(regex), caps.get(2).map_or("", |m| m.as_str()))
            }
            None => (None, text),
        };

        let kind = if let Some(caps) = CONSTANT.captures(body) {
            TemplateKind::Constant(caps.get(1).map_or("", |m| m.as_str()).to_string())
        } else if FIELD_REFERENCE.is_match(body) {
            TemplateKind::FieldReference(body.to_string())
        } else {
            let expr = Expr::parse(body).map_err(|source| MappingError::Expression {
                path: path.to_string(),
                source,
            })?;
            TemplateKind::Expression(expr)
        };

        Ok(Self { kind, validation })
    }

    /// Resolve the leaf for one row and apply its validation.
    pub fn evaluate(&self, path: &str, row: &Row) -> MappingResult<Value> {
        let value = match &self.kind {
            TemplateKind::Constant(text) => Value::String(text.clone()),
            TemplateKind::FieldReference(name) => {
                Value::String(row.get(name).cloned().unwrap_or_default())
            }
            TemplateKind::Expression(expr) => expr
                .evaluate(&ExpressionContext::new(row))
                .map_err(|source| MappingError::Expression {
                    path: path.to_string(),
                    source,
                })?
                .into_json(),
        };

        if let Some(regex) = &self.validation {
            let text = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !regex.is_match(&text) {
                return Err(MappingError::Validation {
                    path: path.to_string(),
                    value: text,
                });
            }
        }

        Ok(value)
    }
}
