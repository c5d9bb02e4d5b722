//! Mapping specification tree
//!
//! The mapping file is a JSON document describing the shape of one event.
//! Objects and arrays are kept as-is, strings are leaf templates, any other
//! scalar is copied verbatim.

use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::error::MappingResult;

/// One node of a mapping specification.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingSpec {
    /// Field name to child node, in document order.
    Object(Vec<(String, MappingSpec)>),
    /// Ordered child nodes.
    Array(Vec<MappingSpec>),
    /// A leaf template string, resolved per row.
    Template(String),
    /// A number, boolean or null copied into every record.
    Literal(Value),
}

impl MappingSpec {
    /// Parse a mapping specification from JSON text.
    pub fn from_json(json: &str) -> MappingResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Self::from_value(value))
    }

    /// Load a mapping specification from a file.
    pub fn from_file(path: impl AsRef<Path>) -> MappingResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Build the tree from an already parsed JSON value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => MappingSpec::Object(
                map.into_iter()
                    .map(|(key, child)| (key, Self::from_value(child)))
                    .collect(),
            ),
            Value::Array(items) => {
                MappingSpec::Array(items.into_iter().map(Self::from_value).collect())
            }
            Value::String(template) => MappingSpec::Template(template),
            other => MappingSpec::Literal(other),
        }
    }

    /// Number of leaf templates in the tree.
    pub fn template_count(&self) -> usize {
        match self {
            MappingSpec::Object(fields) => fields.iter().map(|(_, c)| c.template_count()).sum(),
            MappingSpec::Array(items) => items.iter().map(|c| c.template_count()).sum(),
            MappingSpec::Template(_) => 1,
            MappingSpec::Literal(_) => 0,
        }
    }
}

/// One step from the root to a node.
///
/// Cache keys are sequences of segments, so a literal key `"a.b"` and the
/// nested field `a` / `b` never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Structural path of an object field below `parent`.
pub(crate) fn field_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Structural path of an array element below `parent`.
pub(crate) fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}
