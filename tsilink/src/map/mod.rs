//! Mapping of raw rows to event records
//!
//! This module provides:
//! - `spec`: The mapping specification tree (loaded from JSON)
//! - `template`: Leaf classification (constant / field-reference / expression)
//! - `expr`: The small expression language used by leaves
//! - `context`: Row bindings and built-in functions visible to expressions
//! - `dates`: Date conversions behind `toEpoche` and `toIsoDate`
//! - `resolver`: Applies a specification to rows, caching leaf classification
//!
//! ## Example
//!
//! ```rust,ignore
//! use tsilink::map::{MappingSpec, Resolver};
//!
//! let spec = MappingSpec::from_json(r#"{ "id": "incident_id", "app": "'Computacenter'" }"#)?;
//! let mut resolver = Resolver::new(spec);
//! let record = resolver.resolve(&row)?;
//! ```

pub mod context;
pub mod dates;
pub mod expr;
pub mod resolver;
pub mod spec;
pub mod template;

pub use context::{Builtin, ExprValue, ExpressionContext};
pub use expr::Expr;
pub use resolver::Resolver;
pub use spec::MappingSpec;
pub use template::{LeafTemplate, TemplateKind};
