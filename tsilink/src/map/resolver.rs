//! Mapping resolver
//!
//! Applies a [`MappingSpec`] to rows. Leaf templates are classified the first
//! time their structural path is seen and reused for every later row.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::spec::{field_path, index_path, MappingSpec, PathSegment};
use super::template::LeafTemplate;
use crate::error::MappingResult;
use crate::models::{Record, Row};

/// Classified leaves keyed by structural path.
///
/// The dotted form (`properties.incident_id`) is only used in messages.
#[derive(Debug, Default)]
struct TemplateCache {
    entries: HashMap<Vec<PathSegment>, LeafTemplate>,
    compilations: usize,
}

impl TemplateCache {
    fn get_or_compile(
        &mut self,
        key: &[PathSegment],
        path: &str,
        text: &str,
    ) -> MappingResult<&LeafTemplate> {
        if !self.entries.contains_key(key) {
            let template = LeafTemplate::compile(path, text)?;
            debug!(path, kind = template.kind.label(), "classified template");
            self.compilations += 1;
            self.entries.insert(key.to_vec(), template);
        }
        Ok(&self.entries[key])
    }
}

/// Resolves rows into records for one mapping specification.
#[derive(Debug)]
pub struct Resolver {
    spec: MappingSpec,
    cache: TemplateCache,
}

impl Resolver {
    pub fn new(spec: MappingSpec) -> Self {
        Self {
            spec,
            cache: TemplateCache::default(),
        }
    }

    /// Load the mapping file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> MappingResult<Self> {
        Ok(Self::new(MappingSpec::from_file(path)?))
    }

    pub fn spec(&self) -> &MappingSpec {
        &self.spec
    }

    /// Classify every leaf up front so a broken template fails before any
    /// row is read. Returns the number of classified leaves.
    pub fn prepare(&mut self) -> MappingResult<usize> {
        prepare_node(&self.spec, &mut Vec::new(), "", &mut self.cache)?;
        Ok(self.cache.entries.len())
    }

    /// Resolve one row. Any leaf failure drops the whole record.
    pub fn resolve(&mut self, row: &Row) -> MappingResult<Record> {
        resolve_node(&self.spec, &mut Vec::new(), "", row, &mut self.cache)
    }

    /// Number of classified leaf paths.
    pub fn cached_templates(&self) -> usize {
        self.cache.entries.len()
    }

    /// Number of times a leaf was classified; never exceeds the leaf count.
    pub fn compilations(&self) -> usize {
        self.cache.compilations
    }
}

fn resolve_node(
    node: &MappingSpec,
    key: &mut Vec<PathSegment>,
    path: &str,
    row: &Row,
    cache: &mut TemplateCache,
) -> MappingResult<Value> {
    match node {
        MappingSpec::Object(fields) => {
            let mut output = Map::new();
            for (name, child) in fields {
                key.push(PathSegment::Key(name.clone()));
                let value = resolve_node(child, key, &field_path(path, name), row, cache)?;
                key.pop();
                output.insert(name.clone(), value);
            }
            Ok(Value::Object(output))
        }
        MappingSpec::Array(items) => {
            let mut output = Vec::with_capacity(items.len());
            for (i, child) in items.iter().enumerate() {
                key.push(PathSegment::Index(i));
                output.push(resolve_node(child, key, &index_path(path, i), row, cache)?);
                key.pop();
            }
            Ok(Value::Array(output))
        }
        MappingSpec::Template(text) => cache.get_or_compile(key, path, text)?.evaluate(path, row),
        MappingSpec::Literal(value) => Ok(value.clone()),
    }
}

fn prepare_node(
    node: &MappingSpec,
    key: &mut Vec<PathSegment>,
    path: &str,
    cache: &mut TemplateCache,
) -> MappingResult<()> {
    match node {
        MappingSpec::Object(fields) => {
            for (name, child) in fields {
                key.push(PathSegment::Key(name.clone()));
                prepare_node(child, key, &field_path(path, name), cache)?;
                key.pop();
            }
        }
        MappingSpec::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                key.push(PathSegment::Index(i));
                prepare_node(child, key, &index_path(path, i), cache)?;
                key.pop();
            }
        }
        MappingSpec::Template(text) => {
            cache.get_or_compile(key, path, text)?;
        }
        MappingSpec::Literal(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MappingError;
    use serde_json::json;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn incident_resolver() -> Resolver {
        let spec = MappingSpec::from_value(json!({
            "title": "N",
            "eventClass": "'Incident'",
            "createdAt": "toEpoche(A, 'DD.MM.YYYY HH:mm')",
            "source": { "ref": "'Computacenter'", "type": "'Computacenter'" },
            "fingerprintFields": ["'incident_id'"],
            "properties": {
                "incident_id": "/^INC\\d+$/:C",
                "city": "G"
            },
            "tags": ["'app_id:Computacenter'", "'city:${G}'"],
            "severity": 3
        }));
        Resolver::new(spec)
    }

    #[test]
    fn test_resolve_nested_record() {
        let mut resolver = incident_resolver();
        let values = row(&[
            ("A", "31.01.2017 10:05"),
            ("C", "INC0001"),
            ("G", "Munich"),
            ("N", "Printer on fire"),
        ]);

        let record = resolver.resolve(&values).unwrap();
        assert_eq!(
            record,
            json!({
                "title": "Printer on fire",
                "eventClass": "Incident",
                "createdAt": 1485857100,
                "source": { "ref": "Computacenter", "type": "Computacenter" },
                "fingerprintFields": ["incident_id"],
                "properties": { "incident_id": "INC0001", "city": "Munich" },
                "tags": ["app_id:Computacenter", "city:Munich"],
                "severity": 3
            })
        );
    }

    #[test]
    fn test_second_resolution_hits_cache() {
        let mut resolver = incident_resolver();
        let values = row(&[("C", "INC7"), ("A", "")]);

        let first = resolver.resolve(&values).unwrap();
        let compiled = resolver.compilations();
        let second = resolver.resolve(&values).unwrap();

        assert_eq!(first, second);
        assert_eq!(resolver.compilations(), compiled);
        assert_eq!(resolver.cached_templates(), resolver.spec().template_count());
    }

    #[test]
    fn test_prepare_classifies_everything_once() {
        let mut resolver = incident_resolver();
        let count = resolver.prepare().unwrap();
        assert_eq!(count, 10);

        resolver.resolve(&row(&[("C", "INC1")])).unwrap();
        assert_eq!(resolver.compilations(), 10);
    }

    #[test]
    fn test_validation_failure_drops_record() {
        let mut resolver = incident_resolver();
        let err = resolver.resolve(&row(&[("C", "BAD")])).unwrap_err();
        match err {
            MappingError::Validation { path, value } => {
                assert_eq!(path, "properties.incident_id");
                assert_eq!(value, "BAD");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_prepare_reports_broken_template() {
        let spec = MappingSpec::from_value(json!({ "tags": ["app_id:Computacenter"] }));
        let err = Resolver::new(spec).prepare().unwrap_err();
        assert!(err.to_string().contains("tags[0]"));
    }

    #[test]
    fn test_dotted_key_does_not_share_nested_template() {
        let spec = MappingSpec::from_value(json!({
            "a": { "b": "C" },
            "a.b": "'X'"
        }));
        let mut resolver = Resolver::new(spec);

        let record = resolver.resolve(&row(&[("C", "fromC")])).unwrap();
        assert_eq!(record["a"]["b"], "fromC");
        assert_eq!(record["a.b"], "X");
        assert_eq!(resolver.compilations(), 2);
    }

    #[test]
    fn test_index_key_does_not_share_array_element() {
        let spec = MappingSpec::from_value(json!({
            "tags": ["C"],
            "tags[0]": "'literal'"
        }));
        let mut resolver = Resolver::new(spec);

        let record = resolver.resolve(&row(&[("C", "fromC")])).unwrap();
        assert_eq!(record["tags"], json!(["fromC"]));
        assert_eq!(record["tags[0]"], "literal");
    }

    #[test]
    fn test_record_keeps_mapping_field_order() {
        let spec = MappingSpec::from_json(
            r#"{ "title": "N", "eventClass": "'Incident'", "agent": "'tsilink'" }"#,
        )
        .unwrap();
        let record = Resolver::new(spec).resolve(&Row::new()).unwrap();

        let keys: Vec<&str> = record.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["title", "eventClass", "agent"]);
    }

    #[test]
    fn test_field_reference_and_missing_key() {
        let spec = MappingSpec::from_value(json!({ "id": "incident_id" }));
        let mut resolver = Resolver::new(spec);

        let found = resolver.resolve(&row(&[("incident_id", "INC0001")])).unwrap();
        assert_eq!(found["id"], "INC0001");

        let missing = resolver.resolve(&Row::new()).unwrap();
        assert_eq!(missing["id"], "");
    }
}
