//! Field-type resolution.
//!
//! The predicate compiler asks a [`FieldTypeResolver`] how each referenced
//! field is indexed, and picks term-level or full-text clauses from the
//! answer. Fields nobody knows about are treated as analyzed text.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SqlesResult;

/// How a field is indexed by the search engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Untokenized value, matched by exact equality.
    #[serde(alias = "keyword")]
    Exact,
    /// Tokenized at index time, matched by token overlap.
    #[default]
    #[serde(rename = "text", alias = "analyzed")]
    AnalyzedText,
    Numeric,
    Date,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Exact => write!(f, "exact"),
            FieldType::AnalyzedText => write!(f, "text"),
            FieldType::Numeric => write!(f, "numeric"),
            FieldType::Date => write!(f, "date"),
        }
    }
}

/// Answers "how is this field indexed?".
///
/// Implementations must answer for any name, falling back to
/// [`FieldType::AnalyzedText`]. Returning an error aborts compilation with
/// [`SqlesError::SchemaResolution`](crate::error::SqlesError::SchemaResolution).
pub trait FieldTypeResolver: Send + Sync {
    fn resolve(&self, field: &str) -> SqlesResult<FieldType>;
}

/// Resolver that knows nothing: every field is analyzed text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl FieldTypeResolver for DefaultResolver {
    fn resolve(&self, _field: &str) -> SqlesResult<FieldType> {
        Ok(FieldType::AnalyzedText)
    }
}

/// Fixed field-name to type table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: HashMap<String, FieldType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one field.
    pub fn with(mut self, field: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(field.into(), ty);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, ty: FieldType) {
        self.fields.insert(field.into(), ty);
    }

    pub fn get(&self, field: &str) -> Option<FieldType> {
        self.fields.get(field).copied()
    }

    /// Entries of `other` win over ours.
    pub fn merge(mut self, other: &Schema) -> Self {
        for (field, ty) in &other.fields {
            self.fields.insert(field.clone(), *ty);
        }
        self
    }

    /// Entries sorted by field name.
    pub fn entries(&self) -> Vec<(&str, FieldType)> {
        let mut entries: Vec<(&str, FieldType)> =
            self.fields.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build from an index mapping document as returned by `GET /{index}/_mapping`.
    ///
    /// Accepts the full response (`{index: {mappings: ...}}`), a single
    /// `mappings` object, or a bare `properties` object. Legacy per-type
    /// mappings (`mappings: {type: {properties}}`) are also understood.
    /// Nested objects become dotted names; multi-fields become
    /// `parent.sub` entries.
    pub fn from_mapping(mapping: &Value) -> Self {
        let mut schema = Schema::new();
        collect_mapping(mapping, &mut schema);
        tracing::debug!("Loaded {} field types from mapping", schema.len());
        schema
    }
}

impl FromIterator<(String, FieldType)> for Schema {
    fn from_iter<I: IntoIterator<Item = (String, FieldType)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl FieldTypeResolver for Schema {
    fn resolve(&self, field: &str) -> SqlesResult<FieldType> {
        Ok(self.get(field).unwrap_or_default())
    }
}

fn collect_mapping(node: &Value, schema: &mut Schema) {
    let Some(obj) = node.as_object() else {
        return;
    };

    if let Some(props) = obj.get("properties") {
        collect_properties(props, "", schema);
        return;
    }

    // Either `{index: {mappings: ...}}`, `{mappings: ...}` or legacy
    // `{type: {properties: ...}}`; descend into every object child.
    for child in obj.values() {
        collect_mapping(child, schema);
    }
}

fn collect_properties(props: &Value, prefix: &str, schema: &mut Schema) {
    let Some(props) = props.as_object() else {
        return;
    };

    for (name, def) in props {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };

        if let Some(ty) = mapping_type(def) {
            schema.insert(path.clone(), ty);
        }

        if let Some(nested) = def.get("properties") {
            collect_properties(nested, &path, schema);
        }

        if let Some(multi) = def.get("fields").and_then(Value::as_object) {
            for (sub, sub_def) in multi {
                if let Some(ty) = mapping_type(sub_def) {
                    schema.insert(format!("{}.{}", path, sub), ty);
                }
            }
        }
    }
}

fn mapping_type(def: &Value) -> Option<FieldType> {
    let ty = def.get("type")?.as_str()?;
    let field_type = match ty {
        "keyword" | "constant_keyword" | "boolean" | "ip" => FieldType::Exact,
        "string" => match def.get("index").and_then(Value::as_str) {
            Some("not_analyzed") => FieldType::Exact,
            _ => FieldType::AnalyzedText,
        },
        "text" | "match_only_text" => FieldType::AnalyzedText,
        "long" | "integer" | "short" | "byte" | "double" | "float" | "half_float"
        | "scaled_float" | "unsigned_long" => FieldType::Numeric,
        "date" | "date_nanos" => FieldType::Date,
        _ => return None,
    };
    Some(field_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_resolver_is_analyzed_text() {
        assert_eq!(DefaultResolver.resolve("anything").unwrap(), FieldType::AnalyzedText);
    }

    #[test]
    fn test_schema_lookup_with_fallback() {
        let schema = Schema::new()
            .with("age", FieldType::Numeric)
            .with("gender", FieldType::Exact);
        assert_eq!(schema.resolve("age").unwrap(), FieldType::Numeric);
        assert_eq!(schema.resolve("gender").unwrap(), FieldType::Exact);
        assert_eq!(schema.resolve("phrase").unwrap(), FieldType::AnalyzedText);
    }

    #[test]
    fn test_schema_from_mapping_response() {
        let mapping = json!({
            "bank": {
                "mappings": {
                    "properties": {
                        "age": { "type": "integer" },
                        "balance": { "type": "double" },
                        "city": {
                            "type": "text",
                            "fields": { "keyword": { "type": "keyword" } }
                        },
                        "gender": { "type": "keyword" },
                        "insert_time": { "type": "date" },
                        "address": {
                            "properties": {
                                "zip": { "type": "keyword" }
                            }
                        }
                    }
                }
            }
        });

        let schema = Schema::from_mapping(&mapping);
        assert_eq!(schema.get("age"), Some(FieldType::Numeric));
        assert_eq!(schema.get("balance"), Some(FieldType::Numeric));
        assert_eq!(schema.get("city"), Some(FieldType::AnalyzedText));
        assert_eq!(schema.get("city.keyword"), Some(FieldType::Exact));
        assert_eq!(schema.get("gender"), Some(FieldType::Exact));
        assert_eq!(schema.get("insert_time"), Some(FieldType::Date));
        assert_eq!(schema.get("address.zip"), Some(FieldType::Exact));
        assert_eq!(schema.get("address"), None);
    }

    #[test]
    fn test_schema_from_legacy_typed_mapping() {
        let mapping = json!({
            "online": {
                "mappings": {
                    "online": {
                        "properties": {
                            "firstname": { "type": "string" },
                            "state": { "type": "string", "index": "not_analyzed" }
                        }
                    }
                }
            }
        });

        let schema = Schema::from_mapping(&mapping);
        assert_eq!(schema.get("firstname"), Some(FieldType::AnalyzedText));
        assert_eq!(schema.get("state"), Some(FieldType::Exact));
    }

    #[test]
    fn test_field_type_names() {
        let parsed: HashMap<String, FieldType> = serde_json::from_value(json!({
            "a": "exact", "b": "keyword", "c": "text", "d": "numeric", "e": "date"
        }))
        .unwrap();
        assert_eq!(parsed["a"], FieldType::Exact);
        assert_eq!(parsed["b"], FieldType::Exact);
        assert_eq!(parsed["c"], FieldType::AnalyzedText);
        assert_eq!(parsed["d"], FieldType::Numeric);
        assert_eq!(parsed["e"], FieldType::Date);
    }
}
