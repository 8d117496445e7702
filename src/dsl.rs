//! Elasticsearch query DSL clause tree.
//!
//! The compiler builds these typed clauses instead of JSON text; rendering to
//! JSON happens once, in [`Query::to_json`].

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::ast::Literal;

/// Bounds of a `range` clause. Unset bounds are omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeBounds {
    pub gt: Option<Literal>,
    pub gte: Option<Literal>,
    pub lt: Option<Literal>,
    pub lte: Option<Literal>,
}

impl RangeBounds {
    /// Closed interval `[low, high]`.
    pub fn closed(low: Literal, high: Literal) -> Self {
        Self {
            gte: Some(low),
            lte: Some(high),
            ..Self::default()
        }
    }

    fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for (key, bound) in [
            ("gt", &self.gt),
            ("gte", &self.gte),
            ("lt", &self.lt),
            ("lte", &self.lte),
        ] {
            if let Some(v) = bound {
                obj.insert(key.to_string(), v.to_json());
            }
        }
        Value::Object(obj)
    }
}

/// `bool` compound clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    /// Mandatory, scored.
    pub must: Vec<Query>,
    /// Mandatory, not scored.
    pub filter: Vec<Query>,
    /// Alternatives.
    pub should: Vec<Query>,
    /// Excluded, not scored.
    pub must_not: Vec<Query>,
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for (key, clauses) in [
            ("must", &self.must),
            ("filter", &self.filter),
            ("should", &self.should),
            ("must_not", &self.must_not),
        ] {
            if !clauses.is_empty() {
                let list = clauses.iter().map(Query::to_json).collect();
                obj.insert(key.to_string(), Value::Array(list));
            }
        }
        if let Some(n) = self.minimum_should_match {
            obj.insert("minimum_should_match".to_string(), Value::from(n));
        }
        Value::Object(obj)
    }
}

/// One query DSL clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll,
    /// Exact value, term level.
    Term { field: String, value: Literal },
    /// Any of several exact values.
    Terms { field: String, values: Vec<Literal> },
    /// Full-text match on any analyzed token.
    Match { field: String, query: Literal },
    /// Full-text match on the whole phrase.
    MatchPhrase { field: String, query: Literal },
    Range { field: String, bounds: RangeBounds },
    /// `*` matches any run of characters, `?` one character.
    Wildcard { field: String, pattern: String },
    Exists { field: String },
    Bool(BoolQuery),
}

impl Query {
    /// `bool.must_not` around one clause.
    pub fn must_not(inner: Query) -> Query {
        Query::Bool(BoolQuery {
            must_not: vec![inner],
            ..BoolQuery::default()
        })
    }

    /// Documents without any value for `field`.
    pub fn missing(field: impl Into<String>) -> Query {
        Query::must_not(Query::Exists {
            field: field.into(),
        })
    }

    /// True when the clause contributes to relevance scoring.
    ///
    /// Only full-text matches score by themselves; a `bool` scores when one
    /// of its `must` or `should` clauses does.
    pub fn is_scored(&self) -> bool {
        match self {
            Query::Match { .. } | Query::MatchPhrase { .. } => true,
            Query::Bool(b) => b.must.iter().chain(&b.should).any(Query::is_scored),
            _ => false,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Query::MatchAll => json!({ "match_all": {} }),
            Query::Term { field, value } => json!({ "term": { field: value.to_json() } }),
            Query::Terms { field, values } => {
                let list: Vec<Value> = values.iter().map(Literal::to_json).collect();
                json!({ "terms": { field: list } })
            }
            Query::Match { field, query } => {
                json!({ "match": { field: { "query": query.to_json() } } })
            }
            Query::MatchPhrase { field, query } => {
                json!({ "match_phrase": { field: { "query": query.to_json() } } })
            }
            Query::Range { field, bounds } => json!({ "range": { field: bounds.to_json() } }),
            Query::Wildcard { field, pattern } => {
                json!({ "wildcard": { field: { "value": pattern } } })
            }
            Query::Exists { field } => json!({ "exists": { "field": field } }),
            Query::Bool(b) => json!({ "bool": b.to_json() }),
        }
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_json() {
        let q = Query::Term {
            field: "gender".to_string(),
            value: Literal::Str("M".to_string()),
        };
        assert_eq!(q.to_json(), json!({ "term": { "gender": "M" } }));
    }

    #[test]
    fn test_range_omits_unset_bounds() {
        let q = Query::Range {
            field: "age".to_string(),
            bounds: RangeBounds {
                gt: Some(Literal::Int(25)),
                ..RangeBounds::default()
            },
        };
        assert_eq!(q.to_json(), json!({ "range": { "age": { "gt": 25 } } }));
    }

    #[test]
    fn test_bool_omits_empty_sections() {
        let q = Query::missing("email");
        assert_eq!(
            q.to_json(),
            json!({ "bool": { "must_not": [ { "exists": { "field": "email" } } ] } })
        );
    }

    #[test]
    fn test_scoring_classification() {
        let text = Query::Match {
            field: "city".to_string(),
            query: Literal::Str("Nogal".to_string()),
        };
        let exact = Query::Exists {
            field: "city".to_string(),
        };
        assert!(text.is_scored());
        assert!(!exact.is_scored());
        assert!(!Query::must_not(text.clone()).is_scored());
        assert!(
            Query::Bool(BoolQuery {
                should: vec![exact.clone(), text],
                ..BoolQuery::default()
            })
            .is_scored()
        );
        assert!(
            !Query::Bool(BoolQuery {
                filter: vec![exact],
                ..BoolQuery::default()
            })
            .is_scored()
        );
    }

    #[test]
    fn test_serialize_matches_to_json() {
        let q = Query::MatchAll;
        assert_eq!(serde_json::to_value(&q).unwrap(), q.to_json());
    }
}
