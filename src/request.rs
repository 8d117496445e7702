//! Request assembly.
//!
//! Combines the compiled WHERE clause with the projection, targets, sort and
//! result window of a [`SelectStatement`] into the search request handed to
//! the backend.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::ast::{AggFunc, Literal, OrderBy, SelectItem, SelectStatement, Source};
use crate::dsl::{BoolQuery, Query};
use crate::error::{SqlesError, SqlesResult};
use crate::transpiler::{CompiledPredicate, SemanticNote};

/// Which document fields come back with each hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SourceFilter {
    /// `SELECT *`: whole documents.
    All,
    /// `SELECT a, b`: only these fields.
    Fields(Vec<String>),
    /// Aggregate requests fetch no documents.
    None,
}

/// One named aggregation of an aggregate-only request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationSpec {
    /// Key in the response, e.g. `COUNT(*)`.
    pub name: String,
    pub func: AggFunc,
    pub field: String,
}

impl AggregationSpec {
    fn to_json(&self) -> Value {
        let kind = match self.func {
            AggFunc::Count => "value_count",
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
        };
        json!({ kind: { "field": self.field } })
    }
}

/// A complete search request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub targets: Vec<Source>,
    pub query: Query,
    pub source: SourceFilter,
    pub sort: Vec<OrderBy>,
    /// Result window size. `None` leaves the backend default in place.
    pub size: Option<u64>,
    pub from: Option<u64>,
    pub aggregations: Vec<AggregationSpec>,
    #[serde(skip)]
    pub notes: Vec<SemanticNote>,
}

impl CompiledQuery {
    pub fn is_aggregate_only(&self) -> bool {
        !self.aggregations.is_empty()
    }

    /// Targets as comma-joined `index/type` pairs, e.g. `doc/accounts,bank/doc`.
    pub fn targets_string(&self) -> String {
        self.targets
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Distinct index names, in FROM order.
    pub fn indices(&self) -> Vec<&str> {
        distinct(self.targets.iter().map(|t| t.index.as_str()))
    }

    /// Distinct type names, in FROM order.
    pub fn doc_types(&self) -> Vec<&str> {
        distinct(self.targets.iter().filter_map(|t| t.doc_type.as_deref()))
    }

    /// URL path of the search endpoint.
    ///
    /// Types appear in the path only when every index is paired with every
    /// type (`a/x,b/x` gives `a,b/x/_search`). Any other mix addresses the
    /// indices alone and the root query narrows the types instead.
    pub fn search_path(&self) -> String {
        let indices = self.indices().join(",");
        if types_in_path(&self.targets) {
            format!("{}/{}/_search", indices, self.doc_types().join(","))
        } else {
            format!("{}/_search", indices)
        }
    }

    /// JSON request body.
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".to_string(), self.query.to_json());

        if let SourceFilter::Fields(fields) = &self.source {
            body.insert("_source".to_string(), json!(fields));
        }

        if !self.sort.is_empty() {
            let sort: Vec<Value> = self
                .sort
                .iter()
                .map(|key| json!({ key.field.as_str(): { "order": key.direction.as_str() } }))
                .collect();
            body.insert("sort".to_string(), Value::Array(sort));
        }

        if let Some(size) = self.size {
            body.insert("size".to_string(), Value::from(size));
        }
        if let Some(from) = self.from {
            body.insert("from".to_string(), Value::from(from));
        }

        if !self.aggregations.is_empty() {
            let aggs: Map<String, Value> = self
                .aggregations
                .iter()
                .map(|agg| (agg.name.clone(), agg.to_json()))
                .collect();
            body.insert("aggs".to_string(), Value::Object(aggs));
        }

        Value::Object(body)
    }
}

/// Build the search request for a parsed statement and its compiled predicate.
pub fn assemble(
    stmt: &SelectStatement,
    predicate: Option<CompiledPredicate>,
) -> SqlesResult<CompiledQuery> {
    let (mut query, notes) = match predicate {
        Some(p) => (into_root(p.query), p.notes),
        None => (Query::MatchAll, Vec::new()),
    };
    if let Some(targets) = target_filter(&stmt.sources) {
        query = restrict(query, targets);
    }

    let mut fields = Vec::new();
    let mut aggregations: Vec<AggregationSpec> = Vec::new();
    for item in &stmt.projection {
        match item {
            SelectItem::Star => {}
            SelectItem::Field(name) => fields.push(name.clone()),
            SelectItem::Aggregate(agg) => {
                let name = agg.to_string();
                if aggregations.iter().all(|a| a.name != name) {
                    aggregations.push(AggregationSpec {
                        name,
                        func: agg.func,
                        field: agg.field.clone().unwrap_or_else(|| "_index".to_string()),
                    });
                }
            }
        }
    }

    if stmt.is_aggregate() {
        if !fields.is_empty() {
            return Err(SqlesError::unsupported(format!(
                "cannot select fields ({}) together with aggregates",
                fields.join(", ")
            )));
        }

        return Ok(CompiledQuery {
            targets: stmt.sources.clone(),
            query,
            source: SourceFilter::None,
            sort: Vec::new(),
            size: Some(0),
            from: None,
            aggregations,
            notes,
        });
    }

    let source = if fields.is_empty() {
        SourceFilter::All
    } else {
        SourceFilter::Fields(fields)
    };

    Ok(CompiledQuery {
        targets: stmt.sources.clone(),
        query,
        source,
        sort: stmt.order_by.clone(),
        size: stmt.limit,
        from: stmt.offset,
        aggregations,
        notes,
    })
}

/// Top-level clause. Non-scoring predicates run in filter context.
fn into_root(query: Query) -> Query {
    match query {
        q if q.is_scored() => q,
        Query::Bool(b) if b.must.is_empty() && b.should.is_empty() => Query::Bool(b),
        q => Query::Bool(BoolQuery {
            filter: vec![q],
            ..BoolQuery::default()
        }),
    }
}

/// True when the FROM pairs are exactly indices x types, all typed.
fn types_in_path(targets: &[Source]) -> bool {
    if targets.iter().any(|t| t.doc_type.is_none()) {
        return false;
    }
    let indices = distinct(targets.iter().map(|t| t.index.as_str()));
    let types = distinct(targets.iter().filter_map(|t| t.doc_type.as_deref()));
    let pairs = distinct_pairs(targets);
    pairs.len() == indices.len() * types.len()
}

/// Clause selecting exactly the FROM pairs, when the path cannot.
fn target_filter(targets: &[Source]) -> Option<Query> {
    let has_types = targets.iter().any(|t| t.doc_type.is_some());
    if !has_types || types_in_path(targets) {
        return None;
    }

    let should = distinct_pairs(targets)
        .into_iter()
        .map(|(index, doc_type)| {
            let index = term("_index", index);
            match doc_type {
                Some(t) => Query::Bool(BoolQuery {
                    filter: vec![index, term("_type", t)],
                    ..BoolQuery::default()
                }),
                None => index,
            }
        })
        .collect();

    Some(Query::Bool(BoolQuery {
        should,
        minimum_should_match: Some(1),
        ..BoolQuery::default()
    }))
}

fn term(field: &str, value: &str) -> Query {
    Query::Term {
        field: field.to_string(),
        value: Literal::Str(value.to_string()),
    }
}

/// Add a non-scoring condition to the root clause.
fn restrict(query: Query, condition: Query) -> Query {
    match query {
        Query::MatchAll => Query::Bool(BoolQuery {
            filter: vec![condition],
            ..BoolQuery::default()
        }),
        Query::Bool(mut b) if b.should.is_empty() => {
            b.filter.push(condition);
            Query::Bool(b)
        }
        q if q.is_scored() => Query::Bool(BoolQuery {
            must: vec![q],
            filter: vec![condition],
            ..BoolQuery::default()
        }),
        q => Query::Bool(BoolQuery {
            filter: vec![q, condition],
            ..BoolQuery::default()
        }),
    }
}

fn distinct_pairs(targets: &[Source]) -> Vec<(&str, Option<&str>)> {
    let mut out: Vec<(&str, Option<&str>)> = Vec::new();
    for t in targets {
        let pair = (t.index.as_str(), t.doc_type.as_deref());
        if !out.contains(&pair) {
            out.push(pair);
        }
    }
    out
}

fn distinct<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
