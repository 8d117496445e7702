//! Predicate compiler: WHERE expression to query DSL.
//!
//! Each leaf predicate becomes one clause whose kind depends on the field
//! type the resolver reports. Logical nodes merge their children into a
//! `bool` clause, keeping scored children in `must` and non-scoring ones in
//! `filter`, so full-text and exact predicates mix freely.
//!
//! Two behaviours are kept on purpose and surfaced as [`SemanticNote`]s:
//!
//! - Every negation (`NOT`, `NOT BETWEEN`, `NOT IN`, `NOT LIKE`, `!=`) is a
//!   `must_not` around the positive clause, so documents without the field
//!   pass it. [`NegationMode::RequireField`] adds an existence check on each
//!   negated field instead.
//! - `=` and `IN` on analyzed text are `match_phrase` queries, which also hit
//!   values that merely contain the phrase. [`TextEquality::Match`] loosens
//!   this further to any shared token.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{CmpOp, Expression, Literal, LiteralType, LogicalOp};
use crate::dsl::{BoolQuery, Query, RangeBounds};
use crate::error::{SqlesError, SqlesResult};
use crate::schema::{FieldType, FieldTypeResolver};

/// How negated predicates treat documents missing the field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegationMode {
    /// Plain `must_not`; documents missing the field match.
    #[default]
    MustNot,
    /// `must_not` plus an `exists` filter on the field.
    RequireField,
}

/// Clause used for `=` and `IN` on analyzed text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEquality {
    /// `match_phrase`: all tokens, in order.
    #[default]
    #[serde(rename = "match_phrase")]
    Phrase,
    /// `match`: any analyzed token.
    Match,
}

/// Knobs for the two contractual quirks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub negation: NegationMode,
    pub text_equality: TextEquality,
}

/// A place where the compiled query may not mean what the SQL suggests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticNote {
    /// A negated predicate on `field` also matches documents lacking it.
    MissingFieldPassThrough { field: String },
    /// Equality on analyzed `field` also matches longer values containing
    /// the phrase (or, with [`TextEquality::Match`], any shared token).
    AnalyzedEquality { field: String },
}

impl fmt::Display for SemanticNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticNote::MissingFieldPassThrough { field } => write!(
                f,
                "negated predicate on '{}' also matches documents without that field",
                field
            ),
            SemanticNote::AnalyzedEquality { field } => write!(
                f,
                "'{}' is analyzed text; equality also matches values that contain the given text",
                field
            ),
        }
    }
}

/// Output of the predicate compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    pub query: Query,
    pub notes: Vec<SemanticNote>,
}

/// Compile a predicate with default options.
pub fn compile_predicate(
    expr: &Expression,
    resolver: &dyn FieldTypeResolver,
) -> SqlesResult<Query> {
    PredicateCompiler::new(resolver, CompileOptions::default())
        .compile(expr)
        .map(|c| c.query)
}

/// Lowers [`Expression`] trees. One instance per compile call.
pub struct PredicateCompiler<'a> {
    resolver: &'a dyn FieldTypeResolver,
    options: CompileOptions,
    notes: Vec<SemanticNote>,
}

impl<'a> PredicateCompiler<'a> {
    pub fn new(resolver: &'a dyn FieldTypeResolver, options: CompileOptions) -> Self {
        Self {
            resolver,
            options,
            notes: Vec::new(),
        }
    }

    pub fn compile(mut self, expr: &Expression) -> SqlesResult<CompiledPredicate> {
        let query = self.lower(expr)?;
        Ok(CompiledPredicate {
            query,
            notes: self.notes,
        })
    }

    fn lower(&mut self, expr: &Expression) -> SqlesResult<Query> {
        match expr {
            Expression::Literal(lit) => Err(SqlesError::unsupported(format!(
                "literal {} is not a predicate",
                lit
            ))),
            Expression::FieldRef(field) => Err(SqlesError::unsupported(format!(
                "field '{}' alone is not a predicate; compare it or use IS NOT MISS",
                field
            ))),
            Expression::Comparison { op, field, value } => {
                let ty = self.resolve(field)?;
                let Expression::Literal(value) = value.as_ref() else {
                    return Err(SqlesError::unsupported(format!(
                        "{}: only literal values can be compared",
                        expr
                    )));
                };
                self.comparison(*op, field, ty, value)
            }
            Expression::Between {
                field,
                low,
                high,
                negated,
            } => {
                self.resolve(field)?;
                check_bounds(expr, low, high)?;
                let range = Query::Range {
                    field: field.clone(),
                    bounds: RangeBounds::closed(low.clone(), high.clone()),
                };
                Ok(if *negated {
                    self.negate(vec![field.clone()], range)
                } else {
                    range
                })
            }
            Expression::InSet {
                field,
                values,
                negated,
            } => {
                let ty = self.resolve(field)?;
                let set = self.membership(field, ty, values);
                Ok(if *negated {
                    self.negate(vec![field.clone()], set)
                } else {
                    set
                })
            }
            Expression::Like { field, pattern } => match self.resolve(field)? {
                ty @ (FieldType::Numeric | FieldType::Date) => Err(SqlesError::unsupported(
                    format!("{}: LIKE needs a text field, '{}' is {}", expr, field, ty),
                )),
                FieldType::Exact | FieldType::AnalyzedText => Ok(Query::Wildcard {
                    field: field.clone(),
                    pattern: like_to_wildcard(pattern),
                }),
            },
            Expression::Exists { field, negated } => {
                self.resolve(field)?;
                Ok(if *negated {
                    Query::missing(field.clone())
                } else {
                    Query::Exists {
                        field: field.clone(),
                    }
                })
            }
            Expression::Logical { op, children } => self.logical(*op, children),
        }
    }

    fn resolve(&self, field: &str) -> SqlesResult<FieldType> {
        self.resolver.resolve(field).map_err(|e| match e {
            SqlesError::SchemaResolution { .. } => e,
            other => SqlesError::schema(field, other.to_string()),
        })
    }

    fn comparison(
        &mut self,
        op: CmpOp,
        field: &str,
        ty: FieldType,
        value: &Literal,
    ) -> SqlesResult<Query> {
        let mut bounds = RangeBounds::default();
        match op {
            CmpOp::Eq => return Ok(self.equality(field, ty, value)),
            CmpOp::Ne => {
                let eq = self.equality(field, ty, value);
                return Ok(self.negate(vec![field.to_string()], eq));
            }
            _ if value.inferred_type() == LiteralType::Boolean => {
                return Err(SqlesError::unsupported(format!(
                    "{} {} {}: booleans have no order",
                    field, op, value
                )));
            }
            CmpOp::Gt => bounds.gt = Some(value.clone()),
            CmpOp::Gte => bounds.gte = Some(value.clone()),
            CmpOp::Lt => bounds.lt = Some(value.clone()),
            CmpOp::Lte => bounds.lte = Some(value.clone()),
        }
        Ok(Query::Range {
            field: field.to_string(),
            bounds,
        })
    }

    fn equality(&mut self, field: &str, ty: FieldType, value: &Literal) -> Query {
        match ty {
            FieldType::Exact | FieldType::Numeric | FieldType::Date => Query::Term {
                field: field.to_string(),
                value: value.clone(),
            },
            FieldType::AnalyzedText => self.text_match(field, value),
        }
    }

    fn text_match(&mut self, field: &str, value: &Literal) -> Query {
        self.note(SemanticNote::AnalyzedEquality {
            field: field.to_string(),
        });
        match self.options.text_equality {
            TextEquality::Phrase => Query::MatchPhrase {
                field: field.to_string(),
                query: value.clone(),
            },
            TextEquality::Match => Query::Match {
                field: field.to_string(),
                query: value.clone(),
            },
        }
    }

    /// `IN` list. Analyzed text has no single exact term to compare, so each
    /// value becomes its own text match.
    fn membership(&mut self, field: &str, ty: FieldType, values: &[Literal]) -> Query {
        match ty {
            FieldType::AnalyzedText => Query::Bool(BoolQuery {
                should: values.iter().map(|v| self.text_match(field, v)).collect(),
                minimum_should_match: Some(1),
                ..BoolQuery::default()
            }),
            FieldType::Exact | FieldType::Numeric | FieldType::Date => Query::Terms {
                field: field.to_string(),
                values: values.to_vec(),
            },
        }
    }

    /// Negation of a clause testing `fields`.
    fn negate(&mut self, fields: Vec<String>, positive: Query) -> Query {
        if fields.is_empty() {
            return Query::must_not(positive);
        }
        match self.options.negation {
            NegationMode::MustNot => {
                for field in fields {
                    self.note(SemanticNote::MissingFieldPassThrough { field });
                }
                Query::must_not(positive)
            }
            NegationMode::RequireField => Query::Bool(BoolQuery {
                filter: fields
                    .into_iter()
                    .map(|field| Query::Exists { field })
                    .collect(),
                must_not: vec![positive],
                ..BoolQuery::default()
            }),
        }
    }

    fn logical(&mut self, op: LogicalOp, children: &[Expression]) -> SqlesResult<Query> {
        match op {
            LogicalOp::Not => {
                let [child] = children else {
                    return Err(SqlesError::unsupported(format!(
                        "NOT takes exactly one operand, got {}",
                        children.len()
                    )));
                };
                let positive = self.lower(child)?;
                Ok(self.negate(tested_fields(child), positive))
            }
            LogicalOp::And | LogicalOp::Or => {
                if children.is_empty() {
                    return Err(SqlesError::unsupported(format!("{} with no operands", op)));
                }

                let mut bool_query = BoolQuery::default();
                for child in children {
                    let clause = self.lower(child)?;
                    match op {
                        LogicalOp::Or => bool_query.should.push(clause),
                        _ if clause.is_scored() => bool_query.must.push(clause),
                        _ => bool_query.filter.push(clause),
                    }
                }
                if op == LogicalOp::Or {
                    bool_query.minimum_should_match = Some(1);
                }
                Ok(Query::Bool(bool_query))
            }
        }
    }

    fn note(&mut self, note: SemanticNote) {
        if !self.notes.contains(&note) {
            tracing::debug!("{}", note);
            self.notes.push(note);
        }
    }
}

/// Fields whose values `expr` tests, in first-seen order.
///
/// Existence checks are left out: they already decide missing documents
/// explicitly, so negating them cannot let any through by accident.
fn tested_fields(expr: &Expression) -> Vec<String> {
    fn walk(expr: &Expression, out: &mut Vec<String>) {
        let field = match expr {
            Expression::Comparison { field, .. }
            | Expression::Between { field, .. }
            | Expression::InSet { field, .. }
            | Expression::Like { field, .. } => field,
            Expression::Logical { children, .. } => {
                for child in children {
                    walk(child, out);
                }
                return;
            }
            Expression::Exists { .. } | Expression::Literal(_) | Expression::FieldRef(_) => {
                return;
            }
        };
        if !out.contains(field) {
            out.push(field.clone());
        }
    }

    let mut out = Vec::new();
    walk(expr, &mut out);
    out
}

/// BETWEEN bounds must both be numbers or both be strings.
fn check_bounds(expr: &Expression, low: &Literal, high: &Literal) -> SqlesResult<()> {
    let (lt, ht) = (low.inferred_type(), high.inferred_type());
    if lt == LiteralType::Boolean || ht == LiteralType::Boolean {
        return Err(SqlesError::unsupported(format!("{}: booleans have no order", expr)));
    }
    if lt.is_numeric() != ht.is_numeric() {
        return Err(SqlesError::unsupported(format!(
            "{}: bounds must be of the same kind",
            expr
        )));
    }
    Ok(())
}

/// SQL LIKE pattern to wildcard pattern: `%` becomes `*`. Characters the
/// engine would read as wildcards or escapes are escaped.
pub fn like_to_wildcard(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '%' => out.push('*'),
            '*' | '?' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
