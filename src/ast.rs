//! Abstract syntax tree for the supported SQL subset.
//!
//! A parsed query is one [`SelectStatement`]. Its WHERE clause is an owned
//! [`Expression`] tree; logical nodes own their children, so the tree has no
//! sharing and no cycles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    /// The operator that gives the same result with its operands swapped,
    /// so `25 < age` can be read as `age > 25`.
    pub fn flip(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Gte => CmpOp::Lte,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Lte => CmpOp::Gte,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
        };
        write!(f, "{}", s)
    }
}

/// Type inferred for a literal from its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralType {
    Integer,
    Decimal,
    String,
    Boolean,
}

impl LiteralType {
    pub fn is_numeric(self) -> bool {
        matches!(self, LiteralType::Integer | LiteralType::Decimal)
    }
}

/// A literal value written in the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Literal {
    pub fn inferred_type(&self) -> LiteralType {
        match self {
            Literal::Int(_) => LiteralType::Integer,
            Literal::Float(_) => LiteralType::Decimal,
            Literal::Str(_) => LiteralType::String,
            Literal::Bool(_) => LiteralType::Boolean,
        }
    }

    /// JSON form placed into the query body.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::Int(n) => serde_json::Value::from(*n),
            Literal::Float(n) => serde_json::Value::from(*n),
            Literal::Str(s) => serde_json::Value::from(s.as_str()),
            Literal::Bool(b) => serde_json::Value::from(*b),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{}", n),
            Literal::Str(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Boolean connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "AND"),
            LogicalOp::Or => write!(f, "OR"),
            LogicalOp::Not => write!(f, "NOT"),
        }
    }
}

/// WHERE clause expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(Literal),
    FieldRef(String),
    /// `field op value`. `value` is a literal or, for field-to-field
    /// comparisons, a field reference.
    Comparison {
        op: CmpOp,
        field: String,
        value: Box<Expression>,
    },
    Between {
        field: String,
        low: Literal,
        high: Literal,
        negated: bool,
    },
    InSet {
        field: String,
        values: Vec<Literal>,
        negated: bool,
    },
    Like {
        field: String,
        pattern: String,
    },
    /// `IS NOT MISS` when `negated` is false, `IS MISS` when true.
    Exists {
        field: String,
        negated: bool,
    },
    Logical {
        op: LogicalOp,
        children: Vec<Expression>,
    },
}

impl Expression {
    pub fn and(children: Vec<Expression>) -> Self {
        Expression::Logical {
            op: LogicalOp::And,
            children,
        }
    }

    pub fn or(children: Vec<Expression>) -> Self {
        Expression::Logical {
            op: LogicalOp::Or,
            children,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Expression) -> Self {
        Expression::Logical {
            op: LogicalOp::Not,
            children: vec![child],
        }
    }

    pub fn compare(field: impl Into<String>, op: CmpOp, value: Literal) -> Self {
        Expression::Comparison {
            op,
            field: field.into(),
            value: Box::new(Expression::Literal(value)),
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Logical {
                op: LogicalOp::And | LogicalOp::Or,
                ..
            } => write!(f, "({})", self),
            _ => write!(f, "{}", self),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(lit) => write!(f, "{}", lit),
            Expression::FieldRef(name) => write!(f, "{}", name),
            Expression::Comparison { op, field, value } => {
                write!(f, "{} {} {}", field, op, value)
            }
            Expression::Between {
                field,
                low,
                high,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}BETWEEN {} AND {}", field, not, low, high)
            }
            Expression::InSet {
                field,
                values,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                let list: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} {}IN ({})", field, not, list.join(", "))
            }
            Expression::Like { field, pattern } => {
                write!(f, "{} LIKE {}", field, Literal::Str(pattern.clone()))
            }
            Expression::Exists { field, negated } => {
                if *negated {
                    write!(f, "{} IS MISS", field)
                } else {
                    write!(f, "{} IS NOT MISS", field)
                }
            }
            Expression::Logical { op, children } => match op {
                LogicalOp::Not => {
                    write!(f, "NOT ")?;
                    match children.first() {
                        Some(child) => child.fmt_child(f),
                        None => Ok(()),
                    }
                }
                LogicalOp::And | LogicalOp::Or => {
                    for (i, child) in children.iter().enumerate() {
                        if i > 0 {
                            write!(f, " {} ", op)?;
                        }
                        child.fmt_child(f)?;
                    }
                    Ok(())
                }
            },
        }
    }
}

/// Aggregate function allowed in the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    pub fn from_name(name: &str) -> Option<AggFunc> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggFunc::Count),
            "SUM" => Some(AggFunc::Sum),
            "AVG" => Some(AggFunc::Avg),
            "MIN" => Some(AggFunc::Min),
            "MAX" => Some(AggFunc::Max),
            _ => None,
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
        };
        write!(f, "{}", s)
    }
}

/// `FUNC(field)` or `FUNC(*)` in the projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub func: AggFunc,
    /// `None` for `*`.
    pub field: Option<String>,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}({})", self.func, field),
            None => write!(f, "{}(*)", self.func),
        }
    }
}

/// One entry of the SELECT list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectItem {
    Star,
    Field(String),
    Aggregate(Aggregate),
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectItem::Star => write!(f, "*"),
            SelectItem::Field(name) => write!(f, "{}", name),
            SelectItem::Aggregate(agg) => write!(f, "{}", agg),
        }
    }
}

/// One `index[/type]` entry of the FROM clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub index: String,
    pub doc_type: Option<String>,
}

impl Source {
    pub fn new(index: impl Into<String>, doc_type: Option<&str>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.map(str::to_string),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.doc_type {
            Some(t) => write!(f, "{}/{}", self.index, t),
            None => write!(f, "{}", self.index),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One `field [ASC|DESC]` entry of ORDER BY.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// A parsed SELECT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    pub projection: Vec<SelectItem>,
    pub sources: Vec<Source>,
    pub predicate: Option<Expression>,
    pub order_by: Vec<OrderBy>,
    /// Result window size. Only the request assembler reads this.
    pub limit: Option<u64>,
    /// Result window start, from `LIMIT offset, count`.
    pub offset: Option<u64>,
}

impl SelectStatement {
    /// True when the projection contains any aggregate.
    pub fn is_aggregate(&self) -> bool {
        self.projection
            .iter()
            .any(|item| matches!(item, SelectItem::Aggregate(_)))
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.projection.iter().map(|i| i.to_string()).collect();
        let sources: Vec<String> = self.sources.iter().map(|s| s.to_string()).collect();
        write!(f, "SELECT {} FROM {}", items.join(", "), sources.join(","))?;

        if let Some(pred) = &self.predicate {
            write!(f, " WHERE {}", pred)?;
        }

        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|o| match o.direction {
                    SortDirection::Asc => o.field.clone(),
                    SortDirection::Desc => format!("{} DESC", o.field),
                })
                .collect();
            write!(f, " ORDER BY {}", keys.join(", "))?;
        }

        match (self.offset, self.limit) {
            (Some(offset), Some(limit)) => write!(f, " LIMIT {}, {}", offset, limit),
            (None, Some(limit)) => write!(f, " LIMIT {}", limit),
            _ => Ok(()),
        }
    }
}
