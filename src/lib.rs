//! # sqles: SQL in, search queries out
//!
//! sqles compiles a small SQL dialect into the boolean query DSL of
//! Elasticsearch-compatible search engines.
//!
//! ## Quick Example
//!
//! ```rust
//! use sqles::prelude::*;
//!
//! let schema = Schema::new().with("age", FieldType::Numeric);
//! let request = sqles::compile(
//!     "SELECT firstname FROM bank/account WHERE age BETWEEN 27 AND 30 LIMIT 10",
//!     &schema,
//! )?;
//!
//! assert_eq!(request.search_path(), "bank/account/_search");
//! assert_eq!(request.body()["size"], 10);
//! # Ok::<(), SqlesError>(())
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | text to tokens | [`lexer`] |
//! | tokens to [`SelectStatement`](ast::SelectStatement) | [`parser`] |
//! | field name to [`FieldType`](schema::FieldType) | [`schema`] |
//! | WHERE tree to [`Query`](dsl::Query) | [`transpiler`] |
//! | statement + query to [`CompiledQuery`](request::CompiledQuery) | [`request`] |
//!
//! [`engine`] runs the result against a server; [`config`] loads settings
//! for the command-line tool.

pub mod ast;
pub mod config;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod request;
pub mod schema;
pub mod transpiler;

use std::sync::Arc;

use crate::error::SqlesResult;
use crate::request::CompiledQuery;
use crate::schema::{DefaultResolver, FieldTypeResolver};
use crate::transpiler::{CompileOptions, PredicateCompiler};

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::dsl::{BoolQuery, Query, RangeBounds};
    pub use crate::engine::{HttpBackend, SearchBackend, SearchResponse};
    pub use crate::error::*;
    pub use crate::parser::parse;
    pub use crate::request::{CompiledQuery, SourceFilter};
    pub use crate::schema::{DefaultResolver, FieldType, FieldTypeResolver, Schema};
    pub use crate::transpiler::{CompileOptions, NegationMode, SemanticNote, TextEquality};
    pub use crate::Compiler;
}

/// Parse SQL text into a statement.
///
/// # Example
///
/// ```
/// use sqles::parse;
///
/// let stmt = parse("SELECT * FROM bank WHERE age > 25").unwrap();
/// assert_eq!(stmt.sources[0].index, "bank");
/// ```
pub fn parse(input: &str) -> SqlesResult<ast::SelectStatement> {
    parser::parse(input)
}

/// Compile SQL text with default options.
pub fn compile(input: &str, resolver: &dyn FieldTypeResolver) -> SqlesResult<CompiledQuery> {
    compile_with(input, resolver, CompileOptions::default())
}

fn compile_with(
    input: &str,
    resolver: &dyn FieldTypeResolver,
    options: CompileOptions,
) -> SqlesResult<CompiledQuery> {
    let stmt = parser::parse(input)?;
    let predicate = stmt
        .predicate
        .as_ref()
        .map(|expr| PredicateCompiler::new(resolver, options).compile(expr))
        .transpose()?;
    let compiled = request::assemble(&stmt, predicate)?;
    tracing::debug!(
        "Compiled request for {}: {}",
        compiled.targets_string(),
        compiled.body()
    );
    Ok(compiled)
}

/// Reusable compiler holding a resolver and options.
///
/// Compiling takes `&self` and keeps no state between calls, so one
/// `Compiler` can be shared by any number of threads.
#[derive(Clone)]
pub struct Compiler {
    resolver: Arc<dyn FieldTypeResolver>,
    options: CompileOptions,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(DefaultResolver)
    }
}

impl Compiler {
    pub fn new(resolver: impl FieldTypeResolver + 'static) -> Self {
        Self {
            resolver: Arc::new(resolver),
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> CompileOptions {
        self.options
    }

    pub fn compile(&self, input: &str) -> SqlesResult<CompiledQuery> {
        compile_with(input, self.resolver.as_ref(), self.options)
    }
}
