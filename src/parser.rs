//! Recursive-descent parser for the SQL subset.
//!
//! # Grammar
//!
//! ```text
//! statement  := SELECT projection FROM sources [WHERE or_expr]
//!               [ORDER BY order (, order)*] [LIMIT n [, n]] [;]
//! projection := * | item (, item)*
//! item       := ident | FUNC ( * | ident )
//! sources    := ident [/ ident] (, ident [/ ident])*
//! or_expr    := and_expr (OR and_expr)*
//! and_expr   := not_expr (AND not_expr)*
//! not_expr   := NOT not_expr | primary
//! primary    := ( or_expr ) | predicate
//! predicate  := ident op value | literal op ident
//!             | ident [NOT] BETWEEN literal AND literal
//!             | ident [NOT] IN ( literal (, literal)* )
//!             | ident [NOT] LIKE string
//!             | ident IS [NOT] (MISS | NULL)
//! ```
//!
//! `OR` binds loosest, then `AND`, then `NOT`; parentheses bind tightest.
//! A run of the same connective collapses into one n-ary node.

use crate::ast::*;
use crate::error::{SqlesError, SqlesResult};
use crate::lexer::{tokenize, Keyword, Token, TokenKind};

/// Parse query text into a statement.
pub fn parse(input: &str) -> SqlesResult<SelectStatement> {
    let tokens = tokenize(input)?;
    let stmt = Parser::new(&tokens, input.len()).parse_statement()?;
    tracing::debug!("Parsed statement: {}", stmt);
    Ok(stmt)
}

/// Parse an already tokenized query.
pub fn parse_tokens(tokens: &[Token]) -> SqlesResult<SelectStatement> {
    let end = tokens
        .last()
        .map(|t| t.position + t.text.len())
        .unwrap_or(0);
    Parser::new(tokens, end).parse_statement()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    /// Offset reported for errors at end of input.
    end: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, expected: impl Into<String>) -> SqlesError {
        match self.peek() {
            Some(tok) => SqlesError::syntax(tok.position, expected, tok.describe()),
            None => SqlesError::syntax(self.end, expected, "end of input"),
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        self.eat(TokenKind::Keyword(kw))
    }

    fn expect(&mut self, kind: TokenKind) -> SqlesResult<&'a Token> {
        if self.check(kind) {
            self.advance().ok_or_else(|| self.error(kind.to_string()))
        } else {
            Err(self.error(kind.to_string()))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> SqlesResult<()> {
        self.expect(TokenKind::Keyword(kw)).map(|_| ())
    }

    fn expect_identifier(&mut self, what: &str) -> SqlesResult<String> {
        if self.check(TokenKind::Identifier) {
            Ok(self.advance().map(|t| t.text.clone()).unwrap_or_default())
        } else {
            Err(self.error(what))
        }
    }

    // ========================================================================
    // Statement
    // ========================================================================

    fn parse_statement(&mut self) -> SqlesResult<SelectStatement> {
        self.expect_keyword(Keyword::Select)?;
        let projection = self.parse_projection()?;

        self.expect_keyword(Keyword::From)?;
        let sources = self.parse_sources()?;

        let predicate = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_or()?)
        } else {
            None
        };

        let order_by = if self.eat_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            self.parse_order_by()?
        } else {
            Vec::new()
        };

        let (offset, limit) = if self.eat_keyword(Keyword::Limit) {
            let first = self.parse_count()?;
            if self.eat(TokenKind::Comma) {
                (Some(first), Some(self.parse_count()?))
            } else {
                (None, Some(first))
            }
        } else {
            (None, None)
        };

        self.eat(TokenKind::Semicolon);
        if self.peek().is_some() {
            return Err(self.error("end of input"));
        }

        Ok(SelectStatement {
            projection,
            sources,
            predicate,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_projection(&mut self) -> SqlesResult<Vec<SelectItem>> {
        if self.eat(TokenKind::Star) {
            return Ok(vec![SelectItem::Star]);
        }

        let mut items = vec![self.parse_select_item()?];
        while self.eat(TokenKind::Comma) {
            items.push(self.parse_select_item()?);
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> SqlesResult<SelectItem> {
        let start = self.pos;
        let name = self.expect_identifier("'*', field name or aggregate")?;
        if !self.eat(TokenKind::LParen) {
            return Ok(SelectItem::Field(name));
        }

        let Some(func) = AggFunc::from_name(&name) else {
            self.pos = start;
            return Err(self.error("aggregate function (COUNT, SUM, AVG, MIN, MAX)"));
        };

        let field = if self.eat(TokenKind::Star) {
            None
        } else {
            Some(self.expect_identifier("'*' or field name")?)
        };
        self.expect(TokenKind::RParen)?;

        if field.is_none() && func != AggFunc::Count {
            self.pos = start;
            return Err(self.error(format!("field name inside {}()", func)));
        }

        Ok(SelectItem::Aggregate(Aggregate { func, field }))
    }

    fn parse_sources(&mut self) -> SqlesResult<Vec<Source>> {
        let mut sources = vec![self.parse_source()?];
        while self.eat(TokenKind::Comma) {
            sources.push(self.parse_source()?);
        }
        Ok(sources)
    }

    fn parse_source(&mut self) -> SqlesResult<Source> {
        let index = self.expect_identifier("index name")?;
        let doc_type = if self.eat(TokenKind::Slash) {
            Some(self.expect_identifier("type name")?)
        } else {
            None
        };
        Ok(Source { index, doc_type })
    }

    fn parse_order_by(&mut self) -> SqlesResult<Vec<OrderBy>> {
        let mut keys = Vec::new();
        loop {
            let field = self.expect_identifier("sort field")?;
            let direction = if self.eat_keyword(Keyword::Desc) {
                SortDirection::Desc
            } else {
                self.eat_keyword(Keyword::Asc);
                SortDirection::Asc
            };
            keys.push(OrderBy { field, direction });

            if !self.eat(TokenKind::Comma) {
                return Ok(keys);
            }
        }
    }

    /// Non-negative integer for LIMIT.
    fn parse_count(&mut self) -> SqlesResult<u64> {
        let expected = "non-negative integer";
        match self.peek() {
            Some(tok) if tok.kind == TokenKind::Number => match tok.text.parse::<u64>() {
                Ok(n) => {
                    self.pos += 1;
                    Ok(n)
                }
                Err(_) => Err(self.error(expected)),
            },
            _ => Err(self.error(expected)),
        }
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    fn parse_or(&mut self) -> SqlesResult<Expression> {
        let mut children = vec![self.parse_and()?];
        while self.eat_keyword(Keyword::Or) {
            children.push(self.parse_and()?);
        }
        Ok(collapse(LogicalOp::Or, children))
    }

    fn parse_and(&mut self) -> SqlesResult<Expression> {
        let mut children = vec![self.parse_not()?];
        while self.eat_keyword(Keyword::And) {
            children.push(self.parse_not()?);
        }
        Ok(collapse(LogicalOp::And, children))
    }

    fn parse_not(&mut self) -> SqlesResult<Expression> {
        if self.eat_keyword(Keyword::Not) {
            return Ok(Expression::not(self.parse_not()?));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> SqlesResult<Expression> {
        if self.eat(TokenKind::LParen) {
            let inner = self.parse_or()?;
            self.expect(TokenKind::RParen)?;
            return Ok(inner);
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> SqlesResult<Expression> {
        let Some(tok) = self.peek() else {
            return Err(self.error("predicate"));
        };

        if tok.kind == TokenKind::Identifier {
            self.pos += 1;
            return self.parse_field_predicate(tok.text.clone());
        }

        // `25 < age` reads as `age > 25`
        let literal = self.parse_literal("field name, literal or '('")?;
        let op = self.parse_operator()?;
        let field = self.expect_identifier("field name")?;
        Ok(Expression::compare(field, op.flip(), literal))
    }

    fn parse_field_predicate(&mut self, field: String) -> SqlesResult<Expression> {
        let expected = "comparison operator, BETWEEN, IN, LIKE or IS";
        let Some(tok) = self.peek() else {
            return Err(self.error(expected));
        };

        match tok.kind {
            TokenKind::Operator(op) => {
                self.pos += 1;
                let value = if self.check(TokenKind::Identifier) {
                    Expression::FieldRef(self.expect_identifier("value")?)
                } else {
                    Expression::Literal(self.parse_literal("literal value or field name")?)
                };
                Ok(Expression::Comparison {
                    op,
                    field,
                    value: Box::new(value),
                })
            }
            TokenKind::Keyword(Keyword::Not) => {
                self.pos += 1;
                if self.eat_keyword(Keyword::Between) {
                    self.parse_between(field, true)
                } else if self.eat_keyword(Keyword::In) {
                    self.parse_in(field, true)
                } else if self.eat_keyword(Keyword::Like) {
                    Ok(Expression::not(self.parse_like(field)?))
                } else {
                    Err(self.error("BETWEEN, IN or LIKE after NOT"))
                }
            }
            TokenKind::Keyword(Keyword::Between) => {
                self.pos += 1;
                self.parse_between(field, false)
            }
            TokenKind::Keyword(Keyword::In) => {
                self.pos += 1;
                self.parse_in(field, false)
            }
            TokenKind::Keyword(Keyword::Like) => {
                self.pos += 1;
                self.parse_like(field)
            }
            TokenKind::Keyword(Keyword::Is) => {
                self.pos += 1;
                let has_not = self.eat_keyword(Keyword::Not);
                if !(self.eat_keyword(Keyword::Miss) || self.eat_keyword(Keyword::Null)) {
                    return Err(self.error("MISS or NULL"));
                }
                Ok(Expression::Exists {
                    field,
                    negated: !has_not,
                })
            }
            _ => Err(self.error(expected)),
        }
    }

    fn parse_between(&mut self, field: String, negated: bool) -> SqlesResult<Expression> {
        let low = self.parse_literal("lower bound")?;
        self.expect_keyword(Keyword::And)?;
        let high = self.parse_literal("upper bound")?;
        Ok(Expression::Between {
            field,
            low,
            high,
            negated,
        })
    }

    fn parse_in(&mut self, field: String, negated: bool) -> SqlesResult<Expression> {
        self.expect(TokenKind::LParen)?;
        let mut values = vec![self.parse_literal("literal value")?];
        while self.eat(TokenKind::Comma) {
            values.push(self.parse_literal("literal value")?);
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expression::InSet {
            field,
            values,
            negated,
        })
    }

    fn parse_like(&mut self, field: String) -> SqlesResult<Expression> {
        let pattern = self.expect(TokenKind::String)?.text.clone();
        Ok(Expression::Like { field, pattern })
    }

    fn parse_operator(&mut self) -> SqlesResult<CmpOp> {
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::Operator(op)) => {
                self.pos += 1;
                Ok(op)
            }
            _ => Err(self.error("comparison operator")),
        }
    }

    fn parse_literal(&mut self, expected: &str) -> SqlesResult<Literal> {
        let Some(tok) = self.peek() else {
            return Err(self.error(expected));
        };

        let literal = match tok.kind {
            TokenKind::String => Literal::Str(tok.text.clone()),
            TokenKind::Keyword(Keyword::True) => Literal::Bool(true),
            TokenKind::Keyword(Keyword::False) => Literal::Bool(false),
            TokenKind::Number if tok.text.contains('.') => match tok.text.parse::<f64>() {
                Ok(n) => Literal::Float(n),
                Err(_) => return Err(self.error("decimal number")),
            },
            TokenKind::Number => match tok.text.parse::<i64>() {
                Ok(n) => Literal::Int(n),
                Err(_) => return Err(self.error("integer within 64-bit range")),
            },
            _ => return Err(self.error(expected)),
        };

        self.pos += 1;
        Ok(literal)
    }
}

/// Single children stand alone; runs become one n-ary node.
fn collapse(op: LogicalOp, mut children: Vec<Expression>) -> Expression {
    if children.len() == 1 {
        children.remove(0)
    } else {
        Expression::Logical { op, children }
    }
}
