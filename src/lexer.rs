//! SQL tokenizer using nom.
//!
//! Splits query text into keywords, identifiers, literals, operators and
//! punctuation. Whitespace is skipped; every token remembers the byte offset
//! it started at so later stages can point back into the source.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while, take_while1},
    character::complete::{anychar, char, digit1},
    combinator::{cut, map, opt, recognize, value},
    multi::fold_many0,
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};

use crate::ast::CmpOp;
use crate::error::{SqlesError, SqlesResult};

/// Reserved words, matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    Between,
    In,
    Like,
    Is,
    Miss,
    Null,
    Order,
    By,
    Limit,
    Asc,
    Desc,
    True,
    False,
}

impl Keyword {
    const ALL: [(Keyword, &'static str); 19] = [
        (Keyword::Select, "SELECT"),
        (Keyword::From, "FROM"),
        (Keyword::Where, "WHERE"),
        (Keyword::And, "AND"),
        (Keyword::Or, "OR"),
        (Keyword::Not, "NOT"),
        (Keyword::Between, "BETWEEN"),
        (Keyword::In, "IN"),
        (Keyword::Like, "LIKE"),
        (Keyword::Is, "IS"),
        (Keyword::Miss, "MISS"),
        (Keyword::Null, "NULL"),
        (Keyword::Order, "ORDER"),
        (Keyword::By, "BY"),
        (Keyword::Limit, "LIMIT"),
        (Keyword::Asc, "ASC"),
        (Keyword::Desc, "DESC"),
        (Keyword::True, "TRUE"),
        (Keyword::False, "FALSE"),
    ];

    /// Look up a bare word, ignoring case.
    pub fn from_word(word: &str) -> Option<Keyword> {
        Self::ALL
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(word))
            .map(|(kw, _)| *kw)
    }

    pub fn as_str(&self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(kw, _)| kw == self)
            .map(|(_, name)| *name)
            .unwrap_or("?")
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lexical category of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    /// Bare or backtick-quoted name. Bare names may contain `.` and `-`.
    Identifier,
    /// Integer or decimal literal, optionally negative.
    Number,
    /// Single-quoted string; `text` holds the unquoted contents.
    String,
    Operator(CmpOp),
    Comma,
    LParen,
    RParen,
    Star,
    Slash,
    Semicolon,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(kw) => write!(f, "{}", kw),
            TokenKind::Identifier => write!(f, "identifier"),
            TokenKind::Number => write!(f, "number"),
            TokenKind::String => write!(f, "string literal"),
            TokenKind::Operator(op) => write!(f, "'{}'", op),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Semicolon => write!(f, "';'"),
        }
    }
}

/// A single lexical token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset of the first character in the query text.
    pub position: usize,
}

impl Token {
    /// Human readable form used in syntax errors.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Keyword(kw) => kw.to_string(),
            _ => format!("'{}'", self.text),
        }
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        self.kind == TokenKind::Keyword(kw)
    }
}

/// Split query text into tokens.
///
/// Fails on an unterminated string or quoted identifier, and on any
/// character that cannot start a token.
pub fn tokenize(input: &str) -> SqlesResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let position = input.len() - rest.len();
        match parse_token(rest) {
            Ok((remaining, (kind, text))) => {
                tokens.push(Token {
                    kind,
                    text,
                    position,
                });
                rest = remaining.trim_start();
            }
            Err(nom::Err::Failure(_)) => {
                let what = if rest.starts_with('`') {
                    "quoted identifier"
                } else {
                    "string literal"
                };
                return Err(SqlesError::lex(position, format!("Unterminated {}", what)));
            }
            Err(_) => {
                let ch = rest.chars().next().unwrap_or_default();
                return Err(SqlesError::lex(
                    position,
                    format!("Unrecognized character '{}'", ch),
                ));
            }
        }
    }

    tracing::debug!("Tokenized {} bytes into {} tokens", input.len(), tokens.len());
    Ok(tokens)
}

fn parse_token(input: &str) -> IResult<&str, (TokenKind, String)> {
    alt((
        map(parse_string, |s| (TokenKind::String, s)),
        map(parse_quoted_identifier, |s: &str| {
            (TokenKind::Identifier, s.to_string())
        }),
        map(parse_number, |s: &str| (TokenKind::Number, s.to_string())),
        parse_operator,
        parse_punctuation,
        map(parse_word, |s: &str| match Keyword::from_word(s) {
            Some(kw) => (TokenKind::Keyword(kw), s.to_string()),
            None => (TokenKind::Identifier, s.to_string()),
        }),
    ))(input)
}

/// Single-quoted string. `%` and `_` are kept verbatim; `\'` and `\\` escape.
fn parse_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('\'')(input)?;
    cut(terminated(
        fold_many0(
            alt((
                map(is_not("'\\"), |s: &str| s.to_string()),
                map(preceded(char('\\'), anychar), |c| c.to_string()),
            )),
            String::new,
            |mut acc, piece| {
                acc.push_str(&piece);
                acc
            },
        ),
        char('\''),
    ))(input)
}

/// Backtick-quoted identifier, for names that collide with keywords.
fn parse_quoted_identifier(input: &str) -> IResult<&str, &str> {
    let (input, _) = char('`')(input)?;
    cut(terminated(is_not("`"), char('`')))(input)
}

/// Integer or decimal, with an optional leading minus.
fn parse_number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)
}

fn parse_operator(input: &str) -> IResult<&str, (TokenKind, String)> {
    let (rest, op) = alt((
        value(CmpOp::Gte, tag(">=")),
        value(CmpOp::Lte, tag("<=")),
        value(CmpOp::Ne, tag("!=")),
        value(CmpOp::Ne, tag("<>")),
        value(CmpOp::Eq, tag("=")),
        value(CmpOp::Gt, tag(">")),
        value(CmpOp::Lt, tag("<")),
    ))(input)?;
    let text = &input[..input.len() - rest.len()];
    Ok((rest, (TokenKind::Operator(op), text.to_string())))
}

fn parse_punctuation(input: &str) -> IResult<&str, (TokenKind, String)> {
    let (rest, kind) = alt((
        value(TokenKind::Comma, char(',')),
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::Star, char('*')),
        value(TokenKind::Slash, char('/')),
        value(TokenKind::Semicolon, char(';')),
    ))(input)?;
    let text = &input[..input.len() - rest.len()];
    Ok((rest, (kind, text.to_string())))
}

/// Bare word: keyword or identifier such as `age`, `_score`, `address.city`
/// or `logs-2014.08`.
fn parse_word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '.' || c == '-'),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            kinds("select FROM wHeRe"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Keyword(Keyword::From),
                TokenKind::Keyword(Keyword::Where),
            ]
        );
    }

    #[test]
    fn test_identifiers_and_positions() {
        let tokens = tokenize("SELECT address.city FROM bank/account").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].text, "address.city");
        assert_eq!(tokens[1].position, 7);
        assert_eq!(tokens[3].text, "bank");
        assert_eq!(tokens[4].kind, TokenKind::Slash);
        assert_eq!(tokens[5].text, "account");
        assert_eq!(tokens[5].position, 30);
    }

    #[test]
    fn test_string_keeps_wildcards() {
        let tokens = tokenize("firstname LIKE 'amb%'").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[2].text, "amb%");
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r"'it\'s' ''").unwrap();
        assert_eq!(tokens[0].text, "it's");
        assert_eq!(tokens[1].text, "");
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("25 3.75 -4").unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["25", "3.75", "-4"]);
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Number));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("= != <> > >= < <="),
            vec![
                TokenKind::Operator(CmpOp::Eq),
                TokenKind::Operator(CmpOp::Ne),
                TokenKind::Operator(CmpOp::Ne),
                TokenKind::Operator(CmpOp::Gt),
                TokenKind::Operator(CmpOp::Gte),
                TokenKind::Operator(CmpOp::Lt),
                TokenKind::Operator(CmpOp::Lte),
            ]
        );
    }

    #[test]
    fn test_operators_without_spaces() {
        assert_eq!(
            kinds("age>=25"),
            vec![
                TokenKind::Identifier,
                TokenKind::Operator(CmpOp::Gte),
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn test_quoted_identifier() {
        let tokens = tokenize("`order` = 1").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "order");
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("city = 'Nogal").unwrap_err();
        match err {
            SqlesError::Lex { position, message } => {
                assert_eq!(position, 7);
                assert!(message.contains("Unterminated"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_character() {
        let err = tokenize("age # 3").unwrap_err();
        assert!(matches!(err, SqlesError::Lex { position: 4, .. }));
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("   ").unwrap().is_empty());
    }
}
