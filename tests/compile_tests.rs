//! End-to-end compilation tests: SQL text in, request path and body out.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sqles::prelude::*;

fn bank() -> Schema {
    Schema::new()
        .with("age", FieldType::Numeric)
        .with("account_number", FieldType::Numeric)
        .with("balance", FieldType::Numeric)
        .with("gender", FieldType::Exact)
        .with("state", FieldType::Exact)
        .with("insert_time", FieldType::Date)
}

fn body(sql: &str) -> Value {
    sqles::compile(sql, &bank()).unwrap().body()
}

fn query(sql: &str) -> Value {
    body(sql)["query"].clone()
}

fn eq(field: &str, n: i64) -> Expression {
    Expression::compare(field, CmpOp::Eq, Literal::Int(n))
}

#[test]
fn test_and_binds_tighter_than_or() {
    let stmt = sqles::parse("SELECT * FROM t WHERE a = 1 AND b = 2 OR c = 3").unwrap();
    assert_eq!(
        stmt.predicate,
        Some(Expression::or(vec![
            Expression::and(vec![eq("a", 1), eq("b", 2)]),
            eq("c", 3),
        ]))
    );
}

#[test]
fn test_parentheses_override_precedence() {
    let stmt = sqles::parse("SELECT * FROM t WHERE (a = 1 OR b = 2) AND c = 3").unwrap();
    assert_eq!(
        stmt.predicate,
        Some(Expression::and(vec![
            Expression::or(vec![eq("a", 1), eq("b", 2)]),
            eq("c", 3),
        ]))
    );
}

#[test]
fn test_precedence_in_compiled_query() {
    assert_eq!(
        query("SELECT * FROM bank WHERE age = 1 AND balance = 2 OR gender = 'F'"),
        json!({ "bool": { "filter": [ { "bool": {
            "should": [
                { "bool": { "filter": [
                    { "term": { "age": 1 } },
                    { "term": { "balance": 2 } }
                ] } },
                { "term": { "gender": "F" } }
            ],
            "minimum_should_match": 1
        } } ] } })
    );
}

#[test]
fn test_between_is_inclusive() {
    assert_eq!(
        query("SELECT * FROM bank WHERE age BETWEEN 20 AND 37"),
        json!({ "bool": { "filter": [
            { "range": { "age": { "gte": 20, "lte": 37 } } }
        ] } })
    );
}

#[test]
fn test_not_between_keeps_documents_missing_the_field() {
    let compiled =
        sqles::compile("SELECT * FROM bank WHERE age NOT BETWEEN 20 AND 37", &bank()).unwrap();

    // A lone must_not: nothing requires `age` to exist.
    assert_eq!(
        compiled.body()["query"],
        json!({ "bool": { "must_not": [
            { "range": { "age": { "gte": 20, "lte": 37 } } }
        ] } })
    );
    assert_eq!(
        compiled.notes,
        vec![SemanticNote::MissingFieldPassThrough {
            field: "age".to_string()
        }]
    );
}

#[test]
fn test_require_field_mode_excludes_missing_documents() {
    let compiler = Compiler::new(bank()).with_options(CompileOptions {
        negation: NegationMode::RequireField,
        ..CompileOptions::default()
    });
    let compiled = compiler
        .compile("SELECT * FROM bank WHERE age NOT BETWEEN 20 AND 37")
        .unwrap();

    assert_eq!(
        compiled.body()["query"],
        json!({ "bool": {
            "filter": [ { "exists": { "field": "age" } } ],
            "must_not": [ { "range": { "age": { "gte": 20, "lte": 37 } } } ]
        } })
    );
    assert!(compiled.notes.is_empty());
}

#[test]
fn test_in_and_not_in() {
    assert_eq!(
        query("SELECT age FROM bank WHERE age IN (20, 22)"),
        json!({ "bool": { "filter": [ { "terms": { "age": [20, 22] } } ] } })
    );
    assert_eq!(
        query("SELECT age FROM bank WHERE age NOT IN (20, 22)"),
        json!({ "bool": { "must_not": [ { "terms": { "age": [20, 22] } } ] } })
    );
}

#[test]
fn test_multi_index_targeting() {
    let compiled = sqles::compile("SELECT * FROM doc/accounts,bank/doc", &bank()).unwrap();
    assert_eq!(
        compiled.targets,
        vec![
            Source::new("doc", Some("accounts")),
            Source::new("bank", Some("doc")),
        ]
    );
    assert_eq!(compiled.targets_string(), "doc/accounts,bank/doc");
    // Not a full index x type product: the types are picked in the query.
    assert_eq!(compiled.search_path(), "doc,bank/_search");
    assert_eq!(
        compiled.body()["query"]["bool"]["filter"][0]["bool"]["should"]
            .as_array()
            .map(Vec::len),
        Some(2)
    );
}

#[test]
fn test_untyped_index_is_not_narrowed_by_other_types() {
    let compiled = sqles::compile("SELECT * FROM bank, doc/accounts", &bank()).unwrap();
    assert_eq!(compiled.search_path(), "bank,doc/_search");
    assert_eq!(
        compiled.body()["query"],
        json!({ "bool": { "filter": [ { "bool": {
            "should": [
                { "term": { "_index": "bank" } },
                { "bool": { "filter": [
                    { "term": { "_index": "doc" } },
                    { "term": { "_type": "accounts" } }
                ] } }
            ],
            "minimum_should_match": 1
        } } ] } })
    );
}

#[test]
fn test_like_becomes_prefix_wildcard() {
    assert_eq!(
        query("SELECT * FROM bank WHERE firstname LIKE 'amb%'"),
        json!({ "bool": { "filter": [
            { "wildcard": { "firstname": { "value": "amb*" } } }
        ] } })
    );
}

#[test]
fn test_limit_sets_window_size() {
    assert_eq!(body("SELECT * FROM bank LIMIT 30")["size"], json!(30));
    assert!(body("SELECT * FROM bank").get("size").is_none());
}

#[test]
fn test_text_equality_matches_the_phrase() {
    assert_eq!(
        query("SELECT * FROM t WHERE phrase = 'quick fox here'"),
        json!({ "match_phrase": { "phrase": { "query": "quick fox here" } } })
    );
}

#[test]
fn test_in_on_text_matches_each_phrase() {
    assert_eq!(
        query("SELECT * FROM t WHERE phrase IN ('quick fox here', 'fox brown')"),
        json!({ "bool": {
            "should": [
                { "match_phrase": { "phrase": { "query": "quick fox here" } } },
                { "match_phrase": { "phrase": { "query": "fox brown" } } }
            ],
            "minimum_should_match": 1
        } })
    );
}

#[test]
fn test_prefix_not_reports_missing_field_pass_through() {
    let compiled =
        sqles::compile("SELECT * FROM bank WHERE NOT age BETWEEN 20 AND 37", &bank()).unwrap();
    assert_eq!(
        compiled.notes,
        vec![SemanticNote::MissingFieldPassThrough {
            field: "age".to_string()
        }]
    );
}

#[test]
fn test_like_escapes_literal_wildcards() {
    assert_eq!(
        query("SELECT * FROM bank WHERE title LIKE 'what?%'"),
        json!({ "bool": { "filter": [
            { "wildcard": { "title": { "value": "what\\?*" } } }
        ] } })
    );
}

#[test]
fn test_existence_checks_are_complementary() {
    let present = query("SELECT * FROM bank WHERE email IS NOT MISS");
    let absent = query("SELECT * FROM bank WHERE email IS MISS");

    assert_eq!(
        present,
        json!({ "bool": { "filter": [ { "exists": { "field": "email" } } ] } })
    );
    assert_eq!(
        absent,
        json!({ "bool": { "must_not": [ { "exists": { "field": "email" } } ] } })
    );
}

#[test]
fn test_count_is_aggregate_only() {
    let compiled =
        sqles::compile("SELECT COUNT(*) FROM bank WHERE gender = 'F'", &bank()).unwrap();
    assert!(compiled.is_aggregate_only());
    assert_eq!(
        compiled.body(),
        json!({
            "query": { "bool": { "filter": [ { "term": { "gender": "F" } } ] } },
            "size": 0,
            "aggs": { "COUNT(*)": { "value_count": { "field": "_index" } } }
        })
    );
}

#[test]
fn test_mixed_text_and_exact_predicates() {
    assert_eq!(
        query("SELECT * FROM bank WHERE city = 'Nogal' AND age > 30"),
        json!({ "bool": {
            "must": [ { "match_phrase": { "city": { "query": "Nogal" } } } ],
            "filter": [ { "range": { "age": { "gt": 30 } } } ]
        } })
    );
}

const NESTED_WHERE: &str = "where (gender='m' and (age> 25 or account_number>5)) \
    or (gender='w' and (age>30 or account_number < 8)) and email is not miss";

fn any_of(a: Value, b: Value) -> Value {
    json!({ "bool": { "should": [a, b], "minimum_should_match": 1 } })
}

fn all_of(a: Value, b: Value) -> Value {
    json!({ "bool": { "filter": [a, b] } })
}

fn nested_where_query() -> Value {
    let m = all_of(
        json!({ "term": { "gender": "m" } }),
        any_of(
            json!({ "range": { "age": { "gt": 25 } } }),
            json!({ "range": { "account_number": { "gt": 5 } } }),
        ),
    );
    let w = all_of(
        json!({ "term": { "gender": "w" } }),
        any_of(
            json!({ "range": { "age": { "gt": 30 } } }),
            json!({ "range": { "account_number": { "lt": 8 } } }),
        ),
    );
    let w_with_email = all_of(w, json!({ "exists": { "field": "email" } }));

    // OR of filters scores nothing, so the root runs in filter context.
    json!({ "bool": { "filter": [ any_of(m, w_with_email) ] } })
}

#[test]
fn test_nested_bool_search() {
    let sql = format!(
        "select * from bank {} order by age,_score desc limit 10 ",
        NESTED_WHERE
    );
    assert_eq!(
        body(&sql),
        json!({
            "query": nested_where_query(),
            "sort": [
                { "age": { "order": "asc" } },
                { "_score": { "order": "desc" } }
            ],
            "size": 10
        })
    );
}

#[test]
fn test_nested_bool_count() {
    let sql = format!("select count(*) from bank {}", NESTED_WHERE);
    assert_eq!(
        body(&sql),
        json!({
            "query": nested_where_query(),
            "size": 0,
            "aggs": { "COUNT(*)": { "value_count": { "field": "_index" } } }
        })
    );
}

#[test]
fn test_errors_carry_positions() {
    let err = sqles::compile("SELECT * FROM bank WHERE name = 'open", &bank()).unwrap_err();
    assert!(matches!(err, SqlesError::Lex { position: 32, .. }));

    let err = sqles::compile("SELECT * bank", &bank()).unwrap_err();
    assert!(matches!(err, SqlesError::Syntax { position: 9, .. }));
}

#[test]
fn test_unknown_fields_default_to_text() {
    let compiled = sqles::compile("SELECT * FROM bank WHERE nickname = 'al'", &DefaultResolver)
        .unwrap();
    assert_eq!(
        compiled.body()["query"],
        json!({ "match_phrase": { "nickname": { "query": "al" } } })
    );
    assert_eq!(compiled.notes.len(), 1);
}

#[test]
fn test_compiler_is_shared_across_threads() {
    let compiler = Compiler::new(bank());
    let shared = &compiler;
    let queries = [
        "SELECT * FROM bank WHERE age > 1",
        "SELECT * FROM bank WHERE gender = 'M' LIMIT 5",
        "SELECT COUNT(*) FROM bank",
        "SELECT * FROM bank WHERE state IN ('TN', 'IL')",
    ];

    let results: Vec<CompiledQuery> = std::thread::scope(|s| {
        let handles: Vec<_> = queries
            .iter()
            .map(|sql| s.spawn(move || shared.compile(sql).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (sql, compiled) in queries.iter().zip(&results) {
        assert_eq!(compiled, &compiler.compile(sql).unwrap());
    }
}
