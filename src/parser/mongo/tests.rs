//! Parser tests for the shell command grammar

use super::*;
use crate::error::ShellError;
use serde_json::json;

fn object(value: serde_json::Value) -> ShellValue {
    match value {
        serde_json::Value::Object(map) => ShellValue::Object(map),
        other => panic!("not an object: {other}"),
    }
}

fn number(n: i64) -> ShellValue {
    ShellValue::Number(n.into())
}

// ===== Shell forms =====

#[test]
fn test_use() {
    let cmd = parse("use analytics").unwrap();
    assert_eq!(cmd.operation, "use");
    assert_eq!(cmd.args, vec![ShellValue::String("analytics".into())]);
    assert!(!cmd.is_collection_op());
}

#[test]
fn test_use_requires_valid_name() {
    assert!(parse("use").is_err());
    assert!(parse("use bad/name").is_err());
}

#[test]
fn test_show_collections() {
    let cmd = parse("show collections").unwrap();
    assert_eq!(cmd.operation, "show");
    assert_eq!(cmd.args, vec![ShellValue::String("collections".into())]);
}

#[test]
fn test_show_targets() {
    for target in ["dbs", "databases", "users", "roles"] {
        let cmd = parse(&format!("show {target};")).unwrap();
        assert_eq!(cmd.args, vec![ShellValue::String(target.into())]);
    }
}

#[test]
fn test_show_unknown_target() {
    let err = parse("show profile").unwrap_err();
    assert!(matches!(
        err,
        ShellError::Parse(ParseError::UnsupportedCommand(ref text)) if text == "show profile"
    ));
}

#[test]
fn test_unknown_shape_names_text() {
    let err = parse("printjson(x)").unwrap_err();
    assert_eq!(err.to_string(), "Unsupported command: printjson(x)");
}

#[test]
fn test_empty_command() {
    assert!(matches!(
        parse("  ;").unwrap_err(),
        ShellError::Parse(ParseError::EmptyCommand)
    ));
}

// ===== Collection operations =====

#[test]
fn test_find_with_chain() {
    let cmd = parse(r#"db.users.find({name:"a"}).limit(5).sort({age:-1})"#).unwrap();
    assert_eq!(cmd.collection, "users");
    assert_eq!(cmd.operation, "find");
    assert_eq!(cmd.args, vec![object(json!({"name": "a"}))]);
    assert_eq!(
        cmd.chained_operations,
        vec![
            ChainedOperation {
                method: "limit".into(),
                args: vec![number(5)],
            },
            ChainedOperation {
                method: "sort".into(),
                args: vec![object(json!({"age": -1}))],
            },
        ]
    );
}

#[test]
fn test_find_without_args() {
    let cmd = parse("db.orders.find()").unwrap();
    assert!(cmd.args.is_empty());
    assert!(cmd.chained_operations.is_empty());
}

#[test]
fn test_multiple_arguments() {
    let cmd = parse(r#"db.users.updateOne({_id: 1}, {$set: {name: 'b'}}, {upsert: true})"#).unwrap();
    assert_eq!(cmd.operation, "updateOne");
    assert_eq!(cmd.args.len(), 3);
    assert_eq!(cmd.args[2], object(json!({"upsert": true})));
}

#[test]
fn test_string_whitespace_is_preserved() {
    let cmd = parse(r#"db.notes.insertOne({text: "two  spaces"})"#).unwrap();
    assert_eq!(cmd.args, vec![object(json!({"text": "two  spaces"}))]);
}

#[test]
fn test_parens_inside_strings() {
    let cmd = parse(r#"db.logs.find({msg: "a) .limit(1"}).count()"#).unwrap();
    assert_eq!(cmd.args, vec![object(json!({"msg": "a) .limit(1"}))]);
    assert_eq!(cmd.chained_operations.len(), 1);
    assert_eq!(cmd.chained_operations[0].method, "count");
}

#[test]
fn test_raw_identifier_argument() {
    let cmd = parse("db.users.distinct(email)").unwrap();
    assert_eq!(cmd.args, vec![ShellValue::Raw("email".into())]);
}

#[test]
fn test_string_sort_shorthand() {
    let cmd = parse(r#"db.users.find().sort("-age name")"#).unwrap();
    assert_eq!(
        cmd.chained_operations[0].args,
        vec![ShellValue::String("-age name".into())]
    );
}

#[test]
fn test_array_argument() {
    let cmd = parse("db.users.insertMany([{a: 1}, {a: 2}])").unwrap();
    assert_eq!(
        cmd.args,
        vec![ShellValue::Array(vec![json!({"a": 1}), json!({"a": 2})])]
    );
}

#[test]
fn test_get_collection_form() {
    let cmd = parse(r#"db.getCollection("audit.log").find({}).limit(1)"#).unwrap();
    assert_eq!(cmd.collection, "audit.log");
    assert_eq!(cmd.operation, "find");
    assert_eq!(cmd.chained_operations.len(), 1);
}

// ===== Admin operations =====

#[test]
fn test_admin_operation() {
    let cmd = parse("db.stats()").unwrap();
    assert!(cmd.collection.is_empty());
    assert_eq!(cmd.operation, "stats");
    assert!(cmd.args.is_empty());
}

#[test]
fn test_admin_operation_with_args() {
    let cmd = parse(r#"db.createCollection("events", {capped: true, size: 1024})"#).unwrap();
    assert_eq!(cmd.operation, "createCollection");
    assert_eq!(cmd.args[0], ShellValue::String("events".into()));
    assert_eq!(cmd.args[1], object(json!({"capped": true, "size": 1024})));
}

// ===== Errors =====

#[test]
fn test_unbalanced_parens() {
    let err = parse("db.users.find({a: 1}").unwrap_err();
    assert!(matches!(
        err,
        ShellError::Parse(ParseError::UnbalancedDelimiters(_))
    ));
}

#[test]
fn test_missing_call() {
    let err = parse("db.users.find").unwrap_err();
    assert!(matches!(err, ShellError::Parse(ParseError::InvalidMethodCall(_))));
}

#[test]
fn test_invalid_literal_is_reported_verbatim() {
    let err = parse("db.users.find({name: })").unwrap_err();
    match err {
        ShellError::Parse(ParseError::InvalidLiteral { literal, .. }) => {
            assert_eq!(literal, "{name: }");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_parse_never_reports_unsupported_operation() {
    // Unknown operation names are a dispatch concern.
    let cmd = parse("db.users.frobnicate(1)").unwrap();
    assert_eq!(cmd.operation, "frobnicate");
}
