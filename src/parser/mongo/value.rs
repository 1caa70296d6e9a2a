//! Loosely typed shell arguments
//!
//! Arguments are coerced from their source text into [`ShellValue`]. Object
//! and array literals go through [`quote_literal`] first, which rewrites the
//! relaxed shell syntax (bare keys, single quotes, `ObjectId(...)`,
//! `ISODate(...)`) into strict JSON.

use mongodb::bson::{self, Bson, Document, oid::ObjectId};
use serde_json::{Map, Number, Value as JsonValue};
use std::fmt;

use crate::error::{ParseError, Result};
use crate::parser::mongo::scanner::is_identifier_char;

/// One parsed argument
#[derive(Debug, Clone, PartialEq)]
pub enum ShellValue {
    Null,
    Undefined,
    Bool(bool),
    Number(Number),
    String(String),
    Object(Map<String, JsonValue>),
    Array(Vec<JsonValue>),
    /// Bare word passed through untouched (field names, sort shorthands)
    Raw(String),
}

impl ShellValue {
    /// Coerce one argument's source text
    pub fn coerce(text: &str) -> Result<Self> {
        let text = text.trim();

        match text {
            "true" => return Ok(ShellValue::Bool(true)),
            "false" => return Ok(ShellValue::Bool(false)),
            "null" => return Ok(ShellValue::Null),
            "undefined" => return Ok(ShellValue::Undefined),
            _ => {}
        }

        if let Some(number) = parse_number(text) {
            return Ok(ShellValue::Number(number));
        }

        if let Some(content) = dequote(text) {
            return Ok(ShellValue::String(content));
        }

        if text.starts_with('{') || text.starts_with('[') || starts_with_helper(text) {
            return parse_literal(text);
        }

        Ok(ShellValue::Raw(text.to_string()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ShellValue::Null => "null",
            ShellValue::Undefined => "undefined",
            ShellValue::Bool(_) => "boolean",
            ShellValue::Number(_) => "number",
            ShellValue::String(_) => "string",
            ShellValue::Object(_) => "object",
            ShellValue::Array(_) => "array",
            ShellValue::Raw(_) => "identifier",
        }
    }

    /// `null` or `undefined`
    pub fn is_absent(&self) -> bool {
        matches!(self, ShellValue::Null | ShellValue::Undefined)
    }

    /// Text of a string or bare identifier
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ShellValue::String(s) | ShellValue::Raw(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ShellValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ShellValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert to BSON, resolving `$oid` / `$date` wrappers
    pub fn to_bson(&self) -> Result<Bson> {
        match self {
            ShellValue::Null | ShellValue::Undefined => Ok(Bson::Null),
            ShellValue::Bool(b) => Ok(Bson::Boolean(*b)),
            ShellValue::Number(n) => Ok(number_to_bson(n)),
            ShellValue::String(s) | ShellValue::Raw(s) => Ok(Bson::String(s.clone())),
            ShellValue::Object(map) => object_to_bson(map),
            ShellValue::Array(items) => items
                .iter()
                .map(json_to_bson)
                .collect::<Result<Vec<_>>>()
                .map(Bson::Array),
        }
    }

    /// Convert an object argument to a document
    ///
    /// `null`/`undefined` become an empty document so `find()` and
    /// `find(undefined)` behave the same.
    pub fn to_document(&self, operation: &str) -> Result<Document> {
        if self.is_absent() {
            return Ok(Document::new());
        }
        match self.to_bson()? {
            Bson::Document(doc) => Ok(doc),
            _ => Err(ParseError::invalid_argument(
                operation,
                format!("expected an object, got {}", self.type_name()),
            )
            .into()),
        }
    }
}

impl fmt::Display for ShellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellValue::Null => f.write_str("null"),
            ShellValue::Undefined => f.write_str("undefined"),
            ShellValue::Bool(b) => write!(f, "{b}"),
            ShellValue::Number(n) => write!(f, "{n}"),
            ShellValue::String(s) => write!(f, "{s:?}"),
            ShellValue::Object(map) => write!(f, "{}", JsonValue::Object(map.clone())),
            ShellValue::Array(items) => write!(f, "{}", JsonValue::Array(items.clone())),
            ShellValue::Raw(s) => f.write_str(s),
        }
    }
}

/// Convert a JSON value to BSON
///
/// Integral numbers become `Int32` when they fit, otherwise `Int64`; other
/// numbers become `Double`. `{"$oid": ".."}` and `{"$date": ..}` become
/// `ObjectId` and `DateTime`.
pub fn json_to_bson(value: &JsonValue) -> Result<Bson> {
    match value {
        JsonValue::Null => Ok(Bson::Null),
        JsonValue::Bool(b) => Ok(Bson::Boolean(*b)),
        JsonValue::Number(n) => Ok(number_to_bson(n)),
        JsonValue::String(s) => Ok(Bson::String(s.clone())),
        JsonValue::Array(items) => items
            .iter()
            .map(json_to_bson)
            .collect::<Result<Vec<_>>>()
            .map(Bson::Array),
        JsonValue::Object(map) => object_to_bson(map),
    }
}

fn object_to_bson(map: &Map<String, JsonValue>) -> Result<Bson> {
    if map.len() == 1 {
        if let Some(JsonValue::String(hex)) = map.get("$oid") {
            return ObjectId::parse_str(hex).map(Bson::ObjectId).map_err(|e| {
                ParseError::InvalidLiteral {
                    literal: format!("ObjectId(\"{hex}\")"),
                    reason: e.to_string(),
                }
                .into()
            });
        }
        if let Some(date) = map.get("$date") {
            return date_to_bson(date);
        }
    }

    let mut doc = Document::new();
    for (key, value) in map {
        doc.insert(key.clone(), json_to_bson(value)?);
    }
    Ok(Bson::Document(doc))
}

fn date_to_bson(value: &JsonValue) -> Result<Bson> {
    let invalid = |reason: String| ParseError::InvalidLiteral {
        literal: format!("ISODate({value})"),
        reason,
    };

    match value {
        JsonValue::String(s) => parse_date(s)
            .map(Bson::DateTime)
            .ok_or_else(|| invalid("expected an ISO-8601 date".to_string()).into()),
        JsonValue::Number(n) => n
            .as_i64()
            .map(|ms| Bson::DateTime(bson::DateTime::from_millis(ms)))
            .ok_or_else(|| invalid("expected milliseconds since the epoch".to_string()).into()),
        _ => Err(invalid("expected a string or number".to_string()).into()),
    }
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` date at midnight UTC
fn parse_date(text: &str) -> Option<bson::DateTime> {
    if let Ok(dt) = bson::DateTime::parse_rfc3339_str(text) {
        return Some(dt);
    }
    let midnight = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)?;
    Some(bson::DateTime::from_millis(midnight.and_utc().timestamp_millis()))
}

fn number_to_bson(n: &Number) -> Bson {
    if let Some(i) = n.as_i64() {
        match i32::try_from(i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(i),
        }
    } else {
        Bson::Double(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// `-?digits(.digits)?`
fn parse_number(text: &str) -> Option<Number> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };

    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) || frac_part.is_some_and(|f| !all_digits(f)) {
        return None;
    }

    if frac_part.is_none() {
        if let Ok(i) = text.parse::<i64>() {
            return Some(Number::from(i));
        }
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Strip matching quotes and resolve escapes
fn dequote(text: &str) -> Option<String> {
    let mut chars = text.chars();
    let quote = chars.next().filter(|c| *c == '"' || *c == '\'')?;
    if text.len() < 2 || !text.ends_with(quote) {
        return None;
    }

    let body = &text[1..text.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut escaped = false;
    for ch in body.chars() {
        if escaped {
            match ch {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '\\' | '\'' | '"' => out.push(ch),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            // An unescaped quote in the middle: not a single string literal.
            return None;
        } else {
            out.push(ch);
        }
    }

    Some(out)
}

fn starts_with_helper(text: &str) -> bool {
    ["ObjectId(", "ISODate(", "new Date(", "Date(", "NumberInt(", "NumberLong("]
        .iter()
        .any(|prefix| text.starts_with(prefix))
}

fn parse_literal(text: &str) -> Result<ShellValue> {
    let strict = quote_literal(text)?;
    let value: JsonValue = serde_json::from_str(&strict).map_err(|e| ParseError::InvalidLiteral {
        literal: text.to_string(),
        reason: e.to_string(),
    })?;

    Ok(match value {
        JsonValue::Object(map) => ShellValue::Object(map),
        JsonValue::Array(items) => ShellValue::Array(items),
        JsonValue::Null => ShellValue::Null,
        JsonValue::Bool(b) => ShellValue::Bool(b),
        JsonValue::Number(n) => ShellValue::Number(n),
        JsonValue::String(s) => ShellValue::String(s),
    })
}

/// Rewrite a relaxed object/array literal into strict JSON
///
/// - bare keys before `:` are double-quoted
/// - single-quoted strings become double-quoted
/// - `ObjectId("..")` becomes `{"$oid": ".."}`
/// - `ISODate("..")`, `new Date("..")` become `{"$date": ..}`
/// - `NumberInt(n)` / `NumberLong(n)` become the plain number
/// - `undefined` becomes `null` and trailing commas are dropped
pub fn quote_literal(text: &str) -> Result<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '"' | '\'' => {
                i = copy_string(&chars, i, &mut out);
            }
            '}' | ']' => {
                let trimmed_len = out.trim_end().len();
                if out[..trimmed_len].ends_with(',') {
                    out.truncate(trimmed_len - 1);
                }
                out.push(ch);
                i += 1;
            }
            c if is_identifier_char(c) || c == '.' => {
                let start = i;
                while i < chars.len() && (is_identifier_char(chars[i]) || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                i = emit_word(&chars, i, &word, &mut out, text)?;
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    Ok(out)
}

/// Copy a string literal starting at `start` as a double-quoted JSON string
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    out.push('"');

    while i < chars.len() {
        let ch = chars[i];
        if ch == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if next == '\'' {
                out.push('\'');
            } else {
                out.push('\\');
                out.push(next);
            }
            i += 2;
            continue;
        }
        if ch == quote {
            i += 1;
            break;
        }
        if ch == '"' {
            out.push_str("\\\"");
        } else {
            out.push(ch);
        }
        i += 1;
    }

    out.push('"');
    i
}

fn emit_word(chars: &[char], mut i: usize, word: &str, out: &mut String, literal: &str) -> Result<usize> {
    let next = skip_ws(chars, i);
    let after_open = out.trim_end().ends_with(['{', ',']);

    if after_open && chars.get(next) == Some(&':') {
        out.push('"');
        out.push_str(word);
        out.push('"');
        return Ok(i);
    }

    let helper = match word {
        "new" => {
            let start = skip_ws(chars, i);
            let end = (start..chars.len())
                .find(|&j| !is_identifier_char(chars[j]))
                .unwrap_or(chars.len());
            let ctor: String = chars[start..end].iter().collect();
            if ctor != "Date" && ctor != "ObjectId" {
                return Err(invalid_helper(literal, "only `new Date` and `new ObjectId` are supported"));
            }
            i = end;
            Some(ctor)
        }
        "ObjectId" | "ISODate" | "Date" | "NumberInt" | "NumberLong" => Some(word.to_string()),
        "undefined" => {
            out.push_str("null");
            return Ok(i);
        }
        _ => None,
    };

    let Some(helper) = helper else {
        out.push_str(word);
        return Ok(i);
    };

    let open = skip_ws(chars, i);
    if chars.get(open) != Some(&'(') {
        return Err(invalid_helper(literal, &format!("expected `(` after {helper}")));
    }
    let close = (open..chars.len())
        .find(|&j| chars[j] == ')')
        .ok_or_else(|| invalid_helper(literal, &format!("unterminated {helper}(...)")))?;
    let arg: String = chars[open + 1..close].iter().collect();
    let arg = arg.trim();

    let rendered = match helper.as_str() {
        "ObjectId" => {
            let hex = if arg.is_empty() {
                ObjectId::new().to_hex()
            } else {
                dequote(arg).ok_or_else(|| invalid_helper(literal, "ObjectId expects a string"))?
            };
            format!("{{\"$oid\":{}}}", JsonValue::String(hex))
        }
        "ISODate" | "Date" => {
            if arg.is_empty() {
                format!("{{\"$date\":{}}}", bson::DateTime::now().timestamp_millis())
            } else if let Some(s) = dequote(arg) {
                format!("{{\"$date\":{}}}", JsonValue::String(s))
            } else if let Some(n) = parse_number(arg) {
                format!("{{\"$date\":{n}}}")
            } else {
                return Err(invalid_helper(literal, "date expects a string or number"));
            }
        }
        _ => {
            let digits = dequote(arg).unwrap_or_else(|| arg.to_string());
            parse_number(&digits)
                .ok_or_else(|| invalid_helper(literal, &format!("{helper} expects a number")))?
                .to_string()
        }
    };

    out.push_str(&rendered);
    Ok(close + 1)
}

fn skip_ws(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn invalid_helper(literal: &str, reason: &str) -> crate::error::ShellError {
    ParseError::InvalidLiteral {
        literal: literal.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_coerce_scalars() {
        assert_eq!(ShellValue::coerce("true").unwrap(), ShellValue::Bool(true));
        assert_eq!(ShellValue::coerce("null").unwrap(), ShellValue::Null);
        assert_eq!(ShellValue::coerce("undefined").unwrap(), ShellValue::Undefined);
        assert_eq!(ShellValue::coerce("-12").unwrap().as_i64(), Some(-12));
        assert_eq!(
            ShellValue::coerce("'it\\'s'").unwrap(),
            ShellValue::String("it's".to_string())
        );
        assert_eq!(
            ShellValue::coerce("email").unwrap(),
            ShellValue::Raw("email".to_string())
        );
    }

    #[test]
    fn test_number_forms() {
        assert!(parse_number("1.5").is_some());
        assert!(parse_number("-0.25").is_some());
        assert!(parse_number("1.").is_none());
        assert!(parse_number("1e5").is_none());
        assert!(parse_number("-").is_none());
    }

    #[test]
    fn test_quote_bare_keys() {
        assert_eq!(
            quote_literal("{name: 'a', age: {$gt: 18}, 'x.y': 1}").unwrap(),
            r#"{"name": "a", "age": {"$gt": 18}, "x.y": 1}"#
        );
    }

    #[test]
    fn test_quote_keeps_colons_in_strings() {
        assert_eq!(
            quote_literal(r#"{url: "http://x:80", n: -1}"#).unwrap(),
            r#"{"url": "http://x:80", "n": -1}"#
        );
    }

    #[test]
    fn test_single_quoted_string_with_double_quote() {
        assert_eq!(
            quote_literal(r#"{q: 'say "hi"'}"#).unwrap(),
            r#"{"q": "say \"hi\""}"#
        );
    }

    #[test]
    fn test_trailing_commas_dropped() {
        assert_eq!(quote_literal("[1, 2, ]").unwrap(), "[1, 2]");
        assert_eq!(quote_literal("{a: 1,}").unwrap(), r#"{"a": 1}"#);
    }

    #[test]
    fn test_object_id_helper() {
        let value = ShellValue::coerce(r#"{_id: ObjectId("507f1f77bcf86cd799439011")}"#).unwrap();
        let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(value.to_document("find").unwrap(), doc! { "_id": oid });
    }

    #[test]
    fn test_bare_object_id_argument() {
        let value = ShellValue::coerce(r#"ObjectId("507f1f77bcf86cd799439011")"#).unwrap();
        assert!(matches!(value.to_bson().unwrap(), Bson::ObjectId(_)));
    }

    #[test]
    fn test_date_helpers() {
        let value = ShellValue::coerce(r#"{at: ISODate("2024-01-31T00:00:00Z")}"#).unwrap();
        let doc = value.to_document("find").unwrap();
        assert!(matches!(doc.get("at"), Some(Bson::DateTime(_))));

        let value = ShellValue::coerce("{at: new Date()}").unwrap();
        let doc = value.to_document("insertOne").unwrap();
        assert!(matches!(doc.get("at"), Some(Bson::DateTime(_))));
    }

    #[test]
    fn test_integer_widths() {
        let value = ShellValue::coerce("{small: 1, big: 5000000000, ratio: 0.5}").unwrap();
        let doc = value.to_document("insertOne").unwrap();
        assert_eq!(doc.get("small"), Some(&Bson::Int32(1)));
        assert_eq!(doc.get("big"), Some(&Bson::Int64(5_000_000_000)));
        assert_eq!(doc.get("ratio"), Some(&Bson::Double(0.5)));
    }

    #[test]
    fn test_invalid_literal_keeps_text() {
        let err = ShellValue::coerce("{name: }").unwrap_err();
        match err {
            crate::error::ShellError::Parse(ParseError::InvalidLiteral { literal, .. }) => {
                assert_eq!(literal, "{name: }");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_to_document_rejects_scalars() {
        assert!(ShellValue::Number(Number::from(1)).to_document("find").is_err());
        assert!(ShellValue::Undefined.to_document("find").unwrap().is_empty());
    }
}
