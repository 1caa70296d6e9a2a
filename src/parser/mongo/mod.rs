//! MongoDB shell command parser
//!
//! Recognizes a constrained subset of shell syntax:
//! - `use <db>`
//! - `show dbs|databases|collections|users|roles`
//! - `db.<collection>.<op>(<args>)[.<chain>(<args>)...]`
//! - `db.<adminOp>(<args>)`
//!
//! The parser is a structural scanner over brackets and quotes, not a
//! JavaScript engine. Arguments are coerced into [`ShellValue`]s.
//!
//! # Examples
//!
//! ```
//! use dbshell::parser::mongo::parse;
//!
//! let cmd = parse("db.users.find({name: 'a'}).limit(5)").unwrap();
//! assert_eq!(cmd.collection, "users");
//! assert_eq!(cmd.operation, "find");
//! assert_eq!(cmd.chained_operations[0].method, "limit");
//! ```

mod scanner;
mod value;

#[cfg(test)]
mod tests;

pub use scanner::{normalize, parse_method_call, split_args, split_chain};
pub use value::{ShellValue, json_to_bson, quote_literal};

use crate::error::{ParseError, Result};

/// Targets accepted by `show`
const SHOW_TARGETS: &[&str] = &["dbs", "databases", "collections", "users", "roles"];

/// A method applied to a query after the primary operation
#[derive(Debug, Clone, PartialEq)]
pub struct ChainedOperation {
    pub method: String,
    pub args: Vec<ShellValue>,
}

/// A parsed shell command
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    /// Target collection; empty for `use`, `show` and `db.<op>()` forms
    pub collection: String,
    pub operation: String,
    pub args: Vec<ShellValue>,
    pub chained_operations: Vec<ChainedOperation>,
}

impl ParsedCommand {
    fn shell(operation: &str, arg: &str) -> Self {
        Self {
            collection: String::new(),
            operation: operation.to_string(),
            args: vec![ShellValue::String(arg.to_string())],
            chained_operations: Vec::new(),
        }
    }

    /// Whether this targets a collection rather than the database or shell
    pub fn is_collection_op(&self) -> bool {
        !self.collection.is_empty()
    }
}

/// Parse one shell command
///
/// # Arguments
/// * `command` - Raw command text
///
/// # Returns
/// * `Result<ParsedCommand>` - Structured command or a parse error naming the offending text
pub fn parse(command: &str) -> Result<ParsedCommand> {
    let normalized = normalize(command);
    if normalized.is_empty() {
        return Err(ParseError::EmptyCommand.into());
    }

    if let Some(rest) = keyword_rest(&normalized, "use") {
        return parse_use(rest);
    }

    if let Some(rest) = keyword_rest(&normalized, "show") {
        return parse_show(rest, &normalized);
    }

    if let Some(rest) = normalized.strip_prefix("db.") {
        return parse_db_expression(rest, &normalized);
    }

    Err(ParseError::UnsupportedCommand(normalized).into())
}

/// Text after a leading `keyword`, if the command starts with that word
fn keyword_rest<'a>(command: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = command.strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(' ') {
        Some(rest.trim())
    } else {
        None
    }
}

fn parse_use(name: &str) -> Result<ParsedCommand> {
    if name.is_empty() {
        return Err(ParseError::invalid_argument("use", "database name is required").into());
    }
    if !is_valid_db_name(name) {
        return Err(
            ParseError::invalid_argument("use", format!("invalid database name '{name}'")).into(),
        );
    }
    Ok(ParsedCommand::shell("use", name))
}

fn parse_show(target: &str, command: &str) -> Result<ParsedCommand> {
    if SHOW_TARGETS.contains(&target) {
        Ok(ParsedCommand::shell("show", target))
    } else {
        Err(ParseError::UnsupportedCommand(command.to_string()).into())
    }
}

/// `<collection>.<chain>` or `<adminOp>(...)`
fn parse_db_expression(rest: &str, command: &str) -> Result<ParsedCommand> {
    let dot = rest.find('.');
    let paren = rest.find('(');

    let (collection, chain_text) = match (dot, paren) {
        (Some(d), Some(p)) if d < p => (rest[..d].trim(), &rest[d + 1..]),
        (Some(d), None) => (rest[..d].trim(), &rest[d + 1..]),
        (_, Some(_)) => ("", rest),
        (None, None) => return Err(ParseError::UnsupportedCommand(command.to_string()).into()),
    };

    let is_admin = chain_text.len() == rest.len();
    if !is_admin && (collection.is_empty() || !collection.chars().all(is_collection_char)) {
        return Err(ParseError::UnsupportedCommand(command.to_string()).into());
    }

    let fragments = split_chain(chain_text)?;
    let mut calls = fragments
        .iter()
        .map(|fragment| parse_call(fragment))
        .collect::<Result<Vec<_>>>()?
        .into_iter();

    let mut primary = calls
        .next()
        .ok_or_else(|| ParseError::InvalidMethodCall(chain_text.to_string()))?;
    let mut collection = collection.to_string();

    // db.getCollection("name").op(...) addresses collections with awkward names.
    if collection.is_empty() && primary.method == "getCollection" {
        collection = match primary.args.first() {
            Some(ShellValue::String(name)) if !name.is_empty() => name.clone(),
            _ => {
                return Err(ParseError::invalid_argument(
                    "getCollection",
                    "collection name must be a non-empty string",
                )
                .into());
            }
        };
        primary = calls
            .next()
            .ok_or_else(|| ParseError::InvalidMethodCall(command.to_string()))?;
    }

    Ok(ParsedCommand {
        collection,
        operation: primary.method,
        args: primary.args,
        chained_operations: calls.collect(),
    })
}

fn parse_call(fragment: &str) -> Result<ChainedOperation> {
    let (method, inner) = parse_method_call(fragment)?;
    let args = split_args(&inner)?
        .iter()
        .map(|arg| ShellValue::coerce(arg))
        .collect::<Result<Vec<_>>>()?;
    Ok(ChainedOperation { method, args })
}

fn is_collection_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '$')
}

/// MongoDB database names cannot contain `/\. "$*<>:|?` and are at most 64 bytes
fn is_valid_db_name(name: &str) -> bool {
    const INVALID: &[char] = &['/', '\\', '.', ' ', '"', '$', '*', '<', '>', ':', '|', '?'];
    !name.is_empty() && name.len() <= 64 && !name.contains(INVALID)
}
