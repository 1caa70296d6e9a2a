use std::{fmt, io};

use crate::error::driver::ErrorInfo;

/// Crate-wide `Result` type using [`ShellError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ShellError>;

/// Top-level error type for command interpretation.
///
/// Every failure surfaced by the execute boundary is one of these variants;
/// the variant tells the caller which stage rejected the command.
#[derive(Debug)]
pub enum ShellError {
    /// Malformed command text.
    Parse(ParseError),

    /// Recognized command shape with an operation name we do not implement.
    Unsupported(UnsupportedOperation),

    /// Pooled connection could not be established or reused.
    Connection(ConnectionError),

    /// The database rejected the operation.
    Driver(DriverExecutionError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Parsing-specific errors. Every variant keeps the offending text.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The whole command has a shape no dialect parser accepts.
    UnsupportedCommand(String),

    /// Parentheses, braces or brackets do not balance.
    UnbalancedDelimiters(String),

    /// A method call fragment is not of the form `name(...)`.
    InvalidMethodCall(String),

    /// An object or array literal failed strict parsing.
    InvalidLiteral { literal: String, reason: String },

    /// A required argument is missing or has the wrong type.
    InvalidArgument { operation: String, message: String },

    /// Empty input.
    EmptyCommand,
}

/// An operation or chain method that parsed but has no handler.
#[derive(Debug, Clone, PartialEq)]
pub enum UnsupportedOperation {
    /// Primary collection or admin operation.
    Operation(String),

    /// Method chained onto a query.
    ChainMethod(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// No connection profile is registered under this id.
    UnknownConnection(String),

    /// Failed to establish a connection after all attempts.
    ConnectionFailed { target: String, message: String },

    /// Connection attempt exceeded the configured timeout.
    Timeout { target: String, seconds: u64 },

    /// A pool operation referenced a key with no live entry.
    NotPooled(String),

    /// The pool has been shut down.
    PoolClosed,
}

/// A database rejected an operation.
#[derive(Debug)]
pub struct DriverExecutionError {
    /// Backend that produced the error (`mysql`, `redis`, `mongodb`).
    pub backend: &'static str,

    /// Structured details extracted from the driver error.
    pub info: ErrorInfo,

    /// Statement text, kept for SQL errors.
    pub statement: Option<String>,
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl ParseError {
    /// Construct an argument error for `operation`.
    pub fn invalid_argument(operation: &str, message: impl Into<String>) -> Self {
        ParseError::InvalidArgument {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

impl DriverExecutionError {
    pub fn new(backend: &'static str, info: ErrorInfo) -> Self {
        Self {
            backend,
            info,
            statement: None,
        }
    }

    /// Attach the statement that failed.
    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::Parse(e) => write!(f, "{e}"),
            ShellError::Unsupported(e) => write!(f, "{e}"),
            ShellError::Connection(e) => write!(f, "Connection error: {e}"),
            ShellError::Driver(e) => write!(f, "{e}"),
            ShellError::Config(e) => write!(f, "Configuration error: {e}"),
            ShellError::Io(e) => write!(f, "I/O error: {e}"),
            ShellError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnsupportedCommand(cmd) => write!(f, "Unsupported command: {cmd}"),
            ParseError::UnbalancedDelimiters(text) => {
                write!(f, "Syntax error: unbalanced delimiters in '{text}'")
            }
            ParseError::InvalidMethodCall(text) => {
                write!(f, "Syntax error: expected method call, found '{text}'")
            }
            ParseError::InvalidLiteral { literal, reason } => {
                write!(f, "Invalid literal '{literal}': {reason}")
            }
            ParseError::InvalidArgument { operation, message } => {
                write!(f, "Invalid argument for {operation}: {message}")
            }
            ParseError::EmptyCommand => write!(f, "Empty command"),
        }
    }
}

impl fmt::Display for UnsupportedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsupportedOperation::Operation(op) => write!(f, "Unsupported operation: {op}"),
            UnsupportedOperation::ChainMethod(method) => {
                write!(f, "Unsupported chain method: {method}")
            }
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::UnknownConnection(id) => write!(f, "Unknown connection: {id}"),
            ConnectionError::ConnectionFailed { target, message } => {
                write!(f, "Failed to connect to {target}: {message}")
            }
            ConnectionError::Timeout { target, seconds } => {
                write!(f, "Timed out connecting to {target} after {seconds}s")
            }
            ConnectionError::NotPooled(key) => write!(f, "No pooled connection for {key}"),
            ConnectionError::PoolClosed => write!(f, "Connection pool is shut down"),
        }
    }
}

impl fmt::Display for DriverExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.info.message.as_deref().unwrap_or("unknown error");
        match (&self.info.name, self.info.code) {
            (Some(name), Some(code)) => write!(f, "{} error {name} ({code}): {message}", self.backend)?,
            (None, Some(code)) => write!(f, "{} error {code}: {message}", self.backend)?,
            _ => write!(f, "{} error: {message}", self.backend)?,
        }
        if let Some(details) = crate::error::driver::shown_details(&self.info) {
            write!(f, " ({details})")?;
        }
        if let Some(statement) = &self.statement {
            write!(f, "\nStatement: {statement}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ShellError {}
impl std::error::Error for ParseError {}
impl std::error::Error for UnsupportedOperation {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for DriverExecutionError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to ShellError ========================= */

impl From<io::Error> for ShellError {
    fn from(err: io::Error) -> Self {
        ShellError::Io(err)
    }
}

impl From<ParseError> for ShellError {
    fn from(err: ParseError) -> Self {
        ShellError::Parse(err)
    }
}

impl From<UnsupportedOperation> for ShellError {
    fn from(err: UnsupportedOperation) -> Self {
        ShellError::Unsupported(err)
    }
}

impl From<ConnectionError> for ShellError {
    fn from(err: ConnectionError) -> Self {
        ShellError::Connection(err)
    }
}

impl From<DriverExecutionError> for ShellError {
    fn from(err: DriverExecutionError) -> Self {
        ShellError::Driver(err)
    }
}

impl From<ConfigError> for ShellError {
    fn from(err: ConfigError) -> Self {
        ShellError::Config(err)
    }
}

impl From<mongodb::error::Error> for ShellError {
    fn from(err: mongodb::error::Error) -> Self {
        ShellError::Driver(DriverExecutionError::new(
            "mongodb",
            crate::error::driver::from_mongodb_error(&err),
        ))
    }
}

impl From<redis::RedisError> for ShellError {
    fn from(err: redis::RedisError) -> Self {
        ShellError::Driver(DriverExecutionError::new(
            "redis",
            crate::error::driver::from_redis_error(&err),
        ))
    }
}

impl From<String> for ShellError {
    fn from(msg: String) -> Self {
        ShellError::Generic(msg)
    }
}

impl From<&str> for ShellError {
    fn from(msg: &str) -> Self {
        ShellError::Generic(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::driver::ErrorDetails;

    #[test]
    fn test_parse_error_keeps_literal() {
        let err = ParseError::InvalidLiteral {
            literal: "{name: }".to_string(),
            reason: "expected value".to_string(),
        };
        assert!(err.to_string().contains("{name: }"));
    }

    #[test]
    fn test_driver_error_display_includes_statement() {
        let info = ErrorInfo {
            code: Some(1064),
            message: Some("You have an error in your SQL syntax".to_string()),
            ..ErrorInfo::default()
        };
        let err = DriverExecutionError::new("mysql", info).with_statement("SELEC 1");
        let text = ShellError::from(err).to_string();
        assert!(text.starts_with("mysql error 1064"));
        assert!(text.ends_with("Statement: SELEC 1"));
    }

    #[test]
    fn test_duplicate_key_keeps_driver_message_and_key() {
        let message = "E11000 duplicate key error collection: shop.users index: email_1 dup key: { email: \"a@b.c\" }";
        let info = ErrorInfo {
            code: Some(11000),
            name: Some("DuplicateKey".to_string()),
            message: Some(message.to_string()),
            details: Some(ErrorDetails {
                collection: Some("shop.users".to_string()),
                index: Some("email_1".to_string()),
                key: Some(mongodb::bson::doc! { "email": "a@b.c" }),
            }),
            ..ErrorInfo::default()
        };
        let text = ShellError::from(DriverExecutionError::new("mongodb", info)).to_string();

        assert!(text.starts_with("mongodb error DuplicateKey (11000): E11000 duplicate key error"));
        assert!(text.contains("index: email_1"));
        assert!(text.contains(r#"key: { "email": "a@b.c" }"#));
    }

    #[test]
    fn test_unsupported_names_method() {
        let err: ShellError = UnsupportedOperation::ChainMethod("hint".to_string()).into();
        assert_eq!(err.to_string(), "Unsupported chain method: hint");
    }
}
