use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error information extracted from driver errors.
///
/// This is intended to be serialized to JSON and consumed by other
/// components (e.g. logging, APIs).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) details: Option<ErrorDetails>,
}

/// Additional error details extracted from a MongoDB write error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) key: Option<bson::Document>,
}

impl ErrorInfo {
    /// Driver error code, if the backend reported one.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Extract structured information from a MongoDB error using the driver API.
///
/// This avoids string parsing where possible by using the driver's typed error
/// structures directly.
pub fn from_mongodb_error(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::{ErrorKind, WriteFailure};

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Write(write_failure) => {
            info.error_type = Some("mongo.write_error".to_string());

            match write_failure {
                WriteFailure::WriteError(write_error) => {
                    info.code = Some(write_error.code);
                    info.message = Some(write_error.message.clone());
                    info.name = mongo_error_name(write_error.code);
                    info.details = Some(extract_from_details_and_message(
                        &write_error.details,
                        &write_error.message,
                    ));
                }
                WriteFailure::WriteConcernError(wc_error) => {
                    info.code = Some(wc_error.code);
                    info.message = Some(wc_error.message.clone());
                    info.name = mongo_error_name(wc_error.code);
                }
                _ => {}
            }
        }
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
            info.name = Some(command_error.code_name.clone()).filter(|n| !n.is_empty());
        }
        ErrorKind::InsertMany(insert_error) => {
            info.error_type = Some("mongo.insert_many_error".to_string());

            if let Some(first_error) = insert_error.write_errors.as_ref().and_then(|e| e.first()) {
                info.code = Some(first_error.code);
                info.message = Some(first_error.message.clone());
                info.name = mongo_error_name(first_error.code);
                info.details = Some(extract_from_details_and_message(
                    &first_error.details,
                    &first_error.message,
                ));
            } else if let Some(wc_error) = &insert_error.write_concern_error {
                info.code = Some(wc_error.code);
                info.message = Some(wc_error.message.clone());
                info.name = mongo_error_name(wc_error.code);
            }
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("mongo.authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("mongo.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info
}

impl ErrorDetails {
    fn is_empty(&self) -> bool {
        self.collection.is_none() && self.index.is_none() && self.key.is_none()
    }
}

/// `collection: shop.users, index: email_1, key: { "email": 1 }`
impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(collection) = &self.collection {
            parts.push(format!("collection: {collection}"));
        }
        if let Some(index) = &self.index {
            parts.push(format!("index: {index}"));
        }
        if let Some(key) = &self.key {
            parts.push(format!("key: {key}"));
        }
        f.write_str(&parts.join(", "))
    }
}

/// Details worth showing next to the driver message, if any were extracted
pub(crate) fn shown_details(info: &ErrorInfo) -> Option<&ErrorDetails> {
    info.details.as_ref().filter(|d| !d.is_empty())
}

/// Extract structured information from a MySQL error.
///
/// Server-side errors carry the MySQL error number and SQLSTATE; everything
/// else (I/O, protocol, decode) is reported by message only.
pub fn from_sqlx_error(error: &sqlx::Error) -> ErrorInfo {
    match error {
        sqlx::Error::Database(db_error) => {
            let mut info = ErrorInfo {
                error_type: Some("mysql.server_error".to_string()),
                message: Some(db_error.message().to_string()),
                name: db_error.code().map(|c| c.into_owned()),
                ..ErrorInfo::default()
            };
            if let Some(mysql) = db_error.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
                info.code = Some(i32::from(mysql.number()));
            }
            info
        }
        sqlx::Error::ColumnDecode { index, source } => ErrorInfo {
            error_type: Some("mysql.decode_error".to_string()),
            message: Some(format!("column {index}: {source}")),
            ..ErrorInfo::default()
        },
        other => ErrorInfo {
            error_type: Some("mysql.client_error".to_string()),
            message: Some(other.to_string()),
            ..ErrorInfo::default()
        },
    }
}

/// Extract structured information from a Redis error.
///
/// Redis replies errors as `CODE detail`; the code (`ERR`, `WRONGTYPE`, ...)
/// becomes the error name.
pub fn from_redis_error(error: &redis::RedisError) -> ErrorInfo {
    let message = match error.detail() {
        Some(detail) => detail.to_string(),
        None => error.to_string(),
    };
    ErrorInfo {
        error_type: Some(format!("redis.{:?}", error.kind()).to_lowercase()),
        name: error.code().map(str::to_string),
        message: Some(message),
        ..ErrorInfo::default()
    }
}

/// Get a human-readable error name from a MongoDB error code.
fn mongo_error_name(code: i32) -> Option<String> {
    let name = match code {
        11000 | 11001 => "DuplicateKey",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        50 => "MaxTimeMSExpired",
        121 => "DocumentValidationFailure",
        _ => return None,
    };

    Some(name.to_string())
}

/// Extract error details from an optional BSON document and a message string.
///
/// The BSON document is preferred; if it does not contain the necessary
/// information, a best-effort extraction from the message string is attempted.
fn extract_from_details_and_message(
    error_details: &Option<bson::Document>,
    message: &str,
) -> ErrorDetails {
    let mut details = ErrorDetails {
        collection: None,
        index: None,
        key: None,
    };

    if let Some(doc) = error_details {
        if let Some(bson::Bson::String(ns)) = doc.get("namespace").or_else(|| doc.get("ns")) {
            details.collection = Some(ns.clone());
        }
        if let Some(bson::Bson::String(idx)) = doc.get("index").or_else(|| doc.get("indexName")) {
            details.index = Some(idx.clone());
        }
        if let Some(bson::Bson::Document(key_doc)) =
            doc.get("keyValue").or_else(|| doc.get("keyPattern"))
        {
            details.key = Some(key_doc.clone());
        }
    }

    if details.collection.is_none() {
        details.collection = word_after(message, "collection: ");
    }
    if details.index.is_none() {
        details.index = word_after(message, "index: ");
    }

    details
}

fn word_after(message: &str, marker: &str) -> Option<String> {
    let start = message.find(marker)? + marker.len();
    let rest = &message[start..];
    let end = rest.find(' ')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_name_lookup() {
        assert_eq!(mongo_error_name(11000).as_deref(), Some("DuplicateKey"));
        assert_eq!(mongo_error_name(26).as_deref(), Some("NamespaceNotFound"));
        assert!(mongo_error_name(1).is_none());
    }

    #[test]
    fn test_details_fall_back_to_message() {
        let message = "E11000 duplicate key error collection: shop.users index: email_1 dup key";
        let details = extract_from_details_and_message(&None, message);
        assert_eq!(details.collection.as_deref(), Some("shop.users"));
        assert_eq!(details.index.as_deref(), Some("email_1"));
    }

    #[test]
    fn test_redis_error_keeps_code() {
        let err = redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "Operation against a key holding the wrong kind of value",
        ));
        let info = from_redis_error(&err);
        assert!(info.message.is_some());
    }

    #[test]
    fn test_sqlx_client_error_message() {
        let info = from_sqlx_error(&sqlx::Error::RowNotFound);
        assert_eq!(info.error_type.as_deref(), Some("mysql.client_error"));
        assert!(info.code.is_none());
    }

    #[test]
    fn test_error_info_json_skips_empty_fields() {
        let info = ErrorInfo {
            message: Some("boom".to_string()),
            ..ErrorInfo::default()
        };
        assert_eq!(info.to_json_compact().unwrap(), r#"{"message":"boom"}"#);
    }

    #[test]
    fn test_details_display() {
        let details = ErrorDetails {
            collection: Some("shop.users".to_string()),
            index: Some("email_1".to_string()),
            key: Some(bson::doc! { "email": "a@b.c" }),
        };
        assert_eq!(
            details.to_string(),
            r#"collection: shop.users, index: email_1, key: { "email": "a@b.c" }"#
        );

        let empty = ErrorDetails {
            collection: None,
            index: None,
            key: None,
        };
        let info = ErrorInfo {
            details: Some(empty),
            ..ErrorInfo::default()
        };
        assert!(shown_details(&info).is_none());
    }
}
