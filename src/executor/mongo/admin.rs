//! Database-level and shell commands
//!
//! `show <target>` and `db.<op>(...)` forms that do not name a collection.

use futures::future::BoxFuture;
use mongodb::bson::{Bson, Document, doc};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::error::{ParseError, Result, UnsupportedOperation};
use crate::parser::mongo::ShellValue;

use super::MongoSession;

type AdminFuture<'a> = BoxFuture<'a, Result<Bson>>;
type AdminHandler = fn(&MongoSession, Vec<ShellValue>) -> AdminFuture<'_>;

static ADMIN_OPERATIONS: LazyLock<HashMap<&'static str, AdminHandler>> = LazyLock::new(|| {
    let mut table: HashMap<&'static str, AdminHandler> = HashMap::new();
    table.insert("stats", db_stats);
    table.insert("serverStatus", server_status);
    table.insert("createUser", create_user);
    table.insert("dropUser", drop_user);
    table.insert("getUsers", get_users);
    table.insert("createCollection", create_collection);
    table.insert("dropDatabase", drop_database);
    table.insert("runCommand", run_command);
    table.insert("adminCommand", admin_command);
    table.insert("getCollectionNames", collection_names);
    table.insert("getName", get_name);
    table.insert("version", version);
    table
});

/// Run `db.<operation>(args)`
pub async fn run(session: &MongoSession, operation: &str, args: Vec<ShellValue>) -> Result<Bson> {
    let handler = ADMIN_OPERATIONS
        .get(operation)
        .ok_or_else(|| UnsupportedOperation::Operation(operation.to_string()))?;
    debug!("Executing db.{}({} args)", operation, args.len());
    handler(session, args).await
}

/// `show dbs|databases|collections|users|roles`
pub async fn show(session: &MongoSession, target: &str) -> Result<Bson> {
    match target {
        "dbs" | "databases" => {
            let mut names = session.client.list_database_names().await?;
            names.sort();
            Ok(strings(names))
        }
        "collections" => collection_names(session, Vec::new()).await,
        "users" => {
            let reply = session.database.run_command(doc! { "usersInfo": 1 }).await?;
            Ok(reply.get("users").cloned().unwrap_or(Bson::Array(Vec::new())))
        }
        "roles" => {
            let reply = session
                .database
                .run_command(doc! { "rolesInfo": 1, "showBuiltinRoles": true })
                .await?;
            Ok(reply.get("roles").cloned().unwrap_or(Bson::Array(Vec::new())))
        }
        other => Err(ParseError::UnsupportedCommand(format!("show {other}")).into()),
    }
}

fn strings(items: Vec<String>) -> Bson {
    Bson::Array(items.into_iter().map(Bson::String).collect())
}

/// Command document from an object, or `{name: 1}` from a bare command name
fn command_document(operation: &str, value: Option<&ShellValue>) -> Result<Document> {
    match value {
        Some(ShellValue::String(name)) | Some(ShellValue::Raw(name)) => {
            let mut command = Document::new();
            command.insert(name.as_str(), 1);
            Ok(command)
        }
        Some(value) if !value.is_absent() => value.to_document(operation),
        _ => Err(ParseError::invalid_argument(operation, "a command document is required").into()),
    }
}

fn db_stats(session: &MongoSession, args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(async move {
        let mut command = doc! { "dbStats": 1 };
        if let Some(scale) = args.first().and_then(ShellValue::as_i64) {
            command.insert("scale", scale);
        }
        Ok(Bson::Document(session.database.run_command(command).await?))
    })
}

fn server_status(session: &MongoSession, _args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(async move {
        let reply = session
            .client
            .database("admin")
            .run_command(doc! { "serverStatus": 1 })
            .await?;
        Ok(Bson::Document(reply))
    })
}

/// `createUser({user, pwd, roles, ...})`
fn create_user(session: &MongoSession, args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(async move {
        let mut spec = command_document("createUser", args.first())?;
        let user = spec
            .remove("user")
            .and_then(|u| u.as_str().map(str::to_string))
            .ok_or_else(|| ParseError::invalid_argument("createUser", "`user` is required"))?;

        let mut command = doc! { "createUser": user.as_str() };
        if !spec.contains_key("roles") {
            command.insert("roles", Bson::Array(Vec::new()));
        }
        command.extend(spec);

        let reply = session.database.run_command(command).await?;
        info!("Created user '{}' on '{}'", user, session.database.name());
        Ok(Bson::Document(reply))
    })
}

fn drop_user(session: &MongoSession, args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(async move {
        let user = args
            .first()
            .and_then(ShellValue::as_str)
            .ok_or_else(|| ParseError::invalid_argument("dropUser", "a user name is required"))?;
        let reply = session.database.run_command(doc! { "dropUser": user }).await?;
        Ok(Bson::Document(reply))
    })
}

fn get_users(session: &MongoSession, _args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(show(session, "users"))
}

/// `createCollection(name, options?)`; options are passed to the server as-is
fn create_collection(session: &MongoSession, args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(async move {
        let mut args = args.into_iter();
        let name = args
            .next()
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| {
                ParseError::invalid_argument("createCollection", "a collection name is required")
            })?;

        let mut command = doc! { "create": name.as_str() };
        if let Some(options) = args.next() {
            command.extend(options.to_document("createCollection")?);
        }

        let reply = session.database.run_command(command).await?;
        info!("Created collection '{}'", name);
        Ok(Bson::Document(reply))
    })
}

fn drop_database(session: &MongoSession, _args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(async move {
        let name = session.database.name().to_string();
        session.database.drop().await?;
        info!("Dropped database '{}'", name);
        Ok(Bson::Document(doc! { "ok": 1, "dropped": name }))
    })
}

fn run_command(session: &MongoSession, args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(async move {
        let command = command_document("runCommand", args.first())?;
        Ok(Bson::Document(session.database.run_command(command).await?))
    })
}

fn admin_command(session: &MongoSession, args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(async move {
        let command = command_document("adminCommand", args.first())?;
        let reply = session.client.database("admin").run_command(command).await?;
        Ok(Bson::Document(reply))
    })
}

fn collection_names(session: &MongoSession, _args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(async move {
        let mut names = session.database.list_collection_names().await?;
        names.sort();
        Ok(strings(names))
    })
}

fn get_name(session: &MongoSession, _args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(async move { Ok(Bson::String(session.database.name().to_string())) })
}

fn version(session: &MongoSession, _args: Vec<ShellValue>) -> AdminFuture<'_> {
    Box::pin(async move {
        let reply = session
            .client
            .database("admin")
            .run_command(doc! { "buildInfo": 1 })
            .await?;
        Ok(reply.get("version").cloned().unwrap_or(Bson::Null))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShellError;

    #[test]
    fn test_command_document_forms() {
        assert_eq!(
            command_document("runCommand", Some(&ShellValue::String("ping".into()))).unwrap(),
            doc! { "ping": 1 }
        );

        let value = ShellValue::coerce("{collStats: 'users', scale: 1024}").unwrap();
        assert_eq!(
            command_document("runCommand", Some(&value)).unwrap(),
            doc! { "collStats": "users", "scale": 1024 }
        );
    }

    #[test]
    fn test_command_document_requires_argument() {
        assert!(matches!(
            command_document("runCommand", None),
            Err(ShellError::Parse(ParseError::InvalidArgument { .. }))
        ));
        assert!(command_document("runCommand", Some(&ShellValue::Null)).is_err());
    }

    #[test]
    fn test_admin_table() {
        for op in ["stats", "serverStatus", "createUser", "dropDatabase", "getName", "version"] {
            assert!(ADMIN_OPERATIONS.contains_key(op), "missing admin op {op}");
        }
        assert!(!ADMIN_OPERATIONS.contains_key("shutdownServer"));
    }
}
