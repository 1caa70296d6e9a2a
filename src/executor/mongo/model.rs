//! Schema-less collection model and its immediate operations
//!
//! Every collection is bound on demand to a [`LooseModel`] that accepts any
//! document shape. Operations that do not build a query run straight away
//! through the handler table below.

use futures::future::BoxFuture;
use futures::stream::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::options::{
    FindOneAndDeleteOptions, FindOneAndReplaceOptions, FindOneAndUpdateOptions, IndexOptions,
    ReplaceOptions, ReturnDocument, UpdateModifications, UpdateOptions,
};
use mongodb::{Client, Collection, Database, IndexModel};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::error::{ParseError, Result, ShellError, UnsupportedOperation};
use crate::parser::mongo::ShellValue;

/// Collection handle accepting arbitrary documents
#[derive(Debug, Clone)]
pub struct LooseModel {
    client: Client,
    database: Database,
    collection: Collection<Document>,
}

impl LooseModel {
    /// Bind `name` in `database`
    pub fn bind(client: &Client, database: &Database, name: &str) -> Self {
        Self {
            client: client.clone(),
            database: database.clone(),
            collection: database.collection(name),
        }
    }

    pub fn collection(&self) -> &Collection<Document> {
        &self.collection
    }

    pub fn name(&self) -> &str {
        self.collection.name()
    }

    /// Another collection in the same database
    pub fn related(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    /// Run the immediate operation `operation`
    pub async fn run(&self, operation: &str, args: Vec<ShellValue>) -> Result<Bson> {
        let handler = OPERATIONS
            .get(operation)
            .ok_or_else(|| UnsupportedOperation::Operation(operation.to_string()))?;
        debug!("Executing {}.{}({} args)", self.name(), operation, args.len());
        handler(self, args).await
    }
}

type OpFuture<'a> = BoxFuture<'a, Result<Bson>>;
type OpHandler = fn(&LooseModel, Vec<ShellValue>) -> OpFuture<'_>;

static OPERATIONS: LazyLock<HashMap<&'static str, OpHandler>> = LazyLock::new(|| {
    let mut table: HashMap<&'static str, OpHandler> = HashMap::new();
    table.insert("insertOne", insert_one);
    table.insert("insertMany", insert_many);
    table.insert("insert", insert);
    table.insert("updateOne", update_one);
    table.insert("updateMany", update_many);
    table.insert("update", update);
    table.insert("replaceOne", replace_one);
    table.insert("deleteOne", delete_one);
    table.insert("deleteMany", delete_many);
    table.insert("remove", remove);
    table.insert("findOneAndUpdate", find_one_and_update);
    table.insert("findOneAndDelete", find_one_and_delete);
    table.insert("findOneAndReplace", find_one_and_replace);
    table.insert("aggregate", aggregate);
    table.insert("countDocuments", count_documents);
    table.insert("count", count_documents);
    table.insert("estimatedDocumentCount", estimated_document_count);
    table.insert("distinct", distinct);
    table.insert("createIndex", create_index);
    table.insert("dropIndex", drop_index);
    table.insert("dropIndexes", drop_indexes);
    table.insert("getIndexes", get_indexes);
    table.insert("drop", drop);
    table.insert("renameCollection", rename_collection);
    table.insert("stats", stats);
    table
});

/// Whether `operation` has an immediate handler
pub(super) fn is_immediate(operation: &str) -> bool {
    OPERATIONS.contains_key(operation)
}

/* ========================= Argument helpers ========================= */

struct Args {
    operation: &'static str,
    values: std::vec::IntoIter<ShellValue>,
}

impl Args {
    fn new(operation: &'static str, values: Vec<ShellValue>) -> Self {
        Self {
            operation,
            values: values.into_iter(),
        }
    }

    fn document(&mut self) -> Result<Document> {
        match self.values.next() {
            Some(value) => value.to_document(self.operation),
            None => Ok(Document::new()),
        }
    }

    fn required_document(&mut self, what: &str) -> Result<Document> {
        match self.values.next() {
            Some(value) if !value.is_absent() => value.to_document(self.operation),
            _ => Err(self.missing(what)),
        }
    }

    fn documents(&mut self, what: &str) -> Result<Vec<Document>> {
        match self.values.next() {
            Some(value @ ShellValue::Array(_)) => match value.to_bson()? {
                Bson::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Bson::Document(doc) => Ok(doc),
                        _ => Err(ParseError::invalid_argument(
                            self.operation,
                            format!("{what} must contain only objects"),
                        )
                        .into()),
                    })
                    .collect(),
                _ => Err(self.missing(what)),
            },
            _ => Err(self.missing(what)),
        }
    }

    /// An update document or an aggregation pipeline
    fn update(&mut self) -> Result<UpdateModifications> {
        match self.values.next() {
            Some(value @ ShellValue::Array(_)) => {
                let values = vec![value];
                let mut inner = Args::new(self.operation, values);
                Ok(UpdateModifications::Pipeline(inner.documents("update pipeline")?))
            }
            Some(value) if !value.is_absent() => {
                Ok(UpdateModifications::Document(value.to_document(self.operation)?))
            }
            _ => Err(self.missing("an update")),
        }
    }

    fn string(&mut self, what: &str) -> Result<String> {
        match self.values.next() {
            Some(value) => value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| self.missing(what)),
            None => Err(self.missing(what)),
        }
    }

    fn next(&mut self) -> Option<ShellValue> {
        self.values.next().filter(|v| !v.is_absent())
    }

    fn missing(&self, what: &str) -> ShellError {
        ParseError::invalid_argument(self.operation, format!("{what} is required")).into()
    }
}

/// Upsert and array filters shared by update-style options
struct WriteOptions {
    upsert: Option<bool>,
    array_filters: Option<Vec<Document>>,
    multi: bool,
}

impl WriteOptions {
    fn from_document(options: &Document) -> Self {
        Self {
            upsert: options.get_bool("upsert").ok(),
            array_filters: options.get_array("arrayFilters").ok().map(|filters| {
                filters
                    .iter()
                    .filter_map(|f| f.as_document().cloned())
                    .collect()
            }),
            multi: options.get_bool("multi").unwrap_or(false),
        }
    }

    fn update_options(&self) -> UpdateOptions {
        let mut options = UpdateOptions::default();
        options.upsert = self.upsert;
        options.array_filters = self.array_filters.clone();
        options
    }
}

fn returns_new_document(options: &Document) -> bool {
    options.get_str("returnDocument").ok() == Some("after")
        || options.get_bool("returnNewDocument").unwrap_or(false)
        || options.get_bool("new").unwrap_or(false)
}

fn option_document(options: &Document, key: &str) -> Option<Document> {
    options.get_document(key).ok().cloned()
}

fn acknowledged(body: Document) -> Bson {
    let mut result = doc! { "acknowledged": true };
    result.extend(body);
    Bson::Document(result)
}

/* ========================= Inserts ========================= */

fn insert_one(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let document = Args::new("insertOne", args).required_document("a document")?;
        let result = model.collection.insert_one(document).await?;
        Ok(acknowledged(doc! { "insertedId": result.inserted_id }))
    })
}

fn insert_many(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let documents = Args::new("insertMany", args).documents("an array of documents")?;
        let result = model.collection.insert_many(documents).await?;

        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        let ids: Vec<Bson> = ids.into_iter().map(|(_, id)| id).collect();

        info!("Inserted {} documents into '{}'", ids.len(), model.name());
        Ok(acknowledged(doc! { "insertedIds": ids }))
    })
}

/// Legacy `insert`: a single document or an array
fn insert(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    if matches!(args.first(), Some(ShellValue::Array(_))) {
        insert_many(model, args)
    } else {
        insert_one(model, args)
    }
}

/* ========================= Updates ========================= */

fn update_result(result: mongodb::results::UpdateResult) -> Bson {
    acknowledged(doc! {
        "matchedCount": result.matched_count as i64,
        "modifiedCount": result.modified_count as i64,
        "upsertedId": result.upserted_id.unwrap_or(Bson::Null),
    })
}

async fn run_update(
    model: &LooseModel,
    operation: &'static str,
    args: Vec<ShellValue>,
    many: Option<bool>,
) -> Result<Bson> {
    let mut args = Args::new(operation, args);
    let filter = args.document()?;
    let update = args.update()?;
    let options = WriteOptions::from_document(&args.document()?);
    let many = many.unwrap_or(options.multi);

    let result = if many {
        model
            .collection
            .update_many(filter, update)
            .with_options(options.update_options())
            .await?
    } else {
        model
            .collection
            .update_one(filter, update)
            .with_options(options.update_options())
            .await?
    };
    Ok(update_result(result))
}

fn update_one(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(run_update(model, "updateOne", args, Some(false)))
}

fn update_many(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(run_update(model, "updateMany", args, Some(true)))
}

/// Legacy `update`: `{multi: true}` selects updateMany
fn update(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(run_update(model, "update", args, None))
}

fn replace_one(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let mut args = Args::new("replaceOne", args);
        let filter = args.document()?;
        let replacement = args.required_document("a replacement document")?;
        let write = WriteOptions::from_document(&args.document()?);

        let mut options = ReplaceOptions::default();
        options.upsert = write.upsert;

        let result = model
            .collection
            .replace_one(filter, replacement)
            .with_options(options)
            .await?;
        Ok(update_result(result))
    })
}

/* ========================= Deletes ========================= */

async fn run_delete(model: &LooseModel, filter: Document, many: bool) -> Result<Bson> {
    let result = if many {
        model.collection.delete_many(filter).await?
    } else {
        model.collection.delete_one(filter).await?
    };
    Ok(acknowledged(doc! { "deletedCount": result.deleted_count as i64 }))
}

fn delete_one(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let filter = Args::new("deleteOne", args).document()?;
        run_delete(model, filter, false).await
    })
}

fn delete_many(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let filter = Args::new("deleteMany", args).document()?;
        run_delete(model, filter, true).await
    })
}

/// Legacy `remove(filter, justOne?)`
fn remove(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let mut args = Args::new("remove", args);
        let filter = args.document()?;
        let just_one = match args.next() {
            Some(ShellValue::Bool(b)) => b,
            Some(ShellValue::Object(map)) => map
                .get("justOne")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            _ => false,
        };
        run_delete(model, filter, !just_one).await
    })
}

/* ========================= Find and modify ========================= */

fn optional_document(document: Option<Document>) -> Bson {
    document.map(Bson::Document).unwrap_or(Bson::Null)
}

fn find_one_and_update(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let mut args = Args::new("findOneAndUpdate", args);
        let filter = args.document()?;
        let update = args.update()?;
        let raw = args.document()?;
        let write = WriteOptions::from_document(&raw);

        let mut options = FindOneAndUpdateOptions::default();
        if returns_new_document(&raw) {
            options.return_document = Some(ReturnDocument::After);
        }
        options.upsert = write.upsert;
        options.array_filters = write.array_filters;
        options.sort = option_document(&raw, "sort");
        options.projection = option_document(&raw, "projection");

        let found = model
            .collection
            .find_one_and_update(filter, update)
            .with_options(options)
            .await?;
        Ok(optional_document(found))
    })
}

fn find_one_and_delete(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let mut args = Args::new("findOneAndDelete", args);
        let filter = args.document()?;
        let raw = args.document()?;

        let mut options = FindOneAndDeleteOptions::default();
        options.sort = option_document(&raw, "sort");
        options.projection = option_document(&raw, "projection");

        let found = model
            .collection
            .find_one_and_delete(filter)
            .with_options(options)
            .await?;
        Ok(optional_document(found))
    })
}

fn find_one_and_replace(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let mut args = Args::new("findOneAndReplace", args);
        let filter = args.document()?;
        let replacement = args.required_document("a replacement document")?;
        let raw = args.document()?;

        let mut options = FindOneAndReplaceOptions::default();
        if returns_new_document(&raw) {
            options.return_document = Some(ReturnDocument::After);
        }
        options.upsert = WriteOptions::from_document(&raw).upsert;
        options.sort = option_document(&raw, "sort");
        options.projection = option_document(&raw, "projection");

        let found = model
            .collection
            .find_one_and_replace(filter, replacement)
            .with_options(options)
            .await?;
        Ok(optional_document(found))
    })
}

/* ========================= Reads ========================= */

fn aggregate(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let pipeline = Args::new("aggregate", args).documents("a pipeline array")?;
        let results: Vec<Document> = model
            .collection
            .aggregate(pipeline)
            .await?
            .try_collect()
            .await?;
        Ok(Bson::Array(results.into_iter().map(Bson::Document).collect()))
    })
}

fn count_documents(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let filter = Args::new("countDocuments", args).document()?;
        let count = model.collection.count_documents(filter).await?;
        Ok(Bson::Int64(count as i64))
    })
}

fn estimated_document_count(model: &LooseModel, _args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let count = model.collection.estimated_document_count().await?;
        Ok(Bson::Int64(count as i64))
    })
}

fn distinct(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let mut args = Args::new("distinct", args);
        let field = args.string("a field name")?;
        let filter = args.document()?;
        let values = model.collection.distinct(field, filter).await?;
        Ok(Bson::Array(values))
    })
}

/* ========================= Indexes and collection ========================= */

fn create_index(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let mut args = Args::new("createIndex", args);
        let keys = args.required_document("an index key specification")?;
        let options = match args.next() {
            Some(value) => {
                let raw = value.to_document("createIndex")?;
                let parsed: IndexOptions = bson::from_document(raw).map_err(|e| {
                    ParseError::invalid_argument("createIndex", format!("invalid index options: {e}"))
                })?;
                Some(parsed)
            }
            None => None,
        };

        let index = IndexModel::builder().keys(keys).options(options).build();
        let result = model.collection.create_index(index).await?;
        info!("Created index '{}' on '{}'", result.index_name, model.name());
        Ok(Bson::String(result.index_name))
    })
}

/// `dropIndex(name | keys)` via the server command, which accepts both forms
fn drop_index(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let index = Args::new("dropIndex", args)
            .next()
            .ok_or_else(|| ParseError::invalid_argument("dropIndex", "an index name or key specification is required"))?
            .to_bson()?;
        let reply = model
            .database
            .run_command(doc! { "dropIndexes": model.name(), "index": index })
            .await?;
        Ok(Bson::Document(reply))
    })
}

fn drop_indexes(model: &LooseModel, _args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let reply = model
            .database
            .run_command(doc! { "dropIndexes": model.name(), "index": "*" })
            .await?;
        Ok(Bson::Document(reply))
    })
}

fn get_indexes(model: &LooseModel, _args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let indexes: Vec<IndexModel> = model.collection.list_indexes().await?.try_collect().await?;
        let documents = indexes
            .iter()
            .map(|index| {
                bson::to_document(index)
                    .map(Bson::Document)
                    .map_err(|e| ShellError::Generic(format!("failed to convert index: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Bson::Array(documents))
    })
}

fn drop(model: &LooseModel, _args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        model.collection.drop().await?;
        info!("Dropped collection '{}'", model.name());
        Ok(Bson::Boolean(true))
    })
}

fn rename_collection(model: &LooseModel, args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let mut args = Args::new("renameCollection", args);
        let target = args.string("a target collection name")?;
        let drop_target = matches!(args.next(), Some(ShellValue::Bool(true)));

        let db = model.database.name();
        let reply = model
            .client
            .database("admin")
            .run_command(doc! {
                "renameCollection": format!("{db}.{}", model.name()),
                "to": format!("{db}.{target}"),
                "dropTarget": drop_target,
            })
            .await?;
        Ok(Bson::Document(reply))
    })
}

fn stats(model: &LooseModel, _args: Vec<ShellValue>) -> OpFuture<'_> {
    Box::pin(async move {
        let reply = model
            .database
            .run_command(doc! { "collStats": model.name() })
            .await?;
        Ok(Bson::Document(reply))
    })
}
