//! Chainable queries
//!
//! `find`, `findOne` and `findById` build a [`FindQuery`]. Chained methods
//! are folded onto it through a lookup table before anything is sent to the
//! server; the query runs once, in [`FindQuery::materialize`].

use futures::stream::TryStreamExt;
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use mongodb::options::{CountOptions, FindOneOptions, FindOptions};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{ParseError, Result, UnsupportedOperation};
use crate::parser::mongo::{ChainedOperation, ShellValue};

use super::model::LooseModel;

/// Operations that produce a chainable query
pub const CHAINABLE_OPERATIONS: &[&str] = &["find", "findOne", "findById"];

pub fn is_chainable(operation: &str) -> bool {
    CHAINABLE_OPERATIONS.contains(&operation)
}

/// Reference resolution requested by `populate`
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateSpec {
    /// Field holding the reference(s)
    pub path: String,
    /// Collection the references point into
    pub model: Option<String>,
    /// Projection for the referenced documents
    pub select: Option<Document>,
}

/// Result-shaping step that replaces the document list
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    Count,
    Distinct(String),
}

/// A find query under construction
#[derive(Debug, Clone)]
pub struct FindQuery {
    pub filter: Document,
    pub options: FindOptions,
    /// Return the first match only
    pub single: bool,
    /// Return plain documents
    pub lean: bool,
    pub populate: Vec<PopulateSpec>,
    pub terminal: Option<Terminal>,
}

type ChainHandler = fn(&mut FindQuery, Vec<ShellValue>) -> Result<()>;

static CHAIN_METHODS: LazyLock<HashMap<&'static str, ChainHandler>> = LazyLock::new(|| {
    let mut table: HashMap<&'static str, ChainHandler> = HashMap::new();
    table.insert("limit", chain_limit);
    table.insert("skip", chain_skip);
    table.insert("sort", chain_sort);
    table.insert("select", chain_select);
    table.insert("project", chain_select);
    table.insert("populate", chain_populate);
    table.insert("lean", chain_lean);
    table.insert("exec", |_, _| Ok(()));
    table.insert("count", |query, _| {
        query.terminal = Some(Terminal::Count);
        Ok(())
    });
    table.insert("distinct", chain_distinct);
    table
});

impl FindQuery {
    fn new(filter: Document, single: bool) -> Self {
        Self {
            filter,
            options: FindOptions::default(),
            single,
            lean: true,
            populate: Vec::new(),
            terminal: None,
        }
    }

    /// Build the query for a chainable primary operation
    ///
    /// - `find(filter?, projection?)`
    /// - `findOne(filter?, projection?)`
    /// - `findById(id, projection?)`
    pub fn from_primary(operation: &str, args: Vec<ShellValue>) -> Result<Self> {
        let mut args = args.into_iter();
        let first = args.next();

        let mut query = match operation {
            "find" | "findOne" => {
                let filter = match &first {
                    Some(value) => value.to_document(operation)?,
                    None => Document::new(),
                };
                FindQuery::new(filter, operation == "findOne")
            }
            "findById" => {
                let id = first.ok_or_else(|| {
                    ParseError::invalid_argument(operation, "an id is required")
                })?;
                FindQuery::new(doc! { "_id": id_to_bson(&id)? }, true)
            }
            other => return Err(UnsupportedOperation::Operation(other.to_string()).into()),
        };

        if let Some(projection) = args.next() {
            if !projection.is_absent() {
                query.options.projection = Some(projection_document(operation, &projection)?);
            }
        }

        Ok(query)
    }

    /// Apply chained methods in order
    ///
    /// An unknown method is an error naming it.
    pub fn apply_chain(&mut self, chain: Vec<ChainedOperation>) -> Result<()> {
        for op in chain {
            let handler = CHAIN_METHODS
                .get(op.method.as_str())
                .ok_or_else(|| UnsupportedOperation::ChainMethod(op.method.clone()))?;
            debug!("Applying chain method {}({} args)", op.method, op.args.len());
            handler(self, op.args)?;
        }
        Ok(())
    }

    /// Skip and limit carried into `count()`; `limit(0)` means no limit
    fn count_options(&self) -> CountOptions {
        let mut options = CountOptions::default();
        options.skip = self.options.skip;
        options.limit = self
            .options
            .limit
            .filter(|&limit| limit != 0)
            .map(i64::unsigned_abs);
        options
    }

    /// Execute the query
    ///
    /// # Returns
    /// * `Result<Bson>` - Document array, single document (or null), count or distinct values
    pub async fn materialize(self, model: &LooseModel) -> Result<Bson> {
        let collection = model.collection();

        match &self.terminal {
            Some(Terminal::Count) => {
                let options = self.count_options();
                let count = collection
                    .count_documents(self.filter)
                    .with_options(options)
                    .await?;
                return Ok(Bson::Int64(count as i64));
            }
            Some(Terminal::Distinct(field)) => {
                let values = collection.distinct(field, self.filter).await?;
                return Ok(Bson::Array(values));
            }
            None => {}
        }

        if !self.lean {
            debug!("Non-lean query requested; loose documents are always plain");
        }

        let mut documents = if self.single {
            let mut options = FindOneOptions::default();
            options.projection = self.options.projection.clone();
            options.sort = self.options.sort.clone();
            options.skip = self.options.skip;
            match collection.find_one(self.filter).with_options(options).await? {
                Some(document) => vec![document],
                None => return Ok(Bson::Null),
            }
        } else {
            let cursor = collection.find(self.filter).with_options(self.options).await?;
            cursor.try_collect::<Vec<Document>>().await?
        };

        for spec in &self.populate {
            populate(model, spec, &mut documents).await?;
        }

        let mut documents = documents.into_iter().map(Bson::Document);
        if self.single {
            Ok(documents.next().unwrap_or(Bson::Null))
        } else {
            Ok(Bson::Array(documents.collect()))
        }
    }
}

/// Replace reference ids under `spec.path` with the referenced documents
async fn populate(model: &LooseModel, spec: &PopulateSpec, documents: &mut [Document]) -> Result<()> {
    let Some(target) = &spec.model else {
        debug!("populate('{}') without a model leaves documents unchanged", spec.path);
        return Ok(());
    };
    let related = model.related(target);

    for document in documents.iter_mut() {
        let Some(reference) = document.get(&spec.path).cloned() else {
            continue;
        };

        let mut options = FindOptions::default();
        options.projection = spec.select.clone();

        let resolved = match reference {
            Bson::Array(ids) => {
                let found: Vec<Document> = related
                    .find(doc! { "_id": { "$in": ids.clone() } })
                    .with_options(options)
                    .await?
                    .try_collect()
                    .await?;
                // Keep the order of the reference list.
                let resolved = ids
                    .iter()
                    .filter_map(|id| found.iter().find(|d| d.get("_id") == Some(id)).cloned())
                    .map(Bson::Document)
                    .collect();
                Bson::Array(resolved)
            }
            Bson::Null => continue,
            id => {
                let mut one = FindOneOptions::default();
                one.projection = spec.select.clone();
                match related.find_one(doc! { "_id": id }).with_options(one).await? {
                    Some(found) => Bson::Document(found),
                    None => Bson::Null,
                }
            }
        };

        document.insert(spec.path.clone(), resolved);
    }

    Ok(())
}

/* ========================= Chain handlers ========================= */

fn chain_limit(query: &mut FindQuery, args: Vec<ShellValue>) -> Result<()> {
    query.options.limit = Some(integer_arg("limit", &args)?);
    Ok(())
}

fn chain_skip(query: &mut FindQuery, args: Vec<ShellValue>) -> Result<()> {
    let skip = integer_arg("skip", &args)?;
    if skip < 0 {
        return Err(ParseError::invalid_argument("skip", "must not be negative").into());
    }
    query.options.skip = Some(skip as u64);
    Ok(())
}

fn chain_sort(query: &mut FindQuery, args: Vec<ShellValue>) -> Result<()> {
    let spec = args
        .first()
        .ok_or_else(|| ParseError::invalid_argument("sort", "a sort specification is required"))?;

    query.options.sort = Some(match spec {
        ShellValue::String(text) | ShellValue::Raw(text) => string_spec(text, 1, -1),
        other => other.to_document("sort")?,
    });
    Ok(())
}

fn chain_select(query: &mut FindQuery, args: Vec<ShellValue>) -> Result<()> {
    let spec = args
        .first()
        .ok_or_else(|| ParseError::invalid_argument("select", "a projection is required"))?;
    query.options.projection = Some(projection_document("select", spec)?);
    Ok(())
}

fn chain_populate(query: &mut FindQuery, args: Vec<ShellValue>) -> Result<()> {
    let spec = match args.first() {
        Some(ShellValue::String(path)) | Some(ShellValue::Raw(path)) => PopulateSpec {
            path: path.clone(),
            model: args.get(1).and_then(|m| m.as_str()).map(str::to_string),
            select: None,
        },
        Some(value @ ShellValue::Object(_)) => {
            let options = value.to_document("populate")?;
            let path = options
                .get_str("path")
                .map_err(|_| ParseError::invalid_argument("populate", "`path` is required"))?
                .to_string();
            let select = match options.get("select") {
                Some(Bson::String(text)) => Some(string_spec(text, 1, 0)),
                Some(Bson::Document(doc)) => Some(doc.clone()),
                _ => None,
            };
            PopulateSpec {
                path,
                model: options.get_str("model").ok().map(str::to_string),
                select,
            }
        }
        _ => {
            return Err(
                ParseError::invalid_argument("populate", "expected a path or an options object")
                    .into(),
            );
        }
    };
    query.populate.push(spec);
    Ok(())
}

fn chain_lean(query: &mut FindQuery, args: Vec<ShellValue>) -> Result<()> {
    query.lean = args.first().and_then(ShellValue::as_bool).unwrap_or(true);
    Ok(())
}

fn chain_distinct(query: &mut FindQuery, args: Vec<ShellValue>) -> Result<()> {
    let field = args
        .first()
        .and_then(ShellValue::as_str)
        .ok_or_else(|| ParseError::invalid_argument("distinct", "a field name is required"))?;
    query.terminal = Some(Terminal::Distinct(field.to_string()));
    Ok(())
}

/* ========================= Argument helpers ========================= */

fn integer_arg(method: &str, args: &[ShellValue]) -> Result<i64> {
    args.first()
        .and_then(ShellValue::as_i64)
        .ok_or_else(|| ParseError::invalid_argument(method, "expected an integer").into())
}

/// Object projection or a space-separated field list (`"name -_id"`)
fn projection_document(operation: &str, value: &ShellValue) -> Result<Document> {
    match value {
        ShellValue::String(text) | ShellValue::Raw(text) => Ok(string_spec(text, 1, 0)),
        other => other.to_document(operation),
    }
}

/// `"a -b +c"` → `{a: plus, b: minus, c: plus}`
fn string_spec(text: &str, plus: i32, minus: i32) -> Document {
    let mut spec = Document::new();
    for field in text.split_whitespace() {
        match field.strip_prefix('-') {
            Some(name) => spec.insert(name, minus),
            None => spec.insert(field.trim_start_matches('+'), plus),
        };
    }
    spec
}

/// Ids given as 24-char hex strings are treated as ObjectIds
pub(crate) fn id_to_bson(id: &ShellValue) -> Result<Bson> {
    match id {
        ShellValue::String(s) | ShellValue::Raw(s) => Ok(ObjectId::parse_str(s)
            .map(Bson::ObjectId)
            .unwrap_or_else(|_| Bson::String(s.clone()))),
        other => other.to_bson(),
    }
}
