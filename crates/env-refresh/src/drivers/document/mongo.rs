//! MongoDB driver.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::results::CollectionType;
use mongodb::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{redact_uri, MongoEndpoint};
use crate::core::{Fields, RowSender};
use crate::error::{RefreshError, Result};

use super::client::{CollectionInfo, DocumentClient};

const STORE: &str = "document";

/// Server error code for a duplicate key.
const DUPLICATE_KEY: i32 = 11000;

pub struct MongoClient {
    client: Client,
    label: String,
}

impl MongoClient {
    pub async fn connect(endpoint: &MongoEndpoint) -> Result<Self> {
        let label = redact_uri(&endpoint.uri);
        let client = Client::with_uri_str(&endpoint.uri)
            .await
            .map_err(|e| RefreshError::connection(STORE, format!("{}: {}", label, e)))?;
        client
            .database("admin")
            .run_command(doc! {"ping": 1}, None)
            .await
            .map_err(|e| RefreshError::connection(STORE, format!("{}: {}", label, e)))?;
        info!("Connected to MongoDB: {}", label);
        Ok(Self { client, label })
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .as_ref()
            .map_or(false, |errors| errors.iter().any(|e| e.code == DUPLICATE_KEY)),
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn mongo_error(object: &str, err: MongoError) -> RefreshError {
    if is_duplicate_key(&err) {
        return RefreshError::data_integrity(object, err.to_string());
    }
    match err.kind.as_ref() {
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::Authentication { .. } => {
            RefreshError::connection(STORE, format!("{}: {}", object, err))
        }
        _ => RefreshError::store(STORE, format!("{}: {}", object, err)),
    }
}

/// Canonical Extended JSON object of a document.
pub fn document_to_fields(document: Document) -> Fields {
    match Bson::Document(document).into_canonical_extjson() {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

/// Document from an Extended JSON object.
pub fn fields_to_document(object: &str, fields: Fields) -> Result<Document> {
    match Bson::try_from(Value::Object(fields)) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(RefreshError::data_integrity(
            object,
            format!("expected a document, got {:?}", other.element_type()),
        )),
        Err(e) => Err(RefreshError::data_integrity(object, e.to_string())),
    }
}

#[async_trait]
impl DocumentClient for MongoClient {
    async fn databases(&self) -> Result<Vec<String>> {
        self.client
            .list_database_names(None, None)
            .await
            .map_err(|e| mongo_error(&self.label, e))
    }

    async fn collections(&self, database: &str) -> Result<Vec<CollectionInfo>> {
        let cursor = self
            .client
            .database(database)
            .list_collections(None, None)
            .await
            .map_err(|e| mongo_error(database, e))?;
        let specs: Vec<_> = cursor
            .try_collect()
            .await
            .map_err(|e| mongo_error(database, e))?;
        let mut collections: Vec<CollectionInfo> = specs
            .into_iter()
            .map(|spec| CollectionInfo {
                is_view: matches!(spec.collection_type, CollectionType::View),
                name: spec.name,
            })
            .collect();
        collections.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(collections)
    }

    async fn create_collection(&self, database: &str, collection: &str) -> Result<()> {
        let object = format!("{}.{}", database, collection);
        self.client
            .database(database)
            .create_collection(collection, None)
            .await
            .map_err(|e| match *e.kind {
                ErrorKind::Command(ref c) if c.code_name == "NamespaceExists" => {
                    RefreshError::schema_conflict(object.as_str(), c.message.clone())
                }
                _ => mongo_error(&object, e),
            })
    }

    async fn drop_database(&self, database: &str) -> Result<()> {
        self.client
            .database(database)
            .drop(None)
            .await
            .map_err(|e| mongo_error(database, e))
    }

    async fn scan(&self, database: &str, collection: &str, sink: &mut RowSender) -> Result<()> {
        let object = format!("{}.{}", database, collection);
        let mut cursor = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .find(None, None)
            .await
            .map_err(|e| mongo_error(&object, e))?;
        let mut read = 0u64;
        while let Some(document) = cursor.try_next().await.map_err(|e| mongo_error(&object, e))? {
            sink.push(document_to_fields(document)).await?;
            read += 1;
        }
        debug!("{}: read {} documents", object, read);
        Ok(())
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Fields>,
    ) -> Result<u64> {
        let object = format!("{}.{}", database, collection);
        let documents = documents
            .into_iter()
            .map(|fields| fields_to_document(&object, fields))
            .collect::<Result<Vec<_>>>()?;
        let result = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .insert_many(documents, None)
            .await
            .map_err(|e| mongo_error(&object, e))?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn count(&self, database: &str, collection: &str) -> Result<i64> {
        let object = format!("{}.{}", database, collection);
        let n = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .count_documents(None, None)
            .await
            .map_err(|e| mongo_error(&object, e))?;
        Ok(n as i64)
    }

    async fn close(&self) {
        debug!("Shutting down MongoDB client for {}", self.label);
        self.client.clone().shutdown().await;
    }
}
