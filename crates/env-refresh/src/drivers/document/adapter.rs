//! Document store adapter.
//!
//! Schema copy is shallow: empty collections are recreated by name, without
//! indexes or validators. Each collection is then loaded with a single bulk
//! insert.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::schema::{SchemaDefinition, SchemaKind};
use crate::core::{spawn_reader, Batch, RowStream, SchemaObject, StoreAdapter, StoreKind};
use crate::error::{RefreshError, Result};

use super::client::{is_system_database, DocumentClient};

pub const RANK_COLLECTION: u32 = 30;

/// Identity field of every document.
pub const ID_FIELD: &str = "_id";

const STORE: &str = "document";

/// Whole collections go out as one batch.
const WHOLE_COLLECTION: usize = usize::MAX;

pub struct DocumentAdapter<C> {
    source: Arc<C>,
    target: Arc<C>,
    scope: String,
    databases: Vec<String>,
}

impl<C: DocumentClient> DocumentAdapter<C> {
    /// `databases` is an allow-list; empty means every non-system database.
    pub fn new(source: C, target: C, scope: impl Into<String>, databases: Vec<String>) -> Self {
        Self {
            source: Arc::new(source),
            target: Arc::new(target),
            scope: scope.into(),
            databases,
        }
    }

    fn handles(&self, database: &str) -> bool {
        !is_system_database(database)
            && (self.databases.is_empty() || self.databases.iter().any(|d| d == database))
    }

    async fn managed_databases(&self, client: &C) -> Result<Vec<String>> {
        Ok(client
            .databases()
            .await?
            .into_iter()
            .filter(|db| self.handles(db))
            .collect())
    }
}

fn check_collection(object: &SchemaObject) -> Result<()> {
    match object.definition {
        SchemaDefinition::Collection => Ok(()),
        _ => Err(RefreshError::unsupported(STORE, object.kind, object.qualified_name())),
    }
}

#[async_trait]
impl<C: DocumentClient> StoreAdapter for DocumentAdapter<C> {
    fn kind(&self) -> StoreKind {
        StoreKind::Document
    }

    fn scope(&self) -> &str {
        &self.scope
    }

    async fn clear(&self) -> Result<()> {
        let databases = self.managed_databases(&self.target).await?;
        info!("{}: dropping {} databases", self.scope, databases.len());
        for database in databases {
            debug!("{}: dropping database {}", self.scope, database);
            self.target.drop_database(&database).await?;
        }
        Ok(())
    }

    async fn list_schema_objects(&self) -> Result<Vec<SchemaObject>> {
        let mut objects = Vec::new();
        for database in self.managed_databases(&self.source).await? {
            for collection in self.source.collections(&database).await? {
                if !collection.is_copyable() {
                    debug!("{}: skipping {}.{}", self.scope, database, collection.name);
                    continue;
                }
                objects.push(SchemaObject::new(
                    SchemaKind::Collection,
                    database.clone(),
                    collection.name,
                    SchemaDefinition::Collection,
                    RANK_COLLECTION,
                ));
            }
        }
        Ok(objects)
    }

    async fn create_object(&self, object: &SchemaObject) -> Result<()> {
        check_collection(object)?;
        debug!("{}: creating collection {}", self.scope, object.qualified_name());
        self.target
            .create_collection(&object.namespace, &object.name)
            .await
    }

    fn stream_rows(&self, container: &SchemaObject) -> RowStream {
        if let Err(e) = check_collection(container) {
            return RowStream::failed(e);
        }
        let source = Arc::clone(&self.source);
        let database = container.namespace.clone();
        let collection = container.name.clone();
        spawn_reader(WHOLE_COLLECTION, vec![ID_FIELD.to_string()], move |mut sink| async move {
            source.scan(&database, &collection, &mut sink).await?;
            sink.finish().await?;
            Ok(())
        })
    }

    async fn write_rows(&self, container: &SchemaObject, rows: Batch) -> Result<u64> {
        check_collection(container)?;
        if rows.is_empty() {
            return Ok(0);
        }
        let documents = rows.into_iter().map(|row| row.fields).collect();
        self.target
            .insert_many(&container.namespace, &container.name, documents)
            .await
    }

    async fn count(&self, container: &SchemaObject) -> Result<(i64, i64)> {
        check_collection(container)?;
        tokio::try_join!(
            self.source.count(&container.namespace, &container.name),
            self.target.count(&container.namespace, &container.name),
        )
    }

    async fn shutdown(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
