//! Search store adapter.
//!
//! Indices from the allow-list are recreated with their settings, mappings
//! and aliases, then filled from a scroll cursor one document at a time
//! under the original `_id`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::core::schema::{SchemaDefinition, SchemaKind};
use crate::core::{
    spawn_reader, Batch, Fields, RowSender, RowStream, SchemaObject, StoreAdapter, StoreKind,
};
use crate::error::{RefreshError, Result};

use super::client::{IndexDefinition, ScrollPage, SearchClient, GENERATED_SETTINGS};

pub const RANK_INDEX: u32 = 30;

/// Row field holding the document id.
pub const ID_FIELD: &str = "_id";
/// Row field holding the document body.
pub const SOURCE_FIELD: &str = "_source";

const STORE: &str = "search";

pub struct SearchAdapter<C> {
    source: Arc<C>,
    target: Arc<C>,
    scope: String,
    indices: Vec<String>,
    page_size: usize,
    keep_alive: String,
}

impl<C: SearchClient> SearchAdapter<C> {
    pub fn new(
        source: C,
        target: C,
        scope: impl Into<String>,
        indices: Vec<String>,
        page_size: usize,
        keep_alive: impl Into<String>,
    ) -> Self {
        Self {
            source: Arc::new(source),
            target: Arc::new(target),
            scope: scope.into(),
            indices,
            page_size,
            keep_alive: keep_alive.into(),
        }
    }
}

/// Remove cluster-assigned keys from index settings, nested or flat.
pub fn strip_generated_settings(mut settings: Value) -> Value {
    if let Some(index) = settings.get_mut("index").and_then(Value::as_object_mut) {
        for key in GENERATED_SETTINGS {
            index.remove(*key);
        }
    }
    if let Some(flat) = settings.as_object_mut() {
        for key in GENERATED_SETTINGS {
            flat.remove(&format!("index.{}", key));
        }
    }
    settings
}

fn index_definition(object: &SchemaObject) -> Result<IndexDefinition> {
    match &object.definition {
        SchemaDefinition::SearchIndex {
            settings,
            mappings,
            aliases,
        } => Ok(IndexDefinition {
            settings: settings.clone(),
            mappings: mappings.clone(),
            aliases: aliases.clone(),
        }),
        _ => Err(RefreshError::unsupported(STORE, object.kind, object.qualified_name())),
    }
}

/// Push every hit of an open scroll into `sink`, keeping `scroll_id` on the
/// latest context. Returns `(seen, total)`.
async fn drain_scroll<C: SearchClient>(
    source: &C,
    sink: &mut RowSender,
    mut page: ScrollPage,
    scroll_id: &mut Option<String>,
    keep_alive: &str,
) -> Result<(u64, u64)> {
    let total = page.total;
    let mut seen: u64 = 0;
    loop {
        if page.hits.is_empty() {
            break;
        }
        seen += page.hits.len() as u64;
        for hit in page.hits {
            let mut fields = Fields::new();
            fields.insert(ID_FIELD.to_string(), Value::String(hit.id));
            fields.insert(SOURCE_FIELD.to_string(), hit.source);
            sink.push(fields).await?;
        }
        if seen >= total {
            break;
        }
        let Some(id) = scroll_id.clone() else {
            break;
        };
        page = source.scroll(&id, keep_alive).await?;
        if let Some(next) = page.scroll_id.take() {
            *scroll_id = Some(next);
        }
    }
    Ok((seen, total))
}

#[async_trait]
impl<C: SearchClient> StoreAdapter for SearchAdapter<C> {
    fn kind(&self) -> StoreKind {
        StoreKind::Search
    }

    fn scope(&self) -> &str {
        &self.scope
    }

    async fn clear(&self) -> Result<()> {
        info!("{}: deleting {} indices", self.scope, self.indices.len());
        for index in &self.indices {
            debug!("{}: deleting index {}", self.scope, index);
            self.target.delete_index(index).await?;
        }
        Ok(())
    }

    async fn list_schema_objects(&self) -> Result<Vec<SchemaObject>> {
        let mut objects = Vec::with_capacity(self.indices.len());
        for index in &self.indices {
            let Some(definition) = self.source.get_index(index).await? else {
                warn!("{}: index {} does not exist on the source, skipping", self.scope, index);
                continue;
            };
            objects.push(SchemaObject::new(
                SchemaKind::Index,
                "",
                index.clone(),
                SchemaDefinition::SearchIndex {
                    settings: strip_generated_settings(definition.settings),
                    mappings: definition.mappings,
                    aliases: definition.aliases,
                },
                RANK_INDEX,
            ));
        }
        Ok(objects)
    }

    async fn create_object(&self, object: &SchemaObject) -> Result<()> {
        let definition = index_definition(object)?;
        debug!("{}: creating index {}", self.scope, object.name);
        self.target.create_index(&object.name, &definition).await
    }

    fn stream_rows(&self, container: &SchemaObject) -> RowStream {
        if let Err(e) = index_definition(container) {
            return RowStream::failed(e);
        }

        let source = Arc::clone(&self.source);
        let index = container.name.clone();
        let page_size = self.page_size;
        let keep_alive = self.keep_alive.clone();
        spawn_reader(page_size, vec![ID_FIELD.to_string()], move |mut sink| async move {
            let mut page = source.open_scroll(&index, page_size, &keep_alive).await?;
            let mut scroll_id = page.scroll_id.take();
            let drained =
                drain_scroll(&*source, &mut sink, page, &mut scroll_id, &keep_alive).await;

            if let Some(id) = scroll_id {
                match source.clear_scroll(&id).await {
                    Err(e) if drained.is_ok() => return Err(e),
                    Err(e) => warn!("{}: releasing scroll failed: {}", index, e),
                    Ok(()) => {}
                }
            }
            let (seen, total) = drained?;
            debug!("{}: scrolled {} of {} hits", index, seen, total);
            sink.finish().await?;
            Ok(())
        })
    }

    async fn write_rows(&self, container: &SchemaObject, rows: Batch) -> Result<u64> {
        index_definition(container)?;
        let index = &container.name;
        for row in &rows {
            let key = row.key_values();
            let id = match key.as_slice() {
                [(_, Value::String(id))] => id.as_str(),
                other => {
                    return Err(RefreshError::data_integrity(
                        index.as_str(),
                        format!("document without a string _id: {:?}", other),
                    ))
                }
            };
            let source = row.get(SOURCE_FIELD).cloned().unwrap_or_else(|| json!({}));
            self.target.index_document(index, id, &source).await?;
        }
        Ok(rows.len() as u64)
    }

    async fn count(&self, container: &SchemaObject) -> Result<(i64, i64)> {
        self.target.refresh(&container.name).await?;
        tokio::try_join!(
            self.source.count(&container.name),
            self.target.count(&container.name),
        )
    }

    async fn shutdown(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
