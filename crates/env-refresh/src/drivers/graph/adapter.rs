//! Graph store adapter.
//!
//! A graph has no schema to copy. It is modelled as two row containers,
//! `g.vertices` then `g.edges`, so every vertex exists before the first
//! edge is written.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::schema::{SchemaDefinition, SchemaKind};
use crate::core::{spawn_reader, Batch, RowStream, SchemaObject, StoreAdapter, StoreKind};
use crate::error::{RefreshError, Result};

use super::client::{Edge, GremlinClient, Vertex};

pub const RANK_VERTICES: u32 = 30;
pub const RANK_EDGES: u32 = 40;

/// Traversal source name used as the namespace of both containers.
pub const GRAPH_NAMESPACE: &str = "g";

const STORE: &str = "graph";

pub struct GraphAdapter<C> {
    source: Arc<C>,
    target: Arc<C>,
    scope: String,
    page_size: usize,
}

impl<C: GremlinClient> GraphAdapter<C> {
    pub fn new(source: C, target: C, scope: impl Into<String>, page_size: usize) -> Self {
        Self {
            source: Arc::new(source),
            target: Arc::new(target),
            scope: scope.into(),
            page_size: page_size.max(1),
        }
    }

    fn unsupported(object: &SchemaObject) -> RefreshError {
        RefreshError::unsupported(STORE, object.kind, object.qualified_name())
    }
}

pub fn graph_objects() -> Vec<SchemaObject> {
    vec![
        SchemaObject::new(
            SchemaKind::VertexLabel,
            GRAPH_NAMESPACE,
            "vertices",
            SchemaDefinition::VertexSet,
            RANK_VERTICES,
        ),
        SchemaObject::new(
            SchemaKind::EdgeLabel,
            GRAPH_NAMESPACE,
            "edges",
            SchemaDefinition::EdgeSet,
            RANK_EDGES,
        ),
    ]
}

#[async_trait]
impl<C: GremlinClient> StoreAdapter for GraphAdapter<C> {
    fn kind(&self) -> StoreKind {
        StoreKind::Graph
    }

    fn scope(&self) -> &str {
        &self.scope
    }

    async fn clear(&self) -> Result<()> {
        info!("{}: dropping all edges, then all vertices", self.scope);
        self.target.drop_edges().await?;
        self.target.drop_vertices().await
    }

    async fn list_schema_objects(&self) -> Result<Vec<SchemaObject>> {
        Ok(graph_objects())
    }

    async fn create_object(&self, object: &SchemaObject) -> Result<()> {
        match object.definition {
            SchemaDefinition::VertexSet | SchemaDefinition::EdgeSet => {
                debug!("{}: {} needs no schema", self.scope, object.qualified_name());
                Ok(())
            }
            _ => Err(Self::unsupported(object)),
        }
    }

    fn stream_rows(&self, container: &SchemaObject) -> RowStream {
        let source = Arc::clone(&self.source);
        let page_size = self.page_size;
        match container.definition {
            SchemaDefinition::VertexSet => {
                spawn_reader(page_size, vec!["id".into()], move |mut sink| async move {
                    let mut offset = 0u64;
                    loop {
                        let page = source.vertices(offset, page_size).await?;
                        let fetched = page.len();
                        for vertex in page {
                            sink.push(vertex.into_fields()).await?;
                        }
                        if fetched < page_size {
                            break;
                        }
                        offset += fetched as u64;
                    }
                    sink.finish().await?;
                    Ok(())
                })
            }
            SchemaDefinition::EdgeSet => {
                spawn_reader(page_size, vec!["id".into()], move |mut sink| async move {
                    let mut offset = 0u64;
                    loop {
                        let page = source.edges(offset, page_size).await?;
                        let fetched = page.len();
                        for edge in page {
                            sink.push(edge.into_fields()).await?;
                        }
                        if fetched < page_size {
                            break;
                        }
                        offset += fetched as u64;
                    }
                    sink.finish().await?;
                    Ok(())
                })
            }
            _ => RowStream::failed(Self::unsupported(container)),
        }
    }

    async fn write_rows(&self, container: &SchemaObject, rows: Batch) -> Result<u64> {
        match container.definition {
            SchemaDefinition::VertexSet => {
                for row in &rows {
                    self.target.add_vertex(&Vertex::from_fields(&row.fields)?).await?;
                }
            }
            SchemaDefinition::EdgeSet => {
                for row in &rows {
                    self.target.add_edge(&Edge::from_fields(&row.fields)?).await?;
                }
            }
            _ => return Err(Self::unsupported(container)),
        }
        Ok(rows.len() as u64)
    }

    async fn count(&self, container: &SchemaObject) -> Result<(i64, i64)> {
        match container.definition {
            SchemaDefinition::VertexSet => {
                tokio::try_join!(self.source.vertex_count(), self.target.vertex_count())
            }
            SchemaDefinition::EdgeSet => {
                tokio::try_join!(self.source.edge_count(), self.target.edge_count())
            }
            _ => Err(Self::unsupported(container)),
        }
    }

    async fn shutdown(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
