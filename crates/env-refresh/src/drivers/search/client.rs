//! Search store driver contract.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Settings keys the cluster assigns on creation; they must not be copied.
pub const GENERATED_SETTINGS: &[&str] = &["uuid", "provided_name", "creation_date", "version"];

/// Settings, mappings and aliases of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub settings: Value,
    pub mappings: Value,
    pub aliases: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub source: Value,
}

/// One page of a scroll cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollPage {
    pub scroll_id: Option<String>,
    /// Total hits of the search, not of this page.
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

/// Connection to one search cluster.
#[async_trait]
pub trait SearchClient: Send + Sync + 'static {
    /// `None` when the index does not exist.
    async fn get_index(&self, index: &str) -> Result<Option<IndexDefinition>>;

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()>;

    /// Delete an index; a missing index is not an error.
    async fn delete_index(&self, index: &str) -> Result<()>;

    /// Run the initial search of a scroll.
    async fn open_scroll(&self, index: &str, page_size: usize, keep_alive: &str)
        -> Result<ScrollPage>;

    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<ScrollPage>;

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()>;

    /// Create or replace a document under its id.
    async fn index_document(&self, index: &str, id: &str, source: &Value) -> Result<()>;

    async fn refresh(&self, index: &str) -> Result<()>;

    /// Document count; 0 for a missing index.
    async fn count(&self, index: &str) -> Result<i64>;

    async fn close(&self);
}
