//! Document store driver contract.

use async_trait::async_trait;

use crate::core::{Fields, RowSender};
use crate::error::Result;

/// Databases the server manages itself.
pub const SYSTEM_DATABASES: &[&str] = &["admin", "local", "config"];

pub fn is_system_database(name: &str) -> bool {
    SYSTEM_DATABASES.contains(&name)
}

/// Collection listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub is_view: bool,
}

impl CollectionInfo {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_view: false,
        }
    }

    /// Plain user collection: not a view, not `system.*`.
    pub fn is_copyable(&self) -> bool {
        !self.is_view && !self.name.starts_with("system.")
    }
}

/// Connection to one document server.
///
/// Documents cross this boundary as canonical Extended JSON objects.
#[async_trait]
pub trait DocumentClient: Send + Sync + 'static {
    async fn databases(&self) -> Result<Vec<String>>;

    async fn collections(&self, database: &str) -> Result<Vec<CollectionInfo>>;

    async fn create_collection(&self, database: &str, collection: &str) -> Result<()>;

    /// Drop a database; a missing database is not an error.
    async fn drop_database(&self, database: &str) -> Result<()>;

    /// Push every document of a collection into `sink`.
    async fn scan(&self, database: &str, collection: &str, sink: &mut RowSender) -> Result<()>;

    /// Insert documents in one bulk call. Duplicate keys are integrity errors.
    async fn insert_many(&self, database: &str, collection: &str, documents: Vec<Fields>)
        -> Result<u64>;

    async fn count(&self, database: &str, collection: &str) -> Result<i64>;

    async fn close(&self);
}
