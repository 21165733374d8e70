//! Document store (MongoDB).

pub mod adapter;
pub mod client;
pub mod mongo;

pub use adapter::DocumentAdapter;
pub use client::DocumentClient;
pub use mongo::MongoClient;

use crate::config::{redact_uri, DocumentConfig};
use crate::core::StoreAdapter;
use crate::error::Result;

/// Connect the source and target servers.
pub async fn connect(config: &DocumentConfig) -> Result<Vec<Box<dyn StoreAdapter>>> {
    let source = MongoClient::connect(&config.source).await?;
    let target = MongoClient::connect(&config.target).await?;
    let scope = format!(
        "{}|{}",
        redact_uri(&config.source.uri),
        redact_uri(&config.target.uri)
    );
    Ok(vec![Box::new(DocumentAdapter::new(
        source,
        target,
        scope,
        config.databases.clone(),
    ))])
}
