//! Search store (Elasticsearch).

pub mod adapter;
pub mod client;
pub mod elastic;

pub use adapter::SearchAdapter;
pub use client::SearchClient;
pub use elastic::ElasticClient;

use crate::config::SearchConfig;
use crate::core::StoreAdapter;
use crate::error::Result;

/// Connect the source and target clusters.
pub async fn connect(config: &SearchConfig) -> Result<Vec<Box<dyn StoreAdapter>>> {
    let source = ElasticClient::connect(&config.source).await?;
    let target = ElasticClient::connect(&config.target).await?;
    let scope = format!("{}|{}", config.source.label(), config.target.label());
    Ok(vec![Box::new(SearchAdapter::new(
        source,
        target,
        scope,
        config.indices.clone(),
        config.page_size,
        config.scroll_keep_alive.clone(),
    ))])
}
