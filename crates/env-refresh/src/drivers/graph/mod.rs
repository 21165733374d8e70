//! Graph store (TinkerPop Gremlin Server).

pub mod adapter;
pub mod client;
pub mod gremlin;

pub use adapter::GraphAdapter;
pub use client::GremlinClient;
pub use gremlin::GremlinHttpClient;

use crate::config::GraphConfig;
use crate::core::StoreAdapter;
use crate::error::Result;

/// Connect the source and target graphs.
pub async fn connect(config: &GraphConfig) -> Result<Vec<Box<dyn StoreAdapter>>> {
    let source = GremlinHttpClient::connect(&config.source, config.id_property.clone()).await?;
    let target = GremlinHttpClient::connect(&config.target, config.id_property.clone()).await?;
    let scope = format!("{}|{}", config.source.url, config.target.url);
    Ok(vec![Box::new(GraphAdapter::new(
        source,
        target,
        scope,
        config.page_size,
    ))])
}
