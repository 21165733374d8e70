//! Wide-column store (Cassandra / ScyllaDB over CQL).

pub mod adapter;
pub mod client;
pub mod cql;
pub mod session;

pub use adapter::WideColumnAdapter;
pub use client::CqlClient;
pub use session::ScyllaClient;

use crate::config::WideColumnConfig;
use crate::core::StoreAdapter;
use crate::error::Result;

/// Connect the source and target clusters.
pub async fn connect(config: &WideColumnConfig) -> Result<Vec<Box<dyn StoreAdapter>>> {
    let source = ScyllaClient::connect(&config.source).await?;
    let target = ScyllaClient::connect(&config.target).await?;
    let scope = format!(
        "{}|{}",
        config.source.contact_points.join(","),
        config.target.contact_points.join(",")
    );
    Ok(vec![Box::new(WideColumnAdapter::new(
        source,
        target,
        scope,
        config.replication.clone(),
        config.page_size,
        config.batch_size,
    ))])
}
