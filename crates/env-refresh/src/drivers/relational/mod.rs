//! Relational store (PostgreSQL).
//!
//! Each configured database pair becomes one [`RelationalAdapter`] with its
//! own report scope.

pub mod adapter;
pub mod client;
pub mod dialect;
pub mod postgres;

pub use adapter::RelationalAdapter;
pub use client::{PgCatalog, PgClient};
pub use postgres::PostgresClient;

use std::future::Future;

use tracing::warn;

use crate::config::{PgEndpoint, RelationalConfig};
use crate::core::StoreAdapter;
use crate::error::Result;

/// Connect every configured database pair.
pub async fn connect(config: &RelationalConfig) -> Result<Vec<Box<dyn StoreAdapter>>> {
    let pool_size = config.pool_size;
    connect_with(config, |endpoint, database| async move {
        PostgresClient::connect(endpoint, &database, pool_size).await
    })
    .await
}

/// Open both sides of every pair with `open`. On failure, everything opened
/// so far is closed before the error is returned.
async fn connect_with<'a, C, F, Fut>(
    config: &'a RelationalConfig,
    open: F,
) -> Result<Vec<Box<dyn StoreAdapter>>>
where
    C: PgClient,
    F: Fn(&'a PgEndpoint, String) -> Fut,
    Fut: Future<Output = Result<C>>,
{
    let mut units: Vec<Box<dyn StoreAdapter>> = Vec::with_capacity(config.databases.len());
    for spec in &config.databases {
        let (source_db, target_db) = spec.pair();
        let pair = match open(&config.source, source_db.to_string()).await {
            Ok(source) => match open(&config.target, target_db.to_string()).await {
                Ok(target) => Ok((source, target)),
                Err(e) => {
                    source.close().await;
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };
        match pair {
            Ok((source, target)) => units.push(Box::new(RelationalAdapter::new(
                source,
                target,
                source_db,
                target_db,
                config.batch_size,
            ))),
            Err(e) => {
                warn!(
                    "relational: connecting {}|{} failed, closing {} connected pairs",
                    source_db,
                    target_db,
                    units.len()
                );
                for unit in &units {
                    unit.shutdown().await;
                }
                return Err(e);
            }
        }
    }
    Ok(units)
}
