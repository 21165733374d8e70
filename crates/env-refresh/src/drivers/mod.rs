//! Store driver implementations.
//!
//! Each store module pairs a [`StoreAdapter`] implementation with a narrow
//! client trait and its production driver:
//!
//! - [`wide_column`]: CQL keyspaces, user types and tables (scylla)
//! - [`graph`]: Gremlin Server vertices and edges (HTTP)
//! - [`relational`]: PostgreSQL catalog and tables (tokio-postgres)
//! - [`search`]: Elasticsearch indices and documents (HTTP)
//! - [`document`]: MongoDB databases and collections (mongodb)
//! - [`common`]: TLS and HTTP helpers shared by several drivers
//!
//! # Adding a store
//!
//! 1. Create a module under `drivers/` with a client trait and an adapter
//!    generic over it
//! 2. Add a `connect(&StoreConfig)` returning the store's units
//! 3. Add the variant to [`StoreKind`] and dispatch it in [`NativeFactory`]

pub mod common;
pub mod document;
pub mod graph;
pub mod relational;
pub mod search;
pub mod wide_column;

pub use common::{SslMode, TlsBuilder};

use async_trait::async_trait;

use crate::config::Config;
use crate::core::{StoreAdapter, StoreKind};
use crate::error::{RefreshError, Result};
use crate::orchestrator::AdapterFactory;

/// Connects the production driver of each store from the configuration.
pub struct NativeFactory {
    config: Config,
}

impl NativeFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

fn not_configured(store: StoreKind) -> RefreshError {
    RefreshError::Config(format!("store '{}' is not configured", store))
}

#[async_trait]
impl AdapterFactory for NativeFactory {
    async fn connect(&self, store: StoreKind) -> Result<Vec<Box<dyn StoreAdapter>>> {
        match store {
            StoreKind::WideColumn => match &self.config.wide_column {
                Some(c) => wide_column::connect(c).await,
                None => Err(not_configured(store)),
            },
            StoreKind::Graph => match &self.config.graph {
                Some(c) => graph::connect(c).await,
                None => Err(not_configured(store)),
            },
            StoreKind::Relational => match &self.config.relational {
                Some(c) => relational::connect(c).await,
                None => Err(not_configured(store)),
            },
            StoreKind::Search => match &self.config.search {
                Some(c) => search::connect(c).await,
                None => Err(not_configured(store)),
            },
            StoreKind::Document => match &self.config.document {
                Some(c) => document::connect(c).await,
                None => Err(not_configured(store)),
            },
        }
    }
}
