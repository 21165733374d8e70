//! # env-refresh
//!
//! Refresh a target environment from a source across five data stores.
//!
//! Every store runs the same pipeline against its target:
//!
//! - **Clear** every replica-managed object
//! - **Copy schema** in dependency order, holding back constraints and
//!   other finalize-rank objects
//! - **Copy data** through a bounded batch channel
//! - **Finalize** the held-back objects once rows are loaded
//! - **Verify** source and target counts into `<output_dir>/<store>-counts.json`
//!
//! Stores: wide-column (CQL), graph (Gremlin), relational (PostgreSQL),
//! search (Elasticsearch) and document (MongoDB).
//!
//! ## Example
//!
//! ```rust,no_run
//! use env_refresh::{Config, Orchestrator, StoreKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let result = orchestrator.run(&[StoreKind::Relational]).await?;
//!     for store in &result.stores {
//!         println!("{}: {} rows", store.store, store.rows_copied);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod report;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use crate::core::{StoreAdapter, StoreKind};
pub use config::Config;
pub use error::{RefreshError, Result};
pub use orchestrator::{Orchestrator, RunResult, Stage, StoreOutcome, StoreStatus};
pub use report::{ReportStatus, StoreReport};
