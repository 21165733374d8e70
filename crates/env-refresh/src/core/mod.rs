//! Core abstractions for store-agnostic environment refresh.
//!
//! - [`schema`]: schema objects, dependency ranks and DDL statements
//! - [`value`]: JSON rows with identity keys
//! - [`traits`]: the [`StoreAdapter`] contract and the row batch channel
//! - [`identifier`]: identifier quoting for generated statements
//!
//! Store drivers (`drivers/relational`, `drivers/wide_column`, ...) implement
//! these abstractions; the orchestrator only ever sees [`StoreAdapter`].

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    DdlAction, DdlStatement, SchemaDefinition, SchemaKind, SchemaObject, DATA_LOAD_RANK,
};
pub use traits::{spawn_reader, AggregateCount, RowSender, RowStream, StoreAdapter, StoreKind};
pub use value::{Batch, Fields, Row};
