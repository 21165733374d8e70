//! Wide-column store driver contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::schema::{CqlColumn, UdtField};
use crate::core::{DdlStatement, RowSender};
use crate::error::Result;

/// Keyspaces owned by the database itself.
pub const SYSTEM_KEYSPACES: &[&str] = &[
    "system",
    "system_schema",
    "system_auth",
    "system_distributed",
    "system_traces",
    "system_virtual_schema",
    "system_views",
];

pub fn is_system_keyspace(name: &str) -> bool {
    SYSTEM_KEYSPACES.contains(&name)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CqlKeyspace {
    pub name: String,
    pub replication: BTreeMap<String, String>,
}

/// User-defined type.
#[derive(Debug, Clone, PartialEq)]
pub struct CqlUdt {
    pub keyspace: String,
    pub name: String,
    pub fields: Vec<UdtField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CqlTable {
    pub keyspace: String,
    pub name: String,
    pub columns: Vec<CqlColumn>,
}

/// Connection to one cluster.
///
/// Row values travel as the JSON text of `SELECT JSON`; key and column
/// values in updates are JSON literals passed through `fromJson`.
#[async_trait]
pub trait CqlClient: Send + Sync + 'static {
    /// Every keyspace, system ones included.
    async fn keyspaces(&self) -> Result<Vec<CqlKeyspace>>;

    async fn user_types(&self, keyspace: &str) -> Result<Vec<CqlUdt>>;

    async fn tables(&self, keyspace: &str) -> Result<Vec<CqlTable>>;

    async fn execute(&self, statement: &DdlStatement) -> Result<()>;

    /// Page through a table with `SELECT JSON *`.
    async fn scan(
        &self,
        keyspace: &str,
        table: &str,
        page_size: usize,
        sink: &mut RowSender,
    ) -> Result<()>;

    /// Write JSON rows as one unlogged batch of `INSERT ... JSON`.
    async fn insert_json(&self, keyspace: &str, table: &str, rows: &[String]) -> Result<()>;

    /// `UPDATE ... SET c = c + ?` for every counter of one row.
    async fn increment_counters(
        &self,
        table: &CqlTable,
        key: &[(String, Value)],
        increments: &[(String, i64)],
    ) -> Result<()>;

    /// `UPDATE ... SET c = fromJson(?)` for non-counter columns of one row.
    async fn set_columns(
        &self,
        table: &CqlTable,
        key: &[(String, Value)],
        assignments: &[(String, Value)],
    ) -> Result<()>;

    async fn count(&self, keyspace: &str, table: &str) -> Result<i64>;

    async fn close(&self);
}
