//! Relational store driver contract.

use async_trait::async_trait;

use crate::core::schema::{Partitioning, RelationalColumn, SequenceDefinition};
use crate::core::{DdlStatement, Row, RowSender};
use crate::error::Result;

/// Enum type.
#[derive(Debug, Clone, PartialEq)]
pub struct PgEnum {
    pub schema: String,
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PgSequence {
    pub schema: String,
    pub name: String,
    pub definition: SequenceDefinition,
}

/// Ordinary or partitioned table with its columns and primary key column names.
#[derive(Debug, Clone, PartialEq)]
pub struct PgTable {
    pub schema: String,
    pub name: String,
    pub columns: Vec<RelationalColumn>,
    pub primary_key: Vec<String>,
    pub partitioning: Partitioning,
}

/// Index not backing a constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct PgIndex {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub definition: String,
}

/// `pg_constraint.contype` values that are copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    PrimaryKey,
    Unique,
    Check,
    ForeignKey,
    Exclusion,
}

impl ConstraintType {
    pub fn from_contype(contype: &str) -> Option<Self> {
        match contype {
            "p" => Some(ConstraintType::PrimaryKey),
            "u" => Some(ConstraintType::Unique),
            "c" => Some(ConstraintType::Check),
            "f" => Some(ConstraintType::ForeignKey),
            "x" => Some(ConstraintType::Exclusion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PgConstraint {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub constraint_type: ConstraintType,
    pub definition: String,
    /// Referenced table (`schema.table`) of a foreign key.
    pub references: Option<String>,
}

/// Function or procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct PgFunction {
    pub schema: String,
    pub name: String,
    pub identity_args: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PgTrigger {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub definition: String,
}

/// Everything a database holds outside system schemas and extensions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PgCatalog {
    pub schemas: Vec<String>,
    pub enums: Vec<PgEnum>,
    pub sequences: Vec<PgSequence>,
    pub tables: Vec<PgTable>,
    pub indexes: Vec<PgIndex>,
    pub constraints: Vec<PgConstraint>,
    pub functions: Vec<PgFunction>,
    pub triggers: Vec<PgTrigger>,
}

/// Connection to one relational database.
#[async_trait]
pub trait PgClient: Send + Sync + 'static {
    /// Introspect the database.
    async fn catalog(&self) -> Result<PgCatalog>;

    /// Run one DDL statement.
    async fn execute(&self, statement: &DdlStatement) -> Result<()>;

    /// Stream every row of a table, each column in its text form.
    async fn scan(
        &self,
        schema: &str,
        table: &str,
        columns: &[RelationalColumn],
        sink: &mut RowSender,
    ) -> Result<()>;

    /// Insert rows, casting each text value to the column type.
    async fn insert_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[RelationalColumn],
        rows: &[Row],
    ) -> Result<u64>;

    async fn count_rows(&self, schema: &str, table: &str) -> Result<i64>;

    async fn close(&self);
}
