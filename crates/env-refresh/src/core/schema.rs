//! Schema object model shared by every store adapter.
//!
//! A [`SchemaObject`] is a store-native object discovered on the source and
//! recreated on the target. Its `rank` decides creation order: lower ranks are
//! created first, and [`DATA_LOAD_RANK`] splits objects created before the
//! row copy from objects created after it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rank at which row data is loaded.
///
/// Objects ranked below it are created by the schema copy; objects ranked at
/// or above it are created by the finalize step once every row is in place.
pub const DATA_LOAD_RANK: u32 = 100;

/// Kind of a schema object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Keyspace,
    Schema,
    Type,
    Table,
    Sequence,
    Index,
    Constraint,
    Function,
    Trigger,
    Collection,
    VertexLabel,
    EdgeLabel,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Keyspace => "keyspace",
            SchemaKind::Schema => "schema",
            SchemaKind::Type => "type",
            SchemaKind::Table => "table",
            SchemaKind::Sequence => "sequence",
            SchemaKind::Index => "index",
            SchemaKind::Constraint => "constraint",
            SchemaKind::Function => "function",
            SchemaKind::Trigger => "trigger",
            SchemaKind::Collection => "collection",
            SchemaKind::VertexLabel => "vertex_label",
            SchemaKind::EdgeLabel => "edge_label",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relational column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationalColumn {
    pub name: String,
    /// Declared type as rendered by `format_type` (e.g. `character varying(20)`).
    pub data_type: String,
    pub not_null: bool,
    pub default: Option<String>,
}

/// Relational sequence definition including its current position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDefinition {
    pub data_type: String,
    pub start: i64,
    pub increment: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub cycle: bool,
    /// `None` when the sequence was never advanced.
    pub last_value: Option<i64>,
}

/// Role of a wide-column table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    PartitionKey,
    Clustering,
    Static,
    Regular,
}

impl ColumnRole {
    /// Parse the `kind` column of `system_schema.columns`.
    pub fn parse(kind: &str) -> Self {
        match kind {
            "partition_key" => ColumnRole::PartitionKey,
            "clustering" => ColumnRole::Clustering,
            "static" => ColumnRole::Static,
            _ => ColumnRole::Regular,
        }
    }
}

/// Wide-column table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CqlColumn {
    pub name: String,
    pub cql_type: String,
    pub role: ColumnRole,
    /// Position within the partition or clustering key; -1 otherwise.
    pub position: i32,
    /// `asc`, `desc` or `none`.
    pub clustering_order: String,
}

impl CqlColumn {
    pub fn is_counter(&self) -> bool {
        self.cql_type == "counter"
    }

    pub fn is_key(&self) -> bool {
        matches!(self.role, ColumnRole::PartitionKey | ColumnRole::Clustering)
    }
}

/// Field of a wide-column user-defined type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdtField {
    pub name: String,
    pub cql_type: String,
}

/// Declarative partitioning of a relational table. A sub-partitioned
/// partition has both a key and a parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partitioning {
    /// Partition key of a partitioned table, as rendered by `pg_get_partkeydef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<PartitionParent>,
}

impl Partitioning {
    /// Partitioned tables route rows to their partitions and store none.
    pub fn is_parent(&self) -> bool {
        self.key.is_some()
    }
}

/// Parent table and bound of a partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionParent {
    pub schema: String,
    pub name: String,
    /// `FOR VALUES ...` or `DEFAULT`.
    pub bound: String,
}

/// Store-specific creation spec of a schema object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum SchemaDefinition {
    /// Relational schema (namespace).
    Namespace,
    /// Relational enum type.
    Enum { values: Vec<String> },
    Sequence(SequenceDefinition),
    /// Relational table, columns only. The primary key is created later as a
    /// constraint; it is kept here as the row identity key.
    RelationalTable {
        columns: Vec<RelationalColumn>,
        primary_key: Vec<String>,
        #[serde(default)]
        partitioning: Partitioning,
    },
    /// Relational index as rendered by `pg_get_indexdef`.
    Index { table: String, definition: String },
    /// Relational table constraint as rendered by `pg_get_constraintdef`.
    Constraint {
        table: String,
        definition: String,
        foreign_key: bool,
    },
    /// Relational function or procedure as rendered by `pg_get_functiondef`.
    Function {
        identity_args: String,
        definition: String,
    },
    /// Relational trigger as rendered by `pg_get_triggerdef`.
    Trigger { table: String, definition: String },
    /// Wide-column keyspace with the source replication map.
    Keyspace { replication: Value },
    /// Wide-column user-defined type.
    Udt { fields: Vec<UdtField> },
    WideColumnTable { columns: Vec<CqlColumn> },
    /// Search index settings, mappings and aliases as returned by the source.
    SearchIndex {
        settings: Value,
        mappings: Value,
        aliases: Value,
    },
    /// Document collection (no validators or indexes).
    Collection,
    /// Every vertex of a graph.
    VertexSet,
    /// Every edge of a graph.
    EdgeSet,
}

/// A store-native object to recreate on the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaObject {
    pub kind: SchemaKind,
    /// Schema, keyspace, database or graph name; empty when the store is flat.
    pub namespace: String,
    pub name: String,
    pub definition: SchemaDefinition,
    pub rank: u32,
}

impl SchemaObject {
    pub fn new(
        kind: SchemaKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        definition: SchemaDefinition,
        rank: u32,
    ) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
            definition,
            rank,
        }
    }

    /// `namespace.name`, or just `name` for flat stores.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// True if the object is a container whose rows are copied.
    ///
    /// Partitioned parents hold no rows of their own; their partitions do.
    pub fn holds_rows(&self) -> bool {
        match &self.definition {
            SchemaDefinition::RelationalTable { partitioning, .. } => !partitioning.is_parent(),
            _ => self.is_container(),
        }
    }

    fn is_container(&self) -> bool {
        matches!(
            self.definition,
            SchemaDefinition::RelationalTable { .. }
                | SchemaDefinition::WideColumnTable { .. }
                | SchemaDefinition::SearchIndex { .. }
                | SchemaDefinition::Collection
                | SchemaDefinition::VertexSet
                | SchemaDefinition::EdgeSet
        )
    }

    /// True if the object is created after the row copy.
    pub fn is_deferred(&self) -> bool {
        self.rank >= DATA_LOAD_RANK
    }
}

/// Sort objects by rank, keeping discovery order within a rank.
pub fn order_by_rank(objects: &mut [SchemaObject]) {
    objects.sort_by_key(|o| o.rank);
}

/// Whether a DDL statement creates or removes an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlAction {
    Create,
    Drop,
}

impl fmt::Display for DdlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DdlAction::Create => f.write_str("create"),
            DdlAction::Drop => f.write_str("drop"),
        }
    }
}

/// A rendered DDL statement together with the object it acts on.
#[derive(Debug, Clone)]
pub struct DdlStatement {
    pub action: DdlAction,
    pub object: SchemaObject,
    pub text: String,
}

impl DdlStatement {
    pub fn create(object: SchemaObject, text: impl Into<String>) -> Self {
        Self {
            action: DdlAction::Create,
            object,
            text: text.into(),
        }
    }

    pub fn drop(object: SchemaObject, text: impl Into<String>) -> Self {
        Self {
            action: DdlAction::Drop,
            object,
            text: text.into(),
        }
    }
}
