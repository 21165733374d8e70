//! Wide-column store adapter.
//!
//! Keyspaces, then user types, then tables, then rows. Counter tables are
//! loaded with increments, everything else with unlogged `INSERT ... JSON`
//! batches.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::schema::{order_by_rank, ColumnRole, CqlColumn, SchemaDefinition, SchemaKind};
use crate::core::{
    spawn_reader, AggregateCount, Batch, DdlStatement, Row, RowStream, SchemaObject, StoreAdapter,
    StoreKind,
};
use crate::error::{RefreshError, Result};

use super::client::{is_system_keyspace, CqlClient, CqlKeyspace, CqlTable, CqlUdt};
use super::cql;

pub const RANK_KEYSPACE: u32 = 10;
pub const RANK_TYPE: u32 = 20;
pub const RANK_TABLE: u32 = 30;

const STORE: &str = "wide-column";

/// Source and target cluster of the wide-column store.
pub struct WideColumnAdapter<C> {
    source: Arc<C>,
    target: Arc<C>,
    scope: String,
    replication: BTreeMap<String, String>,
    page_size: usize,
    batch_size: usize,
}

impl<C: CqlClient> WideColumnAdapter<C> {
    pub fn new(
        source: C,
        target: C,
        scope: impl Into<String>,
        replication: BTreeMap<String, String>,
        page_size: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            source: Arc::new(source),
            target: Arc::new(target),
            scope: scope.into(),
            replication,
            page_size,
            batch_size,
        }
    }

    async fn user_keyspaces(client: &C) -> Result<Vec<CqlKeyspace>> {
        Ok(client
            .keyspaces()
            .await?
            .into_iter()
            .filter(|ks| !is_system_keyspace(&ks.name))
            .collect())
    }
}

fn keyspace_object(keyspace: &CqlKeyspace) -> SchemaObject {
    let replication = keyspace
        .replication
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    SchemaObject::new(
        SchemaKind::Keyspace,
        "",
        keyspace.name.clone(),
        SchemaDefinition::Keyspace {
            replication: Value::Object(replication),
        },
        RANK_KEYSPACE,
    )
}

/// Names appearing in a type expression, e.g. `address` in `frozen<list<address>>`.
fn type_tokens(cql_type: &str) -> impl Iterator<Item = &str> {
    cql_type
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
}

/// User types ordered so that a type nested in another is created first.
/// Otherwise source order is kept.
pub fn order_user_types(types: Vec<CqlUdt>) -> Vec<CqlUdt> {
    let names: HashSet<String> = types.iter().map(|t| t.name.clone()).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut remaining = types;
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<CqlUdt>, Vec<CqlUdt>) = remaining.into_iter().partition(|t| {
            t.fields.iter().flat_map(|f| type_tokens(&f.cql_type)).all(|token| {
                token == t.name || placed.contains(token) || !names.contains(token)
            })
        });
        if ready.is_empty() {
            ordered.extend(blocked);
            break;
        }
        placed.extend(ready.iter().map(|t| t.name.clone()));
        ordered.extend(ready);
        remaining = blocked;
    }

    ordered
}

/// Render the creation statement of a wide-column object.
pub fn create_statement(
    object: &SchemaObject,
    replication: &BTreeMap<String, String>,
) -> Result<DdlStatement> {
    let sql = match &object.definition {
        SchemaDefinition::Keyspace { .. } => cql::create_keyspace(&object.name, replication)?,
        SchemaDefinition::Udt { fields } => cql::create_type(&object.namespace, &object.name, fields)?,
        SchemaDefinition::WideColumnTable { columns } => {
            cql::create_table(&object.namespace, &object.name, columns)?
        }
        _ => return Err(RefreshError::unsupported(STORE, object.kind, object.qualified_name())),
    };
    Ok(DdlStatement::create(object.clone(), sql))
}

/// Row key fields: partition key then clustering columns, as `SELECT JSON` names them.
fn key_fields(columns: &[CqlColumn]) -> Vec<String> {
    let mut keys: Vec<&CqlColumn> = columns.iter().filter(|c| c.is_key()).collect();
    keys.sort_by_key(|c| (c.role != ColumnRole::PartitionKey, c.position));
    keys.iter().map(|c| cql::json_key(&c.name)).collect()
}

/// Counter increment of a field; a null counter increments by 0.
fn counter_delta(object: &str, column: &str, value: Option<&Value>) -> Result<i64> {
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            RefreshError::data_integrity(object, format!("counter {} out of range: {}", column, n))
        }),
        Some(Value::String(s)) => s.parse().map_err(|_| {
            RefreshError::data_integrity(object, format!("counter {} is not an integer: {}", column, s))
        }),
        Some(other) => Err(RefreshError::data_integrity(
            object,
            format!("counter {} is not an integer: {}", column, other),
        )),
    }
}

impl<C: CqlClient> WideColumnAdapter<C> {
    /// Apply one counter row: increments first, then the plain columns.
    async fn write_counter_row(&self, table: &CqlTable, row: &Row) -> Result<()> {
        let object = format!("{}.{}", table.keyspace, table.name);
        let value_of = |col: &CqlColumn| row.get(&cql::json_key(&col.name)).cloned();

        let key: Vec<(String, Value)> = table
            .columns
            .iter()
            .filter(|c| c.is_key())
            .map(|c| (c.name.clone(), value_of(c).unwrap_or(Value::Null)))
            .collect();

        let mut increments = Vec::new();
        let mut assignments = Vec::new();
        for col in table.columns.iter().filter(|c| !c.is_key()) {
            if col.is_counter() {
                let delta = counter_delta(&object, &col.name, row.get(&cql::json_key(&col.name)))?;
                increments.push((col.name.clone(), delta));
            } else if let Some(value) = value_of(col) {
                assignments.push((col.name.clone(), value));
            }
        }

        if !increments.is_empty() {
            self.target.increment_counters(table, &key, &increments).await?;
        }
        if !assignments.is_empty() {
            self.target.set_columns(table, &key, &assignments).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<C: CqlClient> StoreAdapter for WideColumnAdapter<C> {
    fn kind(&self) -> StoreKind {
        StoreKind::WideColumn
    }

    fn scope(&self) -> &str {
        &self.scope
    }

    async fn clear(&self) -> Result<()> {
        let keyspaces = Self::user_keyspaces(&self.target).await?;
        info!("{}: dropping {} keyspaces", self.scope, keyspaces.len());
        for keyspace in &keyspaces {
            let statement =
                DdlStatement::drop(keyspace_object(keyspace), cql::drop_keyspace(&keyspace.name)?);
            debug!("{}: {}", self.scope, statement.text);
            self.target.execute(&statement).await?;
        }
        Ok(())
    }

    async fn list_schema_objects(&self) -> Result<Vec<SchemaObject>> {
        let mut objects = Vec::new();
        for keyspace in Self::user_keyspaces(&self.source).await? {
            objects.push(keyspace_object(&keyspace));

            for udt in order_user_types(self.source.user_types(&keyspace.name).await?) {
                objects.push(SchemaObject::new(
                    SchemaKind::Type,
                    udt.keyspace,
                    udt.name,
                    SchemaDefinition::Udt { fields: udt.fields },
                    RANK_TYPE,
                ));
            }
            for table in self.source.tables(&keyspace.name).await? {
                objects.push(SchemaObject::new(
                    SchemaKind::Table,
                    table.keyspace,
                    table.name,
                    SchemaDefinition::WideColumnTable {
                        columns: table.columns,
                    },
                    RANK_TABLE,
                ));
            }
        }
        order_by_rank(&mut objects);
        Ok(objects)
    }

    async fn create_object(&self, object: &SchemaObject) -> Result<()> {
        let statement = create_statement(object, &self.replication)?;
        self.target.execute(&statement).await
    }

    fn stream_rows(&self, container: &SchemaObject) -> RowStream {
        let SchemaDefinition::WideColumnTable { columns } = &container.definition else {
            return RowStream::failed(RefreshError::unsupported(
                STORE,
                container.kind,
                container.qualified_name(),
            ));
        };

        let source = Arc::clone(&self.source);
        let keyspace = container.namespace.clone();
        let table = container.name.clone();
        let page_size = self.page_size;
        spawn_reader(self.batch_size, key_fields(columns), move |mut sink| async move {
            source.scan(&keyspace, &table, page_size, &mut sink).await?;
            sink.finish().await?;
            Ok(())
        })
    }

    async fn write_rows(&self, container: &SchemaObject, rows: Batch) -> Result<u64> {
        let SchemaDefinition::WideColumnTable { columns } = &container.definition else {
            return Err(RefreshError::unsupported(
                STORE,
                container.kind,
                container.qualified_name(),
            ));
        };

        if columns.iter().any(|c| c.is_counter()) {
            let table = CqlTable {
                keyspace: container.namespace.clone(),
                name: container.name.clone(),
                columns: columns.clone(),
            };
            for row in &rows {
                self.write_counter_row(&table, row).await?;
            }
            return Ok(rows.len() as u64);
        }

        for chunk in rows.chunks(self.batch_size.max(1)) {
            let json: Vec<String> = chunk
                .iter()
                .map(|row| serde_json::to_string(&row.fields))
                .collect::<std::result::Result<_, _>>()?;
            self.target
                .insert_json(&container.namespace, &container.name, &json)
                .await?;
        }
        Ok(rows.len() as u64)
    }

    async fn count(&self, container: &SchemaObject) -> Result<(i64, i64)> {
        tokio::try_join!(
            self.source.count(&container.namespace, &container.name),
            self.target.count(&container.namespace, &container.name),
        )
    }

    async fn aggregate_counts(&self) -> Result<Vec<AggregateCount>> {
        let mut aggregates = Vec::new();
        for keyspace in Self::user_keyspaces(&self.source).await? {
            let (source, target) = tokio::try_join!(
                self.source.user_types(&keyspace.name),
                self.target.user_types(&keyspace.name),
            )?;
            aggregates.push(AggregateCount::new(
                format!("{}.user_types", keyspace.name),
                source.len() as i64,
                target.len() as i64,
            ));
        }
        Ok(aggregates)
    }

    async fn shutdown(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
