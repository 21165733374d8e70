//! In-memory store clients and helpers for unit tests.
//!
//! Every fake is `Clone` over shared state, so a test keeps one handle to
//! inspect what the adapter did with the other.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::schema::{RelationalColumn, SchemaDefinition};
use crate::core::{DdlAction, DdlStatement, Fields, Row, RowSender, StoreAdapter, StoreKind};
use crate::drivers::document::client::{CollectionInfo, DocumentClient};
use crate::drivers::graph::client::{Edge, GremlinClient, Vertex};
use crate::drivers::relational::client::{
    ConstraintType, PgCatalog, PgClient, PgConstraint, PgEnum, PgFunction, PgIndex, PgSequence,
    PgTable, PgTrigger,
};
use crate::drivers::search::client::{IndexDefinition, ScrollPage, SearchClient, SearchHit};
use crate::drivers::wide_column::client::{CqlClient, CqlKeyspace, CqlTable, CqlUdt};
use crate::drivers::wide_column::cql;
use crate::error::{RefreshError, Result};
use crate::notify::NotificationSink;
use crate::orchestrator::{copy_unit, AdapterFactory, CopyStats};

/// Run clear, schema copy, data copy and finalize for one adapter.
pub async fn copy_store<A: StoreAdapter>(adapter: &A) -> Result<CopyStats> {
    copy_unit(adapter).await.map_err(|failure| failure.error)
}

fn object_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

// ---------------------------------------------------------------------------
// Relational
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PgState {
    catalog: PgCatalog,
    rows: BTreeMap<String, Vec<Fields>>,
    log: Vec<String>,
    closed: bool,
}

/// Relational database that applies DDL to an in-memory catalog.
#[derive(Clone, Default)]
pub struct MemPg {
    state: Arc<Mutex<PgState>>,
}

fn constraint_type(definition: &str, foreign_key: bool) -> ConstraintType {
    let upper = definition.trim_start().to_uppercase();
    if foreign_key {
        ConstraintType::ForeignKey
    } else if upper.starts_with("PRIMARY KEY") {
        ConstraintType::PrimaryKey
    } else if upper.starts_with("UNIQUE") {
        ConstraintType::Unique
    } else if upper.starts_with("EXCLUDE") {
        ConstraintType::Exclusion
    } else {
        ConstraintType::Check
    }
}

impl MemPg {
    pub fn seed(&self, f: impl FnOnce(&mut PgCatalog)) {
        f(&mut self.state.lock().unwrap().catalog);
    }

    /// Seed rows of `schema.table`.
    pub fn seed_rows(&self, table: &str, rows: Vec<Value>) {
        self.state
            .lock()
            .unwrap()
            .rows
            .entry(table.to_string())
            .or_default()
            .extend(rows.into_iter().map(object_fields));
    }

    pub fn snapshot(&self) -> PgCatalog {
        self.state.lock().unwrap().catalog.clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn apply(state: &mut PgState, statement: &DdlStatement) -> Result<()> {
        let object = &statement.object;
        let ns = object.namespace.clone();
        let name = object.name.clone();
        let catalog = &mut state.catalog;
        let conflict = || RefreshError::schema_conflict(object.qualified_name(), "already exists");

        match statement.action {
            DdlAction::Create => match &object.definition {
                SchemaDefinition::Namespace => {
                    if !catalog.schemas.contains(&name) {
                        catalog.schemas.push(name);
                    }
                }
                SchemaDefinition::Enum { values } => {
                    if catalog.enums.iter().any(|e| e.schema == ns && e.name == name) {
                        return Err(conflict());
                    }
                    catalog.enums.push(PgEnum {
                        schema: ns,
                        name,
                        values: values.clone(),
                    });
                }
                SchemaDefinition::Sequence(definition) => {
                    if catalog.sequences.iter().any(|s| s.schema == ns && s.name == name) {
                        return Err(conflict());
                    }
                    catalog.sequences.push(PgSequence {
                        schema: ns,
                        name,
                        definition: definition.clone(),
                    });
                }
                SchemaDefinition::RelationalTable {
                    columns,
                    primary_key,
                    partitioning,
                } => {
                    if catalog.tables.iter().any(|t| t.schema == ns && t.name == name) {
                        return Err(conflict());
                    }
                    if let Some(parent) = &partitioning.parent {
                        let partitioned = catalog.tables.iter().any(|t| {
                            t.schema == parent.schema
                                && t.name == parent.name
                                && t.partitioning.is_parent()
                        });
                        if !partitioned {
                            return Err(RefreshError::store(
                                "relational",
                                format!("{}.{} is not partitioned", parent.schema, parent.name),
                            ));
                        }
                    }
                    catalog.tables.push(PgTable {
                        schema: ns,
                        name,
                        columns: columns.clone(),
                        primary_key: primary_key.clone(),
                        partitioning: partitioning.clone(),
                    });
                }
                SchemaDefinition::Index { table, definition } => {
                    catalog.indexes.push(PgIndex {
                        schema: ns,
                        table: table.clone(),
                        name,
                        definition: definition.clone(),
                    });
                }
                SchemaDefinition::Constraint {
                    table,
                    definition,
                    foreign_key,
                } => {
                    if !catalog.tables.iter().any(|t| t.schema == ns && &t.name == table) {
                        return Err(RefreshError::store(
                            "relational",
                            format!("relation {}.{} does not exist", ns, table),
                        ));
                    }
                    catalog.constraints.push(PgConstraint {
                        schema: ns,
                        table: table.clone(),
                        name,
                        constraint_type: constraint_type(definition, *foreign_key),
                        definition: definition.clone(),
                        references: None,
                    });
                }
                SchemaDefinition::Function {
                    identity_args,
                    definition,
                } => catalog.functions.push(PgFunction {
                    schema: ns,
                    name,
                    identity_args: identity_args.clone(),
                    definition: definition.clone(),
                }),
                SchemaDefinition::Trigger { table, definition } => {
                    catalog.triggers.push(PgTrigger {
                        schema: ns,
                        table: table.clone(),
                        name,
                        definition: definition.clone(),
                    })
                }
                _ => {
                    return Err(RefreshError::unsupported(
                        "relational",
                        object.kind,
                        object.qualified_name(),
                    ))
                }
            },
            DdlAction::Drop => match &object.definition {
                SchemaDefinition::RelationalTable { .. } => {
                    let mut doomed = vec![(ns, name)];
                    while let Some((ns, name)) = doomed.pop() {
                        doomed.extend(
                            catalog
                                .tables
                                .iter()
                                .filter(|t| {
                                    t.partitioning
                                        .parent
                                        .as_ref()
                                        .is_some_and(|p| p.schema == ns && p.name == name)
                                })
                                .map(|t| (t.schema.clone(), t.name.clone())),
                        );
                        catalog.tables.retain(|t| !(t.schema == ns && t.name == name));
                        catalog.indexes.retain(|i| !(i.schema == ns && i.table == name));
                        catalog.constraints.retain(|c| !(c.schema == ns && c.table == name));
                        catalog.triggers.retain(|t| !(t.schema == ns && t.table == name));
                        state.rows.remove(&format!("{}.{}", ns, name));
                    }
                }
                SchemaDefinition::Enum { .. } => {
                    catalog.enums.retain(|e| !(e.schema == ns && e.name == name))
                }
                SchemaDefinition::Sequence(_) => {
                    catalog.sequences.retain(|s| !(s.schema == ns && s.name == name))
                }
                SchemaDefinition::Index { .. } => {
                    catalog.indexes.retain(|i| !(i.schema == ns && i.name == name))
                }
                SchemaDefinition::Constraint { .. } => {
                    catalog.constraints.retain(|c| !(c.schema == ns && c.name == name))
                }
                SchemaDefinition::Function { .. } => {
                    catalog.functions.retain(|f| !(f.schema == ns && f.name == name))
                }
                SchemaDefinition::Trigger { .. } => {
                    catalog.triggers.retain(|t| !(t.schema == ns && t.name == name))
                }
                SchemaDefinition::Namespace => catalog.schemas.retain(|s| s != &name),
                _ => {}
            },
        }
        Ok(())
    }
}

#[async_trait]
impl PgClient for MemPg {
    async fn catalog(&self) -> Result<PgCatalog> {
        Ok(self.snapshot())
    }

    async fn execute(&self, statement: &DdlStatement) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::apply(&mut state, statement)?;
        state.log.push(format!(
            "{} {} {}",
            statement.action,
            statement.object.kind,
            statement.object.qualified_name()
        ));
        Ok(())
    }

    async fn scan(
        &self,
        schema: &str,
        table: &str,
        _columns: &[RelationalColumn],
        sink: &mut RowSender,
    ) -> Result<()> {
        let rows = self
            .state
            .lock()
            .unwrap()
            .rows
            .get(&format!("{}.{}", schema, table))
            .cloned()
            .unwrap_or_default();
        for row in rows {
            sink.push(row).await?;
        }
        Ok(())
    }

    async fn insert_rows(
        &self,
        schema: &str,
        table: &str,
        _columns: &[RelationalColumn],
        rows: &[Row],
    ) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if !state
            .catalog
            .tables
            .iter()
            .any(|t| t.schema == schema && t.name == table)
        {
            return Err(RefreshError::store(
                "relational",
                format!("relation {}.{} does not exist", schema, table),
            ));
        }
        let qualified = format!("{}.{}", schema, table);
        state
            .rows
            .entry(qualified.clone())
            .or_default()
            .extend(rows.iter().map(|r| r.fields.clone()));
        state.log.push(format!("insert {} {}", qualified, rows.len()));
        Ok(rows.len() as u64)
    }

    async fn count_rows(&self, schema: &str, table: &str) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .rows
            .get(&format!("{}.{}", schema, table))
            .map_or(0, |rows| rows.len() as i64))
    }

    async fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

// ---------------------------------------------------------------------------
// Wide-column
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CqlState {
    keyspaces: Vec<CqlKeyspace>,
    types: Vec<CqlUdt>,
    tables: Vec<CqlTable>,
    rows: BTreeMap<String, Vec<Fields>>,
    log: Vec<String>,
    statements: Vec<String>,
    closed: bool,
}

impl CqlState {
    fn table(&self, keyspace: &str, table: &str) -> Result<CqlTable> {
        self.tables
            .iter()
            .find(|t| t.keyspace == keyspace && t.name == table)
            .cloned()
            .ok_or_else(|| {
                RefreshError::store(
                    "wide-column",
                    format!("unconfigured table {}.{}", keyspace, table),
                )
            })
    }

    /// Row with the given key, created with just the key when missing.
    fn row_mut(&mut self, table: &CqlTable, key: &[(String, Value)]) -> &mut Fields {
        let rows = self
            .rows
            .entry(format!("{}.{}", table.keyspace, table.name))
            .or_default();
        let matches = |row: &Fields| {
            key.iter()
                .all(|(name, value)| row.get(&cql::json_key(name)) == Some(value))
        };
        let index = match rows.iter().position(|row| matches(row)) {
            Some(index) => index,
            None => {
                let mut row = Fields::new();
                for (name, value) in key {
                    row.insert(cql::json_key(name), value.clone());
                }
                rows.push(row);
                rows.len() - 1
            }
        };
        &mut rows[index]
    }
}

/// CQL cluster keeping tables as lists of JSON rows.
#[derive(Clone, Default)]
pub struct MemCql {
    state: Arc<Mutex<CqlState>>,
}

impl MemCql {
    /// Seed a keyspace replicated the way a production cluster would be.
    pub fn seed_keyspace(&self, name: &str) {
        let mut replication = BTreeMap::new();
        replication.insert("class".to_string(), "NetworkTopologyStrategy".to_string());
        replication.insert("dc1".to_string(), "3".to_string());
        self.state.lock().unwrap().keyspaces.push(CqlKeyspace {
            name: name.to_string(),
            replication,
        });
    }

    pub fn seed_type(&self, udt: CqlUdt) {
        self.state.lock().unwrap().types.push(udt);
    }

    pub fn seed_table(&self, table: CqlTable) {
        self.state.lock().unwrap().tables.push(table);
    }

    pub fn seed_rows(&self, keyspace: &str, table: &str, rows: Vec<Value>) {
        self.state
            .lock()
            .unwrap()
            .rows
            .entry(format!("{}.{}", keyspace, table))
            .or_default()
            .extend(rows.into_iter().map(object_fields));
    }

    pub fn rows(&self, keyspace: &str, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .rows
            .get(&format!("{}.{}", keyspace, table))
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    pub fn keyspace_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .keyspaces
            .iter()
            .map(|k| k.name.clone())
            .collect()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Text of every executed DDL statement.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }
}

#[async_trait]
impl CqlClient for MemCql {
    async fn keyspaces(&self) -> Result<Vec<CqlKeyspace>> {
        Ok(self.state.lock().unwrap().keyspaces.clone())
    }

    async fn user_types(&self, keyspace: &str) -> Result<Vec<CqlUdt>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .types
            .iter()
            .filter(|t| t.keyspace == keyspace)
            .cloned()
            .collect())
    }

    async fn tables(&self, keyspace: &str) -> Result<Vec<CqlTable>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tables
            .iter()
            .filter(|t| t.keyspace == keyspace)
            .cloned()
            .collect())
    }

    async fn execute(&self, statement: &DdlStatement) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let object = &statement.object;
        let ns = object.namespace.clone();
        let name = object.name.clone();
        let conflict = || RefreshError::schema_conflict(object.qualified_name(), "already exists");

        match (statement.action, &object.definition) {
            (DdlAction::Create, SchemaDefinition::Keyspace { .. }) => {
                if state.keyspaces.iter().any(|k| k.name == name) {
                    return Err(conflict());
                }
                state.keyspaces.push(CqlKeyspace {
                    name,
                    replication: BTreeMap::new(),
                });
            }
            (DdlAction::Create, SchemaDefinition::Udt { fields }) => {
                if state.types.iter().any(|t| t.keyspace == ns && t.name == name) {
                    return Err(conflict());
                }
                state.types.push(CqlUdt {
                    keyspace: ns,
                    name,
                    fields: fields.clone(),
                });
            }
            (DdlAction::Create, SchemaDefinition::WideColumnTable { columns }) => {
                if state.tables.iter().any(|t| t.keyspace == ns && t.name == name) {
                    return Err(conflict());
                }
                state.tables.push(CqlTable {
                    keyspace: ns,
                    name,
                    columns: columns.clone(),
                });
            }
            (DdlAction::Drop, SchemaDefinition::Keyspace { .. }) => {
                state.keyspaces.retain(|k| k.name != name);
                state.types.retain(|t| t.keyspace != name);
                state.tables.retain(|t| t.keyspace != name);
                let prefix = format!("{}.", name);
                state.rows.retain(|k, _| !k.starts_with(&prefix));
            }
            _ => {
                return Err(RefreshError::unsupported(
                    "wide-column",
                    object.kind,
                    object.qualified_name(),
                ))
            }
        }
        state.statements.push(statement.text.clone());
        state.log.push(format!(
            "{} {} {}",
            statement.action,
            object.kind,
            object.qualified_name()
        ));
        Ok(())
    }

    async fn scan(
        &self,
        keyspace: &str,
        table: &str,
        _page_size: usize,
        sink: &mut RowSender,
    ) -> Result<()> {
        let rows = self
            .state
            .lock()
            .unwrap()
            .rows
            .get(&format!("{}.{}", keyspace, table))
            .cloned()
            .unwrap_or_default();
        for row in rows {
            sink.push(row).await?;
        }
        Ok(())
    }

    async fn insert_json(&self, keyspace: &str, table: &str, rows: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let definition = state.table(keyspace, table)?;
        let keys: Vec<String> = definition
            .columns
            .iter()
            .filter(|c| c.is_key())
            .map(|c| cql::json_key(&c.name))
            .collect();
        let stored = state
            .rows
            .entry(format!("{}.{}", keyspace, table))
            .or_default();
        for json in rows {
            let row: Fields = serde_json::from_str(json)?;
            // INSERT is an upsert on the primary key.
            stored.retain(|existing| !keys.iter().all(|k| existing.get(k) == row.get(k)));
            stored.push(row);
        }
        state
            .log
            .push(format!("insert {}.{} {}", keyspace, table, rows.len()));
        Ok(())
    }

    async fn increment_counters(
        &self,
        table: &CqlTable,
        key: &[(String, Value)],
        increments: &[(String, i64)],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.table(&table.keyspace, &table.name)?;
        let row = state.row_mut(table, key);
        for (column, delta) in increments {
            let field = cql::json_key(column);
            let current = row.get(&field).and_then(Value::as_i64).unwrap_or(0);
            row.insert(field, Value::from(current + delta));
        }
        state
            .log
            .push(format!("increment {}.{}", table.keyspace, table.name));
        Ok(())
    }

    async fn set_columns(
        &self,
        table: &CqlTable,
        key: &[(String, Value)],
        assignments: &[(String, Value)],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.table(&table.keyspace, &table.name)?;
        let row = state.row_mut(table, key);
        for (column, value) in assignments {
            row.insert(cql::json_key(column), value.clone());
        }
        state
            .log
            .push(format!("update {}.{}", table.keyspace, table.name));
        Ok(())
    }

    async fn count(&self, keyspace: &str, table: &str) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .rows
            .get(&format!("{}.{}", keyspace, table))
            .map_or(0, |rows| rows.len() as i64))
    }

    async fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

struct MemScroll {
    index: String,
    position: usize,
    page_size: usize,
}

#[derive(Default)]
struct SearchState {
    indices: BTreeMap<String, IndexDefinition>,
    documents: BTreeMap<String, Fields>,
    totals: HashMap<String, u64>,
    scrolls: HashMap<String, MemScroll>,
    next_scroll: u64,
    page_fetches: usize,
    /// Scroll calls that succeed before the cluster starts failing them.
    scroll_budget: Option<usize>,
}

impl SearchState {
    fn page(&mut self, scroll_id: &str) -> Result<ScrollPage> {
        self.page_fetches += 1;
        let scroll = self
            .scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| RefreshError::store("search", "search_context_missing_exception"))?;
        let empty = Fields::new();
        let documents = self.documents.get(&scroll.index).unwrap_or(&empty);
        let hits: Vec<SearchHit> = documents
            .iter()
            .skip(scroll.position)
            .take(scroll.page_size)
            .map(|(id, source)| SearchHit {
                id: id.clone(),
                source: source.clone(),
            })
            .collect();
        scroll.position += hits.len();
        let total = self
            .totals
            .get(&scroll.index)
            .copied()
            .unwrap_or(documents.len() as u64);
        Ok(ScrollPage {
            scroll_id: Some(scroll_id.to_string()),
            total,
            hits,
        })
    }
}

/// Search cluster with scroll contexts over ordered documents.
#[derive(Clone, Default)]
pub struct MemSearch {
    state: Arc<Mutex<SearchState>>,
}

impl MemSearch {
    pub fn seed_index(&self, name: &str, definition: IndexDefinition) {
        self.state
            .lock()
            .unwrap()
            .indices
            .insert(name.to_string(), definition);
    }

    pub fn seed_document(&self, index: &str, id: &str, source: Value) {
        self.state
            .lock()
            .unwrap()
            .documents
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), source);
    }

    /// Make searches on `index` report `total` hits whatever they hold.
    pub fn overstate_total(&self, index: &str, total: u64) {
        self.state
            .lock()
            .unwrap()
            .totals
            .insert(index.to_string(), total);
    }

    /// Fail every scroll call after the first `calls`.
    pub fn fail_scroll_after(&self, calls: usize) {
        self.state.lock().unwrap().scroll_budget = Some(calls);
    }

    /// Initial searches plus scroll calls.
    pub fn page_fetches(&self) -> usize {
        self.state.lock().unwrap().page_fetches
    }

    /// Scroll contexts not cleared yet.
    pub fn open_scrolls(&self) -> usize {
        self.state.lock().unwrap().scrolls.len()
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .documents
            .get(index)
            .map_or(0, |docs| docs.len())
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .documents
            .get(index)
            .and_then(|docs| docs.get(id).cloned())
    }

    pub fn index(&self, name: &str) -> Option<IndexDefinition> {
        self.state.lock().unwrap().indices.get(name).cloned()
    }
}

#[async_trait]
impl SearchClient for MemSearch {
    async fn get_index(&self, index: &str) -> Result<Option<IndexDefinition>> {
        Ok(self.index(index))
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.indices.contains_key(index) {
            return Err(RefreshError::schema_conflict(
                index,
                "resource_already_exists_exception",
            ));
        }
        state.indices.insert(index.to_string(), definition.clone());
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.indices.remove(index);
        state.documents.remove(index);
        Ok(())
    }

    async fn open_scroll(
        &self,
        index: &str,
        page_size: usize,
        _keep_alive: &str,
    ) -> Result<ScrollPage> {
        let mut state = self.state.lock().unwrap();
        if !state.indices.contains_key(index) {
            return Err(RefreshError::store("search", "index_not_found_exception"));
        }
        state.next_scroll += 1;
        let id = format!("scroll-{}", state.next_scroll);
        state.scrolls.insert(
            id.clone(),
            MemScroll {
                index: index.to_string(),
                position: 0,
                page_size,
            },
        );
        state.page(&id)
    }

    async fn scroll(&self, scroll_id: &str, _keep_alive: &str) -> Result<ScrollPage> {
        let mut state = self.state.lock().unwrap();
        match state.scroll_budget {
            Some(0) => return Err(RefreshError::connection("search", "connection reset")),
            Some(ref mut left) => *left -= 1,
            None => {}
        }
        state.page(scroll_id)
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        self.state.lock().unwrap().scrolls.remove(scroll_id);
        Ok(())
    }

    async fn index_document(&self, index: &str, id: &str, source: &Value) -> Result<()> {
        self.seed_document(index, id, source.clone());
        Ok(())
    }

    async fn refresh(&self, _index: &str) -> Result<()> {
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<i64> {
        Ok(self.document_count(index) as i64)
    }

    async fn close(&self) {}
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GraphState {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    log: Vec<String>,
    vertex_pages: usize,
}

/// Property graph with ordered vertices and edges.
#[derive(Clone, Default)]
pub struct MemGraph {
    state: Arc<Mutex<GraphState>>,
}

fn id_order(id: &Value) -> String {
    id.to_string()
}

impl MemGraph {
    pub fn seed_vertex(&self, vertex: Vertex) {
        self.state.lock().unwrap().vertices.push(vertex);
    }

    pub fn seed_edge(&self, edge: Edge) {
        self.state.lock().unwrap().edges.push(edge);
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn vertices_sorted(&self) -> Vec<Vertex> {
        let mut vertices = self.state.lock().unwrap().vertices.clone();
        vertices.sort_by_key(|v| id_order(&v.id));
        vertices
    }

    pub fn edges_sorted(&self) -> Vec<Edge> {
        let mut edges = self.state.lock().unwrap().edges.clone();
        edges.sort_by_key(|e| id_order(&e.id));
        edges
    }

    pub fn vertex(&self, id: &Value) -> Option<Vertex> {
        self.state
            .lock()
            .unwrap()
            .vertices
            .iter()
            .find(|v| &v.id == id)
            .cloned()
    }

    /// Number of vertex pages read.
    pub fn vertex_pages(&self) -> usize {
        self.state.lock().unwrap().vertex_pages
    }

    pub fn vertex_count_now(&self) -> usize {
        self.state.lock().unwrap().vertices.len()
    }
}

fn page<T: Clone>(items: &[T], offset: u64, limit: usize) -> Vec<T> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit)
        .cloned()
        .collect()
}

#[async_trait]
impl GremlinClient for MemGraph {
    async fn vertices(&self, offset: u64, limit: usize) -> Result<Vec<Vertex>> {
        let mut state = self.state.lock().unwrap();
        state.vertex_pages += 1;
        Ok(page(&state.vertices, offset, limit))
    }

    async fn edges(&self, offset: u64, limit: usize) -> Result<Vec<Edge>> {
        Ok(page(&self.state.lock().unwrap().edges, offset, limit))
    }

    async fn add_vertex(&self, vertex: &Vertex) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.vertices.iter().any(|v| v.id == vertex.id) {
            return Err(RefreshError::data_integrity(
                format!("vertex {}", vertex.id),
                "vertex id already exists",
            ));
        }
        state.vertices.push(vertex.clone());
        state.log.push(format!("add vertex {}", vertex.id));
        Ok(())
    }

    async fn add_edge(&self, edge: &Edge) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let has = |id: &Value| state.vertices.iter().any(|v| &v.id == id);
        if !has(&edge.out_v) || !has(&edge.in_v) {
            return Err(RefreshError::data_integrity(
                format!("edge {}", edge.id),
                format!("endpoint {} or {} not found", edge.out_v, edge.in_v),
            ));
        }
        state.edges.push(edge.clone());
        state.log.push(format!("add edge {}", edge.id));
        Ok(())
    }

    async fn drop_edges(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.edges.clear();
        state.log.push("drop edges".to_string());
        Ok(())
    }

    async fn drop_vertices(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.edges.is_empty() {
            return Err(RefreshError::store("graph", "vertices still have edges"));
        }
        state.vertices.clear();
        state.log.push("drop vertices".to_string());
        Ok(())
    }

    async fn vertex_count(&self) -> Result<i64> {
        Ok(self.state.lock().unwrap().vertices.len() as i64)
    }

    async fn edge_count(&self) -> Result<i64> {
        Ok(self.state.lock().unwrap().edges.len() as i64)
    }

    async fn close(&self) {}
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemCollection {
    is_view: bool,
    documents: Vec<Fields>,
}

#[derive(Default)]
struct MongoState {
    databases: BTreeMap<String, BTreeMap<String, MemCollection>>,
    log: Vec<String>,
    closed: bool,
}

/// Document server with databases of ordered collections.
#[derive(Clone, Default)]
pub struct MemMongo {
    state: Arc<Mutex<MongoState>>,
}

impl MemMongo {
    pub fn seed_collection(&self, database: &str, collection: &str) {
        self.state
            .lock()
            .unwrap()
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
    }

    pub fn seed_view(&self, database: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .databases
            .entry(database.to_string())
            .or_default()
            .insert(
                name.to_string(),
                MemCollection {
                    is_view: true,
                    documents: Vec::new(),
                },
            );
    }

    pub fn seed_document(&self, database: &str, collection: &str, document: Value) {
        self.state
            .lock()
            .unwrap()
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .documents
            .push(object_fields(document));
    }

    pub fn documents(&self, database: &str, collection: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .databases
            .get(database)
            .and_then(|db| db.get(collection))
            .map(|c| c.documents.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    pub fn database_names(&self) -> Vec<String> {
        self.state.lock().unwrap().databases.keys().cloned().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }
}

#[async_trait]
impl DocumentClient for MemMongo {
    async fn databases(&self) -> Result<Vec<String>> {
        Ok(self.database_names())
    }

    async fn collections(&self, database: &str) -> Result<Vec<CollectionInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .databases
            .get(database)
            .map(|db| {
                db.iter()
                    .map(|(name, c)| CollectionInfo {
                        name: name.clone(),
                        is_view: c.is_view,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_collection(&self, database: &str, collection: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let db = state.databases.entry(database.to_string()).or_default();
        if db.contains_key(collection) {
            return Err(RefreshError::schema_conflict(
                format!("{}.{}", database, collection),
                "NamespaceExists",
            ));
        }
        db.insert(collection.to_string(), MemCollection::default());
        state.log.push(format!("create {}.{}", database, collection));
        Ok(())
    }

    async fn drop_database(&self, database: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.databases.remove(database);
        state.log.push(format!("drop {}", database));
        Ok(())
    }

    async fn scan(&self, database: &str, collection: &str, sink: &mut RowSender) -> Result<()> {
        let documents: Vec<Fields> = self
            .documents(database, collection)
            .into_iter()
            .map(object_fields)
            .collect();
        for document in documents {
            sink.push(document).await?;
        }
        Ok(())
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Fields>,
    ) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let object = format!("{}.{}", database, collection);
        let stored = &mut state
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .documents;
        for document in &documents {
            let id = document.get("_id");
            if stored.iter().any(|d| d.get("_id") == id) {
                return Err(RefreshError::data_integrity(
                    object.as_str(),
                    format!("E11000 duplicate key error: {}", id.cloned().unwrap_or(Value::Null)),
                ));
            }
            stored.push(document.clone());
        }
        state.log.push(format!("insert {} {}", object, documents.len()));
        Ok(documents.len() as u64)
    }

    async fn count(&self, database: &str, collection: &str) -> Result<i64> {
        Ok(self.documents(database, collection).len() as i64)
    }

    async fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

type Connector = Box<dyn Fn() -> Result<Vec<Box<dyn StoreAdapter>>> + Send + Sync>;

/// Factory handing out adapters built by per-store closures.
#[derive(Default)]
pub struct StaticFactory {
    connectors: HashMap<StoreKind, Connector>,
}

impl StaticFactory {
    pub fn with(
        mut self,
        store: StoreKind,
        connect: impl Fn() -> Result<Vec<Box<dyn StoreAdapter>>> + Send + Sync + 'static,
    ) -> Self {
        self.connectors.insert(store, Box::new(connect));
        self
    }
}

#[async_trait]
impl AdapterFactory for StaticFactory {
    async fn connect(&self, store: StoreKind) -> Result<Vec<Box<dyn StoreAdapter>>> {
        match self.connectors.get(&store) {
            Some(connect) => connect(),
            None => Err(RefreshError::connection(store.as_str(), "no test connector")),
        }
    }
}

/// Notification sink keeping every message.
#[derive(Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
