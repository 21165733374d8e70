//! Relational store adapter.
//!
//! Creation order: schemas, enum types, sequences, tables (columns only),
//! then rows, then indexes, non-FK constraints, foreign keys, functions and
//! triggers. Clearing walks the other way round.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::schema::{order_by_rank, SchemaDefinition, SchemaKind};
use crate::core::{
    spawn_reader, AggregateCount, Batch, DdlStatement, RowStream, SchemaObject, StoreAdapter,
    StoreKind,
};
use crate::error::{RefreshError, Result};

use super::client::{ConstraintType, PgCatalog, PgClient, PgTable};
use super::dialect;

pub const RANK_SCHEMA: u32 = 5;
pub const RANK_TYPE: u32 = 10;
pub const RANK_SEQUENCE: u32 = 20;
pub const RANK_TABLE: u32 = 30;
pub const RANK_INDEX: u32 = 110;
pub const RANK_CONSTRAINT: u32 = 120;
pub const RANK_FOREIGN_KEY: u32 = 125;
pub const RANK_FUNCTION: u32 = 130;
pub const RANK_TRIGGER: u32 = 140;

const STORE: &str = "relational";

/// One source/target database pair.
pub struct RelationalAdapter<C> {
    source: Arc<C>,
    target: Arc<C>,
    scope: String,
    batch_size: usize,
}

impl<C: PgClient> RelationalAdapter<C> {
    pub fn new(source: C, target: C, source_db: &str, target_db: &str, batch_size: usize) -> Self {
        Self {
            source: Arc::new(source),
            target: Arc::new(target),
            scope: format!("{}|{}", source_db, target_db),
            batch_size,
        }
    }
}

/// Turn a catalog into rank-ordered schema objects.
pub fn catalog_objects(catalog: &PgCatalog) -> Vec<SchemaObject> {
    let mut objects = Vec::new();

    for schema in &catalog.schemas {
        objects.push(SchemaObject::new(
            SchemaKind::Schema,
            "",
            schema.clone(),
            SchemaDefinition::Namespace,
            RANK_SCHEMA,
        ));
    }
    for e in &catalog.enums {
        objects.push(SchemaObject::new(
            SchemaKind::Type,
            e.schema.clone(),
            e.name.clone(),
            SchemaDefinition::Enum {
                values: e.values.clone(),
            },
            RANK_TYPE,
        ));
    }
    for s in &catalog.sequences {
        objects.push(SchemaObject::new(
            SchemaKind::Sequence,
            s.schema.clone(),
            s.name.clone(),
            SchemaDefinition::Sequence(s.definition.clone()),
            RANK_SEQUENCE,
        ));
    }
    for t in tables_in_reference_order(catalog) {
        objects.push(SchemaObject::new(
            SchemaKind::Table,
            t.schema.clone(),
            t.name.clone(),
            SchemaDefinition::RelationalTable {
                columns: t.columns.clone(),
                primary_key: t.primary_key.clone(),
                partitioning: t.partitioning.clone(),
            },
            RANK_TABLE,
        ));
    }
    for i in &catalog.indexes {
        objects.push(SchemaObject::new(
            SchemaKind::Index,
            i.schema.clone(),
            i.name.clone(),
            SchemaDefinition::Index {
                table: i.table.clone(),
                definition: i.definition.clone(),
            },
            RANK_INDEX,
        ));
    }
    for c in &catalog.constraints {
        let foreign_key = c.constraint_type == ConstraintType::ForeignKey;
        objects.push(SchemaObject::new(
            SchemaKind::Constraint,
            c.schema.clone(),
            c.name.clone(),
            SchemaDefinition::Constraint {
                table: c.table.clone(),
                definition: c.definition.clone(),
                foreign_key,
            },
            if foreign_key { RANK_FOREIGN_KEY } else { RANK_CONSTRAINT },
        ));
    }
    for f in &catalog.functions {
        objects.push(SchemaObject::new(
            SchemaKind::Function,
            f.schema.clone(),
            f.name.clone(),
            SchemaDefinition::Function {
                identity_args: f.identity_args.clone(),
                definition: f.definition.clone(),
            },
            RANK_FUNCTION,
        ));
    }
    for t in &catalog.triggers {
        objects.push(SchemaObject::new(
            SchemaKind::Trigger,
            t.schema.clone(),
            t.name.clone(),
            SchemaDefinition::Trigger {
                table: t.table.clone(),
                definition: t.definition.clone(),
            },
            RANK_TRIGGER,
        ));
    }

    order_by_rank(&mut objects);
    objects
}

/// Tables ordered so that a table referenced by a foreign key comes before
/// the tables referencing it, and a partitioned table before its partitions.
/// Reference cycles keep catalog order.
fn tables_in_reference_order(catalog: &PgCatalog) -> Vec<&PgTable> {
    let known: HashSet<String> = catalog
        .tables
        .iter()
        .map(|t| format!("{}.{}", t.schema, t.name))
        .collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut remaining: Vec<&PgTable> = catalog.tables.iter().collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&PgTable>, Vec<&PgTable>) =
            remaining.into_iter().partition(|t| {
                let me = format!("{}.{}", t.schema, t.name);
                let parent = t
                    .partitioning
                    .parent
                    .as_ref()
                    .map(|p| format!("{}.{}", p.schema, p.name));
                catalog
                    .constraints
                    .iter()
                    .filter(|c| c.constraint_type == ConstraintType::ForeignKey)
                    .filter(|c| c.schema == t.schema && c.table == t.name)
                    .filter_map(|c| c.references.clone())
                    .chain(parent)
                    .all(|r| r == me || placed.contains(&r) || !known.contains(&r))
            });
        if ready.is_empty() {
            ordered.extend(blocked);
            break;
        }
        placed.extend(ready.iter().map(|t| format!("{}.{}", t.schema, t.name)));
        ordered.extend(ready);
        remaining = blocked;
    }

    ordered
}

/// Render the creation statement of a relational object.
pub fn create_statement(object: &SchemaObject) -> Result<DdlStatement> {
    let ns = object.namespace.as_str();
    let name = object.name.as_str();
    let sql = match &object.definition {
        SchemaDefinition::Namespace => dialect::create_schema(name)?,
        SchemaDefinition::Enum { values } => dialect::create_enum(ns, name, values)?,
        SchemaDefinition::Sequence(def) => dialect::create_sequence(ns, name, def)?,
        SchemaDefinition::RelationalTable {
            columns,
            partitioning,
            ..
        } => dialect::create_table(ns, name, columns, partitioning)?,
        SchemaDefinition::Constraint {
            table, definition, ..
        } => dialect::add_constraint(ns, table, name, definition)?,
        SchemaDefinition::Index { definition, .. }
        | SchemaDefinition::Function { definition, .. }
        | SchemaDefinition::Trigger { definition, .. } => definition.clone(),
        _ => return Err(RefreshError::unsupported(STORE, object.kind, object.qualified_name())),
    };
    Ok(DdlStatement::create(object.clone(), sql))
}

/// Drop statements for everything in a catalog, dependents first.
pub fn clear_statements(catalog: &PgCatalog) -> Result<Vec<DdlStatement>> {
    let objects = catalog_objects(catalog);
    let of_kind = |kind: SchemaKind| objects.iter().filter(move |o| o.kind == kind);
    let mut statements = Vec::new();

    for o in of_kind(SchemaKind::Trigger) {
        if let SchemaDefinition::Trigger { table, .. } = &o.definition {
            statements.push(DdlStatement::drop(
                o.clone(),
                dialect::drop_trigger(&o.namespace, table, &o.name)?,
            ));
        }
    }
    for o in of_kind(SchemaKind::Function) {
        if let SchemaDefinition::Function { identity_args, .. } = &o.definition {
            statements.push(DdlStatement::drop(
                o.clone(),
                dialect::drop_routine(&o.namespace, &o.name, identity_args)?,
            ));
        }
    }
    for o in of_kind(SchemaKind::Constraint) {
        if let SchemaDefinition::Constraint {
            table,
            foreign_key: true,
            ..
        } = &o.definition
        {
            statements.push(DdlStatement::drop(
                o.clone(),
                dialect::drop_constraint(&o.namespace, table, &o.name)?,
            ));
        }
    }
    for o in of_kind(SchemaKind::Table) {
        statements.push(DdlStatement::drop(o.clone(), dialect::drop_table(&o.namespace, &o.name)?));
    }
    for o in of_kind(SchemaKind::Type) {
        statements.push(DdlStatement::drop(o.clone(), dialect::drop_type(&o.namespace, &o.name)?));
    }
    for o in of_kind(SchemaKind::Sequence) {
        statements.push(DdlStatement::drop(
            o.clone(),
            dialect::drop_sequence(&o.namespace, &o.name)?,
        ));
    }
    for o in of_kind(SchemaKind::Index) {
        statements.push(DdlStatement::drop(o.clone(), dialect::drop_index(&o.namespace, &o.name)?));
    }

    Ok(statements)
}

fn catalog_aggregates(source: &PgCatalog, target: &PgCatalog) -> Vec<AggregateCount> {
    let pair = |name: &str, f: fn(&PgCatalog) -> usize| {
        AggregateCount::new(name, f(source) as i64, f(target) as i64)
    };
    vec![
        pair("types", |c| c.enums.len()),
        pair("sequences", |c| c.sequences.len()),
        pair("tables", |c| c.tables.len()),
        pair("indexes", |c| c.indexes.len()),
        pair("constraints", |c| c.constraints.len()),
        pair("functions", |c| c.functions.len()),
        pair("triggers", |c| c.triggers.len()),
    ]
}

#[async_trait]
impl<C: PgClient> StoreAdapter for RelationalAdapter<C> {
    fn kind(&self) -> StoreKind {
        StoreKind::Relational
    }

    fn scope(&self) -> &str {
        &self.scope
    }

    async fn clear(&self) -> Result<()> {
        let catalog = self.target.catalog().await?;
        let statements = clear_statements(&catalog)?;
        info!("{}: dropping {} objects", self.scope, statements.len());
        for statement in &statements {
            debug!("{}: {}", self.scope, statement.text);
            self.target.execute(statement).await?;
        }
        Ok(())
    }

    async fn list_schema_objects(&self) -> Result<Vec<SchemaObject>> {
        let catalog = self.source.catalog().await?;
        Ok(catalog_objects(&catalog))
    }

    async fn create_object(&self, object: &SchemaObject) -> Result<()> {
        let statement = create_statement(object)?;
        self.target.execute(&statement).await
    }

    fn stream_rows(&self, container: &SchemaObject) -> RowStream {
        let SchemaDefinition::RelationalTable {
            columns,
            primary_key,
            ..
        } = &container.definition
        else {
            return RowStream::failed(RefreshError::unsupported(
                STORE,
                container.kind,
                container.qualified_name(),
            ));
        };

        let source = Arc::clone(&self.source);
        let schema = container.namespace.clone();
        let table = container.name.clone();
        let columns = columns.clone();
        spawn_reader(self.batch_size, primary_key.clone(), move |mut sink| async move {
            source.scan(&schema, &table, &columns, &mut sink).await?;
            sink.finish().await?;
            Ok(())
        })
    }

    async fn write_rows(&self, container: &SchemaObject, rows: Batch) -> Result<u64> {
        match &container.definition {
            SchemaDefinition::RelationalTable { columns, .. } => {
                self.target
                    .insert_rows(&container.namespace, &container.name, columns, &rows)
                    .await
            }
            _ => Err(RefreshError::unsupported(
                STORE,
                container.kind,
                container.qualified_name(),
            )),
        }
    }

    async fn count(&self, container: &SchemaObject) -> Result<(i64, i64)> {
        tokio::try_join!(
            self.source.count_rows(&container.namespace, &container.name),
            self.target.count_rows(&container.namespace, &container.name),
        )
    }

    async fn aggregate_counts(&self) -> Result<Vec<AggregateCount>> {
        let (source, target) = tokio::try_join!(self.source.catalog(), self.target.catalog())?;
        Ok(catalog_aggregates(&source, &target))
    }

    async fn shutdown(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
