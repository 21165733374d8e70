//! PostgreSQL client backed by deadpool-postgres.

use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::{pin_mut, TryStreamExt};
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::{debug, info, warn};

use crate::config::PgEndpoint;
use crate::core::schema::{PartitionParent, Partitioning, RelationalColumn, SequenceDefinition};
use crate::core::{DdlStatement, Fields, Row, RowSender};
use crate::drivers::common::TlsBuilder;
use crate::error::{RefreshError, Result};

use super::client::{
    ConstraintType, PgCatalog, PgClient, PgConstraint, PgEnum, PgFunction, PgIndex, PgSequence,
    PgTable, PgTrigger,
};
use super::dialect;

const STORE: &str = "relational";

/// Namespaces that hold user objects.
const USER_NAMESPACE: &str =
    "n.nspname NOT IN ('pg_catalog', 'information_schema') AND n.nspname NOT LIKE 'pg\\_%'";

/// Objects installed by an extension are recreated by the extension, not by us.
fn not_from_extension(oid: &str) -> String {
    format!(
        "NOT EXISTS (SELECT 1 FROM pg_catalog.pg_depend d WHERE d.objid = {} AND d.deptype = 'e')",
        oid
    )
}

/// `pg_get_indexdef` renders an index on a partitioned table as `ON ONLY`,
/// which would leave the partitions unindexed.
fn recurse_into_partitions(definition: &str) -> String {
    definition.replacen(" ON ONLY ", " ON ", 1)
}

/// Map a driver error, classifying it by SQLSTATE.
fn pg_error(object: &str, err: tokio_postgres::Error) -> RefreshError {
    let message = err
        .as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| err.to_string());
    let code = err.code().map(|c| c.code().to_string());
    match code.as_deref() {
        Some(c) if c.starts_with("23") => RefreshError::data_integrity(object, message),
        Some("42P07" | "42710" | "42P06" | "42723") => {
            RefreshError::schema_conflict(object, message)
        }
        Some(c) if c.starts_with("08") => RefreshError::connection(STORE, message),
        _ if err.is_closed() => RefreshError::connection(STORE, message),
        _ => RefreshError::store(STORE, format!("{}: {}", object, message)),
    }
}

/// One database on one server.
pub struct PostgresClient {
    pool: Pool,
    label: String,
}

impl PostgresClient {
    /// Open a pool and check that the database answers.
    pub async fn connect(endpoint: &PgEndpoint, database: &str, pool_size: usize) -> Result<Self> {
        let pg_config = endpoint.pg_config(database);
        let tls = TlsBuilder::parse(&endpoint.ssl_mode)?;
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = match tls.build()? {
            Some(connector) => Manager::from_config(pg_config, connector, mgr_config),
            None => {
                warn!(
                    "PostgreSQL TLS is disabled for {}. Credentials will be transmitted in plaintext.",
                    endpoint.label()
                );
                Manager::from_config(pg_config, NoTls, mgr_config)
            }
        };

        let pool = Pool::builder(manager)
            .max_size(pool_size.max(1))
            .build()
            .map_err(|e| RefreshError::connection(STORE, e))?;

        let label = format!("{}/{}", endpoint.label(), database);
        let client = pool
            .get()
            .await
            .map_err(|e| RefreshError::connection(STORE, format!("{}: {}", label, e)))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| pg_error(&label, e))?;

        info!("Connected to PostgreSQL: {}", label);
        Ok(Self { pool, label })
    }

    async fn conn(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| RefreshError::connection(STORE, format!("{}: {}", self.label, e)))
    }

    async fn load_schemas(&self, client: &Object) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT n.nspname FROM pg_catalog.pg_namespace n WHERE {} AND {} ORDER BY 1",
            USER_NAMESPACE,
            not_from_extension("n.oid")
        );
        let rows = client.query(sql.as_str(), &[]).await.map_err(|e| pg_error(&self.label, e))?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn load_enums(&self, client: &Object) -> Result<Vec<PgEnum>> {
        let sql = format!(
            r#"
            SELECT n.nspname, t.typname,
                   array_agg(e.enumlabel::text ORDER BY e.enumsortorder)
            FROM pg_catalog.pg_type t
            JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
            JOIN pg_catalog.pg_enum e ON e.enumtypid = t.oid
            WHERE {} AND {}
            GROUP BY n.nspname, t.typname
            ORDER BY 1, 2
            "#,
            USER_NAMESPACE,
            not_from_extension("t.oid")
        );
        let rows = client.query(sql.as_str(), &[]).await.map_err(|e| pg_error(&self.label, e))?;
        Ok(rows
            .iter()
            .map(|r| PgEnum {
                schema: r.get(0),
                name: r.get(1),
                values: r.get(2),
            })
            .collect())
    }

    async fn load_sequences(&self, client: &Object) -> Result<Vec<PgSequence>> {
        let sql = format!(
            r#"
            SELECT s.schemaname::text, s.sequencename::text, s.data_type::text,
                   s.start_value, s.increment_by, s.min_value, s.max_value, s.cycle, s.last_value
            FROM pg_catalog.pg_sequences s
            JOIN pg_catalog.pg_namespace n ON n.nspname = s.schemaname
            JOIN pg_catalog.pg_class c ON c.relname = s.sequencename AND c.relnamespace = n.oid
            WHERE {} AND {}
            ORDER BY 1, 2
            "#,
            USER_NAMESPACE,
            not_from_extension("c.oid")
        );
        let rows = client.query(sql.as_str(), &[]).await.map_err(|e| pg_error(&self.label, e))?;
        Ok(rows
            .iter()
            .map(|r| PgSequence {
                schema: r.get(0),
                name: r.get(1),
                definition: SequenceDefinition {
                    data_type: r.get(2),
                    start: r.get(3),
                    increment: r.get(4),
                    min_value: r.get(5),
                    max_value: r.get(6),
                    cycle: r.get(7),
                    last_value: r.get(8),
                },
            })
            .collect())
    }

    async fn load_tables(&self, client: &Object) -> Result<Vec<PgTable>> {
        let table_filter = format!(
            "c.relkind IN ('r', 'p') AND {} AND {}",
            USER_NAMESPACE,
            not_from_extension("c.oid")
        );

        let tables_sql = format!(
            r#"
            SELECT n.nspname, c.relname,
                   CASE WHEN c.relkind = 'p' THEN pg_get_partkeydef(c.oid) END,
                   pn.nspname, p.relname,
                   CASE WHEN c.relispartition THEN pg_get_expr(c.relpartbound, c.oid) END
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_catalog.pg_inherits inh ON c.relispartition AND inh.inhrelid = c.oid
            LEFT JOIN pg_catalog.pg_class p ON p.oid = inh.inhparent
            LEFT JOIN pg_catalog.pg_namespace pn ON pn.oid = p.relnamespace
            WHERE {}
            ORDER BY 1, 2
            "#,
            table_filter
        );
        let rows = client
            .query(tables_sql.as_str(), &[])
            .await
            .map_err(|e| pg_error(&self.label, e))?;
        let mut tables: Vec<PgTable> = rows
            .iter()
            .map(|r| {
                let parent_columns: (Option<String>, Option<String>, Option<String>) =
                    (r.get(3), r.get(4), r.get(5));
                let parent = match parent_columns {
                    (Some(schema), Some(name), Some(bound)) => Some(PartitionParent {
                        schema,
                        name,
                        bound,
                    }),
                    _ => None,
                };
                let partitioning = Partitioning {
                    key: r.get(2),
                    parent,
                };
                PgTable {
                    schema: r.get(0),
                    name: r.get(1),
                    columns: Vec::new(),
                    primary_key: Vec::new(),
                    partitioning,
                }
            })
            .collect();
        let index: HashMap<(String, String), usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| ((t.schema.clone(), t.name.clone()), i))
            .collect();

        // Generated column expressions are not copied; the column becomes plain.
        let columns_sql = format!(
            r#"
            SELECT n.nspname, c.relname, a.attname,
                   format_type(a.atttypid, a.atttypmod),
                   a.attnotnull,
                   CASE WHEN a.attgenerated = '' THEN pg_get_expr(ad.adbin, ad.adrelid) END
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid AND a.attnum > 0 AND NOT a.attisdropped
            LEFT JOIN pg_catalog.pg_attrdef ad ON ad.adrelid = c.oid AND ad.adnum = a.attnum
            WHERE {}
            ORDER BY n.nspname, c.relname, a.attnum
            "#,
            table_filter
        );
        for r in client
            .query(columns_sql.as_str(), &[])
            .await
            .map_err(|e| pg_error(&self.label, e))?
        {
            let key: (String, String) = (r.get(0), r.get(1));
            if let Some(&i) = index.get(&key) {
                tables[i].columns.push(RelationalColumn {
                    name: r.get(2),
                    data_type: r.get(3),
                    not_null: r.get(4),
                    default: r.get(5),
                });
            }
        }

        let pk_sql = format!(
            r#"
            SELECT n.nspname, c.relname, a.attname
            FROM pg_catalog.pg_index i
            JOIN pg_catalog.pg_class c ON c.oid = i.indrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            JOIN LATERAL unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) ON true
            JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
            WHERE i.indisprimary AND {}
            ORDER BY n.nspname, c.relname, k.ord
            "#,
            table_filter
        );
        for r in client
            .query(pk_sql.as_str(), &[])
            .await
            .map_err(|e| pg_error(&self.label, e))?
        {
            let key: (String, String) = (r.get(0), r.get(1));
            if let Some(&i) = index.get(&key) {
                tables[i].primary_key.push(r.get(2));
            }
        }

        Ok(tables)
    }

    async fn load_indexes(&self, client: &Object) -> Result<Vec<PgIndex>> {
        // Indexes backing a primary key, unique or exclusion constraint come
        // back with the constraint. Partition indexes come back with the
        // index on their parent.
        let sql = format!(
            r#"
            SELECT n.nspname, c.relname, ic.relname, pg_get_indexdef(i.indexrelid)
            FROM pg_catalog.pg_index i
            JOIN pg_catalog.pg_class ic ON ic.oid = i.indexrelid
            JOIN pg_catalog.pg_class c ON c.oid = i.indrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relkind IN ('r', 'p') AND NOT ic.relispartition AND {} AND {}
              AND NOT EXISTS (
                  SELECT 1 FROM pg_catalog.pg_constraint con
                  WHERE con.conindid = i.indexrelid AND con.contype IN ('p', 'u', 'x')
              )
            ORDER BY 1, 2, 3
            "#,
            USER_NAMESPACE,
            not_from_extension("c.oid")
        );
        let rows = client.query(sql.as_str(), &[]).await.map_err(|e| pg_error(&self.label, e))?;
        Ok(rows
            .iter()
            .map(|r| {
                let definition: String = r.get(3);
                PgIndex {
                    schema: r.get(0),
                    table: r.get(1),
                    name: r.get(2),
                    definition: recurse_into_partitions(&definition),
                }
            })
            .collect())
    }

    async fn load_constraints(&self, client: &Object) -> Result<Vec<PgConstraint>> {
        let sql = format!(
            r#"
            SELECT n.nspname, c.relname, con.conname, con.contype::text,
                   pg_get_constraintdef(con.oid),
                   CASE WHEN con.contype = 'f' THEN rn.nspname || '.' || r.relname END
            FROM pg_catalog.pg_constraint con
            JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_catalog.pg_class r ON r.oid = con.confrelid
            LEFT JOIN pg_catalog.pg_namespace rn ON rn.oid = r.relnamespace
            WHERE con.contype IN ('p', 'u', 'c', 'f', 'x') AND con.conislocal
              AND c.relkind IN ('r', 'p') AND {} AND {}
            ORDER BY 1, 2, 3
            "#,
            USER_NAMESPACE,
            not_from_extension("c.oid")
        );
        let rows = client.query(sql.as_str(), &[]).await.map_err(|e| pg_error(&self.label, e))?;
        let mut constraints = Vec::with_capacity(rows.len());
        for r in &rows {
            let contype: String = r.get(3);
            let Some(constraint_type) = ConstraintType::from_contype(&contype) else {
                continue;
            };
            constraints.push(PgConstraint {
                schema: r.get(0),
                table: r.get(1),
                name: r.get(2),
                constraint_type,
                definition: r.get(4),
                references: r.get(5),
            });
        }
        Ok(constraints)
    }

    async fn load_functions(&self, client: &Object) -> Result<Vec<PgFunction>> {
        let sql = format!(
            r#"
            SELECT n.nspname, p.proname,
                   pg_get_function_identity_arguments(p.oid),
                   pg_get_functiondef(p.oid)
            FROM pg_catalog.pg_proc p
            JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
            WHERE p.prokind IN ('f', 'p') AND {} AND {}
            ORDER BY 1, 2, 3
            "#,
            USER_NAMESPACE,
            not_from_extension("p.oid")
        );
        let rows = client.query(sql.as_str(), &[]).await.map_err(|e| pg_error(&self.label, e))?;
        Ok(rows
            .iter()
            .map(|r| PgFunction {
                schema: r.get(0),
                name: r.get(1),
                identity_args: r.get(2),
                definition: r.get(3),
            })
            .collect())
    }

    async fn load_triggers(&self, client: &Object) -> Result<Vec<PgTrigger>> {
        let sql = format!(
            r#"
            SELECT n.nspname, c.relname, tg.tgname, pg_get_triggerdef(tg.oid)
            FROM pg_catalog.pg_trigger tg
            JOIN pg_catalog.pg_class c ON c.oid = tg.tgrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE NOT tg.tgisinternal AND tg.tgparentid = 0 AND {} AND {}
            ORDER BY 1, 2, 3
            "#,
            USER_NAMESPACE,
            not_from_extension("c.oid")
        );
        let rows = client.query(sql.as_str(), &[]).await.map_err(|e| pg_error(&self.label, e))?;
        Ok(rows
            .iter()
            .map(|r| PgTrigger {
                schema: r.get(0),
                table: r.get(1),
                name: r.get(2),
                definition: r.get(3),
            })
            .collect())
    }
}

#[async_trait]
impl PgClient for PostgresClient {
    async fn catalog(&self) -> Result<PgCatalog> {
        let client = self.conn().await?;
        let catalog = PgCatalog {
            schemas: self.load_schemas(&client).await?,
            enums: self.load_enums(&client).await?,
            sequences: self.load_sequences(&client).await?,
            tables: self.load_tables(&client).await?,
            indexes: self.load_indexes(&client).await?,
            constraints: self.load_constraints(&client).await?,
            functions: self.load_functions(&client).await?,
            triggers: self.load_triggers(&client).await?,
        };
        debug!(
            "{}: {} tables, {} indexes, {} constraints, {} functions, {} triggers",
            self.label,
            catalog.tables.len(),
            catalog.indexes.len(),
            catalog.constraints.len(),
            catalog.functions.len(),
            catalog.triggers.len()
        );
        Ok(catalog)
    }

    async fn execute(&self, statement: &DdlStatement) -> Result<()> {
        let client = self.conn().await?;
        client
            .batch_execute(&statement.text)
            .await
            .map_err(|e| pg_error(&statement.object.qualified_name(), e))
    }

    async fn scan(
        &self,
        schema: &str,
        table: &str,
        columns: &[RelationalColumn],
        sink: &mut RowSender,
    ) -> Result<()> {
        let object = format!("{}.{}", schema, table);
        let sql = dialect::select_text(schema, table, columns)?;
        let client = self.conn().await?;

        let stream = client
            .query_raw(sql.as_str(), Vec::<String>::new())
            .await
            .map_err(|e| pg_error(&object, e))?;
        pin_mut!(stream);

        while let Some(row) = stream.try_next().await.map_err(|e| pg_error(&object, e))? {
            let mut fields = Fields::new();
            for (i, col) in columns.iter().enumerate() {
                let value: Option<String> = row.get(i);
                fields.insert(col.name.clone(), value.map(Value::String).unwrap_or(Value::Null));
            }
            sink.push(fields).await?;
        }
        Ok(())
    }

    async fn insert_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[RelationalColumn],
        rows: &[Row],
    ) -> Result<u64> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }
        let object = format!("{}.{}", schema, table);
        let client = self.conn().await?;
        let per_insert = dialect::rows_per_insert(columns.len(), rows.len());

        let mut inserted = 0u64;
        for chunk in rows.chunks(per_insert) {
            let sql = dialect::insert(schema, table, columns, chunk.len())?;
            let params: Vec<Option<String>> = chunk
                .iter()
                .flat_map(|row| columns.iter().map(move |c| dialect::text_param(row.get(&c.name))))
                .collect();
            let refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
            inserted += client
                .execute(sql.as_str(), &refs)
                .await
                .map_err(|e| pg_error(&object, e))?;
        }
        Ok(inserted)
    }

    async fn count_rows(&self, schema: &str, table: &str) -> Result<i64> {
        let sql = dialect::count(schema, table)?;
        let client = self.conn().await?;
        let row = client
            .query_one(sql.as_str(), &[])
            .await
            .map_err(|e| pg_error(&format!("{}.{}", schema, table), e))?;
        Ok(row.get(0))
    }

    async fn close(&self) {
        self.pool.close();
        debug!("Closed pool for {}", self.label);
    }
}
