//! CQL client backed by a scylla `Session`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use futures::{pin_mut, StreamExt};
use openssl::ssl::{SslContextBuilder, SslMethod, SslVerifyMode};
use scylla::batch::{Batch as CqlBatch, BatchType};
use scylla::frame::response::result::CqlValue;
use scylla::frame::value::Counter;
use scylla::load_balancing::DefaultPolicy;
use scylla::query::Query;
use scylla::transport::errors::{DbError, QueryError};
use scylla::{ExecutionProfile, Session, SessionBuilder};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::CqlEndpoint;
use crate::core::schema::{ColumnRole, CqlColumn, UdtField};
use crate::core::{DdlStatement, Fields, RowSender};
use crate::error::{RefreshError, Result};

use super::client::{CqlClient, CqlKeyspace, CqlTable, CqlUdt};
use super::cql;

const STORE: &str = "wide-column";

fn cql_error(object: &str, err: QueryError) -> RefreshError {
    match err {
        QueryError::DbError(DbError::AlreadyExists { .. }, message) => {
            RefreshError::schema_conflict(object, message)
        }
        QueryError::IoError(e) => RefreshError::connection(STORE, format!("{}: {}", object, e)),
        other => RefreshError::store(STORE, format!("{}: {}", object, other)),
    }
}

fn decode_error(object: &str, err: impl std::fmt::Display) -> RefreshError {
    RefreshError::store(STORE, format!("{}: unexpected result: {}", object, err))
}

/// One session per cluster.
pub struct ScyllaClient {
    session: Session,
    label: String,
}

impl ScyllaClient {
    pub async fn connect(endpoint: &CqlEndpoint) -> Result<Self> {
        let label = endpoint.contact_points.join(",");
        let mut builder = SessionBuilder::new().known_nodes(&endpoint.contact_points);

        if let Some(user) = &endpoint.username {
            builder = builder.user(user, endpoint.password.as_deref().unwrap_or_default());
        }
        if let Some(dc) = &endpoint.local_datacenter {
            let policy = DefaultPolicy::builder()
                .prefer_datacenter(dc.clone())
                .token_aware(true)
                .build();
            let profile = ExecutionProfile::builder()
                .load_balancing_policy(policy)
                .build();
            builder = builder.default_execution_profile_handle(profile.into_handle());
        }
        if endpoint.tls {
            let mut context = SslContextBuilder::new(SslMethod::tls())
                .map_err(|e| RefreshError::connection(STORE, format!("{}: {}", label, e)))?;
            context
                .set_default_verify_paths()
                .map_err(|e| RefreshError::connection(STORE, format!("{}: {}", label, e)))?;
            context.set_verify(SslVerifyMode::PEER);
            builder = builder.ssl_context(Some(context.build()));
        }

        let session = builder
            .build()
            .await
            .map_err(|e| RefreshError::connection(STORE, format!("{}: {}", label, e)))?;
        info!("Connected to CQL cluster: {}", label);
        Ok(Self { session, label })
    }

    async fn columns(&self, keyspace: &str) -> Result<HashMap<String, Vec<CqlColumn>>> {
        let result = self
            .session
            .query(
                "SELECT table_name, column_name, type, kind, position, clustering_order \
                 FROM system_schema.columns WHERE keyspace_name = ?",
                (keyspace,),
            )
            .await
            .map_err(|e| cql_error(keyspace, e))?;

        let mut by_table: HashMap<String, Vec<CqlColumn>> = HashMap::new();
        for row in result
            .rows_typed::<(String, String, String, String, i32, String)>()
            .map_err(|e| decode_error(keyspace, e))?
        {
            let (table, name, cql_type, kind, position, clustering_order) =
                row.map_err(|e| decode_error(keyspace, e))?;
            by_table.entry(table).or_default().push(CqlColumn {
                name,
                cql_type,
                role: ColumnRole::parse(&kind),
                position,
                clustering_order,
            });
        }
        // Key columns first in key order, then the rest by name.
        for columns in by_table.values_mut() {
            columns.sort_by(|a, b| {
                let rank = |c: &CqlColumn| match c.role {
                    ColumnRole::PartitionKey => 0,
                    ColumnRole::Clustering => 1,
                    ColumnRole::Static => 2,
                    ColumnRole::Regular => 3,
                };
                (rank(a), a.position, &a.name).cmp(&(rank(b), b.position, &b.name))
            });
        }
        Ok(by_table)
    }

    fn json_values(values: &[(String, Value)]) -> Vec<CqlValue> {
        values
            .iter()
            .map(|(_, v)| CqlValue::Text(v.to_string()))
            .collect()
    }
}

#[async_trait]
impl CqlClient for ScyllaClient {
    async fn keyspaces(&self) -> Result<Vec<CqlKeyspace>> {
        let result = self
            .session
            .query("SELECT keyspace_name, replication FROM system_schema.keyspaces", ())
            .await
            .map_err(|e| cql_error(&self.label, e))?;

        let mut keyspaces = Vec::new();
        for row in result
            .rows_typed::<(String, HashMap<String, String>)>()
            .map_err(|e| decode_error(&self.label, e))?
        {
            let (name, replication) = row.map_err(|e| decode_error(&self.label, e))?;
            keyspaces.push(CqlKeyspace {
                name,
                replication: replication.into_iter().collect::<BTreeMap<_, _>>(),
            });
        }
        keyspaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(keyspaces)
    }

    async fn user_types(&self, keyspace: &str) -> Result<Vec<CqlUdt>> {
        let result = self
            .session
            .query(
                "SELECT type_name, field_names, field_types FROM system_schema.types WHERE keyspace_name = ?",
                (keyspace,),
            )
            .await
            .map_err(|e| cql_error(keyspace, e))?;

        let mut types = Vec::new();
        for row in result
            .rows_typed::<(String, Vec<String>, Vec<String>)>()
            .map_err(|e| decode_error(keyspace, e))?
        {
            let (name, field_names, field_types) = row.map_err(|e| decode_error(keyspace, e))?;
            types.push(CqlUdt {
                keyspace: keyspace.to_string(),
                name,
                fields: field_names
                    .into_iter()
                    .zip(field_types)
                    .map(|(name, cql_type)| UdtField { name, cql_type })
                    .collect(),
            });
        }
        Ok(types)
    }

    async fn tables(&self, keyspace: &str) -> Result<Vec<CqlTable>> {
        let result = self
            .session
            .query(
                "SELECT table_name FROM system_schema.tables WHERE keyspace_name = ?",
                (keyspace,),
            )
            .await
            .map_err(|e| cql_error(keyspace, e))?;
        let mut columns = self.columns(keyspace).await?;

        let mut tables = Vec::new();
        for row in result
            .rows_typed::<(String,)>()
            .map_err(|e| decode_error(keyspace, e))?
        {
            let (name,) = row.map_err(|e| decode_error(keyspace, e))?;
            let table_columns = columns.remove(&name).unwrap_or_default();
            tables.push(CqlTable {
                keyspace: keyspace.to_string(),
                name,
                columns: table_columns,
            });
        }
        Ok(tables)
    }

    async fn execute(&self, statement: &DdlStatement) -> Result<()> {
        let object = statement.object.qualified_name();
        self.session
            .query(statement.text.as_str(), ())
            .await
            .map_err(|e| cql_error(&object, e))?;
        self.session
            .await_schema_agreement()
            .await
            .map_err(|e| cql_error(&object, e))?;
        Ok(())
    }

    async fn scan(
        &self,
        keyspace: &str,
        table: &str,
        page_size: usize,
        sink: &mut RowSender,
    ) -> Result<()> {
        let object = format!("{}.{}", keyspace, table);
        let mut query = Query::new(cql::select_json(keyspace, table)?);
        query.set_page_size(page_size.clamp(1, i32::MAX as usize) as i32);

        let rows = self
            .session
            .query_iter(query, ())
            .await
            .map_err(|e| cql_error(&object, e))?
            .into_typed::<(String,)>();
        pin_mut!(rows);

        while let Some(row) = rows.next().await {
            let (json,) = row.map_err(|e| decode_error(&object, e))?;
            let fields: Fields = serde_json::from_str(&json)?;
            sink.push(fields).await?;
        }
        Ok(())
    }

    async fn insert_json(&self, keyspace: &str, table: &str, rows: &[String]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let object = format!("{}.{}", keyspace, table);
        let sql = cql::insert_json(keyspace, table)?;

        let mut batch = CqlBatch::new(BatchType::Unlogged);
        for _ in rows {
            batch.append_statement(sql.as_str());
        }
        let values: Vec<(&str,)> = rows.iter().map(|r| (r.as_str(),)).collect();
        self.session
            .batch(&batch, values)
            .await
            .map_err(|e| cql_error(&object, e))?;
        Ok(())
    }

    async fn increment_counters(
        &self,
        table: &CqlTable,
        key: &[(String, Value)],
        increments: &[(String, i64)],
    ) -> Result<()> {
        let object = format!("{}.{}", table.keyspace, table.name);
        let counters: Vec<String> = increments.iter().map(|(c, _)| c.clone()).collect();
        let key_names: Vec<String> = key.iter().map(|(k, _)| k.clone()).collect();
        let sql = cql::increment_counters(&table.keyspace, &table.name, &counters, &key_names)?;

        let mut values: Vec<CqlValue> = increments
            .iter()
            .map(|(_, delta)| CqlValue::Counter(Counter(*delta)))
            .collect();
        values.extend(Self::json_values(key));
        self.session
            .query(sql, values)
            .await
            .map_err(|e| cql_error(&object, e))?;
        Ok(())
    }

    async fn set_columns(
        &self,
        table: &CqlTable,
        key: &[(String, Value)],
        assignments: &[(String, Value)],
    ) -> Result<()> {
        let object = format!("{}.{}", table.keyspace, table.name);
        let columns: Vec<String> = assignments.iter().map(|(c, _)| c.clone()).collect();
        let key_names: Vec<String> = key.iter().map(|(k, _)| k.clone()).collect();
        let sql = cql::set_columns(&table.keyspace, &table.name, &columns, &key_names)?;

        let mut values = Self::json_values(assignments);
        values.extend(Self::json_values(key));
        self.session
            .query(sql, values)
            .await
            .map_err(|e| cql_error(&object, e))?;
        Ok(())
    }

    async fn count(&self, keyspace: &str, table: &str) -> Result<i64> {
        let object = format!("{}.{}", keyspace, table);
        let result = self
            .session
            .query(cql::count(keyspace, table)?, ())
            .await
            .map_err(|e| cql_error(&object, e))?;
        let (count,) = result
            .single_row_typed::<(i64,)>()
            .map_err(|e| decode_error(&object, e))?;
        Ok(count)
    }

    async fn close(&self) {
        debug!("Releasing CQL session for {}", self.label);
    }
}
