//! CQL statement builders.

use std::collections::BTreeMap;

use crate::core::identifier::{qualify, quote_ident, quote_literal};
use crate::core::schema::{ColumnRole, CqlColumn, UdtField};
use crate::error::Result;

/// Field name of a column in `SELECT JSON` output. Names that are not plain
/// lowercase identifiers come back double-quoted.
pub fn json_key(column: &str) -> String {
    let plain = column
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !column.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        column.to_string()
    } else {
        format!("\"{}\"", column.replace('"', "\"\""))
    }
}

pub fn create_keyspace(name: &str, replication: &BTreeMap<String, String>) -> Result<String> {
    let entries: Vec<String> = replication
        .iter()
        .map(|(k, v)| format!("{}: {}", quote_literal(k), quote_literal(v)))
        .collect();
    Ok(format!(
        "CREATE KEYSPACE {} WITH replication = {{{}}}",
        quote_ident(name)?,
        entries.join(", ")
    ))
}

pub fn drop_keyspace(name: &str) -> Result<String> {
    Ok(format!("DROP KEYSPACE IF EXISTS {}", quote_ident(name)?))
}

pub fn create_type(keyspace: &str, name: &str, fields: &[UdtField]) -> Result<String> {
    let mut defs = Vec::with_capacity(fields.len());
    for f in fields {
        defs.push(format!("{} {}", quote_ident(&f.name)?, f.cql_type));
    }
    Ok(format!(
        "CREATE TYPE {} ({})",
        qualify(keyspace, name)?,
        defs.join(", ")
    ))
}

fn key_columns(columns: &[CqlColumn], role: ColumnRole) -> Vec<&CqlColumn> {
    let mut keys: Vec<&CqlColumn> = columns.iter().filter(|c| c.role == role).collect();
    keys.sort_by_key(|c| c.position);
    keys
}

/// `CREATE TABLE` with the primary key rebuilt from column roles.
pub fn create_table(keyspace: &str, name: &str, columns: &[CqlColumn]) -> Result<String> {
    let mut defs = Vec::with_capacity(columns.len() + 1);
    for col in columns {
        let mut def = format!("{} {}", quote_ident(&col.name)?, col.cql_type);
        if col.role == ColumnRole::Static {
            def.push_str(" STATIC");
        }
        defs.push(def);
    }

    let partition = key_columns(columns, ColumnRole::PartitionKey);
    let clustering = key_columns(columns, ColumnRole::Clustering);

    let mut partition_names = Vec::with_capacity(partition.len());
    for col in &partition {
        partition_names.push(quote_ident(&col.name)?);
    }
    let mut key_parts = vec![if partition_names.len() > 1 {
        format!("({})", partition_names.join(", "))
    } else {
        partition_names.join(", ")
    }];
    for col in &clustering {
        key_parts.push(quote_ident(&col.name)?);
    }
    defs.push(format!("PRIMARY KEY ({})", key_parts.join(", ")));

    let mut sql = format!(
        "CREATE TABLE {} ({})",
        qualify(keyspace, name)?,
        defs.join(", ")
    );

    if clustering.iter().any(|c| c.clustering_order.eq_ignore_ascii_case("desc")) {
        let mut orders = Vec::with_capacity(clustering.len());
        for col in &clustering {
            let dir = if col.clustering_order.eq_ignore_ascii_case("desc") {
                "DESC"
            } else {
                "ASC"
            };
            orders.push(format!("{} {}", quote_ident(&col.name)?, dir));
        }
        sql.push_str(&format!(" WITH CLUSTERING ORDER BY ({})", orders.join(", ")));
    }

    Ok(sql)
}

pub fn select_json(keyspace: &str, table: &str) -> Result<String> {
    Ok(format!("SELECT JSON * FROM {}", qualify(keyspace, table)?))
}

pub fn insert_json(keyspace: &str, table: &str) -> Result<String> {
    Ok(format!("INSERT INTO {} JSON ?", qualify(keyspace, table)?))
}

pub fn count(keyspace: &str, table: &str) -> Result<String> {
    Ok(format!("SELECT count(*) FROM {}", qualify(keyspace, table)?))
}

fn where_key(key: &[String]) -> Result<String> {
    let mut parts = Vec::with_capacity(key.len());
    for k in key {
        parts.push(format!("{} = fromJson(?)", quote_ident(k)?));
    }
    Ok(parts.join(" AND "))
}

/// Counter increment; binds one bigint per counter, then the key values.
pub fn increment_counters(
    keyspace: &str,
    table: &str,
    counters: &[String],
    key: &[String],
) -> Result<String> {
    let mut sets = Vec::with_capacity(counters.len());
    for c in counters {
        let q = quote_ident(c)?;
        sets.push(format!("{} = {} + ?", q, q));
    }
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        qualify(keyspace, table)?,
        sets.join(", "),
        where_key(key)?
    ))
}

/// Plain column update; binds one JSON literal per column, then the key values.
pub fn set_columns(keyspace: &str, table: &str, columns: &[String], key: &[String]) -> Result<String> {
    let mut sets = Vec::with_capacity(columns.len());
    for c in columns {
        sets.push(format!("{} = fromJson(?)", quote_ident(c)?));
    }
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        qualify(keyspace, table)?,
        sets.join(", "),
        where_key(key)?
    ))
}
