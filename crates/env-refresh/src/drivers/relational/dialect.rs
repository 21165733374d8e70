//! PostgreSQL statement builders.

use serde_json::Value;

use crate::core::identifier::{qualify, quote_ident, quote_literal};
use crate::core::schema::{Partitioning, RelationalColumn, SequenceDefinition};
use crate::error::Result;

/// Upper bound on bind parameters in one statement (wire protocol limit).
pub const MAX_BIND_PARAMS: usize = 65_535;

pub fn create_schema(name: &str) -> Result<String> {
    Ok(format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(name)?))
}

pub fn create_enum(schema: &str, name: &str, values: &[String]) -> Result<String> {
    let labels: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
    Ok(format!(
        "CREATE TYPE {} AS ENUM ({})",
        qualify(schema, name)?,
        labels.join(", ")
    ))
}

/// `CREATE SEQUENCE` followed by a `setval` restoring the source position.
pub fn create_sequence(schema: &str, name: &str, def: &SequenceDefinition) -> Result<String> {
    let qualified = qualify(schema, name)?;
    let mut sql = format!(
        "CREATE SEQUENCE {} AS {} INCREMENT BY {} MINVALUE {} MAXVALUE {} START WITH {} {}",
        qualified,
        def.data_type,
        def.increment,
        def.min_value,
        def.max_value,
        def.start,
        if def.cycle { "CYCLE" } else { "NO CYCLE" }
    );
    if let Some(last_value) = def.last_value {
        sql.push_str(&format!(
            ";\nSELECT setval({}, {}, true)",
            quote_literal(&qualified),
            last_value
        ));
    }
    Ok(sql)
}

/// `CREATE TABLE` with columns, defaults and NOT NULL only. A partition takes
/// its columns from the parent.
pub fn create_table(
    schema: &str,
    name: &str,
    columns: &[RelationalColumn],
    partitioning: &Partitioning,
) -> Result<String> {
    let mut sql = match &partitioning.parent {
        Some(parent) => format!(
            "CREATE TABLE {} PARTITION OF {} {}",
            qualify(schema, name)?,
            qualify(&parent.schema, &parent.name)?,
            parent.bound
        ),
        None => column_table(schema, name, columns)?,
    };
    if let Some(key) = &partitioning.key {
        sql.push_str(" PARTITION BY ");
        sql.push_str(key);
    }
    Ok(sql)
}

fn column_table(schema: &str, name: &str, columns: &[RelationalColumn]) -> Result<String> {
    let mut defs = Vec::with_capacity(columns.len());
    for col in columns {
        let mut def = format!("    {} {}", quote_ident(&col.name)?, col.data_type);
        if col.not_null {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &col.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        defs.push(def);
    }
    Ok(format!(
        "CREATE TABLE {} (\n{}\n)",
        qualify(schema, name)?,
        defs.join(",\n")
    ))
}

pub fn add_constraint(schema: &str, table: &str, name: &str, definition: &str) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ADD CONSTRAINT {} {}",
        qualify(schema, table)?,
        quote_ident(name)?,
        definition
    ))
}

pub fn drop_trigger(schema: &str, table: &str, name: &str) -> Result<String> {
    Ok(format!(
        "DROP TRIGGER IF EXISTS {} ON {}",
        quote_ident(name)?,
        qualify(schema, table)?
    ))
}

/// Drops functions and procedures alike.
pub fn drop_routine(schema: &str, name: &str, identity_args: &str) -> Result<String> {
    Ok(format!(
        "DROP ROUTINE IF EXISTS {}({}) CASCADE",
        qualify(schema, name)?,
        identity_args
    ))
}

pub fn drop_constraint(schema: &str, table: &str, name: &str) -> Result<String> {
    Ok(format!(
        "ALTER TABLE IF EXISTS {} DROP CONSTRAINT IF EXISTS {}",
        qualify(schema, table)?,
        quote_ident(name)?
    ))
}

pub fn drop_table(schema: &str, name: &str) -> Result<String> {
    Ok(format!("DROP TABLE IF EXISTS {} CASCADE", qualify(schema, name)?))
}

pub fn drop_type(schema: &str, name: &str) -> Result<String> {
    Ok(format!("DROP TYPE IF EXISTS {} CASCADE", qualify(schema, name)?))
}

pub fn drop_sequence(schema: &str, name: &str) -> Result<String> {
    Ok(format!("DROP SEQUENCE IF EXISTS {} CASCADE", qualify(schema, name)?))
}

pub fn drop_index(schema: &str, name: &str) -> Result<String> {
    Ok(format!("DROP INDEX IF EXISTS {}", qualify(schema, name)?))
}

/// Select every column as text.
pub fn select_text(schema: &str, table: &str, columns: &[RelationalColumn]) -> Result<String> {
    let mut cols = Vec::with_capacity(columns.len());
    for col in columns {
        cols.push(format!("{}::text", quote_ident(&col.name)?));
    }
    Ok(format!("SELECT {} FROM {}", cols.join(", "), qualify(schema, table)?))
}

pub fn count(schema: &str, table: &str) -> Result<String> {
    Ok(format!("SELECT count(*) FROM {}", qualify(schema, table)?))
}

/// Rows per multi-row `INSERT` that keep the statement under [`MAX_BIND_PARAMS`].
pub fn rows_per_insert(column_count: usize, batch_size: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / column_count.max(1);
    by_params.min(batch_size).max(1)
}

/// Multi-row `INSERT` binding every value as text and casting it to the column type.
pub fn insert(schema: &str, table: &str, columns: &[RelationalColumn], row_count: usize) -> Result<String> {
    let mut names = Vec::with_capacity(columns.len());
    for col in columns {
        names.push(quote_ident(&col.name)?);
    }

    let mut tuples = Vec::with_capacity(row_count);
    let mut param = 1;
    for _ in 0..row_count {
        let values: Vec<String> = columns
            .iter()
            .map(|col| {
                let v = format!("(${}::text)::{}", param, col.data_type);
                param += 1;
                v
            })
            .collect();
        tuples.push(format!("({})", values.join(", ")));
    }

    Ok(format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualify(schema, table)?,
        names.join(", "),
        tuples.join(", ")
    ))
}

/// Text bind value of a row field. Structured JSON is serialized back to text.
pub fn text_param(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}
