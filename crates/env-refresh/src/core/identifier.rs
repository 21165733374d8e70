//! Identifier validation and quoting.
//!
//! Identifiers (schema, table, keyspace, column names) cannot be bound as
//! parameters, so every dynamic statement quotes them through this module.

use crate::error::{RefreshError, Result};

/// Maximum identifier length accepted (PostgreSQL truncates at 63, CQL at 48;
/// anything longer than this comes from a broken catalog).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before quoting.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers exceeding [`MAX_IDENTIFIER_LENGTH`].
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RefreshError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(RefreshError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(RefreshError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL or CQL identifier with double quotes.
///
/// ```ignore
/// assert_eq!(quote_ident("users")?, "\"users\"");
/// assert_eq!(quote_ident("table\"name")?, "\"table\"\"name\"");
/// ```
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a name with its schema or keyspace: `"ns"."name"`.
pub fn qualify(namespace: &str, name: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(namespace)?, quote_ident(name)?))
}

/// Quote a string literal (single quotes doubled).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
