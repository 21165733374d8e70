//! Configuration validation.

use super::Config;
use crate::drivers::common::SslMode;
use crate::error::{RefreshError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.configured_stores().is_empty() {
        return Err(RefreshError::Config(
            "at least one store section (wide_column, graph, relational, search, document) is required"
                .into(),
        ));
    }

    if let Some(telegram) = &config.notifications.telegram {
        if telegram.bot_token.is_empty() || telegram.chat_id.is_empty() {
            return Err(RefreshError::Config(
                "notifications.telegram needs bot_token and chat_id".into(),
            ));
        }
    }

    if let Some(wc) = &config.wide_column {
        if wc.source.contact_points.is_empty() {
            return Err(RefreshError::Config(
                "wide_column.source.contact_points is required".into(),
            ));
        }
        if wc.target.contact_points.is_empty() {
            return Err(RefreshError::Config(
                "wide_column.target.contact_points is required".into(),
            ));
        }
        if wc.source.contact_points == wc.target.contact_points {
            return Err(RefreshError::Config(
                "wide_column source and target cannot be the same cluster".into(),
            ));
        }
        require_positive("wide_column.page_size", wc.page_size)?;
        require_positive("wide_column.batch_size", wc.batch_size)?;
        if !wc.replication.contains_key("class") {
            return Err(RefreshError::Config(
                "wide_column.replication must contain a 'class' entry".into(),
            ));
        }
    }

    if let Some(graph) = &config.graph {
        require_non_empty("graph.source.url", &graph.source.url)?;
        require_non_empty("graph.target.url", &graph.target.url)?;
        if graph.source.url == graph.target.url {
            return Err(RefreshError::Config(
                "graph source and target cannot be the same endpoint".into(),
            ));
        }
        require_positive("graph.page_size", graph.page_size)?;
        if let Some(prop) = &graph.id_property {
            require_non_empty("graph.id_property", prop)?;
        }
    }

    if let Some(rel) = &config.relational {
        require_non_empty("relational.source.host", &rel.source.host)?;
        require_non_empty("relational.source.user", &rel.source.user)?;
        require_non_empty("relational.target.host", &rel.target.host)?;
        require_non_empty("relational.target.user", &rel.target.user)?;
        SslMode::parse(&rel.source.ssl_mode)?;
        SslMode::parse(&rel.target.ssl_mode)?;
        if rel.databases.is_empty() {
            return Err(RefreshError::Config(
                "relational.databases must list at least one database".into(),
            ));
        }
        for db in &rel.databases {
            let (source_db, target_db) = db.pair();
            require_non_empty("relational.databases[].source", source_db)?;
            require_non_empty("relational.databases[].target", target_db)?;
            // Cannot refresh a database onto itself
            if rel.source.host == rel.target.host
                && rel.source.port == rel.target.port
                && source_db == target_db
            {
                return Err(RefreshError::Config(format!(
                    "relational source and target cannot be the same database ({})",
                    source_db
                )));
            }
        }
        require_positive("relational.batch_size", rel.batch_size)?;
        require_positive("relational.pool_size", rel.pool_size)?;
    }

    if let Some(search) = &config.search {
        for (side, endpoint) in [("source", &search.source), ("target", &search.target)] {
            if endpoint.url.is_none() && endpoint.cloud_id.is_none() {
                return Err(RefreshError::Config(format!(
                    "search.{} needs url or cloud_id",
                    side
                )));
            }
        }
        if search.source.label() == search.target.label() {
            return Err(RefreshError::Config(
                "search source and target cannot be the same cluster".into(),
            ));
        }
        if search.indices.is_empty() || search.indices.iter().any(|i| i.is_empty()) {
            return Err(RefreshError::Config(
                "search.indices must list at least one index".into(),
            ));
        }
        require_positive("search.page_size", search.page_size)?;
        require_non_empty("search.scroll_keep_alive", &search.scroll_keep_alive)?;
    }

    if let Some(doc) = &config.document {
        require_non_empty("document.source.uri", &doc.source.uri)?;
        require_non_empty("document.target.uri", &doc.target.uri)?;
        if doc.source.uri == doc.target.uri {
            return Err(RefreshError::Config(
                "document source and target cannot be the same deployment".into(),
            ));
        }
    }

    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RefreshError::Config(format!("{} is required", field)));
    }
    Ok(())
}

fn require_positive(field: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(RefreshError::Config(format!("{} must be at least 1", field)));
    }
    Ok(())
}
