//! Count reconciliation reports.
//!
//! One JSON document per store and run, written to
//! `<output_dir>/<store>-counts.json` and overwritten by the next run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::StoreKind;
use crate::error::Result;

/// Source/target counts of one object or aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountPair {
    pub source_count: i64,
    pub target_count: i64,
    #[serde(rename = "match")]
    pub matches: bool,
}

impl CountPair {
    pub fn new(source_count: i64, target_count: i64) -> Self {
        Self {
            source_count,
            target_count,
            matches: source_count == target_count,
        }
    }
}

/// Counts of one object in one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationEntry {
    pub scope: String,
    pub namespace: String,
    pub object_name: String,
    pub source_count: i64,
    pub target_count: i64,
}

impl ReconciliationEntry {
    pub fn matches(&self) -> bool {
        self.source_count == self.target_count
    }

    fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.object_name.clone()
        } else {
            format!("{}.{}", self.namespace, self.object_name)
        }
    }
}

/// Counts of one adapter scope (e.g. one database pair).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeReport {
    pub aggregates: BTreeMap<String, CountPair>,
    pub objects: BTreeMap<String, CountPair>,
}

impl ScopeReport {
    pub fn mismatches(&self) -> usize {
        self.aggregates
            .values()
            .chain(self.objects.values())
            .filter(|c| !c.matches)
            .count()
    }
}

/// Outcome recorded in a store report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Every count was taken.
    Complete,
    /// Counting failed part-way; counts are best effort.
    Partial,
    /// The copy failed; counts cover only the scopes that copied.
    CopyFailed,
}

/// Persisted report of one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreReport {
    pub store: StoreKind,
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub status: ReportStatus,
    pub error: Option<String>,
    pub scopes: BTreeMap<String, ScopeReport>,
}

impl StoreReport {
    pub fn file_name(store: StoreKind) -> String {
        format!("{}-counts.json", store)
    }

    pub fn mismatches(&self) -> usize {
        self.scopes.values().map(ScopeReport::mismatches).sum()
    }

    /// Write the report atomically into `dir`, returning the file path.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(self.store));

        let content = serde_json::to_string_pretty(self)?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &path)?;

        Ok(path)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Accumulates per-object and aggregate counts of one store.
#[derive(Debug)]
pub struct ReconciliationReporter {
    store: StoreKind,
    run_id: String,
    scopes: BTreeMap<String, ScopeReport>,
}

impl ReconciliationReporter {
    pub fn new(store: StoreKind, run_id: impl Into<String>) -> Self {
        Self {
            store,
            run_id: run_id.into(),
            scopes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, entry: &ReconciliationEntry) {
        log_entry(&entry.scope, &entry.key(), entry.source_count, entry.target_count);
        self.scopes
            .entry(entry.scope.clone())
            .or_default()
            .objects
            .insert(entry.key(), CountPair::new(entry.source_count, entry.target_count));
    }

    pub fn record_aggregate(&mut self, scope: &str, name: &str, source_count: i64, target_count: i64) {
        log_entry(scope, name, source_count, target_count);
        self.scopes
            .entry(scope.to_string())
            .or_default()
            .aggregates
            .insert(name.to_string(), CountPair::new(source_count, target_count));
    }

    /// Merge a scope counted elsewhere.
    pub fn merge_scope(&mut self, scope: &str, report: ScopeReport) {
        let entry = self.scopes.entry(scope.to_string()).or_default();
        entry.aggregates.extend(report.aggregates);
        entry.objects.extend(report.objects);
    }

    pub fn finish(self, status: ReportStatus, error: Option<String>) -> StoreReport {
        StoreReport {
            store: self.store,
            run_id: self.run_id,
            generated_at: Utc::now(),
            status,
            error,
            scopes: self.scopes,
        }
    }
}

fn log_entry(scope: &str, name: &str, source_count: i64, target_count: i64) {
    if source_count == target_count {
        info!("{} {}: {} (match)", scope, name, source_count);
    } else {
        warn!(
            "{} {}: source={} target={} (MISMATCH)",
            scope, name, source_count, target_count
        );
    }
}
