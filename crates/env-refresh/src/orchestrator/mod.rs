//! Refresh orchestrator - drives every selected store through
//! clear, schema copy, data copy, finalize and verify.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::schema::order_by_rank;
use crate::core::{SchemaObject, StoreAdapter, StoreKind};
use crate::drivers::NativeFactory;
use crate::error::{RefreshError, Result};
use crate::notify::{copy_message, verify_message, NotificationSink, TelegramSink};
use crate::report::{ReconciliationEntry, ReconciliationReporter, ReportStatus, ScopeReport};

/// Opens the adapters of one store.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    /// One adapter per independent unit of the store.
    async fn connect(&self, store: StoreKind) -> Result<Vec<Box<dyn StoreAdapter>>>;
}

/// Pipeline stage of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connect,
    Clear,
    CopySchema,
    CopyData,
    Finalize,
    Verify,
}

/// Error of a unit together with the stage that raised it.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: RefreshError,
}

impl StageFailure {
    fn at(stage: Stage) -> impl FnOnce(RefreshError) -> StageFailure {
        move |error| StageFailure { stage, error }
    }
}

/// Result of copying one unit.
#[derive(Debug, Clone, Default)]
pub struct CopyStats {
    /// Every object listed on the source, in rank order.
    pub objects: Vec<SchemaObject>,
    pub objects_created: usize,
    pub rows_copied: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    Succeeded,
    Failed,
}

/// Outcome of one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreOutcome {
    pub store: StoreKind,
    pub status: StoreStatus,
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    pub objects_created: usize,
    pub rows_copied: u64,
    /// Count entries whose source and target differ.
    pub mismatches: usize,
    pub report_path: Option<PathBuf>,
}

impl StoreOutcome {
    fn new(store: StoreKind) -> Self {
        Self {
            store,
            status: StoreStatus::Succeeded,
            failed_stage: None,
            error: None,
            objects_created: 0,
            rows_copied: 0,
            mismatches: 0,
            report_path: None,
        }
    }

    /// Record the first failure; later ones are only logged.
    fn fail(&mut self, stage: Stage, err: &RefreshError) {
        if self.status == StoreStatus::Failed {
            return;
        }
        self.status = StoreStatus::Failed;
        self.failed_stage = Some(stage);
        self.error = Some(err.to_string());
    }

    pub fn is_success(&self) -> bool {
        self.status == StoreStatus::Succeeded
    }
}

/// Result of a run, verify or health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Hash of the configuration the run used.
    pub config_hash: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    /// One outcome per selected store, in run order.
    pub stores: Vec<StoreOutcome>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.stores.iter().all(StoreOutcome::is_success)
    }

    pub fn failed_stores(&self) -> Vec<StoreKind> {
        self.stores
            .iter()
            .filter(|s| !s.is_success())
            .map(|s| s.store)
            .collect()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Refresh,
    Verify,
    HealthCheck,
}

/// Refresh orchestrator.
pub struct Orchestrator {
    config: Config,
    factory: Arc<dyn AdapterFactory>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl Orchestrator {
    /// Create an orchestrator using the native store drivers.
    pub fn new(config: Config) -> Result<Self> {
        let notifier: Option<Arc<dyn NotificationSink>> = match &config.notifications.telegram {
            Some(telegram) => Some(Arc::new(TelegramSink::new(telegram)?)),
            None => None,
        };
        Ok(Self {
            factory: Arc::new(NativeFactory::new(config.clone())),
            config,
            notifier,
        })
    }

    /// Replace the adapter factory.
    pub fn with_factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Replace the notification sink.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Clear, copy and verify the selected stores (all configured when empty).
    pub async fn run(&self, stores: &[StoreKind]) -> Result<RunResult> {
        self.execute(stores, Mode::Refresh).await
    }

    /// Count and report the selected stores without copying.
    pub async fn verify(&self, stores: &[StoreKind]) -> Result<RunResult> {
        self.execute(stores, Mode::Verify).await
    }

    /// Connect to the selected stores and release the connections.
    pub async fn health_check(&self, stores: &[StoreKind]) -> Result<RunResult> {
        self.execute(stores, Mode::HealthCheck).await
    }

    /// Requested stores in run order; every one must be configured.
    fn select(&self, stores: &[StoreKind]) -> Result<Vec<StoreKind>> {
        if stores.is_empty() {
            return Ok(self.config.configured_stores());
        }
        let mut selected = stores.to_vec();
        selected.sort();
        selected.dedup();
        if let Some(missing) = selected.iter().find(|s| !self.config.is_configured(**s)) {
            return Err(RefreshError::Config(format!(
                "store '{}' is not configured",
                missing
            )));
        }
        Ok(selected)
    }

    async fn execute(&self, stores: &[StoreKind], mode: Mode) -> Result<RunResult> {
        let selected = self.select(stores)?;
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Starting run {} for {} stores",
            run_id,
            selected.len()
        );

        let outcomes = if self.config.parallel_stores {
            join_all(selected.iter().map(|s| self.run_store(*s, &run_id, mode))).await
        } else {
            let mut outcomes = Vec::with_capacity(selected.len());
            for store in &selected {
                outcomes.push(self.run_store(*store, &run_id, mode).await);
            }
            outcomes
        };

        let completed_at = Utc::now();
        let result = RunResult {
            run_id,
            config_hash: self.config.hash(),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            stores: outcomes,
        };

        let failed = result.failed_stores();
        if failed.is_empty() {
            info!(
                "Run {} completed: {} stores in {:.1}s",
                result.run_id,
                result.stores.len(),
                result.duration_seconds
            );
        } else {
            warn!(
                "Run {} completed with {} failed stores: {:?}",
                result.run_id,
                failed.len(),
                failed
            );
        }
        Ok(result)
    }

    async fn run_store(&self, store: StoreKind, run_id: &str, mode: Mode) -> StoreOutcome {
        let mut outcome = StoreOutcome::new(store);

        info!("[{}] Phase 0: Connecting", store);
        let units = match self.factory.connect(store).await {
            Ok(units) => units,
            Err(e) => {
                error!("[{}] connect failed: {}", store, e);
                outcome.fail(Stage::Connect, &e);
                match mode {
                    Mode::Refresh => {
                        self.notify(&copy_message(store.as_str(), Some(&e.to_string())))
                            .await;
                        self.write_report(
                            &mut outcome,
                            ReconciliationReporter::new(store, run_id),
                            ReportStatus::CopyFailed,
                            Some(e.to_string()),
                        );
                    }
                    Mode::Verify => {
                        self.notify(&verify_message(store.as_str(), 0, Some(&e.to_string())))
                            .await;
                    }
                    Mode::HealthCheck => {}
                }
                return outcome;
            }
        };

        match mode {
            Mode::Refresh => self.refresh_units(store, run_id, &units, &mut outcome).await,
            Mode::Verify => self.verify_units(store, run_id, &units, &mut outcome).await,
            Mode::HealthCheck => info!("[{}] {} units reachable", store, units.len()),
        }

        for unit in &units {
            unit.shutdown().await;
        }
        outcome
    }

    async fn refresh_units(
        &self,
        store: StoreKind,
        run_id: &str,
        units: &[Box<dyn StoreAdapter>],
        outcome: &mut StoreOutcome,
    ) {
        let copies = join_all(units.iter().map(|unit| copy_unit(unit.as_ref()))).await;

        let mut copied = Vec::new();
        for (unit, copy) in units.iter().zip(copies) {
            match copy {
                Ok(stats) => {
                    outcome.objects_created += stats.objects_created;
                    outcome.rows_copied += stats.rows_copied;
                    copied.push((unit.as_ref(), stats.objects));
                }
                Err(failure) => {
                    error!(
                        "[{}] {} failed at {:?}: {}",
                        store,
                        unit.scope(),
                        failure.stage,
                        failure.error
                    );
                    outcome.fail(failure.stage, &failure.error);
                }
            }
        }
        self.notify(&copy_message(store.as_str(), outcome.error.as_deref()))
            .await;

        let copy_failed = !outcome.is_success();
        let copy_error = outcome.error.clone();

        let mut reporter = ReconciliationReporter::new(store, run_id);
        let verify_error = if copied.is_empty() {
            None
        } else {
            let error = self.count_units(store, &copied, &mut reporter, outcome).await;
            self.notify(&verify_message(
                store.as_str(),
                outcome.mismatches,
                error.as_deref(),
            ))
            .await;
            error
        };

        let (status, error) = if copy_failed {
            (ReportStatus::CopyFailed, copy_error)
        } else if verify_error.is_some() {
            (ReportStatus::Partial, verify_error)
        } else {
            (ReportStatus::Complete, None)
        };
        self.write_report(outcome, reporter, status, error);
    }

    async fn verify_units(
        &self,
        store: StoreKind,
        run_id: &str,
        units: &[Box<dyn StoreAdapter>],
        outcome: &mut StoreOutcome,
    ) {
        let listings =
            join_all(units.iter().map(|unit| list_objects(unit.as_ref()))).await;

        let mut listed = Vec::new();
        let mut list_error = None;
        for (unit, listing) in units.iter().zip(listings) {
            match listing {
                Ok(objects) => listed.push((unit.as_ref(), objects)),
                Err(e) => {
                    error!("[{}] {}: listing objects failed: {}", store, unit.scope(), e);
                    outcome.fail(Stage::Verify, &e);
                    list_error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        let mut reporter = ReconciliationReporter::new(store, run_id);
        let count_error = self.count_units(store, &listed, &mut reporter, outcome).await;
        let error = list_error.or(count_error);
        self.notify(&verify_message(store.as_str(), outcome.mismatches, error.as_deref()))
            .await;

        let status = if error.is_some() {
            ReportStatus::Partial
        } else {
            ReportStatus::Complete
        };
        self.write_report(outcome, reporter, status, error);
    }

    /// Count every unit concurrently and merge the scopes into `reporter`.
    async fn count_units(
        &self,
        store: StoreKind,
        units: &[(&dyn StoreAdapter, Vec<SchemaObject>)],
        reporter: &mut ReconciliationReporter,
        outcome: &mut StoreOutcome,
    ) -> Option<String> {
        info!("[{}] Phase 5: Verifying counts", store);
        let counted = join_all(
            units
                .iter()
                .map(|(unit, objects)| verify_unit(*unit, objects)),
        )
        .await;

        let mut first_error = None;
        for ((unit, _), (scope, result)) in units.iter().zip(counted) {
            outcome.mismatches += scope.mismatches();
            reporter.merge_scope(unit.scope(), scope);
            if let Err(e) = result {
                error!("[{}] {}: verify failed: {}", store, unit.scope(), e);
                outcome.fail(Stage::Verify, &e);
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
        if outcome.mismatches > 0 {
            warn!("[{}] {} count mismatches", store, outcome.mismatches);
        }
        first_error
    }

    fn write_report(
        &self,
        outcome: &mut StoreOutcome,
        reporter: ReconciliationReporter,
        status: ReportStatus,
        error: Option<String>,
    ) {
        let report = reporter.finish(status, error);
        match report.save(&self.config.output_dir) {
            Ok(path) => {
                info!("[{}] report written to {}", outcome.store, path.display());
                outcome.report_path = Some(path);
            }
            Err(e) => {
                error!("[{}] writing report failed: {}", outcome.store, e);
                outcome.fail(Stage::Verify, &e);
            }
        }
    }

    async fn notify(&self, message: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(message).await;
        }
    }
}

/// Source objects of a unit in rank order.
async fn list_objects(adapter: &dyn StoreAdapter) -> Result<Vec<SchemaObject>> {
    let mut objects = adapter.list_schema_objects().await?;
    order_by_rank(&mut objects);
    Ok(objects)
}

/// Clear the target of one unit and copy schema and rows into it.
pub(crate) async fn copy_unit(
    adapter: &dyn StoreAdapter,
) -> std::result::Result<CopyStats, StageFailure> {
    let scope = adapter.scope().to_string();
    let store = adapter.kind();

    info!("[{}] Phase 1: Clearing target ({})", store, scope);
    adapter.clear().await.map_err(StageFailure::at(Stage::Clear))?;

    info!("[{}] Phase 2: Copying schema ({})", store, scope);
    let objects = list_objects(adapter)
        .await
        .map_err(StageFailure::at(Stage::CopySchema))?;
    let (deferred, early): (Vec<&SchemaObject>, Vec<&SchemaObject>) =
        objects.iter().partition(|o| o.is_deferred());
    let mut stats = CopyStats::default();
    for object in &early {
        debug!("[{}] creating {} {}", store, object.kind, object.qualified_name());
        adapter
            .create_object(object)
            .await
            .map_err(StageFailure::at(Stage::CopySchema))?;
        stats.objects_created += 1;
    }

    info!("[{}] Phase 3: Copying data ({})", store, scope);
    for object in early.iter().filter(|o| o.holds_rows()) {
        let rows = copy_rows(adapter, object)
            .await
            .map_err(StageFailure::at(Stage::CopyData))?;
        debug!("[{}] {}: {} rows", store, object.qualified_name(), rows);
        stats.rows_copied += rows;
    }

    info!(
        "[{}] Phase 4: Finalizing {} objects ({})",
        store,
        deferred.len(),
        scope
    );
    for object in &deferred {
        debug!("[{}] creating {} {}", store, object.kind, object.qualified_name());
        adapter
            .create_object(object)
            .await
            .map_err(StageFailure::at(Stage::Finalize))?;
        stats.objects_created += 1;
    }

    info!(
        "[{}] {}: {} objects, {} rows copied",
        store, scope, stats.objects_created, stats.rows_copied
    );
    stats.objects = objects;
    Ok(stats)
}

async fn copy_rows(adapter: &dyn StoreAdapter, object: &SchemaObject) -> Result<u64> {
    let mut stream = adapter.stream_rows(object);
    let mut written = 0;
    while let Some(batch) = stream.next_batch().await {
        written += adapter.write_rows(object, batch?).await?;
    }
    Ok(written)
}

/// Count the row-holding objects and aggregates of one unit.
///
/// Counts taken before a failure are kept in the returned scope.
pub(crate) async fn verify_unit(
    adapter: &dyn StoreAdapter,
    objects: &[SchemaObject],
) -> (ScopeReport, Result<()>) {
    let mut reporter = ReconciliationReporter::new(adapter.kind(), "");
    let result = count_into(adapter, objects, &mut reporter).await;
    let scope = reporter
        .finish(ReportStatus::Complete, None)
        .scopes
        .remove(adapter.scope())
        .unwrap_or_default();
    (scope, result)
}

async fn count_into(
    adapter: &dyn StoreAdapter,
    objects: &[SchemaObject],
    reporter: &mut ReconciliationReporter,
) -> Result<()> {
    let scope = adapter.scope();
    for object in objects.iter().filter(|o| o.holds_rows()) {
        let (source_count, target_count) = adapter.count(object).await?;
        reporter.record(&ReconciliationEntry {
            scope: scope.to_string(),
            namespace: object.namespace.clone(),
            object_name: object.name.clone(),
            source_count,
            target_count,
        });
    }
    for aggregate in adapter.aggregate_counts().await? {
        reporter.record_aggregate(
            scope,
            &aggregate.name,
            aggregate.source_count,
            aggregate.target_count,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fields;
    use crate::drivers::document::DocumentAdapter;
    use crate::drivers::graph::client::{Edge, Vertex};
    use crate::drivers::graph::GraphAdapter;
    use crate::drivers::search::client::IndexDefinition;
    use crate::drivers::search::SearchAdapter;
    use crate::report::StoreReport;
    use crate::testing::{MemGraph, MemMongo, MemSearch, RecordingSink, StaticFactory};
    use serde_json::json;
    use tempfile::TempDir;

    fn config(output_dir: &std::path::Path, parallel: bool) -> Config {
        Config::from_yaml(&format!(
            r#"
output_dir: "{}"
parallel_stores: {}
graph:
  source: {{ url: "http://dev-gremlin:8182/gremlin" }}
  target: {{ url: "http://preprod-gremlin:8182/gremlin" }}
search:
  source: {{ url: "http://dev-es:9200" }}
  target: {{ url: "http://preprod-es:9200" }}
  indices: [logs]
"#,
            output_dir.display(),
            parallel
        ))
        .unwrap()
    }

    fn graph_source(dangling_edge: bool) -> MemGraph {
        let graph = MemGraph::default();
        for i in 1..=3 {
            graph.seed_vertex(Vertex {
                id: json!(i),
                label: "person".into(),
                properties: Fields::new(),
            });
        }
        graph.seed_edge(Edge {
            id: json!("e1"),
            label: "knows".into(),
            out_v: json!(1),
            in_v: json!(if dangling_edge { 99 } else { 2 }),
            properties: Fields::new(),
        });
        graph
    }

    fn search_source() -> MemSearch {
        let search = MemSearch::default();
        search.seed_index(
            "logs",
            IndexDefinition {
                settings: json!({"index": {"number_of_shards": "1"}}),
                mappings: json!({}),
                aliases: json!({}),
            },
        );
        for i in 0..7 {
            search.seed_document("logs", &format!("doc-{}", i), json!({"n": i}));
        }
        search
    }

    struct Fixture {
        graph_target: MemGraph,
        search_target: MemSearch,
        factory: StaticFactory,
    }

    fn fixture(graph_source: MemGraph) -> Fixture {
        let graph_target = MemGraph::default();
        let search_source = search_source();
        let search_target = MemSearch::default();

        let (gs, gt) = (graph_source, graph_target.clone());
        let (ss, st) = (search_source, search_target.clone());
        let factory = StaticFactory::default()
            .with(StoreKind::Graph, move || {
                Ok(vec![Box::new(GraphAdapter::new(gs.clone(), gt.clone(), "dev|preprod", 2))
                    as Box<dyn StoreAdapter>])
            })
            .with(StoreKind::Search, move || {
                Ok(vec![Box::new(SearchAdapter::new(
                    ss.clone(),
                    st.clone(),
                    "dev|preprod",
                    vec!["logs".into()],
                    3,
                    "1m",
                )) as Box<dyn StoreAdapter>])
            });
        Fixture {
            graph_target,
            search_target,
            factory,
        }
    }

    fn orchestrator(config: Config, factory: StaticFactory) -> (Orchestrator, RecordingSink) {
        let sink = RecordingSink::default();
        let orchestrator = Orchestrator::new(config)
            .unwrap()
            .with_factory(Arc::new(factory))
            .with_notifier(Arc::new(sink.clone()));
        (orchestrator, sink)
    }

    fn load_report(dir: &TempDir, store: StoreKind) -> StoreReport {
        StoreReport::load(dir.path().join(StoreReport::file_name(store))).unwrap()
    }

    #[tokio::test]
    async fn test_run_copies_and_writes_reports() {
        let dir = TempDir::new().unwrap();
        let fixture = fixture(graph_source(false));
        let (orchestrator, _) = orchestrator(config(dir.path(), false), fixture.factory);

        let result = orchestrator.run(&[]).await.unwrap();
        assert!(result.is_success());
        let stores: Vec<StoreKind> = result.stores.iter().map(|s| s.store).collect();
        assert_eq!(stores, vec![StoreKind::Graph, StoreKind::Search]);
        assert_eq!(result.stores[0].rows_copied, 4);
        assert_eq!(result.stores[1].rows_copied, 7);

        assert_eq!(fixture.graph_target.vertex_count_now(), 3);
        assert_eq!(fixture.search_target.document_count("logs"), 7);

        for store in [StoreKind::Graph, StoreKind::Search] {
            let report = load_report(&dir, store);
            assert_eq!(report.status, ReportStatus::Complete);
            assert_eq!(report.run_id, result.run_id);
            assert_eq!(report.mismatches(), 0);
            assert!(report.scopes.contains_key("dev|preprod"));
        }

        let graph = &load_report(&dir, StoreKind::Graph).scopes["dev|preprod"];
        assert_eq!(graph.objects.len(), 2);
        assert!(graph.aggregates.is_empty());
    }

    #[tokio::test]
    async fn test_copy_failure_isolated_to_store() {
        let dir = TempDir::new().unwrap();
        let fixture = fixture(graph_source(true));
        let (orchestrator, _) = orchestrator(config(dir.path(), true), fixture.factory);

        let result = orchestrator.run(&[]).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result.failed_stores(), vec![StoreKind::Graph]);
        let graph = &result.stores[0];
        assert_eq!(graph.failed_stage, Some(Stage::CopyData));
        assert!(graph.error.is_some());

        assert_eq!(load_report(&dir, StoreKind::Graph).status, ReportStatus::CopyFailed);
        assert_eq!(load_report(&dir, StoreKind::Search).status, ReportStatus::Complete);
        assert_eq!(fixture.search_target.document_count("logs"), 7);
    }

    #[tokio::test]
    async fn test_connect_failure_writes_copy_failed_report() {
        let dir = TempDir::new().unwrap();
        let fixture = fixture(graph_source(false));
        let factory = fixture.factory.with(StoreKind::Graph, || {
            Err(RefreshError::connection("graph", "connection refused"))
        });
        let (orchestrator, sink) = orchestrator(config(dir.path(), false), factory);

        let result = orchestrator.run(&[]).await.unwrap();
        assert_eq!(result.failed_stores(), vec![StoreKind::Graph]);
        assert_eq!(result.stores[0].failed_stage, Some(Stage::Connect));

        let report = load_report(&dir, StoreKind::Graph);
        assert_eq!(report.status, ReportStatus::CopyFailed);
        assert!(report.error.unwrap().contains("connection refused"));
        assert!(report.scopes.is_empty());
        assert_eq!(load_report(&dir, StoreKind::Search).status, ReportStatus::Complete);

        let messages = sink.messages();
        assert!(messages[0].starts_with("[graph] copy failed"));
        assert!(!messages.iter().any(|m| m.starts_with("[graph] verify")));
    }

    #[tokio::test]
    async fn test_one_copy_and_one_verify_message_per_store() {
        let dir = TempDir::new().unwrap();
        let fixture = fixture(graph_source(false));
        let (orchestrator, sink) = orchestrator(config(dir.path(), false), fixture.factory);

        orchestrator.run(&[StoreKind::Search]).await.unwrap();
        assert_eq!(
            sink.messages(),
            vec!["[search] copy succeeded", "[search] verify succeeded"]
        );
    }

    #[tokio::test]
    async fn test_unconfigured_store_rejected() {
        let dir = TempDir::new().unwrap();
        let fixture = fixture(graph_source(false));
        let (orchestrator, _) = orchestrator(config(dir.path(), false), fixture.factory);

        let err = orchestrator.run(&[StoreKind::Document]).await.unwrap_err();
        assert!(matches!(err, RefreshError::Config(_)));
    }

    #[tokio::test]
    async fn test_selection_runs_in_store_order() {
        let dir = TempDir::new().unwrap();
        let fixture = fixture(graph_source(false));
        let (orchestrator, _) = orchestrator(config(dir.path(), false), fixture.factory);

        let result = orchestrator
            .health_check(&[StoreKind::Search, StoreKind::Graph, StoreKind::Search])
            .await
            .unwrap();
        let stores: Vec<StoreKind> = result.stores.iter().map(|s| s.store).collect();
        assert_eq!(stores, vec![StoreKind::Graph, StoreKind::Search]);
    }

    #[tokio::test]
    async fn test_verify_reports_mismatches_without_copying() {
        let dir = TempDir::new().unwrap();
        let fixture = fixture(graph_source(false));
        let (orchestrator, sink) = orchestrator(config(dir.path(), false), fixture.factory);

        let result = orchestrator.verify(&[StoreKind::Search]).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.stores[0].rows_copied, 0);
        assert_eq!(result.stores[0].mismatches, 1);
        assert_eq!(fixture.search_target.document_count("logs"), 0);

        let report = load_report(&dir, StoreKind::Search);
        assert_eq!(report.status, ReportStatus::Complete);
        assert_eq!(report.mismatches(), 1);
        assert_eq!(
            sink.messages(),
            vec!["[search] verify succeeded with 1 count mismatches"]
        );
    }

    #[tokio::test]
    async fn test_clients_closed_after_run() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_yaml(&format!(
            r#"
output_dir: "{}"
document:
  source: {{ uri: "mongodb://dev-mongo:27017" }}
  target: {{ uri: "mongodb://preprod-mongo:27017" }}
"#,
            dir.path().display()
        ))
        .unwrap();

        let (source, target) = (MemMongo::default(), MemMongo::default());
        source.seed_document("shop", "orders", json!({"_id": 1}));
        let (ms, mt) = (source.clone(), target.clone());
        let factory = StaticFactory::default().with(StoreKind::Document, move || {
            Ok(vec![Box::new(DocumentAdapter::new(ms.clone(), mt.clone(), "dev|preprod", vec![]))
                as Box<dyn StoreAdapter>])
        });
        let (orchestrator, _) = orchestrator(config, factory);

        let result = orchestrator.run(&[]).await.unwrap();
        assert!(result.is_success());
        assert_eq!(target.documents("shop", "orders").len(), 1);
        assert!(source.is_closed());
        assert!(target.is_closed());
    }

    #[tokio::test]
    async fn test_health_check_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let fixture = fixture(graph_source(false));
        let (orchestrator, sink) = orchestrator(config(dir.path(), true), fixture.factory);

        let result = orchestrator.health_check(&[]).await.unwrap();
        assert!(result.is_success());
        assert_eq!(fixture.graph_target.vertex_count_now(), 0);
        assert!(sink.messages().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_run_result_json() {
        let now = Utc::now();
        let mut outcome = StoreOutcome::new(StoreKind::Relational);
        outcome.fail(Stage::Finalize, &RefreshError::store("relational", "boom"));
        outcome.fail(Stage::Verify, &RefreshError::store("relational", "later"));
        let result = RunResult {
            run_id: "r1".into(),
            config_hash: "abc".into(),
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            stores: vec![outcome],
        };
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["stores"][0]["store"], "relational");
        assert_eq!(json["stores"][0]["status"], "failed");
        assert_eq!(json["stores"][0]["failed_stage"], "finalize");
        assert!(json["stores"][0]["error"].as_str().unwrap().contains("boom"));
    }
}
