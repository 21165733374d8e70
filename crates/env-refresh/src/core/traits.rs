//! Core traits for store-agnostic environment refresh.
//!
//! - [`StoreAdapter`]: one source/target pair of a store (clear, schema, rows, counts)
//! - [`RowStream`] / [`RowSender`]: bounded batch channel between a background
//!   reader task and the writer

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{RefreshError, Result};

use super::schema::SchemaObject;
use super::value::{Batch, Fields, Row};

/// Number of batches a reader may run ahead of the writer.
pub const READ_AHEAD_BATCHES: usize = 4;

/// The five supported stores, in default run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    WideColumn,
    Graph,
    Relational,
    Search,
    Document,
}

impl StoreKind {
    pub const ALL: [StoreKind; 5] = [
        StoreKind::WideColumn,
        StoreKind::Graph,
        StoreKind::Relational,
        StoreKind::Search,
        StoreKind::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::WideColumn => "wide-column",
            StoreKind::Graph => "graph",
            StoreKind::Relational => "relational",
            StoreKind::Search => "search",
            StoreKind::Document => "document",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = RefreshError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "wide-column" | "cassandra" => Ok(StoreKind::WideColumn),
            "graph" | "gremlin" => Ok(StoreKind::Graph),
            "relational" | "postgres" => Ok(StoreKind::Relational),
            "search" | "elastic" => Ok(StoreKind::Search),
            "document" | "mongo" => Ok(StoreKind::Document),
            other => Err(RefreshError::Config(format!(
                "Unknown store '{}'. Valid values: wide-column, graph, relational, search, document",
                other
            ))),
        }
    }
}

/// A named store-wide count pair (e.g. number of relational functions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCount {
    pub name: String,
    pub source_count: i64,
    pub target_count: i64,
}

impl AggregateCount {
    pub fn new(name: impl Into<String>, source_count: i64, target_count: i64) -> Self {
        Self {
            name: name.into(),
            source_count,
            target_count,
        }
    }
}

/// One source/target pair of a store.
///
/// The orchestrator drives every implementation through the same sequence:
/// `clear` on the target, `create_object` for each object from
/// `list_schema_objects`, `stream_rows` + `write_rows` for each row-holding
/// object, then `count` and `aggregate_counts`. `shutdown` always runs last.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Report scope of this pair (e.g. `devdb|preproddb`).
    fn scope(&self) -> &str;

    /// Drop every replica-managed object on the target. A no-op when empty.
    async fn clear(&self) -> Result<()>;

    /// Introspect the source, system namespaces excluded, ordered by rank.
    async fn list_schema_objects(&self) -> Result<Vec<SchemaObject>>;

    /// Create one object on the target.
    async fn create_object(&self, object: &SchemaObject) -> Result<()>;

    /// Stream the rows of a container from the source.
    ///
    /// Returns immediately; a background task feeds the stream. The stream is
    /// finite and cannot be restarted.
    fn stream_rows(&self, container: &SchemaObject) -> RowStream;

    /// Write rows to the target container, preserving identity keys.
    async fn write_rows(&self, container: &SchemaObject, rows: Batch) -> Result<u64>;

    /// `(source_count, target_count)` for a container.
    async fn count(&self, container: &SchemaObject) -> Result<(i64, i64)>;

    /// Store-wide aggregate counts.
    async fn aggregate_counts(&self) -> Result<Vec<AggregateCount>> {
        Ok(Vec::new())
    }

    /// Release source and target connections.
    async fn shutdown(&self);
}

/// Receiving half of a row batch channel.
pub struct RowStream {
    rx: mpsc::Receiver<Result<Batch>>,
}

impl RowStream {
    pub fn new(rx: mpsc::Receiver<Result<Batch>>) -> Self {
        Self { rx }
    }

    /// A stream that yields nothing.
    pub fn empty() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self { rx }
    }

    /// A stream that yields a single error.
    pub fn failed(err: RefreshError) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(Err(err));
        Self { rx }
    }

    pub async fn next_batch(&mut self) -> Option<Result<Batch>> {
        self.rx.recv().await
    }
}

/// Sending half of a row batch channel; buffers rows into batches.
pub struct RowSender {
    tx: mpsc::Sender<Result<Batch>>,
    key: Vec<String>,
    batch_size: usize,
    buffer: Batch,
    sent: u64,
}

impl RowSender {
    pub fn new(tx: mpsc::Sender<Result<Batch>>, batch_size: usize, key: Vec<String>) -> Self {
        Self {
            tx,
            key,
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            sent: 0,
        }
    }

    /// Buffer one row, sending a batch when full.
    pub async fn push(&mut self, fields: Fields) -> Result<()> {
        self.buffer.push(Row::new(fields, self.key.clone()));
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send whatever is buffered as one batch.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.sent += batch.len() as u64;
        self.tx
            .send(Ok(batch))
            .await
            .map_err(|_| RefreshError::store("reader", "row consumer went away"))
    }

    /// Flush the remainder and return the number of rows sent.
    pub async fn finish(mut self) -> Result<u64> {
        self.flush().await?;
        Ok(self.sent)
    }
}

/// Spawn a background reader feeding a [`RowStream`].
///
/// The reader gets a [`RowSender`] and must call [`RowSender::finish`].
/// An error returned by the reader is delivered as the last stream item.
pub fn spawn_reader<F, Fut>(batch_size: usize, key: Vec<String>, read: F) -> RowStream
where
    F: FnOnce(RowSender) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(READ_AHEAD_BATCHES);
    let sender = RowSender::new(tx.clone(), batch_size, key);
    tokio::spawn(async move {
        if let Err(e) = read(sender).await {
            let _ = tx.send(Err(e)).await;
        }
    });
    RowStream::new(rx)
}
