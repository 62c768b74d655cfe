//! Wrapper components: cross-cutting behavior layered over a
//! `DbInterface` without touching its implementations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::db_interface::DbInterface;
use crate::error::Result;
use crate::observability::Operation;

/// Wraps any `DbInterface` with per-operation tracing and a running
/// operation count, mirroring the observability hooks every other
/// backend already carries internally.
pub struct TracedInterface {
    inner: Arc<dyn DbInterface>,
    operation_count: AtomicU64,
}

impl TracedInterface {
    pub fn new(inner: Arc<dyn DbInterface>) -> Self {
        Self {
            inner,
            operation_count: AtomicU64::new(0),
        }
    }

    pub fn operation_count(&self) -> u64 {
        self.operation_count.load(Ordering::Relaxed)
    }

    fn record(&self) {
        self.operation_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl DbInterface for TracedInterface {
    async fn set_working_graph(&self, graph: &str) {
        self.inner.set_working_graph(graph).await;
    }

    async fn working_graph(&self) -> Option<String> {
        self.inner.working_graph().await
    }

    async fn is_ready(&self) -> bool {
        self.inner.is_ready().await
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    fn absolute_db_path(&self) -> String {
        self.inner.absolute_db_path()
    }

    async fn load(&self, uri: &str, class: Option<&str>) -> Result<Option<Value>> {
        self.record();
        let start = Instant::now();
        let result = self.inner.load(uri, class).await;
        debug!(uri, elapsed = ?start.elapsed(), ok = result.is_ok(), "load");
        result
    }

    async fn find(&self, class: Option<&str>, properties: &Map<String, Value>) -> Result<Vec<Value>> {
        self.record();
        let start = Instant::now();
        let result = self.inner.find(class, properties).await;
        debug!(?class, elapsed = ?start.elapsed(), ok = result.is_ok(), "find");
        result
    }

    async fn uris(&self, class: Option<&str>, properties: &Map<String, Value>) -> Result<Vec<String>> {
        self.record();
        self.inner.uris(class, properties).await
    }

    async fn add(&self, entities: Vec<Value>) -> Result<()> {
        self.record();
        let op = Operation::Add {
            graph: self.inner.working_graph().await.unwrap_or_default(),
            count: entities.len(),
        };
        let start = Instant::now();
        let result = self.inner.add(entities).await;
        info!(?op, elapsed = ?start.elapsed(), ok = result.is_ok(), "add");
        result
    }

    async fn update(&self, entities: Vec<Value>) -> Result<()> {
        self.record();
        let op = Operation::Update {
            graph: self.inner.working_graph().await.unwrap_or_default(),
            count: entities.len(),
        };
        let start = Instant::now();
        let result = self.inner.update(entities).await;
        info!(?op, elapsed = ?start.elapsed(), ok = result.is_ok(), "update");
        result
    }

    async fn remove(&self, uri: &str) -> Result<()> {
        self.record();
        let start = Instant::now();
        let result = self.inner.remove(uri).await;
        info!(uri, elapsed = ?start.elapsed(), ok = result.is_ok(), "remove");
        result
    }

    async fn clear(&self) -> Result<bool> {
        self.record();
        let start = Instant::now();
        let result = self.inner.clear().await;
        info!(elapsed = ?start.elapsed(), ok = result.is_ok(), "clear");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_interface::DirectInterface;
    use crate::engine::StorageEngine;
    use tempfile::tempdir;

    #[tokio::test]
    async fn traced_interface_forwards_calls_and_counts_operations() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(StorageEngine::new(dir.path()));
        let inner: Arc<dyn DbInterface> = Arc::new(DirectInterface::new(engine, false));
        let traced = TracedInterface::new(inner);
        traced.set_working_graph("g").await;

        traced
            .add(vec![serde_json::json!({"uri": "u1", "classname": "T", "properties": {}})])
            .await
            .unwrap();
        let found = traced.find(Some("T"), &Map::new()).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(traced.operation_count(), 2);
    }
}
