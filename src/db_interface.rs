//! DB Interface: the abstract contract shared by the direct, remote,
//! and federated backends. Every operation enforces readiness;
//! mutating operations additionally enforce writeability.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::engine::StorageEngine;
use crate::error::{Result, XdbiError};

#[async_trait]
pub trait DbInterface: Send + Sync {
    async fn set_working_graph(&self, graph: &str);
    async fn working_graph(&self) -> Option<String>;

    /// Local: graph set and db path exists. Remote: ping succeeds and
    /// graph is set.
    async fn is_ready(&self) -> bool;

    fn is_read_only(&self) -> bool {
        false
    }

    /// Canonical local path, or a URL (optionally embedding
    /// `user:password`), depending on the concrete variant.
    fn absolute_db_path(&self) -> String;

    async fn load(&self, uri: &str, class: Option<&str>) -> Result<Option<Value>>;
    async fn find(&self, class: Option<&str>, properties: &Map<String, Value>) -> Result<Vec<Value>>;

    /// `find` projected to the identity set.
    async fn uris(&self, class: Option<&str>, properties: &Map<String, Value>) -> Result<Vec<String>> {
        Ok(self
            .find(class, properties)
            .await?
            .into_iter()
            .filter_map(|doc| doc.get("uri").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    async fn add(&self, entities: Vec<Value>) -> Result<()>;
    async fn update(&self, entities: Vec<Value>) -> Result<()>;
    async fn remove(&self, uri: &str) -> Result<()>;
    async fn clear(&self) -> Result<bool>;
}

fn require_ready(ready: bool) -> Result<()> {
    if !ready {
        return Err(XdbiError::NotReady);
    }
    Ok(())
}

fn require_writable(read_only: bool) -> Result<()> {
    if read_only {
        return Err(XdbiError::ReadOnly);
    }
    Ok(())
}

/// Local engine + per-graph lock, wired behind the shared contract.
pub struct DirectInterface {
    engine: Arc<StorageEngine>,
    working_graph: tokio::sync::RwLock<Option<String>>,
    read_only: bool,
}

impl DirectInterface {
    pub fn new(engine: Arc<StorageEngine>, read_only: bool) -> Self {
        Self {
            engine,
            working_graph: tokio::sync::RwLock::new(None),
            read_only,
        }
    }

    async fn graph(&self) -> Result<String> {
        self.working_graph
            .read()
            .await
            .clone()
            .ok_or(XdbiError::NotReady)
    }
}

#[async_trait]
impl DbInterface for DirectInterface {
    async fn set_working_graph(&self, graph: &str) {
        *self.working_graph.write().await = Some(graph.to_string());
    }

    async fn working_graph(&self) -> Option<String> {
        self.working_graph.read().await.clone()
    }

    async fn is_ready(&self) -> bool {
        let graph = self.working_graph.read().await.clone();
        match graph {
            Some(g) => self.engine.layout().db_path().exists() || self.engine.layout().graph_dir(&g).await.is_ok(),
            None => false,
        }
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn absolute_db_path(&self) -> String {
        self.engine.layout().db_path().display().to_string()
    }

    async fn load(&self, uri: &str, class: Option<&str>) -> Result<Option<Value>> {
        require_ready(self.is_ready().await)?;
        let graph = self.graph().await?;
        self.engine.load(&graph, uri, class).await
    }

    async fn find(&self, class: Option<&str>, properties: &Map<String, Value>) -> Result<Vec<Value>> {
        require_ready(self.is_ready().await)?;
        let graph = self.graph().await?;
        self.engine.find(&graph, class, properties).await
    }

    async fn add(&self, entities: Vec<Value>) -> Result<()> {
        require_ready(self.is_ready().await)?;
        require_writable(self.read_only)?;
        let graph = self.graph().await?;
        self.engine.add(&graph, entities).await
    }

    async fn update(&self, entities: Vec<Value>) -> Result<()> {
        require_ready(self.is_ready().await)?;
        require_writable(self.read_only)?;
        let graph = self.graph().await?;
        self.engine.update(&graph, entities).await
    }

    async fn remove(&self, uri: &str) -> Result<()> {
        require_ready(self.is_ready().await)?;
        require_writable(self.read_only)?;
        let graph = self.graph().await?;
        self.engine.remove(&graph, uri).await
    }

    async fn clear(&self) -> Result<bool> {
        require_ready(self.is_ready().await)?;
        require_writable(self.read_only)?;
        let graph = self.graph().await?;
        self.engine.clear(&graph).await
    }
}

/// HTTP client speaking the §6.3 wire envelope to a remote `xdbi`
/// server that embeds its own `DirectInterface`.
pub struct RemoteInterface {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    working_graph: tokio::sync::RwLock<Option<String>>,
    read_only: bool,
}

impl RemoteInterface {
    pub fn new(base_url: impl Into<String>, read_only: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            username: None,
            password: None,
            working_graph: tokio::sync::RwLock::new(None),
            read_only,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    async fn graph(&self) -> Result<String> {
        self.working_graph
            .read()
            .await
            .clone()
            .ok_or(XdbiError::NotReady)
    }

    async fn call(&self, envelope: Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.base_url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| XdbiError::Transport(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| XdbiError::Transport(format!("non-JSON response: {e}")))?;

        match body.get("status").and_then(Value::as_str) {
            Some("finished") => Ok(body.get("result").cloned().unwrap_or(Value::Null)),
            Some("error") => {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("remote error")
                    .to_string();
                Err(XdbiError::Transport(message))
            }
            _ => Err(XdbiError::Transport("response envelope missing 'status'".into())),
        }
    }

    async fn ping(&self) -> bool {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.call(serde_json::json!({"type": "ping", "graph": "", "time": now_ms}))
            .await
            .is_ok()
    }
}

#[async_trait]
impl DbInterface for RemoteInterface {
    async fn set_working_graph(&self, graph: &str) {
        *self.working_graph.write().await = Some(graph.to_string());
    }

    async fn working_graph(&self) -> Option<String> {
        self.working_graph.read().await.clone()
    }

    async fn is_ready(&self) -> bool {
        self.working_graph.read().await.is_some() && self.ping().await
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn absolute_db_path(&self) -> String {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                let mut url = url::Url::parse(&self.base_url).unwrap_or_else(|_| {
                    url::Url::parse("http://invalid.invalid").expect("static fallback url parses")
                });
                let _ = url.set_username(u);
                let _ = url.set_password(Some(p));
                url.to_string()
            }
            _ => self.base_url.clone(),
        }
    }

    async fn load(&self, uri: &str, class: Option<&str>) -> Result<Option<Value>> {
        require_ready(self.is_ready().await)?;
        let graph = self.graph().await?;
        let mut envelope = serde_json::json!({"type": "load", "graph": graph, "uri": uri});
        if let Some(c) = class {
            envelope["classname"] = Value::String(c.to_string());
        }
        let result = self.call(envelope).await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    async fn find(&self, class: Option<&str>, properties: &Map<String, Value>) -> Result<Vec<Value>> {
        require_ready(self.is_ready().await)?;
        let graph = self.graph().await?;
        let envelope = serde_json::json!({
            "type": "find",
            "graph": graph,
            "classname": class.unwrap_or(""),
            "properties": properties,
        });
        let result = self.call(envelope).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    async fn add(&self, entities: Vec<Value>) -> Result<()> {
        require_ready(self.is_ready().await)?;
        require_writable(self.read_only)?;
        let graph = self.graph().await?;
        self.call(serde_json::json!({"type": "add", "graph": graph, "models": entities}))
            .await?;
        Ok(())
    }

    async fn update(&self, entities: Vec<Value>) -> Result<()> {
        require_ready(self.is_ready().await)?;
        require_writable(self.read_only)?;
        let graph = self.graph().await?;
        self.call(serde_json::json!({"type": "update", "graph": graph, "models": entities}))
            .await?;
        Ok(())
    }

    async fn remove(&self, uri: &str) -> Result<()> {
        require_ready(self.is_ready().await)?;
        require_writable(self.read_only)?;
        let graph = self.graph().await?;
        self.call(serde_json::json!({"type": "remove", "graph": graph, "uri": uri}))
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<bool> {
        require_ready(self.is_ready().await)?;
        require_writable(self.read_only)?;
        let graph = self.graph().await?;
        self.call(serde_json::json!({"type": "clear", "graph": graph}))
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn direct_interface_enforces_readiness_before_working_graph_set() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(StorageEngine::new(dir.path()));
        let iface = DirectInterface::new(engine, false);
        assert!(iface.load("u1", None).await.is_err());
    }

    #[tokio::test]
    async fn direct_interface_enforces_read_only() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(StorageEngine::new(dir.path()));
        let iface = DirectInterface::new(engine, true);
        iface.set_working_graph("g").await;
        let err = iface.add(vec![]).await.unwrap_err();
        assert!(matches!(err, XdbiError::ReadOnly));
    }

    #[tokio::test]
    async fn direct_interface_add_find_round_trip() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(StorageEngine::new(dir.path()));
        let iface = DirectInterface::new(engine, false);
        iface.set_working_graph("g").await;
        iface
            .add(vec![serde_json::json!({"uri": "u1", "classname": "T", "properties": {"a": 1}})])
            .await
            .unwrap();
        let found = iface.find(Some("T"), &Map::new()).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
