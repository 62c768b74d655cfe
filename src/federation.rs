//! Federation: aggregates one writable "main" backend and N read-only
//! "import" backends behind the shared `DbInterface` contract.
//!
//! Baseline semantics (spec §9 Open Question 1): write to main, read
//! from imports in declared order, first match wins, no main fallback.
//! The source carries four subtly different variants of this
//! component; this is deliberately the simplest one, not the buggiest.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::db_interface::DbInterface;
use crate::error::{Result, XdbiError};

pub struct ImportServer {
    pub name: String,
    pub interface: Arc<dyn DbInterface>,
}

pub struct FederatedInterface {
    main: Option<Arc<dyn DbInterface>>,
    imports: Vec<ImportServer>,
}

impl FederatedInterface {
    pub fn new(main: Option<Arc<dyn DbInterface>>, imports: Vec<ImportServer>) -> Self {
        Self { main, imports }
    }

    pub async fn set_import_server_working_graph(&self, name: &str, graph: &str) -> Result<()> {
        let server = self
            .imports
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| XdbiError::InvalidConfig(format!("no import server named '{name}'")))?;
        server.interface.set_working_graph(graph).await;
        Ok(())
    }

    /// Like `find`, but returns `(entity, source_name)` pairs without
    /// deduplication, so a caller can tell which import each result
    /// came from.
    pub async fn find_all(&self, class: Option<&str>, properties: &Map<String, Value>) -> Result<Vec<(Value, String)>> {
        let mut out = Vec::new();
        for server in &self.imports {
            for doc in server.interface.find(class, properties).await? {
                out.push((doc, server.name.clone()));
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DbInterface for FederatedInterface {
    async fn set_working_graph(&self, graph: &str) {
        if let Some(main) = &self.main {
            main.set_working_graph(graph).await;
        }
    }

    async fn working_graph(&self) -> Option<String> {
        match &self.main {
            Some(main) => main.working_graph().await,
            None => None,
        }
    }

    async fn is_ready(&self) -> bool {
        if let Some(main) = &self.main {
            if main.is_ready().await {
                return true;
            }
        }
        for server in &self.imports {
            if server.interface.is_ready().await {
                return true;
            }
        }
        false
    }

    fn is_read_only(&self) -> bool {
        self.main.is_none()
    }

    fn absolute_db_path(&self) -> String {
        if let Some(main) = &self.main {
            return main.absolute_db_path();
        }
        self.imports
            .first()
            .map(|s| s.interface.absolute_db_path())
            .unwrap_or_default()
    }

    async fn load(&self, uri: &str, class: Option<&str>) -> Result<Option<Value>> {
        for server in &self.imports {
            if let Some(doc) = server.interface.load(uri, class).await? {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    async fn find(&self, class: Option<&str>, properties: &Map<String, Value>) -> Result<Vec<Value>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for server in &self.imports {
            for doc in server.interface.find(class, properties).await? {
                let uri = doc.get("uri").and_then(Value::as_str).unwrap_or_default().to_string();
                if seen.insert(uri) {
                    out.push(doc);
                }
            }
        }
        Ok(out)
    }

    async fn uris(&self, class: Option<&str>, properties: &Map<String, Value>) -> Result<Vec<String>> {
        let mut out: HashSet<String> = HashSet::new();
        for server in &self.imports {
            out.extend(server.interface.uris(class, properties).await?);
        }
        if let Some(main) = &self.main {
            out.extend(main.uris(class, properties).await?);
        }
        Ok(out.into_iter().collect())
    }

    async fn add(&self, entities: Vec<Value>) -> Result<()> {
        match &self.main {
            Some(main) => main.add(entities).await,
            None => Ok(()),
        }
    }

    async fn update(&self, entities: Vec<Value>) -> Result<()> {
        match &self.main {
            Some(main) => main.update(entities).await,
            None => Ok(()),
        }
    }

    async fn remove(&self, uri: &str) -> Result<()> {
        match &self.main {
            Some(main) => main.remove(uri).await,
            None => Ok(()),
        }
    }

    async fn clear(&self) -> Result<bool> {
        match &self.main {
            Some(main) => main.clear().await,
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_interface::DirectInterface;
    use crate::engine::StorageEngine;
    use tempfile::tempdir;

    async fn direct_with_doc(uri: &str) -> (tempfile::TempDir, Arc<DirectInterface>) {
        let dir = tempdir().unwrap();
        let engine = Arc::new(StorageEngine::new(dir.path()));
        let iface = Arc::new(DirectInterface::new(engine, true));
        iface.set_working_graph("g").await;
        // write directly via a writable sibling to seed the read-only import
        let seeding_engine = Arc::new(StorageEngine::new(dir.path()));
        let writer = DirectInterface::new(seeding_engine, false);
        writer.set_working_graph("g").await;
        writer
            .add(vec![serde_json::json!({"uri": uri, "classname": "T", "properties": {}})])
            .await
            .unwrap();
        (dir, iface)
    }

    #[tokio::test]
    async fn s7_federated_find_dedup() {
        let (_d1, import1) = direct_with_doc("u1").await;
        let (_d2, import2) = direct_with_doc("u1").await;

        let federated = FederatedInterface::new(
            None,
            vec![
                ImportServer { name: "import-0".into(), interface: import1 },
                ImportServer { name: "import-1".into(), interface: import2 },
            ],
        );

        let results = federated.find(Some("T"), &Map::new()).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn writes_are_no_ops_without_main() {
        let federated = FederatedInterface::new(None, vec![]);
        assert!(federated.add(vec![]).await.is_ok());
        assert_eq!(federated.clear().await.unwrap(), false);
    }
}
