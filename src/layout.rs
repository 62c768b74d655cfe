//! Filesystem Layout Service: maps (graph, class, uri) to paths,
//! enumerates graphs/classes/files, and removes them on demand.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

use crate::error::{Result, XdbiError};
use crate::types::uri_to_uuid;

/// Name of the advisory lock sentinel file created inside every graph
/// directory.
pub const MUTEX_FILE: &str = "mutex_file";

/// Replace every `:` in a class name with `-`, matching the original's
/// `convertClassname`. This is a filesystem-boundary transform only;
/// the `classname` field stored inside the document keeps its
/// unnormalized form.
pub fn normalize_class_name(class: &str) -> String {
    class.replace(':', "-")
}

pub struct Layout {
    db_path: PathBuf,
}

impl Layout {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Directory for a graph, created on demand.
    pub async fn graph_dir(&self, graph: &str) -> Result<PathBuf> {
        let dir = self.db_path.join(graph);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| io_failure(&dir, source))?;
        Ok(dir)
    }

    /// Directory for a class within a graph, created on demand.
    pub async fn class_dir(&self, graph: &str, class: &str) -> Result<PathBuf> {
        let dir = self.graph_dir(graph).await?.join(normalize_class_name(class));
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| io_failure(&dir, source))?;
        Ok(dir)
    }

    /// Deterministic on-disk filename for a URI (also the `uuid` field).
    pub fn file_name_for(&self, uri: &str) -> String {
        uri_to_uuid(uri)
    }

    pub async fn file_path_for(&self, graph: &str, class: &str, uri: &str) -> Result<PathBuf> {
        Ok(self.class_dir(graph, class).await?.join(self.file_name_for(uri)))
    }

    /// `{ name -> path }` for every graph directory under the db root.
    pub async fn list_graphs(&self) -> Result<HashMap<String, PathBuf>> {
        list_subdirs(&self.db_path).await
    }

    /// `{ normalized-class -> path }` for every class directory in a graph.
    pub async fn list_classes(&self, graph: &str) -> Result<HashMap<String, PathBuf>> {
        let dir = self.graph_dir(graph).await?;
        list_subdirs(&dir).await
    }

    /// `{ filename -> path }` for every entity file in a graph, optionally
    /// scoped to one class.
    pub async fn list_files(&self, graph: &str, class: &str) -> Result<HashMap<String, PathBuf>> {
        let mut out = HashMap::new();
        if class.is_empty() {
            let classes = self.list_classes(graph).await?;
            for class_dir in classes.values() {
                collect_files(class_dir, &mut out).await?;
            }
        } else {
            let dir = self.class_dir(graph, class).await?;
            collect_files(&dir, &mut out).await?;
        }
        Ok(out)
    }

    /// Best-effort removal of the given files from a class' directory
    /// tree; failures are logged and the aggregate success is returned.
    pub async fn remove_files(&self, graph: &str, uris: &[String]) -> bool {
        let mut all_ok = true;
        let classes = match self.list_classes(graph).await {
            Ok(c) => c,
            Err(e) => {
                warn!(graph, error = %e, "failed to list classes while removing files");
                return false;
            }
        };
        for uri in uris {
            let filename = self.file_name_for(uri);
            let mut removed_any = false;
            for class_dir in classes.values() {
                let path = class_dir.join(&filename);
                if path.exists() {
                    if let Err(e) = fs::remove_file(&path).await {
                        warn!(path = %path.display(), error = %e, "failed to remove entity file");
                        all_ok = false;
                    } else {
                        removed_any = true;
                    }
                }
            }
            if !removed_any {
                warn!(uri, graph, "no on-disk file found to remove for uri");
            }
        }
        all_ok
    }

    /// Remove every class directory in a graph. The sentinel lock file
    /// and the graph directory itself are left behind.
    pub async fn remove_all_files(&self, graph: &str) -> bool {
        let classes = match self.list_classes(graph).await {
            Ok(c) => c,
            Err(e) => {
                warn!(graph, error = %e, "failed to list classes while clearing graph");
                return false;
            }
        };
        let mut all_ok = true;
        for (class, dir) in classes {
            if let Err(e) = fs::remove_dir_all(&dir).await {
                warn!(graph, class, error = %e, "failed to remove class directory");
                all_ok = false;
            }
        }
        all_ok
    }
}

async fn list_subdirs(dir: &Path) -> Result<HashMap<String, PathBuf>> {
    let mut out = HashMap::new();
    if !dir.exists() {
        return Ok(out);
    }
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|source| io_failure(dir, source))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| io_failure(dir, source))?
    {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|source| io_failure(&path, source))?;
        if file_type.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                out.insert(name.to_string(), path);
            }
        }
    }
    Ok(out)
}

async fn collect_files(dir: &Path, out: &mut HashMap<String, PathBuf>) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|source| io_failure(dir, source))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| io_failure(dir, source))?
    {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|source| io_failure(&path, source))?;
        if file_type.is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                out.insert(name.to_string(), path);
            }
        }
    }
    Ok(())
}

fn io_failure(path: &Path, source: std::io::Error) -> XdbiError {
    XdbiError::IoFailure {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn normalizes_colons_to_dashes() {
        assert_eq!(normalize_class_name("xtype:Person"), "xtype-Person");
        assert_eq!(normalize_class_name("plain"), "plain");
    }

    #[tokio::test]
    async fn class_dir_is_created_on_demand() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let class_dir = layout.class_dir("g1", "xtype:T").await.unwrap();
        assert!(class_dir.exists());
        assert!(class_dir.ends_with("g1/xtype-T"));
    }

    #[tokio::test]
    async fn file_path_for_is_deterministic() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let p1 = layout.file_path_for("g1", "T", "u1").await.unwrap();
        let p2 = layout.file_path_for("g1", "T", "u1").await.unwrap();
        assert_eq!(p1, p2);
    }

    #[tokio::test]
    async fn list_graphs_and_classes_round_trip() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.class_dir("g1", "A").await.unwrap();
        layout.class_dir("g1", "B").await.unwrap();
        layout.graph_dir("g2").await.unwrap();

        let graphs = layout.list_graphs().await.unwrap();
        assert_eq!(graphs.len(), 2);

        let classes = layout.list_classes("g1").await.unwrap();
        assert_eq!(classes.len(), 2);
        assert!(classes.contains_key("A"));
        assert!(classes.contains_key("B"));
    }

    #[tokio::test]
    async fn remove_all_files_keeps_graph_dir() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.class_dir("g1", "A").await.unwrap();
        assert!(layout.remove_all_files("g1").await);
        assert!(layout.graph_dir("g1").await.unwrap().exists());
        assert_eq!(layout.list_classes("g1").await.unwrap().len(), 0);
    }
}
