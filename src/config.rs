//! Federation + remote endpoint configuration: plain `serde`-deserialized
//! structs, loaded from a JSON file or inline value. Relative addresses
//! are resolved against a caller-supplied base path.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db_interface::{DbInterface, DirectInterface, RemoteInterface};
use crate::engine::StorageEngine;
use crate::error::{Result, XdbiError};
use crate::federation::{FederatedInterface, ImportServer};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Direct {
        path: String,
    },
    Remote {
        url: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainServerConfig {
    #[serde(flatten)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub readonly: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportServerConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub backend: BackendConfig,
    #[serde(default = "default_readonly")]
    pub readonly: bool,
}

fn default_readonly() -> bool {
    true
}

/// The top-level federation configuration (spec §6.4). `import_servers`
/// has no default: a federation config missing that array entirely is
/// `XdbiError::InvalidConfig`, fatal at construction, not an empty list.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    #[serde(default)]
    pub main_server: Option<MainServerConfig>,
    pub import_servers: Vec<ImportServerConfig>,
}

impl FederationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| XdbiError::InvalidConfig(e.to_string()))
    }
}

fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

async fn build_backend(backend: &BackendConfig, base_path: &Path, read_only: bool) -> Result<Arc<dyn DbInterface>> {
    match backend {
        BackendConfig::Direct { path } => {
            let resolved = resolve_path(base_path, path);
            let engine = Arc::new(StorageEngine::new(resolved));
            Ok(Arc::new(DirectInterface::new(engine, read_only)))
        }
        BackendConfig::Remote { url, username, password } => {
            let mut iface = RemoteInterface::new(url.clone(), read_only);
            if let (Some(u), Some(p)) = (username, password) {
                iface = iface.with_credentials(u.clone(), p.clone());
            }
            Ok(Arc::new(iface))
        }
    }
}

/// Build a `FederatedInterface` from configuration, resolving relative
/// `Direct` paths against `base_path` and auto-assigning stable names
/// (`"import-{index}"`) to import servers that don't carry one,
/// matching `DbInterface::getConfig()["name"]` lookups in the original
/// `MultiDbClient`.
pub async fn build_federated_interface(config: &FederationConfig, base_path: &Path) -> Result<FederatedInterface> {
    let main = match &config.main_server {
        Some(main_cfg) => Some(build_backend(&main_cfg.backend, base_path, main_cfg.readonly).await?),
        None => None,
    };

    let mut imports = Vec::with_capacity(config.import_servers.len());
    for (index, import_cfg) in config.import_servers.iter().enumerate() {
        let name = import_cfg.name.clone().unwrap_or_else(|| format!("import-{index}"));
        let interface = build_backend(&import_cfg.backend, base_path, import_cfg.readonly).await?;
        imports.push(ImportServer { name, interface });
    }

    Ok(FederatedInterface::new(main, imports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_import_servers_array_is_invalid_config() {
        let json = r#"{"main_server": {"type": "direct", "path": "."}}"#;
        assert!(FederationConfig::from_json_str(json).is_err());
    }

    #[tokio::test]
    async fn import_servers_get_stable_auto_names() {
        let dir = tempdir().unwrap();
        let json = format!(
            r#"{{"import_servers": [{{"type": "direct", "path": "{}"}}, {{"type": "direct", "path": "{}", "name": "custom"}}]}}"#,
            dir.path().join("a").display(),
            dir.path().join("b").display(),
        );
        let config = FederationConfig::from_json_str(&json).unwrap();
        let federated = build_federated_interface(&config, dir.path()).await.unwrap();
        assert!(federated.set_import_server_working_graph("import-0", "g").await.is_ok());
        assert!(federated.set_import_server_working_graph("custom", "g").await.is_ok());
        assert!(federated.set_import_server_working_graph("missing", "g").await.is_err());
    }
}
