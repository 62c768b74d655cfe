//! Validated types: strongly-typed wrappers that enforce invariants at
//! construction so the rest of the crate never has to re-check them.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Result, XdbiError};

/// A graph (namespace) name, validated to be a non-empty, path-safe
/// component (no `/`, no `..`, no null bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphName {
    inner: String,
}

impl GraphName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_path_component(&name)?;
        Ok(Self { inner: name })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

fn validate_path_component(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(XdbiError::InvalidInput(
            "graph/class name cannot be empty".into(),
        ));
    }
    if name.contains('\0') {
        return Err(XdbiError::InvalidInput(
            "graph/class name cannot contain a null byte".into(),
        ));
    }
    if name == "." || name == ".." {
        return Err(XdbiError::InvalidInput(format!(
            "graph/class name '{name}' is not a valid path component"
        )));
    }
    if name.contains('/') {
        return Err(XdbiError::InvalidInput(format!(
            "graph/class name '{name}' must not contain a path separator"
        )));
    }
    Ok(())
}

/// Delete-policy carried on an edge object, controlling cascade
/// propagation in `remove` and `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeletePolicy {
    DeleteTarget,
    DeleteSource,
    DeleteBoth,
}

impl DeletePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DELETETARGET" => Some(Self::DeleteTarget),
            "DELETESOURCE" => Some(Self::DeleteSource),
            "DELETEBOTH" => Some(Self::DeleteBoth),
            _ => None,
        }
    }
}

/// Deterministic, stable hash of a URI, rendered as a decimal string.
/// This is both the `uuid` field stored in the document and the
/// on-disk filename.
pub fn uri_to_uuid(uri: &str) -> String {
    xxh3_64(uri.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_name_rejects_path_separators() {
        assert!(GraphName::new("ok-graph").is_ok());
        assert!(GraphName::new("bad/graph").is_err());
        assert!(GraphName::new("").is_err());
        assert!(GraphName::new("..").is_err());
    }

    #[test]
    fn uri_to_uuid_is_deterministic() {
        let a = uri_to_uuid("xtype://example/u1");
        let b = uri_to_uuid("xtype://example/u1");
        let c = uri_to_uuid("xtype://example/u2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn delete_policy_parse_roundtrip() {
        assert_eq!(DeletePolicy::parse("DELETETARGET"), Some(DeletePolicy::DeleteTarget));
        assert_eq!(DeletePolicy::parse("DELETESOURCE"), Some(DeletePolicy::DeleteSource));
        assert_eq!(DeletePolicy::parse("DELETEBOTH"), Some(DeletePolicy::DeleteBoth));
        assert_eq!(DeletePolicy::parse("bogus"), None);
    }
}
