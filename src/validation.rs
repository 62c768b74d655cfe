//! Runtime validation of documents passed across the storage engine
//! boundary.

use serde_json::Value;

use crate::error::{Result, XdbiError};

/// Extract `uri` and `classname` from a model destined for `add`/`update`.
/// Per spec: a model missing either field is invalid input, skipped and
/// logged by the caller, not fatal to the batch.
pub fn require_uri_and_classname(model: &Value) -> Result<(String, String)> {
    let uri = model
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| XdbiError::InvalidInput("model is missing 'uri'".into()))?
        .to_string();
    let classname = model
        .get("classname")
        .and_then(Value::as_str)
        .ok_or_else(|| XdbiError::InvalidInput("model is missing 'classname'".into()))?
        .to_string();
    Ok((uri, classname))
}

/// Validate a loaded document against the uuid/classname it was expected
/// to have. On any mismatch the document must be treated as not-found
/// and discarded, per spec.md §4.3.1.
pub fn validate_loaded_document(
    doc: &Value,
    expected_uuid: &str,
    expected_classname: Option<&str>,
) -> Result<()> {
    let uri = doc
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| XdbiError::MalformedDocument("document has no 'uri'".into()))?;
    let uuid = doc
        .get("uuid")
        .and_then(Value::as_str)
        .ok_or_else(|| XdbiError::MalformedDocument("document has no 'uuid'".into()))?;
    let classname = doc
        .get("classname")
        .and_then(Value::as_str)
        .ok_or_else(|| XdbiError::MalformedDocument("document has no 'classname'".into()))?;

    if uuid != expected_uuid {
        return Err(XdbiError::MalformedDocument(format!(
            "uuid mismatch for uri '{uri}': filename says '{expected_uuid}', document says '{uuid}'"
        )));
    }
    if let Some(expected) = expected_classname {
        if classname != expected {
            return Err(XdbiError::MalformedDocument(format!(
                "classname mismatch for uri '{uri}': expected '{expected}', found '{classname}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_uri_and_classname_happy_path() {
        let model = json!({"uri": "u1", "classname": "T"});
        let (uri, classname) = require_uri_and_classname(&model).unwrap();
        assert_eq!(uri, "u1");
        assert_eq!(classname, "T");
    }

    #[test]
    fn require_uri_and_classname_rejects_missing_fields() {
        assert!(require_uri_and_classname(&json!({"classname": "T"})).is_err());
        assert!(require_uri_and_classname(&json!({"uri": "u1"})).is_err());
    }

    #[test]
    fn validate_loaded_document_detects_uuid_mismatch() {
        let doc = json!({"uri": "u1", "uuid": "123", "classname": "T"});
        assert!(validate_loaded_document(&doc, "123", Some("T")).is_ok());
        assert!(validate_loaded_document(&doc, "999", Some("T")).is_err());
        assert!(validate_loaded_document(&doc, "123", Some("Other")).is_err());
    }
}
