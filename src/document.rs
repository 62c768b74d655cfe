//! Entity/edge document shape handling: the flat/nested ambiguity of
//! spec §3 and §9 is real, so every read must branch independently on
//! `properties`/`relations` presence, and every write must preserve
//! the shape it found.

use serde_json::{Map, Value};

use crate::types::DeletePolicy;

pub fn has_properties_key(doc: &Value) -> bool {
    doc.get("properties").is_some()
}

pub fn has_relations_key(doc: &Value) -> bool {
    doc.get("relations").is_some()
}

/// The object a property-match (`find`) or property-merge (`add`)
/// should read: the `properties` sub-object if present, else the
/// whole document (including `uri`/`uuid`/`classname`), matching
/// `model.contains("properties") ? model["properties"] : model`.
pub fn properties_view(doc: &Value) -> &Value {
    if has_properties_key(doc) {
        &doc["properties"]
    } else {
        doc
    }
}

/// Mutable counterpart of `properties_view`, for `add`/`update`.
pub fn properties_view_mut(doc: &mut Value) -> &mut Value {
    if has_properties_key(doc) {
        doc.get_mut("properties").expect("checked above")
    } else {
        doc
    }
}

/// The object a relation lookup should read: `relations` if present,
/// else the whole document (flat documents keep relation lists at the
/// top level, alongside scalar properties).
pub fn relations_view(doc: &Value) -> &Value {
    if has_relations_key(doc) {
        &doc["relations"]
    } else {
        doc
    }
}

pub fn relations_view_mut(doc: &mut Value) -> &mut Value {
    if has_relations_key(doc) {
        doc.get_mut("relations").expect("checked above")
    } else {
        doc
    }
}

/// An edge appearing inside a relation list. Recognized structurally:
/// an object qualifies as an edge only if it carries both `target` and
/// `edge_properties`; anything else in a relation list is opaque
/// metadata, not an edge.
#[derive(Debug, Clone)]
pub struct Edge {
    value: Value,
}

impl Edge {
    pub fn from_value(value: &Value) -> Option<Edge> {
        let obj = value.as_object()?;
        if obj.contains_key("target") && obj.contains_key("edge_properties") {
            Some(Edge {
                value: value.clone(),
            })
        } else {
            None
        }
    }

    pub fn target(&self) -> &str {
        self.value
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn delete_policy(&self) -> Option<DeletePolicy> {
        self.value
            .get("delete_policy")
            .and_then(Value::as_str)
            .and_then(DeletePolicy::parse)
    }

    pub fn relation_dir_forward(&self) -> Option<bool> {
        self.value.get("relation_dir_forward").and_then(Value::as_bool)
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// Clone of the underlying edge object with `source` injected;
    /// `source` is never stored on disk, only synthesized by edge
    /// queries.
    pub fn with_source(&self, source: &str) -> Value {
        let mut v = self.value.clone();
        if let Value::Object(map) = &mut v {
            map.insert("source".to_string(), Value::String(source.to_string()));
        }
        v
    }
}

/// Iterate every relation list in a document's relation container,
/// yielding `(relation_name, edge)` pairs for entries that qualify as
/// edges.
pub fn iter_edges(doc: &Value) -> Vec<(String, Edge)> {
    let container = relations_view(doc);
    let mut out = Vec::new();
    if let Some(obj) = container.as_object() {
        for (name, list) in obj {
            if let Some(arr) = list.as_array() {
                for item in arr {
                    if let Some(edge) = Edge::from_value(item) {
                        out.push((name.clone(), edge));
                    }
                }
            }
        }
    }
    out
}

/// Drop every edge whose `target` is in `targets` from every relation
/// list in a document's relation container. Returns whether anything
/// changed.
pub fn strip_edges_with_targets(doc: &mut Value, targets: &std::collections::HashSet<String>) -> bool {
    let container = relations_view_mut(doc);
    let mut changed = false;
    if let Some(obj) = container.as_object_mut() {
        for list in obj.values_mut() {
            if let Some(arr) = list.as_array_mut() {
                let before = arr.len();
                arr.retain(|item| match Edge::from_value(item) {
                    Some(edge) => !targets.contains(edge.target()),
                    None => true,
                });
                changed |= arr.len() != before;
            }
        }
    }
    changed
}

fn is_reserved_key(key: &str) -> bool {
    matches!(key, "uri" | "uuid" | "classname" | "properties" | "relations")
}

/// Heuristic recognizing an array as a relation list: an array of
/// edge-shaped objects, or an empty array (ambiguous on its own, but
/// only consulted when the container is already known to be a
/// relation container by `has_relations_key`).
fn looks_like_relation_list(value: &Value) -> bool {
    match value.as_array() {
        Some(arr) => arr.is_empty() || arr.iter().any(|item| Edge::from_value(item).is_some()),
        None => false,
    }
}

/// `update`'s replace-with-cascade overlay (spec §4.3.4 step 2-3):
/// input properties replace existing properties wholesale (input wins,
/// extra existing keys dropped); input relations overlay existing
/// relations at the relation-name level (names absent from input are
/// left untouched). `uri`/`uuid`/`classname` are preserved
/// unconditionally regardless of document shape.
///
/// When properties and relations share a single flat container, the
/// property-drop rule only applies to scalar/non-relation-shaped keys
/// so it cannot clobber relation lists that the relation-overlay rule
/// is responsible for; this keeps the two per-key-independent rules
/// (see spec §9 "Dynamic document shape") from conflicting when they
/// share a container.
pub fn compute_update_overlay(existing: Option<&Value>, model: &Value) -> Value {
    let has_props_shape = existing.map(has_properties_key).unwrap_or_else(|| has_properties_key(model));
    let has_rels_shape = existing.map(has_relations_key).unwrap_or_else(|| has_relations_key(model));

    let input_props = properties_view(model).as_object().cloned().unwrap_or_default();
    let input_rels = relations_view(model).as_object().cloned().unwrap_or_default();

    let mut final_props = Map::new();
    for (k, v) in &input_props {
        if is_reserved_key(k) {
            continue;
        }
        if !has_rels_shape && looks_like_relation_list(v) {
            continue;
        }
        final_props.insert(k.clone(), v.clone());
    }

    let empty = Value::Object(Map::new());
    let existing_doc = existing.unwrap_or(&empty);
    let existing_rels = relations_view(existing_doc).as_object().cloned().unwrap_or_default();

    let mut final_rels = Map::new();
    for (k, v) in &existing_rels {
        if is_reserved_key(k) {
            continue;
        }
        if !has_props_shape && !looks_like_relation_list(v) {
            continue;
        }
        final_rels.insert(k.clone(), v.clone());
    }
    for (k, v) in &input_rels {
        if is_reserved_key(k) {
            continue;
        }
        if looks_like_relation_list(v) {
            final_rels.insert(k.clone(), v.clone());
        }
    }

    let mut out = Map::new();
    for key in ["uri", "uuid", "classname"] {
        if let Some(v) = existing_doc.get(key).or_else(|| model.get(key)) {
            out.insert(key.to_string(), v.clone());
        }
    }

    if has_props_shape {
        out.insert("properties".to_string(), Value::Object(final_props));
    } else {
        out.extend(final_props);
    }

    if has_rels_shape {
        out.insert("relations".to_string(), Value::Object(final_rels));
    } else {
        out.extend(final_rels);
    }

    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn properties_view_prefers_nested_key() {
        let nested = json!({"uri": "u1", "properties": {"a": 1}});
        assert_eq!(properties_view(&nested), &json!({"a": 1}));

        let flat = json!({"uri": "u1", "a": 1});
        assert_eq!(properties_view(&flat), &flat);
    }

    #[test]
    fn edge_requires_target_and_edge_properties() {
        assert!(Edge::from_value(&json!({"target": "u2", "edge_properties": {}})).is_some());
        assert!(Edge::from_value(&json!({"target": "u2"})).is_none());
        assert!(Edge::from_value(&json!({"edge_properties": {}})).is_none());
        assert!(Edge::from_value(&json!("not-an-object")).is_none());
    }

    #[test]
    fn with_source_injects_without_mutating_original() {
        let edge = Edge::from_value(&json!({"target": "u2", "edge_properties": {}})).unwrap();
        let injected = edge.with_source("u1");
        assert_eq!(injected["source"], json!("u1"));
        assert!(edge.as_value().get("source").is_none());
    }

    #[test]
    fn compute_update_overlay_replaces_properties_and_preserves_identity() {
        let existing = json!({
            "uri": "u1", "uuid": "123", "classname": "T",
            "properties": {"a": 1},
            "relations": {},
        });
        let model = json!({"uri": "u1", "classname": "T", "properties": {"b": 5}, "relations": {}});
        let merged = compute_update_overlay(Some(&existing), &model);
        assert_eq!(merged["properties"], json!({"b": 5}));
        assert_eq!(merged["uri"], json!("u1"));
        assert_eq!(merged["uuid"], json!("123"));
    }

    #[test]
    fn compute_update_overlay_leaves_untouched_relation_names_alone() {
        let existing = json!({
            "uri": "u1", "classname": "T",
            "relations": {
                "r1": [{"target": "u2", "edge_properties": {}}],
                "r2": [{"target": "u3", "edge_properties": {}}],
            },
        });
        let model = json!({"uri": "u1", "classname": "T", "relations": {"r1": []}});
        let merged = compute_update_overlay(Some(&existing), &model);
        assert_eq!(merged["relations"]["r1"], json!([]));
        assert_eq!(merged["relations"]["r2"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn strip_edges_with_targets_removes_matching_entries_only() {
        let mut doc = json!({
            "relations": {
                "r": [
                    {"target": "u2", "edge_properties": {}},
                    {"target": "u3", "edge_properties": {}},
                    {"not_an_edge": true},
                ]
            }
        });
        let mut targets = std::collections::HashSet::new();
        targets.insert("u2".to_string());
        let changed = strip_edges_with_targets(&mut doc, &targets);
        assert!(changed);
        let remaining = doc["relations"]["r"].as_array().unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
