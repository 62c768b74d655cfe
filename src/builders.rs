//! Fluent builder for constructing well-formed entity documents.

use serde_json::{Map, Value};

use crate::types::uri_to_uuid;

/// Builds an entity in the modern (nested `properties`/`relations`)
/// shape. Flat-shape documents are not constructed via this builder;
/// they only ever arise by loading pre-existing legacy data.
pub struct EntityBuilder {
    uri: Option<String>,
    classname: Option<String>,
    properties: Map<String, Value>,
    relations: Map<String, Vec<Value>>,
}

impl Default for EntityBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityBuilder {
    pub fn new() -> Self {
        Self {
            uri: None,
            classname: None,
            properties: Map::new(),
            relations: Map::new(),
        }
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn classname(mut self, classname: impl Into<String>) -> Self {
        self.classname = Some(classname.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn edge(
        mut self,
        relation_name: impl Into<String>,
        target: impl Into<String>,
        edge_properties: Value,
        delete_policy: Option<&str>,
        relation_dir_forward: bool,
    ) -> Self {
        let mut edge = Map::new();
        edge.insert("target".to_string(), Value::String(target.into()));
        edge.insert("edge_properties".to_string(), edge_properties);
        edge.insert("relation_dir_forward".to_string(), Value::Bool(relation_dir_forward));
        if let Some(policy) = delete_policy {
            edge.insert("delete_policy".to_string(), Value::String(policy.to_string()));
        }
        self.relations
            .entry(relation_name.into())
            .or_default()
            .push(Value::Object(edge));
        self
    }

    /// Build the document. Panics if `uri` or `classname` was never
    /// set — both are required identity fields (spec §3).
    pub fn build(self) -> Value {
        let uri = self.uri.expect("EntityBuilder requires uri()");
        let classname = self.classname.expect("EntityBuilder requires classname()");
        let uuid = uri_to_uuid(&uri);

        let relations: Map<String, Value> = self
            .relations
            .into_iter()
            .map(|(name, edges)| (name, Value::Array(edges)))
            .collect();

        serde_json::json!({
            "uri": uri,
            "uuid": uuid,
            "classname": classname,
            "properties": Value::Object(self.properties),
            "relations": Value::Object(relations),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_entity_with_properties_and_edges() {
        let doc = EntityBuilder::new()
            .uri("u1")
            .classname("T")
            .property("a", 1)
            .edge("r", "u2", serde_json::json!({}), Some("DELETETARGET"), true)
            .build();

        assert_eq!(doc["uri"], serde_json::json!("u1"));
        assert_eq!(doc["properties"]["a"], serde_json::json!(1));
        assert_eq!(doc["relations"]["r"][0]["target"], serde_json::json!("u2"));
        assert_eq!(doc["uuid"], serde_json::json!(uri_to_uuid("u1")));
    }

    #[test]
    #[should_panic(expected = "requires uri")]
    fn build_panics_without_uri() {
        let _ = EntityBuilder::new().classname("T").build();
    }
}
