//! Three-way JSON merge: reconciles `ours` and `theirs` against a
//! common `original`, producing either a merged document or one
//! embedding conflict markers.

use serde_json::{Map, Value};

/// Result of a three-way merge: whether any conflict was encountered,
/// and the merged (possibly conflict-bearing) document.
pub fn three_way_merge(original: &Value, ours: &Value, theirs: &Value) -> (bool, Value) {
    match (ours, theirs) {
        (Value::Object(a), Value::Object(b)) => {
            let o = original.as_object();
            merge_objects(o, a, b)
        }
        _ => scalar_merge(original, ours, theirs),
    }
}

fn merge_objects(original: Option<&Map<String, Value>>, ours: &Map<String, Value>, theirs: &Map<String, Value>) -> (bool, Value) {
    let empty = Map::new();
    let original = original.unwrap_or(&empty);

    let mut keys: Vec<&String> = ours.keys().chain(theirs.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut merged = Map::new();
    let mut any_conflict = false;

    for key in keys {
        let o = original.get(key).cloned().unwrap_or(Value::Null);
        let a = ours.get(key).cloned().unwrap_or(Value::Null);
        let b = theirs.get(key).cloned().unwrap_or(Value::Null);

        let (conflict, value) = three_way_merge(&o, &a, &b);
        any_conflict |= conflict;
        merged.insert(key.clone(), value);
    }

    (any_conflict, Value::Object(merged))
}

fn scalar_merge(o: &Value, a: &Value, b: &Value) -> (bool, Value) {
    if a == b {
        return (false, a.clone());
    }
    if b == o {
        return (false, a.clone());
    }
    if a == o {
        return (false, b.clone());
    }
    if let (Value::Object(_), Value::Object(_)) = (a, b) {
        return three_way_merge(o, a, b);
    }

    let conflict = serde_json::json!({
        "conflict": "FIXME",
        "original": o,
        "ours": a,
        "theirs": b,
    });
    (true, conflict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn identical_changes_adopt_without_conflict() {
        let o = json!({"k": 1});
        let a = json!({"k": 2});
        let (conflict, merged) = three_way_merge(&o, &a, &a);
        assert!(!conflict);
        assert_eq!(merged, a);
    }

    #[test]
    fn unchanged_theirs_adopts_ours() {
        let o = json!({"k": 1});
        let a = json!({"k": 2});
        let b = json!({"k": 1});
        let (conflict, merged) = three_way_merge(&o, &a, &b);
        assert!(!conflict);
        assert_eq!(merged, a);
    }

    #[test]
    fn unchanged_ours_adopts_theirs() {
        let o = json!({"k": 1});
        let a = json!({"k": 1});
        let b = json!({"k": 2});
        let (conflict, merged) = three_way_merge(&o, &a, &b);
        assert!(!conflict);
        assert_eq!(merged, b);
    }

    #[test]
    fn diverging_scalars_produce_fixme_conflict_node() {
        let o = json!({"k": 1});
        let a = json!({"k": 2});
        let b = json!({"k": 3});
        let (conflict, merged) = three_way_merge(&o, &a, &b);
        assert!(conflict);
        assert_eq!(
            merged["k"],
            json!({"conflict": "FIXME", "original": 1, "ours": 2, "theirs": 3})
        );
    }

    #[test]
    fn nested_objects_recurse_and_isolate_conflicts() {
        let o = json!({"nested": {"a": 1, "b": 1}});
        let a = json!({"nested": {"a": 2, "b": 1}});
        let b = json!({"nested": {"a": 3, "b": 1}});
        let (conflict, merged) = three_way_merge(&o, &a, &b);
        assert!(conflict);
        assert_eq!(merged["nested"]["b"], json!(1));
        assert!(merged["nested"]["a"]["conflict"] == json!("FIXME"));
    }

    #[test]
    fn disjoint_keys_are_unioned() {
        let o = json!({});
        let a = json!({"only_ours": 1});
        let b = json!({"only_theirs": 2});
        let (conflict, merged) = three_way_merge(&o, &a, &b);
        assert!(!conflict);
        assert_eq!(merged["only_ours"], json!(1));
        assert_eq!(merged["only_theirs"], json!(2));
    }
}
