//! Metadata maps shared by cells and notebooks.
//!
//! Metadata values are plain JSON stored per key in a shared map. Writes are
//! computed as a target map first, then applied as a key diff so observers
//! see exactly the keys that changed.

use serde_json::{Map as JsonMap, Value};
use yrs::{Map, MapPrelim, MapRef, Out, ReadTxn, TransactionMut};

use crate::convert::{json_deep_equal, json_to_any, out_to_json};
use crate::delta::{KeyAction, MapChange};
use crate::keys;

pub(crate) type Metadata = JsonMap<String, Value>;

/// Read the metadata stored under `parent[key]`. Missing means empty.
pub(crate) fn read<T: ReadTxn>(parent: &MapRef, key: &str, txn: &T) -> Metadata {
    match parent.get(txn, key).map(|v| out_to_json(&v, txn)) {
        Some(Value::Object(map)) => map,
        _ => Metadata::new(),
    }
}

/// The shared metadata map under `parent[key]`, created on first write.
///
/// Metadata written as a plain JSON object is upgraded to a shared map with
/// the same entries.
pub(crate) fn ensure_map(txn: &mut TransactionMut, parent: &MapRef, key: &str) -> MapRef {
    if let Some(Out::YMap(map)) = parent.get(txn, key) {
        return map;
    }
    let legacy = read(parent, key, txn);
    let map = parent.insert(txn, key, MapPrelim::default());
    for (k, v) in &legacy {
        map.insert(txn, k.as_str(), json_to_any(v));
    }
    map
}

/// Write `next` over `current`: vanished keys are removed, new or changed keys set.
pub(crate) fn apply_diff(
    txn: &mut TransactionMut,
    map: &MapRef,
    current: &Metadata,
    next: &Metadata,
) {
    for key in current.keys() {
        if !next.contains_key(key) {
            map.remove(txn, key);
        }
    }
    for (key, value) in next {
        let unchanged = current
            .get(key)
            .is_some_and(|old| json_deep_equal(old, value));
        if !unchanged {
            map.insert(txn, key.as_str(), json_to_any(value));
        }
    }
}

/// An `update` whose old and new values are deep-equal.
pub(crate) fn is_noop_update(change: &MapChange) -> bool {
    change.action == KeyAction::Update
        && match (&change.old_value, &change.new_value) {
            (Some(old), Some(new)) => json_deep_equal(old, new),
            _ => false,
        }
}

fn outputs_hidden(metadata: &Metadata) -> Option<&Value> {
    metadata
        .get(keys::JUPYTER)
        .and_then(|jupyter| jupyter.get(keys::OUTPUTS_HIDDEN))
}

fn jupyter_object(metadata: &Metadata) -> JsonMap<String, Value> {
    match metadata.get(keys::JUPYTER) {
        Some(Value::Object(jupyter)) => jupyter.clone(),
        _ => JsonMap::new(),
    }
}

/// Keep `collapsed` and `jupyter.outputs_hidden` in sync after `key` was set.
pub(crate) fn couple_on_set(metadata: &mut Metadata, key: &str) {
    match key {
        keys::COLLAPSED => {
            let Some(collapsed) = metadata.get(keys::COLLAPSED).cloned() else {
                return;
            };
            if outputs_hidden(metadata) != Some(&collapsed) {
                let mut jupyter = jupyter_object(metadata);
                jupyter.insert(keys::OUTPUTS_HIDDEN.into(), collapsed);
                metadata.insert(keys::JUPYTER.into(), Value::Object(jupyter));
            }
        }
        keys::JUPYTER => match outputs_hidden(metadata).cloned() {
            Some(hidden) => {
                if metadata.get(keys::COLLAPSED) != Some(&hidden) {
                    metadata.insert(keys::COLLAPSED.into(), hidden);
                }
            }
            None => {
                metadata.remove(keys::COLLAPSED);
            }
        },
        _ => {}
    }
}

/// Keep `collapsed` and `jupyter.outputs_hidden` in sync after `key` was removed.
pub(crate) fn couple_on_delete(metadata: &mut Metadata, key: &str) {
    match key {
        keys::COLLAPSED => {
            let hidden = outputs_hidden(metadata).is_some_and(|v| v.as_bool() == Some(true));
            if hidden {
                let mut jupyter = jupyter_object(metadata);
                jupyter.remove(keys::OUTPUTS_HIDDEN);
                if jupyter.is_empty() {
                    metadata.remove(keys::JUPYTER);
                } else {
                    metadata.insert(keys::JUPYTER.into(), Value::Object(jupyter));
                }
            }
        }
        keys::JUPYTER => {
            metadata.remove(keys::COLLAPSED);
        }
        _ => {}
    }
}

/// Derive the coupled pair of a whole metadata map. A non-null `collapsed` wins.
pub(crate) fn normalize(metadata: &mut Metadata) {
    match metadata.get(keys::COLLAPSED).filter(|v| !v.is_null()).cloned() {
        Some(collapsed) => {
            let mut jupyter = jupyter_object(metadata);
            jupyter.insert(keys::OUTPUTS_HIDDEN.into(), collapsed);
            metadata.insert(keys::JUPYTER.into(), Value::Object(jupyter));
        }
        None => {
            if let Some(hidden) = outputs_hidden(metadata).filter(|v| !v.is_null()).cloned() {
                metadata.insert(keys::COLLAPSED.into(), hidden);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yrs::{Doc, Transact, WriteTxn};

    fn object(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_collapsed_sets_outputs_hidden() {
        let mut metadata = object(json!({"collapsed": true, "jupyter": {"source_hidden": true}}));
        couple_on_set(&mut metadata, "collapsed");
        assert_eq!(
            Value::Object(metadata),
            json!({"collapsed": true, "jupyter": {"source_hidden": true, "outputs_hidden": true}})
        );
    }

    #[test]
    fn test_jupyter_sets_or_clears_collapsed() {
        let mut metadata = object(json!({"jupyter": {"outputs_hidden": true}}));
        couple_on_set(&mut metadata, "jupyter");
        assert_eq!(metadata.get("collapsed"), Some(&json!(true)));

        let mut metadata = object(json!({"collapsed": true, "jupyter": {}}));
        couple_on_set(&mut metadata, "jupyter");
        assert!(!metadata.contains_key("collapsed"));
    }

    #[test]
    fn test_delete_collapsed_prunes_jupyter() {
        let mut metadata = object(json!({"jupyter": {"outputs_hidden": true}}));
        couple_on_delete(&mut metadata, "collapsed");
        assert!(metadata.is_empty());

        let mut metadata = object(json!({"jupyter": {"outputs_hidden": true, "source_hidden": false}}));
        couple_on_delete(&mut metadata, "collapsed");
        assert_eq!(metadata.get("jupyter"), Some(&json!({"source_hidden": false})));

        let mut metadata = object(json!({"collapsed": false, "tags": []}));
        couple_on_delete(&mut metadata, "jupyter");
        assert_eq!(Value::Object(metadata), json!({"tags": []}));
    }

    #[test]
    fn test_normalize_prefers_collapsed() {
        let mut metadata = object(json!({"collapsed": false, "jupyter": {"outputs_hidden": true}}));
        normalize(&mut metadata);
        assert_eq!(metadata.get("jupyter"), Some(&json!({"outputs_hidden": false})));

        let mut metadata = object(json!({"jupyter": {"outputs_hidden": true}}));
        normalize(&mut metadata);
        assert_eq!(metadata.get("collapsed"), Some(&json!(true)));

        let mut metadata = object(json!({"tags": ["a"]}));
        normalize(&mut metadata);
        assert_eq!(Value::Object(metadata), json!({"tags": ["a"]}));
    }

    #[test]
    fn test_noop_update() {
        assert!(is_noop_update(&MapChange::update("a", json!(1), json!(1.0))));
        assert!(!is_noop_update(&MapChange::update("a", json!(1), json!(2))));
        assert!(!is_noop_update(&MapChange::add("a", json!(1))));
    }

    #[test]
    fn test_apply_diff_and_legacy_upgrade() {
        let doc = Doc::new();
        let mut txn = doc.transact_mut();
        let parent = txn.get_or_insert_map("cell");
        parent.insert(&mut txn, "metadata", json_to_any(&json!({"a": 1, "b": 2})));

        let current = read(&parent, "metadata", &txn);
        let map = ensure_map(&mut txn, &parent, "metadata");
        assert!(matches!(parent.get(&txn, "metadata"), Some(Out::YMap(_))));

        let next = object(json!({"b": 2, "c": 3}));
        apply_diff(&mut txn, &map, &current, &next);
        assert_eq!(Value::Object(read(&parent, "metadata", &txn)), json!({"b": 2, "c": 3}));
    }
}
