//! Structured change records emitted by the shared models.
//!
//! Sequence edits are Quill-style deltas: an ordered list of `insert`,
//! `delete` and `retain` operations. Map edits are per-key [`MapChange`]s.
//! A field left as `None` in a change record means "unchanged", never
//! "cleared".

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use yrs::types::Delta as TextOp;
use yrs::types::{Change, EntryChange};
use yrs::{Out, ReadTxn};

use crate::cell::YCell;
use crate::convert::out_to_json;

/// One operation of a sequence delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaOp<T> {
    Insert(T),
    Delete(u32),
    Retain(u32),
}

/// An ordered sequence edit.
pub type Delta<T> = Vec<DeltaOp<T>>;

/// Edit of a shared text.
pub type TextDelta = Delta<String>;

/// How a single map key was touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Add,
    Update,
    Delete,
}

/// Change of a single map key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapChange {
    pub key: String,
    pub action: KeyAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

impl MapChange {
    pub fn add(key: impl Into<String>, new_value: Value) -> Self {
        Self {
            key: key.into(),
            action: KeyAction::Add,
            old_value: None,
            new_value: Some(new_value),
        }
    }

    pub fn update(key: impl Into<String>, old_value: Value, new_value: Value) -> Self {
        Self {
            key: key.into(),
            action: KeyAction::Update,
            old_value: Some(old_value),
            new_value: Some(new_value),
        }
    }

    pub fn delete(key: impl Into<String>, old_value: Value) -> Self {
        Self {
            key: key.into(),
            action: KeyAction::Delete,
            old_value: Some(old_value),
            new_value: None,
        }
    }
}

/// Old and new value of a scalar field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChange<T> {
    pub old_value: Option<T>,
    pub new_value: Option<T>,
}

/// Change emitted by a [`YFile`](crate::YFile).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_change: Option<TextDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_change: Option<Vec<MapChange>>,
}

/// Change emitted by a [`YBlob`](crate::YBlob).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_change: Option<ValueChange<Vec<u8>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_change: Option<Vec<MapChange>>,
}

/// Change emitted by a [`YCell`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_change: Option<TextDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_change: Option<Vec<MapChange>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_count_change: Option<ValueChange<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_state_change: Option<ValueChange<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments_change: Option<ValueChange<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs_change: Option<Delta<Vec<Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_output_change: Option<TextDelta>,
}

impl CellChange {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Change emitted by a [`YNotebook`](crate::YNotebook).
///
/// Inserted cells are delivered as live models, so this record is not
/// serializable.
#[derive(Debug, Clone, Default)]
pub struct NotebookChange {
    pub cells_change: Option<Delta<Vec<YCell>>>,
    pub metadata_change: Option<Vec<MapChange>>,
    pub nbformat_changed: Option<ValueChange<u32>>,
    pub nbformat_minor_changed: Option<ValueChange<u32>>,
    pub state_change: Option<Vec<MapChange>>,
}

impl NotebookChange {
    pub fn is_empty(&self) -> bool {
        self.cells_change.is_none()
            && self.metadata_change.is_none()
            && self.nbformat_changed.is_none()
            && self.nbformat_minor_changed.is_none()
            && self.state_change.is_none()
    }
}

/// Translate a yrs text delta.
pub(crate) fn text_delta<T: ReadTxn>(ops: &[TextOp], txn: &T) -> TextDelta {
    ops.iter()
        .map(|op| match op {
            TextOp::Inserted(value, _) => DeltaOp::Insert(match out_to_json(value, txn) {
                Value::String(s) => s,
                other => other.to_string(),
            }),
            TextOp::Deleted(len) => DeltaOp::Delete(*len),
            TextOp::Retain(len, _) => DeltaOp::Retain(*len),
        })
        .collect()
}

/// Translate a yrs array delta, mapping each inserted element with `f`.
pub(crate) fn array_delta<V>(changes: &[Change], mut f: impl FnMut(&Out) -> Option<V>) -> Delta<Vec<V>> {
    changes
        .iter()
        .map(|change| match change {
            Change::Added(values) => DeltaOp::Insert(values.iter().filter_map(&mut f).collect()),
            Change::Removed(len) => DeltaOp::Delete(*len),
            Change::Retain(len) => DeltaOp::Retain(*len),
        })
        .collect()
}

/// Translate one yrs map key change, reading values as JSON.
pub(crate) fn map_change<T: ReadTxn>(key: &str, change: &EntryChange, txn: &T) -> MapChange {
    match change {
        EntryChange::Inserted(new) => MapChange::add(key, out_to_json(new, txn)),
        EntryChange::Updated(old, new) => {
            MapChange::update(key, out_to_json(old, txn), out_to_json(new, txn))
        }
        EntryChange::Removed(old) => MapChange::delete(key, out_to_json(old, txn)),
    }
}

/// Old and new value of one key, as read by `read`.
pub(crate) fn value_change<V>(change: &EntryChange, read: impl Fn(&Out) -> Option<V>) -> ValueChange<V> {
    match change {
        EntryChange::Inserted(new) => ValueChange {
            old_value: None,
            new_value: read(new),
        },
        EntryChange::Updated(old, new) => ValueChange {
            old_value: read(old),
            new_value: read(new),
        },
        EntryChange::Removed(old) => ValueChange {
            old_value: read(old),
            new_value: None,
        },
    }
}

/// Key changes sorted by key, so emission order does not depend on hashing.
pub(crate) fn sorted_keys<'a, V>(
    keys: impl IntoIterator<Item = (&'a Arc<str>, V)>,
) -> Vec<(&'a Arc<str>, V)> {
    let mut keys: Vec<_> = keys.into_iter().collect();
    keys.sort_by(|a, b| a.0.cmp(b.0));
    keys
}
