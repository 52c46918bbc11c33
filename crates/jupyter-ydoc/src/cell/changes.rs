//! Translation of raw cell events into a [`CellChange`].
//!
//! Runs inside the observer callback, while the committing transaction is
//! still available for reading the new values.

use std::sync::atomic::{AtomicU32, Ordering};

use yrs::types::{Event, Events, PathSegment};
use yrs::{GetString, Map, MapRef, OffsetKind, Out, ReadTxn, Text, TransactionMut};

use crate::content::CellType;
use crate::convert::{out_to_i64, out_to_json, out_to_string};
use crate::delta::{
    array_delta, map_change, sorted_keys, text_delta, value_change, CellChange, DeltaOp, MapChange,
};
use crate::keys;

/// Length of `s` in the document's index unit.
pub(crate) fn str_len(s: &str, kind: OffsetKind) -> u32 {
    let len = match kind {
        OffsetKind::Utf16 => s.encode_utf16().count(),
        _ => s.len(),
    };
    len as u32
}

/// Current source length, whether stored as shared text or as a legacy string.
pub(crate) fn source_len<T: ReadTxn>(ymodel: &MapRef, txn: &T, kind: OffsetKind) -> u32 {
    match ymodel.get(txn, keys::SOURCE) {
        Some(Out::YText(text)) => text.len(txn),
        Some(Out::Any(yrs::Any::String(s))) => str_len(&s, kind),
        _ => 0,
    }
}

fn is_key(segment: Option<&PathSegment>, key: &str) -> bool {
    matches!(segment, Some(PathSegment::Key(k)) if k.as_ref() == key)
}

/// Everything the observer needs besides the events themselves.
pub(crate) struct ChangeContext<'a> {
    pub ymodel: &'a MapRef,
    pub cell_type: &'a CellType,
    pub prev_source_len: &'a AtomicU32,
    pub offset_kind: OffsetKind,
}

impl ChangeContext<'_> {
    pub fn translate(&self, txn: &TransactionMut, events: &Events) -> CellChange {
        let mut change = CellChange::default();
        let mut model_event = None;

        for event in events.iter() {
            let path = event.path();
            match event {
                Event::Map(e) if path.is_empty() => model_event = Some(e),
                Event::Text(e) if path.len() == 1 && is_key(path.front(), keys::SOURCE) => {
                    change.source_change = Some(text_delta(e.delta(txn), txn));
                }
                Event::Map(e) if path.len() == 1 && is_key(path.front(), keys::METADATA) => {
                    let keys: Vec<MapChange> = sorted_keys(e.keys(txn))
                        .into_iter()
                        .map(|(key, entry)| map_change(key, entry, txn))
                        .collect();
                    change.metadata_change = Some(keys);
                }
                Event::Array(e)
                    if *self.cell_type == CellType::Code
                        && path.len() == 1
                        && is_key(path.front(), keys::OUTPUTS) =>
                {
                    change.outputs_change =
                        Some(array_delta(e.delta(txn), |v| Some(out_to_json(v, txn))));
                }
                Event::Text(e)
                    if *self.cell_type == CellType::Code
                        && path.len() == 3
                        && is_key(path.front(), keys::OUTPUTS)
                        && is_key(path.get(2), keys::TEXT)
                        && change.stream_output_change.is_none() =>
                {
                    change.stream_output_change = Some(text_delta(e.delta(txn), txn));
                }
                _ => {}
            }
        }

        if let Some(event) = model_event {
            let keys_changed = event.keys(txn);

            // The source text itself was swapped: report it as a full replacement.
            if keys_changed.contains_key(keys::SOURCE) {
                let text = match self.ymodel.get(txn, keys::SOURCE) {
                    Some(value) => out_to_string(&value, txn).unwrap_or_default(),
                    None => String::new(),
                };
                let mut delta = Vec::new();
                let prev = self.prev_source_len.load(Ordering::SeqCst);
                if prev > 0 {
                    delta.push(DeltaOp::Delete(prev));
                }
                if !text.is_empty() {
                    delta.push(DeltaOp::Insert(text));
                }
                change.source_change = Some(delta);
            }

            // A metadata map set wholesale reports every key as added.
            if keys_changed.contains_key(keys::METADATA) {
                if let Some(Out::YMap(metadata)) = self.ymodel.get(txn, keys::METADATA) {
                    let mut added: Vec<MapChange> = metadata
                        .iter(txn)
                        .map(|(key, value)| MapChange::add(key, out_to_json(&value, txn)))
                        .collect();
                    added.sort_by(|a, b| a.key.cmp(&b.key));
                    change.metadata_change = Some(added);
                }
            }

            if *self.cell_type == CellType::Code {
                if let Some(entry) = keys_changed.get(keys::EXECUTION_COUNT) {
                    change.execution_count_change = Some(value_change(entry, out_to_i64));
                }
                if let Some(entry) = keys_changed.get(keys::EXECUTION_STATE) {
                    change.execution_state_change =
                        Some(value_change(entry, |v| out_to_string(v, txn)));
                }
            }

            if self.cell_type.has_attachments() {
                if let Some(entry) = keys_changed.get(keys::ATTACHMENTS) {
                    change.attachments_change =
                        Some(value_change(entry, |v| Some(out_to_json(v, txn))));
                }
            }
        }

        self.prev_source_len.store(
            source_len(self.ymodel, txn, self.offset_kind),
            Ordering::SeqCst,
        );
        change
    }
}

impl CellChange {
    /// Fold a later batch of the same transaction into this record.
    pub(crate) fn merge(&mut self, other: CellChange) {
        if let Some(keys) = other.metadata_change {
            self.metadata_change.get_or_insert_with(Vec::new).extend(keys);
        }
        self.source_change = other.source_change.or(self.source_change.take());
        self.execution_count_change = other
            .execution_count_change
            .or(self.execution_count_change.take());
        self.execution_state_change = other
            .execution_state_change
            .or(self.execution_state_change.take());
        self.attachments_change = other.attachments_change.or(self.attachments_change.take());
        self.outputs_change = other.outputs_change.or(self.outputs_change.take());
        self.stream_output_change = other
            .stream_output_change
            .or(self.stream_output_change.take());
    }
}

/// Plain-string form of a stored source, used by readers.
pub(crate) fn read_source<T: ReadTxn>(ymodel: &MapRef, txn: &T) -> String {
    match ymodel.get(txn, keys::SOURCE) {
        Some(Out::YText(text)) => text.get_string(txn),
        Some(value) => out_to_string(&value, txn).unwrap_or_default(),
        None => String::new(),
    }
}
