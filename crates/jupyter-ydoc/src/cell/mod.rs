//! Cell models: one shared map per cell.
//!
//! A cell is either attached to a [`YNotebook`](crate::YNotebook), sharing
//! its document, undo scope and awareness, or standalone with a private
//! document of its own. The choice is made at construction and never
//! changes.
//!
//! Variant-specific operations live in `code` (outputs and execution fields)
//! and `attachments` (markdown and raw cells); calling them on the wrong
//! variant returns [`YDocError::UnsupportedOperation`].

mod attachments;
mod changes;
mod code;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;
use yrs::{
    Any, ArrayPrelim, DeepObservable, Map, MapPrelim, MapRef, Out, ReadTxn, Subscription,
    TextPrelim, TextRef, Transact, Transaction, TransactionMut, WriteTxn,
};

use crate::awareness::ClientAwareness;
use crate::config::{DocOptions, TransactOptions};
use crate::content::{CellContent, CellType};
use crate::convert::{json_deep_equal, json_to_any, out_to_i64, out_to_json, out_to_string};
use crate::delta::{CellChange, MapChange};
use crate::document::{group_by_txn, is_silent, origin_for, DocContext, EventQueue, Flush};
use crate::error::{Result, YDocError};
use crate::file::{replace_text, splice_text};
use crate::keys;
use crate::metadata::{self, Metadata};
use crate::signal::Signal;
use crate::undo::UndoScope;

use changes::{read_source, source_len, str_len, ChangeContext};
use code::insert_output;

/// Which undo scope a new cell model joins.
pub(crate) enum UndoMode {
    Shared(Rc<UndoScope>),
    Own,
}

/// Write a cell into an empty shared map.
///
/// Returns the cell id, generated when `content` carries none. Metadata is
/// stored with `collapsed` and `jupyter.outputs_hidden` already in sync.
pub(crate) fn populate(txn: &mut TransactionMut, ymodel: &MapRef, content: &CellContent) -> String {
    let id = content
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    ymodel.insert(txn, keys::ID, id.as_str());
    ymodel.insert(txn, keys::CELL_TYPE, content.cell_type.as_str());
    ymodel.insert(txn, keys::SOURCE, TextPrelim::new(content.source.as_str()));

    let mut cell_metadata = content.metadata.clone();
    metadata::normalize(&mut cell_metadata);
    let ymetadata = ymodel.insert(txn, keys::METADATA, MapPrelim::default());
    for (key, value) in &cell_metadata {
        ymetadata.insert(txn, key.as_str(), json_to_any(value));
    }

    match &content.cell_type {
        CellType::Code => {
            ymodel.insert(txn, keys::EXECUTION_COUNT, execution_count_any(content.execution_count));
            ymodel.insert(txn, keys::EXECUTION_STATE, code::IDLE);
            let youtputs = ymodel.insert(txn, keys::OUTPUTS, ArrayPrelim::default());
            for (index, output) in content.outputs.iter().enumerate() {
                insert_output(txn, &youtputs, index as u32, output);
            }
        }
        CellType::Markdown | CellType::Raw => {
            if let Some(attachments) = content.attachments.as_ref().filter(|a| !a.is_empty()) {
                ymodel.insert(
                    txn,
                    keys::ATTACHMENTS,
                    json_to_any(&Value::Object(attachments.clone())),
                );
            }
        }
        CellType::Unrecognized(_) => {}
    }
    id
}

pub(crate) fn execution_count_any(count: Option<i64>) -> Any {
    match count {
        Some(count) => Any::Number(count as f64),
        None => Any::Null,
    }
}

fn read_cell_type<T: ReadTxn>(ymodel: &MapRef, txn: &T) -> CellType {
    match ymodel
        .get(txn, keys::CELL_TYPE)
        .and_then(|v| out_to_string(&v, txn))
    {
        Some(cell_type) => CellType::from_stored(&cell_type),
        None => CellType::Unrecognized(String::new()),
    }
}

/// Read a stored cell back into its plain form.
pub(crate) fn read_content<T: ReadTxn>(ymodel: &MapRef, txn: &T) -> CellContent {
    let cell_type = read_cell_type(ymodel, txn);
    let id = ymodel.get(txn, keys::ID).and_then(|v| out_to_string(&v, txn));

    let attachments = if cell_type.has_attachments() {
        match ymodel.get(txn, keys::ATTACHMENTS).map(|v| out_to_json(&v, txn)) {
            Some(Value::Object(attachments)) if !attachments.is_empty() => Some(attachments),
            _ => None,
        }
    } else {
        None
    };
    let (outputs, execution_count) = if cell_type == CellType::Code {
        (
            code::read_outputs(ymodel, txn),
            ymodel.get(txn, keys::EXECUTION_COUNT).and_then(|v| out_to_i64(&v)),
        )
    } else {
        (Vec::new(), None)
    };

    CellContent {
        id,
        source: read_source(ymodel, txn),
        metadata: metadata::read(ymodel, keys::METADATA, txn),
        cell_type,
        attachments,
        outputs,
        execution_count,
    }
}

struct CellInner {
    ctx: Rc<DocContext>,
    ymodel: MapRef,
    id: String,
    cell_type: CellType,
    undo: Rc<UndoScope>,
    owns_undo: bool,
    standalone: bool,
    queue: EventQueue<CellChange>,
    changed: Signal<CellChange>,
    metadata_changed: Signal<MapChange>,
    disposed: Signal<()>,
    is_disposed: Cell<bool>,
    subscription: RefCell<Option<Subscription>>,
}

impl Flush for CellInner {
    fn flush(&self) -> bool {
        let pending = self.queue.drain();
        if pending.is_empty() {
            return false;
        }
        if self.is_disposed.get() {
            return true;
        }
        for (silent, batches) in group_by_txn(pending) {
            if silent {
                continue;
            }
            let mut change = CellChange::default();
            for batch in batches {
                change.merge(batch);
            }
            if let Some(keys) = &change.metadata_change {
                for key in keys.iter().filter(|k| !metadata::is_noop_update(k)) {
                    self.metadata_changed.emit(key);
                }
            }
            if !change.is_empty() {
                self.changed.emit(&change);
            }
        }
        true
    }
}

/// A live cell.
///
/// Cloning is cheap and yields another handle to the same model; equality is
/// model identity.
///
/// # Example
///
/// ```rust
/// use jupyter_ydoc::{CellContent, YCell};
/// use serde_json::json;
///
/// let cell = YCell::standalone(CellContent::code("print(1)")).unwrap();
/// cell.set_metadata("collapsed", json!(true)).unwrap();
/// assert_eq!(cell.get_metadata("jupyter"), Some(json!({"outputs_hidden": true})));
/// ```
#[derive(Clone)]
pub struct YCell {
    inner: Rc<CellInner>,
}

impl YCell {
    /// Create a standalone cell with its own document.
    pub fn standalone(content: CellContent) -> Result<Self> {
        Self::standalone_with_options(content, DocOptions::default())
    }

    /// Standalone cell with its own document built from `options`.
    pub fn standalone_with_options(content: CellContent, options: DocOptions) -> Result<Self> {
        if let CellType::Unrecognized(cell_type) = &content.cell_type {
            return Err(YDocError::InvalidCellType(cell_type.clone()));
        }
        let offset_kind = options.offset_kind;
        let ctx = DocContext::new(options);
        let (ymodel, id) = {
            let mut txn = ctx
                .doc()
                .try_transact_mut()
                .map_err(|e| YDocError::TransactionError(e.to_string()))?;
            let ymodel = txn.get_or_insert_map(keys::STANDALONE_CELL);
            let id = populate(&mut txn, &ymodel, &content);
            (ymodel, id)
        };
        let prev_len = str_len(&content.source, offset_kind);
        Ok(Self::bind(
            ctx,
            ymodel,
            id,
            content.cell_type,
            prev_len,
            UndoMode::Own,
            true,
        ))
    }

    /// Wrap an existing cell map of a notebook document.
    ///
    /// Unknown cell types are kept as [`CellType::Unrecognized`] so the
    /// notebook's cell list stays aligned with the shared sequence.
    pub(crate) fn attach(ctx: &Rc<DocContext>, ymodel: MapRef, undo: UndoMode) -> Self {
        let (id, cell_type, prev_len) = ctx
            .read(|txn| {
                (
                    ymodel.get(txn, keys::ID).and_then(|v| out_to_string(&v, txn)),
                    read_cell_type(&ymodel, txn),
                    source_len(&ymodel, txn, ctx.options().offset_kind),
                )
            })
            .unwrap_or((None, CellType::Unrecognized(String::new()), 0));

        if let CellType::Unrecognized(cell_type) = &cell_type {
            tracing::warn!(cell_type = %cell_type, "unknown cell type, keeping cell as unrecognized");
        }
        let id = id.unwrap_or_else(|| {
            tracing::warn!("cell without id");
            String::new()
        });
        Self::bind(ctx.clone(), ymodel, id, cell_type, prev_len, undo, false)
    }

    fn bind(
        ctx: Rc<DocContext>,
        ymodel: MapRef,
        id: String,
        cell_type: CellType,
        prev_len: u32,
        undo: UndoMode,
        standalone: bool,
    ) -> Self {
        let (undo, owns_undo) = match undo {
            UndoMode::Shared(scope) => (scope, false),
            UndoMode::Own => {
                let scope = UndoScope::new(ctx.doc(), ctx.options().capture_timeout_millis);
                scope.expand(&ymodel);
                (Rc::new(scope), true)
            }
        };

        let queue = EventQueue::new();
        let sink = queue.clone();
        let seq = ctx.txn_seq();
        let observed = ymodel.clone();
        let observed_type = cell_type.clone();
        let prev_source_len = Arc::new(AtomicU32::new(prev_len));
        let offset_kind = ctx.options().offset_kind;
        let subscription = ymodel.observe_deep(move |txn, events| {
            let translator = ChangeContext {
                ymodel: &observed,
                cell_type: &observed_type,
                prev_source_len: &prev_source_len,
                offset_kind,
            };
            let change = translator.translate(txn, events);
            sink.push(seq.load(Ordering::SeqCst), is_silent(txn), change);
        });

        let inner = Rc::new(CellInner {
            ctx: ctx.clone(),
            ymodel,
            id,
            cell_type,
            undo,
            owns_undo,
            standalone,
            queue,
            changed: Signal::new(),
            metadata_changed: Signal::new(),
            disposed: Signal::new(),
            is_disposed: Cell::new(false),
            subscription: RefCell::new(Some(subscription)),
        });
        let flusher: Rc<dyn Flush> = inner.clone();
        ctx.register(Rc::downgrade(&flusher));

        Self { inner }
    }

    fn read<R>(&self, f: impl FnOnce(&Transaction<'_>) -> R) -> Option<R> {
        if self.inner.is_disposed.get() {
            return None;
        }
        self.inner.ctx.read(f)
    }

    fn write<R>(
        &self,
        options: TransactOptions,
        f: impl FnOnce(&mut TransactionMut) -> Result<R>,
    ) -> Result<R> {
        if self.inner.is_disposed.get() {
            return Err(YDocError::Disposed);
        }
        self.inner
            .ctx
            .write(origin_for(&self.inner.undo, &options), f)
    }

    fn require(&self, supported: bool, operation: &'static str) -> Result<()> {
        if supported {
            Ok(())
        } else {
            Err(YDocError::UnsupportedOperation(operation))
        }
    }

    /// Immutable cell id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Type fixed at creation.
    pub fn cell_type(&self) -> &CellType {
        &self.inner.cell_type
    }

    /// Whether the cell owns its document rather than living in a notebook.
    pub fn is_standalone(&self) -> bool {
        self.inner.standalone
    }

    /// The underlying shared map.
    pub fn ymodel(&self) -> &MapRef {
        &self.inner.ymodel
    }

    /// The shared source text, for editor bindings. `None` while the source
    /// is still stored as a plain string.
    pub fn ysource(&self) -> Option<TextRef> {
        self.read(|txn| match self.inner.ymodel.get(txn, keys::SOURCE) {
            Some(Out::YText(text)) => Some(text),
            _ => None,
        })
        .flatten()
    }

    /// Current source text.
    pub fn source(&self) -> String {
        self.read(|txn| read_source(&self.inner.ymodel, txn))
            .unwrap_or_default()
    }

    /// Replace the whole source. Setting the current content is a no-op.
    pub fn set_source(&self, value: &str) -> Result<()> {
        if self.source() == value {
            return Ok(());
        }
        self.write(TransactOptions::undoable(), |txn| {
            let text = self.text_body(txn);
            replace_text(txn, &text, value);
            Ok(())
        })
    }

    /// Replace the `[start, end)` range of the source with `value`.
    pub fn update_source(&self, start: u32, end: u32, value: &str) -> Result<()> {
        self.write(TransactOptions::undoable(), |txn| {
            let text = self.text_body(txn);
            splice_text(txn, &text, start, end, value)
        })
    }

    // A plain-string source is swapped for shared text on first edit.
    fn text_body(&self, txn: &mut TransactionMut) -> TextRef {
        if let Some(Out::YText(text)) = self.inner.ymodel.get(txn, keys::SOURCE) {
            return text;
        }
        let legacy = read_source(&self.inner.ymodel, txn);
        self.inner
            .ymodel
            .insert(txn, keys::SOURCE, TextPrelim::new(legacy.as_str()))
    }

    /// The whole metadata map, or `None` if the cell is no longer readable.
    pub fn metadata(&self) -> Option<Metadata> {
        self.read(|txn| metadata::read(&self.inner.ymodel, keys::METADATA, txn))
    }

    /// Value of one metadata key.
    pub fn get_metadata(&self, key: &str) -> Option<Value> {
        self.metadata().and_then(|mut m| m.remove(key))
    }

    /// Set one metadata key.
    ///
    /// Setting `collapsed` also sets `jupyter.outputs_hidden`; setting
    /// `jupyter` derives `collapsed` from its `outputs_hidden` entry.
    pub fn set_metadata(&self, key: &str, value: Value) -> Result<()> {
        let unchanged = self
            .get_metadata(key)
            .is_some_and(|current| json_deep_equal(&current, &value));
        if unchanged {
            return Ok(());
        }
        self.update_metadata(|next| {
            next.insert(key.to_string(), value);
            metadata::couple_on_set(next, key);
        })
    }

    /// Replace the whole metadata map. Keys missing from `value` are deleted.
    pub fn set_metadata_all(&self, value: Metadata) -> Result<()> {
        let mut value = value;
        metadata::normalize(&mut value);
        let unchanged = self.metadata().is_some_and(|current| {
            json_deep_equal(&Value::Object(current), &Value::Object(value.clone()))
        });
        if unchanged {
            return Ok(());
        }
        self.update_metadata(|next| *next = value)
    }

    /// Delete one metadata key. Deleting a missing key is a no-op.
    pub fn delete_metadata(&self, key: &str) -> Result<()> {
        if self.get_metadata(key).is_none() {
            return Ok(());
        }
        self.update_metadata(|next| {
            next.remove(key);
            metadata::couple_on_delete(next, key);
        })
    }

    fn update_metadata(&self, edit: impl FnOnce(&mut Metadata)) -> Result<()> {
        self.write(TransactOptions::not_undoable(), |txn| {
            let current = metadata::read(&self.inner.ymodel, keys::METADATA, txn);
            let mut next = current.clone();
            edit(&mut next);
            let map = metadata::ensure_map(txn, &self.inner.ymodel, keys::METADATA);
            metadata::apply_diff(txn, &map, &current, &next);
            Ok(())
        })
    }

    /// Plain form of the cell. Empty when the cell is no longer readable.
    pub fn to_content(&self) -> CellContent {
        self.read(|txn| read_content(&self.inner.ymodel, txn))
            .unwrap_or_else(|| CellContent {
                id: Some(self.inner.id.clone()),
                cell_type: self.inner.cell_type.clone(),
                source: String::new(),
                metadata: Metadata::new(),
                attachments: None,
                outputs: Vec::new(),
                execution_count: None,
            })
    }

    /// The nbformat JSON shape of the cell.
    pub fn to_json(&self) -> Value {
        self.to_content().to_value()
    }

    /// Run `f` in one undoable transaction on the cell's document.
    pub fn transact<R>(&self, f: impl FnOnce(&mut TransactionMut) -> R) -> Result<R> {
        self.transact_with(TransactOptions::undoable(), f)
    }

    /// Run `f` in one transaction configured by `options`.
    pub fn transact_with<R>(
        &self,
        options: TransactOptions,
        f: impl FnOnce(&mut TransactionMut) -> R,
    ) -> Result<R> {
        self.write(options, |txn| Ok(f(txn)))
    }

    /// Undo the last step of the cell's undo scope, or the notebook's when shared.
    pub fn undo(&self) -> Result<bool> {
        if self.inner.is_disposed.get() {
            return Err(YDocError::Disposed);
        }
        self.inner.ctx.run(|| self.inner.undo.undo())
    }

    /// Redo the last undone step.
    pub fn redo(&self) -> Result<bool> {
        if self.inner.is_disposed.get() {
            return Err(YDocError::Disposed);
        }
        self.inner.ctx.run(|| self.inner.undo.redo())
    }

    /// Whether an undo step is available.
    pub fn can_undo(&self) -> bool {
        self.inner.undo.can_undo()
    }

    /// Whether a redo step is available.
    pub fn can_redo(&self) -> bool {
        self.inner.undo.can_redo()
    }

    /// Forget every undo and redo step.
    pub fn clear_undo_history(&self) {
        self.inner.undo.clear();
    }

    /// Start a new undo step even if the capture window is still open.
    pub fn stop_capturing(&self) {
        self.inner.undo.stop_capturing();
    }

    /// Awareness of the document the cell lives in.
    pub fn with_awareness<R>(&self, f: impl FnOnce(&mut ClientAwareness) -> R) -> Option<R> {
        if self.inner.is_disposed.get() {
            return None;
        }
        self.inner.ctx.with_awareness(f)
    }

    /// Emitted once per committed transaction that changed the cell.
    pub fn changed(&self) -> &Signal<CellChange> {
        &self.inner.changed
    }

    /// Emitted once per metadata key that actually changed.
    pub fn metadata_changed(&self) -> &Signal<MapChange> {
        &self.inner.metadata_changed
    }

    /// Emitted once, when the cell is disposed.
    pub fn disposed(&self) -> &Signal<()> {
        &self.inner.disposed
    }

    /// Whether the cell was disposed, directly or with its notebook.
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed.get()
    }

    /// Detach observers and release the cell's own resources. Idempotent.
    ///
    /// Standalone cells also release their private document.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.is_disposed.replace(true) {
            return;
        }
        inner.subscription.borrow_mut().take();
        if inner.owns_undo {
            inner.undo.release();
        }
        if inner.standalone {
            inner.ctx.release();
        }
        tracing::debug!(cell_id = %inner.id, "cell disposed");
        inner.disposed.emit(&());
        inner.disposed.clear();
        inner.changed.clear();
        inner.metadata_changed.clear();
    }
}

/// Non-owning handle, for caches keyed by container.
#[derive(Clone)]
pub(crate) struct WeakCell(Weak<CellInner>);

impl WeakCell {
    /// The cell, if its model is still alive.
    pub fn upgrade(&self) -> Option<YCell> {
        self.0.upgrade().map(|inner| YCell { inner })
    }
}

impl YCell {
    pub(crate) fn downgrade(&self) -> WeakCell {
        WeakCell(Rc::downgrade(&self.inner))
    }
}

impl PartialEq for YCell {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for YCell {}

impl std::fmt::Debug for YCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YCell")
            .field("id", &self.inner.id)
            .field("cell_type", &self.inner.cell_type)
            .field("standalone", &self.inner.standalone)
            .field("is_disposed", &self.inner.is_disposed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{DeltaOp, KeyAction};
    use crate::document::SILENT_CHANGE_ORIGIN;
    use serde_json::json;
    use yrs::Text;

    fn record(cell: &YCell) -> Rc<RefCell<Vec<CellChange>>> {
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        cell.changed().connect(move |c| sink.borrow_mut().push(c.clone()));
        changes
    }

    fn object(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_standalone_defaults() {
        let cell = YCell::standalone(CellContent::code("x = 1")).unwrap();
        assert!(cell.is_standalone());
        assert!(!cell.id().is_empty());

        let json = cell.to_json();
        assert_eq!(json["cell_type"], "code");
        assert_eq!(json["source"], "x = 1");
        assert_eq!(json["metadata"], json!({}));
        assert_eq!(json["outputs"], json!([]));
        assert_eq!(json["execution_count"], Value::Null);
        assert!(json.get("execution_state").is_none());
    }

    #[test]
    fn test_keeps_given_id() {
        let cell = YCell::standalone(CellContent::markdown("# hi").with_id("abc")).unwrap();
        assert_eq!(cell.id(), "abc");
        assert_eq!(cell.to_json()["id"], "abc");
    }

    #[test]
    fn test_rejects_unrecognized_type() {
        let content = CellContent {
            cell_type: CellType::Unrecognized("widget".into()),
            ..CellContent::raw("")
        };
        assert!(matches!(
            YCell::standalone(content),
            Err(YDocError::InvalidCellType(t)) if t == "widget"
        ));
    }

    #[test]
    fn test_update_source() {
        let cell = YCell::standalone(CellContent::raw("fooo bar")).unwrap();
        let changes = record(&cell);
        cell.update_source(3, 5, "/").unwrap();
        assert_eq!(cell.source(), "foo/bar");
        assert_eq!(changes.borrow().len(), 1);
        assert!(changes.borrow()[0].source_change.is_some());
    }

    #[test]
    fn test_collapsed_is_coupled_to_outputs_hidden() {
        let cell = YCell::standalone(CellContent::code("")).unwrap();
        cell.set_metadata("collapsed", json!(true)).unwrap();
        assert_eq!(
            cell.metadata().map(Value::Object),
            Some(json!({"collapsed": true, "jupyter": {"outputs_hidden": true}}))
        );

        let cell = YCell::standalone(CellContent::code("")).unwrap();
        cell.set_metadata("jupyter", json!({"outputs_hidden": true}))
            .unwrap();
        assert_eq!(cell.get_metadata("collapsed"), Some(json!(true)));

        cell.delete_metadata("collapsed").unwrap();
        assert_eq!(cell.metadata(), Some(Metadata::new()));
    }

    #[test]
    fn test_metadata_changed_per_key() {
        let cell = YCell::standalone(CellContent::code("")).unwrap();
        let keys = Rc::new(RefCell::new(Vec::new()));
        let sink = keys.clone();
        cell.metadata_changed()
            .connect(move |c: &MapChange| sink.borrow_mut().push((c.key.clone(), c.action)));
        let changes = record(&cell);

        cell.set_metadata("collapsed", json!(true)).unwrap();
        cell.set_metadata("collapsed", json!(true)).unwrap();

        assert_eq!(
            *keys.borrow(),
            vec![
                ("collapsed".to_string(), KeyAction::Add),
                ("jupyter".to_string(), KeyAction::Add),
            ]
        );
        assert_eq!(changes.borrow().len(), 1);
    }

    #[test]
    fn test_null_metadata_is_stored() {
        let cell = YCell::standalone(CellContent::code("")).unwrap();
        let changes = record(&cell);

        cell.set_metadata("foo", Value::Null).unwrap();
        assert_eq!(cell.metadata(), Some(object(json!({"foo": null}))));
        assert_eq!(cell.get_metadata("foo"), Some(Value::Null));

        cell.set_metadata("foo", Value::Null).unwrap();
        assert_eq!(changes.borrow().len(), 1);
    }

    #[test]
    fn test_bulk_metadata_diff() {
        let cell = YCell::standalone(
            CellContent::code("").with_metadata(object(json!({"a": 1, "b": {"c": 2}}))),
        )
        .unwrap();
        let changes = record(&cell);

        cell.set_metadata_all(object(json!({"b": {"c": 3}, "d": true})))
            .unwrap();
        cell.set_metadata_all(object(json!({"b": {"c": 3}, "d": true})))
            .unwrap();

        let changes = changes.borrow();
        assert_eq!(changes.len(), 1);
        let keys = changes[0].metadata_change.as_ref().unwrap();
        let actions: Vec<_> = keys.iter().map(|k| (k.key.as_str(), k.action)).collect();
        assert_eq!(
            actions,
            vec![
                ("a", KeyAction::Delete),
                ("b", KeyAction::Update),
                ("d", KeyAction::Add),
            ]
        );
        assert_eq!(cell.get_metadata("b"), Some(json!({"c": 3})));
    }

    #[test]
    fn test_bulk_metadata_normalizes_collapsed() {
        let cell = YCell::standalone(CellContent::code("")).unwrap();
        cell.set_metadata_all(object(json!({
            "collapsed": false,
            "jupyter": {"outputs_hidden": true}
        })))
        .unwrap();
        assert_eq!(
            cell.get_metadata("jupyter"),
            Some(json!({"outputs_hidden": false}))
        );
    }

    #[test]
    fn test_legacy_plain_source_is_upgraded() {
        let cell = YCell::standalone(CellContent::raw("")).unwrap();
        cell.transact(|txn| {
            cell.ymodel().insert(txn, keys::SOURCE, "plain");
        })
        .unwrap();
        assert_eq!(cell.source(), "plain");
        assert!(cell.ysource().is_none());

        let changes = record(&cell);
        cell.update_source(5, 5, "!").unwrap();
        assert_eq!(cell.source(), "plain!");
        assert!(cell.ysource().is_some());
        assert_eq!(
            changes.borrow()[0].source_change,
            Some(vec![DeltaOp::Delete(5), DeltaOp::Insert("plain!".into())])
        );
    }

    #[test]
    fn test_silent_changes_are_not_emitted() {
        let cell = YCell::standalone(CellContent::code("a")).unwrap();
        let changes = record(&cell);
        let ysource = cell.ysource().unwrap();
        cell.transact_with(TransactOptions::with_origin(SILENT_CHANGE_ORIGIN), |txn| {
            ysource.push(txn, "b");
        })
        .unwrap();
        assert_eq!(cell.source(), "ab");
        assert!(changes.borrow().is_empty());
    }

    #[test]
    fn test_undo_source_not_metadata() {
        let cell = YCell::standalone(CellContent::code("")).unwrap();
        cell.set_source("x = 1").unwrap();
        cell.set_metadata("tags", json!(["a"])).unwrap();

        cell.undo().unwrap();
        assert_eq!(cell.source(), "");
        assert_eq!(cell.get_metadata("tags"), Some(json!(["a"])));
    }

    #[test]
    fn test_dispose() {
        let cell = YCell::standalone(CellContent::code("x")).unwrap();
        let other = cell.clone();
        assert_eq!(cell, other);

        cell.dispose();
        cell.dispose();
        assert!(other.is_disposed());
        assert!(other.metadata().is_none());
        assert!(matches!(other.set_source("y"), Err(YDocError::Disposed)));
        assert!(other.with_awareness(|a| a.client_id()).is_none());
    }
}
