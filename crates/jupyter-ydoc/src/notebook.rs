//! Notebook document: an ordered list of cells plus notebook metadata.
//!
//! The shared `cells` array is the source of truth. The live list of
//! [`YCell`] models and the container-to-model cache are derived from it
//! and patched from observed deltas, whether the edit was local or came from
//! another replica.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use serde_json::{json, Value};
use yrs::branch::{Branch, BranchID};
use yrs::types::{EntryChange, Event, Events, PathSegment};
use yrs::{
    Any, Array, ArrayRef, DeepObservable, Map, MapPrelim, MapRef, Observable, Out, ReadTxn,
    Subscription, Transact, TransactionMut, WriteTxn,
};

use crate::cell::{populate, read_content, UndoMode, WeakCell, YCell};
use crate::config::{NotebookOptions, TransactOptions};
use crate::content::{CellContent, CellType, NotebookContent, NBFORMAT, NBFORMAT_MINOR};
use crate::convert::{json_deep_equal, out_to_i64, out_to_json};
use crate::delta::{
    array_delta, map_change, sorted_keys, value_change, Delta, DeltaOp, MapChange, NotebookChange,
    ValueChange,
};
use crate::document::{group_by_txn, is_silent, DocContext, EventQueue, Flush, SharedDocument, YDocument};
use crate::error::{Result, YDocError};
use crate::keys;
use crate::metadata::{self, Metadata};
use crate::signal::Signal;

pub const NOTEBOOK_VERSION: &str = "2.0.0";

/// Metadata key dropped on load; it only records a conversion that already happened.
const ORIG_NBFORMAT: &str = "orig_nbformat";

const LANGUAGE_INFO: &str = "language_info";
const KERNELSPEC: &str = "kernelspec";

/// Cell a notebook loaded without cells starts with.
fn default_cell() -> CellContent {
    let mut metadata = Metadata::new();
    metadata.insert("trusted".into(), Value::Bool(true));
    CellContent::code("").with_metadata(metadata)
}

/// Identity of a shared container, stable for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ContainerKey {
    Nested { client: u64, clock: u32 },
    Root(String),
}

fn container_key(map: &MapRef) -> ContainerKey {
    let branch: &Branch = map.as_ref();
    match branch.id() {
        BranchID::Nested(id) => ContainerKey::Nested {
            client: id.client,
            clock: id.clock,
        },
        BranchID::Root(name) => ContainerKey::Root(name.to_string()),
    }
}

fn out_to_u32(value: &Out) -> Option<u32> {
    out_to_i64(value).and_then(|v| u32::try_from(v).ok())
}

fn read_version<T: ReadTxn>(ymeta: &MapRef, txn: &T, key: &str, default: u32) -> u32 {
    ymeta
        .get(txn, key)
        .and_then(|v| out_to_u32(&v))
        .unwrap_or(default)
}

fn is_metadata_path(segment: Option<&PathSegment>) -> bool {
    matches!(segment, Some(PathSegment::Key(key)) if key.as_ref() == keys::METADATA)
}

fn reject_unrecognized(cells: &[CellContent]) -> Result<()> {
    match cells
        .iter()
        .find(|cell| matches!(cell.cell_type, CellType::Unrecognized(_)))
    {
        Some(cell) => Err(YDocError::InvalidCellType(cell.cell_type.to_string())),
        None => Ok(()),
    }
}

#[derive(Default)]
struct MetaChange {
    metadata: Option<Vec<MapChange>>,
    nbformat: Option<ValueChange<u32>>,
    nbformat_minor: Option<ValueChange<u32>>,
}

impl MetaChange {
    fn is_empty(&self) -> bool {
        self.metadata.is_none() && self.nbformat.is_none() && self.nbformat_minor.is_none()
    }
}

/// Changes of the `meta` map, including a wholesale swap of its metadata map.
///
/// A swapped or removed map no longer exposes its entries, so `previous` holds
/// the metadata as of the last observed change.
fn translate_meta(
    ymeta: &MapRef,
    txn: &TransactionMut,
    events: &Events,
    previous: &Metadata,
) -> MetaChange {
    let mut change = MetaChange::default();
    for event in events.iter() {
        let Event::Map(event) = event else {
            continue;
        };
        let path = event.path();
        if path.is_empty() {
            let changed_keys = event.keys(txn);
            if let Some(entry) = changed_keys.get(keys::NBFORMAT) {
                change.nbformat = Some(value_change(entry, out_to_u32));
            }
            if let Some(entry) = changed_keys.get(keys::NBFORMAT_MINOR) {
                change.nbformat_minor = Some(value_change(entry, out_to_u32));
            }
            if let Some(entry) = changed_keys.get(keys::METADATA) {
                let current = match entry {
                    EntryChange::Removed(_) => Metadata::new(),
                    _ => metadata::read(ymeta, keys::METADATA, txn),
                };
                let mut swapped: Vec<MapChange> = previous
                    .iter()
                    .filter(|(key, _)| !current.contains_key(*key))
                    .map(|(key, value)| MapChange::delete(key.clone(), value.clone()))
                    .collect();
                swapped.extend(
                    current
                        .into_iter()
                        .map(|(key, value)| MapChange::add(key, value)),
                );
                change.metadata = Some(swapped);
            }
        } else if path.len() == 1 && is_metadata_path(path.front()) {
            let changed_keys: Vec<MapChange> = sorted_keys(event.keys(txn))
                .into_iter()
                .map(|(key, entry)| map_change(key, entry, txn))
                .collect();
            change.metadata = Some(changed_keys);
        }
    }
    change
}

enum NotebookEvent {
    State(Vec<MapChange>),
    Cells(Delta<Vec<MapRef>>),
    Meta(MetaChange),
}

struct NotebookInner {
    base: YDocument,
    ycells: ArrayRef,
    ymeta: MapRef,
    document_wide_undo: bool,
    cells: RefCell<Vec<YCell>>,
    cache: RefCell<HashMap<ContainerKey, WeakCell>>,
    queue: EventQueue<NotebookEvent>,
    changed: Signal<NotebookChange>,
    metadata_changed: Signal<MapChange>,
    subscriptions: RefCell<Vec<Subscription>>,
}

impl NotebookInner {
    /// The model wrapping `ymodel`, created and cached on first use.
    fn model_for(&self, ymodel: MapRef) -> YCell {
        let key = container_key(&ymodel);
        let cached = self.cache.borrow().get(&key).and_then(WeakCell::upgrade);
        if let Some(cell) = cached.filter(|cell| !cell.is_disposed()) {
            return cell;
        }
        let undo = if self.document_wide_undo {
            UndoMode::Shared(self.base.undo_scope().clone())
        } else {
            UndoMode::Own
        };
        let cell = YCell::attach(self.base.ctx(), ymodel, undo);
        tracing::debug!(cell_id = cell.id(), "cell model created");
        self.cache.borrow_mut().insert(key, cell.downgrade());
        cell
    }

    /// Splice the live cell list with `delta` and return it with models
    /// substituted for containers.
    fn apply_cells_delta(&self, delta: Delta<Vec<MapRef>>) -> Delta<Vec<YCell>> {
        let mut index = 0;
        let mut applied = Vec::with_capacity(delta.len());
        for op in delta {
            match op {
                DeltaOp::Retain(n) => {
                    index += n as usize;
                    applied.push(DeltaOp::Retain(n));
                }
                DeltaOp::Delete(n) => {
                    let removed: Vec<YCell> = {
                        let mut cells = self.cells.borrow_mut();
                        let end = (index + n as usize).min(cells.len());
                        cells.drain(index.min(end)..end).collect()
                    };
                    // Deleted containers may already be collected; evict by model identity.
                    self.cache.borrow_mut().retain(|_, weak| {
                        weak.upgrade()
                            .is_some_and(|cell| !removed.contains(&cell))
                    });
                    for cell in &removed {
                        cell.dispose();
                    }
                    applied.push(DeltaOp::Delete(n));
                }
                DeltaOp::Insert(ymodels) => {
                    let models: Vec<YCell> =
                        ymodels.into_iter().map(|m| self.model_for(m)).collect();
                    {
                        let mut cells = self.cells.borrow_mut();
                        let at = index.min(cells.len());
                        cells.splice(at..at, models.iter().cloned());
                    }
                    index += models.len();
                    applied.push(DeltaOp::Insert(models));
                }
            }
        }
        applied
    }
}

impl Flush for NotebookInner {
    fn flush(&self) -> bool {
        let pending = self.queue.drain();
        if pending.is_empty() {
            return false;
        }
        for (silent, events) in group_by_txn(pending) {
            let mut change = NotebookChange::default();
            for event in events {
                match event {
                    NotebookEvent::Cells(delta) => {
                        let delta = self.apply_cells_delta(delta);
                        change.cells_change.get_or_insert_with(Vec::new).extend(delta);
                    }
                    NotebookEvent::Meta(meta) => {
                        if let Some(changed_keys) = meta.metadata {
                            change
                                .metadata_change
                                .get_or_insert_with(Vec::new)
                                .extend(changed_keys);
                        }
                        change.nbformat_changed = meta.nbformat.or(change.nbformat_changed);
                        change.nbformat_minor_changed =
                            meta.nbformat_minor.or(change.nbformat_minor_changed);
                    }
                    NotebookEvent::State(changed_keys) => {
                        change.state_change.get_or_insert_with(Vec::new).extend(changed_keys);
                    }
                }
            }
            if silent || self.base.is_disposed() {
                continue;
            }
            if let Some(changed_keys) = &change.metadata_change {
                for key in changed_keys.iter().filter(|k| !metadata::is_noop_update(k)) {
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

/// A collaborative Jupyter notebook.
///
/// # Example
///
/// ```rust
/// use jupyter_ydoc::{CellContent, YNotebook};
///
/// let notebook = YNotebook::new();
/// notebook.add_cell(CellContent::markdown("# Title")).unwrap();
/// let cell = notebook.add_cell(CellContent::code("print(1)")).unwrap();
/// assert_eq!(notebook.cell_count(), 2);
/// assert_eq!(notebook.get_cell(1), Some(cell));
///
/// let json = notebook.to_json();
/// assert_eq!(json.cells[0].source, "# Title");
/// ```
#[derive(Clone)]
pub struct YNotebook {
    inner: Rc<NotebookInner>,
}

impl YNotebook {
    /// Empty notebook with default options.
    pub fn new() -> Self {
        Self::with_options(NotebookOptions::default())
    }

    pub fn with_options(options: NotebookOptions) -> Self {
        let ctx = DocContext::new(options.doc.clone());
        let queue = EventQueue::new();

        let state_queue = queue.clone();
        let base = YDocument::new(ctx.clone(), move |seq, silent, changes| {
            state_queue.push(seq, silent, NotebookEvent::State(changes))
        });

        let (ycells, ymeta) = {
            let mut txn = ctx.doc().transact_mut();
            (
                txn.get_or_insert_array(keys::CELLS),
                txn.get_or_insert_map(keys::META),
            )
        };
        base.undo_scope().expand(&ycells);

        let seq = ctx.txn_seq();
        let cells_queue = queue.clone();
        let cells_subscription = ycells.observe(move |txn, event| {
            let delta = array_delta(event.delta(txn), |value| match value {
                Out::YMap(ymodel) => Some(ymodel.clone()),
                _ => {
                    tracing::warn!("ignoring non-map element in the cell sequence");
                    None
                }
            });
            cells_queue.push(seq.load(Ordering::SeqCst), is_silent(txn), NotebookEvent::Cells(delta));
        });

        let seq = ctx.txn_seq();
        let meta_queue = queue.clone();
        let observed_meta = ymeta.clone();
        let snapshot = Mutex::new(
            ctx.read(|txn| metadata::read(&ymeta, keys::METADATA, txn))
                .unwrap_or_default(),
        );
        let meta_subscription = ymeta.observe_deep(move |txn, events| {
            let mut previous = snapshot.lock();
            let change = translate_meta(&observed_meta, txn, events, &previous);
            *previous = metadata::read(&observed_meta, keys::METADATA, txn);
            if !change.is_empty() {
                meta_queue.push(seq.load(Ordering::SeqCst), is_silent(txn), NotebookEvent::Meta(change));
            }
        });

        let inner = Rc::new(NotebookInner {
            base,
            ycells,
            ymeta,
            document_wide_undo: options.document_wide_undo,
            cells: RefCell::new(Vec::new()),
            cache: RefCell::new(HashMap::new()),
            queue,
            changed: Signal::new(),
            metadata_changed: Signal::new(),
            subscriptions: RefCell::new(vec![cells_subscription, meta_subscription]),
        });
        // Registered before any cell so cell models exist when their own events flush.
        let flusher: Rc<dyn Flush> = inner.clone();
        ctx.register(Rc::downgrade(&flusher));

        Self { inner }
    }

    /// Create a notebook holding `content`.
    pub fn create(content: &NotebookContent) -> Result<Self> {
        let notebook = Self::new();
        notebook.from_json(content)?;
        Ok(notebook)
    }

    fn ctx(&self) -> &Rc<DocContext> {
        self.inner.base.ctx()
    }

    /// The shared cell sequence.
    pub fn ycells(&self) -> &ArrayRef {
        &self.inner.ycells
    }

    /// The shared `meta` map holding format versions and metadata.
    pub fn ymeta(&self) -> &MapRef {
        &self.inner.ymeta
    }

    /// Whether cells share the notebook's undo history.
    pub fn document_wide_undo(&self) -> bool {
        self.inner.document_wide_undo
    }

    /// Live cell models, in document order.
    pub fn cells(&self) -> Vec<YCell> {
        self.inner.cells.borrow().clone()
    }

    /// Number of cells.
    pub fn cell_count(&self) -> usize {
        self.inner.cells.borrow().len()
    }

    /// Cell model at `index`, if any.
    pub fn get_cell(&self, index: u32) -> Option<YCell> {
        self.inner.cells.borrow().get(index as usize).cloned()
    }

    /// Append a cell.
    pub fn add_cell(&self, content: CellContent) -> Result<YCell> {
        let len = self
            .ctx()
            .read(|txn| self.inner.ycells.len(txn))
            .ok_or(YDocError::Disposed)?;
        self.insert_cell(len, content)
    }

    /// Insert one cell at `index` and return its model.
    pub fn insert_cell(&self, index: u32, content: CellContent) -> Result<YCell> {
        let mut cells = self.insert_cells(index, std::slice::from_ref(&content))?;
        cells.pop().ok_or(YDocError::IndexOutOfBounds { index, len: 0 })
    }

    /// Insert cells at `index` in one undoable transaction.
    ///
    /// Missing ids are generated. Returns the new models.
    pub fn insert_cells(&self, index: u32, cells: &[CellContent]) -> Result<Vec<YCell>> {
        reject_unrecognized(cells)?;
        let ymodels = self.write(TransactOptions::undoable(), |txn| {
            self.insert_cells_in(txn, index, cells)
        })?;
        Ok(ymodels
            .into_iter()
            .map(|ymodel| self.inner.model_for(ymodel))
            .collect())
    }

    fn insert_cells_in(
        &self,
        txn: &mut TransactionMut,
        index: u32,
        cells: &[CellContent],
    ) -> Result<Vec<MapRef>> {
        let len = self.inner.ycells.len(txn);
        if index > len {
            return Err(YDocError::IndexOutOfBounds { index, len });
        }
        let mut ymodels = Vec::with_capacity(cells.len());
        for (offset, content) in cells.iter().enumerate() {
            let ymodel = self
                .inner
                .ycells
                .insert(txn, index + offset as u32, MapPrelim::default());
            populate(txn, &ymodel, content);
            ymodels.push(ymodel);
        }
        Ok(ymodels)
    }

    /// Move the cell at `from` so it ends up at `to`.
    pub fn move_cell(&self, from: u32, to: u32) -> Result<()> {
        self.move_cells(from, to, 1)
    }

    /// Move `n` cells starting at `from` so the block ends up at `to`.
    ///
    /// Cells are copied, deleted and recreated: content and ids survive, but
    /// the moved cells get new models. Re-fetch them by index afterwards.
    pub fn move_cells(&self, from: u32, to: u32, n: u32) -> Result<()> {
        if n == 0 || from == to {
            return Ok(());
        }
        let ymodels = self.write(TransactOptions::undoable(), |txn| {
            let len = self.inner.ycells.len(txn);
            if from + n > len {
                return Err(YDocError::IndexOutOfBounds {
                    index: from + n - 1,
                    len,
                });
            }
            if to >= len || (to > from && to + 1 < n) {
                return Err(YDocError::IndexOutOfBounds { index: to, len });
            }
            let snapshot: Vec<CellContent> = (from..from + n)
                .filter_map(|i| match self.inner.ycells.get(txn, i) {
                    Some(Out::YMap(ymodel)) => Some(read_content(&ymodel, txn)),
                    _ => None,
                })
                .collect();
            self.inner.ycells.remove_range(txn, from, n);
            let target = if from > to { to } else { to + 1 - n };
            self.insert_cells_in(txn, target, &snapshot)
        })?;
        for ymodel in ymodels {
            self.inner.model_for(ymodel);
        }
        Ok(())
    }

    /// Delete the cell at `index` and dispose its model.
    pub fn delete_cell(&self, index: u32) -> Result<()> {
        self.delete_cell_range(index, index + 1)
    }

    /// Delete cells `[from, to)`.
    ///
    /// Removed models are disposed when the deletion is observed, before
    /// `changed` reports it.
    pub fn delete_cell_range(&self, from: u32, to: u32) -> Result<()> {
        self.write(TransactOptions::undoable(), |txn| {
            let len = self.inner.ycells.len(txn);
            if from > to || to > len {
                return Err(YDocError::IndexOutOfBounds {
                    index: to.max(from),
                    len,
                });
            }
            if to > from {
                self.inner.ycells.remove_range(txn, from, to - from);
            }
            Ok(())
        })
    }

    /// Notebook metadata, or `None` if the notebook is no longer readable.
    pub fn metadata(&self) -> Option<Metadata> {
        self.ctx()
            .read(|txn| metadata::read(&self.inner.ymeta, keys::METADATA, txn))
    }

    /// Value of one metadata key.
    pub fn get_metadata(&self, key: &str) -> Option<Value> {
        self.metadata().and_then(|mut m| m.remove(key))
    }

    /// Set one metadata key. Writes equal to the current value are skipped.
    pub fn set_metadata(&self, key: &str, value: Value) -> Result<()> {
        let unchanged = self
            .get_metadata(key)
            .is_some_and(|current| json_deep_equal(&current, &value));
        if unchanged {
            return Ok(());
        }
        self.update_metadata(|next| {
            next.insert(key.to_string(), value);
        })
    }

    /// Replace all metadata. Keys missing from `value` are deleted.
    pub fn set_metadata_all(&self, value: Metadata) -> Result<()> {
        let unchanged = self.metadata().is_some_and(|current| {
            json_deep_equal(&Value::Object(current), &Value::Object(value.clone()))
        });
        if unchanged {
            return Ok(());
        }
        self.update_metadata(|next| *next = value)
    }

    /// Delete one metadata key. Missing keys are ignored.
    pub fn delete_metadata(&self, key: &str) -> Result<()> {
        if self.get_metadata(key).is_none() {
            return Ok(());
        }
        self.update_metadata(|next| {
            next.remove(key);
        })
    }

    fn update_metadata(&self, edit: impl FnOnce(&mut Metadata)) -> Result<()> {
        self.write(TransactOptions::not_undoable(), |txn| {
            self.replace_metadata_in(txn, edit);
            Ok(())
        })
    }

    fn replace_metadata_in(&self, txn: &mut TransactionMut, edit: impl FnOnce(&mut Metadata)) {
        let current = metadata::read(&self.inner.ymeta, keys::METADATA, txn);
        let mut next = current.clone();
        edit(&mut next);
        let map = metadata::ensure_map(txn, &self.inner.ymeta, keys::METADATA);
        metadata::apply_diff(txn, &map, &current, &next);
    }

    /// Major format version, 4 unless set.
    pub fn nbformat(&self) -> u32 {
        self.ctx()
            .read(|txn| read_version(&self.inner.ymeta, txn, keys::NBFORMAT, NBFORMAT))
            .unwrap_or(NBFORMAT)
    }

    /// Minor format version, 5 unless set.
    pub fn nbformat_minor(&self) -> u32 {
        self.ctx()
            .read(|txn| {
                read_version(&self.inner.ymeta, txn, keys::NBFORMAT_MINOR, NBFORMAT_MINOR)
            })
            .unwrap_or(NBFORMAT_MINOR)
    }

    /// Set the major format version.
    pub fn set_nbformat(&self, value: u32) -> Result<()> {
        self.set_version(keys::NBFORMAT, value)
    }

    /// Set the minor format version. Cell ids are only written out from 4.5 on.
    pub fn set_nbformat_minor(&self, value: u32) -> Result<()> {
        self.set_version(keys::NBFORMAT_MINOR, value)
    }

    fn set_version(&self, key: &'static str, value: u32) -> Result<()> {
        self.write(TransactOptions::not_undoable(), |txn| {
            self.set_version_in(txn, key, value);
            Ok(())
        })
    }

    fn set_version_in(&self, txn: &mut TransactionMut, key: &'static str, value: u32) {
        let current = self.inner.ymeta.get(txn, key).and_then(|v| out_to_u32(&v));
        if current != Some(value) {
            self.inner.ymeta.insert(txn, key, Any::Number(value as f64));
        }
    }

    /// Replace the whole content with `content` in one transaction.
    ///
    /// Cell ids are only kept for format 4.5 and later 4.x minors; other
    /// versions get fresh ids. An empty cell list yields one empty trusted
    /// code cell, and missing `language_info` or `kernelspec` metadata gets
    /// an empty placeholder. The `orig_nbformat` metadata key is dropped and
    /// every state key but `dirty` and `path` is cleared.
    pub fn from_json(&self, content: &NotebookContent) -> Result<()> {
        reject_unrecognized(&content.cells)?;
        let keep_ids = content.nbformat == 4 && content.nbformat_minor >= 5;
        let mut cells: Vec<CellContent> = content
            .cells
            .iter()
            .cloned()
            .map(|mut cell| {
                if !keep_ids {
                    cell.id = None;
                }
                cell
            })
            .collect();
        if cells.is_empty() {
            cells.push(default_cell());
        }

        let mut metadata = content.metadata.clone();
        metadata.remove(ORIG_NBFORMAT);
        metadata
            .entry(LANGUAGE_INFO)
            .or_insert_with(|| json!({"name": ""}));
        metadata
            .entry(KERNELSPEC)
            .or_insert_with(|| json!({"name": "", "display_name": ""}));

        let ymodels = self.write(TransactOptions::undoable(), |txn| {
            self.set_version_in(txn, keys::NBFORMAT, content.nbformat);
            self.set_version_in(txn, keys::NBFORMAT_MINOR, content.nbformat_minor);

            self.inner.base.reset_state_in(txn);
            self.replace_metadata_in(txn, |next| *next = metadata);

            let old_len = self.inner.ycells.len(txn);
            let ymodels = self.insert_cells_in(txn, old_len, &cells)?;
            if old_len > 0 {
                self.inner.ycells.remove_range(txn, 0, old_len);
            }
            Ok(ymodels)
        })?;
        for ymodel in ymodels {
            self.inner.model_for(ymodel);
        }
        Ok(())
    }

    /// Plain form of the notebook. Cell ids are omitted for format 4.4 and older.
    pub fn to_json(&self) -> NotebookContent {
        self.ctx()
            .read(|txn| {
                let ymeta = &self.inner.ymeta;
                let nbformat = read_version(ymeta, txn, keys::NBFORMAT, NBFORMAT);
                let nbformat_minor = read_version(ymeta, txn, keys::NBFORMAT_MINOR, NBFORMAT_MINOR);
                let strip_ids = nbformat == 4 && nbformat_minor <= 4;
                let cells = self
                    .inner
                    .ycells
                    .iter(txn)
                    .filter_map(|value| match value {
                        Out::YMap(ymodel) => Some(read_content(&ymodel, txn)),
                        _ => None,
                    })
                    .map(|mut cell| {
                        if strip_ids {
                            cell.id = None;
                        }
                        cell
                    })
                    .collect();
                NotebookContent {
                    cells,
                    metadata: metadata::read(ymeta, keys::METADATA, txn),
                    nbformat,
                    nbformat_minor,
                }
            })
            .unwrap_or_default()
    }

    /// Emitted once per metadata key that actually changed.
    pub fn metadata_changed(&self) -> &Signal<MapChange> {
        &self.inner.metadata_changed
    }
}

impl Default for YNotebook {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for YNotebook {
    type Target = YDocument;

    fn deref(&self) -> &YDocument {
        &self.inner.base
    }
}

impl SharedDocument for YNotebook {
    type Change = NotebookChange;

    fn version(&self) -> &'static str {
        NOTEBOOK_VERSION
    }

    fn document(&self) -> &YDocument {
        &self.inner.base
    }

    fn changed(&self) -> &Signal<NotebookChange> {
        &self.inner.changed
    }

    /// Detach observers, dispose every cell model, then release the document.
    fn dispose(&self) {
        if self.inner.base.is_disposed() {
            return;
        }
        self.inner.subscriptions.borrow_mut().clear();
        let cells = std::mem::take(&mut *self.inner.cells.borrow_mut());
        self.inner.cache.borrow_mut().clear();
        for cell in cells {
            cell.dispose();
        }
        self.inner.base.release();
        self.inner.changed.clear();
        self.inner.metadata_changed.clear();
    }
}

impl std::fmt::Debug for YNotebook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YNotebook")
            .field("base", &self.inner.base)
            .field("cells", &self.inner.cells.borrow().len())
            .finish()
    }
}
