//! Lifecycle and transaction plumbing shared by every document model.
//!
//! yrs calls observers while a transaction commits, with the transaction
//! still borrowed. Observer callbacks therefore only translate the raw event
//! into an owned record and push it onto an [`EventQueue`]. Once the
//! transaction has been dropped, [`DocContext::flush`] asks every model bound
//! to the document (in registration order) to drain its queue, update its
//! derived state and emit one change record per transaction.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Doc, Map, MapRef, Observable, Origin, ReadTxn, StateVector, Subscription, Transact,
    Transaction, TransactionMut, Update, WriteTxn,
};

use crate::awareness::ClientAwareness;
use crate::config::{DocOptions, TransactOptions};
use crate::convert::{json_deep_equal, json_to_any, out_to_json};
use crate::delta::{map_change, sorted_keys, MapChange};
use crate::error::{Result, YDocError};
use crate::keys;
use crate::signal::Signal;
use crate::undo::UndoScope;

/// Origin of internal corrective writes that must not reach `changed` listeners.
pub const SILENT_CHANGE_ORIGIN: &str = "silent-change";

/// Origin of non-undoable writes that carry no origin of their own.
pub const NON_UNDOABLE_ORIGIN: &str = "non-undoable";

/// Origin of updates applied through [`YDocument::apply_update`].
pub const REMOTE_ORIGIN: &str = "remote";

pub(crate) fn is_silent(txn: &TransactionMut) -> bool {
    txn.origin()
        .is_some_and(|origin| *origin == Origin::from(SILENT_CHANGE_ORIGIN))
}

/// One observed batch, tagged with the transaction it came from.
pub(crate) struct Pending<T> {
    pub seq: u64,
    pub silent: bool,
    pub event: T,
}

/// Hand-off between observer callbacks and the owning model.
pub(crate) struct EventQueue<T>(Arc<Mutex<Vec<Pending<T>>>>);

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, seq: u64, silent: bool, event: T) {
        self.0.lock().push(Pending { seq, silent, event });
    }

    pub fn drain(&self) -> Vec<Pending<T>> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl<T> Clone for EventQueue<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Group drained batches by transaction, preserving order.
pub(crate) fn group_by_txn<T>(pending: Vec<Pending<T>>) -> Vec<(bool, Vec<T>)> {
    let mut groups: Vec<(u64, bool, Vec<T>)> = Vec::new();
    for item in pending {
        match groups.last_mut() {
            Some((seq, silent, events)) if *seq == item.seq => {
                *silent &= item.silent;
                events.push(item.event);
            }
            _ => groups.push((item.seq, item.silent, vec![item.event])),
        }
    }
    groups
        .into_iter()
        .map(|(_, silent, events)| (silent, events))
        .collect()
}

/// A model that drains queued events after a commit.
pub(crate) trait Flush {
    /// Returns `true` if anything was processed.
    fn flush(&self) -> bool;
}

/// The `Y.Doc` together with everything bound to it.
pub(crate) struct DocContext {
    doc: Doc,
    options: DocOptions,
    txn_seq: Arc<AtomicU64>,
    flushers: RefCell<Vec<Weak<dyn Flush>>>,
    flushing: Cell<bool>,
    released: Cell<bool>,
    awareness: RefCell<Option<ClientAwareness>>,
}

struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl DocContext {
    /// Fresh document context from `options`.
    pub fn new(options: DocOptions) -> Rc<Self> {
        let doc = Doc::with_options(options.yrs_options());
        let awareness = ClientAwareness::new(&doc);
        Rc::new(Self {
            doc,
            options,
            txn_seq: Arc::new(AtomicU64::new(0)),
            flushers: RefCell::new(Vec::new()),
            flushing: Cell::new(false),
            released: Cell::new(false),
            awareness: RefCell::new(Some(awareness)),
        })
    }

    /// The shared `Y.Doc`.
    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    pub fn options(&self) -> &DocOptions {
        &self.options
    }

    /// Counter observers read to tag their batches.
    pub fn txn_seq(&self) -> Arc<AtomicU64> {
        self.txn_seq.clone()
    }

    /// Register a model to flush after each commit, in registration order.
    pub fn register(&self, flusher: Weak<dyn Flush>) {
        self.flushers.borrow_mut().push(flusher);
    }

    /// Run `f` in a read transaction. `None` once released or while a write is open.
    pub fn read<R>(&self, f: impl FnOnce(&Transaction<'_>) -> R) -> Option<R> {
        if self.released.get() {
            return None;
        }
        let txn = self.doc.try_transact().ok()?;
        Some(f(&txn))
    }

    /// Run `f` in a write transaction, commit, then flush observers.
    pub fn write<R>(
        &self,
        origin: Origin,
        f: impl FnOnce(&mut TransactionMut) -> Result<R>,
    ) -> Result<R> {
        if self.released.get() {
            return Err(YDocError::Disposed);
        }
        self.txn_seq.fetch_add(1, Ordering::SeqCst);
        let result = {
            let mut txn = self
                .doc
                .try_transact_mut_with(origin)
                .map_err(|e| YDocError::TransactionError(e.to_string()))?;
            f(&mut txn)
        };
        self.flush();
        result
    }

    /// Run an operation that opens its own transactions (undo, redo), then flush.
    pub fn run<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        if self.released.get() {
            return Err(YDocError::Disposed);
        }
        self.txn_seq.fetch_add(1, Ordering::SeqCst);
        let result = f();
        self.flush();
        result
    }

    /// Drain every registered model until no queue holds work.
    ///
    /// Listeners may write to the document while being notified; those
    /// writes are picked up by the next round instead of recursing.
    pub fn flush(&self) {
        if self.flushing.replace(true) {
            return;
        }
        let _guard = FlushGuard(&self.flushing);
        loop {
            let flushers: Vec<Rc<dyn Flush>> = {
                let mut list = self.flushers.borrow_mut();
                list.retain(|weak| weak.strong_count() > 0);
                list.iter().filter_map(Weak::upgrade).collect()
            };
            let mut progressed = false;
            for flusher in flushers {
                progressed |= flusher.flush();
            }
            if !progressed {
                break;
            }
        }
    }

    /// Run `f` with the awareness handle. `None` once released.
    pub fn with_awareness<R>(&self, f: impl FnOnce(&mut ClientAwareness) -> R) -> Option<R> {
        self.awareness.borrow_mut().as_mut().map(f)
    }

    /// Detach awareness and refuse further transactions.
    pub fn release(&self) {
        if let Some(mut awareness) = self.awareness.borrow_mut().take() {
            awareness.clear_local_state();
        }
        self.released.set(true);
    }
}

/// Common base of [`YFile`](crate::YFile), [`YBlob`](crate::YBlob) and
/// [`YNotebook`](crate::YNotebook).
///
/// Owns the `state` map, the undo scope, the awareness handle and the
/// transaction boundary. Concrete models dereference to it.
pub struct YDocument {
    ctx: Rc<DocContext>,
    ystate: MapRef,
    undo: Rc<UndoScope>,
    disposed: Signal<()>,
    is_disposed: Cell<bool>,
    state_subscription: RefCell<Option<Subscription>>,
}

impl YDocument {
    /// Create the base and observe the state map; state changes are handed to `on_state`.
    pub(crate) fn new(
        ctx: Rc<DocContext>,
        on_state: impl Fn(u64, bool, Vec<MapChange>) + Send + Sync + 'static,
    ) -> Self {
        let ystate = {
            let mut txn = ctx.doc().transact_mut();
            txn.get_or_insert_map(keys::STATE)
        };
        let undo = Rc::new(UndoScope::new(
            ctx.doc(),
            ctx.options().capture_timeout_millis,
        ));

        let seq = ctx.txn_seq();
        let subscription = ystate.observe(move |txn, event| {
            let changes: Vec<MapChange> = sorted_keys(event.keys(txn))
                .into_iter()
                .map(|(key, change)| map_change(key, change, txn))
                .collect();
            if !changes.is_empty() {
                on_state(seq.load(Ordering::SeqCst), is_silent(txn), changes);
            }
        });

        Self {
            ctx,
            ystate,
            undo,
            disposed: Signal::new(),
            is_disposed: Cell::new(false),
            state_subscription: RefCell::new(Some(subscription)),
        }
    }

    pub(crate) fn ctx(&self) -> &Rc<DocContext> {
        &self.ctx
    }

    pub(crate) fn undo_scope(&self) -> &Rc<UndoScope> {
        &self.undo
    }

    /// The underlying `Y.Doc`, for editor bindings and transports.
    pub fn doc(&self) -> &Doc {
        self.ctx.doc()
    }

    /// Client id of this replica.
    pub fn client_id(&self) -> u64 {
        self.ctx.doc().client_id()
    }

    /// Value of a state key, or `None` if unset or the document is disposed.
    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.ctx
            .read(|txn| self.ystate.get(txn, key).map(|v| out_to_json(&v, txn)))
            .flatten()
    }

    /// Set a state key. Writes equal to the current value are skipped.
    pub fn set_state(&self, key: &str, value: Value) -> Result<()> {
        if self
            .get_state(key)
            .is_some_and(|current| json_deep_equal(&current, &value))
        {
            return Ok(());
        }
        self.write(TransactOptions::not_undoable(), |txn| {
            self.ystate.insert(txn, key, json_to_any(&value));
            Ok(())
        })
    }

    /// Drop every state key except `dirty` and `path`.
    pub(crate) fn reset_state_in(&self, txn: &mut TransactionMut) {
        let stale: Vec<String> = self
            .ystate
            .keys(txn)
            .filter(|key| !matches!(*key, "dirty" | "path"))
            .map(str::to_string)
            .collect();
        for key in stale {
            self.ystate.remove(txn, &key);
        }
    }

    /// Whether the content differs from what was last saved.
    pub fn dirty(&self) -> bool {
        matches!(self.get_state("dirty"), Some(Value::Bool(true)))
    }

    /// Mark the document as modified or saved.
    pub fn set_dirty(&self, dirty: bool) -> Result<()> {
        self.set_state("dirty", Value::Bool(dirty))
    }

    /// Path of the backing file, if known.
    pub fn path(&self) -> Option<String> {
        match self.get_state("path") {
            Some(Value::String(path)) => Some(path),
            _ => None,
        }
    }

    /// Record the path of the backing file.
    pub fn set_path(&self, path: &str) -> Result<()> {
        self.set_state("path", Value::String(path.to_string()))
    }

    /// Hash of the content as last saved.
    pub fn hash(&self) -> Option<String> {
        match self.get_state("hash") {
            Some(Value::String(hash)) => Some(hash),
            _ => None,
        }
    }

    /// Record the hash of the saved content.
    pub fn set_hash(&self, hash: &str) -> Result<()> {
        self.set_state("hash", Value::String(hash.to_string()))
    }

    /// Run `f` in one undoable transaction; listeners see a single change.
    ///
    /// Model accessors and mutators must not be called from inside `f`;
    /// use the `*_in` variants taking the transaction instead.
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

    pub(crate) fn write<R>(
        &self,
        options: TransactOptions,
        f: impl FnOnce(&mut TransactionMut) -> Result<R>,
    ) -> Result<R> {
        if self.is_disposed.get() {
            return Err(YDocError::Disposed);
        }
        self.ctx.write(origin_for(&self.undo, &options), f)
    }

    /// Revert the last undoable step. Returns `false` if there was none.
    pub fn undo(&self) -> Result<bool> {
        self.ctx.run(|| self.undo.undo())
    }

    /// Reapply the last undone step. Returns `false` if there was none.
    pub fn redo(&self) -> Result<bool> {
        self.ctx.run(|| self.undo.redo())
    }

    /// Whether an undo step is available.
    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    /// Whether a redo step is available.
    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Forget every undo and redo step.
    pub fn clear_undo_history(&self) {
        self.undo.clear();
    }

    /// Start a new undo step even if the capture window is still open.
    pub fn stop_capturing(&self) {
        self.undo.stop_capturing();
    }

    /// Run `f` with the awareness handle. `None` once disposed.
    pub fn with_awareness<R>(&self, f: impl FnOnce(&mut ClientAwareness) -> R) -> Option<R> {
        self.ctx.with_awareness(f)
    }

    /// Whole document encoded as a v1 update.
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        self.ctx
            .read(|txn| txn.encode_state_as_update_v1(&StateVector::default()))
            .unwrap_or_default()
    }

    /// Encoded state vector, for diffing against a peer.
    pub fn state_vector(&self) -> Vec<u8> {
        self.ctx
            .read(|txn| txn.state_vector().encode_v1())
            .unwrap_or_default()
    }

    /// Encode what a peer with the given state vector is missing.
    pub fn encode_diff(&self, state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(state_vector)
            .map_err(|e| YDocError::TransactionError(e.to_string()))?;
        self.ctx
            .read(|txn| txn.encode_diff_v1(&sv))
            .ok_or(YDocError::Disposed)
    }

    /// Apply an update from another replica. Changes are emitted like local ones.
    pub fn apply_update(&self, update: &[u8]) -> Result<()> {
        let update =
            Update::decode_v1(update).map_err(|e| YDocError::TransactionError(e.to_string()))?;
        self.ctx.write(Origin::from(REMOTE_ORIGIN), |txn| {
            txn.apply_update(update)
                .map_err(|e| YDocError::TransactionError(e.to_string()))
        })
    }

    /// Whether [`SharedDocument::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.is_disposed.get()
    }

    /// Emitted once, at the end of disposal.
    pub fn disposed(&self) -> &Signal<()> {
        &self.disposed
    }

    /// Detach the state observer, release undo scope, awareness and root, then
    /// emit `disposed`. Concrete models detach their own observers first.
    pub(crate) fn release(&self) {
        if self.is_disposed.replace(true) {
            return;
        }
        self.state_subscription.borrow_mut().take();
        self.undo.release();
        self.ctx.release();
        tracing::debug!(client_id = self.ctx.doc().client_id(), "document disposed");
        self.disposed.emit(&());
        self.disposed.clear();
    }
}

impl std::fmt::Debug for YDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YDocument")
            .field("client_id", &self.ctx.doc().client_id())
            .field("is_disposed", &self.is_disposed.get())
            .finish()
    }
}

pub(crate) fn origin_for(undo: &UndoScope, options: &TransactOptions) -> Origin {
    match (options.undoable, options.origin.as_deref()) {
        (true, Some(origin)) => undo.track(origin),
        (true, None) => undo.origin().clone(),
        (false, origin) => Origin::from(origin.unwrap_or(NON_UNDOABLE_ORIGIN)),
    }
}

/// Behavior shared by all document models.
pub trait SharedDocument {
    type Change;

    /// Version of the document schema.
    fn version(&self) -> &'static str;

    fn document(&self) -> &YDocument;

    /// Emitted once per committed transaction that changed the model.
    fn changed(&self) -> &Signal<Self::Change>;

    /// Idempotent.
    fn dispose(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> (YDocument, EventQueue<Vec<MapChange>>) {
        let queue = EventQueue::new();
        let sink = queue.clone();
        let doc = YDocument::new(DocContext::new(DocOptions::default()), move |seq, silent, changes| {
            sink.push(seq, silent, changes)
        });
        (doc, queue)
    }

    #[test]
    fn test_set_state_skips_equal_values() {
        let (doc, queue) = document();

        doc.set_state("dirty", json!(true)).unwrap();
        assert_eq!(queue.drain().len(), 1);

        doc.set_state("dirty", json!(true)).unwrap();
        assert!(queue.drain().is_empty());

        doc.set_state("dirty", json!(false)).unwrap();
        let pending = queue.drain();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].event,
            vec![MapChange::update("dirty", json!(true), json!(false))]
        );
    }

    #[test]
    fn test_state_helpers() {
        let (doc, _queue) = document();
        assert!(!doc.dirty());
        assert_eq!(doc.path(), None);

        doc.set_dirty(true).unwrap();
        doc.set_path("notebooks/a.ipynb").unwrap();
        doc.set_hash("abc").unwrap();

        assert!(doc.dirty());
        assert_eq!(doc.path().as_deref(), Some("notebooks/a.ipynb"));
        assert_eq!(doc.hash().as_deref(), Some("abc"));
    }

    #[test]
    fn test_silent_origin_is_flagged() {
        let (doc, queue) = document();
        doc.transact_with(TransactOptions::with_origin(SILENT_CHANGE_ORIGIN), |txn| {
            doc.ystate.insert(txn, "path", "x");
        })
        .unwrap();

        let pending = queue.drain();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].silent);
    }

    #[test]
    fn test_group_by_txn() {
        let queue = EventQueue::new();
        queue.push(1, false, "a");
        queue.push(1, true, "b");
        queue.push(2, true, "c");

        let groups = group_by_txn(queue.drain());
        assert_eq!(groups, vec![(false, vec!["a", "b"]), (true, vec!["c"])]);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let (doc, _queue) = document();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        doc.disposed().connect(move |_| counter.set(counter.get() + 1));

        doc.release();
        doc.release();

        assert_eq!(count.get(), 1);
        assert!(doc.is_disposed());
        assert!(doc.get_state("dirty").is_none());
        assert!(doc.with_awareness(|a| a.client_id()).is_none());
        assert!(matches!(doc.set_dirty(true), Err(YDocError::Disposed)));
    }

    #[test]
    fn test_updates_replicate_state() {
        let (a, _qa) = document();
        let (b, qb) = document();

        a.set_path("x.txt").unwrap();
        b.apply_update(&a.encode_state_as_update()).unwrap();

        assert_eq!(b.path().as_deref(), Some("x.txt"));
        assert_eq!(qb.drain().len(), 1);

        let diff = a.encode_diff(&b.state_vector()).unwrap();
        b.apply_update(&diff).unwrap();
    }
}
