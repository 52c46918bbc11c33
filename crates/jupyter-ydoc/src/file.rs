//! Plain text document backed by a single shared text.

use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::atomic::Ordering;

use yrs::{
    GetString, Observable, Subscription, Text, TextRef, Transact, TransactionMut, WriteTxn,
};

use crate::config::{DocOptions, TransactOptions};
use crate::delta::{text_delta, FileChange, MapChange, TextDelta};
use crate::document::{group_by_txn, is_silent, DocContext, EventQueue, Flush, SharedDocument, YDocument};
use crate::error::{Result, YDocError};
use crate::keys;
use crate::signal::Signal;

pub const FILE_VERSION: &str = "1.0.0";

/// Replace the whole text: delete everything, then insert `value`.
pub(crate) fn replace_text(txn: &mut TransactionMut, text: &TextRef, value: &str) {
    let len = text.len(txn);
    if len > 0 {
        text.remove_range(txn, 0, len);
    }
    if !value.is_empty() {
        text.insert(txn, 0, value);
    }
}

/// Replace `[start, end)` with `value`.
///
/// The insertion happens before the deletion so a remote cursor sitting at
/// `end` ends up after the new content instead of collapsing onto `start`.
pub(crate) fn splice_text(
    txn: &mut TransactionMut,
    text: &TextRef,
    start: u32,
    end: u32,
    value: &str,
) -> Result<()> {
    let len = text.len(txn);
    if start > end || end > len {
        return Err(YDocError::IndexOutOfBounds {
            index: end.max(start),
            len,
        });
    }
    text.insert(txn, start, value);
    let inserted = text.len(txn) - len;
    if end > start {
        text.remove_range(txn, start + inserted, end - start);
    }
    Ok(())
}

enum FileEvent {
    State(Vec<MapChange>),
    Source(TextDelta),
}

struct FileInner {
    base: YDocument,
    ysource: TextRef,
    queue: EventQueue<FileEvent>,
    changed: Signal<FileChange>,
    subscription: RefCell<Option<Subscription>>,
}

impl Flush for FileInner {
    fn flush(&self) -> bool {
        let pending = self.queue.drain();
        if pending.is_empty() {
            return false;
        }
        for (silent, events) in group_by_txn(pending) {
            let mut change = FileChange::default();
            for event in events {
                match event {
                    FileEvent::State(keys) => {
                        change.state_change.get_or_insert_with(Vec::new).extend(keys)
                    }
                    FileEvent::Source(delta) => change.source_change = Some(delta),
                }
            }
            if !silent && change != FileChange::default() {
                self.changed.emit(&change);
            }
        }
        true
    }
}

/// A collaborative text file.
///
/// # Example
///
/// ```rust
/// use jupyter_ydoc::YFile;
///
/// let file = YFile::new();
/// file.set_source("fooo bar").unwrap();
/// file.update_source(3, 5, "/").unwrap();
/// assert_eq!(file.source(), "foo/bar");
/// ```
#[derive(Clone)]
pub struct YFile {
    inner: Rc<FileInner>,
}

impl YFile {
    /// Empty file with default options.
    pub fn new() -> Self {
        Self::with_options(DocOptions::default())
    }

    /// Empty file on a document built from `options`.
    pub fn with_options(options: DocOptions) -> Self {
        let ctx = DocContext::new(options);
        let queue = EventQueue::new();

        let state_queue = queue.clone();
        let base = YDocument::new(ctx.clone(), move |seq, silent, keys| {
            state_queue.push(seq, silent, FileEvent::State(keys))
        });

        let ysource = {
            let mut txn = ctx.doc().transact_mut();
            txn.get_or_insert_text(keys::SOURCE)
        };
        base.undo_scope().expand(&ysource);

        let seq = ctx.txn_seq();
        let source_queue = queue.clone();
        let subscription = ysource.observe(move |txn, event| {
            let delta = text_delta(event.delta(txn), txn);
            source_queue.push(seq.load(Ordering::SeqCst), is_silent(txn), FileEvent::Source(delta));
        });

        let inner = Rc::new(FileInner {
            base,
            ysource,
            queue,
            changed: Signal::new(),
            subscription: RefCell::new(Some(subscription)),
        });
        let flusher: Rc<dyn Flush> = inner.clone();
        ctx.register(Rc::downgrade(&flusher));

        Self { inner }
    }

    /// The shared text, for editor bindings.
    pub fn ysource(&self) -> TextRef {
        self.inner.ysource.clone()
    }

    /// The whole content.
    pub fn source(&self) -> String {
        self.ctx()
            .read(|txn| self.inner.ysource.get_string(txn))
            .unwrap_or_default()
    }

    /// Replace the whole content. Setting the current content is a no-op.
    pub fn set_source(&self, value: &str) -> Result<()> {
        if self.source() == value {
            return Ok(());
        }
        self.write(TransactOptions::undoable(), |txn| {
            replace_text(txn, &self.inner.ysource, value);
            Ok(())
        })
    }

    /// Replace the `[start, end)` range with `value`.
    pub fn update_source(&self, start: u32, end: u32, value: &str) -> Result<()> {
        self.write(TransactOptions::undoable(), |txn| {
            splice_text(txn, &self.inner.ysource, start, end, value)
        })
    }
}

impl Default for YFile {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for YFile {
    type Target = YDocument;

    fn deref(&self) -> &YDocument {
        &self.inner.base
    }
}

impl SharedDocument for YFile {
    type Change = FileChange;

    fn version(&self) -> &'static str {
        FILE_VERSION
    }

    fn document(&self) -> &YDocument {
        &self.inner.base
    }

    fn changed(&self) -> &Signal<FileChange> {
        &self.inner.changed
    }

    fn dispose(&self) {
        if self.inner.base.is_disposed() {
            return;
        }
        self.inner.subscription.borrow_mut().take();
        self.inner.base.release();
        self.inner.changed.clear();
    }
}

impl std::fmt::Debug for YFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YFile").field("base", &self.inner.base).finish()
    }
}
