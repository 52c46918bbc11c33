//! Binary document: one byte buffer stored under a shared map.

use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::atomic::Ordering;

use yrs::{Any, Map, MapRef, Observable, Out, Subscription, Transact, WriteTxn};

use crate::config::{DocOptions, TransactOptions};
use crate::delta::{value_change, BlobChange, MapChange, ValueChange};
use crate::document::{group_by_txn, is_silent, DocContext, EventQueue, Flush, SharedDocument, YDocument};
use crate::error::Result;
use crate::keys;
use crate::signal::Signal;

pub const BLOB_VERSION: &str = "2.0.0";

fn out_to_bytes(value: &Out) -> Option<Vec<u8>> {
    match value {
        Out::Any(Any::Buffer(bytes)) => Some(bytes.to_vec()),
        _ => None,
    }
}

enum BlobEvent {
    State(Vec<MapChange>),
    Source(ValueChange<Vec<u8>>),
}

struct BlobInner {
    base: YDocument,
    ysource: MapRef,
    queue: EventQueue<BlobEvent>,
    changed: Signal<BlobChange>,
    subscription: RefCell<Option<Subscription>>,
}

impl Flush for BlobInner {
    fn flush(&self) -> bool {
        let pending = self.queue.drain();
        if pending.is_empty() {
            return false;
        }
        for (silent, events) in group_by_txn(pending) {
            let mut change = BlobChange::default();
            for event in events {
                match event {
                    BlobEvent::State(keys) => {
                        change.state_change.get_or_insert_with(Vec::new).extend(keys)
                    }
                    BlobEvent::Source(bytes) => change.source_change = Some(bytes),
                }
            }
            if !silent && change != BlobChange::default() {
                self.changed.emit(&change);
            }
        }
        true
    }
}

/// A collaborative binary file.
#[derive(Clone)]
pub struct YBlob {
    inner: Rc<BlobInner>,
}

impl YBlob {
    pub fn new() -> Self {
        Self::with_options(DocOptions::default())
    }

    /// Empty blob on a document built from `options`.
    pub fn with_options(options: DocOptions) -> Self {
        let ctx = DocContext::new(options);
        let queue = EventQueue::new();

        let state_queue = queue.clone();
        let base = YDocument::new(ctx.clone(), move |seq, silent, keys| {
            state_queue.push(seq, silent, BlobEvent::State(keys))
        });

        let ysource = {
            let mut txn = ctx.doc().transact_mut();
            txn.get_or_insert_map(keys::SOURCE)
        };
        base.undo_scope().expand(&ysource);

        let seq = ctx.txn_seq();
        let source_queue = queue.clone();
        let subscription = ysource.observe(move |txn, event| {
            if let Some(change) = event.keys(txn).get(keys::BYTES) {
                source_queue.push(
                    seq.load(Ordering::SeqCst),
                    is_silent(txn),
                    BlobEvent::Source(value_change(change, out_to_bytes)),
                );
            }
        });

        let inner = Rc::new(BlobInner {
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

    /// The stored bytes; empty when nothing was set.
    pub fn source(&self) -> Vec<u8> {
        self.ctx()
            .read(|txn| {
                self.inner
                    .ysource
                    .get(txn, keys::BYTES)
                    .and_then(|v| out_to_bytes(&v))
            })
            .flatten()
            .unwrap_or_default()
    }

    /// Replace the stored bytes. Setting the current content is a no-op.
    pub fn set_source(&self, bytes: &[u8]) -> Result<()> {
        if self.source() == bytes {
            return Ok(());
        }
        self.write(TransactOptions::undoable(), |txn| {
            self.inner
                .ysource
                .insert(txn, keys::BYTES, Any::Buffer(bytes.into()));
            Ok(())
        })
    }
}

impl Default for YBlob {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for YBlob {
    type Target = YDocument;

    fn deref(&self) -> &YDocument {
        &self.inner.base
    }
}

impl SharedDocument for YBlob {
    type Change = BlobChange;

    fn version(&self) -> &'static str {
        BLOB_VERSION
    }

    fn document(&self) -> &YDocument {
        &self.inner.base
    }

    fn changed(&self) -> &Signal<BlobChange> {
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

impl std::fmt::Debug for YBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YBlob").field("base", &self.inner.base).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_set_and_get() {
        let blob = YBlob::new();
        assert!(blob.source().is_empty());

        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        blob.changed().connect(move |c: &BlobChange| sink.borrow_mut().push(c.clone()));

        blob.set_source(&[0xde, 0xad]).unwrap();
        blob.set_source(&[0xde, 0xad]).unwrap();
        blob.set_source(&[0xbe, 0xef]).unwrap();

        assert_eq!(blob.source(), vec![0xbe, 0xef]);
        let changes = changes.borrow();
        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes[1].source_change,
            Some(ValueChange {
                old_value: Some(vec![0xde, 0xad]),
                new_value: Some(vec![0xbe, 0xef]),
            })
        );
        assert_eq!(blob.version(), "2.0.0");
    }

    #[test]
    fn test_blob_replicates() {
        let a = YBlob::new();
        let b = YBlob::new();
        a.set_source(b"payload").unwrap();
        b.apply_update(&a.encode_state_as_update()).unwrap();
        assert_eq!(b.source(), b"payload".to_vec());
    }
}
