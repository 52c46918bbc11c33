//! Undo scope shared by a document and the models attached to it.

use std::cell::RefCell;

use uuid::Uuid;
use yrs::branch::Branch;
use yrs::undo::{Options as UndoOptions, UndoManager};
use yrs::{Doc, Origin};

use crate::error::{Result, YDocError};

/// Wraps a yrs [`UndoManager`] tracking one private origin.
///
/// Only transactions opened with [`UndoScope::origin`] land on the undo
/// stack, so non-undoable writes and remote updates are never reverted by a
/// local undo.
pub struct UndoScope {
    manager: RefCell<Option<UndoManager<()>>>,
    origin: Origin,
}

impl UndoScope {
    /// New scope on `doc` tracking its private origin. Containers are added
    /// with [`UndoScope::expand`].
    pub fn new(doc: &Doc, capture_timeout_millis: u64) -> Self {
        let origin = Origin::from(format!("undo-scope-{}", Uuid::new_v4()).as_str());

        let mut options = UndoOptions::default();
        options.capture_timeout_millis = capture_timeout_millis;
        let mut manager = UndoManager::with_options(doc, options);
        manager.include_origin(origin.clone());

        Self {
            manager: RefCell::new(Some(manager)),
            origin,
        }
    }

    /// Origin that marks a transaction as undoable in this scope.
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Capture transactions carrying `origin` as well, and return it.
    pub fn track(&self, origin: &str) -> Origin {
        let origin = Origin::from(origin);
        if let Some(manager) = self.manager.borrow_mut().as_mut() {
            manager.include_origin(origin.clone());
        }
        origin
    }

    /// Add a shared container to the scope.
    pub fn expand<T: AsRef<Branch>>(&self, scope: &T) {
        if let Some(manager) = self.manager.borrow_mut().as_mut() {
            manager.expand_scope(scope);
        }
    }

    /// Undo the last step. Errors once released.
    pub fn undo(&self) -> Result<bool> {
        match self.manager.borrow_mut().as_mut() {
            Some(manager) => manager
                .try_undo()
                .map_err(|e| YDocError::TransactionError(e.to_string())),
            None => Err(YDocError::Disposed),
        }
    }

    /// Redo the last undone step. Errors once released.
    pub fn redo(&self) -> Result<bool> {
        match self.manager.borrow_mut().as_mut() {
            Some(manager) => manager
                .try_redo()
                .map_err(|e| YDocError::TransactionError(e.to_string())),
            None => Err(YDocError::Disposed),
        }
    }

    /// Whether there is a step to undo.
    pub fn can_undo(&self) -> bool {
        self.manager
            .borrow()
            .as_ref()
            .is_some_and(|manager| manager.can_undo())
    }

    /// Whether there is a step to redo.
    pub fn can_redo(&self) -> bool {
        self.manager
            .borrow()
            .as_ref()
            .is_some_and(|manager| manager.can_redo())
    }

    /// Drop both stacks.
    pub fn clear(&self) {
        if let Some(manager) = self.manager.borrow_mut().as_mut() {
            manager.clear();
        }
    }

    /// Close the current capture group; the next change starts a new undo step.
    pub fn stop_capturing(&self) {
        if let Some(manager) = self.manager.borrow_mut().as_mut() {
            manager.reset();
        }
    }

    pub(crate) fn release(&self) {
        self.manager.borrow_mut().take();
    }

    /// Whether the scope was released with its document.
    pub fn is_released(&self) -> bool {
        self.manager.borrow().is_none()
    }
}

impl std::fmt::Debug for UndoScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoScope")
            .field("can_undo", &self.can_undo())
            .field("can_redo", &self.can_redo())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yrs::{GetString, Text, Transact, WriteTxn};

    #[test]
    fn test_only_tracked_origin_is_undoable() {
        let doc = Doc::new();
        let text = {
            let mut txn = doc.transact_mut();
            txn.get_or_insert_text("source")
        };
        let scope = UndoScope::new(&doc, 0);
        scope.expand(&text);

        {
            let mut txn = doc.transact_mut_with(scope.origin().clone());
            text.push(&mut txn, "tracked");
        }
        {
            let mut txn = doc.transact_mut_with("elsewhere");
            text.push(&mut txn, " untracked");
        }

        assert!(scope.can_undo());
        assert!(scope.undo().unwrap());
        assert_eq!(text.get_string(&doc.transact()), " untracked");
        assert!(scope.can_redo());
    }

    #[test]
    fn test_tracked_custom_origin() {
        let doc = Doc::new();
        let text = {
            let mut txn = doc.transact_mut();
            txn.get_or_insert_text("source")
        };
        let scope = UndoScope::new(&doc, 0);
        scope.expand(&text);

        {
            let mut txn = doc.transact_mut_with(scope.track("editor"));
            text.push(&mut txn, "typed");
        }

        assert!(scope.undo().unwrap());
        assert_eq!(text.get_string(&doc.transact()), "");
    }

    #[test]
    fn test_release_disables_scope() {
        let doc = Doc::new();
        let scope = UndoScope::new(&doc, 0);
        scope.release();
        assert!(scope.is_released());
        assert!(!scope.can_undo());
        assert!(matches!(scope.undo(), Err(YDocError::Disposed)));
    }
}
