//! Options for creating shared documents and running transactions.

use yrs::OffsetKind;

/// Default undo capture window. Zero makes every transaction its own undo step.
pub const DEFAULT_CAPTURE_TIMEOUT_MILLIS: u64 = 0;

/// Options for the underlying `Y.Doc`.
///
/// # Example
///
/// ```rust
/// use jupyter_ydoc::DocOptions;
///
/// let options = DocOptions::new().with_client_id(42);
/// assert_eq!(options.client_id, Some(42));
/// ```
#[derive(Debug, Clone)]
pub struct DocOptions {
    /// Unit of text indices. UTF-16 matches the JavaScript front end.
    pub offset_kind: OffsetKind,
    /// Undo capture window in milliseconds.
    pub capture_timeout_millis: u64,
    /// Fixed client id, for deterministic replicas. Random when `None`.
    pub client_id: Option<u64>,
}

impl DocOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset_kind(mut self, offset_kind: OffsetKind) -> Self {
        self.offset_kind = offset_kind;
        self
    }

    /// Window in which consecutive undoable changes merge into one step.
    pub fn with_capture_timeout(mut self, millis: u64) -> Self {
        self.capture_timeout_millis = millis;
        self
    }

    /// Fixed client id, mostly for tests and reproducible replicas.
    pub fn with_client_id(mut self, client_id: u64) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub(crate) fn yrs_options(&self) -> yrs::Options {
        let mut options = match self.client_id {
            Some(id) => yrs::Options::with_client_id(id),
            None => yrs::Options::default(),
        };
        options.offset_kind = self.offset_kind;
        options
    }
}

impl Default for DocOptions {
    fn default() -> Self {
        Self {
            offset_kind: OffsetKind::Utf16,
            capture_timeout_millis: DEFAULT_CAPTURE_TIMEOUT_MILLIS,
            client_id: None,
        }
    }
}

/// Options for a [`YNotebook`](crate::YNotebook).
#[derive(Debug, Clone)]
pub struct NotebookOptions {
    pub doc: DocOptions,
    /// When `false`, every cell gets an undo history of its own.
    pub document_wide_undo: bool,
}

impl NotebookOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doc_options(mut self, doc: DocOptions) -> Self {
        self.doc = doc;
        self
    }

    pub fn with_document_wide_undo(mut self, enabled: bool) -> Self {
        self.document_wide_undo = enabled;
        self
    }
}

impl Default for NotebookOptions {
    fn default() -> Self {
        Self {
            doc: DocOptions::default(),
            document_wide_undo: true,
        }
    }
}

/// Options for a single transaction.
#[derive(Debug, Clone)]
pub struct TransactOptions {
    /// Record the transaction on the undo stack.
    pub undoable: bool,
    /// Origin attached to the transaction. An undoable transaction with an
    /// origin adds that origin to the undo scope for good.
    pub origin: Option<String>,
}

impl TransactOptions {
    /// An undoable transaction under the scope's private origin.
    pub fn undoable() -> Self {
        Self {
            undoable: true,
            origin: None,
        }
    }

    /// A transaction that never lands on the undo stack.
    pub fn not_undoable() -> Self {
        Self {
            undoable: false,
            origin: None,
        }
    }

    /// A non-undoable transaction carrying `origin`.
    pub fn with_origin(origin: impl Into<String>) -> Self {
        Self {
            undoable: false,
            origin: Some(origin.into()),
        }
    }

    /// An undoable transaction carrying `origin`, for editors that tag their writes.
    pub fn undoable_with_origin(origin: impl Into<String>) -> Self {
        Self {
            undoable: true,
            origin: Some(origin.into()),
        }
    }
}

impl Default for TransactOptions {
    fn default() -> Self {
        Self::undoable()
    }
}
