//! # jupyter-ydoc
//!
//! Collaborative Jupyter document models built on
//! [yrs](https://docs.rs/yrs) (Rust port of Y.js).
//!
//! The layout of the shared types matches the Jupyter collaboration
//! ecosystem, so documents can be synchronized with JupyterLab front ends and
//! with `jupyter_ydoc` on the server.
//!
//! ## What it does
//!
//! - **YFile / YBlob**: plain text and binary files
//! - **YNotebook**: ordered cells plus notebook metadata and format version
//! - **YCell**: code, markdown and raw cells, attached to a notebook or standalone
//! - **Change events**: one structured record per transaction, for local and remote edits
//! - **Undo**: document-wide or per-cell, only for edits marked undoable
//!
//! ## Document layout
//!
//! | Root | Type | Content |
//! |------|------|---------|
//! | `state` | Map | `dirty`, `path`, `hash` and other document state |
//! | `source` | Text / Map | file text, or blob bytes under `bytes` |
//! | `cells` | Array | one Map per cell |
//! | `meta` | Map | `nbformat`, `nbformat_minor`, `metadata` |
//!
//! ## Example
//!
//! ```rust
//! use jupyter_ydoc::{CellContent, SharedDocument, YNotebook};
//!
//! let notebook = YNotebook::new();
//! let cell = notebook.add_cell(CellContent::code("print('hello')")).unwrap();
//!
//! notebook.changed().connect(|change| {
//!     println!("notebook changed: {:?}", change.cells_change.is_some());
//! });
//!
//! cell.set_execution_count(Some(1)).unwrap();
//! let saved = notebook.to_json();
//! assert_eq!(saved.cells[0].execution_count, Some(1));
//! ```

pub mod awareness;
pub mod blob;
pub mod cell;
pub mod config;
pub mod content;
pub mod convert;
pub mod delta;
pub mod document;
pub mod error;
pub mod file;
pub mod keys;
pub mod notebook;
pub mod signal;
pub mod undo;

mod metadata;

pub use awareness::{AwarenessState, ClientAwareness, CursorPosition, SelectionRange, UserInfo};
pub use blob::{YBlob, BLOB_VERSION};
pub use cell::YCell;
pub use config::{DocOptions, NotebookOptions, TransactOptions};
pub use content::{cell_types, CellContent, CellType, NotebookContent};
pub use convert::{any_to_json, json_deep_equal, json_to_any, out_to_json};
pub use delta::{
    BlobChange, CellChange, Delta, DeltaOp, FileChange, KeyAction, MapChange, NotebookChange,
    TextDelta, ValueChange,
};
pub use document::{SharedDocument, YDocument, SILENT_CHANGE_ORIGIN};
pub use error::{Result, YDocError};
pub use file::{YFile, FILE_VERSION};
pub use notebook::{YNotebook, NOTEBOOK_VERSION};
pub use signal::{ListenerId, Signal};
