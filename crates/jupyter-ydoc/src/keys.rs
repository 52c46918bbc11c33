//! Y.Doc schema keys.
//!
//! ```text
//! Y.Doc {
//!   state: Y.Map,
//!   cells: Y.Array<Y.Map{
//!     id: string,
//!     cell_type: "code" | "markdown" | "raw",
//!     source: Y.Text,
//!     metadata: Y.Map,
//!     attachments: object (markdown and raw cells),
//!     outputs: Y.Array<Y.Map> (code cells),
//!     execution_count: number | null (code cells),
//!     execution_state: "idle" | "running" (code cells)
//!   }>,
//!   meta: Y.Map{ nbformat: number, nbformat_minor: number, metadata: Y.Map },
//!   source: Y.Text (files) | Y.Map{ bytes: Uint8Array } (blobs)
//! }
//! ```

// Root containers
pub const STATE: &str = "state";
pub const CELLS: &str = "cells";
pub const META: &str = "meta";
pub const SOURCE: &str = "source";
/// Root map of a cell that does not belong to a notebook.
pub const STANDALONE_CELL: &str = "cell";

// Notebook meta fields
pub const METADATA: &str = "metadata";
pub const NBFORMAT: &str = "nbformat";
pub const NBFORMAT_MINOR: &str = "nbformat_minor";

// Cell fields
pub const ID: &str = "id";
pub const CELL_TYPE: &str = "cell_type";
pub const OUTPUTS: &str = "outputs";
pub const EXECUTION_COUNT: &str = "execution_count";
pub const EXECUTION_STATE: &str = "execution_state";
pub const ATTACHMENTS: &str = "attachments";

// Cell metadata coupled with `jupyter.outputs_hidden`
pub const COLLAPSED: &str = "collapsed";
pub const JUPYTER: &str = "jupyter";
pub const OUTPUTS_HIDDEN: &str = "outputs_hidden";

// Output fields
pub const OUTPUT_TYPE: &str = "output_type";
pub const TEXT: &str = "text";
pub const STREAM: &str = "stream";
pub const STDIN: &str = "stdin";
pub const SUBMITTED: &str = "submitted";
pub const PASSWORD: &str = "password";
pub const PROMPT: &str = "prompt";
pub const VALUE: &str = "value";

// Blob fields
pub const BYTES: &str = "bytes";
