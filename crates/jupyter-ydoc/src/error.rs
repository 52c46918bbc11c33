use thiserror::Error;

#[derive(Error, Debug)]
pub enum YDocError {
    #[error("Invalid cell type: {0}")]
    InvalidCellType(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: u32, len: u32 },

    #[error("Output {0} is not a stream output")]
    NotAStreamOutput(u32),

    #[error("Operation not supported by this cell type: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Shared model has been disposed")]
    Disposed,

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Y.Doc transaction error: {0}")]
    TransactionError(String),

    #[error("Awareness error: {0}")]
    AwarenessError(String),
}

pub type Result<T> = std::result::Result<T, YDocError>;
