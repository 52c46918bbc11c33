//! Plain JSON form of notebooks and cells (the `.ipynb` wire format).

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map as JsonMap, Value};

use crate::error::{Result, YDocError};

/// Default major format version of new notebooks.
pub const NBFORMAT: u32 = 4;

/// Default minor format version of new notebooks.
pub const NBFORMAT_MINOR: u32 = 5;

/// Cell type constants matching nbformat
pub mod cell_types {
    pub const CODE: &str = "code";
    pub const MARKDOWN: &str = "markdown";
    pub const RAW: &str = "raw";
}

/// Discriminator of a cell.
///
/// `Unrecognized` only comes out of documents written by other peers; it is
/// never accepted when building a cell explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellType {
    Code,
    Markdown,
    Raw,
    Unrecognized(String),
}

impl CellType {
    pub fn as_str(&self) -> &str {
        match self {
            CellType::Code => cell_types::CODE,
            CellType::Markdown => cell_types::MARKDOWN,
            CellType::Raw => cell_types::RAW,
            CellType::Unrecognized(other) => other,
        }
    }

    /// Markdown and raw cells carry attachments.
    pub fn has_attachments(&self) -> bool {
        matches!(self, CellType::Markdown | CellType::Raw)
    }

    /// Classify a stored discriminator without rejecting unknown values.
    pub(crate) fn from_stored(value: &str) -> Self {
        value
            .parse()
            .unwrap_or_else(|_| CellType::Unrecognized(value.to_string()))
    }
}

impl FromStr for CellType {
    type Err = YDocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            cell_types::CODE => Ok(CellType::Code),
            cell_types::MARKDOWN => Ok(CellType::Markdown),
            cell_types::RAW => Ok(CellType::Raw),
            other => Err(YDocError::InvalidCellType(other.to_string())),
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source text as found in `.ipynb` files: a string or a list of lines.
#[derive(Deserialize)]
#[serde(untagged)]
enum MultilineString {
    Joined(String),
    Lines(Vec<String>),
}

impl MultilineString {
    fn join(self) -> String {
        match self {
            MultilineString::Joined(s) => s,
            MultilineString::Lines(lines) => lines.concat(),
        }
    }
}

fn json_to_i64(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

/// One cell in plain JSON form.
///
/// Missing ids are generated when the cell is materialized in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct CellContent {
    pub id: Option<String>,
    pub cell_type: CellType,
    pub source: String,
    pub metadata: JsonMap<String, Value>,
    /// Markdown and raw cells only.
    pub attachments: Option<JsonMap<String, Value>>,
    /// Code cells only.
    pub outputs: Vec<Value>,
    /// Code cells only. `None` until the cell has been executed.
    pub execution_count: Option<i64>,
}

impl CellContent {
    fn new(cell_type: CellType, source: impl Into<String>) -> Self {
        Self {
            id: None,
            cell_type,
            source: source.into(),
            metadata: JsonMap::new(),
            attachments: None,
            outputs: Vec::new(),
            execution_count: None,
        }
    }

    /// Code cell with no outputs and no execution count.
    pub fn code(source: impl Into<String>) -> Self {
        Self::new(CellType::Code, source)
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Self::new(CellType::Markdown, source)
    }

    pub fn raw(source: impl Into<String>) -> Self {
        Self::new(CellType::Raw, source)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: JsonMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<Value>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_execution_count(mut self, count: i64) -> Self {
        self.execution_count = Some(count);
        self
    }

    pub fn with_attachments(mut self, attachments: JsonMap<String, Value>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// Parse one cell. Unknown `cell_type` values are rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(YDocError::MissingField("cell_type".into()));
        };

        let cell_type: CellType = match obj.get("cell_type") {
            Some(Value::String(s)) => s.parse()?,
            _ => return Err(YDocError::MissingField("cell_type".into())),
        };

        let id = match obj.remove("id") {
            Some(Value::String(id)) => Some(id),
            _ => None,
        };
        let source = match obj.remove("source") {
            Some(source) => serde_json::from_value::<MultilineString>(source)?.join(),
            None => String::new(),
        };
        let metadata = match obj.remove("metadata") {
            Some(Value::Object(metadata)) => metadata,
            _ => JsonMap::new(),
        };
        let attachments = match obj.remove("attachments") {
            Some(Value::Object(attachments)) if cell_type.has_attachments() => Some(attachments),
            _ => None,
        };
        let outputs = match obj.remove("outputs") {
            Some(Value::Array(outputs)) if cell_type == CellType::Code => outputs,
            _ => Vec::new(),
        };
        let execution_count = obj
            .get("execution_count")
            .filter(|_| cell_type == CellType::Code)
            .and_then(json_to_i64);

        Ok(Self {
            id,
            cell_type,
            source,
            metadata,
            attachments,
            outputs,
            execution_count,
        })
    }

    /// The nbformat JSON shape of this cell.
    pub fn to_value(&self) -> Value {
        let mut obj = JsonMap::new();
        if let Some(id) = &self.id {
            obj.insert("id".into(), Value::String(id.clone()));
        }
        obj.insert("cell_type".into(), json!(self.cell_type.as_str()));
        obj.insert("source".into(), Value::String(self.source.clone()));
        obj.insert("metadata".into(), Value::Object(self.metadata.clone()));
        match &self.cell_type {
            CellType::Code => {
                obj.insert("outputs".into(), Value::Array(self.outputs.clone()));
                obj.insert("execution_count".into(), json!(self.execution_count));
            }
            CellType::Markdown | CellType::Raw => {
                if let Some(attachments) = self.attachments.as_ref().filter(|a| !a.is_empty()) {
                    obj.insert("attachments".into(), Value::Object(attachments.clone()));
                }
            }
            CellType::Unrecognized(_) => {}
        }
        Value::Object(obj)
    }
}

impl Serialize for CellContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CellContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        CellContent::from_value(value).map_err(D::Error::custom)
    }
}

/// A whole notebook in plain JSON form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotebookContent {
    pub cells: Vec<CellContent>,
    pub metadata: JsonMap<String, Value>,
    pub nbformat: u32,
    pub nbformat_minor: u32,
}

impl NotebookContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a notebook, rejecting cells with an unknown type.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(YDocError::MissingField("cells".into()));
        };

        let cells = match obj.remove("cells") {
            Some(Value::Array(cells)) => cells
                .into_iter()
                .map(CellContent::from_value)
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(YDocError::MissingField("cells".into())),
            None => Vec::new(),
        };
        let metadata = match obj.remove("metadata") {
            Some(Value::Object(metadata)) => metadata,
            _ => JsonMap::new(),
        };
        let version = |key: &str, default: u32| {
            obj.get(key)
                .and_then(json_to_i64)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(default)
        };

        Ok(Self {
            nbformat: version("nbformat", NBFORMAT),
            nbformat_minor: version("nbformat_minor", NBFORMAT_MINOR),
            cells,
            metadata,
        })
    }

    /// Parse an `.ipynb` document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Serialize back to `.ipynb` JSON.
    pub fn to_value(&self) -> Value {
        json!({
            "cells": self.cells.iter().map(CellContent::to_value).collect::<Vec<_>>(),
            "metadata": self.metadata,
            "nbformat": self.nbformat,
            "nbformat_minor": self.nbformat_minor,
        })
    }
}

impl Default for NotebookContent {
    fn default() -> Self {
        Self {
            cells: Vec::new(),
            metadata: JsonMap::new(),
            nbformat: NBFORMAT,
            nbformat_minor: NBFORMAT_MINOR,
        }
    }
}

impl<'de> Deserialize<'de> for NotebookContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        NotebookContent::from_value(value).map_err(D::Error::custom)
    }
}
