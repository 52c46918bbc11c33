//! Outputs and execution fields of code cells.
//!
//! All writes here are excluded from undo: they come from the kernel, not
//! from the author.

use serde_json::Value;
use yrs::{
    Array, ArrayPrelim, ArrayRef, Map, MapPrelim, MapRef, Out, ReadTxn, Text, TextPrelim, TextRef,
    TransactionMut,
};

use super::{execution_count_any, YCell};
use crate::config::TransactOptions;
use crate::content::CellType;
use crate::convert::{json_to_any, out_to_i64, out_to_json, out_to_string};
use crate::error::{Result, YDocError};
use crate::keys;

pub(crate) const IDLE: &str = "idle";

fn joined_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(lines) => lines.iter().filter_map(Value::as_str).collect(),
        other => other.to_string(),
    }
}

/// Insert one output at `index`.
///
/// The `text` of a stream output becomes shared text so that later appends
/// from several producers merge instead of overwriting each other.
pub(crate) fn insert_output(txn: &mut TransactionMut, youtputs: &ArrayRef, index: u32, output: &Value) {
    let Value::Object(fields) = output else {
        youtputs.insert(txn, index, json_to_any(output));
        return;
    };
    let is_stream = fields.get(keys::OUTPUT_TYPE).and_then(Value::as_str) == Some(keys::STREAM);
    let youtput = youtputs.insert(txn, index, MapPrelim::default());
    for (key, value) in fields {
        if is_stream && key == keys::TEXT {
            youtput.insert(txn, keys::TEXT, TextPrelim::new(joined_text(value).as_str()));
        } else {
            youtput.insert(txn, key.as_str(), json_to_any(value));
        }
    }
}

pub(crate) fn read_outputs<T: ReadTxn>(ymodel: &MapRef, txn: &T) -> Vec<Value> {
    match ymodel.get(txn, keys::OUTPUTS).map(|v| out_to_json(&v, txn)) {
        Some(Value::Array(outputs)) => outputs,
        _ => Vec::new(),
    }
}

impl YCell {
    fn require_code(&self, operation: &'static str) -> Result<()> {
        self.require(*self.cell_type() == CellType::Code, operation)
    }

    /// `None` until the cell is executed, and for non-code cells.
    pub fn execution_count(&self) -> Option<i64> {
        if *self.cell_type() != CellType::Code {
            return None;
        }
        self.read(|txn| {
            self.inner
                .ymodel
                .get(txn, keys::EXECUTION_COUNT)
                .and_then(|v| out_to_i64(&v))
        })
        .flatten()
    }

    /// Set or clear the execution count. Equal values are skipped.
    pub fn set_execution_count(&self, count: Option<i64>) -> Result<()> {
        self.require_code("set_execution_count")?;
        if self.execution_count() == count {
            return Ok(());
        }
        self.write(TransactOptions::not_undoable(), |txn| {
            self.inner
                .ymodel
                .insert(txn, keys::EXECUTION_COUNT, execution_count_any(count));
            Ok(())
        })
    }

    /// Kernel-side state of the cell, `"idle"` unless set. Never serialized.
    pub fn execution_state(&self) -> Option<String> {
        if *self.cell_type() != CellType::Code {
            return None;
        }
        let state = self
            .read(|txn| {
                self.inner
                    .ymodel
                    .get(txn, keys::EXECUTION_STATE)
                    .and_then(|v| out_to_string(&v, txn))
            })
            .flatten();
        Some(state.unwrap_or_else(|| IDLE.to_string()))
    }

    /// Set the transient execution state, e.g. `busy` or `idle`.
    pub fn set_execution_state(&self, state: &str) -> Result<()> {
        self.require_code("set_execution_state")?;
        if self.execution_state().as_deref() == Some(state) {
            return Ok(());
        }
        self.write(TransactOptions::not_undoable(), |txn| {
            self.inner.ymodel.insert(txn, keys::EXECUTION_STATE, state);
            Ok(())
        })
    }

    /// The shared output sequence.
    pub fn youtputs(&self) -> Option<ArrayRef> {
        self.read(|txn| match self.inner.ymodel.get(txn, keys::OUTPUTS) {
            Some(Out::YArray(outputs)) => Some(outputs),
            _ => None,
        })
        .flatten()
    }

    /// Outputs as JSON; stream text is rendered as a string.
    pub fn outputs(&self) -> Vec<Value> {
        self.read(|txn| read_outputs(&self.inner.ymodel, txn))
            .unwrap_or_default()
    }

    // Outputs stored as a plain JSON list are converted on first write.
    fn outputs_array(&self, txn: &mut TransactionMut) -> ArrayRef {
        if let Some(Out::YArray(outputs)) = self.inner.ymodel.get(txn, keys::OUTPUTS) {
            return outputs;
        }
        let legacy = read_outputs(&self.inner.ymodel, txn);
        let youtputs = self
            .inner
            .ymodel
            .insert(txn, keys::OUTPUTS, ArrayPrelim::default());
        for (index, output) in legacy.iter().enumerate() {
            insert_output(txn, &youtputs, index as u32, output);
        }
        youtputs
    }

    /// Replace all outputs.
    pub fn set_outputs(&self, outputs: &[Value]) -> Result<()> {
        self.require_code("set_outputs")?;
        self.write(TransactOptions::not_undoable(), |txn| {
            let youtputs = self.outputs_array(txn);
            let len = youtputs.len(txn);
            if len > 0 {
                youtputs.remove_range(txn, 0, len);
            }
            for (index, output) in outputs.iter().enumerate() {
                insert_output(txn, &youtputs, index as u32, output);
            }
            Ok(())
        })
    }

    /// Replace the output at `index`.
    pub fn set_output(&self, index: u32, output: &Value) -> Result<()> {
        self.require_code("set_output")?;
        self.write(TransactOptions::not_undoable(), |txn| {
            let youtputs = self.outputs_array(txn);
            let len = youtputs.len(txn);
            if index >= len {
                return Err(YDocError::IndexOutOfBounds { index, len });
            }
            youtputs.remove(txn, index);
            insert_output(txn, &youtputs, index, output);
            Ok(())
        })
    }

    /// Replace outputs `[start, end)`; `end` is clamped to the current length.
    pub fn update_outputs(&self, start: u32, end: u32, outputs: &[Value]) -> Result<()> {
        self.update_outputs_with(TransactOptions::not_undoable(), start, end, outputs)
    }

    /// [`update_outputs`](Self::update_outputs) with an explicit origin, e.g.
    /// [`SILENT_CHANGE_ORIGIN`](crate::SILENT_CHANGE_ORIGIN).
    pub fn update_outputs_with(
        &self,
        options: TransactOptions,
        start: u32,
        end: u32,
        outputs: &[Value],
    ) -> Result<()> {
        self.require_code("update_outputs")?;
        self.write(options, |txn| {
            let youtputs = self.outputs_array(txn);
            let len = youtputs.len(txn);
            let end = end.min(len);
            if start > end {
                return Err(YDocError::IndexOutOfBounds { index: start, len });
            }
            if end > start {
                youtputs.remove_range(txn, start, end - start);
            }
            for (offset, output) in outputs.iter().enumerate() {
                insert_output(txn, &youtputs, start + offset as u32, output);
            }
            Ok(())
        })
    }

    /// Remove every output.
    pub fn clear_outputs(&self) -> Result<()> {
        self.require_code("clear_outputs")?;
        if self.youtputs().is_some() && self.outputs().is_empty() {
            return Ok(());
        }
        self.write(TransactOptions::not_undoable(), |txn| {
            let youtputs = self.outputs_array(txn);
            let len = youtputs.len(txn);
            if len > 0 {
                youtputs.remove_range(txn, 0, len);
            }
            Ok(())
        })
    }

    fn stream_text(&self, txn: &TransactionMut, index: u32) -> Result<TextRef> {
        let Some(Out::YArray(youtputs)) = self.inner.ymodel.get(txn, keys::OUTPUTS) else {
            return Err(YDocError::IndexOutOfBounds { index, len: 0 });
        };
        let len = youtputs.len(txn);
        match youtputs.get(txn, index) {
            None => Err(YDocError::IndexOutOfBounds { index, len }),
            Some(Out::YMap(output)) => match output.get(txn, keys::TEXT) {
                Some(Out::YText(text)) => Ok(text),
                _ => Err(YDocError::NotAStreamOutput(index)),
            },
            Some(_) => Err(YDocError::NotAStreamOutput(index)),
        }
    }

    /// Append to the text of the stream output at `index`, in place.
    pub fn append_stream_output(&self, index: u32, text: &str) -> Result<()> {
        self.require_code("append_stream_output")?;
        self.write(TransactOptions::not_undoable(), |txn| {
            let ytext = self.stream_text(txn, index)?;
            ytext.push(txn, text);
            Ok(())
        })
    }

    /// Truncate the text of the stream output at `index` to `start` units.
    pub fn remove_stream_output(&self, index: u32, start: u32) -> Result<()> {
        self.require_code("remove_stream_output")?;
        self.write(TransactOptions::not_undoable(), |txn| {
            let ytext = self.stream_text(txn, index)?;
            let len = ytext.len(txn);
            if start > len {
                return Err(YDocError::IndexOutOfBounds { index: start, len });
            }
            if len > start {
                ytext.remove_range(txn, start, len - start);
            }
            Ok(())
        })
    }

    /// Append an input request and return its index.
    ///
    /// The reply is typed into the shared `value` text.
    pub fn add_stdin_output(&self, prompt: &str, password: bool) -> Result<u32> {
        self.require_code("add_stdin_output")?;
        self.write(TransactOptions::not_undoable(), |txn| {
            let youtputs = self.outputs_array(txn);
            let index = youtputs.len(txn);
            let youtput = youtputs.insert(txn, index, MapPrelim::default());
            youtput.insert(txn, keys::OUTPUT_TYPE, keys::STDIN);
            youtput.insert(txn, keys::SUBMITTED, false);
            youtput.insert(txn, keys::PASSWORD, password);
            youtput.insert(txn, keys::PROMPT, prompt);
            youtput.insert(txn, keys::VALUE, TextPrelim::new(""));
            Ok(index)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::CellContent;
    use crate::delta::{CellChange, DeltaOp};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use yrs::branch::{Branch, BranchID};

    fn code_cell() -> YCell {
        YCell::standalone(CellContent::code("print('hi')")).unwrap()
    }

    fn record(cell: &YCell) -> Rc<RefCell<Vec<CellChange>>> {
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        cell.changed().connect(move |c| sink.borrow_mut().push(c.clone()));
        changes
    }

    fn branch_id(map: &MapRef) -> BranchID {
        let branch: &Branch = map.as_ref();
        branch.id()
    }

    fn stream(text: &str) -> Value {
        json!({"output_type": "stream", "name": "stdout", "text": text})
    }

    #[test]
    fn test_execution_count() {
        let cell = code_cell();
        assert_eq!(cell.execution_count(), None);
        let changes = record(&cell);

        cell.set_execution_count(Some(3)).unwrap();
        cell.set_execution_count(Some(3)).unwrap();

        assert_eq!(cell.execution_count(), Some(3));
        assert_eq!(cell.to_json()["execution_count"], json!(3));
        let changes = changes.borrow();
        assert_eq!(changes.len(), 1);
        let change = changes[0].execution_count_change.as_ref().unwrap();
        assert_eq!((change.old_value, change.new_value), (None, Some(3)));
        assert!(!cell.can_undo());
    }

    #[test]
    fn test_execution_state() {
        let cell = code_cell();
        assert_eq!(cell.execution_state().as_deref(), Some("idle"));
        cell.set_execution_state("running").unwrap();
        assert_eq!(cell.execution_state().as_deref(), Some("running"));
    }

    #[test]
    fn test_stream_text_is_shared() {
        let cell = YCell::standalone(
            CellContent::code("").with_outputs(vec![json!({
                "output_type": "stream",
                "name": "stdout",
                "text": ["a\n", "b\n"]
            })]),
        )
        .unwrap();
        let youtputs = cell.youtputs().unwrap();
        let first_output = || {
            cell.transact(|txn| match youtputs.get(txn, 0) {
                Some(Out::YMap(map)) => Some(branch_id(&map)),
                _ => None,
            })
            .unwrap()
            .unwrap()
        };
        let before = first_output();
        let changes = record(&cell);

        cell.append_stream_output(0, "c\n").unwrap();

        assert_eq!(cell.outputs()[0]["text"], "a\nb\nc\n");
        assert_eq!(first_output(), before);

        let changes = changes.borrow();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].stream_output_change,
            Some(vec![DeltaOp::Retain(4), DeltaOp::Insert("c\n".into())])
        );
        assert!(changes[0].outputs_change.is_none());
    }

    #[test]
    fn test_remove_stream_output() {
        let cell = code_cell();
        cell.set_outputs(&[stream("hello world")]).unwrap();
        cell.remove_stream_output(0, 5).unwrap();
        assert_eq!(cell.outputs()[0]["text"], "hello");
        assert!(matches!(
            cell.remove_stream_output(0, 9),
            Err(YDocError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_stream_ops_need_stream_output() {
        let cell = code_cell();
        cell.set_outputs(&[json!({"output_type": "execute_result", "data": {}})])
            .unwrap();
        assert!(matches!(
            cell.append_stream_output(0, "x"),
            Err(YDocError::NotAStreamOutput(0))
        ));
        assert!(matches!(
            cell.append_stream_output(4, "x"),
            Err(YDocError::IndexOutOfBounds { index: 4, len: 1 })
        ));
    }

    #[test]
    fn test_update_outputs_clamps_end() {
        let cell = code_cell();
        cell.set_outputs(&[stream("a"), stream("b"), stream("c")])
            .unwrap();
        let changes = record(&cell);

        cell.update_outputs(1, 10, &[stream("z")]).unwrap();

        let texts: Vec<_> = cell.outputs().iter().map(|o| o["text"].clone()).collect();
        assert_eq!(texts, vec![json!("a"), json!("z")]);
        let delta = changes.borrow()[0].outputs_change.clone().unwrap();
        assert_eq!(delta[0], DeltaOp::Retain(1));
        assert!(delta.contains(&DeltaOp::Delete(2)));

        assert!(cell.update_outputs(5, 6, &[]).is_err());
    }

    #[test]
    fn test_set_output_and_clear() {
        let cell = code_cell();
        cell.set_outputs(&[stream("a"), stream("b")]).unwrap();
        cell.set_output(1, &json!({"output_type": "error", "ename": "E"}))
            .unwrap();
        assert_eq!(cell.outputs()[1]["ename"], "E");
        assert!(cell.set_output(2, &stream("x")).is_err());

        cell.clear_outputs().unwrap();
        assert!(cell.outputs().is_empty());
        assert_eq!(cell.to_json()["outputs"], json!([]));
    }

    #[test]
    fn test_add_stdin_output() {
        let cell = code_cell();
        cell.set_outputs(&[stream("Enter:")]).unwrap();
        let index = cell.add_stdin_output("Password:", true).unwrap();
        assert_eq!(index, 1);
        assert_eq!(
            cell.outputs()[1],
            json!({
                "output_type": "stdin",
                "submitted": false,
                "password": true,
                "prompt": "Password:",
                "value": ""
            })
        );
    }

    #[test]
    fn test_code_only_operations() {
        let cell = YCell::standalone(CellContent::markdown("# md")).unwrap();
        assert_eq!(cell.execution_count(), None);
        assert!(cell.outputs().is_empty());
        assert!(matches!(
            cell.set_outputs(&[]),
            Err(YDocError::UnsupportedOperation("set_outputs"))
        ));
        assert!(cell.set_execution_count(Some(1)).is_err());
    }
}
