//! Attachments of markdown and raw cells.

use serde_json::{Map as JsonMap, Value};
use yrs::Map;

use super::YCell;
use crate::config::TransactOptions;
use crate::convert::{json_deep_equal, json_to_any, out_to_json};
use crate::error::Result;
use crate::keys;

impl YCell {
    /// `None` when the cell has no attachments or cannot carry any.
    pub fn attachments(&self) -> Option<JsonMap<String, Value>> {
        if !self.cell_type().has_attachments() {
            return None;
        }
        self.read(|txn| {
            match self
                .inner
                .ymodel
                .get(txn, keys::ATTACHMENTS)
                .map(|v| out_to_json(&v, txn))
            {
                Some(Value::Object(attachments)) => Some(attachments),
                _ => None,
            }
        })
        .flatten()
    }

    /// Replace the attachments. `None` or an empty map removes the key.
    pub fn set_attachments(&self, attachments: Option<JsonMap<String, Value>>) -> Result<()> {
        self.require(self.cell_type().has_attachments(), "set_attachments")?;
        let attachments = attachments.filter(|a| !a.is_empty());
        let unchanged = match (self.attachments(), &attachments) {
            (None, None) => true,
            (Some(current), Some(next)) => json_deep_equal(
                &Value::Object(current),
                &Value::Object(next.clone()),
            ),
            _ => false,
        };
        if unchanged {
            return Ok(());
        }
        self.write(TransactOptions::not_undoable(), |txn| {
            match attachments {
                Some(attachments) => {
                    self.inner.ymodel.insert(
                        txn,
                        keys::ATTACHMENTS,
                        json_to_any(&Value::Object(attachments)),
                    );
                }
                None => {
                    self.inner.ymodel.remove(txn, keys::ATTACHMENTS);
                }
            }
            Ok(())
        })
    }
}
