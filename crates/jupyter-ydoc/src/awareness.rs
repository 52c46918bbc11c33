//! Presence attached to a shared document.
//!
//! Awareness carries ephemeral per-client data: who is connected, which
//! document they look at, where their cursor is. The document models hand
//! out the handle but never read the payload, so any serializable shape
//! works. [`AwarenessState`] is the shape JupyterLab front ends publish.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use yrs::sync::awareness::{Awareness, AwarenessUpdate};
use yrs::Doc;

use crate::error::{Result, YDocError};

/// Peers silent for longer than this are dropped by [`ClientAwareness::prune`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Presence published by a JupyterLab client.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AwarenessState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,

    /// Path of the document the user is focused on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cursors: Vec<SelectionRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub initials: Option<String>,

    /// Cursor highlight color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Caret position in a cell source, or in the file when `cell_id` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CursorPosition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
    pub offset: u32,
}

/// Selection in text indices of the document's offset kind. Empty when
/// `anchor == head`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectionRange {
    pub anchor: CursorPosition,
    pub head: CursorPosition,
}

impl SelectionRange {
    /// Empty selection at `position`.
    pub fn caret(position: CursorPosition) -> Self {
        Self {
            anchor: position.clone(),
            head: position,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }
}

/// Awareness handle owned by a shared document.
pub struct ClientAwareness {
    inner: Awareness,
    timeout: Duration,
    seen: HashMap<u64, Instant>,
}

impl ClientAwareness {
    pub(crate) fn new(doc: &Doc) -> Self {
        Self::with_timeout(doc, DEFAULT_TIMEOUT)
    }

    pub(crate) fn with_timeout(doc: &Doc, timeout: Duration) -> Self {
        Self {
            inner: Awareness::new(doc.clone()),
            timeout,
            seen: HashMap::new(),
        }
    }

    /// Client id of the local replica.
    pub fn client_id(&self) -> u64 {
        self.inner.client_id()
    }

    /// The raw yrs handle, for transports.
    pub fn inner(&self) -> &Awareness {
        &self.inner
    }

    /// Publish the local presence. Any serializable payload is accepted.
    pub fn set_local_state<S: Serialize>(&mut self, state: &S) -> Result<()> {
        self.inner
            .set_local_state(state)
            .map_err(|e| YDocError::AwarenessError(e.to_string()))
    }

    /// Mark the local client as gone.
    pub fn clear_local_state(&mut self) {
        self.inner.clean_local_state();
    }

    /// Local presence read back as `S`; `None` if unset or of another shape.
    pub fn local_state<S: DeserializeOwned>(&self) -> Option<S> {
        self.inner.local_state()
    }

    /// Presence of one client as plain JSON.
    pub fn state(&self, client_id: u64) -> Option<Value> {
        self.states().remove(&client_id)
    }

    /// Presence of every client that published a parseable payload.
    pub fn states(&self) -> HashMap<u64, Value> {
        self.inner
            .iter()
            .filter_map(|(client_id, entry)| {
                let data = entry.data.as_ref()?;
                let value = serde_json::from_str(data).ok()?;
                Some((client_id, value))
            })
            .collect()
    }

    /// Other clients currently publishing presence.
    pub fn peers(&self) -> Vec<u64> {
        let local = self.client_id();
        let mut peers: Vec<u64> = self.states().into_keys().filter(|id| *id != local).collect();
        peers.sort_unstable();
        peers
    }

    /// Apply presence received from other clients.
    pub fn apply_update(&mut self, update: AwarenessUpdate) -> Result<()> {
        let now = Instant::now();
        self.seen
            .extend(update.clients.keys().map(|client_id| (*client_id, now)));
        self.inner
            .apply_update(update)
            .map_err(|e| YDocError::AwarenessError(e.to_string()))
    }

    /// Encode every known client's presence for a newly connected peer.
    pub fn encode_update(&self) -> Result<AwarenessUpdate> {
        let clients: Vec<u64> = self.inner.iter().map(|(client_id, _)| client_id).collect();
        self.inner
            .update_with_clients(clients)
            .map_err(|e| YDocError::AwarenessError(e.to_string()))
    }

    /// Forget peers silent for longer than the timeout. Returns their ids.
    pub fn prune(&mut self) -> Vec<u64> {
        let now = Instant::now();
        let timeout = self.timeout;
        let mut expired = Vec::new();
        self.seen.retain(|client_id, last| {
            let alive = now.duration_since(*last) <= timeout;
            if !alive {
                expired.push(*client_id);
            }
            alive
        });
        for client_id in &expired {
            self.inner.remove_state(*client_id);
        }
        expired
    }
}

impl std::fmt::Debug for ClientAwareness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAwareness")
            .field("client_id", &self.client_id())
            .field("timeout", &self.timeout)
            .finish()
    }
}
