//! Open-handle table.
//!
//! Handles are keyed by [`HandleId`]; a secondary multimap from normalized
//! path to handle IDs answers "who has this open". Two opens of one path are
//! two independent entries.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use urs_types::{DispatchId, HandleId, ProcessId};

use crate::arena::Arena;
use crate::error::{UrsError, UrsResult};
use crate::nodes::NodeRef;
use crate::registry::SuperRef;

/// Lifecycle of an open handle.
///
/// `Opening` happens inside `open_node` before the handle is published and
/// `Freed` is the slot being gone, so neither is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Active,
    Closing,
}

/// A successful open.
#[derive(Debug)]
pub struct OpenHandle {
    id: HandleId,
    /// Path as the caller spelled it.
    path: String,
    /// Normalized path, the multimap key.
    key: String,
    node: NodeRef,
    open: DispatchId,
    flags: u32,
    process: ProcessId,
    state: Mutex<HandleState>,
}

impl OpenHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn sup(&self) -> &SuperRef {
        self.node.sup()
    }

    /// The provider's open token.
    pub fn open_id(&self) -> DispatchId {
        self.open
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn process(&self) -> ProcessId {
        self.process
    }

    pub fn state(&self) -> HandleState {
        *self.state.lock()
    }
}

/// Fields of a handle about to be published.
pub struct NewHandle {
    pub path: String,
    pub key: String,
    pub node: NodeRef,
    pub open: DispatchId,
    pub flags: u32,
    pub process: ProcessId,
}

/// Snapshot of one open handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleInfo {
    pub id: HandleId,
    pub path: String,
    pub mount: String,
    pub flags: u32,
    pub process: ProcessId,
    pub state: HandleState,
}

#[derive(Default)]
pub struct OpenTable {
    slots: Mutex<Arena<HandleId, Arc<OpenHandle>>>,
    by_path: DashMap<String, Vec<HandleId>>,
}

impl std::fmt::Debug for OpenTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenTable")
            .field("handles", &self.len())
            .field("paths", &self.by_path.len())
            .finish()
    }
}

impl OpenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new handle in the `Active` state.
    pub fn insert(&self, new: NewHandle) -> Arc<OpenHandle> {
        let key = new.key.clone();
        let handle = {
            let mut slots = self.slots.lock();
            let (_, handle) = slots.insert_with(|id| {
                Arc::new(OpenHandle {
                    id,
                    path: new.path,
                    key: new.key,
                    node: new.node,
                    open: new.open,
                    flags: new.flags,
                    process: new.process,
                    state: Mutex::new(HandleState::Active),
                })
            });
            Arc::clone(handle)
        };
        self.by_path.entry(key).or_default().push(handle.id);
        handle
    }

    /// An `Active` handle, or `BadHandle`.
    pub fn get(&self, id: HandleId) -> UrsResult<Arc<OpenHandle>> {
        let handle = self.lookup(id)?;
        match handle.state() {
            HandleState::Active => Ok(handle),
            HandleState::Closing => Err(UrsError::BadHandle(id)),
        }
    }

    fn lookup(&self, id: HandleId) -> UrsResult<Arc<OpenHandle>> {
        self.slots
            .lock()
            .get(id)
            .cloned()
            .ok_or(UrsError::BadHandle(id))
    }

    /// Move an `Active` handle to `Closing`. Only one caller wins.
    pub fn begin_close(&self, id: HandleId) -> UrsResult<Arc<OpenHandle>> {
        let handle = self.lookup(id)?;
        {
            let mut state = handle.state.lock();
            if *state != HandleState::Active {
                return Err(UrsError::BadHandle(id));
            }
            *state = HandleState::Closing;
        }
        Ok(handle)
    }

    /// The provider refused; the handle goes back to `Active`.
    pub fn abort_close(&self, handle: &OpenHandle) {
        *handle.state.lock() = HandleState::Active;
    }

    /// Free a `Closing` handle's slot and path entry.
    ///
    /// The node and super references go when the last `Arc` does, which is
    /// normally the caller's.
    pub fn finish_close(&self, id: HandleId) -> Option<Arc<OpenHandle>> {
        let handle = self.slots.lock().remove(id)?;
        if let Some(mut ids) = self.by_path.get_mut(&handle.key) {
            ids.retain(|h| *h != id);
        }
        self.by_path.remove_if(&handle.key, |_, ids| ids.is_empty());
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles opened under the normalized path `key`.
    pub fn for_key(&self, key: &str) -> Vec<HandleId> {
        self.by_path
            .get(key)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// Snapshot of every handle, in slot order.
    pub fn snapshot(&self) -> Vec<HandleInfo> {
        self.slots
            .lock()
            .iter()
            .map(|(id, handle)| HandleInfo {
                id,
                path: handle.path.clone(),
                mount: handle.sup().path().to_string(),
                flags: handle.flags,
                process: handle.process,
                state: handle.state(),
            })
            .collect()
    }
}
