//! Transient node handles produced by path resolution.
//!
//! A node wraps the provider's dispatch token for one resolved component and
//! keeps its super referenced. Nodes live in a shared arena with a count per
//! slot; the slot is freed when the last [`NodeRef`] drops.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use urs_types::{DispatchId, NodeId};

use crate::arena::Arena;
use crate::registry::SuperRef;

struct NodeEntry {
    refs: usize,
}

/// Arena of live nodes. Clones share the same table.
#[derive(Clone, Default)]
pub struct NodeTable {
    slots: Arc<Mutex<Arena<NodeId, NodeEntry>>>,
}

impl std::fmt::Debug for NodeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTable")
            .field("live", &self.len())
            .finish()
    }
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly resolved node holding one reference.
    pub fn alloc(&self, sup: SuperRef, dispatch: DispatchId) -> NodeRef {
        let id = self.slots.lock().insert(NodeEntry { refs: 1 });
        trace!(node = %id, sup = %sup.id(), ?dispatch, "node allocated");
        NodeRef {
            id,
            dispatch,
            sup,
            table: self.clone(),
        }
    }

    /// Live node count.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ref_count(&self, id: NodeId) -> Option<usize> {
        self.slots.lock().get(id).map(|e| e.refs)
    }

    fn retain(&self, id: NodeId) {
        match self.slots.lock().get_mut(id) {
            Some(entry) => entry.refs += 1,
            None => panic!("retain of freed node {id}"),
        }
    }

    fn release(&self, id: NodeId) {
        let mut slots = self.slots.lock();
        let entry = match slots.get_mut(id) {
            Some(entry) => entry,
            None => panic!("reference count underflow on node {id}"),
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            slots.remove(id);
            trace!(node = %id, "node freed");
        }
    }
}

/// A counted reference to a resolved node and, through it, its super.
pub struct NodeRef {
    id: NodeId,
    dispatch: DispatchId,
    sup: SuperRef,
    table: NodeTable,
}

impl NodeRef {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The provider's token for this node.
    pub fn dispatch(&self) -> DispatchId {
        self.dispatch
    }

    /// The super the node was resolved against.
    pub fn sup(&self) -> &SuperRef {
        &self.sup
    }
}

impl Clone for NodeRef {
    fn clone(&self) -> Self {
        self.table.retain(self.id);
        Self {
            id: self.id,
            dispatch: self.dispatch,
            sup: self.sup.clone(),
            table: self.table.clone(),
        }
    }
}

impl Drop for NodeRef {
    fn drop(&mut self) {
        self.table.release(self.id);
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("dispatch", &self.dispatch)
            .field("sup", &self.sup.path())
            .finish()
    }
}
