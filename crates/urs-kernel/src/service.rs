//! The `Urs` service object.
//!
//! Owns the registry, node table, open-handle table and dispatch adapter.
//! Construct one per process (or per test) and share it by reference; there
//! is no global state.

use std::sync::Arc;

use tracing::{debug, warn};
use urs_types::{CreateKind, DispatchId, HandleId, MailboxId, ProcessId, SeekFrom, Stat, SuperId};

use crate::capability::{CapabilityTable, RawCapability};
use crate::config::UrsConfig;
use crate::dispatch::Dispatcher;
use crate::error::UrsResult;
use crate::handles::{HandleInfo, NewHandle, OpenHandle, OpenTable};
use crate::nodes::{NodeRef, NodeTable};
use crate::provider::CreateArgs;
use crate::registry::{MountInfo, Registry};
use crate::resolve::Resolver;
use crate::transport::Transport;

/// Uniform resource dispatch service.
#[derive(Debug)]
pub struct Urs {
    config: UrsConfig,
    registry: Registry,
    nodes: NodeTable,
    handles: OpenTable,
    dispatcher: Dispatcher,
}

impl Urs {
    /// Build a service that sends message-routed operations over `transport`.
    pub fn new(config: UrsConfig, transport: Arc<dyn Transport>) -> Self {
        let registry = Registry::new(config.default_scheme.clone());
        let dispatcher = Dispatcher::new(transport, config.link_buffer_len);
        Self {
            config,
            registry,
            nodes: NodeTable::new(),
            handles: OpenTable::new(),
            dispatcher,
        }
    }

    pub fn config(&self) -> &UrsConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ── Registration ────────────────────────────────────────────────────

    /// Publish a provider at `path`.
    pub fn register(
        &self,
        path: &str,
        name: &str,
        flags: u32,
        caps: CapabilityTable,
    ) -> UrsResult<SuperId> {
        self.registry.register(path, name, flags, caps)
    }

    /// Publish a provider from a registration record sent by another
    /// process. Every supported slot routes to `mailbox`.
    pub fn register_raw(
        &self,
        path: &str,
        name: &str,
        flags: u32,
        mailbox: MailboxId,
        entries: &[RawCapability],
    ) -> UrsResult<SuperId> {
        let caps = CapabilityTable::from_raw(mailbox, entries)?;
        self.registry.register(path, name, flags, caps)
    }

    /// Remove the mount at exactly `path`; refused while it is referenced.
    pub fn unregister(&self, path: &str) -> UrsResult<SuperId> {
        self.registry.unregister(path)
    }

    // ── Resolution ──────────────────────────────────────────────────────

    fn resolver(&self) -> Resolver<'_> {
        Resolver {
            registry: &self.registry,
            nodes: &self.nodes,
            dispatcher: &self.dispatcher,
            max_link_depth: self.config.max_link_depth,
        }
    }

    /// Resolve `path` to a held node and its owning super.
    pub fn resolve(&self, path: &str, process: ProcessId) -> UrsResult<NodeRef> {
        self.resolver().resolve(path, process)
    }

    // ── Open handles ────────────────────────────────────────────────────

    pub fn open_node(&self, path: &str, flags: u32, process: ProcessId) -> UrsResult<HandleId> {
        let key = self.registry.normalize(path)?;
        let node = self.resolve(path, process)?;
        let open = self.dispatcher.open(node.sup(), node.dispatch(), process)?;

        let handle = self.handles.insert(NewHandle {
            path: path.to_string(),
            key,
            node,
            open,
            flags,
            process,
        });
        debug!(path, handle = %handle.id(), ?open, "opened");
        Ok(handle.id())
    }

    /// Release the provider's open token, then free the handle. A refused
    /// release leaves the handle usable.
    pub fn close_node(&self, id: HandleId) -> UrsResult<()> {
        let handle = self.handles.begin_close(id)?;
        match self.dispatcher.release(handle.sup(), handle.open_id()) {
            Ok(()) => {
                self.handles.finish_close(id);
                debug!(handle = %id, path = handle.path(), "closed");
                Ok(())
            }
            Err(err) => {
                warn!(handle = %id, error = %err, "release refused, handle kept");
                self.handles.abort_close(&handle);
                Err(err)
            }
        }
    }

    fn active(&self, id: HandleId) -> UrsResult<Arc<OpenHandle>> {
        self.handles.get(id)
    }

    pub fn read_node(&self, id: HandleId, buf: &mut [u8]) -> UrsResult<usize> {
        let h = self.active(id)?;
        self.dispatcher.read(h.sup(), h.open_id(), buf)
    }

    pub fn write_node(&self, id: HandleId, data: &[u8]) -> UrsResult<usize> {
        let h = self.active(id)?;
        self.dispatcher.write(h.sup(), h.open_id(), data)
    }

    pub fn truncate_node(&self, id: HandleId) -> UrsResult<()> {
        let h = self.active(id)?;
        self.dispatcher.truncate(h.sup(), h.open_id())
    }

    pub fn seek_data(&self, id: HandleId, offset: u64, from: SeekFrom) -> UrsResult<u64> {
        let h = self.active(id)?;
        self.dispatcher.seek_data(h.sup(), h.open_id(), offset, from)
    }

    pub fn list_node(&self, id: HandleId, buf: &mut [u8]) -> UrsResult<usize> {
        let h = self.active(id)?;
        self.dispatcher.list(h.sup(), h.open_id(), buf)
    }

    pub fn seek_list(&self, id: HandleId, offset: u64, from: SeekFrom) -> UrsResult<u64> {
        let h = self.active(id)?;
        self.dispatcher.seek_list(h.sup(), h.open_id(), offset, from)
    }

    /// Create `name` inside the open directory.
    ///
    /// Hard links ask the provider to resolve `target` by name; the other
    /// kinds pass `target` through as is.
    pub fn create_node(
        &self,
        id: HandleId,
        name: &str,
        kind: CreateKind,
        flags: u32,
        target: &str,
    ) -> UrsResult<()> {
        let h = self.active(id)?;
        let target_id = match kind {
            CreateKind::HardLink => DispatchId::RESOLVE_BY_NAME,
            CreateKind::Node | CreateKind::SymLink | CreateKind::DynLink => DispatchId::NONE,
        };
        let args = CreateArgs {
            name,
            kind,
            flags,
            target,
            target_id,
        };
        self.dispatcher.create(h.sup(), h.open_id(), &args)
    }

    /// Remove the open node. On success the handle is freed like `close`.
    pub fn remove_node(&self, id: HandleId, erase: bool) -> UrsResult<()> {
        let handle = self.handles.begin_close(id)?;
        match self.dispatcher.remove(handle.sup(), handle.open_id(), erase) {
            Ok(()) => {
                self.handles.finish_close(id);
                debug!(handle = %id, path = handle.path(), erase, "removed");
                Ok(())
            }
            Err(err) => {
                self.handles.abort_close(&handle);
                Err(err)
            }
        }
    }

    pub fn rename_node(&self, id: HandleId, name: &str) -> UrsResult<()> {
        let h = self.active(id)?;
        self.dispatcher.rename(h.sup(), h.open_id(), name)
    }

    pub fn stat_node(&self, id: HandleId) -> UrsResult<Stat> {
        let h = self.active(id)?;
        self.dispatcher.stat(h.sup(), h.open_id())
    }

    // ── Introspection ───────────────────────────────────────────────────

    pub fn mounts(&self) -> Vec<MountInfo> {
        self.registry.mounts()
    }

    /// Registration plus outstanding references for the mount at `path`.
    pub fn ref_count(&self, path: &str) -> Option<usize> {
        self.registry.ref_count(path)
    }

    pub fn open_handles(&self) -> Vec<HandleInfo> {
        self.handles.snapshot()
    }

    /// Handles currently open on `path`, in open order.
    pub fn handles_for_path(&self, path: &str) -> Vec<HandleId> {
        match self.registry.normalize(path) {
            Ok(key) => self.handles.for_key(&key),
            Err(_) => Vec::new(),
        }
    }

    /// Nodes currently held, by resolutions in flight or open handles.
    pub fn live_nodes(&self) -> usize {
        self.nodes.len()
    }
}
