//! Path resolution.
//!
//! Normalize, match the owning super, ask its provider for the root node,
//! then look up one component at a time. Each intermediate node is released
//! as soon as the next one resolves; the final node is returned still held.
//!
//! # Links
//!
//! A lookup may report a link. An absolute target (`/…` or `scheme://…`)
//! restarts resolution from the registry, possibly landing on another
//! super. A relative target continues from the link's own node against the
//! current super, so the provider decides what a lookup below a link means.
//! Every hop counts against `max_link_depth`.
//!
//! Every reference taken along the way is an RAII guard, so any early
//! return releases whatever was acquired.

use tracing::debug;
use urs_types::{DispatchId, ProcessId};

use crate::dispatch::Dispatcher;
use crate::error::{UrsError, UrsResult};
use crate::nodes::{NodeRef, NodeTable};
use crate::path;
use crate::registry::{Registry, SuperRef};

/// Borrowed view of the service state resolution needs.
pub struct Resolver<'a> {
    pub registry: &'a Registry,
    pub nodes: &'a NodeTable,
    pub dispatcher: &'a Dispatcher,
    pub max_link_depth: usize,
}

impl Resolver<'_> {
    /// Resolve `path` to a held node bound to its (final) super.
    pub fn resolve(&self, path: &str, process: ProcessId) -> UrsResult<NodeRef> {
        let normalized = self.registry.normalize(path)?;
        let mut hops = 0;
        let node = self.from_root(&normalized, process, &mut hops)?;
        debug!(path = %normalized, sup = %node.sup().path(), node = %node.id(), hops, "resolved");
        Ok(node)
    }

    fn from_root(&self, normalized: &str, process: ProcessId, hops: &mut usize) -> UrsResult<NodeRef> {
        let sup = self.registry.match_normalized(normalized)?;
        let rest = path::remainder(normalized, sup.path());
        let root = self.descend(&sup, DispatchId::NONE, "/", process, normalized, hops)?;
        drop(sup);
        self.walk(root, path::components(rest), process, normalized, hops)
    }

    fn walk<'p>(
        &self,
        mut node: NodeRef,
        names: impl Iterator<Item = &'p str>,
        process: ProcessId,
        full: &str,
        hops: &mut usize,
    ) -> UrsResult<NodeRef> {
        for name in names {
            node = self.descend(node.sup(), node.dispatch(), name, process, full, hops)?;
        }
        Ok(node)
    }

    /// One lookup. Provider refusals and empty results are `PathNotFound`;
    /// dispatch failures keep their own kind.
    fn descend(
        &self,
        sup: &SuperRef,
        at: DispatchId,
        name: &str,
        process: ProcessId,
        full: &str,
        hops: &mut usize,
    ) -> UrsResult<NodeRef> {
        let reply = match self.dispatcher.lookup(sup, at, process, name) {
            Ok(reply) => reply,
            Err(UrsError::Provider { status, .. }) => {
                debug!(path = full, name, %status, "lookup refused");
                return Err(UrsError::path_not_found(full));
            }
            Err(err) => return Err(err),
        };
        if reply.node.is_none() {
            debug!(path = full, name, "lookup found nothing");
            return Err(UrsError::path_not_found(full));
        }

        let node = self.nodes.alloc(sup.clone(), reply.node);
        match reply.link {
            None => Ok(node),
            Some(target) => self.follow(node, &target, process, full, hops),
        }
    }

    fn follow(
        &self,
        link: NodeRef,
        target: &str,
        process: ProcessId,
        full: &str,
        hops: &mut usize,
    ) -> UrsResult<NodeRef> {
        *hops += 1;
        if *hops > self.max_link_depth {
            return Err(UrsError::TooManyLinks(full.to_string()));
        }
        if target.is_empty() {
            return Err(UrsError::invalid_path(format!("{full}: empty link target")));
        }
        debug!(path = full, target, hop = *hops, "following link");

        if path::is_absolute(target) {
            drop(link);
            let normalized = self.registry.normalize(target)?;
            self.from_root(&normalized, process, hops)
        } else {
            self.walk(link, path::components(target), process, full, hops)
        }
    }
}
