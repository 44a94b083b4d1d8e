//! Mount registry with longest-prefix matching.
//!
//! Supers are keyed by their mount path in directory form. A path like
//! `vfs://a/b/c` matches a super registered at `vfs://a/` even though
//! `vfs://a/b/c` itself was never registered; the most specific mount wins.
//!
//! # Reference counting
//!
//! Each entry counts the registration itself plus every outstanding
//! [`SuperRef`]. Counts change only while holding the entry's map shard
//! lock, so concurrent opens and closes on one mount never lose an update.
//! Dropping a `SuperRef` releases its count.

use std::ops::Deref;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tracing::{debug, warn};
use urs_types::{OpKind, SuperId};

use crate::arena::Arena;
use crate::capability::CapabilityTable;
use crate::error::{UrsError, UrsResult};
use crate::path;

/// A mounted provider's registration record.
#[derive(Debug)]
pub struct Super {
    id: SuperId,
    path: String,
    name: String,
    flags: u32,
    caps: CapabilityTable,
}

impl Super {
    pub fn id(&self) -> SuperId {
        self.id
    }

    /// Mount key in directory form (`vfs://dev/`).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Display name given at registration.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.caps
    }
}

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub id: SuperId,
    pub path: String,
    pub name: String,
    pub flags: u32,
    /// Registration plus outstanding references.
    pub refs: usize,
    pub ops: Vec<OpKind>,
}

struct MountEntry {
    sup: Arc<Super>,
    refs: usize,
}

struct RegistryInner {
    mounts: DashMap<String, MountEntry>,
    /// Slot owner for super IDs; maps each live ID to its mount key.
    ids: Mutex<Arena<SuperId, String>>,
    default_scheme: String,
}

/// String-keyed table of mounted providers.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("mounts", &self.inner.mounts.len())
            .field("default_scheme", &self.inner.default_scheme)
            .finish()
    }
}

impl Registry {
    /// Create an empty registry normalizing `/`-paths under `default_scheme`.
    pub fn new(default_scheme: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                mounts: DashMap::new(),
                ids: Mutex::new(Arena::new()),
                default_scheme: default_scheme.into(),
            }),
        }
    }

    pub fn default_scheme(&self) -> &str {
        &self.inner.default_scheme
    }

    /// Normalize a caller path under this registry's default scheme.
    pub fn normalize(&self, path: &str) -> UrsResult<String> {
        path::normalize(path, &self.inner.default_scheme)
    }

    /// Publish a provider at `path`.
    ///
    /// Fails with `AlreadyMounted` if a super already covers that exact
    /// normalized path; the existing super is left untouched.
    pub fn register(
        &self,
        path: &str,
        name: &str,
        flags: u32,
        caps: CapabilityTable,
    ) -> UrsResult<SuperId> {
        let key = path::mount_key(&self.normalize(path)?);

        match self.inner.mounts.entry(key.clone()) {
            Entry::Occupied(_) => {
                debug!(path = %key, "mount already registered");
                Err(UrsError::AlreadyMounted(key))
            }
            Entry::Vacant(vacant) => {
                let id = self.inner.ids.lock().insert(key.clone());
                vacant.insert(MountEntry {
                    sup: Arc::new(Super {
                        id,
                        path: key.clone(),
                        name: name.to_string(),
                        flags,
                        caps,
                    }),
                    refs: 1,
                });
                debug!(path = %key, %id, name, "registered super");
                Ok(id)
            }
        }
    }

    /// Remove the super registered at exactly `path`.
    ///
    /// Refused with `MountBusy` while anything besides the registration
    /// itself holds a reference (open handles, in-flight resolutions).
    pub fn unregister(&self, path: &str) -> UrsResult<SuperId> {
        let key = path::mount_key(&self.normalize(path)?);

        if let Some((_, entry)) = self.inner.mounts.remove_if(&key, |_, e| e.refs <= 1) {
            let id = entry.sup.id;
            self.inner.ids.lock().remove(id);
            debug!(path = %key, %id, "unregistered super");
            return Ok(id);
        }

        match self.inner.mounts.get(&key) {
            Some(entry) => {
                warn!(path = %key, refs = entry.refs, "unregister refused, mount busy");
                Err(UrsError::MountBusy {
                    path: key.clone(),
                    refs: entry.refs,
                })
            }
            None => Err(UrsError::no_such_mount(key)),
        }
    }

    /// Longest-prefix match. The returned reference holds a count.
    pub fn match_path(&self, path: &str) -> UrsResult<SuperRef> {
        let normalized = self.normalize(path)?;
        self.match_normalized(&normalized)
    }

    /// Longest-prefix match on an already normalized path.
    pub fn match_normalized(&self, normalized: &str) -> UrsResult<SuperRef> {
        for candidate in path::mount_candidates(normalized) {
            if let Some(sup_ref) = self.acquire(&candidate) {
                debug!(path = normalized, mount = %candidate, "matched super");
                return Ok(sup_ref);
            }
        }
        Err(UrsError::no_such_mount(normalized))
    }

    /// Exact match on a mount path, for callers that already know it.
    pub fn obtain(&self, path: &str) -> UrsResult<SuperRef> {
        let key = path::mount_key(&self.normalize(path)?);
        self.acquire(&key).ok_or(UrsError::NoSuchMount(key))
    }

    /// Current count for the mount at `path`, registration included.
    pub fn ref_count(&self, path: &str) -> Option<usize> {
        let key = path::mount_key(&self.normalize(path).ok()?);
        self.inner.mounts.get(&key).map(|e| e.refs)
    }

    /// Key of a live super ID.
    pub fn path_of(&self, id: SuperId) -> Option<String> {
        self.inner.ids.lock().get(id).cloned()
    }

    /// Snapshot of all mounts, sorted by path.
    pub fn mounts(&self) -> Vec<MountInfo> {
        let mut mounts: Vec<MountInfo> = self
            .inner
            .mounts
            .iter()
            .map(|e| MountInfo {
                id: e.sup.id,
                path: e.sup.path.clone(),
                name: e.sup.name.clone(),
                flags: e.sup.flags,
                refs: e.refs,
                ops: e.sup.caps.supported_ops(),
            })
            .collect();
        mounts.sort_by(|a, b| a.path.cmp(&b.path));
        mounts
    }

    fn acquire(&self, key: &str) -> Option<SuperRef> {
        let mut entry = self.inner.mounts.get_mut(key)?;
        entry.refs += 1;
        Some(SuperRef {
            sup: Arc::clone(&entry.sup),
            registry: self.clone(),
        })
    }

    fn retain(&self, sup: &Arc<Super>) {
        match self.inner.mounts.get_mut(&sup.path) {
            Some(mut entry) if Arc::ptr_eq(&entry.sup, sup) => entry.refs += 1,
            _ => panic!("retain of unregistered super {} at {}", sup.id, sup.path),
        }
    }

    fn release(&self, sup: &Arc<Super>) {
        match self.inner.mounts.get_mut(&sup.path) {
            Some(mut entry) if Arc::ptr_eq(&entry.sup, sup) => {
                // The registration's own count is only dropped by unregister.
                if entry.refs <= 1 {
                    panic!(
                        "reference count underflow on super {} at {}",
                        sup.id, sup.path
                    );
                }
                entry.refs -= 1;
            }
            _ => panic!("release of unregistered super {} at {}", sup.id, sup.path),
        }
    }
}

/// A counted reference to a registered super.
pub struct SuperRef {
    sup: Arc<Super>,
    registry: Registry,
}

impl SuperRef {
    /// Shared handle to the record, without a count.
    pub fn as_arc(&self) -> &Arc<Super> {
        &self.sup
    }
}

impl Deref for SuperRef {
    type Target = Super;

    fn deref(&self) -> &Super {
        &self.sup
    }
}

impl Clone for SuperRef {
    fn clone(&self) -> Self {
        self.registry.retain(&self.sup);
        Self {
            sup: Arc::clone(&self.sup),
            registry: self.registry.clone(),
        }
    }
}

impl Drop for SuperRef {
    fn drop(&mut self) {
        self.registry.release(&self.sup);
    }
}

impl std::fmt::Debug for SuperRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SuperRef")
            .field(&self.sup.id)
            .field(&self.sup.path)
            .finish()
    }
}
