//! Provider operations trait.
//!
//! A provider is whatever backs a mount: a filesystem, a device driver, a
//! service. Local capability slots call these methods directly on the
//! caller's thread; the remote server (`crate::remote`) calls the same
//! methods on the provider's side of a mailbox, so one implementation
//! serves both dispatch branches.
//!
//! Every method gets the caller's `SuperId` and the provider's own dispatch
//! token (a node token for `lookup`/`open`, an open token for the rest).
//! Unimplemented methods answer `Status::NOT_SUPPORTED`.

use urs_types::{CreateKind, DispatchId, ProcessId, ProviderResult, SeekFrom, Stat, Status, SuperId};

/// Result of resolving one path component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupReply {
    /// Token for the resolved node. `DispatchId::NONE` means "no such name".
    pub node: DispatchId,
    /// Set when the node is a link; resolution continues at this target.
    pub link: Option<String>,
}

impl LookupReply {
    /// A plain node.
    pub fn node(node: DispatchId) -> Self {
        Self { node, link: None }
    }

    /// A link node pointing at `target`.
    pub fn link(node: DispatchId, target: impl Into<String>) -> Self {
        Self {
            node,
            link: Some(target.into()),
        }
    }
}

/// Arguments of a `create` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateArgs<'a> {
    /// Name of the new entry inside the open directory.
    pub name: &'a str,
    pub kind: CreateKind,
    pub flags: u32,
    /// Link target, or a provider-specific hint for plain nodes.
    pub target: &'a str,
    /// `DispatchId::RESOLVE_BY_NAME` for hard links, otherwise `NONE`.
    pub target_id: DispatchId,
}

/// Core provider operations.
#[allow(unused_variables)]
pub trait Provider: Send + Sync {
    /// Resolve `name` inside `node`. The root lookup passes
    /// `DispatchId::NONE` and the name `/`.
    fn lookup(
        &self,
        sup: SuperId,
        node: DispatchId,
        process: ProcessId,
        name: &str,
    ) -> ProviderResult<LookupReply> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Open a resolved node, returning the provider's open token.
    fn open(&self, sup: SuperId, node: DispatchId, process: ProcessId) -> ProviderResult<DispatchId> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Drop an open token.
    fn release(&self, sup: SuperId, open: DispatchId) -> ProviderResult<()> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Read up to `buf.len()` bytes at the open token's data cursor.
    fn read(&self, sup: SuperId, open: DispatchId, buf: &mut [u8]) -> ProviderResult<usize> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Write `data` at the data cursor. Returns bytes accepted.
    fn write(&self, sup: SuperId, open: DispatchId, data: &[u8]) -> ProviderResult<usize> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Cut the node's data at the current data cursor.
    fn truncate(&self, sup: SuperId, open: DispatchId) -> ProviderResult<()> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Move the data cursor. Returns the new position.
    fn seek_data(
        &self,
        sup: SuperId,
        open: DispatchId,
        offset: u64,
        from: SeekFrom,
    ) -> ProviderResult<u64> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Read up to `buf.len()` bytes of directory listing at the list cursor.
    fn list(&self, sup: SuperId, open: DispatchId, buf: &mut [u8]) -> ProviderResult<usize> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Move the list cursor. Returns the new position.
    fn seek_list(
        &self,
        sup: SuperId,
        open: DispatchId,
        offset: u64,
        from: SeekFrom,
    ) -> ProviderResult<u64> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Create an entry inside the open directory.
    fn create(&self, sup: SuperId, open: DispatchId, args: &CreateArgs<'_>) -> ProviderResult<()> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Remove the open node. `erase` asks for the data to be destroyed too.
    fn remove(&self, sup: SuperId, open: DispatchId, erase: bool) -> ProviderResult<()> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Rename the open node within its directory.
    fn rename(&self, sup: SuperId, open: DispatchId, name: &str) -> ProviderResult<()> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Node attributes.
    fn stat(&self, sup: SuperId, open: DispatchId) -> ProviderResult<Stat> {
        Err(Status::NOT_SUPPORTED)
    }
}

/// Apply a seek to a cursor over `len` items, rejecting negative results.
pub fn seek_position(current: u64, len: u64, offset: u64, from: SeekFrom) -> ProviderResult<u64> {
    let base = match from {
        SeekFrom::Begin => 0,
        SeekFrom::Current => current,
        SeekFrom::End => len,
    };
    // Offsets travel as u64; reinterpret so callers can seek backwards.
    let delta = offset as i64;
    base.checked_add_signed(delta).ok_or(Status::INVALID)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;
    impl Provider for Nothing {}

    #[test]
    fn test_defaults_are_not_supported() {
        let p = Nothing;
        let sup = SuperId::new(0, 0);
        assert_eq!(
            p.lookup(sup, DispatchId::NONE, ProcessId(1), "/"),
            Err(Status::NOT_SUPPORTED)
        );
        assert_eq!(p.stat(sup, DispatchId(1)), Err(Status::NOT_SUPPORTED));
    }

    #[test]
    fn test_seek_math() {
        assert_eq!(seek_position(5, 10, 2, SeekFrom::Begin), Ok(2));
        assert_eq!(seek_position(5, 10, 2, SeekFrom::Current), Ok(7));
        assert_eq!(seek_position(5, 10, 0, SeekFrom::End), Ok(10));
        assert_eq!(seek_position(5, 10, (-3i64) as u64, SeekFrom::End), Ok(7));
        assert_eq!(
            seek_position(1, 10, (-3i64) as u64, SeekFrom::Current),
            Err(Status::INVALID)
        );
    }
}
