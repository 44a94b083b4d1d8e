//! Device provider: `null` discards writes and reads nothing, `zero`
//! discards writes and reads zeros.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use urs_types::{DispatchId, NodeKind, ProcessId, ProviderResult, SeekFrom, Stat, Status, SuperId};

use crate::provider::{CreateArgs, LookupReply, Provider, seek_position};

const ROOT: DispatchId = DispatchId(1);
const NULL: DispatchId = DispatchId(2);
const ZERO: DispatchId = DispatchId(3);

const LISTING: &[u8] = b"null\nzero\n";

struct DevOpen {
    node: DispatchId,
    list_pos: u64,
}

/// Fixed `null`/`zero` device directory.
pub struct DevProvider {
    opens: DashMap<u64, DevOpen>,
    next_open: AtomicU64,
}

impl Default for DevProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DevProvider {
    pub fn new() -> Self {
        Self {
            opens: DashMap::new(),
            next_open: AtomicU64::new(1),
        }
    }

    /// Open tokens not yet released.
    pub fn open_count(&self) -> usize {
        self.opens.len()
    }

    fn node_of(&self, open: DispatchId) -> ProviderResult<DispatchId> {
        self.opens
            .get(&open.0)
            .map(|o| o.node)
            .ok_or(Status::BAD_HANDLE)
    }

    fn kind(node: DispatchId) -> NodeKind {
        if node == ROOT {
            NodeKind::Directory
        } else {
            NodeKind::Device
        }
    }
}

impl Provider for DevProvider {
    fn lookup(
        &self,
        _sup: SuperId,
        node: DispatchId,
        _process: ProcessId,
        name: &str,
    ) -> ProviderResult<LookupReply> {
        if node.is_none() {
            return Ok(LookupReply::node(ROOT));
        }
        if node != ROOT {
            return Err(Status::NOT_A_DIRECTORY);
        }
        match name {
            "null" => Ok(LookupReply::node(NULL)),
            "zero" => Ok(LookupReply::node(ZERO)),
            "." | ".." => Ok(LookupReply::node(ROOT)),
            _ => Err(Status::NOT_FOUND),
        }
    }

    fn open(&self, _sup: SuperId, node: DispatchId, _process: ProcessId) -> ProviderResult<DispatchId> {
        if ![ROOT, NULL, ZERO].contains(&node) {
            return Err(Status::NOT_FOUND);
        }
        let id = self.next_open.fetch_add(1, Ordering::Relaxed);
        self.opens.insert(id, DevOpen { node, list_pos: 0 });
        Ok(DispatchId(id))
    }

    fn release(&self, _sup: SuperId, open: DispatchId) -> ProviderResult<()> {
        self.opens
            .remove(&open.0)
            .map(drop)
            .ok_or(Status::BAD_HANDLE)
    }

    fn read(&self, _sup: SuperId, open: DispatchId, buf: &mut [u8]) -> ProviderResult<usize> {
        match self.node_of(open)? {
            NULL => Ok(0),
            ZERO => {
                buf.fill(0);
                Ok(buf.len())
            }
            _ => Err(Status::IS_A_DIRECTORY),
        }
    }

    fn write(&self, _sup: SuperId, open: DispatchId, data: &[u8]) -> ProviderResult<usize> {
        match self.node_of(open)? {
            ROOT => Err(Status::IS_A_DIRECTORY),
            _ => Ok(data.len()),
        }
    }

    fn truncate(&self, _sup: SuperId, open: DispatchId) -> ProviderResult<()> {
        match self.node_of(open)? {
            ROOT => Err(Status::IS_A_DIRECTORY),
            _ => Ok(()),
        }
    }

    fn seek_data(
        &self,
        _sup: SuperId,
        open: DispatchId,
        _offset: u64,
        _from: SeekFrom,
    ) -> ProviderResult<u64> {
        // Devices have no position.
        match self.node_of(open)? {
            ROOT => Err(Status::IS_A_DIRECTORY),
            _ => Ok(0),
        }
    }

    fn list(&self, _sup: SuperId, open: DispatchId, buf: &mut [u8]) -> ProviderResult<usize> {
        let mut entry = self.opens.get_mut(&open.0).ok_or(Status::BAD_HANDLE)?;
        if entry.node != ROOT {
            return Err(Status::NOT_A_DIRECTORY);
        }
        let start = (entry.list_pos as usize).min(LISTING.len());
        let n = buf.len().min(LISTING.len() - start);
        buf[..n].copy_from_slice(&LISTING[start..start + n]);
        entry.list_pos += n as u64;
        Ok(n)
    }

    fn seek_list(
        &self,
        _sup: SuperId,
        open: DispatchId,
        offset: u64,
        from: SeekFrom,
    ) -> ProviderResult<u64> {
        let mut entry = self.opens.get_mut(&open.0).ok_or(Status::BAD_HANDLE)?;
        if entry.node != ROOT {
            return Err(Status::NOT_A_DIRECTORY);
        }
        entry.list_pos = seek_position(entry.list_pos, LISTING.len() as u64, offset, from)?;
        Ok(entry.list_pos)
    }

    fn create(
        &self,
        _sup: SuperId,
        _open: DispatchId,
        _args: &CreateArgs<'_>,
    ) -> ProviderResult<()> {
        Err(Status::NOT_PERMITTED)
    }

    fn remove(&self, _sup: SuperId, _open: DispatchId, _erase: bool) -> ProviderResult<()> {
        Err(Status::NOT_PERMITTED)
    }

    fn rename(&self, _sup: SuperId, _open: DispatchId, _name: &str) -> ProviderResult<()> {
        Err(Status::NOT_PERMITTED)
    }

    fn stat(&self, _sup: SuperId, open: DispatchId) -> ProviderResult<Stat> {
        let node = self.node_of(open)?;
        Ok(match Self::kind(node) {
            NodeKind::Directory => Stat::directory(2, 0o755),
            _ => Stat::device(0o666),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUP: SuperId = SuperId::new(0, 0);

    fn open(dev: &DevProvider, name: &str) -> DispatchId {
        let root = dev.lookup(SUP, DispatchId::NONE, ProcessId(0), "/").unwrap().node;
        let node = if name.is_empty() {
            root
        } else {
            dev.lookup(SUP, root, ProcessId(0), name).unwrap().node
        };
        dev.open(SUP, node, ProcessId(0)).unwrap()
    }

    #[test]
    fn test_null_reads_nothing_and_swallows_writes() {
        let dev = DevProvider::new();
        let h = open(&dev, "null");
        let mut buf = [7u8; 4];
        assert_eq!(dev.read(SUP, h, &mut buf), Ok(0));
        assert_eq!(buf, [7; 4]);
        assert_eq!(dev.write(SUP, h, b"hello"), Ok(5));
    }

    #[test]
    fn test_zero_fills() {
        let dev = DevProvider::new();
        let h = open(&dev, "zero");
        let mut buf = [7u8; 4];
        assert_eq!(dev.read(SUP, h, &mut buf), Ok(4));
        assert_eq!(buf, [0; 4]);
    }

    #[test]
    fn test_listing_advances_cursor() {
        let dev = DevProvider::new();
        let h = open(&dev, "");
        let mut buf = [0u8; 6];
        assert_eq!(dev.list(SUP, h, &mut buf), Ok(6));
        assert_eq!(&buf, b"null\nz");
        let mut rest = [0u8; 16];
        assert_eq!(dev.list(SUP, h, &mut rest), Ok(4));
        assert_eq!(&rest[..4], b"ero\n");
        assert_eq!(dev.seek_list(SUP, h, 0, SeekFrom::Begin), Ok(0));
    }

    #[test]
    fn test_unknown_names_and_tokens() {
        let dev = DevProvider::new();
        let root = dev.lookup(SUP, DispatchId::NONE, ProcessId(0), "/").unwrap().node;
        assert_eq!(dev.lookup(SUP, root, ProcessId(0), "sda"), Err(Status::NOT_FOUND));
        assert_eq!(dev.release(SUP, DispatchId(99)), Err(Status::BAD_HANDLE));

        let h = open(&dev, "null");
        assert_eq!(dev.open_count(), 1);
        dev.release(SUP, h).unwrap();
        assert_eq!(dev.open_count(), 0);
    }
}
