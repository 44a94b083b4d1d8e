//! Node metadata returned by the `stat` operation.
//!
//! Crosses the message boundary as a single buffer attachment, so it stays
//! a flat serde struct.

use serde::{Deserialize, Serialize};

/// Node type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Regular data node.
    File,
    /// Directory (listable).
    Directory,
    /// Symbolic link.
    Symlink,
    /// Device or service endpoint with no stored data.
    Device,
}

impl NodeKind {
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, NodeKind::Symlink)
    }
}

/// Node attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Node type.
    pub kind: NodeKind,
    /// Size in bytes (entry count for directories).
    pub size: u64,
    /// Permission bits (e.g., 0o644).
    pub perm: u32,
    /// Number of hard links.
    pub nlink: u32,
    /// Last modification, seconds since the Unix epoch.
    pub mtime: u64,
}

impl Stat {
    /// Attributes for a regular file.
    pub fn file(size: u64, perm: u32) -> Self {
        Self {
            kind: NodeKind::File,
            size,
            perm,
            nlink: 1,
            mtime: 0,
        }
    }

    /// Attributes for a directory holding `entries` children.
    pub fn directory(entries: u64, perm: u32) -> Self {
        Self {
            kind: NodeKind::Directory,
            size: entries,
            perm,
            nlink: 2, // . and ..
            mtime: 0,
        }
    }

    /// Attributes for a symlink.
    pub fn symlink(target_len: u64) -> Self {
        Self {
            kind: NodeKind::Symlink,
            size: target_len,
            perm: 0o777,
            nlink: 1,
            mtime: 0,
        }
    }

    /// Attributes for a device node.
    pub fn device(perm: u32) -> Self {
        Self {
            kind: NodeKind::Device,
            size: 0,
            perm,
            nlink: 1,
            mtime: 0,
        }
    }

    /// Set the modification time.
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let file = Stat::file(1024, 0o644);
        assert!(file.kind.is_file());
        assert_eq!(file.size, 1024);

        let dir = Stat::directory(3, 0o755);
        assert!(dir.kind.is_dir());
        assert_eq!(dir.nlink, 2);

        assert!(Stat::symlink(4).kind.is_symlink());
        assert_eq!(Stat::device(0o666).kind, NodeKind::Device);
    }

    #[test]
    fn test_survives_postcard() {
        let stat = Stat::file(7, 0o600).with_mtime(1_700_000_000);
        let bytes = postcard::to_stdvec(&stat).unwrap();
        let back: Stat = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, stat);
    }
}
