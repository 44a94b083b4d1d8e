//! In-memory provider.
//!
//! Ephemeral tree of directories, files and symlinks, used for `vfs://tmp/`
//! in `ursd` and throughout the tests.
//!
//! Node tokens name directory entries rather than inodes, so a node reached
//! through one hard link is removed or renamed under that name and no
//! other. Open tokens remember both the entry and the inode; data stays
//! reachable through an open token after its entry is renamed.
//!
//! A lookup below a symlink is answered from the directory holding the
//! link, which is what makes relative link targets work.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::RwLock;
use urs_types::{
    CreateKind, DispatchId, NodeKind, ProcessId, ProviderResult, SeekFrom, Stat, Status, SuperId,
};

use crate::provider::{CreateArgs, LookupReply, Provider, seek_position};

/// Inode number of the root directory.
const ROOT_INO: u64 = 1;

/// Entry token of the root directory, which no directory lists.
const ROOT: u64 = 1;

/// Node body.
#[derive(Debug)]
enum Entry {
    File { data: Vec<u8> },
    /// Children map names to entry tokens.
    Directory { children: BTreeMap<String, u64> },
    Symlink { target: String },
}

#[derive(Debug)]
struct Inode {
    entry: Entry,
    perm: u32,
    mtime: u64,
    /// Entry tokens naming this inode. Empty for the root.
    links: Vec<u64>,
}

impl Inode {
    fn new(entry: Entry, perm: u32) -> Self {
        Self {
            entry,
            perm,
            mtime: now(),
            links: Vec::new(),
        }
    }

    fn directory(perm: u32) -> Self {
        Self::new(
            Entry::Directory {
                children: BTreeMap::new(),
            },
            perm,
        )
    }

    fn kind(&self) -> NodeKind {
        match self.entry {
            Entry::File { .. } => NodeKind::File,
            Entry::Directory { .. } => NodeKind::Directory,
            Entry::Symlink { .. } => NodeKind::Symlink,
        }
    }

    fn stat(&self) -> Stat {
        let stat = match &self.entry {
            Entry::File { data } => Stat::file(data.len() as u64, self.perm),
            Entry::Directory { children } => Stat::directory(children.len() as u64, self.perm),
            Entry::Symlink { target } => Stat::symlink(target.len() as u64),
        };
        Stat {
            nlink: self.links.len().max(1) as u32,
            ..stat
        }
        .with_mtime(self.mtime)
    }
}

/// A name inside a directory.
#[derive(Debug, Clone)]
struct Dentry {
    /// Inode of the containing directory.
    dir: u64,
    name: String,
    ino: u64,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn valid_name(name: &str) -> ProviderResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Status::INVALID);
    }
    Ok(())
}

#[derive(Debug)]
struct Tree {
    inodes: HashMap<u64, Inode>,
    dentries: HashMap<u64, Dentry>,
    next_ino: u64,
    next_dentry: u64,
}

impl Tree {
    fn new() -> Self {
        let mut inodes = HashMap::new();
        inodes.insert(ROOT_INO, Inode::directory(0o755));
        let mut dentries = HashMap::new();
        dentries.insert(
            ROOT,
            Dentry {
                dir: ROOT_INO,
                name: String::new(),
                ino: ROOT_INO,
            },
        );
        Self {
            inodes,
            dentries,
            next_ino: ROOT_INO + 1,
            next_dentry: ROOT + 1,
        }
    }

    fn get(&self, ino: u64) -> ProviderResult<&Inode> {
        self.inodes.get(&ino).ok_or(Status::NOT_FOUND)
    }

    fn get_mut(&mut self, ino: u64) -> ProviderResult<&mut Inode> {
        self.inodes.get_mut(&ino).ok_or(Status::NOT_FOUND)
    }

    fn dentry(&self, token: u64) -> ProviderResult<&Dentry> {
        self.dentries.get(&token).ok_or(Status::NOT_FOUND)
    }

    fn children(&self, dir: u64) -> ProviderResult<&BTreeMap<String, u64>> {
        match &self.get(dir)?.entry {
            Entry::Directory { children } => Ok(children),
            _ => Err(Status::NOT_A_DIRECTORY),
        }
    }

    fn children_mut(&mut self, dir: u64) -> ProviderResult<&mut BTreeMap<String, u64>> {
        match &mut self.get_mut(dir)?.entry {
            Entry::Directory { children } => Ok(children),
            _ => Err(Status::NOT_A_DIRECTORY),
        }
    }

    /// Primary entry of a directory inode; the root's own token for the root.
    fn entry_of(&self, ino: u64) -> ProviderResult<u64> {
        if ino == ROOT_INO {
            return Ok(ROOT);
        }
        self.get(ino)?.links.first().copied().ok_or(Status::NOT_FOUND)
    }

    /// Entry token for `name` inside directory `dir`, without following links.
    fn child(&self, dir: u64, name: &str) -> ProviderResult<u64> {
        match name {
            "." => self.entry_of(dir),
            ".." => {
                let parent = self.dentry(self.entry_of(dir)?)?.dir;
                self.entry_of(parent)
            }
            _ => self
                .children(dir)?
                .get(name)
                .copied()
                .ok_or(Status::NOT_FOUND),
        }
    }

    /// Walk a provider-relative path from the root without following links.
    fn walk(&self, path: &str) -> ProviderResult<u64> {
        path.split('/')
            .filter(|c| !c.is_empty())
            .try_fold(ROOT_INO, |dir, name| -> ProviderResult<u64> {
                Ok(self.dentry(self.child(dir, name)?)?.ino)
            })
    }

    /// Add `name` -> `ino` inside `dir`.
    fn link(&mut self, dir: u64, name: &str, ino: u64) -> ProviderResult<u64> {
        let token = self.next_dentry;
        let children = self.children_mut(dir)?;
        if children.contains_key(name) {
            return Err(Status::EXISTS);
        }
        children.insert(name.to_string(), token);
        self.next_dentry += 1;
        self.dentries.insert(
            token,
            Dentry {
                dir,
                name: name.to_string(),
                ino,
            },
        );
        self.get_mut(dir)?.mtime = now();
        self.get_mut(ino)?.links.push(token);
        Ok(token)
    }

    fn insert(&mut self, dir: u64, name: &str, inode: Inode) -> ProviderResult<u64> {
        valid_name(name)?;
        if self.children(dir)?.contains_key(name) {
            return Err(Status::EXISTS);
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.inodes.insert(ino, inode);
        self.link(dir, name, ino)?;
        Ok(ino)
    }

    /// Drop one entry; the inode goes with its last entry.
    fn unlink(&mut self, token: u64, erase: bool) -> ProviderResult<()> {
        if token == ROOT {
            return Err(Status::BUSY);
        }
        let dentry = self.dentry(token)?.clone();
        if let Entry::Directory { children } = &self.get(dentry.ino)?.entry {
            if !children.is_empty() {
                return Err(Status::NOT_EMPTY);
            }
        }

        self.children_mut(dentry.dir)?.remove(&dentry.name);
        self.get_mut(dentry.dir)?.mtime = now();
        self.dentries.remove(&token);

        let inode = self.get_mut(dentry.ino)?;
        inode.links.retain(|t| *t != token);
        if erase {
            if let Entry::File { data } = &mut inode.entry {
                data.clear();
            }
        }
        if inode.links.is_empty() {
            self.inodes.remove(&dentry.ino);
        }
        Ok(())
    }

    fn rename(&mut self, token: u64, name: &str) -> ProviderResult<()> {
        if token == ROOT {
            return Err(Status::BUSY);
        }
        let dentry = self.dentry(token)?.clone();
        if dentry.name == name {
            return Ok(());
        }
        let children = self.children_mut(dentry.dir)?;
        if children.contains_key(name) {
            return Err(Status::EXISTS);
        }
        children.remove(&dentry.name);
        children.insert(name.to_string(), token);

        if let Some(d) = self.dentries.get_mut(&token) {
            d.name = name.to_string();
        }
        self.get_mut(dentry.dir)?.mtime = now();
        Ok(())
    }
}

#[derive(Debug)]
struct MemOpen {
    /// Entry the node was opened through.
    dentry: u64,
    ino: u64,
    data_pos: u64,
    list_pos: u64,
}

/// In-memory tree provider.
///
/// All data is lost when dropped.
#[derive(Debug)]
pub struct MemoryProvider {
    tree: RwLock<Tree>,
    opens: DashMap<u64, MemOpen>,
    next_open: AtomicU64,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    /// Create an empty tree holding only the root directory.
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Tree::new()),
            opens: DashMap::new(),
            next_open: AtomicU64::new(1),
        }
    }

    /// Ensure every directory along `path` exists.
    pub fn mkdir_all(&self, path: &str) -> ProviderResult<()> {
        let mut tree = self.tree.write();
        Self::ensure_dirs(&mut tree, path.split('/').filter(|c| !c.is_empty()))?;
        Ok(())
    }

    /// Create or replace a file at `path`, creating parents as needed.
    pub fn insert_file(&self, path: &str, data: &[u8]) -> ProviderResult<()> {
        let mut parts: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let name = parts.pop().ok_or(Status::INVALID)?;

        let mut tree = self.tree.write();
        let dir = Self::ensure_dirs(&mut tree, parts.into_iter())?;
        match tree.child(dir, name) {
            Ok(token) => {
                let ino = tree.dentry(token)?.ino;
                let inode = tree.get_mut(ino)?;
                match &mut inode.entry {
                    Entry::File { data: existing } => *existing = data.to_vec(),
                    Entry::Directory { .. } => return Err(Status::IS_A_DIRECTORY),
                    Entry::Symlink { .. } => return Err(Status::EXISTS),
                }
                inode.mtime = now();
                Ok(())
            }
            Err(Status::NOT_FOUND) => {
                let file = Inode::new(Entry::File { data: data.to_vec() }, 0o644);
                tree.insert(dir, name, file).map(drop)
            }
            Err(status) => Err(status),
        }
    }

    /// Contents of the file at `path`, for inspection.
    pub fn file_contents(&self, path: &str) -> ProviderResult<Vec<u8>> {
        let tree = self.tree.read();
        match &tree.get(tree.walk(path)?)?.entry {
            Entry::File { data } => Ok(data.clone()),
            Entry::Directory { .. } => Err(Status::IS_A_DIRECTORY),
            Entry::Symlink { .. } => Err(Status::INVALID),
        }
    }

    /// Open tokens not yet released.
    pub fn open_count(&self) -> usize {
        self.opens.len()
    }

    fn ensure_dirs<'p>(
        tree: &mut Tree,
        parts: impl Iterator<Item = &'p str>,
    ) -> ProviderResult<u64> {
        let mut dir = ROOT_INO;
        for name in parts {
            dir = match tree.child(dir, name) {
                Ok(token) => {
                    let ino = tree.dentry(token)?.ino;
                    match tree.get(ino)?.kind() {
                        NodeKind::Directory => ino,
                        _ => return Err(Status::NOT_A_DIRECTORY),
                    }
                }
                Err(Status::NOT_FOUND) => tree.insert(dir, name, Inode::directory(0o755))?,
                Err(status) => return Err(status),
            };
        }
        Ok(dir)
    }

    fn open_entry(&self, open: DispatchId) -> ProviderResult<(u64, u64)> {
        self.opens
            .get(&open.0)
            .map(|o| (o.dentry, o.ino))
            .ok_or(Status::BAD_HANDLE)
    }

    fn listing(tree: &Tree, ino: u64) -> ProviderResult<Vec<u8>> {
        let mut out = Vec::new();
        for name in tree.children(ino)?.keys() {
            out.extend_from_slice(name.as_bytes());
            out.push(b'\n');
        }
        Ok(out)
    }
}

impl Provider for MemoryProvider {
    fn lookup(
        &self,
        _sup: SuperId,
        node: DispatchId,
        _process: ProcessId,
        name: &str,
    ) -> ProviderResult<LookupReply> {
        let tree = self.tree.read();
        if node.is_none() {
            return Ok(LookupReply::node(DispatchId(ROOT)));
        }

        let at = tree.dentry(node.0)?;
        // Names below a symlink resolve in the directory holding it.
        let dir = match tree.get(at.ino)?.entry {
            Entry::Symlink { .. } => at.dir,
            _ => at.ino,
        };
        let token = tree.child(dir, name)?;
        match &tree.get(tree.dentry(token)?.ino)?.entry {
            Entry::Symlink { target } => Ok(LookupReply::link(DispatchId(token), target.clone())),
            _ => Ok(LookupReply::node(DispatchId(token))),
        }
    }

    fn open(&self, _sup: SuperId, node: DispatchId, _process: ProcessId) -> ProviderResult<DispatchId> {
        let ino = self.tree.read().dentry(node.0)?.ino;
        let id = self.next_open.fetch_add(1, Ordering::Relaxed);
        self.opens.insert(
            id,
            MemOpen {
                dentry: node.0,
                ino,
                data_pos: 0,
                list_pos: 0,
            },
        );
        Ok(DispatchId(id))
    }

    fn release(&self, _sup: SuperId, open: DispatchId) -> ProviderResult<()> {
        self.opens
            .remove(&open.0)
            .map(drop)
            .ok_or(Status::BAD_HANDLE)
    }

    fn read(&self, _sup: SuperId, open: DispatchId, buf: &mut [u8]) -> ProviderResult<usize> {
        let mut cursor = self.opens.get_mut(&open.0).ok_or(Status::BAD_HANDLE)?;
        let tree = self.tree.read();
        match &tree.get(cursor.ino)?.entry {
            Entry::File { data } => {
                let start = usize::try_from(cursor.data_pos)
                    .unwrap_or(usize::MAX)
                    .min(data.len());
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                cursor.data_pos += n as u64;
                Ok(n)
            }
            Entry::Directory { .. } => Err(Status::IS_A_DIRECTORY),
            Entry::Symlink { .. } => Err(Status::INVALID),
        }
    }

    fn write(&self, _sup: SuperId, open: DispatchId, bytes: &[u8]) -> ProviderResult<usize> {
        let mut cursor = self.opens.get_mut(&open.0).ok_or(Status::BAD_HANDLE)?;
        let mut tree = self.tree.write();
        let inode = tree.get_mut(cursor.ino)?;
        match &mut inode.entry {
            Entry::File { data } => {
                let offset = usize::try_from(cursor.data_pos).map_err(|_| Status::INVALID)?;
                let end = offset.checked_add(bytes.len()).ok_or(Status::INVALID)?;
                if end > data.len() {
                    data.resize(end, 0);
                }
                data[offset..end].copy_from_slice(bytes);
                inode.mtime = now();
                cursor.data_pos = end as u64;
                Ok(bytes.len())
            }
            Entry::Directory { .. } => Err(Status::IS_A_DIRECTORY),
            Entry::Symlink { .. } => Err(Status::INVALID),
        }
    }

    fn truncate(&self, _sup: SuperId, open: DispatchId) -> ProviderResult<()> {
        let cursor = self.opens.get(&open.0).ok_or(Status::BAD_HANDLE)?;
        let mut tree = self.tree.write();
        let inode = tree.get_mut(cursor.ino)?;
        match &mut inode.entry {
            Entry::File { data } => {
                let at = usize::try_from(cursor.data_pos).unwrap_or(usize::MAX);
                data.resize(at.min(data.len()), 0);
                inode.mtime = now();
                Ok(())
            }
            Entry::Directory { .. } => Err(Status::IS_A_DIRECTORY),
            Entry::Symlink { .. } => Err(Status::INVALID),
        }
    }

    fn seek_data(
        &self,
        _sup: SuperId,
        open: DispatchId,
        offset: u64,
        from: SeekFrom,
    ) -> ProviderResult<u64> {
        let mut cursor = self.opens.get_mut(&open.0).ok_or(Status::BAD_HANDLE)?;
        let tree = self.tree.read();
        let len = match &tree.get(cursor.ino)?.entry {
            Entry::File { data } => data.len() as u64,
            Entry::Directory { .. } => return Err(Status::IS_A_DIRECTORY),
            Entry::Symlink { .. } => return Err(Status::INVALID),
        };
        cursor.data_pos = seek_position(cursor.data_pos, len, offset, from)?;
        Ok(cursor.data_pos)
    }

    fn list(&self, _sup: SuperId, open: DispatchId, buf: &mut [u8]) -> ProviderResult<usize> {
        let mut cursor = self.opens.get_mut(&open.0).ok_or(Status::BAD_HANDLE)?;
        let listing = Self::listing(&self.tree.read(), cursor.ino)?;
        let start = usize::try_from(cursor.list_pos)
            .unwrap_or(usize::MAX)
            .min(listing.len());
        let n = buf.len().min(listing.len() - start);
        buf[..n].copy_from_slice(&listing[start..start + n]);
        cursor.list_pos += n as u64;
        Ok(n)
    }

    fn seek_list(
        &self,
        _sup: SuperId,
        open: DispatchId,
        offset: u64,
        from: SeekFrom,
    ) -> ProviderResult<u64> {
        let mut cursor = self.opens.get_mut(&open.0).ok_or(Status::BAD_HANDLE)?;
        let len = Self::listing(&self.tree.read(), cursor.ino)?.len() as u64;
        cursor.list_pos = seek_position(cursor.list_pos, len, offset, from)?;
        Ok(cursor.list_pos)
    }

    fn create(&self, _sup: SuperId, open: DispatchId, args: &CreateArgs<'_>) -> ProviderResult<()> {
        let (_, dir) = self.open_entry(open)?;
        valid_name(args.name)?;
        let mut tree = self.tree.write();

        let perm = |default: u32| if args.flags == 0 { default } else { args.flags };
        let inode = match args.kind {
            CreateKind::Node if args.target == "dir" => Inode::directory(perm(0o755)),
            CreateKind::Node => Inode::new(Entry::File { data: Vec::new() }, perm(0o644)),
            CreateKind::SymLink | CreateKind::DynLink => {
                if args.target.is_empty() {
                    return Err(Status::INVALID);
                }
                Inode::new(
                    Entry::Symlink {
                        target: args.target.to_string(),
                    },
                    0o777,
                )
            }
            CreateKind::HardLink => {
                if args.target_id != DispatchId::RESOLVE_BY_NAME {
                    return Err(Status::INVALID);
                }
                let target = tree.walk(args.target)?;
                if tree.get(target)?.kind() == NodeKind::Directory {
                    return Err(Status::NOT_PERMITTED);
                }
                return tree.link(dir, args.name, target).map(drop);
            }
        };
        tree.insert(dir, args.name, inode).map(drop)
    }

    fn remove(&self, _sup: SuperId, open: DispatchId, erase: bool) -> ProviderResult<()> {
        let (dentry, _) = self.open_entry(open)?;
        self.tree.write().unlink(dentry, erase)?;
        // The open token goes with the node.
        self.opens.remove(&open.0);
        Ok(())
    }

    fn rename(&self, _sup: SuperId, open: DispatchId, name: &str) -> ProviderResult<()> {
        let (dentry, _) = self.open_entry(open)?;
        valid_name(name)?;
        self.tree.write().rename(dentry, name)
    }

    fn stat(&self, _sup: SuperId, open: DispatchId) -> ProviderResult<Stat> {
        let (_, ino) = self.open_entry(open)?;
        Ok(self.tree.read().get(ino)?.stat())
    }
}
