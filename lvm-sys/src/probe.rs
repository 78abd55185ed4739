// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem access used by the device cache
//!
//! [`HostProbe`] talks to the real filesystem. [`MemoryProbe`] serves an
//! in-memory tree and counts every access, which is how callers verify that
//! a scanned cache no longer touches the filesystem.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Component, Path, PathBuf};

use lvm_types::DeviceNumber;

const MAX_SYMLINK_DEPTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    BlockDevice,
    Other,
}

/// Result of `stat` on a path, with symlinks followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    pub kind: NodeKind,

    /// Device number the node represents (block devices only)
    pub rdev: DeviceNumber,

    /// Filesystem holding the node, with `ino` identifies it uniquely
    pub dev: u64,
    pub ino: u64,
}

pub trait DeviceProbe {
    /// Stat `path`, following symlinks.
    fn stat(&self, path: &Path) -> io::Result<NodeInfo>;

    /// Names of the entries of directory `path`, in no particular order.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl DeviceProbe for HostProbe {
    fn stat(&self, path: &Path) -> io::Result<NodeInfo> {
        let metadata = fs::metadata(path)?;
        let file_type = metadata.file_type();

        let kind = if file_type.is_dir() {
            NodeKind::Directory
        } else if file_type.is_block_device() {
            NodeKind::BlockDevice
        } else {
            NodeKind::Other
        };

        Ok(NodeInfo {
            kind,
            rdev: DeviceNumber::from_raw(metadata.rdev()),
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name());
        }
        Ok(names)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MemoryNode {
    Directory,
    Block(DeviceNumber),
    File,
    Symlink(PathBuf),
}

/// In-memory device tree.
///
/// Parent directories are created implicitly; symlink targets are absolute
/// paths inside the tree.
#[derive(Debug, Default)]
pub struct MemoryProbe {
    nodes: BTreeMap<PathBuf, (u64, MemoryNode)>,
    accesses: Cell<usize>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, path: &Path, node: MemoryNode) {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !self.nodes.contains_key(parent)
        {
            self.insert(parent, MemoryNode::Directory);
        }

        let ino = self.nodes.len() as u64 + 1;
        self.nodes.insert(path.to_path_buf(), (ino, node));
    }

    pub fn add_dir(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.insert(path.as_ref(), MemoryNode::Directory);
        self
    }

    pub fn add_block(&mut self, path: impl AsRef<Path>, dev: DeviceNumber) -> &mut Self {
        self.insert(path.as_ref(), MemoryNode::Block(dev));
        self
    }

    pub fn add_file(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.insert(path.as_ref(), MemoryNode::File);
        self
    }

    pub fn add_symlink(&mut self, path: impl AsRef<Path>, target: impl AsRef<Path>) -> &mut Self {
        self.insert(path.as_ref(), MemoryNode::Symlink(target.as_ref().to_path_buf()));
        self
    }

    /// Number of `stat`/`read_dir` calls served so far.
    pub fn accesses(&self) -> usize {
        self.accesses.get()
    }

    /// Resolve symlinks in every component of `path`.
    ///
    /// Symlink targets are taken as canonical: they are not resolved again.
    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        let mut resolved = PathBuf::new();
        let mut hops = 0;

        for component in path.components() {
            if component == Component::ParentDir {
                resolved.pop();
                continue;
            }
            resolved.push(component);
            while let Some((_, MemoryNode::Symlink(target))) = self.nodes.get(&resolved) {
                hops += 1;
                if hops > MAX_SYMLINK_DEPTH {
                    return Err(io::Error::other("too many levels of symbolic links"));
                }
                resolved = target.clone();
            }
        }

        Ok(resolved)
    }

    fn lookup(&self, path: &Path) -> io::Result<(PathBuf, u64, &MemoryNode)> {
        let resolved = self.resolve(path)?;
        let (ino, node) = self
            .nodes
            .get(&resolved)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        Ok((resolved, *ino, node))
    }
}

impl DeviceProbe for MemoryProbe {
    fn stat(&self, path: &Path) -> io::Result<NodeInfo> {
        self.accesses.set(self.accesses.get() + 1);

        let (_, ino, node) = self.lookup(path)?;
        let (kind, rdev) = match node {
            MemoryNode::Directory => (NodeKind::Directory, DeviceNumber::from_raw(0)),
            MemoryNode::Block(dev) => (NodeKind::BlockDevice, *dev),
            MemoryNode::File | MemoryNode::Symlink(_) => {
                (NodeKind::Other, DeviceNumber::from_raw(0))
            }
        };

        Ok(NodeInfo {
            kind,
            rdev,
            dev: 0,
            ino,
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        self.accesses.set(self.accesses.get() + 1);

        let (resolved, _, node) = self.lookup(path)?;
        if *node != MemoryNode::Directory {
            return Err(io::Error::from(io::ErrorKind::NotADirectory));
        }

        let names = self
            .nodes
            .keys()
            .filter(|candidate| candidate.parent() == Some(resolved.as_path()))
            .filter_map(|candidate| candidate.file_name().map(OsString::from))
            .collect();
        Ok(names)
    }
}
