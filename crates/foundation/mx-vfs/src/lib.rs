//! Virtual storage for expansion outputs
//!
//! A hierarchical, path-addressable node tree held in memory. Expansion
//! results are materialised here so downstream consumers can read them like
//! ordinary source units. Every write bumps a per-node stamp, which lets the
//! owner detect edits made by anybody else.

use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::{fs, io};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// Error raised by storage operations
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    /// No node at the path
    #[error("no such node: {path}")]
    NotFound {
        /// Requested path
        path: String,
    },
    /// A file sits where a directory is required
    #[error("not a directory: {path}")]
    NotADirectory {
        /// Offending path
        path: String,
    },
    /// A directory sits where a file is required
    #[error("is a directory: {path}")]
    IsADirectory {
        /// Offending path
        path: String,
    },
    /// Creation target already exists
    #[error("node already exists: {path}")]
    AlreadyExists {
        /// Offending path
        path: String,
    },
    /// Path is not absolute or contains empty, `.` or `..` segments
    #[error("illegal path: {path:?}")]
    IllegalPath {
        /// Offending path
        path: String,
    },
    /// A writer panicked while holding the lock
    #[error("storage lock poisoned")]
    LockPoisoned,
    /// Exporting to the real file system failed
    #[error("failed to export {path}")]
    Io {
        /// Destination on disk
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Result of writing file content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The node was created with the given stamp
    Created(u64),
    /// Content changed; the node now has the given stamp
    Updated(u64),
    /// Content was identical; the stamp did not move
    Unchanged(u64),
}

impl WriteOutcome {
    /// Stamp of the node after the write
    pub fn stamp(self) -> u64 {
        match self {
            Self::Created(stamp) | Self::Updated(stamp) | Self::Unchanged(stamp) => stamp,
        }
    }
}

/// Snapshot of one file node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path
    pub path: String,
    /// Modification stamp
    pub stamp: u64,
    /// Content length in bytes
    pub len: usize,
}

#[derive(Debug)]
enum Node {
    Dir { children: BTreeSet<String> },
    File { content: String, stamp: u64 },
}

#[derive(Debug)]
struct StorageInner {
    nodes: FxHashMap<String, Node>,
    next_stamp: u64,
}

impl StorageInner {
    fn bump(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    /// Creates every missing directory on the way to `path`
    fn make_dirs(&mut self, path: &str) -> Result<(), VfsError> {
        let mut current = String::new();
        for segment in segments(path) {
            let parent = if current.is_empty() { "/".to_string() } else { current.clone() };
            current.push('/');
            current.push_str(segment);
            match self.nodes.get(&current) {
                Some(Node::Dir { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(VfsError::NotADirectory { path: current });
                }
                None => {
                    self.nodes.insert(current.clone(), Node::Dir { children: BTreeSet::new() });
                    self.link(&parent, segment);
                }
            }
        }
        Ok(())
    }

    fn link(&mut self, parent: &str, name: &str) {
        if let Some(Node::Dir { children }) = self.nodes.get_mut(parent) {
            children.insert(name.to_string());
        }
    }

    fn remove_subtree(&mut self, path: &str) -> usize {
        match self.nodes.remove(path) {
            Some(Node::Dir { children }) => {
                1 + children
                    .iter()
                    .map(|child| self.remove_subtree(&join(path, child)))
                    .sum::<usize>()
            }
            Some(Node::File { .. }) => 1,
            None => 0,
        }
    }
}

/// Shared handle to an in-memory node tree
///
/// Clones share the same tree. Reads may run concurrently; writes are
/// serialised by the inner lock.
#[derive(Debug, Clone)]
pub struct VirtualStorage {
    inner: Arc<RwLock<StorageInner>>,
}

impl VirtualStorage {
    /// Creates a storage holding only the root directory
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = FxHashMap::default();
        nodes.insert("/".to_string(), Node::Dir { children: BTreeSet::new() });
        Self {
            inner: Arc::new(RwLock::new(StorageInner { nodes, next_stamp: 0 })),
        }
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, StorageInner>, VfsError> {
        self.inner.read().map_err(|_| VfsError::LockPoisoned)
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, StorageInner>, VfsError> {
        self.inner.write().map_err(|_| VfsError::LockPoisoned)
    }

    /// Creates a new file, making parent directories as needed
    ///
    /// # Errors
    ///
    /// Fails if the path is illegal, already exists, or crosses a file.
    pub fn create_file(&self, path: &str, content: &str) -> Result<u64, VfsError> {
        validate(path)?;
        let mut inner = self.write_lock()?;
        if inner.nodes.contains_key(path) {
            return Err(VfsError::AlreadyExists { path: path.to_string() });
        }
        let (parent, name) = split(path);
        inner.make_dirs(parent)?;
        let stamp = inner.bump();
        inner.nodes.insert(
            path.to_string(),
            Node::File {
                content: content.to_string(),
                stamp,
            },
        );
        inner.link(if parent.is_empty() { "/" } else { parent }, name);
        trace!(path, stamp, "created node");
        Ok(stamp)
    }

    /// Replaces the content of an existing file
    ///
    /// Identical content leaves the node and its stamp untouched.
    ///
    /// # Errors
    ///
    /// Fails if no file exists at `path`.
    pub fn update_content(&self, path: &str, content: &str) -> Result<WriteOutcome, VfsError> {
        validate(path)?;
        let mut inner = self.write_lock()?;
        let next = inner.next_stamp + 1;
        match inner.nodes.get_mut(path) {
            Some(Node::File { content: existing, stamp }) => {
                if existing.as_str() == content {
                    return Ok(WriteOutcome::Unchanged(*stamp));
                }
                content.clone_into(existing);
                *stamp = next;
            }
            Some(Node::Dir { .. }) => {
                return Err(VfsError::IsADirectory { path: path.to_string() });
            }
            None => return Err(VfsError::NotFound { path: path.to_string() }),
        }
        inner.next_stamp = next;
        trace!(path, stamp = next, "updated node");
        Ok(WriteOutcome::Updated(next))
    }

    /// Creates the file or updates its content
    ///
    /// # Errors
    ///
    /// Fails if the path is illegal or a directory sits at `path`.
    pub fn write(&self, path: &str, content: &str) -> Result<WriteOutcome, VfsError> {
        if self.exists(path)? {
            self.update_content(path, content)
        } else {
            self.create_file(path, content).map(WriteOutcome::Created)
        }
    }

    /// Reads file content
    ///
    /// # Errors
    ///
    /// Fails if no file exists at `path`.
    pub fn read(&self, path: &str) -> Result<String, VfsError> {
        let inner = self.read_lock()?;
        match inner.nodes.get(path) {
            Some(Node::File { content, .. }) => Ok(content.clone()),
            Some(Node::Dir { .. }) => Err(VfsError::IsADirectory { path: path.to_string() }),
            None => Err(VfsError::NotFound { path: path.to_string() }),
        }
    }

    /// Current stamp of a file
    ///
    /// # Errors
    ///
    /// Fails if no file exists at `path`.
    pub fn stamp(&self, path: &str) -> Result<u64, VfsError> {
        let inner = self.read_lock()?;
        match inner.nodes.get(path) {
            Some(Node::File { stamp, .. }) => Ok(*stamp),
            Some(Node::Dir { .. }) => Err(VfsError::IsADirectory { path: path.to_string() }),
            None => Err(VfsError::NotFound { path: path.to_string() }),
        }
    }

    /// Whether any node exists at `path`
    ///
    /// # Errors
    ///
    /// Fails only if the lock is poisoned.
    pub fn exists(&self, path: &str) -> Result<bool, VfsError> {
        Ok(self.read_lock()?.nodes.contains_key(path))
    }

    /// Deletes a node; directories are removed with their contents
    ///
    /// Returns the number of removed nodes.
    ///
    /// # Errors
    ///
    /// Fails if nothing exists at `path` or `path` is the root.
    pub fn delete(&self, path: &str) -> Result<usize, VfsError> {
        validate(path)?;
        let mut inner = self.write_lock()?;
        if !inner.nodes.contains_key(path) {
            return Err(VfsError::NotFound { path: path.to_string() });
        }
        let (parent, name) = split(path);
        let parent = if parent.is_empty() { "/" } else { parent };
        if let Some(Node::Dir { children }) = inner.nodes.get_mut(parent) {
            children.remove(name);
        }
        let removed = inner.remove_subtree(path);
        trace!(path, removed, "deleted node");
        Ok(removed)
    }

    /// Names of the direct children of a directory, sorted
    ///
    /// # Errors
    ///
    /// Fails if no directory exists at `path`.
    pub fn list(&self, path: &str) -> Result<Vec<String>, VfsError> {
        let inner = self.read_lock()?;
        match inner.nodes.get(path) {
            Some(Node::Dir { children }) => Ok(children.iter().cloned().collect()),
            Some(Node::File { .. }) => Err(VfsError::NotADirectory { path: path.to_string() }),
            None => Err(VfsError::NotFound { path: path.to_string() }),
        }
    }

    /// Every file below `root`, sorted by path
    ///
    /// A missing `root` yields an empty list.
    ///
    /// # Errors
    ///
    /// Fails only if the lock is poisoned.
    pub fn files_under(&self, root: &str) -> Result<Vec<FileEntry>, VfsError> {
        let inner = self.read_lock()?;
        let prefix = if root.ends_with('/') { root.to_string() } else { format!("{root}/") };
        let mut files: Vec<FileEntry> = inner
            .nodes
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix) || path.as_str() == root)
            .filter_map(|(path, node)| match node {
                Node::File { content, stamp } => Some(FileEntry {
                    path: path.clone(),
                    stamp: *stamp,
                    len: content.len(),
                }),
                Node::Dir { .. } => None,
            })
            .collect();
        files.sort_by(|left, right| left.path.cmp(&right.path));
        Ok(files)
    }

    /// Writes every file below `root` into `destination` on disk
    ///
    /// Returns the number of written files.
    ///
    /// # Errors
    ///
    /// Fails on the first I/O error.
    pub fn export(&self, root: &str, destination: &Path) -> Result<usize, VfsError> {
        let files = self.files_under(root)?;
        for entry in &files {
            let relative = entry.path.strip_prefix(root).unwrap_or(entry.path.as_str());
            let target = destination.join(relative.trim_start_matches('/'));
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| VfsError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let content = self.read(&entry.path)?;
            fs::write(&target, content).map_err(|source| VfsError::Io {
                path: target.clone(),
                source,
            })?;
        }
        Ok(files.len())
    }
}

impl Default for VirtualStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn validate(path: &str) -> Result<(), VfsError> {
    let illegal = !path.starts_with('/')
        || path.len() == 1
        || path.ends_with('/')
        || path[1..]
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if illegal {
        return Err(VfsError::IllegalPath { path: path.to_string() });
    }
    Ok(())
}

/// Splits a validated path into parent and final segment
fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(index) => (&path[..index], &path[index + 1..]),
        None => ("", path),
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent == "/" { format!("/{name}") } else { format!("{parent}/{name}") }
}
