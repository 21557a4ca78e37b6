//! Repository Module
//!
//! A hierarchical node store with session-buffered mutations and explicit
//! commits. The cache layer only talks to it through [`Repository`] and
//! [`Session`], so any tree-shaped backend can sit underneath.

mod memory;
mod node;
mod session;

use std::path::PathBuf;

use thiserror::Error;

pub use memory::MemoryRepository;
pub use node::{Change, ChangeSet, NodeRecord, Value};
pub use session::Session;

// == Repository Error ==
/// Errors raised by the node store.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The backend cannot be reached (e.g. its lock was poisoned)
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    /// A node was added below a parent that does not exist
    #[error("parent node missing for {0}")]
    ParentMissing(String),

    /// The path is not an absolute node path, or targets the tree root
    #[error("invalid node path: {0}")]
    InvalidPath(String),

    /// The snapshot file could not be read or written
    #[error("snapshot I/O failed for {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file content could not be encoded or decoded
    #[error("snapshot format error: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

// == Repository Trait ==
/// Committed-state access to a node tree.
///
/// Reads observe whatever has been committed. Mutations arrive as a whole
/// [`ChangeSet`] through [`Repository::apply`], which must be atomic: either
/// every change lands or none does.
pub trait Repository: Send + Sync {
    /// Returns the node stored at `path`, if any.
    fn node(&self, path: &str) -> Result<Option<NodeRecord>>;

    /// Returns the names of the direct children of `path`, sorted.
    ///
    /// A missing node has no children.
    fn child_names(&self, path: &str) -> Result<Vec<String>>;

    /// Applies a change set atomically.
    fn apply(&self, changes: &ChangeSet) -> Result<()>;
}

// == Path Helpers ==
/// Path of the tree root.
pub const ROOT: &str = "/";

/// Joins a child name onto a parent path.
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Returns the parent path, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Returns the last segment of a path.
pub fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Checks that `path` is absolute and has no empty segments.
pub fn validate_path(path: &str) -> Result<()> {
    if path == ROOT {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') || path[1..].split('/').any(str::is_empty) {
        return Err(RepositoryError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Creates every missing node along `path` with the given node type.
///
/// Existing nodes are left untouched. The caller commits.
pub fn ensure_path(session: &mut Session<'_>, path: &str, node_type: &str) -> Result<()> {
    validate_path(path)?;
    let mut current = ROOT.to_string();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let next = join(&current, segment);
        if !session.node_exists(&next)? {
            session.add_node(&current, segment, NodeRecord::new(node_type))?;
        }
        current = next;
    }
    Ok(())
}
