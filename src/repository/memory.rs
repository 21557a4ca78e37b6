//! In-Memory Repository
//!
//! Node tree held in a locked map, optionally mirrored to a JSON snapshot
//! file after every commit so the tree survives restarts.
//!
//! The snapshot is the whole tree, payloads included, so each commit costs
//! time proportional to the stored bytes. The file is written after the
//! tree lock is released; commits that snapshot are serialized among
//! themselves, readers are not held up by the file write.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{
    join, parent, validate_path, Change, ChangeSet, NodeRecord, Repository, RepositoryError,
    Result, ROOT,
};

/// Node type of the implicit tree root.
pub const ROOT_TYPE: &str = "rep:root";

#[derive(Debug, Clone)]
struct Slot {
    record: NodeRecord,
    children: BTreeSet<String>,
}

impl Slot {
    fn new(record: NodeRecord) -> Self {
        Self {
            record,
            children: BTreeSet::new(),
        }
    }
}

// Reverse operations recorded while applying a change set.
enum Undo {
    Created(String),
    Replaced(String, NodeRecord),
    Removed(String, Slot),
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<String, Slot>,
}

impl Tree {
    fn empty() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT.to_string(), Slot::new(NodeRecord::new(ROOT_TYPE)));
        Self { nodes }
    }

    fn from_records(records: BTreeMap<String, NodeRecord>) -> Result<Self> {
        let mut tree = Self::empty();
        // BTreeMap order visits parents before their children
        for (path, record) in records {
            if path == ROOT {
                continue;
            }
            validate_path(&path)?;
            tree.insert(&path, record)?;
        }
        Ok(tree)
    }

    // Payloads are shared, so copying the records stays cheap.
    fn records(&self) -> BTreeMap<String, NodeRecord> {
        self.nodes
            .iter()
            .map(|(path, slot)| (path.clone(), slot.record.clone()))
            .collect()
    }

    fn insert(&mut self, path: &str, record: NodeRecord) -> Result<()> {
        let parent_path = parent(path).ok_or_else(|| RepositoryError::InvalidPath(path.into()))?;
        let parent_slot = self
            .nodes
            .get_mut(parent_path)
            .ok_or_else(|| RepositoryError::ParentMissing(path.to_string()))?;
        parent_slot.children.insert(super::name(path).to_string());
        self.nodes.insert(path.to_string(), Slot::new(record));
        Ok(())
    }

    fn detach(&mut self, path: &str) {
        if let Some(parent_slot) = parent(path).and_then(|p| self.nodes.get_mut(p)) {
            parent_slot.children.remove(super::name(path));
        }
    }

    fn apply_one(&mut self, change: &Change, undo: &mut Vec<Undo>) -> Result<()> {
        match change {
            Change::Add { path, record } => {
                validate_path(path)?;
                if let Some(slot) = self.nodes.get_mut(path) {
                    let previous = std::mem::replace(&mut slot.record, record.clone());
                    undo.push(Undo::Replaced(path.clone(), previous));
                } else {
                    self.insert(path, record.clone())?;
                    undo.push(Undo::Created(path.clone()));
                }
            }
            Change::Remove { path } => {
                if path == ROOT {
                    return Err(RepositoryError::InvalidPath(path.clone()));
                }
                if !self.nodes.contains_key(path) {
                    // Already gone, e.g. removed by a concurrent commit
                    return Ok(());
                }
                self.detach(path);
                self.remove_subtree(path, undo);
            }
        }
        Ok(())
    }

    // Post-order so that rollback restores parents before children.
    fn remove_subtree(&mut self, path: &str, undo: &mut Vec<Undo>) {
        let Some(slot) = self.nodes.remove(path) else {
            return;
        };
        for child in &slot.children {
            self.remove_subtree(&join(path, child), undo);
        }
        undo.push(Undo::Removed(path.to_string(), slot));
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            match step {
                Undo::Created(path) => {
                    self.detach(&path);
                    self.nodes.remove(&path);
                }
                Undo::Replaced(path, record) => {
                    if let Some(slot) = self.nodes.get_mut(&path) {
                        slot.record = record;
                    }
                }
                Undo::Removed(path, slot) => {
                    if let Some(parent_slot) = parent(&path).and_then(|p| self.nodes.get_mut(p)) {
                        parent_slot.children.insert(super::name(&path).to_string());
                    }
                    self.nodes.insert(path, slot);
                }
            }
        }
    }
}

// == Memory Repository ==
/// Thread-safe node tree with optional snapshot persistence.
#[derive(Debug)]
pub struct MemoryRepository {
    tree: RwLock<Tree>,
    /// Snapshot file rewritten on every commit, if configured
    snapshot: Option<PathBuf>,
    /// Held from applying a change set until its snapshot is on disk
    persist: Mutex<()>,
    /// Number of successfully applied change sets
    commits: AtomicU64,
}

impl MemoryRepository {
    /// Creates an empty, memory-only repository containing just the root.
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Tree::empty()),
            snapshot: None,
            persist: Mutex::new(()),
            commits: AtomicU64::new(0),
        }
    }

    /// Opens a repository backed by a snapshot file.
    ///
    /// An existing file is loaded; a missing one starts an empty tree that
    /// will be written on the first commit.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tree = match fs::read(&path) {
            Ok(bytes) => {
                let records: BTreeMap<String, NodeRecord> = serde_json::from_slice(&bytes)?;
                info!("Loaded {} nodes from snapshot {}", records.len(), path.display());
                Tree::from_records(records)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No snapshot at {}, starting empty", path.display());
                Tree::empty()
            }
            Err(source) => return Err(RepositoryError::Snapshot { path, source }),
        };

        Ok(Self {
            tree: RwLock::new(tree),
            snapshot: Some(path),
            persist: Mutex::new(()),
            commits: AtomicU64::new(0),
        })
    }

    /// Returns the number of commits applied since creation.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Returns the total number of nodes, root included.
    pub fn node_count(&self) -> Result<usize> {
        Ok(self.read()?.nodes.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tree>> {
        self.tree
            .read()
            .map_err(|_| RepositoryError::Unavailable("tree lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tree>> {
        self.tree
            .write()
            .map_err(|_| RepositoryError::Unavailable("tree lock poisoned".to_string()))
    }

    // Writes to a unique temp file next to the snapshot, then renames it over.
    fn write_snapshot(path: &Path, records: &BTreeMap<String, NodeRecord>) -> Result<()> {
        let bytes = serde_json::to_vec(records)?;
        let failed = |source| RepositoryError::Snapshot {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(failed)?;
        file.write_all(&bytes).map_err(failed)?;
        file.persist(path).map_err(|e| failed(e.error))?;
        Ok(())
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository for MemoryRepository {
    fn node(&self, path: &str) -> Result<Option<NodeRecord>> {
        Ok(self.read()?.nodes.get(path).map(|slot| slot.record.clone()))
    }

    fn child_names(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .nodes
            .get(path)
            .map(|slot| slot.children.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn apply(&self, changes: &ChangeSet) -> Result<()> {
        let _persist = match self.snapshot {
            Some(_) => Some(self.persist.lock().map_err(|_| {
                RepositoryError::Unavailable("snapshot lock poisoned".to_string())
            })?),
            None => None,
        };

        let (undo, records) = {
            let mut tree = self.write()?;
            let mut undo = Vec::with_capacity(changes.len());
            for change in changes.iter() {
                if let Err(e) = tree.apply_one(change, &mut undo) {
                    tree.rollback(undo);
                    return Err(e);
                }
            }
            let records = self.snapshot.as_ref().map(|_| tree.records());
            (undo, records)
        };

        // No other commit can land while `_persist` is held, so the undo log
        // still matches the tree.
        if let (Some(path), Some(records)) = (&self.snapshot, records) {
            if let Err(e) = Self::write_snapshot(path, &records) {
                self.write()?.rollback(undo);
                return Err(e);
            }
        }

        self.commits.fetch_add(1, Ordering::Relaxed);
        debug!("Applied change set with {} changes", changes.len());
        Ok(())
    }
}
