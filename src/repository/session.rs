//! Session Module
//!
//! A session buffers mutations over the committed tree until `commit`.
//! Reads through a session see its own pending changes.

use std::collections::BTreeMap;

use super::{
    join, validate_path, Change, ChangeSet, NodeRecord, Repository, RepositoryError, Result,
    Value, ROOT,
};

// == Session ==
/// Exclusively owned unit of work against a [`Repository`].
///
/// A session is not shared between threads; each store operation (or each
/// bulk pass) opens its own.
pub struct Session<'r> {
    repository: &'r dyn Repository,
    changes: ChangeSet,
    /// Pending view: `Some` = added in this session, `None` = removed
    overlay: BTreeMap<String, Option<NodeRecord>>,
}

impl<'r> Session<'r> {
    /// Opens a session with no pending changes.
    pub fn new(repository: &'r dyn Repository) -> Self {
        Self {
            repository,
            changes: ChangeSet::new(),
            overlay: BTreeMap::new(),
        }
    }

    // == Reads ==
    /// Returns the node at `path` as seen by this session.
    pub fn node(&self, path: &str) -> Result<Option<NodeRecord>> {
        match self.overlay.get(path) {
            Some(pending) => Ok(pending.clone()),
            None => self.repository.node(path),
        }
    }

    pub fn node_exists(&self, path: &str) -> Result<bool> {
        match self.overlay.get(path) {
            Some(pending) => Ok(pending.is_some()),
            None => Ok(self.repository.node(path)?.is_some()),
        }
    }

    /// Returns a single property of the node at `path`.
    pub fn property(&self, path: &str, name: &str) -> Result<Option<Value>> {
        Ok(self
            .node(path)?
            .and_then(|record| record.properties.get(name).cloned()))
    }

    /// Returns the sorted names of the visible children of `path`.
    pub fn child_names(&self, path: &str) -> Result<Vec<String>> {
        if !self.node_exists(path)? {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = self
            .repository
            .child_names(path)?
            .into_iter()
            .filter(|name| !matches!(self.overlay.get(&join(path, name)), Some(None)))
            .collect();

        for (child_path, pending) in self.pending_children(path) {
            let name = super::name(child_path);
            if pending.is_some() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    pub fn has_children(&self, path: &str) -> Result<bool> {
        Ok(!self.child_names(path)?.is_empty())
    }

    fn pending_children<'a>(
        &'a self,
        path: &str,
    ) -> impl Iterator<Item = (&'a str, &'a Option<NodeRecord>)> + 'a {
        let prefix = if path == ROOT {
            ROOT.to_string()
        } else {
            format!("{path}/")
        };
        let skip = prefix.len();
        self.overlay
            .range(prefix.clone()..)
            .take_while(move |(p, _)| p.starts_with(&prefix))
            .filter(move |(p, _)| {
                let rest = &p[skip..];
                !rest.is_empty() && !rest.contains('/')
            })
            .map(|(p, pending)| (p.as_str(), pending))
    }

    // == Mutations ==
    /// Adds a child node named `name` under `parent`, returning its path.
    ///
    /// Adding over an existing node replaces its record and keeps its
    /// children.
    pub fn add_node(&mut self, parent: &str, name: &str, record: NodeRecord) -> Result<String> {
        let path = join(parent, name);
        validate_path(&path)?;
        if !self.node_exists(parent)? {
            return Err(RepositoryError::ParentMissing(path));
        }

        self.overlay.insert(path.clone(), Some(record.clone()));
        self.changes.push(Change::Add {
            path: path.clone(),
            record,
        });
        Ok(path)
    }

    /// Removes the node at `path` together with its subtree.
    ///
    /// Removing a missing node is a no-op. Returns whether a node was removed.
    pub fn remove_node(&mut self, path: &str) -> Result<bool> {
        if path == ROOT {
            return Err(RepositoryError::InvalidPath(path.to_string()));
        }
        if !self.node_exists(path)? {
            return Ok(false);
        }

        let mut doomed = Vec::new();
        self.collect_subtree(path, &mut doomed)?;
        for p in doomed {
            self.overlay.insert(p, None);
        }
        self.changes.push(Change::Remove {
            path: path.to_string(),
        });
        Ok(true)
    }

    fn collect_subtree(&self, path: &str, out: &mut Vec<String>) -> Result<()> {
        for child in self.child_names(path)? {
            self.collect_subtree(&join(path, &child), out)?;
        }
        out.push(path.to_string());
        Ok(())
    }

    // == Commit ==
    /// Number of buffered changes.
    pub fn pending(&self) -> usize {
        self.changes.len()
    }

    /// Applies every buffered change atomically.
    ///
    /// On failure the buffered changes are kept, so the caller may retry or
    /// call [`Session::discard`].
    pub fn commit(&mut self) -> Result<()> {
        if self.changes.is_empty() {
            return Ok(());
        }
        self.repository.apply(&self.changes)?;
        self.discard();
        Ok(())
    }

    /// Drops every buffered change.
    pub fn discard(&mut self) {
        self.changes.clear();
        self.overlay.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;

    #[test]
    fn test_pending_changes_visible_before_commit() {
        let repo = MemoryRepository::new();
        let mut session = Session::new(&repo);

        session.add_node(ROOT, "a", NodeRecord::new("folder")).unwrap();
        session.add_node("/a", "b", NodeRecord::new("folder")).unwrap();

        assert!(session.node_exists("/a/b").unwrap());
        assert_eq!(session.child_names("/a").unwrap(), vec!["b"]);
        // Not committed yet
        assert!(repo.node("/a").unwrap().is_none());

        session.commit().unwrap();
        assert!(repo.node("/a/b").unwrap().is_some());
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn test_add_requires_parent() {
        let repo = MemoryRepository::new();
        let mut session = Session::new(&repo);

        let result = session.add_node("/missing", "child", NodeRecord::new("folder"));
        assert!(matches!(result, Err(RepositoryError::ParentMissing(_))));
    }

    #[test]
    fn test_remove_hides_subtree_in_session() {
        let repo = MemoryRepository::new();
        let mut session = Session::new(&repo);
        session.add_node(ROOT, "a", NodeRecord::new("folder")).unwrap();
        session.add_node("/a", "b", NodeRecord::new("folder")).unwrap();
        session.commit().unwrap();

        assert!(session.remove_node("/a").unwrap());
        assert!(!session.node_exists("/a/b").unwrap());
        assert!(session.child_names(ROOT).unwrap().is_empty());
        assert!(!session.remove_node("/a").unwrap());

        session.commit().unwrap();
        assert!(repo.node("/a").unwrap().is_none());
    }

    #[test]
    fn test_child_names_merge_committed_and_pending() {
        let repo = MemoryRepository::new();
        let mut session = Session::new(&repo);
        session.add_node(ROOT, "b", NodeRecord::new("folder")).unwrap();
        session.commit().unwrap();

        session.add_node(ROOT, "a", NodeRecord::new("folder")).unwrap();
        session.add_node(ROOT, "c", NodeRecord::new("folder")).unwrap();
        session.add_node("/a", "deep", NodeRecord::new("folder")).unwrap();

        assert_eq!(session.child_names(ROOT).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_discard_drops_pending() {
        let repo = MemoryRepository::new();
        let mut session = Session::new(&repo);
        session.add_node(ROOT, "a", NodeRecord::new("folder")).unwrap();
        session.discard();

        assert!(!session.node_exists("/a").unwrap());
        session.commit().unwrap();
        assert_eq!(repo.commit_count(), 0);
    }

    #[test]
    fn test_property_read() {
        let repo = MemoryRepository::new();
        let mut session = Session::new(&repo);
        session
            .add_node(ROOT, "a", NodeRecord::new("folder").with("n", Value::Long(3)))
            .unwrap();

        assert_eq!(session.property("/a", "n").unwrap(), Some(Value::Long(3)));
        assert_eq!(session.property("/a", "missing").unwrap(), None);
    }
}
