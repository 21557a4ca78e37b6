//! Traversal Module
//!
//! One depth-first walk over the bucket tree, driven by a [`Strategy`] of
//! two closures. Child buckets are walked before the entries next to them,
//! and a bucket is judged only after everything below it was processed, so
//! emptiness is observed after the removals that caused it.
//!
//! Removals are buffered in the session and committed every
//! `delta_threshold` removals, plus once at the end for the remainder.

use tracing::{debug, warn};

use crate::cache::bucket::BUCKET_TYPE;
use crate::cache::entry::{EntryReader, ENTRY_TYPE};
use crate::error::{Result, StoreError};
use crate::repository::{join, Session};

// == Decisions ==
/// What to do with the node just visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Keep,
    Remove,
    /// End the walk; nothing after this node is visited
    Stop,
}

/// A bucket as seen after its subtree was processed.
#[derive(Debug, Clone, Copy)]
pub struct BucketVisit<'a> {
    pub path: &'a str,
    /// Levels below the cache root, starting at 1
    pub depth: usize,
    /// No children or entries are left below the bucket
    pub is_empty: bool,
}

/// Per-pass decision functions.
pub struct Strategy<E, B> {
    pub on_entry: E,
    pub on_bucket: B,
}

impl<E> Strategy<E, fn(&BucketVisit<'_>) -> Step>
where
    E: FnMut(&EntryReader<'_>) -> Step,
{
    /// A strategy that never touches buckets.
    pub fn entries_only(on_entry: E) -> Self {
        Self {
            on_entry,
            on_bucket: keep_bucket,
        }
    }
}

fn keep_bucket(_: &BucketVisit<'_>) -> Step {
    Step::Keep
}

/// Remove a bucket once nothing is left below it.
pub fn remove_if_empty(bucket: &BucketVisit<'_>) -> Step {
    if bucket.is_empty {
        Step::Remove
    } else {
        Step::Keep
    }
}

// == Pass Report ==
/// Totals of one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub entries_visited: usize,
    pub entries_removed: usize,
    pub buckets_removed: usize,
    pub commits: usize,
    /// The strategy ended the walk early
    pub stopped: bool,
}

impl PassReport {
    /// Entry and bucket removals together.
    pub fn removals(&self) -> usize {
        self.entries_removed + self.buckets_removed
    }
}

// == Traversal ==
/// A walk over the subtree of one root node.
pub struct Traversal<'s, 'r> {
    session: &'s mut Session<'r>,
    root: String,
    delta_threshold: usize,
    pending: usize,
    report: PassReport,
}

enum Flow {
    Continue,
    Stop,
}

impl<'s, 'r> Traversal<'s, 'r> {
    /// Prepares a walk below `root`. A `delta_threshold` of 0 is treated as 1.
    pub fn new(session: &'s mut Session<'r>, root: impl Into<String>, delta_threshold: usize) -> Self {
        Self {
            session,
            root: root.into(),
            delta_threshold: delta_threshold.max(1),
            pending: 0,
            report: PassReport::default(),
        }
    }

    /// Runs the walk, committing outstanding removals before returning.
    ///
    /// The root itself is never removed. A failed commit ends the walk with
    /// [`StoreError::Commit`]; batches committed before it stay durable.
    pub fn run<E, B>(mut self, strategy: &mut Strategy<E, B>) -> Result<PassReport>
    where
        E: FnMut(&EntryReader<'_>) -> Step,
        B: FnMut(&BucketVisit<'_>) -> Step,
    {
        if !self.session.node_exists(&self.root)? {
            return Err(StoreError::BucketPath(self.root.clone()));
        }

        let root = self.root.clone();
        if let Flow::Stop = self.walk(&root, 0, strategy)? {
            self.report.stopped = true;
        }
        self.flush()?;

        debug!(
            "Traversal of {} done: visited={} removed={} buckets_removed={} commits={}",
            self.root,
            self.report.entries_visited,
            self.report.entries_removed,
            self.report.buckets_removed,
            self.report.commits
        );
        Ok(self.report)
    }

    fn walk<E, B>(&mut self, path: &str, depth: usize, strategy: &mut Strategy<E, B>) -> Result<Flow>
    where
        E: FnMut(&EntryReader<'_>) -> Step,
        B: FnMut(&BucketVisit<'_>) -> Step,
    {
        let mut entries = Vec::new();

        for name in self.session.child_names(path)? {
            let child = join(path, &name);
            let Some(record) = self.session.node(&child)? else {
                continue;
            };
            if record.is_type(BUCKET_TYPE) {
                if let Flow::Stop = self.walk(&child, depth + 1, strategy)? {
                    return Ok(Flow::Stop);
                }
            } else if record.is_type(ENTRY_TYPE) {
                entries.push((child, record));
            }
        }

        for (entry_path, record) in &entries {
            self.report.entries_visited += 1;
            match (strategy.on_entry)(&EntryReader::new(entry_path, record)) {
                Step::Keep => {}
                Step::Remove => {
                    if self.remove(entry_path)? {
                        self.report.entries_removed += 1;
                    }
                }
                Step::Stop => return Ok(Flow::Stop),
            }
        }

        if depth > 0 {
            let visit = BucketVisit {
                path,
                depth,
                is_empty: !self.session.has_children(path)?,
            };
            if (strategy.on_bucket)(&visit) == Step::Remove && self.remove(path)? {
                self.report.buckets_removed += 1;
            }
        }

        Ok(Flow::Continue)
    }

    /// Returns false when the node was already gone, e.g. removed by a
    /// concurrent pass.
    fn remove(&mut self, path: &str) -> Result<bool> {
        if !self.session.remove_node(path)? {
            return Ok(false);
        }
        self.pending += 1;
        if self.pending >= self.delta_threshold {
            self.flush()?;
        }
        Ok(true)
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        if let Err(e) = self.session.commit() {
            warn!(
                "Commit of {} buffered removals under {} failed: {}",
                self.pending, self.root, e
            );
            return Err(StoreError::Commit(e));
        }
        self.report.commits += 1;
        self.pending = 0;
        Ok(())
    }
}
