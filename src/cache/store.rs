//! Cache Store Module
//!
//! Orchestrates bucket resolution, entry reads and writes, and the bulk
//! passes over one cache root. Every operation opens its own session.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::bucket::BucketNodeFactory;
use crate::cache::entry::{find_entry, EntryNode, EntryWriter};
use crate::cache::traversal::PassReport;
use crate::cache::{visitors, CacheContent, CacheKey, CacheStats, StatsCounters};
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::repository::{ensure_path, parent, Repository, RepositoryError, Session};

/// Node type used when creating the cache root.
pub const FOLDER_TYPE: &str = "cache:folder";

// A put whose bucket vanished under a concurrent purge is retried this often.
const MAX_PUT_ATTEMPTS: usize = 3;

// == Cache Store ==
/// Persistent HTTP cache over a hash-bucketed node tree.
///
/// Safe to share between threads; single-key operations commit
/// immediately, bulk passes commit in batches of the configured delta
/// threshold.
pub struct CacheStore<K> {
    repository: Arc<dyn Repository>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    buckets: BucketNodeFactory,
    writer: EntryWriter,
    counters: StatsCounters,
    _key: PhantomData<fn() -> K>,
}

impl<K: CacheKey> CacheStore<K> {
    // == Constructor ==
    /// Creates a store over `repository` after validating `config`.
    ///
    /// The root node is not created here; see [`CacheStore::ensure_root`].
    pub fn new(repository: Arc<dyn Repository>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            buckets: BucketNodeFactory::new(config.root_path.clone(), config.bucket_depth),
            writer: EntryWriter::new(config.ttl),
            repository,
            config,
            clock: Arc::new(SystemClock),
            counters: StatsCounters::new(),
            _key: PhantomData,
        })
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Creates the root node (and its ancestors) if missing.
    pub fn ensure_root(&self) -> Result<()> {
        let mut session = self.session();
        ensure_path(&mut session, &self.config.root_path, FOLDER_TYPE)?;
        session.commit().map_err(StoreError::Commit)
    }

    fn session(&self) -> Session<'_> {
        Session::new(self.repository.as_ref())
    }

    fn root(&self) -> &str {
        &self.config.root_path
    }

    // == Put ==
    /// Stores `content` for `key`, replacing any previous entry.
    pub fn put(&self, key: &K, content: &CacheContent) -> Result<()> {
        if content.size() > self.config.max_size_bytes {
            return Err(StoreError::TooLarge {
                size: content.size(),
                max: self.config.max_size_bytes,
            });
        }

        let mut attempt = 1;
        loop {
            match self.try_put(key, content) {
                Ok(path) => {
                    debug!("Stored {} at {}", key, path);
                    return Ok(());
                }
                Err(e) if attempt < MAX_PUT_ATTEMPTS && is_parent_missing(&e) => {
                    debug!("Bucket removed during put of {} ({}), retrying", key, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn try_put(&self, key: &K, content: &CacheContent) -> Result<String> {
        let mut session = self.session();
        let bucket = self.buckets.get_or_create(&mut session, key)?;
        let path = self
            .writer
            .write(&mut session, &bucket, key, content, self.clock.now_millis())?;
        session.commit().map_err(StoreError::Commit)?;
        Ok(path)
    }

    // == Get ==
    /// Returns the content of `key` if a live entry exists.
    ///
    /// Expired and unreadable entries read as a miss and are left in place
    /// for the purge pass.
    pub fn get(&self, key: &K) -> Result<Option<CacheContent>> {
        let session = self.session();
        let content = self.live_entry(&session, key)?.and_then(|entry| {
            entry
                .reader()
                .content()
                .map_err(|e| warn!("Treating unreadable entry as a miss: {}", e))
                .ok()
        });

        if content.is_some() {
            self.counters.record_hit();
        } else {
            self.counters.record_miss();
        }
        Ok(content)
    }

    // == Contains ==
    /// Whether `get` would return content, without decoding the payload.
    pub fn contains(&self, key: &K) -> Result<bool> {
        let session = self.session();
        Ok(self.live_entry(&session, key)?.is_some())
    }

    fn live_entry(&self, session: &Session<'_>, key: &K) -> Result<Option<EntryNode>> {
        let Some(bucket) = self.buckets.resolve(session, key)? else {
            return Ok(None);
        };
        let Some(entry) = find_entry(session, &bucket, key)? else {
            return Ok(None);
        };

        let reader = entry.reader();
        let live = reader
            .is_expired(self.clock.now_millis())
            .and_then(|expired| reader.check_content().map(|()| !expired));
        match live {
            Ok(true) => Ok(Some(entry)),
            Ok(false) => Ok(None),
            Err(e) => {
                warn!("Treating unreadable entry as a miss: {}", e);
                Ok(None)
            }
        }
    }

    // == Invalidate ==
    /// Removes the entry of `key` and every bucket this leaves empty, up to
    /// but excluding the root. Returns whether an entry was removed.
    pub fn invalidate(&self, key: &K) -> Result<bool> {
        let mut session = self.session();
        let Some(bucket) = self.buckets.resolve(&session, key)? else {
            return Ok(false);
        };
        let Some(entry) = find_entry(&session, &bucket, key)? else {
            return Ok(false);
        };

        session.remove_node(&entry.path)?;

        let mut current = bucket;
        while current != self.root() && !session.has_children(&current)? {
            session.remove_node(&current)?;
            match parent(&current).map(str::to_string) {
                Some(next) => current = next,
                None => break,
            }
        }

        session.commit().map_err(StoreError::Commit)?;
        debug!("Invalidated {}", key);
        Ok(true)
    }

    // == Invalidate All ==
    /// Removes every entry and bucket; the root node stays.
    pub fn invalidate_all(&self) -> Result<PassReport> {
        let mut session = self.session();
        let report =
            visitors::invalidate_all(&mut session, self.root(), self.config.delta_save_threshold)?;
        info!(
            "Invalidated all: {} entries, {} buckets, {} commits",
            report.entries_removed, report.buckets_removed, report.commits
        );
        Ok(report)
    }

    // == Invalidate Matching ==
    /// Removes every entry whose key `keep` returns false for.
    pub fn invalidate_matching<P>(&self, keep: P) -> Result<PassReport>
    where
        P: FnMut(&K) -> bool,
    {
        let mut session = self.session();
        let report = visitors::invalidate_matching(
            &mut session,
            self.root(),
            self.config.delta_save_threshold,
            keep,
        )?;
        info!(
            "Invalidated {} matching entries, {} buckets, {} commits",
            report.entries_removed, report.buckets_removed, report.commits
        );
        Ok(report)
    }

    /// Removes every entry made stale by `trigger`.
    pub fn invalidate_related(&self, trigger: &K) -> Result<PassReport> {
        self.invalidate_matching(|key| !key.is_invalidated_by(trigger))
    }

    // == Purge Expired ==
    /// Physically removes every entry expired as of now.
    pub fn purge_expired(&self) -> Result<PassReport> {
        let mut session = self.session();
        let report = visitors::purge_expired(
            &mut session,
            self.root(),
            self.config.delta_save_threshold,
            self.clock.now_millis(),
        )?;
        self.counters.record_purged(report.entries_removed);
        Ok(report)
    }

    // == Aggregates ==
    /// Number of stored entry nodes, expired ones included.
    pub fn size(&self) -> Result<usize> {
        visitors::count_entries(&mut self.session(), self.root())
    }

    /// Payload bytes of all stored entries.
    pub fn total_bytes(&self) -> Result<u64> {
        visitors::total_size(&mut self.session(), self.root())
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> Result<CacheStats> {
        Ok(self
            .counters
            .snapshot(self.size()?, self.total_bytes()?, self.config.max_size_bytes))
    }

    // == Administration ==
    /// Every readable entry with its content.
    pub fn entries(&self) -> Result<Vec<(K, CacheContent)>> {
        visitors::build_map(&mut self.session(), self.root())
    }

    /// Display strings of every readable key, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries()?
            .into_iter()
            .map(|(key, _)| key.to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Looks an entry up by the display string of its key.
    ///
    /// Expiry is not checked; administrators see what is stored.
    pub fn find(&self, key_string: &str) -> Result<Option<(K, CacheContent)>> {
        visitors::find_by_key_string(&mut self.session(), self.root(), key_string)
    }

    /// Invalidates the entry whose key renders as `key_string`.
    pub fn invalidate_by_string(&self, key_string: &str) -> Result<bool> {
        match self.find(key_string)? {
            Some((key, _)) => self.invalidate(&key),
            None => Ok(false),
        }
    }
}

// A bucket vanished under a concurrent bulk pass, either while staging the
// write or when committing it.
fn is_parent_missing(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Commit(RepositoryError::ParentMissing(_))
            | StoreError::Repository(RepositoryError::ParentMissing(_))
    )
}
