//! Bulk Passes
//!
//! The tree-wide operations of the store, each a [`Strategy`] run by the
//! shared [`Traversal`]. Unreadable entries are logged and skipped; they
//! never end a pass.

use tracing::warn;

use crate::cache::traversal::{remove_if_empty, BucketVisit, PassReport, Step, Strategy, Traversal};
use crate::cache::entry::EntryReader;
use crate::cache::{CacheContent, CacheKey};
use crate::error::Result;
use crate::repository::Session;

// Read-only passes never remove, so they never reach a commit.
const READ_ONLY: usize = usize::MAX;

// == Count All ==
/// Counts every entry node, readable or not, expired or not.
pub fn count_entries(session: &mut Session<'_>, root: &str) -> Result<usize> {
    let mut strategy = Strategy::entries_only(|_: &EntryReader<'_>| Step::Keep);
    Ok(Traversal::new(session, root, READ_ONLY)
        .run(&mut strategy)?
        .entries_visited)
}

// == Map Build ==
/// Materializes every readable entry as a (key, content) pair.
pub fn build_map<K: CacheKey>(session: &mut Session<'_>, root: &str) -> Result<Vec<(K, CacheContent)>> {
    let mut entries = Vec::new();
    let mut strategy = Strategy::entries_only(|entry: &EntryReader<'_>| {
        match entry.key::<K>().and_then(|key| Ok((key, entry.content()?))) {
            Ok(pair) => entries.push(pair),
            Err(e) => warn!("Skipping entry while building map: {}", e),
        }
        Step::Keep
    });
    Traversal::new(session, root, READ_ONLY).run(&mut strategy)?;
    Ok(entries)
}

// == Find By String Key ==
/// Finds the entry whose key renders as `key_string`, stopping at the first
/// match.
pub fn find_by_key_string<K: CacheKey>(
    session: &mut Session<'_>,
    root: &str,
    key_string: &str,
) -> Result<Option<(K, CacheContent)>> {
    let mut found = None;
    let mut strategy = Strategy::entries_only(|entry: &EntryReader<'_>| {
        let key = match entry.key::<K>() {
            Ok(key) => key,
            Err(e) => {
                warn!("Skipping entry while searching: {}", e);
                return Step::Keep;
            }
        };
        if key.to_string() != key_string {
            return Step::Keep;
        }
        match entry.content() {
            Ok(content) => {
                found = Some((key, content));
                Step::Stop
            }
            Err(e) => {
                warn!("Matching entry is unreadable: {}", e);
                Step::Keep
            }
        }
    });
    Traversal::new(session, root, READ_ONLY).run(&mut strategy)?;
    Ok(found)
}

// == Purge Expired ==
/// Removes every entry expired at `now_millis` and the buckets it empties.
pub fn purge_expired(
    session: &mut Session<'_>,
    root: &str,
    delta_threshold: usize,
    now_millis: i64,
) -> Result<PassReport> {
    let mut strategy = Strategy {
        on_entry: |entry: &EntryReader<'_>| match entry.is_expired(now_millis) {
            Ok(true) => Step::Remove,
            Ok(false) => Step::Keep,
            Err(e) => {
                warn!("Skipping entry while purging: {}", e);
                Step::Keep
            }
        },
        on_bucket: remove_if_empty,
    };
    Traversal::new(session, root, delta_threshold).run(&mut strategy)
}

// == Invalidate All ==
/// Removes every entry and every bucket below the root.
pub fn invalidate_all(session: &mut Session<'_>, root: &str, delta_threshold: usize) -> Result<PassReport> {
    let mut strategy = Strategy {
        on_entry: |_: &EntryReader<'_>| Step::Remove,
        on_bucket: |_: &BucketVisit<'_>| Step::Remove,
    };
    Traversal::new(session, root, delta_threshold).run(&mut strategy)
}

// == Invalidate Matching ==
/// Removes every entry whose key `keep` rejects, and the buckets it empties.
pub fn invalidate_matching<K, P>(
    session: &mut Session<'_>,
    root: &str,
    delta_threshold: usize,
    mut keep: P,
) -> Result<PassReport>
where
    K: CacheKey,
    P: FnMut(&K) -> bool,
{
    let mut strategy = Strategy {
        on_entry: |entry: &EntryReader<'_>| match entry.key::<K>() {
            Ok(key) if keep(&key) => Step::Keep,
            Ok(_) => Step::Remove,
            Err(e) => {
                warn!("Skipping entry while invalidating: {}", e);
                Step::Keep
            }
        },
        on_bucket: remove_if_empty,
    };
    Traversal::new(session, root, delta_threshold).run(&mut strategy)
}

// == Total Size ==
/// Sums the payload length of every readable entry.
pub fn total_size(session: &mut Session<'_>, root: &str) -> Result<u64> {
    let mut total = 0u64;
    let mut strategy = Strategy::entries_only(|entry: &EntryReader<'_>| {
        match entry.payload_len() {
            Ok(len) => total += len,
            Err(e) => warn!("Skipping entry while sizing: {}", e),
        }
        Step::Keep
    });
    Traversal::new(session, root, READ_ONLY).run(&mut strategy)?;
    Ok(total)
}
