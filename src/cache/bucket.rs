//! Bucket Module
//!
//! Maps a key's hash to a fixed chain of bucket nodes below the cache root,
//! so no single node ends up with an unbounded number of children.

use crate::cache::CacheKey;
use crate::error::{Result, StoreError};
use crate::repository::{join, NodeRecord, Session};

/// Node type of bucket nodes.
pub const BUCKET_TYPE: &str = "cache:bucket";

/// Width the hash is zero-padded to before slicing. Fits any `u32`.
pub const HASH_WIDTH: usize = 10;

/// Width of every bucket segment name.
pub const SEGMENT_WIDTH: usize = 5;

// == Path Resolution ==
/// Computes the bucket segment names for a hash.
///
/// The hash is reinterpreted as unsigned, rendered in decimal, zero-padded
/// to [`HASH_WIDTH`], cut into `depth` slices of `ceil(HASH_WIDTH / depth)`
/// digits (the last slice takes what is left, slices past the end are
/// empty), and each slice is zero-padded to [`SEGMENT_WIDTH`].
///
/// # Example
/// ```
/// use http_tree_cache::cache::bucket_segments;
///
/// assert_eq!(bucket_segments(1002021887, 3), ["01002", "00218", "00087"]);
/// ```
pub fn bucket_segments(hash: i32, depth: usize) -> Vec<String> {
    let depth = depth.max(1);
    let padded = format!("{:0>width$}", hash as u32, width = HASH_WIDTH);
    let slice_len = HASH_WIDTH.div_ceil(depth);

    (0..depth)
        .map(|i| {
            let start = (i * slice_len).min(padded.len());
            let end = (start + slice_len).min(padded.len());
            format!("{:0>width$}", &padded[start..end], width = SEGMENT_WIDTH)
        })
        .collect()
}

// == Bucket Node Factory ==
/// Resolves and creates the bucket chain of a key.
///
/// Only ever adds nodes and never commits; the caller owns the session.
#[derive(Debug, Clone)]
pub struct BucketNodeFactory {
    root_path: String,
    depth: usize,
}

impl BucketNodeFactory {
    pub fn new(root_path: impl Into<String>, depth: usize) -> Self {
        Self {
            root_path: root_path.into(),
            depth,
        }
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Full path of the leaf bucket for a key, whether or not it exists.
    pub fn leaf_path<K: CacheKey>(&self, key: &K) -> String {
        bucket_segments(key.hash_code(), self.depth)
            .iter()
            .fold(self.root_path.clone(), |path, segment| join(&path, segment))
    }

    /// Returns the leaf bucket path if the whole chain exists.
    pub fn resolve<K: CacheKey>(&self, session: &Session<'_>, key: &K) -> Result<Option<String>> {
        self.check_root(session)?;
        let leaf = self.leaf_path(key);
        Ok(session.node_exists(&leaf)?.then_some(leaf))
    }

    /// Returns the leaf bucket path, creating missing buckets on the way.
    ///
    /// Calling it again with the same key returns the same path.
    pub fn get_or_create<K: CacheKey>(&self, session: &mut Session<'_>, key: &K) -> Result<String> {
        self.check_root(session)?;
        let mut path = self.root_path.clone();
        for segment in bucket_segments(key.hash_code(), self.depth) {
            let next = join(&path, &segment);
            if !session.node_exists(&next)? {
                session.add_node(&path, &segment, NodeRecord::new(BUCKET_TYPE))?;
            }
            path = next;
        }
        Ok(path)
    }

    fn check_root(&self, session: &Session<'_>) -> Result<()> {
        if session.node_exists(&self.root_path)? {
            Ok(())
        } else {
            Err(StoreError::BucketPath(self.root_path.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RequestKey;
    use crate::repository::{ensure_path, MemoryRepository, Repository};

    #[test]
    fn test_segments_table() {
        let cases: &[(i32, usize, &[&str])] = &[
            (1002021887, 3, &["01002", "00218", "00087"]),
            (1002021887, 1, &["1002021887"]),
            (1002021887, 2, &["10020", "21887"]),
            (42, 2, &["00000", "00042"]),
            (0, 4, &["00000", "00000", "00000", "00000"]),
            (1234567890, 4, &["00123", "00456", "00789", "00000"]),
            (1234567890, 10, &["00001", "00002", "00003", "00004", "00005",
                               "00006", "00007", "00008", "00009", "00000"]),
        ];

        for (hash, depth, expected) in cases {
            assert_eq!(
                bucket_segments(*hash, *depth),
                *expected,
                "hash {hash} depth {depth}"
            );
        }
    }

    #[test]
    fn test_segments_are_deterministic() {
        assert_eq!(bucket_segments(-17, 3), bucket_segments(-17, 3));
    }

    #[test]
    fn test_negative_hash_is_masked_to_unsigned() {
        // -1 as u32 = 4294967295
        assert_eq!(bucket_segments(-1, 2), ["42949", "67295"]);
        assert_ne!(bucket_segments(-5, 2), bucket_segments(5, 2));
        assert_eq!(bucket_segments(i32::MIN, 1), ["2147483648"]);
    }

    #[test]
    fn test_depth_past_width_pads_empty_slices() {
        let segments = bucket_segments(7, 7);
        assert_eq!(segments.len(), 7);
        assert!(segments.iter().all(|s| s.len() == SEGMENT_WIDTH));
        assert_eq!(segments[4], "00007");
        assert_eq!(segments[5], "00000");
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let repo = MemoryRepository::new();
        let mut session = Session::new(&repo);
        ensure_path(&mut session, "/var/httpcache", "folder").unwrap();

        let factory = BucketNodeFactory::new("/var/httpcache", 3);
        let key = RequestKey::new("/a.html", "/a", ["g"]);

        let first = factory.get_or_create(&mut session, &key).unwrap();
        let pending = session.pending();
        let second = factory.get_or_create(&mut session, &key).unwrap();

        assert_eq!(first, second);
        assert_eq!(session.pending(), pending, "second call must not add nodes");
        assert_eq!(first, factory.leaf_path(&key));

        session.commit().unwrap();
        assert_eq!(
            repo.node(&first).unwrap().unwrap().node_type,
            BUCKET_TYPE
        );
    }

    #[test]
    fn test_resolve_has_no_side_effects() {
        let repo = MemoryRepository::new();
        let mut session = Session::new(&repo);
        ensure_path(&mut session, "/var/httpcache", "folder").unwrap();
        session.commit().unwrap();

        let factory = BucketNodeFactory::new("/var/httpcache", 3);
        let key = RequestKey::new("/a.html", "/a", ["g"]);

        assert_eq!(factory.resolve(&session, &key).unwrap(), None);
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn test_missing_root_is_a_bucket_path_error() {
        let repo = MemoryRepository::new();
        let mut session = Session::new(&repo);
        let factory = BucketNodeFactory::new("/var/httpcache", 3);
        let key = RequestKey::new("/a.html", "/a", ["g"]);

        assert!(matches!(
            factory.get_or_create(&mut session, &key),
            Err(StoreError::BucketPath(_))
        ));
        assert!(matches!(
            factory.resolve(&session, &key),
            Err(StoreError::BucketPath(_))
        ));
    }
}
