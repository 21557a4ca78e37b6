//! Cache Key Module
//!
//! The identity contract every cached request must satisfy, plus the
//! request-based key used by the server.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// == Cache Key Contract ==
/// Identity of a cached request.
///
/// Keys are persisted next to their content (serialized with serde) so that
/// bulk passes can rebuild them. The hash decides the bucket; two keys with
/// the same hash are still distinct unless they compare equal.
pub trait CacheKey:
    fmt::Display + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync
{
    /// Stable 32-bit hash. Must not change across process restarts.
    fn hash_code(&self) -> i32;

    /// Whether a change described by `other` makes this key stale.
    fn is_invalidated_by(&self, other: &Self) -> bool;
}

/// 31-multiplier hash over UTF-16 code units.
///
/// Stable across platforms and releases, unlike `std::hash`.
pub fn string_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

// == Request Key ==
/// Key of a rendered request: URI, the resource it renders, and the
/// authorization groups the response was produced for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestKey {
    uri: String,
    resource_path: String,
    groups: Vec<String>,
}

impl RequestKey {
    /// Creates a key; group order does not matter.
    pub fn new(
        uri: impl Into<String>,
        resource_path: impl Into<String>,
        groups: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut groups: Vec<String> = groups.into_iter().map(Into::into).collect();
        groups.sort();
        groups.dedup();
        Self {
            uri: uri.into(),
            resource_path: resource_path.into(),
            groups,
        }
    }

    /// A key describing a change to `resource_path`, used to drive
    /// invalidation of every key rendered from it or below it.
    pub fn for_resource(resource_path: impl Into<String>) -> Self {
        let resource_path = resource_path.into();
        Self::new(resource_path.clone(), resource_path, Vec::<String>::new())
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[resource:{}] [uri:{}] [groups:{}]",
            self.resource_path,
            self.uri,
            self.groups.join(",")
        )
    }
}

impl CacheKey for RequestKey {
    fn hash_code(&self) -> i32 {
        let mut h = string_hash(&self.uri);
        h = h.wrapping_mul(31).wrapping_add(string_hash(&self.resource_path));
        h.wrapping_mul(31)
            .wrapping_add(string_hash(&self.groups.join(",")))
    }

    fn is_invalidated_by(&self, other: &Self) -> bool {
        let changed = other.resource_path.trim_end_matches('/');
        if changed.is_empty() {
            return true;
        }
        self.resource_path == changed
            || self
                .resource_path
                .strip_prefix(changed)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_is_stable() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("hello"), 99_162_322);
        // Wraps like a 32-bit integer
        assert_eq!(string_hash("polygenelubricants"), i32::MIN);
    }

    #[test]
    fn test_group_order_does_not_change_identity() {
        let a = RequestKey::new("/content/page.html", "/content/page", ["editors", "admins"]);
        let b = RequestKey::new("/content/page.html", "/content/page", ["admins", "editors"]);
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_display() {
        let key = RequestKey::new("/content/page.html", "/content/page", ["a", "b"]);
        assert_eq!(
            key.to_string(),
            "[resource:/content/page] [uri:/content/page.html] [groups:a,b]"
        );
    }

    #[test]
    fn test_invalidated_by_same_or_ancestor_resource() {
        let key = RequestKey::new("/content/site/page.html", "/content/site/page", ["a"]);

        assert!(key.is_invalidated_by(&RequestKey::for_resource("/content/site/page")));
        assert!(key.is_invalidated_by(&RequestKey::for_resource("/content/site")));
        assert!(key.is_invalidated_by(&RequestKey::for_resource("/content/site/")));
        assert!(!key.is_invalidated_by(&RequestKey::for_resource("/content/sitemap")));
        assert!(!key.is_invalidated_by(&RequestKey::for_resource("/content/site/page/child")));
    }

    #[test]
    fn test_key_serde_roundtrip() {
        let key = RequestKey::new("/a.html", "/a", ["g"]);
        let json = serde_json::to_string(&key).unwrap();
        let back: RequestKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
