//! Cache Entry Module
//!
//! Writes (key, content) pairs as entry nodes and reads them back.
//!
//! Entry node layout:
//! ```text
//! {bucket}/{key digest}      type cache:entry
//!   key          String   serialized cache key
//!   status       Long
//!   charEncoding String
//!   contentType  String
//!   header:{n}   Strings  one property per header name
//!   payload      Binary
//!   created      Long     Unix milliseconds
//!   expiresAt    Long     Unix milliseconds, absent = never expires
//! ```
//!
//! The node name is the SHA-256 of the serialized key, so concurrent
//! writes of one key land on the same node and the last commit wins.

use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::cache::content::{is_excluded_header, HeaderMap};
use crate::cache::{CacheContent, CacheKey};
use crate::error::{Result, StoreError};
use crate::repository::{join, NodeRecord, Session, Value};

/// Node type of entry nodes.
pub const ENTRY_TYPE: &str = "cache:entry";

const PROP_KEY: &str = "key";
const PROP_STATUS: &str = "status";
const PROP_CHAR_ENCODING: &str = "charEncoding";
const PROP_CONTENT_TYPE: &str = "contentType";
const PROP_PAYLOAD: &str = "payload";
const PROP_CREATED: &str = "created";
const PROP_EXPIRES_AT: &str = "expiresAt";
const HEADER_PREFIX: &str = "header:";

// == Entry Writer ==
/// Persists entries below a bucket node.
#[derive(Debug, Clone)]
pub struct EntryWriter {
    ttl: Option<Duration>,
}

impl EntryWriter {
    /// Creates a writer; `ttl` of None writes entries that never expire.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self { ttl }
    }

    /// Writes `content` for `key` below `bucket`, replacing any entry for an
    /// equal key in the same bucket. Returns the new entry's path.
    ///
    /// Nothing is committed.
    pub fn write<K: CacheKey>(
        &self,
        session: &mut Session<'_>,
        bucket: &str,
        key: &K,
        content: &CacheContent,
        now_millis: i64,
    ) -> Result<String> {
        // Serialize before touching the tree so a failure leaves it untouched
        let key_json = serde_json::to_string(key)
            .map_err(|e| StoreError::Serialization(format!("cache key {key}: {e}")))?;

        let mut record = NodeRecord::new(ENTRY_TYPE)
            .with(PROP_STATUS, Value::Long(i64::from(content.status())))
            .with(PROP_CHAR_ENCODING, Value::String(content.char_encoding().to_string()))
            .with(PROP_CONTENT_TYPE, Value::String(content.content_type().to_string()))
            .with(PROP_PAYLOAD, Value::Binary(content.shared_data()))
            .with(PROP_CREATED, Value::Long(now_millis));

        if let Some(expires_at) = self.expires_at(now_millis) {
            record = record.with(PROP_EXPIRES_AT, Value::Long(expires_at));
        }

        for (name, values) in content.headers() {
            if !is_excluded_header(name) {
                record = record.with(format!("{HEADER_PREFIX}{name}"), Value::Strings(values.clone()));
            }
        }

        let name = entry_name(&key_json);
        if let Some(existing) = find_entry(session, bucket, key)? {
            if existing.path != join(bucket, &name) {
                session.remove_node(&existing.path)?;
            }
        }

        let record = record.with(PROP_KEY, Value::String(key_json));
        Ok(session.add_node(bucket, &name, record)?)
    }

    fn expires_at(&self, now_millis: i64) -> Option<i64> {
        self.ttl.map(|ttl| {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now_millis.saturating_add(ttl_ms)
        })
    }
}

/// Node name of the entry for a serialized key.
pub fn entry_name(key_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_json.as_bytes());
    hex::encode(hasher.finalize())
}

// == Entry Node ==
/// An entry node loaded from the tree.
#[derive(Debug, Clone)]
pub struct EntryNode {
    pub path: String,
    pub record: NodeRecord,
}

impl EntryNode {
    pub fn reader(&self) -> EntryReader<'_> {
        EntryReader::new(&self.path, &self.record)
    }
}

/// Finds the entry of `key` among the entries of `bucket`.
///
/// Entries whose key cannot be decoded are logged and skipped.
pub fn find_entry<K: CacheKey>(
    session: &Session<'_>,
    bucket: &str,
    key: &K,
) -> Result<Option<EntryNode>> {
    for name in session.child_names(bucket)? {
        let path = join(bucket, &name);
        let Some(record) = session.node(&path)? else {
            continue;
        };
        if !record.is_type(ENTRY_TYPE) {
            continue;
        }
        match EntryReader::new(&path, &record).key::<K>() {
            Ok(stored) if stored == *key => return Ok(Some(EntryNode { path, record })),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry: {}", e),
        }
    }
    Ok(None)
}

// == Entry Reader ==
/// Decodes the properties of one entry node.
///
/// Every accessor fails with [`StoreError::Deserialization`] when the
/// property it needs is missing or malformed.
#[derive(Debug, Clone, Copy)]
pub struct EntryReader<'a> {
    path: &'a str,
    record: &'a NodeRecord,
}

impl<'a> EntryReader<'a> {
    pub fn new(path: &'a str, record: &'a NodeRecord) -> Self {
        Self { path, record }
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    /// Rebuilds the cache key the entry was written for.
    pub fn key<K: CacheKey>(&self) -> Result<K> {
        let json = self.string(PROP_KEY)?;
        serde_json::from_str(json).map_err(|e| self.corrupt(format!("bad key: {e}")))
    }

    /// Rebuilds the cached content.
    pub fn content(&self) -> Result<CacheContent> {
        let status = self.status()?;

        let mut headers = HeaderMap::new();
        for (header, value) in self.header_properties() {
            headers.insert(header.to_string(), self.header_values(header, value)?.to_vec());
        }

        let data = self
            .record
            .property(PROP_PAYLOAD)
            .and_then(Value::as_binary)
            .cloned()
            .ok_or_else(|| self.corrupt("missing payload"))?;

        Ok(CacheContent::from_parts(
            status,
            self.string(PROP_CHAR_ENCODING)?.to_string(),
            self.string(PROP_CONTENT_TYPE)?.to_string(),
            headers,
            data,
        ))
    }

    /// Fails exactly when [`EntryReader::content`] would, without copying
    /// headers or touching the payload bytes.
    pub fn check_content(&self) -> Result<()> {
        self.status()?;
        self.string(PROP_CHAR_ENCODING)?;
        self.string(PROP_CONTENT_TYPE)?;
        for (header, value) in self.header_properties() {
            self.header_values(header, value)?;
        }
        self.payload_len().map(|_| ())
    }

    fn status(&self) -> Result<u16> {
        let status = self.long(PROP_STATUS)?;
        u16::try_from(status).map_err(|_| self.corrupt(format!("status {status} out of range")))
    }

    fn header_properties(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.record
            .properties
            .iter()
            .filter_map(|(name, value)| Some((name.strip_prefix(HEADER_PREFIX)?, value)))
    }

    fn header_values(&self, header: &str, value: &'a Value) -> Result<&'a [String]> {
        value
            .as_strings()
            .ok_or_else(|| self.corrupt(format!("header {header} is not a string list")))
    }

    /// Creation timestamp (Unix milliseconds).
    pub fn created_at(&self) -> Result<i64> {
        self.long(PROP_CREATED)
    }

    /// Expiration timestamp (Unix milliseconds), None = no expiration.
    pub fn expires_at(&self) -> Result<Option<i64>> {
        match self.record.property(PROP_EXPIRES_AT) {
            None => Ok(None),
            Some(value) => value
                .as_long()
                .map(Some)
                .ok_or_else(|| self.corrupt("expiresAt is not a long")),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now_millis`.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its expiration time; entries without one never expire.
    pub fn is_expired(&self, now_millis: i64) -> Result<bool> {
        Ok(self
            .expires_at()?
            .is_some_and(|expires| now_millis >= expires))
    }

    /// Remaining lifetime in milliseconds, Some(0) once expired.
    pub fn ttl_remaining_ms(&self, now_millis: i64) -> Result<Option<i64>> {
        Ok(self
            .expires_at()?
            .map(|expires| (expires - now_millis).max(0)))
    }

    /// Payload length in bytes, without copying the payload.
    pub fn payload_len(&self) -> Result<u64> {
        self.record
            .property(PROP_PAYLOAD)
            .and_then(Value::as_binary)
            .map(|data| data.len() as u64)
            .ok_or_else(|| self.corrupt("missing payload"))
    }

    fn string(&self, name: &str) -> Result<&'a str> {
        self.record
            .property(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.corrupt(format!("missing string property {name}")))
    }

    fn long(&self, name: &str) -> Result<i64> {
        self.record
            .property(name)
            .and_then(Value::as_long)
            .ok_or_else(|| self.corrupt(format!("missing long property {name}")))
    }

    fn corrupt(&self, reason: impl Into<String>) -> StoreError {
        StoreError::Deserialization {
            path: self.path.to_string(),
            reason: reason.into(),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RequestKey;
    use crate::repository::{MemoryRepository, ROOT};

    const NOW: i64 = 1_700_000_000_000;

    fn sample_content() -> CacheContent {
        CacheContent::new(
            200,
            "utf-8",
            "text/html",
            [("Cache-Control", "max-age=60"), ("Vary", "Accept"), ("Vary", "Cookie")],
            b"<html>hello</html>".to_vec(),
        )
    }

    fn setup(repo: &MemoryRepository) -> Session<'_> {
        let mut session = Session::new(repo);
        session.add_node(ROOT, "bucket", NodeRecord::new("cache:bucket")).unwrap();
        session
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let repo = MemoryRepository::new();
        let mut session = setup(&repo);
        let key = RequestKey::new("/a.html", "/a", ["g"]);
        let content = sample_content();

        let writer = EntryWriter::new(Some(Duration::from_secs(60)));
        let path = writer.write(&mut session, "/bucket", &key, &content, NOW).unwrap();

        let record = session.node(&path).unwrap().unwrap();
        let reader = EntryReader::new(&path, &record);
        assert_eq!(reader.key::<RequestKey>().unwrap(), key);
        assert_eq!(reader.content().unwrap(), content);
        assert_eq!(reader.created_at().unwrap(), NOW);
        assert_eq!(reader.expires_at().unwrap(), Some(NOW + 60_000));
        assert_eq!(reader.payload_len().unwrap(), 18);
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let repo = MemoryRepository::new();
        let mut session = setup(&repo);
        let key = RequestKey::new("/a.html", "/a", ["g"]);

        let path = EntryWriter::new(None)
            .write(&mut session, "/bucket", &key, &sample_content(), NOW)
            .unwrap();

        let record = session.node(&path).unwrap().unwrap();
        let reader = EntryReader::new(&path, &record);
        assert_eq!(reader.expires_at().unwrap(), None);
        assert!(!reader.is_expired(i64::MAX).unwrap());
        assert_eq!(reader.ttl_remaining_ms(NOW).unwrap(), None);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let record = NodeRecord::new(ENTRY_TYPE).with(PROP_EXPIRES_AT, Value::Long(NOW));
        let reader = EntryReader::new("/bucket/e", &record);

        assert!(!reader.is_expired(NOW - 1).unwrap());
        assert!(reader.is_expired(NOW).unwrap(), "Entry should be expired at boundary");
        assert_eq!(reader.ttl_remaining_ms(NOW + 5).unwrap(), Some(0));
        assert_eq!(reader.ttl_remaining_ms(NOW - 5).unwrap(), Some(5));
    }

    #[test]
    fn test_rewrite_replaces_existing_entry() {
        let repo = MemoryRepository::new();
        let mut session = setup(&repo);
        let key = RequestKey::new("/a.html", "/a", ["g"]);
        let writer = EntryWriter::new(None);

        let first = writer.write(&mut session, "/bucket", &key, &sample_content(), NOW).unwrap();
        let updated = CacheContent::new(404, "utf-8", "text/plain", Vec::<(String, String)>::new(), b"gone".to_vec());
        let second = writer.write(&mut session, "/bucket", &key, &updated, NOW).unwrap();

        assert_eq!(first, second);
        assert_eq!(session.child_names("/bucket").unwrap().len(), 1);
        let found = find_entry(&session, "/bucket", &key).unwrap().unwrap();
        assert_eq!(found.reader().content().unwrap(), updated);
    }

    #[test]
    fn test_colliding_keys_keep_separate_entries() {
        let repo = MemoryRepository::new();
        let mut session = setup(&repo);
        let writer = EntryWriter::new(None);
        let a = RequestKey::new("/a.html", "/a", ["g"]);
        let b = RequestKey::new("/b.html", "/b", ["g"]);

        writer.write(&mut session, "/bucket", &a, &sample_content(), NOW).unwrap();
        writer.write(&mut session, "/bucket", &b, &sample_content(), NOW).unwrap();

        assert_eq!(session.child_names("/bucket").unwrap().len(), 2);
        assert!(find_entry(&session, "/bucket", &a).unwrap().is_some());
        assert!(find_entry(&session, "/bucket", &b).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_entry_reports_deserialization_error() {
        let record = NodeRecord::new(ENTRY_TYPE)
            .with(PROP_KEY, Value::String("{not json".into()))
            .with(PROP_STATUS, Value::String("200".into()));
        let reader = EntryReader::new("/bucket/bad", &record);

        assert!(matches!(
            reader.key::<RequestKey>(),
            Err(StoreError::Deserialization { .. })
        ));
        assert!(matches!(reader.content(), Err(StoreError::Deserialization { .. })));
        assert!(matches!(reader.payload_len(), Err(StoreError::Deserialization { .. })));
    }

    #[test]
    fn test_find_entry_skips_corrupt_neighbours() {
        let repo = MemoryRepository::new();
        let mut session = setup(&repo);
        session
            .add_node("/bucket", "broken", NodeRecord::new(ENTRY_TYPE))
            .unwrap();
        let key = RequestKey::new("/a.html", "/a", ["g"]);
        EntryWriter::new(None)
            .write(&mut session, "/bucket", &key, &sample_content(), NOW)
            .unwrap();

        assert!(find_entry(&session, "/bucket", &key).unwrap().is_some());
    }

    #[test]
    fn test_entry_name_is_key_digest() {
        let repo = MemoryRepository::new();
        let mut session = setup(&repo);
        let key = RequestKey::new("/a.html", "/a", ["g"]);

        let path = EntryWriter::new(None)
            .write(&mut session, "/bucket", &key, &sample_content(), NOW)
            .unwrap();

        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(path, format!("/bucket/{}", entry_name(&json)));
        assert_eq!(entry_name(&json).len(), 64);
        assert_ne!(entry_name(&json), entry_name("{}"));
    }

    #[test]
    fn test_rewrite_moves_entry_stored_under_other_name() {
        let repo = MemoryRepository::new();
        let mut session = setup(&repo);
        let key = RequestKey::new("/a.html", "/a", ["g"]);
        let legacy = NodeRecord::new(ENTRY_TYPE)
            .with(PROP_KEY, Value::String(serde_json::to_string(&key).unwrap()));
        session.add_node("/bucket", "legacy", legacy).unwrap();

        EntryWriter::new(None)
            .write(&mut session, "/bucket", &key, &sample_content(), NOW)
            .unwrap();

        assert!(!session.node_exists("/bucket/legacy").unwrap());
        assert_eq!(session.child_names("/bucket").unwrap().len(), 1);
    }

    #[test]
    fn test_check_content_agrees_with_content() {
        let good = NodeRecord::new(ENTRY_TYPE)
            .with(PROP_STATUS, Value::Long(200))
            .with(PROP_CHAR_ENCODING, Value::String("utf-8".into()))
            .with(PROP_CONTENT_TYPE, Value::String("text/html".into()))
            .with(PROP_PAYLOAD, Value::Binary(b"x".to_vec().into()));
        let cases = [
            good.clone(),
            good.clone().with(PROP_STATUS, Value::Long(70_000)),
            good.clone().with("header:Vary", Value::Long(1)),
            good.clone().with(PROP_PAYLOAD, Value::String("x".into())),
            good.clone().with(PROP_CONTENT_TYPE, Value::Long(0)),
        ];

        for record in &cases {
            let reader = EntryReader::new("/bucket/e", record);
            assert_eq!(reader.check_content().is_ok(), reader.content().is_ok());
        }
        assert!(EntryReader::new("/bucket/e", &good).check_content().is_ok());
    }
}
