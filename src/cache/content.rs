//! Cache Content Module
//!
//! Immutable snapshot of a cacheable HTTP response.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use crate::error::{Result, StoreError};

/// Headers never persisted with a response (compared case-insensitively).
pub const EXCLUDED_HEADERS: &[&str] = &["x-trace-id", "x-debug-trace"];

/// Header name to its values, in the order they were received.
pub type HeaderMap = BTreeMap<String, Vec<String>>;

// == Cache Content ==
/// A captured response: status, encoding, content type, headers, payload.
///
/// The payload is owned by the snapshot; nothing the caller does to its
/// source afterwards can change it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheContent {
    status: u16,
    char_encoding: String,
    content_type: String,
    headers: HeaderMap,
    data: Arc<[u8]>,
}

impl CacheContent {
    // == Constructors ==
    /// Builds content from already-owned parts.
    ///
    /// Repeated header names are merged, keeping value order.
    pub fn new<N, V>(
        status: u16,
        char_encoding: impl Into<String>,
        content_type: impl Into<String>,
        headers: impl IntoIterator<Item = (N, V)>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.entry(name.into()).or_default().push(value.into());
        }
        Self::from_parts(status, char_encoding.into(), content_type.into(), map, data.into())
    }

    /// Deep-copies a response by draining its body stream.
    ///
    /// Fails with [`StoreError::Serialization`] if the stream cannot be read
    /// to the end; no partial content is ever produced.
    pub fn capture<N, V>(
        status: u16,
        char_encoding: impl Into<String>,
        content_type: impl Into<String>,
        headers: impl IntoIterator<Item = (N, V)>,
        mut body: impl Read,
    ) -> Result<Self>
    where
        N: Into<String>,
        V: Into<String>,
    {
        let mut data = Vec::new();
        body.read_to_end(&mut data)
            .map_err(|e| StoreError::Serialization(format!("failed to drain payload: {e}")))?;
        Ok(Self::new(status, char_encoding, content_type, headers, data))
    }

    pub(crate) fn from_parts(
        status: u16,
        char_encoding: String,
        content_type: String,
        mut headers: HeaderMap,
        data: Arc<[u8]>,
    ) -> Self {
        headers.retain(|name, _| !is_excluded_header(name));
        Self {
            status,
            char_encoding,
            content_type,
            headers,
            data,
        }
    }

    // == Accessors ==
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn char_encoding(&self) -> &str {
        &self.char_encoding
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Values of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn shared_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// Payload length in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Whether a header is dropped at write time.
pub fn is_excluded_header(name: &str) -> bool {
    EXCLUDED_HEADERS
        .iter()
        .any(|excluded| excluded.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset"))
        }
    }

    #[test]
    fn test_capture_copies_body() {
        let mut source = b"<html>hi</html>".to_vec();
        let content = CacheContent::capture(
            200,
            "utf-8",
            "text/html",
            [("Cache-Control", "max-age=60")],
            source.as_slice(),
        )
        .unwrap();

        source.clear();
        assert_eq!(content.data(), b"<html>hi</html>");
        assert_eq!(content.size(), 15);
        assert_eq!(content.status(), 200);
    }

    #[test]
    fn test_capture_fails_on_broken_stream() {
        let result = CacheContent::capture(
            200,
            "utf-8",
            "text/html",
            Vec::<(String, String)>::new(),
            FailingReader,
        );
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }

    #[test]
    fn test_repeated_headers_merge_in_order() {
        let content = CacheContent::new(
            200,
            "utf-8",
            "text/html",
            [("Set-Cookie", "a=1"), ("Vary", "Accept"), ("Set-Cookie", "b=2")],
            Vec::<u8>::new(),
        );
        assert_eq!(
            content.header("set-cookie"),
            Some(&["a=1".to_string(), "b=2".to_string()][..])
        );
        assert_eq!(content.header("Vary"), Some(&["Accept".to_string()][..]));
    }

    #[test]
    fn test_excluded_headers_are_dropped() {
        let content = CacheContent::new(
            200,
            "utf-8",
            "text/html",
            [("X-Trace-Id", "abc"), ("x-debug-trace", "1"), ("ETag", "\"v1\"")],
            Vec::<u8>::new(),
        );
        assert!(content.header("x-trace-id").is_none());
        assert!(content.header("X-Debug-Trace").is_none());
        assert_eq!(content.headers().len(), 1);
    }
}
