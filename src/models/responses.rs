//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheContent, CacheStats, HeaderMap, PassReport};

/// Response body for a stored entry (GET /entries?key=...)
#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    /// Display string of the key
    pub key: String,
    pub status: u16,
    pub char_encoding: String,
    pub content_type: String,
    pub headers: HeaderMap,
    /// Payload decoded as UTF-8, invalid sequences replaced
    pub body: String,
    /// Payload size in bytes
    pub size: u64,
}

impl EntryResponse {
    /// Creates a new EntryResponse from a key string and its content
    pub fn new(key: impl Into<String>, content: &CacheContent) -> Self {
        Self {
            key: key.into(),
            status: content.status(),
            char_encoding: content.char_encoding().to_string(),
            content_type: content.content_type().to_string(),
            headers: content.headers().clone(),
            body: String::from_utf8_lossy(content.data()).into_owned(),
            size: content.size(),
        }
    }
}

/// Response body for storing an entry (PUT /entries)
#[derive(Debug, Clone, Serialize)]
pub struct PutResponse {
    /// Success message
    pub message: String,
    /// Display string of the stored key
    pub key: String,
}

impl PutResponse {
    /// Creates a new PutResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Entry '{}' stored successfully", key),
            key,
        }
    }
}

/// Response body for removing one entry (DELETE /entries?key=...)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// Display string of the removed key
    pub key: String,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Entry '{}' invalidated successfully", key),
            key,
        }
    }
}

/// Response body for the key listing (GET /keys)
#[derive(Debug, Clone, Serialize)]
pub struct KeysResponse {
    pub count: usize,
    pub keys: Vec<String>,
}

impl KeysResponse {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            count: keys.len(),
            keys,
        }
    }
}

/// Response body for bulk passes (invalidate all, invalidate, purge)
#[derive(Debug, Clone, Serialize)]
pub struct PassResponse {
    /// Entries examined by the pass
    pub entries_visited: usize,
    /// Entries removed by the pass
    pub entries_removed: usize,
    /// Bucket nodes removed by the pass
    pub buckets_removed: usize,
    /// Commits issued by the pass
    pub commits: usize,
}

impl From<PassReport> for PassResponse {
    fn from(report: PassReport) -> Self {
        Self {
            entries_visited: report.entries_visited,
            entries_removed: report.entries_removed,
            buckets_removed: report.buckets_removed,
            commits: report.commits,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of entries removed by purge passes
    pub purged: u64,
    /// Current number of stored entries
    pub total_entries: usize,
    /// Payload bytes currently stored
    pub total_bytes: u64,
    /// Configured maximum store size in bytes
    pub max_size_bytes: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Share of the maximum size in use, in percent
    pub usage_percent: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            usage_percent: stats.usage_percent(),
            hits: stats.hits,
            misses: stats.misses,
            purged: stats.purged,
            total_entries: stats.total_entries,
            total_bytes: stats.total_bytes,
            max_size_bytes: stats.max_size_bytes,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_response_from_content() {
        let content = CacheContent::new(
            404,
            "utf-8",
            "text/plain",
            [("X-Kind", "missing")],
            b"not here".to_vec(),
        );
        let resp = EntryResponse::new("[resource:/a] [uri:/a] [groups:]", &content);

        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, "not here");
        assert_eq!(resp.size, 8);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("X-Kind"));
    }

    #[test]
    fn test_entry_response_lossy_body() {
        let content = CacheContent::new(
            200,
            "utf-8",
            "application/octet-stream",
            Vec::<(String, String)>::new(),
            vec![0xff, b'a'],
        );
        let resp = EntryResponse::new("k", &content);
        assert_eq!(resp.body, "\u{fffd}a");
        assert_eq!(resp.size, 2);
    }

    #[test]
    fn test_put_and_delete_messages() {
        let put = PutResponse::new("my_key");
        assert!(put.message.contains("stored"));
        let del = DeleteResponse::new("my_key");
        assert!(del.message.contains("invalidated"));
        assert_eq!(del.key, "my_key");
    }

    #[test]
    fn test_keys_response_count() {
        let resp = KeysResponse::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(resp.count, 2);
    }

    #[test]
    fn test_stats_response_from_stats() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            purged: 3,
            total_entries: 5,
            total_bytes: 512,
            max_size_bytes: 1024,
        };
        let resp = StatsResponse::from(stats);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
        assert!((resp.usage_percent - 50.0).abs() < 0.001);
        assert_eq!(resp.purged, 3);
    }

    #[test]
    fn test_pass_response_from_report() {
        let report = PassReport {
            entries_visited: 4,
            entries_removed: 2,
            buckets_removed: 1,
            commits: 1,
            stopped: false,
        };
        let resp = PassResponse::from(report);
        assert_eq!(resp.entries_removed, 2);
        assert_eq!(resp.commits, 1);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}
