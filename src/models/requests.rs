//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies and queries.

use serde::Deserialize;

use crate::cache::{CacheContent, HeaderMap, RequestKey};

/// Maximum accepted URI length in bytes
pub const MAX_URI_LENGTH: usize = 2048;

/// Request body for storing a response (PUT /entries)
///
/// # Fields
/// - `uri`: Request URI the response was rendered for
/// - `resource_path`: Resource behind the URI (derived from `uri` if absent)
/// - `groups`: Authorization groups the response is valid for
/// - `status`, `char_encoding`, `content_type`, `headers`, `body`: the response
#[derive(Debug, Clone, Deserialize)]
pub struct PutEntryRequest {
    pub uri: String,
    #[serde(default)]
    pub resource_path: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default = "default_char_encoding")]
    pub char_encoding: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(default)]
    pub body: String,
}

fn default_status() -> u16 {
    200
}

fn default_char_encoding() -> String {
    "utf-8".to_string()
}

fn default_content_type() -> String {
    "text/html".to_string()
}

impl PutEntryRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.uri.is_empty() {
            return Some("URI cannot be empty".to_string());
        }
        if !self.uri.starts_with('/') {
            return Some("URI must start with '/'".to_string());
        }
        if self.uri.len() > MAX_URI_LENGTH {
            return Some(format!(
                "URI exceeds maximum length of {} characters",
                MAX_URI_LENGTH
            ));
        }
        if !(100..=599).contains(&self.status) {
            return Some(format!("Invalid status code {}", self.status));
        }
        None
    }

    /// Splits the request into the cache key and the content to store.
    pub fn into_parts(self) -> (RequestKey, CacheContent) {
        let resource_path = self
            .resource_path
            .unwrap_or_else(|| resource_path_of(&self.uri));
        let key = RequestKey::new(self.uri, resource_path, self.groups);

        let headers = self
            .headers
            .into_iter()
            .flat_map(|(name, values)| values.into_iter().map(move |v| (name.clone(), v)));
        let content = CacheContent::new(
            self.status,
            self.char_encoding,
            self.content_type,
            headers,
            self.body.into_bytes(),
        );
        (key, content)
    }
}

/// Strips the query string and the extension of the last segment.
fn resource_path_of(uri: &str) -> String {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let last_slash = path.rfind('/').unwrap_or(0);
    match path[last_slash..].find('.') {
        Some(dot) => path[..last_slash + dot].to_string(),
        None => path.to_string(),
    }
}

/// Query parameters addressing an entry by its key string (`?key=...`)
#[derive(Debug, Clone, Deserialize)]
pub struct KeyQuery {
    pub key: String,
}

/// Request body for resource-driven invalidation (POST /invalidate)
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    pub resource_path: String,
}

impl InvalidateRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if !self.resource_path.starts_with('/') {
            return Some("Resource path must start with '/'".to_string());
        }
        None
    }
}
