//! Node Records
//!
//! Node payloads and the change log a session hands to the repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

// == Property Value ==
/// A typed property value stored on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "StoredValue", try_from = "StoredValue")]
pub enum Value {
    Long(i64),
    String(String),
    Strings(Vec<String>),
    /// Binary data; shared so that reads do not copy payloads
    Binary(Arc<[u8]>),
}

// Snapshot form of a value; binary data is kept as base64 text.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
enum StoredValue {
    Long(i64),
    String(String),
    Strings(Vec<String>),
    Binary(String),
}

impl From<Value> for StoredValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Long(v) => StoredValue::Long(v),
            Value::String(v) => StoredValue::String(v),
            Value::Strings(v) => StoredValue::Strings(v),
            Value::Binary(v) => StoredValue::Binary(STANDARD.encode(v)),
        }
    }
}

impl TryFrom<StoredValue> for Value {
    type Error = base64::DecodeError;

    fn try_from(stored: StoredValue) -> Result<Self, Self::Error> {
        Ok(match stored {
            StoredValue::Long(v) => Value::Long(v),
            StoredValue::String(v) => Value::String(v),
            StoredValue::Strings(v) => Value::Strings(v),
            StoredValue::Binary(v) => Value::Binary(STANDARD.decode(v)?.into()),
        })
    }
}

impl Value {
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Value::Strings(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Arc<[u8]>> {
        match self {
            Value::Binary(v) => Some(v),
            _ => None,
        }
    }
}

// == Node Record ==
/// The stored state of a single node: its type and properties.
///
/// Children are tracked by the repository, not by the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl NodeRecord {
    /// Creates a record with no properties.
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn is_type(&self, node_type: &str) -> bool {
        self.node_type == node_type
    }
}

// == Change Log ==
/// A single buffered mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Create the node, or replace the record of an existing one
    Add { path: String, record: NodeRecord },
    /// Remove the node and its whole subtree
    Remove { path: String },
}

impl Change {
    pub fn path(&self) -> &str {
        match self {
            Change::Add { path, .. } | Change::Remove { path } => path,
        }
    }
}

/// Ordered mutations applied together by one commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of removals in the set.
    pub fn removals(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, Change::Remove { .. }))
            .count()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }
}
