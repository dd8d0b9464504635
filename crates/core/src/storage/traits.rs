use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::errors::CoreError;

/// A document as held by a store: JSON payload plus its write version.
///
/// `version` starts at 1 and increases on every write to the same id. It is
/// the etag that `set_if_version` compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub version: u64,
    pub data: serde_json::Value,
}

impl StoredDocument {
    /// Deserialize the payload into a typed model.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            CoreError::Deserialization(format!("Document '{}' has unexpected shape: {e}", self.id))
        })
    }
}

/// Serialize a model into a document payload.
pub fn to_document<T: Serialize>(value: &T) -> Result<serde_json::Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set {
        collection: String,
        id: String,
        data: serde_json::Value,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// A group of writes applied all-or-nothing by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an unconditional overwrite of `collection/id`.
    pub fn set<T: Serialize>(
        &mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        value: &T,
    ) -> Result<&mut Self, CoreError> {
        self.ops.push(WriteOp::Set {
            collection: collection.into(),
            id: id.into(),
            data: to_document(value)?,
        });
        Ok(self)
    }

    pub fn delete(&mut self, collection: impl Into<String>, id: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.into(),
            id: id.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Hierarchical document database: collections of JSON documents keyed by id.
///
/// Collection names are slash-separated paths (e.g. `users/u1/availableBalance`).
/// All methods are safe to call concurrently.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, CoreError>;

    /// All documents of a collection, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, CoreError>;

    /// Unconditional create-or-overwrite. Returns the new version.
    async fn set(&self, collection: &str, id: &str, data: serde_json::Value) -> Result<u64, CoreError>;

    /// Write only if the stored version equals `expected`.
    ///
    /// `None` means the document must not exist yet. A mismatch returns
    /// `CoreError::Conflict` and leaves the document untouched.
    async fn set_if_version(
        &self,
        collection: &str,
        id: &str,
        data: serde_json::Value,
        expected: Option<u64>,
    ) -> Result<u64, CoreError>;

    /// Create a document under a generated id. Returns the id.
    async fn add(&self, collection: &str, data: serde_json::Value) -> Result<String, CoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, CoreError>;

    /// Apply every operation of the batch, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), CoreError>;
}
