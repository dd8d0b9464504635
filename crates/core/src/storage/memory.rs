use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::CoreError;

use super::traits::{DocumentStore, StoredDocument, WriteBatch, WriteOp};

type Collections = HashMap<String, BTreeMap<String, StoredDocument>>;

/// In-process document store.
///
/// Every write bumps the per-document version, so conditional writes behave
/// the same as against a remote database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a previously taken snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, CoreError> {
        let mut collections = Collections::new();
        for collection in snapshot.collections {
            let docs = collections.entry(collection.name).or_default();
            for doc in collection.documents {
                let data = serde_json::from_str(&doc.json)?;
                docs.insert(
                    doc.id.clone(),
                    StoredDocument {
                        id: doc.id,
                        version: doc.version,
                        data,
                    },
                );
            }
        }
        Ok(Self {
            collections: RwLock::new(collections),
        })
    }

    /// Point-in-time copy of every collection, suitable for binary encoding.
    pub async fn snapshot(&self) -> Result<StoreSnapshot, CoreError> {
        let guard = self.collections.read().await;
        let mut names: Vec<&String> = guard.keys().collect();
        names.sort();

        let mut collections = Vec::with_capacity(names.len());
        for name in names {
            let mut documents = Vec::new();
            for doc in guard[name].values() {
                documents.push(SnapshotDocument {
                    id: doc.id.clone(),
                    version: doc.version,
                    json: serde_json::to_string(&doc.data)
                        .map_err(|e| CoreError::Serialization(e.to_string()))?,
                });
            }
            collections.push(SnapshotCollection {
                name: name.clone(),
                documents,
            });
        }
        Ok(StoreSnapshot { collections })
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, |docs| docs.len())
    }
}

fn write_doc(collections: &mut Collections, collection: &str, id: &str, data: serde_json::Value) -> u64 {
    let docs = collections.entry(collection.to_string()).or_default();
    let version = docs.get(id).map_or(1, |d| d.version + 1);
    docs.insert(
        id.to_string(),
        StoredDocument {
            id: id.to_string(),
            version,
            data,
        },
    );
    version
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, CoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, CoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn set(&self, collection: &str, id: &str, data: serde_json::Value) -> Result<u64, CoreError> {
        let mut guard = self.collections.write().await;
        Ok(write_doc(&mut guard, collection, id, data))
    }

    async fn set_if_version(
        &self,
        collection: &str,
        id: &str,
        data: serde_json::Value,
        expected: Option<u64>,
    ) -> Result<u64, CoreError> {
        let mut guard = self.collections.write().await;
        let current = guard
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|d| d.version);
        if current != expected {
            return Err(CoreError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(write_doc(&mut guard, collection, id, data))
    }

    async fn add(&self, collection: &str, data: serde_json::Value) -> Result<String, CoreError> {
        let id = Uuid::new_v4().to_string();
        let mut guard = self.collections.write().await;
        write_doc(&mut guard, collection, &id, data);
        Ok(id)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, CoreError> {
        let mut guard = self.collections.write().await;
        Ok(guard
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), CoreError> {
        // Single write lock for the whole batch: readers see all of it or none.
        let mut guard = self.collections.write().await;
        for op in batch.into_ops() {
            match op {
                WriteOp::Set { collection, id, data } => {
                    write_doc(&mut guard, &collection, &id, data);
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(docs) = guard.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Serializable copy of a [`MemoryStore`].
///
/// Payloads are kept as JSON text because bincode cannot encode
/// self-describing `serde_json::Value`s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub collections: Vec<SnapshotCollection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCollection {
    pub name: String,
    pub documents: Vec<SnapshotDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub id: String,
    pub version: u64,
    pub json: String,
}

impl StoreSnapshot {
    pub fn document_count(&self) -> usize {
        self.collections.iter().map(|c| c.documents.len()).sum()
    }
}
