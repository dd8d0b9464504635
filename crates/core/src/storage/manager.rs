use std::path::Path;

use tracing::{debug, info};

use crate::errors::CoreError;

use super::encryption::{self, KdfParams};
use super::format;
use super::memory::{MemoryStore, StoreSnapshot};

/// Encrypted persistence for [`MemoryStore`] snapshots.
///
/// Flow: snapshot → bincode → AES-256-GCM(Argon2id(password)) → CFDS bytes
pub struct StorageManager;

impl StorageManager {
    pub fn save_to_bytes(snapshot: &StoreSnapshot, password: &str) -> Result<Vec<u8>, CoreError> {
        Self::save_to_bytes_with_params(snapshot, password, &KdfParams::default())
    }

    /// Same as [`save_to_bytes`](Self::save_to_bytes) with explicit KDF costs.
    pub fn save_to_bytes_with_params(
        snapshot: &StoreSnapshot,
        password: &str,
        params: &KdfParams,
    ) -> Result<Vec<u8>, CoreError> {
        params.validate()?;
        let plaintext = bincode::serialize(snapshot)
            .map_err(|e| CoreError::Serialization(format!("Failed to encode snapshot: {e}")))?;
        let sealed = encryption::seal(&plaintext, password, params)?;
        Ok(format::encode(params, &sealed))
    }

    pub fn load_from_bytes(data: &[u8], password: &str) -> Result<StoreSnapshot, CoreError> {
        let (params, sealed) = format::decode(data)?;
        let plaintext = encryption::open(&sealed, password, &params)?;
        bincode::deserialize(&plaintext)
            .map_err(|e| CoreError::Deserialization(format!("Failed to decode snapshot: {e}")))
    }

    pub fn save_to_file(snapshot: &StoreSnapshot, path: &Path, password: &str) -> Result<(), CoreError> {
        let bytes = Self::save_to_bytes(snapshot, password)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Replace atomically via a temp file.
        let tmp = path.with_extension("cfds.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), documents = snapshot.document_count(), "store snapshot saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path, password: &str) -> Result<StoreSnapshot, CoreError> {
        let bytes = std::fs::read(path)?;
        let snapshot = Self::load_from_bytes(&bytes, password)?;
        debug!(path = %path.display(), documents = snapshot.document_count(), "store snapshot loaded");
        Ok(snapshot)
    }

    /// Open the store at `path`, or an empty one when no snapshot exists yet.
    pub fn open_store(path: &Path, password: &str) -> Result<MemoryStore, CoreError> {
        if !path.exists() {
            info!(path = %path.display(), "no snapshot found, starting with an empty store");
            return Ok(MemoryStore::new());
        }
        MemoryStore::from_snapshot(Self::load_from_file(path, password)?)
    }

    pub async fn persist_store(store: &MemoryStore, path: &Path, password: &str) -> Result<(), CoreError> {
        let snapshot = store.snapshot().await?;
        Self::save_to_file(&snapshot, path, password)
    }
}
