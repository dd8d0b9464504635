pub mod encryption;
pub mod format;
pub mod manager;
pub mod memory;
pub mod traits;

pub use manager::StorageManager;
pub use memory::{MemoryStore, StoreSnapshot};
pub use traits::{to_document, DocumentStore, StoredDocument, WriteBatch, WriteOp};
