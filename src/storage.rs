//! Storage subsystem
//!
//! Persists the metadata of encoded incident clips so they can be listed per
//! user. The video files themselves are written by the clip writer; storage
//! only keeps the index.
//!
//! Components:
//! - `storage_trait`: the Storage trait defining a uniform API.
//! - `types`: shared data types used by storage backends.
//! - `file_storage`: filesystem-backed implementation, one JSON document per clip.

pub mod file_storage;
pub mod storage_trait;
pub mod types;

pub use file_storage::FileStorage;
pub use storage_trait::Storage;
pub use types::ClipRecord;
