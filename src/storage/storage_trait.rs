//! Storage Trait
//!
//! This module defines the `Storage` trait, the interface of clip metadata
//! backends. All methods return a `Result` to handle potential storage errors.

use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::types::ClipRecord;

pub trait Storage: Send + Sync {
    /// Saves the metadata of a finished clip.
    fn save_clip(&self, clip: &ClipRecord) -> Result<(), StorageError>;

    /// Lists a user's clips, newest detection first.
    fn list_clips(&self, user_id: &str) -> Result<Vec<ClipRecord>, StorageError>;

    /// Retrieves one clip of a user.
    fn get_clip(&self, user_id: &str, clip_id: Uuid) -> Result<ClipRecord, StorageError>;
}
