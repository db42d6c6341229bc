use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::Storage;
use crate::storage::types::ClipRecord;

/// Clip index kept next to the clips: `<base>/index/<hex user id>/<clip id>.json`.
pub struct FileStorage {
    base_path: PathBuf,
    index_path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        let index_path = base_path.join("index");

        fs::create_dir_all(&index_path).map_err(|e| {
            error!("Failed to create clip index dir {}: {}", index_path.display(), e);
            StorageError::WriteFailed
        })?;
        info!("FileStorage initialized at {}", base_path.display());

        Ok(Self {
            base_path,
            index_path,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Hex keeps the directory name filesystem safe and distinct per user id.
    fn user_dir(&self, user_id: &str) -> PathBuf {
        let encoded: String = user_id.bytes().map(|b| format!("{:02x}", b)).collect();
        self.index_path.join(format!("u{}", encoded))
    }

    fn clip_file_path(&self, user_id: &str, id: Uuid) -> PathBuf {
        self.user_dir(user_id).join(format!("{}.json", id))
    }

    fn parse_clip_file(&self, path: &Path) -> Result<ClipRecord, StorageError> {
        let mut content = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut content))
            .map_err(|e| {
                error!("Failed to read clip file {}: {}", path.display(), e);
                StorageError::ReadFailed
            })?;
        serde_json::from_str(&content).map_err(|e| {
            error!("Invalid clip file {}: {}", path.display(), e);
            StorageError::ReadFailed
        })
    }
}

impl Storage for FileStorage {
    fn save_clip(&self, clip: &ClipRecord) -> Result<(), StorageError> {
        let dir = self.user_dir(&clip.user_id);
        fs::create_dir_all(&dir).map_err(|e| {
            error!("Failed to create clip dir {}: {}", dir.display(), e);
            StorageError::WriteFailed
        })?;

        let path = self.clip_file_path(&clip.user_id, clip.id);
        let json = serde_json::to_string_pretty(clip).map_err(|e| {
            error!("Failed to serialize clip {}: {}", clip.id, e);
            StorageError::WriteFailed
        })?;
        // Write then rename so a concurrent listing never sees half a document.
        let tmp = path.with_extension("json.tmp");
        let mut f = File::create(&tmp).map_err(|e| {
            error!("Failed to create clip file {}: {}", tmp.display(), e);
            StorageError::WriteFailed
        })?;
        f.write_all(json.as_bytes()).map_err(|e| {
            error!("Failed to write clip file {}: {}", tmp.display(), e);
            StorageError::WriteFailed
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            error!("Failed to move clip file into {}: {}", path.display(), e);
            StorageError::WriteFailed
        })?;

        info!("Saved clip {} for user {} to {}", clip.id, clip.user_id, path.display());
        Ok(())
    }

    fn list_clips(&self, user_id: &str) -> Result<Vec<ClipRecord>, StorageError> {
        let dir = self.user_dir(user_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut clips = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| {
            error!("Failed to read clip dir {}: {}", dir.display(), e);
            StorageError::ReadFailed
        })? {
            let entry = entry.map_err(|e| {
                error!("Dir entry error: {}", e);
                StorageError::ReadFailed
            })?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match self.parse_clip_file(&path) {
                Ok(clip) if clip.user_id == user_id => clips.push(clip),
                Ok(clip) => warn!(
                    "Skipping clip {} owned by {} in the index of {}",
                    clip.id, clip.user_id, user_id
                ),
                Err(_) => warn!("Skipping unreadable clip file {}", path.display()),
            }
        }

        clips.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        debug!("Listed {} clips for user {}", clips.len(), user_id);
        Ok(clips)
    }

    fn get_clip(&self, user_id: &str, clip_id: Uuid) -> Result<ClipRecord, StorageError> {
        let path = self.clip_file_path(user_id, clip_id);
        if !path.exists() {
            debug!("Clip {} not found for user {}", clip_id, user_id);
            return Err(StorageError::ReadFailed);
        }
        let clip = self.parse_clip_file(&path)?;
        if clip.user_id != user_id {
            warn!("Clip {} belongs to {}, not {}", clip_id, clip.user_id, user_id);
            return Err(StorageError::ReadFailed);
        }
        Ok(clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn record(user: &str, minutes_ago: i64) -> ClipRecord {
        let detected_at = Utc::now() - Duration::minutes(minutes_ago);
        ClipRecord {
            id: Uuid::new_v4(),
            user_id: user.into(),
            camera_index: 0,
            camera_name: "hall".into(),
            file_name: format!("accident_{}_0.mp4", user),
            path: PathBuf::from(format!("accident_clips/accident_{}_0.mp4", user)),
            detected_at,
            created_at: detected_at,
            frame_count: 100,
            duration_secs: 10.0,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_save_and_list_newest_first() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let old = record("alice", 30);
        let new = record("alice", 1);
        storage.save_clip(&old).unwrap();
        storage.save_clip(&new).unwrap();
        storage.save_clip(&record("bob", 5)).unwrap();

        let clips = storage.list_clips("alice").unwrap();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].id, new.id);
        assert_eq!(clips[1], old);
    }

    #[test]
    fn test_get_clip() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let clip = record("alice", 0);
        storage.save_clip(&clip).unwrap();

        assert_eq!(storage.get_clip("alice", clip.id).unwrap(), clip);
        assert!(matches!(
            storage.get_clip("bob", clip.id),
            Err(StorageError::ReadFailed)
        ));
    }

    #[test]
    fn test_unknown_user_has_no_clips_and_corrupt_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        assert!(storage.list_clips("nobody").unwrap().is_empty());

        storage.save_clip(&record("alice", 0)).unwrap();
        fs::write(storage.user_dir("alice").join("broken.json"), "{").unwrap();
        assert_eq!(storage.list_clips("alice").unwrap().len(), 1);
    }

    #[test]
    fn test_similar_user_ids_do_not_share_clips() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let dotted = record("a.b", 0);
        storage.save_clip(&dotted).unwrap();

        assert!(storage.list_clips("a_b").unwrap().is_empty());
        assert_eq!(storage.list_clips("a.b").unwrap(), vec![dotted.clone()]);
        assert!(storage.get_clip("a_b", dotted.id).is_err());
        assert_ne!(storage.user_dir("a.b"), storage.user_dir("a_b"));
    }

    #[test]
    fn test_records_of_another_user_are_not_served() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let foreign = record("mallory", 0);
        let alice_dir = storage.user_dir("alice");
        fs::create_dir_all(&alice_dir).unwrap();
        fs::write(
            alice_dir.join(format!("{}.json", foreign.id)),
            serde_json::to_string(&foreign).unwrap(),
        )
        .unwrap();

        assert!(storage.list_clips("alice").unwrap().is_empty());
        assert!(matches!(
            storage.get_clip("alice", foreign.id),
            Err(StorageError::ReadFailed)
        ));
    }
}
