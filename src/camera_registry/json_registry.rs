use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, error};
use serde::Deserialize;

use super::registry_trait::CameraRegistry;
use super::types::{CameraDescriptor, CameraKey};
use crate::error_handling::types::RegistryError;

/// One entry of the camera document as written by the camera management API.
#[derive(Debug, Deserialize)]
struct CameraRecord {
    name: String,
    #[serde(default)]
    rtsp_url: Option<String>,
    #[serde(default)]
    relay: bool,
}

/// Registry backed by the `user_cameras.json` document.
///
/// The file is re-read on each lookup so edits made by the camera management
/// API are visible without a restart. A missing file means no cameras.
pub struct JsonCameraRegistry {
    path: PathBuf,
}

impl JsonCameraRegistry {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn load(&self) -> Result<HashMap<String, Vec<CameraRecord>>, RegistryError> {
        if !self.path.exists() {
            debug!("Camera file {} does not exist yet", self.path.display());
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            error!("Failed to read camera file {}: {}", self.path.display(), e);
            RegistryError::ReadFailed(e.to_string())
        })?;
        serde_json::from_str(&content).map_err(|e| {
            error!("Invalid camera file {}: {}", self.path.display(), e);
            RegistryError::ReadFailed(e.to_string())
        })
    }
}

impl CameraRegistry for JsonCameraRegistry {
    fn list_cameras(&self, user_id: &str) -> Result<Vec<CameraDescriptor>, RegistryError> {
        let mut document = self.load()?;
        let records = document.remove(user_id).unwrap_or_default();
        Ok(records
            .into_iter()
            .enumerate()
            .map(|(index, record)| CameraDescriptor {
                key: CameraKey::new(user_id, index),
                name: record.name,
                uri: record.rtsp_url.unwrap_or_default(),
                is_relay: record.relay,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn registry_with(content: &str) -> (tempfile::TempDir, JsonCameraRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_cameras.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, JsonCameraRegistry::new(path))
    }

    #[test]
    fn lists_cameras_in_index_order() {
        let (_dir, registry) = registry_with(
            r#"{
                "alice": [
                    {"name": "front door", "rtsp_url": "rtsp://10.0.0.2/live", "relay": false, "added_time": "2024-05-01T10:00:00"},
                    {"name": "phone", "relay": true}
                ]
            }"#,
        );

        let cameras = registry.list_cameras("alice").unwrap();
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].key, CameraKey::new("alice", 0));
        assert_eq!(cameras[0].uri, "rtsp://10.0.0.2/live");
        assert!(!cameras[0].is_relay);
        assert_eq!(cameras[1].name, "phone");
        assert!(cameras[1].is_relay);
        assert!(cameras[1].uri.is_empty());
    }

    #[test]
    fn unknown_user_and_index_are_not_found() {
        let (_dir, registry) = registry_with(r#"{"alice": [{"name": "cam", "rtsp_url": "0"}]}"#);
        assert!(registry.list_cameras("bob").unwrap().is_empty());
        assert!(matches!(
            registry.get_camera("alice", 3),
            Err(RegistryError::NotFound)
        ));
        assert_eq!(registry.get_camera("alice", 0).unwrap().uri, "0");
    }

    #[test]
    fn missing_file_means_no_cameras() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonCameraRegistry::new(dir.path().join("absent.json"));
        assert!(registry.list_cameras("alice").unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_a_read_failure() {
        let (_dir, registry) = registry_with("{not json");
        assert!(matches!(
            registry.list_cameras("alice"),
            Err(RegistryError::ReadFailed(_))
        ));
    }
}
