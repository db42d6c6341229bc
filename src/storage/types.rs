use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored reference to an encoded incident clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub id: Uuid,
    pub user_id: String,
    pub camera_index: usize,
    pub camera_name: String,
    pub file_name: String,
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub frame_count: usize,
    pub duration_secs: f64,
    pub confidence: f32,
}
