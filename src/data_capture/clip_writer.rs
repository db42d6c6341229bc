//! Incident clip assembly.
//!
//! When a session confirms a detection it freezes its ring buffer into an
//! [`IncidentClip`] and hands it to a [`ClipWriter`] on a detached task. The
//! writer encodes the frames and records the result in [`Storage`]; the
//! session never waits for either step.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use uuid::Uuid;

use super::types::Frame;
use super::video_writer::{video_file_name, FfmpegVideoWriter, FrameWriter};
use crate::error_handling::types::ClipError;
use crate::storage::{ClipRecord, Storage};

/// Frames around a detection, ready to be encoded.
#[derive(Debug, Clone)]
pub struct IncidentClip {
    pub user_id: String,
    pub camera_index: usize,
    pub camera_name: String,
    pub detected_at: DateTime<Utc>,
    pub confidence: f32,
    /// Ring buffer snapshot, oldest first.
    pub frames: Vec<Frame>,
    pub nominal_fps: f32,
}

impl IncidentClip {
    pub fn duration_secs(&self) -> f64 {
        if self.nominal_fps <= 0.0 {
            return 0.0;
        }
        self.frames.len() as f64 / self.nominal_fps as f64
    }

    pub fn file_name(&self) -> String {
        video_file_name("accident", &self.user_id, self.camera_index, self.detected_at)
    }

    fn label(&self) -> String {
        format!("[{}/{} {}]", self.user_id, self.camera_index, self.camera_name)
    }
}

#[async_trait]
pub trait ClipWriter: Send + Sync {
    async fn write_clip(&self, clip: IncidentClip) -> Result<ClipRecord, ClipError>;
}

/// Encodes clips to MP4 under `clips_dir` and indexes them in storage.
pub struct FfmpegClipWriter {
    clips_dir: PathBuf,
    storage: Arc<dyn Storage>,
}

impl FfmpegClipWriter {
    pub fn new(clips_dir: PathBuf, storage: Arc<dyn Storage>) -> Self {
        Self { clips_dir, storage }
    }
}

#[async_trait]
impl ClipWriter for FfmpegClipWriter {
    async fn write_clip(&self, clip: IncidentClip) -> Result<ClipRecord, ClipError> {
        let first = clip.frames.first().ok_or(ClipError::EmptySnapshot)?;
        let label = clip.label();
        let file_name = clip.file_name();

        let mut writer = FfmpegVideoWriter::create(
            &label,
            self.clips_dir.join(&file_name),
            first.width(),
            first.height(),
            clip.nominal_fps,
        )?;
        for frame in &clip.frames {
            if let Err(e) = writer.write_frame(frame).await {
                warn!("{} Aborting clip {}: {}", label, file_name, e);
                let _ = writer.finish().await;
                return Err(e.into());
            }
        }
        let path = writer.finish().await?;

        let record = ClipRecord {
            id: Uuid::new_v4(),
            user_id: clip.user_id.clone(),
            camera_index: clip.camera_index,
            camera_name: clip.camera_name.clone(),
            file_name,
            path,
            detected_at: clip.detected_at,
            created_at: Utc::now(),
            frame_count: clip.frames.len(),
            duration_secs: clip.duration_secs(),
            confidence: clip.confidence,
        };
        self.storage.save_clip(&record)?;
        info!(
            "{} Saved incident clip {} ({:.1}s)",
            label, record.file_name, record.duration_secs
        );
        Ok(record)
    }
}
