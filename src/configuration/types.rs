use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0"),
            port: 8000,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving encoded incident clips and their metadata index.
    pub clips_dir: PathBuf,
    /// Directory receiving continuous recordings.
    pub footage_dir: PathBuf,
    /// JSON document listing each user's cameras.
    pub cameras_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            clips_dir: PathBuf::from("accident_clips"),
            footage_dir: PathBuf::from("footages"),
            cameras_file: PathBuf::from("user_cameras.json"),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Base URL of the prediction service; `/predict` is appended.
    pub url: String,
    pub timeout_secs: u64,
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: String::from("http://localhost:8000"),
            timeout_secs: 5,
        }
    }
}

/// Tuning of a camera session.
///
/// The threshold, cooldown and sample interval defaults come from field
/// experience rather than any hard requirement and can be changed freely.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Number of recent frames kept for incident clips.
    pub buffer_capacity: usize,
    /// Every Nth frame is sent to the classifier.
    pub sample_interval: u64,
    /// Confidence the classifier must exceed for an alert.
    pub confidence_threshold: f32,
    /// Minimum time between two alerts of the same camera.
    pub cooldown_secs: u64,
    /// Pacing sleep between two frames.
    pub frame_interval_ms: u64,
    /// Sleep before retrying after a failed read.
    pub reconnect_backoff_secs: u64,
    /// Consecutive read failures after which the source is re-opened.
    pub reopen_after_failures: u32,
    /// Time allowed for the first frame when opening a source.
    pub connect_timeout_secs: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Rate used to compute clip durations and encode clips.
    pub nominal_fps: f32,
    /// Continuous recordings are finalised after this many frames.
    pub recording_max_frames: u64,
}

impl MonitoringConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 100,
            sample_interval: 10,
            confidence_threshold: 0.7,
            cooldown_secs: 10,
            frame_interval_ms: 100,
            reconnect_backoff_secs: 5,
            reopen_after_failures: 6,
            connect_timeout_secs: 10,
            frame_width: 640,
            frame_height: 480,
            nominal_fps: 10.0,
            recording_max_frames: 3000,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Time a transport attempt has to produce its first chunk.
    pub connect_timeout_secs: u64,
    pub fps: u32,
    /// ffmpeg `-q:v` scale (2 best, 31 worst).
    pub jpeg_quality: u8,
    pub error_frame_interval_ms: u64,
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Never zero; `tokio::time::interval` rejects an empty period.
    pub fn error_frame_interval(&self) -> Duration {
        Duration::from_millis(self.error_frame_interval_ms.max(1))
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            fps: 10,
            jpeg_quality: 5,
            error_frame_interval_ms: 1000,
        }
    }
}
