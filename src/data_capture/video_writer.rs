//! Encoding frame sequences to seekable MP4 files.
//!
//! Both incident clips and continuous recordings go through [`FrameWriter`]:
//! raw RGB24 frames are piped into an `ffmpeg` process that produces H.264 in
//! an MP4 container with the index moved to the front (`+faststart`), so the
//! result can be played and seeked while being served over HTTP.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::time::timeout;

use super::ffmpeg;
use super::types::Frame;
use crate::camera_registry::CameraDescriptor;
use crate::error_handling::types::CaptureError;

const FINISH_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError>;

    /// Flushes and closes the output, returning the finished file.
    async fn finish(&mut self) -> Result<PathBuf, CaptureError>;

    /// Abandons a writer whose recording never started.
    async fn discard(&mut self) {
        if let Err(e) = self.finish().await {
            debug!("Discarded writer did not finish cleanly: {}", e);
        }
    }

    fn frames_written(&self) -> u64;
}

/// Creates the writer backing a continuous recording of one camera.
pub trait RecordingFactory: Send + Sync {
    fn create(&self, camera: &CameraDescriptor) -> Result<Box<dyn FrameWriter>, CaptureError>;
}

/// ffmpeg arguments reading raw RGB24 from stdin and writing an MP4 to `output`.
pub fn encode_args(width: u32, height: u32, fps: f32, output: &Path) -> Vec<String> {
    let mut args = ffmpeg::quiet_prelude();
    args.extend([
        "-y".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-s".to_string(),
        format!("{}x{}", width, height),
        "-r".to_string(),
        format!("{}", fps),
        "-i".to_string(),
        "-".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        output.display().to_string(),
    ]);
    args
}

/// `<prefix>_<user>_<index>_<YYYYmmdd_HHMMSS_mmm>.mp4`, with an empty prefix omitted.
/// Encoding runs with `-y`, so the stamp goes down to the millisecond.
pub fn video_file_name(prefix: &str, user_id: &str, index: usize, at: DateTime<Utc>) -> String {
    let stamp = at.format("%Y%m%d_%H%M%S_%3f");
    if prefix.is_empty() {
        format!("{}_{}_{}.mp4", sanitize(user_id), index, stamp)
    } else {
        format!("{}_{}_{}_{}.mp4", prefix, sanitize(user_id), index, stamp)
    }
}

/// Keeps user ids from escaping the output directory.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

pub struct FfmpegVideoWriter {
    label: String,
    path: PathBuf,
    width: u32,
    height: u32,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frames_written: u64,
}

impl FfmpegVideoWriter {
    pub fn create(
        label: &str,
        path: PathBuf,
        width: u32,
        height: u32,
        fps: f32,
    ) -> Result<Self, CaptureError> {
        let args = encode_args(width, height, fps, &path);
        let mut child = ffmpeg::spawn(label, &args, true)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CaptureError::ProcessError("ffmpeg stdin unavailable".into()))?;
        debug!("{} Writing video to {}", label, path.display());
        Ok(Self {
            label: label.to_string(),
            path,
            width,
            height,
            child: Some(child),
            stdin: Some(stdin),
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FrameWriter for FfmpegVideoWriter {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(CaptureError::EncodeError(format!(
                "frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| CaptureError::ProcessError("writer already finished".into()))?;
        stdin.write_all(frame.data()).await.map_err(|e| {
            error!("{} Failed to pipe frame into ffmpeg: {}", self.label, e);
            CaptureError::IoError(e)
        })?;
        self.frames_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<PathBuf, CaptureError> {
        // Closing stdin is what tells ffmpeg to finalise the container.
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                warn!("{} Failed to close ffmpeg stdin: {}", self.label, e);
            }
        }
        let mut child = self
            .child
            .take()
            .ok_or_else(|| CaptureError::ProcessError("writer already finished".into()))?;

        let status = match timeout(FINISH_TIMEOUT, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(CaptureError::ProcessError("ffmpeg did not finish in time".into()));
            }
        };
        if !status.success() {
            error!("{} ffmpeg exited with {}", self.label, status);
            return Err(CaptureError::ProcessError(format!("ffmpeg exited with {}", status)));
        }
        info!(
            "{} Finished {} ({} frames)",
            self.label,
            self.path.display(),
            self.frames_written
        );
        Ok(self.path.clone())
    }

    async fn discard(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("{} Discarded {}", self.label, self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("{} Failed to remove {}: {}", self.label, self.path.display(), e),
        }
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

/// Writes continuous recordings to `<footage_dir>/<user>_<index>_<timestamp>.mp4`.
pub struct FfmpegRecordingFactory {
    footage_dir: PathBuf,
    width: u32,
    height: u32,
    fps: f32,
}

impl FfmpegRecordingFactory {
    pub fn new(footage_dir: PathBuf, width: u32, height: u32, fps: f32) -> Self {
        Self {
            footage_dir,
            width,
            height,
            fps,
        }
    }
}

impl RecordingFactory for FfmpegRecordingFactory {
    fn create(&self, camera: &CameraDescriptor) -> Result<Box<dyn FrameWriter>, CaptureError> {
        let name = video_file_name("", &camera.key.user_id, camera.key.index, Utc::now());
        let writer = FfmpegVideoWriter::create(
            &camera.label(),
            self.footage_dir.join(name),
            self.width,
            self.height,
            self.fps,
        )?;
        Ok(Box::new(writer))
    }
}
