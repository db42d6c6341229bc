use std::fmt;

use log::debug;
use tokio::io::AsyncRead;
use tokio::process::Child;

use crate::camera_registry::{CameraDescriptor, SourceKind};
use crate::configuration::StreamConfig;
use crate::data_capture::ffmpeg;
use crate::error_handling::types::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtspTransport {
    /// Reliable, interleaved in the RTSP connection.
    Tcp,
    /// Best effort.
    Udp,
}

impl RtspTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            RtspTransport::Tcp => "tcp",
            RtspTransport::Udp => "udp",
        }
    }
}

/// One way of obtaining live frames for a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportAttempt {
    Rtsp(RtspTransport),
    /// Open the source directly (HTTP feed or local device).
    Direct,
    /// Re-encode the frames of the camera's running monitoring session.
    SessionTap,
}

impl fmt::Display for TransportAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportAttempt::Rtsp(transport) => write!(f, "rtsp/{}", transport.as_str()),
            TransportAttempt::Direct => write!(f, "direct"),
            TransportAttempt::SessionTap => write!(f, "session tap"),
        }
    }
}

/// Ordered attempts for a camera, most reliable first.
///
/// Local devices usually refuse a second open while a session holds them,
/// so the session's own frames are preferred. Relay cameras can only be seen
/// through their session.
pub fn transport_plan(kind: &SourceKind) -> Vec<TransportAttempt> {
    match kind {
        SourceKind::Rtsp(_) => vec![
            TransportAttempt::Rtsp(RtspTransport::Tcp),
            TransportAttempt::Rtsp(RtspTransport::Udp),
        ],
        SourceKind::Network(_) => vec![TransportAttempt::Direct],
        SourceKind::LocalDevice(_) => vec![TransportAttempt::SessionTap, TransportAttempt::Direct],
        SourceKind::Relay => vec![TransportAttempt::SessionTap],
        SourceKind::Unsupported(_) => Vec::new(),
    }
}

/// ffmpeg arguments re-encoding the source to MJPEG on stdout.
pub fn transcode_args(
    kind: &SourceKind,
    attempt: TransportAttempt,
    config: &StreamConfig,
) -> Option<Vec<String>> {
    let mut args = ffmpeg::quiet_prelude();
    match (attempt, kind) {
        (TransportAttempt::Rtsp(transport), SourceKind::Rtsp(uri)) => {
            args.extend(ffmpeg::rtsp_input(uri, transport.as_str()))
        }
        (TransportAttempt::Direct, SourceKind::Network(uri)) => {
            args.extend(["-i".to_string(), uri.clone()])
        }
        (TransportAttempt::Direct, SourceKind::LocalDevice(device)) => {
            args.extend(ffmpeg::device_input(device))
        }
        _ => return None,
    }
    args.extend([
        "-an".to_string(),
        "-f".to_string(),
        "mjpeg".to_string(),
        "-q:v".to_string(),
        config.jpeg_quality.to_string(),
        "-r".to_string(),
        config.fps.to_string(),
        "-".to_string(),
    ]);
    Some(args)
}

/// A running transcoder: its MJPEG output and the process to keep alive
/// while reading it.
pub struct TranscodeOutput {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub process: Option<Child>,
}

pub trait Transcoder: Send + Sync {
    fn spawn(
        &self,
        camera: &CameraDescriptor,
        attempt: TransportAttempt,
    ) -> Result<TranscodeOutput, CaptureError>;
}

pub struct FfmpegTranscoder {
    config: StreamConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn spawn(
        &self,
        camera: &CameraDescriptor,
        attempt: TransportAttempt,
    ) -> Result<TranscodeOutput, CaptureError> {
        let args = transcode_args(&camera.source_kind(), attempt, &self.config).ok_or_else(|| {
            CaptureError::ConnectFailure(format!("{} is not possible for '{}'", attempt, camera.uri))
        })?;
        let label = format!("{}[view {}]", camera.label(), attempt);
        let mut child = ffmpeg::spawn(&label, &args, false)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::ProcessError("ffmpeg stdout unavailable".into()))?;
        debug!("{} Transcoder started", label);
        Ok(TranscodeOutput {
            reader: Box::new(stdout),
            process: Some(child),
        })
    }
}
