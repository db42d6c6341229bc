//! Camera feeds behind a uniform pull interface.
//!
//! A [`FrameSource`] yields RGB frames one at a time. Pulled cameras (RTSP,
//! HTTP, V4L2 devices) are decoded by an `ffmpeg` subprocess writing raw
//! `rgb24` frames to its stdout. Relay cameras have their frames pushed in
//! through the [`RelayHub`] and read back from a channel, so the capture loop
//! treats both the same way.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout};
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::codec::decode_jpeg;
use super::ffmpeg;
use super::types::{rgb_len, Frame};
use crate::camera_registry::{CameraDescriptor, CameraKey, SourceKind};
use crate::configuration::MonitoringConfig;
use crate::error_handling::types::CaptureError;

const RELAY_QUEUE_DEPTH: usize = 8;

#[async_trait]
pub trait FrameSource: Send {
    /// Reads the next frame. A closed or silent feed is a `ReadFailure`.
    async fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Releases the underlying connection. Idempotent.
    async fn close(&mut self);
}

#[async_trait]
pub trait FrameSourceFactory: Send + Sync {
    /// Opens the camera. Fails with `ConnectFailure` when the source refuses
    /// to open or does not deliver a first frame in time.
    async fn open(&self, camera: &CameraDescriptor) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// Geometry and timing applied to every decoded feed.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl From<&MonitoringConfig> for CaptureSettings {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            width: config.frame_width,
            height: config.frame_height,
            fps: config.nominal_fps,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.connect_timeout(),
        }
    }
}

/// ffmpeg arguments decoding `kind` to raw RGB24 on stdout, or `None` when the
/// source cannot be pulled.
pub fn decode_args(kind: &SourceKind, settings: &CaptureSettings) -> Option<Vec<String>> {
    let mut args = ffmpeg::quiet_prelude();
    match kind {
        SourceKind::Rtsp(uri) => args.extend(ffmpeg::rtsp_input(uri, "tcp")),
        SourceKind::Network(uri) => args.extend(["-i".to_string(), uri.clone()]),
        SourceKind::LocalDevice(device) => args.extend(ffmpeg::device_input(device)),
        SourceKind::Relay | SourceKind::Unsupported(_) => return None,
    }
    args.extend([
        "-an".to_string(),
        "-vf".to_string(),
        format!("scale={}:{}", settings.width, settings.height),
        "-r".to_string(),
        format!("{}", settings.fps),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-".to_string(),
    ]);
    Some(args)
}

/// Reads exactly one raw RGB24 frame from `reader`.
pub async fn read_raw_frame<R>(reader: &mut R, width: u32, height: u32) -> Result<Frame, CaptureError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; rgb_len(width, height)];
    reader.read_exact(&mut buf).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => CaptureError::ReadFailure("stream ended".into()),
        _ => CaptureError::IoError(e),
    })?;
    Frame::from_rgb(width, height, buf, Utc::now())
}

/// Frame source backed by an ffmpeg decoding subprocess.
pub struct FfmpegFrameSource {
    label: String,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    pending: Option<Frame>,
    settings: CaptureSettings,
}

impl FfmpegFrameSource {
    pub async fn open(camera: &CameraDescriptor, settings: CaptureSettings) -> Result<Self, CaptureError> {
        let label = camera.label();
        let args = decode_args(&camera.source_kind(), &settings).ok_or_else(|| {
            warn!("{} Unsupported camera source '{}'", label, camera.uri);
            CaptureError::ConnectFailure(format!("unsupported source '{}'", camera.uri))
        })?;

        let mut child = ffmpeg::spawn(&label, &args, false)
            .map_err(|e| CaptureError::ConnectFailure(e.to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::ConnectFailure("ffmpeg stdout unavailable".into()))?;

        // The process starting is not enough; the feed is open once it yields a frame.
        let first = timeout(
            settings.connect_timeout,
            read_raw_frame(&mut stdout, settings.width, settings.height),
        )
        .await;
        let first = match first {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(CaptureError::ConnectFailure(format!("{}: {}", camera.uri, e)));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(CaptureError::ConnectFailure(format!(
                    "{}: no frame within {:?}",
                    camera.uri, settings.connect_timeout
                )));
            }
        };

        info!("{} Frame source opened ({}x{})", label, settings.width, settings.height);
        Ok(Self {
            label,
            child: Some(child),
            stdout: Some(stdout),
            pending: Some(first),
            settings,
        })
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| CaptureError::ReadFailure("source closed".into()))?;
        match timeout(
            self.settings.read_timeout,
            read_raw_frame(stdout, self.settings.width, self.settings.height),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CaptureError::ReadFailure(format!(
                "no frame within {:?}",
                self.settings.read_timeout
            ))),
        }
    }

    async fn close(&mut self) {
        self.stdout = None;
        self.pending = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            match timeout(Duration::from_secs(2), child.wait()).await {
                Ok(Ok(status)) => debug!("{} ffmpeg exited with {}", self.label, status),
                Ok(Err(e)) => warn!("{} Failed to reap ffmpeg: {}", self.label, e),
                Err(_) => warn!("{} ffmpeg did not exit after kill", self.label),
            }
        }
    }
}

/// Routes frames pushed by external relays to the session reading that camera.
pub struct RelayHub {
    width: u32,
    height: u32,
    routes: Mutex<HashMap<CameraKey, mpsc::Sender<Frame>>>,
}

impl RelayHub {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Creates the receiving side for `key`, replacing any previous route.
    pub fn attach(&self, key: &CameraKey) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(RELAY_QUEUE_DEPTH);
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes.insert(key.clone(), tx.clone());
        (tx, rx)
    }

    /// Removes the route for `key` if it still belongs to `sender`.
    pub fn detach(&self, key: &CameraKey, sender: &mpsc::Sender<Frame>) {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        if routes.get(key).is_some_and(|current| current.same_channel(sender)) {
            routes.remove(key);
        }
    }

    /// Decodes a pushed JPEG and hands it to the reading session.
    ///
    /// Returns `Ok(false)` when nobody is reading the camera or the reader is
    /// behind; relay frames are best effort.
    pub fn push_jpeg(&self, key: &CameraKey, jpeg: &[u8]) -> Result<bool, CaptureError> {
        let frame = decode_jpeg(jpeg, self.width, self.height)?;
        Ok(self.push(key, frame))
    }

    pub fn push(&self, key: &CameraKey, frame: Frame) -> bool {
        let sender = {
            let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
            routes.get(key).cloned()
        };
        match sender {
            Some(sender) => match sender.try_send(frame) {
                Ok(()) => true,
                Err(e) => {
                    debug!("[{}] Relay frame dropped: {}", key, e);
                    false
                }
            },
            None => {
                debug!("[{}] Relay frame dropped, no active session", key);
                false
            }
        }
    }

    pub fn route_count(&self) -> usize {
        self.routes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub struct RelayFrameSource {
    key: CameraKey,
    hub: Arc<RelayHub>,
    sender: mpsc::Sender<Frame>,
    receiver: mpsc::Receiver<Frame>,
    read_timeout: Duration,
    closed: bool,
}

impl RelayFrameSource {
    pub fn open(hub: Arc<RelayHub>, key: &CameraKey, read_timeout: Duration) -> Self {
        let (sender, receiver) = hub.attach(key);
        debug!("[{}] Relay route attached", key);
        Self {
            key: key.clone(),
            hub,
            sender,
            receiver,
            read_timeout,
            closed: false,
        }
    }
}

#[async_trait]
impl FrameSource for RelayFrameSource {
    async fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.closed {
            return Err(CaptureError::ReadFailure("relay closed".into()));
        }
        match timeout(self.read_timeout, self.receiver.recv()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(CaptureError::ReadFailure("relay closed".into())),
            Err(_) => Err(CaptureError::ReadFailure(format!(
                "no relay frame within {:?}",
                self.read_timeout
            ))),
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.hub.detach(&self.key, &self.sender);
            debug!("[{}] Relay route detached", self.key);
        }
    }
}

impl Drop for RelayFrameSource {
    fn drop(&mut self) {
        self.hub.detach(&self.key, &self.sender);
    }
}

/// Opens relay cameras through the hub and everything else through ffmpeg.
pub struct DefaultSourceFactory {
    settings: CaptureSettings,
    relays: Arc<RelayHub>,
}

impl DefaultSourceFactory {
    pub fn new(settings: CaptureSettings, relays: Arc<RelayHub>) -> Self {
        Self { settings, relays }
    }
}

#[async_trait]
impl FrameSourceFactory for DefaultSourceFactory {
    async fn open(&self, camera: &CameraDescriptor) -> Result<Box<dyn FrameSource>, CaptureError> {
        match camera.source_kind() {
            SourceKind::Relay => Ok(Box::new(RelayFrameSource::open(
                Arc::clone(&self.relays),
                &camera.key,
                self.settings.read_timeout,
            ))),
            _ => Ok(Box::new(
                FfmpegFrameSource::open(camera, self.settings.clone()).await?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CaptureSettings {
        CaptureSettings {
            width: 4,
            height: 2,
            fps: 10.0,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
        }
    }

    fn camera(uri: &str, is_relay: bool) -> CameraDescriptor {
        CameraDescriptor {
            key: CameraKey::new("alice", 0),
            name: "hall".into(),
            uri: uri.into(),
            is_relay,
        }
    }

    fn frame(tag: u8) -> Frame {
        Frame::from_rgb(1, 1, vec![tag; 3], Utc::now()).unwrap()
    }

    #[test]
    fn rtsp_is_decoded_over_tcp_to_rgb24() {
        let args = decode_args(&SourceKind::parse("rtsp://10.0.0.2/live"), &settings()).unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("-rtsp_transport tcp"));
        assert!(joined.contains("-i rtsp://10.0.0.2/live"));
        assert!(joined.contains("scale=4:2"));
        assert!(joined.ends_with("-pix_fmt rgb24 -f rawvideo -"));
    }

    #[test]
    fn devices_use_v4l2_and_unsupported_sources_have_no_args() {
        let args = decode_args(&SourceKind::parse("2"), &settings()).unwrap();
        assert!(args.join(" ").contains("-f video4linux2 -i /dev/video2"));
        assert!(decode_args(&SourceKind::parse("bad://camera"), &settings()).is_none());
        assert!(decode_args(&SourceKind::Relay, &settings()).is_none());
    }

    #[tokio::test]
    async fn unsupported_scheme_fails_to_open() {
        let err = FfmpegFrameSource::open(&camera("bad://camera", false), settings())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::ConnectFailure(_)));
    }

    #[tokio::test]
    async fn raw_frames_are_read_whole() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&[1, 2, 3, 4, 5])
            .read(&[6])
            .read(&[9; 6])
            .build();
        let first = read_raw_frame(&mut reader, 2, 1).await.unwrap();
        assert_eq!(first.data(), &[1, 2, 3, 4, 5, 6]);
        let second = read_raw_frame(&mut reader, 2, 1).await.unwrap();
        assert_eq!(second.data(), &[9; 6]);
    }

    #[tokio::test]
    async fn truncated_stream_is_a_read_failure() {
        let mut reader = tokio_test::io::Builder::new().read(&[1, 2, 3]).build();
        let err = read_raw_frame(&mut reader, 2, 1).await.unwrap_err();
        assert!(matches!(err, CaptureError::ReadFailure(_)));
    }

    #[tokio::test]
    async fn relay_frames_reach_the_attached_source() {
        let hub = Arc::new(RelayHub::new(1, 1));
        let key = CameraKey::new("alice", 0);
        assert!(!hub.push(&key, frame(1)));

        let mut source = RelayFrameSource::open(Arc::clone(&hub), &key, Duration::from_secs(1));
        assert!(hub.push(&key, frame(7)));
        assert_eq!(source.read_frame().await.unwrap().data(), &[7, 7, 7]);

        source.close().await;
        assert_eq!(hub.route_count(), 0);
        assert!(!hub.push(&key, frame(8)));
    }

    #[tokio::test]
    async fn stale_source_does_not_detach_newer_route() {
        let hub = Arc::new(RelayHub::new(1, 1));
        let key = CameraKey::new("alice", 0);
        let mut old = RelayFrameSource::open(Arc::clone(&hub), &key, Duration::from_secs(1));
        let mut new = RelayFrameSource::open(Arc::clone(&hub), &key, Duration::from_secs(1));

        old.close().await;
        assert!(hub.push(&key, frame(3)));
        assert_eq!(new.read_frame().await.unwrap().data(), &[3, 3, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_relay_times_out_as_read_failure() {
        let hub = Arc::new(RelayHub::new(1, 1));
        let key = CameraKey::new("alice", 0);
        let mut source = RelayFrameSource::open(hub, &key, Duration::from_secs(5));
        let err = source.read_frame().await.unwrap_err();
        assert!(matches!(err, CaptureError::ReadFailure(_)));
    }

    #[tokio::test]
    async fn factory_routes_relays_to_the_hub() {
        let hub = Arc::new(RelayHub::new(1, 1));
        let factory = DefaultSourceFactory::new(settings(), Arc::clone(&hub));
        let _source = factory.open(&camera("", true)).await.unwrap();
        assert_eq!(hub.route_count(), 1);
    }
}
