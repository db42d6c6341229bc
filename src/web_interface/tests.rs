use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tempfile::TempDir;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use super::*;
use crate::alerting::AlertDispatcher;
use crate::camera_registry::{CameraDescriptor, JsonCameraRegistry};
use crate::classification::{Classifier, Verdict};
use crate::configuration::{MonitoringConfig, StreamConfig};
use crate::data_capture::codec::{encode_jpeg, DEFAULT_JPEG_QUALITY};
use crate::data_capture::{
    ClipWriter, Frame, FrameSource, FrameSourceFactory, FrameWriter, IncidentClip,
    RecordingFactory, RelayFrameSource, RelayHub,
};
use crate::error_handling::types::{CaptureError, ClassifierError, ClipError};
use crate::session_management::{MonitoringSupervisor, SessionContext};
use crate::storage::{ClipRecord, FileStorage, Storage};
use crate::streaming::transcoder::{TranscodeOutput, Transcoder, TransportAttempt};
use crate::streaming::StreamMultiplexer;

const CAMERAS: &str = r#"{
    "alice": [
        {"name": "porch", "rtsp_url": "rtsp://10.0.0.2/live"},
        {"name": "phone", "relay": true}
    ]
}"#;

fn pixel() -> Frame {
    Frame::from_rgb(2, 2, vec![90; 12], Utc::now()).unwrap()
}

struct EndlessSource;

#[async_trait]
impl FrameSource for EndlessSource {
    async fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        Ok(pixel())
    }

    async fn close(&mut self) {}
}

/// Relay cameras go through the hub, everything else never runs dry.
struct TestSources {
    relays: Arc<RelayHub>,
}

#[async_trait]
impl FrameSourceFactory for TestSources {
    async fn open(&self, camera: &CameraDescriptor) -> Result<Box<dyn FrameSource>, CaptureError> {
        if camera.is_relay {
            return Ok(Box::new(RelayFrameSource::open(
                Arc::clone(&self.relays),
                &camera.key,
                Duration::from_millis(200),
            )));
        }
        Ok(Box::new(EndlessSource))
    }
}

struct QuietClassifier;

#[async_trait]
impl Classifier for QuietClassifier {
    async fn classify(&self, _frame: &Frame) -> Result<Verdict, ClassifierError> {
        Ok(Verdict {
            fall_detected: false,
            confidence: 0.1,
        })
    }
}

struct NoClips;

#[async_trait]
impl ClipWriter for NoClips {
    async fn write_clip(&self, _clip: IncidentClip) -> Result<ClipRecord, ClipError> {
        Err(ClipError::EmptySnapshot)
    }
}

struct NullWriter(u64);

#[async_trait]
impl FrameWriter for NullWriter {
    async fn write_frame(&mut self, _frame: &Frame) -> Result<(), CaptureError> {
        self.0 += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<PathBuf, CaptureError> {
        Ok(PathBuf::from("null.mp4"))
    }

    fn frames_written(&self) -> u64 {
        self.0
    }
}

struct NullRecordings;

impl RecordingFactory for NullRecordings {
    fn create(&self, _camera: &CameraDescriptor) -> Result<Box<dyn FrameWriter>, CaptureError> {
        Ok(Box::new(NullWriter(0)))
    }
}

struct NoTranscoder;

impl Transcoder for NoTranscoder {
    fn spawn(
        &self,
        _camera: &CameraDescriptor,
        _attempt: TransportAttempt,
    ) -> Result<TranscodeOutput, CaptureError> {
        Err(CaptureError::ProcessError("ffmpeg not installed".into()))
    }
}

struct TestApp {
    _dir: TempDir,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let cameras = dir.path().join("user_cameras.json");
        std::fs::write(&cameras, CAMERAS).unwrap();

        let relays = Arc::new(RelayHub::new(4, 4));
        let dispatcher = Arc::new(AlertDispatcher::new());
        let context = Arc::new(SessionContext {
            sources: Arc::new(TestSources {
                relays: Arc::clone(&relays),
            }),
            classifier: Arc::new(QuietClassifier),
            clip_writer: Arc::new(NoClips),
            recordings: Arc::new(NullRecordings),
            dispatcher: Arc::clone(&dispatcher),
            config: MonitoringConfig {
                frame_interval_ms: 10,
                ..MonitoringConfig::default()
            },
            classifier_timeout: Duration::from_secs(1),
        });
        let supervisor = Arc::new(MonitoringSupervisor::new(
            Arc::new(JsonCameraRegistry::new(&cameras)),
            context,
            relays,
        ));
        let multiplexer = Arc::new(
            StreamMultiplexer::new(Arc::new(NoTranscoder), StreamConfig::default(), (32, 24))
                .unwrap(),
        );
        let storage = Arc::new(FileStorage::new(dir.path().join("clips")).unwrap());

        Self {
            _dir: dir,
            state: AppState {
                supervisor,
                multiplexer,
                dispatcher,
                storage,
            },
        }
    }

    fn routes(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone + 'static {
        api_routes(self.state.clone())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = warp::test::request()
            .method("POST")
            .path(path)
            .json(&body)
            .reply(&self.routes())
            .await;
        (res.status(), serde_json::from_slice(res.body()).unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = warp::test::request().path(path).reply(&self.routes()).await;
        (res.status(), serde_json::from_slice(res.body()).unwrap_or(Value::Null))
    }

    async fn push_relay(&self, jpeg: Vec<u8>) -> warp::http::Response<bytes::Bytes> {
        warp::test::request()
            .method("POST")
            .path("/relay/frame/alice/1")
            .body(jpeg)
            .reply(&self.routes())
            .await
    }

    async fn wait_for(&self, what: &str, condition: impl Fn(&AppState) -> bool) {
        for _ in 0..200 {
            if condition(&self.state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {}", what);
    }
}

#[tokio::test]
async fn empty_selection_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .post("/start-monitoring/alice", json!({"selectedCameras": []}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No cameras selected");
    assert_eq!(app.state.supervisor.active_count(), 0);
}

#[tokio::test]
async fn monitoring_lifecycle_over_http() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/start-monitoring/alice", json!({"selectedCameras": [0, 7]}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["started"], json!([0]));
    assert_eq!(body["failed"][0]["index"], 7);

    let (_, body) = app
        .post("/start-monitoring/alice", json!({"selectedCameras": [0]}))
        .await;
    assert_eq!(body["already_running"], json!([0]));
    assert_eq!(app.state.supervisor.active_count(), 1);

    let (status, body) = app.get("/monitoring/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
    assert_eq!(body["sessions"][0]["camera_name"], "porch");

    let (status, body) = app.post("/stop-monitoring/alice", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], json!([0]));
    assert_eq!(app.state.supervisor.active_count(), 0);
}

#[tokio::test]
async fn stopping_an_idle_camera_is_not_found() {
    let app = TestApp::new();
    let (status, _) = app.post("/stop-monitoring/alice/0", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn recording_needs_a_running_session() {
    let app = TestApp::new();
    let request = json!({"userId": "alice", "cameraIndex": 0});

    let (status, _) = app.post("/cctv/start-recording", request.clone()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.post("/start-monitoring/alice", json!({"selectedCameras": [0]}))
        .await;
    let (status, _) = app.post("/cctv/start-recording", request.clone()).await;
    assert_eq!(status, StatusCode::OK);
    app.wait_for("recording flag", |state| {
        state.supervisor.sessions("alice")[0].recording
    })
    .await;

    let (status, _) = app.post("/cctv/stop-recording", request).await;
    assert_eq!(status, StatusCode::OK);
    app.wait_for("recording finished", |state| {
        !state.supervisor.sessions("alice")[0].recording
    })
    .await;
    app.state.supervisor.shutdown_all().await;
}

#[tokio::test]
async fn relay_frames_reach_the_monitoring_session() {
    let app = TestApp::new();
    let jpeg = encode_jpeg(&pixel(), DEFAULT_JPEG_QUALITY).unwrap();
    let res = app.push_relay(jpeg.clone()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body().as_ref(), br#"{"delivered":false}"#);

    app.post("/start-monitoring/alice", json!({"selectedCameras": [1]}))
        .await;
    app.wait_for("relay route", |state| state.supervisor.relay_routes() == 1)
        .await;

    let res = app.push_relay(jpeg).await;
    assert_eq!(res.body().as_ref(), br#"{"delivered":true}"#);
    app.wait_for("relay frame read", |state| {
        state.supervisor.sessions("alice")[0].frames_read >= 1
    })
    .await;

    let res = app.push_relay(b"not a jpeg".to_vec()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    app.state.supervisor.shutdown_all().await;
}

#[tokio::test]
async fn accident_videos_are_listed_per_user() {
    let app = TestApp::new();
    let record = ClipRecord {
        id: Uuid::new_v4(),
        user_id: "alice".into(),
        camera_index: 0,
        camera_name: "porch".into(),
        file_name: "accident_alice_0.mp4".into(),
        path: PathBuf::from("accident_alice_0.mp4"),
        detected_at: Utc::now(),
        created_at: Utc::now(),
        frame_count: 100,
        duration_secs: 10.0,
        confidence: 0.93,
    };
    app.state.storage.save_clip(&record).unwrap();

    let (status, body) = app.get("/accident-videos/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["file_name"], "accident_alice_0.mp4");

    let (_, body) = app.get("/accident-videos/bob").await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn unknown_camera_has_no_stream() {
    let app = TestApp::new();
    let (status, _) = app.get("/cctv/stream/alice/9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreachable_camera_streams_the_error_frame() {
    let app = TestApp::new();
    let (addr, server) = warp::serve(app.routes()).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let mut res = reqwest::get(format!("http://{}/cctv/stream/alice/0", addr))
        .await
        .unwrap();
    assert_eq!(
        res.headers()["content-type"],
        "multipart/x-mixed-replace; boundary=frame"
    );
    let first = res.chunk().await.unwrap().unwrap();
    assert!(first.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
}

#[tokio::test]
async fn alert_socket_receives_alerts_until_closed() {
    let app = TestApp::new();
    let mut client = warp::test::ws()
        .path("/ws/alert/alice")
        .handshake(app.routes())
        .await
        .expect("handshake");

    app.wait_for("channel registration", |state| {
        state.dispatcher.channel_count() == 1
    })
    .await;
    app.state.dispatcher.send("alice", "Fall detected in porch at 14:03:09!");
    let message = client.recv().await.unwrap();
    assert_eq!(message.to_str(), Ok("Fall detected in porch at 14:03:09!"));

    drop(client);
    app.wait_for("channel removal", |state| state.dispatcher.channel_count() == 0)
        .await;
}

#[tokio::test]
async fn status_reports_counts() {
    let app = TestApp::new();
    let (status, body) = app.get("/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"active_sessions": 0, "alert_channels": 0, "relay_routes": 0})
    );
}
