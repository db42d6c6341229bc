use serde::{Deserialize, Serialize};

use crate::session_management::SessionInfo;

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartMonitoringRequest {
    #[serde(rename = "selectedCameras", default)]
    pub selected_cameras: Vec<usize>,
}

#[derive(Debug, Serialize)]
pub struct CameraFailure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct StartMonitoringResponse {
    pub started: Vec<usize>,
    pub already_running: Vec<usize>,
    pub failed: Vec<CameraFailure>,
}

#[derive(Debug, Serialize)]
pub struct StopMonitoringResponse {
    pub stopped: Vec<usize>,
}

#[derive(Debug, Serialize)]
pub struct MonitoringResponse {
    pub user_id: String,
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRequest {
    pub user_id: String,
    pub camera_index: usize,
}

#[derive(Debug, Serialize)]
pub struct RelayFrameResponse {
    /// False when no session is reading the camera.
    pub delivered: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub active_sessions: usize,
    pub alert_channels: usize,
    pub relay_routes: usize,
}
