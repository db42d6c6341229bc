use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::camera_registry::{CameraDescriptor, CameraKey};
use crate::data_capture::FrameWriter;
use crate::session_management::SessionState;

#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub state: SessionState,
    pub at: DateTime<Utc>,
}

/// Point-in-time view of a session, published by the session itself.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    #[serde(flatten)]
    pub key: CameraKey,
    pub camera_name: String,
    pub state: SessionState,
    pub frames_read: u64,
    pub alerts_sent: u64,
    pub recording: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub history: Vec<StateChange>,
}

impl SessionInfo {
    pub fn new(id: Uuid, camera: &CameraDescriptor) -> Self {
        let now = Utc::now();
        Self {
            id,
            key: camera.key.clone(),
            camera_name: camera.name.clone(),
            state: SessionState::Connecting,
            frames_read: 0,
            alerts_sent: 0,
            recording: false,
            started_at: now,
            ended_at: None,
            history: vec![StateChange {
                state: SessionState::Connecting,
                at: now,
            }],
        }
    }

    /// Records a transition; repeating the current state is not a transition.
    pub fn transition(&mut self, state: SessionState) -> bool {
        if self.state == state {
            return false;
        }
        let at = Utc::now();
        self.state = state;
        self.history.push(StateChange { state, at });
        if state == SessionState::Stopped {
            self.ended_at = Some(at);
        }
        true
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.history.iter().map(|change| change.state).collect()
    }
}

/// Requests delivered to a running session, applied at the top of its loop.
pub enum SessionCommand {
    /// Attach a writer receiving every subsequent frame.
    StartRecording(Box<dyn FrameWriter>),
    StopRecording,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionCommand::StartRecording(_) => write!(f, "StartRecording"),
            SessionCommand::StopRecording => write!(f, "StopRecording"),
        }
    }
}
