use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

use crate::camera_registry::CameraDescriptor;
use crate::data_capture::Frame;
use crate::session_management::session::{SessionCommand, SessionInfo};
use crate::session_management::SessionState;

/// Entry of the active-session table: the supervisor's side of a running
/// [`CameraSession`](super::CameraSession).
pub struct ActiveSession {
    pub id: Uuid,
    pub camera: CameraDescriptor,
    stop: watch::Sender<bool>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    info: watch::Receiver<SessionInfo>,
    /// Frames published by the session for live viewers.
    tap: broadcast::Sender<Frame>,
}

impl ActiveSession {
    pub fn new(
        id: Uuid,
        camera: CameraDescriptor,
        stop: watch::Sender<bool>,
        commands: mpsc::UnboundedSender<SessionCommand>,
        info: watch::Receiver<SessionInfo>,
        tap: broadcast::Sender<Frame>,
    ) -> Self {
        Self {
            id,
            camera,
            stop,
            commands,
            info,
            tap,
        }
    }

    /// Asks the session to stop at the top of its next loop iteration.
    pub fn signal_stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Hands the command back when the session no longer accepts commands.
    pub fn send_command(&self, command: SessionCommand) -> Result<(), SessionCommand> {
        self.commands.send(command).map_err(|rejected| rejected.0)
    }

    pub fn info(&self) -> SessionInfo {
        self.info.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.tap.subscribe()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            info: self.info.clone(),
        }
    }
}

/// Observer of one session, usable after it left the active table.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    info: watch::Receiver<SessionInfo>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn info(&self) -> SessionInfo {
        self.info.borrow().clone()
    }

    /// Waits until the session reached `Stopped` and released its camera.
    pub async fn wait(&self) -> SessionInfo {
        let mut info = self.info.clone();
        loop {
            if info.borrow_and_update().state == SessionState::Stopped {
                break;
            }
            if info.changed().await.is_err() {
                break;
            }
        }
        let last = info.borrow().clone();
        last
    }
}
