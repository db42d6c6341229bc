use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::camera_registry::{CameraDescriptor, CameraKey, CameraRegistry};
use crate::data_capture::{Frame, RelayHub};
use crate::error_handling::types::{CaptureError, SupervisorError};
use crate::session_management::active_session::{ActiveSession, SessionHandle};
use crate::session_management::camera_session::{CameraSession, SessionContext};
use crate::session_management::session::{SessionCommand, SessionInfo};

const TAP_CAPACITY: usize = 16;

type SessionTable = Arc<Mutex<HashMap<CameraKey, ActiveSession>>>;

/// Result of a start request. Starting a running camera is not an error.
pub enum StartOutcome {
    Started(SessionHandle),
    AlreadyRunning(SessionHandle),
}

impl StartOutcome {
    pub fn handle(&self) -> &SessionHandle {
        match self {
            StartOutcome::Started(handle) | StartOutcome::AlreadyRunning(handle) => handle,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, StartOutcome::Started(_))
    }
}

/// Owner of every running camera session.
///
/// The active-session table is the only state shared between sessions and
/// request handlers. Its lock is held just long enough to look up, insert or
/// remove an entry, which also serialises concurrent start/stop requests for
/// the same camera. At most one session exists per (user, camera).
pub struct MonitoringSupervisor {
    sessions: SessionTable,
    registry: Arc<dyn CameraRegistry>,
    context: Arc<SessionContext>,
    relays: Arc<RelayHub>,
}

impl MonitoringSupervisor {
    pub fn new(
        registry: Arc<dyn CameraRegistry>,
        context: Arc<SessionContext>,
        relays: Arc<RelayHub>,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            registry,
            context,
            relays,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<CameraKey, ActiveSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts monitoring `camera` unless a session for it already runs.
    pub fn start(&self, camera: CameraDescriptor) -> StartOutcome {
        let mut table = self.table();
        if let Some(existing) = table.get(&camera.key) {
            debug!("{} Already monitored", camera.label());
            return StartOutcome::AlreadyRunning(existing.handle());
        }

        let id = Uuid::new_v4();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (info_tx, info_rx) = watch::channel(SessionInfo::new(id, &camera));
        let (tap, _) = broadcast::channel(TAP_CAPACITY);

        // Leaves the table only if the entry is still this session; a newer
        // session for the same camera stays.
        let sessions = Arc::clone(&self.sessions);
        let key = camera.key.clone();
        let exit_hook = Box::new(move || {
            let mut table = sessions.lock().unwrap_or_else(|e| e.into_inner());
            if table.get(&key).is_some_and(|entry| entry.id == id) {
                table.remove(&key);
                debug!("[{}] Session {} left the active table", key, id);
            }
        });

        let session = CameraSession::new(
            camera.clone(),
            Arc::clone(&self.context),
            stop_rx,
            command_rx,
            info_tx,
            tap.clone(),
        )
        .with_exit_hook(exit_hook);
        tokio::spawn(session.run());

        info!("{} Session {} started", camera.label(), id);
        let entry = ActiveSession::new(id, camera.clone(), stop_tx, command_tx, info_rx, tap);
        let handle = entry.handle();
        table.insert(camera.key, entry);
        StartOutcome::Started(handle)
    }

    /// Looks the camera up in the registry and starts it.
    pub fn start_camera(&self, user_id: &str, index: usize) -> Result<StartOutcome, SupervisorError> {
        let camera = self.registry.get_camera(user_id, index)?;
        Ok(self.start(camera))
    }

    /// Signals the session to stop and removes it from the table. The session
    /// winds down in the background; use the returned handle to wait for it.
    pub fn stop(&self, user_id: &str, index: usize) -> Result<SessionHandle, SupervisorError> {
        let key = CameraKey::new(user_id, index);
        let entry = self.table().remove(&key).ok_or(SupervisorError::NotFound)?;
        entry.signal_stop();
        info!("{} Stop signalled to session {}", entry.camera.label(), entry.id);
        Ok(entry.handle())
    }

    pub async fn stop_and_wait(&self, user_id: &str, index: usize) -> Result<SessionInfo, SupervisorError> {
        let handle = self.stop(user_id, index)?;
        Ok(handle.wait().await)
    }

    /// Stops every session of `user_id`.
    pub fn stop_all(&self, user_id: &str) -> Vec<SessionHandle> {
        let entries: Vec<ActiveSession> = {
            let mut table = self.table();
            let keys: Vec<CameraKey> = table
                .keys()
                .filter(|key| key.user_id == user_id)
                .cloned()
                .collect();
            keys.iter().filter_map(|key| table.remove(key)).collect()
        };
        entries
            .iter()
            .map(|entry| {
                entry.signal_stop();
                entry.handle()
            })
            .collect()
    }

    /// Stops every session of every user and waits until all released their cameras.
    pub async fn shutdown_all(&self) -> Vec<SessionInfo> {
        let entries: Vec<ActiveSession> = self.table().drain().map(|(_, entry)| entry).collect();
        info!("Stopping {} monitoring sessions", entries.len());
        for entry in &entries {
            entry.signal_stop();
        }
        let mut stopped = Vec::with_capacity(entries.len());
        for entry in &entries {
            stopped.push(entry.handle().wait().await);
        }
        stopped
    }

    pub fn sessions(&self, user_id: &str) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .table()
            .values()
            .filter(|entry| entry.camera.key.user_id == user_id)
            .map(ActiveSession::info)
            .collect();
        infos.sort_by_key(|info| info.key.index);
        infos
    }

    pub fn is_active(&self, user_id: &str, index: usize) -> bool {
        self.table().contains_key(&CameraKey::new(user_id, index))
    }

    pub fn active_count(&self) -> usize {
        self.table().len()
    }

    /// Attaches a new continuous recording to a running session.
    pub fn start_recording(&self, user_id: &str, index: usize) -> Result<SessionInfo, SupervisorError> {
        let key = CameraKey::new(user_id, index);
        let camera = self
            .table()
            .get(&key)
            .map(|entry| entry.camera.clone())
            .ok_or(SupervisorError::NotFound)?;

        // Spawning the encoder happens outside the table lock.
        let writer = self
            .context
            .recordings
            .create(&camera)
            .map_err(SupervisorError::RecordingFailed)?;

        let command = SessionCommand::StartRecording(writer);
        let unsent = match self.table().get(&key) {
            Some(entry) => match entry.send_command(command) {
                Ok(()) => return Ok(entry.info()),
                Err(command) => command,
            },
            None => command,
        };
        warn!("{} Session exited before recording could start", camera.label());
        discard_unsent(&camera.label(), unsent);
        Err(SupervisorError::NotFound)
    }

    pub fn stop_recording(&self, user_id: &str, index: usize) -> Result<SessionInfo, SupervisorError> {
        let table = self.table();
        let entry = table
            .get(&CameraKey::new(user_id, index))
            .ok_or(SupervisorError::NotFound)?;
        if entry.send_command(SessionCommand::StopRecording).is_err() {
            return Err(SupervisorError::NotFound);
        }
        Ok(entry.info())
    }

    /// Live frames of a running session, for viewers of exclusive devices.
    pub fn subscribe(&self, key: &CameraKey) -> Option<broadcast::Receiver<Frame>> {
        self.table().get(key).map(ActiveSession::subscribe)
    }

    /// Routes a JPEG pushed by a relay to the session reading that camera.
    /// Returns `Ok(false)` when no session is reading it.
    pub fn push_relay_frame(&self, user_id: &str, index: usize, jpeg: &[u8]) -> Result<bool, CaptureError> {
        self.relays.push_jpeg(&CameraKey::new(user_id, index), jpeg)
    }

    /// Relay cameras currently read by a session.
    pub fn relay_routes(&self) -> usize {
        self.relays.route_count()
    }

    pub fn registry(&self) -> &Arc<dyn CameraRegistry> {
        &self.registry
    }
}

/// Releases the writer of a recording request no session picked up, so no
/// partial footage file is left behind.
pub(super) fn discard_unsent(label: &str, command: SessionCommand) -> Option<JoinHandle<()>> {
    let SessionCommand::StartRecording(mut writer) = command else {
        return None;
    };
    let label = label.to_string();
    Some(tokio::spawn(async move {
        writer.discard().await;
        debug!("{} Unused recording writer discarded", label);
    }))
}
