//! Session management core module.
//!
//! One [`camera_session::CameraSession`] runs per monitored (user, camera)
//! pair, each on its own tokio task. The [`supervisor::MonitoringSupervisor`]
//! owns the table of running sessions and is the only way to start or stop
//! them.

use serde::{Deserialize, Serialize};

/// Submodule for the handle kept in the active-session table.
pub mod active_session;
/// Submodule for the per-camera capture loop.
pub mod camera_session;
/// Submodule for session snapshots and commands.
pub mod session;
/// Submodule for the supervisor owning all running sessions.
pub mod supervisor;


pub use active_session::{ActiveSession, SessionHandle};
pub use camera_session::{CameraSession, SessionContext};
pub use session::{SessionCommand, SessionInfo, StateChange};
pub use supervisor::{MonitoringSupervisor, StartOutcome};

/// Lifecycle state of a camera session.
///
/// `Connecting -> Streaming -> (Reconnecting <-> Streaming) -> Stopped`, with
/// `Connecting -> Stopped` when the camera cannot be opened at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Streaming,
    Reconnecting,
    Stopped,
}
