use std::process::Stdio;

use log::{debug, error};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::error_handling::types::CaptureError;

pub const FFMPEG_BINARY: &str = "ffmpeg";

/// Spawns `ffmpeg` with piped stdout and a background task forwarding its
/// stderr to the debug log. The child is killed when dropped.
pub fn spawn(label: &str, args: &[String], pipe_stdin: bool) -> Result<Child, CaptureError> {
    let mut cmd = Command::new(FFMPEG_BINARY);
    cmd.args(args)
        .stdin(if pipe_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("{} Spawning ffmpeg {:?}", label, args);
    let mut child = cmd.spawn().map_err(|e| {
        error!("{} Failed to spawn ffmpeg: {}", label, e);
        CaptureError::ProcessError(format!("failed to spawn ffmpeg: {}", e))
    })?;

    if let Some(stderr) = child.stderr.take() {
        let mut reader = BufReader::new(stderr).lines();
        let label = label.to_string();
        tokio::spawn(async move {
            while let Ok(Some(line)) = reader.next_line().await {
                debug!("{}[ffmpeg] {}", label, line);
            }
            debug!("{} ffmpeg stderr closed", label);
        });
    }

    Ok(child)
}

/// Input arguments shared by every ffmpeg invocation that reads an RTSP feed.
pub fn rtsp_input(uri: &str, transport: &str) -> Vec<String> {
    vec![
        "-rtsp_transport".into(),
        transport.into(),
        "-timeout".into(),
        "5000000".into(),
        "-i".into(),
        uri.into(),
    ]
}

/// Input arguments for a V4L2 capture device.
pub fn device_input(device: &str) -> Vec<String> {
    vec![
        "-f".into(),
        "video4linux2".into(),
        "-i".into(),
        device.into(),
    ]
}

pub fn quiet_prelude() -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
    ]
}
