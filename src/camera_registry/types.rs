use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a monitored camera: the owning user and the camera's position
/// in that user's camera list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraKey {
    pub user_id: String,
    pub index: usize,
}

impl CameraKey {
    pub fn new(user_id: impl Into<String>, index: usize) -> Self {
        Self {
            user_id: user_id.into(),
            index,
        }
    }
}

impl fmt::Display for CameraKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.index)
    }
}

/// A camera as handed out by the registry. Read-only to the monitoring core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub key: CameraKey,
    pub name: String,
    /// Network URI (`rtsp://...`) or local device (`"0"`, `/dev/video2`).
    /// Empty for relay cameras.
    pub uri: String,
    /// Frames are pushed by an external relay instead of pulled.
    pub is_relay: bool,
}

impl CameraDescriptor {
    pub fn source_kind(&self) -> SourceKind {
        if self.is_relay {
            return SourceKind::Relay;
        }
        SourceKind::parse(&self.uri)
    }

    /// Prefix used on every log line concerning this camera.
    pub fn label(&self) -> String {
        format!("[{} {}]", self.key, self.name)
    }
}

/// How frames of a camera are obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// RTSP stream; supports the TCP/UDP transport choice.
    Rtsp(String),
    /// Any other network URI ffmpeg can open directly (http, https).
    Network(String),
    /// Local capture device, always normalised to `/dev/videoN`.
    LocalDevice(String),
    Relay,
    Unsupported(String),
}

impl SourceKind {
    pub fn parse(uri: &str) -> SourceKind {
        let uri = uri.trim();
        if let Some(index) = parse_device_index(uri) {
            return SourceKind::LocalDevice(format!("/dev/video{}", index));
        }
        match uri.split_once("://") {
            Some((scheme, rest)) if !rest.is_empty() => match scheme.to_ascii_lowercase().as_str() {
                "rtsp" | "rtsps" => SourceKind::Rtsp(uri.to_string()),
                "http" | "https" => SourceKind::Network(uri.to_string()),
                _ => SourceKind::Unsupported(uri.to_string()),
            },
            _ => SourceKind::Unsupported(uri.to_string()),
        }
    }
}

/// Parse a `/dev/videoX` style URI or a bare index and return the index.
fn parse_device_index(uri: &str) -> Option<u32> {
    if let Ok(index) = uri.parse::<u32>() {
        return Some(index);
    }
    let stripped = uri.strip_prefix("/dev/video")?;
    if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
        return stripped.parse::<u32>().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_kinds() {
        assert_eq!(
            SourceKind::parse("rtsp://10.0.0.2:554/Streaming/Channels/101"),
            SourceKind::Rtsp("rtsp://10.0.0.2:554/Streaming/Channels/101".to_string())
        );
        assert_eq!(
            SourceKind::parse("0"),
            SourceKind::LocalDevice("/dev/video0".to_string())
        );
        assert_eq!(
            SourceKind::parse("/dev/video3"),
            SourceKind::LocalDevice("/dev/video3".to_string())
        );
        assert_eq!(
            SourceKind::parse("http://cam.local/mjpg"),
            SourceKind::Network("http://cam.local/mjpg".to_string())
        );
        assert!(matches!(
            SourceKind::parse("bad://camera"),
            SourceKind::Unsupported(_)
        ));
        assert!(matches!(SourceKind::parse("/dev/videoX"), SourceKind::Unsupported(_)));
        assert!(matches!(SourceKind::parse(""), SourceKind::Unsupported(_)));
    }

    #[test]
    fn relay_flag_wins_over_uri() {
        let camera = CameraDescriptor {
            key: CameraKey::new("alice", 1),
            name: "porch".to_string(),
            uri: "rtsp://somewhere/stream".to_string(),
            is_relay: true,
        };
        assert_eq!(camera.source_kind(), SourceKind::Relay);
        assert_eq!(camera.label(), "[alice/1 porch]");
    }
}
