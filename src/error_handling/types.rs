use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    DirectoryDoesNotExist(String),
    NotInRange(String),
    BadAddress(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::BadAddress(e) => write!(f, "Address formatting error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures raised at the frame source boundary.
///
/// `ConnectFailure` is the only variant that terminates a monitoring session;
/// everything else is treated as transient by the capture loop.
#[derive(Debug)]
pub enum CaptureError {
    ConnectFailure(String),
    ReadFailure(String),
    ProcessError(String),
    IoError(std::io::Error),
    EncodeError(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::ConnectFailure(e) => write!(f, "Cannot open frame source: {}", e),
            CaptureError::ReadFailure(e) => write!(f, "Frame read failed: {}", e),
            CaptureError::ProcessError(e) => write!(f, "Capture process error: {}", e),
            CaptureError::IoError(e) => write!(f, "Capture IO error: {}", e),
            CaptureError::EncodeError(e) => write!(f, "Frame encoding error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::IoError(err)
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::EncodeError(err.to_string())
    }
}

#[derive(Debug)]
pub enum ClassifierError {
    Transport(String),
    Timeout,
    BadResponse(String),
    EncodeError(CaptureError),
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierError::Transport(e) => write!(f, "Classifier transport error: {}", e),
            ClassifierError::Timeout => write!(f, "Classifier call timed out"),
            ClassifierError::BadResponse(e) => write!(f, "Classifier returned bad response: {}", e),
            ClassifierError::EncodeError(e) => write!(f, "Classifier payload error: {}", e),
        }
    }
}

impl std::error::Error for ClassifierError {}

impl From<reqwest::Error> for ClassifierError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClassifierError::Timeout
        } else if err.is_decode() {
            ClassifierError::BadResponse(err.to_string())
        } else {
            ClassifierError::Transport(err.to_string())
        }
    }
}

#[derive(Debug)]
pub enum StorageError {
    WriteFailed,
    ReadFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum ClipError {
    EmptySnapshot,
    CaptureError(CaptureError),
    StorageError(StorageError),
}

impl fmt::Display for ClipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipError::EmptySnapshot => write!(f, "No frames available for clip"),
            ClipError::CaptureError(e) => write!(f, "Clip encoding error: {}", e),
            ClipError::StorageError(e) => write!(f, "Clip storage error: {}", e),
        }
    }
}

impl std::error::Error for ClipError {}

impl From<CaptureError> for ClipError {
    fn from(err: CaptureError) -> Self {
        ClipError::CaptureError(err)
    }
}

impl From<StorageError> for ClipError {
    fn from(err: StorageError) -> Self {
        ClipError::StorageError(err)
    }
}

#[derive(Debug)]
pub enum RegistryError {
    NotFound,
    ReadFailed(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound => write!(f, "Camera not found"),
            RegistryError::ReadFailed(e) => write!(f, "Camera registry read failed: {}", e),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug)]
pub enum SupervisorError {
    NotFound,
    RegistryError(RegistryError),
    RecordingFailed(CaptureError),
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::NotFound => write!(f, "No active session for this camera"),
            SupervisorError::RegistryError(e) => write!(f, "Registry error: {}", e),
            SupervisorError::RecordingFailed(e) => write!(f, "Recording error: {}", e),
        }
    }
}

impl std::error::Error for SupervisorError {}

impl From<RegistryError> for SupervisorError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound => SupervisorError::NotFound,
            other => SupervisorError::RegistryError(other),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    StorageError(StorageError),
    WebError(WebError),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}
