//! Live view of cameras as `multipart/x-mixed-replace` MJPEG streams.

pub mod mjpeg;
pub mod multiplexer;
pub mod transcoder;

pub use multiplexer::StreamMultiplexer;
pub use transcoder::{FfmpegTranscoder, RtspTransport, Transcoder, TransportAttempt};
