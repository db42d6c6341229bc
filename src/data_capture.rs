//! Frame capture subsystem
//!
//! Everything that touches pixels: the [`Frame`] type, camera feeds
//! ([`FrameSource`]), the per-camera [`FrameRingBuffer`], and the writers that
//! turn frame sequences into video files (incident clips and continuous
//! recordings). External tools are reached through `ffmpeg` subprocesses.

pub mod clip_writer;
pub mod codec;
pub mod ffmpeg;
pub mod frame_source;
pub mod ring_buffer;
pub mod types;
pub mod video_writer;

pub use clip_writer::{ClipWriter, FfmpegClipWriter, IncidentClip};
pub use frame_source::{
    CaptureSettings, DefaultSourceFactory, FfmpegFrameSource, FrameSource, FrameSourceFactory,
    RelayFrameSource, RelayHub,
};
pub use ring_buffer::FrameRingBuffer;
pub use types::Frame;
pub use video_writer::{FfmpegRecordingFactory, FfmpegVideoWriter, FrameWriter, RecordingFactory};
