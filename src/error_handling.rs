//! Error types shared across the monitoring pipeline.
//!
//! Only `CaptureError::ConnectFailure` is fatal to a camera session. Every
//! other error is logged where it happens and absorbed.

pub mod types;
