//! Read-only access to the cameras each user has registered.
//!
//! Camera CRUD lives elsewhere; the monitoring core only ever looks cameras up.

pub mod json_registry;
pub mod registry_trait;
pub mod types;

pub use json_registry::JsonCameraRegistry;
pub use registry_trait::CameraRegistry;
pub use types::{CameraDescriptor, CameraKey, SourceKind};
