pub mod alerting;
pub mod camera_registry;
pub mod classification;
pub mod configuration;
pub mod controller;
pub mod data_capture;
pub mod error_handling;
pub mod session_management;
pub mod storage;
pub mod streaming;
pub mod web_interface;

pub use controller::Controller;
