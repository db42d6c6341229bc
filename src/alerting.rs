//! Alert delivery
//!
//! Maps each user to the one notification channel currently open for them
//! (a WebSocket in practice) and pushes text alerts into it, best effort.

pub mod alert_dispatcher;

pub use alert_dispatcher::{AlertChannel, AlertDispatcher, DeliveryStatus};
