//! Fall classification gateway
//!
//! The classifier is an external HTTP service. The monitoring core only sees
//! the [`Classifier`] trait and a [`Verdict`]; whether a verdict raises an
//! alert is decided by the [`DetectionPolicy`].

pub mod http_classifier;
pub mod types;

pub use http_classifier::{Classifier, HttpClassifier};
pub use types::{DetectionPolicy, Verdict};
