use serde::{Deserialize, Serialize};

/// Classifier output for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub fall_detected: bool,
    /// Maximum softmax value over all classes.
    pub confidence: f32,
}

impl Verdict {
    /// Builds a verdict from raw class scores; class 1 is "fall".
    pub fn from_class_scores(scores: &[f32]) -> Option<Self> {
        let (index, confidence) = scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))?;
        Some(Self {
            fall_detected: index == 1,
            confidence,
        })
    }
}

/// Decides whether a verdict is strong enough to alert on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionPolicy {
    pub confidence_threshold: f32,
}

impl DetectionPolicy {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Both the fall class and a confidence strictly above the threshold are required.
    pub fn is_alert(&self, verdict: &Verdict) -> bool {
        verdict.fall_detected && verdict.confidence > self.confidence_threshold
    }
}
