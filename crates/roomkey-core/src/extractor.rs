//! Feature extraction seam.
//!
//! Face recognition and hand landmark models live outside this crate. The
//! pipeline only needs something that turns a capture into features and
//! says plainly when nothing was detected.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gesture::classify_digit;
use crate::types::{Embedding, Landmark};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("malformed capture: {0}")]
    MalformedCapture(String),
    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Outcome of running a detector over one capture.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection<T> {
    Detected { features: T, confidence: f64 },
    /// The capture was processed but contained no face or hand.
    Absent,
}

impl<T> Detection<T> {
    pub fn into_features(self) -> Option<T> {
        match self {
            Detection::Detected { features, .. } => Some(features),
            Detection::Absent => None,
        }
    }
}

/// Landmarks of the first detected hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    pub landmarks: Vec<Landmark>,
    /// "Left" or "Right" as reported by the detector, if any.
    #[serde(default)]
    pub handedness: Option<String>,
}

impl HandObservation {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self {
            landmarks,
            handedness: None,
        }
    }

    /// Number of extended fingers, 0 if the landmarks are malformed.
    pub fn digit(&self) -> u8 {
        classify_digit(&self.landmarks)
    }
}

/// Turns raw captures into face embeddings and hand landmarks.
pub trait FeatureExtractor: Send + Sync {
    fn extract_face(&self, capture: &[u8]) -> Result<Detection<Embedding>, ExtractError>;

    fn extract_hand(&self, capture: &[u8]) -> Result<Detection<HandObservation>, ExtractError>;
}
