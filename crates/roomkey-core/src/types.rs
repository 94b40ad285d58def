use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::metric::MetricKind;

/// Number of points in a hand landmark set (wrist plus four joints per finger).
pub const HAND_LANDMARK_COUNT: usize = 21;

/// One hand landmark in image-normalized coordinates: `[x, y, z]`.
pub type Landmark = [f64; 3];

/// Face embedding vector (dimensionality depends on the recognition model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f64>,
    /// Model that produced this embedding (e.g., "VGG-Face").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An enrolled person: the gallery entry for face matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledIdentity {
    pub id: String,
    pub name: String,
    pub embedding: Embedding,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl EnrolledIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            embedding,
            registered_at: Utc::now(),
            last_login: None,
        }
    }
}

/// Desired state of one device when a preset is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub device_id: String,
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// A named set of device states bound to one identity and one hand gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledPreset {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub landmarks: Vec<Landmark>,
    /// Finger count of the enrolled gesture (0–5). Advisory only.
    #[serde(default)]
    pub digit: Option<u8>,
    pub device_states: Vec<DeviceState>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

impl EnrolledPreset {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        owner_id: impl Into<String>,
        landmarks: Vec<Landmark>,
        device_states: Vec<DeviceState>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner_id: owner_id.into(),
            landmarks,
            digit: None,
            device_states,
            created_at: Utc::now(),
            last_used: None,
        }
    }
}

/// Outcome of a successful search. Built fresh per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// ID of the winning identity or preset.
    pub key: String,
    pub distance: f64,
    /// `max(0, 1 - distance / threshold)`.
    pub confidence: f64,
    pub verified: bool,
}

impl MatchResult {
    pub(crate) fn new(key: impl Into<String>, distance: f64, threshold: f64) -> Self {
        Self {
            key: key.into(),
            distance,
            confidence: confidence(distance, threshold),
            verified: distance < threshold,
        }
    }
}

/// Linear confidence score: 1.0 at distance 0, falling to 0.0 at the threshold.
pub fn confidence(distance: f64, threshold: f64) -> f64 {
    (1.0 - distance / threshold).max(0.0)
}

/// Metric and thresholds for one matching context, constructed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub metric: MetricKind,
    pub face_threshold: f64,
    pub gesture_threshold: f64,
}

impl MatchConfig {
    pub fn new(metric: MetricKind, face_threshold: f64, gesture_threshold: f64) -> Self {
        Self {
            metric,
            face_threshold,
            gesture_threshold,
        }
    }
}

/// Why a search produced no match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NotFoundReason {
    /// The candidate collection was empty.
    NoCandidates,
    /// The closest candidate was not below the threshold.
    AboveThreshold { best_distance: f64 },
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::NoCandidates => write!(f, "no candidates"),
            NotFoundReason::AboveThreshold { best_distance } => {
                write!(f, "closest distance {best_distance:.4} is not below threshold")
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("dimension mismatch: {left} vs {right} values")]
    DimensionMismatch { left: usize, right: usize },
    #[error("expected {expected} hand landmarks, got {actual}")]
    InsufficientLandmarks { expected: usize, actual: usize },
    #[error("threshold must be positive and finite, got {0}")]
    InvalidThreshold(f64),
    #[error("no match: {0}")]
    NotFound(NotFoundReason),
}

impl MatchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MatchError::NotFound(_))
    }
}

pub(crate) fn check_threshold(threshold: f64) -> Result<(), MatchError> {
    if threshold.is_finite() && threshold > 0.0 {
        Ok(())
    } else {
        Err(MatchError::InvalidThreshold(threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_linear_in_distance() {
        assert_eq!(confidence(0.0, 0.4), 1.0);
        assert!((confidence(0.1, 0.4) - 0.75).abs() < 1e-12);
        assert_eq!(confidence(0.4, 0.4), 0.0);
        assert_eq!(confidence(0.9, 0.4), 0.0);
    }

    #[test]
    fn test_match_result_verified_iff_below_threshold() {
        assert!(MatchResult::new("a", 0.39, 0.4).verified);
        assert!(!MatchResult::new("a", 0.4, 0.4).verified);
    }

    #[test]
    fn test_check_threshold() {
        assert!(check_threshold(0.15).is_ok());
        assert_eq!(check_threshold(0.0), Err(MatchError::InvalidThreshold(0.0)));
        assert!(check_threshold(-1.0).is_err());
        assert!(check_threshold(f64::NAN).is_err());
        assert!(check_threshold(f64::INFINITY).is_err());
    }

    #[test]
    fn test_device_state_value_optional_in_json() {
        let state: DeviceState =
            serde_json::from_str(r#"{"device_id":"light-main","status":true}"#).unwrap();
        assert_eq!(state.value, None);

        let state: DeviceState =
            serde_json::from_str(r#"{"device_id":"ac","status":true,"value":24}"#).unwrap();
        assert_eq!(state.value, Some(24.0));
    }
}
