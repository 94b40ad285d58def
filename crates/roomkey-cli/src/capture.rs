//! Capture files: feature extraction results saved as JSON.
//!
//! Recognition models run outside roomkey. Their output for one camera
//! frame is written to a capture file, which this extractor reads back.
//! A missing or null `face`/`hand` section means nothing was detected.
//!
//! ```json
//! {
//!   "face": { "embedding": [0.01, -0.2], "confidence": 0.97 },
//!   "hand": { "landmarks": [[0.5, 0.9, 0.0]], "handedness": "Right", "confidence": 0.93 }
//! }
//! ```

use roomkey_core::{Detection, Embedding, ExtractError, FeatureExtractor, HandObservation, Landmark};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct CaptureFile {
    #[serde(default)]
    face: Option<FaceSection>,
    #[serde(default)]
    hand: Option<HandSection>,
}

#[derive(Debug, Deserialize)]
struct FaceSection {
    embedding: Vec<f64>,
    #[serde(default = "full_confidence")]
    confidence: f64,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HandSection {
    landmarks: Vec<Landmark>,
    #[serde(default)]
    handedness: Option<String>,
    #[serde(default = "full_confidence")]
    confidence: f64,
}

fn full_confidence() -> f64 {
    1.0
}

/// [`FeatureExtractor`] over JSON capture files.
pub struct CaptureFileExtractor;

impl CaptureFileExtractor {
    fn parse(capture: &[u8]) -> Result<CaptureFile, ExtractError> {
        serde_json::from_slice(capture).map_err(|e| ExtractError::MalformedCapture(e.to_string()))
    }
}

impl FeatureExtractor for CaptureFileExtractor {
    fn extract_face(&self, capture: &[u8]) -> Result<Detection<Embedding>, ExtractError> {
        Ok(match Self::parse(capture)?.face {
            Some(face) if !face.embedding.is_empty() => Detection::Detected {
                features: Embedding {
                    values: face.embedding,
                    model_version: face.model_version,
                },
                confidence: face.confidence,
            },
            _ => Detection::Absent,
        })
    }

    fn extract_hand(&self, capture: &[u8]) -> Result<Detection<HandObservation>, ExtractError> {
        Ok(match Self::parse(capture)?.hand {
            Some(hand) if !hand.landmarks.is_empty() => Detection::Detected {
                features: HandObservation {
                    landmarks: hand.landmarks,
                    handedness: hand.handedness,
                },
                confidence: hand.confidence,
            },
            _ => Detection::Absent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_detected() {
        let capture = br#"{"face": {"embedding": [0.1, 0.2], "confidence": 0.8}}"#;
        match CaptureFileExtractor.extract_face(capture).unwrap() {
            Detection::Detected { features, confidence } => {
                assert_eq!(features.values, vec![0.1, 0.2]);
                assert_eq!(confidence, 0.8);
            }
            Detection::Absent => panic!("expected a face"),
        }
    }

    #[test]
    fn test_missing_sections_are_absent() {
        let capture = br#"{"face": null}"#;
        assert_eq!(CaptureFileExtractor.extract_face(capture).unwrap(), Detection::Absent);
        assert_eq!(CaptureFileExtractor.extract_hand(capture).unwrap(), Detection::Absent);

        let capture = br#"{"hand": {"landmarks": []}}"#;
        assert_eq!(CaptureFileExtractor.extract_hand(capture).unwrap(), Detection::Absent);
    }

    #[test]
    fn test_hand_detected() {
        let capture = br#"{"hand": {
            "landmarks": [[0.5, 0.9, 0.0], [0.4, 0.8, -0.01]],
            "handedness": "Left"
        }}"#;
        let hand = CaptureFileExtractor
            .extract_hand(capture)
            .unwrap()
            .into_features()
            .unwrap();
        assert_eq!(hand.landmarks.len(), 2);
        assert_eq!(hand.handedness.as_deref(), Some("Left"));
    }

    #[test]
    fn test_malformed_capture() {
        let err = CaptureFileExtractor.extract_face(b"not json").unwrap_err();
        assert!(matches!(err, ExtractError::MalformedCapture(_)));
    }
}
