//! Identify-then-dispatch: face picks the identity, gesture picks the preset.
//!
//! The two stages run once each, in order. The identity is chosen before the
//! gesture is looked at, and a gesture miss never sends the search back to
//! the next-closest identity.

use serde::Serialize;
use thiserror::Error;

use crate::extractor::{Detection, ExtractError, FeatureExtractor};
use crate::face::FaceMatcher;
use crate::gesture::GestureMatcher;
use crate::types::{
    DeviceState, Embedding, EnrolledIdentity, EnrolledPreset, Landmark, MatchConfig, MatchError,
    MatchResult, NotFoundReason,
};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("identity not recognized: {0}")]
    IdentityNotFound(NotFoundReason),
    #[error("identity {identity_id} has no presets")]
    NoPresetsForIdentity { identity_id: String },
    #[error("gesture not matched: {0}")]
    GestureNotMatched(NotFoundReason),
    #[error("no face detected in capture")]
    NoFaceDetected,
    #[error("no hand detected in capture")]
    NoHandDetected,
    #[error("feature extraction: {0}")]
    Extraction(#[from] ExtractError),
    #[error(transparent)]
    Match(MatchError),
}

impl PipelineError {
    /// True for outcomes that mean "not recognized" rather than a fault.
    pub fn is_not_recognized(&self) -> bool {
        matches!(
            self,
            PipelineError::IdentityNotFound(_)
                | PipelineError::NoPresetsForIdentity { .. }
                | PipelineError::GestureNotMatched(_)
                | PipelineError::NoFaceDetected
                | PipelineError::NoHandDetected
        )
    }
}

/// Successful outcome: the device states to apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dispatch {
    pub identity: MatchResult,
    pub identity_name: String,
    pub preset: MatchResult,
    pub preset_name: String,
    pub device_states: Vec<DeviceState>,
    /// Confidence of the gesture match.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Pipeline {
    config: MatchConfig,
}

impl Pipeline {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    /// Run both stages over features the caller has already extracted.
    pub fn dispatch(
        &self,
        query_embedding: &Embedding,
        query_landmarks: &[Landmark],
        identities: &[EnrolledIdentity],
        presets: &[EnrolledPreset],
    ) -> Result<Dispatch, PipelineError> {
        let (identity, identity_match) = self.identify(query_embedding, identities)?;
        let owned = owned_presets(identity, presets)?;
        self.select_preset(identity, identity_match, query_landmarks, &owned)
    }

    /// Run both stages, extracting features from raw captures on the way.
    ///
    /// The hand is only extracted once the identity is known to own presets.
    pub fn recognize<E>(
        &self,
        extractor: &E,
        face_capture: &[u8],
        gesture_capture: &[u8],
        identities: &[EnrolledIdentity],
        presets: &[EnrolledPreset],
    ) -> Result<Dispatch, PipelineError>
    where
        E: FeatureExtractor + ?Sized,
    {
        let embedding = match extractor.extract_face(face_capture)? {
            Detection::Detected {
                features,
                confidence,
            } => {
                tracing::debug!(confidence, dim = features.len(), "face extracted");
                features
            }
            Detection::Absent => return Err(PipelineError::NoFaceDetected),
        };

        let (identity, identity_match) = self.identify(&embedding, identities)?;
        let owned = owned_presets(identity, presets)?;

        let hand = match extractor.extract_hand(gesture_capture)? {
            Detection::Detected {
                features,
                confidence,
            } => {
                tracing::debug!(
                    confidence,
                    digit = features.digit(),
                    handedness = ?features.handedness,
                    "hand extracted"
                );
                features
            }
            Detection::Absent => return Err(PipelineError::NoHandDetected),
        };

        self.select_preset(identity, identity_match, &hand.landmarks, &owned)
    }

    fn identify<'a>(
        &self,
        query: &Embedding,
        identities: &'a [EnrolledIdentity],
    ) -> Result<(&'a EnrolledIdentity, MatchResult), PipelineError> {
        FaceMatcher::new(self.config.metric, self.config.face_threshold)
            .find_best_entry(query, identities)
            .map_err(|e| match e {
                MatchError::NotFound(reason) => PipelineError::IdentityNotFound(reason),
                other => PipelineError::Match(other),
            })
    }

    fn select_preset(
        &self,
        identity: &EnrolledIdentity,
        identity_match: MatchResult,
        query: &[Landmark],
        owned: &[&EnrolledPreset],
    ) -> Result<Dispatch, PipelineError> {
        let (preset, preset_match) = GestureMatcher::new(self.config.gesture_threshold)
            .find_best_entry(query, owned.iter().copied())
            .map_err(|e| match e {
                MatchError::NotFound(reason) => PipelineError::GestureNotMatched(reason),
                other => PipelineError::Match(other),
            })?;

        Ok(Dispatch {
            confidence: preset_match.confidence,
            identity: identity_match,
            identity_name: identity.name.clone(),
            preset: preset_match,
            preset_name: preset.name.clone(),
            device_states: preset.device_states.clone(),
        })
    }
}

fn owned_presets<'a>(
    identity: &EnrolledIdentity,
    presets: &'a [EnrolledPreset],
) -> Result<Vec<&'a EnrolledPreset>, PipelineError> {
    let owned: Vec<&EnrolledPreset> = presets
        .iter()
        .filter(|p| p.owner_id == identity.id)
        .collect();
    if owned.is_empty() {
        return Err(PipelineError::NoPresetsForIdentity {
            identity_id: identity.id.clone(),
        });
    }
    Ok(owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::HandObservation;
    use crate::gesture::tests::{fist, open_hand};
    use crate::metric::MetricKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> MatchConfig {
        MatchConfig::new(MetricKind::Euclidean, 0.4, 0.15)
    }

    fn lights_on() -> Vec<DeviceState> {
        vec![
            DeviceState {
                device_id: "light-main".into(),
                status: true,
                value: Some(80.0),
            },
            DeviceState {
                device_id: "ac".into(),
                status: true,
                value: Some(24.0),
            },
        ]
    }

    fn shifted_y(landmarks: &[Landmark], dy: f64) -> Vec<Landmark> {
        landmarks.iter().map(|&[x, y, z]| [x, y + dy, z]).collect()
    }

    /// Alice sits 0.1 from the query face; Bob is far away.
    fn gallery() -> Vec<EnrolledIdentity> {
        vec![
            EnrolledIdentity::new("bob", "Bob", Embedding::new(vec![5.0, 5.0])),
            EnrolledIdentity::new("alice", "Alice", Embedding::new(vec![0.0, 0.1])),
        ]
    }

    fn query_face() -> Embedding {
        Embedding::new(vec![0.0, 0.0])
    }

    #[test]
    fn test_dispatch_success() {
        let presets = vec![
            EnrolledPreset::new("p-bob", "work", "bob", open_hand(), vec![]),
            EnrolledPreset::new(
                "p-alice",
                "evening",
                "alice",
                shifted_y(&open_hand(), 0.05),
                lights_on(),
            ),
        ];

        let dispatch = Pipeline::new(config())
            .dispatch(&query_face(), &open_hand(), &gallery(), &presets)
            .unwrap();

        assert_eq!(dispatch.identity.key, "alice");
        assert_eq!(dispatch.identity_name, "Alice");
        assert!((dispatch.identity.distance - 0.1).abs() < 1e-9);
        assert_eq!(dispatch.preset.key, "p-alice");
        assert_eq!(dispatch.preset_name, "evening");
        assert_eq!(dispatch.device_states, lights_on());
        assert!((dispatch.confidence - (1.0 - 0.05 / 0.15)).abs() < 1e-6);
        assert!((dispatch.confidence - 0.667).abs() < 1e-3);
    }

    #[test]
    fn test_identity_not_found() {
        let gallery = vec![EnrolledIdentity::new("bob", "Bob", Embedding::new(vec![5.0, 5.0]))];
        let err = Pipeline::new(config())
            .dispatch(&query_face(), &open_hand(), &gallery, &[])
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IdentityNotFound(NotFoundReason::AboveThreshold { .. })
        ));
        assert!(err.is_not_recognized());

        let err = Pipeline::new(config())
            .dispatch(&query_face(), &open_hand(), &[], &[])
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IdentityNotFound(NotFoundReason::NoCandidates)
        ));
    }

    #[test]
    fn test_no_presets_distinct_from_gesture_miss() {
        // Only Bob owns presets
        let presets = vec![EnrolledPreset::new("p-bob", "work", "bob", open_hand(), vec![])];
        let err = Pipeline::new(config())
            .dispatch(&query_face(), &open_hand(), &gallery(), &presets)
            .unwrap_err();
        match err {
            PipelineError::NoPresetsForIdentity { identity_id } => assert_eq!(identity_id, "alice"),
            other => panic!("expected NoPresetsForIdentity, got {other:?}"),
        }

        let presets = vec![EnrolledPreset::new("p-alice", "evening", "alice", fist(), vec![])];
        let err = Pipeline::new(config())
            .dispatch(&query_face(), &shifted_y(&open_hand(), -0.3), &gallery(), &presets)
            .unwrap_err();
        assert!(matches!(err, PipelineError::GestureNotMatched(_)));
    }

    #[test]
    fn test_no_backtracking_to_other_identity() {
        // Bob's preset would match the gesture, but Alice wins the face stage.
        let presets = vec![
            EnrolledPreset::new("p-bob", "work", "bob", open_hand(), vec![]),
            EnrolledPreset::new(
                "p-alice",
                "evening",
                "alice",
                shifted_y(&open_hand(), 0.3),
                vec![],
            ),
        ];
        let err = Pipeline::new(config())
            .dispatch(&query_face(), &open_hand(), &gallery(), &presets)
            .unwrap_err();
        assert!(matches!(err, PipelineError::GestureNotMatched(_)));
    }

    #[test]
    fn test_structural_errors_are_not_recognition_misses() {
        let presets = vec![EnrolledPreset::new("p-alice", "evening", "alice", open_hand(), vec![])];
        let err = Pipeline::new(config())
            .dispatch(&query_face(), &open_hand()[..5], &gallery(), &presets)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Match(MatchError::InsufficientLandmarks { actual: 5, .. })
        ));
        assert!(!err.is_not_recognized());

        let err = Pipeline::new(config())
            .dispatch(&Embedding::new(vec![0.0; 3]), &open_hand(), &gallery(), &presets)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Match(MatchError::DimensionMismatch { .. })));
    }

    struct FakeExtractor {
        face: Option<Embedding>,
        hand: Option<Vec<Landmark>>,
        hand_calls: AtomicUsize,
    }

    impl FakeExtractor {
        fn new(face: Option<Embedding>, hand: Option<Vec<Landmark>>) -> Self {
            Self {
                face,
                hand,
                hand_calls: AtomicUsize::new(0),
            }
        }
    }

    impl FeatureExtractor for FakeExtractor {
        fn extract_face(&self, _capture: &[u8]) -> Result<Detection<Embedding>, ExtractError> {
            Ok(match &self.face {
                Some(e) => Detection::Detected {
                    features: e.clone(),
                    confidence: 0.99,
                },
                None => Detection::Absent,
            })
        }

        fn extract_hand(
            &self,
            _capture: &[u8],
        ) -> Result<Detection<HandObservation>, ExtractError> {
            self.hand_calls.fetch_add(1, Ordering::SeqCst);
            Ok(match &self.hand {
                Some(lm) => Detection::Detected {
                    features: HandObservation::new(lm.clone()),
                    confidence: 0.9,
                },
                None => Detection::Absent,
            })
        }
    }

    struct BrokenExtractor;

    impl FeatureExtractor for BrokenExtractor {
        fn extract_face(&self, _capture: &[u8]) -> Result<Detection<Embedding>, ExtractError> {
            Err(ExtractError::Failed("model not loaded".into()))
        }

        fn extract_hand(
            &self,
            _capture: &[u8],
        ) -> Result<Detection<HandObservation>, ExtractError> {
            Err(ExtractError::Failed("model not loaded".into()))
        }
    }

    fn alice_presets() -> Vec<EnrolledPreset> {
        vec![EnrolledPreset::new("p-alice", "evening", "alice", open_hand(), lights_on())]
    }

    #[test]
    fn test_recognize_with_extractor() {
        let extractor = FakeExtractor::new(Some(query_face()), Some(open_hand()));
        let dispatch = Pipeline::new(config())
            .recognize(&extractor, b"face", b"hand", &gallery(), &alice_presets())
            .unwrap();
        assert_eq!(dispatch.preset.key, "p-alice");
        assert_eq!(dispatch.confidence, 1.0);
    }

    #[test]
    fn test_recognize_no_face() {
        let extractor = FakeExtractor::new(None, Some(open_hand()));
        let err = Pipeline::new(config())
            .recognize(&extractor, b"", b"", &gallery(), &alice_presets())
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoFaceDetected));
        assert_eq!(extractor.hand_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_recognize_no_hand() {
        let extractor = FakeExtractor::new(Some(query_face()), None);
        let err = Pipeline::new(config())
            .recognize(&extractor, b"", b"", &gallery(), &alice_presets())
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoHandDetected));
    }

    #[test]
    fn test_recognize_skips_hand_when_identity_has_no_presets() {
        let extractor = FakeExtractor::new(Some(query_face()), Some(open_hand()));
        let err = Pipeline::new(config())
            .recognize(&extractor, b"", b"", &gallery(), &[])
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoPresetsForIdentity { .. }));
        assert_eq!(extractor.hand_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_recognize_extraction_failure() {
        let err = Pipeline::new(config())
            .recognize(&BrokenExtractor, b"", b"", &gallery(), &alice_presets())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(ExtractError::Failed(_))));
        assert!(!err.is_not_recognized());
    }
}
