//! roomkey-core — Identity and gesture matching for smart-room presets.
//!
//! Matches a face embedding against enrolled identities, then matches a
//! 21-point hand landmark set against that identity's presets to pick the
//! device states to apply. Feature extraction is supplied by the caller
//! through [`FeatureExtractor`].

pub mod extractor;
pub mod face;
pub mod gesture;
pub mod metric;
pub mod pipeline;
pub mod registry;
pub mod types;

pub use extractor::{Detection, ExtractError, FeatureExtractor, HandObservation};
pub use face::{match_identity, verify_faces, FaceMatcher, Verification};
pub use gesture::{
    classify_digit, compare_gestures, match_gesture, normalize, GestureComparison,
    GestureMatcher,
};
pub use metric::{distance, MetricKind};
pub use pipeline::{Dispatch, Pipeline, PipelineError};
pub use registry::{Registry, RegistryError};
pub use types::{
    DeviceState, Embedding, EnrolledIdentity, EnrolledPreset, Landmark, MatchConfig, MatchError,
    MatchResult, NotFoundReason, HAND_LANDMARK_COUNT,
};
