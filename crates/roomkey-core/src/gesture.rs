//! Hand gesture matching and finger-count classification.
//!
//! Landmark sets follow the 21-point hand topology: index 0 is the wrist,
//! then four joints per finger from thumb (1–4) to pinky (17–20), each
//! ending at the fingertip. Coordinates are image-normalized, so a smaller
//! `y` is higher in the frame.
//!
//! Classification works on wrist-relative coordinates ([`normalize`]);
//! matching compares raw `(x, y)` positions, so the same hand shape made at
//! a different spot in the frame does not match.

use serde::Serialize;

use crate::types::{
    check_threshold, confidence, EnrolledPreset, Landmark, MatchError, MatchResult,
    NotFoundReason, HAND_LANDMARK_COUNT,
};

/// A finger is extended when its tip is this far above its PIP joint.
pub const FINGER_EXTENSION_MARGIN: f64 = 0.02;
/// The thumb is extended when tip and IP joint are this far apart horizontally.
pub const THUMB_EXTENSION_MARGIN: f64 = 0.03;

const WRIST: usize = 0;
const THUMB_IP: usize = 3;
const THUMB_TIP: usize = 4;
/// (tip, pip) for index, middle, ring and pinky.
const FINGER_TIP_PIP: [(usize, usize); 4] = [(8, 6), (12, 10), (16, 14), (20, 18)];

/// Translate landmarks so the wrist sits at the `(x, y)` origin. `z` is unchanged.
pub fn normalize(landmarks: &[Landmark]) -> Result<Vec<Landmark>, MatchError> {
    if landmarks.len() < HAND_LANDMARK_COUNT {
        return Err(MatchError::InsufficientLandmarks {
            expected: HAND_LANDMARK_COUNT,
            actual: landmarks.len(),
        });
    }

    let [wrist_x, wrist_y, _] = landmarks[WRIST];
    Ok(landmarks
        .iter()
        .map(|&[x, y, z]| [x - wrist_x, y - wrist_y, z])
        .collect())
}

/// Count extended fingers (0–5).
///
/// Returns 0 for malformed input instead of failing: the count is advisory
/// metadata and never gates a match.
pub fn classify_digit(landmarks: &[Landmark]) -> u8 {
    if landmarks.iter().flatten().any(|c| !c.is_finite()) {
        return 0;
    }
    let Ok(norm) = normalize(landmarks) else {
        return 0;
    };

    let fingers = FINGER_TIP_PIP
        .iter()
        .filter(|&&(tip, pip)| norm[tip][1] < norm[pip][1] - FINGER_EXTENSION_MARGIN)
        .count();

    // Handedness is ignored: only the horizontal spread matters.
    let thumb = (norm[THUMB_TIP][0] - norm[THUMB_IP][0]).abs() > THUMB_EXTENSION_MARGIN;

    (fingers + usize::from(thumb)).min(5) as u8
}

fn check_landmarks(landmarks: &[Landmark]) -> Result<(), MatchError> {
    if landmarks.len() != HAND_LANDMARK_COUNT {
        return Err(MatchError::InsufficientLandmarks {
            expected: HAND_LANDMARK_COUNT,
            actual: landmarks.len(),
        });
    }
    Ok(())
}

/// Mean over all landmarks of the planar `(x, y)` distance; `z` is ignored.
pub fn mean_planar_distance(a: &[Landmark], b: &[Landmark]) -> Result<f64, MatchError> {
    check_landmarks(a)?;
    check_landmarks(b)?;

    let total: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(p, q)| ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)).sqrt())
        .sum();
    Ok(total / HAND_LANDMARK_COUNT as f64)
}

/// Result of comparing two landmark sets one-to-one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GestureComparison {
    pub matched: bool,
    pub distance: f64,
    pub confidence: f64,
}

pub fn compare_gestures(
    a: &[Landmark],
    b: &[Landmark],
    threshold: f64,
) -> Result<GestureComparison, MatchError> {
    check_threshold(threshold)?;
    let d = mean_planar_distance(a, b)?;
    Ok(GestureComparison {
        matched: d < threshold,
        distance: d,
        confidence: confidence(d, threshold),
    })
}

/// Nearest-neighbor search over enrolled presets by hand shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureMatcher {
    pub threshold: f64,
}

impl GestureMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn find_best<'a, I>(
        &self,
        query: &[Landmark],
        candidates: I,
    ) -> Result<MatchResult, MatchError>
    where
        I: IntoIterator<Item = &'a EnrolledPreset>,
    {
        self.find_best_entry(query, candidates).map(|(_, result)| result)
    }

    /// Find the closest preset whose distance is strictly below the threshold.
    ///
    /// Only eligible candidates compete; first-seen wins exact ties.
    pub fn find_best_entry<'a, I>(
        &self,
        query: &[Landmark],
        candidates: I,
    ) -> Result<(&'a EnrolledPreset, MatchResult), MatchError>
    where
        I: IntoIterator<Item = &'a EnrolledPreset>,
    {
        check_landmarks(query)?;

        let mut scanned = 0usize;
        let mut closest = f64::INFINITY;
        let mut best: Option<(&'a EnrolledPreset, f64)> = None;

        for preset in candidates {
            scanned += 1;
            let d = mean_planar_distance(query, &preset.landmarks)?;
            if d < closest {
                closest = d;
            }
            let improves = match best {
                None => true,
                Some((_, best_distance)) => d < best_distance,
            };
            if d < self.threshold && improves {
                best = Some((preset, d));
            }
        }

        if scanned == 0 {
            return Err(MatchError::NotFound(NotFoundReason::NoCandidates));
        }
        check_threshold(self.threshold)?;

        tracing::debug!(
            scanned,
            closest,
            threshold = self.threshold,
            "gesture scan complete"
        );

        match best {
            Some((preset, d)) => {
                let result = MatchResult::new(&preset.id, d, self.threshold);
                tracing::info!(
                    preset = %preset.id,
                    name = %preset.name,
                    distance = result.distance,
                    confidence = result.confidence,
                    "gesture matched"
                );
                Ok((preset, result))
            }
            None => Err(MatchError::NotFound(NotFoundReason::AboveThreshold {
                best_distance: closest,
            })),
        }
    }
}

/// Match a landmark set against enrolled presets.
pub fn match_gesture(
    query: &[Landmark],
    candidates: &[EnrolledPreset],
    threshold: f64,
) -> Result<MatchResult, MatchError> {
    GestureMatcher::new(threshold).find_best(query, candidates)
}
