//! Face identity matching against enrolled embeddings.

use serde::Serialize;

use crate::metric::{distance, MetricKind};
use crate::types::{
    check_threshold, Embedding, EnrolledIdentity, MatchError, MatchResult, NotFoundReason,
};

/// Nearest-neighbor search over enrolled identities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMatcher {
    pub metric: MetricKind,
    pub threshold: f64,
}

impl FaceMatcher {
    pub fn new(metric: MetricKind, threshold: f64) -> Self {
        Self { metric, threshold }
    }

    /// Find the closest identity to `query`, verified against the threshold.
    pub fn find_best<'a, I>(
        &self,
        query: &Embedding,
        candidates: I,
    ) -> Result<MatchResult, MatchError>
    where
        I: IntoIterator<Item = &'a EnrolledIdentity>,
    {
        self.find_best_entry(query, candidates).map(|(_, result)| result)
    }

    /// Like [`find_best`](Self::find_best), also returning the winning identity.
    ///
    /// Every candidate is scanned. The minimum is tracked with a strict `<`,
    /// so on an exact tie the candidate that comes first in `candidates` wins.
    pub fn find_best_entry<'a, I>(
        &self,
        query: &Embedding,
        candidates: I,
    ) -> Result<(&'a EnrolledIdentity, MatchResult), MatchError>
    where
        I: IntoIterator<Item = &'a EnrolledIdentity>,
    {
        let mut scanned = 0usize;
        let mut best_distance = f64::INFINITY;
        let mut best: Option<&'a EnrolledIdentity> = None;

        for identity in candidates {
            scanned += 1;
            let d = distance(&query.values, &identity.embedding.values, self.metric)?;
            if d < best_distance {
                best_distance = d;
                best = Some(identity);
            }
        }

        if scanned == 0 {
            return Err(MatchError::NotFound(NotFoundReason::NoCandidates));
        }
        check_threshold(self.threshold)?;

        tracing::debug!(
            scanned,
            best_distance,
            threshold = self.threshold,
            metric = %self.metric,
            "face scan complete"
        );

        match best {
            Some(identity) if best_distance < self.threshold => {
                let result = MatchResult::new(&identity.id, best_distance, self.threshold);
                tracing::info!(
                    identity = %identity.id,
                    name = %identity.name,
                    distance = result.distance,
                    confidence = result.confidence,
                    "face matched"
                );
                Ok((identity, result))
            }
            _ => Err(MatchError::NotFound(NotFoundReason::AboveThreshold { best_distance })),
        }
    }
}

/// Match a face embedding against enrolled identities.
pub fn match_identity(
    query: &Embedding,
    candidates: &[EnrolledIdentity],
    metric: MetricKind,
    threshold: f64,
) -> Result<MatchResult, MatchError> {
    FaceMatcher::new(metric, threshold).find_best(query, candidates)
}

/// Result of comparing two embeddings one-to-one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verification {
    pub verified: bool,
    pub distance: f64,
    pub threshold: f64,
    pub metric: MetricKind,
}

/// Decide whether two embeddings belong to the same face.
pub fn verify_faces(
    a: &Embedding,
    b: &Embedding,
    metric: MetricKind,
    threshold: f64,
) -> Result<Verification, MatchError> {
    check_threshold(threshold)?;
    let d = distance(&a.values, &b.values, metric)?;
    Ok(Verification {
        verified: d < threshold,
        distance: d,
        threshold,
        metric,
    })
}
