//! Distance metrics between feature vectors.
//!
//! All metrics are dissimilarities: 0.0 means identical, larger means
//! further apart. Every metric is symmetric in its arguments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::types::MatchError;

/// Named distance metric for face embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// `1 - cosine_similarity(a, b)`, in [0, 2].
    Cosine,
    /// L2 norm of `a - b`.
    Euclidean,
    /// L2 norm of the difference of the L2-normalized vectors, in [0, 2].
    EuclideanL2,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::Cosine,
        MetricKind::Euclidean,
        MetricKind::EuclideanL2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cosine => "cosine",
            MetricKind::Euclidean => "euclidean",
            MetricKind::EuclideanL2 => "euclidean_l2",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown distance metric: {0:?} (expected cosine, euclidean or euclidean_l2)")]
pub struct UnknownMetric(pub String);

impl FromStr for MetricKind {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

/// Compute the distance between `a` and `b` under `metric`.
///
/// Both vectors must be non-empty and of equal length.
pub fn distance(a: &[f64], b: &[f64], metric: MetricKind) -> Result<f64, MatchError> {
    if a.len() != b.len() || a.is_empty() {
        return Err(MatchError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let d = match metric {
        MetricKind::Cosine => cosine_distance(a, b),
        MetricKind::Euclidean => euclidean_distance(a, b),
        MetricKind::EuclideanL2 => euclidean_distance(&l2_normalize(a), &l2_normalize(b)),
    };
    Ok(d)
}

fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    if a == b {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        // Rounding can push similarity of parallel vectors just past 1.0.
        (1.0 - dot / denom).max(0.0)
    } else if norm_a == 0.0 && norm_b == 0.0 {
        0.0
    } else {
        1.0
    }
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn l2_normalize(v: &[f64]) -> Vec<f64> {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
