//! Vector quality gating.
//!
//! Every vector leaving the embedder passes through here before it may be
//! persisted. Checks run in a fixed order and short-circuit on the first
//! violation, so a rejection always names exactly one rule.

use serde::Serialize;
use std::fmt;

use crate::models::QualityConfig;

/// Components with |v| below this count as dead dimensions.
pub const NEAR_ZERO_EPSILON: f32 = 1e-6;

/// Numeric summary of a vector, computed fresh on every evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct QualityMetrics {
    pub l2_norm: f32,
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    pub dead_fraction: f32,
    /// Cosine similarity against the reference sample; absent when no
    /// reference corpus exists yet.
    pub coherence: Option<f32>,
}

impl QualityMetrics {
    /// Compute metrics for a vector of finite values.
    fn compute(vector: &[f32], reference: Option<&[f32]>) -> Self {
        let len = vector.len() as f32;
        let l2_norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        let mean = vector.iter().sum::<f32>() / len;
        let min = vector.iter().copied().fold(f32::INFINITY, f32::min);
        let max = vector.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let dead = vector
            .iter()
            .filter(|v| v.abs() < NEAR_ZERO_EPSILON)
            .count();
        let coherence = reference.map(|r| cosine_similarity(vector, r));

        Self {
            l2_norm,
            mean,
            min,
            max,
            dead_fraction: dead as f32 / len,
            coherence,
        }
    }
}

/// Why a vector was rejected: one rule, with observed vs. expected values.
#[derive(Debug, Clone, PartialEq)]
pub enum GateRejection {
    NonFinite { index: usize },
    NormBelowMin { observed: f32, min: f32 },
    NormAboveMax { observed: f32, max: f32 },
    DeadDimensions { observed: f32, limit: f32 },
    LowCoherence { observed: f32, threshold: f32 },
}

impl GateRejection {
    /// Stable rule identifier for logs and job error details.
    pub fn rule(&self) -> &'static str {
        match self {
            GateRejection::NonFinite { .. } => "finite_values",
            GateRejection::NormBelowMin { .. } => "norm_below_min",
            GateRejection::NormAboveMax { .. } => "norm_above_max",
            GateRejection::DeadDimensions { .. } => "dead_dimensions",
            GateRejection::LowCoherence { .. } => "coherence",
        }
    }
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateRejection::NonFinite { index } => {
                write!(f, "finite_values: non-finite component at index {}", index)
            }
            GateRejection::NormBelowMin { observed, min } => {
                write!(
                    f,
                    "norm_below_min: observed {}, expected >= {}",
                    observed, min
                )
            }
            GateRejection::NormAboveMax { observed, max } => {
                write!(
                    f,
                    "norm_above_max: observed {}, expected <= {}",
                    observed, max
                )
            }
            GateRejection::DeadDimensions { observed, limit } => {
                write!(
                    f,
                    "dead_dimensions: observed fraction {}, expected < {}",
                    observed, limit
                )
            }
            GateRejection::LowCoherence {
                observed,
                threshold,
            } => {
                write!(f, "coherence: observed {}, expected >= {}", observed, threshold)
            }
        }
    }
}

/// Quality gate over embedding vectors. Pure: no side effects, same inputs
/// always produce the same decision.
#[derive(Debug, Clone)]
pub struct QualityGate {
    norm_min: f32,
    norm_max: f32,
    max_dead_fraction: f32,
    coherence_threshold: f32,
}

impl QualityGate {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            norm_min: config.norm_min,
            norm_max: config.norm_max,
            max_dead_fraction: config.max_dead_fraction,
            coherence_threshold: config.coherence_threshold,
        }
    }

    /// Evaluate a vector, in rule order:
    /// finite values, norm bounds, dead dimensions, coherence.
    ///
    /// The coherence rule compares against the caller-supplied reference
    /// sample and is skipped when no reference exists yet.
    pub fn evaluate(
        &self,
        vector: &[f32],
        reference: Option<&[f32]>,
    ) -> Result<QualityMetrics, GateRejection> {
        if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
            return Err(GateRejection::NonFinite { index });
        }

        let metrics = QualityMetrics::compute(vector, reference);

        if metrics.l2_norm < self.norm_min {
            return Err(GateRejection::NormBelowMin {
                observed: metrics.l2_norm,
                min: self.norm_min,
            });
        }
        if metrics.l2_norm > self.norm_max {
            return Err(GateRejection::NormAboveMax {
                observed: metrics.l2_norm,
                max: self.norm_max,
            });
        }
        if metrics.dead_fraction >= self.max_dead_fraction {
            return Err(GateRejection::DeadDimensions {
                observed: metrics.dead_fraction,
                limit: self.max_dead_fraction,
            });
        }
        if let Some(coherence) = metrics.coherence
            && coherence < self.coherence_threshold
        {
            return Err(GateRejection::LowCoherence {
                observed: coherence,
                threshold: self.coherence_threshold,
            });
        }

        Ok(metrics)
    }
}

/// Cosine similarity between two vectors. Zero when either has no
/// magnitude, which the norm rules reject before this runs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(norm_min: f32, norm_max: f32, coherence_threshold: f32) -> QualityGate {
        QualityGate::new(&QualityConfig {
            norm_min,
            norm_max,
            // Most tests use sparse fixture vectors
            max_dead_fraction: 1.0,
            coherence_threshold,
        })
    }

    #[test]
    fn test_unit_vectors_accepted() {
        let g = gate(0.5, 2.0, 0.0);
        for vector in [
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
        ] {
            let metrics = g.evaluate(&vector, None).unwrap();
            assert!((metrics.l2_norm - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_nan_rejected_before_other_rules() {
        let g = gate(0.1, 10.0, 0.95);
        // Norm would also be out of bounds, but finiteness wins
        let rejection = g
            .evaluate(&[f32::NAN, 100.0, 100.0, 100.0], None)
            .unwrap_err();
        assert_eq!(rejection.rule(), "finite_values");
        assert_eq!(rejection, GateRejection::NonFinite { index: 0 });
    }

    #[test]
    fn test_infinity_rejected() {
        let g = gate(0.1, 10.0, 0.95);
        let rejection = g
            .evaluate(&[0.5, f32::INFINITY, 0.5, 0.5], None)
            .unwrap_err();
        assert_eq!(rejection, GateRejection::NonFinite { index: 1 });
    }

    #[test]
    fn test_zero_vector_rejected_as_norm_below_min() {
        let g = gate(0.1, 10.0, 0.95);
        let rejection = g.evaluate(&[0.0, 0.0, 0.0, 0.0], None).unwrap_err();
        assert_eq!(rejection.rule(), "norm_below_min");
        assert_eq!(
            rejection,
            GateRejection::NormBelowMin {
                observed: 0.0,
                min: 0.1
            }
        );
    }

    #[test]
    fn test_exploded_vector_rejected() {
        let g = gate(0.1, 10.0, 0.95);
        let rejection = g.evaluate(&[100.0, 100.0, 100.0], None).unwrap_err();
        assert_eq!(rejection.rule(), "norm_above_max");
    }

    #[test]
    fn test_mostly_dead_vector_rejected() {
        let g = QualityGate::new(&QualityConfig {
            norm_min: 0.1,
            norm_max: 10.0,
            max_dead_fraction: 0.5,
            coherence_threshold: 0.0,
        });
        // 3 of 4 components near zero, norm still in bounds
        let rejection = g.evaluate(&[1.0, 0.0, 0.0, 1e-9], None).unwrap_err();
        assert_eq!(rejection.rule(), "dead_dimensions");

        // A dense vector of the same norm passes
        assert!(g.evaluate(&[0.5, 0.5, 0.5, 0.5], None).is_ok());
    }

    #[test]
    fn test_coherence_below_threshold_rejected() {
        let g = gate(0.1, 10.0, 0.95);
        let reference = [1.0, 0.0, 0.0];
        // Orthogonal to the reference
        let rejection = g.evaluate(&[0.0, 1.0, 0.1], Some(&reference)).unwrap_err();
        assert_eq!(rejection.rule(), "coherence");
    }

    #[test]
    fn test_coherence_skipped_without_reference() {
        let g = gate(0.1, 10.0, 0.95);
        let metrics = g.evaluate(&[0.0, 1.0, 0.1], None).unwrap();
        assert!(metrics.coherence.is_none());
    }

    #[test]
    fn test_coherent_vector_accepted() {
        let g = gate(0.1, 10.0, 0.95);
        let reference = [1.0, 0.0, 0.0];
        let metrics = g
            .evaluate(&[0.99, 0.01, 0.02], Some(&reference))
            .unwrap();
        assert!(metrics.coherence.unwrap() > 0.95);
    }

    #[test]
    fn test_metrics_values() {
        let g = gate(0.1, 10.0, 0.0);
        let metrics = g.evaluate(&[3.0, 4.0], None).unwrap();
        assert!((metrics.l2_norm - 5.0).abs() < 1e-6);
        assert!((metrics.mean - 3.5).abs() < 1e-6);
        assert_eq!(metrics.min, 3.0);
        assert_eq!(metrics.max, 4.0);
        assert_eq!(metrics.dead_fraction, 0.0);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
