//! Confidence scoring from the research process's own signals.

use crate::types::{ConfidenceLabel, Source};
use std::collections::HashSet;

/// Sources at which the count term saturates.
const SATURATION: f32 = 5.0;

/// Numeric confidence in `[0, 1]`.
///
/// `0.4 * min(n / 5, 1) + 0.2 * diversity + 0.4 * mean_quality`, where
/// diversity is distinct documents or sites divided by `n`.
pub fn score(sources: &[Source]) -> f32 {
    if sources.is_empty() {
        return 0.0;
    }

    let n = sources.len() as f32;
    let origins: HashSet<String> = sources.iter().map(Source::origin).collect();
    let diversity = origins.len() as f32 / n;
    let mean_quality = sources.iter().map(|s| s.quality).sum::<f32>() / n;

    0.4 * (n / SATURATION).min(1.0) + 0.2 * diversity + 0.4 * mean_quality
}

/// Map a score to its label.
pub fn label(score: f32) -> ConfidenceLabel {
    match score {
        s if s < 0.2 => ConfidenceLabel::VeryLow,
        s if s < 0.35 => ConfidenceLabel::Low,
        s if s < 0.6 => ConfidenceLabel::Medium,
        s if s < 0.8 => ConfidenceLabel::High,
        _ => ConfidenceLabel::VeryHigh,
    }
}

/// Label for a set of passing sources.
pub fn assess(sources: &[Source]) -> ConfidenceLabel {
    if sources.is_empty() {
        return ConfidenceLabel::VeryLow;
    }
    label(score(sources))
}
