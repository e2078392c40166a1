//! Priority scoring and adaptive reweighting (§4.D).

use serde::{Deserialize, Serialize};

use crate::core::entry::{ContentType, PageType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub frequency: f64,
    pub recency: f64,
    pub page_type: f64,
    pub content_type: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        PriorityWeights {
            frequency: 0.3,
            recency: 0.2,
            page_type: 0.3,
            content_type: 0.2,
        }
    }
}

impl PriorityWeights {
    /// Shifts weight toward frequency by `+0.1` (capped at 0.9) and
    /// rebalances recency to keep the total at 1.0 with the two type
    /// weights fixed, per §4.D adaptive reweighting.
    pub fn shift_toward_frequency(&mut self) {
        let new_frequency = (self.frequency + 0.1).min(0.9);
        let delta = new_frequency - self.frequency;
        self.frequency = new_frequency;
        self.recency = (self.recency - delta).max(0.0);
    }
}

fn frequency_score(access_count: u64) -> f64 {
    (100.0f64.min(((access_count + 1) as f64).log10() * 50.0)).max(0.0)
}

fn recency_score(age_hours: f64) -> f64 {
    (100.0 * (-age_hours / 24.0).exp()).clamp(0.0, 100.0)
}

/// Combines the four sub-scores per §4.D. `age_hours` is `(now - lastAccessedAt)`
/// expressed in hours.
pub fn compute_priority(
    access_count: u64,
    age_hours: f64,
    page_type: PageType,
    content_type: ContentType,
    weights: &PriorityWeights,
) -> f64 {
    let score = frequency_score(access_count) * weights.frequency
        + recency_score(age_hours) * weights.recency
        + page_type.base_score() * weights.page_type
        + content_type.base_score() * weights.content_type;
    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_frequent_dashboard_scores_high() {
        let weights = PriorityWeights::default();
        let score = compute_priority(50, 0.0, PageType::Dashboard, ContentType::UserGenerated, &weights);
        assert!(score > 80.0, "expected high score, got {score}");
    }

    #[test]
    fn stale_infrequent_other_scores_low() {
        let weights = PriorityWeights::default();
        let score = compute_priority(0, 240.0, PageType::Other, ContentType::Generic, &weights);
        assert!(score < 30.0, "expected low score, got {score}");
    }

    #[test]
    fn score_always_clamped() {
        let weights = PriorityWeights::default();
        let score = compute_priority(u64::MAX / 2, 0.0, PageType::Dashboard, ContentType::UserGenerated, &weights);
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn shift_toward_frequency_keeps_weights_summing_to_one() {
        let mut weights = PriorityWeights::default();
        weights.shift_toward_frequency();
        assert!((weights.frequency - 0.4).abs() < 1e-9);
        let total = weights.frequency + weights.recency + weights.page_type + weights.content_type;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn shift_toward_frequency_caps_at_point_nine() {
        let mut weights = PriorityWeights {
            frequency: 0.85,
            recency: 0.15,
            page_type: 0.0,
            content_type: 0.0,
        };
        weights.shift_toward_frequency();
        assert!((weights.frequency - 0.9).abs() < 1e-9);
        assert!(weights.recency >= 0.0);
    }
}
