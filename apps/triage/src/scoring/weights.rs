use serde::{Deserialize, Serialize};

/// Relative weight of each composite term. Defaults sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub skill_match: f64,
    pub budget_fit: f64,
    pub category_fit: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            skill_match: 0.5,
            budget_fit: 0.3,
            category_fit: 0.2,
        }
    }
}

/// Composite fitness: 0.5*skill_match + 0.3*budget_fit + 0.2*category_fit
pub fn compose(
    skill_match: f64,
    budget_fit: f64,
    category_fit: f64,
    weights: &ScoringWeights,
) -> f64 {
    let raw = weights.skill_match * unit(skill_match)
        + weights.budget_fit * unit(budget_fit)
        + weights.category_fit * unit(category_fit);
    unit(raw)
}

/// Clamps into [0, 1]; NaN counts as no signal.
pub fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
