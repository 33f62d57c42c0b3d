//! Fit Scoring: composite 0–1 fitness of a job posting for a user profile.
//!
//! Default: `CompositeFitScorer` (pure-Rust, deterministic).
//! The pipeline holds an `Arc<dyn FitScorer>`, so other backends can be
//! swapped in without touching the pipeline.

pub mod similarity;
pub mod weights;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AppError;
use crate::models::{JobPosting, UserProfile};

pub use weights::{compose, ScoringWeights};

/// Words of description assumed per hour of work.
pub const WORDS_PER_HOUR: f64 = 50.0;
/// Category term for a job outside the preferred set.
pub const NON_PREFERRED_CATEGORY_FIT: f64 = 0.5;

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

/// The three terms and their weighted composite, each in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub skill_match: f64,
    pub budget_fit: f64,
    pub category_fit: f64,
    pub composite: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Scores one posting against one profile. May block (remote backends), so
/// it is only ever called from the Analyze phase.
#[async_trait]
pub trait FitScorer: Send + Sync {
    async fn score(
        &self,
        job: &JobPosting,
        profile: &UserProfile,
    ) -> Result<ScoreBreakdown, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// CompositeFitScorer
// ────────────────────────────────────────────────────────────────────────────

/// Weighted skill/budget/category scorer. Never fails: missing or malformed
/// fields zero out their own term and leave the others intact.
#[derive(Debug, Clone, Default)]
pub struct CompositeFitScorer {
    weights: ScoringWeights,
}

impl CompositeFitScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn breakdown(&self, job: &JobPosting, profile: &UserProfile) -> ScoreBreakdown {
        let skill_match = skill_match(job, profile);
        let budget_fit = budget_fit(job, profile);
        let category_fit = category_fit(job, profile);
        let composite = compose(skill_match, budget_fit, category_fit, &self.weights);

        debug!(
            "Scored job {}: skill={:.3} budget={:.3} category={:.3} composite={:.3}",
            job.id, skill_match, budget_fit, category_fit, composite
        );

        ScoreBreakdown {
            skill_match,
            budget_fit,
            category_fit,
            composite,
        }
    }
}

#[async_trait]
impl FitScorer for CompositeFitScorer {
    async fn score(
        &self,
        job: &JobPosting,
        profile: &UserProfile,
    ) -> Result<ScoreBreakdown, AppError> {
        Ok(self.breakdown(job, profile))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Terms
// ────────────────────────────────────────────────────────────────────────────

/// Textual similarity of the description to the profile's skill names.
pub fn skill_match(job: &JobPosting, profile: &UserProfile) -> f64 {
    similarity::cosine_similarity(&job.description, &profile.skill_text())
}

/// `max(1, words / 50)`. The hour floor keeps budget_fit finite for
/// one-line descriptions.
pub fn estimated_hours(job: &JobPosting) -> f64 {
    (job.word_count() as f64 / WORDS_PER_HOUR).max(1.0)
}

/// `min(budget / (hours * rate), 1)`; 0 when budget or rate are unusable.
pub fn budget_fit(job: &JobPosting, profile: &UserProfile) -> f64 {
    let rate = profile.hourly_rate;
    if !job.budget.is_finite() || job.budget <= 0.0 || !rate.is_finite() || rate <= 0.0 {
        return 0.0;
    }
    (job.budget / (estimated_hours(job) * rate)).min(1.0)
}

pub fn category_fit(job: &JobPosting, profile: &UserProfile) -> f64 {
    if profile.prefers(job.category) {
        1.0
    } else {
        NON_PREFERRED_CATEGORY_FIT
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
