//! Validation: the higher-cost re-check run on a routed model for jobs
//! that scored above the validation threshold.

use async_trait::async_trait;
use thiserror::Error;

use crate::budget::TokenUsage;
use crate::models::{JobPosting, UserProfile};
use crate::routing::{RoutingDecision, TokenEstimate};

/// Prompt overhead added to every validation call.
const PROMPT_OVERHEAD_TOKENS: u64 = 200;
const VALIDATION_OUTPUT_TOKENS: u64 = 300;

/// Weight of the analyzed score in the adjusted score; the rest is coverage.
const ANALYZED_WEIGHT: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub score: f64,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// Outage, rate limit or timeout on the model side. Worth one retry on a
    /// cheaper model.
    #[error("transient model failure: {0}")]
    Transient(String),

    /// The posting itself can't be validated. Never retried.
    #[error("validation rejected: {0}")]
    Rejected(String),
}

impl ValidationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ValidationError::Transient(_))
    }
}

/// Re-checks an analyzed job on the model chosen by the router.
#[async_trait]
pub trait JobValidator: Send + Sync {
    async fn validate(
        &self,
        job: &JobPosting,
        profile: &UserProfile,
        analyzed_score: f64,
        model: &RoutingDecision,
    ) -> Result<Validation, ValidationError>;
}

/// Token budget of a validation call for `job`: roughly 4 tokens per 3 words.
pub fn validation_estimate(job: &JobPosting) -> TokenEstimate {
    let words = job.word_count() as u64;
    TokenEstimate::new(words * 4 / 3 + PROMPT_OVERHEAD_TOKENS, VALIDATION_OUTPUT_TOKENS)
}

/// Share of the job's required skills the profile covers, each weighted by
/// the profile's proficiency. `None` when the job lists no skills.
pub fn skill_coverage(job: &JobPosting, profile: &UserProfile) -> Option<f64> {
    if job.required_skills.is_empty() {
        return None;
    }
    let covered: f64 = job
        .required_skills
        .iter()
        .map(|required| {
            profile
                .skills
                .iter()
                .filter(|s| s.name.trim().eq_ignore_ascii_case(required.name.trim()))
                .map(|s| s.proficiency.clamp(0.0, 1.0))
                .fold(0.0, f64::max)
        })
        .sum();
    Some(covered / job.required_skills.len() as f64)
}

/// Default validator: blends the analyzed score with required-skill coverage.
/// Runs locally and deterministically; the routed model only decides what
/// the call is billed as.
#[derive(Debug, Clone, Default)]
pub struct SkillCoverageValidator;

#[async_trait]
impl JobValidator for SkillCoverageValidator {
    async fn validate(
        &self,
        job: &JobPosting,
        profile: &UserProfile,
        analyzed_score: f64,
        _model: &RoutingDecision,
    ) -> Result<Validation, ValidationError> {
        let score = match skill_coverage(job, profile) {
            Some(coverage) => ANALYZED_WEIGHT * analyzed_score + (1.0 - ANALYZED_WEIGHT) * coverage,
            None => analyzed_score,
        };
        let estimate = validation_estimate(job);
        Ok(Validation {
            score: score.clamp(0.0, 1.0),
            usage: TokenUsage::new(estimate.input, estimate.output),
        })
    }
}
