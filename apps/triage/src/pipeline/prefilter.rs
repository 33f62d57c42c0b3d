//! Cheap synchronous screening applied before any scoring.
//!
//! Only postings that can't be worth a proposal are rejected here. Missing
//! or unusable fields such as the budget are left to scoring, where they
//! zero out their own term.

use crate::models::JobPosting;

/// Reason string recorded on every prefiltered-out result.
pub const PREFILTER_REASON: &str = "failed pre-filter";
/// Descriptions shorter than this are too thin to score.
pub const MIN_DESCRIPTION_WORDS: usize = 10;

/// Phrases that mark a posting as not worth a proposal.
const BLOCKED_PHRASES: &[&str] = &[
    "unpaid",
    "commission only",
    "free test task",
    "exposure only",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefilterVerdict {
    Pass,
    Reject(String),
}

impl PrefilterVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, PrefilterVerdict::Pass)
    }
}

pub fn prefilter(job: &JobPosting) -> PrefilterVerdict {
    if job.title.trim().is_empty() {
        return PrefilterVerdict::Reject("missing title".to_string());
    }

    let words = job.word_count();
    if words < MIN_DESCRIPTION_WORDS {
        return PrefilterVerdict::Reject(format!(
            "description has {words} words, need {MIN_DESCRIPTION_WORDS}"
        ));
    }

    let haystack = format!("{} {}", job.title, job.description).to_lowercase();
    if let Some(phrase) = BLOCKED_PHRASES.iter().find(|p| haystack.contains(*p)) {
        return PrefilterVerdict::Reject(format!("blocked phrase '{phrase}'"));
    }

    PrefilterVerdict::Pass
}
