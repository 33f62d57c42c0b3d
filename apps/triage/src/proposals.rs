//! Proposal planning: decides which ranked jobs get a proposal this cycle
//! and which model would write each one. Nothing is generated or billed
//! here; callers commit spend once a proposal is actually produced.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{JobPosting, StageReached};
use crate::pipeline::BatchReport;
use crate::routing::{ModelRouter, RoutingDecision, TaskType, TokenEstimate};

pub const DEFAULT_MAX_PROPOSALS: usize = 5;
pub const DEFAULT_HIGHEND_THRESHOLD: usize = 100;

/// Profile summary and instructions sent with every proposal request.
const PROPOSAL_PROMPT_TOKENS: u64 = 400;
const PROPOSAL_OUTPUT_TOKENS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalPlan {
    pub job_id: String,
    pub score: f64,
    /// Long descriptions are routed with high quality forced.
    pub high_end: bool,
    pub decision: RoutingDecision,
}

pub fn proposal_estimate(job: &JobPosting) -> TokenEstimate {
    let words = job.word_count() as u64;
    TokenEstimate::new(words * 4 / 3 + PROPOSAL_PROMPT_TOKENS, PROPOSAL_OUTPUT_TOKENS)
}

/// Picks up to `max` jobs from `report`, validated ones first, then analyzed
/// ones, each group in rank order. Pre-filtered jobs never get a proposal.
pub fn plan_proposals(
    report: &BatchReport,
    jobs: &[JobPosting],
    router: &ModelRouter,
    max: usize,
    highend_threshold: usize,
) -> Vec<ProposalPlan> {
    let by_id: HashMap<&str, &JobPosting> = jobs.iter().map(|j| (j.id.as_str(), j)).collect();

    let validated = report
        .results
        .iter()
        .filter(|r| r.stage_reached() == StageReached::Validated);
    let analyzed = report
        .results
        .iter()
        .filter(|r| r.stage_reached() == StageReached::Analyzed);

    let plans: Vec<ProposalPlan> = validated
        .chain(analyzed)
        .filter_map(|result| {
            let Some(job) = by_id.get(result.job_id()) else {
                debug!("No posting for ranked job {}, skipping", result.job_id());
                return None;
            };
            let high_end = job.description.chars().count() > highend_threshold;
            let decision =
                router.route(TaskType::ProposalGeneration, proposal_estimate(job), high_end);
            Some(ProposalPlan {
                job_id: job.id.clone(),
                score: result.score(),
                high_end,
                decision,
            })
        })
        .take(max)
        .collect();

    info!(
        "Planned {} proposal(s) from batch {}",
        plans.len(),
        report.run_id
    );
    plans
}
