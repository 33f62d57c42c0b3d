//! Evaluation pipeline: runs a batch of postings through
//! pre-filter → analyze → validate on a bounded worker pool.
//!
//! Every job is its own tokio task; a semaphore caps how many run at once.
//! A job that errors or panics is reported in `BatchReport::failures` and
//! never takes its siblings down with it.

pub mod phase;
pub mod prefilter;
pub mod validator;

use std::cmp::Ordering;
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{EvaluationHistory, EvaluationResult, EvaluationRun, JobPosting, UserProfile};
use crate::routing::{ModelRouter, RoutingDecision, TaskType};
use crate::errors::AppError;
use crate::scoring::weights::unit;
use crate::scoring::{FitScorer, ScoreBreakdown};

pub use phase::{JobPhase, PhaseEvent, PhaseTracker, VALIDATION_THRESHOLD};
pub use prefilter::{prefilter, PrefilterVerdict, PREFILTER_REASON};
pub use validator::{
    validation_estimate, JobValidator, SkillCoverageValidator, Validation, ValidationError,
};

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Jobs evaluated concurrently. Zero is treated as one.
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Report
// ────────────────────────────────────────────────────────────────────────────

/// A job that did not produce a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub job_id: String,
    /// Position in the submitted batch.
    pub index: usize,
    /// Phase the job was in when it failed. `None` if the task panicked.
    pub phase: Option<JobPhase>,
    pub cause: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    /// Ranked by score, highest first; equal scores keep submission order.
    pub results: Vec<EvaluationResult>,
    pub failures: Vec<JobFailure>,
    /// Ids of jobs still running when the deadline passed.
    pub timed_out: Vec<String>,
}

impl BatchReport {
    /// Jobs missing from `results`.
    pub fn excluded_count(&self) -> usize {
        self.failures.len() + self.timed_out.len()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

pub struct EvaluationPipeline {
    scorer: Arc<dyn FitScorer>,
    validator: Arc<dyn JobValidator>,
    router: Arc<ModelRouter>,
    config: PipelineConfig,
    history: Mutex<EvaluationHistory>,
}

impl EvaluationPipeline {
    pub fn new(
        scorer: Arc<dyn FitScorer>,
        validator: Arc<dyn JobValidator>,
        router: Arc<ModelRouter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            scorer,
            validator,
            router,
            config,
            history: Mutex::new(EvaluationHistory::default()),
        }
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    fn lock_history(&self) -> MutexGuard<'_, EvaluationHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn history(&self) -> EvaluationHistory {
        self.lock_history().clone()
    }

    pub fn latest_result(&self, job_id: &str) -> Option<EvaluationResult> {
        self.lock_history().latest_for(job_id).cloned()
    }

    /// Evaluates `jobs` for `profile` and returns them ranked.
    ///
    /// With a `deadline`, jobs still pending when it elapses are aborted and
    /// listed in `timed_out`. The run is appended to the history either way.
    pub async fn evaluate_batch(
        &self,
        jobs: &[JobPosting],
        profile: &UserProfile,
        deadline: Option<Duration>,
    ) -> BatchReport {
        let run_id = Uuid::new_v4();
        let workers = self.config.workers.max(1);
        let deadline = deadline.map(|d| Instant::now() + d);

        info!(
            "Evaluating batch {} ({} jobs, {} workers)",
            run_id,
            jobs.len(),
            workers
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let profile = Arc::new(profile.clone());

        let handles: Vec<(usize, String, JoinHandle<Result<EvaluationResult, JobFailure>>)> = jobs
            .iter()
            .enumerate()
            .map(|(index, job)| {
                let worker = Worker {
                    scorer: self.scorer.clone(),
                    validator: self.validator.clone(),
                    router: self.router.clone(),
                };
                let semaphore = semaphore.clone();
                let profile = profile.clone();
                let job = job.clone();
                let job_id = job.id.clone();
                let handle = tokio::spawn(async move {
                    // The semaphore is never closed.
                    let _permit = semaphore.acquire_owned().await.ok();
                    worker.evaluate(index, &job, &profile).await
                });
                (index, job_id, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(jobs.len());
        let mut failures = Vec::new();
        let mut timed_out = Vec::new();

        for (index, job_id, mut handle) in handles {
            let joined = match deadline {
                Some(at) => match timeout_at(at, &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        handle.abort();
                        warn!("Job {} (#{}) timed out", job_id, index);
                        timed_out.push(job_id);
                        continue;
                    }
                },
                None => handle.await,
            };

            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(failure)) => {
                    warn!(
                        "Job {} (#{}) failed in {:?}: {}",
                        failure.job_id, failure.index, failure.phase, failure.cause
                    );
                    failures.push(failure);
                }
                Err(e) => {
                    error!("Job {} (#{}) task error: {}", job_id, index, e);
                    let cause = if e.is_panic() {
                        "worker panicked".to_string()
                    } else {
                        e.to_string()
                    };
                    failures.push(JobFailure {
                        job_id,
                        index,
                        phase: None,
                        cause,
                    });
                }
            }
        }

        // `sort_by` is stable, so ties stay in submission order.
        results.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal));

        info!(
            "Batch {} done: {} ranked, {} failed, {} timed out",
            run_id,
            results.len(),
            failures.len(),
            timed_out.len()
        );

        self.lock_history().append(EvaluationRun {
            run_id,
            completed_at: Utc::now(),
            results: results.clone(),
        });

        BatchReport {
            run_id,
            results,
            failures,
            timed_out,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-job flow
// ────────────────────────────────────────────────────────────────────────────

/// What one spawned task needs. Cheap to clone.
#[derive(Clone)]
struct Worker {
    scorer: Arc<dyn FitScorer>,
    validator: Arc<dyn JobValidator>,
    router: Arc<ModelRouter>,
}

/// Phase bookkeeping for a single job.
struct JobRun<'a> {
    index: usize,
    job: &'a JobPosting,
    tracker: PhaseTracker,
}

impl JobRun<'_> {
    fn advance(&mut self, event: PhaseEvent) -> Result<JobPhase, JobFailure> {
        match self.tracker.apply(event) {
            Ok(phase) => Ok(phase),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// The failure records the phase the job was in when it failed.
    fn fail(&self, cause: impl Display) -> JobFailure {
        JobFailure {
            job_id: self.job.id.clone(),
            index: self.index,
            phase: Some(self.tracker.phase()),
            cause: cause.to_string(),
        }
    }
}

impl Worker {
    async fn evaluate(
        &self,
        index: usize,
        job: &JobPosting,
        profile: &UserProfile,
    ) -> Result<EvaluationResult, JobFailure> {
        let mut run = JobRun {
            index,
            job,
            tracker: PhaseTracker::default(),
        };
        run.advance(PhaseEvent::Start)?;

        if let PrefilterVerdict::Reject(why) = prefilter(job) {
            run.advance(PhaseEvent::PrefilterFailed)?;
            debug!("Job {} rejected by pre-filter: {}", job.id, why);
            return Ok(EvaluationResult::prefiltered_out(&job.id, PREFILTER_REASON));
        }
        run.advance(PhaseEvent::PrefilterPassed)?;

        let breakdown = match self.scorer.score(job, profile).await {
            Ok(breakdown) => breakdown,
            Err(e) => return Err(run.fail(format!("{}: {}", e.code(), e))),
        };
        let score = unit(breakdown.composite);

        if run.advance(PhaseEvent::Scored(score))? == JobPhase::Analyzed {
            return Ok(EvaluationResult::analyzed(
                &job.id,
                score,
                describe(&breakdown),
            ));
        }

        let (decision, validation) = match self.validate(job, profile, score).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let e = validation_failure(&job.id, e);
                return Err(run.fail(format!("{}: {}", e.code(), e)));
            }
        };

        let outcome = self
            .router
            .commit_spend(&decision, validation.usage, Utc::now());
        if outcome.is_over_budget() {
            warn!(
                "Validation of job {} on {} pushed spend over budget",
                job.id, decision.model_id
            );
        }

        run.advance(PhaseEvent::ValidationPassed)?;
        Ok(EvaluationResult::validated(
            &job.id,
            score,
            validation.score,
            &decision.model_id,
            format!("{}; validated on {}", describe(&breakdown), decision.model_id),
        ))
    }

    /// Routes and runs the validation call. A transient failure gets one
    /// retry on the next cheaper model.
    async fn validate(
        &self,
        job: &JobPosting,
        profile: &UserProfile,
        analyzed_score: f64,
    ) -> Result<(RoutingDecision, Validation), ValidationError> {
        let task = TaskType::JobFiltering;
        let estimate = validation_estimate(job);
        let decision = self.router.route(task, estimate, false);

        match self
            .validator
            .validate(job, profile, analyzed_score, &decision)
            .await
        {
            Ok(validation) => Ok((decision, validation)),
            Err(e) if e.is_transient() => {
                let Some(next) = self.router.next_cheaper(task, &decision, estimate) else {
                    return Err(e);
                };
                warn!(
                    "Validation of job {} on {} failed ({}), retrying on {}",
                    job.id, decision.model_id, e, next.model_id
                );
                let validation = self
                    .validator
                    .validate(job, profile, analyzed_score, &next)
                    .await?;
                Ok((next, validation))
            }
            Err(e) => Err(e),
        }
    }
}

/// Failure causes are reported through the application error vocabulary.
fn validation_failure(job_id: &str, error: ValidationError) -> AppError {
    match error {
        ValidationError::Transient(cause) => AppError::ModelUnavailable(cause),
        ValidationError::Rejected(cause) => AppError::JobProcessing {
            job_id: job_id.to_string(),
            cause,
        },
    }
}

fn describe(breakdown: &ScoreBreakdown) -> String {
    format!(
        "skill {:.2}, budget {:.2}, category {:.2}",
        breakdown.skill_match, breakdown.budget_fit, breakdown.category_fit
    )
}
