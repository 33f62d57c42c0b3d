use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Furthest pipeline stage a job reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageReached {
    PrefilteredOut,
    Analyzed,
    Validated,
}

/// Outcome of one job in one pipeline run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    job_id: String,
    score: f64,
    stage_reached: StageReached,
    reason: String,
    timestamp: DateTime<Utc>,
    /// Score produced by the Analyze phase, before any validation adjustment.
    analyzed_score: Option<f64>,
    /// Model the validation re-check ran on.
    validation_model: Option<String>,
}

impl EvaluationResult {
    pub fn prefiltered_out(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            score: 0.0,
            stage_reached: StageReached::PrefilteredOut,
            reason: reason.into(),
            timestamp: Utc::now(),
            analyzed_score: None,
            validation_model: None,
        }
    }

    pub fn analyzed(job_id: impl Into<String>, score: f64, reason: impl Into<String>) -> Self {
        let score = clamp_unit(score);
        Self {
            job_id: job_id.into(),
            score,
            stage_reached: StageReached::Analyzed,
            reason: reason.into(),
            timestamp: Utc::now(),
            analyzed_score: Some(score),
            validation_model: None,
        }
    }

    pub fn validated(
        job_id: impl Into<String>,
        analyzed_score: f64,
        validated_score: f64,
        model_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            score: clamp_unit(validated_score),
            stage_reached: StageReached::Validated,
            reason: reason.into(),
            timestamp: Utc::now(),
            analyzed_score: Some(clamp_unit(analyzed_score)),
            validation_model: Some(model_id.into()),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn stage_reached(&self) -> StageReached {
        self.stage_reached
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn analyzed_score(&self) -> Option<f64> {
        self.analyzed_score
    }

    pub fn validation_model(&self) -> Option<&str> {
        self.validation_model.as_deref()
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Results of a single `evaluate_batch` call, as kept in history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub run_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub results: Vec<EvaluationResult>,
}

/// Append-only log of pipeline runs. Entries are never rewritten.
#[derive(Debug, Clone, Default)]
pub struct EvaluationHistory {
    runs: Vec<EvaluationRun>,
}

impl EvaluationHistory {
    pub fn append(&mut self, run: EvaluationRun) {
        self.runs.push(run);
    }

    pub fn runs(&self) -> &[EvaluationRun] {
        &self.runs
    }

    /// Most recent result recorded for a job across all runs.
    pub fn latest_for(&self, job_id: &str) -> Option<&EvaluationResult> {
        self.runs
            .iter()
            .rev()
            .find_map(|run| run.results.iter().find(|r| r.job_id == job_id))
    }
}
