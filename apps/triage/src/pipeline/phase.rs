//! Per-job phase state machine.
//!
//! ```text
//! NotStarted → PreFiltering ─┬→ Rejected
//!                            └→ Analyzing ─┬→ Analyzed          (score ≤ 0.7)
//!                                          └→ Validating → Validated
//! any non-terminal phase ── Fail ──→ Failed
//! ```
//!
//! `transition` is the whole table. Anything not listed there is a bug in
//! the caller and comes back as a `PhaseError`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Analyzed scores strictly above this enter validation.
pub const VALIDATION_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    NotStarted,
    PreFiltering,
    Rejected,
    Analyzing,
    Analyzed,
    Validating,
    Validated,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobPhase::Rejected | JobPhase::Analyzed | JobPhase::Validated | JobPhase::Failed
        )
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobPhase::NotStarted => "not_started",
            JobPhase::PreFiltering => "pre_filtering",
            JobPhase::Rejected => "rejected",
            JobPhase::Analyzing => "analyzing",
            JobPhase::Analyzed => "analyzed",
            JobPhase::Validating => "validating",
            JobPhase::Validated => "validated",
            JobPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseEvent {
    Start,
    PrefilterPassed,
    PrefilterFailed,
    Scored(f64),
    ValidationPassed,
    Fail,
}

#[derive(Debug, Error, PartialEq)]
#[error("illegal transition from {from} on {event:?}")]
pub struct PhaseError {
    pub from: JobPhase,
    pub event: PhaseEvent,
}

pub fn transition(from: JobPhase, event: PhaseEvent) -> Result<JobPhase, PhaseError> {
    use JobPhase::*;

    let next = match (from, event) {
        (NotStarted, PhaseEvent::Start) => PreFiltering,
        (PreFiltering, PhaseEvent::PrefilterPassed) => Analyzing,
        (PreFiltering, PhaseEvent::PrefilterFailed) => Rejected,
        (Analyzing, PhaseEvent::Scored(score)) if score > VALIDATION_THRESHOLD => Validating,
        (Analyzing, PhaseEvent::Scored(_)) => Analyzed,
        (Validating, PhaseEvent::ValidationPassed) => Validated,
        (phase, PhaseEvent::Fail) if !phase.is_terminal() => Failed,
        _ => return Err(PhaseError { from, event }),
    };
    Ok(next)
}

/// Tracks one job's phase, applying events through `transition`.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase: JobPhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            phase: JobPhase::NotStarted,
        }
    }
}

impl PhaseTracker {
    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn apply(&mut self, event: PhaseEvent) -> Result<JobPhase, PhaseError> {
        self.phase = transition(self.phase, event)?;
        Ok(self.phase)
    }
}
