pub mod evaluation;
pub mod job;
pub mod profile;

pub use evaluation::{EvaluationHistory, EvaluationResult, EvaluationRun, StageReached};
pub use job::{JobCategory, JobPosting, JobStatus, Skill};
pub use profile::UserProfile;
