use thiserror::Error;

/// Application-level error type.
///
/// Only `Configuration` is fatal. Everything else is contained by the layer
/// that raises it: input problems degrade a score term, model outages are
/// absorbed by the router, and job failures stay with their job.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Job {job_id} failed: {cause}")]
    JobProcessing { job_id: String, cause: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code, used in logs and batch reports.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Input(_) => "INPUT_ERROR",
            AppError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            AppError::JobProcessing { .. } => "JOB_PROCESSING_FAILURE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the process must refuse to start work.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_errors_are_fatal() {
        assert!(AppError::Configuration("missing catalog".to_string()).is_fatal());
        assert!(!AppError::Input("empty description".to_string()).is_fatal());
        assert!(!AppError::ModelUnavailable("gpt-4o".to_string()).is_fatal());
        assert!(!AppError::JobProcessing {
            job_id: "j1".to_string(),
            cause: "boom".to_string(),
        }
        .is_fatal());
    }

    #[test]
    fn test_job_processing_message_carries_job_id() {
        let err = AppError::JobProcessing {
            job_id: "job-42".to_string(),
            cause: "scorer crashed".to_string(),
        };
        assert_eq!(err.to_string(), "Job job-42 failed: scorer crashed");
        assert_eq!(err.code(), "JOB_PROCESSING_FAILURE");
    }

    #[test]
    fn test_anyhow_converts_to_internal() {
        let err: AppError = anyhow::anyhow!("disk on fire").into();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
