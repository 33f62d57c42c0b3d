use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::budget::{BudgetLedger, BudgetStatus, SpendOutcome, TokenUsage};
use crate::config::{load_catalog, load_profile, Config};
use crate::errors::AppError;
use crate::models::{JobPosting, UserProfile};
use crate::pipeline::{
    BatchReport, EvaluationPipeline, JobValidator, PipelineConfig, SkillCoverageValidator,
};
use crate::proposals::{plan_proposals, ProposalPlan};
use crate::routing::{ModelCatalog, ModelRouter, RoutingDecision, TaskType, TokenEstimate};
use crate::scoring::{CompositeFitScorer, FitScorer};

/// Everything one triage session shares: the profile being served, the
/// spend ledger, the router over it and the pipeline using that router.
#[derive(Clone)]
pub struct TriageState {
    profile: Arc<UserProfile>,
    ledger: Arc<BudgetLedger>,
    router: Arc<ModelRouter>,
    pipeline: Arc<EvaluationPipeline>,
}

impl TriageState {
    /// Fails with a configuration error on an unusable profile.
    pub fn new(
        profile: UserProfile,
        catalog: ModelCatalog,
        ledger: Arc<BudgetLedger>,
        scorer: Arc<dyn FitScorer>,
        validator: Arc<dyn JobValidator>,
        pipeline_config: PipelineConfig,
    ) -> Result<Self, AppError> {
        profile.validate()?;
        let router = Arc::new(ModelRouter::new(catalog, ledger.clone()));
        let pipeline = Arc::new(EvaluationPipeline::new(
            scorer,
            validator,
            router.clone(),
            pipeline_config,
        ));
        Ok(Self {
            profile: Arc::new(profile),
            ledger,
            router,
            pipeline,
        })
    }

    /// Default scorer and validator, inputs read from the configured paths.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let profile = load_profile(&config.profile_path)?;
        let catalog = load_catalog(config.catalog_path.as_deref())?;
        let ledger = BudgetLedger::try_new(config.daily_limit, config.monthly_limit, Utc::now())?;

        Self::new(
            profile,
            catalog,
            Arc::new(ledger),
            Arc::new(CompositeFitScorer::default()),
            Arc::new(SkillCoverageValidator),
            PipelineConfig {
                workers: config.workers,
            },
        )
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub fn pipeline(&self) -> &EvaluationPipeline {
        &self.pipeline
    }

    pub async fn evaluate_batch(
        &self,
        jobs: &[JobPosting],
        deadline: Option<Duration>,
    ) -> BatchReport {
        self.ledger.roll_over(Utc::now());
        self.pipeline
            .evaluate_batch(jobs, &self.profile, deadline)
            .await
    }

    pub fn route_model(
        &self,
        task: TaskType,
        estimate: TokenEstimate,
        force_high_quality: bool,
    ) -> RoutingDecision {
        self.ledger.roll_over(Utc::now());
        self.router.route(task, estimate, force_high_quality)
    }

    pub fn budget_status(&self) -> BudgetStatus {
        self.ledger.status()
    }

    /// Records spend that didn't go through a routed model call.
    pub fn commit_spend(&self, amount: f64, timestamp: DateTime<Utc>) -> SpendOutcome {
        self.ledger.record_spend(amount, timestamp)
    }

    pub fn commit_model_spend(
        &self,
        decision: &RoutingDecision,
        usage: TokenUsage,
        timestamp: DateTime<Utc>,
    ) -> SpendOutcome {
        self.router.commit_spend(decision, usage, timestamp)
    }

    pub fn plan_proposals(
        &self,
        report: &BatchReport,
        jobs: &[JobPosting],
        max: usize,
        highend_threshold: usize,
    ) -> Vec<ProposalPlan> {
        plan_proposals(report, jobs, &self.router, max, highend_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetPeriod;
    use crate::models::{JobCategory, Skill, StageReached};
    use crate::routing::RoutingTier;
    use std::collections::HashSet;
    use std::io::Write;
    use std::path::PathBuf;

    fn make_profile() -> UserProfile {
        UserProfile {
            name: "Ada".to_string(),
            skills: vec![Skill::new("Rust", 0.9, 6)],
            hourly_rate: 40.0,
            preferred_categories: HashSet::from([JobCategory::WebDev]),
        }
    }

    fn make_state(daily: f64) -> TriageState {
        TriageState::new(
            make_profile(),
            ModelCatalog::default_catalog(),
            Arc::new(BudgetLedger::new(daily, 300.0, Utc::now())),
            Arc::new(CompositeFitScorer::default()),
            Arc::new(SkillCoverageValidator),
            PipelineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_profile_refused() {
        let mut profile = make_profile();
        profile.hourly_rate = -5.0;
        let result = TriageState::new(
            profile,
            ModelCatalog::default_catalog(),
            Arc::new(BudgetLedger::new(20.0, 300.0, Utc::now())),
            Arc::new(CompositeFitScorer::default()),
            Arc::new(SkillCoverageValidator),
            PipelineConfig::default(),
        );
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_commit_spend_reflected_in_status() {
        let state = make_state(20.0);
        let outcome = state.commit_spend(5.0, Utc::now());
        assert!(!outcome.is_over_budget());

        let status = state.budget_status();
        assert_eq!(status.daily.used, 5.0);
        assert_eq!(status.monthly.used, 5.0);
        assert!((status.available() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_overspend_warns_and_routes_locally() {
        let state = make_state(1.0);
        let outcome = state.commit_spend(1.5, Utc::now());
        assert!(outcome.is_over_budget());
        assert_eq!(outcome.warnings[0].period, BudgetPeriod::Daily);

        let decision = state.route_model(
            TaskType::ProposalGeneration,
            TokenEstimate::new(1_000, 500),
            true,
        );
        assert_eq!(decision.tier, RoutingTier::LocalFallback);
        assert_eq!(decision.estimated_cost, 0.0);
    }

    #[test]
    fn test_model_spend_goes_through_catalog_pricing() {
        let state = make_state(20.0);
        let estimate = TokenEstimate::new(1_000, 300);
        let decision = state.route_model(TaskType::JobFiltering, estimate, false);
        state.commit_model_spend(&decision, TokenUsage::new(1_000, 300), Utc::now());
        assert!(state.budget_status().daily.used > 0.0);
        assert_eq!(state.router().ledger().usage_stats()[&decision.model_id].calls, 1);
    }

    #[tokio::test]
    async fn test_evaluate_batch_uses_session_profile() {
        let state = make_state(20.0);
        let job: JobPosting = serde_json::from_value(serde_json::json!({
            "id": "rust-1",
            "title": "Rust CLI",
            "description": "Write a Rust command line tool that parses logs and prints a summary table",
            "budget": 600.0,
            "category": "WEB_DEV",
        }))
        .unwrap();

        let report = state.evaluate_batch(&[job], None).await;
        assert_eq!(report.results.len(), 1);
        assert_ne!(report.results[0].stage_reached(), StageReached::PrefilteredOut);
        assert!(state.pipeline().latest_result("rust-1").is_some());
    }

    #[test]
    fn test_from_config_rejects_missing_profile() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            profile_path: dir.path().join("nope.json"),
            jobs_path: PathBuf::from("jobs.json"),
            catalog_path: None,
            workers: 4,
            deadline: None,
            daily_limit: 20.0,
            monthly_limit: 300.0,
            highend_threshold: 100,
            max_proposals: 5,
            rust_log: "info".to_string(),
        };
        let err = TriageState::from_config(&config).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_from_config_applies_limits() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name":"Ada","skills":[],"hourly_rate":30}}"#).unwrap();
        let config = Config {
            profile_path: file.path().to_path_buf(),
            jobs_path: PathBuf::from("jobs.json"),
            catalog_path: None,
            workers: 2,
            deadline: None,
            daily_limit: 7.5,
            monthly_limit: 90.0,
            highend_threshold: 100,
            max_proposals: 5,
            rust_log: "info".to_string(),
        };
        let state = TriageState::from_config(&config).unwrap();
        let status = state.budget_status();
        assert_eq!(status.daily.limit, 7.5);
        assert_eq!(status.monthly.limit, 90.0);
        assert_eq!(state.pipeline().config().workers, 2);
    }

    #[test]
    fn test_from_config_rejects_bad_limits() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name":"Ada","skills":[],"hourly_rate":30}}"#).unwrap();
        for daily_limit in [-1.0, f64::NAN] {
            let config = Config {
                profile_path: file.path().to_path_buf(),
                jobs_path: PathBuf::from("jobs.json"),
                catalog_path: None,
                workers: 2,
                deadline: None,
                daily_limit,
                monthly_limit: 90.0,
                highend_threshold: 100,
                max_proposals: 5,
                rust_log: "info".to_string(),
            };
            let err = TriageState::from_config(&config).err().unwrap();
            assert!(err.is_fatal(), "daily limit {daily_limit}");
            assert!(err.to_string().contains("daily budget limit"));
        }
    }
}
