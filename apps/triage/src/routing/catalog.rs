//! Static model catalog and task profiles.
//!
//! The catalog is validated once at startup and never mutated afterwards;
//! picking up a new catalog means building a new `ModelRouter`.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Provider name of models that run on the local machine.
pub const LOCAL_PROVIDER: &str = "local";
const OLLAMA_PROVIDER: &str = "ollama";

// ────────────────────────────────────────────────────────────────────────────
// Descriptors
// ────────────────────────────────────────────────────────────────────────────

/// Relative speed of a model. Only matters for speed-sensitive tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSpeed {
    Fast,
    Medium,
    Slow,
}

impl ResponseSpeed {
    fn factor(self) -> f64 {
        match self {
            ResponseSpeed::Fast => 1.2,
            ResponseSpeed::Medium => 1.0,
            ResponseSpeed::Slow => 0.8,
        }
    }
}

/// Capability ratings, each 0.0 – 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub creative_writing: f64,
    pub technical_content: f64,
    pub communication: f64,
    pub reasoning: f64,
    pub data_analysis: f64,
}

impl Capabilities {
    pub const fn new(
        creative_writing: f64,
        technical_content: f64,
        communication: f64,
        reasoning: f64,
        data_analysis: f64,
    ) -> Self {
        Self {
            creative_writing,
            technical_content,
            communication,
            reasoning,
            data_analysis,
        }
    }

    fn as_array(&self) -> [f64; 5] {
        [
            self.creative_writing,
            self.technical_content,
            self.communication,
            self.reasoning,
            self.data_analysis,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub provider: String,
    pub cost_per_1k_tokens_input: f64,
    pub cost_per_1k_tokens_output: f64,
    pub token_limit: u64,
    /// Lower = cheaper/simpler. 0 is reserved for local models.
    pub priority_tier: u8,
    pub capabilities: Capabilities,
    pub response_speed: ResponseSpeed,
}

impl ModelDescriptor {
    pub fn estimated_cost(&self, estimate: TokenEstimate) -> f64 {
        estimate.input as f64 * self.cost_per_1k_tokens_input / 1000.0
            + estimate.output as f64 * self.cost_per_1k_tokens_output / 1000.0
    }

    pub fn is_local(&self) -> bool {
        self.provider == LOCAL_PROVIDER
            || self.provider == OLLAMA_PROVIDER
            || (self.cost_per_1k_tokens_input == 0.0 && self.cost_per_1k_tokens_output == 0.0)
    }

    pub fn fits(&self, estimate: TokenEstimate) -> bool {
        self.token_limit >= estimate.total()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub input: u64,
    pub output: u64,
}

impl TokenEstimate {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u64 {
        self.input.saturating_add(self.output)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tasks
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    JobFiltering,
    ProposalGeneration,
    ClientCommunication,
    ProjectPlanning,
    CostOptimization,
}

/// What a task needs from a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskProfile {
    pub requirements: Capabilities,
    pub min_acceptable_score: f64,
    pub prioritize_cost: bool,
    pub prioritize_speed: bool,
}

impl TaskType {
    pub fn profile(self) -> TaskProfile {
        match self {
            TaskType::JobFiltering => TaskProfile {
                requirements: Capabilities::new(0.1, 0.6, 0.2, 0.7, 0.5),
                min_acceptable_score: 0.6,
                prioritize_cost: true,
                prioritize_speed: true,
            },
            TaskType::ProposalGeneration => TaskProfile {
                requirements: Capabilities::new(0.9, 0.7, 0.9, 0.7, 0.3),
                min_acceptable_score: 0.8,
                prioritize_cost: false,
                prioritize_speed: false,
            },
            TaskType::ClientCommunication => TaskProfile {
                requirements: Capabilities::new(0.6, 0.4, 0.9, 0.7, 0.2),
                min_acceptable_score: 0.75,
                prioritize_cost: false,
                prioritize_speed: true,
            },
            TaskType::ProjectPlanning => TaskProfile {
                requirements: Capabilities::new(0.3, 0.7, 0.6, 0.9, 0.8),
                min_acceptable_score: 0.75,
                prioritize_cost: false,
                prioritize_speed: false,
            },
            TaskType::CostOptimization => TaskProfile {
                requirements: Capabilities::new(0.2, 0.6, 0.5, 0.8, 0.9),
                min_acceptable_score: 0.7,
                prioritize_cost: true,
                prioritize_speed: false,
            },
        }
    }
}

/// Suitability of a model for a task, in [0, 1].
///
/// Requirement-weighted capability average, scaled down for expensive
/// models on cost-sensitive tasks and adjusted by speed on latency-sensitive
/// ones.
pub fn model_fitness(model: &ModelDescriptor, task: &TaskProfile) -> f64 {
    let weights = task.requirements.as_array();
    let ratings = model.capabilities.as_array();
    let total_weight: f64 = weights.iter().sum();
    let capability = if total_weight > 0.0 {
        weights.iter().zip(ratings).map(|(w, r)| w * r).sum::<f64>() / total_weight
    } else {
        0.0
    };

    let cost_factor = if task.prioritize_cost {
        (1.0 - (model.cost_per_1k_tokens_output * 3.0) / 0.1).max(0.5)
    } else {
        1.0
    };
    let speed_factor = if task.prioritize_speed {
        model.response_speed.factor()
    } else {
        1.0
    };

    (capability * cost_factor * speed_factor).clamp(0.0, 1.0)
}

// ────────────────────────────────────────────────────────────────────────────
// Catalog
// ────────────────────────────────────────────────────────────────────────────

/// Validated, read-only model list.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self, AppError> {
        if models.is_empty() {
            return Err(AppError::Configuration("model catalog is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model.id.as_str()) {
                return Err(AppError::Configuration(format!(
                    "duplicate model id '{}' in catalog",
                    model.id
                )));
            }
            let costs = [model.cost_per_1k_tokens_input, model.cost_per_1k_tokens_output];
            if costs.iter().any(|c| !c.is_finite() || *c < 0.0) {
                return Err(AppError::Configuration(format!(
                    "model '{}' has an invalid cost",
                    model.id
                )));
            }
            if model.token_limit == 0 {
                return Err(AppError::Configuration(format!(
                    "model '{}' has a zero token limit",
                    model.id
                )));
            }
            if model
                .capabilities
                .as_array()
                .iter()
                .any(|c| !(0.0..=1.0).contains(c))
            {
                return Err(AppError::Configuration(format!(
                    "model '{}' has a capability rating outside 0..=1",
                    model.id
                )));
            }
        }

        Ok(Self { models })
    }

    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let models: Vec<ModelDescriptor> = serde_json::from_str(json)
            .map_err(|e| AppError::Configuration(format!("model catalog is not valid JSON: {e}")))?;
        Self::new(models)
    }

    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("cannot read model catalog {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Models that bill per token.
    pub fn remote_models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter().filter(|m| !m.is_local())
    }

    /// The first local model, if the catalog carries one.
    pub fn local_model(&self) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.is_local())
    }

    /// Hosted providers plus a local Llama 3.
    pub fn default_catalog() -> Self {
        Self {
            models: default_models(),
        }
    }
}

fn model(
    id: &str,
    provider: &str,
    cost: (f64, f64),
    token_limit: u64,
    priority_tier: u8,
    capabilities: Capabilities,
    response_speed: ResponseSpeed,
) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        provider: provider.to_string(),
        cost_per_1k_tokens_input: cost.0,
        cost_per_1k_tokens_output: cost.1,
        token_limit,
        priority_tier,
        capabilities,
        response_speed,
    }
}

#[rustfmt::skip]
fn default_models() -> Vec<ModelDescriptor> {
    use ResponseSpeed::{Fast, Medium, Slow};
    vec![
        model("gpt-4o", "openai", (0.01, 0.03), 128_000, 3,
            Capabilities::new(0.95, 0.92, 0.94, 0.93, 0.88), Medium),
        model("gpt-3.5-turbo", "openai", (0.0005, 0.0015), 16_000, 1,
            Capabilities::new(0.82, 0.75, 0.85, 0.70, 0.65), Fast),
        model("gemini-1.5-pro", "google", (0.0025, 0.0075), 1_000_000, 2,
            Capabilities::new(0.88, 0.89, 0.86, 0.90, 0.85), Medium),
        model("gemini-1.5-flash", "google", (0.0005, 0.0015), 1_000_000, 1,
            Capabilities::new(0.82, 0.78, 0.80, 0.75, 0.70), Fast),
        model("claude-3-opus", "anthropic", (0.015, 0.075), 200_000, 3,
            Capabilities::new(0.91, 0.93, 0.94, 0.95, 0.88), Slow),
        model("claude-3-sonnet", "anthropic", (0.003, 0.015), 200_000, 2,
            Capabilities::new(0.90, 0.88, 0.92, 0.89, 0.83), Medium),
        model("claude-3-haiku", "anthropic", (0.00025, 0.00125), 200_000, 1,
            Capabilities::new(0.85, 0.80, 0.87, 0.78, 0.72), Fast),
        model("mistral-large", "mistral", (0.002, 0.006), 32_000, 2,
            Capabilities::new(0.87, 0.89, 0.86, 0.88, 0.82), Medium),
        model("mistral-small", "mistral", (0.0002, 0.0006), 32_000, 1,
            Capabilities::new(0.75, 0.78, 0.76, 0.74, 0.68), Fast),
        model("local-llama3", OLLAMA_PROVIDER, (0.0, 0.0), 8_000, 0,
            Capabilities::new(0.65, 0.70, 0.60, 0.62, 0.55), Slow),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_passes_validation() {
        let catalog = ModelCatalog::default_catalog();
        assert!(ModelCatalog::new(catalog.models().to_vec()).is_ok());
        assert_eq!(catalog.models().len(), 10);
    }

    #[test]
    fn test_default_catalog_has_one_local_model() {
        let catalog = ModelCatalog::default_catalog();
        let local = catalog.local_model().unwrap();
        assert_eq!(local.id, "local-llama3");
        assert_eq!(local.token_limit, 8_000);
        assert_eq!(catalog.remote_models().count(), 9);
    }

    #[test]
    fn test_estimated_cost_per_thousand_tokens() {
        let catalog = ModelCatalog::default_catalog();
        let gpt4o = catalog.get("gpt-4o").unwrap();
        // 500 * 0.01 / 1000 + 1500 * 0.03 / 1000 = 0.005 + 0.045
        let cost = gpt4o.estimated_cost(TokenEstimate::new(500, 1500));
        assert!((cost - 0.05).abs() < 1e-12, "Cost was {cost}");
    }

    #[test]
    fn test_empty_catalog_is_configuration_error() {
        let err = ModelCatalog::new(vec![]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut models = default_models();
        models.push(models[0].clone());
        assert!(ModelCatalog::new(models).is_err());
    }

    #[test]
    fn test_negative_cost_rejected() {
        let mut models = default_models();
        models[0].cost_per_1k_tokens_input = -0.01;
        assert!(ModelCatalog::new(models).is_err());
    }

    #[test]
    fn test_zero_token_limit_rejected() {
        let mut models = default_models();
        models[1].token_limit = 0;
        assert!(ModelCatalog::new(models).is_err());
    }

    #[test]
    fn test_from_json_round_trips_default_catalog() {
        let json = serde_json::to_string(ModelCatalog::default_catalog().models()).unwrap();
        let catalog = ModelCatalog::from_json(&json).unwrap();
        assert!(catalog.get("claude-3-haiku").is_some());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = ModelCatalog::from_json("{not json").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_fitness_is_bounded_for_every_task() {
        let catalog = ModelCatalog::default_catalog();
        let tasks = [
            TaskType::JobFiltering,
            TaskType::ProposalGeneration,
            TaskType::ClientCommunication,
            TaskType::ProjectPlanning,
            TaskType::CostOptimization,
        ];
        for task in tasks {
            for model in catalog.models() {
                let fitness = model_fitness(model, &task.profile());
                assert!((0.0..=1.0).contains(&fitness), "{} {:?}", model.id, task);
            }
        }
    }

    #[test]
    fn test_cost_priority_penalizes_expensive_models() {
        let catalog = ModelCatalog::default_catalog();
        let task = TaskType::JobFiltering.profile();
        let opus = model_fitness(catalog.get("claude-3-opus").unwrap(), &task);
        let haiku = model_fitness(catalog.get("claude-3-haiku").unwrap(), &task);
        assert!(haiku > opus, "haiku {haiku} should beat opus {opus}");
    }

    #[test]
    fn test_task_type_serde() {
        let task: TaskType = serde_json::from_str(r#""PROPOSAL_GENERATION""#).unwrap();
        assert_eq!(task, TaskType::ProposalGeneration);
    }
}
