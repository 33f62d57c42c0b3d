//! Model router: picks a model tier for a generation task under the spend
//! budget.
//!
//! Policy, first match wins:
//! 1. Budget comfortable (`available ≥ 1.0`) or high quality forced: the
//!    best affordable model for the task by `(priority_tier, fitness)`.
//! 2. Otherwise the cheapest affordable tier-0/1 model, fitness 0.5.
//! 3. Otherwise the zero-cost local fallback, fitness 0.3.
//!
//! Routing never fails and never commits spend. Callers record spend through
//! `commit_spend` only after the downstream call succeeds.

pub mod catalog;

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::budget::{BudgetLedger, SpendOutcome, TokenUsage};

pub use catalog::{
    model_fitness, ModelCatalog, ModelDescriptor, TaskProfile, TaskType, TokenEstimate,
    LOCAL_PROVIDER,
};

/// Budget at or above which the router stops economizing.
pub const COMFORTABLE_BUDGET: f64 = 1.0;
/// Highest tier considered when the budget is tight.
pub const CHEAP_TIER_MAX: u8 = 1;
pub const BUDGET_CONSTRAINED_FITNESS: f64 = 0.5;
pub const LOCAL_FALLBACK_ID: &str = "local-fallback";
pub const LOCAL_FALLBACK_FITNESS: f64 = 0.3;
/// Context size assumed for the local fallback when the catalog has no local model.
pub const DEFAULT_LOCAL_TOKEN_LIMIT: u64 = 8_000;

/// Which branch of the policy produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingTier {
    Preferred,
    BudgetConstrained,
    LocalFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub model_id: String,
    pub provider: String,
    pub estimated_cost: f64,
    pub fitness: f64,
    pub token_limit: u64,
    pub tier: RoutingTier,
}

impl RoutingDecision {
    pub fn is_local_fallback(&self) -> bool {
        self.tier == RoutingTier::LocalFallback
    }
}

pub struct ModelRouter {
    catalog: ModelCatalog,
    ledger: Arc<BudgetLedger>,
}

impl ModelRouter {
    pub fn new(catalog: ModelCatalog, ledger: Arc<BudgetLedger>) -> Self {
        Self { catalog, ledger }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    /// Chooses a model for `task`. Always returns a usable decision.
    pub fn route(
        &self,
        task: TaskType,
        estimate: TokenEstimate,
        force_high_quality: bool,
    ) -> RoutingDecision {
        let available = self.ledger.available();
        let decision = self.route_with_available(task, estimate, force_high_quality, available);
        debug!(
            "Routed {:?} ({} tokens, available {:.4}) to {} [{:?}] est. cost {:.5}",
            task,
            estimate.total(),
            available,
            decision.model_id,
            decision.tier,
            decision.estimated_cost
        );
        decision
    }

    fn route_with_available(
        &self,
        task: TaskType,
        estimate: TokenEstimate,
        force_high_quality: bool,
        available: f64,
    ) -> RoutingDecision {
        if available >= COMFORTABLE_BUDGET || force_high_quality {
            if let Some(decision) = self.preferred(task, estimate, available) {
                return decision;
            }
        }
        if let Some(decision) = self.cheapest_affordable(estimate, available) {
            return decision;
        }
        self.local_fallback()
    }

    fn preferred(
        &self,
        task: TaskType,
        estimate: TokenEstimate,
        available: f64,
    ) -> Option<RoutingDecision> {
        let profile = task.profile();
        self.catalog
            .remote_models()
            .filter(|m| m.fits(estimate))
            .filter_map(|m| {
                let fitness = model_fitness(m, &profile);
                let cost = m.estimated_cost(estimate);
                (fitness >= profile.min_acceptable_score && cost <= available)
                    .then_some((m, fitness, cost))
            })
            .max_by(|(a, fa, _), (b, fb, _)| {
                a.priority_tier
                    .cmp(&b.priority_tier)
                    .then(fa.partial_cmp(fb).unwrap_or(Ordering::Equal))
                    // prefer the lexically smaller id on a full tie
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|(m, fitness, cost)| decision(m, cost, fitness, RoutingTier::Preferred))
    }

    fn cheapest_affordable(
        &self,
        estimate: TokenEstimate,
        available: f64,
    ) -> Option<RoutingDecision> {
        let mut cheap: Vec<(&ModelDescriptor, f64)> = self
            .catalog
            .remote_models()
            .filter(|m| m.priority_tier <= CHEAP_TIER_MAX && m.fits(estimate))
            .map(|m| (m, m.estimated_cost(estimate)))
            .collect();
        cheap.sort_by(|(a, ca), (b, cb)| {
            ca.partial_cmp(cb)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        cheap
            .into_iter()
            .find(|(_, cost)| *cost <= available)
            .map(|(m, cost)| {
                decision(m, cost, BUDGET_CONSTRAINED_FITNESS, RoutingTier::BudgetConstrained)
            })
    }

    pub fn local_fallback(&self) -> RoutingDecision {
        let token_limit = self
            .catalog
            .local_model()
            .map(|m| m.token_limit)
            .unwrap_or(DEFAULT_LOCAL_TOKEN_LIMIT);
        RoutingDecision {
            model_id: LOCAL_FALLBACK_ID.to_string(),
            provider: LOCAL_PROVIDER.to_string(),
            estimated_cost: 0.0,
            fitness: LOCAL_FALLBACK_FITNESS,
            token_limit,
            tier: RoutingTier::LocalFallback,
        }
    }

    /// Next step down the fallback chain after `current` failed: the most
    /// expensive affordable model strictly cheaper than `current`, then the
    /// local fallback, then nothing.
    pub fn next_cheaper(
        &self,
        task: TaskType,
        current: &RoutingDecision,
        estimate: TokenEstimate,
    ) -> Option<RoutingDecision> {
        if current.is_local_fallback() {
            return None;
        }
        let available = self.ledger.available();
        let profile = task.profile();

        let next = self
            .catalog
            .remote_models()
            .filter(|m| m.id != current.model_id && m.fits(estimate))
            .map(|m| (m, m.estimated_cost(estimate)))
            .filter(|(_, cost)| *cost < current.estimated_cost && *cost <= available)
            .max_by(|(a, ca), (b, cb)| {
                ca.partial_cmp(cb)
                    .unwrap_or(Ordering::Equal)
                    .then(a.priority_tier.cmp(&b.priority_tier))
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|(m, cost)| {
                let fitness = model_fitness(m, &profile);
                decision(m, cost, fitness, RoutingTier::BudgetConstrained)
            });

        Some(next.unwrap_or_else(|| self.local_fallback()))
    }

    /// Records the actual cost of a completed call. Prices `usage` from the
    /// catalog; models the catalog doesn't know are charged the routed estimate.
    pub fn commit_spend(
        &self,
        decision: &RoutingDecision,
        usage: TokenUsage,
        timestamp: DateTime<Utc>,
    ) -> SpendOutcome {
        let amount = if decision.is_local_fallback() {
            0.0
        } else {
            self.catalog
                .get(&decision.model_id)
                .map(|m| {
                    m.estimated_cost(TokenEstimate::new(usage.input_tokens, usage.output_tokens))
                })
                .unwrap_or(decision.estimated_cost)
        };
        self.ledger
            .record_model_spend(&decision.model_id, usage, amount, timestamp)
    }
}

fn decision(
    model: &ModelDescriptor,
    estimated_cost: f64,
    fitness: f64,
    tier: RoutingTier,
) -> RoutingDecision {
    RoutingDecision {
        model_id: model.id.clone(),
        provider: model.provider.clone(),
        estimated_cost,
        fitness,
        token_limit: model.token_limit,
        tier,
    }
}
