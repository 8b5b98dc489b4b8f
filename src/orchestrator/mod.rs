//! Request orchestrator
//!
//! VALIDATE → DECOMPOSE → SCHEDULE → (ABORT ON INFEASIBLE) → SYNTHESIZE
//!
//! One `process_request` call owns its task tree; nothing is shared between
//! in-flight requests except the audit recorder and the read-only universe.

use crate::agents::{create_default_registry, AgentRegistry};
use crate::audit::AuditRecorder;
use crate::config::{OrchestratorConfig, ReviewPolicy};
use crate::data::MarketDataSource;
use crate::error::OrchestrationError;
use crate::execution::Scheduler;
use crate::intake::{build_context, QueryOverrides};
use crate::models::{AuditEntry, Recommendation, RequestContext, Task};
use crate::planner::{TaskGraphBuilder, TaskPlanner};
use crate::synthesis::Synthesizer;
use crate::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

const COMPONENT: &str = "orchestrator";

pub struct Orchestrator {
    audit: Arc<AuditRecorder>,
    registry: AgentRegistry,
    planner: Box<dyn TaskPlanner>,
    scheduler: Scheduler,
    synthesizer: Synthesizer,
}

impl Orchestrator {
    /// Orchestrator with the four standard agents over `data`
    pub fn new(
        config: &OrchestratorConfig,
        audit: Arc<AuditRecorder>,
        data: Arc<dyn MarketDataSource>,
    ) -> Self {
        let registry = create_default_registry(config, audit.clone(), data);
        Self::with_registry(registry, audit, config.review.clone())
    }

    pub fn with_registry(
        registry: AgentRegistry,
        audit: Arc<AuditRecorder>,
        policy: ReviewPolicy,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(audit.clone()),
            synthesizer: Synthesizer::with_default_rules(policy),
            planner: Box::new(TaskGraphBuilder),
            registry,
            audit,
        }
    }

    pub fn audit(&self) -> &Arc<AuditRecorder> {
        &self.audit
    }

    /// Build the context from `query` and `overrides`, then process it
    pub async fn process_query(
        &self,
        query: &str,
        overrides: &QueryOverrides,
    ) -> Result<Recommendation> {
        let context = build_context(query, overrides);
        self.process_request(query, context).await
    }

    pub async fn process_request(
        &self,
        query: &str,
        context: RequestContext,
    ) -> Result<Recommendation> {
        let started = Instant::now();

        if let Err(e) = context.validate() {
            warn!(request_id = %context.request_id, error = %e, "Rejected invalid request");
            self.fail(&context, "validation", &e);
            return Err(e);
        }

        info!(
            request_id = %context.request_id,
            user_id = %context.user_id,
            risk_tolerance = %context.risk_tolerance,
            capital = context.capital_available,
            "Processing investment request"
        );

        let initiated = self.audit.record(
            "REQUEST_INITIATED",
            COMPONENT,
            &context,
            json!({
                "query": query,
                "risk_tolerance": context.risk_tolerance,
                "capital_available": context.capital_available,
            }),
        );

        let mut tasks = self.planner.decompose(query, &context);

        let results = match self
            .scheduler
            .execute(&mut tasks, &self.registry, &context)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                self.fail(&context, "scheduling", &e);
                return Err(e);
            }
        };

        if let Some(err) = infeasible(&tasks) {
            self.fail(&context, "portfolio_construction", &err);
            return Err(err);
        }

        let audit_trail: Vec<AuditEntry> = std::iter::once(initiated)
            .chain(tasks.iter().flat_map(|t| t.audit_trail.iter().cloned()))
            .collect();

        let recommendation = self.synthesizer.synthesize(&results, &context, audit_trail);

        self.audit.record(
            "REQUEST_COMPLETED",
            COMPONENT,
            &context,
            json!({
                "recommendation_id": recommendation.recommendation_id,
                "confidence_score": recommendation.confidence_score,
                "human_review_required": recommendation.human_review_required,
                "assets": recommendation.portfolio.len(),
                "duration_ms": started.elapsed().as_millis() as u64,
            }),
        );
        if let Err(e) = self.audit.flush() {
            warn!(error = %e, "Failed to flush audit sink");
        }

        info!(
            request_id = %context.request_id,
            recommendation_id = %recommendation.recommendation_id,
            duration_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );

        Ok(recommendation)
    }

    fn fail(&self, context: &RequestContext, stage: &str, err: &OrchestrationError) {
        error!(
            request_id = %context.request_id,
            stage,
            error = %err,
            "Request failed"
        );
        self.audit.record(
            "REQUEST_FAILED",
            COMPONENT,
            context,
            json!({ "stage": stage, "error": err.to_string() }),
        );
        if let Err(e) = self.audit.flush() {
            warn!(error = %e, "Failed to flush audit sink");
        }
    }
}

/// An infeasible optimization anywhere in the tree aborts the request
fn infeasible(tasks: &[Task]) -> Option<OrchestrationError> {
    tasks
        .iter()
        .filter_map(|t| t.error.as_ref())
        .find(|e| e.infeasible)
        .map(|e| {
            warn!(reason = %e.message, "Optimization infeasible");
            OrchestrationError::OptimizationInfeasible("no assets matching criteria".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::FixtureMarketData;
    use crate::models::RiskTolerance;
    use crate::synthesis::US_DISCLAIMER;

    fn orchestrator(data: FixtureMarketData) -> Orchestrator {
        Orchestrator::new(
            &OrchestratorConfig::default(),
            Arc::new(AuditRecorder::in_memory()),
            Arc::new(data),
        )
    }

    fn actions(entries: &[AuditEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.action.as_str()).collect()
    }

    #[tokio::test]
    async fn test_moderate_request_end_to_end() {
        let orchestrator = orchestrator(FixtureMarketData::rising());
        let ctx = RequestContext::new("e2e", RiskTolerance::Moderate, "5 years", 30_000.0);
        let request_id = ctx.request_id;

        let rec = orchestrator
            .process_request("Build me a diversified portfolio", ctx)
            .await
            .unwrap();

        assert!((rec.confidence_score - 0.95).abs() < 1e-12);
        assert!(!rec.human_review_required);
        assert!((rec.portfolio.values().sum::<f64>() - 1.0).abs() < 1e-6);
        assert!(rec.portfolio.values().all(|w| *w <= 0.25 + 1e-6));
        assert_eq!(rec.reasoning.len(), 3);
        assert!(rec.reasoning[0].contains("bullish"));
        assert!(rec.data_sources.contains(&"Technical Analysis".to_string()));
        assert!(rec.warnings.contains(&US_DISCLAIMER.to_string()));

        assert_eq!(rec.audit_trail[0].action, "REQUEST_INITIATED");
        assert!(rec.audit_trail.iter().all(|e| e.request_id == request_id));

        let logged = orchestrator.audit().entries_for_request(request_id);
        assert_eq!(logged.first().unwrap().action, "REQUEST_INITIATED");
        assert_eq!(logged.last().unwrap().action, "REQUEST_COMPLETED");
        assert_eq!(logged.len(), rec.audit_trail.len() + 1);
    }

    #[tokio::test]
    async fn test_aggressive_request_needs_review() {
        let orchestrator = orchestrator(FixtureMarketData::rising());
        let overrides = QueryOverrides {
            risk_tolerance: Some(RiskTolerance::Aggressive),
            ..Default::default()
        };

        let rec = orchestrator
            .process_query("I want to invest $40,000 for growth", &overrides)
            .await
            .unwrap();

        assert_eq!(rec.context.capital_available, 40_000.0);
        assert!(rec.human_review_required);
        assert!(!rec.portfolio.is_empty());
    }

    #[tokio::test]
    async fn test_beta_query_uses_screened_band() {
        let orchestrator = orchestrator(FixtureMarketData::rising());
        let query = "I have $30,000 to invest in highly liquid vehicles with betas ranging from 0.4 to 0.8.";

        let rec = orchestrator
            .process_query(query, &QueryOverrides::default())
            .await
            .unwrap();

        for symbol in rec.portfolio.keys() {
            let asset = crate::optimizer::ASSET_UNIVERSE
                .iter()
                .find(|a| &a.symbol == symbol)
                .unwrap();
            assert!(asset.beta >= 0.4 && asset.beta <= 0.8, "{} outside band", symbol);
        }
    }

    #[tokio::test]
    async fn test_infeasible_screen_aborts_request() {
        let orchestrator = orchestrator(FixtureMarketData::rising());
        let ctx = RequestContext::new("e2e", RiskTolerance::Moderate, "5 years", 30_000.0)
            .with_beta_range(3.0, 4.0);
        let request_id = ctx.request_id;

        let err = orchestrator.process_request("anything", ctx).await.unwrap_err();

        assert!(err.is_infeasible());
        assert!(err.to_string().contains("no assets matching criteria"));
        let logged = orchestrator.audit().entries_for_request(request_id);
        assert_eq!(logged.last().unwrap().action, "REQUEST_FAILED");
        assert!(!actions(&logged).contains(&"REQUEST_COMPLETED"));
    }

    #[tokio::test]
    async fn test_invalid_context_runs_no_tasks() {
        let orchestrator = orchestrator(FixtureMarketData::rising());
        let ctx = RequestContext::new("e2e", RiskTolerance::Moderate, "5 years", 0.0);
        let request_id = ctx.request_id;

        let err = orchestrator.process_request("anything", ctx).await.unwrap_err();

        assert!(matches!(err, OrchestrationError::ValidationError(_)));
        assert_eq!(
            actions(&orchestrator.audit().entries_for_request(request_id)),
            vec!["REQUEST_FAILED"]
        );
    }

    #[tokio::test]
    async fn test_failed_market_research_blocks_dependents() {
        let data = FixtureMarketData {
            failing: ["SPY", "QQQ", "DIA"].iter().map(|s| s.to_string()).collect(),
            drift: 0.001,
        };
        let orchestrator = orchestrator(data);
        let ctx = RequestContext::new("e2e", RiskTolerance::Moderate, "5 years", 30_000.0);
        let request_id = ctx.request_id;

        let rec = orchestrator.process_request("anything", ctx).await.unwrap();

        // only sentiment completed
        assert!((rec.confidence_score - 0.65).abs() < 1e-12);
        assert!(rec.human_review_required);
        assert!(rec.portfolio.is_empty());
        assert_eq!(rec.reasoning.len(), 1);

        let entries = orchestrator.audit().entries_for_request(request_id);
        let logged = actions(&entries);
        assert!(logged.contains(&"MARKET_RESEARCH_FAILED"));
        assert!(logged.contains(&"TASK_FAILED"));
        assert_eq!(logged.iter().filter(|a| **a == "TASK_SKIPPED").count(), 2);
        assert!(!logged.contains(&"RISK_ASSESSMENT_STARTED"));
    }

    #[tokio::test]
    async fn test_missing_agent_is_fatal() {
        let audit = Arc::new(AuditRecorder::in_memory());
        let orchestrator =
            Orchestrator::with_registry(AgentRegistry::new(), audit, ReviewPolicy::default());
        let ctx = RequestContext::new("e2e", RiskTolerance::Moderate, "5 years", 30_000.0);

        let err = orchestrator.process_request("anything", ctx).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ConfigurationError(_)));
    }
}
