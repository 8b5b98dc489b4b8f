//! Agent trait and registry
//!
//! Agents are the data-producing collaborators the scheduler invokes. Each
//! one is keyed by a fixed `AgentType`; a missing registration is a typed
//! configuration error, not a panic.

use crate::audit::AuditRecorder;
use crate::config::OrchestratorConfig;
use crate::data::MarketDataSource;
use crate::error::OrchestrationError;
use crate::models::{AgentType, RequestContext, Task};
use crate::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub mod market_research;
pub mod portfolio;
pub mod risk;
pub mod sentiment;

pub use market_research::MarketResearchAgent;
pub use portfolio::PortfolioConstructionAgent;
pub use risk::RiskAssessmentAgent;
pub use sentiment::SentimentAnalysisAgent;

/// Uniform worker contract
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;
    fn agent_type(&self) -> AgentType;

    /// Produce a result mapping for `task`. Audit entries the agent records
    /// are appended to `task.audit_trail`.
    async fn process(&self, task: &mut Task, context: &RequestContext) -> Result<Value>;
}

/// Registry for looking up agents by type
pub struct AgentRegistry {
    agents: HashMap<AgentType, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Register an agent, replacing any previous one of the same type
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        tracing::info!(
            agent = agent.name(),
            agent_type = %agent.agent_type(),
            "Registered agent"
        );
        self.agents.insert(agent.agent_type(), agent);
    }

    pub fn get(&self, agent_type: AgentType) -> Result<Arc<dyn Agent>> {
        self.agents.get(&agent_type).cloned().ok_or_else(|| {
            OrchestrationError::ConfigurationError(format!(
                "No agent registered for type {}",
                agent_type
            ))
        })
    }

    pub fn list(&self) -> Vec<AgentType> {
        let mut types: Vec<AgentType> = self.agents.keys().copied().collect();
        types.sort();
        types
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Record an agent lifecycle entry and keep it on the task's own trail.
pub(crate) fn audit_task(
    audit: &AuditRecorder,
    task: &mut Task,
    action: &str,
    agent: &str,
    context: &RequestContext,
    details: Value,
) {
    let entry = audit.record(action, agent, context, details);
    task.audit_trail.push(entry);
}

/// Run an agent body between STARTED and COMPLETED/FAILED audit entries.
pub(crate) async fn audited<F>(
    audit: &AuditRecorder,
    task: &mut Task,
    context: &RequestContext,
    agent: &str,
    prefix: &str,
    started: Value,
    body: F,
) -> Result<Value>
where
    F: std::future::Future<Output = Result<(Value, Value)>>,
{
    audit_task(audit, task, &format!("{}_STARTED", prefix), agent, context, started);

    match body.await {
        Ok((result, completed)) => {
            audit_task(
                audit,
                task,
                &format!("{}_COMPLETED", prefix),
                agent,
                context,
                completed,
            );
            Ok(result)
        }
        Err(e) => {
            tracing::error!(agent, task_id = %task.task_id, error = %e, "Agent processing failed");
            audit_task(
                audit,
                task,
                &format!("{}_FAILED", prefix),
                agent,
                context,
                json!({ "task_id": task.task_id, "error": e.to_string() }),
            );
            Err(e)
        }
    }
}

/// Registry with the four standard agents sharing one audit recorder and data source.
pub fn create_default_registry(
    config: &OrchestratorConfig,
    audit: Arc<AuditRecorder>,
    data: Arc<dyn MarketDataSource>,
) -> AgentRegistry {
    let mut registry = AgentRegistry::new();

    registry.register(Arc::new(MarketResearchAgent::new(audit.clone(), data.clone())));
    registry.register(Arc::new(SentimentAnalysisAgent::new(audit.clone(), data.clone())));
    registry.register(Arc::new(RiskAssessmentAgent::new(
        audit.clone(),
        data,
        config.risk_free_rate,
    )));
    registry.register(Arc::new(PortfolioConstructionAgent::new(audit, config)));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedAgent(AgentType);

    #[async_trait::async_trait]
    impl Agent for NamedAgent {
        fn name(&self) -> &'static str {
            "NamedAgent"
        }

        fn agent_type(&self) -> AgentType {
            self.0
        }

        async fn process(&self, _task: &mut Task, _context: &RequestContext) -> Result<Value> {
            Ok(json!({}))
        }
    }

    #[test]
    fn test_lookup_and_missing_registration() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(NamedAgent(AgentType::RiskAssessment)));

        assert!(registry.get(AgentType::RiskAssessment).is_ok());
        assert!(matches!(
            registry.get(AgentType::MarketResearch),
            Err(OrchestrationError::ConfigurationError(_))
        ));
        assert_eq!(registry.list(), vec![AgentType::RiskAssessment]);
    }

    #[test]
    fn test_default_registry_covers_every_type() {
        let config = OrchestratorConfig::default();
        let audit = Arc::new(AuditRecorder::in_memory());
        let data: Arc<dyn MarketDataSource> =
            Arc::new(crate::data::SimulatedMarketData::new(config.optimizer_seed));
        let registry = create_default_registry(&config, audit, data);

        assert_eq!(
            registry.list(),
            vec![
                AgentType::MarketResearch,
                AgentType::SentimentAnalysis,
                AgentType::RiskAssessment,
                AgentType::PortfolioConstruction,
            ]
        );
    }
}
