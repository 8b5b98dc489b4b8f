//! Core data models for the investment orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::OrchestrationError;
use crate::Result;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
    VeryAggressive,
}

impl RiskTolerance {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTolerance::Conservative => "conservative",
            RiskTolerance::Moderate => "moderate",
            RiskTolerance::Aggressive => "aggressive",
            RiskTolerance::VeryAggressive => "very_aggressive",
        }
    }
}

impl FromStr for RiskTolerance {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "conservative" => Ok(RiskTolerance::Conservative),
            "moderate" => Ok(RiskTolerance::Moderate),
            "aggressive" => Ok(RiskTolerance::Aggressive),
            "very_aggressive" => Ok(RiskTolerance::VeryAggressive),
            other => Err(OrchestrationError::ValidationError(format!(
                "Unknown risk tolerance '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    MarketResearch,
    SentimentAnalysis,
    RiskAssessment,
    PortfolioConstruction,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::MarketResearch => "market_research",
            AgentType::SentimentAnalysis => "sentiment_analysis",
            AgentType::RiskAssessment => "risk_assessment",
            AgentType::PortfolioConstruction => "portfolio_construction",
        }
    }
}

/// Declaration order is the scheduling order: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceFlag {
    HighRiskTransaction,
    ConcentrationRisk,
    RestrictedSecurity,
}

impl ComplianceFlag {
    /// Derive flags from the boolean hints carried in audit details.
    pub fn derive(details: &Value) -> Vec<ComplianceFlag> {
        let hint = |key: &str| details.get(key).and_then(Value::as_bool).unwrap_or(false);

        let mut flags = Vec::new();
        if hint("high_risk_detected") {
            flags.push(ComplianceFlag::HighRiskTransaction);
        }
        if hint("large_position_size") {
            flags.push(ComplianceFlag::ConcentrationRisk);
        }
        if hint("restricted_security") {
            flags.push(ComplianceFlag::RestrictedSecurity);
        }
        flags
    }
}

//
// ================= Audit =================
//

/// One immutable audit record. Serialises to the persisted JSON-lines format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub agent: String,
    pub user_id: String,
    pub request_id: Uuid,
    pub details: Value,
    pub compliance_flags: Vec<ComplianceFlag>,
}

impl AuditEntry {
    pub fn new(action: &str, agent: &str, context: &RequestContext, details: Value) -> Self {
        let compliance_flags = ComplianceFlag::derive(&details);
        Self {
            timestamp: Utc::now(),
            action: action.to_string(),
            agent: agent.to_string(),
            user_id: context.user_id.clone(),
            request_id: context.request_id,
            details,
            compliance_flags,
        }
    }
}

//
// ================= Request =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BetaRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub user_id: String,
    pub risk_tolerance: RiskTolerance,
    pub investment_horizon: String,
    pub capital_available: f64,
    pub investment_goals: Vec<String>,
    pub restrictions: BTreeSet<String>,
    pub jurisdiction: String,
    pub request_id: Uuid,
    #[serde(default)]
    pub beta_range: Option<BetaRange>,
    #[serde(default)]
    pub min_liquidity: Option<f64>,
}

impl RequestContext {
    pub fn new(
        user_id: impl Into<String>,
        risk_tolerance: RiskTolerance,
        investment_horizon: impl Into<String>,
        capital_available: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            risk_tolerance,
            investment_horizon: investment_horizon.into(),
            capital_available,
            investment_goals: Vec::new(),
            restrictions: BTreeSet::new(),
            jurisdiction: "US".to_string(),
            request_id: Uuid::new_v4(),
            beta_range: None,
            min_liquidity: None,
        }
    }

    pub fn with_goals(mut self, goals: Vec<String>) -> Self {
        self.investment_goals = goals;
        self
    }

    pub fn with_restrictions<I, S>(mut self, restrictions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restrictions = restrictions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_jurisdiction(mut self, jurisdiction: impl Into<String>) -> Self {
        self.jurisdiction = jurisdiction.into();
        self
    }

    /// The one post-construction mutation the context allows.
    pub fn with_beta_range(mut self, min: f64, max: f64) -> Self {
        self.beta_range = Some(BetaRange { min, max });
        self
    }

    pub fn with_min_liquidity(mut self, min_liquidity: f64) -> Self {
        self.min_liquidity = Some(min_liquidity);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.capital_available.is_finite() || self.capital_available <= 0.0 {
            return Err(OrchestrationError::ValidationError(format!(
                "capital_available must be positive, got {}",
                self.capital_available
            )));
        }

        if self.user_id.trim().is_empty() {
            return Err(OrchestrationError::ValidationError(
                "user_id must not be empty".to_string(),
            ));
        }

        if let Some(range) = self.beta_range {
            if !(range.min.is_finite() && range.max.is_finite()) || range.min > range.max {
                return Err(OrchestrationError::ValidationError(format!(
                    "invalid beta range {} to {}",
                    range.min, range.max
                )));
            }
        }

        if let Some(liquidity) = self.min_liquidity {
            if !(0.0..=1.0).contains(&liquidity) {
                return Err(OrchestrationError::ValidationError(format!(
                    "min_liquidity must be within [0, 1], got {}",
                    liquidity
                )));
            }
        }

        Ok(())
    }
}

//
// ================= Task =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskError {
    pub message: String,
    /// Set when the failure was an infeasible optimization, which aborts the request.
    #[serde(default)]
    pub infeasible: bool,
}

impl From<&OrchestrationError> for TaskError {
    fn from(err: &OrchestrationError) -> Self {
        Self {
            message: err.to_string(),
            infeasible: err.is_infeasible(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub request_id: Uuid,
    pub agent_type: AgentType,
    pub priority: TaskPriority,
    pub payload: Value,
    pub status: TaskStatus,
    pub parent_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<TaskError>,
    pub audit_trail: Vec<AuditEntry>,
}

impl Task {
    pub fn new(
        request_id: Uuid,
        agent_type: AgentType,
        priority: TaskPriority,
        payload: Value,
        parent_task_id: Option<Uuid>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            request_id,
            agent_type,
            priority,
            payload,
            status: TaskStatus::Pending,
            parent_task_id,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            audit_trail: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, result: Value) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn fail(&mut self, error: TaskError) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn cancel(&mut self, reason: String) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self.error = Some(TaskError {
            message: reason,
            infeasible: false,
        });
    }

    /// Symbols carried in the payload, if any.
    pub fn symbols(&self) -> Vec<String> {
        self.payload
            .get("symbols")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Completed agent outputs keyed by agent type.
pub type AgentResults = HashMap<AgentType, Value>;

//
// ================= Portfolio =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetCandidate {
    pub symbol: String,
    pub asset_type: String,
    pub sector: String,
    pub beta: f64,
    pub expected_return: f64,
    pub volatility: f64,
    pub liquidity_score: f64,
    pub expense_ratio: f64,
    pub market_cap: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizedPortfolio {
    pub allocations: BTreeMap<String, f64>,
    pub expected_return: f64,
    pub volatility: f64,
    pub beta: f64,
    pub sharpe_ratio: f64,
    pub diversification_score: f64,
    pub expense_ratio: f64,
}

//
// ================= Recommendation =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommendation_id: Uuid,
    pub context: RequestContext,
    pub portfolio: BTreeMap<String, f64>,
    pub risk_metrics: BTreeMap<String, f64>,
    pub expected_returns: BTreeMap<String, f64>,
    pub confidence_score: f64,
    pub reasoning: Vec<String>,
    pub data_sources: Vec<String>,
    pub warnings: Vec<String>,
    pub human_review_required: bool,
    pub timestamp: DateTime<Utc>,
    pub context_hash: String,
    pub audit_trail: Vec<AuditEntry>,
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Medium);
        assert!(TaskPriority::Medium > TaskPriority::Low);
    }

    #[test]
    fn test_compliance_flags_from_details() {
        let flags = ComplianceFlag::derive(&json!({
            "high_risk_detected": true,
            "large_position_size": false,
            "restricted_security": true,
        }));
        assert_eq!(
            flags,
            vec![
                ComplianceFlag::HighRiskTransaction,
                ComplianceFlag::RestrictedSecurity
            ]
        );
        assert!(ComplianceFlag::derive(&json!({"task_id": "x"})).is_empty());
    }

    #[test]
    fn test_context_validation() {
        let ok = RequestContext::new("u1", RiskTolerance::Moderate, "5 years", 30_000.0);
        assert!(ok.validate().is_ok());

        let zero = RequestContext::new("u1", RiskTolerance::Moderate, "5 years", 0.0);
        assert!(matches!(
            zero.validate(),
            Err(OrchestrationError::ValidationError(_))
        ));

        let inverted = ok.clone().with_beta_range(0.9, 0.4);
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_risk_tolerance_parsing() {
        assert_eq!(
            "Very-Aggressive".parse::<RiskTolerance>().unwrap(),
            RiskTolerance::VeryAggressive
        );
        assert!("reckless".parse::<RiskTolerance>().is_err());
        assert_eq!(RiskTolerance::Conservative.to_string(), "conservative");
    }

    #[test]
    fn test_audit_entry_serialisation_shape() {
        let context = RequestContext::new("u1", RiskTolerance::Moderate, "5 years", 1_000.0);
        let entry = AuditEntry::new(
            "RISK_ASSESSMENT_COMPLETED",
            "RiskAssessmentAgent",
            &context,
            json!({"high_risk_detected": true}),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["request_id"], json!(context.request_id));
        assert_eq!(value["compliance_flags"], json!(["HIGH_RISK_TRANSACTION"]));
        assert!(value["timestamp"].is_string());
    }
}
