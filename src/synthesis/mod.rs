//! Recommendation synthesis
//!
//! Merges completed agent results into the final `Recommendation`:
//! confidence, human-review decision, warnings, reasoning and the
//! deduplicated source list. Pure; no I/O and no agent calls.

use crate::audit::compute_context_hash;
use crate::config::ReviewPolicy;
use crate::models::{AgentResults, AgentType, AuditEntry, Recommendation, RequestContext, RiskTolerance};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

const BASE_CONFIDENCE: f64 = 0.50;
const MAX_CONFIDENCE: f64 = 0.95;

/// Confidence added per present result. Portfolio construction is a
/// prerequisite for any recommendation and adds nothing.
const CONFIDENCE_WEIGHTS: &[(AgentType, f64)] = &[
    (AgentType::MarketResearch, 0.20),
    (AgentType::SentimentAnalysis, 0.15),
    (AgentType::RiskAssessment, 0.15),
];

const SOURCE_ORDER: &[AgentType] = &[
    AgentType::MarketResearch,
    AgentType::SentimentAnalysis,
    AgentType::RiskAssessment,
    AgentType::PortfolioConstruction,
];

pub const US_DISCLAIMER: &str =
    "This recommendation is for informational purposes only and not financial advice";

/// Trait for warning rules
pub trait WarningRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, results: &AgentResults, context: &RequestContext) -> Option<String>;
}

/// Conservative users facing risk-assessment volatility above a threshold
pub struct ConservativeVolatilityRule {
    pub max_volatility: f64,
}

impl WarningRule for ConservativeVolatilityRule {
    fn name(&self) -> &'static str {
        "conservative_volatility"
    }

    fn evaluate(&self, results: &AgentResults, context: &RequestContext) -> Option<String> {
        if context.risk_tolerance != RiskTolerance::Conservative {
            return None;
        }

        let volatility = headline(results.get(&AgentType::RiskAssessment)?, "volatility", "metrics")?
            .as_f64()?;

        (volatility > self.max_volatility).then(|| {
            format!(
                "Portfolio volatility {:.1}% exceeds conservative risk tolerance ({:.0}% limit)",
                volatility * 100.0,
                self.max_volatility * 100.0
            )
        })
    }
}

/// Fixed disclaimer for US requests
pub struct JurisdictionDisclaimerRule;

impl WarningRule for JurisdictionDisclaimerRule {
    fn name(&self) -> &'static str {
        "jurisdiction_disclaimer"
    }

    fn evaluate(&self, _results: &AgentResults, context: &RequestContext) -> Option<String> {
        (context.jurisdiction == "US").then(|| US_DISCLAIMER.to_string())
    }
}

/// Top-level field, falling back to the same key under `nested`
fn headline<'a>(result: &'a Value, key: &str, nested: &str) -> Option<&'a Value> {
    result
        .get(key)
        .or_else(|| result.get(nested).and_then(|n| n.get(key)))
}

pub struct Synthesizer {
    policy: ReviewPolicy,
    rules: Vec<Box<dyn WarningRule>>,
}

impl Synthesizer {
    /// Synthesizer without warning rules
    pub fn new(policy: ReviewPolicy) -> Self {
        Self {
            policy,
            rules: Vec::new(),
        }
    }

    /// Standard rule set: conservative volatility check and US disclaimer
    pub fn with_default_rules(policy: ReviewPolicy) -> Self {
        let max_volatility = policy.conservative_max_volatility;
        let mut synthesizer = Self::new(policy);
        synthesizer.add_rule(Box::new(ConservativeVolatilityRule { max_volatility }));
        synthesizer.add_rule(Box::new(JurisdictionDisclaimerRule));
        synthesizer
    }

    pub fn add_rule(&mut self, rule: Box<dyn WarningRule>) {
        self.rules.push(rule);
    }

    pub fn synthesize(
        &self,
        results: &AgentResults,
        context: &RequestContext,
        audit_trail: Vec<AuditEntry>,
    ) -> Recommendation {
        let confidence_score = confidence(results);
        let human_review_required = self.requires_review(confidence_score, context);

        let portfolio_result = results.get(&AgentType::PortfolioConstruction);
        let section = |key: &str| -> BTreeMap<String, f64> {
            portfolio_result
                .and_then(|r| r.get(key))
                .map(numeric_map)
                .unwrap_or_default()
        };

        let mut warnings: Vec<String> = Vec::new();
        if portfolio_result.is_none() {
            warnings.push("Portfolio construction did not complete; no allocation available".to_string());
        }
        for rule in &self.rules {
            if let Some(warning) = rule.evaluate(results, context) {
                debug!(rule = rule.name(), "Warning rule fired");
                warnings.push(warning);
            }
        }

        let recommendation = Recommendation {
            recommendation_id: Uuid::new_v4(),
            context: context.clone(),
            portfolio: section("allocation"),
            risk_metrics: section("risk_metrics"),
            expected_returns: section("expected_returns"),
            confidence_score,
            reasoning: reasoning(results),
            data_sources: data_sources(results),
            warnings,
            human_review_required,
            timestamp: Utc::now(),
            context_hash: compute_context_hash(context),
            audit_trail,
        };

        info!(
            request_id = %context.request_id,
            confidence = confidence_score,
            human_review_required,
            warnings = recommendation.warnings.len(),
            "Recommendation synthesized"
        );

        recommendation
    }

    fn requires_review(&self, confidence: f64, context: &RequestContext) -> bool {
        confidence < self.policy.min_confidence
            || context.capital_available > self.policy.max_capital
            || self.policy.review_tolerances.contains(&context.risk_tolerance)
    }
}

pub(crate) fn confidence(results: &AgentResults) -> f64 {
    let score = CONFIDENCE_WEIGHTS
        .iter()
        .filter(|(agent_type, _)| results.contains_key(agent_type))
        .fold(BASE_CONFIDENCE, |acc, (_, weight)| acc + weight);
    score.min(MAX_CONFIDENCE)
}

fn reasoning(results: &AgentResults) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(market) = results.get(&AgentType::MarketResearch) {
        let trend = headline(market, "trend", "analysis")
            .and_then(Value::as_str)
            .unwrap_or("stable");
        out.push(format!("Market analysis indicates {} conditions", trend));
    }
    if let Some(sentiment) = results.get(&AgentType::SentimentAnalysis) {
        let overall = sentiment
            .get("overall")
            .and_then(Value::as_str)
            .unwrap_or("neutral");
        out.push(format!("Sentiment analysis shows {} market sentiment", overall));
    }
    if let Some(risk) = results.get(&AgentType::RiskAssessment) {
        let level = risk.get("level").and_then(Value::as_str).unwrap_or("moderate");
        out.push(format!("Risk assessment identifies {} risk level", level));
    }

    out
}

fn data_sources(results: &AgentResults) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for agent_type in SOURCE_ORDER {
        let Some(declared) = results
            .get(agent_type)
            .and_then(|r| r.get("sources"))
            .and_then(Value::as_array)
        else {
            continue;
        };
        for source in declared.iter().filter_map(Value::as_str) {
            if !sources.iter().any(|s| s == source) {
                sources.push(source.to_string());
            }
        }
    }
    sources
}

fn numeric_map(value: &Value) -> BTreeMap<String, f64> {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn all_results() -> AgentResults {
        let mut results = AgentResults::new();
        results.insert(
            AgentType::MarketResearch,
            json!({ "trend": "bullish", "sources": ["MarketDataProvider API", "Technical Analysis"] }),
        );
        results.insert(
            AgentType::SentimentAnalysis,
            json!({ "overall": "positive", "sources": ["Reuters", "Technical Analysis"] }),
        );
        results.insert(
            AgentType::RiskAssessment,
            json!({ "volatility": 0.25, "level": "moderate" }),
        );
        results.insert(
            AgentType::PortfolioConstruction,
            json!({
                "allocation": { "AGG": 0.4, "XLV": 0.6 },
                "risk_metrics": { "portfolio_volatility": 0.09, "sharpe_ratio": 0.5 },
                "expected_returns": { "portfolio_return": 0.07 },
            }),
        );
        results
    }

    fn context(tolerance: RiskTolerance) -> RequestContext {
        RequestContext::new("synth", tolerance, "5 years", 30_000.0)
    }

    #[test]
    fn test_moderate_with_all_results_needs_no_review() {
        let synthesizer = Synthesizer::with_default_rules(ReviewPolicy::default());
        let rec = synthesizer.synthesize(&all_results(), &context(RiskTolerance::Moderate), Vec::new());

        assert!((rec.confidence_score - 0.95).abs() < 1e-12);
        assert!(!rec.human_review_required);
        assert_eq!(rec.portfolio["XLV"], 0.6);
        assert_eq!(rec.risk_metrics["sharpe_ratio"], 0.5);
        assert_eq!(rec.expected_returns["portfolio_return"], 0.07);
        assert_eq!(
            rec.reasoning,
            vec![
                "Market analysis indicates bullish conditions",
                "Sentiment analysis shows positive market sentiment",
                "Risk assessment identifies moderate risk level",
            ]
        );
        assert_eq!(
            rec.data_sources,
            vec!["MarketDataProvider API", "Technical Analysis", "Reuters"]
        );
        assert_eq!(rec.warnings, vec![US_DISCLAIMER]);
        assert_eq!(rec.context_hash, compute_context_hash(&rec.context));
    }

    #[test]
    fn test_review_triggers() {
        let synthesizer = Synthesizer::new(ReviewPolicy::default());

        let aggressive = synthesizer.synthesize(&all_results(), &context(RiskTolerance::Aggressive), Vec::new());
        assert!(aggressive.human_review_required);

        let very = synthesizer.synthesize(&all_results(), &context(RiskTolerance::VeryAggressive), Vec::new());
        assert!(!very.human_review_required);

        let rich = RequestContext::new("synth", RiskTolerance::Moderate, "5 years", 100_000.01);
        assert!(synthesizer.synthesize(&all_results(), &rich, Vec::new()).human_review_required);

        let mut sparse = AgentResults::new();
        sparse.insert(AgentType::SentimentAnalysis, json!({ "overall": "neutral" }));
        let rec = synthesizer.synthesize(&sparse, &context(RiskTolerance::Moderate), Vec::new());
        assert!((rec.confidence_score - 0.65).abs() < 1e-12);
        assert!(rec.human_review_required);
    }

    #[test]
    fn test_confidence_is_monotonic_and_capped() {
        let full = all_results();
        let mut partial = AgentResults::new();
        let mut previous = confidence(&partial);
        assert_eq!(previous, BASE_CONFIDENCE);

        for agent_type in SOURCE_ORDER {
            partial.insert(*agent_type, full[agent_type].clone());
            let next = confidence(&partial);
            assert!(next >= previous);
            assert!((0.0..=MAX_CONFIDENCE).contains(&next));
            previous = next;
        }
    }

    #[test]
    fn test_conservative_volatility_warning() {
        let synthesizer = Synthesizer::with_default_rules(ReviewPolicy::default());
        let ctx = context(RiskTolerance::Conservative).with_jurisdiction("UK");

        let rec = synthesizer.synthesize(&all_results(), &ctx, Vec::new());
        assert_eq!(rec.warnings.len(), 1);
        assert!(rec.warnings[0].contains("exceeds conservative risk tolerance"));

        // nested fallback
        let mut results = all_results();
        results.insert(AgentType::RiskAssessment, json!({ "metrics": { "volatility": 0.1 } }));
        assert!(synthesizer.synthesize(&results, &ctx, Vec::new()).warnings.is_empty());
    }

    #[test]
    fn test_absent_results_are_skipped() {
        let synthesizer = Synthesizer::with_default_rules(ReviewPolicy::default());
        let rec = synthesizer.synthesize(&AgentResults::new(), &context(RiskTolerance::Moderate), Vec::new());

        assert!(rec.reasoning.is_empty());
        assert!(rec.data_sources.is_empty());
        assert!(rec.portfolio.is_empty());
        assert_eq!(rec.warnings.len(), 2);
    }
}
