//! Risk assessment agent
//!
//! Historical risk metrics of the assessed series against a benchmark,
//! canned stress scenarios, a tolerance-based asset-class split and a
//! weighted overall score.

use super::{audited, Agent};
use crate::audit::AuditRecorder;
use crate::data::{MarketDataSource, PriceHistory};
use crate::error::OrchestrationError;
use crate::models::{AgentType, RequestContext, RiskTolerance, Task};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const AGENT_NAME: &str = "RiskAssessmentAgent";
const BENCHMARK: &str = "SPY";
const DEFAULT_PROXY: &str = "VTI";
const HISTORY_DAYS: usize = 252;
const TRADING_DAYS: f64 = 252.0;
const CONFIDENCE_LEVEL: f64 = 0.95;
const BOND_DURATION: f64 = 5.0;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RiskMetrics {
    pub volatility: f64,
    pub beta: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub value_at_risk: f64,
    pub conditional_value_at_risk: f64,
    pub correlation_risk: f64,
    pub liquidity_risk: f64,
    pub concentration_risk: f64,
}

/// Macro exposures that are not derived from price history
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MarketRiskFactors {
    pub interest_rate_risk: f64,
    pub inflation_risk: f64,
    pub currency_risk: f64,
    pub geopolitical_risk: f64,
    pub regulatory_risk: f64,
    pub sector_risk: f64,
}

impl Default for MarketRiskFactors {
    fn default() -> Self {
        Self {
            interest_rate_risk: 0.35,
            inflation_risk: 0.45,
            currency_risk: 0.20,
            geopolitical_risk: 0.40,
            regulatory_risk: 0.25,
            sector_risk: 0.35,
        }
    }
}

impl MarketRiskFactors {
    fn score(&self) -> f64 {
        self.interest_rate_risk * 0.2
            + self.inflation_risk * 0.2
            + self.currency_risk * 0.15
            + self.geopolitical_risk * 0.25
            + self.regulatory_risk * 0.1
            + self.sector_risk * 0.1
    }
}

/// Fractions per asset class, summing to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AssetClassSplit {
    pub equities: f64,
    pub bonds: f64,
    pub cash: f64,
    pub commodities: f64,
}

impl AssetClassSplit {
    fn base(tolerance: RiskTolerance) -> Self {
        let (equities, bonds, cash, commodities) = match tolerance {
            RiskTolerance::Conservative => (0.30, 0.60, 0.10, 0.0),
            RiskTolerance::Moderate => (0.50, 0.40, 0.05, 0.05),
            RiskTolerance::Aggressive => (0.70, 0.20, 0.05, 0.05),
            RiskTolerance::VeryAggressive => (0.85, 0.10, 0.025, 0.025),
        };
        Self {
            equities,
            bonds,
            cash,
            commodities,
        }
    }

    fn normalized(self) -> Self {
        let total = self.equities + self.bonds + self.cash + self.commodities;
        Self {
            equities: self.equities / total,
            bonds: self.bonds / total,
            cash: self.cash / total,
            commodities: self.commodities / total,
        }
    }
}

// ===== Scenarios =====

#[derive(Debug, Clone, Copy)]
struct Shocks {
    equity: f64,
    rate_increase: Option<f64>,
    credit_spread: f64,
    commodity: f64,
}

const SCENARIOS: &[(&str, Shocks)] = &[
    (
        "market_crash",
        Shocks {
            equity: -0.30,
            rate_increase: None,
            credit_spread: 0.0,
            commodity: 0.0,
        },
    ),
    (
        "recession",
        Shocks {
            equity: -0.20,
            rate_increase: None,
            credit_spread: 0.02,
            commodity: 0.0,
        },
    ),
    (
        "inflation_spike",
        Shocks {
            equity: -0.10,
            rate_increase: Some(0.02),
            credit_spread: 0.0,
            commodity: 0.25,
        },
    ),
    (
        "geopolitical_crisis",
        Shocks {
            equity: -0.15,
            rate_increase: None,
            credit_spread: 0.0,
            commodity: 0.0,
        },
    ),
];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScenarioImpact {
    pub portfolio_value: f64,
    pub loss: f64,
    pub percentage_loss: f64,
    pub equity_impact: f64,
    pub bond_impact: f64,
    pub commodity_impact: f64,
}

fn scenario_impact(value: f64, split: &AssetClassSplit, shocks: &Shocks) -> ScenarioImpact {
    let equity_impact = split.equities * shocks.equity;
    let bond_impact = match shocks.rate_increase {
        Some(rate) => -split.bonds * BOND_DURATION * rate,
        None => -split.bonds * BOND_DURATION * shocks.credit_spread,
    };
    let commodity_impact = split.commodities * shocks.commodity;

    let new_value = value * (1.0 + equity_impact + bond_impact + commodity_impact);
    let loss = value - new_value;

    ScenarioImpact {
        portfolio_value: new_value,
        loss,
        percentage_loss: if value > 0.0 { loss / value * 100.0 } else { 0.0 },
        equity_impact,
        bond_impact,
        commodity_impact,
    }
}

pub(crate) fn stress_test(value: f64, split: &AssetClassSplit) -> BTreeMap<&'static str, ScenarioImpact> {
    SCENARIOS
        .iter()
        .map(|(name, shocks)| (*name, scenario_impact(value, split, shocks)))
        .collect()
}

// ===== Metric math =====

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation (n - 1)
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64).sqrt()
}

fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let (ma, mb) = (mean(&a[..n]), mean(&b[..n]));
    (0..n).map(|i| (a[i] - ma) * (b[i] - mb)).sum::<f64>() / n as f64
}

pub(crate) fn beta(asset: &[f64], market: &[f64]) -> f64 {
    if asset.len() < 2 || market.len() < 2 {
        return 1.0;
    }
    let n = asset.len().min(market.len());
    let variance = covariance(&market[..n], &market[..n]);
    if variance == 0.0 {
        1.0
    } else {
        covariance(&asset[..n], &market[..n]) / variance
    }
}

fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    let denom = (covariance(&a[..n], &a[..n]) * covariance(&b[..n], &b[..n])).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        covariance(&a[..n], &b[..n]) / denom
    }
}

pub(crate) fn max_drawdown(closes: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &price in closes {
        peak = peak.max(price);
        if peak > 0.0 {
            worst = worst.min((price - peak) / peak);
        }
    }
    worst.abs()
}

/// Linear-interpolated percentile, `q` in [0, 100]
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Historical VaR and CVaR as positive loss fractions
pub(crate) fn value_at_risk(returns: &[f64], confidence: f64) -> (f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0);
    }
    let var = -percentile(returns, (1.0 - confidence) * 100.0);
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= -var).collect();
    let cvar = if tail.is_empty() { var } else { -mean(&tail) };
    (var, cvar)
}

fn correlation_risk(asset: &[f64], market: &[f64]) -> f64 {
    if asset.len() < 2 || market.len() < 2 {
        return 0.5;
    }
    match correlation(asset, market) {
        c if c > 0.8 => 0.9,
        c if c > 0.6 => 0.7,
        c if c > 0.4 => 0.5,
        _ => 0.3,
    }
}

pub(crate) fn risk_level(score: f64) -> &'static str {
    if score < 0.3 {
        "low"
    } else if score < 0.5 {
        "moderate"
    } else if score < 0.7 {
        "high"
    } else {
        "very_high"
    }
}

fn overall_score(metrics: &RiskMetrics, factors: &MarketRiskFactors) -> f64 {
    let metric_score = (metrics.volatility / 0.4).min(1.0) * 0.2
        + (metrics.beta - 1.0).abs().min(1.0) * 0.15
        + (metrics.max_drawdown / 0.3).min(1.0) * 0.15
        + (metrics.value_at_risk / 0.1).min(1.0) * 0.15
        + metrics.correlation_risk * 0.1
        + metrics.liquidity_risk * 0.1
        + metrics.concentration_risk * 0.15;

    (metric_score * 0.6 + factors.score() * 0.4).min(1.0)
}

// ===== Agent =====

pub struct RiskAssessmentAgent {
    audit: Arc<AuditRecorder>,
    data: Arc<dyn MarketDataSource>,
    risk_free_rate: f64,
    factors: MarketRiskFactors,
}

impl RiskAssessmentAgent {
    pub fn new(audit: Arc<AuditRecorder>, data: Arc<dyn MarketDataSource>, risk_free_rate: f64) -> Self {
        Self {
            audit,
            data,
            risk_free_rate,
            factors: MarketRiskFactors::default(),
        }
    }

    pub fn with_market_factors(mut self, factors: MarketRiskFactors) -> Self {
        self.factors = factors;
        self
    }

    fn metrics(&self, asset_history: &PriceHistory, market_history: &PriceHistory) -> RiskMetrics {
        let asset = asset_history.returns();
        let market = market_history.returns();

        let volatility = sample_std(&asset) * TRADING_DAYS.sqrt();
        let sharpe_ratio = if volatility == 0.0 {
            0.0
        } else {
            (mean(&asset) * TRADING_DAYS - self.risk_free_rate) / volatility
        };
        let (var, cvar) = value_at_risk(&asset, CONFIDENCE_LEVEL);

        RiskMetrics {
            volatility,
            beta: beta(&asset, &market),
            sharpe_ratio,
            max_drawdown: max_drawdown(&asset_history.closes),
            value_at_risk: var,
            conditional_value_at_risk: cvar,
            correlation_risk: correlation_risk(&asset, &market),
            liquidity_risk: 0.2,
            concentration_risk: 0.25,
        }
    }

    async fn run(&self, proxy: &str, context: &RequestContext) -> Result<(Value, Value)> {
        let (asset, market) = tokio::try_join!(
            self.data.fetch_history(proxy, HISTORY_DAYS),
            self.data.fetch_history(BENCHMARK, HISTORY_DAYS)
        )?;

        if asset.closes.len() < 2 || market.closes.len() < 2 {
            return Err(OrchestrationError::AgentFailure(format!(
                "insufficient price history for {} against {}",
                proxy, BENCHMARK
            )));
        }

        let metrics = self.metrics(&asset, &market);
        let split = suggested_split(context.risk_tolerance, &metrics);
        let stress = stress_test(context.capital_available, &split);
        let score = overall_score(&metrics, &self.factors);
        let level = risk_level(score);
        let recommendations = recommendations(context.risk_tolerance, score, &stress);
        let high_risk_detected = score > 0.7;

        info!(
            request_id = %context.request_id,
            risk_score = score,
            level,
            volatility = metrics.volatility,
            "Risk assessment complete"
        );

        let result = json!({
            "volatility": metrics.volatility,
            "level": level,
            "risk_score": score,
            "metrics": metrics,
            "market_risk_factors": self.factors,
            "stress_test_results": stress,
            "suggested_allocation": split,
            "recommendations": recommendations,
            "assessed_symbol": proxy,
            "benchmark": BENCHMARK,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let completed = json!({
            "risk_score": score,
            "high_risk_detected": high_risk_detected,
            "stress_test_scenarios": stress.len(),
        });

        Ok((result, completed))
    }
}

pub(crate) fn suggested_split(tolerance: RiskTolerance, metrics: &RiskMetrics) -> AssetClassSplit {
    let mut split = AssetClassSplit::base(tolerance);

    if metrics.volatility > 0.25 {
        split.cash += 0.05;
        split.equities -= 0.05;
    }
    if metrics.beta > 1.2 {
        split.bonds += 0.05;
        split.equities -= 0.05;
    }

    split.normalized()
}

fn recommendations(
    tolerance: RiskTolerance,
    score: f64,
    stress: &BTreeMap<&'static str, ScenarioImpact>,
) -> Vec<String> {
    let cautious = matches!(tolerance, RiskTolerance::Conservative | RiskTolerance::Moderate);
    let mut out = Vec::new();

    if score > 0.6 && cautious {
        out.push("Current market risk exceeds your risk tolerance - consider reducing exposure".to_string());
    }

    let worst = stress
        .iter()
        .max_by(|a, b| a.1.percentage_loss.total_cmp(&b.1.percentage_loss));
    if let Some((name, impact)) = worst {
        if impact.percentage_loss > 20.0 {
            out.push(format!(
                "Stress test shows potential {:.1}% loss in {} scenario",
                impact.percentage_loss, name
            ));
        }
    }

    if score > 0.5 {
        out.push("Consider implementing stop-loss orders to limit downside risk".to_string());
        out.push("Increase portfolio diversification across uncorrelated assets".to_string());
    }

    if tolerance == RiskTolerance::Conservative && score > 0.4 {
        out.push("Recommend increasing allocation to fixed income securities".to_string());
    }

    if score < 0.3 && !cautious {
        out.push(
            "Risk levels are low - may consider increasing equity exposure for higher returns"
                .to_string(),
        );
    }

    out
}

#[async_trait::async_trait]
impl Agent for RiskAssessmentAgent {
    fn name(&self) -> &'static str {
        AGENT_NAME
    }

    fn agent_type(&self) -> AgentType {
        AgentType::RiskAssessment
    }

    async fn process(&self, task: &mut Task, context: &RequestContext) -> Result<Value> {
        let proxy = task
            .symbols()
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_PROXY.to_string());

        let started = json!({
            "task_id": task.task_id,
            "risk_tolerance": context.risk_tolerance,
        });
        audited(
            &self.audit,
            task,
            context,
            AGENT_NAME,
            "RISK_ASSESSMENT",
            started,
            self.run(&proxy, context),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::FixtureMarketData;
    use crate::models::{ComplianceFlag, TaskPriority};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_drawdown_and_var() {
        assert!(approx(max_drawdown(&[100.0, 120.0, 90.0, 130.0]), 0.25));
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);

        let returns: Vec<f64> = (0..101).map(|i| (i as f64 - 50.0) / 1000.0).collect();
        let (var, cvar) = value_at_risk(&returns, 0.95);
        assert!(approx(var, 0.045));
        assert!(approx(cvar, 0.0475));
    }

    #[test]
    fn test_beta_of_identical_series_is_one() {
        let series = [0.01, -0.02, 0.015, 0.003];
        assert!(approx(beta(&series, &series), 1.0));
        let doubled: Vec<f64> = series.iter().map(|r| r * 2.0).collect();
        assert!(approx(beta(&doubled, &series), 2.0));
        assert_eq!(beta(&[0.1], &[0.1]), 1.0);
    }

    #[test]
    fn test_levels_and_split() {
        assert_eq!(risk_level(0.1), "low");
        assert_eq!(risk_level(0.3), "moderate");
        assert_eq!(risk_level(0.69), "high");
        assert_eq!(risk_level(0.7), "very_high");

        let calm = RiskMetrics {
            volatility: 0.1,
            beta: 1.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            value_at_risk: 0.0,
            conditional_value_at_risk: 0.0,
            correlation_risk: 0.3,
            liquidity_risk: 0.2,
            concentration_risk: 0.25,
        };
        let split = suggested_split(RiskTolerance::Moderate, &calm);
        assert!(approx(split.equities, 0.50));
        assert!(approx(split.bonds, 0.40));
        assert!(approx(split.commodities, 0.05));

        let wild = RiskMetrics {
            volatility: 0.3,
            beta: 1.5,
            ..calm
        };
        let split = suggested_split(RiskTolerance::Aggressive, &wild);
        assert!(approx(split.equities, 0.60));
        assert!(approx(split.bonds, 0.25));
        assert!(approx(split.cash, 0.10));
    }

    #[test]
    fn test_stress_scenarios() {
        let split = AssetClassSplit::base(RiskTolerance::Moderate);
        let results = stress_test(10_000.0, &split);
        assert_eq!(results.len(), 4);

        let crash = results["market_crash"];
        assert!(approx(crash.percentage_loss, 15.0));
        let recession = results["recession"];
        assert!(approx(recession.bond_impact, -0.04));
        let inflation = results["inflation_spike"];
        assert!(approx(inflation.bond_impact, -0.04));
        assert!(approx(inflation.commodity_impact, 0.0125));
    }

    #[tokio::test]
    async fn test_process_reports_headline_fields() {
        let audit = Arc::new(AuditRecorder::in_memory());
        let agent = RiskAssessmentAgent::new(audit, Arc::new(FixtureMarketData::rising()), 0.04);
        let ctx = RequestContext::new("ra", RiskTolerance::Moderate, "5 years", 30_000.0);
        let mut task = Task::new(
            ctx.request_id,
            AgentType::RiskAssessment,
            TaskPriority::High,
            json!({ "risk_tolerance": "moderate" }),
            None,
        );

        let result = agent.process(&mut task, &ctx).await.unwrap();

        let volatility = result["volatility"].as_f64().unwrap();
        assert!(volatility > 0.0 && volatility < 0.2);
        assert_eq!(result["metrics"]["volatility"], result["volatility"]);
        assert!(approx(result["metrics"]["beta"].as_f64().unwrap(), 1.0));
        assert!(["low", "moderate", "high", "very_high"].contains(&result["level"].as_str().unwrap()));
        assert_eq!(result["assessed_symbol"], "VTI");

        let completed = &task.audit_trail[1];
        assert_eq!(completed.action, "RISK_ASSESSMENT_COMPLETED");
        assert_eq!(completed.details["high_risk_detected"], false);
        assert!(completed.compliance_flags.is_empty());
    }

    #[tokio::test]
    async fn test_high_score_raises_compliance_flag() {
        let agent = RiskAssessmentAgent::new(
            Arc::new(AuditRecorder::in_memory()),
            Arc::new(FixtureMarketData::rising()),
            0.04,
        )
        .with_market_factors(MarketRiskFactors {
            interest_rate_risk: 10.0,
            inflation_risk: 10.0,
            currency_risk: 10.0,
            geopolitical_risk: 10.0,
            regulatory_risk: 10.0,
            sector_risk: 10.0,
        });
        let ctx = RequestContext::new("ra", RiskTolerance::Conservative, "5 years", 30_000.0);
        let mut task = Task::new(
            ctx.request_id,
            AgentType::RiskAssessment,
            TaskPriority::High,
            json!({}),
            None,
        );

        let result = agent.process(&mut task, &ctx).await.unwrap();
        assert_eq!(result["level"], "very_high");
        assert_eq!(
            task.audit_trail[1].compliance_flags,
            vec![ComplianceFlag::HighRiskTransaction]
        );
    }
}
