//! Portfolio construction agent
//!
//! Screens the asset universe against the user's risk profile, runs the
//! optimizer and turns weights into dollar amounts.

use super::{audited, Agent};
use crate::audit::AuditRecorder;
use crate::config::OrchestratorConfig;
use crate::error::OrchestrationError;
use crate::models::{AgentType, AssetCandidate, OptimizedPortfolio, RequestContext, RiskTolerance, Task};
use crate::optimizer::{AssetScreener, PortfolioOptimizer};
use crate::Result;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

const AGENT_NAME: &str = "PortfolioConstructionAgent";
const LARGE_POSITION: f64 = 0.40;

/// Screening and optimization bounds for one risk tolerance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskProfile {
    pub min_beta: f64,
    pub max_beta: f64,
    pub target_return: f64,
    pub max_position_size: f64,
}

impl RiskProfile {
    pub fn for_tolerance(tolerance: RiskTolerance) -> Self {
        let (min_beta, max_beta, target_return, max_position_size) = match tolerance {
            RiskTolerance::Conservative => (0.0, 0.6, 0.05, 0.20),
            RiskTolerance::Moderate => (0.3, 0.9, 0.07, 0.25),
            RiskTolerance::Aggressive => (0.7, 1.3, 0.10, 0.35),
            RiskTolerance::VeryAggressive => (0.9, 2.0, 0.12, 0.40),
        };
        Self {
            min_beta,
            max_beta,
            target_return,
            max_position_size,
        }
    }
}

pub struct PortfolioConstructionAgent {
    audit: Arc<AuditRecorder>,
    screener: AssetScreener,
    optimizer: PortfolioOptimizer,
    min_liquidity: f64,
}

impl PortfolioConstructionAgent {
    pub fn new(audit: Arc<AuditRecorder>, config: &OrchestratorConfig) -> Self {
        Self {
            audit,
            screener: AssetScreener::new(),
            optimizer: PortfolioOptimizer::new(config.risk_free_rate, config.optimizer_seed),
            min_liquidity: config.min_liquidity,
        }
    }

    fn build(&self, payload: &Value, context: &RequestContext) -> Result<(Value, Value)> {
        let profile = RiskProfile::for_tolerance(context.risk_tolerance);
        let number = |key: &str| payload.get(key).and_then(Value::as_f64);

        let min_beta = number("min_beta").unwrap_or(profile.min_beta);
        let max_beta = number("max_beta").unwrap_or(profile.max_beta);
        let min_liquidity = number("min_liquidity").unwrap_or(self.min_liquidity);
        let capital = number("capital").unwrap_or(context.capital_available);

        let screening = self
            .screener
            .screen(min_beta, max_beta, min_liquidity, &context.restrictions);

        if screening.eligible.is_empty() {
            return Err(OrchestrationError::OptimizationInfeasible(format!(
                "no eligible assets for beta {:.2}-{:.2} with liquidity >= {:.2}",
                min_beta, max_beta, min_liquidity
            )));
        }

        // The profile target is a preference; drop it rather than fail when
        // the screened set cannot reach it under the position cap.
        let attainable = self
            .optimizer
            .max_attainable_return(&screening.eligible, profile.max_position_size);
        let relaxed = attainable < profile.target_return;
        let target = if relaxed {
            warn!(
                request_id = %context.request_id,
                target = profile.target_return,
                attainable,
                "Target return unattainable for screened assets, optimizing without it"
            );
            None
        } else {
            Some(profile.target_return)
        };

        let portfolio = self.optimizer.optimize(
            &screening.eligible,
            capital,
            target,
            profile.max_position_size,
        )?;

        let amounts = investment_amounts(&portfolio.allocations, capital);
        let large_position = portfolio.allocations.values().any(|w| *w > LARGE_POSITION);

        info!(
            request_id = %context.request_id,
            eligible = screening.eligible.len(),
            selected = portfolio.allocations.len(),
            expected_return = portfolio.expected_return,
            "Portfolio constructed"
        );

        let result = json!({
            "allocation": portfolio.allocations,
            "investment_amounts": amounts,
            "asset_details": asset_details(&screening.eligible, &portfolio, &amounts),
            "expected_returns": {
                "portfolio_return": portfolio.expected_return,
                "annualized_return": portfolio.expected_return * 100.0,
                "dollar_return": capital * portfolio.expected_return,
            },
            "risk_metrics": {
                "portfolio_volatility": portfolio.volatility,
                "portfolio_beta": portfolio.beta,
                "sharpe_ratio": portfolio.sharpe_ratio,
                "diversification_score": portfolio.diversification_score,
            },
            "costs": {
                "total_expense_ratio": portfolio.expense_ratio,
                "annual_cost": capital * portfolio.expense_ratio,
            },
            "eligible_assets_count": screening.eligible.len(),
            "selected_assets_count": portfolio.allocations.len(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        let completed = json!({
            "assets_selected": portfolio.allocations.len(),
            "portfolio_beta": portfolio.beta,
            "large_position_size": large_position,
            "restricted_security": !screening.restricted.is_empty(),
            "restricted_symbols": screening.restricted,
            "target_return_relaxed": relaxed,
        });

        Ok((result, completed))
    }
}

/// Dollar amounts rounded to cents; the rounding residual lands on the
/// largest position so the amounts sum to `capital`.
pub(crate) fn investment_amounts(allocations: &BTreeMap<String, f64>, capital: f64) -> BTreeMap<String, f64> {
    let cents = |v: f64| (v * 100.0).round() / 100.0;

    let mut amounts: BTreeMap<String, f64> = allocations
        .iter()
        .map(|(symbol, w)| (symbol.clone(), cents(capital * w)))
        .collect();

    let residual = cents(capital - amounts.values().sum::<f64>());
    let largest = allocations
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(symbol, _)| symbol.clone());

    if let Some(symbol) = largest {
        if let Some(amount) = amounts.get_mut(&symbol) {
            *amount = cents(*amount + residual);
        }
    }

    amounts
}

fn asset_details(
    eligible: &[AssetCandidate],
    portfolio: &OptimizedPortfolio,
    amounts: &BTreeMap<String, f64>,
) -> Value {
    let mut details = Map::new();
    for asset in eligible {
        let Some(weight) = portfolio.allocations.get(&asset.symbol) else {
            continue;
        };
        details.insert(
            asset.symbol.clone(),
            json!({
                "name": asset.description,
                "sector": asset.sector,
                "beta": asset.beta,
                "expected_return": asset.expected_return,
                "volatility": asset.volatility,
                "expense_ratio": asset.expense_ratio,
                "weight": weight,
                "amount": amounts.get(&asset.symbol).copied().unwrap_or(0.0),
            }),
        );
    }
    Value::Object(details)
}

#[async_trait::async_trait]
impl Agent for PortfolioConstructionAgent {
    fn name(&self) -> &'static str {
        AGENT_NAME
    }

    fn agent_type(&self) -> AgentType {
        AgentType::PortfolioConstruction
    }

    async fn process(&self, task: &mut Task, context: &RequestContext) -> Result<Value> {
        let payload = task.payload.clone();
        let started = json!({
            "task_id": task.task_id,
            "risk_tolerance": context.risk_tolerance,
            "capital": context.capital_available,
        });

        audited(
            &self.audit,
            task,
            context,
            AGENT_NAME,
            "PORTFOLIO_CONSTRUCTION",
            started,
            async { self.build(&payload, context) },
        )
        .await
    }
}
