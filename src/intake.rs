//! Request intake
//!
//! Builds a `RequestContext` from a free-text query plus explicit overrides.
//! Explicit values win; the query fills in what they leave unset; fixed
//! defaults cover the rest.

use crate::models::{RequestContext, RiskTolerance};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_USER: &str = "demo_user";
pub const DEFAULT_HORIZON: &str = "5 years";
pub const DEFAULT_CAPITAL: f64 = 30_000.0;
pub const DEFAULT_JURISDICTION: &str = "US";
const DEFAULT_GOALS: &[&str] = &["growth", "diversification"];

lazy_static! {
    static ref AMOUNT_PATTERN: Regex =
        Regex::new(r"\$([0-9,]+)").expect("amount pattern is a valid regex");
    static ref BETA_PATTERN: Regex =
        Regex::new(r"beta[s]?\s+(?:ranging\s+from\s+)?([0-9.]+)\s+to\s+([0-9.]+)")
            .expect("beta pattern is a valid regex");
}

/// Caller-supplied values; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryOverrides {
    pub user_id: Option<String>,
    pub risk_tolerance: Option<RiskTolerance>,
    pub investment_horizon: Option<String>,
    pub capital: Option<f64>,
    pub goals: Option<Vec<String>>,
    #[serde(default)]
    pub restrictions: Vec<String>,
    pub jurisdiction: Option<String>,
    pub beta_range: Option<(f64, f64)>,
    pub min_liquidity: Option<f64>,
}

/// Build a context for `query`. The result is not validated here.
pub fn build_context(query: &str, overrides: &QueryOverrides) -> RequestContext {
    let lowered = query.to_lowercase();

    let capital = overrides
        .capital
        .or_else(|| parse_capital(query))
        .unwrap_or(DEFAULT_CAPITAL);
    let risk_tolerance = overrides
        .risk_tolerance
        .or_else(|| parse_risk_tolerance(&lowered))
        .unwrap_or(RiskTolerance::Moderate);
    let beta_range = overrides.beta_range.or_else(|| parse_beta_range(&lowered));

    let goals = overrides
        .goals
        .clone()
        .unwrap_or_else(|| DEFAULT_GOALS.iter().map(|g| g.to_string()).collect());

    let mut context = RequestContext::new(
        overrides.user_id.as_deref().unwrap_or(DEFAULT_USER),
        risk_tolerance,
        overrides
            .investment_horizon
            .as_deref()
            .unwrap_or(DEFAULT_HORIZON),
        capital,
    )
    .with_goals(goals)
    .with_restrictions(overrides.restrictions.iter().cloned())
    .with_jurisdiction(
        overrides
            .jurisdiction
            .as_deref()
            .unwrap_or(DEFAULT_JURISDICTION),
    );

    if let Some((min, max)) = beta_range {
        context = context.with_beta_range(min, max);
    }
    if let Some(liquidity) = overrides.min_liquidity {
        context = context.with_min_liquidity(liquidity);
    }

    debug!(
        request_id = %context.request_id,
        capital,
        risk_tolerance = %risk_tolerance,
        beta_range = ?beta_range,
        "Request context built"
    );

    context
}

/// First `$1,234` style amount
pub(crate) fn parse_capital(query: &str) -> Option<f64> {
    let digits = AMOUNT_PATTERN.captures(query)?.get(1)?.as_str().replace(',', "");
    digits.parse().ok()
}

pub(crate) fn parse_risk_tolerance(lowered: &str) -> Option<RiskTolerance> {
    if lowered.contains("conservative") {
        Some(RiskTolerance::Conservative)
    } else if lowered.contains("aggressive") {
        Some(RiskTolerance::Aggressive)
    } else {
        None
    }
}

pub(crate) fn parse_beta_range(lowered: &str) -> Option<(f64, f64)> {
    let captures = BETA_PATTERN.captures(lowered)?;
    // a sentence-ending period sticks to the second number
    let number = |i: usize| -> Option<f64> {
        captures.get(i)?.as_str().trim_end_matches('.').parse().ok()
    };
    Some((number(1)?, number(2)?))
}
