//! Runtime configuration
//!
//! Every knob has a default; `from_env` overrides from the process
//! environment (call `dotenv::dotenv().ok()` first to pick up `.env`).

use crate::audit::DEFAULT_RETAINED_REQUESTS;
use crate::models::RiskTolerance;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Thresholds that decide whether a recommendation needs human review.
#[derive(Debug, Clone)]
pub struct ReviewPolicy {
    /// Confidence strictly below this requires review
    pub min_confidence: f64,
    /// Capital strictly above this requires review
    pub max_capital: f64,
    /// Tolerances that always require review (default: `aggressive` only)
    pub review_tolerances: Vec<RiskTolerance>,
    /// Risk-assessment volatility above this triggers a warning for conservative users
    pub conservative_max_volatility: f64,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.70,
            max_capital: 100_000.0,
            review_tolerances: vec![RiskTolerance::Aggressive],
            conservative_max_volatility: 0.20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// JSON-lines audit sink; `None` keeps records in memory only
    pub audit_log_path: Option<PathBuf>,
    /// Request trails kept in memory before replay falls back to the sink
    pub audit_retained_requests: usize,
    pub risk_free_rate: f64,
    /// Seeds correlation jitter and the simulated data feeds
    pub optimizer_seed: u64,
    /// Default liquidity floor for screening ("highly liquid")
    pub min_liquidity: f64,
    pub review: ReviewPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            audit_log_path: None,
            audit_retained_requests: DEFAULT_RETAINED_REQUESTS,
            risk_free_rate: 0.04,
            optimizer_seed: 42,
            min_liquidity: 0.85,
            review: ReviewPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let review = ReviewPolicy {
            min_confidence: env_or("REVIEW_MIN_CONFIDENCE", defaults.review.min_confidence),
            max_capital: env_or("REVIEW_MAX_CAPITAL", defaults.review.max_capital),
            review_tolerances: defaults.review.review_tolerances,
            conservative_max_volatility: env_or(
                "CONSERVATIVE_MAX_VOLATILITY",
                defaults.review.conservative_max_volatility,
            ),
        };

        Self {
            audit_log_path: env::var("AUDIT_LOG_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            audit_retained_requests: env_or(
                "AUDIT_RETAINED_REQUESTS",
                defaults.audit_retained_requests,
            ),
            risk_free_rate: env_or("RISK_FREE_RATE", defaults.risk_free_rate),
            optimizer_seed: env_or("OPTIMIZER_SEED", defaults.optimizer_seed),
            min_liquidity: env_or("MIN_LIQUIDITY", defaults.min_liquidity),
            review,
        }
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparsable configuration value");
            default
        }),
        Err(_) => default,
    }
}
