//! Portfolio optimizer
//!
//! Turns a screened candidate set into allocation weights that maximise the
//! Sharpe ratio under a per-position cap and an optional return floor.
//!
//! The covariance matrix is a heuristic, not an estimate from history:
//! pairwise correlations come from sector/asset-type similarity plus seeded
//! Gaussian jitter. Treat the resulting risk figures as an approximation.

use crate::error::OrchestrationError;
use crate::models::{AssetCandidate, OptimizedPortfolio};
use crate::Result;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_pcg::Pcg64;
use std::collections::BTreeMap;
use tracing::debug;

mod solver;
pub mod universe;

pub use universe::{AssetScreener, ScreeningOutcome, ASSET_UNIVERSE};

/// Weights below this are dropped after solving
const MIN_WEIGHT: f64 = 0.01;
const JITTER_STD: f64 = 0.1;
const FEASIBILITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetClass {
    Bond,
    Commodity,
    Other,
}

fn asset_class(asset: &AssetCandidate) -> AssetClass {
    match asset.sector.as_str() {
        "Bonds" | "Inflation Protected" => AssetClass::Bond,
        "Commodities" => AssetClass::Commodity,
        _ => AssetClass::Other,
    }
}

pub struct PortfolioOptimizer {
    risk_free_rate: f64,
    seed: u64,
}

impl PortfolioOptimizer {
    pub fn new(risk_free_rate: f64, seed: u64) -> Self {
        Self {
            risk_free_rate,
            seed,
        }
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    /// Best expected return any fully invested, capped allocation of
    /// `candidates` can reach
    pub fn max_attainable_return(&self, candidates: &[AssetCandidate], max_position: f64) -> f64 {
        let returns: Vec<f64> = candidates.iter().map(|a| a.expected_return).collect();
        solver::max_attainable_return(&returns, max_position)
    }

    /// Symmetric covariance matrix. Jitter is drawn once per unordered pair
    /// in candidate order, so identical inputs give identical matrices.
    pub fn estimate_covariance(&self, assets: &[AssetCandidate]) -> Vec<Vec<f64>> {
        let n = assets.len();
        let mut rng = Pcg64::seed_from_u64(self.seed);
        let mut cov = vec![vec![0.0; n]; n];

        for i in 0..n {
            cov[i][i] = assets[i].volatility.powi(2);
            for j in (i + 1)..n {
                let rho = self.correlation(&assets[i], &assets[j], &mut rng);
                let value = rho * assets[i].volatility * assets[j].volatility;
                cov[i][j] = value;
                cov[j][i] = value;
            }
        }

        cov
    }

    fn correlation(&self, a: &AssetCandidate, b: &AssetCandidate, rng: &mut Pcg64) -> f64 {
        match (asset_class(a), asset_class(b)) {
            (AssetClass::Bond, AssetClass::Bond) => 0.8,
            (AssetClass::Commodity, AssetClass::Commodity) => 0.6,
            (AssetClass::Bond, _) | (_, AssetClass::Bond) => 0.1,
            _ => {
                let base = if a.sector == b.sector {
                    0.7
                } else if a.asset_type == b.asset_type {
                    0.5
                } else {
                    0.3
                };
                let noise: f64 = StandardNormal.sample(rng);
                (base + JITTER_STD * noise).clamp(-0.99, 0.99)
            }
        }
    }

    pub fn optimize(
        &self,
        candidates: &[AssetCandidate],
        capital: f64,
        target_return: Option<f64>,
        max_position: f64,
    ) -> Result<OptimizedPortfolio> {
        if candidates.is_empty() {
            return Err(OrchestrationError::OptimizationInfeasible(
                "no assets matching criteria".to_string(),
            ));
        }
        if !(max_position > 0.0 && max_position <= 1.0) {
            return Err(OrchestrationError::ValidationError(format!(
                "max position size must be within (0, 1], got {}",
                max_position
            )));
        }
        if !capital.is_finite() || capital <= 0.0 {
            return Err(OrchestrationError::ValidationError(format!(
                "capital must be positive, got {}",
                capital
            )));
        }

        let n = candidates.len();
        if (n as f64) * max_position < 1.0 - FEASIBILITY_TOLERANCE {
            return Err(OrchestrationError::OptimizationInfeasible(format!(
                "{} assets capped at {:.0}% cannot be fully invested",
                n,
                max_position * 100.0
            )));
        }

        let returns: Vec<f64> = candidates.iter().map(|a| a.expected_return).collect();
        if let Some(target) = target_return {
            let best = self.max_attainable_return(candidates, max_position);
            if best < target - FEASIBILITY_TOLERANCE {
                return Err(OrchestrationError::OptimizationInfeasible(format!(
                    "target return {:.2}% exceeds the best attainable {:.2}%",
                    target * 100.0,
                    best * 100.0
                )));
            }
        }

        let covariance = self.estimate_covariance(candidates);
        let raw = solver::Problem {
            returns: &returns,
            covariance: &covariance,
            risk_free_rate: self.risk_free_rate,
            cap: max_position,
            target: target_return,
        }
        .solve();

        let weights = drop_small_weights(&raw, max_position);

        debug!(
            candidates = n,
            selected = weights.iter().filter(|w| **w > 0.0).count(),
            "Optimization converged"
        );

        Ok(self.summarize(candidates, &covariance, &weights))
    }

    fn summarize(
        &self,
        candidates: &[AssetCandidate],
        covariance: &[Vec<f64>],
        weights: &[f64],
    ) -> OptimizedPortfolio {
        let weighted = |f: fn(&AssetCandidate) -> f64| -> f64 {
            candidates.iter().zip(weights).map(|(a, w)| f(a) * w).sum()
        };

        let expected_return = weighted(|a| a.expected_return);
        let volatility = solver::volatility(covariance, weights);
        let sharpe_ratio = if volatility == 0.0 {
            0.0
        } else {
            (expected_return - self.risk_free_rate) / volatility
        };

        let herfindahl: f64 = weights
            .iter()
            .filter(|w| **w > MIN_WEIGHT)
            .map(|w| w * w)
            .sum();
        let diversification_score = if weights.iter().any(|w| *w > MIN_WEIGHT) {
            1.0 - herfindahl
        } else {
            0.0
        };

        let allocations: BTreeMap<String, f64> = candidates
            .iter()
            .zip(weights)
            .filter(|(_, w)| **w > 0.0)
            .map(|(a, w)| (a.symbol.clone(), *w))
            .collect();

        OptimizedPortfolio {
            allocations,
            expected_return,
            volatility,
            beta: weighted(|a| a.beta),
            sharpe_ratio,
            diversification_score,
            expense_ratio: weighted(|a| a.expense_ratio),
        }
    }
}

/// Zero out weights under 1% and rescale the rest to sum to 1 without
/// breaching the cap. Keeps the raw weights if the survivors cannot hold
/// the full allocation under the cap.
fn drop_small_weights(raw: &[f64], cap: f64) -> Vec<f64> {
    let kept: Vec<f64> = raw
        .iter()
        .map(|w| if *w < MIN_WEIGHT { 0.0 } else { *w })
        .collect();
    let survivors = kept.iter().filter(|w| **w > 0.0).count();

    if (survivors as f64) * cap < 1.0 - FEASIBILITY_TOLERANCE {
        return solver::water_fill(raw, cap);
    }

    solver::water_fill(&kept, cap)
}
