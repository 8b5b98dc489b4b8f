//! Static ETF universe and screening

use crate::models::AssetCandidate;
use lazy_static::lazy_static;
use std::collections::BTreeSet;

#[allow(clippy::too_many_arguments)]
fn etf(
    symbol: &str,
    beta: f64,
    expected_return: f64,
    volatility: f64,
    liquidity_score: f64,
    expense_ratio: f64,
    market_cap: f64,
    sector: &str,
    description: &str,
) -> AssetCandidate {
    AssetCandidate {
        symbol: symbol.to_string(),
        asset_type: "ETF".to_string(),
        sector: sector.to_string(),
        beta,
        expected_return,
        volatility,
        liquidity_score,
        expense_ratio,
        market_cap,
        description: description.to_string(),
    }
}

lazy_static! {
    /// Read-only; shared by every request
    pub static ref ASSET_UNIVERSE: Vec<AssetCandidate> = vec![
        etf("AGG", 0.40, 0.030, 0.040, 0.95, 0.0003, 100e9, "Bonds", "iShares Core US Aggregate Bond ETF"),
        etf("BND", 0.42, 0.032, 0.041, 0.94, 0.0003, 95e9, "Bonds", "Vanguard Total Bond Market ETF"),
        etf("VCSH", 0.25, 0.025, 0.030, 0.93, 0.0004, 50e9, "Bonds", "Vanguard Short-Term Corporate Bond ETF"),
        etf("MUB", 0.35, 0.028, 0.038, 0.90, 0.0005, 30e9, "Bonds", "iShares National Muni Bond ETF"),
        etf("VPU", 0.50, 0.060, 0.120, 0.88, 0.0010, 15e9, "Utilities", "Vanguard Utilities ETF"),
        etf("XLRE", 0.65, 0.070, 0.150, 0.89, 0.0010, 12e9, "Real Estate", "Real Estate Select Sector SPDR"),
        etf("VNQ", 0.68, 0.072, 0.160, 0.91, 0.0012, 35e9, "Real Estate", "Vanguard Real Estate ETF"),
        etf("DVY", 0.75, 0.080, 0.140, 0.92, 0.0038, 20e9, "Dividend", "iShares Select Dividend ETF"),
        etf("SCHD", 0.72, 0.082, 0.130, 0.93, 0.0006, 45e9, "Dividend", "Schwab US Dividend Equity ETF"),
        etf("VIG", 0.78, 0.085, 0.135, 0.94, 0.0006, 70e9, "Dividend", "Vanguard Dividend Appreciation ETF"),
        etf("XLP", 0.55, 0.065, 0.110, 0.93, 0.0010, 18e9, "Consumer Staples", "Consumer Staples Select Sector SPDR"),
        etf("VDC", 0.53, 0.063, 0.108, 0.92, 0.0010, 8e9, "Consumer Staples", "Vanguard Consumer Staples ETF"),
        etf("XLV", 0.60, 0.090, 0.130, 0.94, 0.0010, 40e9, "Healthcare", "Health Care Select Sector SPDR"),
        etf("USMV", 0.70, 0.085, 0.120, 0.95, 0.0015, 35e9, "Low Volatility", "iShares MSCI USA Min Vol Factor ETF"),
        etf("SPLV", 0.65, 0.075, 0.100, 0.93, 0.0025, 15e9, "Low Volatility", "Invesco S&P 500 Low Volatility ETF"),
        etf("GLD", 0.00, 0.050, 0.150, 0.96, 0.0040, 70e9, "Commodities", "SPDR Gold Shares"),
        etf("IAU", 0.00, 0.048, 0.148, 0.95, 0.0025, 30e9, "Commodities", "iShares Gold Trust"),
        etf("SLV", 0.10, 0.060, 0.250, 0.90, 0.0050, 10e9, "Commodities", "iShares Silver Trust"),
        etf("TIP", 0.45, 0.035, 0.060, 0.92, 0.0019, 25e9, "Inflation Protected", "iShares TIPS Bond ETF"),
        etf("VTIP", 0.30, 0.030, 0.040, 0.91, 0.0004, 8e9, "Inflation Protected", "Vanguard Short-Term Inflation-Protected Securities ETF"),
    ];
}

/// Screening result; `restricted` lists symbols that passed every bound but
/// were excluded by the user's restrictions
#[derive(Debug, Clone, Default)]
pub struct ScreeningOutcome {
    pub eligible: Vec<AssetCandidate>,
    pub restricted: Vec<String>,
}

pub struct AssetScreener {
    universe: Vec<AssetCandidate>,
}

impl AssetScreener {
    pub fn new() -> Self {
        Self {
            universe: ASSET_UNIVERSE.clone(),
        }
    }

    /// Candidates with beta in `[min_beta, max_beta]` and liquidity at or
    /// above `min_liquidity`, most liquid first, then cheapest.
    pub fn screen(
        &self,
        min_beta: f64,
        max_beta: f64,
        min_liquidity: f64,
        restrictions: &BTreeSet<String>,
    ) -> ScreeningOutcome {
        let mut outcome = ScreeningOutcome::default();

        for asset in &self.universe {
            let in_bounds = asset.beta >= min_beta
                && asset.beta <= max_beta
                && asset.liquidity_score >= min_liquidity;
            if !in_bounds {
                continue;
            }

            if restrictions
                .iter()
                .any(|r| r.trim().eq_ignore_ascii_case(&asset.symbol))
            {
                outcome.restricted.push(asset.symbol.clone());
            } else {
                outcome.eligible.push(asset.clone());
            }
        }

        outcome.eligible.sort_by(|a, b| {
            b.liquidity_score
                .total_cmp(&a.liquidity_score)
                .then_with(|| a.expense_ratio.total_cmp(&b.expense_ratio))
        });

        outcome
    }
}

impl Default for AssetScreener {
    fn default() -> Self {
        Self::new()
    }
}
