//! Market research agent
//!
//! Pulls a quote and a year of closes per symbol, derives technical
//! indicators and summarises the basket into trend, momentum and breadth.

use super::{audited, Agent};
use crate::audit::AuditRecorder;
use crate::data::{MarketDataSource, PriceHistory, Quote};
use crate::error::OrchestrationError;
use crate::models::{AgentType, RequestContext, RiskTolerance, Task};
use crate::planner::DEFAULT_MARKET_BASKET;
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

const AGENT_NAME: &str = "MarketResearchAgent";
const HISTORY_DAYS: usize = 365;
const RSI_PERIOD: usize = 14;
const SOURCES: &[&str] = &["MarketDataProvider API", "Technical Analysis"];

/// Per-symbol snapshot combining the quote with derived indicators
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub current_price: f64,
    pub volume: u64,
    pub market_cap: f64,
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: f64,
    pub price_change_1d: f64,
    pub price_change_1w: f64,
    pub price_change_1m: f64,
    pub price_change_3m: f64,
    pub price_change_1y: f64,
    pub moving_avg_50: f64,
    pub moving_avg_200: f64,
    pub rsi: f64,
    pub support_level: f64,
    pub resistance_level: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketAnalysis {
    pub trend: &'static str,
    pub momentum: &'static str,
    pub avg_rsi: f64,
    pub avg_price_change_1m: f64,
    pub above_ma50_pct: f64,
    pub above_ma200_pct: f64,
    pub volatility: f64,
    pub market_breadth: &'static str,
}

pub struct MarketResearchAgent {
    audit: Arc<AuditRecorder>,
    data: Arc<dyn MarketDataSource>,
}

impl MarketResearchAgent {
    pub fn new(audit: Arc<AuditRecorder>, data: Arc<dyn MarketDataSource>) -> Self {
        Self { audit, data }
    }

    async fn gather(&self, symbols: &[String]) -> Vec<MarketSnapshot> {
        let mut snapshots = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            let (quote, history) = tokio::join!(
                self.data.fetch_quote(symbol),
                self.data.fetch_history(symbol, HISTORY_DAYS)
            );

            match (quote, history) {
                (Ok(quote), Ok(history)) => snapshots.push(snapshot(quote, &history)),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(symbol = %symbol, error = %e, "Skipping symbol without market data");
                }
            }
        }

        snapshots
    }

    async fn run(&self, symbols: &[String], context: &RequestContext) -> Result<(Value, Value)> {
        let snapshots = self.gather(symbols).await;
        if snapshots.is_empty() {
            return Err(OrchestrationError::AgentFailure(format!(
                "no market data available for {}",
                symbols.join(", ")
            )));
        }

        let analysis = analyze(&snapshots);
        let recommendations = recommendations(&analysis, context.risk_tolerance);

        info!(
            request_id = %context.request_id,
            symbols = snapshots.len(),
            trend = analysis.trend,
            momentum = analysis.momentum,
            "Market research complete"
        );

        let result = json!({
            "trend": analysis.trend,
            "market_data": snapshots,
            "analysis": analysis,
            "recommendations": recommendations,
            "sources": SOURCES,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let completed = json!({
            "symbols_analyzed": symbols.len(),
            "recommendations_count": recommendations.len(),
        });

        Ok((result, completed))
    }
}

#[async_trait::async_trait]
impl Agent for MarketResearchAgent {
    fn name(&self) -> &'static str {
        AGENT_NAME
    }

    fn agent_type(&self) -> AgentType {
        AgentType::MarketResearch
    }

    async fn process(&self, task: &mut Task, context: &RequestContext) -> Result<Value> {
        let mut symbols = task.symbols();
        if symbols.is_empty() {
            symbols = DEFAULT_MARKET_BASKET.iter().map(|s| s.to_string()).collect();
        }

        let started = json!({ "task_id": task.task_id, "symbols": symbols });
        audited(
            &self.audit,
            task,
            context,
            AGENT_NAME,
            "MARKET_RESEARCH",
            started,
            self.run(&symbols, context),
        )
        .await
    }
}

// ===== Indicators =====

fn snapshot(quote: Quote, history: &PriceHistory) -> MarketSnapshot {
    let closes = &history.closes;
    let recent = &closes[closes.len().saturating_sub(20)..];

    MarketSnapshot {
        symbol: quote.symbol,
        // Indicators compare against the latest close of the same series
        current_price: closes.last().copied().unwrap_or(quote.price),
        volume: quote.volume,
        market_cap: quote.market_cap,
        pe_ratio: quote.pe_ratio,
        dividend_yield: quote.dividend_yield,
        beta: quote.beta,
        price_change_1d: price_change(closes, 1),
        price_change_1w: price_change(closes, 7),
        price_change_1m: price_change(closes, 30),
        price_change_3m: price_change(closes, 90),
        price_change_1y: price_change(closes, 365),
        moving_avg_50: moving_average(closes, 50),
        moving_avg_200: moving_average(closes, 200),
        rsi: rsi(closes, RSI_PERIOD),
        support_level: recent.iter().copied().fold(f64::INFINITY, f64::min),
        resistance_level: recent.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Relative change against the close `days` sessions back, 0 when the
/// history is too short
pub(crate) fn price_change(closes: &[f64], days: usize) -> f64 {
    if closes.len() <= days {
        return 0.0;
    }
    let current = closes[closes.len() - 1];
    let past = closes[closes.len() - days - 1];
    if past == 0.0 {
        0.0
    } else {
        (current - past) / past
    }
}

/// Trailing mean over `window` closes (or all closes if fewer)
pub(crate) fn moving_average(closes: &[f64], window: usize) -> f64 {
    let tail = &closes[closes.len().saturating_sub(window)..];
    if tail.is_empty() {
        0.0
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    }
}

/// Simple-average RSI over the last `period` moves
pub(crate) fn rsi(closes: &[f64], period: usize) -> f64 {
    let start = closes.len().saturating_sub(period + 1);
    let window = &closes[start..];
    if window.len() < 2 {
        return 50.0;
    }

    let (gain, loss) = window.windows(2).fold((0.0, 0.0), |(g, l), w| {
        let delta = w[1] - w[0];
        if delta > 0.0 {
            (g + delta, l)
        } else {
            (g, l - delta)
        }
    });

    match (gain > 0.0, loss > 0.0) {
        (false, false) => 50.0,
        (_, false) => 100.0,
        _ => 100.0 - 100.0 / (1.0 + gain / loss),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values.iter().copied());
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

// ===== Basket analysis =====

pub(crate) fn analyze(snapshots: &[MarketSnapshot]) -> MarketAnalysis {
    let total = snapshots.len().max(1) as f64;
    let above_ma50 = snapshots
        .iter()
        .filter(|s| s.current_price > s.moving_avg_50)
        .count() as f64
        / total;
    let above_ma200 = snapshots
        .iter()
        .filter(|s| s.current_price > s.moving_avg_200)
        .count() as f64
        / total;

    let trend = if above_ma50 > 0.7 && above_ma200 > 0.6 {
        "bullish"
    } else if above_ma50 < 0.3 && above_ma200 < 0.4 {
        "bearish"
    } else {
        "neutral"
    };

    let avg_rsi = mean(snapshots.iter().map(|s| s.rsi));
    let momentum = if avg_rsi > 70.0 {
        "overbought"
    } else if avg_rsi < 30.0 {
        "oversold"
    } else if avg_rsi > 50.0 && avg_rsi < 60.0 {
        "positive"
    } else if avg_rsi > 40.0 && avg_rsi < 50.0 {
        "negative"
    } else {
        "neutral"
    };

    let daily: Vec<f64> = snapshots.iter().map(|s| s.price_change_1d).collect();

    MarketAnalysis {
        trend,
        momentum,
        avg_rsi,
        avg_price_change_1m: mean(snapshots.iter().map(|s| s.price_change_1m)),
        above_ma50_pct: above_ma50,
        above_ma200_pct: above_ma200,
        volatility: population_std(&daily),
        market_breadth: breadth(&daily),
    }
}

fn breadth(daily_changes: &[f64]) -> &'static str {
    let advancing = daily_changes.iter().filter(|c| **c > 0.0).count();
    let declining = daily_changes.iter().filter(|c| **c < 0.0).count();

    if advancing > declining * 2 {
        "very_positive"
    } else if advancing > declining {
        "positive"
    } else if declining > advancing * 2 {
        "very_negative"
    } else if declining > advancing {
        "negative"
    } else {
        "neutral"
    }
}

fn recommendations(analysis: &MarketAnalysis, tolerance: RiskTolerance) -> Vec<String> {
    let mut out = Vec::new();

    match analysis.trend {
        "bullish" => out.push("Market conditions favorable for equity positions"),
        "bearish" => out.push("Consider defensive positions or cash allocation"),
        _ => {}
    }

    match analysis.momentum {
        "oversold" => out.push("Potential buying opportunity for contrarian investors"),
        "overbought" => out.push("Exercise caution with new long positions"),
        _ => {}
    }

    if analysis.volatility > 0.02 {
        out.push("High volatility detected - consider position sizing adjustments");
    }

    if tolerance == RiskTolerance::Conservative && analysis.volatility > 0.015 {
        out.push("Current market volatility may exceed risk tolerance");
    }

    out.into_iter().map(str::to_string).collect()
}
