//! Market data collaborators
//!
//! The agents read quotes, price history, news and social posts through
//! `MarketDataSource` so tests can inject deterministic fixtures instead of
//! the simulated feeds.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod simulated;

pub use simulated::SimulatedMarketData;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub volume: u64,
    pub market_cap: f64,
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: f64,
    pub change_percent: f64,
}

/// Daily closes, oldest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistory {
    pub symbol: String,
    pub closes: Vec<f64>,
}

impl PriceHistory {
    /// Simple daily returns, one shorter than `closes`
    pub fn returns(&self) -> Vec<f64> {
        self.closes
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPost {
    pub platform: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub engagement: u64,
    pub influence_score: f64,
}

/// Narrow feed interface consumed by the agents
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote>;
    async fn fetch_history(&self, symbol: &str, days: usize) -> Result<PriceHistory>;
    async fn fetch_news(&self, symbols: &[String], days: i64) -> Result<Vec<NewsItem>>;
    async fn fetch_social(&self, symbols: &[String]) -> Result<Vec<SocialPost>>;
}
