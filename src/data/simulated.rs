//! Seeded simulated feeds
//!
//! Stand-in for real market, news and social APIs. Each call derives its own
//! generator from the configured seed and the requested symbols, so output is
//! reproducible regardless of call order or concurrency.

use super::{MarketDataSource, NewsItem, PriceHistory, Quote, SocialPost};
use crate::Result;
use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rand_pcg::Pcg64;

const NEWS_SOURCES: &[&str] = &[
    "Financial Times",
    "Wall Street Journal",
    "Bloomberg",
    "Reuters",
    "CNBC",
    "MarketWatch",
    "The Economist",
];

const PLATFORMS: &[(&str, f64)] = &[
    ("Twitter", 0.7),
    ("Reddit", 0.6),
    ("StockTwits", 0.5),
    ("LinkedIn", 0.8),
];

pub struct SimulatedMarketData {
    seed: u64,
}

impl SimulatedMarketData {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn rng_for(&self, stream: &str, key: &str) -> Pcg64 {
        Pcg64::seed_from_u64(self.seed ^ fnv1a(stream) ^ fnv1a(key).rotate_left(17))
    }
}

/// FNV-1a, stable across runs and platforms
fn fnv1a(input: &str) -> u64 {
    input.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn pick<'a>(rng: &mut Pcg64, options: &[&'a str]) -> &'a str {
    options.choose(rng).copied().unwrap_or_default()
}

fn news_title(rng: &mut Pcg64, symbol: &str) -> String {
    let templates = [
        format!("{} Reports Strong Quarterly Earnings", symbol),
        format!("Analysts Upgrade {} Following Product Launch", symbol),
        format!("{} Faces Regulatory Scrutiny", symbol),
        format!("Market Volatility Impacts {} Trading", symbol),
        format!("{} Announces Strategic Partnership", symbol),
        format!("Investors Eye {} Ahead of Fed Decision", symbol),
        format!("{} Stock Rallies on Positive Guidance", symbol),
    ];
    let i = rng.gen_range(0..templates.len());
    templates[i].clone()
}

fn news_content(rng: &mut Pcg64, symbol: &str, title: &str) -> String {
    let roll: f64 = rng.gen();
    if roll < 0.4 {
        format!(
            "{}. {} has shown strong performance with revenue growth exceeding analyst \
             expectations. The company's innovative approach and strategic expansion plans \
             have positioned it well for future growth. Investors remain bullish on the \
             stock's prospects.",
            title, symbol
        )
    } else if roll < 0.7 {
        format!(
            "{}. {} faces challenges as market conditions remain uncertain. Concerns about \
             regulatory compliance and increasing competition have led to a bearish outlook. \
             Analysts suggest caution as the company navigates through these headwinds.",
            title, symbol
        )
    } else {
        format!(
            "{}. {} maintains steady operations amid mixed market signals. The company \
             continues to execute its business plan while monitoring market conditions. \
             Analysts maintain a neutral stance as they await further developments.",
            title, symbol
        )
    }
}

fn post_content(rng: &mut Pcg64, symbol: &str) -> String {
    let templates = [
        format!("${} looking strong today! Breakout incoming?", symbol),
        format!("Time to take profits on ${}? Getting overextended here", symbol),
        format!("${} holding support well. Adding to position", symbol),
        format!("Bearish on ${} short term. Too much resistance overhead", symbol),
        format!("${} chart setup is perfect for a swing trade", symbol),
        format!("Watching ${} closely. Key levels to watch...", symbol),
        format!("${} earnings next week. Playing it safe", symbol),
        format!("Long ${} here. Fundamentals are solid", symbol),
    ];
    let i = rng.gen_range(0..templates.len());
    templates[i].clone()
}

#[async_trait::async_trait]
impl MarketDataSource for SimulatedMarketData {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        let mut rng = self.rng_for("quote", symbol);

        Ok(Quote {
            symbol: symbol.to_string(),
            price: rng.gen_range(10.0..500.0),
            volume: rng.gen_range(1_000_000..50_000_000),
            market_cap: rng.gen_range(1e9..1e12),
            pe_ratio: Some(rng.gen_range(10.0..40.0)),
            dividend_yield: Some(rng.gen_range(0.0..0.05)),
            beta: rng.gen_range(0.5..2.0),
            change_percent: rng.gen_range(-0.05..0.05),
        })
    }

    async fn fetch_history(&self, symbol: &str, days: usize) -> Result<PriceHistory> {
        let mut rng = self.rng_for("history", symbol);

        // Geometric random walk around 100
        let mut price = 100.0_f64;
        let mut closes = Vec::with_capacity(days);
        for _ in 0..days {
            let shock: f64 = StandardNormal.sample(&mut rng);
            price *= 1.0 + 0.0004 + 0.012 * shock;
            price = price.max(1.0);
            closes.push(price);
        }

        Ok(PriceHistory {
            symbol: symbol.to_string(),
            closes,
        })
    }

    async fn fetch_news(&self, symbols: &[String], days: i64) -> Result<Vec<NewsItem>> {
        let now = Utc::now();
        let days = days.max(1);
        let mut items = Vec::new();

        for symbol in symbols {
            let mut rng = self.rng_for("news", symbol);
            for i in 0..rng.gen_range(3..8) {
                let title = news_title(&mut rng, symbol);
                let content = news_content(&mut rng, symbol, &title);
                let age = Duration::days(rng.gen_range(0..days)) + Duration::hours(rng.gen_range(0..24));

                items.push(NewsItem {
                    title,
                    source: pick(&mut rng, NEWS_SOURCES).to_string(),
                    url: format!("https://news.example.com/{}/{}", symbol, i),
                    published_at: now - age,
                    content,
                });
            }
        }

        Ok(items)
    }

    async fn fetch_social(&self, symbols: &[String]) -> Result<Vec<SocialPost>> {
        let now = Utc::now();
        let mut posts = Vec::new();

        for symbol in symbols {
            let mut rng = self.rng_for("social", symbol);
            for _ in 0..rng.gen_range(5..15) {
                let content = post_content(&mut rng, symbol);
                let (platform, base_influence) =
                    PLATFORMS[rng.gen_range(0..PLATFORMS.len())];
                let age = Duration::hours(rng.gen_range(0..72)) + Duration::minutes(rng.gen_range(0..60));

                posts.push(SocialPost {
                    platform: platform.to_string(),
                    author: format!("user_{}", rng.gen_range(1000..9999)),
                    content,
                    timestamp: now - age,
                    engagement: rng.gen_range(10..10_000),
                    influence_score: base_influence * rng.gen_range(0.1..1.0),
                });
            }
        }

        Ok(posts)
    }
}
