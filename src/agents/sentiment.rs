//! Sentiment analysis agent
//!
//! Lexicon scoring of news and social posts, weighted by recency, source
//! and engagement, blended 60/40 into one overall label.

use super::{audited, Agent};
use crate::audit::AuditRecorder;
use crate::data::{MarketDataSource, NewsItem, SocialPost};
use crate::models::{AgentType, RequestContext, Task};
use crate::planner::DEFAULT_SENTIMENT_BASKET;
use crate::Result;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

const AGENT_NAME: &str = "SentimentAnalysisAgent";
const NEWS_LOOKBACK_DAYS: i64 = 7;
const NEWS_WEIGHT: f64 = 0.6;
const SOCIAL_WEIGHT: f64 = 0.4;
const PREMIUM_OUTLETS: &[&str] = &["Financial Times", "Wall Street Journal"];

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\b\w+\b").expect("word pattern is a valid regex");

    static ref POSITIVE_WORDS: HashSet<&'static str> = [
        "bullish", "growth", "profit", "gain", "rise", "increase", "strong",
        "outperform", "beat", "exceed", "surge", "rally", "breakthrough",
        "innovative", "expansion", "success", "optimistic", "favorable",
        "upgrade", "positive", "boom", "soar", "jump", "climb", "advance",
    ]
    .into_iter()
    .collect();

    static ref NEGATIVE_WORDS: HashSet<&'static str> = [
        "bearish", "loss", "decline", "fall", "drop", "decrease", "weak",
        "underperform", "miss", "deficit", "crash", "plunge", "collapse",
        "concern", "risk", "failure", "pessimistic", "unfavorable",
        "downgrade", "negative", "recession", "sink", "tumble", "retreat",
    ]
    .into_iter()
    .collect();

    static ref NEUTRAL_WORDS: HashSet<&'static str> = [
        "steady", "unchanged", "flat", "stable", "maintain", "hold",
        "moderate", "average", "normal", "typical", "standard", "regular",
    ]
    .into_iter()
    .collect();

    static ref STOPWORDS: HashSet<&'static str> = [
        "the", "is", "at", "which", "on", "a", "an", "as", "are", "was",
        "were", "be", "have", "has", "had", "do", "does", "did", "will",
        "would", "could", "should", "may", "might", "must", "can", "shall",
        "to", "of", "in", "for", "with", "from", "up", "about", "into",
        "through", "during", "before", "after", "above", "below", "between",
    ]
    .into_iter()
    .collect();
}

// ===== Text scoring =====

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SentimentScore {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub compound: f64,
    pub confidence: f64,
}

impl SentimentScore {
    const NEUTRAL: SentimentScore = SentimentScore {
        positive: 0.0,
        negative: 0.0,
        neutral: 1.0,
        compound: 0.0,
        confidence: 0.3,
    };
}

fn words(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

pub fn score_text(text: &str) -> SentimentScore {
    let words = words(text);

    let count = |lexicon: &HashSet<&'static str>| {
        words.iter().filter(|w| lexicon.contains(w.as_str())).count() as f64
    };
    let positive = count(&*POSITIVE_WORDS);
    let negative = count(&*NEGATIVE_WORDS);
    let neutral = count(&*NEUTRAL_WORDS);
    let total = positive + negative + neutral;

    if total == 0.0 {
        return SentimentScore::NEUTRAL;
    }

    SentimentScore {
        positive: positive / total,
        negative: negative / total,
        neutral: neutral / total,
        compound: (positive - negative) / total,
        confidence: (total / words.len() as f64).min(1.0),
    }
}

/// Most frequent non-stopword terms longer than three characters
fn keywords(text: &str, top_n: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in words(text) {
        if word.len() > 3 && !STOPWORDS.contains(word.as_str()) {
            *counts.entry(word).or_default() += 1;
        }
    }
    ranked(counts, top_n).into_iter().map(|(w, _)| w).collect()
}

/// Count-descending, then alphabetical
fn ranked(counts: HashMap<String, usize>, top_n: usize) -> Vec<(String, usize)> {
    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(top_n);
    entries
}

// ===== Aggregation =====

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateSentiment {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub compound: f64,
}

impl AggregateSentiment {
    const NEUTRAL: AggregateSentiment = AggregateSentiment {
        positive: 0.0,
        negative: 0.0,
        neutral: 1.0,
        compound: 0.0,
    };

    fn weighted(scored: &[(SentimentScore, f64)]) -> Self {
        let total: f64 = scored.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Self::NEUTRAL;
        }

        let avg = |f: fn(&SentimentScore) -> f64| {
            scored.iter().map(|(s, w)| f(s) * w).sum::<f64>() / total
        };

        Self {
            positive: avg(|s| s.positive),
            negative: avg(|s| s.negative),
            neutral: avg(|s| s.neutral),
            compound: avg(|s| s.compound),
        }
    }
}

pub(crate) fn recency_weight(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = (now - timestamp).num_minutes() as f64 / 60.0;
    if hours < 24.0 {
        1.0
    } else if hours < 72.0 {
        0.8
    } else if hours < 168.0 {
        0.6
    } else {
        0.4
    }
}

fn news_sentiment(items: &[NewsItem], now: DateTime<Utc>) -> AggregateSentiment {
    let scored: Vec<(SentimentScore, f64)> = items
        .iter()
        .map(|item| {
            let score = score_text(&item.content);
            let source_weight = if PREMIUM_OUTLETS.contains(&item.source.as_str()) {
                1.2
            } else {
                1.0
            };
            let weight = recency_weight(item.published_at, now) * source_weight * score.confidence;
            (score, weight)
        })
        .collect();

    AggregateSentiment::weighted(&scored)
}

fn social_sentiment(posts: &[SocialPost], now: DateTime<Utc>) -> AggregateSentiment {
    let scored: Vec<(SentimentScore, f64)> = posts
        .iter()
        .map(|post| {
            let engagement = ((post.engagement as f64).ln_1p() / 10.0).min(2.0);
            let weight = recency_weight(post.timestamp, now) * engagement * post.influence_score;
            (score_text(&post.content), weight)
        })
        .collect();

    AggregateSentiment::weighted(&scored)
}

pub(crate) fn overall_label(news: &AggregateSentiment, social: &AggregateSentiment) -> &'static str {
    let compound = news.compound * NEWS_WEIGHT + social.compound * SOCIAL_WEIGHT;

    if compound > 0.3 {
        "very_positive"
    } else if compound > 0.1 {
        "positive"
    } else if compound < -0.3 {
        "very_negative"
    } else if compound < -0.1 {
        "negative"
    } else {
        "neutral"
    }
}

/// Compares the newest third of all items against the oldest third
fn sentiment_trend(items: &[NewsItem], posts: &[SocialPost]) -> Value {
    let mut series: Vec<(DateTime<Utc>, f64)> = items
        .iter()
        .map(|i| (i.published_at, score_text(&i.content).compound))
        .chain(posts.iter().map(|p| (p.timestamp, score_text(&p.content).compound)))
        .collect();

    if series.len() < 2 {
        return json!({ "trend": "insufficient_data", "momentum": 0.0 });
    }

    series.sort_by_key(|(ts, _)| *ts);
    let third = (series.len() / 3).max(1);
    let mean = |slice: &[(DateTime<Utc>, f64)]| {
        slice.iter().map(|(_, s)| s).sum::<f64>() / slice.len() as f64
    };

    let older = mean(&series[..third]);
    let recent = mean(&series[series.len() - third..]);
    let momentum = recent - older;

    let trend = if momentum > 0.2 {
        "improving"
    } else if momentum < -0.2 {
        "deteriorating"
    } else {
        "stable"
    };

    json!({
        "trend": trend,
        "momentum": momentum,
        "recent_sentiment": recent,
        "older_sentiment": older,
    })
}

fn key_topics(items: &[NewsItem]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for item in items {
        for word in keywords(&item.content, 10) {
            *counts.entry(word).or_default() += 1;
        }
    }
    ranked(counts, 10)
}

// ===== Agent =====

pub struct SentimentAnalysisAgent {
    audit: Arc<AuditRecorder>,
    data: Arc<dyn MarketDataSource>,
}

impl SentimentAnalysisAgent {
    pub fn new(audit: Arc<AuditRecorder>, data: Arc<dyn MarketDataSource>) -> Self {
        Self { audit, data }
    }

    async fn run(&self, symbols: &[String], context: &RequestContext) -> Result<(Value, Value)> {
        let (news, posts) = tokio::try_join!(
            self.data.fetch_news(symbols, NEWS_LOOKBACK_DAYS),
            self.data.fetch_social(symbols)
        )?;

        let now = Utc::now();
        let news_agg = news_sentiment(&news, now);
        let social_agg = social_sentiment(&posts, now);
        let overall = overall_label(&news_agg, &social_agg);

        let sources: Vec<String> = news
            .iter()
            .map(|n| n.source.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        info!(
            request_id = %context.request_id,
            overall,
            news = news.len(),
            posts = posts.len(),
            "Sentiment analysis complete"
        );

        let result = json!({
            "overall": overall,
            "news_sentiment": news_agg,
            "social_sentiment": social_agg,
            "trend_analysis": sentiment_trend(&news, &posts),
            "key_topics": key_topics(&news),
            "news_items_analyzed": news.len(),
            "social_posts_analyzed": posts.len(),
            "sources": sources,
            "timestamp": now.to_rfc3339(),
        });

        let completed = json!({
            "overall_sentiment": overall,
            "items_analyzed": news.len() + posts.len(),
        });

        Ok((result, completed))
    }
}

#[async_trait::async_trait]
impl Agent for SentimentAnalysisAgent {
    fn name(&self) -> &'static str {
        AGENT_NAME
    }

    fn agent_type(&self) -> AgentType {
        AgentType::SentimentAnalysis
    }

    async fn process(&self, task: &mut Task, context: &RequestContext) -> Result<Value> {
        let mut symbols = task.symbols();
        if symbols.is_empty() {
            symbols = DEFAULT_SENTIMENT_BASKET.iter().map(|s| s.to_string()).collect();
        }

        let started = json!({ "task_id": task.task_id, "symbols": symbols });
        audited(
            &self.audit,
            task,
            context,
            AGENT_NAME,
            "SENTIMENT_ANALYSIS",
            started,
            self.run(&symbols, context),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::FixtureMarketData;
    use crate::error::OrchestrationError;
    use crate::models::{RiskTolerance, TaskPriority};
    use chrono::Duration;

    #[test]
    fn test_score_text() {
        let score = score_text("Strong growth, but one concern.");
        assert!((score.positive - 2.0 / 3.0).abs() < 1e-12);
        assert!((score.compound - 1.0 / 3.0).abs() < 1e-12);
        assert!((score.confidence - 3.0 / 5.0).abs() < 1e-12);

        assert_eq!(score_text("nothing to see here"), SentimentScore::NEUTRAL);
    }

    #[test]
    fn test_recency_buckets() {
        let now = Utc::now();
        assert_eq!(recency_weight(now - Duration::hours(1), now), 1.0);
        assert_eq!(recency_weight(now - Duration::hours(30), now), 0.8);
        assert_eq!(recency_weight(now - Duration::hours(100), now), 0.6);
        assert_eq!(recency_weight(now - Duration::days(30), now), 0.4);
    }

    #[test]
    fn test_overall_label_blend() {
        let agg = |compound| AggregateSentiment {
            compound,
            ..AggregateSentiment::NEUTRAL
        };
        assert_eq!(overall_label(&agg(1.0), &agg(0.0)), "very_positive");
        assert_eq!(overall_label(&agg(0.2), &agg(0.0)), "positive");
        assert_eq!(overall_label(&agg(0.0), &agg(0.0)), "neutral");
        assert_eq!(overall_label(&agg(-0.2), &agg(-0.1)), "negative");
        assert_eq!(overall_label(&agg(-1.0), &agg(-1.0)), "very_negative");
    }

    #[test]
    fn test_keywords_skip_stopwords_and_short_words() {
        let words = keywords("The growth of growth stocks is real growth", 2);
        assert_eq!(words, vec!["growth", "real"]);
    }

    #[tokio::test]
    async fn test_fixture_feed_reads_positive() {
        let agent = SentimentAnalysisAgent::new(
            Arc::new(AuditRecorder::in_memory()),
            Arc::new(FixtureMarketData::rising()),
        );
        let ctx = RequestContext::new("sa", RiskTolerance::Moderate, "5 years", 10_000.0);
        let mut task = Task::new(
            ctx.request_id,
            AgentType::SentimentAnalysis,
            TaskPriority::Medium,
            json!({ "symbols": ["AAPL"] }),
            None,
        );

        let result = agent.process(&mut task, &ctx).await.unwrap();

        assert_eq!(result["overall"], "very_positive");
        assert_eq!(result["sources"], json!(["Bloomberg", "Reuters"]));
        assert_eq!(result["news_items_analyzed"], 2);
        assert_eq!(result["social_posts_analyzed"], 1);
        assert_eq!(task.audit_trail.len(), 2);
        assert_eq!(task.audit_trail[1].action, "SENTIMENT_ANALYSIS_COMPLETED");
    }

    #[tokio::test]
    async fn test_feed_failure_fails_task() {
        let feed = FixtureMarketData {
            failing: vec!["AAPL".to_string()],
            drift: 0.0,
        };
        let agent = SentimentAnalysisAgent::new(Arc::new(AuditRecorder::in_memory()), Arc::new(feed));
        let ctx = RequestContext::new("sa", RiskTolerance::Moderate, "5 years", 10_000.0);
        let mut task = Task::new(
            ctx.request_id,
            AgentType::SentimentAnalysis,
            TaskPriority::Medium,
            json!({}),
            None,
        );

        let err = agent.process(&mut task, &ctx).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::AgentFailure(_)));
        assert_eq!(task.audit_trail[0].details["symbols"], json!(["AAPL", "GOOGL", "MSFT"]));
        assert_eq!(task.audit_trail[1].action, "SENTIMENT_ANALYSIS_FAILED");
    }
}
