//! Task graph construction
//!
//! Decomposes one request into the fixed four-task tree:
//!
//! ```text
//! market_research (HIGH) ── risk_assessment (HIGH) ── portfolio_construction (CRITICAL)
//! sentiment_analysis (MEDIUM)
//! ```

use crate::models::{AgentType, RequestContext, Task, TaskPriority};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

lazy_static! {
    /// Ticker-like tokens: 2 to 5 uppercase letters on word boundaries
    static ref SYMBOL_PATTERN: Regex =
        Regex::new(r"\b[A-Z]{2,5}\b").expect("symbol pattern is a valid regex");
}

pub const DEFAULT_MARKET_BASKET: &[&str] = &["SPY", "QQQ", "DIA"];
pub const DEFAULT_SENTIMENT_BASKET: &[&str] = &["AAPL", "GOOGL", "MSFT"];

/// Trait for request decomposition
pub trait TaskPlanner: Send + Sync {
    fn decompose(&self, query: &str, context: &RequestContext) -> Vec<Task>;
}

/// Deterministic builder for the fixed task tree
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskGraphBuilder;

impl TaskPlanner for TaskGraphBuilder {
    fn decompose(&self, query: &str, context: &RequestContext) -> Vec<Task> {
        let symbols = extract_symbols(query);
        let request_id = context.request_id;

        let market_research = Task::new(
            request_id,
            AgentType::MarketResearch,
            TaskPriority::High,
            json!({
                "query": query,
                "symbols": symbols_or(&symbols, DEFAULT_MARKET_BASKET),
            }),
            None,
        );

        let sentiment = Task::new(
            request_id,
            AgentType::SentimentAnalysis,
            TaskPriority::Medium,
            json!({
                "query": query,
                "symbols": symbols_or(&symbols, DEFAULT_SENTIMENT_BASKET),
            }),
            None,
        );

        let risk = Task::new(
            request_id,
            AgentType::RiskAssessment,
            TaskPriority::High,
            json!({ "risk_tolerance": context.risk_tolerance }),
            Some(market_research.task_id),
        );

        let portfolio = Task::new(
            request_id,
            AgentType::PortfolioConstruction,
            TaskPriority::Critical,
            portfolio_payload(context),
            Some(risk.task_id),
        );

        vec![market_research, sentiment, risk, portfolio]
    }
}

/// Uppercase tokens of length >= 2, first occurrence order, deduplicated
pub fn extract_symbols(query: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for m in SYMBOL_PATTERN.find_iter(query) {
        if !symbols.iter().any(|s| s == m.as_str()) {
            symbols.push(m.as_str().to_string());
        }
    }
    symbols
}

fn symbols_or(symbols: &[String], basket: &[&str]) -> Vec<String> {
    if symbols.is_empty() {
        basket.iter().map(|s| s.to_string()).collect()
    } else {
        symbols.to_vec()
    }
}

fn portfolio_payload(context: &RequestContext) -> Value {
    let mut payload = Map::new();
    payload.insert("capital".into(), json!(context.capital_available));

    if let Some(range) = context.beta_range {
        payload.insert("min_beta".into(), json!(range.min));
        payload.insert("max_beta".into(), json!(range.max));
    }
    if let Some(liquidity) = context.min_liquidity {
        payload.insert("min_liquidity".into(), json!(liquidity));
    }

    Value::Object(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RiskTolerance, TaskStatus};

    fn context() -> RequestContext {
        RequestContext::new("planner", RiskTolerance::Moderate, "5 years", 30_000.0)
    }

    #[test]
    fn test_decompose_builds_fixed_tree() {
        let ctx = context();
        let tasks = TaskGraphBuilder.decompose("How are AAPL and MSFT doing?", &ctx);

        assert_eq!(tasks.len(), 4);
        let types: Vec<AgentType> = tasks.iter().map(|t| t.agent_type).collect();
        assert_eq!(
            types,
            vec![
                AgentType::MarketResearch,
                AgentType::SentimentAnalysis,
                AgentType::RiskAssessment,
                AgentType::PortfolioConstruction,
            ]
        );

        assert_eq!(tasks[0].priority, TaskPriority::High);
        assert_eq!(tasks[1].priority, TaskPriority::Medium);
        assert_eq!(tasks[2].priority, TaskPriority::High);
        assert_eq!(tasks[3].priority, TaskPriority::Critical);

        assert_eq!(tasks[0].parent_task_id, None);
        assert_eq!(tasks[1].parent_task_id, None);
        assert_eq!(tasks[2].parent_task_id, Some(tasks[0].task_id));
        assert_eq!(tasks[3].parent_task_id, Some(tasks[2].task_id));

        for task in &tasks {
            assert_eq!(task.request_id, ctx.request_id);
            assert_eq!(task.status, TaskStatus::Pending);
        }

        assert_eq!(tasks[0].symbols(), vec!["AAPL", "MSFT"]);
        assert_eq!(tasks[1].symbols(), vec!["AAPL", "MSFT"]);
        assert_eq!(tasks[2].payload["risk_tolerance"], "moderate");
        assert_eq!(tasks[3].payload["capital"], 30_000.0);
    }

    #[test]
    fn test_default_baskets_when_no_symbols() {
        let tasks = TaskGraphBuilder.decompose("i have some money to invest", &context());
        assert_eq!(tasks[0].symbols(), vec!["SPY", "QQQ", "DIA"]);
        assert_eq!(tasks[1].symbols(), vec!["AAPL", "GOOGL", "MSFT"]);
    }

    #[test]
    fn test_extract_symbols_rules() {
        assert_eq!(
            extract_symbols("Should I buy TSLA, NVDA or TSLA? I think A is fine."),
            vec!["TSLA", "NVDA"]
        );
        assert!(extract_symbols("lowercase only").is_empty());
        assert!(extract_symbols("TOOLONGNAME").is_empty());
    }

    #[test]
    fn test_portfolio_payload_carries_overrides() {
        let ctx = context().with_beta_range(0.4, 0.8).with_min_liquidity(0.9);
        let tasks = TaskGraphBuilder.decompose("invest", &ctx);
        let payload = &tasks[3].payload;
        assert_eq!(payload["min_beta"], 0.4);
        assert_eq!(payload["max_beta"], 0.8);
        assert_eq!(payload["min_liquidity"], 0.9);

        let plain = TaskGraphBuilder.decompose("invest", &context());
        assert!(plain[3].payload.get("min_beta").is_none());
    }

    #[test]
    fn test_task_ids_are_unique() {
        let tasks = TaskGraphBuilder.decompose("invest", &context());
        let mut ids: Vec<_> = tasks.iter().map(|t| t.task_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }
}
