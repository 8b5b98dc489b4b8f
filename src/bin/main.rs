use investment_orchestrator::{
    audit::AuditRecorder,
    config::OrchestratorConfig,
    data::SimulatedMarketData,
    intake::QueryOverrides,
    models::{Recommendation, RiskTolerance},
    orchestrator::Orchestrator,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const BETA_QUERY: &str = "I have $30,000 that I want to invest in highly liquid financial \
    investment vehicles in the United States with betas ranging from 0.4 to 0.8. \
    Please generate a list of potential investments and the amount I should invest \
    in each of them in order to obtain good diversification.";

const CONSERVATIVE_QUERY: &str = "I have $50,000 for conservative investment. I'm near \
    retirement and need stable income with minimal risk.";

const GROWTH_QUERY: &str = "I want to invest $100,000 aggressively for long-term growth. \
    I can tolerate significant volatility.";

fn print_recommendation(rec: &Recommendation) {
    println!("\n{}", "=".repeat(60));
    println!("INVESTMENT RECOMMENDATION");
    println!("{}", "=".repeat(60));
    println!("Recommendation ID: {}", rec.recommendation_id);
    println!("Timestamp: {}", rec.timestamp.to_rfc3339());
    println!("Confidence Score: {:.2}%", rec.confidence_score * 100.0);
    if rec.human_review_required {
        println!("\n*** HUMAN REVIEW REQUIRED ***");
    }

    println!("\n--- PORTFOLIO ALLOCATION ---");
    for (symbol, weight) in &rec.portfolio {
        let amount = rec.context.capital_available * weight;
        println!("{:10} {:>7.2}%  ${:>12.2}", symbol, weight * 100.0, amount);
    }

    println!("\n--- RISK METRICS ---");
    for (metric, value) in &rec.risk_metrics {
        println!("{:25} {:>10.4}", metric, value);
    }

    println!("\n--- EXPECTED RETURNS ---");
    for (metric, value) in &rec.expected_returns {
        if metric.contains("dollar") {
            println!("{:25} ${:>10.2}", metric, value);
        } else {
            println!("{:25} {:>10.4}", metric, value);
        }
    }

    if !rec.warnings.is_empty() {
        println!("\n--- WARNINGS ---");
        for warning in &rec.warnings {
            println!("- {}", warning);
        }
    }

    if !rec.reasoning.is_empty() {
        println!("\n--- ANALYSIS ---");
        for reason in &rec.reasoning {
            println!("- {}", reason);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = OrchestratorConfig::from_env();
    if config.audit_log_path.is_none() {
        config.audit_log_path = Some(PathBuf::from("audit.log"));
    }

    info!(seed = config.optimizer_seed, "Investment orchestrator demo starting");

    let audit = Arc::new(
        AuditRecorder::open(config.audit_log_path.as_deref())
            .with_retention(config.audit_retained_requests),
    );
    let data = Arc::new(SimulatedMarketData::new(config.optimizer_seed));
    let orchestrator = Orchestrator::new(&config, audit.clone(), data);

    let examples = [
        ("Beta-Constrained Portfolio (0.4-0.8)", BETA_QUERY, QueryOverrides::default()),
        (
            "Conservative Retirement Portfolio",
            CONSERVATIVE_QUERY,
            QueryOverrides {
                user_id: Some("conservative_investor".to_string()),
                investment_horizon: Some("3 years".to_string()),
                goals: Some(vec!["income".to_string(), "capital_preservation".to_string()]),
                ..Default::default()
            },
        ),
        (
            "Aggressive Growth Portfolio",
            GROWTH_QUERY,
            QueryOverrides {
                user_id: Some("growth_investor".to_string()),
                risk_tolerance: Some(RiskTolerance::Aggressive),
                investment_horizon: Some("10 years".to_string()),
                goals: Some(vec!["growth".to_string(), "wealth_accumulation".to_string()]),
                ..Default::default()
            },
        ),
    ];

    for (i, (title, query, overrides)) in examples.iter().enumerate() {
        println!("\nExample {}: {}", i + 1, title);
        match orchestrator.process_query(query, overrides).await {
            Ok(rec) => print_recommendation(&rec),
            Err(e) => {
                error!(example = title, error = %e, "Example request failed");
                eprintln!("Request failed: {}", e);
            }
        }
    }

    audit.close();
    Ok(())
}
