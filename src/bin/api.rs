use investment_orchestrator::{
    api::start_server, audit::AuditRecorder, config::OrchestratorConfig,
    data::SimulatedMarketData, orchestrator::Orchestrator,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    let mut config = OrchestratorConfig::from_env();
    if config.audit_log_path.is_none() {
        config.audit_log_path = Some(PathBuf::from("audit.log"));
    }

    info!(port = api_port, audit_log = ?config.audit_log_path, "Investment orchestrator API starting");

    let audit = Arc::new(
        AuditRecorder::open(config.audit_log_path.as_deref())
            .with_retention(config.audit_retained_requests),
    );
    let data = Arc::new(SimulatedMarketData::new(config.optimizer_seed));
    let orchestrator = Arc::new(Orchestrator::new(&config, audit.clone(), data));

    start_server(orchestrator, api_port).await?;

    audit.close();
    info!("Audit sink closed");

    Ok(())
}
