//! REST API for the investment orchestrator
//!
//! Exposes request processing and audit replay over HTTP

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::OrchestrationError;
use crate::intake::QueryOverrides;
use crate::orchestrator::Orchestrator;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationRequest {
    pub query: String,
    #[serde(flatten)]
    pub overrides: QueryOverrides,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

fn status_for(err: &OrchestrationError) -> StatusCode {
    match err {
        OrchestrationError::ValidationError(_) => StatusCode::BAD_REQUEST,
        OrchestrationError::OptimizationInfeasible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Recommendation Endpoint
/// =============================

async fn create_recommendation(
    State(state): State<ApiState>,
    Json(req): Json<RecommendationRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(query = %req.query, "Received recommendation request");

    match state
        .orchestrator
        .process_query(&req.query, &req.overrides)
        .await
    {
        Ok(recommendation) => (StatusCode::OK, Json(ApiResponse::success(recommendation))),
        Err(e) => {
            let status = status_for(&e);
            warn!(status = status.as_u16(), error = %e, "Recommendation request failed");
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// =============================
/// Audit Replay Endpoint
/// =============================

async fn audit_trail(
    State(state): State<ApiState>,
    Path(request_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let Ok(request_id) = Uuid::parse_str(&request_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("Invalid request id '{}'", request_id))),
        );
    };

    let entries = state.orchestrator.audit().entries_for_request(request_id);
    if entries.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("No audit entries for request {}", request_id))),
        );
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "request_id": request_id,
            "entries": entries,
        }))),
    )
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/recommendations", post(create_recommendation))
        .route("/api/v1/audit/:request_id", get(audit_trail))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditRecorder;
    use crate::config::OrchestratorConfig;
    use crate::data::fixtures::FixtureMarketData;

    fn state() -> ApiState {
        ApiState {
            orchestrator: Arc::new(Orchestrator::new(
                &OrchestratorConfig::default(),
                Arc::new(AuditRecorder::in_memory()),
                Arc::new(FixtureMarketData::rising()),
            )),
        }
    }

    fn request(body: serde_json::Value) -> Json<RecommendationRequest> {
        Json(serde_json::from_value(body).unwrap())
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&OrchestrationError::ValidationError("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&OrchestrationError::OptimizationInfeasible("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&OrchestrationError::ConfigurationError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_request_body_flattens_overrides() {
        let Json(req) = request(serde_json::json!({
            "query": "invest",
            "risk_tolerance": "very_aggressive",
            "beta_range": [0.9, 1.4],
            "restrictions": ["GLD"],
        }));
        assert_eq!(req.overrides.beta_range, Some((0.9, 1.4)));
        assert_eq!(req.overrides.restrictions, vec!["GLD"]);
        assert!(req.overrides.capital.is_none());
    }

    #[tokio::test]
    async fn test_recommendation_then_audit_replay() {
        let state = state();

        let (status, Json(response)) = create_recommendation(
            State(state.clone()),
            request(serde_json::json!({ "query": "I have $20,000 to invest", "user_id": "api" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(response.success);

        let data = response.data.unwrap();
        assert_eq!(data["context"]["capital_available"], 20_000.0);
        let request_id = data["context"]["request_id"].as_str().unwrap().to_string();

        let (status, Json(replay)) = audit_trail(State(state), Path(request_id)).await;
        assert_eq!(status, StatusCode::OK);
        let entries = replay.data.unwrap()["entries"].as_array().unwrap().len();
        assert!(entries > 2);
    }

    #[tokio::test]
    async fn test_error_responses() {
        let state = state();

        let (status, Json(response)) = create_recommendation(
            State(state.clone()),
            request(serde_json::json!({ "query": "invest", "capital": -5.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!response.success);

        let (status, _) = create_recommendation(
            State(state.clone()),
            request(serde_json::json!({ "query": "invest", "beta_range": [3.0, 4.0] })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = audit_trail(State(state.clone()), Path("not-a-uuid".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = audit_trail(State(state), Path(Uuid::new_v4().to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
