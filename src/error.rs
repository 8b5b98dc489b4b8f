//! Error types for the investment orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    /// No agent registered for a required type. Aborts the request.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Raised by an individual agent; contained at the task boundary.
    #[error("Agent failure: {0}")]
    AgentFailure(String),

    /// No candidates survive screening, or the constraints cannot be met.
    #[error("Optimization infeasible: {0}")]
    OptimizationInfeasible(String),

    /// Malformed request context, reported before any task runs.
    #[error("Validation error: {0}")]
    ValidationError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    pub fn is_infeasible(&self) -> bool {
        matches!(self, OrchestrationError::OptimizationInfeasible(_))
    }
}
