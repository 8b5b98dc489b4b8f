//! Investment Orchestrator
//!
//! Turns one investment request into a portfolio recommendation:
//! - Decomposes the request into a fixed tree of analysis tasks
//! - Schedules tasks against registered agents, respecting dependencies
//! - Optimizes allocations over a screened ETF universe
//! - Synthesizes a recommendation with confidence and review decision
//! - Records every state transition to an append-only audit trail
//!
//! PIPELINE:
//! INTAKE → DECOMPOSE → SCHEDULE → OPTIMIZE → SYNTHESIZE

pub mod agents;
pub mod api;
pub mod audit;
pub mod config;
pub mod data;
pub mod error;
pub mod execution;
pub mod intake;
pub mod models;
pub mod optimizer;
pub mod orchestrator;
pub mod planner;
pub mod synthesis;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use orchestrator::Orchestrator;
