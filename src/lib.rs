//! # Semantic Intervention Engine
//!
//! Triage for coding-assistant prompts: decide, before any work starts,
//! whether a request is risky, ambiguous or large enough that it should be
//! clarified, decomposed, validated or explored along several strategies.
//!
//! ## Features
//!
//! - **Semantic analysis**: intent, complexity, risk, frameworks and entities
//! - **Intervention triggers**: a prioritized rule table over the analysis
//! - **Parallel branching**: concurrent strategy exploration with a recommendation
//! - **Refusal detection**: classification of refused responses with alternatives
//! - **Intervention log**: outcomes, effectiveness and learned patterns
//!
//! ## Architecture
//!
//! ```text
//! MCP Client / CLI → InterventionEngine → ThinkingService → Langbase Pipes (HTTP)
//!                          ↓
//!                 in-memory log (+ optional JSON file)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use semantic_intervention::intervention::{InterventionEngine, PipelineContext};
//! use semantic_intervention::thinking::UnavailableThinkingService;
//! use semantic_intervention::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let engine = InterventionEngine::new(config.engine, Arc::new(UnavailableThinkingService));
//!     let verdict = engine
//!         .run_pipeline("Drop the production database", &PipelineContext::default())
//!         .await;
//!     println!("{}", serde_json::to_string_pretty(&verdict)?);
//!     Ok(())
//! }
//! ```

/// Configuration management loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// The intervention engine and its components.
pub mod intervention;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// System prompts for the thinking pipes.
pub mod prompts;
/// MCP server implementation and request handling.
pub mod server;
/// Backend abstraction for structural, sequential and debug thinking.
pub mod thinking;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use intervention::{InterventionEngine, PipelineContext, PipelineResult};
pub use server::{AppState, McpServer, SharedState};
