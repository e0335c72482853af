//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::intervention::InterventionEngine;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// The intervention engine serving every tool.
    pub engine: Arc<InterventionEngine>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, engine: Arc<InterventionEngine>) -> Self {
        tracing::info!(
            backend = config.langbase.is_some(),
            trigger_enabled = config.engine.trigger.enabled,
            max_branches = config.engine.brancher.max_branches,
            log_to_file = config.engine.logger.log_to_file,
            "AppState initializing"
        );

        Self { config, engine }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoggingConfig, RequestConfig, ThinkingPipeConfig};
    use crate::intervention::EngineConfig;
    use crate::thinking::UnavailableThinkingService;

    pub(crate) fn create_test_config() -> Config {
        Config {
            langbase: None,
            logging: LoggingConfig::default(),
            request: RequestConfig::default(),
            pipes: ThinkingPipeConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    fn create_test_state() -> AppState {
        let config = create_test_config();
        let engine = InterventionEngine::new(
            config.engine.clone(),
            Arc::new(UnavailableThinkingService),
        );
        AppState::new(config, Arc::new(engine))
    }

    #[test]
    fn test_app_state_new() {
        let state = create_test_state();
        assert!(state.config.langbase.is_none());
        assert_eq!(state.config.engine.brancher.max_branches, 3);
    }

    #[test]
    fn test_app_state_clone_shares_engine() {
        let state = create_test_state();
        let cloned = state.clone();

        assert!(Arc::ptr_eq(&state.engine, &cloned.engine));
        assert_eq!(Arc::strong_count(&state.engine), 2);
    }

    #[test]
    fn test_shared_state_arc_counts() {
        let shared: SharedState = Arc::new(create_test_state());
        let handle = Arc::clone(&shared);

        assert_eq!(Arc::strong_count(&shared), 2);
        drop(handle);
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[tokio::test]
    async fn test_state_engine_is_usable() {
        let state = create_test_state();
        let stats = state.engine.stats().await;
        assert!(stats.initialized);
        assert_eq!(stats.interventions.total_interventions, 0);
    }
}
