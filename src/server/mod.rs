//! Server module for the caller-facing JSON-RPC interface.
//!
//! This module provides:
//! - JSON-RPC 2.0 server over stdio
//! - Tool call handlers for routing and context management
//! - Shared application state

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::llm::LlmClient;
use crate::router::SemanticRouter;
use crate::storage::KvStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// The routing engine, owning the normalizer cache and context store.
    pub router: SemanticRouter,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, llm: Arc<dyn LlmClient>, kv: Arc<dyn KvStore>) -> Self {
        tracing::info!(
            pipe = %config.llm.pipe,
            timeout_ms = config.request.timeout_ms,
            strict_mode = config.normalizer.strict_mode,
            max_cache_size = config.normalizer.max_cache_size,
            "AppState initializing"
        );

        let router = SemanticRouter::from_config(&config, llm, kv);
        Self { config, router }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ContextConfig, DatabaseConfig, DecisionConfig, LlmConfig, LogFormat, LoggingConfig,
        NormalizerConfig, RequestConfig,
    };
    use crate::llm::MockLlmClient;
    use crate::storage::MemoryKvStore;
    use std::path::PathBuf;

    pub(super) fn create_test_config() -> Config {
        Config {
            llm: LlmConfig {
                api_key: "test-key".to_string(),
                base_url: "https://api.langbase.com".to_string(),
                pipe: "course-intent-analyzer-v1".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from(":memory:"),
                max_connections: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            request: RequestConfig::default(),
            decision: DecisionConfig::default(),
            normalizer: NormalizerConfig::default(),
            context: ContextConfig::default(),
        }
    }

    #[test]
    fn test_app_state_new() {
        let state = AppState::new(
            create_test_config(),
            Arc::new(MockLlmClient::new()),
            Arc::new(MemoryKvStore::new()),
        );
        assert_eq!(state.config.llm.api_key, "test-key");
        assert!(state.router.normalizer().get_cache_stats().precomputed_size > 0);
    }

    #[test]
    fn test_app_state_config_access() {
        let state = AppState::new(
            create_test_config(),
            Arc::new(MockLlmClient::new()),
            Arc::new(MemoryKvStore::new()),
        );
        assert_eq!(state.config.database.max_connections, 5);
        assert_eq!(state.router.context().config().history_limit, 20);
    }
}
