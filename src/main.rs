use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use semantic_course_router::{
    config::{Config, LogFormat},
    llm::LangbaseClient,
    server::{AppState, McpServer},
    storage::{spawn_purge_task, KvStore, SqliteKvStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Semantic course router starting..."
    );

    let kv = match SqliteKvStore::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Conversation store initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize conversation store");
            return Err(e.into());
        }
    };

    // The analyzer bounds the whole call, so each attempt gets a share of it
    let per_attempt = config.request.within_budget();
    let llm = match LangbaseClient::new(&config.llm, per_attempt.clone()) {
        Ok(c) => {
            info!(
                base_url = %config.llm.base_url,
                pipe = %config.llm.pipe,
                attempt_timeout_ms = per_attempt.timeout_ms,
                max_retries = per_attempt.max_retries,
                "LLM client initialized"
            );
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize LLM client");
            return Err(e.into());
        }
    };

    let kv: Arc<dyn KvStore> = Arc::new(kv);
    if config.context.purge_interval_seconds > 0 {
        spawn_purge_task(
            kv.clone(),
            Duration::from_secs(config.context.purge_interval_seconds),
        );
        info!(
            interval_seconds = config.context.purge_interval_seconds,
            "Expired state sweeper started"
        );
    }

    let state = Arc::new(AppState::new(config, Arc::new(llm), kv));
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing on stderr; stdout carries JSON-RPC
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
