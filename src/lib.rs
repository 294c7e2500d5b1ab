//! # Semantic Course Router
//!
//! Decision and conversation-state engine of a course-scheduling chat
//! assistant. Each inbound message is read by two analyzers, arbitrated by
//! an ordered rule chain, normalized onto a canonical vocabulary and
//! recorded in per-user dialogue state.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌─ PatternAnalyzer (regex) ─┐
//! route(text) ────┤                           ├─ DecisionController ─ SemanticNormalizer ─ result
//!       │         └─ AiAnalyzer (LLM pipe) ───┘          │
//!       └──────────────── ContextStore (KV + TTL) ───────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use semantic_course_router::{Config, SemanticRouter};
//! use semantic_course_router::llm::LangbaseClient;
//! use semantic_course_router::storage::SqliteKvStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let kv = Arc::new(SqliteKvStore::new(&config.database).await?);
//!     let llm = Arc::new(LangbaseClient::new(&config.llm, config.request.clone())?);
//!     let router = SemanticRouter::from_config(&config, llm, kv);
//!     let decision = router.route("明天下午三點上數學課", "user-1", None, None).await?;
//!     println!("{} via {}", decision.final_intent, decision.used_rule);
//!     Ok(())
//! }
//! ```

/// Intent analyzers and their result shapes.
pub mod analysis;
/// Configuration loaded from environment variables.
pub mod config;
/// Per-user conversation state and its store.
pub mod context;
/// Priority rule chain arbitrating between analyzers.
pub mod decision;
/// Error types and result aliases.
pub mod error;
/// LLM completion client and wire types.
pub mod llm;
/// Canonical vocabulary mapping with a tiered cache.
pub mod normalizer;
/// System prompts for the LLM pipe.
pub mod prompts;
/// The `route` entry point.
pub mod router;
/// JSON-RPC server exposing the router and context store.
pub mod server;
/// Key-value persistence backends.
pub mod storage;

pub use config::Config;
pub use decision::{DecisionSource, RuleId, SemanticDecisionResult};
pub use error::{AppError, AppResult};
pub use router::{RouteOptions, SemanticRouter};
pub use server::{AppState, McpServer, SharedState};
