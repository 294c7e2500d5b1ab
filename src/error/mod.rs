use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("RPC protocol error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Key-value persistence errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Context store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// LLM completion service errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Completion request has no prompt")]
    MissingPrompt,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// AI analyzer failures. These never leave the analyzer: they degrade to a
/// zero-confidence result.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Analyzer timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Analyzer response could not be parsed: {message}")]
    Parse { message: String },

    #[error("Analyzer completion failed: {0}")]
    Llm(#[from] LlmError),
}

/// Semantic normalizer errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("Unmapped intent: {raw}")]
    UnmappedIntent { raw: String },
}

/// JSON-RPC transport errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for AI analyzer operations
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

/// Result type alias for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;
