use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub decision: DecisionConfig,
    pub normalizer: NormalizerConfig,
    pub context: ContextConfig,
}

/// LLM completion service configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    /// Pipe that runs the intent analysis prompt
    pub pipe: String,
}

/// Database configuration for the conversation key-value store
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Upper bound on one AI analysis, enforced by the analyzer
    pub timeout_ms: u64,
    /// Retries performed inside the completion client, never by the core
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Thresholds and switches for the decision rule chain
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionConfig {
    /// Attach raw sub-results and the rule trace to every decision
    pub debug: bool,
    pub ai_confidence_threshold: f64,
    pub regex_strength_threshold: f64,
    pub fallback_threshold: f64,
}

/// Normalizer behaviour and cache sizing
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizerConfig {
    /// Unmapped intents become errors instead of pass-throughs
    pub strict_mode: bool,
    pub log_unmapped: bool,
    /// Shared ceiling for the lookup and fuzzy cache tiers
    pub max_cache_size: usize,
}

/// Conversation state retention
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    pub ttl_seconds: u64,
    pub history_limit: usize,
    pub entity_limit: usize,
    /// Number of recent history entries forwarded to the AI analyzer
    pub ai_history_turns: usize,
    /// Seconds between sweeps of expired state; 0 disables the sweeper
    pub purge_interval_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig {
            api_key: env::var("LLM_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| AppError::Config {
                    message: "LLM_API_KEY is required".to_string(),
                })?,
            base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
            pipe: env::var("LLM_PIPE").unwrap_or_else(|_| "course-intent-analyzer-v1".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/conversation.db".to_string()),
            ),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request_defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", request_defaults.timeout_ms),
            max_retries: parse_env("MAX_RETRIES", request_defaults.max_retries),
            retry_delay_ms: parse_env("RETRY_DELAY_MS", request_defaults.retry_delay_ms),
        };

        let decision_defaults = DecisionConfig::default();
        let decision = DecisionConfig {
            debug: parse_bool_env("DECISION_DEBUG", decision_defaults.debug),
            ai_confidence_threshold: parse_env(
                "AI_CONFIDENCE_THRESHOLD",
                decision_defaults.ai_confidence_threshold,
            ),
            regex_strength_threshold: parse_env(
                "REGEX_STRENGTH_THRESHOLD",
                decision_defaults.regex_strength_threshold,
            ),
            fallback_threshold: parse_env("FALLBACK_THRESHOLD", decision_defaults.fallback_threshold),
        };
        decision.validate()?;

        let normalizer_defaults = NormalizerConfig::default();
        let normalizer = NormalizerConfig {
            strict_mode: parse_bool_env("NORMALIZER_STRICT_MODE", normalizer_defaults.strict_mode),
            log_unmapped: parse_bool_env("NORMALIZER_LOG_UNMAPPED", normalizer_defaults.log_unmapped),
            max_cache_size: parse_env("MAX_CACHE_SIZE", normalizer_defaults.max_cache_size),
        };

        let context_defaults = ContextConfig::default();
        let context = ContextConfig {
            ttl_seconds: parse_env("CONTEXT_TTL_SECONDS", context_defaults.ttl_seconds),
            history_limit: parse_env("CONTEXT_HISTORY_LIMIT", context_defaults.history_limit),
            entity_limit: parse_env("CONTEXT_ENTITY_LIMIT", context_defaults.entity_limit),
            ai_history_turns: parse_env("AI_HISTORY_TURNS", context_defaults.ai_history_turns),
            purge_interval_seconds: parse_env(
                "CONTEXT_PURGE_INTERVAL_SECONDS",
                context_defaults.purge_interval_seconds,
            ),
        };

        Ok(Config {
            llm,
            database,
            logging,
            request,
            decision,
            normalizer,
            context,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl DecisionConfig {
    /// Reject thresholds outside [0, 1]
    pub fn validate(&self) -> Result<(), AppError> {
        let thresholds = [
            ("AI_CONFIDENCE_THRESHOLD", self.ai_confidence_threshold),
            ("REGEX_STRENGTH_THRESHOLD", self.regex_strength_threshold),
            ("FALLBACK_THRESHOLD", self.fallback_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Config {
                    message: format!("{} must be within [0, 1], got {}", name, value),
                });
            }
        }
        Ok(())
    }
}

impl RequestConfig {
    /// Split `timeout_ms` across the client's attempts and backoff delays so
    /// that every retry fits inside the analyzer's overall budget.
    ///
    /// Retries are dropped when the backoff alone would exhaust the budget.
    pub fn within_budget(&self) -> RequestConfig {
        let attempts = u64::from(self.max_retries) + 1;
        let backoff: u64 = (0..self.max_retries)
            .map(|i| self.retry_delay_ms.saturating_mul(2_u64.saturating_pow(i)))
            .fold(0, u64::saturating_add);

        match self.timeout_ms.checked_sub(backoff) {
            Some(left) if left / attempts > 0 => RequestConfig {
                timeout_ms: left / attempts,
                ..self.clone()
            },
            _ => RequestConfig {
                max_retries: 0,
                ..self.clone()
            },
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8000,
            max_retries: 1,
            retry_delay_ms: 500,
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            debug: false,
            ai_confidence_threshold: 0.3,
            regex_strength_threshold: 0.7,
            fallback_threshold: 0.2,
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            log_unmapped: true,
            max_cache_size: 1000,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 1800,
            history_limit: 20,
            entity_limit: 10,
            ai_history_turns: 6,
            purge_interval_seconds: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_defaults_are_valid() {
        let config = DecisionConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.ai_confidence_threshold - 0.3).abs() < f64::EPSILON);
        assert!(!config.debug);
    }

    #[test]
    fn test_decision_threshold_out_of_range() {
        let config = DecisionConfig {
            regex_strength_threshold: 1.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("REGEX_STRENGTH_THRESHOLD"));
    }

    #[test]
    fn test_context_defaults() {
        let config = ContextConfig::default();
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.ttl_seconds, 1800);
        assert_eq!(config.purge_interval_seconds, 300);
    }

    #[test]
    fn test_retries_fit_inside_request_budget() {
        let config = RequestConfig {
            timeout_ms: 8000,
            max_retries: 2,
            retry_delay_ms: 500,
        };
        let per_attempt = config.within_budget();

        // Two backoffs (500 + 1000) leave 6500ms for three attempts
        assert_eq!(per_attempt.max_retries, 2);
        assert_eq!(per_attempt.timeout_ms, 2166);
        assert!(per_attempt.timeout_ms * 3 + 1500 <= config.timeout_ms);
    }

    #[test]
    fn test_no_retries_keeps_full_budget() {
        let config = RequestConfig {
            timeout_ms: 100,
            max_retries: 0,
            retry_delay_ms: 500,
        };
        assert_eq!(config.within_budget().timeout_ms, 100);
    }

    #[test]
    fn test_backoff_larger_than_budget_drops_retries() {
        let config = RequestConfig {
            timeout_ms: 1000,
            max_retries: 3,
            retry_delay_ms: 400,
        };
        let per_attempt = config.within_budget();
        assert_eq!(per_attempt.max_retries, 0);
        assert_eq!(per_attempt.timeout_ms, 1000);
    }
}
