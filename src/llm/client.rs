use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{Completion, CompletionParams, Message, PipeRequest, PipeResponse};
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{AppError, LlmError, LlmResult};

/// The LLM completion collaborator consumed by the AI analyzer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion over `prompt`. An empty prompt fails with
    /// [`LlmError::MissingPrompt`] before any network call.
    async fn complete(&self, prompt: &[Message], params: &CompletionParams)
        -> LlmResult<Completion>;
}

/// Client for the Langbase pipes API
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    default_pipe: String,
    request_config: RequestConfig,
}

impl LangbaseClient {
    /// Create a new client. Missing credentials are a configuration error.
    pub fn new(config: &LlmConfig, request_config: RequestConfig) -> Result<Self, AppError> {
        if config.api_key.trim().is_empty() {
            return Err(AppError::Config {
                message: "LLM API key is empty".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            default_pipe: config.pipe.clone(),
            request_config,
        })
    }

    /// Call a pipe, retrying with exponential backoff on failure
    pub async fn call_pipe(&self, request: PipeRequest) -> LlmResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);
        let pipe_name = request.name.clone();

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    pipe = %pipe_name,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying pipe request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        pipe = %pipe_name,
                        latency_ms = start.elapsed().as_millis(),
                        "Pipe call succeeded"
                    );
                    return Ok(response);
                }
                // Client errors will not improve on retry
                Err(e @ LlmError::Api { status, .. }) if (400..500).contains(&status) => {
                    error!(pipe = %pipe_name, status, "Pipe call rejected");
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        pipe = %pipe_name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Pipe call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(LlmError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries: retries.saturating_sub(1),
        })
    }

    async fn execute_request(&self, url: &str, request: &PipeRequest) -> LlmResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling pipe"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json::<PipeResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LlmClient for LangbaseClient {
    async fn complete(
        &self,
        prompt: &[Message],
        params: &CompletionParams,
    ) -> LlmResult<Completion> {
        if prompt.is_empty() {
            return Err(LlmError::MissingPrompt);
        }

        let pipe = params.pipe.as_deref().unwrap_or(&self.default_pipe);
        let request =
            PipeRequest::new(pipe, prompt.to_vec()).with_variables(params.variables.clone());
        let response = self.call_pipe(request).await?;

        if !response.success {
            return Err(LlmError::InvalidResponse {
                message: "pipe reported success=false".to_string(),
            });
        }

        Ok(response.into())
    }
}
