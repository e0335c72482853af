use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{CreatePipeRequest, CreatePipeResponse, Message, PipeRequest, PipeResponse};
use crate::config::{LangbaseConfig, RequestConfig, ThinkingPipeConfig};
use crate::error::{ThinkingError, ThinkingResult};
use crate::prompts::{DEBUG_THINKING_PROMPT, SEQUENTIAL_THINKING_PROMPT, STRUCTURAL_THINKING_PROMPT};

/// Client for the Langbase Pipes API
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl LangbaseClient {
    /// Create a new Langbase client
    pub fn new(config: &LangbaseConfig, request_config: RequestConfig) -> ThinkingResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ThinkingError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Run a pipe, retrying transient failures with exponential backoff.
    ///
    /// Client errors (4xx other than 408/429) are returned immediately.
    pub async fn call_pipe(&self, request: PipeRequest) -> ThinkingResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);
        let max_retries = self.request_config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            let start = Instant::now();
            let err = match self.post_run(&url, &request).await {
                Ok(response) => {
                    info!(
                        pipe = %request.name,
                        latency_ms = start.elapsed().as_millis(),
                        "Langbase pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => e,
            };

            error!(
                pipe = %request.name,
                error = %err,
                latency_ms = start.elapsed().as_millis(),
                attempt,
                "Langbase pipe call failed"
            );

            if !is_retryable(&err) {
                return Err(err);
            }
            if attempt >= max_retries {
                return Err(ThinkingError::Unavailable {
                    message: err.to_string(),
                    retries: attempt + 1,
                });
            }

            attempt += 1;
            let delay =
                Duration::from_millis(self.request_config.retry_delay_ms * 2_u64.pow(attempt - 1));
            warn!(
                pipe = %request.name,
                retry = attempt,
                delay_ms = delay.as_millis(),
                "Retrying Langbase request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn post_run(&self, url: &str, request: &PipeRequest) -> ThinkingResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling Langbase pipe"
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
                    ThinkingError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    ThinkingError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ThinkingError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ThinkingError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a new pipe
    pub async fn create_pipe(
        &self,
        request: CreatePipeRequest,
    ) -> ThinkingResult<CreatePipeResponse> {
        let url = format!("{}/v1/pipes", self.base_url);

        info!(pipe = %request.name, "Creating Langbase pipe");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(ThinkingError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ThinkingError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ThinkingError::InvalidResponse {
                message: format!("Failed to parse create pipe response: {}", e),
            })
    }

    /// Upsert a pipe with the given system prompt. An existing pipe (409) counts as ready.
    pub async fn ensure_pipe(
        &self,
        pipe_name: &str,
        description: &str,
        system_prompt: &str,
    ) -> ThinkingResult<()> {
        let request = CreatePipeRequest::new(pipe_name)
            .with_description(description)
            .with_model("openai:gpt-4o-mini")
            .with_upsert(true)
            .with_temperature(0.4)
            .with_max_tokens(1500)
            .with_messages(vec![Message::system(system_prompt)]);

        match self.create_pipe(request).await {
            Ok(_) => {
                info!(pipe = %pipe_name, "Thinking pipe ready");
                Ok(())
            }
            Err(ThinkingError::Api { status: 409, .. }) => {
                info!(pipe = %pipe_name, "Pipe already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Ensure the structural, sequential and debug pipes exist.
    pub async fn ensure_role_pipes(&self, pipes: &ThinkingPipeConfig) -> ThinkingResult<()> {
        self.ensure_pipe(
            &pipes.structural,
            "Structural decomposition of coding tasks",
            STRUCTURAL_THINKING_PROMPT,
        )
        .await?;
        self.ensure_pipe(
            &pipes.sequential,
            "Sequential step planning for coding tasks",
            SEQUENTIAL_THINKING_PROMPT,
        )
        .await?;
        self.ensure_pipe(
            &pipes.debug,
            "Root-cause oriented debugging analysis",
            DEBUG_THINKING_PROMPT,
        )
        .await
    }
}

fn is_retryable(err: &ThinkingError) -> bool {
    match err {
        ThinkingError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
        ThinkingError::InvalidResponse { .. } | ThinkingError::NotConfigured => false,
        _ => true,
    }
}
