use async_trait::async_trait;
use tracing::debug;

use super::{CallOptions, ThinkingRole, ThinkingService};
use crate::config::ThinkingPipeConfig;
use crate::error::{ThinkingError, ThinkingResult};
use crate::langbase::{LangbaseClient, Message, PipeRequest};

/// Thinking backend that maps each role onto a Langbase pipe.
#[derive(Clone)]
pub struct LangbaseThinkingService {
    client: LangbaseClient,
    pipes: ThinkingPipeConfig,
}

impl LangbaseThinkingService {
    /// Create a service over an existing client.
    pub fn new(client: LangbaseClient, pipes: ThinkingPipeConfig) -> Self {
        Self { client, pipes }
    }

    fn pipe_for(&self, role: ThinkingRole) -> &str {
        match role {
            ThinkingRole::Structural => &self.pipes.structural,
            ThinkingRole::Sequential => &self.pipes.sequential,
            ThinkingRole::Debug => &self.pipes.debug,
        }
    }

    async fn run(
        &self,
        role: ThinkingRole,
        prompt: &str,
        options: &CallOptions,
    ) -> ThinkingResult<String> {
        let pipe = self.pipe_for(role);
        let mut request = PipeRequest::new(pipe, vec![Message::user(prompt)]);
        if let Some(max_thoughts) = options.max_thoughts {
            request = request.with_variable("max_thoughts", max_thoughts.to_string());
        }
        if let Some(depth) = options.depth {
            request = request.with_variable("depth", depth.to_string());
        }

        debug!(role = %role, pipe = %pipe, "Dispatching thinking call");
        let response = self.client.call_pipe(request).await?;

        if !response.success || response.completion.trim().is_empty() {
            return Err(ThinkingError::InvalidResponse {
                message: format!("Pipe {} returned no completion", pipe),
            });
        }
        Ok(response.completion)
    }
}

#[async_trait]
impl ThinkingService for LangbaseThinkingService {
    async fn structural(&self, prompt: &str, options: &CallOptions) -> ThinkingResult<String> {
        self.run(ThinkingRole::Structural, prompt, options).await
    }

    async fn sequential(&self, prompt: &str, options: &CallOptions) -> ThinkingResult<String> {
        self.run(ThinkingRole::Sequential, prompt, options).await
    }

    async fn debug(&self, prompt: &str, options: &CallOptions) -> ThinkingResult<String> {
        self.run(ThinkingRole::Debug, prompt, options).await
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Stand-in used when no backend is configured. Every call fails fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableThinkingService;

#[async_trait]
impl ThinkingService for UnavailableThinkingService {
    async fn structural(&self, _prompt: &str, _options: &CallOptions) -> ThinkingResult<String> {
        Err(ThinkingError::NotConfigured)
    }

    async fn sequential(&self, _prompt: &str, _options: &CallOptions) -> ThinkingResult<String> {
        Err(ThinkingError::NotConfigured)
    }

    async fn debug(&self, _prompt: &str, _options: &CallOptions) -> ThinkingResult<String> {
        Err(ThinkingError::NotConfigured)
    }

    fn is_available(&self) -> bool {
        false
    }
}
