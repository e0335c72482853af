//! Thinking backend abstraction.
//!
//! The engine never talks to a model provider directly. It depends on the
//! [`ThinkingService`] capability (one method per thinking role) and goes
//! through [`ThinkingClient`], which bounds every call with a timeout and
//! turns failures into a degraded [`ThinkingReply`] instead of an error.
//!
//! ```text
//! Analyzer / Brancher → ThinkingClient ──timeout──→ dyn ThinkingService
//!                                                     ├── LangbaseThinkingService
//!                                                     └── UnavailableThinkingService
//! ```

mod langbase;

pub use langbase::{LangbaseThinkingService, UnavailableThinkingService};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ThinkingError, ThinkingResult};

/// Default thought budget for sequential calls.
pub const DEFAULT_MAX_THOUGHTS: u32 = 10;
/// Default decomposition depth for structural calls.
pub const DEFAULT_DEPTH: u32 = 5;

// ============================================================================
// Roles & Options
// ============================================================================

/// Thinking role a backend call is made under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingRole {
    /// Decomposition and approach analysis
    Structural,
    /// Ordered step planning
    Sequential,
    /// Root-cause analysis
    Debug,
}

impl ThinkingRole {
    /// Role name as used in logs and replies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingRole::Structural => "structural",
            ThinkingRole::Sequential => "sequential",
            ThinkingRole::Debug => "debug",
        }
    }
}

impl fmt::Display for ThinkingRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ThinkingRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structural" => Ok(ThinkingRole::Structural),
            "sequential" => Ok(ThinkingRole::Sequential),
            "debug" => Ok(ThinkingRole::Debug),
            _ => Err(format!("Unknown thinking role: {}", s)),
        }
    }
}

/// Per-call options passed to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOptions {
    /// Upper bound for the whole call
    pub timeout_ms: u64,
    /// Thought budget (sequential role)
    pub max_thoughts: Option<u32>,
    /// Decomposition depth (structural role)
    pub depth: Option<u32>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_thoughts: None,
            depth: None,
        }
    }
}

impl CallOptions {
    /// Options with the given timeout and no role hints.
    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            ..Default::default()
        }
    }
}

// ============================================================================
// Service Trait
// ============================================================================

/// Request/response capability the engine consults for natural-language analysis.
///
/// Implementations may be slow or fail; callers go through [`ThinkingClient`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThinkingService: Send + Sync {
    /// Structural decomposition of a prompt.
    async fn structural(&self, prompt: &str, options: &CallOptions) -> ThinkingResult<String>;

    /// Ordered step planning for a prompt.
    async fn sequential(&self, prompt: &str, options: &CallOptions) -> ThinkingResult<String>;

    /// Root-cause analysis of a prompt.
    async fn debug(&self, prompt: &str, options: &CallOptions) -> ThinkingResult<String>;

    /// Whether a real backend sits behind this service.
    fn is_available(&self) -> bool;
}

// ============================================================================
// Reply
// ============================================================================

/// Outcome of a bounded backend call. Never an error: failures are `degraded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingReply {
    /// Role the call was made under
    pub role: ThinkingRole,
    /// Whether the backend answered in time
    pub success: bool,
    /// Backend text on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set whenever the caller must fall back to rule-based behavior
    pub degraded: bool,
    /// Wall-clock duration of the call
    pub latency_ms: u64,
}

impl ThinkingReply {
    fn ok(role: ThinkingRole, result: String, latency_ms: u64) -> Self {
        Self {
            role,
            success: true,
            result: Some(result),
            error: None,
            degraded: false,
            latency_ms,
        }
    }

    fn failed(role: ThinkingRole, error: &ThinkingError, latency_ms: u64) -> Self {
        Self {
            role,
            success: false,
            result: None,
            error: Some(error.to_string()),
            degraded: true,
            latency_ms,
        }
    }

    /// Successful result text, if any.
    pub fn text(&self) -> Option<&str> {
        if self.success {
            self.result.as_deref()
        } else {
            None
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Timeout-bounded front for a [`ThinkingService`].
#[derive(Clone)]
pub struct ThinkingClient {
    service: Arc<dyn ThinkingService>,
}

impl ThinkingClient {
    /// Wrap a backend service.
    pub fn new(service: Arc<dyn ThinkingService>) -> Self {
        Self { service }
    }

    /// Whether the wrapped service has a real backend.
    pub fn is_available(&self) -> bool {
        self.service.is_available()
    }

    /// Call the backend under `role`, abandoning it once `options.timeout_ms` elapses.
    pub async fn call(
        &self,
        role: ThinkingRole,
        prompt: &str,
        options: &CallOptions,
    ) -> ThinkingReply {
        let start = Instant::now();
        let mut options = options.clone();
        match role {
            ThinkingRole::Structural => {
                options.depth.get_or_insert(DEFAULT_DEPTH);
            }
            ThinkingRole::Sequential => {
                options.max_thoughts.get_or_insert(DEFAULT_MAX_THOUGHTS);
            }
            ThinkingRole::Debug => {}
        }

        let call = async {
            match role {
                ThinkingRole::Structural => self.service.structural(prompt, &options).await,
                ThinkingRole::Sequential => self.service.sequential(prompt, &options).await,
                ThinkingRole::Debug => self.service.debug(prompt, &options).await,
            }
        };

        let limit = Duration::from_millis(options.timeout_ms);
        let outcome = match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(ThinkingError::Timeout {
                timeout_ms: options.timeout_ms,
            }),
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(text) => {
                debug!(role = %role, latency_ms, "Thinking call succeeded");
                ThinkingReply::ok(role, text, latency_ms)
            }
            Err(e) => {
                warn!(role = %role, error = %e, latency_ms, "Thinking call degraded");
                ThinkingReply::failed(role, &e, latency_ms)
            }
        }
    }
}
