use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Thinking service error: {0}")]
    Thinking(#[from] ThinkingError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Intervention log error: {0}")]
    Logger(#[from] LoggerError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Thinking backend errors (Langbase pipes or any other provider)
#[derive(Debug, Error)]
pub enum ThinkingError {
    #[error("Thinking service unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("No thinking backend configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
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

/// Intervention log file errors
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Log file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Log serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for thinking backend calls
pub type ThinkingResult<T> = Result<T, ThinkingError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Result type alias for intervention log file operations
pub type LoggerResult<T> = Result<T, LoggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_thinking_error_display() {
        let err = ThinkingError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(
            err.to_string(),
            "Thinking service unavailable: server down (retries: 3)"
        );

        let err = ThinkingError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = ThinkingError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");

        assert_eq!(
            ThinkingError::NotConfigured.to_string(),
            "No thinking backend configured"
        );
    }

    #[test]
    fn test_mcp_error_display() {
        let err = McpError::UnknownTool {
            tool_name: "nonexistent".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown tool: nonexistent");

        let err = McpError::InvalidParameters {
            tool_name: "intervention_analyze".to_string(),
            message: "missing prompt".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameters for intervention_analyze: missing prompt"
        );
    }

    #[test]
    fn test_logger_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: LoggerError = io.into();
        assert!(err.to_string().starts_with("Log file I/O failed"));

        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::Logger(_)));
    }

    #[test]
    fn test_app_error_conversion_to_mcp_error() {
        let app_err = AppError::Config {
            message: "test error".to_string(),
        };
        let mcp_err: McpError = app_err.into();
        assert!(matches!(mcp_err, McpError::ExecutionFailed { .. }));
        assert!(mcp_err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_thinking_error_conversion_to_app_error() {
        let err = ThinkingError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::Thinking(_)));
    }
}
