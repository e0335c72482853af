use std::env;

use crate::error::AppError;
use crate::intervention::EngineConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Langbase backend; `None` when no API key is present and the engine runs rule-based only.
    pub langbase: Option<LangbaseConfig>,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: ThinkingPipeConfig,
    pub engine: EngineConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
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
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe names backing each thinking role
#[derive(Debug, Clone)]
pub struct ThinkingPipeConfig {
    pub structural: String,
    pub sequential: String,
    pub debug: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = env::var("LANGBASE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| LangbaseConfig {
                api_key,
                base_url: env::var("LANGBASE_BASE_URL")
                    .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
            });

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

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        let pipes = ThinkingPipeConfig {
            structural: env::var("PIPE_STRUCTURAL")
                .unwrap_or_else(|_| "structural-thinking-v1".to_string()),
            sequential: env::var("PIPE_SEQUENTIAL")
                .unwrap_or_else(|_| "sequential-thinking-v1".to_string()),
            debug: env::var("PIPE_DEBUG").unwrap_or_else(|_| "debug-thinking-v1".to_string()),
        };

        let engine = EngineConfig::from_env();
        validate_engine(&engine)?;

        Ok(Config {
            langbase,
            logging,
            request,
            pipes,
            engine,
        })
    }
}

fn validate_engine(engine: &EngineConfig) -> Result<(), AppError> {
    if engine.brancher.max_branches == 0 {
        return Err(AppError::Config {
            message: "BRANCH_MAX must be at least 1".to_string(),
        });
    }
    if engine.logger.max_entries == 0 {
        return Err(AppError::Config {
            message: "INTERVENTION_LOG_MAX_ENTRIES must be at least 1".to_string(),
        });
    }
    if engine.trigger.complexity_threshold > 100 || engine.trigger.risk_threshold > 100 {
        return Err(AppError::Config {
            message: "Trigger thresholds must be within 0-100".to_string(),
        });
    }
    if engine.logger.log_to_file && engine.logger.log_path.as_os_str().is_empty() {
        return Err(AppError::Config {
            message: "INTERVENTION_LOG_PATH is required when file logging is enabled".to_string(),
        });
    }
    Ok(())
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for ThinkingPipeConfig {
    fn default() -> Self {
        Self {
            structural: "structural-thinking-v1".to_string(),
            sequential: "sequential-thinking-v1".to_string(),
            debug: "debug-thinking-v1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
