//! Configuration for the intervention engine components.
//!
//! Every component config has a `Default` matching the engine's documented
//! defaults and a `from_env` that applies environment overrides on top.

use std::path::PathBuf;

/// Configuration for the whole intervention engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Semantic analyzer configuration
    pub analyzer: AnalyzerConfig,

    /// Intervention trigger configuration
    pub trigger: TriggerConfig,

    /// Parallel brancher configuration
    pub brancher: BrancherConfig,

    /// Refusal detector configuration
    pub refusal: RefusalConfig,

    /// Intervention logger configuration
    pub logger: LoggerConfig,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            analyzer: AnalyzerConfig::from_env(),
            trigger: TriggerConfig::from_env(),
            brancher: BrancherConfig::from_env(),
            refusal: RefusalConfig::from_env(),
            logger: LoggerConfig::from_env(),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Configuration for the semantic analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Ask the thinking backend for a deep analysis of complex prompts
    pub use_thinking: bool,

    /// Deep analysis timeout (milliseconds)
    pub timeout_ms: u64,

    /// Cache results by prompt+context hash
    pub cache_results: bool,

    /// Complexity above which deep analysis runs
    pub deep_analysis_threshold: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            use_thinking: true,
            timeout_ms: 3000,
            cache_results: true,
            deep_analysis_threshold: 40,
        }
    }
}

impl AnalyzerConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            use_thinking: env_bool("ANALYZER_USE_THINKING", defaults.use_thinking),
            timeout_ms: env_parse("ANALYZER_TIMEOUT_MS", defaults.timeout_ms),
            cache_results: env_bool("ANALYZER_CACHE_RESULTS", defaults.cache_results),
            deep_analysis_threshold: env_parse(
                "INTERVENTION_DEEP_ANALYSIS_THRESHOLD",
                defaults.deep_analysis_threshold,
            ),
        }
    }
}

/// Configuration for the intervention trigger.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Disabled triggers never fire
    pub enabled: bool,

    /// Complexity strictly above this fires `highComplexity`
    pub complexity_threshold: u32,

    /// Risk score strictly above this fires `highRisk`
    pub risk_threshold: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            complexity_threshold: 70,
            risk_threshold: 50,
        }
    }
}

impl TriggerConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_bool("TRIGGER_ENABLED", defaults.enabled),
            complexity_threshold: env_parse(
                "TRIGGER_COMPLEXITY_THRESHOLD",
                defaults.complexity_threshold,
            ),
            risk_threshold: env_parse("TRIGGER_RISK_THRESHOLD", defaults.risk_threshold),
        }
    }
}

/// Configuration for the parallel brancher.
#[derive(Debug, Clone)]
pub struct BrancherConfig {
    /// Default upper bound on strategies per branch set
    pub max_branches: usize,

    /// Per-branch time budget (milliseconds)
    pub timeout_ms: u64,
}

impl Default for BrancherConfig {
    fn default() -> Self {
        Self {
            max_branches: 3,
            timeout_ms: 5000,
        }
    }
}

impl BrancherConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_branches: env_parse("BRANCH_MAX", defaults.max_branches),
            timeout_ms: env_parse("BRANCH_TIMEOUT_MS", defaults.timeout_ms),
        }
    }
}

/// Configuration for the refusal detector.
#[derive(Debug, Clone)]
pub struct RefusalConfig {
    /// Attach alternative approaches to positive detections
    pub provide_alternatives: bool,

    /// Keep a rolling log of positive detections
    pub log_detections: bool,
}

impl Default for RefusalConfig {
    fn default() -> Self {
        Self {
            provide_alternatives: true,
            log_detections: true,
        }
    }
}

impl RefusalConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            provide_alternatives: env_bool(
                "REFUSAL_PROVIDE_ALTERNATIVES",
                defaults.provide_alternatives,
            ),
            log_detections: env_bool("REFUSAL_LOG_DETECTIONS", defaults.log_detections),
        }
    }
}

/// Configuration for the intervention logger.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Mirror entries into a JSON array file
    pub log_to_file: bool,

    /// Location of the JSON array file
    pub log_path: PathBuf,

    /// In-memory (and on-file) entry cap
    pub max_entries: usize,

    /// Maintain the analytics projection
    pub enable_analytics: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_to_file: false,
            log_path: PathBuf::from("./data/interventions.log.json"),
            max_entries: 10_000,
            enable_analytics: true,
        }
    }
}

impl LoggerConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_to_file: env_bool("INTERVENTION_LOG_TO_FILE", defaults.log_to_file),
            log_path: std::env::var("INTERVENTION_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_path),
            max_entries: env_parse("INTERVENTION_LOG_MAX_ENTRIES", defaults.max_entries),
            enable_analytics: env_bool("INTERVENTION_ANALYTICS", defaults.enable_analytics),
        }
    }
}
