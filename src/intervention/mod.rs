//! Semantic intervention engine.
//!
//! - [`analyzer`]: intent, complexity and risk scoring of prompts
//! - [`trigger`]: rule table deciding whether and how to intervene
//! - [`brancher`]: concurrent exploration of solution strategies
//! - [`refusal`]: classification of refused or partial responses
//! - [`logger`]: intervention log, outcomes and learned patterns
//! - [`engine`]: the pipeline tying them together

pub mod actions;
pub mod analyzer;
pub mod brancher;
pub mod config;
pub mod engine;
pub mod logger;
pub mod refusal;
pub mod trigger;
pub mod types;

pub use actions::{ActionDescriptor, ActionPlan};
pub use analyzer::{AnalyzerMetrics, SemanticAnalyzer};
pub use brancher::{
    select_best_branch, BranchOptions, BranchResult, BranchSet, BrancherStats, ParallelBrancher,
    Recommendation, StrategyKey,
};
pub use config::{
    AnalyzerConfig, BrancherConfig, EngineConfig, LoggerConfig, RefusalConfig, TriggerConfig,
};
pub use engine::{
    global, global_stats, initialize_global, CheckResult, EngineStats, InterventionEngine,
    PipelineContext, PipelineResult,
};
pub use logger::{
    EntryFilter, InterventionLogger, LearnedPatterns, LogEntry, LogEvent, LoggerStats,
    OutcomeStatus,
};
pub use refusal::{RefusalDetection, RefusalDetector, RefusalStats, RefusalType};
pub use trigger::{
    InterventionDecision, InterventionTrigger, TriggerCondition, TriggerContext, TriggerStats,
};
pub use types::{
    AnalysisContext, AnalysisResult, IntentCategory, InterventionType, PreviousAttempt, RiskLevel,
    ThinkingMode,
};
