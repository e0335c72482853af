//! Pipeline orchestration over the intervention components.
//!
//! ```text
//! prompt + context
//!   → SemanticAnalyzer        (analysis, always returned)
//!   → InterventionTrigger     (decision, logged when fired)
//!       ├─ branching action   → ParallelBrancher → recommendation
//!       │    (after failed attempts, debug role diagnoses first)
//!       └─ other action       → action plan
//!   → no decision, but complex or risky → ParallelBrancher
//!   → otherwise proceed
//! ```
//!
//! Refusal detection is separate: callers run it on a downstream response.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, info_span, Instrument};

use super::actions::{build_plan, ActionDescriptor, ActionPlan};
use super::analyzer::{AnalyzerMetrics, SemanticAnalyzer};
use super::brancher::{
    select_best_branch, BranchOptions, BranchResult, BranchSet, BrancherStats, ParallelBrancher,
    Recommendation,
};
use super::config::EngineConfig;
use super::logger::{
    EntryFilter, InterventionLogger, LearnedPatterns, LogEntry, LogEvent, LoggerStats,
    OutcomeStatus,
};
use super::refusal::{RefusalDetection, RefusalDetector, RefusalStats};
use super::trigger::{InterventionDecision, InterventionTrigger, TriggerContext, TriggerStats};
use super::types::{AnalysisContext, AnalysisResult, InterventionType, PreviousAttempt};
use crate::prompts::failure_diagnosis_prompt;
use crate::thinking::{CallOptions, ThinkingClient, ThinkingRole, ThinkingService};

/// Complexity above which an untriggered prompt is still branched.
const BRANCH_COMPLEXITY: u32 = 50;
/// Risk score above which an untriggered prompt is still branched.
const BRANCH_RISK: u32 = 60;

/// Caller context for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineContext {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub estimated_files: Option<u32>,
    /// Minutes
    #[serde(default)]
    pub estimated_time: Option<u32>,
    #[serde(default)]
    pub previous_attempts: Vec<PreviousAttempt>,
    /// Anything else; passed through to the analyzer
    #[serde(flatten, default)]
    pub extra: Map<String, Value>,
}

impl PipelineContext {
    fn analysis_context(&self) -> AnalysisContext {
        AnalysisContext {
            files: self.files.clone(),
            extra: self.extra.clone(),
        }
    }

    fn trigger_context(&self, prompt: &str, analysis: Arc<AnalysisResult>) -> TriggerContext {
        TriggerContext {
            analysis,
            prompt: prompt.to_string(),
            estimated_files: self.estimated_files,
            estimated_time: self.estimated_time,
            previous_attempts: self.previous_attempts.clone(),
        }
    }
}

/// Verdict of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub intervention: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub intervention_type: Option<InterventionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub analysis: Arc<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches: Option<BranchSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_path: Option<BranchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ActionPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
    /// Root-cause notes for earlier failed attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    /// True only when no intervention is needed
    pub proceed: bool,
}

impl PipelineResult {
    fn proceed(analysis: Arc<AnalysisResult>) -> Self {
        Self {
            intervention: false,
            intervention_type: None,
            condition: None,
            reason: None,
            analysis,
            branches: None,
            recommendation: None,
            best_path: None,
            action: None,
            plan: None,
            log_id: None,
            diagnosis: None,
            proceed: true,
        }
    }

    fn with_branches(mut self, branches: BranchSet) -> Self {
        self.intervention = true;
        self.proceed = false;
        self.best_path = select_best_branch(&branches).cloned();
        self.recommendation = Some(branches.recommendation.clone());
        self.branches = Some(branches);
        self
    }
}

/// Analysis plus the trigger decision, without acting on it.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub analysis: Arc<AnalysisResult>,
    pub decision: Option<InterventionDecision>,
}

/// Aggregated component statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub initialized: bool,
    pub analyzer: AnalyzerMetrics,
    pub trigger: TriggerStats,
    pub interventions: LoggerStats,
    pub refusals: RefusalStats,
    pub branches: BrancherStats,
}

/// The intervention engine. Owns every component and its state.
pub struct InterventionEngine {
    analyzer: SemanticAnalyzer,
    trigger: InterventionTrigger,
    brancher: ParallelBrancher,
    refusal: RefusalDetector,
    logger: InterventionLogger,
    thinking: ThinkingClient,
    diagnosis_timeout_ms: u64,
}

impl InterventionEngine {
    pub fn new(config: EngineConfig, thinking: Arc<dyn ThinkingService>) -> Self {
        let thinking = ThinkingClient::new(thinking);
        Self {
            analyzer: SemanticAnalyzer::new(config.analyzer, thinking.clone()),
            trigger: InterventionTrigger::new(config.trigger),
            diagnosis_timeout_ms: config.brancher.timeout_ms,
            brancher: ParallelBrancher::new(config.brancher, thinking.clone()),
            thinking,
            refusal: RefusalDetector::new(config.refusal),
            logger: InterventionLogger::new(config.logger),
        }
    }

    pub fn analyzer(&self) -> &SemanticAnalyzer {
        &self.analyzer
    }

    pub fn trigger(&self) -> &InterventionTrigger {
        &self.trigger
    }

    pub fn brancher(&self) -> &ParallelBrancher {
        &self.brancher
    }

    pub fn refusal_detector(&self) -> &RefusalDetector {
        &self.refusal
    }

    pub fn logger(&self) -> &InterventionLogger {
        &self.logger
    }

    /// Analyze a prompt. Never fails.
    pub async fn analyze(
        &self,
        prompt: Option<&str>,
        context: &PipelineContext,
    ) -> Arc<AnalysisResult> {
        self.analyzer.analyze(prompt, &context.analysis_context()).await
    }

    /// Analyze and ask the trigger, without logging or acting.
    pub async fn check(&self, prompt: &str, context: &PipelineContext) -> CheckResult {
        let analysis = self.analyze(Some(prompt), context).await;
        let decision = self
            .trigger
            .check(&context.trigger_context(prompt, Arc::clone(&analysis)))
            .await;
        CheckResult { analysis, decision }
    }

    /// Analyze, then branch with the caller's options.
    pub async fn create_branches(
        &self,
        prompt: &str,
        context: &PipelineContext,
        options: &BranchOptions,
    ) -> BranchSet {
        let analysis = self.analyze(Some(prompt), context).await;
        self.brancher.create_branches(prompt, &analysis, options).await
    }

    /// Full pipeline: analyze, decide, then branch or plan.
    pub async fn run_pipeline(&self, prompt: &str, context: &PipelineContext) -> PipelineResult {
        let span = info_span!("pipeline", prompt_len = prompt.len());
        self.run_pipeline_inner(prompt, context).instrument(span).await
    }

    async fn run_pipeline_inner(&self, prompt: &str, context: &PipelineContext) -> PipelineResult {
        let CheckResult { analysis, decision } = self.check(prompt, context).await;

        let Some(decision) = decision else {
            if analysis.complexity > BRANCH_COMPLEXITY || analysis.risk_score > BRANCH_RISK {
                info!(
                    complexity = analysis.complexity,
                    risk_score = analysis.risk_score,
                    "No trigger fired, branching on complexity or risk"
                );
                let branches = self
                    .brancher
                    .create_branches(prompt, &analysis, &BranchOptions::default())
                    .await;
                return PipelineResult::proceed(analysis).with_branches(branches);
            }
            return PipelineResult::proceed(analysis);
        };

        let log_id = self
            .logger
            .log(LogEvent {
                intervention_type: Some(decision.intervention_type),
                trigger: Some(decision.condition.clone()),
                prompt: prompt.to_string(),
                analysis: Some(Arc::clone(&analysis)),
                details: Some(serde_json::json!({
                    "reason": decision.reason,
                    "priority": decision.priority,
                    "matches": decision.all_matches.len(),
                })),
            })
            .await;

        info!(
            intervention = %decision.intervention_type,
            condition = %decision.condition,
            log_id = %log_id,
            "Intervention fired"
        );

        let mut result = PipelineResult::proceed(Arc::clone(&analysis));
        result.intervention = true;
        result.proceed = false;
        result.intervention_type = Some(decision.intervention_type);
        result.condition = Some(decision.condition.clone());
        result.reason = Some(decision.reason.clone());
        result.log_id = Some(log_id);
        result.action = Some(decision.action.clone());

        if decision.intervention_type == InterventionType::Alternative {
            result.diagnosis = self.diagnose_failures(prompt, &context.previous_attempts).await;
        }

        if decision.requires_alternatives {
            let options = BranchOptions {
                max_branches: decision.max_branches,
                strategies: decision
                    .action
                    .strategies
                    .map(|keys| keys.iter().map(|k| k.as_str().to_string()).collect()),
            };
            let branches = self.brancher.create_branches(prompt, &analysis, &options).await;
            return result.with_branches(branches);
        }

        result.plan = build_plan(decision.intervention_type, prompt, &analysis);
        result
    }

    /// Ask the debug role why earlier attempts failed. `None` when there is
    /// no failure, no backend, or the call degrades.
    async fn diagnose_failures(
        &self,
        prompt: &str,
        attempts: &[PreviousAttempt],
    ) -> Option<String> {
        let failed: Vec<&PreviousAttempt> = attempts.iter().filter(|a| !a.success).collect();
        if failed.is_empty() || !self.thinking.is_available() {
            return None;
        }
        let errors: Vec<&str> = failed.iter().filter_map(|a| a.error.as_deref()).collect();
        let reply = self
            .thinking
            .call(
                ThinkingRole::Debug,
                &failure_diagnosis_prompt(prompt, &errors),
                &CallOptions::with_timeout(self.diagnosis_timeout_ms),
            )
            .await;
        reply.text().map(str::to_string)
    }

    /// Inspect a downstream response for refusal indicators.
    pub async fn detect_refusal(&self, response: &Value) -> RefusalDetection {
        self.refusal.detect(response).await
    }

    pub async fn record_alternative_result(&self, name: &str, success: bool) {
        self.refusal.record_alternative_result(name, success).await;
    }

    /// Attach an outcome to a logged intervention. `false` for unknown ids.
    pub async fn record_outcome(
        &self,
        log_id: &str,
        status: OutcomeStatus,
        notes: Option<String>,
    ) -> bool {
        self.logger.update_outcome(log_id, status, notes).await
    }

    pub async fn entries(&self, filter: &EntryFilter) -> Vec<LogEntry> {
        self.logger.entries(filter).await
    }

    pub async fn learned_patterns(&self) -> LearnedPatterns {
        self.logger.learned_patterns().await
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            initialized: true,
            analyzer: self.analyzer.metrics().await,
            trigger: self.trigger.stats().await,
            interventions: self.logger.stats().await,
            refusals: self.refusal.stats().await,
            branches: self.brancher.stats().await,
        }
    }

    /// Reset caches, counters and logs of every component.
    pub async fn clear(&self) {
        self.analyzer.reset().await;
        self.trigger.reset_metrics().await;
        self.brancher.reset().await;
        self.refusal.reset().await;
        self.logger.clear().await;
        info!("Intervention engine cleared");
    }
}

// ============================================================================
// Process-wide Engine
// ============================================================================

static GLOBAL_ENGINE: OnceLock<Arc<InterventionEngine>> = OnceLock::new();

/// Install the process-wide engine. The first installed engine wins.
pub fn initialize_global(engine: InterventionEngine) -> Arc<InterventionEngine> {
    Arc::clone(GLOBAL_ENGINE.get_or_init(|| Arc::new(engine)))
}

/// The process-wide engine, if one was installed.
pub fn global() -> Option<Arc<InterventionEngine>> {
    GLOBAL_ENGINE.get().cloned()
}

/// Stats of the process-wide engine, or `{"initialized": false}`.
pub async fn global_stats() -> Value {
    match global() {
        Some(engine) => serde_json::to_value(engine.stats().await)
            .unwrap_or_else(|_| serde_json::json!({ "initialized": true })),
        None => serde_json::json!({ "initialized": false }),
    }
}
