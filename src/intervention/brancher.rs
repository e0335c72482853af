//! Parallel exploration of solution strategies.
//!
//! Each selected strategy becomes an independent future that asks the
//! thinking backend for a structural analysis followed by concrete steps.
//! All futures are joined together; a failed or timed-out strategy is
//! recorded as a failed path and never affects its siblings.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::analyzer::ratio;
use super::config::BrancherConfig;
use super::types::{AnalysisResult, RiskLevel};
use crate::prompts::{branch_prompt, steps_prompt, BranchPromptInput};
use crate::thinking::{CallOptions, ThinkingClient, ThinkingRole};

// ============================================================================
// Strategies
// ============================================================================

/// Named exploration strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKey {
    Conservative,
    Moderate,
    Aggressive,
    Alternative,
}

impl StrategyKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKey::Conservative => "conservative",
            StrategyKey::Moderate => "moderate",
            StrategyKey::Aggressive => "aggressive",
            StrategyKey::Alternative => "alternative",
        }
    }

    pub fn template(&self) -> &'static StrategyTemplate {
        match self {
            StrategyKey::Conservative => &CONSERVATIVE,
            StrategyKey::Moderate => &MODERATE,
            StrategyKey::Aggressive => &AGGRESSIVE,
            StrategyKey::Alternative => &ALTERNATIVE,
        }
    }
}

impl fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrategyKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(StrategyKey::Conservative),
            "moderate" => Ok(StrategyKey::Moderate),
            "aggressive" => Ok(StrategyKey::Aggressive),
            "alternative" => Ok(StrategyKey::Alternative),
            _ => Err(format!("Unknown strategy: {}", s)),
        }
    }
}

/// Fixed parameters of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyTemplate {
    pub key: StrategyKey,
    pub name: &'static str,
    pub description: &'static str,
    pub prompt_prefix: &'static str,
    /// In [0, 1]
    pub risk_tolerance: f64,
    pub complexity_limit: u32,
}

static CONSERVATIVE: StrategyTemplate = StrategyTemplate {
    key: StrategyKey::Conservative,
    name: "Conservative Approach",
    description: "Minimal changes, maximum safety",
    prompt_prefix: "Take a conservative, safe approach:",
    risk_tolerance: 0.2,
    complexity_limit: 30,
};

static MODERATE: StrategyTemplate = StrategyTemplate {
    key: StrategyKey::Moderate,
    name: "Moderate Approach",
    description: "Balanced changes with reasonable risk",
    prompt_prefix: "Take a balanced, moderate approach:",
    risk_tolerance: 0.5,
    complexity_limit: 60,
};

static AGGRESSIVE: StrategyTemplate = StrategyTemplate {
    key: StrategyKey::Aggressive,
    name: "Aggressive Approach",
    description: "Comprehensive changes, higher risk for better results",
    prompt_prefix: "Take an aggressive, comprehensive approach:",
    risk_tolerance: 0.8,
    complexity_limit: 100,
};

static ALTERNATIVE: StrategyTemplate = StrategyTemplate {
    key: StrategyKey::Alternative,
    name: "Alternative Approach",
    description: "Completely different solution path",
    prompt_prefix: "Consider a completely different approach:",
    risk_tolerance: 0.6,
    complexity_limit: 80,
};

/// Caller overrides for one branching run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchOptions {
    #[serde(default)]
    pub max_branches: Option<usize>,
    /// Explicit strategy keys; unknown keys are skipped
    #[serde(default)]
    pub strategies: Option<Vec<String>>,
}

/// Pick strategies for an analysis, at most `max_branches` of them.
pub fn select_strategies(
    analysis: &AnalysisResult,
    options: &BranchOptions,
    max_branches: usize,
) -> Vec<StrategyKey> {
    let max_branches = max_branches.max(1);

    if let Some(requested) = &options.strategies {
        let mut selected = Vec::new();
        for key in requested {
            match key.parse::<StrategyKey>() {
                Ok(key) if !selected.contains(&key) => selected.push(key),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Skipping unknown branch strategy"),
            }
        }
        selected.truncate(max_branches);
        return selected;
    }

    let mut selected = vec![StrategyKey::Moderate];

    if matches!(analysis.risk_level, RiskLevel::High | RiskLevel::Extreme) {
        selected.push(StrategyKey::Conservative);
    }
    if analysis.risk_level == RiskLevel::Low || analysis.complexity > 60 {
        selected.push(StrategyKey::Aggressive);
    }
    if analysis.intent.confidence < 0.5 {
        selected.push(StrategyKey::Alternative);
    }

    if selected.len() < 2 && max_branches >= 2 {
        let top_up = if analysis.complexity >= 40 {
            StrategyKey::Aggressive
        } else {
            StrategyKey::Conservative
        };
        if !selected.contains(&top_up) {
            selected.push(top_up);
        }
    }

    selected.truncate(max_branches);
    selected
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of one strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchResult {
    pub strategy: String,
    pub strategy_key: StrategyKey,
    pub success: bool,
    pub solution: Option<String>,
    pub reasoning: Option<String>,
    /// In [0, 1]; zero for failed paths
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub steps: Vec<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Mean over successful paths
    pub average_confidence: f64,
    pub best_strategy: Option<String>,
    pub duration_ms: u64,
}

/// What the caller should do with a branch set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Recommendation {
    Proceed {
        strategy: String,
        confidence: f64,
        reason: String,
        steps: Vec<String>,
        risk_level: RiskLevel,
    },
    Retry {
        reason: String,
        suggested_prompt: String,
    },
}

impl Recommendation {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Recommendation::Proceed { .. })
    }
}

/// All paths of one branching run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchSet {
    pub branch_id: String,
    pub paths: Vec<BranchResult>,
    pub summary: BranchSummary,
    pub recommendation: Recommendation,
}

/// Highest-confidence successful path; the first one wins ties.
pub fn select_best_branch(set: &BranchSet) -> Option<&BranchResult> {
    best_path(&set.paths)
}

fn best_path(paths: &[BranchResult]) -> Option<&BranchResult> {
    paths
        .iter()
        .filter(|p| p.success)
        .fold(None, |best: Option<&BranchResult>, path| match best {
            Some(b) if b.confidence >= path.confidence => Some(b),
            _ => Some(path),
        })
}

fn recommend(paths: &[BranchResult]) -> Recommendation {
    match best_path(paths) {
        Some(best) => Recommendation::Proceed {
            strategy: best.strategy.clone(),
            confidence: best.confidence,
            reason: format!(
                "{} approach has highest confidence ({}%)",
                best.strategy_key,
                (best.confidence * 100.0).round() as u32
            ),
            steps: best.steps.clone(),
            risk_level: best.risk_level,
        },
        None => Recommendation::Retry {
            reason: "All branch strategies failed".to_string(),
            suggested_prompt: "Please provide more specific requirements".to_string(),
        },
    }
}

// ============================================================================
// Step & Risk Heuristics
// ============================================================================

#[allow(clippy::expect_used)]
static STEP_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:step|\d+\.)\s*(.+)").expect("valid regex"));

#[derive(Deserialize)]
struct StepsDocument {
    steps: Vec<String>,
}

/// Pull step lines out of backend text, or a `steps` array out of JSON text.
pub fn extract_steps(text: &str) -> Vec<String> {
    if let Ok(doc) = serde_json::from_str::<StepsDocument>(text) {
        return doc.steps;
    }

    STEP_LINE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

fn branch_risk(template: &StrategyTemplate, step_count: usize) -> RiskLevel {
    let mut score = template.risk_tolerance * 100.0;
    if step_count > 5 {
        score += 10.0;
    }
    if score >= 70.0 {
        RiskLevel::High
    } else if score >= 40.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Backend output gathered for one strategy.
struct Exploration {
    structure: Option<String>,
    solution: Option<String>,
    steps: Vec<String>,
    structural_success: bool,
}

impl Exploration {
    /// Scored in tenths so the bonuses add up exactly. A fallback branch
    /// with steps earns the steps and solution bonuses and lands at 0.7.
    fn confidence(&self) -> f64 {
        let mut tenths = 5u32;
        if self.structure.is_some() {
            tenths += 2;
        }
        if !self.steps.is_empty() {
            tenths += 1;
        }
        if self.solution.is_some() {
            tenths += 1;
        }
        if self.structural_success {
            tenths += 1;
        }
        f64::from(tenths.min(10)) / 10.0
    }
}

/// Structural pass then steps pass; on any failure a single simplified pass.
async fn explore(
    thinking: &ThinkingClient,
    prompt: &str,
    timeout_ms: u64,
) -> Result<Exploration, String> {
    let half = CallOptions::with_timeout(timeout_ms / 2);

    let structural = thinking.call(ThinkingRole::Structural, prompt, &half).await;
    if let Some(structure) = structural.text() {
        let sequential = thinking
            .call(ThinkingRole::Sequential, &steps_prompt(structure), &half)
            .await;
        if let Some(steps_text) = sequential.text() {
            return Ok(Exploration {
                structure: Some(structure.to_string()),
                solution: Some(structure.to_string()),
                steps: extract_steps(steps_text),
                structural_success: true,
            });
        }
    }

    debug!("Two-stage exploration failed, falling back to a single sequential call");
    let fallback = thinking
        .call(ThinkingRole::Sequential, prompt, &CallOptions::with_timeout(timeout_ms))
        .await;
    match fallback.text() {
        Some(text) => Ok(Exploration {
            structure: None,
            solution: Some(text.to_string()),
            steps: extract_steps(text),
            structural_success: false,
        }),
        None => Err(fallback
            .error
            .unwrap_or_else(|| "Branch produced no result".to_string())),
    }
}

async fn run_strategy(
    thinking: ThinkingClient,
    template: &'static StrategyTemplate,
    prompt: String,
    timeout_ms: u64,
) -> (&'static StrategyTemplate, u64, Result<Exploration, String>) {
    let start = Instant::now();
    let outcome = explore(&thinking, &prompt, timeout_ms).await;
    (template, start.elapsed().as_millis() as u64, outcome)
}

fn to_branch_result(
    template: &StrategyTemplate,
    duration_ms: u64,
    outcome: Result<Exploration, String>,
) -> BranchResult {
    match outcome {
        Ok(exploration) => BranchResult {
            strategy: template.name.to_string(),
            strategy_key: template.key,
            success: true,
            confidence: exploration.confidence(),
            risk_level: branch_risk(template, exploration.steps.len()),
            reasoning: exploration.structure.clone().or_else(|| exploration.solution.clone()),
            solution: exploration.solution,
            steps: exploration.steps,
            duration_ms,
            error: None,
        },
        Err(error) => BranchResult {
            strategy: template.name.to_string(),
            strategy_key: template.key,
            success: false,
            solution: None,
            reasoning: None,
            confidence: 0.0,
            risk_level: branch_risk(template, 0),
            steps: Vec::new(),
            duration_ms,
            error: Some(error),
        },
    }
}

// ============================================================================
// Brancher
// ============================================================================

#[derive(Debug, Default)]
struct BrancherMetrics {
    created: u64,
    succeeded: u64,
    confidence_total: f64,
    strategy_distribution: BTreeMap<StrategyKey, u64>,
}

/// Brancher counters.
#[derive(Debug, Clone, Serialize)]
pub struct BrancherStats {
    pub branches_created: u64,
    pub branches_succeeded: u64,
    pub success_rate: f64,
    /// Mean over successful paths
    pub average_confidence: f64,
    pub strategy_distribution: BTreeMap<StrategyKey, u64>,
    pub active_branch_sets: usize,
}

pub struct ParallelBrancher {
    config: BrancherConfig,
    thinking: ThinkingClient,
    metrics: RwLock<BrancherMetrics>,
    active: RwLock<HashSet<String>>,
}

impl ParallelBrancher {
    pub fn new(config: BrancherConfig, thinking: ThinkingClient) -> Self {
        Self {
            config,
            thinking,
            metrics: RwLock::new(BrancherMetrics::default()),
            active: RwLock::new(HashSet::new()),
        }
    }

    /// Explore the selected strategies concurrently and rank the results.
    pub async fn create_branches(
        &self,
        prompt: &str,
        analysis: &AnalysisResult,
        options: &BranchOptions,
    ) -> BranchSet {
        let start = Instant::now();
        let branch_id = format!("branch-{}", Uuid::new_v4());
        let max_branches = options.max_branches.unwrap_or(self.config.max_branches);
        let strategies = select_strategies(analysis, options, max_branches);

        info!(
            branch_id = %branch_id,
            strategies = ?strategies,
            "Creating parallel branches"
        );
        self.active.write().await.insert(branch_id.clone());

        let frameworks: Vec<String> = analysis.frameworks.iter().cloned().collect();
        let tasks = strategies.iter().map(|key| {
            let template = key.template();
            let branch_prompt = branch_prompt(&BranchPromptInput {
                prefix: template.prompt_prefix,
                task: prompt,
                complexity: analysis.complexity,
                risk_level: analysis.risk_level.as_str(),
                frameworks: &frameworks,
                intent: analysis.intent.primary.as_str(),
                risk_tolerance: template.risk_tolerance,
                complexity_limit: template.complexity_limit,
            });
            run_strategy(self.thinking.clone(), template, branch_prompt, self.config.timeout_ms)
        });

        let paths: Vec<BranchResult> = join_all(tasks)
            .await
            .into_iter()
            .map(|(template, duration_ms, outcome)| {
                to_branch_result(template, duration_ms, outcome)
            })
            .collect();

        let successful: Vec<&BranchResult> = paths.iter().filter(|p| p.success).collect();
        let confidence_sum: f64 = successful.iter().map(|p| p.confidence).sum();
        let average_confidence = if successful.is_empty() {
            0.0
        } else {
            confidence_sum / successful.len() as f64
        };

        let summary = BranchSummary {
            total: paths.len(),
            succeeded: successful.len(),
            failed: paths.len() - successful.len(),
            average_confidence,
            best_strategy: best_path(&paths).map(|p| p.strategy.clone()),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        {
            let mut metrics = self.metrics.write().await;
            metrics.created += paths.len() as u64;
            metrics.succeeded += successful.len() as u64;
            metrics.confidence_total += confidence_sum;
            for key in &strategies {
                *metrics.strategy_distribution.entry(*key).or_insert(0) += 1;
            }
        }
        self.active.write().await.remove(&branch_id);

        let recommendation = recommend(&paths);
        info!(
            branch_id = %branch_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Branches complete"
        );

        BranchSet {
            branch_id,
            paths,
            summary,
            recommendation,
        }
    }

    pub async fn stats(&self) -> BrancherStats {
        let metrics = self.metrics.read().await;
        BrancherStats {
            branches_created: metrics.created,
            branches_succeeded: metrics.succeeded,
            success_rate: ratio(metrics.succeeded, metrics.created),
            average_confidence: if metrics.succeeded > 0 {
                metrics.confidence_total / metrics.succeeded as f64
            } else {
                0.0
            },
            strategy_distribution: metrics.strategy_distribution.clone(),
            active_branch_sets: self.active.read().await.len(),
        }
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = BrancherMetrics::default();
        self.active.write().await.clear();
    }
}
