//! Semantic analysis of task prompts.
//!
//! Turns a prompt plus caller context into an [`AnalysisResult`]: intent,
//! complexity, risk, detected frameworks and patterns, extracted entities and
//! reasoning recommendations. All scoring is rule-based; when a thinking
//! backend is available, complex prompts additionally get a deep analysis
//! that refines the recommended thinking mode.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::config::AnalyzerConfig;
use super::types::{
    AnalysisContext, AnalysisResult, DeepAnalysis, Entity, EntityKind, IntentCategory,
    InterventionHint, IntentResult, InterventionType, RiskFactor, RiskLevel, ThinkingMode,
};
use crate::prompts::deep_analysis_prompt;
use crate::thinking::{CallOptions, ThinkingClient, ThinkingRole};

/// Cached analyses kept before the oldest is evicted.
const CACHE_CAPACITY: usize = 1024;

// ============================================================================
// Rule Tables
// ============================================================================

static INTENT_RULES: Lazy<Vec<(IntentCategory, Vec<Regex>)>> = Lazy::new(|| {
    vec![
        (
            IntentCategory::Implementation,
            vec![
                rule(
                    r"(?i)\b(create|build|implement|add|develop|write|construct|setup|initialize)\b",
                ),
                rule(r"(?i)\b(new feature|from scratch|start)\b"),
            ],
        ),
        (
            IntentCategory::Modification,
            vec![
                rule(
                    r"(?i)\b(refactor|fix|update|modify|change|improve|optimize|enhance|rename)\b",
                ),
                rule(r"(?i)\b(bug|issue|error|problem)\b"),
            ],
        ),
        (
            IntentCategory::Analysis,
            vec![
                rule(r"(?i)\b(analyze|review|explain|understand|examine|assess|evaluate)\b"),
                rule(r"(?i)\b(what does|how does|why does)\b"),
            ],
        ),
        (
            IntentCategory::Research,
            vec![
                rule(r"(?i)\b(find|search|investigate|explore|research|look up|locate)\b"),
                rule(r"(?i)\b(documentation|docs|example)\b"),
            ],
        ),
    ]
});

static FRAMEWORK_RULES: Lazy<Vec<(&'static str, Vec<Regex>)>> = Lazy::new(|| {
    vec![
        (
            "react",
            vec![
                rule(r"(?i)\breact\b"),
                rule(r"(?i)\bjsx\b"),
                rule(r"(?i)\busestate\b"),
                rule(r"(?i)\buseeffect\b"),
            ],
        ),
        (
            "express",
            vec![
                rule(r"(?i)\bexpress\b"),
                rule(r"(?i)\bexpress\.js\b"),
                rule(r"(?i)\bapp\.get\b"),
                rule(r"(?i)\bapp\.post\b"),
            ],
        ),
        (
            "typescript",
            vec![
                rule(r"(?i)\btypescript\b"),
                rule(r"\b\.ts\b"),
                rule(r"(?i)\binterface\b"),
                rule(r"\btype\b"),
            ],
        ),
        (
            "nextjs",
            vec![
                rule(r"(?i)\bnext\.?js\b"),
                rule(r"(?i)\bgetstaticprops\b"),
                rule(r"(?i)\bgetserversideprops\b"),
            ],
        ),
        (
            "nodejs",
            vec![rule(r"(?i)\bnode\.?js\b"), rule(r"(?i)\bcommonjs\b"), rule(r"\brequire\s*\(")],
        ),
        (
            "python",
            vec![
                rule(r"(?i)\bpython\b"),
                rule(r"\b\.py\b"),
                rule(r"\bdef\s+\w+\s*\("),
                rule(r"\bimport\s+\w+"),
            ],
        ),
        (
            "postgresql",
            vec![rule(r"(?i)\bpostgres\b"), rule(r"(?i)\bpsql\b"), rule(r"(?i)\bpg\b")],
        ),
        (
            "mongodb",
            vec![rule(r"(?i)\bmongodb?\b"), rule(r"(?i)\bmongoose\b"), rule(r"(?i)\bObjectId\b")],
        ),
    ]
});

/// (factor, weight, keywords). A factor counts once when any keyword is a substring.
const COMPLEXITY_FACTORS: &[(&str, f64, &[&str])] = &[
    ("multiPart", 15.0, &["and", "also", "then", "additionally", "furthermore"]),
    ("nestedStructures", 10.0, &["nested", "deep", "hierarchical", "recursive"]),
    ("asyncOperations", 12.0, &["async", "await", "promise", "callback", "event"]),
    ("fileOperations", 8.0, &["read", "write", "delete", "create file", "update file"]),
    ("databaseOps", 15.0, &["query", "insert", "update", "database", "sql", "mongo", "redis"]),
    ("apiCalls", 10.0, &["api", "fetch", "request", "http", "endpoint", "rest", "gateway"]),
    ("authentication", 20.0, &["auth", "login", "token", "session", "jwt", "oauth"]),
    ("security", 25.0, &["encrypt", "secure", "protect", "sanitize", "validate"]),
    ("testing", 8.0, &["test", "spec", "mock", "assert", "expect"]),
    ("deployment", 15.0, &["deploy", "ci", "cd", "docker", "kubernetes", "pipeline"]),
];

const MULTI_PART_CONNECTIVES: &[&str] =
    &["first", "second", "then", "after that", "finally", "also"];
const ARCHITECTURE_KEYWORDS: &[&str] =
    &["architecture", "microservices", "distributed", "cluster", "design"];

static CRITICAL_RULES: Lazy<Vec<(Regex, u32, &'static str)>> = Lazy::new(|| {
    vec![
        (rule(r"(?i)\bdrop\b"), 40, "drop_operation"),
        (rule(r"(?i)\bdelete\s+all\b"), 35, "delete_all"),
        (rule(r"(?i)\btruncate\b"), 30, "truncate_operation"),
        (rule(r"(?i)\bproduction\b"), 20, "production_environment"),
        (rule(r"(?i)\bremove\s+all\b"), 30, "remove_all"),
    ]
});

static AMBIGUITY_RULES: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["might", "maybe", "could", "possibly", "something", "some", "etc", "whatever"]
        .iter()
        .map(|word| rule(&format!(r"(?i)\b{}\b", word)))
        .collect()
});

static SECURITY_TERMS: Lazy<Regex> =
    Lazy::new(|| rule(r"(?i)\b(password|secret|key|token|auth|permission|access)\b"));
static DATABASE_WORD: Lazy<Regex> = Lazy::new(|| rule(r"(?i)\bdatabase\b"));
static DESTRUCTIVE_VERB: Lazy<Regex> = Lazy::new(|| rule(r"(?i)\b(drop|delete|remove|truncate)\b"));

const PATTERN_KEYWORDS: &[(&str, &str)] = &[
    ("crud", "crud"),
    ("mvc", "mvc"),
    ("api", "api"),
    ("middleware", "middleware"),
    ("hook", "hooks"),
    ("component", "component-based"),
    ("service", "service-layer"),
    ("repository", "repository-pattern"),
    ("factory", "factory-pattern"),
    ("singleton", "singleton-pattern"),
];

static FILE_PATH: Lazy<Regex> = Lazy::new(|| rule(r"[/\\][\w\-./\\]+"));
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| rule(r"\b[A-Z][a-zA-Z0-9]*\b"));
static URL: Lazy<Regex> = Lazy::new(|| rule(r"https?://[^\s]+"));

const ACTION_VERBS: &[&str] = &[
    "create", "build", "implement", "add", "develop", "write", "refactor", "fix", "update",
    "modify", "change", "improve", "analyze", "review", "explain", "understand", "examine",
    "find", "search", "investigate", "explore", "research", "delete", "remove", "clean",
    "optimize", "test", "deploy",
];

const TECHNICAL_TERMS: &[&str] = &[
    "api", "rest", "graphql", "sql", "nosql", "database", "frontend", "backend", "fullstack",
    "server", "client", "component", "module", "package", "library", "framework", "test",
    "spec", "mock", "stub", "fixture", "async", "sync", "promise", "callback", "event", "type",
    "interface", "class", "function", "method", "route", "endpoint", "middleware", "handler",
    "controller",
];

#[allow(clippy::expect_used)]
fn rule(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

// ============================================================================
// Rule-based Scoring
// ============================================================================

/// Classify intent. Confidence is `min(hits / 2, 1)`; ties keep declaration order.
pub fn classify_intent(prompt: &str) -> IntentResult {
    let mut all_scores = BTreeMap::new();
    let mut primary = IntentCategory::Unknown;
    let mut best = 0u32;

    for (category, patterns) in INTENT_RULES.iter() {
        let score = patterns.iter().filter(|p| p.is_match(prompt)).count() as u32;
        all_scores.insert(*category, score);
        if score > best {
            best = score;
            primary = *category;
        }
    }

    IntentResult {
        primary,
        confidence: if best > 0 { (f64::from(best) / 2.0).min(1.0) } else { 0.0 },
        all_scores,
    }
}

/// Complexity score in [0, 100].
pub fn score_complexity(prompt: &str, context: &AnalysisContext) -> u32 {
    if prompt.trim().is_empty() {
        return 0;
    }
    let lower = prompt.to_lowercase();
    let word_count = prompt.split_whitespace().count() as f64;
    let mut score = (word_count / 5.0).min(20.0);

    for (_, weight, keywords) in COMPLEXITY_FACTORS {
        if keywords.iter().any(|k| lower.contains(k)) {
            score += weight * 1.5;
        }
    }

    let connectives = MULTI_PART_CONNECTIVES.iter().filter(|k| lower.contains(*k)).count();
    score += connectives as f64 * 8.0;

    let architecture = ARCHITECTURE_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    score += architecture as f64 * 10.0;

    if context.files.len() > 3 {
        score += (context.files.len() - 3) as f64 * 3.0;
    }

    (score.round() as u32).min(100)
}

/// Risk score in [0, 100] with every contributing factor, in evaluation order.
pub fn assess_risk(
    prompt: &str,
    complexity: u32,
    framework_count: usize,
) -> (u32, Vec<RiskFactor>) {
    let mut factors = Vec::new();

    if complexity > 70 {
        factors.push(RiskFactor::new("high_complexity", 30));
    } else if complexity > 50 {
        factors.push(RiskFactor::new("medium_complexity", 15));
    }

    for (pattern, points, factor) in CRITICAL_RULES.iter() {
        if pattern.is_match(prompt) {
            factors.push(RiskFactor::new(*factor, *points));
        }
    }

    let ambiguity = AMBIGUITY_RULES.iter().filter(|p| p.is_match(prompt)).count() as u32 * 5;
    if ambiguity > 0 {
        factors.push(RiskFactor::new("ambiguity", ambiguity.min(30)));
    }

    if framework_count > 2 {
        factors.push(RiskFactor::new("multiple_frameworks", 10));
    }

    if SECURITY_TERMS.is_match(prompt) {
        factors.push(RiskFactor::new("security_sensitive", 10));
    }

    if DATABASE_WORD.is_match(prompt) && DESTRUCTIVE_VERB.is_match(prompt) {
        factors.push(RiskFactor::new("destructive_database_op", 15));
    }

    let total: u32 = factors.iter().map(|f| f.points).sum();
    (total.min(100), factors)
}

pub fn detect_frameworks(prompt: &str) -> BTreeSet<String> {
    FRAMEWORK_RULES
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|p| p.is_match(prompt)))
        .map(|(name, _)| name.to_string())
        .collect()
}

pub fn detect_patterns(prompt: &str) -> BTreeSet<String> {
    let lower = prompt.to_lowercase();
    PATTERN_KEYWORDS
        .iter()
        .filter(|(keyword, _)| lower.contains(keyword))
        .map(|(_, name)| name.to_string())
        .collect()
}

pub fn extract_entities(prompt: &str) -> Vec<Entity> {
    let mut entities = Vec::new();
    for (kind, pattern) in [
        (EntityKind::FilePath, &*FILE_PATH),
        (EntityKind::Identifier, &*IDENTIFIER),
        (EntityKind::Url, &*URL),
    ] {
        entities.extend(pattern.find_iter(prompt).map(|m| Entity {
            kind,
            value: m.as_str().to_string(),
        }));
    }
    entities
}

fn contained_terms(prompt: &str, terms: &[&str]) -> BTreeSet<String> {
    let lower = prompt.to_lowercase();
    terms
        .iter()
        .filter(|t| lower.contains(*t))
        .map(|t| t.to_string())
        .collect()
}

fn recommend_thinking_mode(complexity: u32, risk_level: RiskLevel) -> ThinkingMode {
    if complexity > 70 || risk_level == RiskLevel::Extreme {
        ThinkingMode::Comprehensive
    } else if complexity > 40 || risk_level == RiskLevel::High {
        ThinkingMode::Standard
    } else if complexity > 20 {
        ThinkingMode::Lightweight
    } else {
        ThinkingMode::None
    }
}

fn recommend_intervention(analysis: &AnalysisResult) -> Option<InterventionHint> {
    if analysis.risk_level == RiskLevel::Extreme {
        Some(InterventionHint {
            intervention_type: InterventionType::MultiPath,
            reason: "Extreme risk requires parallel exploration".to_string(),
        })
    } else if analysis.intent.confidence < 0.3 {
        Some(InterventionHint {
            intervention_type: InterventionType::Clarification,
            reason: "Low intent confidence needs clarification".to_string(),
        })
    } else if analysis.complexity > 60 && analysis.frameworks.len() > 2 {
        Some(InterventionHint {
            intervention_type: InterventionType::Decomposition,
            reason: "Complex multi-framework task benefits from decomposition".to_string(),
        })
    } else {
        None
    }
}

/// Map deep-analysis text onto a thinking mode.
fn mode_from_deep_analysis(text: &str) -> ThinkingMode {
    let lower = text.to_lowercase();
    if lower.contains("sequential") || lower.contains("structural") {
        ThinkingMode::Comprehensive
    } else {
        ThinkingMode::Standard
    }
}

/// Rule-based analysis with recommendations, no backend involvement.
pub fn analyze_rules(prompt: &str, context: &AnalysisContext) -> AnalysisResult {
    let intent = if prompt.trim().is_empty() {
        IntentResult::unknown()
    } else {
        classify_intent(prompt)
    };
    let complexity = score_complexity(prompt, context);
    let frameworks = detect_frameworks(prompt);
    let (risk_score, risk_factors) = assess_risk(prompt, complexity, frameworks.len());
    let risk_level = RiskLevel::from_score(risk_score);

    let mut analysis = AnalysisResult {
        prompt: prompt.to_string(),
        timestamp: Utc::now(),
        intent,
        complexity,
        risk_score,
        risk_level,
        risk_factors,
        frameworks,
        patterns: detect_patterns(prompt),
        entities: extract_entities(prompt),
        action_verbs: contained_terms(prompt, ACTION_VERBS),
        technical_terms: contained_terms(prompt, TECHNICAL_TERMS),
        recommended_thinking_mode: recommend_thinking_mode(complexity, risk_level),
        recommended_intervention: None,
        deep_analysis: None,
        deep_analysis_error: None,
    };
    analysis.recommended_intervention = recommend_intervention(&analysis);
    analysis
}

/// Cache key: SHA-256 over the prompt and the serialized context.
pub fn cache_key(prompt: &str, context: &AnalysisContext) -> String {
    let context_json = serde_json::to_string(context).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(b":");
    hasher.update(context_json.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Analyzer
// ============================================================================

#[derive(Default)]
struct AnalyzerState {
    cache: HashMap<String, Arc<AnalysisResult>>,
    cache_order: VecDeque<String>,
    analyses_run: u64,
    cache_hits: u64,
    complexity_total: u64,
    intent_distribution: BTreeMap<IntentCategory, u64>,
}

/// Analyzer counters.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerMetrics {
    pub analyses_run: u64,
    pub cache_hits: u64,
    pub cache_size: usize,
    pub cache_hit_rate: f64,
    /// Mean complexity over fresh (non-cached) analyses
    pub average_complexity: f64,
    pub intent_distribution: BTreeMap<IntentCategory, u64>,
}

/// Prompt analyzer with result cache and optional backend refinement.
pub struct SemanticAnalyzer {
    config: AnalyzerConfig,
    thinking: ThinkingClient,
    state: RwLock<AnalyzerState>,
}

impl SemanticAnalyzer {
    pub fn new(config: AnalyzerConfig, thinking: ThinkingClient) -> Self {
        Self {
            config,
            thinking,
            state: RwLock::new(AnalyzerState::default()),
        }
    }

    /// Analyze a prompt. Never fails: a missing prompt yields a zero-score result.
    pub async fn analyze(
        &self,
        prompt: Option<&str>,
        context: &AnalysisContext,
    ) -> Arc<AnalysisResult> {
        let prompt = prompt.unwrap_or_default();
        let key = cache_key(prompt, context);

        {
            let mut state = self.state.write().await;
            state.analyses_run += 1;
            if self.config.cache_results {
                if let Some(cached) = state.cache.get(&key).cloned() {
                    state.cache_hits += 1;
                    debug!(complexity = cached.complexity, "Analysis cache hit");
                    return cached;
                }
            }
        }

        let mut analysis = analyze_rules(prompt, context);

        if self.config.use_thinking
            && self.thinking.is_available()
            && analysis.complexity > self.config.deep_analysis_threshold
        {
            self.refine_with_backend(&mut analysis).await;
        }

        let analysis = Arc::new(analysis);
        let mut state = self.state.write().await;
        state.complexity_total += u64::from(analysis.complexity);
        *state.intent_distribution.entry(analysis.intent.primary).or_insert(0) += 1;

        if self.config.cache_results && !state.cache.contains_key(&key) {
            if state.cache.len() >= CACHE_CAPACITY {
                if let Some(oldest) = state.cache_order.pop_front() {
                    state.cache.remove(&oldest);
                }
            }
            state.cache_order.push_back(key.clone());
            state.cache.insert(key, Arc::clone(&analysis));
        }

        debug!(
            intent = %analysis.intent.primary,
            complexity = analysis.complexity,
            risk_score = analysis.risk_score,
            risk_level = %analysis.risk_level,
            "Prompt analyzed"
        );
        analysis
    }

    async fn refine_with_backend(&self, analysis: &mut AnalysisResult) {
        let request = deep_analysis_prompt(
            &analysis.prompt,
            analysis.intent.primary.as_str(),
            analysis.complexity,
            analysis.risk_level.as_str(),
        );
        let reply = self
            .thinking
            .call(
                ThinkingRole::Structural,
                &request,
                &CallOptions::with_timeout(self.config.timeout_ms),
            )
            .await;

        match reply.text() {
            Some(text) => {
                let mode = mode_from_deep_analysis(text);
                analysis.recommended_thinking_mode = mode;
                analysis.deep_analysis = Some(DeepAnalysis {
                    raw: text.to_string(),
                    recommended_mode: mode,
                });
            }
            None => {
                let error = reply.error.unwrap_or_else(|| "no result".to_string());
                warn!(
                    error = %error,
                    "Deep analysis unavailable, keeping rule-based recommendation"
                );
                analysis.deep_analysis_error = Some(error);
            }
        }
    }

    pub async fn metrics(&self) -> AnalyzerMetrics {
        let state = self.state.read().await;
        let fresh = state.analyses_run - state.cache_hits;
        AnalyzerMetrics {
            analyses_run: state.analyses_run,
            cache_hits: state.cache_hits,
            cache_size: state.cache.len(),
            cache_hit_rate: ratio(state.cache_hits, state.analyses_run),
            average_complexity: if fresh > 0 {
                state.complexity_total as f64 / fresh as f64
            } else {
                0.0
            },
            intent_distribution: state.intent_distribution.clone(),
        }
    }

    pub async fn clear_cache(&self) {
        let mut state = self.state.write().await;
        state.cache.clear();
        state.cache_order.clear();
    }

    /// Drop the cache and every counter.
    pub async fn reset(&self) {
        *self.state.write().await = AnalyzerState::default();
    }
}

pub(crate) fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thinking::{MockThinkingService, UnavailableThinkingService};

    fn offline_analyzer() -> SemanticAnalyzer {
        SemanticAnalyzer::new(
            AnalyzerConfig::default(),
            ThinkingClient::new(Arc::new(UnavailableThinkingService)),
        )
    }

    #[test]
    fn test_intent_classification() {
        let intent = classify_intent("Create a new feature for exporting reports");
        assert_eq!(intent.primary, IntentCategory::Implementation);
        assert_eq!(intent.confidence, 1.0);

        let intent = classify_intent("Fix a typo in README");
        assert_eq!(intent.primary, IntentCategory::Modification);
        assert_eq!(intent.confidence, 0.5);

        let intent = classify_intent("lorem ipsum");
        assert_eq!(intent.primary, IntentCategory::Unknown);
        assert_eq!(intent.confidence, 0.0);
    }

    #[test]
    fn test_intent_tie_prefers_declaration_order() {
        // One implementation hit ("add") and one modification hit ("fix").
        let intent = classify_intent("add and fix");
        assert_eq!(intent.primary, IntentCategory::Implementation);
    }

    #[test]
    fn test_complexity_typo_prompt() {
        // 5 words -> 1, "read" inside "readme" -> file operations 12
        assert_eq!(score_complexity("Fix a typo in README", &AnalysisContext::default()), 13);
    }

    #[test]
    fn test_complexity_counts_context_files() {
        let base = score_complexity("tidy", &AnalysisContext::default());
        let context = AnalysisContext::with_files(["a", "b", "c", "d", "e", "f"]);
        assert_eq!(score_complexity("tidy", &context), base + 9);
    }

    #[test]
    fn test_complexity_is_capped() {
        let prompt = "First design a distributed microservices architecture with async auth, \
                      then encrypt the database, also deploy to kubernetes and test the api, \
                      finally write nested recursive handlers";
        assert_eq!(score_complexity(prompt, &AnalysisContext::default()), 100);
    }

    #[test]
    fn test_risk_for_destructive_production_prompt() {
        let (score, factors) = assess_risk("Drop the production database", 23, 0);
        assert_eq!(score, 75);
        assert_eq!(RiskLevel::from_score(score), RiskLevel::High);
        let names: Vec<_> = factors.iter().map(|f| f.factor.as_str()).collect();
        assert_eq!(
            names,
            vec!["drop_operation", "production_environment", "destructive_database_op"]
        );
    }

    #[test]
    fn test_ambiguity_is_capped_at_thirty() {
        let (_, factors) = assess_risk(
            "maybe something might possibly could be some whatever etc",
            0,
            0,
        );
        let ambiguity = factors.iter().find(|f| f.factor == "ambiguity").unwrap();
        assert_eq!(ambiguity.points, 30);
    }

    #[test]
    fn test_security_terms_count_once() {
        let (score, factors) = assess_risk("rotate the password and the token", 0, 0);
        assert_eq!(score, 10);
        assert_eq!(factors.len(), 1);
    }

    #[test]
    fn test_framework_detection() {
        let frameworks = detect_frameworks("Build a React app on Next.js with a Postgres backend");
        assert!(frameworks.contains("react"));
        assert!(frameworks.contains("nextjs"));
        assert!(frameworks.contains("postgresql"));
        assert!(!frameworks.contains("python"));

        // `type` is case-sensitive
        assert!(!detect_frameworks("Type safety").contains("typescript"));
        assert!(detect_frameworks("add a type alias").contains("typescript"));
    }

    #[test]
    fn test_entities_and_terms() {
        let analysis = analyze_rules(
            "Refactor UserService in /src/services/user.ts per https://example.com/guide",
            &AnalysisContext::default(),
        );
        assert!(analysis
            .entities
            .iter()
            .any(|e| e.kind == EntityKind::Identifier && e.value == "UserService"));
        assert!(analysis
            .entities
            .iter()
            .any(|e| e.kind == EntityKind::FilePath && e.value == "/src/services/user.ts"));
        assert!(analysis
            .entities
            .iter()
            .any(|e| e.kind == EntityKind::Url && e.value == "https://example.com/guide"));
        assert!(analysis.action_verbs.contains("refactor"));
        assert!(analysis.patterns.contains("service-layer"));
    }

    #[test]
    fn test_recommendations() {
        assert_eq!(recommend_thinking_mode(80, RiskLevel::Low), ThinkingMode::Comprehensive);
        assert_eq!(recommend_thinking_mode(10, RiskLevel::Extreme), ThinkingMode::Comprehensive);
        assert_eq!(recommend_thinking_mode(10, RiskLevel::High), ThinkingMode::Standard);
        assert_eq!(recommend_thinking_mode(30, RiskLevel::Low), ThinkingMode::Lightweight);
        assert_eq!(recommend_thinking_mode(5, RiskLevel::Low), ThinkingMode::None);

        let analysis = analyze_rules("lorem ipsum", &AnalysisContext::default());
        let hint = analysis.recommended_intervention.unwrap();
        assert_eq!(hint.intervention_type, InterventionType::Clarification);
    }

    #[tokio::test]
    async fn test_analyze_none_prompt_is_zero_result() {
        let analyzer = offline_analyzer();
        let analysis = analyzer.analyze(None, &AnalysisContext::default()).await;
        assert_eq!(analysis.intent.primary, IntentCategory::Unknown);
        assert_eq!(analysis.intent.confidence, 0.0);
        assert_eq!(analysis.complexity, 0);
        assert_eq!(analysis.risk_score, 0);
        assert_eq!(analysis.risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_analyze_uses_cache() {
        let analyzer = offline_analyzer();
        let context = AnalysisContext::default();
        let first = analyzer.analyze(Some("Fix a typo in README"), &context).await;
        let second = analyzer.analyze(Some("Fix a typo in README"), &context).await;

        assert!(Arc::ptr_eq(&first, &second));
        let metrics = analyzer.metrics().await;
        assert_eq!(metrics.analyses_run, 2);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_size, 1);
        assert_eq!(metrics.cache_hit_rate, 0.5);
        assert_eq!(metrics.average_complexity, 13.0);

        // Different context, different key
        let other = analyzer
            .analyze(Some("Fix a typo in README"), &AnalysisContext::with_files(["README.md"]))
            .await;
        assert!(!Arc::ptr_eq(&first, &other));

        analyzer.clear_cache().await;
        assert_eq!(analyzer.metrics().await.cache_size, 0);
    }

    #[tokio::test]
    async fn test_deep_analysis_refines_mode() {
        let mut mock = MockThinkingService::new();
        mock.expect_is_available().return_const(true);
        mock.expect_structural()
            .times(1)
            .returning(|_, _| Ok("Use sequential thinking for this plan".to_string()));

        let analyzer = SemanticAnalyzer::new(
            AnalyzerConfig::default(),
            ThinkingClient::new(Arc::new(mock)),
        );
        let analysis = analyzer
            .analyze(
                Some("Build an async api endpoint with jwt auth and a database query"),
                &AnalysisContext::default(),
            )
            .await;

        assert!(analysis.complexity > 40);
        assert_eq!(analysis.recommended_thinking_mode, ThinkingMode::Comprehensive);
        assert!(analysis.deep_analysis.is_some());
    }

    #[tokio::test]
    async fn test_deep_analysis_failure_is_recorded() {
        let mut mock = MockThinkingService::new();
        mock.expect_is_available().return_const(true);
        mock.expect_structural().returning(|_, _| {
            Err(crate::error::ThinkingError::Api {
                status: 500,
                message: "boom".to_string(),
            })
        });

        let analyzer = SemanticAnalyzer::new(
            AnalyzerConfig::default(),
            ThinkingClient::new(Arc::new(mock)),
        );
        let analysis = analyzer
            .analyze(
                Some("Build an async api endpoint with jwt auth and a database query"),
                &AnalysisContext::default(),
            )
            .await;

        assert!(analysis.deep_analysis.is_none());
        assert!(analysis.deep_analysis_error.is_some());
        assert_ne!(analysis.recommended_thinking_mode, ThinkingMode::None);
    }
}
