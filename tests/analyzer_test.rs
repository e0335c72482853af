//! Semantic analyzer integration tests
//!
//! Rule-based scoring properties plus backend refinement through a stub
//! thinking service.

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use semantic_intervention::error::{ThinkingError, ThinkingResult};
use semantic_intervention::intervention::analyzer::{analyze_rules, cache_key, score_complexity};
use semantic_intervention::intervention::{
    AnalysisContext, AnalyzerConfig, IntentCategory, RiskLevel, SemanticAnalyzer, ThinkingMode,
};
use semantic_intervention::thinking::{
    CallOptions, ThinkingClient, ThinkingService, UnavailableThinkingService,
};

/// Backend answering every role with the same text, or failing.
struct FixedService {
    reply: Option<&'static str>,
}

#[async_trait]
impl ThinkingService for FixedService {
    async fn structural(&self, _prompt: &str, _options: &CallOptions) -> ThinkingResult<String> {
        self.answer()
    }

    async fn sequential(&self, _prompt: &str, _options: &CallOptions) -> ThinkingResult<String> {
        self.answer()
    }

    async fn debug(&self, _prompt: &str, _options: &CallOptions) -> ThinkingResult<String> {
        self.answer()
    }

    fn is_available(&self) -> bool {
        true
    }
}

impl FixedService {
    fn answer(&self) -> ThinkingResult<String> {
        self.reply
            .map(str::to_string)
            .ok_or_else(|| ThinkingError::Api {
                status: 503,
                message: "overloaded".to_string(),
            })
    }
}

fn offline_analyzer() -> SemanticAnalyzer {
    SemanticAnalyzer::new(
        AnalyzerConfig::default(),
        ThinkingClient::new(Arc::new(UnavailableThinkingService)),
    )
}

const COMPLEX_PROMPT: &str =
    "Implement JWT authentication and then deploy the API gateway with docker";

const SAMPLE_PROMPTS: &[&str] = &[
    "",
    "Fix a typo in README",
    "Drop the production database",
    COMPLEX_PROMPT,
    "First build a React component with hooks, then add an Express middleware, \
     also write a Python script and finally deploy the distributed microservices \
     architecture to kubernetes after that delete all nested recursive caches",
    "maybe something could possibly be whatever etc",
];

#[tokio::test]
async fn test_missing_and_empty_prompts_have_unknown_intent() {
    let analyzer = offline_analyzer();

    for prompt in [None, Some("")] {
        let analysis = analyzer.analyze(prompt, &AnalysisContext::default()).await;
        assert_eq!(analysis.intent.primary, IntentCategory::Unknown);
        assert_eq!(analysis.intent.confidence, 0.0);
        assert_eq!(analysis.complexity, 0);
        assert_eq!(analysis.risk_level, RiskLevel::Low);
    }
}

#[test]
fn test_scores_stay_in_range() {
    let many_files = AnalysisContext::with_files(["a", "b", "c", "d", "e", "f", "g"]);
    for prompt in SAMPLE_PROMPTS {
        let analysis = analyze_rules(prompt, &many_files);
        assert!(analysis.complexity <= 100, "complexity out of range for {:?}", prompt);
        assert!(analysis.risk_score <= 100, "risk out of range for {:?}", prompt);
        assert!((0.0..=1.0).contains(&analysis.intent.confidence));
    }
}

#[test]
fn test_destructive_keywords_never_lower_risk() {
    for prompt in SAMPLE_PROMPTS {
        let base = analyze_rules(prompt, &AnalysisContext::default()).risk_score;
        let suffixes = [
            " and drop it",
            " then truncate the table",
            " delete all rows in the database",
        ];
        for suffix in suffixes {
            let extended = format!("{}{}", prompt, suffix);
            let risk = analyze_rules(&extended, &AnalysisContext::default()).risk_score;
            assert!(
                risk >= base,
                "risk dropped from {} to {} for {:?}",
                base,
                risk,
                extended
            );
        }
    }
}

#[test]
fn test_drop_production_database_is_high_risk() {
    let analysis = analyze_rules("Drop the production database", &AnalysisContext::default());

    assert_eq!(analysis.risk_score, 75);
    assert_eq!(analysis.risk_level, RiskLevel::High);
    for factor in ["drop_operation", "production_environment", "destructive_database_op"] {
        assert!(analysis.has_risk_factor(factor), "missing {}", factor);
    }
}

#[test]
fn test_simple_fix_is_low_risk_modification() {
    let analysis = analyze_rules("Fix a typo in README", &AnalysisContext::default());

    assert_eq!(analysis.intent.primary, IntentCategory::Modification);
    assert_eq!(analysis.intent.confidence, 0.5);
    assert_eq!(analysis.risk_score, 0);
    assert_eq!(analysis.recommended_thinking_mode, ThinkingMode::None);
    assert!(analysis.recommended_intervention.is_none());
}

#[test]
fn test_files_beyond_three_add_complexity() {
    let prompt = "Fix a typo in README";
    let without = score_complexity(prompt, &AnalysisContext::default());
    let with_files = score_complexity(
        prompt,
        &AnalysisContext::with_files(["a.rs", "b.rs", "c.rs", "d.rs", "e.rs", "f.rs"]),
    );
    assert_eq!(with_files, without + 9);
}

#[test]
fn test_frameworks_and_patterns() {
    let analysis = analyze_rules(
        "Build a React component with an Express service backed by MongoDB",
        &AnalysisContext::default(),
    );

    let frameworks: Vec<&str> = analysis.frameworks.iter().map(String::as_str).collect();
    assert_eq!(frameworks, vec!["express", "mongodb", "react"]);
    assert!(analysis.has_risk_factor("multiple_frameworks"));
    assert!(analysis.patterns.contains("component-based"));
    assert!(analysis.patterns.contains("service-layer"));
}

#[test]
fn test_entities_include_paths_and_urls() {
    let analysis = analyze_rules(
        "Update /src/app.ts following https://example.com/docs",
        &AnalysisContext::default(),
    );

    let values: Vec<&str> = analysis.entities.iter().map(|e| e.value.as_str()).collect();
    assert!(values.contains(&"/src/app.ts"));
    assert!(values.contains(&"https://example.com/docs"));
    assert!(values.contains(&"Update"));
}

#[test]
fn test_cache_key_depends_on_context() {
    let prompt = "Refactor the parser";
    let plain = cache_key(prompt, &AnalysisContext::default());
    assert_eq!(plain, cache_key(prompt, &AnalysisContext::default()));
    assert_ne!(plain, cache_key(prompt, &AnalysisContext::with_files(["src/parser.rs"])));
    assert_eq!(plain.len(), 64);
}

#[tokio::test]
async fn test_repeated_analysis_hits_cache() {
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
    assert_eq!(metrics.intent_distribution.get(&IntentCategory::Modification), Some(&1));

    analyzer.clear_cache().await;
    let third = analyzer.analyze(Some("Fix a typo in README"), &context).await;
    assert!(!Arc::ptr_eq(&first, &third));
}

#[tokio::test]
async fn test_deep_analysis_refines_mode() {
    let analyzer = SemanticAnalyzer::new(
        AnalyzerConfig::default(),
        ThinkingClient::new(Arc::new(FixedService {
            reply: Some("A sequential plan with checkpoints is needed."),
        })),
    );

    let analysis = analyzer
        .analyze(Some(COMPLEX_PROMPT), &AnalysisContext::default())
        .await;

    let deep = analysis.deep_analysis.as_ref().expect("deep analysis should run");
    assert_eq!(deep.recommended_mode, ThinkingMode::Comprehensive);
    assert_eq!(analysis.recommended_thinking_mode, ThinkingMode::Comprehensive);
    assert!(analysis.deep_analysis_error.is_none());
}

#[tokio::test]
async fn test_deep_analysis_failure_keeps_rule_result() {
    let analyzer = SemanticAnalyzer::new(
        AnalyzerConfig::default(),
        ThinkingClient::new(Arc::new(FixedService { reply: None })),
    );

    let analysis = analyzer
        .analyze(Some(COMPLEX_PROMPT), &AnalysisContext::default())
        .await;
    let rules = analyze_rules(COMPLEX_PROMPT, &AnalysisContext::default());

    assert!(analysis.deep_analysis.is_none());
    assert!(analysis.deep_analysis_error.is_some());
    assert_eq!(analysis.complexity, rules.complexity);
    assert_eq!(analysis.recommended_thinking_mode, rules.recommended_thinking_mode);
}

#[tokio::test]
async fn test_simple_prompt_skips_backend() {
    let analyzer = SemanticAnalyzer::new(
        AnalyzerConfig::default(),
        ThinkingClient::new(Arc::new(FixedService { reply: None })),
    );

    let analysis = analyzer
        .analyze(Some("Fix a typo in README"), &AnalysisContext::default())
        .await;
    assert!(analysis.deep_analysis.is_none());
    assert!(analysis.deep_analysis_error.is_none());
}
