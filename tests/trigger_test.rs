//! Intervention trigger integration tests

use std::sync::Arc;

use semantic_intervention::intervention::analyzer::analyze_rules;
use semantic_intervention::intervention::{
    AnalysisContext, InterventionTrigger, InterventionType, PreviousAttempt, TriggerCondition,
    TriggerConfig, TriggerContext,
};

fn context_for(prompt: &str) -> TriggerContext {
    TriggerContext::new(Arc::new(analyze_rules(prompt, &AnalysisContext::default())))
}

fn always(name: &str, priority: u8, intervention: InterventionType) -> TriggerCondition {
    TriggerCondition::new(name, priority, intervention, format!("{} fired", name), |_| {
        Ok(true)
    })
}

#[tokio::test]
async fn test_simple_prompt_does_not_trigger() {
    let trigger = InterventionTrigger::new(TriggerConfig::default());
    assert!(trigger.check(&context_for("Fix a typo in README")).await.is_none());

    let stats = trigger.stats().await;
    assert_eq!(stats.triggers_checked, 1);
    assert_eq!(stats.triggers_fired, 0);
    assert_eq!(stats.fire_rate, 0.0);
}

#[tokio::test]
async fn test_high_risk_prompt_triggers_multi_path() {
    let trigger = InterventionTrigger::new(TriggerConfig::default());
    let decision = trigger
        .check(&context_for("Drop the production database"))
        .await
        .expect("destructive prompt should trigger");

    assert_eq!(decision.intervention_type, InterventionType::MultiPath);
    assert_eq!(decision.condition, "highRisk");
    assert_eq!(decision.priority, 1);
    assert!(decision.requires_alternatives);
    assert_eq!(decision.max_branches, Some(3));

    let conditions: Vec<&str> = decision
        .all_matches
        .iter()
        .map(|m| m.condition.as_str())
        .collect();
    assert_eq!(conditions, vec!["highRisk", "lowIntentConfidence"]);
}

#[tokio::test]
async fn test_previous_failure_triggers_alternative() {
    let trigger = InterventionTrigger::new(TriggerConfig::default());
    let mut ctx = context_for("Fix a typo in README");
    ctx.previous_attempts = vec![
        PreviousAttempt {
            success: true,
            error: None,
        },
        PreviousAttempt {
            success: false,
            error: Some("tests failed".to_string()),
        },
    ];

    let decision = trigger.check(&ctx).await.unwrap();
    assert_eq!(decision.intervention_type, InterventionType::Alternative);
    assert_eq!(decision.condition, "previousFailure");
    assert_eq!(decision.max_branches, Some(2));
}

#[tokio::test]
async fn test_large_scope_triggers_decomposition() {
    let trigger = InterventionTrigger::new(TriggerConfig::default());

    let mut by_files = context_for("Fix a typo in README");
    by_files.estimated_files = Some(6);
    let decision = trigger.check(&by_files).await.unwrap();
    assert_eq!(decision.intervention_type, InterventionType::Decomposition);
    assert_eq!(decision.condition, "largeScope");
    assert!(!decision.requires_alternatives);

    let mut by_time = context_for("Fix a typo in README");
    by_time.estimated_time = Some(30);
    assert!(trigger.check(&by_time).await.is_none(), "30 minutes is not above the limit");
    by_time.estimated_time = Some(31);
    assert!(trigger.check(&by_time).await.is_some());
}

#[tokio::test]
async fn test_equal_priority_keeps_table_order() {
    let trigger = InterventionTrigger::new(TriggerConfig::default());
    trigger
        .add_condition(always("firstRule", 0, InterventionType::Validation))
        .await;
    trigger
        .add_condition(always("secondRule", 0, InterventionType::Decomposition))
        .await;

    let decision = trigger.check(&context_for("Fix a typo in README")).await.unwrap();
    assert_eq!(decision.condition, "firstRule");
    assert_eq!(decision.all_matches[1].condition, "secondRule");
}

#[tokio::test]
async fn test_failing_condition_counts_as_no_match() {
    let trigger = InterventionTrigger::new(TriggerConfig::default());
    trigger
        .add_condition(TriggerCondition::new(
            "brokenRule",
            0,
            InterventionType::Validation,
            "never decides",
            |_| Err("lookup failed".to_string()),
        ))
        .await;

    assert!(trigger.check(&context_for("Fix a typo in README")).await.is_none());
}

#[tokio::test]
async fn test_add_condition_replaces_by_name() {
    let trigger = InterventionTrigger::new(TriggerConfig::default());
    let before = trigger.stats().await.available_conditions.len();

    trigger
        .add_condition(always("largeScope", 3, InterventionType::Decomposition))
        .await;

    let stats = trigger.stats().await;
    assert_eq!(stats.available_conditions.len(), before);
    let decision = trigger.check(&context_for("Fix a typo in README")).await.unwrap();
    assert_eq!(decision.condition, "largeScope");
}

#[tokio::test]
async fn test_remove_condition() {
    let trigger = InterventionTrigger::new(TriggerConfig::default());

    assert!(trigger.remove_condition("highRisk").await);
    assert!(!trigger.remove_condition("highRisk").await);

    let decision = trigger
        .check(&context_for("Drop the production database"))
        .await
        .unwrap();
    assert_eq!(decision.condition, "lowIntentConfidence");
    assert_eq!(decision.intervention_type, InterventionType::Clarification);
}

#[tokio::test]
async fn test_disabled_trigger_never_fires() {
    let trigger = InterventionTrigger::new(TriggerConfig {
        enabled: false,
        ..Default::default()
    });
    assert!(trigger
        .check(&context_for("Drop the production database"))
        .await
        .is_none());

    trigger.set_enabled(true).await;
    assert!(trigger
        .check(&context_for("Drop the production database"))
        .await
        .is_some());
    assert_eq!(trigger.stats().await.triggers_checked, 1);
}

#[tokio::test]
async fn test_stats_and_reset() {
    let trigger = InterventionTrigger::new(TriggerConfig::default());
    trigger.check(&context_for("Drop the production database")).await;
    trigger.check(&context_for("Fix a typo in README")).await;

    let stats = trigger.stats().await;
    assert_eq!(stats.triggers_checked, 2);
    assert_eq!(stats.triggers_fired, 1);
    assert_eq!(stats.fire_rate, 0.5);
    assert_eq!(stats.by_type.get(&InterventionType::MultiPath), Some(&1));
    assert_eq!(stats.by_condition.get("highRisk"), Some(&1));
    assert_eq!(stats.available_actions.len(), 5);

    trigger.reset_metrics().await;
    let stats = trigger.stats().await;
    assert_eq!(stats.triggers_checked, 0);
    assert!(stats.by_condition.is_empty());
    assert_eq!(stats.available_conditions.len(), 8);
}
