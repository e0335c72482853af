//! Rule-table driven intervention trigger.
//!
//! Every condition is evaluated on each check; the matches are ordered by
//! priority (stable, so equal priorities keep table order) and the first one
//! decides the intervention.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::actions::{descriptor, ActionDescriptor};
use super::analyzer::ratio;
use super::config::TriggerConfig;
use super::types::{AnalysisResult, InterventionType, PreviousAttempt, RiskLevel};

/// Inputs a trigger condition can look at.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub analysis: Arc<AnalysisResult>,
    pub prompt: String,
    pub estimated_files: Option<u32>,
    /// Estimated effort in minutes
    pub estimated_time: Option<u32>,
    pub previous_attempts: Vec<PreviousAttempt>,
}

impl TriggerContext {
    pub fn new(analysis: Arc<AnalysisResult>) -> Self {
        Self {
            prompt: analysis.prompt.clone(),
            analysis,
            estimated_files: None,
            estimated_time: None,
            previous_attempts: Vec::new(),
        }
    }
}

/// Predicate over a trigger context. Errors count as "no match".
pub type ConditionCheck = Arc<dyn Fn(&TriggerContext) -> Result<bool, String> + Send + Sync>;

/// Named rule in the trigger table.
#[derive(Clone)]
pub struct TriggerCondition {
    pub name: String,
    /// 1 is the most urgent
    pub priority: u8,
    pub intervention: InterventionType,
    pub reason: String,
    check: ConditionCheck,
}

impl TriggerCondition {
    pub fn new<F>(
        name: impl Into<String>,
        priority: u8,
        intervention: InterventionType,
        reason: impl Into<String>,
        check: F,
    ) -> Self
    where
        F: Fn(&TriggerContext) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            intervention,
            reason: reason.into(),
            check: Arc::new(check),
        }
    }

    fn matches(&self, ctx: &TriggerContext) -> bool {
        match (self.check)(ctx) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(condition = %self.name, error = %e, "Trigger condition failed, skipping");
                false
            }
        }
    }
}

impl fmt::Debug for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerCondition")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("intervention", &self.intervention)
            .finish()
    }
}

/// Built-in condition table, in evaluation order.
pub fn builtin_conditions(config: &TriggerConfig) -> Vec<TriggerCondition> {
    let complexity_threshold = config.complexity_threshold;
    let risk_threshold = config.risk_threshold;

    vec![
        TriggerCondition::new(
            "highComplexity",
            1,
            InterventionType::MultiPath,
            "High complexity task benefits from multiple approaches",
            move |ctx| Ok(ctx.analysis.complexity > complexity_threshold),
        ),
        TriggerCondition::new(
            "highRisk",
            1,
            InterventionType::MultiPath,
            "High risk requires careful consideration of alternatives",
            move |ctx| {
                Ok(matches!(ctx.analysis.risk_level, RiskLevel::High | RiskLevel::Extreme)
                    || ctx.analysis.risk_score > risk_threshold)
            },
        ),
        TriggerCondition::new(
            "lowIntentConfidence",
            2,
            InterventionType::Clarification,
            "Unclear intent needs clarification",
            |ctx| Ok(ctx.analysis.intent.confidence < 0.4),
        ),
        TriggerCondition::new(
            "multiFramework",
            3,
            InterventionType::Decomposition,
            "Multiple frameworks suggest decomposition needed",
            |ctx| Ok(ctx.analysis.frameworks.len() > 2),
        ),
        TriggerCondition::new(
            "securitySensitive",
            1,
            InterventionType::Validation,
            "Security-sensitive operations require extra validation",
            |ctx| Ok(ctx.analysis.has_risk_factor("security_sensitive")),
        ),
        TriggerCondition::new(
            "previousFailure",
            2,
            InterventionType::Alternative,
            "Previous failure suggests trying alternative approach",
            |ctx| Ok(ctx.previous_attempts.iter().any(|a| !a.success)),
        ),
        TriggerCondition::new(
            "ambiguousRequest",
            2,
            InterventionType::Clarification,
            "Ambiguous requests need clarification",
            |ctx| Ok(ctx.analysis.has_risk_factor("ambiguity")),
        ),
        TriggerCondition::new(
            "largeScope",
            3,
            InterventionType::Decomposition,
            "Large scope benefits from decomposition",
            |ctx| {
                Ok(ctx.estimated_files.unwrap_or(0) > 5 || ctx.estimated_time.unwrap_or(0) > 30)
            },
        ),
    ]
}

/// One matching condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionMatch {
    pub condition: String,
    pub intervention: InterventionType,
    pub reason: String,
    pub priority: u8,
}

/// The intervention chosen for a context.
#[derive(Debug, Clone, Serialize)]
pub struct InterventionDecision {
    #[serde(rename = "type")]
    pub intervention_type: InterventionType,
    pub condition: String,
    pub reason: String,
    pub priority: u8,
    pub requires_alternatives: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_branches: Option<usize>,
    pub action: ActionDescriptor,
    /// Every match, most urgent first
    pub all_matches: Vec<ConditionMatch>,
}

#[derive(Debug, Default)]
struct TriggerMetrics {
    checked: u64,
    fired: u64,
    by_type: BTreeMap<InterventionType, u64>,
    by_condition: BTreeMap<String, u64>,
}

struct TriggerState {
    enabled: bool,
    conditions: Vec<TriggerCondition>,
    metrics: TriggerMetrics,
}

/// Trigger counters and table summary.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerStats {
    pub enabled: bool,
    pub triggers_checked: u64,
    pub triggers_fired: u64,
    pub fire_rate: f64,
    pub by_type: BTreeMap<InterventionType, u64>,
    pub by_condition: BTreeMap<String, u64>,
    pub available_conditions: Vec<String>,
    pub available_actions: Vec<InterventionType>,
}

pub struct InterventionTrigger {
    state: RwLock<TriggerState>,
}

impl InterventionTrigger {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            state: RwLock::new(TriggerState {
                enabled: config.enabled,
                conditions: builtin_conditions(&config),
                metrics: TriggerMetrics::default(),
            }),
        }
    }

    /// Decide whether to intervene. `None` when disabled or nothing matches.
    pub async fn check(&self, ctx: &TriggerContext) -> Option<InterventionDecision> {
        let mut state = self.state.write().await;
        if !state.enabled {
            return None;
        }
        state.metrics.checked += 1;

        let mut matches: Vec<ConditionMatch> = state
            .conditions
            .iter()
            .filter(|c| c.matches(ctx))
            .map(|c| ConditionMatch {
                condition: c.name.clone(),
                intervention: c.intervention,
                reason: c.reason.clone(),
                priority: c.priority,
            })
            .collect();

        if matches.is_empty() {
            debug!("No intervention conditions matched");
            return None;
        }

        matches.sort_by_key(|m| m.priority);
        let top = matches[0].clone();
        let action = descriptor(top.intervention).clone();

        state.metrics.fired += 1;
        *state.metrics.by_type.entry(top.intervention).or_insert(0) += 1;
        *state
            .metrics
            .by_condition
            .entry(top.condition.clone())
            .or_insert(0) += 1;

        debug!(
            condition = %top.condition,
            intervention = %top.intervention,
            matches = matches.len(),
            "Intervention triggered"
        );

        Some(InterventionDecision {
            intervention_type: top.intervention,
            condition: top.condition,
            reason: top.reason,
            priority: top.priority,
            requires_alternatives: action.requires_alternatives,
            max_branches: action.max_branches,
            action,
            all_matches: matches,
        })
    }

    /// Add a condition; an existing condition with the same name is replaced in place.
    pub async fn add_condition(&self, condition: TriggerCondition) {
        let mut state = self.state.write().await;
        match state.conditions.iter_mut().find(|c| c.name == condition.name) {
            Some(existing) => *existing = condition,
            None => state.conditions.push(condition),
        }
    }

    /// Remove a condition by name. Returns whether it existed.
    pub async fn remove_condition(&self, name: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.conditions.len();
        state.conditions.retain(|c| c.name != name);
        if state.conditions.len() == before {
            warn!(condition = %name, "Unknown trigger condition, nothing removed");
            false
        } else {
            true
        }
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.state.write().await.enabled = enabled;
    }

    pub async fn stats(&self) -> TriggerStats {
        let state = self.state.read().await;
        TriggerStats {
            enabled: state.enabled,
            triggers_checked: state.metrics.checked,
            triggers_fired: state.metrics.fired,
            fire_rate: ratio(state.metrics.fired, state.metrics.checked),
            by_type: state.metrics.by_type.clone(),
            by_condition: state.metrics.by_condition.clone(),
            available_conditions: state.conditions.iter().map(|c| c.name.clone()).collect(),
            available_actions: InterventionType::ALL.to_vec(),
        }
    }

    pub async fn reset_metrics(&self) {
        self.state.write().await.metrics = TriggerMetrics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intervention::analyzer::analyze_rules;
    use crate::intervention::types::AnalysisContext;

    fn context_for(prompt: &str) -> TriggerContext {
        TriggerContext::new(Arc::new(analyze_rules(prompt, &AnalysisContext::default())))
    }

    #[tokio::test]
    async fn test_no_match_returns_none() {
        let trigger = InterventionTrigger::new(TriggerConfig::default());
        assert!(trigger.check(&context_for("Fix a typo in README")).await.is_none());

        let stats = trigger.stats().await;
        assert_eq!(stats.triggers_checked, 1);
        assert_eq!(stats.triggers_fired, 0);
    }

    #[tokio::test]
    async fn test_high_risk_fires_multi_path() {
        let trigger = InterventionTrigger::new(TriggerConfig::default());
        let decision = trigger
            .check(&context_for("Drop the production database"))
            .await
            .unwrap();

        assert_eq!(decision.intervention_type, InterventionType::MultiPath);
        assert_eq!(decision.condition, "highRisk");
        assert!(decision.requires_alternatives);
        assert_eq!(decision.max_branches, Some(3));
    }

    #[tokio::test]
    async fn test_equal_priority_keeps_table_order() {
        // Ambiguity and low intent confidence are both priority 2; low confidence is listed first.
        let trigger = InterventionTrigger::new(TriggerConfig::default());
        let decision = trigger.check(&context_for("maybe something")).await.unwrap();

        assert_eq!(decision.condition, "lowIntentConfidence");
        let names: Vec<_> = decision.all_matches.iter().map(|m| m.condition.as_str()).collect();
        assert_eq!(names, vec!["lowIntentConfidence", "ambiguousRequest"]);
    }

    #[tokio::test]
    async fn test_priority_beats_table_order() {
        // "secret" is security sensitive (priority 1); missing intent is priority 2.
        let trigger = InterventionTrigger::new(TriggerConfig::default());
        let decision = trigger.check(&context_for("the secret")).await.unwrap();
        assert_eq!(decision.intervention_type, InterventionType::Validation);
        assert_eq!(decision.all_matches.len(), 2);
    }

    #[tokio::test]
    async fn test_previous_failure_and_large_scope() {
        let trigger = InterventionTrigger::new(TriggerConfig::default());
        let mut ctx = context_for("Refactor the billing module");
        ctx.previous_attempts = vec![PreviousAttempt {
            success: false,
            error: Some("tests failed".to_string()),
        }];
        ctx.estimated_files = Some(12);

        let decision = trigger.check(&ctx).await.unwrap();
        assert_eq!(decision.condition, "previousFailure");
        assert_eq!(decision.intervention_type, InterventionType::Alternative);
        assert_eq!(decision.max_branches, Some(2));
        assert!(decision.all_matches.iter().any(|m| m.condition == "largeScope"));
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
        assert_eq!(trigger.stats().await.triggers_checked, 0);
    }

    #[tokio::test]
    async fn test_failing_custom_condition_is_swallowed() {
        let trigger = InterventionTrigger::new(TriggerConfig::default());
        trigger
            .add_condition(TriggerCondition::new(
                "broken",
                1,
                InterventionType::Validation,
                "never",
                |_| Err("boom".to_string()),
            ))
            .await;

        assert!(trigger.check(&context_for("Fix a typo in README")).await.is_none());
    }

    #[tokio::test]
    async fn test_add_replaces_and_remove_conditions() {
        let trigger = InterventionTrigger::new(TriggerConfig::default());
        trigger
            .add_condition(TriggerCondition::new(
                "largeScope",
                1,
                InterventionType::Decomposition,
                "Always decompose",
                |_| Ok(true),
            ))
            .await;

        let stats = trigger.stats().await;
        assert_eq!(stats.available_conditions.len(), 8);
        assert_eq!(stats.available_conditions[7], "largeScope");

        let decision = trigger.check(&context_for("Fix a typo in README")).await.unwrap();
        assert_eq!(decision.reason, "Always decompose");

        assert!(trigger.remove_condition("largeScope").await);
        assert!(!trigger.remove_condition("largeScope").await);
        assert_eq!(trigger.stats().await.available_conditions.len(), 7);
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
        assert_eq!(trigger.stats().await.triggers_checked, 0);
    }
}
