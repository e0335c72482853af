//! Intervention action descriptors and the plans produced by non-branching actions.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::brancher::StrategyKey;
use super::types::{AnalysisResult, InterventionType};

/// Static description of what an intervention does.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub requires_alternatives: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_branches: Option<usize>,
    /// Restricts which strategies a branching action may use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategies: Option<&'static [StrategyKey]>,
}

static MULTI_PATH: ActionDescriptor = ActionDescriptor {
    name: "Multi-Path Reasoning",
    description: "Explore multiple solution paths in parallel",
    requires_alternatives: true,
    max_branches: Some(3),
    strategies: None,
};

static CLARIFICATION: ActionDescriptor = ActionDescriptor {
    name: "Request Clarification",
    description: "Ask user for clarification on ambiguous aspects",
    requires_alternatives: false,
    max_branches: None,
    strategies: None,
};

static DECOMPOSITION: ActionDescriptor = ActionDescriptor {
    name: "Task Decomposition",
    description: "Break down complex task into smaller sub-tasks",
    requires_alternatives: false,
    max_branches: None,
    strategies: None,
};

static VALIDATION: ActionDescriptor = ActionDescriptor {
    name: "Enhanced Validation",
    description: "Apply stricter validation rules",
    requires_alternatives: false,
    max_branches: None,
    strategies: None,
};

static ALTERNATIVE: ActionDescriptor = ActionDescriptor {
    name: "Alternative Approach",
    description: "Try completely different approach",
    requires_alternatives: true,
    max_branches: Some(2),
    strategies: Some(ALTERNATIVE_ONLY),
};

const ALTERNATIVE_ONLY: &[StrategyKey] = &[StrategyKey::Alternative];

/// Descriptor for an intervention type.
pub fn descriptor(intervention: InterventionType) -> &'static ActionDescriptor {
    match intervention {
        InterventionType::MultiPath => &MULTI_PATH,
        InterventionType::Clarification => &CLARIFICATION,
        InterventionType::Decomposition => &DECOMPOSITION,
        InterventionType::Validation => &VALIDATION,
        InterventionType::Alternative => &ALTERNATIVE,
    }
}

// ============================================================================
// Plans
// ============================================================================

/// Question put back to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClarificationQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubTaskPriority {
    High,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubTask {
    pub id: String,
    pub description: String,
    pub priority: SubTaskPriority,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationRule {
    pub id: String,
    pub description: String,
    pub mandatory: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkpoint {
    pub stage: String,
    pub checks: Vec<String>,
}

/// Concrete output of a non-branching intervention.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ActionPlan {
    Clarification {
        questions: Vec<ClarificationQuestion>,
    },
    Decomposition {
        sub_tasks: Vec<SubTask>,
        estimated_complexity: f64,
    },
    Validation {
        rules: Vec<ValidationRule>,
        checkpoints: Vec<Checkpoint>,
    },
}

#[allow(clippy::expect_used)]
static TASK_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(?:and|then|also|additionally)\s+").expect("valid regex")
});

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Questions covering whichever of intent, framework focus and scope are unclear.
pub fn clarification_questions(analysis: &AnalysisResult) -> Vec<ClarificationQuestion> {
    let mut questions = Vec::new();

    if analysis.intent.confidence < 0.4 {
        questions.push(ClarificationQuestion {
            id: "intent".to_string(),
            question: "What is your primary goal with this request?".to_string(),
            options: strings(&[
                "Create something new",
                "Modify existing code",
                "Analyze current state",
                "Research options",
            ]),
        });
    }

    if analysis.frameworks.len() > 2 {
        questions.push(ClarificationQuestion {
            id: "framework".to_string(),
            question: "Which framework is the primary focus?".to_string(),
            options: analysis.frameworks.iter().cloned().collect(),
        });
    }

    if analysis.has_risk_factor("ambiguity") {
        questions.push(ClarificationQuestion {
            id: "scope".to_string(),
            question: "Can you provide more specific requirements?".to_string(),
            options: strings(&[
                "Add specific examples",
                "Define constraints",
                "Specify priorities",
            ]),
        });
    }

    questions
}

/// Split a prompt on connectives into chained sub-tasks, or fall back to four generic phases.
pub fn decompose_task(prompt: &str) -> Vec<SubTask> {
    let mut sub_tasks = Vec::new();

    for (i, part) in TASK_SEPARATOR.split(prompt).enumerate() {
        let part = part.trim();
        if part.chars().count() <= 10 {
            continue;
        }
        sub_tasks.push(SubTask {
            id: format!("subtask-{}", i + 1),
            description: part.to_string(),
            priority: if i == 0 {
                SubTaskPriority::High
            } else {
                SubTaskPriority::Normal
            },
            dependencies: if i > 0 {
                vec![format!("subtask-{}", i)]
            } else {
                Vec::new()
            },
        });
    }

    if sub_tasks.is_empty() {
        let phases = [
            ("Analyze requirements", SubTaskPriority::High),
            ("Design solution", SubTaskPriority::High),
            ("Implement solution", SubTaskPriority::High),
            ("Validate results", SubTaskPriority::Normal),
        ];
        for (i, (description, priority)) in phases.into_iter().enumerate() {
            sub_tasks.push(SubTask {
                id: format!("phase-{}", i + 1),
                description: description.to_string(),
                priority,
                dependencies: if i > 0 {
                    vec![format!("phase-{}", i)]
                } else {
                    Vec::new()
                },
            });
        }
    }

    sub_tasks
}

pub fn validation_rules(analysis: &AnalysisResult) -> Vec<ValidationRule> {
    let mut rules: Vec<ValidationRule> = [
        ("security", "Check for security vulnerabilities"),
        ("syntax", "Validate syntax correctness"),
        ("integration", "Verify integration points"),
    ]
    .into_iter()
    .map(|(id, description)| ValidationRule {
        id: id.to_string(),
        description: description.to_string(),
        mandatory: true,
    })
    .collect();

    if analysis.frameworks.contains("react") {
        rules.push(ValidationRule {
            id: "react-hooks".to_string(),
            description: "Validate React hooks usage".to_string(),
            mandatory: true,
        });
    }
    if analysis.frameworks.contains("typescript") {
        rules.push(ValidationRule {
            id: "types".to_string(),
            description: "Check type safety".to_string(),
            mandatory: true,
        });
    }

    rules
}

pub fn validation_checkpoints() -> Vec<Checkpoint> {
    vec![
        Checkpoint {
            stage: "pre".to_string(),
            checks: strings(&["input-validation", "context-verification"]),
        },
        Checkpoint {
            stage: "during".to_string(),
            checks: strings(&["progress-validation", "intermediate-results"]),
        },
        Checkpoint {
            stage: "post".to_string(),
            checks: strings(&["output-validation", "integration-test", "quality-review"]),
        },
    ]
}

/// Plan for a non-branching intervention; `None` for branching ones.
pub fn build_plan(
    intervention: InterventionType,
    prompt: &str,
    analysis: &AnalysisResult,
) -> Option<ActionPlan> {
    match intervention {
        InterventionType::Clarification => Some(ActionPlan::Clarification {
            questions: clarification_questions(analysis),
        }),
        InterventionType::Decomposition => {
            let sub_tasks = decompose_task(prompt);
            let estimated_complexity = f64::from(analysis.complexity) / sub_tasks.len() as f64;
            Some(ActionPlan::Decomposition {
                sub_tasks,
                estimated_complexity,
            })
        }
        InterventionType::Validation => Some(ActionPlan::Validation {
            rules: validation_rules(analysis),
            checkpoints: validation_checkpoints(),
        }),
        InterventionType::MultiPath | InterventionType::Alternative => None,
    }
}
