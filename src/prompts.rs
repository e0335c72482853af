//! Centralized prompt definitions for the thinking roles
//!
//! System prompts are installed on the Langbase pipes at startup; the
//! builder functions render the per-call user prompts the engine sends.

/// System prompt for the structural role (decomposition and approach analysis).
pub const STRUCTURAL_THINKING_PROMPT: &str = r#"You are a structural analysis assistant for software tasks.
Break the task into its logical components, explain how they relate, and name the
approach you would take. Be concrete and concise.

Guidelines:
- Identify 2-5 sub-tasks and their dependencies
- State assumptions explicitly
- Flag risky operations (data loss, security, production impact)
- When asked which thinking style fits best, answer with one of: sequential, structural, debug"#;

/// System prompt for the sequential role (ordered implementation steps).
pub const SEQUENTIAL_THINKING_PROMPT: &str = r#"You are a step-by-step planning assistant for software tasks.
Turn the given analysis or task into an ordered implementation plan.

Format every step on its own line as:
Step 1. <action>
Step 2. <action>

Guidelines:
- Keep each step small and verifiable
- Put validation and testing steps where they belong, not only at the end
- Do not restate the task"#;

/// System prompt for the debug role (root-cause analysis).
pub const DEBUG_THINKING_PROMPT: &str = r#"You are a debugging assistant.
Given a problem description, create a hypothesis list ordered by likelihood, the
evidence that would confirm or reject each one, and the smallest fix for the most
likely cause."#;

/// Render the deep-analysis request for a prompt that already has a rule-based analysis.
pub fn deep_analysis_prompt(task: &str, intent: &str, complexity: u32, risk_level: &str) -> String {
    format!(
        "Analyze this task semantically:\n\n\
         Task: {task}\n\n\
         Basic Analysis:\n\
         - Intent: {intent}\n\
         - Complexity: {complexity}\n\
         - Risk: {risk_level}\n\n\
         Provide:\n\
         1. Task decomposition (2-5 sub-tasks)\n\
         2. Recommended approach\n\
         3. Potential pitfalls\n\
         4. Best thinking style to use (sequential/structural/debug)"
    )
}

/// Render the root-cause request for a task whose earlier attempts failed.
pub fn failure_diagnosis_prompt(task: &str, errors: &[&str]) -> String {
    let errors = if errors.is_empty() {
        "- (no error recorded)".to_string()
    } else {
        errors
            .iter()
            .map(|e| format!("- {}", e))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Earlier attempts at this task failed.\n\n\
         Task: {task}\n\n\
         Errors:\n{errors}\n\n\
         Identify the most likely root cause before a different approach is tried."
    )
}

/// Inputs for a strategy-specific branch prompt.
pub struct BranchPromptInput<'a> {
    pub prefix: &'a str,
    pub task: &'a str,
    pub complexity: u32,
    pub risk_level: &'a str,
    pub frameworks: &'a [String],
    pub intent: &'a str,
    pub risk_tolerance: f64,
    pub complexity_limit: u32,
}

/// Render the per-strategy branch prompt.
pub fn branch_prompt(input: &BranchPromptInput<'_>) -> String {
    let frameworks = if input.frameworks.is_empty() {
        "None".to_string()
    } else {
        input.frameworks.join(", ")
    };

    format!(
        "{prefix}\n\n\
         Original Task: {task}\n\n\
         Context:\n\
         - Complexity: {complexity}/100\n\
         - Risk Level: {risk}\n\
         - Detected Frameworks: {frameworks}\n\
         - Intent: {intent}\n\n\
         Constraints for this approach:\n\
         - Risk Tolerance: {tolerance}%\n\
         - Maximum Complexity: {limit}\n\n\
         Provide:\n\
         1. Structural analysis of the approach\n\
         2. Key considerations\n\
         3. Expected outcomes\n\
         4. Potential issues",
        prefix = input.prefix,
        task = input.task,
        complexity = input.complexity,
        risk = input.risk_level,
        frameworks = frameworks,
        intent = input.intent,
        tolerance = (input.risk_tolerance * 100.0).round() as u32,
        limit = input.complexity_limit,
    )
}

/// Render the follow-up request that turns a structural analysis into steps.
pub fn steps_prompt(structure: &str) -> String {
    format!(
        "Based on this analysis:\n{}\n\nProvide step-by-step implementation steps.",
        structure
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_prompt_lists_frameworks_or_none() {
        let frameworks = vec!["react".to_string(), "typescript".to_string()];
        let mut input = BranchPromptInput {
            prefix: "Take a conservative, safe approach:",
            task: "Add a login form",
            complexity: 42,
            risk_level: "MEDIUM",
            frameworks: &frameworks,
            intent: "implementation",
            risk_tolerance: 0.2,
            complexity_limit: 30,
        };

        let rendered = branch_prompt(&input);
        assert!(rendered.starts_with("Take a conservative, safe approach:"));
        assert!(rendered.contains("Detected Frameworks: react, typescript"));
        assert!(rendered.contains("Risk Tolerance: 20%"));
        assert!(rendered.contains("Complexity: 42/100"));

        input.frameworks = &[];
        assert!(branch_prompt(&input).contains("Detected Frameworks: None"));
    }

    #[test]
    fn test_failure_diagnosis_prompt_lists_errors() {
        let rendered = failure_diagnosis_prompt("Migrate users", &["tests failed", "timeout"]);
        assert!(rendered.contains("Task: Migrate users"));
        assert!(rendered.contains("- tests failed\n- timeout"));
        assert!(failure_diagnosis_prompt("x", &[]).contains("(no error recorded)"));
    }

    #[test]
    fn test_deep_analysis_prompt_contains_basics() {
        let rendered = deep_analysis_prompt("Refactor auth", "modification", 55, "HIGH");
        assert!(rendered.contains("Task: Refactor auth"));
        assert!(rendered.contains("- Risk: HIGH"));
    }
}
