//! Core data types shared by the intervention components.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Intent
// ============================================================================

/// Primary intent of a prompt. Declaration order is the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentCategory {
    Implementation,
    Modification,
    Analysis,
    Research,
    Unknown,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::Implementation => "implementation",
            IntentCategory::Modification => "modification",
            IntentCategory::Analysis => "analysis",
            IntentCategory::Research => "research",
            IntentCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IntentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "implementation" => Ok(IntentCategory::Implementation),
            "modification" => Ok(IntentCategory::Modification),
            "analysis" => Ok(IntentCategory::Analysis),
            "research" => Ok(IntentCategory::Research),
            "unknown" => Ok(IntentCategory::Unknown),
            _ => Err(format!("Unknown intent: {}", s)),
        }
    }
}

/// Intent classification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub primary: IntentCategory,
    /// In [0, 1]; zero when nothing matched.
    pub confidence: f64,
    pub all_scores: BTreeMap<IntentCategory, u32>,
}

impl IntentResult {
    /// Classification for prompts with no recognisable intent.
    pub fn unknown() -> Self {
        Self {
            primary: IntentCategory::Unknown,
            confidence: 0.0,
            all_scores: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Risk
// ============================================================================

/// Risk band derived from the 0-100 risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl RiskLevel {
    /// <26 LOW, 26-50 MEDIUM, 51-75 HIGH, >=76 EXTREME.
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 76 => RiskLevel::Extreme,
            s if s >= 51 => RiskLevel::High,
            s if s >= 26 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Extreme => "EXTREME",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One contribution to the risk score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub points: u32,
}

impl RiskFactor {
    pub fn new(factor: impl Into<String>, points: u32) -> Self {
        Self {
            factor: factor.into(),
            points,
        }
    }
}

// ============================================================================
// Entities & Modes
// ============================================================================

/// Kind of an extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    FilePath,
    Identifier,
    Url,
}

/// Entity mentioned in a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub value: String,
}

/// Depth of reasoning recommended for a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingMode {
    None,
    Lightweight,
    Standard,
    Comprehensive,
}

impl ThinkingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingMode::None => "none",
            ThinkingMode::Lightweight => "lightweight",
            ThinkingMode::Standard => "standard",
            ThinkingMode::Comprehensive => "comprehensive",
        }
    }
}

// ============================================================================
// Intervention Types
// ============================================================================

/// Kind of intervention the trigger can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterventionType {
    MultiPath,
    Clarification,
    Decomposition,
    Validation,
    Alternative,
}

impl InterventionType {
    pub const ALL: [InterventionType; 5] = [
        InterventionType::MultiPath,
        InterventionType::Clarification,
        InterventionType::Decomposition,
        InterventionType::Validation,
        InterventionType::Alternative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterventionType::MultiPath => "multi-path",
            InterventionType::Clarification => "clarification",
            InterventionType::Decomposition => "decomposition",
            InterventionType::Validation => "validation",
            InterventionType::Alternative => "alternative",
        }
    }
}

impl fmt::Display for InterventionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InterventionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InterventionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown intervention type: {}", s))
    }
}

/// Analyzer-level hint about which intervention would help.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionHint {
    #[serde(rename = "type")]
    pub intervention_type: InterventionType,
    pub reason: String,
}

// ============================================================================
// Analysis
// ============================================================================

/// Caller-supplied context accompanying a prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    /// Files the task touches
    #[serde(default)]
    pub files: Vec<String>,
    /// Any other caller metadata; participates in the cache key
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, Value>,
}

impl AnalysisContext {
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Backend-assisted refinement of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepAnalysis {
    pub raw: String,
    pub recommended_mode: ThinkingMode,
}

/// Complete semantic analysis of one prompt. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub prompt: String,
    pub timestamp: DateTime<Utc>,
    pub intent: IntentResult,
    /// In [0, 100]
    pub complexity: u32,
    /// In [0, 100]
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<RiskFactor>,
    pub frameworks: BTreeSet<String>,
    pub patterns: BTreeSet<String>,
    pub entities: Vec<Entity>,
    pub action_verbs: BTreeSet<String>,
    pub technical_terms: BTreeSet<String>,
    pub recommended_thinking_mode: ThinkingMode,
    pub recommended_intervention: Option<InterventionHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_analysis: Option<DeepAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_analysis_error: Option<String>,
}

impl AnalysisResult {
    /// Whether a risk factor with this name contributed to the score.
    pub fn has_risk_factor(&self, factor: &str) -> bool {
        self.risk_factors.iter().any(|f| f.factor == factor)
    }
}

// ============================================================================
// Previous Attempts
// ============================================================================

/// Record of an earlier attempt at the same task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviousAttempt {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
