//! Detection of refused, ambiguous, blocked or partial responses.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::analyzer::ratio;
use super::config::RefusalConfig;

/// Detection log size that triggers compaction.
const LOG_LIMIT: usize = 1000;
/// Entries kept after compaction.
const LOG_KEEP: usize = 500;
const SNIPPET_CHARS: usize = 200;
const RECENT_DETECTIONS: usize = 10;

// ============================================================================
// Families
// ============================================================================

/// Refusal family. Declaration order is the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefusalType {
    Direct,
    Ambiguous,
    Blocked,
    Partial,
}

impl RefusalType {
    pub const ALL: [RefusalType; 4] = [
        RefusalType::Direct,
        RefusalType::Ambiguous,
        RefusalType::Blocked,
        RefusalType::Partial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RefusalType::Direct => "direct",
            RefusalType::Ambiguous => "ambiguous",
            RefusalType::Blocked => "blocked",
            RefusalType::Partial => "partial",
        }
    }
}

impl fmt::Display for RefusalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RefusalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(RefusalType::Direct),
            "ambiguous" => Ok(RefusalType::Ambiguous),
            "blocked" => Ok(RefusalType::Blocked),
            "partial" => Ok(RefusalType::Partial),
            _ => Err(format!("Unknown refusal type: {}", s)),
        }
    }
}

#[allow(clippy::expect_used)]
fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
}

static DIRECT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)i (?:cannot|can't|won't|will not|am unable to) (?:help|assist|do|perform|complete)",
        r"(?i)i (?:am not able|cannot|can't) (?:to )?(?:provide|generate|create|write)",
        r"(?i)(?:this|that) (?:is|would be) (?:not allowed|inappropriate|against)",
        r"(?i)i (?:must|have to|need to) (?:decline|refuse|reject)",
    ])
});

static AMBIGUOUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)i'm not sure (?:what|how|if)",
        r"(?i)i am not sure (?:what|how|if)",
        r"(?i)(?:could you|can you|please) (?:clarify|specify|explain)",
        r"(?i)it (?:depends|might|may|could) (?:on|be)",
        r"(?i)there are (?:multiple|several|many) (?:ways|approaches|options)",
        r"(?i)i need more (?:information|context|details)",
    ])
});

static BLOCKED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)(?:blocked|blocked by|prevented by)",
        r"(?i)(?:error|failure|failed) (?:occurred|happened)",
        r"(?i)(?:access|permission) (?:denied|restricted|prohibited)",
        r"(?i)(?:timeout|timed out|took too long)",
        r"(?i)(?:rate limit|quota exceeded|too many)",
    ])
});

static PARTIAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)(?:partially|partly|incomplete) (?:completed|done|finished)",
        r"(?i)i (?:could|can) only (?:do|handle|process)",
        r"(?i)some (?:parts|aspects|components) (?:were|are)",
        r"(?i)(?:limited|restricted) (?:results|output|response)",
        r"(?i)only partially",
    ])
});

fn family_patterns(family: RefusalType) -> &'static [Regex] {
    match family {
        RefusalType::Direct => &DIRECT_PATTERNS,
        RefusalType::Ambiguous => &AMBIGUOUS_PATTERNS,
        RefusalType::Blocked => &BLOCKED_PATTERNS,
        RefusalType::Partial => &PARTIAL_PATTERNS,
    }
}

/// Source of every pattern in a family.
pub fn patterns(family: RefusalType) -> Vec<&'static str> {
    family_patterns(family).iter().map(Regex::as_str).collect()
}

/// Suggested next approach after a refusal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlternativeApproach {
    pub name: &'static str,
    pub prompt: &'static str,
    pub description: &'static str,
}

const fn approach(
    name: &'static str,
    prompt: &'static str,
    description: &'static str,
) -> AlternativeApproach {
    AlternativeApproach {
        name,
        prompt,
        description,
    }
}

const DIRECT_ALTERNATIVES: &[AlternativeApproach] = &[
    approach(
        "decompose",
        "Break down the request into smaller, more specific sub-tasks",
        "Decompose complex request into manageable parts",
    ),
    approach(
        "rephrase",
        "Rephrase the request using different terminology",
        "Try alternative phrasing that may be clearer",
    ),
    approach(
        "context",
        "Provide additional context or constraints",
        "Add clarifying context to guide the response",
    ),
];

const AMBIGUOUS_ALTERNATIVES: &[AlternativeApproach] = &[
    approach(
        "clarify",
        "Ask clarifying questions to narrow scope",
        "Request clarification on ambiguous aspects",
    ),
    approach(
        "assume",
        "Make reasonable assumptions and state them clearly",
        "Proceed with documented assumptions",
    ),
    approach(
        "enumerate",
        "List multiple possible interpretations",
        "Explore multiple interpretations of the request",
    ),
];

const BLOCKED_ALTERNATIVES: &[AlternativeApproach] = &[
    approach(
        "fallback",
        "Try an alternative approach or tool",
        "Use different method to achieve goal",
    ),
    approach(
        "simplify",
        "Reduce scope or complexity",
        "Simplify the request to avoid blocking",
    ),
    approach(
        "retry",
        "Retry with modified parameters",
        "Attempt again with adjusted settings",
    ),
];

const PARTIAL_ALTERNATIVES: &[AlternativeApproach] = &[
    approach(
        "continue",
        "Continue from where the partial result left off",
        "Build upon partial results",
    ),
    approach(
        "supplement",
        "Provide supplementary information for incomplete parts",
        "Fill in missing pieces",
    ),
    approach(
        "validate",
        "Validate the partial result before continuing",
        "Verify partial results are correct",
    ),
];

/// Alternative approaches for a family, most recommended first.
pub fn alternatives(family: RefusalType) -> &'static [AlternativeApproach] {
    match family {
        RefusalType::Direct => DIRECT_ALTERNATIVES,
        RefusalType::Ambiguous => AMBIGUOUS_ALTERNATIVES,
        RefusalType::Blocked => BLOCKED_ALTERNATIVES,
        RefusalType::Partial => PARTIAL_ALTERNATIVES,
    }
}

// ============================================================================
// Detection
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefusalMatch {
    #[serde(rename = "type")]
    pub refusal_type: RefusalType,
    pub pattern: String,
    pub matched: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlternativeOption {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlternativeRecommendation {
    pub approach: String,
    pub description: String,
    pub suggested_prompt: String,
    pub all_options: Vec<AlternativeOption>,
}

/// Verdict on one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefusalDetection {
    pub is_refusal: bool,
    #[serde(rename = "type")]
    pub refusal_type: Option<RefusalType>,
    pub confidence: f64,
    pub matches: Vec<RefusalMatch>,
    pub alternatives: Vec<AlternativeApproach>,
    pub recommendation: Option<AlternativeRecommendation>,
}

impl RefusalDetection {
    fn none() -> Self {
        Self {
            is_refusal: false,
            refusal_type: None,
            confidence: 0.0,
            matches: Vec::new(),
            alternatives: Vec::new(),
            recommendation: None,
        }
    }
}

/// Run every family against `text`. Pure; no logging or metrics.
pub fn classify(text: &str, provide_alternatives: bool) -> RefusalDetection {
    if text.trim().is_empty() {
        return RefusalDetection::none();
    }

    let mut matches = Vec::new();
    let mut best: Option<(RefusalType, usize)> = None;

    for family in RefusalType::ALL {
        let mut hits = 0;
        for pattern in family_patterns(family) {
            if let Some(m) = pattern.find(text) {
                hits += 1;
                matches.push(RefusalMatch {
                    refusal_type: family,
                    pattern: pattern.as_str().to_string(),
                    matched: m.as_str().to_string(),
                });
            }
        }
        if hits > best.map_or(0, |(_, count)| count) {
            best = Some((family, hits));
        }
    }

    let Some((family, hits)) = best else {
        return RefusalDetection::none();
    };

    let confidence = f64::min(hits as f64 * 0.3 + 0.4, 1.0);
    let (alternatives, recommendation) = if provide_alternatives {
        let options = self::alternatives(family);
        let recommendation = options.first().map(|first| AlternativeRecommendation {
            approach: first.name.to_string(),
            description: first.description.to_string(),
            suggested_prompt: first.prompt.to_string(),
            all_options: options
                .iter()
                .map(|a| AlternativeOption {
                    name: a.name.to_string(),
                    description: a.description.to_string(),
                })
                .collect(),
        });
        (options.to_vec(), recommendation)
    } else {
        (Vec::new(), None)
    };

    RefusalDetection {
        is_refusal: true,
        refusal_type: Some(family),
        confidence,
        matches,
        alternatives,
        recommendation,
    }
}

/// Whether any pattern of `family` matches.
pub fn matches_type(text: &str, family: RefusalType) -> bool {
    family_patterns(family).iter().any(|p| p.is_match(text))
}

/// Text a JSON response is scanned as. `None` for null.
fn response_text(response: &Value) -> Option<String> {
    match response {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// Detector
// ============================================================================

/// One logged positive detection.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub refusal_type: RefusalType,
    pub confidence: f64,
    pub match_count: usize,
    pub text_snippet: String,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AlternativeCounter {
    pub attempted: u64,
    pub succeeded: u64,
}

#[derive(Debug, Default)]
struct DetectorState {
    log: VecDeque<DetectionLogEntry>,
    total_detections: u64,
    by_type: BTreeMap<RefusalType, u64>,
    alternatives_attempted: u64,
    alternatives_succeeded: u64,
    by_alternative: BTreeMap<String, AlternativeCounter>,
}

/// Refusal detector counters.
#[derive(Debug, Clone, Serialize)]
pub struct RefusalStats {
    pub total_detections: u64,
    pub by_type: BTreeMap<RefusalType, u64>,
    pub alternatives_attempted: u64,
    pub alternatives_succeeded: u64,
    pub alternative_success_rate: f64,
    pub by_alternative: BTreeMap<String, AlternativeCounter>,
    pub recent_detections: Vec<DetectionLogEntry>,
    pub log_size: usize,
}

pub struct RefusalDetector {
    config: RefusalConfig,
    state: RwLock<DetectorState>,
}

impl RefusalDetector {
    pub fn new(config: RefusalConfig) -> Self {
        let mut state = DetectorState::default();
        for family in RefusalType::ALL {
            state.by_type.insert(family, 0);
        }
        Self {
            config,
            state: RwLock::new(state),
        }
    }

    /// Inspect a response of any JSON shape. Null and empty text are never refusals.
    pub async fn detect(&self, response: &Value) -> RefusalDetection {
        match response_text(response) {
            Some(text) => self.detect_text(&text).await,
            None => RefusalDetection::none(),
        }
    }

    pub async fn detect_text(&self, text: &str) -> RefusalDetection {
        let detection = classify(text, self.config.provide_alternatives);
        let Some(family) = detection.refusal_type else {
            debug!("No refusal indicators found");
            return detection;
        };

        info!(
            refusal_type = %family,
            confidence = detection.confidence,
            matches = detection.matches.len(),
            "Refusal detected"
        );

        let mut state = self.state.write().await;
        state.total_detections += 1;
        *state.by_type.entry(family).or_insert(0) += 1;

        if self.config.log_detections {
            state.log.push_back(DetectionLogEntry {
                timestamp: Utc::now(),
                refusal_type: family,
                confidence: detection.confidence,
                match_count: detection.matches.len(),
                text_snippet: text.chars().take(SNIPPET_CHARS).collect(),
                recommendation: detection.recommendation.as_ref().map(|r| r.approach.clone()),
            });
            if state.log.len() > LOG_LIMIT {
                let excess = state.log.len() - LOG_KEEP;
                state.log.drain(..excess);
            }
        }

        detection
    }

    /// Record whether a suggested alternative worked.
    pub async fn record_alternative_result(&self, name: &str, success: bool) {
        let mut state = self.state.write().await;
        state.alternatives_attempted += 1;
        let counter = state.by_alternative.entry(name.to_string()).or_default();
        counter.attempted += 1;
        if success {
            counter.succeeded += 1;
            state.alternatives_succeeded += 1;
        }
    }

    pub async fn stats(&self) -> RefusalStats {
        let state = self.state.read().await;
        let skip = state.log.len().saturating_sub(RECENT_DETECTIONS);
        RefusalStats {
            total_detections: state.total_detections,
            by_type: state.by_type.clone(),
            alternatives_attempted: state.alternatives_attempted,
            alternatives_succeeded: state.alternatives_succeeded,
            alternative_success_rate: ratio(
                state.alternatives_succeeded,
                state.alternatives_attempted,
            ),
            by_alternative: state.by_alternative.clone(),
            recent_detections: state.log.iter().skip(skip).cloned().collect(),
            log_size: state.log.len(),
        }
    }

    /// Empty the detection log; counters are kept.
    pub async fn clear_log(&self) {
        self.state.write().await.log.clear();
    }

    /// Drop the log and every counter.
    pub async fn reset(&self) {
        let mut state = DetectorState::default();
        for family in RefusalType::ALL {
            state.by_type.insert(family, 0);
        }
        *self.state.write().await = state;
    }
}
