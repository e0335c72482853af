//! Intervention log with outcome tracking and effectiveness analytics.
//!
//! Entries live in memory, capped at `max_entries`; when the cap is exceeded
//! the oldest entries are dropped down to 80% of the cap and the analytics are
//! recomputed from what remains, so they always agree with a full pass over the
//! retained entries. File logging appends every entry to a JSON array on disk
//! with the same rotation rule; file errors are logged and otherwise ignored.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::LoggerConfig;
use super::types::{AnalysisResult, InterventionType};
use crate::error::LoggerResult;

const TOP_TRIGGERS: usize = 10;
/// Samples a type needs before it is judged effective or ineffective.
const MIN_SAMPLES: u64 = 5;
const EFFECTIVE_ABOVE: f64 = 0.7;
const INEFFECTIVE_BELOW: f64 = 0.3;

// ============================================================================
// Entries
// ============================================================================

/// Reported result of an intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Partial,
    Failed,
    Unknown,
}

impl OutcomeStatus {
    pub const ALL: [OutcomeStatus; 4] = [
        OutcomeStatus::Success,
        OutcomeStatus::Partial,
        OutcomeStatus::Failed,
        OutcomeStatus::Unknown,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// What the caller wants recorded.
#[derive(Debug, Clone, Default)]
pub struct LogEvent {
    pub intervention_type: Option<InterventionType>,
    /// Name of the condition that fired
    pub trigger: Option<String>,
    pub prompt: String,
    pub analysis: Option<Arc<AnalysisResult>>,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub intervention_type: Option<InterventionType>,
    pub trigger: Option<String>,
    pub prompt: String,
    pub analysis: Option<Arc<AnalysisResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub outcome: Option<Outcome>,
}

/// Selection for [`InterventionLogger::entries`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryFilter {
    #[serde(default, rename = "type")]
    pub intervention_type: Option<InterventionType>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Keep only the newest `limit` matches
    #[serde(default)]
    pub limit: Option<usize>,
}

// ============================================================================
// Analytics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TypeEffectiveness {
    pub total: u64,
    pub success: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerCount {
    pub trigger: String,
    pub count: u64,
}

#[derive(Debug, Default)]
struct Analytics {
    total: u64,
    by_type: BTreeMap<InterventionType, u64>,
    by_outcome: BTreeMap<OutcomeStatus, u64>,
    confidence_sum: f64,
    confidence_count: u64,
    triggers: HashMap<String, u64>,
    effectiveness_by_type: BTreeMap<InterventionType, TypeEffectiveness>,
}

impl Analytics {
    fn new() -> Self {
        let mut analytics = Self::default();
        for status in OutcomeStatus::ALL {
            analytics.by_outcome.insert(status, 0);
        }
        analytics
    }

    fn recompute<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Self {
        let mut analytics = Self::new();
        for entry in entries {
            analytics.record_entry(entry);
            if let Some(outcome) = &entry.outcome {
                analytics.record_outcome(entry.intervention_type, outcome.status);
            }
        }
        analytics
    }

    fn record_entry(&mut self, entry: &LogEntry) {
        self.total += 1;
        if let Some(kind) = entry.intervention_type {
            *self.by_type.entry(kind).or_insert(0) += 1;
        }
        if let Some(analysis) = &entry.analysis {
            self.confidence_sum += f64::from(100 - analysis.risk_score.min(100)) / 100.0;
            self.confidence_count += 1;
        }
        if let Some(trigger) = &entry.trigger {
            *self.triggers.entry(trigger.clone()).or_insert(0) += 1;
        }
    }

    fn record_outcome(&mut self, kind: Option<InterventionType>, status: OutcomeStatus) {
        *self.by_outcome.entry(status).or_insert(0) += 1;
        if let Some(kind) = kind {
            let slot = self.effectiveness_by_type.entry(kind).or_default();
            slot.total += 1;
            if status == OutcomeStatus::Success {
                slot.success += 1;
            }
        }
    }

    fn retract_outcome(&mut self, kind: Option<InterventionType>, status: OutcomeStatus) {
        if let Some(count) = self.by_outcome.get_mut(&status) {
            *count = count.saturating_sub(1);
        }
        if let Some(slot) = kind.and_then(|k| self.effectiveness_by_type.get_mut(&k)) {
            slot.total = slot.total.saturating_sub(1);
            if status == OutcomeStatus::Success {
                slot.success = slot.success.saturating_sub(1);
            }
        }
    }

    /// Most frequent triggers, ties broken by name.
    fn top_triggers(&self) -> Vec<TriggerCount> {
        let mut triggers: Vec<TriggerCount> = self
            .triggers
            .iter()
            .map(|(trigger, count)| TriggerCount {
                trigger: trigger.clone(),
                count: *count,
            })
            .collect();
        triggers.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.trigger.cmp(&b.trigger)));
        triggers.truncate(TOP_TRIGGERS);
        triggers
    }
}

/// Outcome-weighted effectiveness; partial outcomes count half.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Effectiveness {
    pub overall: f64,
    pub success_rate: f64,
    pub partial_rate: f64,
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggerStats {
    pub total_interventions: u64,
    pub by_type: BTreeMap<InterventionType, u64>,
    pub by_outcome: BTreeMap<OutcomeStatus, u64>,
    /// Mean of `(100 - risk_score) / 100` over entries with an analysis
    pub average_confidence: f64,
    pub top_triggers: Vec<TriggerCount>,
    pub effectiveness_by_type: BTreeMap<InterventionType, TypeEffectiveness>,
    pub log_size: usize,
    /// `None` until an outcome is reported
    pub effectiveness: Option<Effectiveness>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeVerdict {
    #[serde(rename = "type")]
    pub intervention_type: InterventionType,
    pub effectiveness: f64,
    pub sample_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternAdvice {
    Avoid,
    Prefer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternRecommendation {
    #[serde(rename = "type")]
    pub advice: PatternAdvice,
    pub message: String,
    pub data: Vec<TypeVerdict>,
}

/// What the outcome history says about each intervention type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnedPatterns {
    pub common_triggers: Vec<TriggerCount>,
    pub effective_interventions: Vec<TypeVerdict>,
    pub ineffective_interventions: Vec<TypeVerdict>,
    pub recommendations: Vec<PatternRecommendation>,
}

// ============================================================================
// Logger
// ============================================================================

struct LoggerState {
    entries: Vec<LogEntry>,
    analytics: Analytics,
}

pub struct InterventionLogger {
    config: LoggerConfig,
    state: RwLock<LoggerState>,
}

impl InterventionLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(LoggerState {
                entries: Vec::new(),
                analytics: Analytics::new(),
            }),
        }
    }

    /// Entries kept after a trim. Never zero, so the newest entry survives.
    fn retained_len(&self) -> usize {
        ((self.config.max_entries as f64 * 0.8).floor() as usize).max(1)
    }

    /// Record an event and return its id. Never fails.
    pub async fn log(&self, event: LogEvent) -> String {
        let entry = LogEntry {
            id: format!("intervention-{}", Uuid::new_v4()),
            timestamp: Utc::now(),
            intervention_type: event.intervention_type,
            trigger: event.trigger,
            prompt: event.prompt,
            analysis: event.analysis,
            details: event.details,
            outcome: None,
        };
        let id = entry.id.clone();

        let mut state = self.state.write().await;
        if self.config.log_to_file {
            if let Err(e) = self.append_to_file(&entry) {
                warn!(
                    path = %self.config.log_path.display(),
                    error = %e,
                    "Failed to write intervention log"
                );
            }
        }

        if self.config.enable_analytics {
            state.analytics.record_entry(&entry);
        }
        state.entries.push(entry);

        if state.entries.len() > self.config.max_entries {
            let excess = state.entries.len() - self.retained_len();
            state.entries.drain(..excess);
            if self.config.enable_analytics {
                state.analytics = Analytics::recompute(&state.entries);
            }
            debug!(dropped = excess, "Intervention log trimmed");
        }

        debug!(id = %id, "Intervention logged");
        id
    }

    /// Attach an outcome to an entry. Returns `false` for unknown ids.
    pub async fn update_outcome(
        &self,
        id: &str,
        status: OutcomeStatus,
        notes: Option<String>,
    ) -> bool {
        let mut state = self.state.write().await;
        let LoggerState { entries, analytics } = &mut *state;

        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            debug!(id = %id, "Outcome for unknown intervention ignored");
            return false;
        };

        if self.config.enable_analytics {
            if let Some(previous) = &entry.outcome {
                analytics.retract_outcome(entry.intervention_type, previous.status);
            }
            analytics.record_outcome(entry.intervention_type, status);
        }
        entry.outcome = Some(Outcome {
            status,
            notes,
            timestamp: Utc::now(),
        });
        info!(id = %id, status = ?status, "Intervention outcome recorded");
        true
    }

    pub async fn entries(&self, filter: &EntryFilter) -> Vec<LogEntry> {
        let state = self.state.read().await;
        let mut entries: Vec<LogEntry> = state
            .entries
            .iter()
            .filter(|e| filter.intervention_type.map_or(true, |t| e.intervention_type == Some(t)))
            .filter(|e| filter.since.map_or(true, |since| e.timestamp >= since))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            let skip = entries.len().saturating_sub(limit);
            entries.drain(..skip);
        }
        entries
    }

    pub async fn stats(&self) -> LoggerStats {
        let state = self.state.read().await;
        let analytics = &state.analytics;

        let outcome = |status: OutcomeStatus| {
            analytics.by_outcome.get(&status).copied().unwrap_or(0) as f64
        };
        let success = outcome(OutcomeStatus::Success);
        let partial = outcome(OutcomeStatus::Partial);
        let failed = outcome(OutcomeStatus::Failed);
        let total = success + partial + failed + outcome(OutcomeStatus::Unknown);

        LoggerStats {
            total_interventions: analytics.total,
            by_type: analytics.by_type.clone(),
            by_outcome: analytics.by_outcome.clone(),
            average_confidence: if analytics.confidence_count > 0 {
                analytics.confidence_sum / analytics.confidence_count as f64
            } else {
                0.0
            },
            top_triggers: analytics.top_triggers(),
            effectiveness_by_type: analytics.effectiveness_by_type.clone(),
            log_size: state.entries.len(),
            effectiveness: (total > 0.0).then(|| Effectiveness {
                overall: (success + partial * 0.5) / total,
                success_rate: success / total,
                partial_rate: partial / total,
                failure_rate: failed / total,
            }),
        }
    }

    pub async fn learned_patterns(&self) -> LearnedPatterns {
        let state = self.state.read().await;
        let analytics = &state.analytics;

        let mut effective = Vec::new();
        let mut ineffective = Vec::new();
        for (kind, data) in &analytics.effectiveness_by_type {
            if data.total < MIN_SAMPLES {
                continue;
            }
            let verdict = TypeVerdict {
                intervention_type: *kind,
                effectiveness: data.success as f64 / data.total as f64,
                sample_size: data.total,
            };
            if verdict.effectiveness > EFFECTIVE_ABOVE {
                effective.push(verdict);
            } else if verdict.effectiveness < INEFFECTIVE_BELOW {
                ineffective.push(verdict);
            }
        }

        let names = |verdicts: &[TypeVerdict]| {
            verdicts
                .iter()
                .map(|v| v.intervention_type.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut recommendations = Vec::new();
        if !ineffective.is_empty() {
            recommendations.push(PatternRecommendation {
                advice: PatternAdvice::Avoid,
                message: format!("Consider avoiding intervention types: {}", names(&ineffective)),
                data: ineffective.clone(),
            });
        }
        if !effective.is_empty() {
            recommendations.push(PatternRecommendation {
                advice: PatternAdvice::Prefer,
                message: format!("Prefer intervention types: {}", names(&effective)),
                data: effective.clone(),
            });
        }

        LearnedPatterns {
            common_triggers: analytics.top_triggers(),
            effective_interventions: effective,
            ineffective_interventions: ineffective,
            recommendations,
        }
    }

    /// Write analytics and every retained entry to `path` as pretty JSON.
    pub async fn export(&self, path: &Path) -> LoggerResult<()> {
        let stats = self.stats().await;
        let entries = self.state.read().await.entries.clone();
        let document = serde_json::json!({
            "exported": Utc::now(),
            "analytics": stats,
            "entries": entries,
        });

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&document)?)?;
        info!(path = %path.display(), entries = entries.len(), "Intervention log exported");
        Ok(())
    }

    /// Drop every entry and reset analytics. The log file is left alone.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.analytics = Analytics::new();
    }

    /// Append to the JSON array on disk, rotating with the in-memory rule.
    fn append_to_file(&self, entry: &LogEntry) -> LoggerResult<()> {
        let path = &self.config.log_path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut existing: Vec<Value> = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Intervention log unreadable, starting fresh"
                );
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        existing.push(serde_json::to_value(entry)?);
        if existing.len() > self.config.max_entries {
            let excess = existing.len() - self.retained_len();
            existing.drain(..excess);
        }

        fs::write(path, serde_json::to_string_pretty(&existing)?)?;
        Ok(())
    }
}
