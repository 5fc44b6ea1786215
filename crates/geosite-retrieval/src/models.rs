use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use geosite_core::models::{Cluster, Narrative, RequirementSet, ScoreBreakdown, ScoringWeights, SiteId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stages of a selection run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStage {
    Init,
    Retrieve,
    Filter,
    Select,
    Order,
    Done,
}

impl SelectionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStage::Init => "init",
            SelectionStage::Retrieve => "retrieve",
            SelectionStage::Filter => "filter",
            SelectionStage::Select => "select",
            SelectionStage::Order => "order",
            SelectionStage::Done => "done",
        }
    }
}

/// A contained failure or fallback recorded during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: SelectionStage,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: SelectionStage, message: impl Into<String>) -> Self {
        Self { stage, message: message.into() }
    }
}

/// Result of one stage: either it ran as intended or it fell back
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult<T> {
    Complete(T),
    /// The stage fell back to `value`; `reason` explains why
    Degraded { value: T, reason: String },
}

impl<T> StageResult<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        StageResult::Degraded { value, reason: reason.into() }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageResult::Degraded { .. })
    }

    /// Unwrap the value, recording a diagnostic when the stage degraded
    pub fn record(self, stage: SelectionStage, diagnostics: &mut Vec<Diagnostic>) -> T {
        match self {
            StageResult::Complete(value) => value,
            StageResult::Degraded { value, reason } => {
                tracing::warn!(stage = stage.as_str(), %reason, "Stage degraded");
                diagnostics.push(Diagnostic::new(stage, reason));
                value
            }
        }
    }
}

/// Narration step outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Narration {
    /// Narration disabled or no language model configured
    Skipped,
    Complete { narrative: Narrative },
    Failed { reason: String },
}

/// One site of the ranked output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSite {
    /// 1-based display rank
    pub rank: usize,
    pub site_id: SiteId,
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    pub breakdown: ScoreBreakdown,
}

/// Mean position of the ranked sites
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapCenter {
    pub lon: f64,
    pub lat: f64,
}

/// Successful selection output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Sites in display order
    pub ranked: Vec<RankedSite>,

    /// Sites in route order
    pub visit_order: Vec<SiteId>,

    /// Cluster membership; members listed in visit order
    pub clusters: Vec<Cluster>,

    /// Positions into `clusters` in visiting order
    pub cluster_order: Vec<usize>,

    /// Composite weights used for the final score
    pub weights: ScoringWeights,

    pub narration: Narration,
    pub geojson: FeatureCollection,
    pub center: MapCenter,
}

/// Terminal outcome of a selection run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SelectionOutcome {
    Selected(Box<SelectionResult>),
    /// Retrieval produced no candidate for any requirement
    NoCandidates,
}

/// Report of one selection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub requirements: RequirementSet,
    pub outcome: SelectionOutcome,

    /// Last stage reached
    pub stage: SelectionStage,
    pub diagnostics: Vec<Diagnostic>,
}

impl SelectionReport {
    pub fn result(&self) -> Option<&SelectionResult> {
        match &self.outcome {
            SelectionOutcome::Selected(result) => Some(result),
            SelectionOutcome::NoCandidates => None,
        }
    }

    pub fn is_no_candidates(&self) -> bool {
        matches!(self.outcome, SelectionOutcome::NoCandidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_result_records_degradation() {
        let mut diagnostics = Vec::new();

        let value = StageResult::Complete(3).record(SelectionStage::Filter, &mut diagnostics);
        assert_eq!(value, 3);
        assert!(diagnostics.is_empty());

        let value = StageResult::degraded(vec![1, 2], "filter removed every candidate")
            .record(SelectionStage::Filter, &mut diagnostics);
        assert_eq!(value, vec![1, 2]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].stage, SelectionStage::Filter);
    }

    #[test]
    fn test_narration_serialization() {
        let failed = Narration::Failed { reason: "timeout".to_string() };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "timeout");
    }
}
