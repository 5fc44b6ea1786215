//! Fixtures shared by the unit tests of this crate

use async_trait::async_trait;
use geosite_core::error::{GeositeError, Result};
use geosite_core::models::{HardConstraint, NarrationRequest, Narrative, Requirement, RuleProposal, SiteTable};
use geosite_llm::ports::{Embedder, LanguageModel};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Build a table from JSON row objects
pub fn table_from(rows: Vec<Value>) -> SiteTable {
    let records = rows
        .into_iter()
        .map(|row| row.as_object().cloned().expect("fixture rows are objects"))
        .collect();
    SiteTable::from_records(records).expect("fixture table is valid")
}

/// Three sites in Tianhe, ordered by distance to the nearest subway
pub fn sample_table() -> SiteTable {
    table_from(vec![
        json!({ "id": 0, "name": "地块A", "lon": 113.330, "lat": 23.130, "context": "地块A 紧邻地铁站的商业用地",
                "price_per_m2": 3000, "traffic_score": 9.0, "land_use": "商业用地", "parcel_location": "天河区" }),
        json!({ "id": 1, "name": "地块B", "lon": 113.340, "lat": 23.135, "context": "地块B 公交可达的办公用地",
                "price_per_m2": 2000, "traffic_score": 6.0, "land_use": "办公用地", "parcel_location": "天河区" }),
        json!({ "id": 2, "name": "地块C", "lon": 113.360, "lat": 23.150, "context": "地块C 远郊工业用地",
                "price_per_m2": 1000, "traffic_score": 3.0, "land_use": "工业用地", "parcel_location": "白云区" }),
    ])
}

/// Embedder mapping texts to fixed vectors by the first keyword they contain
pub struct KeywordEmbedder {
    keywords: Vec<(String, Vec<f32>)>,
    dimensions: usize,
    fail: bool,
}

impl KeywordEmbedder {
    pub fn new(dimensions: usize, keywords: Vec<(&str, Vec<f32>)>) -> Self {
        Self {
            keywords: keywords.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            dimensions,
            fail: false,
        }
    }

    /// "near subway" points at A, then B, then C
    pub fn subway_scenario() -> Self {
        Self::new(
            2,
            vec![
                ("near subway", vec![1.0, 0.0]),
                ("地块A", vec![0.9, 0.436]),
                ("地块B", vec![0.5, 0.866]),
                ("地块C", vec![0.1, 0.995]),
            ],
        )
    }

    /// Same vectors zero-padded to `dimensions`
    pub fn padded(mut self, dimensions: usize) -> Self {
        for (_, vector) in &mut self.keywords {
            vector.resize(dimensions, 0.0);
        }
        self.dimensions = dimensions;
        self
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::subway_scenario() }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(GeositeError::EmbedderUnavailable {
                reason: "connection refused".to_string(),
                remediation: "start the embedding service".to_string(),
            });
        }
        Ok(texts
            .iter()
            .map(|text| {
                self.keywords
                    .iter()
                    .find(|(keyword, _)| text.contains(keyword.as_str()))
                    .map(|(_, vector)| vector.clone())
                    .unwrap_or_else(|| vec![0.0; self.dimensions])
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }
}

/// Language model returning canned answers; `None` answers fail
#[derive(Default)]
pub struct ScriptedModel {
    pub requirements: Option<Vec<Requirement>>,
    pub proposal: Option<RuleProposal>,
    pub narrative: Option<Narrative>,
}

fn unavailable() -> GeositeError {
    GeositeError::LanguageModelUnavailable {
        reason: "scripted failure".to_string(),
        remediation: "none".to_string(),
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn parse(&self, _request: &str) -> Result<Vec<Requirement>> {
        self.requirements.clone().ok_or_else(unavailable)
    }

    async fn propose_rules(
        &self,
        _constraints: &[HardConstraint],
        _columns: &[String],
        _samples: &BTreeMap<String, Vec<String>>,
    ) -> Result<RuleProposal> {
        self.proposal.clone().ok_or_else(unavailable)
    }

    async fn narrate(&self, _request: &NarrationRequest) -> Result<Narrative> {
        self.narrative.clone().ok_or_else(unavailable)
    }
}
