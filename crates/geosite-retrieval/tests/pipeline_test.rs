//! End-to-end selection runs against in-memory collaborators

use async_trait::async_trait;
use geosite_core::config::{LlmSettings, SelectionConfig};
use geosite_core::error::{GeositeError, Result};
use geosite_core::models::{
    columns, ConstraintCategory, HardConstraint, NarrationRequest, Narrative, Requirement, Rule, RuleOp,
    RuleProposal, SiteTable,
};
use geosite_llm::{Embedder, LanguageModel};
use geosite_retrieval::{Narration, SelectionPipeline, SelectionStage};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Maps a text to the vector of the first marker it contains
struct MarkerEmbedder {
    markers: Vec<(&'static str, Vec<f32>)>,
    down: bool,
    calls: AtomicUsize,
}

impl MarkerEmbedder {
    fn subway() -> Self {
        Self {
            markers: vec![
                ("near subway", vec![1.0, 0.0]),
                ("site-a", vec![0.9, 0.436]),
                ("site-b", vec![0.5, 0.866]),
                ("site-c", vec![0.1, 0.995]),
            ],
            down: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn outage() -> Self {
        Self { down: true, ..Self::subway() }
    }
}

#[async_trait]
impl Embedder for MarkerEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down {
            return Err(GeositeError::EmbedderUnavailable {
                reason: "connection refused".to_string(),
                remediation: "start the embedding service".to_string(),
            });
        }
        Ok(texts
            .iter()
            .map(|text| {
                self.markers
                    .iter()
                    .find(|(marker, _)| text.contains(marker))
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| vec![0.0, 0.0])
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "marker"
    }
}

/// Language model with fixed answers; narration always fails
struct FixedModel {
    requirements: Vec<Requirement>,
    rules: Vec<Rule>,
}

#[async_trait]
impl LanguageModel for FixedModel {
    async fn parse(&self, _request: &str) -> Result<Vec<Requirement>> {
        Ok(self.requirements.clone())
    }

    async fn propose_rules(
        &self,
        _constraints: &[HardConstraint],
        _columns: &[String],
        _samples: &BTreeMap<String, Vec<String>>,
    ) -> Result<RuleProposal> {
        Ok(RuleProposal {
            rules: self.rules.clone(),
            ..Default::default()
        })
    }

    async fn narrate(&self, _request: &NarrationRequest) -> Result<Narrative> {
        Err(GeositeError::LanguageModelUnavailable {
            reason: "HTTP 503".to_string(),
            remediation: "retry later".to_string(),
        })
    }
}

fn write_dataset(dir: &TempDir) -> SelectionConfig {
    let path = dir.path().join("sites.json");
    let rows = json!([
        { "id": 10, "name": "A", "lon": 113.330, "lat": 23.130, "context": "site-a next to the metro", "price_per_m2": 1000 },
        { "id": 11, "name": "B", "lon": 113.340, "lat": 23.135, "context": "site-b bus corridor", "price_per_m2": 4000 },
        { "id": 12, "name": "C", "lon": 113.360, "lat": 23.150, "context": "site-c outskirts", "price_per_m2": 2000 },
    ]);
    std::fs::write(&path, serde_json::to_string(&rows).unwrap()).unwrap();
    SelectionConfig::for_dataset(path)
}

fn llm_settings() -> LlmSettings {
    LlmSettings {
        base_url: "http://localhost:9".to_string(),
        model: "fixed".to_string(),
        api_key: "sk-test".to_string(),
    }
}

fn load(config: &SelectionConfig) -> Arc<SiteTable> {
    Arc::new(SiteTable::from_json_file(&config.dataset_path).unwrap())
}

#[tokio::test]
async fn test_subway_request_ranks_by_similarity() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_dataset(&dir);
    let table = load(&config);
    let pipeline = SelectionPipeline::new(config, table, Arc::new(MarkerEmbedder::subway()), None, None).unwrap();

    let report = pipeline.run("near subway").await;
    assert_eq!(report.stage, SelectionStage::Done);

    let result = report.result().unwrap();
    let names: Vec<&str> = result.ranked.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    for pair in result.ranked.windows(2) {
        assert!(pair[0].breakdown.final_score > pair[1].breakdown.final_score);
    }
    assert_eq!(result.visit_order.len(), 3);
    assert!(dir.path().join("sites.embeddings.json").exists());
}

#[tokio::test]
async fn test_embedder_outage_reports_no_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_dataset(&dir);
    let table = load(&config);
    let embedder = Arc::new(MarkerEmbedder::outage());
    let pipeline = SelectionPipeline::new(config, table, embedder.clone(), None, None).unwrap();

    let report = pipeline.run("near subway").await;
    assert!(report.is_no_candidates());
    assert_eq!(report.stage, SelectionStage::Retrieve);
    assert!(report.result().is_none());
    assert!(embedder.calls.load(Ordering::SeqCst) > 0);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"]["outcome"], "no_candidates");
}

#[tokio::test]
async fn test_price_rule_filters_and_narration_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_dataset(&dir);
    config.llm = Some(llm_settings());
    config.enable_struct_filters = true;
    config.enable_llm_constraints = true;
    config.enable_narration = true;
    let table = load(&config);

    let model = FixedModel {
        requirements: vec![
            Requirement::soft("near subway"),
            Requirement::hard("price <= 3000", ConstraintCategory::Cost),
        ],
        rules: vec![Rule::new(columns::PRICE_PER_M2, RuleOp::Le, 3000)],
    };
    let pipeline = SelectionPipeline::new(
        config,
        table,
        Arc::new(MarkerEmbedder::subway()),
        Some(Arc::new(model)),
        None,
    )
    .unwrap();

    let report = pipeline.run("near subway, price at most 3000").await;
    assert_eq!(report.requirements.hard_constraints.len(), 1);

    let result = report.result().unwrap();
    let names: Vec<&str> = result.ranked.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["A", "C"]);
    assert!(result.ranked.iter().all(|r| r.breakdown.structural_normalized == 10.0));

    let Narration::Failed { reason } = &result.narration else {
        panic!("narration failure must be surfaced");
    };
    assert!(reason.contains("503"));
    assert!(report.diagnostics.iter().any(|d| d.message.contains("narration")));
    assert_eq!(result.geojson.features.len(), 2);
}

#[tokio::test]
async fn test_spatial_route_keeps_every_site_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_dataset(&dir);
    config.enable_spatial_optimization = true;
    config.enable_route_order = true;
    let table = load(&config);
    let pipeline = SelectionPipeline::new(config, table, Arc::new(MarkerEmbedder::subway()), None, None).unwrap();

    let result = pipeline.run("near subway").await.result().cloned().unwrap();
    let mut visited: Vec<u64> = result.visit_order.iter().map(|id| id.0).collect();
    visited.sort_unstable();
    assert_eq!(visited, vec![10, 11, 12]);

    let clustered: usize = result.clusters.iter().map(|c| c.members.len()).sum();
    assert_eq!(clustered, 3);
    assert_eq!(result.cluster_order.len(), result.clusters.len());
}
