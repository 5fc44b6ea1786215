//! Selection pipeline.
//!
//! One run walks a request through retrieval, structural filtering, selection
//! and route ordering. Degraded stages add a diagnostic instead of aborting.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use geosite_core::config::SelectionConfig;
use geosite_core::error::{GeositeError, Result};
use geosite_core::models::{columns, RequirementSet, Rule, ScoringWeights, SiteId, SiteScore, SiteTable};
use geosite_core::ports::{ProbabilitySource, TableProbabilitySource};
use geosite_geo::ClusterParams;
use geosite_llm::{ChatModelClient, Embedder, LanguageModel, OllamaEmbedder};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::blend::{blend_probabilities, BlendWeights};
use crate::constraints::{ConstraintEngine, TextScoreRange};
use crate::embedding::{merge_by_site, EmbeddingIndex};
use crate::intent::RequestIntent;
use crate::models::{
    Diagnostic, Narration, RankedSite, SelectionOutcome, SelectionReport, SelectionResult, SelectionStage,
};
use crate::narration;
use crate::optimizer::{SelectionParams, SpatialOptimizer};
use crate::scoring::{derive_weights, normalize_text_score, satisfaction_by_site, DistrictTable, FinalScoreInputs, ScoringEngine};

/// Leading results of each sub-query treated as pseudo-anchors
const PSEUDO_ANCHORS_PER_QUERY: usize = 2;

/// Site selection pipeline: retrieve, filter, select, order, narrate
pub struct SelectionPipeline {
    config: SelectionConfig,
    table: Arc<SiteTable>,
    index: EmbeddingIndex,
    language_model: Option<Arc<dyn LanguageModel>>,
    probabilities: Option<Arc<dyn ProbabilitySource>>,
    constraints: ConstraintEngine,
    scoring: ScoringEngine,
    optimizer: SpatialOptimizer,
}

/// Retrieval output carried through the later stages
struct Retrieved {
    candidates: Vec<SiteScore>,
    text_scores: HashMap<SiteId, f64>,
    range: TextScoreRange,
    pseudo_anchors: Vec<SiteId>,
}

impl SelectionPipeline {
    /// Create a pipeline from its collaborators.
    ///
    /// Fails when a language model is configured but not supplied.
    pub fn new(
        config: SelectionConfig,
        table: Arc<SiteTable>,
        embedder: Arc<dyn Embedder>,
        language_model: Option<Arc<dyn LanguageModel>>,
        probabilities: Option<Arc<dyn ProbabilitySource>>,
    ) -> Result<Self> {
        if config.llm.is_some() && language_model.is_none() {
            return Err(GeositeError::ConfigMissing {
                key: "language model client".to_string(),
            });
        }
        if config.max_sites == 0 {
            return Err(GeositeError::ConfigInvalid {
                key: "max_sites".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if config.retrieval_concurrency == 0 {
            return Err(GeositeError::ConfigInvalid {
                key: "retrieval_concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let index = EmbeddingIndex::new(table.clone(), embedder, config.embedding_cache.clone());
        let districts = config.districts.clone().map(DistrictTable::from).unwrap_or_default();
        let optimizer = SpatialOptimizer::new(
            table.clone(),
            SelectionParams {
                max_sites: config.max_sites,
                min_distance_m: config.min_distance_m,
                cluster: ClusterParams {
                    threshold_m: config.cluster_threshold_m,
                    min_clusters: config.min_clusters,
                    min_cluster_size: config.min_cluster_size,
                },
            },
        );

        Ok(Self {
            constraints: ConstraintEngine::new(table.clone()),
            scoring: ScoringEngine::new(table.clone(), districts),
            optimizer,
            index,
            language_model,
            probabilities,
            table,
            config,
        })
    }

    /// Build the pipeline with the HTTP collaborators described by the configuration
    pub fn from_config(config: SelectionConfig) -> Result<Self> {
        let table = Arc::new(SiteTable::from_json_file(&config.dataset_path)?);
        tracing::info!(sites = table.len(), path = %config.dataset_path.display(), "Loaded site table");

        let embedder: Arc<dyn Embedder> = match config.embedder.provider.as_str() {
            "ollama" => Arc::new(OllamaEmbedder::new(
                config.embedder.url.clone(),
                config.embedder.model.clone(),
                config.embedder.dimensions,
            )),
            other => {
                return Err(GeositeError::ConfigInvalid {
                    key: "embedder".to_string(),
                    reason: format!("Unsupported embedding provider '{}'. Supported: ollama", other),
                })
            }
        };

        let language_model: Option<Arc<dyn LanguageModel>> = match &config.llm {
            Some(llm) => Some(Arc::new(ChatModelClient::new(
                llm.base_url.clone(),
                llm.model.clone(),
                llm.api_key.clone(),
            )?)),
            None => None,
        };

        let probabilities: Option<Arc<dyn ProbabilitySource>> =
            match (&config.safe_predictions, config.enable_safe) {
                (Some(path), true) => match TableProbabilitySource::from_json_file(path) {
                    Ok(source) => Some(Arc::new(source)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Probability blending disabled");
                        None
                    }
                },
                _ => None,
            };

        Self::new(config, table, embedder, language_model, probabilities)
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    pub fn table(&self) -> &SiteTable {
        &self.table
    }

    /// Recompute the embedding matrix and overwrite its cache
    pub async fn rebuild_embeddings(&self) -> Result<usize> {
        self.index.rebuild().await
    }

    /// Run a selection without anchor sites
    pub async fn run(&self, request: &str) -> SelectionReport {
        self.run_with_anchors(request, &[]).await
    }

    /// Run a selection; `anchors` are always included in the result
    pub async fn run_with_anchors(&self, request: &str, anchors: &[SiteId]) -> SelectionReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut diagnostics = Vec::new();

        tracing::info!(%run_id, request = %request, "Starting selection run");
        let requirements = self.parse_request(request, &mut diagnostics).await;
        let report = |outcome, stage, diagnostics| SelectionReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            requirements: requirements.clone(),
            outcome,
            stage,
            diagnostics,
        };

        tracing::info!(stage = SelectionStage::Retrieve.as_str(), sub_queries = requirements.sub_queries.len());
        let Some(retrieved) = self.retrieve(&requirements, &mut diagnostics).await else {
            tracing::warn!(%run_id, "No candidates for any requirement");
            return report(SelectionOutcome::NoCandidates, SelectionStage::Retrieve, diagnostics);
        };

        tracing::info!(stage = SelectionStage::Filter.as_str(), candidates = retrieved.candidates.len());
        let intent = RequestIntent::detect(&requirements);
        let (candidates, satisfaction) =
            self.filter(&requirements, &retrieved, intent, &mut diagnostics).await;

        tracing::info!(stage = SelectionStage::Select.as_str(), candidates = candidates.len());
        let selection = if self.config.enable_spatial_optimization {
            self.optimizer.select_clustered(&candidates, anchors, &retrieved.pseudo_anchors)
        } else {
            self.optimizer.select_simple(&candidates, anchors)
        };

        tracing::info!(stage = SelectionStage::Order.as_str(), sites = selection.len());
        let plan = self.optimizer.route_order(&selection, self.config.enable_route_order);

        let weights = if intent.prioritize_traffic {
            ScoringWeights::TRAFFIC_INTENT
        } else {
            derive_weights(&requirements.positive_texts(), requirements.has_positive_region_constraint())
        };
        let ranked = self.rank(&plan.visit_order, &retrieved, satisfaction.as_ref(), weights, intent);

        let narration = self.narrate(&requirements, &ranked, &mut diagnostics).await;
        let narrative = match &narration {
            Narration::Complete { narrative } => Some(narrative),
            _ => None,
        };
        let geojson = narration::to_geojson(&ranked, narrative);
        let center = narration::map_center(&ranked);

        tracing::info!(%run_id, ranked = ranked.len(), diagnostics = diagnostics.len(), "Selection run finished");
        let result = SelectionResult {
            ranked,
            visit_order: plan.visit_order,
            clusters: plan.clusters,
            cluster_order: plan.cluster_order,
            weights,
            narration,
            geojson,
            center,
        };
        report(SelectionOutcome::Selected(Box::new(result)), SelectionStage::Done, diagnostics)
    }

    /// Decompose the request, falling back to the raw text as one requirement
    async fn parse_request(&self, request: &str, diagnostics: &mut Vec<Diagnostic>) -> RequirementSet {
        let Some(model) = &self.language_model else {
            return RequirementSet::fallback(request);
        };

        match model.parse(request).await {
            Ok(requirements) if !requirements.is_empty() => {
                let set = RequirementSet::from_requirements(request, requirements);
                tracing::info!(
                    sub_queries = set.sub_queries.len(),
                    hard_constraints = set.hard_constraints.len(),
                    "Parsed request"
                );
                set
            }
            Ok(_) => {
                diagnostics.push(Diagnostic::new(
                    SelectionStage::Init,
                    "request parser returned no requirements; using the raw request",
                ));
                RequirementSet::fallback(request)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Request parsing failed");
                diagnostics.push(Diagnostic::new(
                    SelectionStage::Init,
                    format!("request parsing failed ({}); using the raw request", e),
                ));
                RequirementSet::fallback(request)
            }
        }
    }

    /// One similarity query per sub-query, bounded in parallel, merged by site.
    ///
    /// `None` when every sub-query came back empty.
    async fn retrieve(&self, requirements: &RequirementSet, diagnostics: &mut Vec<Diagnostic>) -> Option<Retrieved> {
        let top_k = self.table.len().min(self.config.min_candidates);

        let mut results: Vec<(usize, Vec<SiteScore>)> = stream::iter(requirements.sub_queries.iter().enumerate())
            .map(|(i, query)| async move {
                let ranked = self
                    .index
                    .query(&query.positive, query.negative.as_deref(), top_k)
                    .await;
                tracing::debug!(requirement = %query.positive, results = ranked.len(), "Sub-query finished");
                (i, ranked)
            })
            .buffer_unordered(self.config.retrieval_concurrency)
            .collect()
            .await;
        results.sort_by_key(|(i, _)| *i);

        let mut per_query = Vec::with_capacity(results.len());
        let mut pseudo_anchors = Vec::new();
        for (i, ranked) in results {
            if ranked.is_empty() {
                diagnostics.push(Diagnostic::new(
                    SelectionStage::Retrieve,
                    format!("sub-query '{}' returned no candidates", requirements.sub_queries[i].positive),
                ));
                continue;
            }
            for leading in ranked.iter().take(PSEUDO_ANCHORS_PER_QUERY) {
                if !pseudo_anchors.contains(&leading.site_id) {
                    pseudo_anchors.push(leading.site_id);
                }
            }
            per_query.push(ranked);
        }

        if per_query.is_empty() {
            return None;
        }

        let candidates = merge_by_site(&per_query);
        tracing::info!(candidates = candidates.len(), sub_queries = per_query.len(), "Merged retrieval results");
        Some(Retrieved {
            text_scores: candidates.iter().map(|c| (c.site_id, c.score)).collect(),
            range: TextScoreRange::of(&candidates),
            candidates,
            pseudo_anchors,
        })
    }

    /// Structural rules, request-intent overrides, then probability blending.
    ///
    /// Returns the candidates and, when rules were evaluated, the per-site
    /// structural satisfaction.
    async fn filter(
        &self,
        requirements: &RequirementSet,
        retrieved: &Retrieved,
        intent: RequestIntent,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> (Vec<SiteScore>, Option<HashMap<SiteId, f64>>) {
        let mut candidates = retrieved.candidates.clone();
        let mut satisfaction = None;

        if self.config.enable_struct_filters {
            let rules = self.collect_rules(requirements, diagnostics).await;
            if rules.is_empty() {
                tracing::info!("No structural rules for this request");
            } else {
                let evaluation = self.constraints.evaluate(&rules);
                satisfaction = Some(satisfaction_by_site(&self.table, &evaluation.satisfaction));
                candidates = self
                    .constraints
                    .filter(&candidates, &evaluation, &retrieved.text_scores, retrieved.range)
                    .record(SelectionStage::Filter, diagnostics);
            }
        }

        candidates = intent
            .apply(&self.table, candidates)
            .record(SelectionStage::Filter, diagnostics);

        if self.config.enable_safe && self.config.blend_w_safe > 0.0 {
            match &self.probabilities {
                Some(source) => {
                    candidates = blend_probabilities(
                        &self.table,
                        source.as_ref(),
                        &candidates,
                        BlendWeights {
                            text: self.config.blend_w_vector,
                            probability: self.config.blend_w_safe,
                            geohash_precision: self.config.geohash_precision,
                        },
                    );
                }
                None => diagnostics.push(Diagnostic::new(
                    SelectionStage::Filter,
                    "probability blending enabled but no probability source is loaded",
                )),
            }
        }

        (candidates, satisfaction)
    }

    /// Preset rules, plus rules proposed by the language model when enabled
    async fn collect_rules(
        &self,
        requirements: &RequirementSet,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Rule> {
        let hard = &requirements.hard_constraints;
        let mut rules = self.constraints.derive_preset_rules(hard);

        if let (true, false, Some(model)) =
            (self.config.enable_llm_constraints, hard.is_empty(), &self.language_model)
        {
            let samples = self.table.sample_values(3);
            match model.propose_rules(hard, self.table.columns(), &samples).await {
                Ok(proposal) => {
                    tracing::info!(proposed = proposal.rules.len(), "Language-model rules accepted");
                    rules.extend(proposal.rules);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Rule proposal failed; using preset rules only");
                    diagnostics.push(Diagnostic::new(
                        SelectionStage::Filter,
                        format!("rule proposal failed ({}); using preset rules only", e),
                    ));
                }
            }
        }
        rules
    }

    /// Score every selected site and order them for display.
    ///
    /// The selection is only larger than `max_sites` when protected anchors
    /// push it there, and those must all stay ranked.
    fn rank(
        &self,
        visit_order: &[SiteId],
        retrieved: &Retrieved,
        satisfaction: Option<&HashMap<SiteId, f64>>,
        weights: ScoringWeights,
        intent: RequestIntent,
    ) -> Vec<RankedSite> {
        let mut ranked: Vec<RankedSite> = visit_order
            .iter()
            .filter_map(|&site_id| {
                let site = self.table.get(site_id)?;
                let vector_normalized = normalize_text_score(
                    retrieved.text_scores.get(&site_id).copied(),
                    retrieved.range.min,
                    retrieved.range.max,
                );
                let breakdown = self.scoring.breakdown(
                    site_id,
                    FinalScoreInputs {
                        vector_normalized,
                        satisfaction: satisfaction.and_then(|s| s.get(&site_id).copied()),
                        weights,
                        vector_weight: self.config.blend_w_vector,
                    },
                );
                Some(RankedSite {
                    rank: 0,
                    site_id,
                    name: site.name.clone(),
                    lon: site.lon,
                    lat: site.lat,
                    breakdown,
                })
            })
            .collect();

        if intent.prioritize_traffic && self.table.has_column(columns::TRAFFIC_SCORE) {
            let traffic = |r: &RankedSite| {
                self.table
                    .get(r.site_id)
                    .and_then(|s| s.traffic_score())
                    .map(|t| t.clamp(0.0, 10.0))
                    .unwrap_or(f64::NEG_INFINITY)
            };
            ranked.sort_by(|a, b| traffic(b).total_cmp(&traffic(a)));
        } else {
            ranked.sort_by(|a, b| b.breakdown.final_score.total_cmp(&a.breakdown.final_score));
        }

        for (position, site) in ranked.iter_mut().enumerate() {
            site.rank = position + 1;
        }
        ranked
    }

    async fn narrate(
        &self,
        requirements: &RequirementSet,
        ranked: &[RankedSite],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Narration {
        let Some(model) = self.language_model.as_ref().filter(|_| self.config.enable_narration) else {
            return Narration::Skipped;
        };
        if ranked.is_empty() {
            return Narration::Skipped;
        }

        let request = narration::narration_request(requirements, &self.table, ranked, self.config.max_sites);
        match model.narrate(&request).await {
            Ok(narrative) => Narration::Complete {
                narrative: narration::enrich(narrative, &self.table, ranked),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Narration failed");
                diagnostics.push(Diagnostic::new(SelectionStage::Done, format!("narration failed: {}", e)));
                Narration::Failed { reason: e.to_string() }
            }
        }
    }
}
