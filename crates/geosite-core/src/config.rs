use crate::error::{GeositeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided via CLI argument
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfigSource::Default => "default",
            ConfigSource::File => "file",
            ConfigSource::Environment => "env",
            ConfigSource::Cli => "cli",
        };
        f.write_str(label)
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Prefix of every environment variable read by the configuration
pub const ENV_PREFIX: &str = "GEOSITE_";

/// Credential variable honoured when `GEOSITE_LLM_API_KEY` is unset
pub const FALLBACK_API_KEY_VAR: &str = "DEEPSEEK_API_KEY";

/// Layered configuration for GeoSite
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub dataset_path: ConfigValue<Option<PathBuf>>,
    pub embedding_cache: ConfigValue<Option<PathBuf>>,
    pub embedder: ConfigValue<String>,
    pub embedder_url: ConfigValue<String>,
    pub embedding_dim: ConfigValue<usize>,

    pub llm_enabled: ConfigValue<bool>,
    pub llm_base_url: ConfigValue<String>,
    pub llm_model: ConfigValue<String>,
    pub llm_api_key: ConfigValue<Option<String>>,

    pub min_candidates: ConfigValue<usize>,
    pub max_sites: ConfigValue<usize>,
    pub cluster_threshold_m: ConfigValue<f64>,
    pub min_clusters: ConfigValue<usize>,
    pub min_cluster_size: ConfigValue<usize>,
    pub min_distance_m: ConfigValue<f64>,
    pub blend_w_vector: ConfigValue<f64>,
    pub blend_w_safe: ConfigValue<f64>,
    pub retrieval_concurrency: ConfigValue<usize>,
    pub geohash_precision: ConfigValue<usize>,

    pub enable_safe: ConfigValue<bool>,
    pub enable_struct_filters: ConfigValue<bool>,
    pub enable_llm_constraints: ConfigValue<bool>,
    pub enable_spatial_optimization: ConfigValue<bool>,
    pub enable_route_order: ConfigValue<bool>,
    pub enable_narration: ConfigValue<bool>,
    pub safe_predictions: ConfigValue<Option<PathBuf>>,

    /// District score overrides, file only
    pub districts: ConfigValue<Option<BTreeMap<String, f64>>>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        let d = ConfigSource::Default;
        Self {
            dataset_path: ConfigValue::new(None, d),
            embedding_cache: ConfigValue::new(None, d),
            embedder: ConfigValue::new("ollama:nomic-embed-text".to_string(), d),
            embedder_url: ConfigValue::new("http://localhost:11434".to_string(), d),
            embedding_dim: ConfigValue::new(768, d),

            llm_enabled: ConfigValue::new(true, d),
            llm_base_url: ConfigValue::new("https://api.deepseek.com".to_string(), d),
            llm_model: ConfigValue::new("deepseek-chat".to_string(), d),
            llm_api_key: ConfigValue::new(None, d),

            min_candidates: ConfigValue::new(10, d),
            max_sites: ConfigValue::new(10, d),
            cluster_threshold_m: ConfigValue::new(10_000.0, d),
            min_clusters: ConfigValue::new(2, d),
            min_cluster_size: ConfigValue::new(2, d),
            min_distance_m: ConfigValue::new(0.0, d),
            blend_w_vector: ConfigValue::new(0.5, d),
            blend_w_safe: ConfigValue::new(0.5, d),
            retrieval_concurrency: ConfigValue::new(4, d),
            geohash_precision: ConfigValue::new(12, d),

            enable_safe: ConfigValue::new(false, d),
            enable_struct_filters: ConfigValue::new(false, d),
            enable_llm_constraints: ConfigValue::new(true, d),
            enable_spatial_optimization: ConfigValue::new(false, d),
            enable_route_order: ConfigValue::new(false, d),
            enable_narration: ConfigValue::new(true, d),
            safe_predictions: ConfigValue::new(None, d),

            districts: ConfigValue::new(None, d),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| GeositeError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file: FileConfig = toml::from_str(&content).map_err(|e| GeositeError::ConfigInvalid {
            key: "file".to_string(),
            reason: format!("Failed to parse TOML: {}", e),
        })?;

        let s = ConfigSource::File;
        if let Some(v) = file.dataset_path {
            self.dataset_path.update(Some(v), s);
        }
        if let Some(v) = file.embedding_cache {
            self.embedding_cache.update(Some(v), s);
        }
        if let Some(v) = file.embedder {
            self.embedder.update(v, s);
        }
        if let Some(v) = file.embedder_url {
            self.embedder_url.update(v, s);
        }
        if let Some(v) = file.embedding_dim {
            self.embedding_dim.update(v, s);
        }
        if let Some(v) = file.llm_enabled {
            self.llm_enabled.update(v, s);
        }
        if let Some(v) = file.llm_base_url {
            self.llm_base_url.update(v, s);
        }
        if let Some(v) = file.llm_model {
            self.llm_model.update(v, s);
        }
        if let Some(v) = file.llm_api_key {
            self.llm_api_key.update(Some(v), s);
        }
        if let Some(v) = file.min_candidates {
            self.min_candidates.update(v, s);
        }
        if let Some(v) = file.max_sites {
            self.max_sites.update(v, s);
        }
        if let Some(v) = file.cluster_threshold_m {
            self.cluster_threshold_m.update(v, s);
        }
        if let Some(v) = file.min_clusters {
            self.min_clusters.update(v, s);
        }
        if let Some(v) = file.min_cluster_size {
            self.min_cluster_size.update(v, s);
        }
        if let Some(v) = file.min_distance_m {
            self.min_distance_m.update(v, s);
        }
        if let Some(v) = file.blend_w_vector {
            self.blend_w_vector.update(v, s);
        }
        if let Some(v) = file.blend_w_safe {
            self.blend_w_safe.update(v, s);
        }
        if let Some(v) = file.retrieval_concurrency {
            self.retrieval_concurrency.update(v, s);
        }
        if let Some(v) = file.geohash_precision {
            self.geohash_precision.update(v, s);
        }
        if let Some(v) = file.enable_safe {
            self.enable_safe.update(v, s);
        }
        if let Some(v) = file.enable_struct_filters {
            self.enable_struct_filters.update(v, s);
        }
        if let Some(v) = file.enable_llm_constraints {
            self.enable_llm_constraints.update(v, s);
        }
        if let Some(v) = file.enable_spatial_optimization {
            self.enable_spatial_optimization.update(v, s);
        }
        if let Some(v) = file.enable_route_order {
            self.enable_route_order.update(v, s);
        }
        if let Some(v) = file.enable_narration {
            self.enable_narration.update(v, s);
        }
        if let Some(v) = file.safe_predictions {
            self.safe_predictions.update(Some(v), s);
        }
        if let Some(v) = file.districts {
            self.districts.update(Some(v), s);
        }

        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        let s = ConfigSource::Environment;

        if let Some(v) = env_string("DATASET") {
            self.dataset_path.update(Some(PathBuf::from(v)), s);
        }
        if let Some(v) = env_string("EMBEDDING_CACHE") {
            self.embedding_cache.update(Some(PathBuf::from(v)), s);
        }
        if let Some(v) = env_string("EMBEDDER") {
            self.embedder.update(v, s);
        }
        if let Some(v) = env_string("EMBEDDER_URL") {
            self.embedder_url.update(v, s);
        }
        env_parsed(&mut self.embedding_dim, "EMBEDDING_DIM", "positive integer");
        env_parsed(&mut self.llm_enabled, "LLM_ENABLED", "true or false");
        if let Some(v) = env_string("LLM_BASE_URL") {
            self.llm_base_url.update(v, s);
        }
        if let Some(v) = env_string("LLM_MODEL") {
            self.llm_model.update(v, s);
        }
        let api_key = env_string("LLM_API_KEY").or_else(|| {
            env::var(FALLBACK_API_KEY_VAR).ok().filter(|v| !v.trim().is_empty())
        });
        if let Some(v) = api_key {
            self.llm_api_key.update(Some(v), s);
        }

        env_parsed(&mut self.min_candidates, "MIN_CANDIDATES", "positive integer");
        env_parsed(&mut self.max_sites, "MAX_SITES", "positive integer");
        env_parsed(&mut self.cluster_threshold_m, "CLUSTER_THRESHOLD_M", "distance in meters");
        env_parsed(&mut self.min_clusters, "MIN_CLUSTERS", "positive integer");
        env_parsed(&mut self.min_cluster_size, "MIN_CLUSTER_SIZE", "positive integer");
        env_parsed(&mut self.min_distance_m, "MIN_DISTANCE_M", "distance in meters");
        env_parsed(&mut self.blend_w_vector, "BLEND_W_VECTOR", "weight in [0, 1]");
        env_parsed(&mut self.blend_w_safe, "BLEND_W_SAFE", "weight in [0, 1]");
        env_parsed(&mut self.retrieval_concurrency, "RETRIEVAL_CONCURRENCY", "positive integer");
        env_parsed(&mut self.geohash_precision, "GEOHASH_PRECISION", "integer between 1 and 12");
        env_parsed(&mut self.enable_safe, "ENABLE_SAFE", "true or false");
        env_parsed(&mut self.enable_struct_filters, "ENABLE_STRUCT_FILTERS", "true or false");
        env_parsed(&mut self.enable_llm_constraints, "ENABLE_LLM_CONSTRAINTS", "true or false");
        env_parsed(
            &mut self.enable_spatial_optimization,
            "ENABLE_SPATIAL_OPTIMIZATION",
            "true or false",
        );
        env_parsed(&mut self.enable_route_order, "ENABLE_ROUTE_ORDER", "true or false");
        env_parsed(&mut self.enable_narration, "ENABLE_NARRATION", "true or false");
        if let Some(v) = env_string("SAFE_PREDICTIONS") {
            self.safe_predictions.update(Some(PathBuf::from(v)), s);
        }

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        let s = ConfigSource::Cli;
        if let Some(v) = overrides.dataset_path {
            self.dataset_path.update(Some(v), s);
        }
        if let Some(v) = overrides.embedding_cache {
            self.embedding_cache.update(Some(v), s);
        }
        if let Some(v) = overrides.embedder {
            self.embedder.update(v, s);
        }
        if let Some(v) = overrides.llm_enabled {
            self.llm_enabled.update(v, s);
        }
        if let Some(v) = overrides.max_sites {
            self.max_sites.update(v, s);
        }
        if let Some(v) = overrides.min_candidates {
            self.min_candidates.update(v, s);
        }
        if let Some(v) = overrides.min_distance_m {
            self.min_distance_m.update(v, s);
        }
        if let Some(v) = overrides.enable_struct_filters {
            self.enable_struct_filters.update(v, s);
        }
        if let Some(v) = overrides.enable_spatial_optimization {
            self.enable_spatial_optimization.update(v, s);
        }
        if let Some(v) = overrides.enable_route_order {
            self.enable_route_order.update(v, s);
        }
        if let Some(v) = overrides.enable_safe {
            self.enable_safe.update(v, s);
        }
        if let Some(v) = overrides.enable_narration {
            self.enable_narration.update(v, s);
        }
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        fn path(value: &Option<PathBuf>) -> String {
            value.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(unset)".to_string())
        }

        let mut map = HashMap::new();
        let mut put = |key: &str, value: String, source: ConfigSource| {
            map.insert(key.to_string(), (value, source));
        };

        put("dataset_path", path(&self.dataset_path.value), self.dataset_path.source);
        put("embedding_cache", path(&self.embedding_cache.value), self.embedding_cache.source);
        put("embedder", self.embedder.value.clone(), self.embedder.source);
        put("embedder_url", self.embedder_url.value.clone(), self.embedder_url.source);
        put("embedding_dim", self.embedding_dim.value.to_string(), self.embedding_dim.source);
        put("llm_enabled", self.llm_enabled.value.to_string(), self.llm_enabled.source);
        put("llm_base_url", self.llm_base_url.value.clone(), self.llm_base_url.source);
        put("llm_model", self.llm_model.value.clone(), self.llm_model.source);
        put(
            "llm_api_key",
            if self.llm_api_key.value.is_some() { "(set)" } else { "(unset)" }.to_string(),
            self.llm_api_key.source,
        );
        put("min_candidates", self.min_candidates.value.to_string(), self.min_candidates.source);
        put("max_sites", self.max_sites.value.to_string(), self.max_sites.source);
        put(
            "cluster_threshold_m",
            self.cluster_threshold_m.value.to_string(),
            self.cluster_threshold_m.source,
        );
        put("min_clusters", self.min_clusters.value.to_string(), self.min_clusters.source);
        put("min_cluster_size", self.min_cluster_size.value.to_string(), self.min_cluster_size.source);
        put("min_distance_m", self.min_distance_m.value.to_string(), self.min_distance_m.source);
        put("blend_w_vector", self.blend_w_vector.value.to_string(), self.blend_w_vector.source);
        put("blend_w_safe", self.blend_w_safe.value.to_string(), self.blend_w_safe.source);
        put(
            "retrieval_concurrency",
            self.retrieval_concurrency.value.to_string(),
            self.retrieval_concurrency.source,
        );
        put(
            "geohash_precision",
            self.geohash_precision.value.to_string(),
            self.geohash_precision.source,
        );
        put("enable_safe", self.enable_safe.value.to_string(), self.enable_safe.source);
        put(
            "enable_struct_filters",
            self.enable_struct_filters.value.to_string(),
            self.enable_struct_filters.source,
        );
        put(
            "enable_llm_constraints",
            self.enable_llm_constraints.value.to_string(),
            self.enable_llm_constraints.source,
        );
        put(
            "enable_spatial_optimization",
            self.enable_spatial_optimization.value.to_string(),
            self.enable_spatial_optimization.source,
        );
        put(
            "enable_route_order",
            self.enable_route_order.value.to_string(),
            self.enable_route_order.source,
        );
        put("enable_narration", self.enable_narration.value.to_string(), self.enable_narration.source);
        put("safe_predictions", path(&self.safe_predictions.value), self.safe_predictions.source);
        put(
            "districts",
            self.districts
                .value
                .as_ref()
                .map(|d| format!("{} entries", d.len()))
                .unwrap_or_else(|| "(built-in)".to_string()),
            self.districts.source,
        );

        map
    }

    /// Validate and freeze into the per-run context
    pub fn resolve(&self) -> Result<SelectionConfig> {
        let dataset_path = self.dataset_path.value.clone().ok_or_else(|| GeositeError::ConfigMissing {
            key: "dataset_path".to_string(),
        })?;

        let llm = if self.llm_enabled.value {
            let api_key = self.llm_api_key.value.clone().ok_or_else(|| GeositeError::ConfigMissing {
                key: "llm_api_key".to_string(),
            })?;
            Some(LlmSettings {
                base_url: self.llm_base_url.value.clone(),
                model: self.llm_model.value.clone(),
                api_key,
            })
        } else {
            None
        };

        let (provider, model) = parse_embedder_spec(&self.embedder.value)?;

        check_range("max_sites", self.max_sites.value as f64, 1.0, f64::MAX)?;
        check_range("min_candidates", self.min_candidates.value as f64, 1.0, f64::MAX)?;
        check_range("embedding_dim", self.embedding_dim.value as f64, 1.0, f64::MAX)?;
        check_range("retrieval_concurrency", self.retrieval_concurrency.value as f64, 1.0, f64::MAX)?;
        check_range("geohash_precision", self.geohash_precision.value as f64, 1.0, 12.0)?;
        check_range("blend_w_vector", self.blend_w_vector.value, 0.0, 1.0)?;
        check_range("blend_w_safe", self.blend_w_safe.value, 0.0, 1.0)?;
        check_range("min_distance_m", self.min_distance_m.value, 0.0, f64::MAX)?;
        check_range("cluster_threshold_m", self.cluster_threshold_m.value, 0.0, f64::MAX)?;

        let llm_constraints = self.enable_llm_constraints.value && llm.is_some();
        if self.enable_llm_constraints.value && llm.is_none() && self.enable_struct_filters.value {
            tracing::warn!("Language-model rule proposal disabled: no language model configured");
        }

        let embedding_cache = self
            .embedding_cache
            .value
            .clone()
            .unwrap_or_else(|| default_cache_path(&dataset_path));

        Ok(SelectionConfig {
            dataset_path,
            embedding_cache,
            embedder: EmbedderSettings {
                provider,
                model,
                url: self.embedder_url.value.clone(),
                dimensions: self.embedding_dim.value,
            },
            llm,
            min_candidates: self.min_candidates.value,
            max_sites: self.max_sites.value,
            cluster_threshold_m: self.cluster_threshold_m.value,
            min_clusters: self.min_clusters.value,
            min_cluster_size: self.min_cluster_size.value,
            min_distance_m: self.min_distance_m.value,
            blend_w_vector: self.blend_w_vector.value,
            blend_w_safe: self.blend_w_safe.value,
            retrieval_concurrency: self.retrieval_concurrency.value,
            geohash_precision: self.geohash_precision.value,
            enable_safe: self.enable_safe.value,
            enable_struct_filters: self.enable_struct_filters.value,
            enable_llm_constraints: llm_constraints,
            enable_spatial_optimization: self.enable_spatial_optimization.value,
            enable_route_order: self.enable_route_order.value,
            enable_narration: self.enable_narration.value,
            safe_predictions: self.safe_predictions.value.clone(),
            districts: self.districts.value.clone(),
        })
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Default, Deserialize, Serialize)]
struct FileConfig {
    dataset_path: Option<PathBuf>,
    embedding_cache: Option<PathBuf>,
    embedder: Option<String>,
    embedder_url: Option<String>,
    embedding_dim: Option<usize>,
    llm_enabled: Option<bool>,
    llm_base_url: Option<String>,
    llm_model: Option<String>,
    llm_api_key: Option<String>,
    min_candidates: Option<usize>,
    max_sites: Option<usize>,
    cluster_threshold_m: Option<f64>,
    min_clusters: Option<usize>,
    min_cluster_size: Option<usize>,
    min_distance_m: Option<f64>,
    blend_w_vector: Option<f64>,
    blend_w_safe: Option<f64>,
    retrieval_concurrency: Option<usize>,
    geohash_precision: Option<usize>,
    enable_safe: Option<bool>,
    enable_struct_filters: Option<bool>,
    enable_llm_constraints: Option<bool>,
    enable_spatial_optimization: Option<bool>,
    enable_route_order: Option<bool>,
    enable_narration: Option<bool>,
    safe_predictions: Option<PathBuf>,
    districts: Option<BTreeMap<String, f64>>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub dataset_path: Option<PathBuf>,
    pub embedding_cache: Option<PathBuf>,
    pub embedder: Option<String>,
    pub llm_enabled: Option<bool>,
    pub max_sites: Option<usize>,
    pub min_candidates: Option<usize>,
    pub min_distance_m: Option<f64>,
    pub enable_struct_filters: Option<bool>,
    pub enable_spatial_optimization: Option<bool>,
    pub enable_route_order: Option<bool>,
    pub enable_safe: Option<bool>,
    pub enable_narration: Option<bool>,
}

/// Embedding provider settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedderSettings {
    pub provider: String,
    pub model: String,
    pub url: String,
    pub dimensions: usize,
}

/// Language-model client settings
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

/// Immutable per-run configuration, resolved once before retrieval
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    pub dataset_path: PathBuf,
    pub embedding_cache: PathBuf,
    pub embedder: EmbedderSettings,

    /// `None` when the language-model client is disabled
    pub llm: Option<LlmSettings>,

    pub min_candidates: usize,
    pub max_sites: usize,
    pub cluster_threshold_m: f64,
    pub min_clusters: usize,
    pub min_cluster_size: usize,
    pub min_distance_m: f64,
    pub blend_w_vector: f64,
    pub blend_w_safe: f64,
    pub retrieval_concurrency: usize,
    pub geohash_precision: usize,
    pub enable_safe: bool,
    pub enable_struct_filters: bool,
    pub enable_llm_constraints: bool,
    pub enable_spatial_optimization: bool,
    pub enable_route_order: bool,
    pub enable_narration: bool,
    pub safe_predictions: Option<PathBuf>,
    pub districts: Option<BTreeMap<String, f64>>,
}

impl SelectionConfig {
    /// Defaults for a dataset, with the language-model client disabled
    pub fn for_dataset(dataset_path: impl Into<PathBuf>) -> Self {
        let d = LayeredConfig::with_defaults();
        let dataset_path = dataset_path.into();
        Self {
            embedding_cache: default_cache_path(&dataset_path),
            dataset_path,
            embedder: EmbedderSettings {
                provider: "ollama".to_string(),
                model: "nomic-embed-text".to_string(),
                url: d.embedder_url.value,
                dimensions: d.embedding_dim.value,
            },
            llm: None,
            min_candidates: d.min_candidates.value,
            max_sites: d.max_sites.value,
            cluster_threshold_m: d.cluster_threshold_m.value,
            min_clusters: d.min_clusters.value,
            min_cluster_size: d.min_cluster_size.value,
            min_distance_m: d.min_distance_m.value,
            blend_w_vector: d.blend_w_vector.value,
            blend_w_safe: d.blend_w_safe.value,
            retrieval_concurrency: d.retrieval_concurrency.value,
            geohash_precision: d.geohash_precision.value,
            enable_safe: d.enable_safe.value,
            enable_struct_filters: d.enable_struct_filters.value,
            enable_llm_constraints: false,
            enable_spatial_optimization: d.enable_spatial_optimization.value,
            enable_route_order: d.enable_route_order.value,
            enable_narration: false,
            safe_predictions: None,
            districts: None,
        }
    }
}

/// Split `provider:model` into its parts
pub fn parse_embedder_spec(spec: &str) -> Result<(String, String)> {
    match spec.split_once(':') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
            Ok((provider.to_string(), model.to_string()))
        }
        _ => Err(GeositeError::ConfigInvalid {
            key: "embedder".to_string(),
            reason: format!("Invalid embedder '{}'. Use provider:model, e.g. ollama:nomic-embed-text", spec),
        }),
    }
}

/// Embedding cache stored next to the dataset
pub fn default_cache_path(dataset_path: &Path) -> PathBuf {
    dataset_path.with_extension("embeddings.json")
}

fn check_range(key: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(GeositeError::ConfigInvalid {
            key: key.to_string(),
            reason: format!("{} is outside [{}, {}]", value, min, max),
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(format!("{}{}", ENV_PREFIX, key)).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: FromStr>(slot: &mut ConfigValue<T>, key: &str, expected: &str) {
    if let Some(raw) = env_string(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => slot.update(value, ConfigSource::Environment),
            Err(_) => tracing::warn!(
                "Invalid {}{} value '{}': expected {}",
                ENV_PREFIX,
                key,
                raw,
                expected
            ),
        }
    }
}
