use serde::Serialize;
use std::collections::BTreeMap;

/// Output for embed command
#[derive(Debug, Serialize)]
pub struct EmbedOutput {
    pub dataset: String,
    pub cache: String,
    pub sites: usize,
    pub embedding_dim: usize,
    pub embedder: String,
}

/// Output for config command
#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    pub values: BTreeMap<String, ConfigEntry>,
}

#[derive(Debug, Serialize)]
pub struct ConfigEntry {
    pub value: String,
    pub source: String,
}
