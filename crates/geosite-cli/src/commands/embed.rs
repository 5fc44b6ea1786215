//! Embed command implementation

use crate::cli::EmbedArgs;
use crate::config::load_with_overrides;
use crate::output::OutputWriter;
use crate::output_types::EmbedOutput;
use anyhow::{Context, Result};
use geosite_core::config::CliConfigOverrides;
use geosite_retrieval::SelectionPipeline;
use std::path::Path;

pub async fn execute(args: EmbedArgs, output: &OutputWriter, config_path: Option<&Path>) -> Result<()> {
    // Embedding never talks to the language model
    let overrides = CliConfigOverrides {
        dataset_path: args.dataset,
        embedder: args.embedder,
        llm_enabled: Some(false),
        ..Default::default()
    };
    let config = load_with_overrides(config_path, overrides)?
        .resolve()
        .context("Invalid configuration")?;

    let embedder = format!("{}:{}", config.embedder.provider, config.embedder.model);
    let dataset = config.dataset_path.display().to_string();
    let cache = config.embedding_cache.display().to_string();

    output.section("Embedding Sites");
    output.kv("Dataset", &dataset);
    output.kv("Embedder", &embedder);

    let pipeline = SelectionPipeline::from_config(config).context("Failed to load the dataset")?;
    let sites = pipeline.table().len();
    let embedding_dim = pipeline
        .rebuild_embeddings()
        .await
        .context("Failed to embed site contexts")?;

    if output.is_json() {
        return output.result(EmbedOutput {
            dataset,
            cache,
            sites,
            embedding_dim,
            embedder,
        });
    }

    output.kv("Sites", sites);
    output.kv("Dimensions", embedding_dim);
    output.success(format!("Embedding cache written to {}", cache));
    Ok(())
}
