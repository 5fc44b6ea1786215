use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// GeoSite - Requirement-driven land parcel selection
#[derive(Parser, Debug)]
#[command(name = "geosite")]
#[command(about = "Requirement-driven land parcel selection", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to ./geosite.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Select and rank sites for a natural-language request
    Select(SelectArgs),

    /// Build or refresh the embedding cache of the dataset
    Embed(EmbedArgs),

    /// Show resolved configuration values and their sources
    Config,
}

#[derive(Parser, Debug)]
pub struct SelectArgs {
    /// The request text, e.g. "近地铁的商业用地，预算有限"
    pub request: String,

    /// Site dataset (JSON array of rows)
    #[arg(long, value_name = "PATH")]
    pub dataset: Option<PathBuf>,

    /// Maximum number of sites to return
    #[arg(long, value_name = "N")]
    pub max_sites: Option<usize>,

    /// Cluster candidates before selecting
    #[arg(long)]
    pub spatial: bool,

    /// Order the selection into a visit route
    #[arg(long)]
    pub route: bool,

    /// Minimum distance between selected sites in meters
    #[arg(long, value_name = "M")]
    pub min_distance: Option<f64>,

    /// Evaluate structural rules derived from hard constraints
    #[arg(long)]
    pub struct_filters: bool,

    /// Skip the narration step
    #[arg(long)]
    pub no_narrate: bool,

    /// Run without the language-model client
    #[arg(long)]
    pub no_llm: bool,

    /// Site that must appear in the selection (repeatable)
    #[arg(long = "anchor", value_name = "ID")]
    pub anchors: Vec<u64>,
}

#[derive(Parser, Debug)]
pub struct EmbedArgs {
    /// Site dataset (JSON array of rows)
    #[arg(long, value_name = "PATH")]
    pub dataset: Option<PathBuf>,

    /// Embedder to use (e.g., "ollama:nomic-embed-text")
    #[arg(long)]
    pub embedder: Option<String>,
}
