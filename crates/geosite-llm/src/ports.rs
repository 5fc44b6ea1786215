//! LLM port definitions

use async_trait::async_trait;
use geosite_core::error::Result;
use geosite_core::models::{HardConstraint, NarrationRequest, Narrative, Requirement, RuleProposal};
use std::collections::BTreeMap;

/// Port for embedding text into vector representations
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embeddings for a batch of texts
    ///
    /// # Arguments
    /// * `texts` - Slice of text strings to embed
    ///
    /// # Returns
    /// Vector of embedding vectors, one per input text. The vector length is
    /// whatever the provider currently produces and may differ from
    /// [`Embedder::dimensions`] after a model change.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Get the configured dimensionality of embeddings
    fn dimensions(&self) -> usize;

    /// Get the name/identifier of the embedding model
    fn model_name(&self) -> &str;
}

/// Port for the language-model collaborator
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Decompose a free-text request into structured requirements
    async fn parse(&self, request: &str) -> Result<Vec<Requirement>>;

    /// Map hard constraints onto executable column rules
    ///
    /// # Arguments
    /// * `constraints` - Hard constraints of the request
    /// * `columns` - Column names of the site table
    /// * `samples` - A few example values per column
    async fn propose_rules(
        &self,
        constraints: &[HardConstraint],
        columns: &[String],
        samples: &BTreeMap<String, Vec<String>>,
    ) -> Result<RuleProposal>;

    /// Produce the recommendation narrative for the ordered candidates
    async fn narrate(&self, request: &NarrationRequest) -> Result<Narrative>;
}
