//! Embedding matrix over the site table and cosine top-k retrieval.
//!
//! The matrix is aligned by row with the [`SiteTable`]. It is loaded from an
//! on-disk cache when the cache matches the table content, the embedding model
//! and is internally consistent; otherwise it is recomputed and the cache is
//! overwritten. A query vector whose length disagrees with the matrix forces a
//! full recompute before the query proceeds.

use geosite_core::error::{GeositeError, Result};
use geosite_core::models::{sort_by_score_desc, SiteId, SiteScore, SiteTable};
use geosite_llm::ports::Embedder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Texts sent to the embedder per request
const DEFAULT_BATCH_SIZE: usize = 32;

/// On-disk cache layout
#[derive(Debug, Serialize, Deserialize)]
struct EmbeddingCache {
    content_key: String,
    model: String,
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
}

/// Row-aligned embedding vectors of one dimensionality
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    vectors: Vec<Vec<f32>>,
    dimensions: usize,
}

impl EmbeddingMatrix {
    /// Build a matrix; every row must have the same non-zero length
    pub fn new(vectors: Vec<Vec<f32>>) -> Result<Self> {
        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        if vectors.iter().any(|v| v.len() != dimensions) {
            return Err(GeositeError::MalformedResponse {
                reason: "embedding rows have differing dimensions".to_string(),
            });
        }
        if !vectors.is_empty() && dimensions == 0 {
            return Err(GeositeError::MalformedResponse {
                reason: "embedding rows are empty".to_string(),
            });
        }
        Ok(Self { vectors, dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Outcome of [`EmbeddingIndex::ensure_loaded`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Already held in memory
    Memory,
    Cache,
    Computed,
}

/// Embedding matrix of a site table with similarity queries
pub struct EmbeddingIndex {
    table: Arc<SiteTable>,
    embedder: Arc<dyn Embedder>,
    cache_path: PathBuf,
    batch_size: usize,
    matrix: RwLock<Option<EmbeddingMatrix>>,
}

impl EmbeddingIndex {
    pub fn new(table: Arc<SiteTable>, embedder: Arc<dyn Embedder>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            table,
            embedder,
            cache_path: cache_path.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            matrix: RwLock::new(None),
        }
    }

    /// Set the number of texts sent per embedding request
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Dimensionality of the loaded matrix, if any
    pub async fn dimensions(&self) -> Option<usize> {
        self.matrix.read().await.as_ref().map(EmbeddingMatrix::dimensions)
    }

    /// Load the matrix from cache, or compute it when the cache is unusable
    pub async fn ensure_loaded(&self) -> Result<LoadSource> {
        if self.matrix.read().await.is_some() {
            return Ok(LoadSource::Memory);
        }

        let mut guard = self.matrix.write().await;
        if guard.is_some() {
            return Ok(LoadSource::Memory);
        }

        if let Some(matrix) = self.read_cache() {
            tracing::info!(
                rows = matrix.len(),
                dimensions = matrix.dimensions(),
                path = %self.cache_path.display(),
                "Loaded embedding cache"
            );
            *guard = Some(matrix);
            return Ok(LoadSource::Cache);
        }

        *guard = Some(self.compute().await?);
        Ok(LoadSource::Computed)
    }

    /// Recompute the whole matrix and overwrite the cache
    pub async fn rebuild(&self) -> Result<usize> {
        let mut guard = self.matrix.write().await;
        let matrix = self.compute().await?;
        let dimensions = matrix.dimensions();
        *guard = Some(matrix);
        Ok(dimensions)
    }

    /// Ranked `(site, similarity)` pairs for a positive text, penalized by an
    /// optional negative text. Any failure yields an empty result.
    pub async fn query(&self, positive: &str, negative: Option<&str>, top_k: usize) -> Vec<SiteScore> {
        match self.try_query(positive, negative, top_k).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(query = %positive, error = %e, "Similarity query failed");
                Vec::new()
            }
        }
    }

    /// Fallible form of [`EmbeddingIndex::query`]
    pub async fn try_query(
        &self,
        positive: &str,
        negative: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<SiteScore>> {
        let query = self.embed_one(positive).await?;
        let negative_query = match negative.map(str::trim).filter(|n| !n.is_empty()) {
            Some(negative) => Some(self.embed_one(negative).await?),
            None => None,
        };
        self.ensure_loaded().await?;
        self.align_dimensions(query.len()).await?;

        // No awaits on the embedder while the read guard is held
        let matrix = self.matrix.read().await;
        let Some(matrix) = matrix.as_ref() else {
            return Ok(Vec::new());
        };

        let mut ranked = top_k_cosine_similarity(&query, matrix.rows(), matrix.len(), None);

        if let Some(negative_query) = negative_query {
            if negative_query.len() != matrix.dimensions() {
                return Err(GeositeError::MalformedResponse {
                    reason: format!(
                        "negative query has {} dimensions, matrix has {}",
                        negative_query.len(),
                        matrix.dimensions()
                    ),
                });
            }

            let rows: Vec<usize> = ranked.iter().map(|(row, _)| *row).collect();
            let penalties = top_k_cosine_similarity(&negative_query, matrix.rows(), rows.len(), Some(&rows));
            ranked = subtract_recentered(ranked, penalties);
        }

        ranked.truncate(top_k);

        let results: Vec<SiteScore> = ranked
            .into_iter()
            .filter_map(|(row, score)| self.table.site_at(row).map(|s| SiteScore::new(s.id, score)))
            .collect();

        tracing::debug!(query = %positive, results = results.len(), "Similarity query");
        Ok(results)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(&[text])
            .await?
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GeositeError::MalformedResponse {
                reason: "embedder returned no vector for the query".to_string(),
            })
    }

    /// Recompute the matrix when the provider's dimensionality changed
    async fn align_dimensions(&self, query_dimensions: usize) -> Result<()> {
        let current = self.dimensions().await;
        if current == Some(query_dimensions) || self.table.is_empty() {
            return Ok(());
        }

        let mut guard = self.matrix.write().await;
        let current = guard.as_ref().map(EmbeddingMatrix::dimensions);
        if current == Some(query_dimensions) {
            return Ok(());
        }

        tracing::warn!(
            matrix = ?current,
            query = query_dimensions,
            "Embedding dimensions changed; re-embedding dataset"
        );
        let matrix = self.compute().await?;
        if matrix.dimensions() != query_dimensions {
            return Err(GeositeError::MalformedResponse {
                reason: format!(
                    "re-embedded matrix has {} dimensions, query has {}",
                    matrix.dimensions(),
                    query_dimensions
                ),
            });
        }
        *guard = Some(matrix);
        Ok(())
    }

    /// Embed every site context in batches and write the cache
    async fn compute(&self) -> Result<EmbeddingMatrix> {
        let contexts = self.table.contexts();
        let total = contexts.len();
        let mut vectors = Vec::with_capacity(total);

        for batch in contexts.chunks(self.batch_size) {
            let embedded = self.embedder.embed(batch).await?;
            if embedded.len() != batch.len() {
                return Err(GeositeError::MalformedResponse {
                    reason: format!("embedder returned {} vectors for {} texts", embedded.len(), batch.len()),
                });
            }
            vectors.extend(embedded);
            tracing::debug!(embedded = vectors.len(), total, "Embedding site contexts");
        }

        let matrix = EmbeddingMatrix::new(vectors)?;
        tracing::info!(
            rows = matrix.len(),
            dimensions = matrix.dimensions(),
            model = self.embedder.model_name(),
            "Computed site embeddings"
        );

        if let Err(e) = self.write_cache(&matrix) {
            tracing::warn!(path = %self.cache_path.display(), error = %e, "Failed to write embedding cache");
        }
        Ok(matrix)
    }

    fn read_cache(&self) -> Option<EmbeddingMatrix> {
        let content = fs::read_to_string(&self.cache_path).ok()?;
        let cache: EmbeddingCache = match serde_json::from_str(&content) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!(path = %self.cache_path.display(), error = %e, "Ignoring unreadable embedding cache");
                return None;
            }
        };

        if cache.content_key != self.table.content_key()
            || cache.model != self.embedder.model_name()
            || cache.vectors.len() != self.table.len()
        {
            tracing::info!(path = %self.cache_path.display(), "Embedding cache is stale");
            return None;
        }

        let matrix = EmbeddingMatrix::new(cache.vectors).ok()?;
        (matrix.is_empty() || matrix.dimensions() == cache.dimensions).then_some(matrix)
    }

    fn write_cache(&self, matrix: &EmbeddingMatrix) -> Result<()> {
        let cache = EmbeddingCache {
            content_key: self.table.content_key(),
            model: self.embedder.model_name().to_string(),
            dimensions: matrix.dimensions(),
            vectors: matrix.rows().to_vec(),
        };

        if let Some(parent) = self.cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.cache_path, serde_json::to_vec(&cache)?)?;
        Ok(())
    }
}

/// Cosine top-k of `query` against `candidates`.
///
/// Returns at most `k` `(row, similarity)` pairs sorted by descending
/// similarity; exact ties keep row order. With `restrict_to`, rows outside the
/// set are never returned. Rows whose length differs from the query are
/// skipped, and zero vectors score 0.
pub fn top_k_cosine_similarity(
    query: &[f32],
    candidates: &[Vec<f32>],
    k: usize,
    restrict_to: Option<&[usize]>,
) -> Vec<(usize, f64)> {
    let query_norm = norm(query);
    let allowed = restrict_to.map(|rows| {
        let mut mask = vec![false; candidates.len()];
        for &row in rows {
            if let Some(slot) = mask.get_mut(row) {
                *slot = true;
            }
        }
        mask
    });

    let mut scored: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .filter(|(row, _)| allowed.as_ref().map_or(true, |mask| mask[*row]))
        .filter(|(_, vector)| vector.len() == query.len())
        .map(|(row, vector)| {
            let denominator = query_norm * norm(vector);
            let similarity = if denominator > 0.0 {
                dot(query, vector) / denominator
            } else {
                0.0
            };
            (row, similarity)
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}

/// Subtract negative similarities row by row, then shift the result back to
/// the mean of the positive similarities and re-rank.
fn subtract_recentered(positive: Vec<(usize, f64)>, negative: Vec<(usize, f64)>) -> Vec<(usize, f64)> {
    if positive.is_empty() {
        return positive;
    }

    let mut positive = positive;
    positive.sort_by_key(|(row, _)| *row);
    let mut negative = negative;
    negative.sort_by_key(|(row, _)| *row);

    let original_mean = mean(positive.iter().map(|(_, s)| *s));
    for ((_, score), (_, penalty)) in positive.iter_mut().zip(negative.iter()) {
        *score -= penalty;
    }
    let shift = original_mean - mean(positive.iter().map(|(_, s)| *s));
    for (_, score) in positive.iter_mut() {
        *score += shift;
    }

    positive.sort_by(|a, b| b.1.total_cmp(&a.1));
    positive
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt()
}

/// Merge per-sub-query results by summing scores per site.
///
/// The result is sorted by descending summed score; ties keep first-seen order
/// across `results`, so the merge does not depend on completion order once the
/// inputs are ordered by sub-query.
pub fn merge_by_site(results: &[Vec<SiteScore>]) -> Vec<SiteScore> {
    let mut merged: Vec<SiteScore> = Vec::new();
    let mut positions: HashMap<SiteId, usize> = HashMap::new();

    for candidate in results.iter().flatten() {
        match positions.get(&candidate.site_id) {
            Some(&i) => merged[i].score += candidate.score,
            None => {
                positions.insert(candidate.site_id, merged.len());
                merged.push(*candidate);
            }
        }
    }

    sort_by_score_desc(&mut merged);
    merged
}
