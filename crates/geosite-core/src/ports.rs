//! Port trait definitions
//!
//! These traits define the interfaces that adapters must implement.

use crate::error::{GeositeError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Port for the external per-geo-cell probability source
pub trait ProbabilitySource: Send + Sync {
    /// Probability in [0, 1] for a geo-cell key, or `None` when the cell is unknown
    fn lookup(&self, geo_cell: &str) -> Option<f64>;

    /// Number of known cells
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Probability source backed by an in-memory table
#[derive(Debug, Clone, Default)]
pub struct TableProbabilitySource {
    probabilities: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct PredictionRow {
    geohash: String,
    probability: f64,
}

impl TableProbabilitySource {
    /// Build from `(geo_cell, probability)` pairs; out-of-range values are clamped
    pub fn new(entries: impl IntoIterator<Item = (String, f64)>) -> Self {
        let probabilities = entries
            .into_iter()
            .filter(|(_, p)| p.is_finite())
            .map(|(cell, p)| (cell, p.clamp(0.0, 1.0)))
            .collect();
        Self { probabilities }
    }

    /// Load a JSON array of `{"geohash": ..., "probability": ...}` rows
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            GeositeError::ProbabilitySourceUnavailable {
                reason: format!("cannot read {}: {}", path.display(), e),
            }
        })?;
        let rows: Vec<PredictionRow> = serde_json::from_str(&content).map_err(|e| {
            GeositeError::ProbabilitySourceUnavailable {
                reason: format!("{} is not a prediction table: {}", path.display(), e),
            }
        })?;

        let source = Self::new(rows.into_iter().map(|r| (r.geohash, r.probability)));
        tracing::info!(cells = source.len(), path = %path.display(), "Loaded probability table");
        Ok(source)
    }
}

impl ProbabilitySource for TableProbabilitySource {
    fn lookup(&self, geo_cell: &str) -> Option<f64> {
        self.probabilities.get(geo_cell).copied()
    }

    fn len(&self) -> usize {
        self.probabilities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_table_lookup_clamps() {
        let source = TableProbabilitySource::new(vec![
            ("ws0e".to_string(), 0.4),
            ("ws0f".to_string(), 1.7),
            ("ws0g".to_string(), f64::NAN),
        ]);
        assert_eq!(source.lookup("ws0e"), Some(0.4));
        assert_eq!(source.lookup("ws0f"), Some(1.0));
        assert_eq!(source.lookup("ws0g"), None);
        assert_eq!(source.len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"geohash": "ws0e", "probability": 0.25}}]"#).unwrap();

        let source = TableProbabilitySource::from_json_file(file.path()).unwrap();
        assert_eq!(source.lookup("ws0e"), Some(0.25));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let result = TableProbabilitySource::from_json_file("/nonexistent/predictions.json");
        assert!(matches!(result, Err(GeositeError::ProbabilitySourceUnavailable { .. })));
    }
}
