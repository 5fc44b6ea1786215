//! Site table with load-time schema normalization.
//!
//! Source rows arrive as loosely-typed JSON objects. Normalization happens once:
//! known source headers are renamed to canonical columns, and the built-in
//! columns that a source lacks (`id`, `name`, `address`, `desc`, `context`, `x`,
//! `y`) are synthesized deterministically from the columns that are present.

use crate::error::{GeositeError, Result};
use crate::models::site::{cell_number, cell_text, columns, Site, SiteId};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

/// Meters per degree of longitude at the equator
const METERS_PER_DEG_LON: f64 = 111_320.0;

/// Meters per degree of latitude
const METERS_PER_DEG_LAT: f64 = 110_540.0;

/// Source header aliases mapped to canonical column names
const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("经度", columns::LON),
    ("longitude", columns::LON),
    ("lng", columns::LON),
    ("纬度", columns::LAT),
    ("latitude", columns::LAT),
    ("宗地坐落", columns::PARCEL_LOCATION),
    ("土地用途", columns::LAND_USE),
    ("宗地面积(平方米)", columns::AREA_M2),
    ("挂牌起始价(万元)", columns::LISTING_PRICE),
    ("价格_万元/㎡", columns::PRICE_PER_M2),
    ("交通_便利评分(0-10)", columns::TRAFFIC_SCORE),
    ("交通_地铁数量(1.5km)", columns::SUBWAY_COUNT),
    ("交通_地铁最近距离(m)", columns::SUBWAY_NEAREST),
    ("交通_公交数量(0.5km)", columns::BUS_COUNT),
    ("交通_公交最近距离(m)", columns::BUS_NEAREST),
    ("交通_火车数量(3km)", columns::TRAIN_COUNT),
    ("交通_火车最近距离(m)", columns::TRAIN_NEAREST),
    ("交通_停车数量(1km)", columns::PARKING_COUNT),
    ("交通_停车最近距离(m)", columns::PARKING_NEAREST),
];

/// Immutable, normalized table of sites for one selection run
#[derive(Debug, Clone)]
pub struct SiteTable {
    sites: Vec<Site>,
    columns: Vec<String>,
    rows_by_id: HashMap<SiteId, usize>,
}

impl SiteTable {
    /// Build a table from already-normalized sites
    pub fn new(sites: Vec<Site>) -> Result<Self> {
        let mut rows_by_id = HashMap::with_capacity(sites.len());
        let mut extra_columns = BTreeSet::new();

        for (row, site) in sites.iter().enumerate() {
            if rows_by_id.insert(site.id, row).is_some() {
                return Err(GeositeError::DatasetInvalid {
                    reason: format!("duplicate site id {}", site.id),
                });
            }
            extra_columns.extend(site.attributes.keys().cloned());
        }

        let mut all_columns: Vec<String> = columns::BUILTIN.iter().map(|c| c.to_string()).collect();
        all_columns.extend(extra_columns);

        Ok(Self { sites, columns: all_columns, rows_by_id })
    }

    /// Normalize raw source rows into a table
    pub fn from_records(records: Vec<Map<String, Value>>) -> Result<Self> {
        let mut sites = Vec::with_capacity(records.len());
        let mut skipped = 0usize;
        for (row, record) in records.into_iter().enumerate() {
            match normalize_record(row, record) {
                Ok(site) => sites.push(site),
                Err(e) => {
                    tracing::warn!(row, error = %e, "Skipping unusable site record");
                    skipped += 1;
                }
            }
        }

        if sites.is_empty() && skipped > 0 {
            return Err(GeositeError::DatasetInvalid {
                reason: format!("none of the {} rows has usable coordinates", skipped),
            });
        }

        tracing::info!(rows = sites.len(), skipped, "Normalized site records");
        Self::new(sites)
    }

    /// Load a JSON array of row objects from disk
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GeositeError::DatasetNotFound { path: path.to_path_buf() });
        }

        let content = fs::read_to_string(path)?;
        let records: Vec<Map<String, Value>> =
            serde_json::from_str(&content).map_err(|e| GeositeError::DatasetInvalid {
                reason: format!("{} is not a JSON array of objects: {}", path.display(), e),
            })?;

        Self::from_records(records)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn get(&self, id: SiteId) -> Option<&Site> {
        self.rows_by_id.get(&id).map(|&row| &self.sites[row])
    }

    /// Row index of a site, aligned with the embedding matrix
    pub fn row_of(&self, id: SiteId) -> Option<usize> {
        self.rows_by_id.get(&id).copied()
    }

    pub fn site_at(&self, row: usize) -> Option<&Site> {
        self.sites.get(row)
    }

    /// Embedding input text per row
    pub fn contexts(&self) -> Vec<&str> {
        self.sites.iter().map(|s| s.context.as_str()).collect()
    }

    /// Finite values of a numeric column, in row order
    pub fn numeric_values(&self, column: &str) -> Vec<f64> {
        self.sites.iter().filter_map(|s| s.number(column)).collect()
    }

    /// Observed (min, max) of a numeric column
    pub fn numeric_range(&self, column: &str) -> Option<(f64, f64)> {
        let values = self.numeric_values(column);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min.is_finite() && max.is_finite()).then_some((min, max))
    }

    /// Linear-interpolated quantile of a numeric column
    pub fn quantile(&self, column: &str, q: f64) -> Option<f64> {
        let mut values = self.numeric_values(column);
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.total_cmp(b));

        let position = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        let fraction = position - lower as f64;
        Some(values[lower] + (values[upper] - values[lower]) * fraction)
    }

    /// First `limit` non-empty values per column, for rule-proposal prompts
    pub fn sample_values(&self, limit: usize) -> BTreeMap<String, Vec<String>> {
        self.columns
            .iter()
            .map(|column| {
                let samples = self
                    .sites
                    .iter()
                    .take(limit)
                    .map(|s| s.text(column))
                    .filter(|v| !v.is_empty())
                    .collect();
                (column.clone(), samples)
            })
            .collect()
    }

    /// Deterministic key over the embedded content, used to validate caches
    pub fn content_key(&self) -> String {
        let mut hasher = Sha256::new();
        for site in &self.sites {
            hasher.update(site.id.0.to_le_bytes());
            hasher.update((site.context.len() as u64).to_le_bytes());
            hasher.update(site.context.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Apply aliases and synthesize the built-in columns for one source row
fn normalize_record(row: usize, record: Map<String, Value>) -> Result<Site> {
    let mut cells: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in record {
        cells.insert(key, value);
    }
    for (alias, canonical) in COLUMN_ALIASES {
        if !cells.contains_key(*canonical) {
            if let Some(value) = cells.remove(*alias) {
                cells.insert(canonical.to_string(), value);
            }
        }
    }

    let coordinate = |cells: &BTreeMap<String, Value>, column: &str| -> Result<f64> {
        cells.get(column).and_then(cell_number).ok_or_else(|| GeositeError::DatasetInvalid {
            reason: format!("row {} has no usable '{}' coordinate", row, column),
        })
    };
    let lon = coordinate(&cells, columns::LON)?;
    let lat = coordinate(&cells, columns::LAT)?;

    let take_text = |cells: &mut BTreeMap<String, Value>, column: &str| -> Option<String> {
        cells.remove(column).map(|v| cell_text(&v)).filter(|s| !s.trim().is_empty())
    };

    let id = cells
        .remove(columns::ID)
        .as_ref()
        .and_then(cell_number)
        .filter(|n| *n >= 0.0 && n.fract() == 0.0)
        .map(|n| SiteId(n as u64))
        .unwrap_or(SiteId(row as u64));

    let location = cells.get(columns::PARCEL_LOCATION).map(cell_text).filter(|s| !s.is_empty());
    let name = take_text(&mut cells, columns::NAME)
        .or_else(|| location.clone())
        .unwrap_or_else(|| row.to_string());
    let address = take_text(&mut cells, columns::ADDRESS)
        .or(location)
        .unwrap_or_else(|| name.clone());

    let desc = take_text(&mut cells, columns::DESC).unwrap_or_else(|| {
        let field = |column: &str| cells.get(column).map(cell_text).unwrap_or_default();
        format!(
            "用途:{}，面积:{}㎡，起始价:{}万元",
            field(columns::LAND_USE),
            field(columns::AREA_M2),
            field(columns::LISTING_PRICE)
        )
        .trim()
        .to_string()
    });
    let context = take_text(&mut cells, columns::CONTEXT)
        .unwrap_or_else(|| format!("{}，地址是{}，{}", name, address, desc));

    let projected_x = cells.remove(columns::X).as_ref().and_then(cell_number);
    let projected_y = cells.remove(columns::Y).as_ref().and_then(cell_number);
    let (x, y) = match (projected_x, projected_y) {
        (Some(x), Some(y)) => (x, y),
        _ => project(lon, lat),
    };

    cells.remove(columns::LON);
    cells.remove(columns::LAT);

    Ok(Site { id, name, address, lon, lat, x, y, desc, context, attributes: cells })
}

/// Approximate planar projection in meters
pub fn project(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon * METERS_PER_DEG_LON * lat.to_radians().cos();
    let y = lat * METERS_PER_DEG_LAT;
    (x, y)
}
