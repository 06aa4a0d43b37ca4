// 📂 Observations - CSV loading
// One row per (region, category, year) with a numeric value

use crate::config::ColumnMapping;
use crate::error::DataLoadError;
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub region_name: String,
    pub category: String,
    pub year: i32,
    pub value: f64,
}

impl Observation {
    pub fn new(region_name: impl Into<String>, category: impl Into<String>, year: i32, value: f64) -> Self {
        Observation {
            region_name: region_name.into(),
            category: category.into(),
            year,
            value,
        }
    }
}

// ============================================================================
// COLUMN LOOKUP
// ============================================================================

/// Header positions of the configured columns
#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    region: usize,
    category: usize,
    year: usize,
    value: usize,
}

impl ColumnIndex {
    fn resolve(headers: &StringRecord, columns: &ColumnMapping, path: &Path) -> Result<Self, DataLoadError> {
        let first = if columns.skip_leading_column { 1 } else { 0 };

        let find = |name: &str| {
            headers
                .iter()
                .enumerate()
                .skip(first)
                .find(|(_, h)| h.trim() == name)
                .map(|(i, _)| i)
                .ok_or_else(|| DataLoadError::malformed(path, format!("missing column '{}'", name)))
        };

        Ok(ColumnIndex {
            region: find(&columns.region)?,
            category: find(&columns.category)?,
            year: find(&columns.year)?,
            value: find(&columns.value)?,
        })
    }
}

// ============================================================================
// FIELD PARSING
// ============================================================================

/// Years exported through a float column come out as "2020.0"
fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Ok(year) = raw.parse::<i32>() {
        return Some(year);
    }

    let value = raw.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
        Some(value as i32)
    } else {
        None
    }
}

fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// LOADER
// ============================================================================

/// Load observations from a delimited file.
///
/// The whole file is validated before anything is returned: on error the
/// caller gets no observations at all, never a truncated set.
pub fn load_observations(path: &Path, columns: &ColumnMapping) -> Result<Vec<Observation>, DataLoadError> {
    let bytes = fs::read(path).map_err(|e| DataLoadError::from_io(path, e))?;
    parse_observations(&bytes, path, columns)
}

/// Parse observations from file contents already in memory.
///
/// `path` only labels errors and log events.
pub fn parse_observations(
    bytes: &[u8],
    path: &Path,
    columns: &ColumnMapping,
) -> Result<Vec<Observation>, DataLoadError> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| DataLoadError::malformed(path, format!("failed to read header: {}", e)))?
        .clone();
    let index = ColumnIndex::resolve(&headers, columns, path)?;

    let mut observations = Vec::new();
    let mut seen = HashSet::new();

    for (line_num, result) in reader.records().enumerate() {
        // +2: 1-indexed and the header row
        let line = line_num + 2;
        let record = result.map_err(|e| DataLoadError::malformed(path, format!("line {}: {}", line, e)))?;

        let field = |i: usize, name: &str| {
            record
                .get(i)
                .ok_or_else(|| DataLoadError::malformed(path, format!("line {}: missing '{}' field", line, name)))
        };

        let region_name = field(index.region, &columns.region)?.trim().to_string();
        let category = field(index.category, &columns.category)?.trim().to_string();

        let raw_year = field(index.year, &columns.year)?;
        let year = parse_year(raw_year).ok_or_else(|| {
            DataLoadError::malformed(path, format!("line {}: invalid year '{}'", line, raw_year))
        })?;

        let raw_value = field(index.value, &columns.value)?;
        let value = parse_value(raw_value).ok_or_else(|| {
            DataLoadError::malformed(path, format!("line {}: invalid value '{}'", line, raw_value))
        })?;

        let obs = Observation {
            region_name,
            category,
            year,
            value,
        };

        let key = (obs.region_name.clone(), obs.category.clone(), obs.year);
        if !seen.insert(key) {
            tracing::warn!(
                line,
                region = %obs.region_name,
                category = %obs.category,
                year = obs.year,
                "duplicate observation key"
            );
        }

        observations.push(obs);
    }

    tracing::info!(
        path = %path.display(),
        count = observations.len(),
        "loaded observations"
    );

    Ok(observations)
}

// ============================================================================
// TESTS
// ============================================================================
