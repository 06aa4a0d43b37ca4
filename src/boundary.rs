// 🧭 Geo Boundaries - Zipped GeoJSON loading and the choropleth join
//
// The boundary archive holds a single GeoJSON FeatureCollection. Geometry
// is kept as opaque JSON: nothing here needs coordinates, it is re-emitted
// unchanged for the renderer.

use crate::change::EnrichedObservation;
use crate::error::DataLoadError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use zip::ZipArchive;

// ============================================================================
// BOUNDARY RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoBoundary {
    /// Official region name, the join key
    pub official_name: String,

    /// GeoJSON geometry object (Polygon / MultiPolygon)
    pub geometry: Value,

    /// Remaining feature properties, untouched
    pub properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Option<Value>,
}

// ============================================================================
// LOADING
// ============================================================================

fn is_geojson_member(name: &str) -> bool {
    let lower = name.to_lowercase();
    !lower.ends_with('/') && (lower.ends_with(".json") || lower.ends_with(".geojson"))
}

/// Read boundaries from a ZIP archive.
///
/// `member` names the GeoJSON entry; `None` (or an empty name) picks the
/// first `.json`/`.geojson` entry. The official name is read from the
/// `name_property` of each feature.
pub fn load_boundaries(
    archive_path: &Path,
    member: Option<&str>,
    name_property: &str,
) -> Result<Vec<GeoBoundary>, DataLoadError> {
    let file = File::open(archive_path).map_err(|e| DataLoadError::from_io(archive_path, e))?;

    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| DataLoadError::malformed(archive_path, format!("not a valid zip archive: {}", e)))?;

    let member_name = match member.filter(|m| !m.trim().is_empty()) {
        Some(name) => name.to_string(),
        None => archive
            .file_names()
            .find(|n| is_geojson_member(n))
            .map(str::to_string)
            .ok_or_else(|| DataLoadError::malformed(archive_path, "archive contains no GeoJSON member"))?,
    };

    let entry = archive.by_name(&member_name).map_err(|e| {
        DataLoadError::malformed(archive_path, format!("cannot open member '{}': {}", member_name, e))
    })?;

    let collection: FeatureCollection = serde_json::from_reader(BufReader::new(entry)).map_err(|e| {
        DataLoadError::malformed(archive_path, format!("invalid GeoJSON in '{}': {}", member_name, e))
    })?;

    if collection.kind != "FeatureCollection" {
        return Err(DataLoadError::malformed(
            archive_path,
            format!("expected a FeatureCollection, found '{}'", collection.kind),
        ));
    }

    let mut boundaries = Vec::with_capacity(collection.features.len());

    for (i, feature) in collection.features.into_iter().enumerate() {
        let mut properties = feature.properties.unwrap_or_default();

        let official_name = match properties.remove(name_property) {
            Some(Value::String(name)) => name,
            _ => {
                return Err(DataLoadError::malformed(
                    archive_path,
                    format!("feature {} has no string property '{}'", i, name_property),
                ))
            }
        };

        boundaries.push(GeoBoundary {
            official_name,
            geometry: feature.geometry.unwrap_or(Value::Null),
            properties,
        });
    }

    tracing::info!(
        archive = %archive_path.display(),
        member = %member_name,
        count = boundaries.len(),
        "loaded boundaries"
    );

    Ok(boundaries)
}

// ============================================================================
// JOIN
// ============================================================================

/// A boundary with the value shown on the map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedBoundary<'a> {
    pub boundary: &'a GeoBoundary,

    /// Zero when no observation matched (display fill, not a real zero)
    pub value: f64,

    pub pct_change: Option<f64>,

    pub matched: bool,
}

/// Left-join boundaries to observations on the canonical region name.
///
/// Every boundary appears exactly once in the output, in input order. If
/// several observations share a name, the first one wins.
pub fn join_to_geometry<'a>(
    observations: &[EnrichedObservation],
    boundaries: &'a [GeoBoundary],
) -> Vec<JoinedBoundary<'a>> {
    let mut by_region: HashMap<&str, &EnrichedObservation> = HashMap::new();
    for obs in observations {
        by_region.entry(obs.region_name()).or_insert(obs);
    }

    boundaries
        .iter()
        .map(|boundary| match by_region.get(boundary.official_name.as_str()) {
            Some(obs) => JoinedBoundary {
                boundary,
                value: obs.value(),
                pct_change: obs.pct_change_from_prior_year,
                matched: true,
            },
            None => JoinedBoundary {
                boundary,
                value: 0.0,
                pct_change: None,
                matched: false,
            },
        })
        .collect()
}

/// Observation regions that match no boundary, sorted
pub fn unmatched_regions(observations: &[EnrichedObservation], boundaries: &[GeoBoundary]) -> Vec<String> {
    let names: HashSet<&str> = boundaries.iter().map(|b| b.official_name.as_str()).collect();

    observations
        .iter()
        .map(|o| o.region_name())
        .filter(|r| !names.contains(r))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Joined map as a GeoJSON FeatureCollection for the renderer
pub fn to_feature_collection(joined: &[JoinedBoundary<'_>], name_property: &str) -> Value {
    let features: Vec<Value> = joined
        .iter()
        .map(|j| {
            let mut properties = j.boundary.properties.clone();
            properties.insert(name_property.to_string(), json!(j.boundary.official_name));
            properties.insert("name".to_string(), json!(j.boundary.official_name));
            properties.insert("value".to_string(), json!(j.value));
            properties.insert("pct_change".to_string(), json!(j.pct_change));
            properties.insert("matched".to_string(), json!(j.matched));

            json!({
                "type": "Feature",
                "properties": properties,
                "geometry": j.boundary.geometry,
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

// ============================================================================
// TESTS
// ============================================================================
