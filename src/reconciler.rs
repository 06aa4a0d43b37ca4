// ⚖️ Reconciler - One invocation of the pipeline
//
//   load → normalize names → year-over-year change → (per selection)
//   slice → join to boundaries → summary + comparison
//
// Every invocation loads its own Snapshot. Nothing is cached between
// invocations, and a load failure leaves no partial snapshot behind.

use crate::aliases::normalize_region_names;
use crate::boundary::{join_to_geometry, load_boundaries, to_feature_collection, unmatched_regions, GeoBoundary};
use crate::change::{change_matrix, compute_change, ChangeMatrix, EnrichedObservation};
use crate::config::ReconcilerConfig;
use crate::error::{DataLoadError, PipelineError, SelectionError};
use crate::observation::{parse_observations, Observation};
use crate::ranking::{top_k_comparison, ComparisonRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

/// Rows shown in the "top regions" table
pub const TOP_REGIONS: usize = 5;

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Everything one invocation loaded, read-only after construction
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: String,
    pub loaded_at: DateTime<Utc>,

    /// SHA-256 of the tabular input file
    pub source_digest: String,

    pub observations: Vec<EnrichedObservation>,
    pub boundaries: Vec<GeoBoundary>,
}

impl Snapshot {
    /// Build a snapshot from raw observations already in memory
    pub fn from_parts(
        observations: &[Observation],
        boundaries: Vec<GeoBoundary>,
        config: &ReconcilerConfig,
        source_digest: String,
    ) -> Self {
        let normalized = normalize_region_names(observations, &config.aliases);

        Snapshot {
            id: uuid::Uuid::new_v4().to_string(),
            loaded_at: Utc::now(),
            source_digest,
            observations: compute_change(&normalized),
            boundaries,
        }
    }

    /// Distinct years, ascending
    pub fn years(&self) -> Vec<i32> {
        self.observations
            .iter()
            .map(|o| o.year())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct categories in first-appearance order
    pub fn categories(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.observations
            .iter()
            .map(|o| o.category())
            .filter(|c| seen.insert(*c))
            .map(str::to_string)
            .collect()
    }

    pub fn selections(&self) -> Selections {
        Selections {
            years: self.years(),
            categories: self.categories(),
        }
    }

    /// All observations of one (category, year)
    pub fn slice(&self, category: &str, year: i32) -> Vec<EnrichedObservation> {
        self.observations
            .iter()
            .filter(|o| o.category() == category && o.year() == year)
            .cloned()
            .collect()
    }

    /// All observations of one region, ordered by category then year
    pub fn region_history(&self, region_name: &str) -> Vec<EnrichedObservation> {
        let mut history: Vec<EnrichedObservation> = self
            .observations
            .iter()
            .filter(|o| o.region_name() == region_name)
            .cloned()
            .collect();
        history.sort_by(|a, b| a.category().cmp(b.category()).then(a.year().cmp(&b.year())));
        history
    }

    /// Resolve a (possibly partial) selection against this snapshot.
    ///
    /// Missing parts default to the first year and the first category.
    pub fn resolve_selection(&self, year: Option<i32>, category: Option<&str>) -> Result<Selection, SelectionError> {
        let years = self.years();
        let categories = self.categories();

        let year = match year {
            Some(y) if years.contains(&y) => y,
            Some(y) => return Err(SelectionError::UnknownYear(y)),
            None => *years.first().ok_or(SelectionError::EmptyDataset)?,
        };

        let category = match category {
            Some(c) if categories.iter().any(|k| k.as_str() == c) => c.to_string(),
            Some(c) => return Err(SelectionError::UnknownCategory(c.to_string())),
            None => categories.into_iter().next().ok_or(SelectionError::EmptyDataset)?,
        };

        Ok(Selection { year, category })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selections {
    pub years: Vec<i32>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub year: i32,
    pub category: String,
}

// ============================================================================
// DASHBOARD REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionValue {
    pub region_name: String,
    pub value: f64,
    pub pct_change: Option<f64>,
}

/// One boundary on the map, without its geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub region_name: String,
    pub value: f64,
    pub pct_change: Option<f64>,
    pub matched: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardReport {
    pub snapshot_id: String,
    pub source_digest: String,
    pub generated_at: DateTime<Utc>,

    pub selection: Selection,

    /// Mean of the zero-filled map values over all boundaries
    pub mean_value: f64,

    pub map: Vec<MapEntry>,

    /// Selected slice sorted by value, descending
    pub table: Vec<RegionValue>,
    pub top_regions: Vec<RegionValue>,

    pub comparison: Vec<ComparisonRow>,
    pub change_matrix: ChangeMatrix,

    /// Observation regions with no boundary (shown as zero)
    pub unmatched_regions: Vec<String>,
}

impl DashboardReport {
    pub fn summary(&self) -> String {
        let matched = self.map.iter().filter(|m| m.matched).count();
        format!(
            "{} {}: {} regions on map ({} matched), mean {:.2}, {} unmatched",
            self.selection.year,
            self.selection.category,
            self.map.len(),
            matched,
            self.mean_value,
            self.unmatched_regions.len()
        )
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct Reconciler {
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Reconciler { config }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Load both inputs. Any failure aborts the whole load.
    pub fn load_snapshot(&self) -> Result<Snapshot, DataLoadError> {
        let config = &self.config;

        // One read: the digest always describes the bytes that were parsed
        let bytes = fs::read(&config.data_path).map_err(|e| DataLoadError::from_io(&config.data_path, e))?;
        let source_digest = digest(&bytes);
        let observations = parse_observations(&bytes, &config.data_path, &config.columns)?;
        let boundaries = load_boundaries(
            &config.boundary_archive_path,
            config.boundary_member.as_deref(),
            &config.boundary_name_property,
        )?;

        let snapshot = Snapshot::from_parts(&observations, boundaries, config, source_digest);

        tracing::info!(
            snapshot = %snapshot.id,
            observations = snapshot.observations.len(),
            boundaries = snapshot.boundaries.len(),
            "snapshot ready"
        );

        Ok(snapshot)
    }

    /// Build the dashboard for one selection of a loaded snapshot
    pub fn dashboard(&self, snapshot: &Snapshot, selection: &Selection) -> DashboardReport {
        let slice = snapshot.slice(&selection.category, selection.year);
        let joined = join_to_geometry(&slice, &snapshot.boundaries);

        let mean_value = if joined.is_empty() {
            0.0
        } else {
            joined.iter().map(|j| j.value).sum::<f64>() / joined.len() as f64
        };

        let map = joined
            .iter()
            .map(|j| MapEntry {
                region_name: j.boundary.official_name.clone(),
                value: j.value,
                pct_change: j.pct_change,
                matched: j.matched,
            })
            .collect();

        let mut table: Vec<RegionValue> = slice
            .iter()
            .map(|o| RegionValue {
                region_name: o.region_name().to_string(),
                value: o.value(),
                pct_change: o.pct_change_from_prior_year,
            })
            .collect();
        table.sort_by(|a, b| b.value.total_cmp(&a.value));
        let top_regions = table.iter().take(TOP_REGIONS).cloned().collect();

        let unmatched = unmatched_regions(&slice, &snapshot.boundaries);
        if !unmatched.is_empty() {
            tracing::warn!(regions = ?unmatched, "observations without boundary");
        }

        DashboardReport {
            snapshot_id: snapshot.id.clone(),
            source_digest: snapshot.source_digest.clone(),
            generated_at: Utc::now(),
            selection: selection.clone(),
            mean_value,
            map,
            table,
            top_regions,
            comparison: self.comparison(snapshot, selection.year),
            change_matrix: change_matrix(&snapshot.observations, &selection.category),
            unmatched_regions: unmatched,
        }
    }

    /// Population vs crime top-k for one year
    pub fn comparison(&self, snapshot: &Snapshot, year: i32) -> Vec<ComparisonRow> {
        let settings = &self.config.comparison;

        let of_category = |category: &str| -> Vec<Observation> {
            snapshot
                .slice(category, year)
                .into_iter()
                .map(|e| e.observation)
                .collect()
        };

        top_k_comparison(
            &of_category(&settings.population_category),
            &of_category(&settings.crime_category),
            settings.top_k,
        )
    }

    /// Joined map for one selection as GeoJSON
    pub fn map_geojson(&self, snapshot: &Snapshot, selection: &Selection) -> serde_json::Value {
        let slice = snapshot.slice(&selection.category, selection.year);
        let joined = join_to_geometry(&slice, &snapshot.boundaries);
        to_feature_collection(&joined, &self.config.boundary_name_property)
    }

    /// Full invocation: fresh snapshot, selection, dashboard
    pub fn run(&self, year: Option<i32>, category: Option<&str>) -> Result<DashboardReport, PipelineError> {
        let snapshot = self.load_snapshot()?;
        let selection = snapshot.resolve_selection(year, category)?;
        Ok(self.dashboard(&snapshot, &selection))
    }
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::Membership;
    use serde_json::{json, Map, Value};
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const CSV: &str = "\
,발생지역별(1),category,year,value
0,서울,범죄 발생총건수,2020,100
1,서울,범죄 발생총건수,2021,150
2,부산,범죄 발생총건수,2020,80
3,부산,범죄 발생총건수,2021,60
4,서울,총인구수,2021,9500000
5,부산,총인구수,2021,3300000
6,울릉,범죄 발생총건수,2021,3
";

    fn boundary(name: &str) -> GeoBoundary {
        GeoBoundary {
            official_name: name.to_string(),
            geometry: Value::Null,
            properties: Map::new(),
        }
    }

    fn snapshot() -> Snapshot {
        let observations = vec![
            Observation::new("서울", "범죄 발생총건수", 2020, 100.0),
            Observation::new("서울", "범죄 발생총건수", 2021, 150.0),
            Observation::new("부산", "범죄 발생총건수", 2021, 60.0),
            Observation::new("서울", "총인구수", 2021, 9_500_000.0),
        ];
        let boundaries = vec![boundary("서울특별시"), boundary("부산광역시"), boundary("대구광역시")];

        Snapshot::from_parts(&observations, boundaries, &ReconcilerConfig::default(), String::new())
    }

    fn write_inputs(dir: &TempDir) -> ReconcilerConfig {
        let csv_path = dir.path().join("final.csv");
        fs::write(&csv_path, CSV).unwrap();

        let features: Vec<Value> = ["서울특별시", "부산광역시", "대구광역시"]
            .iter()
            .map(|n| json!({ "type": "Feature", "properties": { "CTP_KOR_NM": n }, "geometry": null }))
            .collect();
        let body = json!({ "type": "FeatureCollection", "features": features }).to_string();

        let zip_path = dir.path().join("ctprvn.zip");
        let mut zip = ZipWriter::new(fs::File::create(&zip_path).unwrap());
        zip.start_file("ctprvn.json", SimpleFileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
        zip.finish().unwrap();

        ReconcilerConfig::default()
            .with_data_path(csv_path)
            .with_boundary_archive(zip_path)
    }

    #[test]
    fn test_snapshot_normalizes_and_enriches() {
        let snap = snapshot();

        assert!(snap.observations.iter().all(|o| o.region_name() != "서울"));
        let seoul_2021 = snap.slice("범죄 발생총건수", 2021);
        assert_eq!(seoul_2021[0].region_name(), "서울특별시");
        assert_eq!(seoul_2021[0].pct_change_from_prior_year, Some(50.0));
    }

    #[test]
    fn test_selections() {
        let snap = snapshot();

        assert_eq!(snap.years(), vec![2020, 2021]);
        assert_eq!(snap.categories(), vec!["범죄 발생총건수".to_string(), "총인구수".to_string()]);
    }

    #[test]
    fn test_resolve_selection_defaults_and_errors() {
        let snap = snapshot();

        let default = snap.resolve_selection(None, None).unwrap();
        assert_eq!(default.year, 2020);
        assert_eq!(default.category, "범죄 발생총건수");

        assert_eq!(snap.resolve_selection(Some(1999), None), Err(SelectionError::UnknownYear(1999)));
        assert_eq!(
            snap.resolve_selection(None, Some("교통사고")),
            Err(SelectionError::UnknownCategory("교통사고".to_string()))
        );
    }

    #[test]
    fn test_empty_snapshot_selection() {
        let snap = Snapshot::from_parts(&[], vec![], &ReconcilerConfig::default(), String::new());
        assert_eq!(snap.resolve_selection(None, None), Err(SelectionError::EmptyDataset));
    }

    #[test]
    fn test_dashboard_for_selection() {
        let snap = snapshot();
        let reconciler = Reconciler::new(ReconcilerConfig::default());
        let selection = Selection {
            year: 2021,
            category: "범죄 발생총건수".to_string(),
        };

        let report = reconciler.dashboard(&snap, &selection);

        assert_eq!(report.map.len(), 3);
        assert_eq!(report.mean_value, 70.0);
        assert!(!report.map[2].matched);
        assert_eq!(report.table[0].region_name, "서울특별시");
        assert_eq!(report.top_regions.len(), 2);
        assert!(report.unmatched_regions.is_empty());
        assert_eq!(report.change_matrix.years, vec![2020, 2021]);
        assert_eq!(report.comparison[0].membership, Membership::Both);
        assert_eq!(report.comparison[1].region_name, "부산광역시");
        assert_eq!(report.comparison[1].membership, Membership::CrimeOnly);
    }

    #[test]
    fn test_region_history() {
        let snap = snapshot();
        let history = snap.region_history("서울특별시");

        assert_eq!(history.len(), 3);
        assert_eq!(history[0].year(), 2020);
        assert_eq!(history[2].category(), "총인구수");
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = TempDir::new().unwrap();
        let reconciler = Reconciler::new(write_inputs(&dir));

        let report = reconciler.run(Some(2021), Some("범죄 발생총건수")).unwrap();

        assert_eq!(report.map.len(), 3);
        assert_eq!(report.source_digest.len(), 64);
        assert_eq!(report.unmatched_regions, vec!["울릉".to_string()]);

        let busan = report.map.iter().find(|m| m.region_name == "부산광역시").unwrap();
        assert_eq!(busan.value, 60.0);
        assert_eq!(busan.pct_change, Some(-25.0));

        let geojson = reconciler.map_geojson(
            &reconciler.load_snapshot().unwrap(),
            &report.selection,
        );
        assert_eq!(geojson["features"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_run_missing_data_file() {
        let dir = TempDir::new().unwrap();
        let config = write_inputs(&dir).with_data_path(dir.path().join("absent.csv"));

        let err = Reconciler::new(config).load_snapshot().unwrap_err();

        assert!(err.is_missing_file());
    }

    #[test]
    fn test_run_missing_archive() {
        let dir = TempDir::new().unwrap();
        let config = write_inputs(&dir).with_boundary_archive(dir.path().join("absent.zip"));

        let err = Reconciler::new(config).run(None, None).unwrap_err();

        assert!(matches!(err, PipelineError::Load(ref e) if e.is_missing_file()));
    }

    #[test]
    fn test_snapshots_are_independent() {
        let dir = TempDir::new().unwrap();
        let reconciler = Reconciler::new(write_inputs(&dir));

        let first = reconciler.load_snapshot().unwrap();
        let second = reconciler.load_snapshot().unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.source_digest, second.source_digest);
    }

    #[test]
    fn test_source_digest_matches_parsed_bytes() {
        let dir = TempDir::new().unwrap();
        let reconciler = Reconciler::new(write_inputs(&dir));

        let snap = reconciler.load_snapshot().unwrap();

        let expected = format!("{:x}", Sha256::digest(CSV.as_bytes()));
        assert_eq!(snap.source_digest, expected);
        assert_eq!(snap.observations.len(), 7);
    }
}
