// Regional Statistics Reconciler - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod error;
pub mod config;
pub mod observation;
pub mod aliases;     // Abbreviated → official region names
pub mod change;      // Year-over-year change + heatmap matrix
pub mod boundary;    // Zipped GeoJSON + choropleth join
pub mod ranking;     // Top-k and population vs crime comparison
pub mod reconciler;  // One pipeline invocation

// Re-export commonly used types
pub use error::{ConfigError, DataLoadError, PipelineError, SelectionError};
pub use config::{ColumnMapping, ComparisonConfig, ReconcilerConfig};
pub use observation::{load_observations, Observation};
pub use aliases::{normalize_region_names, AliasTable};
pub use change::{change_matrix, compute_change, pct_change, ChangeCell, ChangeMatrix, EnrichedObservation};
pub use boundary::{
    join_to_geometry, load_boundaries, to_feature_collection, unmatched_regions,
    GeoBoundary, JoinedBoundary,
};
pub use ranking::{overlap_ratio, top_k, top_k_comparison, ComparisonRow, Membership};
pub use reconciler::{
    DashboardReport, MapEntry, Reconciler, RegionValue, Selection, Selections, Snapshot,
    TOP_REGIONS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
