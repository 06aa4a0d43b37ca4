// ⚙️ Reconciler Configuration
//
// Paths, column names, alias table and comparison settings for one run.
// Passed explicitly to the Reconciler; nothing here is global.

use crate::aliases::AliasTable;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Names of the tabular input columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub region: String,
    pub category: String,
    pub year: String,
    pub value: String,

    /// Ignore the first column (a row index written by the exporter)
    pub skip_leading_column: bool,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        ColumnMapping {
            region: "발생지역별(1)".to_string(),
            category: "category".to_string(),
            year: "year".to_string(),
            value: "value".to_string(),
            skip_leading_column: true,
        }
    }
}

/// Population vs crime ranking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    pub population_category: String,
    pub crime_category: String,
    pub top_k: usize,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        ComparisonConfig {
            population_category: "총인구수".to_string(),
            crime_category: "범죄 발생총건수".to_string(),
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Delimited file of observations
    pub data_path: PathBuf,

    /// ZIP archive holding the GeoJSON boundaries
    pub boundary_archive_path: PathBuf,

    /// Archive member to read; None picks the first .json/.geojson entry
    pub boundary_member: Option<String>,

    /// Feature property carrying the official region name
    pub boundary_name_property: String,

    pub columns: ColumnMapping,
    pub aliases: AliasTable,
    pub comparison: ComparisonConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            data_path: PathBuf::from("final.csv"),
            boundary_archive_path: PathBuf::from("ctprvn.zip"),
            boundary_member: Some("ctprvn.json".to_string()),
            boundary_name_property: "CTP_KOR_NM".to_string(),
            columns: ColumnMapping::default(),
            aliases: AliasTable::default(),
            comparison: ComparisonConfig::default(),
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML; omitted keys keep their defaults
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ReconcilerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.comparison.top_k == 0 {
            return Err(ConfigError::Validation(
                "comparison.top_k must be at least 1".to_string(),
            ));
        }

        if self.boundary_name_property.trim().is_empty() {
            return Err(ConfigError::Validation(
                "boundary_name_property must not be empty".to_string(),
            ));
        }

        let c = &self.columns;
        for (key, name) in [
            ("region", &c.region),
            ("category", &c.category),
            ("year", &c.year),
            ("value", &c.value),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "columns.{} must not be empty",
                    key
                )));
            }
        }

        Ok(())
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_boundary_archive(mut self, path: impl Into<PathBuf>) -> Self {
        self.boundary_archive_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.data_path, PathBuf::from("final.csv"));
        assert_eq!(config.boundary_member.as_deref(), Some("ctprvn.json"));
        assert_eq!(config.comparison.top_k, 5);
        assert_eq!(config.aliases.len(), 17);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ReconcilerConfig::from_toml(
            r#"
data_path = "data/crime.csv"

[columns]
region = "city"

[comparison]
top_k = 3
"#,
        )
        .unwrap();

        assert_eq!(config.data_path, PathBuf::from("data/crime.csv"));
        assert_eq!(config.boundary_archive_path, PathBuf::from("ctprvn.zip"));
        assert_eq!(config.columns.region, "city");
        assert_eq!(config.columns.value, "value");
        assert_eq!(config.comparison.top_k, 3);
        assert_eq!(config.comparison.crime_category, "범죄 발생총건수");
    }

    #[test]
    fn test_custom_alias_table_replaces_default() {
        let config = ReconcilerConfig::from_toml(
            r#"
[aliases]
"Seoul" = "서울특별시"
"#,
        )
        .unwrap();

        assert_eq!(config.aliases.len(), 1);
        assert_eq!(config.aliases.resolve("Seoul"), "서울특별시");
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let err = ReconcilerConfig::from_toml("[comparison]\ntop_k = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let err = ReconcilerConfig::from_toml("data_path = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_config_file() {
        let err = ReconcilerConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
