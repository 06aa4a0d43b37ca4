// ⚠️ Error Types - Load and configuration failures
//
// Every load failure aborts the current invocation. There is no retry and
// no fallback data source: the caller turns the error into a message.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to load one of the pipeline inputs
#[derive(Debug, Error)]
pub enum DataLoadError {
    /// Input path does not exist
    #[error("file not found: {}", .path.display())]
    MissingFile { path: PathBuf },

    /// Archive, JSON or tabular parse failure
    #[error("malformed input in {}: {reason}", .path.display())]
    MalformedInput { path: PathBuf, reason: String },
}

impl DataLoadError {
    pub fn missing(path: &Path) -> Self {
        DataLoadError::MissingFile {
            path: path.to_path_buf(),
        }
    }

    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        DataLoadError::MalformedInput {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Map an I/O error from opening `path`, keeping NotFound distinct
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::missing(path)
        } else {
            Self::malformed(path, err.to_string())
        }
    }

    pub fn is_missing_file(&self) -> bool {
        matches!(self, DataLoadError::MissingFile { .. })
    }
}

/// Configuration file problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Rejected dashboard selection (unknown year or category)
#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("no observations for year {0}")]
    UnknownYear(i32),

    #[error("invalid year '{0}'")]
    InvalidYear(String),

    #[error("no observations for category '{0}'")]
    UnknownCategory(String),

    #[error("no observations for region '{0}'")]
    UnknownRegion(String),

    #[error("dataset contains no observations")]
    EmptyDataset,
}

/// Anything that can stop one invocation of the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] DataLoadError),

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_not_found_is_missing_file() {
        let err = DataLoadError::from_io(
            Path::new("nope.csv"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_missing_file());
        assert!(err.to_string().contains("nope.csv"));
    }

    #[test]
    fn test_from_io_other_is_malformed() {
        let err = DataLoadError::from_io(
            Path::new("data.csv"),
            std::io::Error::new(std::io::ErrorKind::InvalidData, "bad bytes"),
        );
        assert!(!err.is_missing_file());
        assert!(err.to_string().contains("bad bytes"));
    }
}
