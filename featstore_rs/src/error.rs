use std::path::{Path, PathBuf};

use polars::prelude::PolarsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Source data (or a persisted store file) does not parse.
    #[error("format error: {context}")]
    Format { context: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv engine error: {0}")]
    Polars(#[from] PolarsError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    pub fn format(context: impl Into<String>) -> Self {
        StoreError::Format {
            context: context.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, StoreError::Format { .. } | StoreError::Polars(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, StoreError::Io { .. })
    }
}

/// Attach the offending path to a bare `std::io::Error`.
pub(crate) trait IoPathExt<T> {
    fn at_path(self, path: &Path) -> Result<T>;
}

impl<T> IoPathExt<T> for std::io::Result<T> {
    fn at_path(self, path: &Path) -> Result<T> {
        self.map_err(|err| StoreError::io(path, err))
    }
}
