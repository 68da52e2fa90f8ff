use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::layout::{DEFAULT_MARKET, StoreLayout, validate_file_stem};

/// One `source_column -> output_field` pair. Source columns that are not
/// mapped are ignored by the loader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Parse `SRC=DST`, or a bare `NAME` meaning `NAME=NAME`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (source, target) = match trimmed.split_once('=') {
            Some((source, target)) => (source.trim(), target.trim()),
            None => (trimmed, trimmed),
        };
        if source.is_empty() || target.is_empty() {
            return Err(StoreError::InvalidConfig(format!(
                "field mapping must look like SRC=DST (got '{raw}')"
            )));
        }
        Ok(Self::new(source, target))
    }
}

pub fn default_field_mapping() -> Vec<FieldMapping> {
    vec![
        FieldMapping::new("open", "open"),
        FieldMapping::new("high", "high"),
        FieldMapping::new("low", "low"),
        FieldMapping::new("close", "close"),
        FieldMapping::new("vol", "volume"),
        FieldMapping::new("amount", "money"),
    ]
}

fn default_instrument_column() -> String {
    "ts_code".to_string()
}

fn default_date_column() -> String {
    "trade_date".to_string()
}

fn default_market() -> String {
    DEFAULT_MARKET.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Wide CSV keyed by (instrument, date).
    pub source_csv: PathBuf,
    /// Root of the feature store; calendars/, instruments/ and features/
    /// are created underneath it.
    pub output_dir: PathBuf,
    #[serde(default = "default_instrument_column")]
    pub instrument_column: String,
    /// Dates are accepted as `YYYYMMDD` or `YYYY-MM-DD`.
    #[serde(default = "default_date_column")]
    pub date_column: String,
    /// Ordered mapping of source columns to output feature names. Mapped
    /// columns missing from the CSV are skipped, not rejected.
    #[serde(default = "default_field_mapping")]
    pub field_mapping: Vec<FieldMapping>,
    /// Name of the instruments file written for the full index.
    #[serde(default = "default_market")]
    pub market: String,
}

impl Config {
    pub fn new(source_csv: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_csv: source_csv.into(),
            output_dir: output_dir.into(),
            instrument_column: default_instrument_column(),
            date_column: default_date_column(),
            field_mapping: default_field_mapping(),
            market: default_market(),
        }
    }

    pub fn with_field_mapping(mut self, field_mapping: Vec<FieldMapping>) -> Self {
        self.field_mapping = field_mapping;
        self
    }

    pub fn from_json_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| StoreError::io(path, err))?;
        let config: Config = serde_json::from_str(&raw).map_err(|err| {
            StoreError::InvalidConfig(format!("{}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.output_dir)
    }

    pub fn validate(&self) -> Result<()> {
        if self.instrument_column.is_empty() || self.date_column.is_empty() {
            return Err(StoreError::InvalidConfig(
                "instrument and date column names must be non-empty".to_string(),
            ));
        }
        if self.instrument_column == self.date_column {
            return Err(StoreError::InvalidConfig(format!(
                "instrument and date columns must differ (both '{}')",
                self.date_column
            )));
        }
        validate_file_stem(&self.market)?;

        let mut targets = HashSet::new();
        for mapping in &self.field_mapping {
            validate_file_stem(&mapping.target)?;
            if !targets.insert(mapping.target.as_str()) {
                return Err(StoreError::InvalidConfig(format!(
                    "output field '{}' is mapped more than once",
                    mapping.target
                )));
            }
        }
        Ok(())
    }
}
