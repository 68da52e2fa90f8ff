use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::instruments::check_instrument_dirs;
use crate::layout::is_valid_instrument_id;
use crate::table::{ObservationKey, ObservationRow, ObservationTable};

#[derive(Debug, Clone)]
pub struct DataSetMetadata {
    column_names: Arc<Vec<String>>,
    approx_rows: usize,
}

/// Raw CSV contents with every column held as strings. Type inference is
/// switched off so identifiers such as `000001.SZ` keep their leading zeros
/// and numeric/date parsing stays under our control.
#[derive(Clone)]
pub struct ColumnarData {
    frame: Arc<DataFrame>,
    metadata: DataSetMetadata,
}

impl ColumnarData {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(StoreError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "source CSV does not exist"),
            ));
        }

        let df = LazyCsvReader::new(path)
            .has_header(true)
            .with_infer_schema_length(Some(0))
            .finish()?
            .collect()?;

        let column_names = df
            .get_columns()
            .iter()
            .map(|series| series.name().to_string())
            .collect::<Vec<_>>();

        let metadata = DataSetMetadata {
            column_names: Arc::new(column_names),
            approx_rows: df.height(),
        };

        Ok(Self {
            frame: Arc::new(df),
            metadata,
        })
    }

    pub fn column_names(&self) -> &[String] {
        self.metadata.column_names.as_ref()
    }

    pub fn approx_rows(&self) -> usize {
        self.metadata.approx_rows
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.metadata.column_names.iter().any(|col| col == name)
    }

    pub fn string_column(&self, name: &str) -> Result<&StringChunked> {
        let series = self
            .frame
            .column(name)
            .map_err(|_| StoreError::format(format!("missing column '{name}'")))?;
        Ok(series.str()?)
    }
}

/// Load the source CSV into an [`ObservationTable`].
///
/// The instrument and date columns are required. Of the mapped source
/// columns, only those present in the CSV become table fields; the rest are
/// dropped here and skipped by the serializer.
pub fn load_observations(path: &Path, config: &Config) -> Result<ObservationTable> {
    let data = ColumnarData::load(path)?;

    for required in [&config.instrument_column, &config.date_column] {
        if !data.has_column(required) {
            return Err(StoreError::format(format!(
                "{} is missing required column '{required}' (found: {})",
                path.display(),
                data.column_names().join(", ")
            )));
        }
    }

    let mut fields: Vec<String> = Vec::new();
    let mut value_columns: Vec<&StringChunked> = Vec::new();
    for mapping in &config.field_mapping {
        if fields.contains(&mapping.source) {
            continue;
        }
        if !data.has_column(&mapping.source) {
            debug!(
                column = %mapping.source,
                path = %path.display(),
                "mapped source column not present; skipping"
            );
            continue;
        }
        value_columns.push(data.string_column(&mapping.source)?);
        fields.push(mapping.source.clone());
    }

    let instruments = data.string_column(&config.instrument_column)?;
    let dates = data.string_column(&config.date_column)?;
    let mut value_iters: Vec<_> = value_columns.iter().map(|ca| ca.into_iter()).collect();

    let mut rows = Vec::with_capacity(data.approx_rows());
    for (idx, (instrument, date)) in instruments.into_iter().zip(dates.into_iter()).enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let instrument = match instrument.map(str::trim) {
            Some(value) if !value.is_empty() => value,
            _ => {
                return Err(StoreError::format(format!(
                    "line {line}: empty '{}' value",
                    config.instrument_column
                )));
            }
        };
        if !is_valid_instrument_id(instrument) {
            return Err(StoreError::format(format!(
                "line {line}: instrument id '{instrument}' cannot be used as a directory name"
            )));
        }
        let raw_date = date.map(str::trim).unwrap_or("");
        let date = parse_trade_date(raw_date).ok_or_else(|| {
            StoreError::format(format!(
                "line {line}: cannot parse '{}' value '{raw_date}' as YYYYMMDD or YYYY-MM-DD",
                config.date_column
            ))
        })?;

        let mut values = Vec::with_capacity(fields.len());
        for (field, iter) in fields.iter().zip(value_iters.iter_mut()) {
            let raw = iter.next().flatten();
            let value = parse_value(raw).ok_or_else(|| {
                StoreError::format(format!(
                    "line {line}: column '{field}' value '{}' is not numeric",
                    raw.unwrap_or("")
                ))
            })?;
            values.push(value);
        }

        rows.push(ObservationRow {
            key: ObservationKey::new(instrument, date),
            values,
        });
    }

    let table = ObservationTable::from_rows(fields, rows);
    check_instrument_dirs(table.instruments())?;
    if table.duplicates_dropped() > 0 {
        warn!(
            duplicates = table.duplicates_dropped(),
            path = %path.display(),
            "duplicate (instrument, date) rows found; keeping the last occurrence of each"
        );
    }
    Ok(table)
}

/// Accepts `YYYYMMDD` (the raw integer form) and ISO `YYYY-MM-DD`.
pub fn parse_trade_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }
}

/// Cell contents read as a missing observation, matching the default
/// `na_values` of pandas' CSV reader.
const MISSING_VALUE_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Missing cells become NaN; anything else must parse as a number.
fn parse_value(raw: Option<&str>) -> Option<f64> {
    match raw.map(str::trim) {
        None => Some(f64::NAN),
        Some(text) if MISSING_VALUE_TOKENS.contains(&text) => Some(f64::NAN),
        Some(text) => text.parse::<f64>().ok(),
    }
}
