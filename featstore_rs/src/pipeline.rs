use std::time::Instant;

use tracing::info;

use crate::calendar::build_calendar;
use crate::config::Config;
use crate::data::load_observations;
use crate::error::Result;
use crate::feature::{SerializeSummary, serialize};
use crate::instruments::build_instrument_index;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionSummary {
    pub rows: usize,
    pub duplicates_dropped: usize,
    pub calendar_len: usize,
    pub instruments: usize,
    pub features: SerializeSummary,
}

/// Runs the four conversion stages in order: load, calendar, instrument
/// index, features. A failing stage stops the run; output from the stages
/// before it stays on disk.
pub struct ConversionPipeline {
    config: Config,
}

impl ConversionPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self) -> Result<ConversionSummary> {
        let config = &self.config;
        config.validate()?;
        let layout = config.layout();

        let start = Instant::now();
        let table = load_observations(&config.source_csv, config)?;
        info!(
            path = %config.source_csv.display(),
            rows = table.len(),
            fields = ?table.field_names(),
            duplicates_dropped = table.duplicates_dropped(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "source data loaded"
        );

        let start = Instant::now();
        let calendar = build_calendar(&table);
        let calendar_path = calendar.write(&layout)?;
        info!(
            path = %calendar_path.display(),
            dates = calendar.len(),
            first = ?calendar.first(),
            last = ?calendar.last(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "calendar written"
        );

        let start = Instant::now();
        let instruments = build_instrument_index(&table);
        let instruments_path = instruments.write(&layout, &config.market)?;
        info!(
            path = %instruments_path.display(),
            instruments = instruments.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "instrument index written"
        );

        let start = Instant::now();
        let features = serialize(
            &table,
            &calendar,
            &instruments,
            &config.field_mapping,
            &layout,
        )?;
        info!(
            root = %layout.features_dir().display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "conversion finished"
        );

        Ok(ConversionSummary {
            rows: table.len(),
            duplicates_dropped: table.duplicates_dropped(),
            calendar_len: calendar.len(),
            instruments: instruments.len(),
            features,
        })
    }
}
