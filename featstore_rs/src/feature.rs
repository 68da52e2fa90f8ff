use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::calendar::Calendar;
use crate::config::FieldMapping;
use crate::error::{IoPathExt, Result, StoreError};
use crate::instruments::{InstrumentIndex, check_instrument_dirs};
use crate::layout::StoreLayout;
use crate::table::ObservationTable;

/// Width of one record in a feature file.
pub const RECORD_BYTES: usize = 4;

/// Little-endian f32 encoding of one observation. Every NaN, whatever its
/// payload, is written as the canonical quiet NaN so output is bit-stable.
pub fn encode_value(value: f64) -> [u8; RECORD_BYTES] {
    if value.is_nan() {
        f32::NAN.to_le_bytes()
    } else {
        (value as f32).to_le_bytes()
    }
}

/// Write `values` as packed little-endian f32 with no header or footer.
pub fn write_feature<I>(path: &Path, values: I) -> Result<()>
where
    I: IntoIterator<Item = f64>,
{
    let file = File::create(path).at_path(path)?;
    let mut writer = BufWriter::new(file);
    for value in values {
        writer.write_all(&encode_value(value)).at_path(path)?;
    }
    writer.flush().at_path(path)
}

/// Decode a feature file. Record count is `byte length / 4`.
pub fn read_feature(path: &Path) -> Result<Vec<f32>> {
    let bytes = fs::read(path).at_path(path)?;
    if bytes.len() % RECORD_BYTES != 0 {
        return Err(StoreError::format(format!(
            "{} has {} bytes, not a multiple of {RECORD_BYTES}",
            path.display(),
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(RECORD_BYTES)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializeSummary {
    pub instruments: usize,
    /// Output field names written for every instrument, in mapping order.
    pub fields_written: Vec<String>,
    /// Mapped source columns absent from the table.
    pub fields_skipped: Vec<String>,
    pub files_written: usize,
    /// Listed instruments with no rows; they received all-NaN columns.
    pub missing_instruments: Vec<String>,
}

/// Write one `<field>.day.bin` per (instrument, mapped field) under
/// `features/`, each aligned to `calendar` with NaN in every slot the table
/// has no row for.
///
/// Instruments are processed in index order. An index holding an id that is
/// not a plain directory name, or two ids that differ only in case, is
/// rejected before anything is written. The first I/O failure aborts the
/// run; files already written are left in place.
pub fn serialize(
    table: &ObservationTable,
    calendar: &Calendar,
    instruments: &InstrumentIndex,
    field_mapping: &[FieldMapping],
    layout: &StoreLayout,
) -> Result<SerializeSummary> {
    check_instrument_dirs(instruments.iter())?;

    let mut summary = SerializeSummary {
        instruments: instruments.len(),
        ..Default::default()
    };

    let mut fields: Vec<(usize, &str)> = Vec::with_capacity(field_mapping.len());
    for mapping in field_mapping {
        match table.field_index(&mapping.source) {
            Some(idx) => {
                fields.push((idx, mapping.target.as_str()));
                summary.fields_written.push(mapping.target.clone());
            }
            None => {
                debug!(
                    column = %mapping.source,
                    field = %mapping.target,
                    "mapped column absent from table; field skipped for all instruments"
                );
                summary.fields_skipped.push(mapping.source.clone());
            }
        }
    }

    let features_dir = layout.features_dir();
    fs::create_dir_all(&features_dir).at_path(&features_dir)?;

    for instrument in instruments.iter() {
        let instrument_dir = layout.instrument_dir(instrument);
        fs::create_dir_all(&instrument_dir).at_path(&instrument_dir)?;

        if table.instrument_rows(instrument).is_empty() {
            warn!(
                instrument,
                "instrument has no observations; writing all-NaN feature set"
            );
            summary.missing_instruments.push(instrument.to_string());
        }

        let slots = align_to_calendar(table, calendar, instrument);

        for &(field_idx, target) in &fields {
            let path = layout.feature_path(instrument, target);
            let column = table.column(field_idx);
            write_feature(
                &path,
                slots
                    .iter()
                    .map(|slot| slot.map_or(f64::NAN, |row| column[row])),
            )?;
            summary.files_written += 1;
        }
    }

    info!(
        instruments = summary.instruments,
        fields = summary.fields_written.len(),
        files = summary.files_written,
        missing = summary.missing_instruments.len(),
        "feature files written"
    );
    Ok(summary)
}

/// For each calendar position, the table row holding `instrument` on that
/// date, if any. Rows dated outside the calendar are dropped.
pub fn align_to_calendar(
    table: &ObservationTable,
    calendar: &Calendar,
    instrument: &str,
) -> Vec<Option<usize>> {
    let mut slots = vec![None; calendar.len()];
    for row in table.instrument_rows(instrument) {
        if let Some(pos) = calendar.position(table.keys()[row].date) {
            slots[pos] = Some(row);
        }
    }
    slots
}
