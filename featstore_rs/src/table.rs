use std::ops::Range;

use chrono::NaiveDate;

/// Composite key of the observation table. Ordering is instrument first,
/// then date, which is the order rows are stored in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservationKey {
    pub instrument: String,
    pub date: NaiveDate,
}

impl ObservationKey {
    pub fn new(instrument: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            instrument: instrument.into(),
            date,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRow {
    pub key: ObservationKey,
    /// One value per table field, NaN where the source cell was empty.
    pub values: Vec<f64>,
}

/// Rows keyed by (instrument, date), sorted and unique on that key, with one
/// typed f64 column per tracked field. Built once by the loader and never
/// mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct ObservationTable {
    keys: Vec<ObservationKey>,
    fields: Vec<String>,
    columns: Vec<Vec<f64>>,
    duplicates_dropped: usize,
}

impl ObservationTable {
    /// Build a table from rows in source order. Rows are stably sorted by
    /// key; when a key repeats, the row that came last in the source wins.
    pub fn from_rows(fields: Vec<String>, mut rows: Vec<ObservationRow>) -> Self {
        rows.sort_by(|a, b| a.key.cmp(&b.key));

        let mut unique: Vec<ObservationRow> = Vec::with_capacity(rows.len());
        let mut duplicates_dropped = 0usize;
        for row in rows {
            match unique.last_mut() {
                Some(prev) if prev.key == row.key => {
                    *prev = row;
                    duplicates_dropped += 1;
                }
                _ => unique.push(row),
            }
        }

        let mut keys = Vec::with_capacity(unique.len());
        let mut columns: Vec<Vec<f64>> = fields
            .iter()
            .map(|_| Vec::with_capacity(unique.len()))
            .collect();
        for row in unique {
            for (idx, column) in columns.iter_mut().enumerate() {
                column.push(row.values.get(idx).copied().unwrap_or(f64::NAN));
            }
            keys.push(row.key);
        }

        Self {
            keys,
            fields,
            columns,
            duplicates_dropped,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[ObservationKey] {
        &self.keys
    }

    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_index(name).is_some()
    }

    pub fn column(&self, field_idx: usize) -> &[f64] {
        &self.columns[field_idx]
    }

    pub fn value(&self, row: usize, field_idx: usize) -> f64 {
        self.columns[field_idx][row]
    }

    /// Number of source rows that were shadowed by a later duplicate key.
    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }

    /// Contiguous row range holding `instrument`; empty when absent.
    pub fn instrument_rows(&self, instrument: &str) -> Range<usize> {
        let start = self
            .keys
            .partition_point(|key| key.instrument.as_str() < instrument);
        let end = start
            + self.keys[start..].partition_point(|key| key.instrument.as_str() == instrument);
        start..end
    }

    pub fn find(&self, instrument: &str, date: NaiveDate) -> Option<usize> {
        self.keys
            .binary_search_by(|key| {
                key.instrument
                    .as_str()
                    .cmp(instrument)
                    .then(key.date.cmp(&date))
            })
            .ok()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.keys.iter().map(|key| key.date)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys.iter().map(|key| key.instrument.as_str())
    }
}
