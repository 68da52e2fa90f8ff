use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::{IoPathExt, Result, StoreError};
use crate::layout::{StoreLayout, render_lines, write_text_file};
use crate::table::ObservationTable;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Ascending, distinct trading dates. Feature files are aligned 1:1 with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calendar {
    dates: Vec<NaiveDate>,
}

impl Calendar {
    pub fn from_dates<I: IntoIterator<Item = NaiveDate>>(dates: I) -> Self {
        let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();
        Self {
            dates: unique.into_iter().collect(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Index of `date` in the calendar, i.e. its record position in every
    /// feature file.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    pub fn render(&self) -> String {
        render_lines(
            self.dates
                .iter()
                .map(|date| date.format(DATE_FORMAT).to_string()),
        )
    }

    /// Overwrite `calendars/day.txt`. Output is a pure function of the dates,
    /// so rewriting the same calendar is byte-identical.
    pub fn write(&self, layout: &StoreLayout) -> Result<PathBuf> {
        let path = layout.calendar_path();
        write_text_file(&path, &self.render())?;
        Ok(path)
    }

    pub fn read(layout: &StoreLayout) -> Result<Self> {
        let path = layout.calendar_path();
        let raw = fs::read_to_string(&path).at_path(&path)?;
        let mut dates = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let date = NaiveDate::parse_from_str(line, DATE_FORMAT).map_err(|err| {
                StoreError::format(format!(
                    "{}:{}: invalid calendar date '{line}': {err}",
                    path.display(),
                    idx + 1
                ))
            })?;
            dates.push(date);
        }
        if dates.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(StoreError::format(format!(
                "{} is not strictly ascending",
                path.display()
            )));
        }
        Ok(Self { dates })
    }
}

pub fn build_calendar(table: &ObservationTable) -> Calendar {
    Calendar::from_dates(table.dates())
}
