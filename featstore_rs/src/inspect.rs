use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::calendar::Calendar;
use crate::error::{IoPathExt, Result};
use crate::feature::{RECORD_BYTES, read_feature};
use crate::instruments::read_market;
use crate::layout::{CALENDARS_DIR, FEATURES_DIR, FREQ, INSTRUMENTS_DIR, StoreLayout};

#[derive(Debug, Clone, Serialize)]
pub struct FeatureReport {
    pub field: String,
    pub bytes: u64,
    /// `bytes / 4`, rounded down when the file is truncated.
    pub records: usize,
    /// Records that are not NaN. Zero for truncated files.
    pub observed: usize,
    pub matches_calendar: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentReport {
    pub instrument: String,
    pub directory: PathBuf,
    pub directory_present: bool,
    pub features: Vec<FeatureReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreReport {
    pub root: PathBuf,
    pub market: String,
    pub calendar_len: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub instruments: Vec<InstrumentReport>,
    pub fingerprint: String,
}

impl StoreReport {
    /// Human-readable consistency problems; empty for a healthy store.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut owners: BTreeMap<&Path, &str> = BTreeMap::new();
        for report in &self.instruments {
            match owners.get(report.directory.as_path()) {
                Some(&first) if first != report.instrument => {
                    problems.push(format!(
                        "{} and {} share feature directory {}",
                        first,
                        report.instrument,
                        report.directory.display()
                    ));
                }
                Some(_) => {}
                None => {
                    owners.insert(report.directory.as_path(), report.instrument.as_str());
                }
            }
        }
        for report in &self.instruments {
            if !report.directory_present {
                problems.push(format!(
                    "{}: missing feature directory {}",
                    report.instrument,
                    report.directory.display()
                ));
                continue;
            }
            if report.features.is_empty() {
                problems.push(format!("{}: no feature files", report.instrument));
            }
            for feature in &report.features {
                if !feature.matches_calendar {
                    problems.push(format!(
                        "{}/{}: {} bytes ({} records) but calendar has {} dates",
                        report.instrument,
                        feature.field,
                        feature.bytes,
                        feature.records,
                        self.calendar_len
                    ));
                }
            }
        }
        problems
    }

    pub fn is_consistent(&self) -> bool {
        self.problems().is_empty()
    }
}

/// Read the store back the way a consumer does: the calendar fixes the
/// record count, and every feature file must hold exactly that many
/// 4-byte records.
pub fn inspect_store(layout: &StoreLayout, market: &str) -> Result<StoreReport> {
    let calendar = Calendar::read(layout)?;
    let instruments = read_market(layout, market)?;

    let mut reports = Vec::with_capacity(instruments.len());
    for instrument in instruments {
        let directory = layout.instrument_dir(&instrument);
        let directory_present = directory.is_dir();
        let features = if directory_present {
            inspect_instrument_dir(&directory, calendar.len())?
        } else {
            Vec::new()
        };
        reports.push(InstrumentReport {
            instrument,
            directory,
            directory_present,
            features,
        });
    }

    Ok(StoreReport {
        root: layout.root().to_path_buf(),
        market: market.to_string(),
        calendar_len: calendar.len(),
        first_date: calendar.first(),
        last_date: calendar.last(),
        instruments: reports,
        fingerprint: store_fingerprint(layout)?,
    })
}

fn inspect_instrument_dir(directory: &Path, calendar_len: usize) -> Result<Vec<FeatureReport>> {
    let suffix = format!(".{FREQ}.bin");
    let mut features = Vec::new();
    for entry in fs::read_dir(directory).at_path(directory)? {
        let path = entry.at_path(directory)?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(field) = name.strip_suffix(suffix.as_str()) else {
            continue;
        };

        let bytes = fs::metadata(&path).at_path(&path)?.len();
        let whole = bytes % RECORD_BYTES as u64 == 0;
        let records = (bytes / RECORD_BYTES as u64) as usize;
        let observed = if whole {
            read_feature(&path)?.iter().filter(|v| !v.is_nan()).count()
        } else {
            0
        };
        features.push(FeatureReport {
            field: field.to_string(),
            bytes,
            records,
            observed,
            matches_calendar: whole && records == calendar_len,
        });
    }
    features.sort_by(|a, b| a.field.cmp(&b.field));
    Ok(features)
}

/// SHA-256 over every file of the store (calendars, instruments, features)
/// in sorted relative-path order, covering both names and contents. Equal
/// stores give equal fingerprints regardless of write order.
pub fn store_fingerprint(layout: &StoreLayout) -> Result<String> {
    let root = layout.root();
    let mut files = Vec::new();
    for dir in [CALENDARS_DIR, INSTRUMENTS_DIR, FEATURES_DIR] {
        let path = root.join(dir);
        if path.is_dir() {
            collect_files(&path, &mut files)?;
        }
    }

    let mut entries: Vec<(String, PathBuf)> = files
        .into_iter()
        .map(|path| (relative_key(root, &path), path))
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    for (key, path) in entries {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        let mut file = File::open(&path).at_path(&path)?;
        let mut len = 0u64;
        loop {
            let read = file.read(&mut buffer).at_path(&path)?;
            if read == 0 {
                break;
            }
            len += read as u64;
            hasher.update(&buffer[..read]);
        }
        hasher.update(len.to_le_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).at_path(dir)? {
        let path = entry.at_path(dir)?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::write_text_file;
    use tempfile::tempdir;

    #[test]
    fn fingerprint_tracks_names_and_contents() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let layout = StoreLayout::new(temp_dir.path());
        write_text_file(&layout.calendar_path(), "2024-01-02\n")?;
        write_text_file(&layout.market_path("all"), "A\n")?;

        let first = store_fingerprint(&layout)?;
        assert_eq!(first, store_fingerprint(&layout)?);

        // Files outside the store layout do not count.
        std::fs::write(temp_dir.path().join("featstore.log"), "noise")?;
        assert_eq!(first, store_fingerprint(&layout)?);

        write_text_file(&layout.market_path("all"), "B\n")?;
        assert_ne!(first, store_fingerprint(&layout)?);
        Ok(())
    }

    #[test]
    fn inspect_flags_missing_directories_and_short_files() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let layout = StoreLayout::new(temp_dir.path());
        write_text_file(&layout.calendar_path(), "2024-01-02\n2024-01-03\n")?;
        write_text_file(&layout.market_path("all"), "A.SH\nB.SH\n")?;
        std::fs::create_dir_all(layout.instrument_dir("A.SH"))?;
        std::fs::write(layout.feature_path("A.SH", "close"), [0u8; 4])?;

        let report = inspect_store(&layout, "all")?;
        assert_eq!(report.calendar_len, 2);
        assert_eq!(report.instruments.len(), 2);
        let a = &report.instruments[0];
        assert_eq!(a.features.len(), 1);
        assert_eq!(a.features[0].field, "close");
        assert_eq!(a.features[0].records, 1);
        assert_eq!(a.features[0].observed, 1);
        assert!(!a.features[0].matches_calendar);
        assert!(!report.instruments[1].directory_present);

        let problems = report.problems();
        assert_eq!(problems.len(), 2, "{problems:?}");
        assert!(!report.is_consistent());
        Ok(())
    }
}
