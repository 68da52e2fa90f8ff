use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoPathExt, Result, StoreError};

pub const CALENDARS_DIR: &str = "calendars";
pub const INSTRUMENTS_DIR: &str = "instruments";
pub const FEATURES_DIR: &str = "features";
/// Frequency tag used in both the calendar file name and feature file suffix.
pub const FREQ: &str = "day";
pub const DEFAULT_MARKET: &str = "all";

/// Directory convention of the feature store:
///
/// ```text
/// <root>/calendars/day.txt
/// <root>/instruments/<market>.txt
/// <root>/features/<lowercased instrument>/<field>.day.bin
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn calendars_dir(&self) -> PathBuf {
        self.root.join(CALENDARS_DIR)
    }

    pub fn calendar_path(&self) -> PathBuf {
        self.calendars_dir().join(format!("{FREQ}.txt"))
    }

    pub fn instruments_dir(&self) -> PathBuf {
        self.root.join(INSTRUMENTS_DIR)
    }

    pub fn market_path(&self, market: &str) -> PathBuf {
        self.instruments_dir().join(format!("{market}.txt"))
    }

    pub fn features_dir(&self) -> PathBuf {
        self.root.join(FEATURES_DIR)
    }

    /// Directory segment is lowercased; the id keeps its case everywhere else.
    pub fn instrument_dir(&self, instrument: &str) -> PathBuf {
        self.features_dir().join(instrument.to_lowercase())
    }

    pub fn feature_path(&self, instrument: &str, field: &str) -> PathBuf {
        self.instrument_dir(instrument)
            .join(format!("{field}.{FREQ}.bin"))
    }
}

/// Field and market names end up as file stems, so they must not carry
/// separators or be empty.
pub fn validate_file_stem(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(StoreError::InvalidConfig(format!(
            "'{name}' is not usable as a file name"
        )));
    }
    Ok(())
}

/// Instrument ids name a directory under `features/` and a line of an
/// instruments file: one path segment, no whitespace.
pub fn is_valid_instrument_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// Render one entry per line with a trailing newline after the last entry.
/// An empty list renders as an empty file.
pub fn render_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}

/// Overwrite `path` with `contents`, creating parent directories first.
pub fn write_text_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at_path(parent)?;
    }
    fs::write(path, contents).at_path(path)
}
