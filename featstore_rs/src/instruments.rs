use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{IoPathExt, Result, StoreError};
use crate::layout::{
    StoreLayout, is_valid_instrument_id, render_lines, validate_file_stem, write_text_file,
};
use crate::table::ObservationTable;

/// Ascending, distinct instrument ids in their original case. Ordering is
/// byte-lexicographic, so `a.SH` sorts after `A.SH`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentIndex {
    ids: Vec<String>,
}

impl InstrumentIndex {
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        Self {
            ids: unique.into_iter().collect(),
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .binary_search_by(|probe| probe.as_str().cmp(id))
            .is_ok()
    }

    pub fn render(&self) -> String {
        render_lines(&self.ids)
    }

    /// Overwrite `instruments/<market>.txt` with the full index.
    pub fn write(&self, layout: &StoreLayout, market: &str) -> Result<PathBuf> {
        validate_file_stem(market)?;
        let path = layout.market_path(market);
        write_text_file(&path, &self.render())?;
        Ok(path)
    }
}

pub fn build_instrument_index(table: &ObservationTable) -> InstrumentIndex {
    InstrumentIndex::from_ids(table.instruments())
}

/// Every id must be usable as a feature directory name, and no two distinct
/// ids may lowercase to the same directory.
pub fn check_instrument_dirs<'a, I>(ids: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: BTreeMap<String, &'a str> = BTreeMap::new();
    for id in ids {
        if !is_valid_instrument_id(id) {
            return Err(StoreError::format(format!(
                "instrument id '{id}' cannot be used as a directory name"
            )));
        }
        let dir = id.to_lowercase();
        match seen.get(&dir) {
            Some(&first) if first != id => {
                return Err(StoreError::format(format!(
                    "instrument ids '{first}' and '{id}' share feature directory '{dir}'"
                )));
            }
            Some(_) => {}
            None => {
                seen.insert(dir, id);
            }
        }
    }
    Ok(())
}

/// Keep the first column of every non-empty line. Lines holding a tab are
/// split on tabs (the `ID\tSTART\tEND` form), others on whitespace.
pub fn parse_instrument_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter_map(|line| {
            if line.contains('\t') {
                line.split('\t').next().map(str::trim)
            } else {
                line.split_whitespace().next()
            }
        })
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Instrument ids listed in `path`, in file order.
pub fn read_instrument_list(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path).at_path(path)?;
    Ok(parse_instrument_lines(&raw))
}

pub fn read_market(layout: &StoreLayout, market: &str) -> Result<Vec<String>> {
    validate_file_stem(market)?;
    read_instrument_list(&layout.market_path(market))
}

/// Write a custom market file listing `ids` in the given order.
pub fn write_market<S: AsRef<str>>(
    layout: &StoreLayout,
    market: &str,
    ids: &[S],
) -> Result<PathBuf> {
    validate_file_stem(market)?;
    for id in ids {
        let id = id.as_ref();
        if !is_valid_instrument_id(id) {
            return Err(StoreError::InvalidConfig(format!(
                "instrument id '{id}' cannot be used as a directory name"
            )));
        }
    }
    let path = layout.market_path(market);
    write_text_file(&path, &render_lines(ids))?;
    info!(
        market,
        instruments = ids.len(),
        path = %path.display(),
        "custom market written"
    );
    Ok(path)
}

/// Rewrite an instruments file so each line holds only the bare id. The
/// original content is copied to `<name>.txt.backup` first.
pub fn repair_instrument_file(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path).at_path(path)?;
    let ids = parse_instrument_lines(&raw);

    let backup = path.with_extension("txt.backup");
    fs::write(&backup, raw.as_bytes()).at_path(&backup)?;
    write_text_file(path, &render_lines(&ids))?;

    info!(
        path = %path.display(),
        backup = %backup.display(),
        lines = raw.lines().count(),
        instruments = ids.len(),
        "instrument file repaired"
    );
    Ok(ids)
}
