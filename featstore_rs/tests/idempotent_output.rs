use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use featstore_rs::{Config, ConversionPipeline, StoreLayout, store_fingerprint};
use tempfile::tempdir;

const HEADER: &str = "ts_code,trade_date,open,high,low,close,vol,amount";

const ROWS: [&str; 8] = [
    "159919.SZ,20230320,4.0,4.25,3.75,4.125,1000,4000.5",
    "159919.SZ,20230321,4.125,4.5,4.0,4.25,1100,4500.25",
    "159919.SZ,20230323,4.25,4.5,4.0,4.5,900,",
    "512690.SH,20230320,0.75,0.875,0.625,0.8125,2000,1600",
    "512690.SH,20230322,0.8125,0.875,0.75,0.875,2100,1800",
    "512690.SH,20230323,0.875,1.0,0.75,0.9375,2200,2000",
    "510300.SH,20230321,4.0,4.0,4.0,4.0,3000,12000",
    "510300.SH,20230322,4.0,4.5,3.5,4.25,3100,13000",
];

fn write_csv(path: &Path, order: &[usize]) -> Result<()> {
    let mut csv = String::from(HEADER);
    csv.push('\n');
    for &idx in order {
        csv.push_str(ROWS[idx]);
        csv.push('\n');
    }
    fs::write(path, csv)?;
    Ok(())
}

/// Relative path -> bytes for every file below `root`.
fn snapshot(root: &Path) -> Result<BTreeMap<PathBuf, Vec<u8>>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(root, &path, out)?;
            } else {
                out.insert(path.strip_prefix(root)?.to_path_buf(), fs::read(&path)?);
            }
        }
        Ok(())
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out)?;
    Ok(out)
}

#[test]
fn rerunning_the_pipeline_is_byte_identical() -> Result<()> {
    let temp_dir = tempdir()?;
    let csv_path = temp_dir.path().join("etf_daily.csv");
    write_csv(&csv_path, &[0, 1, 2, 3, 4, 5, 6, 7])?;
    let output_dir = temp_dir.path().join("store");
    let pipeline = ConversionPipeline::new(Config::new(&csv_path, &output_dir));

    pipeline.run()?;
    let first = snapshot(&output_dir)?;
    let first_fingerprint = store_fingerprint(&StoreLayout::new(&output_dir))?;

    pipeline.run()?;
    let second = snapshot(&output_dir)?;
    assert_eq!(first, second);
    assert_eq!(
        first_fingerprint,
        store_fingerprint(&StoreLayout::new(&output_dir))?
    );

    // 1 calendar + 1 instrument list + 3 instruments x 6 fields.
    assert_eq!(first.len(), 2 + 3 * 6);
    Ok(())
}

#[test]
fn shuffled_input_rows_produce_identical_output() -> Result<()> {
    let temp_dir = tempdir()?;

    let ordered_csv = temp_dir.path().join("ordered.csv");
    write_csv(&ordered_csv, &[0, 1, 2, 3, 4, 5, 6, 7])?;
    let ordered_out = temp_dir.path().join("ordered_store");
    ConversionPipeline::new(Config::new(&ordered_csv, &ordered_out)).run()?;

    let shuffled_csv = temp_dir.path().join("shuffled.csv");
    write_csv(&shuffled_csv, &[5, 2, 7, 0, 3, 6, 1, 4])?;
    let shuffled_out = temp_dir.path().join("shuffled_store");
    ConversionPipeline::new(Config::new(&shuffled_csv, &shuffled_out)).run()?;

    assert_eq!(snapshot(&ordered_out)?, snapshot(&shuffled_out)?);
    assert_eq!(
        store_fingerprint(&StoreLayout::new(&ordered_out))?,
        store_fingerprint(&StoreLayout::new(&shuffled_out))?
    );
    Ok(())
}
