use std::fs;

use anyhow::Result;
use featstore_rs::{
    Config, ConversionPipeline, FieldMapping, InstrumentIndex, ObservationTable, StoreLayout,
    build_calendar, serialize,
};
use tempfile::tempdir;

const SAMPLE: &str = "\
ts_code,trade_date,close
512690.SH,20240102,1.5
159919.SZ,20240102,2.5
";

#[test]
fn blocked_features_dir_fails_after_calendar_and_instruments() -> Result<()> {
    let temp_dir = tempdir()?;
    let csv_path = temp_dir.path().join("etf_daily.csv");
    fs::write(&csv_path, SAMPLE)?;
    let output_dir = temp_dir.path().join("store");
    fs::create_dir_all(&output_dir)?;
    // A plain file where the features directory belongs makes the last
    // stage unwritable while the earlier ones still succeed.
    fs::write(output_dir.join("features"), "not a directory")?;

    let err = ConversionPipeline::new(Config::new(&csv_path, &output_dir))
        .run()
        .unwrap_err();
    assert!(err.is_io(), "unexpected error: {err}");

    let layout = StoreLayout::new(&output_dir);
    assert_eq!(fs::read_to_string(layout.calendar_path())?, "2024-01-02\n");
    assert_eq!(
        fs::read_to_string(layout.market_path("all"))?,
        "159919.SZ\n512690.SH\n"
    );
    assert!(layout.features_dir().is_file());
    Ok(())
}

#[test]
fn output_root_that_is_a_file_fails_before_writing_anything() -> Result<()> {
    let temp_dir = tempdir()?;
    let csv_path = temp_dir.path().join("etf_daily.csv");
    fs::write(&csv_path, SAMPLE)?;
    let output_dir = temp_dir.path().join("store");
    fs::write(&output_dir, "occupied")?;

    let err = ConversionPipeline::new(Config::new(&csv_path, &output_dir))
        .run()
        .unwrap_err();
    assert!(err.is_io(), "unexpected error: {err}");
    assert_eq!(fs::read_to_string(&output_dir)?, "occupied");
    Ok(())
}

#[test]
fn unparseable_date_aborts_before_any_output() -> Result<()> {
    let temp_dir = tempdir()?;
    let csv_path = temp_dir.path().join("bad_dates.csv");
    fs::write(
        &csv_path,
        "ts_code,trade_date,close\n512690.SH,20240102,1.5\n512690.SH,2024.01.03,1.6\n",
    )?;
    let output_dir = temp_dir.path().join("store");

    let err = ConversionPipeline::new(Config::new(&csv_path, &output_dir))
        .run()
        .unwrap_err();
    assert!(err.is_format(), "unexpected error: {err}");
    assert!(err.to_string().contains("line 3"), "{err}");
    assert!(!output_dir.exists());
    Ok(())
}

#[test]
fn missing_instrument_column_is_a_format_error() -> Result<()> {
    let temp_dir = tempdir()?;
    let csv_path = temp_dir.path().join("no_code.csv");
    fs::write(&csv_path, "code,trade_date,close\n512690.SH,20240102,1.5\n")?;
    let output_dir = temp_dir.path().join("store");

    let err = ConversionPipeline::new(Config::new(&csv_path, &output_dir))
        .run()
        .unwrap_err();
    assert!(err.is_format(), "unexpected error: {err}");
    assert!(!output_dir.exists());

    // The same file converts once the column name is configured.
    let mut config = Config::new(&csv_path, &output_dir);
    config.instrument_column = "code".to_string();
    let summary = ConversionPipeline::new(config).run()?;
    assert_eq!(summary.instruments, 1);
    Ok(())
}

#[test]
fn missing_source_file_is_an_io_error() -> Result<()> {
    let temp_dir = tempdir()?;
    let output_dir = temp_dir.path().join("store");
    let err = ConversionPipeline::new(Config::new(
        temp_dir.path().join("does_not_exist.csv"),
        &output_dir,
    ))
    .run()
    .unwrap_err();
    assert!(err.is_io(), "unexpected error: {err}");
    assert!(!output_dir.exists());
    Ok(())
}

#[test]
fn instrument_id_leaving_the_store_is_rejected() -> Result<()> {
    let temp_dir = tempdir()?;
    let csv_path = temp_dir.path().join("escape.csv");
    fs::write(
        &csv_path,
        "ts_code,trade_date,close\n512690.SH,20240102,1.5\n../../escaped,20240102,1.0\n",
    )?;
    let output_dir = temp_dir.path().join("store");

    let err = ConversionPipeline::new(Config::new(&csv_path, &output_dir))
        .run()
        .unwrap_err();
    assert!(err.is_format(), "unexpected error: {err}");
    assert!(err.to_string().contains("line 3"), "{err}");
    assert!(!output_dir.exists());
    assert!(!temp_dir.path().join("escaped").exists());

    fs::write(
        &csv_path,
        "ts_code,trade_date,close\nok/nested,20240102,1.0\n",
    )?;
    let err = ConversionPipeline::new(Config::new(&csv_path, &output_dir))
        .run()
        .unwrap_err();
    assert!(err.is_format(), "unexpected error: {err}");
    assert!(!output_dir.exists());
    Ok(())
}

#[test]
fn ids_differing_only_in_case_are_rejected() -> Result<()> {
    let temp_dir = tempdir()?;
    let csv_path = temp_dir.path().join("case.csv");
    fs::write(
        &csv_path,
        "ts_code,trade_date,close\nA.SH,20240102,1.0\na.SH,20240102,2.0\n",
    )?;
    let output_dir = temp_dir.path().join("store");

    let err = ConversionPipeline::new(Config::new(&csv_path, &output_dir))
        .run()
        .unwrap_err();
    assert!(err.is_format(), "unexpected error: {err}");
    assert!(err.to_string().contains("'a.sh'"), "{err}");
    assert!(!output_dir.exists());
    Ok(())
}

#[test]
fn serializer_refuses_an_index_with_clashing_directories() -> Result<()> {
    let temp_dir = tempdir()?;
    let layout = StoreLayout::new(temp_dir.path().join("store"));
    let table = ObservationTable::from_rows(vec!["close".to_string()], Vec::new());
    let calendar = build_calendar(&table);
    let instruments = InstrumentIndex::from_ids(["A.SH", "a.SH"]);

    let err = serialize(
        &table,
        &calendar,
        &instruments,
        &[FieldMapping::new("close", "close")],
        &layout,
    )
    .unwrap_err();
    assert!(err.is_format(), "unexpected error: {err}");
    assert!(!layout.features_dir().exists());
    Ok(())
}
