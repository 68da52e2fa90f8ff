use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use featstore_rs::config::{Config, FieldMapping, default_field_mapping};
use featstore_rs::layout::DEFAULT_MARKET;

#[derive(Parser, Debug)]
#[command(
    name = "featstore",
    about = "Convert daily CSV market data into a columnar day-bin feature store"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a CSV into calendars/, instruments/ and features/
    #[command(name = "convert")]
    Convert(ConvertArgs),
    /// Write a custom market file (instruments/<name>.txt)
    #[command(name = "market")]
    Market(MarketArgs),
    /// Strip extra columns from an instruments file, keeping a backup
    #[command(name = "fix-instruments")]
    FixInstruments(FixInstrumentsArgs),
    /// Check a store for calendar/feature length mismatches
    #[command(name = "inspect")]
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Path to the source CSV keyed by (instrument, date)
    #[arg(long = "csv", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub csv_path: Option<PathBuf>,

    /// Root directory of the feature store
    #[arg(long = "output-dir", value_hint = clap::ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// JSON config file; command-line flags override its values
    #[arg(long = "config", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Column holding the instrument id
    #[arg(long = "instrument-column")]
    pub instrument_column: Option<String>,

    /// Column holding the trade date (YYYYMMDD or YYYY-MM-DD)
    #[arg(long = "date-column")]
    pub date_column: Option<String>,

    /// Field mapping SRC=DST (repeatable). Replaces the default
    /// open/high/low/close/vol=volume/amount=money mapping.
    #[arg(long = "field", value_name = "SRC=DST")]
    pub fields: Vec<String>,

    /// Name of the instruments file written for the full index
    #[arg(long = "market")]
    pub market: Option<String>,

    /// Disable writing featstore.log into the output directory (from
    /// --output-dir or the config file). When set, logs only go to stdout.
    #[arg(long = "no-file-log", default_value_t = false)]
    pub no_file_log: bool,
}

impl ConvertArgs {
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_path(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => {
                let csv_path = self
                    .csv_path
                    .clone()
                    .context("--csv is required unless --config is given")?;
                let output_dir = self
                    .output_dir
                    .clone()
                    .context("--output-dir is required unless --config is given")?;
                Config::new(csv_path, output_dir)
            }
        };

        if let Some(csv_path) = self.csv_path {
            config.source_csv = csv_path;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(column) = self.instrument_column {
            config.instrument_column = column;
        }
        if let Some(column) = self.date_column {
            config.date_column = column;
        }
        if let Some(market) = self.market {
            config.market = market;
        }
        if !self.fields.is_empty() {
            config.field_mapping = parse_field_mappings(&self.fields)?;
        } else if config.field_mapping.is_empty() {
            config.field_mapping = default_field_mapping();
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_field_mappings(raw: &[String]) -> Result<Vec<FieldMapping>> {
    raw
        .iter()
        .map(|item| FieldMapping::parse(item).map_err(Into::into))
        .collect()
}

#[derive(Parser, Debug)]
pub struct MarketArgs {
    /// Root directory of the feature store
    #[arg(long = "output-dir", value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// Market name; written to instruments/<name>.txt
    #[arg(long = "name")]
    pub name: String,

    /// Instrument ids, written in the order given
    #[arg(required = true, num_args = 1..)]
    pub instruments: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct FixInstrumentsArgs {
    /// Instruments file to normalize (e.g. <store>/instruments/all.txt)
    #[arg(long = "file", value_hint = clap::ValueHint::FilePath)]
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Root directory of the feature store
    #[arg(long = "output-dir", value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// Instruments file to check against
    #[arg(long = "market", default_value = DEFAULT_MARKET)]
    pub market: String,

    /// Print the full report as JSON
    #[arg(long = "json", default_value_t = false)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_flags_build_config() {
        let cli = Cli::parse_from([
            "featstore",
            "convert",
            "--csv",
            "etf_daily.csv",
            "--output-dir",
            "etf_data",
            "--field",
            "close",
            "--field",
            "vol=volume",
        ]);
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.source_csv, PathBuf::from("etf_daily.csv"));
        assert_eq!(
            config.field_mapping,
            vec![
                FieldMapping::new("close", "close"),
                FieldMapping::new("vol", "volume")
            ]
        );
        assert_eq!(config.market, "all");
    }

    #[test]
    fn convert_without_csv_or_config_is_rejected() {
        let cli = Cli::parse_from(["featstore", "convert", "--output-dir", "etf_data"]);
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert!(args.into_config().is_err());
    }
}
