mod cli;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use cli::{Cli, Commands, FixInstrumentsArgs, InspectArgs, MarketArgs};
use featstore_rs::{
    Config, ConversionPipeline, StoreLayout, inspect_store, repair_instrument_file, write_market,
};
use tracing_appender::non_blocking;
use tracing_subscriber::{EnvFilter, prelude::*};

const LOG_FILE_NAME: &str = "featstore.log";

fn init_tracing(log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (non_blocking_writer, guard) = non_blocking(file);
        // Leak the guard so the non-blocking writer stays alive for the
        // duration of the process.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking_writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn log_invocation(log_file: Option<&PathBuf>) {
    let cwd = std::env::current_dir().ok();
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        cwd = ?cwd,
        log_file = ?log_file,
        argv = ?argv,
        "featstore invoked"
    );
}

fn run_convert(config: Config) -> Result<()> {
    let source = config.source_csv.clone();
    let summary = ConversionPipeline::new(config)
        .run()
        .with_context(|| format!("Conversion of {} failed", source.display()))?;

    if !summary.features.missing_instruments.is_empty() {
        tracing::warn!(
            instruments = ?summary.features.missing_instruments,
            "instruments without observations were written as all-NaN"
        );
    }
    tracing::info!(
        rows = summary.rows,
        dates = summary.calendar_len,
        instruments = summary.instruments,
        files = summary.features.files_written,
        fields = ?summary.features.fields_written,
        skipped = ?summary.features.fields_skipped,
        "conversion complete"
    );
    Ok(())
}

fn run_market(args: MarketArgs) -> Result<()> {
    let layout = StoreLayout::new(&args.output_dir);
    let path = write_market(&layout, &args.name, &args.instruments)?;
    println!("{}", path.display());
    Ok(())
}

fn run_fix_instruments(args: FixInstrumentsArgs) -> Result<()> {
    let ids = repair_instrument_file(&args.file)
        .with_context(|| format!("Failed to repair {}", args.file.display()))?;
    println!("{} instruments written to {}", ids.len(), args.file.display());
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let layout = StoreLayout::new(&args.output_dir);
    let report = inspect_store(&layout, &args.market)
        .with_context(|| format!("Failed to inspect {}", args.output_dir.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report_summary(&report, layout.root());
    }

    let problems = report.problems();
    for problem in &problems {
        tracing::warn!("{problem}");
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "store at {} has {} problem(s)",
            args.output_dir.display(),
            problems.len()
        ))
    }
}

fn print_report_summary(report: &featstore_rs::StoreReport, root: &Path) {
    let range = match (report.first_date, report.last_date) {
        (Some(first), Some(last)) => format!("{first} .. {last}"),
        _ => "empty".to_string(),
    };
    println!("store:       {}", root.display());
    println!("calendar:    {} dates ({range})", report.calendar_len);
    println!(
        "market:      {} ({} instruments)",
        report.market,
        report.instruments.len()
    );
    println!("fingerprint: {}", report.fingerprint);
    for instrument in &report.instruments {
        let fields: Vec<String> = instrument
            .features
            .iter()
            .map(|f| format!("{}={}/{}", f.field, f.observed, f.records))
            .collect();
        println!("  {:<12} {}", instrument.instrument, fields.join(" "));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert(args) => {
            // The log lives in the output directory, which may only be known
            // once the config file has been read.
            let no_file_log = args.no_file_log;
            let config = args.into_config()?;
            let log_file = (!no_file_log).then(|| config.output_dir.join(LOG_FILE_NAME));
            start_logging(log_file)?;
            run_convert(config)
        }
        Commands::Market(args) => {
            start_logging(None)?;
            run_market(args)
        }
        Commands::FixInstruments(args) => {
            start_logging(None)?;
            run_fix_instruments(args)
        }
        Commands::Inspect(args) => {
            start_logging(None)?;
            run_inspect(args)
        }
    }
}

fn start_logging(log_file: Option<PathBuf>) -> Result<()> {
    init_tracing(log_file.clone())?;
    log_invocation(log_file.as_ref());
    Ok(())
}
