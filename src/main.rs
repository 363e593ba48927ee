use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

use election_auditor::{
    classify, export_filename, log_filter, write_csv, AlterationEvent, ClientConfig, DataLake, ExportConfig, VisionExtraction,
    CONFIG_ENV_VAR,
};

#[derive(Parser, Debug)]
#[command(name = "election-auditor", version, about = "Election act auditor")]
struct Cli {
    /// Client config JSON (client name, rivals, strict ethics)
    #[arg(long, global = true, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a JSON array of alteration events
    Classify { events: PathBuf },

    /// Turn a vision backend extraction into a classified record
    Analyze { extraction: PathBuf },

    /// Search records by table, zone, or id
    Search { records: PathBuf, term: String },

    /// Export records to CSV
    Export {
        records: PathBuf,

        /// Comma-separated column keys (defaults to the standard export set)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Output file; `-` writes to stdout, omitted uses auditor_export_<date>.csv
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // stdout carries JSON/CSV output, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify { events } => run_classify(&events, &config),
        Commands::Analyze { extraction } => run_analyze(&extraction, &config),
        Commands::Search { records, term } => run_search(&records, &term),
        Commands::Export {
            records,
            columns,
            start,
            end,
            output,
        } => {
            let mut export = if columns.is_empty() {
                ExportConfig::default()
            } else {
                ExportConfig::with_columns(&columns)
            };
            export.start_date = start;
            export.end_date = end;
            run_export(&records, &export, output)
        }
    }
}

fn run_classify(path: &Path, config: &ClientConfig) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read events file: {:?}", path))?;
    let events: Vec<AlterationEvent> =
        serde_json::from_str(&content).context("Failed to parse events JSON")?;

    let result = classify(&events, config);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_analyze(path: &Path, config: &ClientConfig) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read extraction file: {:?}", path))?;

    let record = VisionExtraction::parse(&content)?.into_record(config, Utc::now());
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn run_search(path: &Path, term: &str) -> Result<()> {
    let lake = DataLake::from_file(path)?;
    let hits = lake.search(term);
    let summary = lake.summary();

    info!(
        term = %term,
        hits = hits.len(),
        total = summary.total,
        fraud = summary.fraud,
        arithmetic_mismatches = summary.arithmetic_mismatches,
        "Search finished"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "summary": summary, "hits": hits }))?
    );
    Ok(())
}

fn run_export(path: &Path, export: &ExportConfig, output: Option<PathBuf>) -> Result<()> {
    let lake = DataLake::from_file(path)?;
    let today = Utc::now().date_naive();

    let records: Vec<_> = lake
        .records()
        .iter()
        .filter(|r| export.includes(r, today))
        .collect();
    let columns = export.selected_columns();

    let target = output.unwrap_or_else(|| PathBuf::from(export_filename(today)));
    if target.as_os_str() == "-" {
        let stdout = io::stdout();
        write_csv(&mut stdout.lock(), records.iter().copied(), &columns)?;
    } else {
        let file = File::create(&target)
            .with_context(|| format!("Failed to create export file: {:?}", target))?;
        write_csv(&mut BufWriter::new(file), records.iter().copied(), &columns)?;
    }

    info!(
        rows = records.len(),
        columns = columns.len(),
        output = %target.display(),
        "Export complete"
    );
    Ok(())
}
