use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use snapshot_delta::{parse_date, run, ColumnLayout, RunConfig, RunMode, Window};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snapshot-delta", version)]
#[command(about = "Per-entity record-count deltas between two points in a snapshot file")]
#[command(after_help = "Modes:\n  \
    snapshot-delta INPUT OUTPUT                earliest vs latest snapshot\n  \
    snapshot-delta START END INPUT OUTPUT      inclusive date window (YYYY-MM-DD)")]
struct Cli {
    /// [START END] INPUT OUTPUT
    #[arg(num_args = 2..=4, required = true, value_name = "ARGS")]
    args: Vec<String>,

    /// JSON object of extra name overrides: { "RAW": "CANONICAL" }
    #[arg(long, env = "SNAPSHOT_DELTA_OVERRIDES")]
    overrides: Option<PathBuf>,

    /// JSON column layout for inputs with other header names
    #[arg(long, env = "SNAPSHOT_DELTA_COLUMNS")]
    columns: Option<PathBuf>,

    /// Write a JSON run summary here
    #[arg(long)]
    summary: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(cli)?;
    let report = run(&config)?;

    println!("✓ {} entities written to {}", report.entity_count, report.output_file);
    println!(
        "  {} computable, {} not computable, {} substitutions",
        report.computable_count, report.not_computable_count, report.substitution_count
    );

    Ok(())
}

fn build_config(cli: Cli) -> Result<RunConfig> {
    let (mode, input, output) = match cli.args.as_slice() {
        [input, output] => (RunMode::FullTimeline, input, output),
        [start, end, input, output] => {
            let start = parse_date(start)
                .with_context(|| format!("Invalid start date '{}', expected YYYY-MM-DD", start))?;
            let end = parse_date(end)
                .with_context(|| format!("Invalid end date '{}', expected YYYY-MM-DD", end))?;
            (RunMode::Windowed(Window::new(start, end)?), input, output)
        }
        other => Cli::command()
            .error(
                ErrorKind::WrongNumberOfValues,
                format!("expected 2 or 4 arguments, got {}", other.len()),
            )
            .exit(),
    };

    let columns = match &cli.columns {
        Some(path) => ColumnLayout::from_file(path)?,
        None => ColumnLayout::default(),
    };

    Ok(RunConfig {
        input: PathBuf::from(input),
        output: PathBuf::from(output),
        mode,
        columns,
        overrides: cli.overrides,
        summary: cli.summary,
    })
}
