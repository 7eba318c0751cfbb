use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use seatwatch_cli::{AppConfig, Cli, RunSettings, RunSummary};
use seatwatch_core::ReportError;
use seatwatch_infra::{CatalogResolver, ExportOutcome, GraphDirectory, HttpCatalogSource, XlsxExporter};

/// Exit status when at least one report could only be kept as CSV.
const EXIT_EXPORT_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    seatwatch_observability::init(cli.log_format.parse().unwrap_or_default());

    match run(cli).await {
        Ok(summary) if summary.export_failed() => ExitCode::from(EXIT_EXPORT_FAILED),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "seatwatch failed");
            eprintln!("seatwatch: {e:#}");
            match e.downcast_ref::<ReportError>() {
                Some(report_error) if !report_error.is_fatal() => ExitCode::from(EXIT_EXPORT_FAILED),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunSummary> {
    let config = AppConfig::from_cli(cli)?;

    let destination = match config.output_dir.clone() {
        Some(dir) => dir,
        None => tokio::task::spawn_blocking(prompt_destination)
            .await
            .context("destination prompt")??,
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling run");
            trigger.cancel();
        }
    });

    let http = reqwest::Client::builder()
        .user_agent(concat!("seatwatch/", env!("CARGO_PKG_VERSION")))
        .timeout(config.http_timeout)
        .build()
        .context("building HTTP client")?;
    let directory = GraphDirectory::new(http.clone(), config.graph.clone());
    let catalog = CatalogResolver::new(HttpCatalogSource::new(http), config.catalog.clone());
    let settings = RunSettings::from_config(&config, destination);

    info!(
        tenant = %config.graph.tenant_id,
        concurrency = config.concurrency,
        exclusions = config.exclusions.len(),
        "starting report run"
    );
    let summary = seatwatch_cli::run(&directory, &catalog, XlsxExporter::default(), &settings, &cancel).await?;

    for outcome in &summary.exports {
        match outcome {
            ExportOutcome::Written(artifact) => {
                println!("{} report: {} ({} rows)", artifact.kind, artifact.path.display(), artifact.rows);
            }
            ExportOutcome::Failed { kind, error, fallback } => {
                match fallback {
                    Some(path) => println!("{kind} report: {error}; data kept in {}", path.display()),
                    None => println!("{kind} report: {error}; no data written"),
                }
            }
        }
    }
    if !summary.user_failures.is_empty() {
        println!("{} user(s) could not be resolved; see the log", summary.user_failures.len());
    }

    Ok(summary)
}

fn prompt_destination() -> anyhow::Result<PathBuf> {
    let mut stdout = io::stdout();
    write!(stdout, "Destination directory for the reports: ")?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("reading destination")?;
    let path = line.trim();
    if path.is_empty() {
        return Err(ReportError::config("no destination directory given").into());
    }
    Ok(PathBuf::from(path))
}
