//! Keyplane CLI entrypoint.
//!
//! This is the main entrypoint for the keyplane command-line tool.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use keyplane::apply::{import_resources, RunDriver};
use keyplane::cli::{Cli, Commands, OutputFormatter};
use keyplane::config::EngineConfig;
use keyplane::error::Result;
use keyplane::provider::SnapshotProvider;
use keyplane::report::DEFAULT_REPORT_PATH;
use keyplane::template::FsTemplateStore;

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let driver = build_driver(&cli)?;

    match cli.command {
        Commands::Validate => cmd_validate(&driver, &cli.repo_dir).await,
        Commands::Plan { report } => {
            let report_path = report.unwrap_or_else(|| DEFAULT_REPORT_PATH.into());
            let reports = driver.run_plan(&cli.repo_dir, &report_path).await?;
            eprintln!("{}", formatter.format_reports(&reports));
            Ok(())
        }
        Commands::Apply { yes, report } => {
            let report_path = report.unwrap_or_else(|| DEFAULT_REPORT_PATH.into());
            cmd_apply(&driver, &cli.repo_dir, &report_path, yes, &formatter).await
        }
        Commands::Detect => cmd_detect(&driver, &cli.repo_dir, &formatter).await,
        Commands::Import => cmd_import(&driver, &cli.repo_dir).await,
    }
}

fn build_driver(cli: &Cli) -> Result<RunDriver<SnapshotProvider, FsTemplateStore>> {
    let config = EngineConfig::load(&cli.config)?;
    let provider = SnapshotProvider::open(&cli.state)?;
    Ok(RunDriver::new(config, provider, FsTemplateStore::new()))
}

/// Validate every template in the repository.
async fn cmd_validate(
    driver: &RunDriver<SnapshotProvider, FsTemplateStore>,
    repo_dir: &Path,
) -> Result<()> {
    let templates = driver.load_templates(repo_dir).await?;
    eprintln!("{} template(s) valid.", templates.len());
    Ok(())
}

/// Apply templates with confirmation.
async fn cmd_apply(
    driver: &RunDriver<SnapshotProvider, FsTemplateStore>,
    repo_dir: &Path,
    report_path: &Path,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let applied = driver
        .run_apply(repo_dir, report_path, |plan| {
            eprintln!("{}", formatter.format_reports(plan));
            auto_approve || confirm_apply()
        })
        .await?;

    if applied.is_empty() {
        eprintln!("No changes to apply.");
    } else {
        eprintln!("{}", formatter.format_reports(&applied));
        info!(templates = applied.len(), "Apply complete");
    }
    Ok(())
}

/// Prompt for apply confirmation on stdin.
fn confirm_apply() -> bool {
    eprint!("Do you want to apply these changes? [y/N]: ");
    if std::io::stderr().flush().is_err() {
        return false;
    }

    let mut input = String::new();
    if std::io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    input.trim().eq_ignore_ascii_case("y")
}

/// Check for drift without proposing template-side changes.
async fn cmd_detect(
    driver: &RunDriver<SnapshotProvider, FsTemplateStore>,
    repo_dir: &Path,
    formatter: &OutputFormatter,
) -> Result<()> {
    let templates = driver.load_templates(repo_dir).await?;
    let reports = driver
        .run(&templates, keyplane::context::ExecutionContext::plan())
        .await;
    eprintln!("{}", formatter.format_reports(&reports));

    if reports.is_empty() {
        info!("No drift detected");
    } else {
        info!(count = reports.len(), "Templates have drifted");
    }
    Ok(())
}

/// Generate or refresh templates from live state.
async fn cmd_import(
    driver: &RunDriver<SnapshotProvider, FsTemplateStore>,
    repo_dir: &Path,
) -> Result<()> {
    let written = import_resources(
        driver.config(),
        driver.provider(),
        driver.store(),
        repo_dir,
    )
    .await?;
    eprintln!("{written} template(s) written.");
    Ok(())
}
