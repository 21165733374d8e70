//! env-refresh CLI - clear, copy and verify a target environment.

use clap::{Args, Parser, Subcommand};
use env_refresh::error::EXIT_PARTIAL_FAILURE;
use env_refresh::{Config, Orchestrator, RefreshError, RunResult, StoreKind};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "env-refresh")]
#[command(about = "Refresh a target environment from a source across five data stores")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreSelection {
    /// Comma-separated stores (wide-column, graph, relational, search, document);
    /// all configured stores when omitted
    #[arg(long, value_delimiter = ',')]
    stores: Vec<String>,
}

impl StoreSelection {
    fn parse(&self) -> Result<Vec<StoreKind>, RefreshError> {
        self.stores.iter().map(|s| s.parse()).collect()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Clear, copy and verify the selected stores
    Run(StoreSelection),

    /// Compare source and target counts without copying
    Verify(StoreSelection),

    /// Test store connections
    HealthCheck(StoreSelection),
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(result) if result.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_PARTIAL_FAILURE),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<RunResult, RefreshError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let orchestrator = Orchestrator::new(config)?;
    let (title, result) = match &cli.command {
        Commands::Run(selection) => ("Refresh", orchestrator.run(&selection.parse()?).await?),
        Commands::Verify(selection) => ("Verify", orchestrator.verify(&selection.parse()?).await?),
        Commands::HealthCheck(selection) => (
            "Health check",
            orchestrator.health_check(&selection.parse()?).await?,
        ),
    };

    if cli.output_json {
        println!("{}", result.to_json()?);
    } else {
        print_summary(title, &result);
    }
    Ok(result)
}

fn print_summary(title: &str, result: &RunResult) {
    println!("\n{} completed!", title);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    for store in &result.stores {
        let status = if store.is_success() { "OK" } else { "FAILED" };
        println!(
            "  {:<12} {:<6} objects: {}, rows: {}, mismatches: {}",
            store.store.as_str(),
            status,
            store.objects_created,
            store.rows_copied,
            store.mismatches
        );
        if let Some(ref err) = store.error {
            println!("    Error: {}", err);
        }
        if let Some(ref path) = store.report_path {
            println!("    Report: {}", path.display());
        }
    }
    let failed = result.failed_stores();
    if !failed.is_empty() {
        println!("  Failed stores: {:?}", failed);
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
