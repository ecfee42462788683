use anyhow::Result;
use clap::Parser;
use repovault::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing for the CLI.
    tracing_subscriber::fmt::init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    tracing::info!("CLI arguments parsed, invoking run");
    let result = run(cli).await;
    match &result {
        Ok(report) => tracing::info!(
            success = report.summary.is_success(),
            repos = report.manifest.repos.len(),
            "Backup run finished"
        ),
        Err(e) => tracing::error!(error = %e, "Backup run aborted"),
    }
    result.map(|_| ())
}
