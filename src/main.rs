// src/main.rs
use anyhow::Context;
use broke_buster::backend::{self, BackendClient};
use broke_buster::config::{AppConfig, Cli, Command};
use broke_buster::database::{connect, DataService};
use broke_buster::{cli, telemetry};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Cli::parse();

    match args.command.clone().unwrap_or(Command::Tui { path: "/".into() }) {
        Command::Server { addr, ping_message } => {
            telemetry::init_stderr();
            info!("Starting Backend Server...");
            backend::run_server(addr, ping_message).await?;
        }
        Command::Probe => {
            telemetry::init_stderr();
            probe(&args.app).await?;
        }
        Command::Tui { path } => {
            telemetry::init_file(&args.app.log_file)
                .with_context(|| format!("opening log file {}", args.app.log_file.display()))?;
            info!("Starting CLI...");
            cli::run(&args.app, &path).await?;
        }
    }
    Ok(())
}

/// One-shot connectivity check of the hosted tables and the alternate backend.
async fn probe(config: &AppConfig) -> anyhow::Result<()> {
    let conn = connect(&config.hosted()?)?;
    let data = DataService::new(conn);

    match data.list_expenses(None).await {
        Ok(rows) if broke_buster::database::db::fallback::is_sample(&rows) => {
            warn!("expenses table missing, serving sample rows");
        }
        Ok(rows) => info!(count = rows.len(), "expenses table reachable"),
        Err(e) => error!(error = %e, "expenses table unreachable"),
    }
    match data.list_budgets(None).await {
        Ok(rows) => info!(count = rows.len(), "budgets reachable"),
        Err(e) => error!(error = %e, "budgets table unreachable"),
    }
    match data.category_spending_this_month().await {
        Ok(by_category) => info!(categories = by_category.len(), "monthly analytics reachable"),
        Err(e) => warn!(error = %e, "monthly analytics failed"),
    }

    let backend = BackendClient::new(config.backend_api_url.clone())?;
    match backend.health().await {
        Ok(h) => info!(status = %h.status, service = %h.service, "backend healthy"),
        Err(e) => warn!(error = %e, url = backend.base_url(), "backend unreachable"),
    }
    Ok(())
}
