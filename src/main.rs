mod cli;

use anyhow::Context;
use clap::Parser;
use ragline_core::{App, AppBuilder, IngestRequest, QueryRequest};
use ragline_gateway::GatewayServer;
use serde_json::json;
use tokio::sync::watch;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let builder = AppBuilder::load(cli.config.as_deref()).await?;
    tracing::debug!(config = %builder.config_path().display(), "starting ragline");

    match cli.command {
        Command::Serve => serve(builder.build().await?).await,
        Command::Ingest {
            pdf,
            source_id,
            job_id,
        } => {
            let app = builder.build().await?;
            let request = IngestRequest {
                pdf_path: pdf,
                source_id,
                job_id,
            };
            ingest(&app, request).await
        }
        Command::Query {
            question,
            top_k,
            job_id,
        } => {
            let app = builder.build().await?;
            let request = QueryRequest {
                question,
                top_k,
                job_id,
            };
            query(&app, request).await
        }
    }
}

/// Logs go to stderr so stdout carries only the JSON result.
fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(app: App) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    GatewayServer::from_app(app, shutdown_rx)
        .serve()
        .await
        .context("gateway failed")
}

async fn ingest(app: &App, request: IngestRequest) -> anyhow::Result<()> {
    let job = request.validate()?;
    let result = app
        .ingest
        .ingest(&job)
        .await
        .with_context(|| format!("ingestion job {} failed", job.job_id))?;
    print_json(&json!({
        "job_id": job.job_id,
        "ingested": result.ingested,
        "source_id": result.source_id,
    }))
}

async fn query(app: &App, request: QueryRequest) -> anyhow::Result<()> {
    let job = request.validate()?;
    let answer = app
        .query
        .answer(&job)
        .await
        .with_context(|| format!("query job {} failed", job.job_id))?;
    print_json(&serde_json::to_value(&answer)?)
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
