use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ragline",
    version,
    about = "Ingest PDFs into a vector index and answer questions against it"
)]
pub(crate) struct Cli {
    /// Path to the TOML config file (falls back to RAGLINE_CONFIG, then config/ragline.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    /// Run the HTTP trigger gateway until Ctrl-C
    Serve,
    /// Ingest one PDF and print the result as JSON
    Ingest {
        pdf: String,
        /// Source id stored with every chunk (defaults to the PDF path as given)
        #[arg(long)]
        source_id: Option<String>,
        /// Job id used for step memoization; reuse it to resume a failed job
        #[arg(long)]
        job_id: Option<String>,
    },
    /// Answer a question from the indexed chunks and print the result as JSON
    Query {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        job_id: Option<String>,
    },
}
