//! `litreview` command-line interface

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use litreview_cli::{init_tracing, report::preview, App};
use litreview_config::{load_settings, Settings};

#[derive(Parser)]
#[command(name = "litreview", version, about = "Retrieval-augmented literature reviews")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search arXiv and download papers
    Ingest {
        #[arg(long)]
        query: String,
        #[arg(long)]
        max: Option<usize>,
    },
    /// Rebuild the index from the papers directory
    Index,
    /// Retrieve and rerank chunks for a query
    Retrieve {
        #[arg(long)]
        query: String,
        #[arg(long)]
        k: Option<usize>,
        /// hyde, complex, standard or hybrid
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Write a literature review and save it
    Generate {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Generate a review and judge it
    Evaluate {
        #[arg(long)]
        query: String,
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Ingest, index, generate and evaluate in one go
    Run {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long)]
        max: Option<usize>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env = std::env::var("LITREVIEW_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        },
    };

    init_tracing(&settings.observability);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), env = ?env, "Starting litreview");

    if let Command::Config = cli.command {
        print!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    settings
        .paths
        .ensure_dirs()
        .context("Failed to create data directories")?;
    let app = App::from_settings(settings).await?;

    match cli.command {
        Command::Ingest { query, max } => {
            let outcome = app.ingest(&query, max).await?;
            println!("Downloaded {} papers:", outcome.papers.len());
            for paper in &outcome.papers {
                println!("- {} ({})", paper.title, paper.filepath.display());
            }
        },
        Command::Index => {
            let stats = app.index().await?;
            println!(
                "Indexed {} chunks from {} documents ({} failed)",
                stats.chunks_indexed, stats.documents_indexed, stats.documents_failed
            );
        },
        Command::Retrieve { query, k, strategy } => {
            let strategy = app.strategy(strategy.as_deref())?;
            let results = app.retrieve(&query, k, strategy).await?;
            for (i, result) in results.iter().enumerate() {
                println!(
                    "\n[Result {}] (Score: {:.4})",
                    i + 1,
                    result.rerank_score.unwrap_or_default()
                );
                println!("Source: {}", result.title().unwrap_or("Unknown"));
                println!("Text Snippet: {}...", preview(&result.text, 200));
            }
        },
        Command::Generate { topic, strategy } => {
            let strategy = app.strategy(strategy.as_deref())?;
            let review = app.generate(&topic, strategy).await?;
            println!("{}", review.text);
            if let Some(path) = &review.path {
                println!("\nSaved to {}", path.display());
            }
        },
        Command::Evaluate { query, strategy } => {
            let strategy = app.strategy(strategy.as_deref())?;
            let (_, report) = app.evaluate(&query, strategy).await?;
            println!("{}", report);
        },
        Command::Run {
            topic,
            strategy,
            max,
        } => {
            let strategy = app.strategy(strategy.as_deref())?;
            let summary = app.run(&topic, strategy, max).await?;
            println!(
                "Downloaded {} papers, indexed {} chunks",
                summary.download.downloaded, summary.indexing.chunks_indexed
            );
            if let Some(path) = &summary.review.path {
                println!("Review saved to {}", path.display());
            }
            println!("\n{}", summary.report);
        },
        Command::Config => {},
    }

    Ok(())
}
