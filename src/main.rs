use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reviewbot::config::Config;
use reviewbot::core::{extract_changed_parts, HandlerRegistry, Reviewer};
use reviewbot::platform::GitHubClient;
use reviewbot::server::{run_server, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reviewbot")]
#[command(about = "Reviews pull requests and comments only on the lines that changed", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Path to reviewbot.yml")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the webhook server")]
    Serve {
        #[arg(long, help = "Listen address, overrides server.bind")]
        bind: Option<String>,
    },
    #[command(about = "Review one pull request and post the comments")]
    Review {
        #[arg(long, help = "Repository as owner/name")]
        repo: String,

        #[arg(long)]
        number: u64,
    },
    #[command(about = "Print the changed parts of a single-file patch as JSON")]
    Changes {
        #[arg(long, help = "Patch text without ---/+++ headers")]
        diff: PathBuf,

        #[arg(long)]
        filename: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env();

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve_command(config).await?;
        }
        Commands::Review { repo, number } => {
            review_command(config, &repo, number).await?;
        }
        Commands::Changes { diff, filename } => {
            changes_command(diff, &filename)?;
        }
    }

    Ok(())
}

fn build_reviewer(config: &Config) -> Result<Reviewer> {
    let platform = GitHubClient::from_config(&config.github)
        .context("Failed to configure GitHub client")?;
    let handlers = HandlerRegistry::from_config(config)?;
    info!(handlers = handlers.len(), dedup_key = ?config.review.dedup_key, "Reviewer ready");
    Ok(Reviewer::new(Arc::new(platform), handlers, config.review.dedup_key))
}

async fn serve_command(config: Config) -> Result<()> {
    let reviewer = build_reviewer(&config)?;
    let state = AppState {
        reviewer: Arc::new(reviewer),
        webhook_secret: config.github.webhook_secret.as_deref().map(Arc::from),
        server: Arc::new(config.server),
    };
    run_server(state).await
}

async fn review_command(config: Config, repo: &str, number: u64) -> Result<()> {
    let reviewer = build_reviewer(&config)?;
    let outcome = reviewer.review_pull_request(repo, number).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.is_success() {
        anyhow::bail!("{}", outcome.message);
    }
    Ok(())
}

fn changes_command(diff: PathBuf, filename: &str) -> Result<()> {
    let diff_text = std::fs::read_to_string(&diff)
        .with_context(|| format!("Failed to read {}", diff.display()))?;
    let parts = extract_changed_parts(&diff_text, filename)?;
    println!("{}", serde_json::to_string_pretty(&parts)?);
    Ok(())
}
