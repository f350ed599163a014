use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hermes::api;
use hermes::config::Config;
use hermes::embed::biencoder::HttpBiEncoder;
use hermes::index::build::build_index;
use hermes::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "hermes", about = "Hybrid semantic code search engine")]
struct Cli {
    /// Path to a JSON config file; unknown keys are rejected
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index a repository: scan, chunk, embed, and build artifacts
    Index {
        /// Path to the repository to index
        #[arg(long)]
        repo: PathBuf,
        /// Output directory for artifacts
        #[arg(long, env = "HERMES_ARTIFACTS_DIR")]
        out: Option<PathBuf>,
    },
    /// Start the query API server
    Serve {
        /// Artifacts directory to serve from
        #[arg(long, env = "HERMES_ARTIFACTS_DIR")]
        artifacts: Option<PathBuf>,
        /// Bind address (host:port)
        #[arg(long, env = "HERMES_BIND_ADDR")]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Index { repo, out } => {
            if let Some(out) = out {
                config.artifacts_dir = out;
            }
            let client = reqwest::Client::new();
            let biencoder = HttpBiEncoder::new(client, config.embed.clone());
            let summary = build_index(&repo, &config, &biencoder).await?;
            println!("Indexing complete:");
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Serve { artifacts, bind } => {
            if let Some(artifacts) = artifacts {
                config.artifacts_dir = artifacts;
            }
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            tracing::info!(artifacts = %config.artifacts_dir.display(), "starting hermes");

            let state = AppState::new(config.clone())?;
            let app = api::router(state);

            let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
            tracing::info!("server listening on {}", config.bind_addr);
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
