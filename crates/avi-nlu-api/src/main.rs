//! Avi NLU — intent recognition server.
//!
//! `serve` runs the REST API, `train` fits a model offline from a dataset
//! file, `version` prints the build version.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use avi_intent_kit::EngineManager;
use avi_nlu_api::config::NluConfig;
use avi_nlu_api::routes::build_router;
use avi_nlu_api::state::AppState;
use avi_protocol::{Language, TrainingDataset};

#[derive(Parser, Debug)]
#[command(name = "avi-nlu", version, about = "Avi NLU intent recognition server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the REST API (default).
    Serve(ServeArgs),
    /// Train a model offline and persist it under the data directory.
    Train(TrainArgs),
    /// Print the version.
    Version,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// TOML config file.
    #[arg(long, env = "AVI_CONFIG")]
    config: Option<PathBuf>,
    /// Language to load at startup.
    #[arg(long)]
    lang: Option<Language>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// TOML config file.
    #[arg(long, env = "AVI_CONFIG")]
    config: Option<PathBuf>,
    /// Language to train; defaults to the dataset's language.
    #[arg(long)]
    lang: Option<Language>,
    /// Dataset JSON file. Without it the saved corpus is retrained.
    #[arg(long)]
    dataset: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    match Cli::parse().command {
        Some(Command::Serve(args)) => serve(args).await,
        None => serve(ServeArgs::default()).await,
        Some(Command::Train(args)) => train(args).await,
        Some(Command::Version) => {
            println!("avi-nlu v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "avi-nlu starting");

    let mut config = NluConfig::load(args.config.as_deref())?;
    if let Some(lang) = args.lang {
        config.language = lang;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    let state = AppState::from_config(&config)?;
    tracing::info!(
        lang = %config.language,
        data_dir = %config.data_dir.display(),
        backend = state.engines.backend_name(),
        threshold = config.confidence_threshold,
        "config loaded"
    );

    // A missing model is not fatal: clients can populate and train later.
    match state.engines.reuse(config.language).await {
        Ok(outcome) => tracing::info!(lang = %config.language, ?outcome, "engine ready"),
        Err(e) => tracing::warn!(lang = %config.language, error = %e, "engine not loaded at startup"),
    }

    let app = build_router(state);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

async fn train(args: TrainArgs) -> anyhow::Result<()> {
    let config = NluConfig::load(args.config.as_deref())?;

    let dataset = match &args.dataset {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            Some(TrainingDataset::from_json(&contents)?)
        }
        None => None,
    };
    let lang = args
        .lang
        .or(dataset.as_ref().map(|d| d.language))
        .unwrap_or(config.language);

    let engines = EngineManager::lexical(config.data_dir.clone(), lang);
    if let Some(dataset) = dataset {
        engines.populate(dataset).await?;
    }

    tracing::info!(lang = %lang, data_dir = %config.data_dir.display(), "training");
    engines.train(lang).await?;
    println!(
        "trained '{lang}' engine in {}",
        engines.engine_dir(lang).display()
    );
    Ok(())
}
