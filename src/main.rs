use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use tracing::{info, warn};

use planner_scout::application::{OrchestratorSettings, PageAgent, PageHandle, SyncOrchestrator};
use planner_scout::infrastructure::{
    CollectionClient, ConfigManager, DatabaseConnection, ExtractionEngine, FetchedPage, StaticPage,
    init_logging_with_config,
};

#[derive(Parser)]
#[command(name = "planner-scout", about = "Extract product pages and sync them to the collection service")]
struct Cli {
    /// Configuration file (default: platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Clear the local cache and sync state before running
    #[arg(long)]
    reset: bool,

    /// http(s) URL, saved HTML file, or FILE=URL to give a saved page its original address
    #[arg(required = true)]
    pages: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum PageArg {
    Remote(String),
    File { path: PathBuf, url: Option<String> },
}

impl PageArg {
    fn parse(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            return Self::Remote(arg.to_string());
        }
        match arg.split_once('=') {
            Some((path, url)) if !url.is_empty() => Self::File { path: PathBuf::from(path), url: Some(url.to_string()) },
            _ => Self::File { path: PathBuf::from(arg), url: None },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let config = manager.load_layered().await?;
    init_logging_with_config(&config.logging)?;
    info!("Using configuration {}", manager.config_path().display());

    let db_path = config.storage.resolve_database_path()?;
    let db = DatabaseConnection::open(&db_path)
        .await
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    if cli.reset {
        db.reset().await?;
    }

    let service = Arc::new(CollectionClient::new(&config.remote)?);
    let engine = Arc::new(ExtractionEngine::new(&config.extraction)?);
    let (orchestrator, task) = SyncOrchestrator::spawn(OrchestratorSettings::from_config(&config), &db, service).await?;

    let fetch_timeout = Duration::from_secs(config.remote.timeout_seconds);
    let mut pages: Vec<PageHandle> = Vec::new();
    for arg in &cli.pages {
        let handle = match PageArg::parse(arg) {
            PageArg::Remote(url) => PageAgent::spawn(FetchedPage::new(url, &config.remote.user_agent, fetch_timeout)?, Arc::clone(&engine)).0,
            PageArg::File { path, url } => match StaticPage::from_file(&path, url.as_deref()).await {
                Ok(page) => PageAgent::spawn(page, Arc::clone(&engine)).0,
                Err(e) => {
                    warn!("Skipping {}: {:#}", arg, e);
                    continue;
                }
            },
        };

        let outcome = orchestrator.navigate(&handle).await?;
        println!("{:<16} {}", format!("{outcome:?}"), handle.url());
        pages.push(handle);
    }

    orchestrator.wait_idle().await?;
    join_all(pages.iter().map(PageHandle::close)).await;

    let stats = orchestrator.current_stats();
    println!("cached products:   {}", stats.cached_products);
    println!("analyzed products: {}", stats.analyzed_products);

    orchestrator.shutdown().await;
    task.await.context("Orchestrator task panicked")?;
    Ok(())
}
