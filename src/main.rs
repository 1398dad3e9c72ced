//! random-source CLI - index an owner's repositories and serve random files

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use random_source::config::{self, RandomSourceConfig, Settings};
use random_source::extract::WorkerPool;
use random_source::schedule::{self, Pipeline};
use random_source::walker::FileWalker;
use random_source::{BlobStore, Catalog, GitCloner, GitHubLister, Indexer, Sampler, SyncService};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "random-source")]
#[command(version)]
#[command(about = "Index an owner's public repositories and serve random source files")]
#[command(long_about = r#"
random-source clones every public, non-fork repository of one owner, stores
each source file it finds, and serves a random one on GET /.

Example usage:
  random-source --user octocat serve --listen :8080
  random-source --user octocat index
  random-source sample
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Owner whose repositories are indexed
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Base directory for the database and blobs
    #[arg(short, long, global = true)]
    base: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync and index on start-up and weekly, and serve random files
    Serve {
        /// Address to listen on, `host:port` or `:port`
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Run one sync followed by one indexing pass
    Index,

    /// Write one random indexed file to stdout
    Sample,

    /// Show catalog statistics
    Stats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let file_config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let listen = match &cli.command {
        Commands::Serve { listen } => listen.clone(),
        _ => None,
    };
    let cli_config = RandomSourceConfig {
        user: cli.user,
        base: cli.base,
        listen,
        ..Default::default()
    };
    let settings = file_config.merge(cli_config).resolve()?;

    match cli.command {
        Commands::Serve { .. } => serve(settings),
        Commands::Index => {
            let (pipeline, _) = build(&settings)?;
            match pipeline.trigger() {
                Some(Ok(report)) => {
                    println!("Indexed {} repositories ({} files), removed {}, failed {}",
                        report.indexed, report.files, report.removed, report.failed);
                    Ok(())
                }
                Some(Err(e)) => Err(e.into()),
                None => anyhow::bail!("a pass is already running"),
            }
        }
        Commands::Sample => {
            let (catalog, blobs) = open_storage(&settings)?;
            let sampler = Sampler::new(catalog, blobs).with_exclude_recent(settings.exclude_recent);
            let (file, bytes) = sampler.sample()?;
            tracing::info!("Sampled {} (id {}, {} lines)", file.path, file.id, file.lines);
            let mut out = std::io::stdout().lock();
            out.write_all(&bytes)?;
            out.flush()?;
            Ok(())
        }
        Commands::Stats => {
            let (catalog, _) = open_storage(&settings)?;
            print!("{}", catalog.stats()?);
            Ok(())
        }
    }
}

fn open_storage(settings: &Settings) -> anyhow::Result<(Arc<Catalog>, BlobStore)> {
    config::ensure_dirs(settings)?;
    tracing::debug!("Using database {:?}", settings.database_path());
    let catalog = Arc::new(Catalog::open(&settings.database_path())?);
    let blobs = BlobStore::open(settings.blob_dir())?;
    Ok((catalog, blobs))
}

fn build(settings: &Settings) -> anyhow::Result<(Arc<Pipeline>, Sampler)> {
    let owner = settings.owner()?;
    let (catalog, blobs) = open_storage(settings)?;

    let lister = GitHubLister::new(settings.api_base.clone())?;
    let sync = SyncService::new(Box::new(lister), owner);

    let cloner = GitCloner::new().with_scratch_root(settings.scratch.clone());
    let indexer = Indexer::new(Arc::clone(&catalog), blobs.clone(), Box::new(cloner))
        .with_walker(FileWalker::new(settings.extensions.clone()))
        .with_pool(WorkerPool::new(settings.workers, settings.queue_capacity));

    let sampler = Sampler::new(catalog, blobs).with_exclude_recent(settings.exclude_recent);
    Ok((Arc::new(Pipeline::new(sync, indexer)), sampler))
}

fn serve(settings: Settings) -> anyhow::Result<()> {
    // The blocking HTTP client inside the pipeline must be created and
    // dropped outside the async runtime.
    let (pipeline, sampler) = build(&settings)?;

    tracing::info!("Running initial repository sync");
    let started = Instant::now();
    pipeline.sync();
    tracing::info!("Finished initial repository sync in {:?}", started.elapsed());

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let cancel = CancellationToken::new();

        // Index whatever the initial sync added
        let initial = Arc::clone(&pipeline);
        let _ = tokio::task::spawn_blocking(move || initial.index());

        let scheduler = schedule::spawn_schedule(Arc::clone(&pipeline), settings.sync_interval, cancel.clone());

        let shutdown = {
            let cancel = cancel.clone();
            async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
                tracing::info!("Shutting down");
                cancel.cancel();
            }
        };

        let served = random_source::server::start_server(settings.listen, sampler, shutdown).await;
        cancel.cancel();
        let _ = scheduler.await;
        served
    });

    // An in-flight pass is abandoned rather than awaited.
    runtime.shutdown_timeout(Duration::from_secs(5));
    result
}
