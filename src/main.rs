//! p2p-fileshare - Main entry point
//!
//! An encrypted P2P file sharing node and client with resumable downloads.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use p2p_fileshare::{
    CliArgs, Command, Config, DirectoryPoller, Downloader, ClientConnection, FileRegistry,
    NodeServer, PayloadCipher, ProgressDisplay, ResumeStore, ShareError, TransferStats,
    derive_key,
    registry::EVENT_CHANNEL_CAPACITY,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        let location = panic_info.location().unwrap();

        error!(
            "PANIC occurred at {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let key = derive_key(&config.secret).context("Failed to derive key from shared secret")?;
    let cipher = PayloadCipher::new(&key);

    match args.command {
        Command::Serve => run_serve(&config, cipher).await,
        Command::List => run_list(&config, cipher).await,
        Command::Search { query } => run_search(&config, cipher, &query).await,
        Command::Download { name } => run_download(&config, cipher, &name).await,
        Command::Incomplete => run_incomplete(&config).await,
        Command::Cleanup { name } => run_cleanup(&config, &name).await,
    }
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

/// Serve the share directory to authenticated peers
async fn run_serve(config: &Config, cipher: PayloadCipher) -> Result<()> {
    tokio::fs::create_dir_all(&config.share_dir)
        .await
        .with_context(|| format!("Failed to create share directory {}", config.share_dir.display()))?;

    let registry = Arc::new(FileRegistry::new(config.share_dir.clone()));
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(registry.clone().run(events_rx));

    let poller = DirectoryPoller::new(
        config.share_dir.clone(),
        Duration::from_secs(config.poll_interval_secs),
    );
    tokio::spawn(poller.run(events_tx));

    let server = NodeServer::bind(&config.listen_addr(), registry, cipher)
        .await
        .context("Failed to start node server")?;

    info!("Sharing {} on {}", config.share_dir.display(), config.listen_addr());
    server.serve().await
}

/// Fetch and print the node's file listing
async fn run_list(config: &Config, cipher: PayloadCipher) -> Result<()> {
    let addr = config.node_addr()?;
    let mut conn = ClientConnection::connect(addr, cipher).await?;
    let files = conn.list().await?;

    if files.is_empty() {
        println!("No files available on {}", addr);
        return Ok(());
    }

    println!("Available files on {} ({}):", addr, files.len());
    for file in files {
        println!(
            "  {}  {:>10}  {}",
            &file.checksum[..16.min(file.checksum.len())],
            TransferStats::format_bytes(file.size),
            file.name
        );
    }
    Ok(())
}

/// Search the node's listing and print matches
async fn run_search(config: &Config, cipher: PayloadCipher, query: &str) -> Result<()> {
    let addr = config.node_addr()?;
    let mut conn = ClientConnection::connect(addr, cipher).await?;
    let files = conn.search(query).await?;

    if files.is_empty() {
        println!("No files match '{}'", query);
        return Ok(());
    }

    println!("Files matching '{}' ({}):", query, files.len());
    for file in files {
        println!("  {:>10}  {}", TransferStats::format_bytes(file.size), file.name);
    }
    Ok(())
}

/// Download a file, resuming any prior progress
async fn run_download(config: &Config, cipher: PayloadCipher, name: &str) -> Result<()> {
    let addr = config.node_addr()?;
    let store = ResumeStore::new(config.state_dir.clone(), config.download_dir.clone());
    let mut downloader = Downloader::new(addr, cipher, store);

    let mut progress = ProgressDisplay::new(config.quiet);
    progress.print_status(&format!("Downloading '{}' from {}", name, addr))?;

    let result = downloader
        .run(name, |received, total| {
            let _ = progress.update(received, total);
        })
        .await;

    match result {
        Ok(path) => {
            let total = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            progress.print_complete(total, &path.display().to_string())?;
            Ok(())
        }
        Err(e) => {
            progress.print_error(&format!("Download failed: {}", e))?;
            if e.downcast_ref::<ShareError>().map_or(false, ShareError::is_retryable) {
                progress.print_status("Progress was saved; run the same command again to resume.")?;
            }
            Err(e)
        }
    }
}

/// List incomplete downloads that can be resumed
async fn run_incomplete(config: &Config) -> Result<()> {
    let store = ResumeStore::new(config.state_dir.clone(), config.download_dir.clone());
    let sessions = store.list().await?;

    if sessions.is_empty() {
        println!("No incomplete downloads");
        return Ok(());
    }

    println!("Incomplete downloads ({}):", sessions.len());
    for session in sessions {
        println!(
            "  {:?}  {} / {} ({:.1}%)  {}",
            session.state,
            TransferStats::format_bytes(session.received_bytes()),
            TransferStats::format_bytes(session.expected_size),
            session.progress() * 100.0,
            session.filename,
        );
    }
    Ok(())
}

/// Remove a download's partial file and session metadata
async fn run_cleanup(config: &Config, name: &str) -> Result<()> {
    let store = ResumeStore::new(config.state_dir.clone(), config.download_dir.clone());
    if store.cleanup(name).await? {
        println!("Removed session and partial file for '{}'", name);
    } else {
        println!("No session found for '{}'", name);
    }
    Ok(())
}
