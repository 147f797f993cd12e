//! CLI entry point for the dropfolder tool.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dropfolder_core::{FolderWatchService, IngestEvent, StandardParser, WatchedFolderOptions};
use tracing::{debug, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("Dropfolder starting");

    let parser = Arc::new(StandardParser);
    let (mut service, mut events) = FolderWatchService::spawn(args.config_dir, parser);

    // Register folders passed on the command line on top of the persisted
    // configuration.
    for folder in &args.watch {
        let mut options = WatchedFolderOptions {
            recursive: args.recursive,
            ..WatchedFolderOptions::default()
        };
        // Without an explicit save path, downloads land in the watched
        // folder itself.
        options.add_torrent_params.save_path =
            args.save_path.clone().unwrap_or_else(|| folder.clone());
        let registered = service.set_watched_folder(folder, options)?;
        debug!(folder = %registered.display(), "registered folder from CLI");
    }

    if service.folders().is_empty() {
        info!("No folders to watch. Add one with --watch /absolute/path.");
        return Ok(());
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(IngestEvent::TorrentReady { info, params }) => {
                    info!(
                        bytes = info.data().len(),
                        save_path = %params.save_path.display(),
                        "torrent file ingested"
                    );
                }
                Some(IngestEvent::MagnetReady { magnet, params }) => {
                    info!(
                        magnet = %magnet.as_str(),
                        save_path = %params.save_path.display(),
                        "magnet link ingested"
                    );
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    service.shutdown().await;
    info!("Dropfolder stopped");

    Ok(())
}
