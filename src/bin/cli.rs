// Multiget - Resumable Chunked Downloads for Mobile
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multiget_core::download::{DownloadEngine, EngineConfig, EngineState, TransferListener, TransferProgress};
use multiget_core::DownloadError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(name = "multiget-cli")]
#[command(about = "Multiget CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// JSON file with engine settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log worker activity
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new download
    Download {
        /// File URL
        url: String,
        /// Directory to save into
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
        /// Number of parallel range workers
        #[arg(short, long, default_value_t = 4)]
        workers: usize,
    },
    /// Continue from a `.download_state.json` record
    Resume {
        /// Progress record path
        record: PathBuf,
    },
}

/// Prints transfer events to the terminal
struct ConsoleListener;

impl TransferListener for ConsoleListener {
    fn on_initialized(&self, result: std::result::Result<(), &DownloadError>) {
        if let Err(e) = result {
            eprintln!("❌ Initialization failed: {}", e.user_message());
        }
    }

    fn on_start(&self) {
        println!("⬇️  Downloading (Ctrl-C to pause)...");
    }

    fn on_progress(&self, progress: &TransferProgress) {
        println!("   {}", progress.display_string());
    }

    fn on_pause(&self, progress: &TransferProgress) {
        println!("⏸️  Paused at {:.1}%", progress.percent);
    }

    fn on_failure(&self, error: &DownloadError) {
        eprintln!("❌ Download failed: {}", error.user_message());
        if error.is_file_error() {
            eprintln!("   Check free space and write permission in the save directory.");
        }
    }

    fn on_finish(&self, path: &Path) {
        println!("✅ Saved to {}", path.display());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let engine = match cli.command {
        Commands::Download { url, dir, workers } => {
            println!("Downloading {} into {} with {} workers", url, dir.display(), workers);
            DownloadEngine::new(&url, dir, workers).context("invalid download request")?
        }
        Commands::Resume { record } => {
            println!("Resuming from {}", record.display());
            DownloadEngine::resume(&record)
                .await
                .with_context(|| format!("cannot resume from {}", record.display()))?
        }
    };
    let engine = Arc::new(
        engine
            .with_config(config)?
            .with_listener(Arc::new(ConsoleListener)),
    );

    let download = tokio::spawn({
        let engine = engine.clone();
        async move { engine.download().await }
    });

    let pauser = tokio::spawn({
        let engine = engine.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                engine.pause();
            }
        }
    });

    let result = download.await.context("download task panicked")?;
    pauser.abort();
    result?;

    if engine.state() == EngineState::Paused {
        if let Some(record) = engine.record_path() {
            println!("Resume with: multiget-cli resume {}", record.display());
        }
    }
    Ok(())
}
