//! HEOS Relay Monitor - headless client for the HEOS control relay.
//!
//! `watch` attaches to the relay's event stream and logs the active player
//! as its state changes. `send` issues a single command. `select` changes
//! the remembered player for the next `watch`.

mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use heos_relay_core::client::{MemorySelectionStore, SelectionStore, StreamUpdate};
use heos_relay_core::{
    BrowseChannel, FileSelectionStore, KnownEvent, Reconciler, RelayClient, StreamClient,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// HEOS Relay Monitor - watch and control players through a relay.
#[derive(Parser, Debug)]
#[command(name = "heos-relay-monitor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the relay.
    #[arg(short, long, default_value = "http://127.0.0.1:8080", env = "HEOS_RELAY_URL")]
    relay: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "HEOS_RELAY_LOG_LEVEL")]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attach to the event stream and log the active player.
    Watch {
        /// Directory holding the remembered selection. In-memory when unset.
        #[arg(short = 'd', long, env = "HEOS_RELAY_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Position refresh interval (milliseconds).
        #[arg(long, default_value_t = 1000)]
        tick_ms: u64,

        /// Delay before reattaching after the stream drops (seconds).
        #[arg(long, default_value_t = 3)]
        reattach_secs: u64,
    },

    /// Send one command through the relay.
    #[command(subcommand)]
    Send(SendCommand),

    /// Remember a player as the active one.
    Select {
        pid: String,

        #[arg(short = 'd', long, env = "HEOS_RELAY_DATA_DIR")]
        data_dir: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum SendCommand {
    Next { pid: String },
    Previous { pid: String },
    Play { pid: String },
    Pause { pid: String },
    Volume { pid: String, level: u8 },
    /// List music sources.
    Sources,
    SourceInfo { sid: String },
    /// Browse a source, or a container within it.
    Browse {
        sid: String,
        cid: Option<String>,
        #[arg(long)]
        start: Option<u32>,
    },
    /// Play a media item now.
    PlayItem {
        pid: String,
        sid: String,
        cid: String,
        mid: Option<String>,
    },
    /// Add a media item to the queue with an explicit add criteria.
    Queue {
        pid: String,
        sid: String,
        cid: String,
        mid: Option<String>,
        #[arg(long, default_value_t = 3)]
        aid: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    match args.command {
        Command::Watch {
            data_dir,
            tick_ms,
            reattach_secs,
        } => {
            watch(
                &args.relay,
                data_dir,
                Duration::from_millis(tick_ms),
                Duration::from_secs(reattach_secs),
            )
            .await
        }
        Command::Send(command) => send(&args.relay, command).await,
        Command::Select { pid, data_dir } => {
            let mut store = FileSelectionStore::in_dir(&data_dir);
            store.save(&pid).context("Failed to save selection")?;
            log::info!("Selected {} ({})", pid, store.path().display());
            Ok(())
        }
    }
}

async fn watch(
    relay: &str,
    data_dir: Option<PathBuf>,
    tick: Duration,
    reattach: Duration,
) -> Result<()> {
    let client = StreamClient::new(relay).context("Invalid relay URL")?;
    let selection: Box<dyn SelectionStore> = match data_dir {
        Some(dir) => Box::new(FileSelectionStore::in_dir(dir)),
        None => Box::new(MemorySelectionStore::new()),
    };
    let browse = BrowseChannel::default();
    let mut reconciler = Reconciler::new(selection, browse.clone());

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        stop.cancel();
    });

    let mut browse_rx = browse.subscribe();
    let browse_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = browse_cancel.cancelled() => break,
                received = browse_rx.recv() => match received {
                    Ok(notification) => log::info!("[Browse] {}", render::browse_line(&notification)),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("[Browse] Missed {} result(s)", n);
                    }
                    Err(_) => break,
                },
            }
        }
    });

    log::info!("Watching {}", client.stream_url());
    while !cancel.is_cancelled() {
        let mut last_line = String::new();
        let result = client
            .run(&mut reconciler, tick, &cancel, |rec, update| {
                if let StreamUpdate::Event(KnownEvent::Players(players)) = update {
                    log::info!(
                        "Roster: {} player(s), active: {}",
                        players.len(),
                        rec.active_pid().unwrap_or("none")
                    );
                }
                let Some(player) = rec.active_player() else {
                    return;
                };
                let line = render::player_line(player, rec.position_ms(&player.pid));
                if line != last_line {
                    match update {
                        StreamUpdate::Event(_) => log::info!("{}", line),
                        StreamUpdate::Tick => log::debug!("{}", line),
                    }
                    last_line = line;
                }
            })
            .await;

        match result {
            Ok(()) => break,
            Err(e) => {
                log::warn!("Stream dropped: {}. Reattaching in {:?}", e, reattach);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(reattach) => {}
                }
            }
        }
    }

    log::info!("Stopped");
    Ok(())
}

async fn send(relay: &str, command: SendCommand) -> Result<()> {
    let client = RelayClient::new(relay).context("Invalid relay URL")?;
    let result = match &command {
        SendCommand::Next { pid } => client.next(pid).await,
        SendCommand::Previous { pid } => client.previous(pid).await,
        SendCommand::Play { pid } => client.play(pid).await,
        SendCommand::Pause { pid } => client.pause(pid).await,
        SendCommand::Volume { pid, level } => client.set_volume(pid, *level).await,
        SendCommand::Sources => client.music_sources().await,
        SendCommand::SourceInfo { sid } => client.source_info(sid).await,
        SendCommand::Browse { sid, cid, start } => match cid {
            Some(cid) => client.browse_container(sid, cid, *start).await,
            None => client.browse_source(sid).await,
        },
        SendCommand::PlayItem { pid, sid, cid, mid } => {
            client.play_item(pid, sid, cid, mid.as_deref()).await
        }
        SendCommand::Queue {
            pid,
            sid,
            cid,
            mid,
            aid,
        } => client.add_to_queue(pid, sid, cid, mid.as_deref(), *aid).await,
    };
    result.with_context(|| format!("Relay rejected {:?}", command))?;
    log::info!("Sent {:?}", command);
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
