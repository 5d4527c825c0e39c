//! lineupd - standalone queue engine.
//!
//! Reads a JSON-lines feed of intents and platform events on stdin and runs
//! them against the in-process platform. Useful for driving the engine from a
//! script, or as a reference for wiring it to a real chat platform.

use lineup::config::{Config, validation};
use lineup::db::Database;
use lineup::dispatch::{Dispatcher, Inbound, Intent, Outcome, PlatformEvent};
use lineup::error::QueueResult;
use lineup::platform::local::{LocalPlatform, LocalSurface};
use lineup::platform::{ChannelId, ChannelPlatform, RenderSurface};
use lineup::state::{Engine, Notice};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Inbound stream capacity.
const INBOUND_CHANNEL_SIZE: usize = 1024;

/// One line of the feed.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedLine {
    Intent(Intent),
    Event(PlatformEvent),
    /// Give a voice channel a user limit.
    Capacity { channel: ChannelId, capacity: usize },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var_os("LINEUP_LOG_JSON").is_some() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "{} configuration error(s), refusing to start",
            errors.len()
        ));
    }

    info!(
        controller = config.engine.controller_id,
        database = %config.database_path(),
        "Starting lineupd"
    );

    let db = Database::new(&config.database_path()).await?;

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
    let local = Arc::new(
        LocalPlatform::new(config.engine.controller_id).with_feedback(inbound_tx.clone()),
    );
    let platform: Arc<dyn ChannelPlatform> = local.clone();
    let surface: Arc<dyn RenderSurface> = Arc::new(LocalSurface::new());

    let (engine, mut notices) = Engine::start(config, db, platform, surface).await?;
    info!(queues = engine.queues.channels().len(), "Engine started");

    // Log notices as they come.
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            log_notice(&notice);
        }
    });

    tokio::spawn(Dispatcher::new(engine.clone()).run(inbound_rx));

    let feed = read_feed(local, inbound_tx);
    tokio::select! {
        result = feed => {
            if let Err(e) = result {
                error!(error = %e, "Feed read failed");
            }
            info!("Feed closed, still serving timers; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
        result = tokio::signal::ctrl_c() => {
            result?;
        }
    }

    info!(armed_timers = engine.grace.armed_count(), "Shutting down");
    Ok(())
}

/// Forward every feed line to the dispatcher until stdin closes.
async fn read_feed(local: Arc<LocalPlatform>, inbound_tx: mpsc::Sender<Inbound>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let inbound = match serde_json::from_str::<FeedLine>(line) {
            Ok(FeedLine::Intent(intent)) => {
                let (reply_tx, reply_rx) = oneshot::channel::<QueueResult<Outcome>>();
                let name = intent.name();
                tokio::spawn(async move {
                    match reply_rx.await {
                        Ok(Ok(outcome)) => info!(intent = name, outcome = ?outcome, "Done"),
                        Ok(Err(e)) => match e.user_message() {
                            Some(text) => info!(intent = name, code = e.error_code(), "{text}"),
                            None => warn!(intent = name, error = %e, "Something went wrong"),
                        },
                        Err(_) => warn!(intent = name, "Intent dropped without reply"),
                    }
                });
                Inbound::Intent {
                    intent,
                    reply: Some(reply_tx),
                }
            }
            Ok(FeedLine::Event(event)) => {
                if let PlatformEvent::VoiceState { member, from, to } = event {
                    local.record_voice_state(member, from, to);
                }
                Inbound::Event(event)
            }
            Ok(FeedLine::Capacity { channel, capacity }) => {
                local.set_capacity(channel, capacity);
                continue;
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "Unrecognized feed line");
                continue;
            }
        };

        if inbound_tx.send(inbound).await.is_err() {
            break;
        }
    }
    Ok(())
}

fn log_notice(notice: &Notice) {
    match notice {
        Notice::GraceExpired { queue, member } => {
            info!(queue, member, "Member lost their place after disconnecting")
        }
        Notice::AutoFilled {
            queue,
            members,
            destination,
        } => info!(queue, destination, members = ?members, "Auto-filled destination"),
        Notice::Transferred {
            queue,
            members,
            destination,
        } => info!(queue, destination, members = ?members, "Voice transfer"),
        Notice::TransferFailed { queue, error } => match error.user_message() {
            Some(text) => info!(queue, code = error.error_code(), "Voice transfer: {text}"),
            None => warn!(queue, error = %error, "Voice transfer failed"),
        },
    }
}
