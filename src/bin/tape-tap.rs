//! Tape Tap - live feed inspector
//!
//! This binary subscribes to one or more live-data channels and logs
//! every decoded message, which makes it the quickest way to check what
//! the upstream streams are actually sending (and to exercise the feed
//! manager end to end without the dashboard).
//!
//! # Usage
//!
//! ```text
//! tape-tap                      # tap every cataloged channel
//! tape-tap flow gamma           # tap specific channels
//! tape-tap --config tape.toml   # use a config file
//! tape-tap --duration 30 quotes # run for 30 seconds, then print stats
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tape_core::{ChannelId, ChannelState};
use tape_feed::{spawn_feed, ChannelCatalog, FeedConfig, FeedHandle, Subscription};
use tape_protocol::ChannelMessage;

// ============================================================================
// CLI Arguments
// ============================================================================

/// Tape Tap - inspect live market-data channels
#[derive(Parser, Debug)]
#[command(name = "tape-tap")]
#[command(about = "Subscribe to live-data channels and log every message")]
#[command(version)]
struct Args {
    /// Channels to tap (flow, gamma, quotes, portfolio). Defaults to
    /// every cataloged channel.
    #[arg(value_name = "CHANNEL")]
    channels: Vec<String>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the stream base URL from the config
    #[arg(long)]
    url: Option<String>,

    /// Exit after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    duration: Option<u64>,
}

// ============================================================================
// Message Logging
// ============================================================================

/// One-line human summary of a decoded message.
fn describe(msg: &ChannelMessage) -> String {
    match msg {
        ChannelMessage::Flow(f) => format!(
            "{} {:?} {:?} {} contracts @ {} exp {} premium ${:.0}{}",
            f.symbol,
            f.side,
            f.option_type,
            f.size,
            f.strike,
            f.expiry,
            f.premium,
            if f.sweep { " [sweep]" } else { "" },
        ),
        ChannelMessage::Gamma(g) => format!(
            "{} spot {:.2} across {} strikes",
            g.symbol,
            g.spot,
            g.levels.len()
        ),
        ChannelMessage::Quote(q) => format!(
            "{} bid {:.2} ask {:.2} last {:.2} vol {}",
            q.symbol, q.bid, q.ask, q.last, q.volume
        ),
        ChannelMessage::Portfolio(p) => format!(
            "{} equity ${:.2} bp ${:.2} positions {}",
            p.account,
            p.equity,
            p.buying_power,
            p.positions.len()
        ),
    }
}

/// Subscribes a logging callback and returns the guard plus its counter.
async fn tap_channel(
    handle: &FeedHandle,
    channel: ChannelId,
) -> Result<(Subscription, Arc<AtomicU64>)> {
    let count = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&count);

    let subscription = handle
        .subscribe(channel, move |msg| {
            counter.fetch_add(1, Ordering::Relaxed);
            info!(channel = %msg.channel(), "{}", describe(msg));
        })
        .await
        .with_context(|| format!("failed to subscribe to channel '{channel}'"))?;

    Ok((subscription, count))
}

// ============================================================================
// Status Watcher
// ============================================================================

/// Logs global status transitions while the tap runs.
fn spawn_status_watcher(handle: &FeedHandle) {
    let mut watch = handle.status_watch();
    tokio::spawn(async move {
        let mut last = *watch.borrow();
        while watch.changed().await.is_ok() {
            let status = *watch.borrow();
            if status != last {
                match status {
                    ChannelState::Connected => info!(%status, "feed status changed"),
                    _ => warn!(%status, "feed status changed"),
                }
                last = status;
            }
        }
    });
}

// ============================================================================
// Shutdown Signal
// ============================================================================

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tape=info".parse()?)
                .add_directive("tape_feed=info".parse()?)
                .add_directive("tape_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => FeedConfig::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => FeedConfig::default(),
    };
    if let Some(url) = args.url {
        config.stream_base_url = url;
    }

    // Resolve the channel list before touching the network, so typos
    // fail the whole run up front.
    let catalog = ChannelCatalog::from_config(&config);
    let channels: Vec<ChannelId> = if args.channels.is_empty() {
        catalog.channels().collect()
    } else {
        let mut parsed = Vec::new();
        for name in &args.channels {
            let channel = ChannelId::from_str(name)
                .with_context(|| format!("'{name}' is not a known channel"))?;
            parsed.push(channel);
        }
        parsed
    };
    if channels.is_empty() {
        bail!("no channels to tap (all disabled in config?)");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        stream = %config.stream_base_url,
        channels = ?channels.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
        "tape-tap starting"
    );

    let handle = spawn_feed(config);
    spawn_status_watcher(&handle);

    let mut taps = Vec::new();
    for channel in &channels {
        let tap = tap_channel(&handle, *channel).await?;
        taps.push((*channel, tap));
    }

    // Run until the signal (or the requested duration) arrives
    match args.duration {
        Some(secs) => {
            tokio::select! {
                result = wait_for_shutdown_signal() => { result?; }
                _ = sleep(Duration::from_secs(secs)) => {
                    info!(seconds = secs, "duration elapsed");
                }
            }
        }
        None => {
            wait_for_shutdown_signal().await?;
        }
    }

    // Final per-channel summary on stdout
    if let Ok(stats) = handle.stats().await {
        println!(
            "{:<12} {:<13} {:>9} {:>7} {:>6}  {}",
            "channel", "state", "messages", "drops", "subs", "last error"
        );
        for channel in &channels {
            if let Some(entry) = stats.get(channel) {
                println!(
                    "{:<12} {:<13} {:>9} {:>7} {:>6}  {}",
                    channel.as_str(),
                    entry.state.label(),
                    entry.message_count,
                    entry.decode_error_count,
                    entry.subscriber_count,
                    entry.last_error.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    for (channel, (mut subscription, count)) in taps {
        info!(
            %channel,
            messages = count.load(Ordering::Relaxed),
            "closing tap"
        );
        subscription.dispose();
    }
    handle.shutdown().await;

    info!("tape-tap stopped");
    Ok(())
}
