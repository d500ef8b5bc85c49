//! `espcam-receiver` command-line entry point
//!
//! ```text
//! espcam-receiver [OPTIONS] [run|sniff]
//! ```
//!
//! `run` (the default) reassembles and decodes frames, logging the frame
//! rate. `sniff` only logs each datagram's length, leading bytes and header.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use espcam_receiver_lib::config::ReceiverConfig;
use espcam_receiver_lib::frame_assembler::{CompletionCheck, EvictionPolicy};
use espcam_receiver_lib::receiver::StreamReceiver;
use espcam_receiver_lib::rgb565::ChannelOrder;
use espcam_receiver_lib::sink::LoggingSink;

#[derive(Parser, Debug)]
#[command(name = "espcam-receiver")]
#[command(author, version, about = "Receive and decode fragmented RGB565 frames over UDP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(short, long)]
    addr: Option<std::net::IpAddr>,

    /// UDP port to bind
    #[arg(short, long)]
    port: Option<u16>,

    /// Frame width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Frame height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Incomplete frames held at once
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Eviction victim: lowest-id or oldest-arrival
    #[arg(long)]
    eviction: Option<EvictionPolicy>,

    /// Completion check: coverage or byte-sum
    #[arg(long)]
    completion: Option<CompletionCheck>,

    /// Output channel order: bgr or rgb
    #[arg(long)]
    channel_order: Option<ChannelOrder>,

    /// Frames between FPS log lines (0 disables)
    #[arg(long)]
    fps_interval: Option<u32>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Reassemble and decode frames
    Run,
    /// Log raw datagrams without reassembly
    Sniff,
}

impl Cli {
    fn resolve_config(&self) -> Result<ReceiverConfig> {
        let mut config = match &self.config {
            Some(path) => ReceiverConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ReceiverConfig::default(),
        };

        if let Some(addr) = self.addr {
            config.listen_addr = addr;
        }
        if let Some(port) = self.port {
            config.listen_port = port;
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config.max_in_flight = max_in_flight;
        }
        if let Some(eviction) = self.eviction {
            config.eviction = eviction;
        }
        if let Some(completion) = self.completion {
            config.completion = completion;
        }
        if let Some(order) = self.channel_order {
            config.channel_order = order;
        }
        if let Some(interval) = self.fps_interval {
            config.fps_interval = interval;
        }

        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    espcam_receiver_lib::init_logging();

    let cli = Cli::parse();
    let info = espcam_receiver_lib::build_info();
    log::info!(
        "espcam-receiver {} ({}, built {})",
        info.version,
        info.git_hash,
        info.build_time
    );

    let config = cli.resolve_config()?;
    log::debug!("Effective config: {:?}", config);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Sniff => sniff(config).await,
    }
}

async fn run(config: ReceiverConfig) -> Result<()> {
    let fps_interval = config.fps_interval;
    let receiver = StreamReceiver::bind(config).context("failed to start receiver")?;
    let handle = receiver
        .start(LoggingSink::new(fps_interval))
        .context("failed to start receiver threads")?;
    let mut finished = handle.finished();

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            log::info!("Ctrl+C received, shutting down");
        }
        _ = finished.wait_for(|done| *done) => {
            log::info!("Receiver stopped");
        }
    }

    let stats = handle.stats();
    handle.stop().context("receiver did not shut down cleanly")?;
    log::info!("Final stats: {}", serde_json::to_string(&stats.snapshot())?);

    Ok(())
}

async fn sniff(config: ReceiverConfig) -> Result<()> {
    let receiver = StreamReceiver::bind(config).context("failed to start sniffer")?;
    let stop = Arc::new(AtomicBool::new(false));

    let sniffer = {
        let stop = Arc::clone(&stop);
        tokio::task::spawn_blocking(move || receiver.sniff(&stop))
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    log::info!("Ctrl+C received, shutting down");
    stop.store(true, Ordering::Relaxed);

    let count = sniffer.await.context("sniffer task failed")?;
    log::info!("Saw {} datagrams", count);

    Ok(())
}
