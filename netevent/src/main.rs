mod config;
mod monitor;
mod output;
mod pipeline;
mod programs;
mod replay;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, Level};

use crate::config::{AgentConfig, DEFAULT_CONFIG_PATH};
use crate::output::StdoutSink;
use crate::replay::ReplayOptions;

#[derive(Debug, Parser)]
#[clap(version, about = "Capture network events into a bounded ring and stream them out")]
struct Opt {
    /// Path to the agent configuration file
    #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Attach the XDP capture hook and stream kernel events
    Monitor {
        /// Interface to attach to, overriding the configuration
        #[clap(short, long)]
        iface: Option<String>,
    },
    /// Feed a capture file through the hook into an in-process channel
    Replay {
        path: PathBuf,

        /// Bytes per event
        #[clap(long, default_value_t = 1514)]
        chunk_size: usize,

        /// How often the consumer drains the channel
        #[clap(long, default_value_t = 10)]
        consumer_interval_ms: u64,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let opt = Opt::parse();
    init_tracing(opt.verbose);

    let mut config = AgentConfig::load(&opt.config)?;
    if let Command::Monitor { iface: Some(iface) } = &opt.command {
        config.agent.iface = iface.clone();
    }

    let (tx, rx) = mpsc::channel(config.output.queue_depth);
    let sink = Arc::new(StdoutSink::new(config.output.format));
    let sink_handle = tokio::spawn(pipeline::run_sink(rx, sink));

    match opt.command {
        Command::Monitor { .. } => monitor::run_monitor(&config, tx).await?,
        Command::Replay {
            path,
            chunk_size,
            consumer_interval_ms,
        } => {
            let options = ReplayOptions {
                path,
                chunk_size,
                consumer_interval: Duration::from_millis(consumer_interval_ms),
            };
            let summary = replay::run_replay(&config, options, tx).await?;
            eprintln!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    let emitted = sink_handle.await.context("output task failed")?;
    info!(emitted, "output drained");
    Ok(())
}
