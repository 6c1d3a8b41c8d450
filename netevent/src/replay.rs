use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context as _, Result};
use netevent_ebpf_common::{EventContext, EventHook, NetEventMonitor, HOOK_SUCCESS};
use netevent_userspace_common::{ChannelStats, EventChannel, EventRecord};
use serde::Serialize;
use tokio::{sync::mpsc, task, time};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;

pub struct ReplayOptions {
    pub path: PathBuf,
    pub chunk_size: usize,
    pub consumer_interval: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    /// Chunks handed to the hook.
    pub events: u64,
    /// Records drained from the channel and forwarded to the sink.
    pub delivered: u64,
    /// Chunks the hook refused.
    pub dropped: u64,
    pub stats: ChannelStats,
}

/// Feeds a capture file through the hook into an in-process channel while a
/// periodic consumer drains it. Useful without CAP_BPF or a live interface.
pub async fn run_replay(
    config: &AgentConfig,
    options: ReplayOptions,
    tx: mpsc::Sender<EventRecord>,
) -> Result<ReplaySummary> {
    ensure!(options.chunk_size > 0, "chunk size must be non-zero");

    let data = tokio::fs::read(&options.path)
        .await
        .with_context(|| format!("failed to read {}", options.path.display()))?;
    let channel = Arc::new(EventChannel::with_capacity(config.channel.capacity_bytes)?);

    info!(
        path = %options.path.display(),
        bytes = data.len(),
        chunk_size = options.chunk_size,
        capacity = channel.capacity(),
        "replaying capture"
    );

    let producer = {
        let channel = Arc::clone(&channel);
        let chunk_size = options.chunk_size;
        task::spawn_blocking(move || produce(&channel, &data, chunk_size))
    };

    let mut seq = 0u64;
    let mut tick = time::interval(options.consumer_interval);
    while !producer.is_finished() {
        tick.tick().await;
        forward(&channel, &mut seq, &tx).await;
    }
    let (events, dropped) = producer.await.context("replay producer panicked")?;
    forward(&channel, &mut seq, &tx).await;

    let summary = ReplaySummary {
        events,
        delivered: seq,
        dropped,
        stats: channel.stats(),
    };
    info!(
        events = summary.events,
        delivered = summary.delivered,
        dropped = summary.dropped,
        overflows = summary.stats.overflows,
        busy = summary.stats.busy,
        "replay finished"
    );
    Ok(summary)
}

/// Publishes every `chunk_size` slice of `data` through the hook. Returns
/// the number of chunks offered and the number refused.
fn produce(channel: &EventChannel, data: &[u8], chunk_size: usize) -> (u64, u64) {
    let monitor = NetEventMonitor::new(channel);
    let mut events = 0u64;
    let mut dropped = 0u64;

    for chunk in data.chunks(chunk_size) {
        let ctx = EventContext::from_slice(chunk);
        events += 1;
        if unsafe { monitor.on_event(&ctx) } != HOOK_SUCCESS {
            dropped += 1;
        }
    }
    (events, dropped)
}

/// Drains whatever is committed and hands it to the sink queue.
async fn forward(channel: &EventChannel, seq: &mut u64, tx: &mpsc::Sender<EventRecord>) {
    // collect first so the consumer lock is not held across an await
    let batch: Vec<EventRecord> = channel
        .consume()
        .map(|data| {
            let record = EventRecord::new(*seq, data);
            *seq += 1;
            record
        })
        .collect();

    if batch.is_empty() {
        return;
    }
    debug!(records = batch.len(), "forwarding batch");
    for record in batch {
        if tx.send(record).await.is_err() {
            warn!("output queue closed, discarding replayed records");
            return;
        }
    }
}
