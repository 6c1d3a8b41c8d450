use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use aya::{
    maps::{MapData, PerCpuArray, RingBuf},
    util::nr_cpus,
    EbpfLoader,
};
use async_trait::async_trait;
use aya_log::EbpfLogger;
use bytes::Bytes;
use netevent_ebpf_common::{
    EVENTS_MAP_NAME, OVERFLOWS_MAP_NAME, PROGRAM_NAME, SCRATCH_MAP_NAME,
};
use netevent_userspace_common::EventRecord;
use tokio::{
    io::unix::AsyncFd,
    signal,
    sync::mpsc,
    time::{self, Instant},
};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::programs::{get_ebpf_path, MapBuilder, ProgramBuilder};

const EBPF_OBJECT: &str = "netevent-ebpf";

/// Attaches the capture hook and streams ring buffer records into `tx`
/// until Ctrl-C.
pub async fn run_monitor(config: &AgentConfig, tx: mpsc::Sender<EventRecord>) -> Result<()> {
    config.validate_kernel_capacity()?;
    bump_memlock_rlimit();

    let object = config
        .agent
        .ebpf_object
        .clone()
        .unwrap_or_else(|| get_ebpf_path(EBPF_OBJECT));
    let scratch_slots = scratch_slots()?;
    let mut ebpf = EbpfLoader::new()
        .set_max_entries(EVENTS_MAP_NAME, config.channel.capacity_bytes as u32)
        .set_max_entries(SCRATCH_MAP_NAME, scratch_slots)
        .load_file(&object)
        .with_context(|| format!("failed to load {}", object.display()))?;

    if config.agent.ebpf_logging {
        if let Err(e) = EbpfLogger::init(&mut ebpf) {
            warn!("failed to initialize eBPF logger for netevent monitor: {}", e);
        }
    }

    ProgramBuilder::xdp(PROGRAM_NAME, config.agent.iface.as_str())
        .with_mode(config.agent.xdp_mode)
        .load(&mut ebpf)?;

    let ring = RingBuf::try_from(MapBuilder::new(EVENTS_MAP_NAME).take(&mut ebpf)?)?;
    let mut source = RingSource {
        ring: AsyncFd::new(ring).context("failed to register ring buffer fd")?,
        seq: 0,
    };
    let mut drops = DropReporter::new(PerCpuArray::try_from(
        MapBuilder::new(OVERFLOWS_MAP_NAME).take(&mut ebpf)?,
    )?);

    info!(
        iface = %config.agent.iface,
        capacity = config.channel.capacity_bytes,
        "netevent monitor is running. Waiting for Ctrl-C..."
    );

    pump(
        &mut source,
        &tx,
        signal::ctrl_c(),
        Duration::from_secs(config.agent.stats_interval_secs),
        || drops.report(),
    )
    .await
}

/// Where the monitor loop gets its records from.
#[async_trait(?Send)]
trait RecordSource {
    /// Waits until records are available and appends them to `out`.
    /// Dropping the future before it completes loses nothing.
    async fn fill(&mut self, out: &mut VecDeque<EventRecord>) -> Result<()>;
}

struct RingSource {
    ring: AsyncFd<RingBuf<MapData>>,
    seq: u64,
}

#[async_trait(?Send)]
impl RecordSource for RingSource {
    async fn fill(&mut self, out: &mut VecDeque<EventRecord>) -> Result<()> {
        let mut guard = self
            .ring
            .readable_mut()
            .await
            .context("ring buffer poll failed")?;
        drain_ring(guard.get_inner_mut(), &mut self.seq, out);
        guard.clear_ready();
        Ok(())
    }
}

/// Moves records from `source` to `tx` until `shutdown` resolves or the
/// queue closes, calling `report` every `stats_every` and once on exit.
///
/// Waiting for queue space never holds up shutdown or reports. While
/// records are waiting for space the source is not polled, so a slow sink
/// turns into drops at the source.
async fn pump<S, F>(
    source: &mut S,
    tx: &mpsc::Sender<EventRecord>,
    shutdown: F,
    stats_every: Duration,
    mut report: impl FnMut(),
) -> Result<()>
where
    S: RecordSource + ?Sized,
    F: Future<Output = io::Result<()>>,
{
    let mut stats_tick = time::interval_at(Instant::now() + stats_every, stats_every);
    tokio::pin!(shutdown);

    let mut pending = VecDeque::new();
    let mut result = Ok(());
    loop {
        tokio::select! {
            res = &mut shutdown => {
                result = res.context("failed to listen for Ctrl-C");
                info!("Exiting netevent monitor...");
                break;
            }
            _ = stats_tick.tick() => report(),
            permit = tx.reserve(), if !pending.is_empty() => match permit {
                Ok(permit) => {
                    if let Some(record) = pending.pop_front() {
                        permit.send(record);
                    }
                }
                Err(_) => {
                    warn!("output queue closed, stopping monitor");
                    break;
                }
            },
            res = source.fill(&mut pending), if pending.is_empty() => {
                if let Err(e) = res {
                    result = Err(e);
                    break;
                }
            }
        }
    }

    // hand over what fits without waiting
    let mut unsent = 0usize;
    for record in pending {
        if tx.try_send(record).is_err() {
            unsent += 1;
        }
    }
    if unsent > 0 {
        warn!(unsent, "discarded records the output queue had no room for");
    }
    report();
    result
}

/// Copies out everything currently committed. Each item is released back to
/// the kernel as soon as it has been copied.
fn drain_ring(ring: &mut RingBuf<MapData>, seq: &mut u64, out: &mut VecDeque<EventRecord>) {
    while let Some(item) = ring.next() {
        out.push_back(EventRecord::new(*seq, Bytes::copy_from_slice(&item)));
        *seq += 1;
    }
}

/// The frame copy map is indexed by CPU id, so it needs one slot past the
/// highest possible id.
fn scratch_slots() -> Result<u32> {
    let cpus = nr_cpus().map_err(|e| anyhow!("Failed to get possible CPUs: {:?}", e))?;
    Ok((cpus as u32).max(1))
}

/// Sums the per-CPU counters and returns `(new drops since last, total)`.
/// A total below `last` means the map was recreated, so it all counts as new.
fn new_drops(last: u64, per_cpu: &[u64]) -> (u64, u64) {
    let total: u64 = per_cpu.iter().sum();
    let dropped = if total >= last { total - last } else { total };
    (dropped, total)
}

/// Turns the per-CPU overflow counter into periodic drop reports.
struct DropReporter {
    counters: PerCpuArray<MapData, u64>,
    last_total: u64,
}

impl DropReporter {
    fn new(counters: PerCpuArray<MapData, u64>) -> Self {
        Self {
            counters,
            last_total: 0,
        }
    }

    fn report(&mut self) {
        let values = match self.counters.get(&0, 0) {
            Ok(values) => values,
            Err(e) => {
                warn!("failed to read overflow counter: {}", e);
                return;
            }
        };

        let (dropped, total) = new_drops(self.last_total, &values);
        if dropped > 0 {
            warn!(dropped, total, "ring buffer full, events dropped");
        } else {
            debug!(total, "no new drops");
        }
        self.last_total = total;
    }
}

fn bump_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("remove limit on locked memory failed, ret is: {}", ret);
    }
}
