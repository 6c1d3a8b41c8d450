//! Kernel side of the event channel
//!
//! The ring buffer map is the channel storage the host hands us at load
//! time. Userspace can resize it before load, so the size below is only the
//! default.
//!
//! ```text
//!                   bpf_xdp_load_bytes                 bpf_ringbuf_output
//! ┌──────────────┐ ─────────────────▶ ┌──────────────────┐ ──────────▶ ┌──────────────────┐
//! │ XDP hook     │                    │ NETEVENT_SCRATCH │             │ NETEVENT_EVENTS  │ ──mmap──▶ agent
//! │ (per packet) │                    │ (slot per CPU)   │             │ (RingBuf)        │
//! └──────────────┘                    └──────────────────┘             └──────────────────┘
//!        │ rejected
//!        ▼
//! ┌────────────────────┐
//! │ NETEVENT_OVERFLOWS │ per-CPU u64
//! └────────────────────┘
//! ```
//!
//! Helpers may only read packet memory the verifier has proven in bounds
//! with constant offsets, so the frame is copied into a map value first and
//! published from there.

use core::ffi::c_void;

use aya_ebpf::{
    helpers::gen::{bpf_get_smp_processor_id, bpf_xdp_load_bytes},
    macros::map,
    maps::{Array, PerCpuArray, RingBuf},
    programs::XdpContext,
};
use netevent_ebpf_common::{
    DropCounter, Error, RecordSink, Result, EVENTS_MAP_SIZE, MAX_RECORD_LEN, SCRATCH_LEN,
};

const ENOENT: i64 = 2;

#[map(name = "NETEVENT_EVENTS")]
static NETEVENT_EVENTS: RingBuf = RingBuf::with_byte_size(EVENTS_MAP_SIZE, 0);

#[map(name = "NETEVENT_OVERFLOWS")]
static NETEVENT_OVERFLOWS: PerCpuArray<u64> = PerCpuArray::with_max_entries(1, 0);

/// One copy slot per possible CPU; userspace sizes it before load. A
/// per-CPU array cannot hold values this large, hence the CPU index.
#[map(name = "NETEVENT_SCRATCH")]
static NETEVENT_SCRATCH: Array<[u8; SCRATCH_LEN]> = Array::with_max_entries(1, 0);

/// Per-CPU tally of frames that were not published.
pub struct PerCpuDrops;

impl DropCounter for PerCpuDrops {
    #[inline(always)]
    fn count_drop(&self) {
        if let Some(count) = NETEVENT_OVERFLOWS.get_ptr_mut(0) {
            // per-CPU slot, no other writer
            unsafe { *count += 1 };
        }
    }
}

/// Publishes the current frame into the ring buffer.
///
/// The hook only ever hands over the frame's whole linear span, so the
/// bytes are read back from the context at offset 0 rather than through the
/// record pointer.
pub struct FrameSink<'a> {
    ctx: &'a XdpContext,
}

impl<'a> FrameSink<'a> {
    #[inline(always)]
    pub fn new(ctx: &'a XdpContext) -> Self {
        Self { ctx }
    }
}

impl RecordSink for FrameSink<'_> {
    #[inline(always)]
    fn publish(&self, record: &[u8]) -> Result<()> {
        // the mask gives the verifier an upper bound; callers reject longer
        // records before we get here
        let len = record.len() & MAX_RECORD_LEN;
        if len == 0 {
            return Err(Error::EmptySpan);
        }

        let cpu = unsafe { bpf_get_smp_processor_id() };
        let slot = NETEVENT_SCRATCH.get_ptr_mut(cpu).ok_or(Error::Map(-ENOENT))?;

        let ret = unsafe { bpf_xdp_load_bytes(self.ctx.ctx, 0, slot as *mut c_void, len as u32) };
        if ret < 0 {
            return Err(Error::Map(ret));
        }

        let copy = unsafe { &(*slot)[..len] };
        NETEVENT_EVENTS.output(copy, 0).map_err(Error::Map)
    }
}
