//! Bounded single-writer event channel
//!
//! An in-process counterpart of the kernel ring buffer map. The producer
//! (the capture hook) appends whole records; any number of consumer threads
//! drain them in publish order.
//!
//! Storage layout:
//!
//! ```text
//!                 tail (reclaimed)            head (written)
//!                       │                           │
//!   data    ┌───────────▼───────────────────────────▼──────────────┐
//!   (C B)   │   free    │ rec n │ rec n+1 │  rec n+2  │    free    │
//!           └───────────┴───────┴─────────┴───────────┴────────────┘
//!
//!   lengths ┌─────┬─────┬─────┬─────┬─────┬─────┬───  ───┐
//!   (C u32) │     │ len │ len │ len │     │     │   ...   │   slot = seq % C
//!           └─────┴─────┴─────┴─────┴─────┴─────┴───  ───┘
//! ```
//!
//! Record lengths live out of band, so a record of `len` bytes is charged
//! exactly `len` bytes of the capacity. Every record is at least one byte,
//! so `C` length slots can never run out before the data bytes do.
//!
//! Per-record lifecycle:
//!
//! ```text
//! Reserved ──(committed store)──▶ Committed ──(drained)──▶ Reclaimed
//!    │
//!    └─ overflow: nothing was written, nothing to undo
//! ```
//!
//! Reclamation uses one shared read cursor. A record is handed to exactly
//! one consumer and its bytes are returned to the free pool as soon as that
//! consumer has copied it out. Consumers serialize among themselves on the
//! cursor lock; the producer never takes it, so a consumer that stalls only
//! makes later publishes overflow.

use std::cell::UnsafeCell;
use std::fmt;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use log::debug;
use netevent_ebpf_common::{Error, RecordSink, EVENTS_MAP_SIZE};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;

use crate::error::ChannelError;

/// Capacity used when none is configured (512 KiB).
pub const DEFAULT_CAPACITY: usize = EVENTS_MAP_SIZE as usize;

/// Fixed-capacity single-writer, multi-reader record channel.
///
/// Besides the `capacity` data bytes, the channel keeps one `u32` length
/// slot per byte of capacity, so the default 512 KiB channel allocates
/// about 2.5 MiB in total.
pub struct EventChannel {
    data: Box<[UnsafeCell<u8>]>,
    lengths: Box<[AtomicU32]>,
    capacity: u64,
    writer: AtomicBool,
    /// Bytes ever written. Producer only.
    head: AtomicU64,
    /// Records ever committed. Its release store publishes a record.
    committed: AtomicU64,
    /// Bytes ever reclaimed.
    tail: AtomicU64,
    /// Records ever reclaimed.
    reclaimed: AtomicU64,
    reader: Mutex<ReadCursor>,
    published: AtomicU64,
    overflows: AtomicU64,
    /// Publishes turned away because another writer was active.
    busy: AtomicU64,
}

#[derive(Default)]
struct ReadCursor {
    pos: u64,
    seq: u64,
}

// SAFETY: the producer writes only bytes in [head, tail + C) and consumers
// read only bytes in [tail, head) of committed records. The two ranges never
// overlap, and the acquire/release pairs on `committed` and `tail` order the
// copies on either side of each hand-off.
unsafe impl Sync for EventChannel {}

/// Point-in-time view of the channel counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub capacity: usize,
    pub unread_bytes: usize,
    pub unread_records: usize,
    pub published: u64,
    pub overflows: u64,
    pub busy: u64,
}

impl EventChannel {
    /// Creates a channel holding at most `capacity` bytes of unread records.
    pub fn with_capacity(capacity: usize) -> Result<Self, ChannelError> {
        if capacity == 0 {
            return Err(ChannelError::ZeroCapacity);
        }
        if u32::try_from(capacity).is_err() {
            return Err(ChannelError::CapacityTooLarge(capacity));
        }

        debug!("creating event channel with {} bytes of capacity", capacity);
        Ok(Self::allocate(capacity))
    }

    fn allocate(capacity: usize) -> Self {
        Self {
            data: (0..capacity).map(|_| UnsafeCell::new(0)).collect(),
            lengths: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            capacity: capacity as u64,
            writer: AtomicBool::new(false),
            head: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            tail: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
            reader: Mutex::new(ReadCursor::default()),
            published: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
            busy: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Appends one record.
    ///
    /// Either the whole record becomes visible to consumers in one step or
    /// the channel is left untouched. Never blocks: a second concurrent
    /// writer gets [`Error::Busy`] and a record that does not fit in the free
    /// space gets [`Error::Overflow`].
    pub fn publish(&self, record: &[u8]) -> Result<(), Error> {
        if record.is_empty() {
            return Err(Error::EmptySpan);
        }
        let Some(_writer) = WriterGuard::try_acquire(&self.writer) else {
            self.busy.fetch_add(1, Ordering::Relaxed);
            return Err(Error::Busy);
        };

        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let len = record.len() as u64;
        if len > self.capacity - (head - tail) {
            self.overflows.fetch_add(1, Ordering::Relaxed);
            return Err(Error::Overflow);
        }

        // SAFETY: [head, head + len) lies within [head, tail + C), which no
        // consumer reads until it is committed.
        unsafe { self.write_at(head, record) };

        let seq = self.committed.load(Ordering::Relaxed);
        self.lengths[self.slot(seq)].store(len as u32, Ordering::Relaxed);
        self.head.store(head + len, Ordering::Relaxed);
        self.committed.store(seq + 1, Ordering::Release);

        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Drains the records committed before this call, oldest first.
    ///
    /// Each yielded record is reclaimed as it is yielded. Records published
    /// while the drain is in progress are left for the next poll. Concurrent
    /// consumers wait for each other here, never for the producer.
    pub fn consume(&self) -> Drain<'_> {
        let cursor = self.reader.lock();
        let end = self.committed.load(Ordering::Acquire);

        Drain {
            channel: self,
            cursor,
            end,
        }
    }

    /// Number of publishes rejected for lack of space. Only ever grows.
    pub fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ChannelStats {
        // tails first: heads only move forward, so the differences stay >= 0
        let tail = self.tail.load(Ordering::Acquire);
        let reclaimed = self.reclaimed.load(Ordering::Acquire);
        let committed = self.committed.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Relaxed);

        ChannelStats {
            capacity: self.capacity(),
            unread_bytes: head.saturating_sub(tail) as usize,
            unread_records: committed.saturating_sub(reclaimed) as usize,
            published: self.published.load(Ordering::Relaxed),
            overflows: self.overflow_count(),
            busy: self.busy.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn offset(&self, pos: u64) -> usize {
        (pos % self.capacity) as usize
    }

    #[inline]
    fn slot(&self, seq: u64) -> usize {
        (seq % self.capacity) as usize
    }

    /// Copies `src` into the ring starting at logical position `pos`.
    ///
    /// # Safety
    /// `[pos, pos + src.len())` must be free space that no consumer reads.
    unsafe fn write_at(&self, pos: u64, src: &[u8]) {
        let start = self.offset(pos);
        let first = src.len().min(self.data.len() - start);
        let base = UnsafeCell::raw_get(self.data.as_ptr());

        ptr::copy_nonoverlapping(src.as_ptr(), base.add(start), first);
        ptr::copy_nonoverlapping(src.as_ptr().add(first), base, src.len() - first);
    }

    /// Appends `len` bytes starting at logical position `pos` to `dst`.
    ///
    /// # Safety
    /// `[pos, pos + len)` must belong to a committed, unreclaimed record.
    unsafe fn read_at(&self, pos: u64, len: usize, dst: &mut BytesMut) {
        let start = self.offset(pos);
        let first = len.min(self.data.len() - start);
        let base = UnsafeCell::raw_get(self.data.as_ptr()) as *const u8;

        dst.extend_from_slice(slice::from_raw_parts(base.add(start), first));
        dst.extend_from_slice(slice::from_raw_parts(base, len - first));
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::allocate(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("stats", &self.stats())
            .finish()
    }
}

impl RecordSink for EventChannel {
    #[inline]
    fn publish(&self, record: &[u8]) -> Result<(), Error> {
        EventChannel::publish(self, record)
    }
}

/// Records drained by one [`EventChannel::consume`] poll.
pub struct Drain<'a> {
    channel: &'a EventChannel,
    cursor: MutexGuard<'a, ReadCursor>,
    end: u64,
}

impl Iterator for Drain<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.cursor.seq >= self.end {
            return None;
        }

        let channel = self.channel;
        let len = channel.lengths[channel.slot(self.cursor.seq)].load(Ordering::Relaxed) as usize;
        let mut record = BytesMut::with_capacity(len);

        // SAFETY: seq < end, so the record is committed, and it is not
        // reclaimed until the tail store below.
        unsafe { channel.read_at(self.cursor.pos, len, &mut record) };

        self.cursor.seq += 1;
        self.cursor.pos += len as u64;
        channel.reclaimed.store(self.cursor.seq, Ordering::Release);
        channel.tail.store(self.cursor.pos, Ordering::Release);

        Some(record.freeze())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.cursor.seq) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Drain<'_> {}

struct WriterGuard<'a>(&'a AtomicBool);

impl<'a> WriterGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
