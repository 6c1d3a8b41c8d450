//! Types shared by the kernel capture program and the userspace agent.
//!
//! Everything here is `no_std` and allocation free so the same hook runs
//! inside the XDP program and against the in-process channel used for
//! replay and tests.

#![cfg_attr(not(test), no_std)]

pub mod bounded;
pub mod context;
pub mod error;
pub mod hook;

pub use bounded::{BoundedSink, DropCounter};
pub use context::EventContext;
pub use error::{Error, ErrorKind, Result};
pub use hook::{EventHook, NetEventMonitor, RecordSink};

/// Default byte size of the event ring buffer (512 KiB).
pub const EVENTS_MAP_SIZE: u32 = 512 * 1024;

/// Name of the kernel ring buffer map holding committed records.
pub const EVENTS_MAP_NAME: &str = "NETEVENT_EVENTS";

/// Name of the per-CPU counter of rejected publishes.
pub const OVERFLOWS_MAP_NAME: &str = "NETEVENT_OVERFLOWS";

/// Name of the XDP entry point in the kernel object.
pub const PROGRAM_NAME: &str = "netevent_monitor";

/// Name of the per-CPU frame copy area used by the kernel adapter.
pub const SCRATCH_MAP_NAME: &str = "NETEVENT_SCRATCH";

/// Largest record the kernel adapter forwards. Anything bigger is rejected.
pub const MAX_RECORD_LEN: usize = 0xFFFF;

/// Size of one frame copy slot. A power of two so lengths can be masked.
pub const SCRATCH_LEN: usize = MAX_RECORD_LEN + 1;

/// Hook return value when the record was published.
pub const HOOK_SUCCESS: i32 = 0;

/// Hook return value for every failure, whatever the cause.
pub const HOOK_FAILURE: i32 = -1;
