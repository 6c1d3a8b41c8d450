//! The validate-and-forward hook.
//!
//! ```text
//! host ──EventContext──▶ NetEventMonitor ──&[u8]──▶ RecordSink
//!                          │                          (ring buffer map,
//!                          └─ i32 status ◀──┐          EventChannel, ...)
//!                                           │
//!                            HOOK_SUCCESS / HOOK_FAILURE
//! ```

use crate::context::EventContext;
use crate::error::Result;
use crate::HOOK_SUCCESS;

/// Destination of validated records.
///
/// `publish` either makes the whole record visible to consumers or fails
/// leaving the sink untouched. It must never block.
pub trait RecordSink {
    fn publish(&self, record: &[u8]) -> Result<()>;
}

impl<S: RecordSink + ?Sized> RecordSink for &S {
    #[inline(always)]
    fn publish(&self, record: &[u8]) -> Result<()> {
        (**self).publish(record)
    }
}

/// Entry point the host invokes once per network event.
pub trait EventHook {
    /// Returns [`HOOK_SUCCESS`] or [`crate::HOOK_FAILURE`].
    ///
    /// # Safety
    /// Same contract as [`EventContext::span`].
    unsafe fn on_event(&self, ctx: *const EventContext) -> i32;
}

/// Hook forwarding each valid event span into a sink it borrows.
pub struct NetEventMonitor<'a, S: ?Sized> {
    sink: &'a S,
}

impl<'a, S: RecordSink + ?Sized> NetEventMonitor<'a, S> {
    #[inline(always)]
    pub const fn new(sink: &'a S) -> Self {
        Self { sink }
    }

    /// Validates the descriptor and makes exactly one publish attempt.
    ///
    /// # Safety
    /// Same contract as [`EventContext::span`].
    #[inline(always)]
    pub unsafe fn try_monitor(&self, ctx: *const EventContext) -> Result<()> {
        let record = EventContext::span(ctx)?;
        self.sink.publish(record)
    }
}

impl<S: RecordSink + ?Sized> EventHook for NetEventMonitor<'_, S> {
    #[inline(always)]
    unsafe fn on_event(&self, ctx: *const EventContext) -> i32 {
        match self.try_monitor(ctx) {
            Ok(()) => HOOK_SUCCESS,
            Err(e) => e.to_retval(),
        }
    }
}
