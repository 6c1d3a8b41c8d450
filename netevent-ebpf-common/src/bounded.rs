//! Length gate in front of a sink
//!
//! Records longer than the limit are rejected as [`Error::Overflow`] and
//! counted, never truncated. Failures of the wrapped sink are counted too,
//! so the counter holds every record the hook could not deliver.

use crate::error::{Error, Result};
use crate::hook::RecordSink;

/// Something that tallies records that did not make it into the channel.
pub trait DropCounter {
    fn count_drop(&self);
}

impl<C: DropCounter + ?Sized> DropCounter for &C {
    #[inline(always)]
    fn count_drop(&self) {
        (**self).count_drop()
    }
}

pub struct BoundedSink<S, C> {
    inner: S,
    drops: C,
    max_len: usize,
}

impl<S: RecordSink, C: DropCounter> BoundedSink<S, C> {
    #[inline(always)]
    pub const fn new(inner: S, drops: C, max_len: usize) -> Self {
        Self {
            inner,
            drops,
            max_len,
        }
    }
}

impl<S: RecordSink, C: DropCounter> RecordSink for BoundedSink<S, C> {
    #[inline(always)]
    fn publish(&self, record: &[u8]) -> Result<()> {
        if record.len() > self.max_len {
            self.drops.count_drop();
            return Err(Error::Overflow);
        }

        self.inner.publish(record).map_err(|e| {
            self.drops.count_drop();
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        EventContext, EventHook, NetEventMonitor, HOOK_FAILURE, HOOK_SUCCESS, MAX_RECORD_LEN,
    };
    use std::cell::{Cell, RefCell};
    use std::vec::Vec;

    #[derive(Default)]
    struct Counter(Cell<u64>);

    impl DropCounter for Counter {
        fn count_drop(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[derive(Default)]
    struct Lengths {
        seen: RefCell<Vec<usize>>,
        fail: bool,
    }

    impl RecordSink for Lengths {
        fn publish(&self, record: &[u8]) -> Result<()> {
            if self.fail {
                return Err(Error::Map(-28));
            }
            self.seen.borrow_mut().push(record.len());
            Ok(())
        }
    }

    #[test]
    fn record_over_the_limit_is_rejected_whole_and_counted() {
        let inner = Lengths::default();
        let drops = Counter::default();
        let sink = BoundedSink::new(&inner, &drops, MAX_RECORD_LEN);
        let monitor = NetEventMonitor::new(&sink);

        let frame = vec![0u8; MAX_RECORD_LEN + 1];
        let ctx = EventContext::from_slice(&frame);
        assert_eq!(unsafe { monitor.try_monitor(&ctx) }, Err(Error::Overflow));
        assert_eq!(drops.0.get(), 1);
        // nothing reached the sink, not even a shortened copy
        assert!(inner.seen.borrow().is_empty());

        let ctx = EventContext::from_slice(&frame[..MAX_RECORD_LEN]);
        assert_eq!(unsafe { monitor.on_event(&ctx) }, HOOK_SUCCESS);
        assert_eq!(*inner.seen.borrow(), vec![MAX_RECORD_LEN]);
        assert_eq!(drops.0.get(), 1);
    }

    #[test]
    fn inner_failures_are_counted_and_passed_through() {
        let inner = Lengths {
            fail: true,
            ..Lengths::default()
        };
        let drops = Counter::default();
        let sink = BoundedSink::new(&inner, &drops, 16);

        assert_eq!(sink.publish(b"abc"), Err(Error::Map(-28)));
        assert_eq!(drops.0.get(), 1);

        let monitor = NetEventMonitor::new(&sink);
        let ctx = EventContext::from_slice(b"abc");
        assert_eq!(unsafe { monitor.on_event(&ctx) }, HOOK_FAILURE);
        assert_eq!(drops.0.get(), 2);
    }

    #[test]
    fn invalid_descriptors_are_not_drops() {
        let inner = Lengths::default();
        let drops = Counter::default();
        let sink = BoundedSink::new(&inner, &drops, 16);
        let monitor = NetEventMonitor::new(&sink);

        assert_eq!(unsafe { monitor.on_event(core::ptr::null()) }, HOOK_FAILURE);
        assert_eq!(drops.0.get(), 0);
    }
}
