use crate::error::{Error, Result};

/// Event context descriptor handed to the hook for one delivery attempt.
///
/// Memory Layout (16 bytes on 64-bit targets):
///
/// ```text
/// +----------------------------------------+
/// |              data_start                | 8 bytes
/// +----------------------------------------+
/// |               data_end                 | 8 bytes
/// +----------------------------------------+
///
/// Payload span:
///
///   data_start                      data_end
///       |                               |
///       v                               v
///       +---+---+---+---+- ... -+---+---+
///       | b0| b1| b2| b3|       |bn-1|  (one past the last byte)
///       +---+---+---+---+- ... -+---+
/// ```
///
/// The descriptor is only valid while the hook runs and is never stored.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct EventContext {
    pub data_start: *const u8,
    pub data_end: *const u8,
}

impl EventContext {
    #[inline(always)]
    pub const fn new(data_start: *const u8, data_end: *const u8) -> Self {
        Self {
            data_start,
            data_end,
        }
    }

    /// Describes an in-memory buffer.
    #[inline]
    pub fn from_slice(data: &[u8]) -> Self {
        let range = data.as_ptr_range();
        Self::new(range.start, range.end)
    }

    /// Checks the span bounds and returns its length.
    #[inline(always)]
    pub fn checked_len(&self) -> Result<usize> {
        if self.data_start.is_null() {
            return Err(Error::NullDataStart);
        }
        if self.data_end.is_null() {
            return Err(Error::NullDataEnd);
        }
        if self.data_end == self.data_start {
            return Err(Error::EmptySpan);
        }
        if self.data_end < self.data_start {
            return Err(Error::InvertedSpan);
        }

        Ok(self.data_end as usize - self.data_start as usize)
    }

    /// Validates the descriptor behind `ctx` and borrows its payload.
    ///
    /// # Safety
    /// - `ctx` is null or points to a live descriptor
    /// - a descriptor that passes the bounds checks describes readable
    ///   memory that stays unmodified for `'a`
    #[inline(always)]
    pub unsafe fn span<'a>(ctx: *const EventContext) -> Result<&'a [u8]> {
        let ctx = ctx.as_ref().ok_or(Error::NullContext)?;
        let len = ctx.checked_len()?;

        Ok(core::slice::from_raw_parts(ctx.data_start, len))
    }
}
