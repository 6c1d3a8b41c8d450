//! Error handling for the capture hook
//!
//! Every variant collapses to the same hook return code; the variants only
//! exist so adapters and tests can tell the failure classes apart.

use core::fmt;

use crate::HOOK_FAILURE;

/// Reasons a hook invocation or a publish did not produce a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Descriptor pointer was null
    NullContext,

    /// `data_start` was null
    NullDataStart,

    /// `data_end` was null
    NullDataEnd,

    /// `data_end == data_start`
    EmptySpan,

    /// `data_end < data_start`
    InvertedSpan,

    /// Not enough free capacity for the whole record
    Overflow,

    /// Another writer is publishing right now
    Busy,

    /// Ring buffer helper failed with the given code
    Map(i64),
}

/// The two failure classes callers may care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing event context
    InvalidInput,

    /// The channel could not take the record
    Overflow,
}

impl Error {
    /// Convert error to the hook's return code
    #[inline(always)]
    pub const fn to_retval(self) -> i32 {
        HOOK_FAILURE
    }

    #[inline(always)]
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::NullContext
            | Self::NullDataStart
            | Self::NullDataEnd
            | Self::EmptySpan
            | Self::InvertedSpan => ErrorKind::InvalidInput,
            Self::Overflow | Self::Busy | Self::Map(_) => ErrorKind::Overflow,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullContext => write!(f, "Null event context"),
            Self::NullDataStart => write!(f, "Null data_start pointer"),
            Self::NullDataEnd => write!(f, "Null data_end pointer"),
            Self::EmptySpan => write!(f, "Empty event span"),
            Self::InvertedSpan => write!(f, "data_end precedes data_start"),
            Self::Overflow => write!(f, "Channel overflow"),
            Self::Busy => write!(f, "Channel writer busy"),
            Self::Map(code) => write!(f, "Ring buffer output error: {}", code),
        }
    }
}

/// Result type specialized for the capture hook
pub type Result<T> = core::result::Result<T, Error>;
