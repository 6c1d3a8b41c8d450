use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel capacity must be non-zero")]
    ZeroCapacity,

    #[error("channel capacity {0} does not fit 32-bit record lengths")]
    CapacityTooLarge(usize),
}
