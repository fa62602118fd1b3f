//! Error types for the delay engine and its memory backends.

use thiserror::Error;

use crate::dsp::allocator::PoolType;

/// A transport-level failure reported by an SPI bus.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("SPI transfer failed")]
pub struct BusFault;

/// Failures of a single memory transaction.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("{0} access is not implemented")]
    Unsupported(PoolType),

    #[error("access of {count} samples at {addr} exceeds device size {size}")]
    OutOfRange { addr: usize, count: usize, size: usize },

    #[error("bus fault: {0}")]
    Bus(#[from] BusFault),
}

/// Misuse of the delay configuration surface.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayError {
    #[error("tap index {0} out of range (0..8)")]
    TapOutOfRange(usize),

    #[error("delay has no memory region")]
    Unconfigured,
}
