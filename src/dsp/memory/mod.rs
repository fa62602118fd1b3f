//! # Memory Backends
//!
//! The delay engine stores its samples in external memory, but it only
//! ever asks for three things: read a run of cells, write a run of cells,
//! and zero a run of cells. [`MemoryBackend`] is that capability.
//!
//! Addresses are absolute sample offsets within the backend's pool. The
//! caller (the delay buffer) adds its region base and guarantees that a
//! single call never crosses the end of its region, so backends never
//! deal with wrap-around.
//!
//! - **`spi`**: the 23LC1024 serial SRAM, framed onto a shared SPI bus.
//! - **`emulated`**: an in-process 23LC1024 that speaks the SPI protocol.
//! - [`ArrayMemory`]: plain cells in RAM, for tests and simulation.
//! - [`MemoryBoard`]: the six-chip board. Not implemented yet; every
//!   access reports [`MemoryError::Unsupported`].

pub mod emulated;
pub mod spi;

use super::allocator::PoolType;
use crate::error::MemoryError;

/// Addressed access to 16-bit sample cells in one memory pool.
pub trait MemoryBackend {
    /// The pool this backend's addresses refer to.
    fn pool(&self) -> PoolType;

    /// Fill `out` with the cells starting at `addr`.
    fn read(&mut self, addr: usize, out: &mut [i16]) -> Result<(), MemoryError>;

    /// Store `data` into the cells starting at `addr`.
    fn write(&mut self, addr: usize, data: &[i16]) -> Result<(), MemoryError>;

    /// Set `count` cells starting at `addr` to silence.
    fn zero(&mut self, addr: usize, count: usize) -> Result<(), MemoryError>;
}

/// Sample cells held directly in RAM.
#[derive(Debug, Clone)]
pub struct ArrayMemory {
    pool: PoolType,
    cells: Vec<i16>,
}

impl ArrayMemory {
    /// A memory of `size` cells standing in for `pool`.
    ///
    /// Cells start out as a non-zero pattern, the way real SRAM powers up
    /// with garbage, so tests notice any read of memory that was never
    /// written or zeroed.
    pub fn new(pool: PoolType, size: usize) -> Self {
        Self {
            pool,
            cells: vec![0x5A5A; size],
        }
    }

    pub fn cells(&self) -> &[i16] {
        &self.cells
    }

    fn span(&self, addr: usize, count: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        match addr.checked_add(count) {
            Some(end) if end <= self.cells.len() => Ok(addr..end),
            _ => Err(MemoryError::OutOfRange {
                addr,
                count,
                size: self.cells.len(),
            }),
        }
    }
}

impl MemoryBackend for ArrayMemory {
    fn pool(&self) -> PoolType {
        self.pool
    }

    fn read(&mut self, addr: usize, out: &mut [i16]) -> Result<(), MemoryError> {
        let span = self.span(addr, out.len())?;
        out.copy_from_slice(&self.cells[span]);
        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[i16]) -> Result<(), MemoryError> {
        let span = self.span(addr, data.len())?;
        self.cells[span].copy_from_slice(data);
        Ok(())
    }

    fn zero(&mut self, addr: usize, count: usize) -> Result<(), MemoryError> {
        let span = self.span(addr, count)?;
        self.cells[span].fill(0);
        Ok(())
    }
}

/// The multi-chip memory board.
///
/// The board splits its address space across six chips with separate
/// chip-selects. That partitioning is not written yet, so rather than
/// silently dropping audio, every access fails.
// TODO: route each transfer to the chip(s) covering its address range.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBoard;

impl MemoryBackend for MemoryBoard {
    fn pool(&self) -> PoolType {
        PoolType::MemoryBoard
    }

    fn read(&mut self, _addr: usize, _out: &mut [i16]) -> Result<(), MemoryError> {
        Err(MemoryError::Unsupported(PoolType::MemoryBoard))
    }

    fn write(&mut self, _addr: usize, _data: &[i16]) -> Result<(), MemoryError> {
        Err(MemoryError::Unsupported(PoolType::MemoryBoard))
    }

    fn zero(&mut self, _addr: usize, _count: usize) -> Result<(), MemoryError> {
        Err(MemoryError::Unsupported(PoolType::MemoryBoard))
    }
}
