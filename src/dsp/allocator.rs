//! # Pool Allocator
//!
//! External memory is carved up between delay instances with a
//! monotonic arena: each pool type keeps one "already handed out"
//! counter, and every grant is the next contiguous run of sample slots
//! after it. Nothing is ever freed. A plugin instance builds a fresh
//! allocator each time the host (re)initializes it, which plays the role
//! of a power cycle for the memory devices.
//!
//! ## The Minimum Region
//!
//! A region shorter than `2 * BLOCK_SAMPLES + 1` samples is never
//! granted. With at least that much room, a block-sized read or write
//! can cross the end of the ring at most once, so every transfer splits
//! into at most two contiguous pieces.

use std::fmt;

use super::block::BLOCK_SAMPLES;

/// Smallest region the allocator hands out.
pub const MIN_REGION_SAMPLES: usize = 2 * BLOCK_SAMPLES + 1;

/// The physical memory device classes a delay can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolType {
    /// A single Microchip 23LC1024 serial SRAM: 128 KiB, 65 536 samples.
    Sram23lc1024,
    /// The multi-chip memory board: six 23LC1024s, 393 216 samples.
    MemoryBoard,
}

impl PoolType {
    pub const ALL: [PoolType; 2] = [PoolType::Sram23lc1024, PoolType::MemoryBoard];

    /// Hardware capacity of the pool, in 16-bit samples.
    pub const fn capacity(self) -> usize {
        match self {
            PoolType::Sram23lc1024 => 65_536,
            PoolType::MemoryBoard => 393_216,
        }
    }

    const fn index(self) -> usize {
        match self {
            PoolType::Sram23lc1024 => 0,
            PoolType::MemoryBoard => 1,
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolType::Sram23lc1024 => f.write_str("23LC1024 SRAM"),
            PoolType::MemoryBoard => f.write_str("memory board"),
        }
    }
}

/// A contiguous run of sample slots owned by one delay instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub pool: PoolType,
    /// Absolute sample offset of the first slot within the pool.
    pub begin: usize,
    /// Number of sample slots.
    pub length: usize,
}

impl Region {
    /// One past the last slot, as an absolute pool offset.
    pub fn end(&self) -> usize {
        self.begin + self.length
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.pool == other.pool && self.begin < other.end() && other.begin < self.end()
    }
}

/// Hands out non-overlapping regions from each pool.
#[derive(Debug, Clone)]
pub struct PoolAllocator {
    capacity: [usize; 2],
    allocated: [usize; 2],
}

impl PoolAllocator {
    /// An allocator for the hardware pool capacities.
    pub fn new() -> Self {
        Self {
            capacity: PoolType::ALL.map(PoolType::capacity),
            allocated: [0; 2],
        }
    }

    /// Override the capacity of one pool, e.g. for a partially populated
    /// board or a small test device.
    pub fn with_capacity(mut self, pool: PoolType, samples: usize) -> Self {
        self.capacity[pool.index()] = samples;
        self
    }

    pub fn capacity(&self, pool: PoolType) -> usize {
        self.capacity[pool.index()]
    }

    /// Samples not yet handed out from `pool`.
    pub fn available(&self, pool: PoolType) -> usize {
        self.capacity[pool.index()].saturating_sub(self.allocated[pool.index()])
    }

    /// Grant a region of up to `requested` samples from `pool`.
    ///
    /// Returns `None` when fewer than [`MIN_REGION_SAMPLES`] remain. A
    /// request larger than what is left is cut down to exactly what is
    /// left; a request below the minimum is raised to the minimum.
    pub fn allocate(&mut self, pool: PoolType, requested: usize) -> Option<Region> {
        let available = self.available(pool);
        if available < MIN_REGION_SAMPLES {
            return None;
        }

        let length = requested.max(MIN_REGION_SAMPLES).min(available);
        let begin = self.allocated[pool.index()];
        self.allocated[pool.index()] += length;

        Some(Region {
            pool,
            begin,
            length,
        })
    }
}

impl Default for PoolAllocator {
    fn default() -> Self {
        Self::new()
    }
}
