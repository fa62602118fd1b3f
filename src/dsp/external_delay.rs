//! # External-Memory Multi-Tap Delay
//!
//! This is the delay line itself. Instead of a `Vec<f32>` in RAM, its
//! "tape" is a region of external serial memory reached through a
//! [`MemoryBackend`]. Everything happens in whole blocks, once per
//! processing cycle:
//!
//! 1. **Ingest** one block at the write cursor (`head_offset`). If no
//!    input arrived this cycle, write silence instead, so memory that
//!    later plays back through a tap is never stale.
//! 2. **Emit** one block per active tap, read from `delay_length` samples
//!    behind the cursor.
//!
//! ## Wrapping Without Modulo Per Sample
//!
//! The region is a ring of `memory_length` samples. A block that starts
//! near the end of the ring runs off it, so the transfer is split into
//! two contiguous pieces:
//!
//! ```text
//!            head_offset          memory_length
//!                 │                     │
//! [ piece 2 ......│.....................│ piece 1 ]
//!  0 ── block_size - n                   head .. head + n
//! ```
//!
//! The allocator never grants a region shorter than two blocks plus one
//! sample, so one split is always enough.
//!
//! ## Where Taps Read
//!
//! After ingestion the cursor sits just past the newest sample. A tap
//! reads a block starting `delay_length` samples behind the cursor:
//!
//! ```text
//! read_offset = head_offset - delay_length                  (if it fits)
//!             = memory_length + head_offset - delay_length  (otherwise)
//! ```
//!
//! So `delay_length == BLOCK_SAMPLES` returns the block ingested in the
//! same cycle, and each extra sample of delay moves the tap one sample
//! further into the past. `delay_length == 0` and
//! `delay_length == memory_length` land on the same offset: the oldest
//! block still stored.

use nih_plug::{nih_log, nih_warn};

use super::allocator::{PoolAllocator, Region};
use super::block::{AudioBlock, BlockPool, BLOCK_SAMPLES};
use super::memory::MemoryBackend;
use super::taps::{Tap, TapTable};
use crate::error::{DelayError, MemoryError};

/// Receives the blocks a delay emits, one per active tap per cycle.
pub trait TapOutput {
    fn transmit(&mut self, tap: usize, block: &AudioBlock);
}

impl<F: FnMut(usize, &AudioBlock)> TapOutput for F {
    fn transmit(&mut self, tap: usize, block: &AudioBlock) {
        self(tap, block)
    }
}

/// Counters for the things a cycle silently survives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelayStats {
    /// Cycles that reached memory (unconfigured delays count none).
    pub cycles: u64,
    /// Tap outputs skipped because no output block was free.
    pub dropped_blocks: u64,
    /// Memory transactions that failed. Each loses one transfer.
    pub memory_faults: u64,
}

/// A multi-tap delay whose samples live in external memory.
pub struct ExternalDelay<M> {
    memory: M,
    /// `None` when the pool had no room: every cycle is then a no-op.
    region: Option<Region>,
    /// Write cursor, relative to the region start.
    head_offset: usize,
    taps: TapTable,
    stats: DelayStats,
}

impl<M: MemoryBackend> ExternalDelay<M> {
    /// Claim up to `requested` samples of `memory`'s pool and zero them.
    ///
    /// If the pool is exhausted the delay comes back unconfigured: it
    /// accepts every call but never touches memory or emits anything.
    pub fn initialize(memory: M, allocator: &mut PoolAllocator, requested: usize) -> Self {
        let pool = memory.pool();
        let mut delay = Self {
            memory,
            region: None,
            head_offset: 0,
            taps: TapTable::new(),
            stats: DelayStats::default(),
        };

        let Some(region) = allocator.allocate(pool, requested) else {
            nih_warn!(
                "{}: {} samples left, not enough for a delay; running without one",
                pool,
                allocator.available(pool)
            );
            return delay;
        };

        nih_log!(
            "{}: granted {} samples at offset {} (asked for {})",
            pool,
            region.length,
            region.begin,
            requested
        );
        delay.region = Some(region);
        if let Err(err) = delay.zero(0, region.length) {
            nih_warn!("{}: could not clear delay memory: {}", pool, err);
            delay.stats.memory_faults += 1;
        }

        delay
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.region.is_some()
    }

    /// Length of the ring in samples, zero when unconfigured.
    pub fn memory_length(&self) -> usize {
        self.region.map_or(0, |r| r.length)
    }

    pub fn head_offset(&self) -> usize {
        self.head_offset
    }

    pub fn stats(&self) -> DelayStats {
        self.stats
    }

    pub fn taps(&self) -> &TapTable {
        &self.taps
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Set a tap's distance behind the write cursor, in samples.
    ///
    /// Values past `memory_length` are clamped to it. Returns the delay
    /// actually stored.
    pub fn set_tap(&mut self, index: usize, delay_samples: usize) -> Result<usize, DelayError> {
        let length = self.memory_length();
        if length == 0 {
            return Err(DelayError::Unconfigured);
        }
        self.taps.set_delay(index, delay_samples, length)
    }

    /// Set a tap so its output lags the input by `ms` milliseconds.
    ///
    /// Output produced by a cycle is heard one block later, so a tap
    /// stored at `n` samples is heard `n` samples after its input. Block
    /// processing cannot go below one block, so the delay is kept within
    /// `[BLOCK_SAMPLES, memory_length]`.
    pub fn set_tap_ms(
        &mut self,
        index: usize,
        ms: f32,
        sample_rate: f32,
    ) -> Result<usize, DelayError> {
        let samples = (ms.max(0.0) * sample_rate / 1000.0).round() as usize;
        self.set_tap(index, samples.max(BLOCK_SAMPLES))
    }

    pub fn activate(&mut self, index: usize) -> Result<(), DelayError> {
        self.taps.set_active(index, true)
    }

    pub fn deactivate(&mut self, index: usize) -> Result<(), DelayError> {
        self.taps.set_active(index, false)
    }

    /// Silence the whole region and rewind the cursor. Taps keep their
    /// settings.
    pub fn clear(&mut self) -> Result<(), MemoryError> {
        self.head_offset = 0;
        match self.region {
            Some(region) => self.zero(0, region.length),
            None => Ok(()),
        }
    }

    /// Run one processing cycle.
    ///
    /// `input` is this cycle's block, or `None` for silence. Each active
    /// tap's block is handed to `output` in slot order. Output blocks are
    /// borrowed from `pool`; a tap whose block cannot be allocated is
    /// skipped for this cycle.
    pub fn update(
        &mut self,
        input: Option<&AudioBlock>,
        pool: &mut BlockPool,
        output: &mut impl TapOutput,
    ) {
        let Some(region) = self.region else {
            return;
        };
        let length = region.length;
        self.stats.cycles += 1;

        if self.ingest(input, length).is_err() {
            self.stats.memory_faults += 1;
        }

        let taps = self.taps.clone();
        for (index, tap) in taps.active() {
            let Some(mut block) = pool.allocate() else {
                self.stats.dropped_blocks += 1;
                continue;
            };

            match self.read_tap(&tap, length, &mut block) {
                Ok(()) => output.transmit(index, &block),
                Err(_) => self.stats.memory_faults += 1,
            }
            pool.release(block);
        }
    }

    /// Store one block (or one block of silence) at the cursor and
    /// advance it. The cursor moves even if the transfer fails.
    fn ingest(&mut self, input: Option<&AudioBlock>, length: usize) -> Result<(), MemoryError> {
        let head = self.head_offset;

        let result = if head + BLOCK_SAMPLES <= length {
            self.head_offset = head + BLOCK_SAMPLES;
            match input {
                Some(data) => self.write(head, data),
                None => self.zero(head, BLOCK_SAMPLES),
            }
        } else {
            // Runs off the end: first `n` samples finish the ring, the
            // rest start over at its head.
            let n = length - head;
            self.head_offset = BLOCK_SAMPLES - n;
            match input {
                Some(data) => self
                    .write(head, &data[..n])
                    .and(self.write(0, &data[n..])),
                None => self.zero(head, n).and(self.zero(0, BLOCK_SAMPLES - n)),
            }
        };

        if self.head_offset == length {
            self.head_offset = 0;
        }
        result
    }

    /// Fill `out` with the block `tap` sees this cycle.
    fn read_tap(&mut self, tap: &Tap, length: usize, out: &mut AudioBlock) -> Result<(), MemoryError> {
        let head = self.head_offset;
        let mut read_offset = if tap.delay_length <= head {
            head - tap.delay_length
        } else {
            length + head - tap.delay_length
        };
        if read_offset == length {
            read_offset = 0;
        }

        if read_offset + BLOCK_SAMPLES <= length {
            self.read(read_offset, out)
        } else {
            let n = length - read_offset;
            let (first, rest) = out.split_at_mut(n);
            self.read(read_offset, first)?;
            self.read(0, rest)
        }
    }

    // Region-relative memory access. Callers keep `offset + len` within
    // the region; these only add the region base.

    fn base(&self) -> usize {
        self.region.map_or(0, |r| r.begin)
    }

    fn read(&mut self, offset: usize, out: &mut [i16]) -> Result<(), MemoryError> {
        let addr = self.base() + offset;
        self.memory.read(addr, out)
    }

    fn write(&mut self, offset: usize, data: &[i16]) -> Result<(), MemoryError> {
        let addr = self.base() + offset;
        self.memory.write(addr, data)
    }

    fn zero(&mut self, offset: usize, count: usize) -> Result<(), MemoryError> {
        let addr = self.base() + offset;
        self.memory.zero(addr, count)
    }
}
