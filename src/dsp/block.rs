//! # Audio Blocks and the Block Pool
//!
//! The delay engine never sees the host's variable-length buffers. It
//! works in fixed **blocks** of [`BLOCK_SAMPLES`] 16-bit samples, the
//! same unit the external SRAM stores. Every processing cycle consumes at
//! most one input block and produces one output block per active tap.
//!
//! Output blocks come from a [`BlockPool`] that is filled once, outside
//! the audio thread. Taking a block from the pool and handing it back
//! are both plain `Vec` pops and pushes within pre-reserved capacity, so
//! they never touch the allocator. When the pool runs dry, `allocate()`
//! returns `None` and the caller drops that output for one cycle.
//!
//! ## Sample Format
//!
//! The host speaks `f32` in `[-1.0, 1.0]`; the memory speaks `i16`. The
//! conversion scales by 32767 and saturates, so a full-scale host sample
//! can never wrap around to the opposite polarity.

/// Number of 16-bit samples per audio block.
pub const BLOCK_SAMPLES: usize = 128;

/// Number of output blocks a [`BlockPool`] holds.
///
/// Eight taps on each of two channels need sixteen blocks in the worst
/// case; the rest is headroom.
pub const POOL_SIZE: usize = 32;

/// One block of 16-bit samples.
pub type AudioBlock = [i16; BLOCK_SAMPLES];

/// A fixed set of pre-allocated output blocks.
pub struct BlockPool {
    free: Vec<Box<AudioBlock>>,
    capacity: usize,
}

impl BlockPool {
    /// Create a pool holding `capacity` zeroed blocks.
    ///
    /// This allocates, so call it from `initialize()`, never from
    /// `process()`.
    pub fn new(capacity: usize) -> Self {
        let mut free = Vec::with_capacity(capacity);
        free.extend((0..capacity).map(|_| Box::new([0; BLOCK_SAMPLES])));
        Self { free, capacity }
    }

    /// Take a block out of the pool, or `None` if every block is in use.
    ///
    /// The contents are whatever the previous user left behind; callers
    /// overwrite the whole block before emitting it.
    pub fn allocate(&mut self) -> Option<Box<AudioBlock>> {
        self.free.pop()
    }

    /// Return a block to the pool.
    pub fn release(&mut self, block: Box<AudioBlock>) {
        debug_assert!(
            self.free.len() < self.capacity,
            "released more blocks than the pool owns"
        );
        self.free.push(block);
    }

    /// Number of blocks currently available.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl Default for BlockPool {
    fn default() -> Self {
        Self::new(POOL_SIZE)
    }
}

/// Convert a host sample to a memory cell, saturating at full scale.
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Convert a memory cell back to a host sample.
#[inline]
pub fn to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}
