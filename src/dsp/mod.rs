//! # DSP and Memory Building Blocks
//!
//! Leaves first:
//!
//! - **`block`**: fixed 128-sample audio blocks and the pool output
//!   blocks are borrowed from.
//! - **`memory`**: the `MemoryBackend` capability (read, write, zero)
//!   and its implementations, including the SPI SRAM framing.
//! - **`allocator`**: hands each delay a non-overlapping region of a
//!   memory pool.
//! - **`taps`**: the eight read taps of one delay.
//! - **`external_delay`**: the circular delay buffer that ties the above
//!   together, one block per cycle.
//! - **`channel`**: stages host samples into blocks and mixes tap
//!   output back into a wet signal.

pub mod allocator;
pub mod block;
pub mod channel;
pub mod external_delay;
pub mod memory;
pub mod taps;
