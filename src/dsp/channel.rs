//! # Block Staging for One Audio Channel
//!
//! The host hands us buffers of any length, but the external delay only
//! runs whole [`BLOCK_SAMPLES`]-sample cycles. A `DelayChannel` sits in
//! between:
//!
//! - Incoming host samples are converted to 16-bit and staged until a
//!   block is full, then one delay cycle runs.
//! - The taps' output from that cycle is mixed (each at its own level)
//!   into a wet block, which is played out sample by sample while the
//!   next input block is staged.
//!
//! That hand-off costs exactly one block of latency, which cancels the
//! one block the delay itself reads ahead: a tap at `n` samples is heard
//! exactly `n` samples after its input.
//!
//! A staged block of pure digital silence is passed to the delay as "no
//! input", so it is stored with the cheaper zero transfer.

use super::block::{to_f32, to_i16, AudioBlock, BlockPool, BLOCK_SAMPLES};
use super::external_delay::{ExternalDelay, TapOutput};
use super::memory::MemoryBackend;
use super::taps::MAX_TAPS;
use crate::error::{DelayError, MemoryError};

/// One channel's delay plus its staging buffers.
pub struct DelayChannel<M> {
    delay: ExternalDelay<M>,
    input: AudioBlock,
    wet: [f32; BLOCK_SAMPLES],
    /// Position within the current block.
    pos: usize,
}

/// Sums tap blocks into a wet buffer.
struct TapMixer<'a> {
    levels: &'a [f32; MAX_TAPS],
    wet: &'a mut [f32; BLOCK_SAMPLES],
}

impl TapOutput for TapMixer<'_> {
    fn transmit(&mut self, tap: usize, block: &AudioBlock) {
        let level = self.levels[tap];
        for (wet, &sample) in self.wet.iter_mut().zip(block.iter()) {
            *wet += to_f32(sample) * level;
        }
    }
}

impl<M: MemoryBackend> DelayChannel<M> {
    pub fn new(delay: ExternalDelay<M>) -> Self {
        Self {
            delay,
            input: [0; BLOCK_SAMPLES],
            wet: [0.0; BLOCK_SAMPLES],
            pos: 0,
        }
    }

    pub fn delay(&self) -> &ExternalDelay<M> {
        &self.delay
    }

    pub fn delay_mut(&mut self) -> &mut ExternalDelay<M> {
        &mut self.delay
    }

    /// Point tap `index` at `time_ms`, or switch it off with `None`.
    pub fn apply_tap(
        &mut self,
        index: usize,
        time_ms: Option<f32>,
        sample_rate: f32,
    ) -> Result<(), DelayError> {
        match time_ms {
            Some(ms) => {
                self.delay.set_tap_ms(index, ms, sample_rate)?;
                self.delay.activate(index)
            }
            None => self.delay.deactivate(index),
        }
    }

    /// Feed one host sample and get back one wet sample.
    ///
    /// `levels` scales each tap's contribution and is read only when a
    /// block completes.
    pub fn process(&mut self, sample: f32, pool: &mut BlockPool, levels: &[f32; MAX_TAPS]) -> f32 {
        let wet = self.wet[self.pos];
        self.input[self.pos] = to_i16(sample);
        self.pos += 1;

        if self.pos == BLOCK_SAMPLES {
            self.pos = 0;
            self.run_cycle(pool, levels);
        }
        wet
    }

    fn run_cycle(&mut self, pool: &mut BlockPool, levels: &[f32; MAX_TAPS]) {
        self.wet.fill(0.0);
        let silent = self.input.iter().all(|&s| s == 0);
        let input = if silent { None } else { Some(&self.input) };

        let mut mixer = TapMixer {
            levels,
            wet: &mut self.wet,
        };
        self.delay.update(input, pool, &mut mixer);
    }

    /// Drop staged audio and silence the delay memory.
    pub fn reset(&mut self) -> Result<(), MemoryError> {
        self.input.fill(0);
        self.wet.fill(0.0);
        self.pos = 0;
        self.delay.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::allocator::{PoolAllocator, PoolType};
    use crate::dsp::memory::ArrayMemory;
    use approx::assert_abs_diff_eq;

    const SAMPLE_RATE: f32 = 48_000.0;

    /// Wraps [`ArrayMemory`] and counts data writes and zero writes.
    struct CountingMemory {
        inner: ArrayMemory,
        writes: usize,
        zeros: usize,
    }

    impl MemoryBackend for CountingMemory {
        fn pool(&self) -> PoolType {
            self.inner.pool()
        }

        fn read(&mut self, addr: usize, out: &mut [i16]) -> Result<(), MemoryError> {
            self.inner.read(addr, out)
        }

        fn write(&mut self, addr: usize, data: &[i16]) -> Result<(), MemoryError> {
            self.writes += 1;
            self.inner.write(addr, data)
        }

        fn zero(&mut self, addr: usize, count: usize) -> Result<(), MemoryError> {
            self.zeros += 1;
            self.inner.zero(addr, count)
        }
    }

    fn channel(length: usize) -> DelayChannel<CountingMemory> {
        let memory = CountingMemory {
            inner: ArrayMemory::new(PoolType::Sram23lc1024, 65_536),
            writes: 0,
            zeros: 0,
        };
        let mut alloc = PoolAllocator::new();
        DelayChannel::new(ExternalDelay::initialize(memory, &mut alloc, length))
    }

    fn run(
        channel: &mut DelayChannel<CountingMemory>,
        input: &[f32],
        levels: &[f32; MAX_TAPS],
    ) -> Vec<f32> {
        let mut pool = BlockPool::default();
        input
            .iter()
            .map(|&x| channel.process(x, &mut pool, levels))
            .collect()
    }

    fn impulse(len: usize) -> Vec<f32> {
        let mut signal = vec![0.0; len];
        signal[0] = 1.0;
        signal
    }

    /// An impulse comes back exactly `delay` samples later, once.
    #[test]
    fn test_impulse_heard_after_tap_delay() {
        let mut ch = channel(1000);
        ch.delay_mut().set_tap(0, 300).unwrap();
        ch.delay_mut().activate(0).unwrap();
        let mut levels = [0.0; MAX_TAPS];
        levels[0] = 1.0;

        let out = run(&mut ch, &impulse(1500), &levels);
        for (i, &y) in out.iter().enumerate() {
            let expected = if i == 300 { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(y, expected, epsilon = 1e-4);
        }
    }

    /// Several taps each contribute at their own delay and level.
    #[test]
    fn test_taps_mix_at_their_levels() {
        let mut ch = channel(2000);
        let mut levels = [0.0; MAX_TAPS];
        for (tap, delay, level) in [(0, 200, 0.5), (5, 1300, 0.25)] {
            ch.delay_mut().set_tap(tap, delay).unwrap();
            ch.delay_mut().activate(tap).unwrap();
            levels[tap] = level;
        }

        let out = run(&mut ch, &impulse(1800), &levels);
        assert_abs_diff_eq!(out[200], 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(out[1300], 0.25, epsilon = 1e-4);
        let rest: f32 = out
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 200 && *i != 1300)
            .map(|(_, y)| y.abs())
            .sum();
        assert_abs_diff_eq!(rest, 0.0, epsilon = 1e-4);
    }

    /// Millisecond taps land on the matching sample count.
    #[test]
    fn test_tap_in_milliseconds() {
        let mut ch = channel(4800);
        ch.apply_tap(2, Some(10.0), SAMPLE_RATE).unwrap();
        let mut levels = [0.0; MAX_TAPS];
        levels[2] = 1.0;

        let out = run(&mut ch, &impulse(1024), &levels);
        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(480));
    }

    /// Switching a tap off stops its output.
    #[test]
    fn test_disabled_tap_is_silent() {
        let mut ch = channel(1000);
        ch.apply_tap(0, Some(5.0), SAMPLE_RATE).unwrap();
        ch.apply_tap(0, None, SAMPLE_RATE).unwrap();
        let levels = [1.0; MAX_TAPS];

        let out = run(&mut ch, &impulse(1000), &levels);
        assert!(out.iter().all(|&y| y == 0.0));
    }

    /// Silent blocks are stored with zero transfers, audio with writes.
    #[test]
    fn test_silent_blocks_use_zero_path() {
        let mut ch = channel(1000);
        let levels = [0.0; MAX_TAPS];
        // Initialization zeroes the region once.
        assert_eq!(ch.delay().memory().zeros, 1);

        let mut signal = vec![0.0; 4 * BLOCK_SAMPLES];
        signal[BLOCK_SAMPLES + 7] = 0.25;
        run(&mut ch, &signal, &levels);

        assert_eq!(ch.delay().memory().writes, 1);
        assert_eq!(ch.delay().memory().zeros, 1 + 3);
    }

    /// Reset discards staged input and stored echoes.
    #[test]
    fn test_reset_clears_echoes() {
        let mut ch = channel(1000);
        ch.delay_mut().set_tap(0, 600).unwrap();
        ch.delay_mut().activate(0).unwrap();
        let mut levels = [0.0; MAX_TAPS];
        levels[0] = 1.0;

        run(&mut ch, &[0.5; 300], &levels);
        ch.reset().unwrap();
        let out = run(&mut ch, &[0.0; 1200], &levels);
        assert!(out.iter().all(|&y| y == 0.0));
    }
}
