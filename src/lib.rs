//! # Loveless Multitap — An Eight-Tap Delay on External SRAM
//!
//! A multi-tap delay plugin built with [nih-plug](https://github.com/robbert-vdh/nih-plug)
//! whose delay memory is not a `Vec` in RAM but a 23LC1024 serial SRAM
//! reached over SPI, the way a small embedded audio board would do it.
//! In the plugin the chip is emulated in software, but every sample still
//! goes through the chip's wire protocol, a shared bus and a fixed memory
//! region per channel. Outputs AUv2, VST3 and CLAP from one codebase.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬────────────────────────────────────────── × (1 - mix) ───┐
//!         │                                                          │
//!         │   ┌─ stage 128 samples ─┐                                │
//!         └──►│  f32 → i16 block    │                                │
//!             └──────────┬──────────┘                                │
//!                        ▼                                           │
//!        ┌──────────── update() ──────────────┐                      │
//!        │ write block at cursor ──► SPI SRAM │                      │
//!        │ tap 1..8: read behind cursor ◄──── │                      │
//!        └──────┬───────────┬────────────┬────┘                      │
//!               × level 1   × level 2 …  × level 8                   │
//!               └───────────┴─────(+)────┘                           │
//!                                  │                                 │
//!                                  └────────────── × mix ──────────►(+)──► Output
//! ```

pub mod dsp;
pub mod error;
mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use dsp::allocator::{PoolAllocator, PoolType};
use dsp::block::{BlockPool, BLOCK_SAMPLES, POOL_SIZE};
use dsp::channel::DelayChannel;
use dsp::external_delay::ExternalDelay;
use dsp::memory::emulated::EmulatedSram;
use dsp::memory::spi::{SharedBus, SpiSram};
use dsp::taps::MAX_TAPS;
use nih_plug::prelude::*;
use params::PluginParams;

/// The delay memory every channel uses: an SRAM on a shared SPI bus.
type ChannelMemory = SpiSram<EmulatedSram>;

/// The main plugin struct.
///
/// Everything here is owned by the audio thread. The memory chip, the
/// bus and the block pool are all created in `initialize()`, so
/// `process()` never allocates.
struct LovelessMultitap {
    params: Arc<PluginParams>,

    /// The current sample rate in Hz. Set during `initialize()`, used to
    /// turn tap times in ms into sample counts.
    sample_rate: f32,

    /// One external delay per audio channel. All of them share one SPI
    /// bus and one SRAM, each in its own region of the chip.
    channels: Vec<DelayChannel<ChannelMemory>>,

    /// Output blocks the delays borrow while reading their taps.
    blocks: BlockPool,

    /// Per-tap gain for this buffer; zero for taps that are off.
    levels: [f32; MAX_TAPS],
}

impl Default for LovelessMultitap {
    fn default() -> Self {
        Self {
            params: Arc::new(PluginParams::default()),
            // Placeholder until initialize() tells us the real rate.
            sample_rate: 44100.0,
            // Empty until initialize() knows the channel count.
            channels: Vec::new(),
            blocks: BlockPool::new(0),
            levels: [0.0; MAX_TAPS],
        }
    }
}

impl LovelessMultitap {
    /// Push the tap parameters into every channel's tap table.
    ///
    /// Called at the top of `process()`. The delay only reads its tap
    /// table inside a block cycle, so a change made here always lands
    /// between two cycles.
    fn sync_taps(&mut self) {
        for (index, tap) in self.params.taps.iter().enumerate() {
            let enabled = tap.enabled.value();
            self.levels[index] = if enabled { tap.level.value() } else { 0.0 };
            let time_ms = enabled.then(|| tap.time.value());

            for channel in &mut self.channels {
                if !channel.delay().is_configured() {
                    continue;
                }
                if let Err(err) = channel.apply_tap(index, time_ms, self.sample_rate) {
                    nih_debug_assert_failure!("tap {}: {}", index, err);
                }
            }
        }
    }

    /// Longest active tap across all channels, in samples.
    fn longest_tap(&self) -> usize {
        self.channels
            .iter()
            .flat_map(|channel| channel.delay().taps().active())
            .map(|(_, tap)| tap.delay_length)
            .max()
            .unwrap_or(0)
    }
}

impl Plugin for LovelessMultitap {
    const NAME: &'static str = "Loveless Multitap";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo first, mono fallback. Each channel gets its own delay and
    // its own slice of the SRAM.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Tap settings only change between 128-sample blocks anyway; only
    // the mix follows automation sample by sample.
    const SAMPLE_ACCURATE_AUTOMATION: bool = true;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Build the memory chip, the bus and one delay per channel.
    ///
    /// The pool allocator only ever grows, so every initialization starts
    /// from a fresh allocator and a freshly powered-up chip. Each channel
    /// asks for the `Memory` setting, capped at an equal share of the
    /// chip so the last channel is never starved.
    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        self.sample_rate = buffer_config.sample_rate;

        let num_channels = audio_io_layout
            .main_input_channels
            .map(|c| c.get() as usize)
            .unwrap_or(2);

        let bus = SharedBus::new(EmulatedSram::new());
        let mut allocator = PoolAllocator::new();
        let fair_share = allocator.available(PoolType::Sram23lc1024) / num_channels;
        let wanted = (self.params.memory.value() * self.sample_rate / 1000.0) as usize;
        let requested = wanted.min(fair_share);
        nih_log!(
            "{} channel(s) at {} Hz, asking for {} samples each",
            num_channels,
            self.sample_rate,
            requested
        );

        self.channels = (0..num_channels)
            .map(|_| {
                let memory = SpiSram::new(bus.clone());
                DelayChannel::new(ExternalDelay::initialize(memory, &mut allocator, requested))
            })
            .collect();
        self.blocks = BlockPool::new(POOL_SIZE);

        // Without memory for every channel there is nothing sensible to
        // play; tell the host this configuration does not work.
        self.channels
            .iter()
            .all(|channel| channel.delay().is_configured())
    }

    /// Silence stored echoes when playback stops, so the next play does
    /// not start with a burst of old audio.
    fn reset(&mut self) {
        for channel in &mut self.channels {
            if let Err(err) = channel.reset() {
                nih_debug_assert_failure!("could not clear delay memory: {}", err);
            }
        }
    }

    /// Stage host samples into blocks, run a delay cycle per full block,
    /// and mix the taps back in.
    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        self.sync_taps();

        for mut channel_samples in buffer.iter_samples() {
            let mix = self.params.mix.smoothed.next();

            for (channel_idx, sample) in channel_samples.iter_mut().enumerate() {
                let Some(channel) = self.channels.get_mut(channel_idx) else {
                    continue;
                };

                let dry = *sample;
                let wet = channel.process(dry, &mut self.blocks, &self.levels);
                *sample = dry * (1.0 - mix) + wet * mix;
            }
        }

        // Keep being called after the input stops until the longest tap
        // (plus the block still staged) has played out.
        ProcessStatus::Tail((self.longest_tap() + BLOCK_SAMPLES) as u32)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Plugin format trait implementations
// ─────────────────────────────────────────────────────────────────────

impl ClapPlugin for LovelessMultitap {
    const CLAP_ID: &'static str = "com.loveless-audio.loveless-multitap-v1";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("An eight-tap delay whose memory lives in emulated serial SRAM");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for LovelessMultitap {
    // 16 ASCII bytes; must never change once published.
    const VST3_CLASS_ID: [u8; 16] = *b"LvlssMultitapv01";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Delay];
}

// ─────────────────────────────────────────────────────────────────────
// Export macros
// ─────────────────────────────────────────────────────────────────────

nih_export_clap!(LovelessMultitap);
nih_export_vst3!(LovelessMultitap);

// Re-export the CLAP entry point as an Audio Unit for Logic Pro.
clap_wrapper::export_auv2!();
