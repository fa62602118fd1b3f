//! # Plugin Parameters
//!
//! Parameters are the knobs and switches the user sees in the DAW. Each
//! has a stable string ID (`#[id = "..."]`) that presets are saved
//! under, so once published these IDs must never change.
//!
//! The eight taps share one parameter struct, nested as an array. nih-plug
//! suffixes the IDs with the tap number (`time_1` … `time_8`) and puts
//! each tap in its own group ("Tap 1" … "Tap 8") in the host's parameter
//! list.
//!
//! ## What Is Smoothed and What Is Not
//!
//! `Mix` is smoothed per sample like any gain. Tap times and levels are
//! *not*: the delay engine only retunes taps between 128-sample blocks
//! and reads whole samples, so a tap time change is a clean jump to a new
//! read position at a block boundary. `Memory` decides how much SRAM each
//! channel claims and only takes effect when the plugin is
//! (re)initialized, so the host is told not to automate it.

use nih_plug::prelude::*;

use crate::dsp::taps::MAX_TAPS;

/// All user-facing parameters for the Loveless Multitap plugin.
#[derive(Params)]
pub struct PluginParams {
    /// **Mix**: balance between the dry input and the sum of the taps.
    ///
    /// - 0% = dry only
    /// - 100% = taps only
    #[id = "mix"]
    pub mix: FloatParam,

    /// **Memory**: how much delay memory each channel asks for, in ms.
    ///
    /// One 23LC1024 holds 65 536 samples, about 1.4 s at 44.1 kHz. Every
    /// channel gets at most an equal share of the chip, so in stereo each
    /// side tops out around 0.7 s whatever this is set to.
    #[id = "mem"]
    pub memory: FloatParam,

    #[nested(array, group = "Tap")]
    pub taps: [TapParams; MAX_TAPS],
}

/// One tap's controls.
#[derive(Params)]
pub struct TapParams {
    /// **On**: whether this tap reads memory at all. Off taps cost no bus
    /// time.
    #[id = "on"]
    pub enabled: BoolParam,

    /// **Time**: how far behind the input this tap plays.
    ///
    /// Anything shorter than one block (2.7 ms at 48 kHz) is played at
    /// one block; anything longer than the channel's memory is played at
    /// the longest delay the memory allows.
    #[id = "time"]
    pub time: FloatParam,

    /// **Level**: gain of this tap in the wet sum.
    #[id = "level"]
    pub level: FloatParam,
}

impl TapParams {
    /// Defaults for tap `index`: evenly spaced eighth notes at 120 BPM,
    /// each quieter than the last, with only the first switched on.
    fn new(index: usize) -> Self {
        let step = (index + 1) as f32;
        Self {
            enabled: BoolParam::new("On", index == 0),

            time: FloatParam::new(
                "Time",
                250.0 * step,
                FloatRange::Skewed {
                    min: 5.0,
                    max: 2000.0,
                    // Short taps need finer control than long ones.
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" ms")
            .with_step_size(0.1),

            level: FloatParam::new(
                "Level",
                0.6 / step,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),
        }
    }
}

impl Default for PluginParams {
    fn default() -> Self {
        Self {
            mix: FloatParam::new(
                "Mix",
                0.40, // Default: 40%, echoes sit behind the dry signal
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_smoother(SmoothingStyle::Linear(20.0))
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            memory: FloatParam::new(
                "Memory",
                740.0,
                FloatRange::Linear {
                    min: 10.0,
                    max: 1500.0,
                },
            )
            .with_unit(" ms")
            .with_step_size(1.0)
            .non_automatable(),

            taps: std::array::from_fn(TapParams::new),
        }
    }
}
