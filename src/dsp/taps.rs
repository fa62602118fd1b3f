//! # Tap Table
//!
//! Each delay instance has eight read taps. A tap is just a distance
//! behind the write cursor plus an on/off switch; all taps read the same
//! stored stream, so adding a tap costs bus bandwidth but no memory.

use crate::error::DelayError;

/// Number of read taps per delay instance.
pub const MAX_TAPS: usize = 8;

/// One read tap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tap {
    /// Distance behind the write cursor, in samples.
    pub delay_length: usize,
    pub active: bool,
}

/// The eight taps of one delay instance. All start inactive at zero delay.
#[derive(Debug, Clone, Default)]
pub struct TapTable {
    taps: [Tap; MAX_TAPS],
}

impl TapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Result<&Tap, DelayError> {
        self.taps.get(index).ok_or(DelayError::TapOutOfRange(index))
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut Tap, DelayError> {
        self.taps
            .get_mut(index)
            .ok_or(DelayError::TapOutOfRange(index))
    }

    /// Set a tap's delay, clamped to `max_delay`. Returns the stored value.
    pub fn set_delay(
        &mut self,
        index: usize,
        delay_length: usize,
        max_delay: usize,
    ) -> Result<usize, DelayError> {
        let tap = self.get_mut(index)?;
        tap.delay_length = delay_length.min(max_delay);
        Ok(tap.delay_length)
    }

    pub fn set_active(&mut self, index: usize, active: bool) -> Result<(), DelayError> {
        self.get_mut(index)?.active = active;
        Ok(())
    }

    /// Deactivate every tap and return them to zero delay.
    pub fn clear(&mut self) {
        self.taps = [Tap::default(); MAX_TAPS];
    }

    /// Active taps with their slot index, in slot order.
    pub fn active(&self) -> impl Iterator<Item = (usize, Tap)> + '_ {
        self.taps
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, tap)| tap.active)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}
