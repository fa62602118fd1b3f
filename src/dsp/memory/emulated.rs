//! # Emulated 23LC1024
//!
//! A software model of the serial SRAM that sits on the far side of an
//! [`SpiBus`]. It decodes the same frames a real chip would: a command
//! word carrying the opcode and address bits 23..16, an address word,
//! then sequential 16-bit data words. The plugin runs its delay memory on
//! this device, so the wire format is exercised on every cycle.
//!
//! Like the real part in its default sequential mode, the address
//! auto-increments across the whole array and rolls over at the end.
//! Unknown opcodes are ignored until chip-select is released.

use super::spi::{SpiBus, SpiSettings, OP_READ, OP_WRITE};
use crate::error::BusFault;

/// Size of the chip in bytes.
pub const SRAM_BYTES: usize = 128 * 1024;

/// Power-up contents. Real SRAM starts out as noise; a fixed non-zero
/// pattern makes unzeroed reads obvious.
const POWER_UP_BYTE: u8 = 0xA5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Command,
    Address { opcode: u8, high: u8 },
    Data { opcode: u8, addr: usize },
    Ignore,
}

/// An in-process 23LC1024.
pub struct EmulatedSram {
    bytes: Vec<u8>,
    selected: bool,
    phase: Phase,
    settings: Option<SpiSettings>,
    frames: usize,
}

impl EmulatedSram {
    pub fn new() -> Self {
        Self {
            bytes: vec![POWER_UP_BYTE; SRAM_BYTES],
            selected: false,
            phase: Phase::Command,
            settings: None,
            frames: 0,
        }
    }

    /// Settings of the most recent transaction.
    pub fn settings(&self) -> Option<SpiSettings> {
        self.settings
    }

    /// Number of chip-select frames seen so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Raw byte contents, for inspection.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for EmulatedSram {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiBus for EmulatedSram {
    fn begin_transaction(&mut self, settings: &SpiSettings) {
        self.settings = Some(*settings);
    }

    fn end_transaction(&mut self) {}

    fn select(&mut self) {
        self.selected = true;
        self.phase = Phase::Command;
        self.frames += 1;
    }

    fn deselect(&mut self) {
        self.selected = false;
        self.phase = Phase::Command;
    }

    fn transfer16(&mut self, word: u16) -> Result<u16, BusFault> {
        // Nothing drives MISO while the chip is deselected.
        if !self.selected {
            return Ok(0xFFFF);
        }

        let [hi, lo] = word.to_be_bytes();
        match self.phase {
            Phase::Command => {
                self.phase = match hi {
                    OP_READ | OP_WRITE => Phase::Address {
                        opcode: hi,
                        high: lo,
                    },
                    _ => Phase::Ignore,
                };
                Ok(0)
            }
            Phase::Address { opcode, high } => {
                let addr = ((high as usize) << 16 | word as usize) % SRAM_BYTES;
                self.phase = Phase::Data { opcode, addr };
                Ok(0)
            }
            Phase::Data { opcode, addr } => {
                let next = (addr + 1) % SRAM_BYTES;
                let reply = if opcode == OP_WRITE {
                    self.bytes[addr] = hi;
                    self.bytes[next] = lo;
                    0
                } else {
                    u16::from_be_bytes([self.bytes[addr], self.bytes[next]])
                };
                self.phase = Phase::Data {
                    opcode,
                    addr: (addr + 2) % SRAM_BYTES,
                };
                Ok(reply)
            }
            Phase::Ignore => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::memory::spi::{SharedBus, SpiSram};
    use crate::dsp::memory::MemoryBackend;

    fn sram() -> (SpiSram<EmulatedSram>, SharedBus<EmulatedSram>) {
        let bus = SharedBus::new(EmulatedSram::new());
        (SpiSram::new(bus.clone()), bus)
    }

    /// Samples written through the backend read back unchanged.
    #[test]
    fn test_write_then_read() {
        let (mut mem, _) = sram();
        let data: Vec<i16> = (0..300).map(|i| (i * 97 - 15_000) as i16).collect();
        mem.write(40_000, &data).unwrap();

        let mut out = vec![0; 300];
        mem.read(40_000, &mut out).unwrap();
        assert_eq!(out, data);
    }

    /// Samples are stored big-endian at twice their sample offset.
    #[test]
    fn test_byte_layout() {
        let (mut mem, bus) = sram();
        mem.write(3, &[0x1234]).unwrap();
        assert_eq!(bus.lock().bytes()[6..8], [0x12, 0x34]);
    }

    /// Before anything is written, reads return the power-up pattern.
    #[test]
    fn test_power_up_contents_are_not_silent() {
        let (mut mem, _) = sram();
        let mut out = [0; 4];
        mem.read(100, &mut out).unwrap();
        assert_eq!(out, [0xA5A5_u16 as i16; 4]);

        mem.zero(100, 4).unwrap();
        mem.read(100, &mut out).unwrap();
        assert_eq!(out, [0; 4]);
    }

    /// Every transaction uses the chip's 20 MHz mode-0 settings and is
    /// one chip-select frame.
    #[test]
    fn test_one_frame_per_access() {
        let (mut mem, bus) = sram();
        mem.zero(0, 8).unwrap();
        mem.write(0, &[1]).unwrap();
        mem.read(0, &mut [0; 2]).unwrap();

        let chip = bus.lock();
        assert_eq!(chip.frames(), 3);
        assert_eq!(chip.settings(), Some(SpiSettings::SRAM));
    }

    /// Words clocked in a frame with an unknown opcode change nothing.
    #[test]
    fn test_unknown_opcode_ignored() {
        let bus = SharedBus::new(EmulatedSram::new());
        bus.transaction(&SpiSettings::SRAM, |chip| {
            chip.transfer16(0x0500)?;
            chip.transfer16(0x0000)?;
            chip.transfer16(0x0000)?;
            Ok(())
        })
        .unwrap();
        assert!(bus.lock().bytes()[..4].iter().all(|&b| b == POWER_UP_BYTE));
    }
}
