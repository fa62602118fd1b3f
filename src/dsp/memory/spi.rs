//! # Serial SRAM over SPI
//!
//! The 23LC1024 is a 128 KiB SPI SRAM. Each access is one framed
//! transaction on the bus:
//!
//! ```text
//! CS low
//!   word 0: (opcode << 8) | addr[23:16]
//!   word 1: addr[15:0]
//!   word 2..: one 16-bit sample per word, MSB first
//! CS high
//! ```
//!
//! Opcode `0x02` writes, `0x03` reads. The chip is byte-addressed, so a
//! sample offset is doubled before it goes on the wire. During a read the
//! host clocks out `0x0000` words and keeps whatever comes back; zeroing is
//! a write whose data words are all `0x0000`.
//!
//! ## Sharing the Bus
//!
//! Every delay instance (and anything else on the same SPI pins) talks
//! through one [`SharedBus`]. A transaction holds the bus lock from
//! chip-select to deselect and never longer, so two instances can never
//! interleave their frames, and no instance holds the bus between cycles.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::MemoryBackend;
use crate::dsp::allocator::PoolType;
use crate::error::{BusFault, MemoryError};

/// Write opcode.
pub const OP_WRITE: u8 = 0x02;
/// Read opcode.
pub const OP_READ: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// Clock polarity/phase combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiMode {
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

/// Bus configuration applied at the start of every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiSettings {
    pub clock_hz: u32,
    pub bit_order: BitOrder,
    pub mode: SpiMode,
}

impl SpiSettings {
    /// 20 MHz, MSB first, mode 0: the 23LC1024's fastest setting.
    pub const SRAM: SpiSettings = SpiSettings {
        clock_hz: 20_000_000,
        bit_order: BitOrder::MsbFirst,
        mode: SpiMode::Mode0,
    };
}

/// A full-duplex SPI controller with one chip-select line.
///
/// This is the transport the SRAM backend drives. Implementations own
/// clocking and pin handling; the backend only decides which words to
/// send.
pub trait SpiBus {
    /// Reconfigure the controller for the next transaction.
    fn begin_transaction(&mut self, settings: &SpiSettings);

    fn end_transaction(&mut self);

    /// Drive chip-select low.
    fn select(&mut self);

    /// Drive chip-select high.
    fn deselect(&mut self);

    /// Clock one word out and return the word clocked in.
    fn transfer16(&mut self, word: u16) -> Result<u16, BusFault>;
}

/// An SPI bus shared between several users.
pub struct SharedBus<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedBus<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SpiBus> SharedBus<S> {
    pub fn new(bus: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
        }
    }

    /// Run one framed transaction with exclusive use of the bus.
    ///
    /// Chip-select is asserted before `body` runs and deasserted after,
    /// even when `body` fails partway through a frame.
    pub fn transaction<T>(
        &self,
        settings: &SpiSettings,
        body: impl FnOnce(&mut S) -> Result<T, BusFault>,
    ) -> Result<T, BusFault> {
        let mut bus = self.inner.lock();
        bus.begin_transaction(settings);
        bus.select();
        let result = body(&mut *bus);
        bus.deselect();
        bus.end_transaction();
        result
    }

    /// Direct access to the underlying bus, outside any transaction.
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.inner.lock()
    }
}

/// A 23LC1024 on a shared SPI bus.
pub struct SpiSram<S> {
    bus: SharedBus<S>,
    settings: SpiSettings,
}

impl<S: SpiBus> SpiSram<S> {
    /// Size of the chip in samples.
    pub const SAMPLES: usize = PoolType::Sram23lc1024.capacity();

    pub fn new(bus: SharedBus<S>) -> Self {
        Self {
            bus,
            settings: SpiSettings::SRAM,
        }
    }

    fn check(&self, addr: usize, count: usize) -> Result<(), MemoryError> {
        match addr.checked_add(count) {
            Some(end) if end <= Self::SAMPLES => Ok(()),
            _ => Err(MemoryError::OutOfRange {
                addr,
                count,
                size: Self::SAMPLES,
            }),
        }
    }
}

/// Send the command word and the low address word.
fn send_header<S: SpiBus>(bus: &mut S, opcode: u8, sample_addr: usize) -> Result<(), BusFault> {
    let addr = (sample_addr as u32) << 1;
    bus.transfer16(((opcode as u16) << 8) | ((addr >> 16) & 0xFF) as u16)?;
    bus.transfer16((addr & 0xFFFF) as u16)?;
    Ok(())
}

impl<S: SpiBus> MemoryBackend for SpiSram<S> {
    fn pool(&self) -> PoolType {
        PoolType::Sram23lc1024
    }

    fn read(&mut self, addr: usize, out: &mut [i16]) -> Result<(), MemoryError> {
        self.check(addr, out.len())?;
        self.bus.transaction(&self.settings, |bus| {
            send_header(bus, OP_READ, addr)?;
            for cell in out.iter_mut() {
                *cell = bus.transfer16(0)? as i16;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[i16]) -> Result<(), MemoryError> {
        self.check(addr, data.len())?;
        self.bus.transaction(&self.settings, |bus| {
            send_header(bus, OP_WRITE, addr)?;
            for &sample in data {
                bus.transfer16(sample as u16)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn zero(&mut self, addr: usize, count: usize) -> Result<(), MemoryError> {
        self.check(addr, count)?;
        self.bus.transaction(&self.settings, |bus| {
            send_header(bus, OP_WRITE, addr)?;
            for _ in 0..count {
                bus.transfer16(0)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Begin(SpiSettings),
        Select,
        Word(u16),
        Deselect,
        End,
    }

    /// Records everything the backend puts on the bus. Reads return
    /// `reply`, and the transfer numbered `fail_at` faults.
    #[derive(Default)]
    struct RecordingBus {
        events: Vec<Event>,
        reply: u16,
        transfers: usize,
        fail_at: Option<usize>,
    }

    impl SpiBus for RecordingBus {
        fn begin_transaction(&mut self, settings: &SpiSettings) {
            self.events.push(Event::Begin(*settings));
        }

        fn end_transaction(&mut self) {
            self.events.push(Event::End);
        }

        fn select(&mut self) {
            self.events.push(Event::Select);
        }

        fn deselect(&mut self) {
            self.events.push(Event::Deselect);
        }

        fn transfer16(&mut self, word: u16) -> Result<u16, BusFault> {
            self.transfers += 1;
            if self.fail_at == Some(self.transfers) {
                return Err(BusFault);
            }
            self.events.push(Event::Word(word));
            Ok(self.reply)
        }
    }

    fn sram(bus: RecordingBus) -> (SpiSram<RecordingBus>, SharedBus<RecordingBus>) {
        let shared = SharedBus::new(bus);
        (SpiSram::new(shared.clone()), shared)
    }

    /// A write frames opcode 0x02 and the doubled address, then the data.
    #[test]
    fn test_write_frame_is_bit_exact() {
        let (mut mem, shared) = sram(RecordingBus::default());
        // Sample 0x8345 lives at byte 0x1068A.
        mem.write(0x8345, &[0x0102, -1]).unwrap();

        assert_eq!(
            shared.lock().events,
            vec![
                Event::Begin(SpiSettings::SRAM),
                Event::Select,
                Event::Word(0x0201),
                Event::Word(0x068A),
                Event::Word(0x0102),
                Event::Word(0xFFFF),
                Event::Deselect,
                Event::End,
            ]
        );
    }

    /// A read frames opcode 0x03 and keeps the words clocked in.
    #[test]
    fn test_read_frame_is_bit_exact() {
        let (mut mem, shared) = sram(RecordingBus {
            reply: 0x8001,
            ..Default::default()
        });
        let mut out = [0; 3];
        mem.read(5, &mut out).unwrap();

        assert_eq!(out, [0x8001_u16 as i16; 3]);
        let words: Vec<_> = shared
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Word(w) => Some(*w),
                _ => None,
            })
            .collect();
        assert_eq!(words, vec![0x0300, 0x000A, 0, 0, 0]);
    }

    /// Zeroing is a write frame carrying 0x0000 words.
    #[test]
    fn test_zero_sends_zero_words() {
        let (mut mem, shared) = sram(RecordingBus::default());
        mem.zero(0x100, 2).unwrap();

        let bus = shared.lock();
        let events = &bus.events;
        assert_eq!(events[2..6], [
            Event::Word(0x0200),
            Event::Word(0x0200),
            Event::Word(0),
            Event::Word(0),
        ]);
    }

    /// A fault mid-frame still releases chip-select and the bus.
    #[test]
    fn test_fault_deasserts_chip_select() {
        let (mut mem, shared) = sram(RecordingBus {
            fail_at: Some(3),
            ..Default::default()
        });
        let err = mem.write(0, &[1, 2, 3]).unwrap_err();
        assert_eq!(err, MemoryError::Bus(BusFault));

        let bus = shared.lock();
        let events = &bus.events;
        assert_eq!(events[events.len() - 2..], [Event::Deselect, Event::End]);
    }

    /// Accesses past the end of the chip never reach the bus.
    #[test]
    fn test_out_of_range_is_rejected_before_framing() {
        let (mut mem, shared) = sram(RecordingBus::default());
        let err = mem.zero(SpiSram::<RecordingBus>::SAMPLES - 1, 2).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfRange { .. }));
        assert!(shared.lock().events.is_empty());
    }

    /// Two backends on one bus produce whole, non-interleaved frames.
    #[test]
    fn test_backends_share_one_bus() {
        let shared = SharedBus::new(RecordingBus::default());
        let mut a = SpiSram::new(shared.clone());
        let mut b = SpiSram::new(shared.clone());
        a.write(0, &[7]).unwrap();
        b.write(1000, &[9]).unwrap();

        let bus = shared.lock();
        let events = &bus.events;
        let selects = events.iter().filter(|e| **e == Event::Select).count();
        assert_eq!(selects, 2);
        // Frame one ends before frame two begins.
        assert_eq!(events[5..7], [Event::Deselect, Event::End]);
        assert_eq!(events[7], Event::Begin(SpiSettings::SRAM));
    }
}
