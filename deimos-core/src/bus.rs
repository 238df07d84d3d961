//! Per-step view of the machine state shared between harts.
//!
//! A [`Bus`] is borrowed for the duration of one `step` and carries everything a hart may touch
//! besides its own architectural state: the physical memory map, the decoded-instruction cache,
//! and the LR/SC reservation slots of *all* harts. Routing every store through the bus is what
//! implements the store-conditional contract: any store that lands in physical memory probes and
//! invalidates matching reservations, no matter which hart holds them.

use crate::icache::DecodedCache;
use crate::instruction::Instruction;
use crate::physmem::{PhysAddr, PhysicalMemory};

/// A hart's LR/SC reservation.
///
/// Holds the 4-byte-aligned physical address of a valid reservation, or nothing. Alignment makes
/// sub-word stores hit the reservation of the word they fall into.
#[derive(Debug, Clone, Default)]
pub struct Reservation {
    address: Option<PhysAddr>,
}

impl Reservation {
    pub fn new() -> Self {
        Self { address: None }
    }

    /// Registers a reservation for the word containing `phys`.
    pub fn set(&mut self, phys: PhysAddr) {
        self.address = Some(phys & !0b11);
    }

    /// Drops the reservation unconditionally.
    pub fn clear(&mut self) {
        self.address = None;
    }

    /// Returns `true` if a valid reservation covers the word containing `phys`.
    pub fn covers(&self, phys: PhysAddr) -> bool {
        self.address == Some(phys & !0b11)
    }

    /// Store probe: invalidates the reservation if the store at `phys` hits it, reporting whether
    /// it did.
    pub fn sc_access(&mut self, phys: PhysAddr) -> bool {
        let hit = self.covers(phys);
        if hit {
            self.address = None;
        }
        hit
    }
}

/// Borrowed view of the shared machine state, threaded through a hart's step.
#[derive(Debug)]
pub struct Bus<'a> {
    pub mem: &'a mut PhysicalMemory,
    pub icache: &'a mut DecodedCache,
    pub reservations: &'a mut [Reservation],
}

impl Bus<'_> {
    /// Fetches the decoded instruction at physical address `phys` through the cache.
    pub fn fetch(&mut self, hart: u32, phys: PhysAddr) -> Option<Instruction> {
        self.icache.fetch(self.mem, hart, phys)
    }

    /// Store of a byte, probing all reservations on success.
    pub fn write8(&mut self, hart: u32, phys: PhysAddr, value: u8, noisy: bool) -> bool {
        let ok = self.mem.write8(hart, phys, value, noisy);
        if ok {
            self.sc_access_all(phys);
        }
        ok
    }

    /// Store of a halfword, probing all reservations on success.
    pub fn write16(&mut self, hart: u32, phys: PhysAddr, value: u16, noisy: bool) -> bool {
        let ok = self.mem.write16(hart, phys, value, noisy);
        if ok {
            self.sc_access_all(phys);
        }
        ok
    }

    /// Store of a word, probing all reservations on success.
    pub fn write32(&mut self, hart: u32, phys: PhysAddr, value: u32, noisy: bool) -> bool {
        let ok = self.mem.write32(hart, phys, value, noisy);
        if ok {
            self.sc_access_all(phys);
        }
        ok
    }

    fn sc_access_all(&mut self, phys: PhysAddr) {
        for reservation in self.reservations.iter_mut() {
            reservation.sc_access(phys);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_covers_word() {
        let mut reservation = Reservation::new();
        reservation.set(0x43);
        assert!(reservation.covers(0x40));
        assert!(reservation.covers(0x41));
        assert!(!reservation.covers(0x44));
    }

    #[test]
    fn test_sc_access_consumes() {
        let mut reservation = Reservation::new();
        reservation.set(0x40);
        assert!(reservation.sc_access(0x42));
        assert!(!reservation.covers(0x40));
        assert!(!reservation.sc_access(0x40));
    }

    #[test]
    fn test_store_invalidates_every_hart() {
        let mut mem = PhysicalMemory::new();
        mem.attach_ram(0x0, 0x1000).unwrap();
        let mut icache = DecodedCache::new();
        let mut reservations = vec![Reservation::new(), Reservation::new()];
        reservations[0].set(0x40);
        reservations[1].set(0x40);

        let mut bus = Bus {
            mem: &mut mem,
            icache: &mut icache,
            reservations: &mut reservations,
        };
        assert!(bus.write32(0, 0x40, 7, true));

        assert!(!reservations[0].covers(0x40));
        assert!(!reservations[1].covers(0x40));
    }

    #[test]
    fn test_dropped_store_keeps_reservations() {
        let mut mem = PhysicalMemory::new();
        mem.attach_ram(0x0, 0x1000).unwrap();
        let mut icache = DecodedCache::new();
        let mut reservations = vec![Reservation::new()];
        reservations[0].set(0x40);

        let mut bus = Bus {
            mem: &mut mem,
            icache: &mut icache,
            reservations: &mut reservations,
        };
        // Unmapped store is dropped; the reservation must survive.
        assert!(!bus.write32(0, 0x10_0000, 7, true));
        assert!(reservations[0].covers(0x40));
    }
}
