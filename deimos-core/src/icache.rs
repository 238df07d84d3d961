//! Frame-granular cache of pre-decoded instructions.
//!
//! Decoding dominates execution cost, so decoded instructions are cached at page granularity:
//! one entry covers a whole 4 KiB frame of RAM. Coherence is driven by the frame table: every
//! write through the physical memory map clears the owning frame's `valid` bit, and a fetch that
//! finds the bit clear re-decodes the frame in place before trusting the entry.

use crate::instruction::Instruction;
use crate::physmem::{frame_align_down, PhysAddr, PhysicalMemory, FRAME_MASK, FRAME_SIZE};
use log::warn;

/// Number of instruction slots per frame.
pub const FRAME_INSTRUCTIONS: usize = (FRAME_SIZE / 4) as usize;

const_assert_eq!(FRAME_INSTRUCTIONS, 1024);

/// Index of `phys` within its frame's instruction slots.
fn slot_of(phys: PhysAddr) -> usize {
    ((phys & FRAME_MASK) / 4) as usize
}

#[derive(Debug)]
struct CacheEntry {
    frame_address: PhysAddr,
    /// One slot per word in the frame; `None` marks an encoding that does not decode and raises
    /// an illegal-instruction exception when executed.
    decoded: Box<[Option<Instruction>; FRAME_INSTRUCTIONS]>,
}

impl CacheEntry {
    fn new(frame_address: PhysAddr) -> Self {
        Self {
            frame_address,
            decoded: Box::new([None; FRAME_INSTRUCTIONS]),
        }
    }

    fn decode_frame(&mut self, mem: &mut PhysicalMemory, hart: u32) {
        for (i, slot) in self.decoded.iter_mut().enumerate() {
            let word = mem.read32(hart, self.frame_address + i as u64 * 4, false);
            *slot = Instruction::decode(word).ok();
        }
    }
}

/// The decoded-instruction cache, shared by all harts of a machine.
///
/// Entries are grown on demand at fetch time and freed wholesale when the machine tears a hart
/// down. The entry list is scanned linearly; hot workloads touch a handful of frames.
#[derive(Debug, Default)]
pub struct DecodedCache {
    entries: Vec<CacheEntry>,
}

impl DecodedCache {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Returns the decoded instruction stored at physical address `phys`.
    ///
    /// `phys` must be word-aligned (fetches always are). For RAM addresses this consults the
    /// cache, re-decoding the frame first if its `valid` bit is clear, and allocates a new entry
    /// on a miss. Fetching from ROM or device space bypasses the cache entirely and decodes a
    /// single word read from the memory map.
    pub fn fetch(
        &mut self,
        mem: &mut PhysicalMemory,
        hart: u32,
        phys: PhysAddr,
    ) -> Option<Instruction> {
        let frame_address = frame_align_down(phys);

        if let Some(index) = self
            .entries
            .iter()
            .position(|e| e.frame_address == frame_address)
        {
            let frame_valid = mem
                .find_frame(frame_address)
                .expect("cached frame disappeared from the memory map")
                .valid;
            if !frame_valid {
                self.entries[index].decode_frame(mem, hart);
                mem.set_frame_valid(frame_address);
            }
            return self.entries[index].decoded[slot_of(phys)];
        }

        if mem.find_frame(phys).is_some() {
            let mut entry = CacheEntry::new(frame_address);
            entry.decode_frame(mem, hart);
            mem.set_frame_valid(frame_address);
            let instruction = entry.decoded[slot_of(phys)];
            self.entries.push(entry);
            return instruction;
        }

        warn!("hart{hart}: fetching instructions from outside RAM at {phys:#011x}");
        Instruction::decode(mem.read32(hart, phys, true)).ok()
    }

    /// Frees every entry. Called when any hart is torn down.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Number of frames currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::RegRegOp;

    fn ram_with_add() -> PhysicalMemory {
        let mut mem = PhysicalMemory::new();
        mem.attach_ram(0x0, 0x4000).unwrap();
        // add x1, x2, x3
        mem.write32(0, 0x1000, 0x003100B3, true);
        mem
    }

    #[test]
    fn test_fetch_decodes_frame() {
        let mut mem = ram_with_add();
        let mut cache = DecodedCache::new();
        let instruction = cache.fetch(&mut mem, 0, 0x1000).unwrap();
        assert!(matches!(
            instruction,
            Instruction::Op {
                op: RegRegOp::Add,
                ..
            }
        ));
        assert_eq!(1, cache.len());
        assert!(mem.find_frame(0x1000).unwrap().valid);
        // The other slots of the frame hold the (undecodable) zero word.
        assert_eq!(None, cache.fetch(&mut mem, 0, 0x1004));
    }

    #[test]
    fn test_write_invalidates_and_refetch_sees_new_bytes() {
        let mut mem = ram_with_add();
        let mut cache = DecodedCache::new();
        cache.fetch(&mut mem, 0, 0x1000).unwrap();

        // Overwrite with sub x1, x2, x3 and fetch again: the frame's valid bit was cleared by
        // the write, so the entry is rebuilt and the new instruction is observed.
        mem.write32(0, 0x1000, 0x403100B3, true);
        assert!(!mem.find_frame(0x1000).unwrap().valid);
        let instruction = cache.fetch(&mut mem, 0, 0x1000).unwrap();
        assert!(matches!(
            instruction,
            Instruction::Op {
                op: RegRegOp::Sub,
                ..
            }
        ));
        assert_eq!(1, cache.len());
        assert!(mem.find_frame(0x1000).unwrap().valid);
    }

    #[test]
    fn test_non_ram_fetch_bypasses_cache() {
        let mut mem = PhysicalMemory::new();
        // jalr x0, 0(x1) in ROM
        mem.attach_rom(0x8000, 0x00008067u32.to_le_bytes().to_vec())
            .unwrap();
        let mut cache = DecodedCache::new();
        let instruction = cache.fetch(&mut mem, 0, 0x8000).unwrap();
        assert!(matches!(instruction, Instruction::Jalr { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_all() {
        let mut mem = ram_with_add();
        let mut cache = DecodedCache::new();
        cache.fetch(&mut mem, 0, 0x1000);
        cache.fetch(&mut mem, 0, 0x2000);
        assert_eq!(2, cache.len());
        cache.clear_all();
        assert!(cache.is_empty());
    }
}
