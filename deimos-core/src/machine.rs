//! The simulated machine: harts, physical memory, the decoded-instruction cache, and the
//! cooperative scheduler that drives them.

use log::{debug, info};

use crate::bus::{Bus, Reservation};
use crate::core::{Config, Cpu};
use crate::icache::DecodedCache;
use crate::physmem::{PhysAddr, PhysicalMemory};

/// How many machine ticks pass between device `step4` calls.
const DEVICE_STEP_INTERVAL: u64 = 4;

/// A complete simulated machine.
///
/// Owns the physical memory map, the decoded-instruction cache (shared by all harts), the harts
/// themselves, and one LR/SC reservation slot per hart. Everything runs on the caller's thread:
/// [`step`](Self::step) advances every hart by one instruction in a fixed round-robin order, so
/// execution is deterministic for a given step sequence.
///
/// The halt flag is only consulted between steps; a step in flight always runs to completion.
#[derive(Debug)]
pub struct Machine {
    mem: PhysicalMemory,
    icache: DecodedCache,
    harts: Vec<Cpu>,
    reservations: Vec<Reservation>,
    tohalt: bool,
    ticks: u64,
}

impl Machine {
    /// Creates a machine over the given memory map, initially without harts.
    pub fn new(mem: PhysicalMemory) -> Self {
        Self {
            mem,
            icache: DecodedCache::new(),
            harts: Vec::new(),
            reservations: Vec::new(),
            tohalt: false,
            ticks: 0,
        }
    }

    /// Adds a hart with the given reset vector, returning its hart id.
    ///
    /// Hart ids are assigned contiguously from zero; they double as the index of the hart's
    /// reservation slot.
    pub fn add_hart(&mut self, reset_vector: u32) -> u32 {
        let hart_id = self.harts.len() as u32;
        info!("adding hart{hart_id} with reset vector {reset_vector:#010x}");
        self.harts.push(Cpu::new(Config {
            hart_id,
            reset_vector,
        }));
        self.reservations.push(Reservation::new());
        hart_id
    }

    pub fn hart(&self, hart_id: u32) -> &Cpu {
        &self.harts[hart_id as usize]
    }

    pub fn hart_mut(&mut self, hart_id: u32) -> &mut Cpu {
        &mut self.harts[hart_id as usize]
    }

    pub fn harts(&self) -> &[Cpu] {
        &self.harts
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut PhysicalMemory {
        &mut self.mem
    }

    /// Advances the machine one tick: every hart steps once, in hart-id order, and every fourth
    /// tick the devices make progress.
    pub fn step(&mut self) {
        for cpu in &mut self.harts {
            let mut bus = Bus {
                mem: &mut self.mem,
                icache: &mut self.icache,
                reservations: &mut self.reservations,
            };
            cpu.step(&mut bus);
        }
        self.ticks += 1;
        if self.ticks % DEVICE_STEP_INTERVAL == 0 {
            self.mem.step_devices();
        }
    }

    /// Runs until the halt flag is raised or `limit` ticks have passed. Returns the number of
    /// ticks executed.
    pub fn run(&mut self, limit: Option<u64>) -> u64 {
        let mut executed = 0;
        while !self.tohalt && limit.map_or(true, |limit| executed < limit) {
            self.step();
            executed += 1;
        }
        executed
    }

    /// Requests the machine to stop before the next step.
    pub fn halt(&mut self) {
        debug!("halt requested");
        self.tohalt = true;
    }

    pub fn halted(&self) -> bool {
        self.tohalt
    }

    /// Number of ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Host probe of a hart's LR/SC reservation: invalidates it if the store at `phys` hits,
    /// reporting whether it did. Exposed for engines that write memory behind the bus's back.
    pub fn sc_access(&mut self, hart_id: u32, phys: PhysAddr) -> bool {
        self.reservations[hart_id as usize].sc_access(phys)
    }

    /// Raises an external interrupt line of a hart.
    pub fn interrupt_up(&mut self, hart_id: u32, code: u32) {
        self.harts[hart_id as usize].interrupt_up(code);
    }

    /// Lowers an external interrupt line of a hart.
    pub fn interrupt_down(&mut self, hart_id: u32, code: u32) {
        self.harts[hart_id as usize].interrupt_down(code);
    }

    /// Tears the machine down: devices are notified, the harts are dropped, and the
    /// decoded-instruction cache is freed.
    pub fn done(&mut self) {
        info!("tearing down machine after {} ticks", self.ticks);
        self.mem.done_devices();
        self.harts.clear();
        self.reservations.clear();
        self.icache.clear_all();
    }
}
