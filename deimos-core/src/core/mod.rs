//! The RV32IMA hart: architectural state, the step engine, and the host-facing operations.

pub mod csr;

mod control;
mod counters;
mod execute;
mod interrupts;
mod mmu;
mod status;
mod trap;

use log::{trace, warn};

use crate::bus::Bus;
use crate::instruction::{
    AmoOp, BranchCondition, Instruction, LoadWidth, RegImmOp, RegRegOp, RegShiftImmOp, StoreWidth,
};
use crate::registers::Registers;
use crate::{Alignment, PrivilegeLevel};
use control::Control;
use counters::CounterControl;
use execute::Executor;
use mmu::AccessIntent;

pub use counters::{hpm_event, Counters, HPM_COUNTERS};
pub use csr::CsrSpecifier;
pub use interrupts::Interrupts;
pub use mmu::{MTIMECMP_ADDRESS, MTIME_ADDRESS};
pub use status::{Status, StatusFlag};
pub use trap::TrapRegisters;

/// Per-hart configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct Config {
    /// > The mhartid CSR is an MXLEN-bit read-only register containing the integer ID of the
    /// > hardware thread running the code. This register must be readable in any implementation.
    /// > Hart IDs might not necessarily be numbered contiguously in a multiprocessor system, but
    /// > at least one hart must have a hart ID of zero. Hart IDs must be unique within the
    /// > execution environment.
    ///
    /// Also used to index this hart's reservation slot, so the machine keeps ids contiguous.
    pub hart_id: u32,
    /// Address the hart starts fetching from after reset.
    pub reset_vector: u32,
}

/// One RV32IMA hart.
///
/// As hardware multithreading is not modelled, every core has exactly one hart, and this type is
/// the whole of a core.
///
/// > From the perspective of software running in a given execution environment, a hart is a
/// > resource that autonomously fetches and executes RISC-V instructions within that execution
/// > environment.
///
/// All shared machine state (physical memory, the decoded-instruction cache, the reservation
/// slots) is borrowed per step as a [`Bus`]; the hart owns only its architectural state.
#[derive(Debug)]
pub struct Cpu {
    config: Config,
    registers: Registers,
    privilege_mode: PrivilegeLevel,
    /// Standby (WFI) state: while set, the step engine skips fetch/execute and only runs
    /// accounting and interrupt delivery. Cleared by the next taken trap.
    stdby: bool,
    status: Status,
    control: Control,
    interrupts: Interrupts,
    counters: Counters,
    counter_control: CounterControl,
    trap: TrapRegisters,
}

impl Cpu {
    /// The misa CSR value: MXL=32, extensions I, M, A, S, and U.
    ///
    /// > The misa CSR is a WARL read-write register reporting the ISA supported by the hart.
    ///
    /// Implemented read-only here.
    pub const MISA: u32 = 0x4014_1101;
    /// The mvendorid CSR is set to 0 to indicate this is a non-commercial implementation.
    pub const MVENDORID: u32 = 0;
    /// The marchid CSR is set to 0 to indicate it is not implemented.
    pub const MARCHID: u32 = 0;
    /// The mimpid CSR is set to 0 to indicate it is not implemented.
    pub const MIMPID: u32 = 0;

    /// Creates a hart in its reset state: M-mode, pc at the reset vector.
    pub fn new(config: Config) -> Self {
        let reset_vector = config.reset_vector;
        Self {
            config,
            registers: Registers::new(reset_vector),
            privilege_mode: PrivilegeLevel::Machine,
            stdby: false,
            status: Status::new(),
            control: Control::new(),
            interrupts: Interrupts::new(),
            counters: Counters::new(),
            counter_control: CounterControl::new(),
            trap: TrapRegisters::new(),
        }
    }

    /// Forces the hart back to its reset state.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Returns the current privilege mode the hart is in.
    pub fn privilege_mode(&self) -> PrivilegeLevel {
        self.privilege_mode
    }

    pub fn set_privilege_mode(&mut self, privilege_mode: PrivilegeLevel) {
        self.privilege_mode = privilege_mode;
    }

    /// Returns `true` while the hart is waiting for an interrupt.
    pub fn stdby(&self) -> bool {
        self.stdby
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    pub fn trap_registers(&self) -> &TrapRegisters {
        &self.trap
    }

    /// Debugger-facing jump: points both pc and its successor at `value`.
    ///
    /// `value` must be word-aligned; misaligned values are ignored with a warning, so a stray
    /// debugger command cannot wedge the pc pair into an unrepresentable state.
    pub fn set_pc(&mut self, value: u32) {
        if !Alignment::WORD.is_aligned(value) {
            warn!(
                "hart{}: ignoring jump to misaligned address {value:#010x}",
                self.config.hart_id
            );
            return;
        }
        self.registers.jump_to(value);
    }

    /// Executes one step of this hart.
    ///
    /// In order: fetch and execute one instruction (unless in standby), account the counters and
    /// recompute the timer interrupt bits, then either enter the trap raised by the instruction
    /// or deliver one pending interrupt. Finally the pc pair advances and the per-step trap value
    /// is cleared.
    pub fn step(&mut self, bus: &mut Bus) {
        let exception = if self.stdby {
            None
        } else {
            self.execute_one(bus).err()
        };

        self.account(exception.is_some());

        match exception {
            Some(exception) => self.handle_exception(exception),
            None => self.try_take_interrupt(),
        }

        if !self.stdby {
            self.registers.advance_pc();
        }

        self.trap.clear_tval_next();
    }

    /// Fetch, decode (through the instruction cache), and execute the instruction at pc.
    fn execute_one(&mut self, bus: &mut Bus) -> ExecutionResult {
        let pc = self.registers.pc();

        let phys = match self.translate(bus, pc, AccessIntent::Fetch, true) {
            Ok(phys) => phys,
            Err(exception) => {
                warn!(
                    "hart{}: instruction fetch from unmappable address {pc:#010x}",
                    self.config.hart_id
                );
                self.trap.set_tval_next(pc);
                return Err(exception);
            }
        };

        let instruction = bus.fetch(self.config.hart_id, phys);
        let raw = bus.mem.read32(self.config.hart_id, phys, true);

        trace!(
            "hart{}: {pc:#010x}: {raw:#010x} {instruction:?}",
            self.config.hart_id
        );

        let result = match instruction {
            Some(instruction) => self.execute_instruction(bus, instruction),
            None => Err(Exception::IllegalInstruction),
        };

        if let Err(Exception::IllegalInstruction) = result {
            self.trap.set_tval_next(raw);
        }

        result
    }

    /// Advances the counters and recomputes the timer interrupt pending bits.
    fn account(&mut self, exception_raised: bool) {
        let instruction_retired = !exception_raised && !self.stdby;
        self.counters.tick(
            &self.counter_control.mcountinhibit,
            self.privilege_mode,
            self.stdby,
            instruction_retired,
        );

        self.interrupts.set_s_timer(self.counters.stip_pending());
        self.interrupts.set_m_timer(self.counters.mtip_pending());
    }

    /// Decode `raw_instruction` and execute it on this hart.
    ///
    /// # Unspecified behavior
    ///
    /// > The behavior upon decoding a reserved instruction is UNSPECIFIED.
    ///
    /// This implementation chooses to raise an [`Exception::IllegalInstruction`] when
    /// `raw_instruction` has a reserved opcode.
    pub fn execute_raw_instruction(&mut self, bus: &mut Bus, raw_instruction: u32) -> ExecutionResult {
        match Instruction::decode(raw_instruction) {
            Ok(instruction) => self.execute_instruction(bus, instruction),
            Err(_) => Err(Exception::IllegalInstruction),
        }
    }

    /// Execute a single decoded instruction on this hart.
    ///
    /// This only performs the instruction-specific operations (register, memory, and CSR
    /// updates, and `pc_next` for control transfers). The surrounding step behavior (counter
    /// accounting, trap entry, advancing the pc pair) belongs to [`step`](Self::step).
    pub fn execute_instruction(
        &mut self,
        bus: &mut Bus,
        instruction: Instruction,
    ) -> ExecutionResult {
        let mut executor = Executor { cpu: self, bus };
        match instruction {
            Instruction::OpImm {
                op,
                dest,
                src,
                immediate,
            } => {
                let op = match op {
                    RegImmOp::Addi => Executor::addi,
                    RegImmOp::Slti => Executor::slti,
                    RegImmOp::Sltiu => Executor::sltiu,
                    RegImmOp::Xori => Executor::xori,
                    RegImmOp::Ori => Executor::ori,
                    RegImmOp::Andi => Executor::andi,
                };
                op(&mut executor, dest, src, immediate)
            }
            Instruction::OpShiftImm {
                op,
                dest,
                src,
                shift_amount_u5,
            } => {
                let op = match op {
                    RegShiftImmOp::Slli => Executor::slli,
                    RegShiftImmOp::Srli => Executor::srli,
                    RegShiftImmOp::Srai => Executor::srai,
                };
                op(&mut executor, dest, src, shift_amount_u5)
            }
            Instruction::Auipc { dest, immediate } => executor.auipc(dest, immediate),
            Instruction::Lui { dest, immediate } => executor.lui(dest, immediate),
            Instruction::Op {
                op,
                dest,
                src1,
                src2,
            } => {
                let op = match op {
                    RegRegOp::Add => Executor::add,
                    RegRegOp::Slt => Executor::slt,
                    RegRegOp::Sltu => Executor::sltu,
                    RegRegOp::And => Executor::and,
                    RegRegOp::Or => Executor::or,
                    RegRegOp::Xor => Executor::xor,
                    RegRegOp::Sll => Executor::sll,
                    RegRegOp::Srl => Executor::srl,
                    RegRegOp::Sub => Executor::sub,
                    RegRegOp::Sra => Executor::sra,
                    RegRegOp::Mul => Executor::mul,
                    RegRegOp::Mulh => Executor::mulh,
                    RegRegOp::Mulhsu => Executor::mulhsu,
                    RegRegOp::Mulhu => Executor::mulhu,
                    RegRegOp::Div => Executor::div,
                    RegRegOp::Divu => Executor::divu,
                    RegRegOp::Rem => Executor::rem,
                    RegRegOp::Remu => Executor::remu,
                };
                op(&mut executor, dest, src1, src2)
            }
            Instruction::Amo {
                op,
                dest,
                addr,
                src,
            } => match op {
                AmoOp::LrW => executor.lr_w(dest, addr),
                AmoOp::ScW => executor.sc_w(dest, addr, src),
                AmoOp::Swap => executor.amo_op(dest, addr, src, |_, s| s),
                AmoOp::Add => executor.amo_op(dest, addr, src, |o, s| o.wrapping_add(s)),
                AmoOp::Xor => executor.amo_op(dest, addr, src, |o, s| o ^ s),
                AmoOp::And => executor.amo_op(dest, addr, src, |o, s| o & s),
                AmoOp::Or => executor.amo_op(dest, addr, src, |o, s| o | s),
                AmoOp::Min => {
                    executor.amo_op(dest, addr, src, |o, s| (o as i32).min(s as i32) as u32)
                }
                AmoOp::Max => {
                    executor.amo_op(dest, addr, src, |o, s| (o as i32).max(s as i32) as u32)
                }
                AmoOp::Minu => executor.amo_op(dest, addr, src, |o, s| o.min(s)),
                AmoOp::Maxu => executor.amo_op(dest, addr, src, |o, s| o.max(s)),
            },
            Instruction::Jal { dest, offset } => executor.jal(dest, offset),
            Instruction::Jalr { dest, base, offset } => executor.jalr(dest, base, offset),
            Instruction::Branch {
                condition,
                src1,
                src2,
                offset,
            } => {
                let op = match condition {
                    BranchCondition::Beq => Executor::beq,
                    BranchCondition::Bne => Executor::bne,
                    BranchCondition::Blt => Executor::blt,
                    BranchCondition::Bltu => Executor::bltu,
                    BranchCondition::Bge => Executor::bge,
                    BranchCondition::Bgeu => Executor::bgeu,
                };
                op(&mut executor, src1, src2, offset)
            }
            Instruction::Load {
                width,
                dest,
                base,
                offset,
            } => {
                let op = match width {
                    LoadWidth::Lb => Executor::lb,
                    LoadWidth::Lh => Executor::lh,
                    LoadWidth::Lw => Executor::lw,
                    LoadWidth::Lbu => Executor::lbu,
                    LoadWidth::Lhu => Executor::lhu,
                };
                op(&mut executor, dest, base, offset)
            }
            Instruction::Store {
                width,
                src,
                base,
                offset,
            } => {
                let op = match width {
                    StoreWidth::Sb => Executor::sb,
                    StoreWidth::Sh => Executor::sh,
                    StoreWidth::Sw => Executor::sw,
                };
                op(&mut executor, src, base, offset)
            }
            Instruction::Fence {
                predecessor,
                successor,
            } => executor.fence(predecessor, successor),
            Instruction::FenceI => executor.fence_i(),
            Instruction::Ecall => executor.ecall(),
            Instruction::Ebreak => executor.ebreak(),
            Instruction::Sret => executor.sret(),
            Instruction::Mret => executor.mret(),
            Instruction::Wfi => executor.wfi(),
            Instruction::SfenceVma { vaddr, asid } => executor.sfence_vma(vaddr, asid),
            Instruction::Csr { op, dest, csr, src } => executor.csr_reg_op(op, dest, csr, src),
            Instruction::Csri {
                op,
                dest,
                csr,
                immediate,
            } => executor.csr_imm_op(op, dest, csr, immediate),
        }
    }

    /// External interrupt line raised.
    ///
    /// SEI drives the external SEIP signal, which is distinct from the M-writable software SEIP
    /// bit. MSI, SSI, and MEI set the corresponding mip bit directly; any other code is coerced
    /// to MEI.
    pub fn interrupt_up(&mut self, code: u32) {
        if code == Interrupt::SupervisorExternalInterrupt.code() {
            self.interrupts.set_s_external(true);
            return;
        }
        match coerce_external(code) {
            Interrupt::MachineSoftwareInterrupt => self.interrupts.set_m_soft(true),
            Interrupt::SupervisorSoftwareInterrupt => self.interrupts.set_s_soft(true),
            _ => self.interrupts.set_m_external(true),
        }
    }

    /// External interrupt line lowered. Symmetric to [`interrupt_up`](Self::interrupt_up).
    pub fn interrupt_down(&mut self, code: u32) {
        if code == Interrupt::SupervisorExternalInterrupt.code() {
            self.interrupts.set_s_external(false);
            return;
        }
        match coerce_external(code) {
            Interrupt::MachineSoftwareInterrupt => self.interrupts.set_m_soft(false),
            Interrupt::SupervisorSoftwareInterrupt => self.interrupts.set_s_soft(false),
            _ => self.interrupts.set_m_external(false),
        }
    }
}

/// Maps an externally supplied interrupt number onto the interrupts devices are allowed to
/// raise, defaulting to MEI for anything unrecognized.
fn coerce_external(code: u32) -> Interrupt {
    match code {
        c if c == Interrupt::MachineSoftwareInterrupt.code() => Interrupt::MachineSoftwareInterrupt,
        c if c == Interrupt::SupervisorSoftwareInterrupt.code() => {
            Interrupt::SupervisorSoftwareInterrupt
        }
        _ => Interrupt::MachineExternalInterrupt,
    }
}

/// Result of executing a single instruction. [`Ok`] if execution went normal, [`Err`] if an
/// exception occurred.
pub type ExecutionResult = Result<(), Exception>;

/// High bit of the mcause/scause registers, distinguishing interrupts from exceptions.
pub const INTERRUPT_BIT: u32 = 0x8000_0000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exception {
    /// Instruction address is not on a four-byte aligned boundary in memory.
    InstructionAddressMisaligned,
    InstructionAccessFault,
    /// Generic exception used to communicate one of many possible scenarios:
    ///
    /// - (*UNSPECIFIED*) Attempt to decode a reserved instruction.
    /// - Attempt to access a non-existent CSR.
    /// - Attempt to access a CSR without the appropriate privilege level.
    /// - Attempt to write to a read-only CSR.
    /// - Attempt to use a privileged instruction from a lower privilege level.
    IllegalInstruction,
    Breakpoint,
    LoadAddressMisaligned,
    LoadAccessFault,
    StoreOrAmoAddressMisaligned,
    StoreOrAmoAccessFault,
    EnvironmentCallFromUMode,
    EnvironmentCallFromSMode,
    EnvironmentCallFromMMode,
    InstructionPageFault,
    LoadPageFault,
    StoreOrAmoPageFault,
}

impl Exception {
    /// Returns the exception code (cause) for this exception.
    pub const fn code(self) -> u32 {
        match self {
            Self::InstructionAddressMisaligned => 0,
            Self::InstructionAccessFault => 1,
            Self::IllegalInstruction => 2,
            Self::Breakpoint => 3,
            Self::LoadAddressMisaligned => 4,
            Self::LoadAccessFault => 5,
            Self::StoreOrAmoAddressMisaligned => 6,
            Self::StoreOrAmoAccessFault => 7,
            Self::EnvironmentCallFromUMode => 8,
            Self::EnvironmentCallFromSMode => 9,
            Self::EnvironmentCallFromMMode => 11,
            Self::InstructionPageFault => 12,
            Self::LoadPageFault => 13,
            Self::StoreOrAmoPageFault => 15,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Interrupt {
    SupervisorSoftwareInterrupt = 1,
    MachineSoftwareInterrupt = 3,
    SupervisorTimerInterrupt = 5,
    MachineTimerInterrupt = 7,
    SupervisorExternalInterrupt = 9,
    MachineExternalInterrupt = 11,
}

impl Interrupt {
    /// Returns the exception code (cause) for this interrupt, without the interrupt bit.
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// The cause of a trap: either a synchronous exception or an interrupt.
///
/// Flattens into the mcause/scause encoding via [`cause`](Self::cause), which sets the high
/// [`INTERRUPT_BIT`] for interrupts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TrapCause {
    Exception(Exception),
    Interrupt(Interrupt),
}

impl TrapCause {
    pub fn is_interrupt(self) -> bool {
        matches!(self, Self::Interrupt(_))
    }

    /// The cause code without the interrupt bit.
    pub fn code(self) -> u32 {
        match self {
            Self::Exception(exception) => exception.code(),
            Self::Interrupt(interrupt) => interrupt.code(),
        }
    }

    /// The full mcause/scause encoding.
    pub fn cause(self) -> u32 {
        match self {
            Self::Exception(exception) => exception.code(),
            Self::Interrupt(interrupt) => interrupt.code() | INTERRUPT_BIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Reservation;
    use crate::icache::DecodedCache;
    use crate::physmem::PhysicalMemory;

    // nop (addi x0, x0, 0)
    const NOP: u32 = 0x0000_0013;
    // add x1, x2, x3
    const ADD_X1_X2_X3: u32 = 0x003100B3;
    // lr.w x2, (x3)
    const LR_W: u32 = 0x1001A12F;
    // sc.w x2, x4, (x3)
    const SC_W: u32 = 0x1841A12F;
    // sw x4, 0(x3)
    const SW_X4_X3: u32 = 0x0041A023;

    struct Fixture {
        mem: PhysicalMemory,
        icache: DecodedCache,
        reservations: Vec<Reservation>,
        cpu: Cpu,
    }

    macro_rules! bus {
        ($f:expr) => {
            Bus {
                mem: &mut $f.mem,
                icache: &mut $f.icache,
                reservations: &mut $f.reservations,
            }
        };
    }

    impl Fixture {
        fn new() -> Self {
            let mut mem = PhysicalMemory::new();
            mem.attach_ram(0x0, 0x10000).unwrap();
            Self {
                mem,
                icache: DecodedCache::new(),
                reservations: vec![Reservation::new()],
                cpu: Cpu::new(Config {
                    hart_id: 0,
                    reset_vector: 0x1000,
                }),
            }
        }

        fn store_program(&mut self, base: u64, words: &[u32]) {
            for (i, word) in words.iter().enumerate() {
                self.mem.write32(0, base + i as u64 * 4, *word, true);
            }
        }

        fn step(&mut self) {
            let mut bus = bus!(self);
            self.cpu.step(&mut bus);
        }

        fn csr(&self, specifier: CsrSpecifier) -> u32 {
            self.cpu.read_csr(specifier, PrivilegeLevel::Machine).unwrap()
        }

        fn write_csr(&mut self, specifier: CsrSpecifier, value: u32) {
            self.cpu
                .write_csr(specifier, PrivilegeLevel::Machine, value, !0)
                .unwrap();
        }
    }

    #[test]
    fn test_add_scenario() {
        let mut f = Fixture::new();
        f.store_program(0x1000, &[ADD_X1_X2_X3]);
        f.cpu.registers_mut().set_x(crate::registers::Specifier::new(2u8).unwrap(), 7);
        f.cpu.registers_mut().set_x(crate::registers::Specifier::new(3u8).unwrap(), 5);

        f.step();

        assert_eq!(12, f.cpu.registers().x(crate::registers::Specifier::new(1u8).unwrap()));
        assert_eq!(0x1004, f.cpu.registers().pc());
        assert_eq!(0x1008, f.cpu.registers().pc_next());
    }

    #[test]
    fn test_illegal_instruction_scenario() {
        let mut f = Fixture::new();
        f.cpu.set_pc(0x2000);
        f.write_csr(csr::MTVEC, 0x100);
        // The zero word does not decode.
        f.store_program(0x2000, &[0x0000_0000]);

        f.step();

        assert_eq!(2, f.csr(csr::MCAUSE));
        assert_eq!(0x2000, f.csr(csr::MEPC));
        assert_eq!(0x0000_0000, f.csr(csr::MTVAL));
        assert_eq!(0x100, f.cpu.registers().pc());
        assert_eq!(PrivilegeLevel::Machine, f.cpu.privilege_mode());
        assert_eq!(PrivilegeLevel::Machine, f.cpu.status().mpp());
    }

    #[test]
    fn test_illegal_instruction_latches_raw_word() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x100);
        // An unsupported (floating-point load) encoding.
        f.store_program(0x1000, &[0x0000_2007]);

        f.step();

        assert_eq!(2, f.csr(csr::MCAUSE));
        assert_eq!(0x0000_2007, f.csr(csr::MTVAL));
    }

    #[test]
    fn test_ecall_delegated_to_supervisor() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x400);
        f.write_csr(csr::STVEC, 0x800);
        f.write_csr(csr::MEDELEG, 1 << 8);
        f.cpu.set_privilege_mode(PrivilegeLevel::User);
        f.store_program(0x1000, &[0x0000_0073]); // ecall

        f.step();

        assert_eq!(PrivilegeLevel::Supervisor, f.cpu.privilege_mode());
        assert_eq!(8, f.csr(csr::SCAUSE));
        assert_eq!(0x1000, f.csr(csr::SEPC));
        assert_eq!(0x800, f.cpu.registers().pc());
        assert_eq!(PrivilegeLevel::User, f.cpu.status().spp());
    }

    #[test]
    fn test_ecall_from_machine_not_delegated() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x400);
        f.write_csr(csr::STVEC, 0x800);
        f.write_csr(csr::MEDELEG, 1 << 11);
        f.store_program(0x1000, &[0x0000_0073]); // ecall

        f.step();

        // Delegation never applies to traps raised in M-mode.
        assert_eq!(PrivilegeLevel::Machine, f.cpu.privilege_mode());
        assert_eq!(11, f.csr(csr::MCAUSE));
        assert_eq!(0x400, f.cpu.registers().pc());
    }

    #[test]
    fn test_load_page_fault_reports_faulting_address() {
        let mut f = Fixture::new();
        f.write_csr(csr::STVEC, 0x2000);
        f.write_csr(csr::MEDELEG, 1 << 13);
        f.write_csr(csr::SATP, 0x8000_0000 | 0x4); // root table in page 4
        // Identity megapage over the first 4 MiB, supervisor-only, all permissions.
        f.mem.write32(0, 0x4000, 0b1111, true); // ppn 0, V|R|W|X
        // vpn1 == 1 descends to a second-level table at 0x5000 holding one user page.
        f.mem.write32(0, 0x4004, (0x5 << 10) | 0b1, true);
        f.mem.write32(0, 0x5000, (0x7 << 10) | 0b1_0011, true); // V|R|U
        f.cpu.set_privilege_mode(PrivilegeLevel::Supervisor);
        let x = |n: u8| crate::registers::Specifier::new(n).unwrap();
        f.cpu.registers_mut().set_x(x(6), 0x0040_0000);
        f.store_program(0x1000, &[0x00032283]); // lw x5, 0(x6)

        f.step();

        // SUM is clear, so the supervisor load from the user page faults; the faulting virtual
        // address lands in stval via the delegation path.
        assert_eq!(PrivilegeLevel::Supervisor, f.cpu.privilege_mode());
        assert_eq!(13, f.csr(csr::SCAUSE));
        assert_eq!(0x0040_0000, f.csr(csr::STVAL));
        assert_eq!(0x1000, f.csr(csr::SEPC));
        assert_eq!(0x2000, f.cpu.registers().pc());
    }

    #[test]
    fn test_lr_sc_interrupted_by_store() {
        let mut f = Fixture::new();
        let x = |n: u8| crate::registers::Specifier::new(n).unwrap();
        f.cpu.registers_mut().set_x(x(3), 0x40);
        f.cpu.registers_mut().set_x(x(4), 0xAB);
        f.store_program(0x1000, &[LR_W, SW_X4_X3, SC_W]);
        f.mem.write32(0, 0x40, 0x11, true);

        f.step(); // lr.w
        assert_eq!(0x11, f.cpu.registers().x(x(2)));
        assert!(f.reservations[0].covers(0x40));

        f.step(); // sw hits the reserved word
        assert!(!f.reservations[0].covers(0x40));

        f.step(); // sc.w fails
        assert_eq!(1, f.cpu.registers().x(x(2)));
        assert_eq!(0xAB, f.mem.read32(0, 0x40, true));
    }

    #[test]
    fn test_lr_sc_success() {
        let mut f = Fixture::new();
        let x = |n: u8| crate::registers::Specifier::new(n).unwrap();
        f.cpu.registers_mut().set_x(x(3), 0x40);
        f.cpu.registers_mut().set_x(x(4), 0xAB);
        f.store_program(0x1000, &[LR_W, SC_W]);

        f.step(); // lr.w
        f.step(); // sc.w succeeds

        assert_eq!(0, f.cpu.registers().x(x(2)));
        assert_eq!(0xAB, f.mem.read32(0, 0x40, true));
        // The reservation is consumed by the sc.
        assert!(!f.reservations[0].covers(0x40));
    }

    #[test]
    fn test_machine_timer_interrupt() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x100);
        f.write_csr(csr::MIE, 1 << 7); // MTIE
        f.write_csr(csr::MSTATUS, 1 << 3); // MIE
        f.cpu.counters_mut().set_mtime(100);
        f.cpu.counters_mut().set_mtimecmp(50);
        f.store_program(0x1000, &[NOP]);

        f.step();

        assert_eq!(INTERRUPT_BIT | 7, f.csr(csr::MCAUSE));
        // For interrupts the resumption point is the next instruction.
        assert_eq!(0x1004, f.csr(csr::MEPC));
        assert_eq!(0x100, f.cpu.registers().pc());
        assert!(!f.cpu.status().flag(StatusFlag::Mie));
        assert!(f.cpu.status().flag(StatusFlag::Mpie));
    }

    #[test]
    fn test_supervisor_cycle_compare_interrupt() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x100);
        f.write_csr(csr::MIE, 1 << 5); // STIE
        f.write_csr(csr::MSTATUS, 1 << 3); // MIE
        // scyclecmp defaults to 0, so STIP raises on the first step.
        f.store_program(0x1000, &[NOP]);

        f.step();

        assert_eq!(INTERRUPT_BIT | 5, f.csr(csr::MCAUSE));
    }

    #[test]
    fn test_stip_clears_when_compare_moves_away() {
        let mut f = Fixture::new();
        f.store_program(0x1000, &[NOP, NOP]);
        f.step();
        assert_ne!(0, f.csr(csr::MIP) & (1 << 5));

        f.write_csr(csr::SCYCLECMP, 1_000_000);
        f.step();
        assert_eq!(0, f.csr(csr::MIP) & (1 << 5));
    }

    #[test]
    fn test_vectored_interrupt_entry() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x100 | 0b01); // vectored
        f.write_csr(csr::MIE, 1 << 7);
        f.write_csr(csr::MSTATUS, 1 << 3);
        f.cpu.counters_mut().set_mtime(100);
        f.cpu.counters_mut().set_mtimecmp(50);
        f.store_program(0x1000, &[NOP]);

        f.step();

        assert_eq!(0x100 + 4 * 7, f.cpu.registers().pc());
    }

    #[test]
    fn test_interrupt_not_taken_with_mie_clear() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x100);
        f.write_csr(csr::MIE, 1 << 7);
        f.cpu.counters_mut().set_mtime(100);
        f.cpu.counters_mut().set_mtimecmp(50);
        f.store_program(0x1000, &[NOP]);

        f.step();

        // Pending but masked: MIE is clear and we are in M-mode.
        assert_ne!(0, f.csr(csr::MIP) & (1 << 7));
        assert_eq!(0x1004, f.cpu.registers().pc());
    }

    #[test]
    fn test_delegated_interrupt_takes_s_trap() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x100);
        f.write_csr(csr::STVEC, 0x200);
        f.write_csr(csr::MIDELEG, 1 << 9); // delegate SEI
        f.write_csr(csr::MIE, 1 << 9);
        f.cpu.set_privilege_mode(PrivilegeLevel::User);
        f.cpu.interrupt_up(9);
        f.store_program(0x1000, &[NOP]);

        f.step();

        assert_eq!(PrivilegeLevel::Supervisor, f.cpu.privilege_mode());
        assert_eq!(INTERRUPT_BIT | 9, f.csr(csr::SCAUSE));
        assert_eq!(0x200, f.cpu.registers().pc());
    }

    #[test]
    fn test_wfi_standby_and_wakeup() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x100);
        f.write_csr(csr::MIE, 1 << 11); // MEIE
        f.write_csr(csr::MSTATUS, 1 << 3);
        f.store_program(0x1000, &[0x1050_0073]); // wfi

        f.step();
        assert!(f.cpu.stdby());
        assert_eq!(0x1000, f.cpu.registers().pc());

        // Ticks in standby leave the pc pair alone and retire nothing.
        let instret_before = f.cpu.counters().instret();
        f.step();
        assert!(f.cpu.stdby());
        assert_eq!(0x1000, f.cpu.registers().pc());
        assert_eq!(instret_before, f.cpu.counters().instret());

        f.cpu.interrupt_up(11);
        f.step();
        assert!(!f.cpu.stdby());
        assert_eq!(INTERRUPT_BIT | 11, f.csr(csr::MCAUSE));
        // Resumes after the wfi once the handler returns.
        assert_eq!(0x1004, f.csr(csr::MEPC));
        assert_eq!(0x100, f.cpu.registers().pc());
    }

    #[test]
    fn test_mret_returns_and_restores_state() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x2000);
        f.store_program(0x1000, &[0x0000_0073]); // ecall
        f.store_program(0x2000, &[0x3020_0073]); // mret

        f.step();
        assert_eq!(PrivilegeLevel::Machine, f.cpu.privilege_mode());
        assert_eq!(11, f.csr(csr::MCAUSE));

        f.step();
        // mepc pointed at the ecall itself, so it re-executes next.
        assert_eq!(0x1000, f.cpu.registers().pc());
        assert_eq!(PrivilegeLevel::Machine, f.cpu.privilege_mode());
        assert!(f.cpu.status().flag(StatusFlag::Mpie));
    }

    #[test]
    fn test_interrupt_code_coercion() {
        let mut f = Fixture::new();
        // Code 5 (STI) is not raisable externally; it coerces to MEI.
        f.cpu.interrupt_up(5);
        assert_ne!(0, f.csr(csr::MIP) & (1 << 11));
        f.cpu.interrupt_down(5);
        assert_eq!(0, f.csr(csr::MIP) & (1 << 11));
    }

    #[test]
    fn test_external_seip_or_with_software_copy() {
        let mut f = Fixture::new();
        f.cpu.interrupt_up(9);
        assert_ne!(0, f.csr(csr::MIP) & (1 << 9));
        // M-mode clearing the software copy does not mask the external line.
        f.write_csr(csr::MIP, 0);
        assert_ne!(0, f.csr(csr::MIP) & (1 << 9));
        f.cpu.interrupt_down(9);
        assert_eq!(0, f.csr(csr::MIP) & (1 << 9));
    }

    #[test]
    fn test_x0_stays_zero() {
        let mut f = Fixture::new();
        // addi x0, x0, 7
        f.store_program(0x1000, &[0x0070_0013]);
        f.step();
        assert_eq!(0, f.cpu.registers().x(crate::registers::Specifier::X0));
    }

    #[test]
    fn test_instret_and_cycle_advance() {
        let mut f = Fixture::new();
        f.store_program(0x1000, &[NOP, NOP]);
        f.step();
        f.step();
        assert_eq!(2, f.cpu.counters().cycle());
        assert_eq!(2, f.cpu.counters().instret());
    }

    #[test]
    fn test_exception_suppresses_instret() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x100);
        f.store_program(0x1000, &[0x0000_0000]);
        f.step();
        assert_eq!(1, f.cpu.counters().cycle());
        assert_eq!(0, f.cpu.counters().instret());
    }

    #[test]
    fn test_branch_redirects_pc() {
        let mut f = Fixture::new();
        let x = |n: u8| crate::registers::Specifier::new(n).unwrap();
        f.cpu.registers_mut().set_x(x(1), 5);
        f.cpu.registers_mut().set_x(x(2), 5);
        // beq x1, x2, +8
        f.store_program(0x1000, &[0x0020_8463]);
        f.step();
        assert_eq!(0x1008, f.cpu.registers().pc());
        assert_eq!(0x100C, f.cpu.registers().pc_next());
    }

    #[test]
    fn test_set_pc_requires_alignment() {
        let mut f = Fixture::new();
        f.cpu.set_pc(0x2002);
        assert_eq!(0x1000, f.cpu.registers().pc());
        f.cpu.set_pc(0x2000);
        assert_eq!(0x2000, f.cpu.registers().pc());
        assert_eq!(0x2004, f.cpu.registers().pc_next());
    }

    #[test]
    fn test_misaligned_jalr_target_faults() {
        let mut f = Fixture::new();
        f.write_csr(csr::MTVEC, 0x100);
        let x = |n: u8| crate::registers::Specifier::new(n).unwrap();
        f.cpu.registers_mut().set_x(x(1), 0x2006);
        // jalr x0, 0(x1): bit 0 is cleared by the instruction, bit 1 faults.
        f.store_program(0x1000, &[0x0000_8067]);
        f.step();
        assert_eq!(0, f.csr(csr::MCAUSE));
        assert_eq!(0x2006, f.csr(csr::MTVAL));
        assert_eq!(0x100, f.cpu.registers().pc());
    }

    #[test]
    fn test_self_modifying_code_is_observed() {
        let mut f = Fixture::new();
        let x = |n: u8| crate::registers::Specifier::new(n).unwrap();
        // Execute a nop at 0x1000 first so the frame is cached.
        f.store_program(0x1000, &[NOP, NOP]);
        f.step();

        // Overwrite the next slot with add x1, x2, x3 and run it.
        f.cpu.registers_mut().set_x(x(2), 30);
        f.cpu.registers_mut().set_x(x(3), 12);
        f.store_program(0x1004, &[ADD_X1_X2_X3]);
        f.step();
        assert_eq!(42, f.cpu.registers().x(x(1)));
    }
}
