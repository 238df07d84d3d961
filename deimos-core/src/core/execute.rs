//! Executors for every supported instruction.
//!
//! Executors operate on the pc/pc_next pair: the step engine has already set `pc_next` to the
//! following word, so straight-line instructions leave it alone and control-transfer instructions
//! overwrite it. The engine promotes `pc_next` into `pc` after the step.

use super::csr::CsrSpecifier;
use super::mmu::AccessIntent;
use super::{Cpu, Exception, ExecutionResult, StatusFlag};
use crate::bus::Bus;
use crate::instruction::{CsrOp, FenceOrderCombination};
use crate::registers::Specifier;
use crate::{Alignment, PrivilegeLevel, RawPrivilegeLevel};

#[derive(Debug)]
pub(super) struct Executor<'c, 'b, 'a> {
    pub cpu: &'c mut Cpu,
    pub bus: &'b mut Bus<'a>,
}

impl Executor<'_, '_, '_> {
    /// Executes an `addi` instruction.
    ///
    /// > ADDI adds the sign-extended 12-bit immediate to register rs1. Arithmetic overflow is
    /// > ignored and the result is simply the low XLEN bits of the result. ADDI rd, rs1, 0 is used
    /// > to implement the MV rd, rs1 assembler pseudoinstruction.
    pub fn addi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s.wrapping_add_signed(imm))
    }

    /// Executes a `slti` instruction.
    ///
    /// > SLTI (set less than immediate) places the value 1 in register rd if register rs1 is less
    /// > than the sign-extended immediate when both are treated as signed numbers, else 0 is
    /// > written to rd.
    pub fn slti(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| ((s as i32) < imm) as u32)
    }

    /// Executes a `sltiu` instruction (unsigned compare against the sign-extended immediate).
    pub fn sltiu(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| (s < (imm as u32)) as u32)
    }

    pub fn andi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s & (imm as u32))
    }

    pub fn ori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s | (imm as u32))
    }

    pub fn xori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s ^ (imm as u32))
    }

    pub fn slli(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| s << shamt)
    }

    pub fn srli(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| s >> shamt)
    }

    pub fn srai(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| {
            ((s as i32) >> shamt) as u32
        })
    }

    /// Executes a `lui` instruction.
    ///
    /// > LUI (load upper immediate) is used to build 32-bit constants and uses the U-type format.
    /// > LUI places the U-immediate value in the top 20 bits of the destination register rd,
    /// > filling in the lowest 12 bits with zeros.
    pub fn lui(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        let result = immediate as u32 & !0xFFF;
        self.cpu.registers.set_x(dest, result);
        Ok(())
    }

    /// Executes an `auipc` instruction.
    ///
    /// > AUIPC (add upper immediate to pc) is used to build pc-relative addresses and uses the
    /// > U-type format. AUIPC forms a 32-bit offset from the 20-bit U-immediate, filling in the
    /// > lowest 12 bits with zeros, adds this offset to the address of the AUIPC instruction, then
    /// > places the result in register rd.
    pub fn auipc(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        let registers = &mut self.cpu.registers;
        let result = registers.pc().wrapping_add_signed(immediate & !0xFFF);
        registers.set_x(dest, result);
        Ok(())
    }

    pub fn add(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_add(s2))
    }

    pub fn sub(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_sub(s2))
    }

    pub fn slt(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32) < (s2 as i32)) as u32
        })
    }

    pub fn sltu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| (s1 < s2) as u32)
    }

    pub fn and(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 & s2)
    }

    pub fn or(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 | s2)
    }

    pub fn xor(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 ^ s2)
    }

    pub fn sll(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 << (s2 & 0x1F))
    }

    pub fn srl(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 >> (s2 & 0x1F))
    }

    pub fn sra(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32) >> (s2 & 0x1F)) as u32
        })
    }

    /// Executes a `mul` instruction.
    ///
    /// > MUL performs an XLEN-bit × XLEN-bit multiplication of rs1 by rs2 and places the lower
    /// > XLEN bits in the destination register.
    pub fn mul(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_mul(s2))
    }

    /// Executes a `mulh` instruction (high half of signed × signed).
    pub fn mulh(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32 as i64).wrapping_mul(s2 as i32 as i64) >> 32) as u32
        })
    }

    /// Executes a `mulhsu` instruction (high half of signed × unsigned).
    pub fn mulhsu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32 as i64).wrapping_mul(s2 as i64) >> 32) as u32
        })
    }

    /// Executes a `mulhu` instruction (high half of unsigned × unsigned).
    pub fn mulhu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as u64 * s2 as u64) >> 32) as u32
        })
    }

    /// Executes a `div` instruction.
    ///
    /// > The quotient of division by zero has all bits set. [...] Signed division overflow occurs
    /// > only when the most-negative integer is divided by −1; the quotient then equals the
    /// > dividend.
    pub fn div(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            let (a, b) = (s1 as i32, s2 as i32);
            if b == 0 {
                u32::MAX
            } else {
                a.wrapping_div(b) as u32
            }
        })
    }

    pub fn divu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            if s2 == 0 {
                u32::MAX
            } else {
                s1 / s2
            }
        })
    }

    /// Executes a `rem` instruction.
    ///
    /// > The remainder of division by zero equals the dividend. [...] On signed division
    /// > overflow, the remainder is zero.
    pub fn rem(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            let (a, b) = (s1 as i32, s2 as i32);
            if b == 0 {
                a as u32
            } else {
                a.wrapping_rem(b) as u32
            }
        })
    }

    pub fn remu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            if s2 == 0 {
                s1
            } else {
                s1 % s2
            }
        })
    }

    pub fn jal(&mut self, dest: Specifier, offset: i32) -> ExecutionResult {
        let target = self.cpu.registers.pc().wrapping_add_signed(offset);
        self.jump_op(dest, target)
    }

    pub fn jalr(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let target = self.cpu.registers.x(base).wrapping_add_signed(offset) & !1;
        self.jump_op(dest, target)
    }

    pub fn beq(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 == s2)
    }

    pub fn bne(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 != s2)
    }

    pub fn blt(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| (s1 as i32) < (s2 as i32))
    }

    pub fn bltu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 < s2)
    }

    pub fn bge(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| (s1 as i32) >= (s2 as i32))
    }

    pub fn bgeu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 >= s2)
    }

    pub fn lb(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let address = self.address(base, offset);
        let value = self.cpu.read_mem8(self.bus, address, true)?;
        self.cpu.registers.set_x(dest, value as i8 as u32);
        Ok(())
    }

    pub fn lbu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let address = self.address(base, offset);
        let value = self.cpu.read_mem8(self.bus, address, true)?;
        self.cpu.registers.set_x(dest, value as u32);
        Ok(())
    }

    pub fn lh(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let address = self.address(base, offset);
        let value = self.cpu.read_mem16(self.bus, address, false, true)?;
        self.cpu.registers.set_x(dest, value as i16 as u32);
        Ok(())
    }

    pub fn lhu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let address = self.address(base, offset);
        let value = self.cpu.read_mem16(self.bus, address, false, true)?;
        self.cpu.registers.set_x(dest, value as u32);
        Ok(())
    }

    pub fn lw(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let address = self.address(base, offset);
        let value = self.cpu.read_mem32(self.bus, address, false, true)?;
        self.cpu.registers.set_x(dest, value);
        Ok(())
    }

    pub fn sb(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let address = self.address(base, offset);
        let value = self.cpu.registers.x(src) as u8;
        self.cpu.write_mem8(self.bus, address, value, true)
    }

    pub fn sh(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let address = self.address(base, offset);
        let value = self.cpu.registers.x(src) as u16;
        self.cpu.write_mem16(self.bus, address, value, true)
    }

    pub fn sw(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let address = self.address(base, offset);
        let value = self.cpu.registers.x(src);
        self.cpu.write_mem32(self.bus, address, value, true)
    }

    /// Executes an `lr.w` instruction.
    ///
    /// > LR.W loads a word from the address in rs1, places the sign-extended value in rd, and
    /// > registers a reservation set [...] that subsumes the bytes of the word addressed.
    pub fn lr_w(&mut self, dest: Specifier, addr: Specifier) -> ExecutionResult {
        let address = self.cpu.registers.x(addr);
        if !Alignment::WORD.is_aligned(address) {
            self.cpu.trap.set_tval_next(address);
            return Err(Exception::LoadAddressMisaligned);
        }
        let phys = self
            .cpu
            .translate(self.bus, address, AccessIntent::Read, true)
            .map_err(|ex| {
                self.cpu.trap.set_tval_next(address);
                ex
            })?;
        let value = self.bus.mem.read32(self.cpu.config.hart_id, phys, true);
        self.cpu.registers.set_x(dest, value);
        self.bus.reservations[self.cpu.config.hart_id as usize].set(phys);
        Ok(())
    }

    /// Executes an `sc.w` instruction.
    ///
    /// > SC.W conditionally writes a word in rs2 to the address in rs1: the SC.W succeeds only if
    /// > the reservation is still valid and the reservation set contains the bytes being written.
    /// > If the SC.W succeeds [...] rd is set to zero. Otherwise [...] rd is set to a nonzero
    /// > value. [...] Regardless of success or failure, executing an SC.W instruction
    /// > invalidates any reservation held by this hart.
    pub fn sc_w(&mut self, dest: Specifier, addr: Specifier, src: Specifier) -> ExecutionResult {
        let address = self.cpu.registers.x(addr);
        if !Alignment::WORD.is_aligned(address) {
            self.cpu.trap.set_tval_next(address);
            return Err(Exception::StoreOrAmoAddressMisaligned);
        }
        let phys = self
            .cpu
            .translate(self.bus, address, AccessIntent::Write, true)
            .map_err(|ex| {
                self.cpu.trap.set_tval_next(address);
                ex
            })?;
        let hart = self.cpu.config.hart_id;
        let succeeded = self.bus.reservations[hart as usize].covers(phys);
        if succeeded {
            let value = self.cpu.registers.x(src);
            self.bus.write32(hart, phys, value, true);
        }
        self.bus.reservations[hart as usize].clear();
        self.cpu.registers.set_x(dest, !succeeded as u32);
        Ok(())
    }

    /// Executes an AMO read-modify-write instruction.
    ///
    /// > AMOs atomically load a data value from the address in rs1, place the value into register
    /// > rd, apply a binary operator to the loaded value and the original value in rs2, then
    /// > store the result back to the original address in rs1.
    pub fn amo_op<F>(
        &mut self,
        dest: Specifier,
        addr: Specifier,
        src: Specifier,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        let address = self.cpu.registers.x(addr);
        if !Alignment::WORD.is_aligned(address) {
            self.cpu.trap.set_tval_next(address);
            return Err(Exception::StoreOrAmoAddressMisaligned);
        }
        let phys = self
            .cpu
            .translate(self.bus, address, AccessIntent::Write, true)
            .map_err(|ex| {
                self.cpu.trap.set_tval_next(address);
                ex
            })?;
        let hart = self.cpu.config.hart_id;
        let old = self.bus.mem.read32(hart, phys, true);
        let new = op(old, self.cpu.registers.x(src));
        self.bus.write32(hart, phys, new, true);
        self.cpu.registers.set_x(dest, old);
        Ok(())
    }

    pub fn fence(
        &mut self,
        predecessor: FenceOrderCombination,
        successor: FenceOrderCombination,
    ) -> ExecutionResult {
        // All memory accesses complete within their step, so this is a nop.
        let _ = predecessor;
        let _ = successor;
        Ok(())
    }

    pub fn fence_i(&mut self) -> ExecutionResult {
        // Stores already invalidate the affected frames of the decoded-instruction cache, so
        // instruction fetches always observe preceding stores.
        Ok(())
    }

    /// Executes an `ecall` instruction. The exception code encodes the calling privilege level.
    pub fn ecall(&mut self) -> ExecutionResult {
        Err(match self.cpu.privilege_mode {
            PrivilegeLevel::User => Exception::EnvironmentCallFromUMode,
            PrivilegeLevel::Supervisor => Exception::EnvironmentCallFromSMode,
            PrivilegeLevel::Machine => Exception::EnvironmentCallFromMMode,
        })
    }

    /// Executes an `ebreak` instruction. The breakpoint address (the pc itself) becomes the trap
    /// value.
    pub fn ebreak(&mut self) -> ExecutionResult {
        self.cpu.trap.set_tval_next(self.cpu.registers.pc());
        Err(Exception::Breakpoint)
    }

    /// Executes an `mret` instruction.
    ///
    /// > An MRET or SRET instruction is used to return from a trap in M-mode or S-mode
    /// > respectively. When executing an xRET instruction, supposing xPP holds the value y, xIE
    /// > is set to xPIE; the privilege mode is changed to y; xPIE is set to 1; and xPP is set to
    /// > the least-privileged supported mode (U if U-mode is implemented, else M). If y≠M, xRET
    /// > also sets MPRV=0.
    pub fn mret(&mut self) -> ExecutionResult {
        if self.cpu.privilege_mode != PrivilegeLevel::Machine {
            return Err(Exception::IllegalInstruction);
        }
        let status = &mut self.cpu.status;
        let previous = status.mpp();
        status.set_flag(StatusFlag::Mie, status.flag(StatusFlag::Mpie));
        status.set_flag(StatusFlag::Mpie, true);
        status.set_mpp(RawPrivilegeLevel::User);
        if previous != PrivilegeLevel::Machine {
            status.set_flag(StatusFlag::Mprv, false);
        }
        self.cpu.privilege_mode = previous;
        self.cpu.registers.set_pc_next(self.cpu.trap.read_mepc());
        Ok(())
    }

    /// Executes an `sret` instruction. See [`mret`](Self::mret).
    pub fn sret(&mut self) -> ExecutionResult {
        if self.cpu.privilege_mode < PrivilegeLevel::Supervisor {
            return Err(Exception::IllegalInstruction);
        }
        let status = &mut self.cpu.status;
        let previous = status.spp();
        status.set_flag(StatusFlag::Sie, status.flag(StatusFlag::Spie));
        status.set_flag(StatusFlag::Spie, true);
        status.set_spp(RawPrivilegeLevel::User);
        // SPP can only name U or S, so leaving through sret always clears MPRV.
        status.set_flag(StatusFlag::Mprv, false);
        self.cpu.privilege_mode = previous;
        self.cpu.registers.set_pc_next(self.cpu.trap.read_sepc());
        Ok(())
    }

    /// Executes a `wfi` instruction: the hart enters standby until the next taken trap.
    pub fn wfi(&mut self) -> ExecutionResult {
        self.cpu.stdby = true;
        Ok(())
    }

    /// Executes an `sfence.vma` instruction.
    ///
    /// There is no TLB; every access re-walks the page tables, so the fence has nothing to
    /// flush. The privilege check still applies.
    pub fn sfence_vma(&mut self, vaddr: Specifier, asid: Specifier) -> ExecutionResult {
        if self.cpu.privilege_mode < PrivilegeLevel::Supervisor {
            return Err(Exception::IllegalInstruction);
        }
        let _ = vaddr;
        let _ = asid;
        Ok(())
    }

    /// Executes a `csrrw`/`csrrs`/`csrrc` instruction.
    ///
    /// > The CSRRW (Atomic Read/Write CSR) instruction atomically swaps values in the CSRs and
    /// > integer registers. [...] If rd=x0, then the instruction shall not read the CSR and shall
    /// > not cause any of the side effects that might occur on a CSR read.
    ///
    /// > For both CSRRS and CSRRC, if rs1=x0, then the instruction will not write to the CSR at
    /// > all, and so shall not cause any of the side effects that might otherwise occur on a CSR
    /// > write.
    pub fn csr_reg_op(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        src: Specifier,
    ) -> ExecutionResult {
        let src_value = (op == CsrOp::ReadWrite || src != Specifier::X0)
            .then(|| self.cpu.registers.x(src));
        self.csr_op(op, dest, csr, src_value)
    }

    /// Executes a `csrrwi`/`csrrsi`/`csrrci` instruction.
    ///
    /// > The CSRRWI, CSRRSI, and CSRRCI variants are similar to CSRRW, CSRRS, and CSRRC
    /// > respectively, except they update the CSR using an XLEN-bit value obtained by
    /// > zero-extending a 5-bit unsigned immediate (uimm[4:0]) field encoded in the rs1 field
    /// > instead of a value from an integer register.
    pub fn csr_imm_op(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        immediate: u32,
    ) -> ExecutionResult {
        let src_value = (op == CsrOp::ReadWrite || immediate != 0).then_some(immediate);
        self.csr_op(op, dest, csr, src_value)
    }

    fn csr_op(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        src_value: Option<u32>,
    ) -> ExecutionResult {
        // Read and store the current privilege level, since the CSR write may change it as a
        // side effect. This CSR operation should be atomic, so both the read and the write are
        // performed at the same, original privilege level.
        let privilege_level = self.cpu.privilege_mode;
        if op != CsrOp::ReadWrite || dest != Specifier::X0 {
            let old_value = self
                .cpu
                .read_csr(csr, privilege_level)
                .map_err(|_| Exception::IllegalInstruction)?;
            self.cpu.registers.set_x(dest, old_value);
        }
        if let Some(src_value) = src_value {
            let (value, mask) = match op {
                CsrOp::ReadWrite => (src_value, 0xFFFF_FFFF),
                CsrOp::ReadSet => (0xFFFF_FFFF, src_value),
                CsrOp::ReadClear => (0x0000_0000, src_value),
            };
            self.cpu
                .write_csr(csr, privilege_level, value, mask)
                .map_err(|_| Exception::IllegalInstruction)?;
        }
        Ok(())
    }

    // Private generic implementations

    fn address(&self, base: Specifier, offset: i32) -> u32 {
        self.cpu.registers.x(base).wrapping_add_signed(offset)
    }

    fn reg_imm_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, i32) -> u32,
    {
        let registers = &mut self.cpu.registers;
        registers.set_x(dest, op(registers.x(src), immediate));
        Ok(())
    }

    fn reg_shamt_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        if shift_amount_u5 > 31 {
            panic!("out of range u5 used");
        }
        let registers = &mut self.cpu.registers;
        registers.set_x(dest, op(registers.x(src), shift_amount_u5));
        Ok(())
    }

    fn reg_reg_op<F>(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        let registers = &mut self.cpu.registers;
        registers.set_x(dest, op(registers.x(src1), registers.x(src2)));
        Ok(())
    }

    /// Redirects control to `target`, writing the return address to `dest`.
    fn jump_op(&mut self, dest: Specifier, target: u32) -> ExecutionResult {
        if !Alignment::WORD.is_aligned(target) {
            self.cpu.trap.set_tval_next(target);
            return Err(Exception::InstructionAddressMisaligned);
        }
        let registers = &mut self.cpu.registers;
        let return_address = registers.pc().wrapping_add(4);
        registers.set_pc_next(target);
        registers.set_x(dest, return_address);
        Ok(())
    }

    // Takes the branch if `predicate` returns `true`.
    fn cond_branch<P>(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
        predicate: P,
    ) -> ExecutionResult
    where
        P: FnOnce(u32, u32) -> bool,
    {
        let registers = &mut self.cpu.registers;
        if predicate(registers.x(src1), registers.x(src2)) {
            let target = registers.pc().wrapping_add_signed(offset);
            if !Alignment::WORD.is_aligned(target) {
                self.cpu.trap.set_tval_next(target);
                return Err(Exception::InstructionAddressMisaligned);
            }
            registers.set_pc_next(target);
        }
        Ok(())
    }
}
