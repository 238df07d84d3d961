//! Specifiers for the supported CSRs, and the CSR read/write dispatch.
//!
//! Debug-mode CSRs, the hypervisor extension, and the PMP registers are not supported; accessing
//! them (or any other unimplemented specifier) reports [`CsrAccessError::CsrUnsupported`], which
//! the executors turn into an illegal-instruction exception.

use thiserror::Error;

use super::counters::HPM_COUNTERS;
use super::status::SSTATUS_MASK;
use super::Cpu;
use crate::{PrivilegeLevel, RawPrivilegeLevel};

/// General 12-bit value representing a CSR specifier. Note that this can hold any 12-bit value,
/// even if the value represents an unsupported or non-existent CSR.
pub type CsrSpecifier = u16;

//
// Unprivileged counters/timers (`0xC00..=0xC1F`, `0xC80..=0xC9F`).
//
/// Cycle counter for RDCYCLE instruction.
pub const CYCLE: CsrSpecifier = 0xC00;
/// Timer for RDTIME instruction.
pub const TIME: CsrSpecifier = 0xC01;
/// Instructions-retired counter for RDINSTRET instruction.
pub const INSTRET: CsrSpecifier = 0xC02;
/// First performance-monitoring counter.
pub const HPMCOUNTER3: CsrSpecifier = 0xC03;
/// Last performance-monitoring counter.
pub const HPMCOUNTER31: CsrSpecifier = 0xC1F;
/// Upper 32 bits of [`CYCLE`], RV32 only.
pub const CYCLEH: CsrSpecifier = 0xC80;
/// Upper 32 bits of [`TIME`], RV32 only.
pub const TIMEH: CsrSpecifier = 0xC81;
/// Upper 32 bits of [`INSTRET`], RV32 only.
pub const INSTRETH: CsrSpecifier = 0xC82;
/// Upper 32 bits of [`HPMCOUNTER3`], RV32 only.
pub const HPMCOUNTER3H: CsrSpecifier = 0xC83;
/// Upper 32 bits of [`HPMCOUNTER31`], RV32 only.
pub const HPMCOUNTER31H: CsrSpecifier = 0xC9F;

//
// Supervisor trap setup (`0x100`, `0x104..=0x106`).
//
/// Supervisor status register.
pub const SSTATUS: CsrSpecifier = 0x100;
/// Supervisor interrupt-enable register.
pub const SIE: CsrSpecifier = 0x104;
/// Supervisor trap handler base address.
pub const STVEC: CsrSpecifier = 0x105;
/// Supervisor counter enable.
pub const SCOUNTEREN: CsrSpecifier = 0x106;

//
// Supervisor trap handling (`0x140..=0x144`).
//
/// Scratch register for supervisor trap handling.
pub const SSCRATCH: CsrSpecifier = 0x140;
/// Supervisor exception program counter.
pub const SEPC: CsrSpecifier = 0x141;
/// Supervisor trap cause.
pub const SCAUSE: CsrSpecifier = 0x142;
/// Supervisor bad address or instruction.
pub const STVAL: CsrSpecifier = 0x143;
/// Supervisor interrupt pending.
pub const SIP: CsrSpecifier = 0x144;

//
// Supervisor protection and translation (`0x180`).
//
/// Supervisor address translation and protection.
pub const SATP: CsrSpecifier = 0x180;

//
// Custom supervisor registers (`0x5C0`).
//
/// Supervisor cycle compare: STIP is raised while the low half of the cycle counter is at or
/// beyond this value.
pub const SCYCLECMP: CsrSpecifier = 0x5C0;

//
// Machine information registers (`0xF11..=0xF14`).
//
/// Vendor ID.
pub const MVENDORID: CsrSpecifier = 0xF11;
/// Architecture ID.
pub const MARCHID: CsrSpecifier = 0xF12;
/// Implementation ID.
pub const MIMPID: CsrSpecifier = 0xF13;
/// Hardware thread ID.
pub const MHARTID: CsrSpecifier = 0xF14;

//
// Machine trap setup (`0x300..=0x306`).
//
/// Machine status register.
pub const MSTATUS: CsrSpecifier = 0x300;
/// ISA and extensions.
pub const MISA: CsrSpecifier = 0x301;
/// Machine exception delegation register.
pub const MEDELEG: CsrSpecifier = 0x302;
/// Machine interrupt delegation register.
pub const MIDELEG: CsrSpecifier = 0x303;
/// Machine interrupt-enable register.
pub const MIE: CsrSpecifier = 0x304;
/// Machine trap-handler base address.
pub const MTVEC: CsrSpecifier = 0x305;
/// Machine counter enable.
pub const MCOUNTEREN: CsrSpecifier = 0x306;

//
// Machine trap handling (`0x340..=0x344`).
//
/// Scratch register for machine trap handlers.
pub const MSCRATCH: CsrSpecifier = 0x340;
/// Machine exception program counter.
pub const MEPC: CsrSpecifier = 0x341;
/// Machine trap cause.
pub const MCAUSE: CsrSpecifier = 0x342;
/// Machine bad address or instruction.
pub const MTVAL: CsrSpecifier = 0x343;
/// Machine interrupt pending.
pub const MIP: CsrSpecifier = 0x344;

//
// Machine counters/timers (`0xB00`, `0xB02..=0xB1F`, `0xB80..=0xB9F`).
//
/// Machine cycle counter.
pub const MCYCLE: CsrSpecifier = 0xB00;
/// Machine instructions-retired counter.
pub const MINSTRET: CsrSpecifier = 0xB02;
/// First machine performance-monitoring counter.
pub const MHPMCOUNTER3: CsrSpecifier = 0xB03;
/// Last machine performance-monitoring counter.
pub const MHPMCOUNTER31: CsrSpecifier = 0xB1F;
/// Upper 32 bits of [`MCYCLE`], RV32 only.
pub const MCYCLEH: CsrSpecifier = 0xB80;
/// Upper 32 bits of [`MINSTRET`], RV32 only.
pub const MINSTRETH: CsrSpecifier = 0xB82;
/// Upper 32 bits of [`MHPMCOUNTER3`], RV32 only.
pub const MHPMCOUNTER3H: CsrSpecifier = 0xB83;
/// Upper 32 bits of [`MHPMCOUNTER31`], RV32 only.
pub const MHPMCOUNTER31H: CsrSpecifier = 0xB9F;

//
// Machine counter setup (`0x320`, `0x323..=0x33F`).
//
/// Machine counter-inhibit register.
pub const MCOUNTINHIBIT: CsrSpecifier = 0x320;
/// First machine performance-monitoring event selector.
pub const MHPMEVENT3: CsrSpecifier = 0x323;
/// Last machine performance-monitoring event selector.
pub const MHPMEVENT31: CsrSpecifier = 0x33F;

const_assert_eq!((HPMCOUNTER31 - HPMCOUNTER3) as usize + 1, HPM_COUNTERS);

/// Returns `true` if `specifier` is valid, which is the case if it fits in 12 bits.
pub fn is_valid(specifier: CsrSpecifier) -> bool {
    specifier < 1 << 12
}

/// Returns `true` if this CSR only supports read access.
///
/// Requires [`is_valid(specifier)`](is_valid), otherwise the return value is undefined.
pub fn is_read_only(specifier: CsrSpecifier) -> bool {
    // The top two bits of a CSR specifier indicate whether the CSR is read-only (0b11) or
    // read/write (0b00, 0b01, 0b10)
    specifier >> 10 == 0b11
}

/// Returns the minimum required privilege level to access this CSR.
///
/// Requires [`is_valid(specifier)`](is_valid), otherwise the return value is undefined.
///
/// Note that this returns a [`RawPrivilegeLevel`], meaning the minimum required privilege level
/// may be a reserved level. This still has a defined meaning: only higher privilege levels are
/// allowed to access the CSR.
pub fn required_privilege_level(specifier: CsrSpecifier) -> RawPrivilegeLevel {
    // Bits `9:8` indicate the minimum required privilege level
    RawPrivilegeLevel::from_bits((specifier >> 8) as u8)
}

/// Errors that can occur when attempting to access a CSR.
#[derive(Error, Debug)]
pub enum CsrAccessError {
    #[error("unsupported CSR: {0:#05X}")]
    CsrUnsupported(CsrSpecifier),
    /// Attempt to access a CSR that requires a higher privilege level.
    #[error(
        "cannot access specifier {specifier:#05X} from privilege level {actual_level}, \
             since it requires privilege level {required_level}"
    )]
    Privileged {
        /// The CSR for which access was requested.
        specifier: CsrSpecifier,
        /// The minimum required privilege level to access that CSR.
        required_level: RawPrivilegeLevel,
        /// The actual privilege level from which the access was performed.
        actual_level: PrivilegeLevel,
    },
    /// The CSR exists, but is made unavailable by the current configuration.
    #[error("CSR {0:#05X} unavailable: {1}")]
    CsrUnavailable(CsrSpecifier, String),
}

/// Errors that can occur when attempting to write to a CSR.
#[derive(Error, Debug)]
pub enum CsrWriteError {
    /// A non-write specific access error. See [`CsrAccessError`].
    #[error("{0}")]
    AccessError(#[from] CsrAccessError),
    /// Attempt to write to a read-only register.
    #[error("writing to read-only CSR is invalid")]
    WriteToReadOnly,
}

impl Cpu {
    /// Read the value of a CSR by its specifier.
    ///
    /// `privilege_level` indicates at what privilege level the read is performed. If the CSR that
    /// is being read requires a higher privilege level (see [`required_privilege_level`]), then a
    /// [`CsrAccessError::Privileged`] will be given.
    pub fn read_csr(
        &self,
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
    ) -> Result<u32, CsrAccessError> {
        self.check_csr_access(specifier, privilege_level)?;
        match specifier {
            //
            // Machine info registers
            //
            MISA => Ok(Self::MISA),
            MVENDORID => Ok(Self::MVENDORID),
            MARCHID => Ok(Self::MARCHID),
            MIMPID => Ok(Self::MIMPID),
            MHARTID => Ok(self.config.hart_id),
            //
            // Status registers
            //
            MSTATUS => Ok(self.status.read()),
            SSTATUS => Ok(self.status.read() & SSTATUS_MASK),
            //
            // Interrupt registers
            //
            MIE => Ok(self.interrupts.read_mie()),
            MIP => Ok(self.interrupts.read_mip()),
            MIDELEG => Ok(self.interrupts.read_mideleg()),
            SIE => Ok(self.interrupts.read_sie()),
            SIP => Ok(self.interrupts.read_sip()),
            //
            // Trap setup and handling
            //
            MEDELEG => Ok(self.control.medeleg.read()),
            MTVEC => Ok(self.control.mtvec.read()),
            STVEC => Ok(self.control.stvec.read()),
            MSCRATCH => Ok(self.trap.read_mscratch()),
            MEPC => Ok(self.trap.read_mepc()),
            MCAUSE => Ok(self.trap.read_mcause()),
            MTVAL => Ok(self.trap.read_mtval()),
            SSCRATCH => Ok(self.trap.read_sscratch()),
            SEPC => Ok(self.trap.read_sepc()),
            SCAUSE => Ok(self.trap.read_scause()),
            STVAL => Ok(self.trap.read_stval()),
            //
            // Address translation
            //
            SATP => Ok(self.control.satp.read()),
            //
            // Counter setup
            //
            MCOUNTEREN => Ok(self.counter_control.mcounteren.read()),
            SCOUNTEREN => Ok(self.counter_control.scounteren.read()),
            MCOUNTINHIBIT => Ok(self.counter_control.mcountinhibit.read()),
            MHPMEVENT3..=MHPMEVENT31 => {
                let n = (specifier - MHPMEVENT3) as u8 + 3;
                Ok(self.counters.read_hpmevent(n))
            }
            //
            // Machine counter registers
            //
            MCYCLE => Ok(self.counters.read_cycle()),
            MCYCLEH => Ok(self.counters.read_cycleh()),
            MINSTRET => Ok(self.counters.read_instret()),
            MINSTRETH => Ok(self.counters.read_instreth()),
            MHPMCOUNTER3..=MHPMCOUNTER31 => {
                let n = (specifier - MHPMCOUNTER3) as u8 + 3;
                Ok(self.counters.read_hpmcounter(n))
            }
            MHPMCOUNTER3H..=MHPMCOUNTER31H => {
                let n = (specifier - MHPMCOUNTER3H) as u8 + 3;
                Ok(self.counters.read_hpmcounterh(n))
            }
            //
            // Unprivileged counter shadows
            //
            CYCLE => {
                self.check_counter_access(specifier, |cen| cen.cy(), "cycle counter")?;
                Ok(self.counters.read_cycle())
            }
            CYCLEH => {
                self.check_counter_access(specifier, |cen| cen.cy(), "cycleh counter")?;
                Ok(self.counters.read_cycleh())
            }
            TIME => {
                self.check_counter_access(specifier, |cen| cen.tm(), "time counter")?;
                Ok(self.counters.mtime() as u32)
            }
            TIMEH => {
                self.check_counter_access(specifier, |cen| cen.tm(), "timeh counter")?;
                Ok((self.counters.mtime() >> 32) as u32)
            }
            INSTRET => {
                self.check_counter_access(specifier, |cen| cen.ir(), "instret counter")?;
                Ok(self.counters.read_instret())
            }
            INSTRETH => {
                self.check_counter_access(specifier, |cen| cen.ir(), "instreth counter")?;
                Ok(self.counters.read_instreth())
            }
            HPMCOUNTER3..=HPMCOUNTER31 => {
                let n = (specifier - HPMCOUNTER3) as u8 + 3;
                self.check_counter_access(specifier, |cen| cen.hpm(n), "hpm counter")?;
                Ok(self.counters.read_hpmcounter(n))
            }
            HPMCOUNTER3H..=HPMCOUNTER31H => {
                let n = (specifier - HPMCOUNTER3H) as u8 + 3;
                self.check_counter_access(specifier, |cen| cen.hpm(n), "hpm counter")?;
                Ok(self.counters.read_hpmcounterh(n))
            }
            //
            // Custom registers
            //
            SCYCLECMP => Ok(self.counters.scyclecmp()),
            _ => Err(CsrAccessError::CsrUnsupported(specifier)),
        }
    }

    /// Write `value` to a CSR under `mask`, by its specifier.
    ///
    /// Only the bits of `value` selected by `mask` are written; WARL fields additionally apply
    /// their own legalization. Writes to read-only specifiers report
    /// [`CsrWriteError::WriteToReadOnly`].
    pub fn write_csr(
        &mut self,
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
        value: u32,
        mask: u32,
    ) -> Result<(), CsrWriteError> {
        self.check_csr_access(specifier, privilege_level)
            .map_err(CsrWriteError::AccessError)?;
        if is_read_only(specifier) {
            return Err(CsrWriteError::WriteToReadOnly);
        }
        match specifier {
            //
            // Status registers
            //
            MSTATUS => self.status.write(value, mask),
            SSTATUS => self.status.write(value, mask & SSTATUS_MASK),
            //
            // Interrupt registers
            //
            MIE => self.interrupts.write_mie(value, mask),
            MIP => self.interrupts.write_mip(value, mask),
            MIDELEG => self.interrupts.write_mideleg(value, mask),
            SIE => self.interrupts.write_sie(value, mask),
            SIP => self.interrupts.write_sip(value, mask),
            //
            // Trap setup and handling
            //
            MEDELEG => self.control.medeleg.write(value, mask),
            MTVEC => self.control.mtvec.write(value, mask),
            STVEC => self.control.stvec.write(value, mask),
            MSCRATCH => self.trap.write_mscratch(value, mask),
            MEPC => self.trap.write_mepc(value, mask),
            MCAUSE => self.trap.write_mcause(value, mask),
            MTVAL => self.trap.write_mtval(value, mask),
            SSCRATCH => self.trap.write_sscratch(value, mask),
            SEPC => self.trap.write_sepc(value, mask),
            SCAUSE => self.trap.write_scause(value, mask),
            STVAL => self.trap.write_stval(value, mask),
            //
            // Address translation
            //
            SATP => self.control.satp.write(value, mask),
            //
            // Counter setup
            //
            MCOUNTEREN => self.counter_control.mcounteren.write(value, mask),
            SCOUNTEREN => self.counter_control.scounteren.write(value, mask),
            MCOUNTINHIBIT => self.counter_control.mcountinhibit.write(value, mask),
            MHPMEVENT3..=MHPMEVENT31 => {
                let n = (specifier - MHPMEVENT3) as u8 + 3;
                self.counters.write_hpmevent(n, value, mask);
            }
            //
            // Machine counter registers
            //
            MCYCLE => self.counters.write_cycle(value, mask),
            MCYCLEH => self.counters.write_cycleh(value, mask),
            MINSTRET => self.counters.write_instret(value, mask),
            MINSTRETH => self.counters.write_instreth(value, mask),
            MHPMCOUNTER3..=MHPMCOUNTER31 => {
                let n = (specifier - MHPMCOUNTER3) as u8 + 3;
                self.counters.write_hpmcounter(n, value, mask);
            }
            MHPMCOUNTER3H..=MHPMCOUNTER31H => {
                let n = (specifier - MHPMCOUNTER3H) as u8 + 3;
                self.counters.write_hpmcounterh(n, value, mask);
            }
            //
            // Custom registers
            //
            SCYCLECMP => {
                let new = self.counters.scyclecmp() & !mask | value & mask;
                self.counters.set_scyclecmp(new);
            }
            _ => return Err(CsrWriteError::AccessError(CsrAccessError::CsrUnsupported(
                specifier,
            ))),
        }
        Ok(())
    }

    fn check_csr_access(
        &self,
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
    ) -> Result<(), CsrAccessError> {
        if !is_valid(specifier) {
            return Err(CsrAccessError::CsrUnsupported(specifier));
        }
        let required_level = required_privilege_level(specifier);
        // Compare the raw two-bit encodings; the reserved level ranks between S and M.
        if (privilege_level as u8) < required_level as u8 {
            return Err(CsrAccessError::Privileged {
                specifier,
                required_level,
                actual_level: privilege_level,
            });
        }
        Ok(())
    }

    /// The unprivileged counter shadows are gated by mcounteren (for S and U mode) and
    /// scounteren (for U mode).
    fn check_counter_access(
        &self,
        specifier: CsrSpecifier,
        check: impl Fn(&super::counters::Counteren) -> bool,
        name: &str,
    ) -> Result<(), CsrAccessError> {
        let mode = self.privilege_mode;
        use CsrAccessError::CsrUnavailable;
        if mode < PrivilegeLevel::Supervisor && !check(&self.counter_control.scounteren) {
            Err(CsrUnavailable(
                specifier,
                format!("{name} access prohibited by scounteren"),
            ))
        } else if mode < PrivilegeLevel::Machine && !check(&self.counter_control.mcounteren) {
            Err(CsrUnavailable(
                specifier,
                format!("{name} access prohibited by mcounteren"),
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;

    fn cpu() -> Cpu {
        Cpu::new(Config {
            hart_id: 3,
            reset_vector: 0x1000,
        })
    }

    #[test]
    fn test_specifier_helpers() {
        assert!(is_valid(MSTATUS));
        assert!(!is_valid(0x1000));
        assert!(is_read_only(CYCLE));
        assert!(is_read_only(MHARTID));
        assert!(!is_read_only(MSTATUS));
        assert!(!is_read_only(SCYCLECMP));
        assert_eq!(RawPrivilegeLevel::Machine, required_privilege_level(MEPC));
        assert_eq!(
            RawPrivilegeLevel::Supervisor,
            required_privilege_level(SCYCLECMP)
        );
        assert_eq!(RawPrivilegeLevel::User, required_privilege_level(CYCLE));
    }

    #[test]
    fn test_machine_info_registers() {
        let cpu = cpu();
        assert_eq!(Ok(3), cpu.read_csr(MHARTID, PrivilegeLevel::Machine).map_err(|_| ()));
        assert_eq!(
            Cpu::MISA,
            cpu.read_csr(MISA, PrivilegeLevel::Machine).unwrap()
        );
    }

    #[test]
    fn test_privilege_enforced() {
        let cpu = cpu();
        assert!(matches!(
            cpu.read_csr(MSTATUS, PrivilegeLevel::User),
            Err(CsrAccessError::Privileged { .. })
        ));
        assert!(cpu.read_csr(SSTATUS, PrivilegeLevel::Supervisor).is_ok());
    }

    #[test]
    fn test_read_only_rejected() {
        let mut cpu = cpu();
        assert!(matches!(
            cpu.write_csr(MHARTID, PrivilegeLevel::Machine, 1, !0),
            Err(CsrWriteError::WriteToReadOnly)
        ));
    }

    #[test]
    fn test_unsupported_specifier() {
        let cpu = cpu();
        assert!(matches!(
            cpu.read_csr(0x7A0, PrivilegeLevel::Machine),
            Err(CsrAccessError::CsrUnsupported(0x7A0))
        ));
    }

    #[test]
    fn test_sstatus_is_masked_view() {
        let mut cpu = cpu();
        cpu.write_csr(MSTATUS, PrivilegeLevel::Machine, 0xFFFF_FFFF, !0)
            .unwrap();
        let sstatus = cpu.read_csr(SSTATUS, PrivilegeLevel::Machine).unwrap();
        assert_eq!(0, sstatus & (1 << 3)); // MIE invisible
        assert_ne!(0, sstatus & (1 << 1)); // SIE visible

        // Writing MIE through sstatus must not work.
        cpu.write_csr(SSTATUS, PrivilegeLevel::Machine, 0, !0).unwrap();
        let mstatus = cpu.read_csr(MSTATUS, PrivilegeLevel::Machine).unwrap();
        assert_ne!(0, mstatus & (1 << 3));
        assert_eq!(0, mstatus & (1 << 1));
    }

    #[test]
    fn test_counter_shadow_gating() {
        let mut cpu = cpu();
        // All enables default to on; U-mode reads work.
        cpu.set_privilege_mode(PrivilegeLevel::User);
        assert!(cpu.read_csr(CYCLE, PrivilegeLevel::User).is_ok());

        // Clearing mcounteren.CY blocks U-mode access.
        cpu.set_privilege_mode(PrivilegeLevel::Machine);
        cpu.write_csr(MCOUNTEREN, PrivilegeLevel::Machine, 0, 0b001)
            .unwrap();
        cpu.set_privilege_mode(PrivilegeLevel::User);
        assert!(matches!(
            cpu.read_csr(CYCLE, PrivilegeLevel::User),
            Err(CsrAccessError::CsrUnavailable(..))
        ));
        // M-mode reads stay unaffected.
        cpu.set_privilege_mode(PrivilegeLevel::Machine);
        assert!(cpu.read_csr(CYCLE, PrivilegeLevel::Machine).is_ok());
    }

    #[test]
    fn test_scyclecmp_roundtrip() {
        let mut cpu = cpu();
        cpu.write_csr(SCYCLECMP, PrivilegeLevel::Supervisor, 0x1234, !0)
            .unwrap();
        assert_eq!(
            0x1234,
            cpu.read_csr(SCYCLECMP, PrivilegeLevel::Supervisor).unwrap()
        );
        assert_eq!(0x1234, cpu.counters().scyclecmp());
    }

    #[test]
    fn test_hpm_ranges() {
        let mut cpu = cpu();
        cpu.write_csr(MHPMEVENT3 + 2, PrivilegeLevel::Machine, 2, !0)
            .unwrap();
        assert_eq!(
            2,
            cpu.read_csr(MHPMEVENT3 + 2, PrivilegeLevel::Machine).unwrap()
        );
        cpu.write_csr(MHPMCOUNTER3 + 2, PrivilegeLevel::Machine, 77, !0)
            .unwrap();
        assert_eq!(
            77,
            cpu.read_csr(HPMCOUNTER3 + 2, PrivilegeLevel::Machine).unwrap()
        );
    }
}
