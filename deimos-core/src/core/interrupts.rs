//! The mip/mie/mideleg registers, the split SEIP bit, and interrupt selection.

use bitvec::{array::BitArray, field::BitField, order::Lsb0, view::BitView};
use log::trace;

use super::Interrupt;

const SUPERVISOR_SOFTWARE_INTERRUPT: usize = Interrupt::SupervisorSoftwareInterrupt as usize;
const MACHINE_SOFTWARE_INTERRUPT: usize = Interrupt::MachineSoftwareInterrupt as usize;
const SUPERVISOR_TIMER_INTERRUPT: usize = Interrupt::SupervisorTimerInterrupt as usize;
const MACHINE_TIMER_INTERRUPT: usize = Interrupt::MachineTimerInterrupt as usize;
const SUPERVISOR_EXTERNAL_INTERRUPT: usize = Interrupt::SupervisorExternalInterrupt as usize;
const MACHINE_EXTERNAL_INTERRUPT: usize = Interrupt::MachineExternalInterrupt as usize;

#[allow(clippy::identity_op)]
const VALID_INTERRUPTS_MASK: u16 = 0
    | (1 << SUPERVISOR_SOFTWARE_INTERRUPT)
    | (1 << MACHINE_SOFTWARE_INTERRUPT)
    | (1 << SUPERVISOR_TIMER_INTERRUPT)
    | (1 << MACHINE_TIMER_INTERRUPT)
    | (1 << SUPERVISOR_EXTERNAL_INTERRUPT)
    | (1 << MACHINE_EXTERNAL_INTERRUPT);

/// Only S-level interrupts may be delegated; delegating M-level interrupts is not supported.
#[allow(clippy::identity_op)]
const DELEGATABLE_INTERRUPTS_MASK: u16 = 0
    | (1 << SUPERVISOR_SOFTWARE_INTERRUPT)
    | (1 << SUPERVISOR_TIMER_INTERRUPT)
    | (1 << SUPERVISOR_EXTERNAL_INTERRUPT);

/// Mask of the S-level interrupt bits, used to select the candidates for an S-mode trap.
#[allow(clippy::identity_op)]
const S_INTERRUPTS_MASK: u16 = 0
    | (1 << SUPERVISOR_SOFTWARE_INTERRUPT)
    | (1 << SUPERVISOR_TIMER_INTERRUPT)
    | (1 << SUPERVISOR_EXTERNAL_INTERRUPT);

/// The interrupt-pending, interrupt-enable, and interrupt-delegation state of one hart.
///
/// The SEIP field needs special care:
///
/// > If implemented, SEIP may be read-only, or may be writable by M-mode software. [...] The
/// > value of SEIP visible to CSR reads is the logical-OR of the software-writable bit and the
/// > signal from the external interrupt controller.
///
/// The interrupt controller's contribution is kept in `seip_external`, the software-writable bit
/// in `seip_internal`; the SEIP bit of `mip` is recomputed whenever either changes, so readers of
/// `mip` always observe the OR of both.
#[derive(Debug, Clone)]
pub struct Interrupts {
    /// Array of booleans, with for each bit index matching an interrupt's code a bool indicating
    /// whether handling that interrupt should be delegated to S-mode (if not triggered in M-mode).
    delegate: BitArray<[u16; 1], Lsb0>,

    /// External interrupt signal that is ORed with [`seip_internal`](Self::seip_internal) to
    /// become the SEIP field of the final mip register.
    seip_external: bool,
    /// Software-writable bit that is ORed with [`seip_external`](Self::seip_external) to become
    /// the SEIP field of the final mip register.
    seip_internal: bool,

    /// The final mip register as visible from guest software.
    mip: BitArray<[u16; 1], Lsb0>,

    /// The mie register.
    mie: BitArray<[u16; 1], Lsb0>,
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupts {
    pub fn new() -> Self {
        Self {
            delegate: BitArray::new([0x0000]),
            seip_external: false,
            seip_internal: false,
            mip: BitArray::new([0x0000]),
            mie: BitArray::new([0x0000]),
        }
    }

    /// Indicate whether there is an M-level external interrupt pending (MEIP).
    pub fn set_m_external(&mut self, value: bool) {
        trace!("setting mip.MEIP to {value}");
        self.mip.set(MACHINE_EXTERNAL_INTERRUPT, value);
    }

    /// Indicate whether there is an S-level external interrupt pending (SEIP).
    ///
    /// This drives the external signal only. Note that passing `false` does not necessarily clear
    /// the SEIP field, since it is ORed with the (hidden) software-writable bit.
    pub fn set_s_external(&mut self, value: bool) {
        trace!("setting external SEIP to {value}");
        self.seip_external = value;
        self.recompute_seip();
    }

    /// Indicate whether there is an M-level timer interrupt pending (MTIP).
    ///
    /// Recomputed every step from the memory-mapped mtime and mtimecmp registers.
    pub fn set_m_timer(&mut self, value: bool) {
        self.mip.set(MACHINE_TIMER_INTERRUPT, value);
    }

    /// Indicate whether there is an S-level timer interrupt pending (STIP).
    ///
    /// Recomputed every step from the cycle counter and the scyclecmp register.
    pub fn set_s_timer(&mut self, value: bool) {
        self.mip.set(SUPERVISOR_TIMER_INTERRUPT, value);
    }

    /// Indicate whether there is an M-level software interrupt pending (MSIP).
    pub fn set_m_soft(&mut self, value: bool) {
        trace!("setting mip.MSIP to {value}");
        self.mip.set(MACHINE_SOFTWARE_INTERRUPT, value);
    }

    /// Indicate whether there is an S-level software interrupt pending (SSIP).
    pub fn set_s_soft(&mut self, value: bool) {
        trace!("setting mip.SSIP to {value}");
        self.mip.set(SUPERVISOR_SOFTWARE_INTERRUPT, value);
    }

    fn recompute_seip(&mut self) {
        self.mip.set(
            SUPERVISOR_EXTERNAL_INTERRUPT,
            self.seip_external | self.seip_internal,
        );
    }

    /// The mip register as observed by CSR reads (SEIP already ORed with the external signal).
    pub fn read_mip(&self) -> u32 {
        self.mip.load_le()
    }

    /// CSR write to mip.
    ///
    /// Writes to MEIP, MTIP, and MSIP are ignored: those bits are managed by the external
    /// interrupt lines and the timer comparison. A write to SEIP lands in the software-writable
    /// bit only, leaving the external signal alone.
    pub fn write_mip(&mut self, value: u32, mask: u32) {
        let mask = mask.view_bits::<Lsb0>();
        let value = value.view_bits::<Lsb0>();

        if mask[SUPERVISOR_EXTERNAL_INTERRUPT] {
            self.seip_internal = value[SUPERVISOR_EXTERNAL_INTERRUPT];
            self.recompute_seip();
        }
        if mask[SUPERVISOR_TIMER_INTERRUPT] {
            self.mip
                .set(SUPERVISOR_TIMER_INTERRUPT, value[SUPERVISOR_TIMER_INTERRUPT]);
        }
        if mask[SUPERVISOR_SOFTWARE_INTERRUPT] {
            self.mip.set(
                SUPERVISOR_SOFTWARE_INTERRUPT,
                value[SUPERVISOR_SOFTWARE_INTERRUPT],
            );
        }
    }

    pub fn read_mie(&self) -> u32 {
        self.mie.load_le()
    }

    pub fn write_mie(&mut self, value: u32, mask: u32) {
        let mask = mask as u16 & VALID_INTERRUPTS_MASK;
        let current = self.mie.load_le::<u16>();
        self.mie.store_le(current & !mask | value as u16 & mask);
    }

    pub fn read_mideleg(&self) -> u32 {
        self.delegate.load_le()
    }

    /// The mideleg register is **WARL**.
    pub fn write_mideleg(&mut self, value: u32, mask: u32) {
        let mask = mask as u16 & DELEGATABLE_INTERRUPTS_MASK;
        let current = self.delegate.load_le::<u16>();
        self.delegate
            .store_le(current & !mask | value as u16 & mask);
    }

    /// The sip register: the delegated view of mip.
    pub fn read_sip(&self) -> u32 {
        (self.mip & self.delegate).load_le()
    }

    /// CSR write to sip. SEIP and STIP are read-only in sip; only SSIP can be written.
    pub fn write_sip(&mut self, value: u32, mask: u32) {
        let mask = mask.view_bits::<Lsb0>();
        let value = value.view_bits::<Lsb0>();
        if mask[SUPERVISOR_SOFTWARE_INTERRUPT] {
            self.mip.set(
                SUPERVISOR_SOFTWARE_INTERRUPT,
                value[SUPERVISOR_SOFTWARE_INTERRUPT],
            );
        }
    }

    /// The sie register: the delegated view of mie.
    pub fn read_sie(&self) -> u32 {
        (self.mie & self.delegate).load_le()
    }

    pub fn write_sie(&mut self, value: u32, mask: u32) {
        let delegate = self.delegate.load_le::<u16>();
        // Since we are masking with `delegate`, it is not needed to also mask with
        // VALID_INTERRUPTS_MASK (or DELEGATABLE_INTERRUPTS_MASK).
        let mask = mask as u16 & delegate;
        let current = self.mie.load_le::<u16>();
        self.mie.store_le(current & !mask | value as u16 & mask);
    }

    /// Returns `Some(interrupt)` if there is an interrupt ready to be taken in M-mode. If there
    /// are multiple interrupts ready, `interrupt` will be the one with the highest priority.
    ///
    /// An interrupt is considered ready to be taken in M-mode if it is pending in mip, enabled by
    /// mie, and not delegated by mideleg.
    pub fn highest_priority_m_ready(&self) -> Option<Interrupt> {
        let ready = self.mip & self.mie & !self.delegate;
        [
            Interrupt::MachineExternalInterrupt,
            Interrupt::MachineSoftwareInterrupt,
            Interrupt::MachineTimerInterrupt,
            Interrupt::SupervisorExternalInterrupt,
            Interrupt::SupervisorSoftwareInterrupt,
            Interrupt::SupervisorTimerInterrupt,
        ]
        .into_iter()
        .find(|&i| ready[i as usize])
    }

    /// Returns `Some(interrupt)` if there is an interrupt ready to be taken in S-mode. If there
    /// are multiple interrupts ready, `interrupt` will be the one with the highest priority.
    ///
    /// An interrupt is considered ready to be taken in S-mode if it is an S-level interrupt
    /// pending in mip and enabled by mie.
    pub fn highest_priority_s_ready(&self) -> Option<Interrupt> {
        let s_mask: BitArray<[u16; 1], Lsb0> = BitArray::new([S_INTERRUPTS_MASK]);
        let ready = self.mip & self.mie & s_mask;
        [
            Interrupt::SupervisorExternalInterrupt,
            Interrupt::SupervisorSoftwareInterrupt,
            Interrupt::SupervisorTimerInterrupt,
        ]
        .into_iter()
        .find(|&i| ready[i as usize])
    }
}
