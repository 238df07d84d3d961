//! The mstatus register and its sstatus restriction.

use crate::{PrivilegeLevel, RawPrivilegeLevel};

/// Bit position of the SPP (S-mode previous privilege) field.
const SPP_BIT: u32 = 8;

/// Bit position of the low bit of the two-bit MPP (M-mode previous privilege) field.
const MPP_LO: u32 = 11;

/// The sstatus register is the S-visible slice of mstatus; this mask selects the fields that
/// slice contains (SIE, SPIE, SPP, SUM, MXR).
pub const SSTATUS_MASK: u32 = (1 << StatusFlag::Sie as u32)
    | (1 << StatusFlag::Spie as u32)
    | (1 << SPP_BIT)
    | (1 << StatusFlag::Sum as u32)
    | (1 << StatusFlag::Mxr as u32);

/// The single-bit mstatus fields this machine gives meaning to. The discriminant of each variant
/// is its bit position in the register.
///
/// The two privilege-stack fields (SPP, MPP) are not listed here since they are wider than one
/// bit and need WARL legalization of their own; see [`Status::set_spp`] and [`Status::set_mpp`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StatusFlag {
    /// S-mode interrupt enable.
    Sie = 1,
    /// M-mode interrupt enable.
    Mie = 3,
    /// S-mode previous interrupt enable (stacked by traps).
    Spie = 5,
    /// M-mode previous interrupt enable (stacked by traps).
    Mpie = 7,
    /// Modify-privilege: data accesses translate as if running at MPP.
    Mprv = 17,
    /// Permit supervisor access to user-accessible pages.
    Sum = 18,
    /// Make executable pages readable.
    Mxr = 19,
}

impl StatusFlag {
    /// Every implemented single-bit field, used to drive masked writes.
    pub const ALL: [StatusFlag; 7] = [
        StatusFlag::Sie,
        StatusFlag::Mie,
        StatusFlag::Spie,
        StatusFlag::Mpie,
        StatusFlag::Mprv,
        StatusFlag::Sum,
        StatusFlag::Mxr,
    ];
}

/// The hart's operating-state register.
///
/// > The mstatus register keeps track of and controls the hart’s current operating state.
///
/// Stored as the architectural `u32`. Reads return it as-is; every bit outside the implemented
/// fields is WPRI, hardwired to zero. sstatus is not stored separately: readers mask with
/// [`SSTATUS_MASK`], writers have their write mask intersected with it.
#[derive(Debug, Clone, Default)]
pub struct Status {
    mstatus: u32,
}

impl Status {
    pub fn new() -> Self {
        Self { mstatus: 0 }
    }

    /// The raw register value.
    pub fn read(&self) -> u32 {
        self.mstatus
    }

    /// Masked write of the whole register.
    ///
    /// Each implemented field is updated through its setter so the WARL fields (SPP, MPP) drop
    /// illegal encodings while everything else lands bit-for-bit. Unimplemented bits are ignored.
    pub fn write(&mut self, value: u32, mask: u32) {
        let updated = self.mstatus & !mask | value & mask;
        for flag in StatusFlag::ALL {
            if mask & (1 << flag as u32) != 0 {
                self.set_flag(flag, updated & (1 << flag as u32) != 0);
            }
        }
        if mask & (1 << SPP_BIT) != 0 {
            self.set_spp(RawPrivilegeLevel::from_bits((updated >> SPP_BIT) as u8 & 1));
        }
        if mask & (0b11 << MPP_LO) != 0 {
            self.set_mpp(RawPrivilegeLevel::from_bits((updated >> MPP_LO) as u8));
        }
    }

    /// Reads one single-bit field.
    pub fn flag(&self, flag: StatusFlag) -> bool {
        self.mstatus >> flag as u32 & 1 != 0
    }

    /// Writes one single-bit field.
    pub fn set_flag(&mut self, flag: StatusFlag, value: bool) {
        let bit = 1 << flag as u32;
        if value {
            self.mstatus |= bit;
        } else {
            self.mstatus &= !bit;
        }
    }

    /// The privilege level stacked in MPP by the last trap into M-mode.
    pub fn mpp(&self) -> PrivilegeLevel {
        // The setter only ever stores legal levels, so the conversion cannot fail.
        RawPrivilegeLevel::from_bits((self.mstatus >> MPP_LO) as u8)
            .try_into()
            .unwrap()
    }

    /// Stores a privilege level in MPP. WARL: the reserved encoding is dropped.
    pub fn set_mpp(&mut self, value: RawPrivilegeLevel) {
        if let Ok(level) = PrivilegeLevel::try_from(value) {
            self.mstatus = self.mstatus & !(0b11 << MPP_LO) | (level as u32) << MPP_LO;
        }
    }

    /// The privilege level stacked in SPP by the last trap into S-mode.
    pub fn spp(&self) -> PrivilegeLevel {
        match self.mstatus >> SPP_BIT & 1 {
            0 => PrivilegeLevel::User,
            _ => PrivilegeLevel::Supervisor,
        }
    }

    /// Stores a privilege level in SPP. WARL: the field is one bit wide, so only U and S fit;
    /// anything else is dropped.
    pub fn set_spp(&mut self, value: RawPrivilegeLevel) {
        let bit = match value {
            RawPrivilegeLevel::User => 0,
            RawPrivilegeLevel::Supervisor => 1,
            _ => return,
        };
        self.mstatus = self.mstatus & !(1 << SPP_BIT) | bit << SPP_BIT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_roundtrip() {
        let mut status = Status::new();
        status.set_flag(StatusFlag::Mie, true);
        status.set_flag(StatusFlag::Spie, true);
        assert!(status.flag(StatusFlag::Mie));
        assert!(!status.flag(StatusFlag::Sie));
        assert!(status.flag(StatusFlag::Spie));
        status.set_flag(StatusFlag::Mie, false);
        assert!(!status.flag(StatusFlag::Mie));
        assert!(status.flag(StatusFlag::Spie));
    }

    #[test]
    fn test_flag_bits_match_architecture() {
        let mut status = Status::new();
        status.set_flag(StatusFlag::Mie, true);
        assert_eq!(1 << 3, status.read());
        status.set_flag(StatusFlag::Sum, true);
        assert_eq!(1 << 3 | 1 << 18, status.read());
    }

    #[test]
    fn test_mpp_warl_ignores_reserved() {
        let mut status = Status::new();
        status.set_mpp(RawPrivilegeLevel::Machine);
        status.set_mpp(RawPrivilegeLevel::Reserved);
        assert_eq!(PrivilegeLevel::Machine, status.mpp());
        status.set_mpp(RawPrivilegeLevel::User);
        assert_eq!(PrivilegeLevel::User, status.mpp());
    }

    #[test]
    fn test_spp_warl_rejects_machine() {
        let mut status = Status::new();
        status.set_spp(RawPrivilegeLevel::Machine);
        assert_eq!(PrivilegeLevel::User, status.spp());
        status.set_spp(RawPrivilegeLevel::Supervisor);
        assert_eq!(PrivilegeLevel::Supervisor, status.spp());
        status.set_spp(RawPrivilegeLevel::Machine);
        assert_eq!(PrivilegeLevel::Supervisor, status.spp());
    }

    #[test]
    fn test_masked_write() {
        let mut status = Status::new();
        status.write(0xFFFF_FFFF, 0xFFFF_FFFF);
        assert!(status.flag(StatusFlag::Mie));
        assert!(status.flag(StatusFlag::Sum));
        assert!(status.flag(StatusFlag::Mxr));
        assert_eq!(PrivilegeLevel::Machine, status.mpp());

        // Clear only MIE through the mask; the neighbours stay put.
        status.write(0, 1 << 3);
        assert!(!status.flag(StatusFlag::Mie));
        assert!(status.flag(StatusFlag::Sie));
    }

    #[test]
    fn test_wpri_bits_stay_zero() {
        let mut status = Status::new();
        status.write(0xFFFF_FFFF, 0xFFFF_FFFF);
        let implemented: u32 = StatusFlag::ALL
            .iter()
            .map(|&flag| 1 << flag as u32)
            .sum::<u32>()
            | 1 << SPP_BIT
            | 0b11 << MPP_LO;
        assert_eq!(0, status.read() & !implemented);
    }

    #[test]
    fn test_sstatus_mask_fields() {
        assert_ne!(0, SSTATUS_MASK & (1 << 1)); // SIE
        assert_ne!(0, SSTATUS_MASK & (1 << 5)); // SPIE
        assert_ne!(0, SSTATUS_MASK & (1 << 8)); // SPP
        assert_ne!(0, SSTATUS_MASK & (1 << 18)); // SUM
        assert_ne!(0, SSTATUS_MASK & (1 << 19)); // MXR
        assert_eq!(0, SSTATUS_MASK & (1 << 3)); // MIE is M-only
        assert_eq!(0, SSTATUS_MASK & (0b11 << 11)); // MPP is M-only
    }
}
