//! Instruction-level simulator core for a small RV32IMA machine.
//!
//! The crate models a machine built from physical memory regions (RAM, ROM, and memory-mapped
//! devices), one or more RV32IMA harts with Sv32 address translation and the machine/supervisor
//! privileged architecture, and a frame-granular cache of pre-decoded instructions. The outer
//! shell that drives it (command interpreter, configuration scripts, concrete device models)
//! lives elsewhere; everything here is synchronous and single-threaded.

#[macro_use]
extern crate static_assertions;

use std::fmt;
use thiserror::Error;

pub mod bus;
pub mod core;
pub mod device;
pub mod icache;
pub mod instruction;
pub mod machine;
pub mod physmem;
pub mod registers;

/// Privilege level of a hart, restricted to the three levels this machine implements.
///
/// The discriminants are the architectural two-bit encodings, so `level as u8` is directly
/// usable wherever a raw encoding is needed (mstatus fields, CSR specifier bits). The derived
/// ordering follows the encoding: U < S < M.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum PrivilegeLevel {
    /// User/application level, the least privileged.
    User = 0,
    /// Supervisor level, home of the operating system.
    Supervisor = 1,
    // Encoding 2 is reserved by the architecture.
    /// Machine level, the most privileged; every hart resets into it.
    Machine = 3,
}

/// Any two-bit privilege encoding, including the reserved value `2`.
///
/// WARL status fields and the privilege bits of a CSR specifier carry raw two-bit values that
/// may name the reserved level. This type keeps such values representable until an actual
/// [`PrivilegeLevel`] is needed, at which point [`TryFrom`] rejects the reserved encoding.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RawPrivilegeLevel {
    User = 0,
    Supervisor = 1,
    Reserved = 2,
    Machine = 3,
}

impl RawPrivilegeLevel {
    /// Decodes a two-bit field. Bits beyond the low two are ignored.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::User,
            1 => Self::Supervisor,
            2 => Self::Reserved,
            _ => Self::Machine,
        }
    }
}

impl From<PrivilegeLevel> for RawPrivilegeLevel {
    fn from(level: PrivilegeLevel) -> Self {
        Self::from_bits(level as u8)
    }
}

impl TryFrom<RawPrivilegeLevel> for PrivilegeLevel {
    type Error = ReservedPrivilegeLevelError;
    fn try_from(raw: RawPrivilegeLevel) -> Result<Self, Self::Error> {
        match raw {
            RawPrivilegeLevel::User => Ok(Self::User),
            RawPrivilegeLevel::Supervisor => Ok(Self::Supervisor),
            RawPrivilegeLevel::Reserved => Err(ReservedPrivilegeLevelError),
            RawPrivilegeLevel::Machine => Ok(Self::Machine),
        }
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&RawPrivilegeLevel::from(*self), f)
    }
}

impl fmt::Display for RawPrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "U",
            Self::Supervisor => "S",
            Self::Reserved => "reserved",
            Self::Machine => "M",
        })
    }
}

#[derive(Error, Debug)]
#[error("privilege level encoding 2 is reserved")]
pub struct ReservedPrivilegeLevelError;

/// A power-of-two address alignment.
///
/// Wraps the alignment in bytes; the constructors guarantee it is a power of two, so the
/// arithmetic helpers never divide by zero.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Alignment(u32);

impl Alignment {
    /// Halfword (16-bit) alignment: the address is even.
    pub const HALFWORD: Self = Self(2);

    /// Word (32-bit) alignment: the address is a multiple of 4.
    pub const WORD: Self = Self(4);

    /// Doubleword (64-bit) alignment: the address is a multiple of 8.
    pub const DOUBLEWORD: Self = Self(8);

    /// The natural alignment of an access of `size` bytes, which equals the size. `None` when
    /// `size` is not a power of two (such accesses are never naturally aligned).
    pub fn natural_for_size(size: u32) -> Option<Self> {
        size.is_power_of_two().then_some(Self(size))
    }

    /// Returns `true` if `address` satisfies this alignment.
    pub fn is_aligned(self, address: u32) -> bool {
        address % self.0 == 0
    }

    /// Rounds `address` down to this alignment.
    pub fn align_down(self, address: u32) -> u32 {
        address - address % self.0
    }
}
