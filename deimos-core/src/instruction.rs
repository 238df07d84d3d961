//! Decoded instruction data model and the RV32IMA decoder.

use crate::core::csr::CsrSpecifier;
use crate::registers::Specifier;
use thiserror::Error;

/// Data structure that can hold any supported instruction in its decoded form.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instruction {
    OpImm {
        op: RegImmOp,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    },
    OpShiftImm {
        op: RegShiftImmOp,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    },
    Auipc {
        dest: Specifier,
        immediate: i32,
    },
    Lui {
        dest: Specifier,
        immediate: i32,
    },
    Op {
        op: RegRegOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    },
    Jal {
        dest: Specifier,
        offset: i32,
    },
    Jalr {
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Branch {
        condition: BranchCondition,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
    },
    Load {
        width: LoadWidth,
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Store {
        width: StoreWidth,
        src: Specifier,
        base: Specifier,
        offset: i32,
    },
    /// Atomic memory operation from the A extension, including LR.W and SC.W.
    /// The `aq`/`rl` ordering bits are accepted but carry no meaning on this
    /// single-threaded model.
    Amo {
        op: AmoOp,
        dest: Specifier,
        addr: Specifier,
        src: Specifier,
    },
    Fence {
        predecessor: FenceOrderCombination,
        successor: FenceOrderCombination,
    },
    FenceI,
    Ecall,
    Ebreak,
    Sret,
    Mret,
    Wfi,
    SfenceVma {
        vaddr: Specifier,
        asid: Specifier,
    },
    Csr {
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        src: Specifier,
    },
    Csri {
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        immediate: u32,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegImmOp {
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegShiftImmOp {
    Slli,
    Srli,
    Srai,
}

/// Register-register operations of the base ISA and of the M extension.
/// The M operations share the OP opcode, selected by `funct7 == 0b0000001`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegRegOp {
    Add,
    Slt,
    Sltu,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Sub,
    Sra,
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
}

/// Operations of the A extension (funct5 of the AMO opcode).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AmoOp {
    LrW,
    ScW,
    Swap,
    Add,
    Xor,
    And,
    Or,
    Min,
    Max,
    Minu,
    Maxu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BranchCondition {
    Beq,
    Bne,
    Blt,
    Bltu,
    Bge,
    Bgeu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadWidth {
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StoreWidth {
    Sb,
    Sh,
    Sw,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrOp {
    ReadWrite,
    ReadSet,
    ReadClear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FenceOrderCombination {
    pub device_input: bool,
    pub device_output: bool,
    pub memory_reads: bool,
    pub memory_writes: bool,
}

impl Instruction {
    pub fn decode(raw_instruction: u32) -> Result<Self, DecodeError> {
        match opcode(raw_instruction).ok_or(DecodeError::UnsupportedOpcode)? {
            Opcode::OpImm => match i_funct(raw_instruction) {
                Some(op) => Ok(Self::OpImm {
                    op,
                    dest: rd(raw_instruction),
                    src: rs1(raw_instruction),
                    immediate: i_imm(raw_instruction),
                }),
                None => match i_shfunct(raw_instruction) {
                    Some(op) => Ok(Self::OpShiftImm {
                        op,
                        dest: rd(raw_instruction),
                        src: rs1(raw_instruction),
                        shift_amount_u5: shamt(raw_instruction),
                    }),
                    None => Err(DecodeError::IllegalInstruction),
                },
            },
            Opcode::Auipc => Ok(Self::Auipc {
                dest: rd(raw_instruction),
                immediate: u_imm(raw_instruction),
            }),
            Opcode::Lui => Ok(Self::Lui {
                dest: rd(raw_instruction),
                immediate: u_imm(raw_instruction),
            }),
            Opcode::Op => match r_funct(raw_instruction) {
                Some(op) => Ok(Self::Op {
                    op,
                    dest: rd(raw_instruction),
                    src1: rs1(raw_instruction),
                    src2: rs2(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Amo => match amo_funct(raw_instruction) {
                Some(op) => {
                    // LR.W encodes rs2 == 0; anything else is reserved.
                    if op == AmoOp::LrW && u8::from(rs2(raw_instruction)) != 0 {
                        return Err(DecodeError::IllegalInstruction);
                    }
                    Ok(Self::Amo {
                        op,
                        dest: rd(raw_instruction),
                        addr: rs1(raw_instruction),
                        src: rs2(raw_instruction),
                    })
                }
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Jal => Ok(Self::Jal {
                dest: rd(raw_instruction),
                offset: j_imm(raw_instruction),
            }),
            Opcode::Jalr => Ok(Self::Jalr {
                dest: rd(raw_instruction),
                base: rs1(raw_instruction),
                offset: i_imm(raw_instruction),
            }),
            Opcode::Branch => match b_funct(raw_instruction) {
                Some(condition) => Ok(Self::Branch {
                    condition,
                    src1: rs1(raw_instruction),
                    src2: rs2(raw_instruction),
                    offset: b_imm(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Load => match i_width(raw_instruction) {
                Some(width) => Ok(Self::Load {
                    width,
                    dest: rd(raw_instruction),
                    base: rs1(raw_instruction),
                    offset: i_imm(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Store => match s_width(raw_instruction) {
                Some(width) => Ok(Self::Store {
                    width,
                    src: rs2(raw_instruction),
                    base: rs1(raw_instruction),
                    offset: s_imm(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::MiscMem => match funct3(raw_instruction) {
                0b000 => {
                    // All unused fields in the FENCE instruction encoding are reserved for
                    // future use. According to the spec, unknown fm values (including the
                    // optional FENCE.TSO) should be treated as normal fence instructions for
                    // forward compatibility, so fm, rd and rs1 are not checked here.
                    let predecessor = FenceOrderCombination {
                        device_input: (raw_instruction >> 27) & 0b1 == 1,
                        device_output: (raw_instruction >> 26) & 0b1 == 1,
                        memory_reads: (raw_instruction >> 25) & 0b1 == 1,
                        memory_writes: (raw_instruction >> 24) & 0b1 == 1,
                    };
                    let successor = FenceOrderCombination {
                        device_input: (raw_instruction >> 23) & 0b1 == 1,
                        device_output: (raw_instruction >> 22) & 0b1 == 1,
                        memory_reads: (raw_instruction >> 21) & 0b1 == 1,
                        memory_writes: (raw_instruction >> 20) & 0b1 == 1,
                    };
                    Ok(Self::Fence {
                        predecessor,
                        successor,
                    })
                }
                0b001 => Ok(Self::FenceI),
                _ => Err(DecodeError::IllegalInstruction),
            },
            Opcode::System => match funct3(raw_instruction) {
                0b000 => i_sys(raw_instruction).ok_or(DecodeError::IllegalInstruction),
                0b001 => Ok(Self::Csr {
                    op: CsrOp::ReadWrite,
                    dest: rd(raw_instruction),
                    csr: csr(raw_instruction),
                    src: rs1(raw_instruction),
                }),
                0b010 => Ok(Self::Csr {
                    op: CsrOp::ReadSet,
                    dest: rd(raw_instruction),
                    csr: csr(raw_instruction),
                    src: rs1(raw_instruction),
                }),
                0b011 => Ok(Self::Csr {
                    op: CsrOp::ReadClear,
                    dest: rd(raw_instruction),
                    csr: csr(raw_instruction),
                    src: rs1(raw_instruction),
                }),
                0b101 => Ok(Self::Csri {
                    op: CsrOp::ReadWrite,
                    dest: rd(raw_instruction),
                    csr: csr(raw_instruction),
                    immediate: u32::from(u8::from(rs1(raw_instruction))),
                }),
                0b110 => Ok(Self::Csri {
                    op: CsrOp::ReadSet,
                    dest: rd(raw_instruction),
                    csr: csr(raw_instruction),
                    immediate: u32::from(u8::from(rs1(raw_instruction))),
                }),
                0b111 => Ok(Self::Csri {
                    op: CsrOp::ReadClear,
                    dest: rd(raw_instruction),
                    csr: csr(raw_instruction),
                    immediate: u32::from(u8::from(rs1(raw_instruction))),
                }),
                _ => Err(DecodeError::IllegalInstruction),
            },
        }
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
    #[error("instruction has unsupported opcode")]
    UnsupportedOpcode,
    #[error("illegal instruction")]
    IllegalInstruction,
}

/// Returns the 7-bit *opcode* value of the instruction, or `None` if it isn't supported.
fn opcode(raw_instruction: u32) -> Option<Opcode> {
    #[allow(clippy::unusual_byte_groupings)]
    match raw_instruction & 0x7F {
        0b00_000_11 => Some(Opcode::Load),
        // LoadFp = 0b00_001_11,
        // custom-0
        0b00_011_11 => Some(Opcode::MiscMem),
        0b00_100_11 => Some(Opcode::OpImm),
        0b00_101_11 => Some(Opcode::Auipc),
        // OP-IMM-32
        // 48b
        0b01_000_11 => Some(Opcode::Store),
        // StoreFp = 0b01_001_11,
        // custom-1
        0b01_011_11 => Some(Opcode::Amo),
        0b01_100_11 => Some(Opcode::Op),
        0b01_101_11 => Some(Opcode::Lui),
        // OP-32
        // 64b
        // OpFp = 0b10_100_11,
        // reserved
        // custom-2/rv128
        // 48b
        0b11_000_11 => Some(Opcode::Branch),
        0b11_001_11 => Some(Opcode::Jalr),
        // reserved
        0b11_011_11 => Some(Opcode::Jal),
        0b11_100_11 => Some(Opcode::System),
        // reserved
        // custom-3/rv128
        // >= 80b
        _ => None,
    }
}

/// Returns the 5-bit *rd* value for R-type, I-type, U-type, J-type instructions.
fn rd(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 7) & 0x1F) as u8)
}

/// Returns the 5-bit *rs1* value for R-type, I-type, S-type, B-type instructions.
fn rs1(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 15) & 0x1F) as u8)
}

/// Returns the 5-bit *rs2* value for R-type, S-type, B-type instructions.
fn rs2(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 20) & 0x1F) as u8)
}

/// Returns the 12-bit CSR specifier of Zicsr instructions.
fn csr(raw_instruction: u32) -> CsrSpecifier {
    (raw_instruction >> 20) as CsrSpecifier & 0xFFF
}

fn i_funct(raw_instruction: u32) -> Option<RegImmOp> {
    match funct3(raw_instruction) {
        0b000 => Some(RegImmOp::Addi),
        0b010 => Some(RegImmOp::Slti),
        0b011 => Some(RegImmOp::Sltiu),
        0b100 => Some(RegImmOp::Xori),
        0b110 => Some(RegImmOp::Ori),
        0b111 => Some(RegImmOp::Andi),
        _ => None,
    }
}

fn i_shfunct(raw_instruction: u32) -> Option<RegShiftImmOp> {
    match (funct7(raw_instruction), funct3(raw_instruction)) {
        (0b0000000, 0b001) => Some(RegShiftImmOp::Slli),
        (0b0000000, 0b101) => Some(RegShiftImmOp::Srli),
        (0b0100000, 0b101) => Some(RegShiftImmOp::Srai),
        _ => None,
    }
}

fn i_sys(raw_instruction: u32) -> Option<Instruction> {
    // funct3 is known to be 0b000 here. SFENCE.VMA is the only R-format system instruction;
    // the rest are fully fixed encodings differing in the immediate field.
    if funct7(raw_instruction) == 0b0001001 && u8::from(rd(raw_instruction)) == 0 {
        return Some(Instruction::SfenceVma {
            vaddr: rs1(raw_instruction),
            asid: rs2(raw_instruction),
        });
    }
    if u8::from(rd(raw_instruction)) != 0 || u8::from(rs1(raw_instruction)) != 0 {
        return None;
    }
    match (raw_instruction >> 20) & 0xFFF {
        0x000 => Some(Instruction::Ecall),
        0x001 => Some(Instruction::Ebreak),
        0x102 => Some(Instruction::Sret),
        0x105 => Some(Instruction::Wfi),
        0x302 => Some(Instruction::Mret),
        _ => None,
    }
}

fn i_width(raw_instruction: u32) -> Option<LoadWidth> {
    match funct3(raw_instruction) {
        0b000 => Some(LoadWidth::Lb),
        0b001 => Some(LoadWidth::Lh),
        0b010 => Some(LoadWidth::Lw),
        0b100 => Some(LoadWidth::Lbu),
        0b101 => Some(LoadWidth::Lhu),
        _ => None,
    }
}

fn s_width(raw_instruction: u32) -> Option<StoreWidth> {
    match funct3(raw_instruction) {
        0b000 => Some(StoreWidth::Sb),
        0b001 => Some(StoreWidth::Sh),
        0b010 => Some(StoreWidth::Sw),
        _ => None,
    }
}

fn r_funct(raw_instruction: u32) -> Option<RegRegOp> {
    match (funct7(raw_instruction), funct3(raw_instruction)) {
        (0b0000000, 0b000) => Some(RegRegOp::Add),
        (0b0000000, 0b001) => Some(RegRegOp::Sll),
        (0b0000000, 0b010) => Some(RegRegOp::Slt),
        (0b0000000, 0b011) => Some(RegRegOp::Sltu),
        (0b0000000, 0b100) => Some(RegRegOp::Xor),
        (0b0000000, 0b101) => Some(RegRegOp::Srl),
        (0b0000000, 0b110) => Some(RegRegOp::Or),
        (0b0000000, 0b111) => Some(RegRegOp::And),
        (0b0100000, 0b000) => Some(RegRegOp::Sub),
        (0b0100000, 0b101) => Some(RegRegOp::Sra),
        (0b0000001, 0b000) => Some(RegRegOp::Mul),
        (0b0000001, 0b001) => Some(RegRegOp::Mulh),
        (0b0000001, 0b010) => Some(RegRegOp::Mulhsu),
        (0b0000001, 0b011) => Some(RegRegOp::Mulhu),
        (0b0000001, 0b100) => Some(RegRegOp::Div),
        (0b0000001, 0b101) => Some(RegRegOp::Divu),
        (0b0000001, 0b110) => Some(RegRegOp::Rem),
        (0b0000001, 0b111) => Some(RegRegOp::Remu),
        _ => None,
    }
}

fn amo_funct(raw_instruction: u32) -> Option<AmoOp> {
    if funct3(raw_instruction) != 0b010 {
        return None;
    }
    // funct7[6:2] selects the operation; funct7[1:0] are the aq/rl ordering bits.
    match funct7(raw_instruction) >> 2 {
        0b00010 => Some(AmoOp::LrW),
        0b00011 => Some(AmoOp::ScW),
        0b00001 => Some(AmoOp::Swap),
        0b00000 => Some(AmoOp::Add),
        0b00100 => Some(AmoOp::Xor),
        0b01100 => Some(AmoOp::And),
        0b01000 => Some(AmoOp::Or),
        0b10000 => Some(AmoOp::Min),
        0b10100 => Some(AmoOp::Max),
        0b11000 => Some(AmoOp::Minu),
        0b11100 => Some(AmoOp::Maxu),
        _ => None,
    }
}

fn b_funct(raw_instruction: u32) -> Option<BranchCondition> {
    match funct3(raw_instruction) {
        0b000 => Some(BranchCondition::Beq),
        0b001 => Some(BranchCondition::Bne),
        0b100 => Some(BranchCondition::Blt),
        0b101 => Some(BranchCondition::Bge),
        0b110 => Some(BranchCondition::Bltu),
        0b111 => Some(BranchCondition::Bgeu),
        _ => None,
    }
}

/// Returns the 3-bit *funct3* value for R-type, I-type, S-type, B-type instructions.
fn funct3(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 12) & 0b111) as u8
}

/// Returns the 7-bit *funct7* value for R-type instructions.
fn funct7(raw_instruction: u32) -> u8 {
    (raw_instruction >> 25) as u8
}

/// Returns the 5-bit *shamt* value for shift-immediate instructions.
fn shamt(raw_instruction: u32) -> u32 {
    (raw_instruction >> 20) & 0x1F
}

/// Returns the 12-bit I-immediate sign-extended to 32 bits.
fn i_imm(raw_instruction: u32) -> i32 {
    raw_instruction as i32 >> 20
}

/// Returns the 12-bit S-immediate sign-extended to 32 bits.
fn s_imm(raw_instruction: u32) -> i32 {
    let imm_11_5 = raw_instruction & 0x7F00_0000;
    let imm_4_0 = raw_instruction & 0x0000_0F80;
    (imm_11_5 | (imm_4_0 << 13)) as i32 >> 20
}

/// Returns the 13-bit B-immediate sign-extended to 32 bits.
fn b_imm(raw_instruction: u32) -> i32 {
    let imm_12 = raw_instruction & 0x8000_0000;
    let imm_10_5 = raw_instruction & 0x7E00_0000;
    let imm_4_1 = raw_instruction & 0x0000_0F00;
    let imm_11 = raw_instruction & 0x0000_0080;
    (imm_12 | (imm_11 << 23) | (imm_10_5 >> 1) | (imm_4_1 << 12)) as i32 >> 19
}

/// Returns the signed 32-bit U-immediate.
fn u_imm(raw_instruction: u32) -> i32 {
    (raw_instruction & 0xFFFF_F000) as i32
}

/// Returns the 21-bit J-immediate sign-extended to 32 bits.
fn j_imm(raw_instruction: u32) -> i32 {
    let imm_20 = raw_instruction & 0x8000_0000;
    let imm_10_1 = raw_instruction & 0x7FE0_0000;
    let imm_11 = raw_instruction & 0x0010_0000;
    let imm_19_12 = raw_instruction & 0x000F_F000;
    (imm_20 | (imm_19_12 << 11) | (imm_11 << 2) | (imm_10_1 >> 9)) as i32 >> 11
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Opcode {
    OpImm,
    Auipc,
    Lui,
    Op,
    Amo,
    Jal,
    Jalr,
    Branch,
    Load,
    Store,
    MiscMem,
    System,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x(n: u8) -> Specifier {
        Specifier::from_u5(n)
    }

    #[test]
    fn test_i_imm() {
        assert_eq!(0, i_imm(0x0000_0000));
        assert_eq!(-1, i_imm(0xFFF0_0000));
        assert_eq!(2047, i_imm(2047 << 20));
        assert_eq!(-2048, i_imm(0x8000_0000));
        assert_eq!(-42, i_imm((-42_i32 << 20) as u32));
        // Check other bits are ignored
        assert_eq!(0, i_imm(0x000F_FFFF));
        assert_eq!(-1, i_imm(0xFFF1_2345));
        assert_eq!(1209, i_imm((1209 << 20) | 0x000C_D10A));
    }

    #[test]
    fn test_decode_add() {
        // add x1, x2, x3
        assert_eq!(
            Ok(Instruction::Op {
                op: RegRegOp::Add,
                dest: x(1),
                src1: x(2),
                src2: x(3),
            }),
            Instruction::decode(0x003100B3)
        );
    }

    #[test]
    fn test_decode_mul_div() {
        // mul x5, x6, x7
        assert_eq!(
            Ok(Instruction::Op {
                op: RegRegOp::Mul,
                dest: x(5),
                src1: x(6),
                src2: x(7),
            }),
            Instruction::decode(0x027302B3)
        );
        // divu x10, x11, x12
        assert_eq!(
            Ok(Instruction::Op {
                op: RegRegOp::Divu,
                dest: x(10),
                src1: x(11),
                src2: x(12),
            }),
            Instruction::decode(0x02C5D533)
        );
    }

    #[test]
    fn test_decode_amo() {
        // lr.w x2, (x3)
        assert_eq!(
            Ok(Instruction::Amo {
                op: AmoOp::LrW,
                dest: x(2),
                addr: x(3),
                src: x(0),
            }),
            Instruction::decode(0x1001A12F)
        );
        // sc.w x2, x4, (x3)
        assert_eq!(
            Ok(Instruction::Amo {
                op: AmoOp::ScW,
                dest: x(2),
                addr: x(3),
                src: x(4),
            }),
            Instruction::decode(0x1841A12F)
        );
        // amoadd.w x5, x6, (x7)
        assert_eq!(
            Ok(Instruction::Amo {
                op: AmoOp::Add,
                dest: x(5),
                addr: x(7),
                src: x(6),
            }),
            Instruction::decode(0x0063A2AF)
        );
        // lr.w with rs2 != 0 is reserved
        assert!(Instruction::decode(0x1041A12F).is_err());
    }

    #[test]
    fn test_decode_system() {
        assert_eq!(Ok(Instruction::Ecall), Instruction::decode(0x00000073));
        assert_eq!(Ok(Instruction::Ebreak), Instruction::decode(0x00100073));
        assert_eq!(Ok(Instruction::Sret), Instruction::decode(0x10200073));
        assert_eq!(Ok(Instruction::Mret), Instruction::decode(0x30200073));
        assert_eq!(Ok(Instruction::Wfi), Instruction::decode(0x10500073));
        // sfence.vma x0, x0
        assert_eq!(
            Ok(Instruction::SfenceVma {
                vaddr: x(0),
                asid: x(0),
            }),
            Instruction::decode(0x12000073)
        );
    }

    #[test]
    fn test_decode_csr() {
        // csrrw x1, mstatus, x2
        assert_eq!(
            Ok(Instruction::Csr {
                op: CsrOp::ReadWrite,
                dest: x(1),
                csr: 0x300,
                src: x(2),
            }),
            Instruction::decode(0x300110F3)
        );
        // csrrsi x3, mie, 0b10101
        assert_eq!(
            Ok(Instruction::Csri {
                op: CsrOp::ReadSet,
                dest: x(3),
                csr: 0x304,
                immediate: 0b10101,
            }),
            Instruction::decode(0x304AE1F3)
        );
    }

    #[test]
    fn test_decode_branch_offset() {
        // beq x1, x2, -4
        let Instruction::Branch {
            condition, offset, ..
        } = Instruction::decode(0xFE208EE3).unwrap()
        else {
            panic!("expected branch");
        };
        assert_eq!(BranchCondition::Beq, condition);
        assert_eq!(-4, offset);
    }

    #[test]
    fn test_decode_all_zeros_and_ones() {
        assert!(Instruction::decode(0x0000_0000).is_err());
        assert!(Instruction::decode(0xFFFF_FFFF).is_err());
    }
}
