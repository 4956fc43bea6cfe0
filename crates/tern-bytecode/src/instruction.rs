//! Typed instructions and their byte encoding.
//!
//! Register operands are 4-bit fields packed two per byte, high nibble
//! first; an unused nibble is written as zero. Multi-byte immediates are
//! little-endian. [`Instruction::encode`] and [`Instruction::decode`] are the
//! only place that knows the layout, so the emitter and the VM cannot drift.

use std::fmt;

use thiserror::Error;

use crate::opcode::Opcode;

/// Number of architectural registers.
pub const REGISTER_COUNT: usize = 16;

/// How operand bits are interpreted by arithmetic and comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumKind {
    Signed,
    Unsigned,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Operations with an 8/16-bit immediate form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmOp {
    Add,
    Sub,
    Mul,
}

/// Jump condition, read from the flags set by the last compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Always,
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cond {
    pub fn negate(self) -> Cond {
        match self {
            Cond::Always => Cond::Always,
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Ge => Cond::Lt,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
        }
    }

    fn short_opcode(self) -> Opcode {
        match self {
            Cond::Always => Opcode::Jmp8,
            Cond::Eq => Opcode::Je8,
            Cond::Ne => Opcode::Jne8,
            Cond::Lt => Opcode::Jl8,
            Cond::Ge => Opcode::Jge8,
            Cond::Gt => Opcode::Jg8,
            Cond::Le => Opcode::Jle8,
        }
    }

    fn from_jump_byte(byte: u8) -> Cond {
        match (byte - Opcode::Jmp8.byte()) / 2 {
            0 => Cond::Always,
            1 => Cond::Eq,
            2 => Cond::Ne,
            3 => Cond::Lt,
            4 => Cond::Ge,
            5 => Cond::Gt,
            _ => Cond::Le,
        }
    }
}

/// One decoded instruction. Register fields hold values in `0..16`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Nop,
    Mov { dst: u8, src: u8 },
    Ldi4 { dst: u8, value: u8 },
    Ldi8 { dst: u8, value: u8 },
    Ldi16 { dst: u8, value: u16 },
    Ldi32 { dst: u8, value: u32 },
    Ldi64 { dst: u8, value: u64 },
    Ldf { dst: u8, value: f64 },
    Ldstr { dst: u8, index: u32 },
    Arith { op: ArithOp, kind: NumKind, dst: u8, a: u8, b: u8 },
    ArithImm8 { op: ImmOp, dst: u8, src: u8, imm: u8 },
    ArithImm16 { op: ImmOp, dst: u8, src: u8, imm: u16 },
    Inc { reg: u8 },
    Dec { reg: u8 },
    Neg { dst: u8, src: u8 },
    FNeg { dst: u8, src: u8 },
    /// `cmp` (unsigned), `icmp` (signed) or `fcmp`.
    Compare { kind: NumKind, a: u8, b: u8 },
    TestZ { reg: u8 },
    /// Offset is relative to the following instruction.
    Jump8 { cond: Cond, offset: u8 },
    Jump16 { cond: Cond, offset: u16 },
    Push { reg: u8 },
    Pop { reg: u8 },
    LocalGet { reg: u8, slot: u16 },
    LocalSet { reg: u8, slot: u16 },
    GlobalGet { reg: u8, index: u32 },
    GlobalSet { reg: u8, index: u32 },
    Call { func: u32 },
    Call8 { func: u8 },
    Ret,
    RetVoid,
    RetLocal { slot: u16 },
    RetGlobal { index: u32 },
    ArrayNew { dst: u8, len: u8 },
    ArrayGet { dst: u8, array: u8, index: u8 },
    ArraySet { array: u8, index: u8, value: u8 },
    ArrayDestroy { reg: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode 0x{opcode:02x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("truncated instruction at offset {offset}")]
    Truncated { offset: usize },
}

fn pack(hi: u8, lo: u8) -> u8 {
    (hi << 4) | (lo & 0x0F)
}

fn unpack(byte: u8) -> (u8, u8) {
    (byte >> 4, byte & 0x0F)
}

/// Operand bytes following one opcode.
struct Operands<'a> {
    bytes: &'a [u8],
    /// Offset of the opcode, for error reports.
    at: usize,
}

impl<'a> Operands<'a> {
    fn take(&self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.bytes
            .get(..n)
            .ok_or(DecodeError::Truncated { offset: self.at })
    }

    fn regs(&self) -> Result<(u8, u8), DecodeError> {
        Ok(unpack(self.take(1)?[0]))
    }

    fn u16_at(&self, i: usize) -> Result<u16, DecodeError> {
        let b = self.take(i + 2)?;
        Ok(u16::from_le_bytes([b[i], b[i + 1]]))
    }

    fn u32_at(&self, i: usize) -> Result<u32, DecodeError> {
        let b = self.take(i + 4)?;
        Ok(u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]))
    }

    fn u64_at(&self, i: usize) -> Result<u64, DecodeError> {
        let b = self.take(i + 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&b[i..i + 8]);
        Ok(u64::from_le_bytes(raw))
    }
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        use Instruction as I;
        match *self {
            I::Nop => Opcode::Nop,
            I::Mov { .. } => Opcode::Mov,
            I::Ldi4 { .. } => Opcode::Ldi4,
            I::Ldi8 { .. } => Opcode::Ldi8,
            I::Ldi16 { .. } => Opcode::Ldi16,
            I::Ldi32 { .. } => Opcode::Ldi32,
            I::Ldi64 { .. } => Opcode::Ldi64,
            I::Ldf { .. } => Opcode::Ldf,
            I::Ldstr { .. } => Opcode::Ldstr,
            I::Arith { op, kind, .. } => match (op, kind) {
                (ArithOp::Add, NumKind::Signed) => Opcode::Add,
                (ArithOp::Add, NumKind::Unsigned) => Opcode::UAdd,
                (ArithOp::Add, NumKind::Float) => Opcode::FAdd,
                (ArithOp::Sub, NumKind::Signed) => Opcode::Sub,
                (ArithOp::Sub, NumKind::Unsigned) => Opcode::USub,
                (ArithOp::Sub, NumKind::Float) => Opcode::FSub,
                (ArithOp::Mul, NumKind::Signed) => Opcode::Mul,
                (ArithOp::Mul, NumKind::Unsigned) => Opcode::UMul,
                (ArithOp::Mul, NumKind::Float) => Opcode::FMul,
                (ArithOp::Div, NumKind::Signed) => Opcode::Div,
                (ArithOp::Div, NumKind::Unsigned) => Opcode::UDiv,
                (ArithOp::Div, NumKind::Float) => Opcode::FDiv,
            },
            I::ArithImm8 { op, .. } => match op {
                ImmOp::Add => Opcode::Add8,
                ImmOp::Sub => Opcode::Sub8,
                ImmOp::Mul => Opcode::Mul8,
            },
            I::ArithImm16 { op, .. } => match op {
                ImmOp::Add => Opcode::Add16,
                ImmOp::Sub => Opcode::Sub16,
                ImmOp::Mul => Opcode::Mul16,
            },
            I::Inc { .. } => Opcode::Inc,
            I::Dec { .. } => Opcode::Dec,
            I::Neg { .. } => Opcode::Neg,
            I::FNeg { .. } => Opcode::FNeg,
            I::Compare { kind, .. } => match kind {
                NumKind::Unsigned => Opcode::Cmp,
                NumKind::Signed => Opcode::ICmp,
                NumKind::Float => Opcode::FCmp,
            },
            I::TestZ { .. } => Opcode::TestZ,
            I::Jump8 { cond, .. } => cond.short_opcode(),
            I::Jump16 { cond, .. } => {
                Opcode::from_byte(cond.short_opcode().byte() + 1).unwrap_or(Opcode::Jmp16)
            }
            I::Push { .. } => Opcode::Push,
            I::Pop { .. } => Opcode::Pop,
            I::LocalGet { .. } => Opcode::LocalGet,
            I::LocalSet { .. } => Opcode::LocalSet,
            I::GlobalGet { .. } => Opcode::GlobalGet,
            I::GlobalSet { .. } => Opcode::GlobalSet,
            I::Call { .. } => Opcode::Call,
            I::Call8 { .. } => Opcode::Call8,
            I::Ret => Opcode::Ret,
            I::RetVoid => Opcode::RetVoid,
            I::RetLocal { .. } => Opcode::RetLocal,
            I::RetGlobal { .. } => Opcode::RetGlobal,
            I::ArrayNew { .. } => Opcode::ArrayNew,
            I::ArrayGet { .. } => Opcode::ArrayGet,
            I::ArraySet { .. } => Opcode::ArraySet,
            I::ArrayDestroy { .. } => Opcode::ArrayDestroy,
        }
    }

    /// Encoded size in bytes, opcode included.
    pub fn encoded_len(&self) -> usize {
        use Instruction as I;
        match self {
            I::Nop | I::Ret | I::RetVoid => 1,
            I::Mov { .. }
            | I::Ldi4 { .. }
            | I::Inc { .. }
            | I::Dec { .. }
            | I::Neg { .. }
            | I::FNeg { .. }
            | I::Compare { .. }
            | I::TestZ { .. }
            | I::Jump8 { .. }
            | I::Push { .. }
            | I::Pop { .. }
            | I::Call8 { .. }
            | I::ArrayNew { .. }
            | I::ArrayDestroy { .. } => 2,
            I::Ldi8 { .. }
            | I::Arith { .. }
            | I::ArithImm8 { .. }
            | I::Jump16 { .. }
            | I::RetLocal { .. }
            | I::ArrayGet { .. }
            | I::ArraySet { .. } => 3,
            I::Ldi16 { .. } | I::ArithImm16 { .. } | I::LocalGet { .. } | I::LocalSet { .. } => 4,
            I::Call { .. } | I::RetGlobal { .. } => 5,
            I::Ldi32 { .. } | I::Ldstr { .. } | I::GlobalGet { .. } | I::GlobalSet { .. } => 6,
            I::Ldi64 { .. } | I::Ldf { .. } => 10,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        use Instruction as I;
        out.push(self.opcode().byte());
        match *self {
            I::Nop | I::Ret | I::RetVoid => {}
            I::Mov { dst, src } | I::Neg { dst, src } | I::FNeg { dst, src } => {
                out.push(pack(dst, src))
            }
            I::Ldi4 { dst, value } => out.push(pack(dst, value)),
            I::Ldi8 { dst, value } => out.extend_from_slice(&[pack(dst, 0), value]),
            I::Ldi16 { dst, value } => {
                out.push(pack(dst, 0));
                out.extend_from_slice(&value.to_le_bytes());
            }
            I::Ldi32 { dst, value } | I::Ldstr { dst, index: value } => {
                out.push(pack(dst, 0));
                out.extend_from_slice(&value.to_le_bytes());
            }
            I::Ldi64 { dst, value } => {
                out.push(pack(dst, 0));
                out.extend_from_slice(&value.to_le_bytes());
            }
            I::Ldf { dst, value } => {
                out.push(pack(dst, 0));
                out.extend_from_slice(&value.to_bits().to_le_bytes());
            }
            I::Arith { dst, a, b, .. } => out.extend_from_slice(&[pack(dst, a), pack(b, 0)]),
            I::ArithImm8 { dst, src, imm, .. } => out.extend_from_slice(&[pack(dst, src), imm]),
            I::ArithImm16 { dst, src, imm, .. } => {
                out.push(pack(dst, src));
                out.extend_from_slice(&imm.to_le_bytes());
            }
            I::Inc { reg }
            | I::Dec { reg }
            | I::TestZ { reg }
            | I::Push { reg }
            | I::Pop { reg }
            | I::ArrayDestroy { reg } => out.push(pack(reg, 0)),
            I::Compare { a, b, .. } => out.push(pack(a, b)),
            I::Jump8 { offset, .. } => out.push(offset),
            I::Jump16 { offset, .. } => out.extend_from_slice(&offset.to_le_bytes()),
            I::LocalGet { reg, slot } | I::LocalSet { reg, slot } => {
                out.push(pack(reg, 0));
                out.extend_from_slice(&slot.to_le_bytes());
            }
            I::GlobalGet { reg, index } | I::GlobalSet { reg, index } => {
                out.push(pack(reg, 0));
                out.extend_from_slice(&index.to_le_bytes());
            }
            I::Call { func } => out.extend_from_slice(&func.to_le_bytes()),
            I::Call8 { func } => out.push(func),
            I::RetLocal { slot } => out.extend_from_slice(&slot.to_le_bytes()),
            I::RetGlobal { index } => out.extend_from_slice(&index.to_le_bytes()),
            I::ArrayNew { dst, len } => out.push(pack(dst, len)),
            I::ArrayGet { dst, array, index } => {
                out.extend_from_slice(&[pack(dst, array), pack(index, 0)])
            }
            I::ArraySet {
                array,
                index,
                value,
            } => out.extend_from_slice(&[pack(array, index), pack(value, 0)]),
        }
    }

    /// Decode the instruction starting at `code[at]`, returning it together
    /// with its encoded length.
    pub fn decode(code: &[u8], at: usize) -> Result<(Instruction, usize), DecodeError> {
        use Instruction as I;

        let byte = *code.get(at).ok_or(DecodeError::Truncated { offset: at })?;
        let opcode = Opcode::from_byte(byte).ok_or(DecodeError::InvalidOpcode {
            opcode: byte,
            offset: at,
        })?;
        let ops = Operands {
            bytes: &code[at + 1..],
            at,
        };
        let regs = || ops.regs();
        let u16_at = |i: usize| ops.u16_at(i);
        let u32_at = |i: usize| ops.u32_at(i);
        let u64_at = |i: usize| ops.u64_at(i);
        let need = |n: usize| ops.take(n);
        let arith = |op: ArithOp, kind: NumKind| -> Result<Instruction, DecodeError> {
            let b = ops.take(2)?;
            let (dst, a) = unpack(b[0]);
            let (rb, _) = unpack(b[1]);
            Ok(I::Arith { op, kind, dst, a, b: rb })
        };
        let imm8 = |op: ImmOp| -> Result<Instruction, DecodeError> {
            let b = ops.take(2)?;
            let (dst, src) = unpack(b[0]);
            Ok(I::ArithImm8 {
                op,
                dst,
                src,
                imm: b[1],
            })
        };
        let imm16 = |op: ImmOp| -> Result<Instruction, DecodeError> {
            let (dst, src) = ops.regs()?;
            Ok(I::ArithImm16 {
                op,
                dst,
                src,
                imm: ops.u16_at(1)?,
            })
        };

        let insn = match opcode {
            Opcode::Nop => I::Nop,
            Opcode::Mov => {
                let (dst, src) = regs()?;
                I::Mov { dst, src }
            }
            Opcode::Ldi4 => {
                let (dst, value) = regs()?;
                I::Ldi4 { dst, value }
            }
            Opcode::Ldi8 => I::Ldi8 {
                dst: regs()?.0,
                value: need(2)?[1],
            },
            Opcode::Ldi16 => I::Ldi16 {
                dst: regs()?.0,
                value: u16_at(1)?,
            },
            Opcode::Ldi32 => I::Ldi32 {
                dst: regs()?.0,
                value: u32_at(1)?,
            },
            Opcode::Ldi64 => I::Ldi64 {
                dst: regs()?.0,
                value: u64_at(1)?,
            },
            Opcode::Ldf => I::Ldf {
                dst: regs()?.0,
                value: f64::from_bits(u64_at(1)?),
            },
            Opcode::Ldstr => I::Ldstr {
                dst: regs()?.0,
                index: u32_at(1)?,
            },
            Opcode::Add => arith(ArithOp::Add, NumKind::Signed)?,
            Opcode::UAdd => arith(ArithOp::Add, NumKind::Unsigned)?,
            Opcode::FAdd => arith(ArithOp::Add, NumKind::Float)?,
            Opcode::Sub => arith(ArithOp::Sub, NumKind::Signed)?,
            Opcode::USub => arith(ArithOp::Sub, NumKind::Unsigned)?,
            Opcode::FSub => arith(ArithOp::Sub, NumKind::Float)?,
            Opcode::Mul => arith(ArithOp::Mul, NumKind::Signed)?,
            Opcode::UMul => arith(ArithOp::Mul, NumKind::Unsigned)?,
            Opcode::FMul => arith(ArithOp::Mul, NumKind::Float)?,
            Opcode::Div => arith(ArithOp::Div, NumKind::Signed)?,
            Opcode::UDiv => arith(ArithOp::Div, NumKind::Unsigned)?,
            Opcode::FDiv => arith(ArithOp::Div, NumKind::Float)?,
            Opcode::Add8 => imm8(ImmOp::Add)?,
            Opcode::Sub8 => imm8(ImmOp::Sub)?,
            Opcode::Mul8 => imm8(ImmOp::Mul)?,
            Opcode::Add16 => imm16(ImmOp::Add)?,
            Opcode::Sub16 => imm16(ImmOp::Sub)?,
            Opcode::Mul16 => imm16(ImmOp::Mul)?,
            Opcode::Inc => I::Inc { reg: regs()?.0 },
            Opcode::Dec => I::Dec { reg: regs()?.0 },
            Opcode::Neg => {
                let (dst, src) = regs()?;
                I::Neg { dst, src }
            }
            Opcode::FNeg => {
                let (dst, src) = regs()?;
                I::FNeg { dst, src }
            }
            Opcode::Cmp | Opcode::ICmp | Opcode::FCmp => {
                let (a, b) = regs()?;
                let kind = match opcode {
                    Opcode::Cmp => NumKind::Unsigned,
                    Opcode::ICmp => NumKind::Signed,
                    _ => NumKind::Float,
                };
                I::Compare { kind, a, b }
            }
            Opcode::TestZ => I::TestZ { reg: regs()?.0 },
            Opcode::Jmp8
            | Opcode::Je8
            | Opcode::Jne8
            | Opcode::Jl8
            | Opcode::Jge8
            | Opcode::Jg8
            | Opcode::Jle8 => I::Jump8 {
                cond: Cond::from_jump_byte(byte),
                offset: need(1)?[0],
            },
            Opcode::Jmp16
            | Opcode::Je16
            | Opcode::Jne16
            | Opcode::Jl16
            | Opcode::Jge16
            | Opcode::Jg16
            | Opcode::Jle16 => I::Jump16 {
                cond: Cond::from_jump_byte(byte),
                offset: u16_at(0)?,
            },
            Opcode::Push => I::Push { reg: regs()?.0 },
            Opcode::Pop => I::Pop { reg: regs()?.0 },
            Opcode::LocalGet => I::LocalGet {
                reg: regs()?.0,
                slot: u16_at(1)?,
            },
            Opcode::LocalSet => I::LocalSet {
                reg: regs()?.0,
                slot: u16_at(1)?,
            },
            Opcode::GlobalGet => I::GlobalGet {
                reg: regs()?.0,
                index: u32_at(1)?,
            },
            Opcode::GlobalSet => I::GlobalSet {
                reg: regs()?.0,
                index: u32_at(1)?,
            },
            Opcode::Call => I::Call { func: u32_at(0)? },
            Opcode::Call8 => I::Call8 {
                func: need(1)?[0],
            },
            Opcode::Ret => I::Ret,
            Opcode::RetVoid => I::RetVoid,
            Opcode::RetLocal => I::RetLocal { slot: u16_at(0)? },
            Opcode::RetGlobal => I::RetGlobal { index: u32_at(0)? },
            Opcode::ArrayNew => {
                let (dst, len) = regs()?;
                I::ArrayNew { dst, len }
            }
            Opcode::ArrayGet => {
                let b = need(2)?;
                let (dst, array) = unpack(b[0]);
                I::ArrayGet {
                    dst,
                    array,
                    index: unpack(b[1]).0,
                }
            }
            Opcode::ArraySet => {
                let b = need(2)?;
                let (array, index) = unpack(b[0]);
                I::ArraySet {
                    array,
                    index,
                    value: unpack(b[1]).0,
                }
            }
            Opcode::ArrayDestroy => I::ArrayDestroy { reg: regs()?.0 },
        };

        let len = insn.encoded_len();
        Ok((insn, len))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction as I;
        let m = self.opcode().mnemonic();
        match *self {
            I::Nop | I::Ret | I::RetVoid => f.write_str(m),
            I::Mov { dst, src } | I::Neg { dst, src } | I::FNeg { dst, src } => {
                write!(f, "{m} r{dst}, r{src}")
            }
            I::Ldi4 { dst, value } | I::Ldi8 { dst, value } => write!(f, "{m} r{dst}, {value}"),
            I::Ldi16 { dst, value } => write!(f, "{m} r{dst}, {value}"),
            I::Ldi32 { dst, value } => write!(f, "{m} r{dst}, {value}"),
            I::Ldi64 { dst, value } => write!(f, "{m} r{dst}, {value}"),
            I::Ldf { dst, value } => write!(f, "{m} r{dst}, {value:?}"),
            I::Ldstr { dst, index } => write!(f, "{m} r{dst}, str#{index}"),
            I::Arith { dst, a, b, .. } => write!(f, "{m} r{dst}, r{a}, r{b}"),
            I::ArithImm8 { dst, src, imm, .. } => write!(f, "{m} r{dst}, r{src}, {imm}"),
            I::ArithImm16 { dst, src, imm, .. } => write!(f, "{m} r{dst}, r{src}, {imm}"),
            I::Inc { reg }
            | I::Dec { reg }
            | I::TestZ { reg }
            | I::Push { reg }
            | I::Pop { reg }
            | I::ArrayDestroy { reg } => write!(f, "{m} r{reg}"),
            I::Compare { a, b, .. } => write!(f, "{m} r{a}, r{b}"),
            I::Jump8 { offset, .. } => write!(f, "{m} +{offset}"),
            I::Jump16 { offset, .. } => write!(f, "{m} +{offset}"),
            I::LocalGet { reg, slot } | I::LocalSet { reg, slot } => {
                write!(f, "{m} r{reg}, [fp+{slot}]")
            }
            I::GlobalGet { reg, index } | I::GlobalSet { reg, index } => {
                write!(f, "{m} r{reg}, g{index}")
            }
            I::Call { func } => write!(f, "{m} fn#{func}"),
            I::Call8 { func } => write!(f, "{m} fn#{func}"),
            I::RetLocal { slot } => write!(f, "{m} [fp+{slot}]"),
            I::RetGlobal { index } => write!(f, "{m} g{index}"),
            I::ArrayNew { dst, len } => write!(f, "{m} r{dst}, r{len}"),
            I::ArrayGet { dst, array, index } => write!(f, "{m} r{dst}, r{array}[r{index}]"),
            I::ArraySet {
                array,
                index,
                value,
            } => write!(f, "{m} r{array}[r{index}], r{value}"),
        }
    }
}
