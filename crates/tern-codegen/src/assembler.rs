//! Stateless instruction selection.
//!
//! Each helper appends one operation to a [`CodeBuffer`], choosing the
//! narrowest encoding its operands allow. Operand validity is the caller's
//! business.

use tern_bytecode::{ArithOp, Cond, ImmOp, Instruction, NumKind};
use tern_types::TypeDecl;

use crate::code_buffer::CodeBuffer;

/// Bits needed to encode `value` as an unsigned immediate: 4, 8, 16, 32 or 64.
pub fn immediate_width(value: u64) -> u32 {
    match value {
        0..=0xF => 4,
        0x10..=0xFF => 8,
        0x100..=0xFFFF => 16,
        0x1_0000..=0xFFFF_FFFF => 32,
        _ => 64,
    }
}

/// Load an integer constant using `ldi4` through `ldi64`.
pub fn load_int(code: &mut CodeBuffer, dst: u8, value: u64) {
    let insn = match immediate_width(value) {
        4 => Instruction::Ldi4 {
            dst,
            value: value as u8,
        },
        8 => Instruction::Ldi8 {
            dst,
            value: value as u8,
        },
        16 => Instruction::Ldi16 {
            dst,
            value: value as u16,
        },
        32 => Instruction::Ldi32 {
            dst,
            value: value as u32,
        },
        _ => Instruction::Ldi64 { dst, value },
    };
    code.emit(insn);
}

/// Load constant bits whose meaning is given by `ty`.
pub fn load_const(code: &mut CodeBuffer, dst: u8, bits: u64, ty: &TypeDecl) {
    if ty.is_const_string() {
        code.emit(Instruction::Ldstr {
            dst,
            index: bits as u32,
        });
    } else if ty.is_float() {
        code.emit(Instruction::Ldf {
            dst,
            value: f64::from_bits(bits),
        });
    } else {
        load_int(code, dst, bits);
    }
}

pub fn mov(code: &mut CodeBuffer, dst: u8, src: u8) {
    if dst != src {
        code.emit(Instruction::Mov { dst, src });
    }
}

/// Operand interpretation for a value of type `ty`.
pub fn num_kind(ty: &TypeDecl) -> NumKind {
    if ty.is_float() {
        NumKind::Float
    } else if ty.is_unsigned() {
        NumKind::Unsigned
    } else {
        NumKind::Signed
    }
}

pub fn arith(code: &mut CodeBuffer, op: ArithOp, kind: NumKind, dst: u8, a: u8, b: u8) {
    code.emit(Instruction::Arith { op, kind, dst, a, b });
}

/// Emit `dst = src op imm` in an immediate form if `imm` has one.
///
/// Returns `false` without emitting when the constant needs a register.
pub fn arith_imm(code: &mut CodeBuffer, op: ArithOp, dst: u8, src: u8, imm: u64) -> bool {
    let op = match op {
        ArithOp::Add => ImmOp::Add,
        ArithOp::Sub => ImmOp::Sub,
        ArithOp::Mul => ImmOp::Mul,
        ArithOp::Div => return false,
    };
    if imm == 1 && matches!(op, ImmOp::Add | ImmOp::Sub) {
        mov(code, dst, src);
        code.emit(match op {
            ImmOp::Add => Instruction::Inc { reg: dst },
            _ => Instruction::Dec { reg: dst },
        });
        return true;
    }
    if let Ok(imm) = u8::try_from(imm) {
        code.emit(Instruction::ArithImm8 { op, dst, src, imm });
        true
    } else if let Ok(imm) = u16::try_from(imm) {
        code.emit(Instruction::ArithImm16 { op, dst, src, imm });
        true
    } else {
        false
    }
}

pub fn negate(code: &mut CodeBuffer, ty: &TypeDecl, dst: u8, src: u8) {
    if ty.is_float() {
        code.emit(Instruction::FNeg { dst, src });
    } else {
        code.emit(Instruction::Neg { dst, src });
    }
}

pub fn compare(code: &mut CodeBuffer, ty: &TypeDecl, a: u8, b: u8) {
    code.emit(Instruction::Compare {
        kind: num_kind(ty),
        a,
        b,
    });
}

pub fn test_zero(code: &mut CodeBuffer, reg: u8) {
    code.emit(Instruction::TestZ { reg });
}

pub fn push(code: &mut CodeBuffer, reg: u8) {
    code.emit(Instruction::Push { reg });
}

pub fn pop(code: &mut CodeBuffer, reg: u8) {
    code.emit(Instruction::Pop { reg });
}

pub fn local_get(code: &mut CodeBuffer, reg: u8, slot: u16) {
    code.emit(Instruction::LocalGet { reg, slot });
}

pub fn local_set(code: &mut CodeBuffer, reg: u8, slot: u16) {
    code.emit(Instruction::LocalSet { reg, slot });
}

pub fn global_get(code: &mut CodeBuffer, reg: u8, index: u32) {
    code.emit(Instruction::GlobalGet { reg, index });
}

pub fn global_set(code: &mut CodeBuffer, reg: u8, index: u32) {
    code.emit(Instruction::GlobalSet { reg, index });
}

/// `call8` when the function index fits a byte, else `call`.
pub fn call(code: &mut CodeBuffer, func: u32) {
    match u8::try_from(func) {
        Ok(func) => code.emit(Instruction::Call8 { func }),
        Err(_) => code.emit(Instruction::Call { func }),
    }
}

pub fn jump(code: &mut CodeBuffer, cond: Cond, label: crate::code_buffer::Label) {
    code.jump(cond, label);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitted(f: impl FnOnce(&mut CodeBuffer)) -> Vec<u8> {
        let mut code = CodeBuffer::new();
        f(&mut code);
        code.finish().unwrap().bytes
    }

    #[test]
    fn constants_pick_narrowest_load() {
        assert_eq!(emitted(|c| load_int(c, 1, 14)), vec![0x02, 0x1E]);
        assert_eq!(emitted(|c| load_int(c, 1, 200)), vec![0x03, 0x10, 200]);
        assert_eq!(emitted(|c| load_int(c, 2, 0x1234)).len(), 4);
        assert_eq!(emitted(|c| load_int(c, 2, 0x12345)).len(), 6);
        assert_eq!(emitted(|c| load_int(c, 2, u64::MAX)).len(), 10);
    }

    #[test]
    fn widths_at_boundaries() {
        assert_eq!(immediate_width(15), 4);
        assert_eq!(immediate_width(16), 8);
        assert_eq!(immediate_width(255), 8);
        assert_eq!(immediate_width(256), 16);
        assert_eq!(immediate_width(1 << 32), 64);
    }

    #[test]
    fn plus_one_becomes_inc() {
        let bytes = emitted(|c| {
            assert!(arith_imm(c, ArithOp::Add, 2, 2, 1));
        });
        assert_eq!(bytes, vec![0x22, 0x20]);
        let bytes = emitted(|c| {
            assert!(arith_imm(c, ArithOp::Sub, 3, 1, 1));
        });
        // mov r3, r1 ; dec r3
        assert_eq!(bytes, vec![0x01, 0x31, 0x23, 0x30]);
    }

    #[test]
    fn immediate_forms_and_fallback() {
        assert_eq!(
            emitted(|c| assert!(arith_imm(c, ArithOp::Mul, 1, 1, 4))),
            vec![0x20, 0x11, 4]
        );
        assert_eq!(
            emitted(|c| assert!(arith_imm(c, ArithOp::Add, 1, 2, 1000))).len(),
            4
        );
        let mut code = CodeBuffer::new();
        assert!(!arith_imm(&mut code, ArithOp::Add, 1, 1, 70_000));
        assert!(!arith_imm(&mut code, ArithOp::Div, 1, 1, 2));
        assert!(code.is_empty());
    }

    #[test]
    fn call_width_follows_index() {
        assert_eq!(emitted(|c| call(c, 3)), vec![0x61, 3]);
        assert_eq!(emitted(|c| call(c, 256)), vec![0x60, 0, 1, 0, 0]);
    }

    #[test]
    fn compare_kind_follows_type() {
        assert_eq!(emitted(|c| compare(c, &TypeDecl::int(), 1, 2)), vec![0x31, 0x12]);
        assert_eq!(emitted(|c| compare(c, &TypeDecl::uint(), 1, 2)), vec![0x30, 0x12]);
        assert_eq!(emitted(|c| compare(c, &TypeDecl::float(), 1, 2)), vec![0x32, 0x12]);
    }
}
