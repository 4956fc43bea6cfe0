//! The Tern codefile: opcodes, instruction encoding, the container format
//! and a disassembler.
//!
//! The emitter writes through this crate and the VM reads through it; neither
//! encodes bytes by hand.

pub mod codefile;
pub mod disasm;
pub mod instruction;
pub mod opcode;

pub use codefile::{
    CodeFile, FileType, FunctionEntry, FunctionFlags, FunctionKind, GlobalEntry, LoadError,
    LoadResult, HEADER_SIZE, SIGNATURE, VERSION_MAJOR, VERSION_MINOR,
};
pub use disasm::{decode_function, disassemble};
pub use instruction::{
    ArithOp, Cond, DecodeError, ImmOp, Instruction, NumKind, REGISTER_COUNT,
};
pub use opcode::Opcode;
