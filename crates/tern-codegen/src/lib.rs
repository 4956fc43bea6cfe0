//! Tern code generator: lowers a checked AST into a codefile.
//!
//! The entry point is [`emit`]. Register allocation lives in
//! [`registers`], instruction selection in [`assembler`], and jump layout
//! (8-bit jumps widened to 16-bit where needed) in [`code_buffer`].

pub mod assembler;
pub mod code_buffer;
pub mod emitter;
pub mod error;
pub mod function;
pub mod options;
pub mod registers;
pub mod symbol_table;
pub mod tmp_value;

pub use code_buffer::{CodeBuffer, FinishedCode, Label};
pub use emitter::{emit, EmitOutput};
pub use error::{CodegenError, CodegenResult};
pub use function::{CallingConvention, FunctionStats};
pub use options::{EmitOptions, OptLevel};
pub use registers::{Reg, RegisterPool, MAX_REGISTER_ARGS, RETURN_REG};
pub use symbol_table::SymbolTable;
