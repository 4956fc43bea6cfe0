//! Compile-time records for functions, locals and globals.

use serde::Serialize;
use tern_types::{Span, TypeDecl};

use crate::registers::MAX_REGISTER_ARGS;
use crate::symbol_table::SymbolTable;

/// How a function receives its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CallingConvention {
    /// Every argument in `r1..r10`.
    #[default]
    Register,
    /// The first ten in registers, the rest on the stack.
    RegS,
    /// Every argument on the stack (unoptimised builds).
    Stack,
}

impl CallingConvention {
    /// Convention for a bytecode function with `params` parameters.
    pub fn select(params: usize, optimize: bool) -> Self {
        if !optimize {
            CallingConvention::Stack
        } else if params <= MAX_REGISTER_ARGS as usize {
            CallingConvention::Register
        } else {
            CallingConvention::RegS
        }
    }

    /// How many of `params` arguments travel in registers.
    pub fn register_args(self, params: usize) -> u16 {
        match self {
            CallingConvention::Stack => 0,
            CallingConvention::Register | CallingConvention::RegS => {
                params.min(MAX_REGISTER_ARGS as usize) as u16
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStorage {
    Register(u8),
    /// Slot counted upward from the frame pointer.
    Stack(u16),
}

impl Default for LocalStorage {
    fn default() -> Self {
        LocalStorage::Stack(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Local {
    pub ty: TypeDecl,
    pub storage: LocalStorage,
    pub initialized: bool,
    pub is_param: bool,
    pub span: Span,
}

/// Library and symbol of an extern function, as string-table indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeLink {
    pub library: u32,
    pub symbol: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Function {
    pub ret: TypeDecl,
    pub params: Vec<TypeDecl>,
    /// Parameters, then locals added while the body is emitted.
    pub locals: SymbolTable<Local>,
    pub convention: CallingConvention,
    pub register_args: u16,
    pub stack_args: u16,
    pub native: Option<NativeLink>,
    pub span: Span,
}

impl Function {
    pub fn arg_count(&self) -> usize {
        self.params.len()
    }

    pub fn is_native(&self) -> bool {
        self.native.is_some()
    }

    /// Frame slot of stack parameter `param`. The last argument is pushed
    /// first, so it sits deepest at slot 0.
    pub fn param_slot(&self, param: usize) -> u16 {
        let from_first_stack_arg = (param - self.register_args as usize) as u16;
        self.stack_args - 1 - from_first_stack_arg
    }
}

#[derive(Debug, Clone, Default)]
pub struct Global {
    pub ty: TypeDecl,
    /// Initial value as raw bits.
    pub bits: u64,
    pub span: Span,
}

/// Inline constant from a `const` item.
#[derive(Debug, Clone, Copy)]
pub struct ConstValue {
    pub ty: TypeDecl,
    pub bits: u64,
}

/// What emission of one function produced, for tests and tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionStats {
    pub name: String,
    pub index: u32,
    pub convention: CallingConvention,
    pub register_args: u16,
    pub stack_args: u16,
    pub local_reserve: u16,
    pub code_size: usize,
    pub short_jumps: usize,
    pub wide_jumps: usize,
    /// Registers still allocated at the end that are not parameter or
    /// local homes. Always zero unless the emitter has a bug.
    pub leaked_registers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convention_boundary_is_ten() {
        assert_eq!(CallingConvention::select(0, true), CallingConvention::Register);
        assert_eq!(CallingConvention::select(10, true), CallingConvention::Register);
        assert_eq!(CallingConvention::select(11, true), CallingConvention::RegS);
        assert_eq!(CallingConvention::select(3, false), CallingConvention::Stack);
        assert_eq!(CallingConvention::RegS.register_args(13), 10);
        assert_eq!(CallingConvention::Stack.register_args(13), 0);
    }

    #[test]
    fn last_stack_param_is_deepest() {
        let f = Function {
            params: vec![TypeDecl::int(); 13],
            register_args: 10,
            stack_args: 3,
            ..Function::default()
        };
        assert_eq!(f.param_slot(10), 2);
        assert_eq!(f.param_slot(12), 0);
    }
}
