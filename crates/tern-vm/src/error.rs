//! Runtime error types for the Tern VM.
//!
//! Every fault ends the current execution; bytecode cannot catch anything.

use tern_bytecode::{DecodeError, LoadError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("no assembly is loaded")]
    NoAssembly,

    #[error("the assembly is a module and has no entry point")]
    NoEntryPoint,

    #[error("cannot link '{symbol}' from library '{library}': {reason}")]
    Link {
        library: String,
        symbol: String,
        reason: String,
    },

    #[error("fn#{function}: {source}")]
    InvalidInstruction {
        function: u32,
        #[source]
        source: DecodeError,
    },

    #[error("fn#{function}: execution ran past the end of the code")]
    FellOffEnd { function: u32 },

    #[error("call to nonexistent function #{index}")]
    BadFunction { index: u32 },

    #[error("fn#{function}+{offset:#06x}: global #{index} does not exist")]
    BadGlobal {
        function: u32,
        offset: usize,
        index: u32,
    },

    #[error("fn#{function}+{offset:#06x}: string #{index} does not exist")]
    BadString {
        function: u32,
        offset: usize,
        index: u32,
    },

    #[error("fn#{function}+{offset:#06x}: stack slot {slot} is outside the frame")]
    BadSlot {
        function: u32,
        offset: usize,
        slot: u16,
    },

    #[error("fn#{function}+{offset:#06x}: stack underflow")]
    StackUnderflow { function: u32, offset: usize },

    #[error("fn#{function}+{offset:#06x}: integer division by zero")]
    DivisionByZero { function: u32, offset: usize },

    #[error("call depth exceeded the limit of {limit}")]
    CallDepthExceeded { limit: usize },

    #[error("step limit of {limit} instructions exceeded")]
    StepLimitExceeded { limit: u64 },

    #[error("array operation on a null handle")]
    NullArray,

    #[error("array handle {handle} is not live")]
    StaleArray { handle: u32 },

    #[error("array index {index} out of bounds for length {len}")]
    ArrayIndexOutOfBounds { index: u64, len: usize },

    #[error("array of {len} elements exceeds the limit of {limit}")]
    ArrayTooLarge { len: u64, limit: usize },
}

/// Result alias for VM operations.
pub type VmResult<T> = Result<T, VmError>;
