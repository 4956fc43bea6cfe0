//! Tern virtual machine.
//!
//! Loads a codefile into an [`Assembly`], binds its extern functions and
//! interprets bytecode on a sixteen-register machine with an operand stack.
//!
//! ```no_run
//! use tern_vm::{load_assembly, Vm, VmOptions};
//!
//! let assembly = load_assembly("hello.tn.tbc")?;
//! let mut vm = Vm::new(VmOptions::default());
//! vm.set_assembly(assembly);
//! let result = vm.execute_main()?;
//! println!("{}", result.as_i64());
//! # Ok::<(), tern_vm::VmError>(())
//! ```

pub mod assembly;
pub mod context;
pub mod error;
mod interpreter;
pub mod native;
pub mod options;
pub mod value;
mod vm;

pub use assembly::{load_assembly, Assembly, RtFunction};
pub use context::{ExecutionContext, Flags, JumpRecord};
pub use error::{VmError, VmResult};
pub use native::{HostFunctions, NativeArgs, NATIVE_ARG_COUNT};
pub use options::VmOptions;
pub use value::Value;
pub use vm::Vm;
