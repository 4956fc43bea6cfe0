//! The embedding facade: load an assembly, link its externs, run `Main`.

use tern_bytecode::FileType;
use tracing::{debug, info};

use crate::assembly::{Assembly, RtFunction};
use crate::context::{ExecutionContext, JumpRecord};
use crate::error::{VmError, VmResult};
use crate::interpreter::Interpreter;
use crate::native::{HostFunctions, Linker, NativeFn};
use crate::options::VmOptions;
use crate::value::Value;

pub struct Vm {
    options: VmOptions,
    host: HostFunctions,
    linker: Linker,
    assembly: Option<Assembly>,
    /// Live global values; reset from the assembly on every run.
    globals: Vec<Value>,
    natives: Vec<Option<NativeFn>>,
    context: ExecutionContext,
}

impl Vm {
    pub fn new(options: VmOptions) -> Self {
        let linker = Linker::new(options.library_paths.clone());
        Self {
            options,
            host: HostFunctions::new(),
            linker,
            assembly: None,
            globals: Vec::new(),
            natives: Vec::new(),
            context: ExecutionContext::new(),
        }
    }

    pub fn with_host_functions(mut self, host: HostFunctions) -> Self {
        self.host = host;
        self
    }

    pub fn host_functions_mut(&mut self) -> &mut HostFunctions {
        &mut self.host
    }

    /// Install `assembly`, replacing any previous one.
    pub fn set_assembly(&mut self, assembly: Assembly) {
        self.globals = assembly.globals.clone();
        self.natives = vec![None; assembly.functions.len()];
        self.assembly = Some(assembly);
    }

    pub fn assembly(&self) -> Option<&Assembly> {
        self.assembly.as_ref()
    }

    /// Resolve every extern. Fails on the first one that cannot be bound,
    /// before any bytecode runs.
    fn link(&mut self) -> VmResult<()> {
        let assembly = self.assembly.as_ref().ok_or(VmError::NoAssembly)?;
        let mut natives = Vec::with_capacity(assembly.functions.len());
        for function in &assembly.functions {
            natives.push(match function {
                RtFunction::Native { library, symbol } => {
                    Some(self.linker.resolve(&self.host, library, symbol)?)
                }
                RtFunction::Bytecode { .. } => None,
            });
        }
        self.natives = natives;
        Ok(())
    }

    /// Run the entry point and return its result.
    #[tracing::instrument(skip(self))]
    pub fn execute_main(&mut self) -> VmResult<Value> {
        let (entry, file_type, initial) = match &self.assembly {
            Some(a) => (a.entry, a.file_type, a.globals.clone()),
            None => return Err(VmError::NoAssembly),
        };
        if file_type == FileType::Module {
            return Err(VmError::NoEntryPoint);
        }
        self.link()?;
        self.globals = initial;
        self.context.reset();

        let Self {
            options,
            assembly,
            globals,
            natives,
            context,
            ..
        } = self;
        let assembly = assembly.as_ref().ok_or(VmError::NoAssembly)?;
        let mut interpreter = Interpreter {
            assembly,
            globals,
            natives,
            options: &*options,
            ctx: &mut *context,
        };
        let result = interpreter.call(entry);
        match &result {
            Ok(value) => info!(result = value.as_i64(), steps = context.steps, "main returned"),
            Err(e) => debug!(error = %e, "execution failed"),
        }
        result
    }

    /// Current value of global `index`.
    pub fn global(&self, index: usize) -> Option<Value> {
        self.globals.get(index).copied()
    }

    /// Jumps taken by the last run, when `trace_jumps` is on.
    pub fn jump_trace(&self) -> &[JumpRecord] {
        &self.context.jumps
    }

    /// Instructions executed by the last run.
    pub fn steps(&self) -> u64 {
        self.context.steps
    }

    /// Arrays still allocated after the last run.
    pub fn live_arrays(&self) -> usize {
        self.context.arrays.live()
    }
}
