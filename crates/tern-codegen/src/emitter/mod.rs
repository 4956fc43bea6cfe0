//! AST to codefile lowering.
//!
//! Two passes over the program:
//! 1. [`predeclare`] fills the global, constant and function tables and
//!    picks each function's calling convention, so calls can be emitted
//!    before their callee's body.
//! 2. Every function body is lowered into a [`CodeBuffer`], then laid out.
//!
//! User mistakes are reported into [`CompileErrors`] and emission carries on;
//! only internal failures (register exhaustion, broken invariants) abort
//! through [`CodegenError`].

mod call;
mod expr;
mod predeclare;
mod stmt;

use std::collections::HashMap;

use tern_bytecode::{CodeFile, FileType, FunctionEntry, FunctionKind, GlobalEntry, Instruction};
use tern_types::ast::{FunctionDecl, Program};
use tern_types::{CompileErrors, ErrorCode, Primitive, SourceFile, Span, TernError, TypeDecl};
use tracing::debug;

use crate::assembler;
use crate::code_buffer::{CodeBuffer, Label};
use crate::error::{CodegenError, CodegenResult};
use crate::function::{ConstValue, Function, FunctionStats, Global, Local, LocalStorage};
use crate::options::{EmitOptions, OptLevel};
use crate::registers::{Reg, RegisterPool};
use crate::symbol_table::SymbolTable;
use crate::tmp_value::{Place, TmpValue};

/// Registers kept free for temporaries when `OptLevel::Fast` homes locals.
const SCRATCH_RESERVE: usize = 5;

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Everything one emit produced. `codefile` must not be used when `errors`
/// is non-empty.
#[derive(Debug)]
pub struct EmitOutput {
    pub codefile: CodeFile,
    pub errors: CompileErrors,
    /// One entry per bytecode function, in function-table order.
    pub functions: Vec<FunctionStats>,
}

impl EmitOutput {
    pub fn stats(&self, name: &str) -> Option<&FunctionStats> {
        self.functions.iter().find(|s| s.name == name)
    }
}

/// Lower `program` into a codefile.
pub fn emit(
    program: &Program,
    source: &SourceFile,
    options: EmitOptions,
) -> CodegenResult<EmitOutput> {
    let mut emitter = Emitter::new(source, options);
    emitter.predeclare(program);

    let mut bodies = vec![None; emitter.functions.len()];
    let declared = emitter.declared.clone();
    for (decl, slot) in program.functions().zip(declared) {
        if emitter.errors.at_limit() {
            break;
        }
        let Some(slot) = slot else { continue };
        if decl.body.is_some() && !emitter.is_native(slot) {
            bodies[slot] = Some(emitter.emit_function(slot, decl)?);
        }
    }

    let codefile = emitter.build_codefile(bodies);
    Ok(EmitOutput {
        codefile,
        errors: emitter.errors,
        functions: emitter.stats,
    })
}

/// A laid-out function body.
#[derive(Debug, Clone)]
struct Body {
    local_reserve: u16,
    stack_args: u16,
    code: Vec<u8>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Emitter
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) struct Emitter<'a> {
    source: &'a SourceFile,
    options: EmitOptions,
    functions: SymbolTable<Function>,
    globals: SymbolTable<Global>,
    consts: HashMap<String, ConstValue>,
    /// Interned strings: literals, library names and symbol names.
    strings: SymbolTable<()>,
    /// Function-table slot of each function item in source order, `None`
    /// when the declaration was rejected.
    declared: Vec<Option<usize>>,
    entry: u32,
    errors: CompileErrors,
    stats: Vec<FunctionStats>,
}

impl<'a> Emitter<'a> {
    pub fn new(source: &'a SourceFile, options: EmitOptions) -> Self {
        Self {
            source,
            options,
            functions: SymbolTable::new(),
            globals: SymbolTable::new(),
            consts: HashMap::new(),
            strings: SymbolTable::new(),
            declared: Vec::new(),
            entry: 0,
            errors: CompileErrors::empty(),
            stats: Vec::new(),
        }
    }

    fn optimize(&self) -> bool {
        self.options.opt_level != OptLevel::None
    }

    fn is_native(&self, index: usize) -> bool {
        self.functions.get(index).is_some_and(Function::is_native)
    }

    // ── Diagnostics ──────────────────────────────────────────────────────

    fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source.line(span.start_line).unwrap_or("");
        let error = TernError::new(&self.source.name, code, message, span, source_line);
        self.errors.push_error(error);
    }

    /// Index of `text` in the string table, adding it on first use.
    fn intern(&mut self, text: &str, span: Span) -> u32 {
        if text.len() > u16::MAX as usize {
            self.error(
                ErrorCode::LIMIT_EXCEEDED,
                format!("string of {} bytes exceeds the 65535-byte limit", text.len()),
                span,
            );
        }
        match self.strings.find(text) {
            Some(idx) => idx as u32,
            None => {
                self.strings.add(text);
                (self.strings.len() - 1) as u32
            }
        }
    }

    // ── Function bodies ──────────────────────────────────────────────────

    #[tracing::instrument(skip_all, fields(function = %decl.name.name))]
    fn emit_function(&mut self, index: usize, decl: &FunctionDecl) -> CodegenResult<Body> {
        let func = self
            .functions
            .get(index)
            .ok_or_else(|| CodegenError::Internal(format!("no function at index {index}")))?;
        let mut code = CodeBuffer::new();
        let end_label = code.new_label();
        let mut f = FuncState {
            name: decl.name.name.clone(),
            ret: func.ret,
            locals: func.locals.clone(),
            stack_args: func.stack_args,
            local_reserve: 0,
            pool: RegisterPool::new(),
            homes: Vec::new(),
            code,
            end_label,
            end_jumps: 0,
            returns: 0,
            epilogue_done: false,
        };

        let param_regs: Vec<u8> = f
            .locals
            .iter()
            .filter_map(|(_, local)| match local.storage {
                LocalStorage::Register(r) => Some(r),
                LocalStorage::Stack(_) => None,
            })
            .collect();
        for r in param_regs {
            let reg = f.pool.reserve(r).ok_or_else(|| {
                CodegenError::Internal(format!("parameter register r{r} reserved twice"))
            })?;
            f.homes.push(reg);
        }

        let falls_through = match &decl.body {
            Some(body) => {
                self.emit_body(&mut f, body)?;
                !stmt::block_always_returns(body)
            }
            None => true,
        };

        if !f.ret.is_void() && f.returns == 0 {
            self.error(
                ErrorCode::MISSING_RETURN,
                format!(
                    "function '{}' must return a value of type {}",
                    f.name, f.ret
                ),
                decl.name.span,
            );
        } else if !f.ret.is_void() && falls_through {
            self.error(
                ErrorCode::MISSING_RETURN,
                format!("not every path through '{}' returns a value", f.name),
                decl.name.span,
            );
        }

        f.code.bind(f.end_label);
        if !f.epilogue_done {
            self.emit_epilogue(&mut f)?;
        }

        let leaked_registers = f.pool.in_use().saturating_sub(f.homes.len());
        for reg in std::mem::take(&mut f.homes) {
            f.pool.free(reg);
        }

        let finished = f.code.finish()?;
        let func = self
            .functions
            .get(index)
            .ok_or_else(|| CodegenError::Internal(format!("no function at index {index}")))?;
        let stats = FunctionStats {
            name: f.name.clone(),
            index: index as u32,
            convention: func.convention,
            register_args: func.register_args,
            stack_args: func.stack_args,
            local_reserve: f.local_reserve,
            code_size: finished.bytes.len(),
            short_jumps: finished.short_jumps,
            wide_jumps: finished.wide_jumps,
            leaked_registers,
        };
        debug!(
            size = stats.code_size,
            short_jumps = stats.short_jumps,
            wide_jumps = stats.wide_jumps,
            leaked = stats.leaked_registers,
            "function emitted"
        );
        self.stats.push(stats);

        Ok(Body {
            local_reserve: f.local_reserve,
            stack_args: f.stack_args,
            code: finished.bytes,
        })
    }

    /// Free array locals, then return.
    fn emit_epilogue(&mut self, f: &mut FuncState) -> CodegenResult<()> {
        let arrays: Vec<LocalStorage> = f
            .locals
            .iter()
            .filter(|(_, l)| !l.is_param && l.ty.is_owned_array())
            .map(|(_, l)| l.storage)
            .collect();
        for storage in arrays {
            match storage {
                LocalStorage::Register(reg) => f.code.emit(Instruction::ArrayDestroy { reg }),
                LocalStorage::Stack(slot) => {
                    let scratch = f.alloc()?;
                    assembler::local_get(&mut f.code, scratch.index(), slot);
                    f.code.emit(Instruction::ArrayDestroy {
                        reg: scratch.index(),
                    });
                    f.pool.free(scratch);
                }
            }
        }
        f.code.emit(if f.ret.is_void() {
            Instruction::RetVoid
        } else {
            Instruction::Ret
        });
        Ok(())
    }

    // ── Codefile ─────────────────────────────────────────────────────────

    fn build_codefile(&self, bodies: Vec<Option<Body>>) -> CodeFile {
        let mut file = CodeFile::new(self.options.file_type);
        file.entry = self.entry;

        for (index, (_, func)) in self.functions.iter().enumerate() {
            let kind = match func.native {
                Some(link) => FunctionKind::Native {
                    library: link.library,
                    symbol: link.symbol,
                },
                None => {
                    let body = bodies.get(index).cloned().flatten().unwrap_or(Body {
                        local_reserve: 0,
                        stack_args: func.stack_args,
                        code: Vec::new(),
                    });
                    FunctionKind::Bytecode {
                        local_reserve: body.local_reserve,
                        stack_args: body.stack_args,
                        code: body.code,
                    }
                }
            };
            file.functions.push(FunctionEntry { kind });
        }

        for (_, global) in self.globals.iter() {
            let primitive = if global.ty.is_scalar() {
                global.ty.primitive
            } else {
                Primitive::Any
            };
            file.globals.push(GlobalEntry {
                primitive,
                bits: global.bits,
            });
        }

        file.strings = self
            .strings
            .iter()
            .map(|(text, _)| text.as_bytes().to_vec())
            .collect();
        file
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// FuncState: per-function emission state
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) struct FuncState {
    pub name: String,
    pub ret: TypeDecl,
    pub locals: SymbolTable<Local>,
    pub stack_args: u16,
    /// Stack slots handed to locals so far.
    pub local_reserve: u16,
    pub pool: RegisterPool,
    /// Registers owned by parameters and register locals for the whole body.
    pub homes: Vec<Reg>,
    pub code: CodeBuffer,
    pub end_label: Label,
    /// Returns that jump to `end_label`.
    pub end_jumps: usize,
    pub returns: usize,
    /// Set when the last return already ended the function (`retlocal`).
    pub epilogue_done: bool,
}

impl FuncState {
    pub fn alloc(&mut self) -> CodegenResult<Reg> {
        self.pool
            .allocate()
            .ok_or_else(|| CodegenError::RegisterAllocationExhausted {
                function: self.name.clone(),
            })
    }

    pub fn has_owned_arrays(&self) -> bool {
        self.locals
            .iter()
            .any(|(_, l)| !l.is_param && l.ty.is_owned_array())
    }
}

/// A value sitting in a register, ready to be an instruction operand.
pub(crate) enum Operand {
    /// A temporary this operand owns.
    Owned(Reg),
    /// Someone else's register (a register local); do not write or free.
    Borrowed(u8),
}

impl Operand {
    pub fn index(&self) -> u8 {
        match self {
            Operand::Owned(reg) => reg.index(),
            Operand::Borrowed(idx) => *idx,
        }
    }
}

impl<'a> Emitter<'a> {
    /// Materialise `value` into a register.
    pub(crate) fn operand(&mut self, f: &mut FuncState, value: TmpValue) -> CodegenResult<Operand> {
        let reg = match value.place {
            Place::Register(reg) => return Ok(Operand::Owned(reg)),
            Place::LocalRegister { reg } => return Ok(Operand::Borrowed(reg)),
            Place::Local { slot } => {
                let reg = f.alloc()?;
                assembler::local_get(&mut f.code, reg.index(), slot);
                reg
            }
            Place::Global { index } => {
                let reg = f.alloc()?;
                assembler::global_get(&mut f.code, reg.index(), index);
                reg
            }
            Place::Constant { bits } => {
                let reg = f.alloc()?;
                assembler::load_const(&mut f.code, reg.index(), bits, &value.ty);
                reg
            }
            Place::Error | Place::Void | Place::Flags => {
                return Err(CodegenError::Internal(
                    "materialising an expression with no value".into(),
                ))
            }
        };
        Ok(Operand::Owned(reg))
    }

    pub(crate) fn release(&mut self, f: &mut FuncState, operand: Operand) {
        if let Operand::Owned(reg) = operand {
            f.pool.free(reg);
        }
    }

    /// Drop a value that is not needed, freeing its temporary.
    pub(crate) fn discard(&mut self, f: &mut FuncState, value: TmpValue) {
        if let Place::Register(reg) = value.place {
            f.pool.free(reg);
        }
    }

    /// Put `value` into the numbered register `target` without allocating.
    pub(crate) fn load_into(
        &mut self,
        f: &mut FuncState,
        target: u8,
        value: TmpValue,
    ) -> CodegenResult<()> {
        match value.place {
            Place::Register(reg) => {
                assembler::mov(&mut f.code, target, reg.index());
                f.pool.free(reg);
            }
            Place::LocalRegister { reg } => assembler::mov(&mut f.code, target, reg),
            Place::Local { slot } => assembler::local_get(&mut f.code, target, slot),
            Place::Global { index } => assembler::global_get(&mut f.code, target, index),
            Place::Constant { bits } => assembler::load_const(&mut f.code, target, bits, &value.ty),
            Place::Error | Place::Void | Place::Flags => {
                return Err(CodegenError::Internal(format!(
                    "loading an expression with no value into r{target}"
                )))
            }
        }
        Ok(())
    }

    /// Pick a home for a new scalar local.
    pub(crate) fn place_local(&mut self, f: &mut FuncState, span: Span) -> CodegenResult<LocalStorage> {
        if self.options.opt_level == OptLevel::Fast && f.pool.available() > SCRATCH_RESERVE {
            let reg = f.alloc()?;
            let idx = reg.index();
            f.homes.push(reg);
            return Ok(LocalStorage::Register(idx));
        }
        self.stack_slot(f, span)
    }

    pub(crate) fn stack_slot(&mut self, f: &mut FuncState, span: Span) -> CodegenResult<LocalStorage> {
        let slot = f.stack_args.checked_add(f.local_reserve);
        match slot.and_then(|s| f.local_reserve.checked_add(1).map(|r| (s, r))) {
            Some((slot, reserve)) => {
                f.local_reserve = reserve;
                Ok(LocalStorage::Stack(slot))
            }
            None => {
                self.error(
                    ErrorCode::LIMIT_EXCEEDED,
                    format!("function '{}' has too many stack slots", f.name),
                    span,
                );
                Ok(LocalStorage::Stack(0))
            }
        }
    }
}

/// Whether a module of `file_type` needs a `Main`.
fn needs_entry(file_type: FileType) -> bool {
    file_type == FileType::Executable
}
