//! The dispatch loop.
//!
//! One [`Interpreter::call`] per bytecode call frame; nested calls recurse on
//! the host stack and share the [`ExecutionContext`].

use tern_bytecode::{ArithOp, DecodeError, ImmOp, Instruction, NumKind};
use tracing::trace;

use crate::assembly::{Assembly, RtFunction};
use crate::context::{ExecutionContext, Flags, JumpRecord};
use crate::error::{VmError, VmResult};
use crate::native::{NativeArgs, NativeFn, NATIVE_ARG_COUNT};
use crate::options::VmOptions;
use crate::value::Value;

pub(crate) struct Interpreter<'a> {
    pub assembly: &'a Assembly,
    pub globals: &'a mut [Value],
    /// Resolved externs, indexed like the function table.
    pub natives: &'a [Option<NativeFn>],
    pub options: &'a VmOptions,
    pub ctx: &'a mut ExecutionContext,
}

/// Where the current instruction sits, for error reports.
#[derive(Clone, Copy)]
struct Site {
    function: u32,
    offset: usize,
}

impl<'a> Interpreter<'a> {
    /// Run function `index` to completion. Its result is also left in `r0`.
    pub fn call(&mut self, index: u32) -> VmResult<Value> {
        let assembly = self.assembly;
        let function = assembly
            .function(index)
            .ok_or(VmError::BadFunction { index })?;
        match function {
            RtFunction::Native { .. } => self.call_native(index),
            RtFunction::Bytecode {
                local_reserve,
                stack_args,
                code,
            } => {
                if self.ctx.depth >= self.options.max_call_depth {
                    return Err(VmError::CallDepthExceeded {
                        limit: self.options.max_call_depth,
                    });
                }
                let fp = self
                    .ctx
                    .stack
                    .len()
                    .checked_sub(*stack_args as usize)
                    .ok_or(VmError::StackUnderflow {
                        function: index,
                        offset: 0,
                    })?;
                let locals_end = self.ctx.stack.len() + *local_reserve as usize;
                self.ctx.stack.resize(locals_end, Value::ZERO);

                self.ctx.depth += 1;
                let result = self.run(index, code, fp, locals_end);
                self.ctx.depth -= 1;
                self.ctx.stack.truncate(fp);
                let value = result?;
                self.ctx.set_reg(0, value);
                Ok(value)
            }
        }
    }

    fn call_native(&mut self, index: u32) -> VmResult<Value> {
        let native = self
            .natives
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(VmError::BadFunction { index })?;
        let mut args: NativeArgs = [Value::ZERO; NATIVE_ARG_COUNT];
        args.copy_from_slice(&self.ctx.regs[1..=NATIVE_ARG_COUNT]);
        let value = native.call(&args);
        self.ctx.set_reg(0, value);
        Ok(value)
    }

    fn tick(&mut self) -> VmResult<()> {
        self.ctx.steps += 1;
        match self.options.max_steps {
            Some(limit) if self.ctx.steps > limit => Err(VmError::StepLimitExceeded { limit }),
            _ => Ok(()),
        }
    }

    fn slot(&self, site: Site, fp: usize, slot: u16) -> VmResult<usize> {
        let at = fp + slot as usize;
        if at < self.ctx.stack.len() {
            Ok(at)
        } else {
            Err(VmError::BadSlot {
                function: site.function,
                offset: site.offset,
                slot,
            })
        }
    }

    fn global_index(&self, site: Site, index: u32) -> VmResult<usize> {
        let i = index as usize;
        if i < self.globals.len() {
            Ok(i)
        } else {
            Err(VmError::BadGlobal {
                function: site.function,
                offset: site.offset,
                index,
            })
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Dispatch
    // ══════════════════════════════════════════════════════════════════════════

    fn run(&mut self, function: u32, code: &[u8], fp: usize, locals_end: usize) -> VmResult<Value> {
        let mut ip = 0usize;
        loop {
            if ip >= code.len() {
                return Err(VmError::FellOffEnd { function });
            }
            self.tick()?;
            let (insn, len) = Instruction::decode(code, ip)
                .map_err(|source: DecodeError| VmError::InvalidInstruction { function, source })?;
            let site = Site {
                function,
                offset: ip,
            };
            let next = ip + len;
            ip = next;

            match insn {
                Instruction::Nop => {}
                Instruction::Mov { dst, src } => {
                    let v = self.ctx.reg(src);
                    self.ctx.set_reg(dst, v);
                }

                // ── Loads ─────────────────────────────────────────────────────
                Instruction::Ldi4 { dst, value } | Instruction::Ldi8 { dst, value } => {
                    self.ctx.set_reg(dst, Value::from_u64(value as u64))
                }
                Instruction::Ldi16 { dst, value } => self.ctx.set_reg(dst, Value::from_u64(value as u64)),
                Instruction::Ldi32 { dst, value } => self.ctx.set_reg(dst, Value::from_u64(value as u64)),
                Instruction::Ldi64 { dst, value } => self.ctx.set_reg(dst, Value::from_u64(value)),
                Instruction::Ldf { dst, value } => self.ctx.set_reg(dst, Value::from_f64(value)),
                Instruction::Ldstr { dst, index } => {
                    let s = self.assembly.strings.get(index as usize).ok_or(VmError::BadString {
                        function,
                        offset: site.offset,
                        index,
                    })?;
                    self.ctx.set_reg(dst, Value::from_ptr(s.as_ptr()));
                }

                // ── Arithmetic ────────────────────────────────────────────────
                Instruction::Arith { op, kind, dst, a, b } => {
                    let v = arith(site, op, kind, self.ctx.reg(a), self.ctx.reg(b))?;
                    self.ctx.set_reg(dst, v);
                }
                Instruction::ArithImm8 { op, dst, src, imm } => {
                    let v = arith_imm(op, self.ctx.reg(src), imm as u64);
                    self.ctx.set_reg(dst, v);
                }
                Instruction::ArithImm16 { op, dst, src, imm } => {
                    let v = arith_imm(op, self.ctx.reg(src), imm as u64);
                    self.ctx.set_reg(dst, v);
                }
                Instruction::Inc { reg } => {
                    let v = self.ctx.reg(reg).as_u64().wrapping_add(1);
                    self.ctx.set_reg(reg, Value::from_u64(v));
                }
                Instruction::Dec { reg } => {
                    let v = self.ctx.reg(reg).as_u64().wrapping_sub(1);
                    self.ctx.set_reg(reg, Value::from_u64(v));
                }
                Instruction::Neg { dst, src } => {
                    let v = self.ctx.reg(src).as_i64().wrapping_neg();
                    self.ctx.set_reg(dst, Value::from_i64(v));
                }
                Instruction::FNeg { dst, src } => {
                    let v = -self.ctx.reg(src).as_f64();
                    self.ctx.set_reg(dst, Value::from_f64(v));
                }

                // ── Comparison and jumps ──────────────────────────────────────
                Instruction::Compare { kind, a, b } => {
                    let (a, b) = (self.ctx.reg(a), self.ctx.reg(b));
                    self.ctx.flags = match kind {
                        NumKind::Signed => Flags::signed(a.as_i64(), b.as_i64()),
                        NumKind::Unsigned => Flags::unsigned(a.as_u64(), b.as_u64()),
                        NumKind::Float => Flags::float(a.as_f64(), b.as_f64()),
                    };
                }
                Instruction::TestZ { reg } => {
                    self.ctx.flags = Flags::signed(self.ctx.reg(reg).as_i64(), 0);
                }
                Instruction::Jump8 { cond, offset } => {
                    if self.ctx.flags.holds(cond) {
                        ip = next + offset as usize;
                        self.record_jump(site, ip);
                    }
                }
                Instruction::Jump16 { cond, offset } => {
                    if self.ctx.flags.holds(cond) {
                        ip = next + offset as usize;
                        self.record_jump(site, ip);
                    }
                }

                // ── Stack, locals and globals ─────────────────────────────────
                Instruction::Push { reg } => {
                    let v = self.ctx.reg(reg);
                    self.ctx.stack.push(v);
                }
                Instruction::Pop { reg } => {
                    if self.ctx.stack.len() <= locals_end {
                        return Err(VmError::StackUnderflow {
                            function,
                            offset: site.offset,
                        });
                    }
                    let v = self.ctx.stack.pop().unwrap_or_default();
                    self.ctx.set_reg(reg, v);
                }
                Instruction::LocalGet { reg, slot } => {
                    let at = self.slot(site, fp, slot)?;
                    let v = self.ctx.stack[at];
                    self.ctx.set_reg(reg, v);
                }
                Instruction::LocalSet { reg, slot } => {
                    let at = self.slot(site, fp, slot)?;
                    self.ctx.stack[at] = self.ctx.reg(reg);
                }
                Instruction::GlobalGet { reg, index } => {
                    let i = self.global_index(site, index)?;
                    let v = self.globals[i];
                    self.ctx.set_reg(reg, v);
                }
                Instruction::GlobalSet { reg, index } => {
                    let i = self.global_index(site, index)?;
                    self.globals[i] = self.ctx.reg(reg);
                }

                // ── Calls and returns ─────────────────────────────────────────
                Instruction::Call { func } => {
                    self.call(func)?;
                }
                Instruction::Call8 { func } => {
                    self.call(func as u32)?;
                }
                Instruction::Ret => return Ok(self.ctx.reg(0)),
                Instruction::RetVoid => return Ok(Value::ZERO),
                Instruction::RetLocal { slot } => {
                    let at = self.slot(site, fp, slot)?;
                    return Ok(self.ctx.stack[at]);
                }
                Instruction::RetGlobal { index } => {
                    let i = self.global_index(site, index)?;
                    return Ok(self.globals[i]);
                }

                // ── Arrays ────────────────────────────────────────────────────
                Instruction::ArrayNew { dst, len } => {
                    let handle = self.ctx.arrays.create(self.ctx.reg(len).as_u64())?;
                    self.ctx.set_reg(dst, Value::from_handle(handle));
                }
                Instruction::ArrayGet { dst, array, index } => {
                    let handle = self.ctx.reg(array).as_handle();
                    let i = self.ctx.reg(index).as_u64();
                    let v = self.ctx.arrays.get(handle, i)?;
                    self.ctx.set_reg(dst, v);
                }
                Instruction::ArraySet { array, index, value } => {
                    let handle = self.ctx.reg(array).as_handle();
                    let i = self.ctx.reg(index).as_u64();
                    let v = self.ctx.reg(value);
                    self.ctx.arrays.set(handle, i, v)?;
                }
                Instruction::ArrayDestroy { reg } => {
                    let handle = self.ctx.reg(reg).as_handle();
                    self.ctx.arrays.destroy(handle)?;
                }
            }
        }
    }

    fn record_jump(&mut self, site: Site, to: usize) {
        trace!(function = site.function, from = site.offset, to, "jump");
        if self.options.trace_jumps {
            self.ctx.jumps.push(JumpRecord {
                function: site.function,
                from: site.offset,
                to,
            });
        }
    }
}

fn arith(site: Site, op: ArithOp, kind: NumKind, a: Value, b: Value) -> VmResult<Value> {
    let div_zero = || VmError::DivisionByZero {
        function: site.function,
        offset: site.offset,
    };
    Ok(match kind {
        NumKind::Signed => {
            let (a, b) = (a.as_i64(), b.as_i64());
            Value::from_i64(match op {
                ArithOp::Add => a.wrapping_add(b),
                ArithOp::Sub => a.wrapping_sub(b),
                ArithOp::Mul => a.wrapping_mul(b),
                ArithOp::Div => {
                    if b == 0 {
                        return Err(div_zero());
                    }
                    a.wrapping_div(b)
                }
            })
        }
        NumKind::Unsigned => {
            let (a, b) = (a.as_u64(), b.as_u64());
            Value::from_u64(match op {
                ArithOp::Add => a.wrapping_add(b),
                ArithOp::Sub => a.wrapping_sub(b),
                ArithOp::Mul => a.wrapping_mul(b),
                ArithOp::Div => a.checked_div(b).ok_or_else(div_zero)?,
            })
        }
        NumKind::Float => {
            let (a, b) = (a.as_f64(), b.as_f64());
            Value::from_f64(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
            })
        }
    })
}

/// Immediate forms are sign-agnostic: wrapping add, sub and mul give the
/// same bits for signed and unsigned operands.
fn arith_imm(op: ImmOp, a: Value, imm: u64) -> Value {
    let a = a.as_u64();
    Value::from_u64(match op {
        ImmOp::Add => a.wrapping_add(imm),
        ImmOp::Sub => a.wrapping_sub(imm),
        ImmOp::Mul => a.wrapping_mul(imm),
    })
}
