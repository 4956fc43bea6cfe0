//! Function body under construction: instructions plus symbolic jumps.
//!
//! Jumps name a [`Label`] instead of an offset. [`CodeBuffer::finish`] lays
//! the body out once all labels are bound: every jump starts in its 8-bit
//! form, any whose offset does not fit is widened, and layout repeats until
//! nothing changes. Widening only moves later code further away, so the
//! loop terminates. Jumps are forward only.

use tern_bytecode::{Cond, Instruction};

use crate::error::{CodegenError, CodegenResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone)]
enum Op {
    Insn(Instruction),
    Jump { cond: Cond, label: Label },
}

#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    ops: Vec<Op>,
    /// Op index each label is bound before; `None` until bound.
    labels: Vec<Option<usize>>,
}

/// A laid-out body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedCode {
    pub bytes: Vec<u8>,
    pub short_jumps: usize,
    pub wide_jumps: usize,
}

impl FinishedCode {
    /// Size the body would have with every jump in its 16-bit form.
    pub fn all_wide_size(&self) -> usize {
        self.bytes.len() + self.short_jumps
    }
}

const SHORT_JUMP_LEN: usize = 2;
const WIDE_JUMP_LEN: usize = 3;

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, insn: Instruction) {
        self.ops.push(Op::Insn(insn));
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next instruction emitted.
    pub fn bind(&mut self, label: Label) {
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(self.ops.len());
        }
    }

    pub fn jump(&mut self, cond: Cond, label: Label) {
        self.ops.push(Op::Jump { cond, label });
    }

    /// The most recent instruction, if it was not a jump.
    pub fn last_insn(&self) -> Option<&Instruction> {
        match self.ops.last() {
            Some(Op::Insn(insn)) => Some(insn),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn finish(&self) -> CodegenResult<FinishedCode> {
        let targets = self
            .ops
            .iter()
            .map(|op| match op {
                Op::Jump { label, .. } => self
                    .labels
                    .get(label.0)
                    .copied()
                    .flatten()
                    .map(Some)
                    .ok_or_else(|| CodegenError::Internal(format!("label {} never bound", label.0))),
                Op::Insn(_) => Ok(None),
            })
            .collect::<CodegenResult<Vec<Option<usize>>>>()?;

        let mut wide = vec![false; self.ops.len()];
        let addrs = loop {
            let addrs = self.layout(&wide);
            let mut changed = false;
            for (i, target) in targets.iter().enumerate() {
                let Some(target) = *target else { continue };
                if wide[i] {
                    continue;
                }
                let next = addrs[i] + SHORT_JUMP_LEN;
                let dest = addrs[target];
                if dest < next {
                    return Err(CodegenError::Internal(format!(
                        "backward jump at op {i}"
                    )));
                }
                if dest - next > u8::MAX as usize {
                    wide[i] = true;
                    changed = true;
                }
            }
            if !changed {
                break addrs;
            }
        };

        let mut bytes = Vec::with_capacity(addrs[self.ops.len()]);
        let (mut short_jumps, mut wide_jumps) = (0, 0);
        for (i, op) in self.ops.iter().enumerate() {
            let insn = match op {
                Op::Insn(insn) => *insn,
                Op::Jump { cond, .. } => {
                    let target = targets[i].unwrap_or(i);
                    if wide[i] {
                        let offset = addrs[target] - (addrs[i] + WIDE_JUMP_LEN);
                        let offset = u16::try_from(offset).map_err(|_| {
                            CodegenError::LimitExceeded(format!(
                                "jump of {offset} bytes does not fit in 16 bits"
                            ))
                        })?;
                        wide_jumps += 1;
                        Instruction::Jump16 {
                            cond: *cond,
                            offset,
                        }
                    } else {
                        short_jumps += 1;
                        Instruction::Jump8 {
                            cond: *cond,
                            offset: (addrs[target] - (addrs[i] + SHORT_JUMP_LEN)) as u8,
                        }
                    }
                }
            };
            insn.encode(&mut bytes);
        }

        Ok(FinishedCode {
            bytes,
            short_jumps,
            wide_jumps,
        })
    }

    /// Byte address of every op, plus one trailing entry for the end.
    fn layout(&self, wide: &[bool]) -> Vec<usize> {
        let mut addrs = Vec::with_capacity(self.ops.len() + 1);
        let mut at = 0;
        for (i, op) in self.ops.iter().enumerate() {
            addrs.push(at);
            at += match op {
                Op::Insn(insn) => insn.encoded_len(),
                Op::Jump { .. } if wide[i] => WIDE_JUMP_LEN,
                Op::Jump { .. } => SHORT_JUMP_LEN,
            };
        }
        addrs.push(at);
        addrs
    }
}
