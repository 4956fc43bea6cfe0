//! Mutable machine state shared by every frame of one execution.
//!
//! The register file is not saved across calls. A caller that needs a
//! register after a call pushes it first; the emitter guarantees this.

use tern_bytecode::{Cond, REGISTER_COUNT};

use crate::error::{VmError, VmResult};
use crate::value::Value;

/// Largest array `arraynew` will create.
pub const MAX_ARRAY_LEN: usize = 1 << 24;

/// Comparison outcome consumed by conditional jumps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub zero: bool,
    pub equal: bool,
    pub less: bool,
    pub greater: bool,
}

impl Flags {
    fn ordered(ord: Option<std::cmp::Ordering>) -> Self {
        use std::cmp::Ordering;
        let equal = ord == Some(Ordering::Equal);
        Self {
            zero: equal,
            equal,
            less: ord == Some(Ordering::Less),
            greater: ord == Some(Ordering::Greater),
        }
    }

    pub fn signed(a: i64, b: i64) -> Self {
        Self::ordered(Some(a.cmp(&b)))
    }

    pub fn unsigned(a: u64, b: u64) -> Self {
        Self::ordered(Some(a.cmp(&b)))
    }

    /// NaN compares as unordered: every flag clear.
    pub fn float(a: f64, b: f64) -> Self {
        Self::ordered(a.partial_cmp(&b))
    }

    pub fn holds(&self, cond: Cond) -> bool {
        match cond {
            Cond::Always => true,
            Cond::Eq => self.equal,
            Cond::Ne => !self.equal,
            Cond::Lt => self.less,
            Cond::Ge => self.greater || self.equal,
            Cond::Gt => self.greater,
            Cond::Le => self.less || self.equal,
        }
    }
}

/// Arrays addressed by handle. Handle 0 is null; handle `n` is slot `n - 1`.
#[derive(Debug, Default)]
pub struct ArrayHeap {
    slots: Vec<Option<Vec<Value>>>,
    free: Vec<usize>,
}

impl ArrayHeap {
    pub fn create(&mut self, len: u64) -> VmResult<u32> {
        let len_usize = usize::try_from(len)
            .ok()
            .filter(|&n| n <= MAX_ARRAY_LEN)
            .ok_or(VmError::ArrayTooLarge {
                len,
                limit: MAX_ARRAY_LEN,
            })?;
        let elements = vec![Value::ZERO; len_usize];
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(elements);
                slot
            }
            None => {
                self.slots.push(Some(elements));
                self.slots.len() - 1
            }
        };
        u32::try_from(slot + 1).map_err(|_| VmError::ArrayTooLarge {
            len,
            limit: MAX_ARRAY_LEN,
        })
    }

    fn slot_mut(&mut self, handle: u32) -> VmResult<&mut Vec<Value>> {
        if handle == 0 {
            return Err(VmError::NullArray);
        }
        self.slots
            .get_mut(handle as usize - 1)
            .and_then(Option::as_mut)
            .ok_or(VmError::StaleArray { handle })
    }

    pub fn get(&mut self, handle: u32, index: u64) -> VmResult<Value> {
        let array = self.slot_mut(handle)?;
        let len = array.len();
        usize::try_from(index)
            .ok()
            .and_then(|i| array.get(i).copied())
            .ok_or(VmError::ArrayIndexOutOfBounds { index, len })
    }

    pub fn set(&mut self, handle: u32, index: u64, value: Value) -> VmResult<()> {
        let array = self.slot_mut(handle)?;
        let len = array.len();
        let elem = usize::try_from(index)
            .ok()
            .and_then(|i| array.get_mut(i))
            .ok_or(VmError::ArrayIndexOutOfBounds { index, len })?;
        *elem = value;
        Ok(())
    }

    /// Free an array. Destroying the null handle does nothing.
    pub fn destroy(&mut self, handle: u32) -> VmResult<()> {
        if handle == 0 {
            return Ok(());
        }
        self.slot_mut(handle)?;
        let slot = handle as usize - 1;
        self.slots[slot] = None;
        self.free.push(slot);
        Ok(())
    }

    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// A taken jump, recorded when `VmOptions::trace_jumps` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpRecord {
    pub function: u32,
    /// Offset of the jump instruction.
    pub from: usize,
    /// Offset execution continued at.
    pub to: usize,
}

#[derive(Debug, Default)]
pub struct ExecutionContext {
    pub regs: [Value; REGISTER_COUNT],
    pub flags: Flags,
    pub stack: Vec<Value>,
    pub arrays: ArrayHeap,
    pub depth: usize,
    pub steps: u64,
    pub jumps: Vec<JumpRecord>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything but keep allocations.
    pub fn reset(&mut self) {
        self.regs = [Value::ZERO; REGISTER_COUNT];
        self.flags = Flags::default();
        self.stack.clear();
        self.arrays = ArrayHeap::default();
        self.depth = 0;
        self.steps = 0;
        self.jumps.clear();
    }

    pub fn reg(&self, index: u8) -> Value {
        self.regs[index as usize]
    }

    pub fn set_reg(&mut self, index: u8, value: Value) {
        self.regs[index as usize] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_follow_the_comparison_kind() {
        let signed = Flags::signed(-1, 1);
        assert!(signed.holds(Cond::Lt) && !signed.holds(Cond::Ge));

        let unsigned = Flags::unsigned(u64::MAX, 1);
        assert!(unsigned.holds(Cond::Gt));

        let nan = Flags::float(f64::NAN, 1.0);
        assert!(nan.holds(Cond::Ne));
        assert!(!nan.holds(Cond::Lt) && !nan.holds(Cond::Ge));
    }

    #[test]
    fn array_handles_are_checked() {
        let mut heap = ArrayHeap::default();
        let h = heap.create(2).unwrap();
        assert_eq!(h, 1);
        heap.set(h, 1, Value::from_i64(9)).unwrap();
        assert_eq!(heap.get(h, 1).unwrap().as_i64(), 9);
        assert!(matches!(
            heap.get(h, 2),
            Err(VmError::ArrayIndexOutOfBounds { index: 2, len: 2 })
        ));
        assert!(matches!(heap.get(0, 0), Err(VmError::NullArray)));

        heap.destroy(h).unwrap();
        assert!(matches!(heap.get(h, 0), Err(VmError::StaleArray { handle: 1 })));
        heap.destroy(0).unwrap();
        assert_eq!(heap.live(), 0);
    }
}
