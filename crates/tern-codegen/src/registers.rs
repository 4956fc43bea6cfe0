//! Register pool.
//!
//! `r0` carries return values and is never handed out. `r1..r15` are
//! allocated by linear scan; there is no spilling, so running dry is an
//! error the caller sees.

use tern_bytecode::REGISTER_COUNT;

/// The return-value register.
pub const RETURN_REG: u8 = 0;

/// Highest register that carries an argument.
pub const MAX_REGISTER_ARGS: u16 = 10;

/// Ownership of one allocated register. Not `Clone`: the only way to give a
/// register back is [`RegisterPool::free`], which consumes the ticket.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an allocated register must be freed or kept as a home"]
pub struct Reg(u8);

impl Reg {
    pub fn index(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct RegisterPool {
    allocated: [bool; REGISTER_COUNT],
}

impl Default for RegisterPool {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterPool {
    pub fn new() -> Self {
        Self {
            allocated: [false; REGISTER_COUNT],
        }
    }

    /// First free register, or `None` when all fifteen are taken.
    pub fn allocate(&mut self) -> Option<Reg> {
        let idx = (1..REGISTER_COUNT).find(|&i| !self.allocated[i])?;
        self.allocated[idx] = true;
        Some(Reg(idx as u8))
    }

    /// Claim a specific register, e.g. the home of a register parameter.
    pub fn reserve(&mut self, index: u8) -> Option<Reg> {
        let idx = index as usize;
        if idx == RETURN_REG as usize || idx >= REGISTER_COUNT || self.allocated[idx] {
            return None;
        }
        self.allocated[idx] = true;
        Some(Reg(index))
    }

    pub fn free(&mut self, reg: Reg) {
        self.allocated[reg.0 as usize] = false;
    }

    pub fn is_allocated(&self, index: u8) -> bool {
        self.allocated
            .get(index as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Allocated register numbers in ascending order.
    pub fn allocated(&self) -> Vec<u8> {
        (0..REGISTER_COUNT as u8)
            .filter(|&i| self.allocated[i as usize])
            .collect()
    }

    pub fn in_use(&self) -> usize {
        self.allocated.iter().filter(|&&a| a).count()
    }

    pub fn available(&self) -> usize {
        REGISTER_COUNT - 1 - self.in_use()
    }
}
