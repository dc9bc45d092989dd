//! Register storage for virtual instructions.
//!
//! This module defines the architecture registers an operand may name and the
//! virtual register table that maps a virtual register index to its size in
//! physical units.
//!
//! ## Virtual registers
//!
//! Virtual registers are allocated during instruction selection and are
//! subdivided, renamed and compacted before the allocator runs. A register
//! that has been subdivided is *retired*: its index is never handed out again
//! and no operand may reference it afterwards.
use std::fmt;

/// Fixed-purpose hardware registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchReg {
    /// Writes are discarded, reads yield zero
    Null,
    /// One of the 32-bit flag registers
    Flag(u8),
    /// Accumulator
    Acc,
}

impl fmt::Display for ArchReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchReg::Null => write!(f, "null"),
            ArchReg::Flag(n) => write!(f, "f{}", n),
            ArchReg::Acc => write!(f, "acc0"),
        }
    }
}

/// Allocation ceilings for the virtual register table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterLimits {
    /// Maximum number of entries in the table
    pub max_registers: u32,
    /// Maximum size of a single register in units
    pub max_register_units: u32,
}

impl Default for RegisterLimits {
    fn default() -> Self {
        Self {
            max_registers: 1 << 16,
            max_register_units: 64,
        }
    }
}

/// Failure to hand out a new virtual register
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("register of {requested_units} units exceeds the {limit}-unit register limit")]
    TooLarge { requested_units: u32, limit: u32 },

    #[error(
        "cannot allocate {requested_units} units: {live_registers} registers already allocated (limit {limit})"
    )]
    Exhausted {
        requested_units: u32,
        live_registers: u32,
        limit: u32,
    },
}

/// Mapping from virtual register index to size in units
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VirtualRegTable {
    sizes: Vec<u32>,
    retired: Vec<bool>,
    limits: RegisterLimits,
}

impl VirtualRegTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: RegisterLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Build a table from explicit sizes, indices assigned in order
    pub fn from_sizes(sizes: impl IntoIterator<Item = u32>) -> Self {
        let sizes: Vec<u32> = sizes.into_iter().collect();
        let retired = vec![false; sizes.len()];
        Self {
            sizes,
            retired,
            limits: RegisterLimits::default(),
        }
    }

    pub fn limits(&self) -> RegisterLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: RegisterLimits) {
        self.limits = limits;
    }

    /// Allocate a fresh register of `units` units
    pub fn allocate(&mut self, units: u32) -> Result<u32, AllocError> {
        assert!(units > 0, "zero-sized virtual register");
        if units > self.limits.max_register_units {
            return Err(AllocError::TooLarge {
                requested_units: units,
                limit: self.limits.max_register_units,
            });
        }
        if self.sizes.len() as u32 >= self.limits.max_registers {
            return Err(AllocError::Exhausted {
                requested_units: units,
                live_registers: self.sizes.len() as u32,
                limit: self.limits.max_registers,
            });
        }
        self.sizes.push(units);
        self.retired.push(false);
        Ok(self.sizes.len() as u32 - 1)
    }

    /// Record a register produced upstream; only allocation is bounded
    pub fn declare(&mut self, units: u32) -> u32 {
        self.sizes.push(units);
        self.retired.push(false);
        self.sizes.len() as u32 - 1
    }

    /// Number of indices ever handed out, retired ones included
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Size of register `nr` in units
    pub fn size(&self, nr: u32) -> u32 {
        self.sizes[nr as usize]
    }

    pub fn size_bytes(&self, nr: u32) -> u32 {
        self.size(nr) * crate::types::UNIT_BYTES
    }

    pub fn contains(&self, nr: u32) -> bool {
        (nr as usize) < self.sizes.len()
    }

    pub fn is_retired(&self, nr: u32) -> bool {
        self.retired[nr as usize]
    }

    /// Retire `nr`. The index stays reserved so later indices keep their meaning.
    pub fn retire(&mut self, nr: u32) {
        self.retired[nr as usize] = true;
    }

    /// Live (non-retired) register indices in ascending order
    pub fn live(&self) -> impl Iterator<Item = u32> + '_ {
        self.retired
            .iter()
            .enumerate()
            .filter(|(_, retired)| !**retired)
            .map(|(nr, _)| nr as u32)
    }

    /// Sum of all live register sizes in units
    pub fn total_units(&self) -> u32 {
        self.live().map(|nr| self.size(nr)).sum()
    }

    /// Replace the table contents with `sizes`, keeping the limits
    pub fn reset_to(&mut self, sizes: Vec<u32>) {
        self.retired = vec![false; sizes.len()];
        self.sizes = sizes;
    }
}

impl fmt::Display for VirtualRegTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (nr, size) in self.sizes.iter().enumerate() {
            if self.retired[nr] {
                writeln!(f, "  vgrf{}: retired", nr)?;
            } else {
                writeln!(f, "  vgrf{}: {} units", nr, size)?;
            }
        }
        Ok(())
    }
}
