//! Error types for the legalization pipeline.
//!
//! Resource exhaustion and validation failures are recoverable and reported
//! through [`LegalizeError`]. Contract violations inside a pass (an operand
//! that cannot be expressed, a register index out of range) are programming
//! errors and abort with a panic.

use lanelegal_mir::AllocError;
use thiserror::Error;

/// Main error type for the legalization passes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LegalizeError {
    /// No room left in the virtual register table
    #[error(
        "register space exhausted: need {requested_units} units with {live_registers} registers allocated (limit {limit})"
    )]
    RegisterSpaceExhausted {
        requested_units: u32,
        live_registers: u32,
        limit: u32,
    },

    /// A scratch register would exceed the per-register size limit
    #[error("register of {requested_units} units exceeds the {limit}-unit limit")]
    RegisterTooLarge { requested_units: u32, limit: u32 },

    /// A program failed a sanity check
    #[error("validation error: {0}")]
    Validation(String),

    /// Width lowering kept producing oversized instances
    #[error("width lowering did not converge at block {block}, instruction {index} after {rounds} rounds")]
    LoweringDidNotConverge {
        block: usize,
        index: usize,
        rounds: u32,
    },
}

impl From<AllocError> for LegalizeError {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::TooLarge {
                requested_units,
                limit,
            } => LegalizeError::RegisterTooLarge {
                requested_units,
                limit,
            },
            AllocError::Exhausted {
                requested_units,
                live_registers,
                limit,
            } => LegalizeError::RegisterSpaceExhausted {
                requested_units,
                live_registers,
                limit,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, LegalizeError>;
