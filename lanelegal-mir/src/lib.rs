//! lanelegal-mir - program model for the width legalizer
//!
//! This crate provides the core type definitions consumed by the legalization
//! passes: element types, registers, operands, opcodes and their rule table,
//! instructions, basic blocks and whole programs.
//!
//! ## Architecture
//!
//! Programs are produced by instruction selection at an idealized,
//! width-agnostic execution size. The passes in the `lanelegal` crate rewrite
//! them in place until every instruction runs at a width the target executes
//! natively and every virtual register is as small as its accesses allow.
//!
//! ## Usage
//!
//! ```rust
//! use lanelegal_mir::{ElementType, Instruction, Opcode, Operand, ProgramBuilder};
//!
//! let program = ProgramBuilder::new()
//!     .vgrfs(&[2, 2])
//!     .block("entry")
//!     .instr(Instruction::new(
//!         Opcode::Add,
//!         16,
//!         Operand::vgrf(0, ElementType::F),
//!         [Operand::vgrf(1, ElementType::F), Operand::imm_f(1.0)],
//!     ))
//!     .build();
//! assert_eq!(program.instruction_count(), 1);
//! ```

pub mod block;
pub mod instruction;
pub mod opcode;
pub mod operand;
pub mod program;
pub mod register;
pub mod types;

// Re-exports for convenience
pub use block::Block;
pub use instruction::{CondMod, Instruction, MAX_SOURCES, Predicate, Sources};
pub use opcode::{Opcode, OpcodeClass, OpcodeInfo, SourceKind, WidthRule};
pub use operand::{Immediate, Operand, RegRef, regions_overlap};
pub use program::{AnalysisDeps, InstrLoc, Program, ProgramBuilder};
pub use register::{AllocError, ArchReg, RegisterLimits, VirtualRegTable};
pub use types::{ElementType, MAX_EXEC_SIZE, UNIT_BYTES, units_for_bytes};
