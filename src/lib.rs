//! # lanelegal
//!
//! Execution-width legalization and virtual register identity passes for a
//! SIMD shader compiler backend.
//!
//! ## Overview
//!
//! Instruction selection emits programs at an idealized width with one
//! virtual register per value. Before register allocation this crate:
//!
//! - **Lowers widths**: every instruction is split into instances the target
//!   executes natively, copying sources and destinations through scratch
//!   registers where a lane offset cannot address them.
//! - **Splits registers**: virtual registers are cut at every unit boundary
//!   no single access crosses.
//! - **Renames registers**: independent full definitions outside control
//!   flow get their own register.
//! - **Compacts registers**: unreferenced registers are dropped and the rest
//!   renumbered densely.
//!
//! Target differences come from a [`TargetCaps`] record, never from
//! hard-coded generation checks.
//!
//! ## Quick Start
//!
//! ```rust
//! use lanelegal::mir::{ElementType, Instruction, Opcode, Operand, ProgramBuilder};
//! use lanelegal::platform::{Generation, TargetCaps};
//! use lanelegal::{Pipeline, PipelineConfig};
//!
//! let mut program = ProgramBuilder::new()
//!     .vgrfs(&[4, 4])
//!     .instr(Instruction::new(
//!         Opcode::Add,
//!         32,
//!         Operand::vgrf(0, ElementType::F),
//!         [Operand::vgrf(1, ElementType::F), Operand::imm_f(1.0)],
//!     ))
//!     .build();
//!
//! let pipeline = Pipeline::new(
//!     TargetCaps::for_generation(Generation::Gen9),
//!     PipelineConfig::default(),
//! );
//! let report = pipeline.run(&mut program)?;
//! assert_eq!(report.lower_width.instructions_lowered, 1);
//! # Ok::<(), lanelegal::LegalizeError>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`transform`]: the passes, the width decision rules and sanity checks
//! - [`analysis`]: live ranges over the linearized program
//! - [`interp`]: a reference interpreter used to compare programs lane by lane
//! - [`pipeline`]: the driver running the passes in order
//!
//! ## Logging
//!
//! Passes emit `tracing` events and spans. The library never installs a
//! subscriber.

pub mod analysis;
pub mod error;
pub mod interp;
pub mod pipeline;
pub mod transform;

pub use lanelegal_mir as mir;
pub use lanelegal_platform as platform;

pub use error::{LegalizeError, Result};
pub use interp::{InterpError, Machine, MessageWrite};
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport};
pub use transform::{
    CompactRegisters, LowerWidth, RenameRegisters, SplitRegisters, Transform, decide_width,
};
