//! Pipeline driver.
//!
//! Runs the passes in their fixed order for one compilation unit:
//!
//! 1. width lowering (always, it is legalization)
//! 2. register splitting
//! 3. register renaming
//! 4. register compaction
//!
//! Steps 2-4 are gated on the optimization level through each pass's
//! [`TransformLevel`](crate::transform::TransformLevel). When validation is
//! enabled the program is checked on entry, after lowering and on exit.

use crate::error::Result;
use crate::transform::lower_width::DEFAULT_MAX_ROUNDS;
use crate::transform::{
    CompactRegisters, CompactStats, LowerWidth, LowerWidthStats, RenameRegisters, RenameStats,
    SplitRegisters, SplitStats, Transform, register_limits, validate_program, validate_widths,
};
use lanelegal_mir::Program;
use lanelegal_platform::TargetCaps;
use std::fmt;
use tracing::{debug, info, instrument};

/// Pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Optimization level (0-3)
    pub opt_level: u8,
    /// Run sanity checks around the passes
    pub validate: bool,
    /// Bound on re-lowering rounds
    pub max_lowering_rounds: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            opt_level: 2,
            validate: true,
            max_lowering_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl PipelineConfig {
    pub fn with_opt_level(mut self, opt_level: u8) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_max_lowering_rounds(mut self, rounds: u32) -> Self {
        self.max_lowering_rounds = rounds;
        self
    }
}

/// What every pass did during one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub lower_width: LowerWidthStats,
    /// `None` when the pass was disabled at the configured level
    pub split: Option<SplitStats>,
    pub rename: Option<RenameStats>,
    pub compact: Option<CompactStats>,
    /// Names of the passes that ran, in order
    pub passes: Vec<&'static str>,
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "passes: {}", self.passes.join(", "))?;
        writeln!(
            f,
            "lower_width: {} lowered, {} narrowed, {} emitted, {} scratch registers",
            self.lower_width.instructions_lowered,
            self.lower_width.instructions_narrowed,
            self.lower_width.instructions_emitted,
            self.lower_width.scratch_registers
        )?;
        if let Some(split) = &self.split {
            writeln!(
                f,
                "split_registers: {} split into {} pieces",
                split.registers_split, split.registers_created
            )?;
        }
        if let Some(rename) = &self.rename {
            writeln!(
                f,
                "rename_registers: {} renamed, {} operands rewritten",
                rename.registers_renamed, rename.operands_rewritten
            )?;
        }
        if let Some(compact) = &self.compact {
            writeln!(
                f,
                "compact_registers: {} removed, {} remaining",
                compact.registers_removed, compact.registers_remaining
            )?;
        }
        Ok(())
    }
}

/// Width legalization and register identity pipeline for one target
#[derive(Debug, Clone)]
pub struct Pipeline {
    caps: TargetCaps,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(caps: TargetCaps, config: PipelineConfig) -> Self {
        Self { caps, config }
    }

    pub fn caps(&self) -> &TargetCaps {
        &self.caps
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn enabled<T: Transform>(&self, transform: &T) -> bool {
        let enabled = transform
            .level()
            .is_enabled_at_opt_level(self.config.opt_level);
        if !enabled {
            debug!(
                pass = transform.name(),
                opt_level = self.config.opt_level,
                "pass disabled"
            );
        }
        enabled
    }

    /// Run every enabled pass over `program`
    #[instrument(skip_all, name = "pipeline", fields(target = %self.caps.generation))]
    pub fn run(&self, program: &mut Program) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        program.vgrfs.set_limits(register_limits(&self.caps));

        if self.config.validate {
            validate_program(program)?;
        }

        let lower = LowerWidth::new(self.config.max_lowering_rounds);
        report.lower_width = lower.apply_internal(program, &self.caps)?;
        report.passes.push(lower.name());
        info!(
            lowered = report.lower_width.instructions_lowered,
            emitted = report.lower_width.instructions_emitted,
            scratch = report.lower_width.scratch_registers,
            "width lowering done"
        );
        if self.config.validate {
            validate_program(program)?;
            validate_widths(program, &self.caps)?;
        }

        let split = SplitRegisters;
        if self.enabled(&split) {
            let stats = split.apply_internal(program)?;
            info!(
                split = stats.registers_split,
                created = stats.registers_created,
                "register splitting done"
            );
            report.split = Some(stats);
            report.passes.push(split.name());
        }

        let rename = RenameRegisters;
        if self.enabled(&rename) {
            let stats = rename.apply_internal(program)?;
            info!(renamed = stats.registers_renamed, "register renaming done");
            report.rename = Some(stats);
            report.passes.push(rename.name());
        }

        let compact = CompactRegisters;
        if self.enabled(&compact) {
            let stats = compact.apply_internal(program)?;
            info!(
                removed = stats.registers_removed,
                remaining = stats.registers_remaining,
                "register compaction done"
            );
            report.compact = Some(stats);
            report.passes.push(compact.name());
        }

        if self.config.validate {
            validate_program(program)?;
        }
        Ok(report)
    }
}
