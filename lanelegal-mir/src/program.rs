//! Whole-program container.
//!
//! A program owns its blocks and the virtual register table. It also tracks
//! which derived analyses (liveness and friends) are still valid; passes that
//! change instruction or register shape invalidate them.
use crate::block::Block;
use crate::instruction::Instruction;
use crate::operand::Operand;
use crate::register::VirtualRegTable;
use std::fmt;

/// Classes of facts a pass may invalidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalysisDeps(u8);

impl AnalysisDeps {
    pub const NONE: AnalysisDeps = AnalysisDeps(0);
    /// Instruction positions and shapes
    pub const INSTRUCTIONS: AnalysisDeps = AnalysisDeps(1);
    /// Register identities and sizes
    pub const VARIABLES: AnalysisDeps = AnalysisDeps(2);
    pub const ALL: AnalysisDeps = AnalysisDeps(3);

    pub fn contains(self, other: AnalysisDeps) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AnalysisDeps {
    type Output = AnalysisDeps;

    fn bitor(self, rhs: AnalysisDeps) -> AnalysisDeps {
        AnalysisDeps(self.0 | rhs.0)
    }
}

/// Position of an instruction: block index and slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrLoc {
    pub block: usize,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub blocks: Vec<Block>,
    pub vgrfs: VirtualRegTable,
    valid: Option<AnalysisDeps>,
}

impl Program {
    pub fn new(vgrfs: VirtualRegTable) -> Self {
        Self {
            blocks: Vec::new(),
            vgrfs,
            valid: None,
        }
    }

    /// Add a block, returning its index
    pub fn add_block(&mut self, block: Block) -> usize {
        self.blocks.push(block);
        self.blocks.len() - 1
    }

    /// Link `from` to `to` in the CFG
    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.blocks[from].successors.push(to);
        self.blocks[to].predecessors.push(from);
    }

    /// Total number of instructions across all blocks
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    /// All instructions in program order with their positions
    pub fn instructions(&self) -> impl Iterator<Item = (InstrLoc, &Instruction)> + '_ {
        self.blocks.iter().enumerate().flat_map(|(block, b)| {
            b.instructions
                .iter()
                .enumerate()
                .map(move |(index, inst)| (InstrLoc { block, index }, inst))
        })
    }

    pub fn instructions_mut(&mut self) -> impl Iterator<Item = &mut Instruction> + '_ {
        self.blocks.iter_mut().flat_map(|b| b.instructions.iter_mut())
    }

    pub fn instruction(&self, loc: InstrLoc) -> &Instruction {
        &self.blocks[loc.block].instructions[loc.index]
    }

    /// Apply `f` to every operand of every instruction, destination first
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        for inst in self.instructions_mut() {
            f(&mut inst.dst);
            for src in inst.srcs.iter_mut() {
                f(src);
            }
        }
    }

    /// Control-flow nesting depth in effect at every instruction, program order.
    ///
    /// A region opener counts toward its own depth; a closer does not.
    pub fn nesting_depths(&self) -> Vec<u32> {
        self.instructions()
            .scan(0u32, |depth, (_, inst)| {
                if inst.opcode.opens_region() {
                    *depth += 1;
                } else if inst.opcode.closes_region() {
                    *depth = depth.saturating_sub(1);
                }
                Some(*depth)
            })
            .collect()
    }

    /// Mark derived analyses as stale
    pub fn invalidate(&mut self, deps: AnalysisDeps) {
        if deps != AnalysisDeps::NONE {
            self.valid = None;
        }
    }

    /// Record that analyses covering `deps` were recomputed
    pub fn mark_analysis_valid(&mut self, deps: AnalysisDeps) {
        self.valid = Some(deps);
    }

    pub fn analysis_valid(&self, deps: AnalysisDeps) -> bool {
        self.valid.map(|v| v.contains(deps)).unwrap_or(false)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "vgrfs {{")?;
        write!(f, "{}", self.vgrfs)?;
        writeln!(f, "}}")?;
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        Ok(())
    }
}

/// Builder for constructing programs
pub struct ProgramBuilder {
    program: Program,
    current_block: Option<usize>,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            program: Program::new(VirtualRegTable::new()),
            current_block: None,
        }
    }

    /// Declare virtual registers with the given unit sizes, in index order
    pub fn vgrfs(mut self, sizes: &[u32]) -> Self {
        for &size in sizes {
            self.program.vgrfs.declare(size);
        }
        self
    }

    /// Create a new basic block and make it the current block.
    /// The previous block falls through to it.
    pub fn block(mut self, label: impl Into<String>) -> Self {
        let idx = self.program.add_block(Block::new(label));
        if let Some(prev) = self.current_block {
            self.program.add_edge(prev, idx);
        }
        self.current_block = Some(idx);
        self
    }

    /// Add an extra CFG edge between existing blocks
    pub fn edge(mut self, from: usize, to: usize) -> Self {
        self.program.add_edge(from, to);
        self
    }

    /// Add an instruction to the current block
    pub fn instr(mut self, instr: Instruction) -> Self {
        if self.current_block.is_none() {
            self = self.block("entry");
        }
        if let Some(idx) = self.current_block {
            self.program.blocks[idx].push(instr);
        }
        self
    }

    pub fn build(self) -> Program {
        self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;
    use crate::types::ElementType;

    fn mov(dst: u32, src: u32) -> Instruction {
        Instruction::new(
            Opcode::Mov,
            8,
            Operand::vgrf(dst, ElementType::F),
            [Operand::vgrf(src, ElementType::F)],
        )
    }

    #[test]
    fn test_builder() {
        let program = ProgramBuilder::new()
            .vgrfs(&[1, 2])
            .block("entry")
            .instr(mov(0, 1))
            .block("exit")
            .instr(mov(1, 0))
            .build();

        assert_eq!(program.blocks.len(), 2);
        assert_eq!(program.blocks[0].successors, vec![1]);
        assert_eq!(program.blocks[1].predecessors, vec![0]);
        assert_eq!(program.vgrfs.len(), 2);
        assert_eq!(program.vgrfs.size(1), 2);
        assert_eq!(program.instruction_count(), 2);
    }

    #[test]
    fn test_nesting_depths() {
        let program = ProgramBuilder::new()
            .vgrfs(&[1, 1])
            .instr(mov(0, 1))
            .instr(Instruction::marker(Opcode::If, 8))
            .instr(mov(1, 0))
            .instr(Instruction::marker(Opcode::EndIf, 8))
            .instr(mov(0, 1))
            .build();
        assert_eq!(program.nesting_depths(), vec![0, 1, 1, 0, 0]);
    }

    #[test]
    fn test_analysis_validity() {
        let mut program = ProgramBuilder::new().vgrfs(&[1]).build();
        assert!(!program.analysis_valid(AnalysisDeps::VARIABLES));
        program.mark_analysis_valid(AnalysisDeps::ALL);
        assert!(program.analysis_valid(AnalysisDeps::VARIABLES));
        program.invalidate(AnalysisDeps::INSTRUCTIONS);
        assert!(!program.analysis_valid(AnalysisDeps::INSTRUCTIONS));
    }
}
