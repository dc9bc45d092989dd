//! Basic blocks
//!
//! A basic block is an ordered list of instructions. Edges to other blocks
//! are stored as indices into the owning program's block list.
use crate::instruction::Instruction;
use std::fmt;

/// Basic block
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Label used in dumps
    pub label: String,

    /// Instructions, identified by position
    pub instructions: Vec<Instruction>,

    /// Successor block indices
    pub successors: Vec<usize>,

    /// Predecessor block indices
    pub predecessors: Vec<usize>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.label)?;
        if !self.successors.is_empty() {
            write!(f, " -> {:?}", self.successors)?;
        }
        writeln!(f)?;
        for inst in &self.instructions {
            writeln!(f, "    {}", inst)?;
        }
        Ok(())
    }
}

impl Block {
    /// Empty block without edges
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }

    pub fn push(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    pub fn first(&self) -> Option<&Instruction> {
        self.instructions.first()
    }

    pub fn last(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// The block begins a conditional or loop region
    pub fn starts_region(&self) -> bool {
        self.first()
            .map(|i| i.opcode.opens_region())
            .unwrap_or(false)
            || self
                .last()
                .map(|i| i.opcode.opens_region())
                .unwrap_or(false)
    }

    /// The block ends a conditional or loop region
    pub fn ends_region(&self) -> bool {
        self.first()
            .map(|i| i.opcode.closes_region())
            .unwrap_or(false)
            || self
                .last()
                .map(|i| i.opcode.closes_region())
                .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
