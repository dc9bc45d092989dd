/// Virtual instructions
///
/// One instruction processes `exec_size` lanes starting at channel `group`.
/// Identity is positional: passes replace an instruction by removing it from
/// its block and inserting new ones.
use crate::opcode::{Opcode, SourceKind};
use crate::operand::{Operand, RegRef};
use crate::register::ArchReg;
use crate::types::{ElementType, UNIT_BYTES};
use smallvec::SmallVec;
use std::fmt;

/// Most sources any opcode takes
pub const MAX_SOURCES: usize = 5;

pub type Sources = SmallVec<[Operand; MAX_SOURCES]>;

/// Lane predicate read from a flag register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predicate {
    pub flag: u8,
    pub inverse: bool,
}

impl Predicate {
    pub fn normal(flag: u8) -> Self {
        Self {
            flag,
            inverse: false,
        }
    }

    pub fn inverted(flag: u8) -> Self {
        Self {
            flag,
            inverse: true,
        }
    }
}

/// Conditional modifier: compares the result against zero and writes a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondMod {
    Z,
    NZ,
    G,
    GE,
    L,
    LE,
}

impl fmt::Display for CondMod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CondMod::Z => "z",
            CondMod::NZ => "nz",
            CondMod::G => "g",
            CondMod::GE => "ge",
            CondMod::L => "l",
            CondMod::LE => "le",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    /// Number of lanes processed
    pub exec_size: u8,
    /// First channel processed
    pub group: u8,
    pub dst: Operand,
    pub srcs: Sources,
    /// Declared destination footprint in bytes
    pub size_written: u32,
    pub predicate: Option<Predicate>,
    pub cond_mod: Option<CondMod>,
    /// Flag register written by `cond_mod`
    pub flag_subreg: u8,
    pub saturate: bool,
    /// Ignore the active lane mask
    pub force_writemask_all: bool,
    /// Implicitly updates the accumulator as a side result
    pub writes_accumulator: bool,
    /// Terminates the thread
    pub eot: bool,
}

impl Instruction {
    /// Create an instruction writing one component per lane to `dst`
    pub fn new(
        opcode: Opcode,
        exec_size: u8,
        dst: Operand,
        srcs: impl IntoIterator<Item = Operand>,
    ) -> Self {
        let size_written = match dst {
            Operand::Vgrf(_) | Operand::Fixed(_) => dst.component_size(exec_size as u32),
            _ => 0,
        };
        Self {
            opcode,
            exec_size,
            group: 0,
            dst,
            srcs: srcs.into_iter().collect(),
            size_written,
            predicate: None,
            cond_mod: None,
            flag_subreg: 0,
            saturate: false,
            force_writemask_all: false,
            writes_accumulator: false,
            eot: false,
        }
    }

    /// Source-less instruction, e.g. control flow or a barrier
    pub fn marker(opcode: Opcode, exec_size: u8) -> Self {
        Self::new(opcode, exec_size, Operand::None, [])
    }

    pub fn with_group(mut self, group: u8) -> Self {
        self.group = group;
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_cond_mod(mut self, cond_mod: CondMod, flag: u8) -> Self {
        self.cond_mod = Some(cond_mod);
        self.flag_subreg = flag;
        self
    }

    pub fn with_dst_components(mut self, components: u32) -> Self {
        self.size_written = components * self.dst.component_size(self.exec_size as u32);
        self
    }

    pub fn with_force_writemask_all(mut self) -> Self {
        self.force_writemask_all = true;
        self
    }

    pub fn with_eot(mut self) -> Self {
        self.eot = true;
        self
    }

    pub fn with_saturate(mut self) -> Self {
        self.saturate = true;
        self
    }

    pub fn with_accumulator_write(mut self) -> Self {
        self.writes_accumulator = true;
        self
    }

    /// Source slot `i` carries a count, selector or surface index
    pub fn is_control_source(&self, i: usize) -> bool {
        self.opcode.source_kind(i) == SourceKind::Control
    }

    fn control_value(&self, slot: u8) -> u32 {
        match self.srcs.get(slot as usize) {
            Some(Operand::Imm(imm)) => imm
                .as_u32()
                .unwrap_or_else(|| panic!("{}: control operand {} is not an integer", self, slot)),
            _ => panic!("{}: control operand {} must be an immediate", self, slot),
        }
    }

    /// Components read per lane from source `i`
    pub fn components_read(&self, i: usize) -> u32 {
        if self.srcs[i].is_none() {
            return 0;
        }
        match self.opcode.source_kind(i) {
            SourceKind::Data | SourceKind::IndirectRegion { .. } => 1,
            SourceKind::Control => 0,
            SourceKind::Components { count_slot, factor } => {
                factor as u32 * self.control_value(count_slot)
            }
        }
    }

    /// Bytes read from source `i`
    pub fn size_read(&self, i: usize) -> u32 {
        let src = &self.srcs[i];
        match src {
            Operand::None | Operand::Imm(_) | Operand::Arch(ArchReg::Null, _) => 0,
            Operand::Arch(_, ty) => ty.size(),
            Operand::Vgrf(_) | Operand::Fixed(_) => match self.opcode.source_kind(i) {
                SourceKind::IndirectRegion { length_slot } => self.control_value(length_slot),
                SourceKind::Control => 0,
                _ => self.components_read(i) * src.component_size(self.exec_size as u32),
            },
        }
    }

    /// Destination components written per lane
    pub fn dst_components(&self) -> u32 {
        let component = self.dst.component_size(self.exec_size as u32);
        if component == 0 {
            0
        } else {
            self.size_written.div_ceil(component)
        }
    }

    /// Units touched by the destination write
    pub fn regs_written(&self) -> u32 {
        footprint(self.dst.reg(), self.size_written)
    }

    /// Units touched by source `i`
    pub fn regs_read(&self, i: usize) -> u32 {
        footprint(self.srcs[i].reg(), self.size_read(i))
    }

    /// Flag register written as a side effect
    pub fn flags_written(&self) -> Option<u8> {
        self.cond_mod.map(|_| self.flag_subreg)
    }

    /// The write leaves part of the destination unmodified
    pub fn is_partial_write(&self) -> bool {
        let predicated = self.predicate.is_some() && self.opcode != Opcode::Sel;
        match self.dst.reg() {
            Some(r) => {
                predicated
                    || r.stride != 1
                    || r.offset % UNIT_BYTES != 0
                    || self.size_written % UNIT_BYTES != 0
            }
            None => predicated,
        }
    }

    /// Largest element size among the data operands
    pub fn exec_type_size(&self) -> u32 {
        let mut size = 0;
        for (i, src) in self.srcs.iter().enumerate() {
            if !self.is_control_source(i)
                && let Some(ty) = src.ty()
            {
                size = size.max(ty.size());
            }
        }
        if size == 0 {
            size = self.dst.ty().map(ElementType::size).unwrap_or(0);
        }
        size
    }

    /// Virtual register written by this instruction
    pub fn def_vgrf(&self) -> Option<u32> {
        self.dst.vgrf_nr()
    }

    /// Virtual registers read by this instruction
    pub fn use_vgrfs(&self) -> impl Iterator<Item = u32> + '_ {
        self.srcs.iter().filter_map(Operand::vgrf_nr)
    }

    /// Virtual register operands, destination first, with their byte sizes
    pub fn vgrf_accesses(&self) -> SmallVec<[(RegRef, u32); 6]> {
        let mut accesses = SmallVec::new();
        if let Operand::Vgrf(r) = self.dst {
            accesses.push((r, self.size_written));
        }
        for (i, src) in self.srcs.iter().enumerate() {
            if let Operand::Vgrf(r) = src {
                accesses.push((*r, self.size_read(i)));
            }
        }
        accesses
    }

    pub fn has_side_effects(&self) -> bool {
        self.opcode.has_side_effects()
    }
}

fn footprint(reg: Option<&RegRef>, size: u32) -> u32 {
    match reg {
        Some(r) if size > 0 => (r.offset % UNIT_BYTES + size).div_ceil(UNIT_BYTES),
        _ => 0,
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = self.predicate {
            write!(f, "({}f{}) ", if p.inverse { "-" } else { "+" }, p.flag)?;
        }
        write!(f, "{}", self.opcode)?;
        if self.saturate {
            write!(f, ".sat")?;
        }
        if let Some(cm) = self.cond_mod {
            write!(f, ".{}.f{}", cm, self.flag_subreg)?;
        }
        write!(f, "({}", self.exec_size)?;
        if self.group != 0 {
            write!(f, "@{}", self.group)?;
        }
        write!(f, ")")?;
        if !self.dst.is_none() {
            write!(f, " {}", self.dst)?;
        }
        for (i, src) in self.srcs.iter().enumerate() {
            let sep = if i == 0 && self.dst.is_none() { " " } else { ", " };
            write!(f, "{}{}", sep, src)?;
        }
        if self.force_writemask_all {
            write!(f, " NoMask")?;
        }
        if self.eot {
            write!(f, " EOT")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Immediate;

    fn add16() -> Instruction {
        Instruction::new(
            Opcode::Add,
            16,
            Operand::vgrf(0, ElementType::F),
            [Operand::vgrf(1, ElementType::F), Operand::imm_f(1.0)],
        )
    }

    #[test]
    fn test_size_written_and_read() {
        let add = add16();
        assert_eq!(add.size_written, 64);
        assert_eq!(add.regs_written(), 2);
        assert_eq!(add.size_read(0), 64);
        assert_eq!(add.size_read(1), 0);
    }

    #[test]
    fn test_offset_footprint() {
        let mov = Instruction::new(
            Opcode::Mov,
            32,
            Operand::vgrf(0, ElementType::W),
            [Operand::Vgrf(RegRef::new(1, ElementType::W).with_offset(16))],
        );
        assert_eq!(mov.regs_written(), 2);
        assert_eq!(mov.regs_read(0), 3);
    }

    #[test]
    fn test_tex_components() {
        let tex = Instruction::new(
            Opcode::Txd,
            16,
            Operand::vgrf(0, ElementType::F),
            [
                Operand::vgrf(1, ElementType::F),
                Operand::vgrf(2, ElementType::F),
                Operand::None,
                Operand::Imm(Immediate::UD(4)),
                Operand::Imm(Immediate::UD(1)),
            ],
        )
        .with_dst_components(4);
        assert_eq!(tex.components_read(0), 4);
        assert_eq!(tex.components_read(1), 2);
        assert_eq!(tex.components_read(2), 0);
        assert_eq!(tex.dst_components(), 4);
        assert!(tex.is_control_source(3));
    }

    #[test]
    fn test_partial_write() {
        assert!(!add16().is_partial_write());
        assert!(add16().with_predicate(Predicate::normal(0)).is_partial_write());

        let sel = Instruction::new(
            Opcode::Sel,
            16,
            Operand::vgrf(0, ElementType::F),
            [Operand::vgrf(1, ElementType::F), Operand::vgrf(2, ElementType::F)],
        )
        .with_predicate(Predicate::normal(0));
        assert!(!sel.is_partial_write());
    }

    #[test]
    fn test_def_use() {
        let add = add16();
        assert_eq!(add.def_vgrf(), Some(0));
        assert_eq!(add.use_vgrfs().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_display() {
        let add = add16().with_cond_mod(CondMod::G, 1);
        assert_eq!(add.to_string(), "add.g.f1(16) vgrf0<1>:f, vgrf1<1>:f, 1.0f");
    }
}
