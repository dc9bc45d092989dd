//! Operands of virtual instructions.
//!
//! An operand is drawn from one of a small set of storage classes. Register
//! operands carry a byte offset, an element type and a lane stride (in
//! elements): stride 0 means every lane sees the same element.
use crate::register::ArchReg;
use crate::types::{ElementType, UNIT_BYTES};
use std::fmt;

/// Inline constant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    D(i32),
    UD(u32),
    W(i16),
    UW(u16),
    F(f32),
    DF(f64),
    Q(i64),
    UQ(u64),
    /// Eight packed small signed integers, lane `l` reads element `l % 8`
    Vector([i8; 8]),
    /// Four packed floats, lane `l` reads element `l % 4`
    VectorFloat([f32; 4]),
}

impl Immediate {
    pub fn ty(&self) -> ElementType {
        match self {
            Immediate::D(_) => ElementType::D,
            Immediate::UD(_) => ElementType::UD,
            Immediate::W(_) | Immediate::Vector(_) => ElementType::W,
            Immediate::UW(_) => ElementType::UW,
            Immediate::F(_) | Immediate::VectorFloat(_) => ElementType::F,
            Immediate::DF(_) => ElementType::DF,
            Immediate::Q(_) => ElementType::Q,
            Immediate::UQ(_) => ElementType::UQ,
        }
    }

    /// Number of lanes after which the value sequence repeats
    pub fn period(&self) -> u32 {
        match self {
            Immediate::Vector(_) => 8,
            Immediate::VectorFloat(_) => 4,
            _ => 1,
        }
    }

    /// The value seen by lane `l + lanes` when read from lane `l`
    pub fn rotate_lanes(self, lanes: u32) -> Self {
        match self {
            Immediate::Vector(mut v) => {
                v.rotate_left((lanes % 8) as usize);
                Immediate::Vector(v)
            }
            Immediate::VectorFloat(mut v) => {
                v.rotate_left((lanes % 4) as usize);
                Immediate::VectorFloat(v)
            }
            other => other,
        }
    }

    /// Value as an unsigned integer, for control operands
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Immediate::D(v) => u32::try_from(v).ok(),
            Immediate::UD(v) => Some(v),
            Immediate::W(v) => u32::try_from(v).ok(),
            Immediate::UW(v) => Some(v as u32),
            Immediate::Q(v) => u32::try_from(v).ok(),
            Immediate::UQ(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::D(v) => write!(f, "{}d", v),
            Immediate::UD(v) => write!(f, "{}ud", v),
            Immediate::W(v) => write!(f, "{}w", v),
            Immediate::UW(v) => write!(f, "{}uw", v),
            Immediate::F(v) => write!(f, "{:?}f", v),
            Immediate::DF(v) => write!(f, "{:?}df", v),
            Immediate::Q(v) => write!(f, "{}q", v),
            Immediate::UQ(v) => write!(f, "{}uq", v),
            Immediate::Vector(v) => write!(f, "{:?}v", v),
            Immediate::VectorFloat(v) => write!(f, "{:?}vf", v),
        }
    }
}

/// Register access: index, byte offset, lane stride in elements, element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegRef {
    pub nr: u32,
    pub offset: u32,
    pub stride: u8,
    pub ty: ElementType,
}

impl RegRef {
    pub fn new(nr: u32, ty: ElementType) -> Self {
        Self {
            nr,
            offset: 0,
            stride: 1,
            ty,
        }
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_stride(mut self, stride: u8) -> Self {
        self.stride = stride;
        self
    }

    /// Bytes covered by one component of this access at `width` lanes
    pub fn component_size(&self, width: u32) -> u32 {
        (width * self.stride as u32).max(1) * self.ty.size()
    }

    /// Advance by `lanes` lanes
    pub fn horiz_offset(mut self, lanes: u32) -> Self {
        self.offset += lanes * self.stride as u32 * self.ty.size();
        self
    }

    /// Start of component `k` of a multi-component access at `width` lanes
    pub fn component(mut self, width: u32, k: u32) -> Self {
        self.offset += k * self.component_size(width);
        self
    }
}

/// Operand of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Operand {
    #[default]
    None,
    /// Virtual register
    Vgrf(RegRef),
    /// Fixed hardware register, `nr` counts units from the start of the file
    Fixed(RegRef),
    /// Architecture register
    Arch(ArchReg, ElementType),
    /// Inline constant
    Imm(Immediate),
}

impl Operand {
    pub fn vgrf(nr: u32, ty: ElementType) -> Self {
        Operand::Vgrf(RegRef::new(nr, ty))
    }

    pub fn fixed(nr: u32, ty: ElementType) -> Self {
        Operand::Fixed(RegRef::new(nr, ty))
    }

    pub fn null() -> Self {
        Operand::Arch(ArchReg::Null, ElementType::UD)
    }

    pub fn flag(subreg: u8) -> Self {
        Operand::Arch(ArchReg::Flag(subreg), ElementType::UD)
    }

    pub fn imm_f(v: f32) -> Self {
        Operand::Imm(Immediate::F(v))
    }

    pub fn imm_d(v: i32) -> Self {
        Operand::Imm(Immediate::D(v))
    }

    pub fn imm_ud(v: u32) -> Self {
        Operand::Imm(Immediate::UD(v))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Operand::Arch(ArchReg::Null, _))
    }

    pub fn is_imm(&self) -> bool {
        matches!(self, Operand::Imm(_))
    }

    pub fn ty(&self) -> Option<ElementType> {
        match self {
            Operand::None => None,
            Operand::Vgrf(r) | Operand::Fixed(r) => Some(r.ty),
            Operand::Arch(_, ty) => Some(*ty),
            Operand::Imm(imm) => Some(imm.ty()),
        }
    }

    pub fn reg(&self) -> Option<&RegRef> {
        match self {
            Operand::Vgrf(r) | Operand::Fixed(r) => Some(r),
            _ => None,
        }
    }

    pub fn reg_mut(&mut self) -> Option<&mut RegRef> {
        match self {
            Operand::Vgrf(r) | Operand::Fixed(r) => Some(r),
            _ => None,
        }
    }

    /// Virtual register index, if this names one
    pub fn vgrf_nr(&self) -> Option<u32> {
        match self {
            Operand::Vgrf(r) => Some(r.nr),
            _ => None,
        }
    }

    /// Lane stride; architecture registers and constants read one value
    pub fn stride(&self) -> u8 {
        match self {
            Operand::Vgrf(r) | Operand::Fixed(r) => r.stride,
            _ => 0,
        }
    }

    /// True when every lane reads the same value
    pub fn is_uniform(&self) -> bool {
        match self {
            Operand::Imm(imm) => imm.period() == 1,
            Operand::Vgrf(r) | Operand::Fixed(r) => r.stride == 0,
            Operand::Arch(..) => true,
            Operand::None => true,
        }
    }

    pub fn retype(mut self, ty: ElementType) -> Self {
        match &mut self {
            Operand::Vgrf(r) | Operand::Fixed(r) => r.ty = ty,
            Operand::Arch(_, t) => *t = ty,
            Operand::Imm(_) | Operand::None => {}
        }
        self
    }

    /// Advance by `lanes` lanes. Packed vector constants are rotated; other
    /// non-register operands are unchanged.
    pub fn horiz_offset(self, lanes: u32) -> Self {
        match self {
            Operand::Vgrf(r) => Operand::Vgrf(r.horiz_offset(lanes)),
            Operand::Fixed(r) => Operand::Fixed(r.horiz_offset(lanes)),
            Operand::Imm(imm) => Operand::Imm(imm.rotate_lanes(lanes)),
            other => other,
        }
    }

    /// Component `k` of a multi-component access at `width` lanes
    pub fn component(self, width: u32, k: u32) -> Self {
        match self {
            Operand::Vgrf(r) => Operand::Vgrf(r.component(width, k)),
            Operand::Fixed(r) => Operand::Fixed(r.component(width, k)),
            other => other,
        }
    }

    pub fn component_size(&self, width: u32) -> u32 {
        match self {
            Operand::Vgrf(r) | Operand::Fixed(r) => r.component_size(width),
            Operand::Arch(_, ty) => ty.size(),
            _ => 0,
        }
    }

    /// Absolute start byte inside its storage file, for overlap tests
    fn storage_start(&self) -> Option<(u8, u32, u64)> {
        match self {
            Operand::Vgrf(r) => Some((0, r.nr, r.offset as u64)),
            Operand::Fixed(r) => Some((1, 0, r.nr as u64 * UNIT_BYTES as u64 + r.offset as u64)),
            Operand::Arch(ArchReg::Flag(n), _) => Some((2, *n as u32, 0)),
            Operand::Arch(ArchReg::Acc, _) => Some((3, 0, 0)),
            _ => None,
        }
    }
}

/// True if the `a_size` bytes at `a` and the `b_size` bytes at `b` share storage
pub fn regions_overlap(a: &Operand, a_size: u32, b: &Operand, b_size: u32) -> bool {
    match (a.storage_start(), b.storage_start()) {
        (Some((fa, na, sa)), Some((fb, nb, sb))) if fa == fb && na == nb => {
            sa < sb + b_size as u64 && sb < sa + a_size as u64
        }
        _ => false,
    }
}

impl fmt::Display for RegRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset != 0 {
            write!(f, "{}+{}<{}>:{}", self.nr, self.offset, self.stride, self.ty)
        } else {
            write!(f, "{}<{}>:{}", self.nr, self.stride, self.ty)
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => write!(f, "(none)"),
            Operand::Vgrf(r) => write!(f, "vgrf{}", r),
            Operand::Fixed(r) => write!(f, "g{}", r),
            Operand::Arch(reg, ty) => write!(f, "{}:{}", reg, ty),
            Operand::Imm(imm) => write!(f, "{}", imm),
        }
    }
}

impl From<Immediate> for Operand {
    fn from(imm: Immediate) -> Self {
        Operand::Imm(imm)
    }
}
