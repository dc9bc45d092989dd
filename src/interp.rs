//! Reference interpreter for virtual instructions.
//!
//! The machine executes a [`Program`] in program order against a byte-level
//! memory model: one buffer per virtual register, a fixed register file, two
//! 32-bit flag registers and a log of side-effecting message writes. Every
//! lane of an instruction is evaluated before any result is stored, so an
//! instruction whose destination overlaps a source reads the old values.
//!
//! Control flow is straight-line: region markers are no-ops and every channel
//! is enabled. Message opcodes are modelled by fixed lane-wise functions of
//! their payload, which is enough to compare two programs lane by lane.

use lanelegal_mir::{
    ArchReg, CondMod, ElementType, Immediate, Instruction, Opcode, OpcodeClass, Operand, Program,
    RegRef, UNIT_BYTES, VirtualRegTable,
};
use thiserror::Error;
use tracing::trace;

/// Units in the fixed register file
pub const FIXED_REGISTER_UNITS: u32 = 128;

/// Failure to execute an instruction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpError {
    /// The instruction uses a feature the machine does not model
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An access falls outside its storage
    #[error("out of bounds: {operand} at byte {offset} ({size} bytes available)")]
    OutOfBounds {
        operand: String,
        offset: u32,
        size: u32,
    },

    /// An operand names a register the machine does not hold
    #[error("unknown virtual register {0}")]
    UnknownRegister(u32),
}

pub type Result<T> = std::result::Result<T, InterpError>;

/// One lane's contribution to a side-effecting message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWrite {
    pub opcode: Opcode,
    /// Absolute channel: instruction group plus lane
    pub channel: u32,
    /// Raw payload bits, in source order
    pub values: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    fn as_f64(self) -> f64 {
        match self {
            Value::Int(v) => v as f64,
            Value::Float(v) => v,
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            Value::Int(v) => v,
            Value::Float(v) => v as i64,
        }
    }

    fn is_float(self) -> bool {
        matches!(self, Value::Float(_))
    }
}

/// Machine state
#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    vgrfs: Vec<Vec<u8>>,
    grf: Vec<u8>,
    flags: [u32; 2],
    writes: Vec<MessageWrite>,
}

impl Machine {
    /// Zeroed machine with storage for every register of `program`
    pub fn new(program: &Program) -> Self {
        let mut machine = Self {
            vgrfs: Vec::new(),
            grf: vec![0; (FIXED_REGISTER_UNITS * UNIT_BYTES) as usize],
            flags: [0; 2],
            writes: Vec::new(),
        };
        machine.reserve(&program.vgrfs);
        machine
    }

    /// Grow storage to cover registers allocated since the machine was built
    fn reserve(&mut self, table: &VirtualRegTable) {
        for nr in self.vgrfs.len()..table.len() {
            self.vgrfs.push(vec![0; table.size_bytes(nr as u32) as usize]);
        }
    }

    pub fn vgrf_bytes(&self, nr: u32) -> Option<&[u8]> {
        self.vgrfs.get(nr as usize).map(Vec::as_slice)
    }

    /// Overwrite the start of register `nr` with `bytes`
    pub fn set_vgrf_bytes(&mut self, nr: u32, bytes: &[u8]) -> Result<()> {
        let storage = self
            .vgrfs
            .get_mut(nr as usize)
            .ok_or(InterpError::UnknownRegister(nr))?;
        if bytes.len() > storage.len() {
            return Err(InterpError::OutOfBounds {
                operand: format!("vgrf{}", nr),
                offset: 0,
                size: storage.len() as u32,
            });
        }
        storage[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn grf_bytes(&self) -> &[u8] {
        &self.grf
    }

    pub fn grf_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.grf
    }

    pub fn flags(&self) -> [u32; 2] {
        self.flags
    }

    pub fn set_flags(&mut self, flags: [u32; 2]) {
        self.flags = flags;
    }

    /// Side-effecting message writes, in execution order
    pub fn writes(&self) -> &[MessageWrite] {
        &self.writes
    }

    /// Execute every instruction of `program` in order
    pub fn run(&mut self, program: &Program) -> Result<()> {
        self.reserve(&program.vgrfs);
        for (loc, inst) in program.instructions() {
            trace!(block = loc.block, index = loc.index, %inst, "execute");
            self.step(inst)?;
        }
        Ok(())
    }

    /// Execute one instruction
    pub fn step(&mut self, inst: &Instruction) -> Result<()> {
        check_types(inst)?;
        match inst.opcode.class() {
            OpcodeClass::ControlFlow | OpcodeClass::Sync | OpcodeClass::Init => Ok(()),
            OpcodeClass::Alu | OpcodeClass::Math => self.exec_alu(inst),
            OpcodeClass::Indirect => self.exec_mov_indirect(inst),
            OpcodeClass::Message => self.exec_message(inst),
        }
    }

    fn lane_enabled(&self, inst: &Instruction, lane: u32) -> Result<bool> {
        match inst.predicate {
            None => Ok(true),
            Some(p) => {
                let bit = self.flag_bit(p.flag, inst.group as u32 + lane)?;
                Ok(bit != p.inverse)
            }
        }
    }

    fn flag_bit(&self, flag: u8, channel: u32) -> Result<bool> {
        let reg = self
            .flags
            .get(flag as usize)
            .ok_or_else(|| InterpError::Unsupported(format!("flag register f{}", flag)))?;
        Ok((reg >> (channel % 32)) & 1 != 0)
    }

    fn set_flag_bit(&mut self, flag: u8, channel: u32, value: bool) -> Result<()> {
        let reg = self
            .flags
            .get_mut(flag as usize)
            .ok_or_else(|| InterpError::Unsupported(format!("flag register f{}", flag)))?;
        let mask = 1u32 << (channel % 32);
        if value {
            *reg |= mask;
        } else {
            *reg &= !mask;
        }
        Ok(())
    }

    /// Storage slice and base byte of a register operand
    fn storage(&self, op: &Operand) -> Result<(&[u8], u32)> {
        match op {
            Operand::Vgrf(r) => self
                .vgrfs
                .get(r.nr as usize)
                .map(|s| (s.as_slice(), r.offset))
                .ok_or(InterpError::UnknownRegister(r.nr)),
            Operand::Fixed(r) => Ok((self.grf.as_slice(), r.nr * UNIT_BYTES + r.offset)),
            _ => Err(InterpError::Unsupported(format!("{} is not a register", op))),
        }
    }

    fn storage_mut(&mut self, op: &Operand) -> Result<(&mut [u8], u32)> {
        match op {
            Operand::Vgrf(r) => self
                .vgrfs
                .get_mut(r.nr as usize)
                .map(|s| (s.as_mut_slice(), r.offset))
                .ok_or(InterpError::UnknownRegister(r.nr)),
            Operand::Fixed(r) => Ok((self.grf.as_mut_slice(), r.nr * UNIT_BYTES + r.offset)),
            _ => Err(InterpError::Unsupported(format!("{} is not a register", op))),
        }
    }

    fn load(&self, op: &Operand, byte: u32, size: u32) -> Result<u64> {
        let (storage, base) = self.storage(op)?;
        let start = base + byte;
        let bytes = storage
            .get(start as usize..(start + size) as usize)
            .ok_or_else(|| InterpError::OutOfBounds {
                operand: op.to_string(),
                offset: start,
                size: storage.len() as u32,
            })?;
        Ok(bytes
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    fn store(&mut self, op: &Operand, byte: u32, size: u32, bits: u64) -> Result<()> {
        let name = op.to_string();
        let (storage, base) = self.storage_mut(op)?;
        let start = base + byte;
        let len = storage.len() as u32;
        let bytes = storage
            .get_mut(start as usize..(start + size) as usize)
            .ok_or(InterpError::OutOfBounds {
                operand: name,
                offset: start,
                size: len,
            })?;
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (bits >> (8 * i)) as u8;
        }
        Ok(())
    }

    /// Raw bits of component `k`, lane `lane` of `op` at `width` lanes
    fn read_bits(&self, op: &Operand, width: u32, k: u32, lane: u32) -> Result<u64> {
        match op {
            Operand::None | Operand::Arch(ArchReg::Null, _) => Ok(0),
            Operand::Arch(ArchReg::Flag(n), ty) => {
                let reg = self
                    .flags
                    .get(*n as usize)
                    .ok_or_else(|| InterpError::Unsupported(format!("flag register f{}", n)))?;
                Ok(*reg as u64 & type_mask(*ty))
            }
            Operand::Arch(ArchReg::Acc, _) => {
                Err(InterpError::Unsupported("accumulator reads".to_string()))
            }
            Operand::Imm(imm) => Ok(encode(imm_value(imm, lane), imm.ty())),
            Operand::Vgrf(r) | Operand::Fixed(r) => {
                self.load(op, lane_byte(r, width, k, lane), r.ty.size())
            }
        }
    }

    fn read_value(&self, op: &Operand, width: u32, k: u32, lane: u32) -> Result<Value> {
        match op {
            Operand::Imm(imm) => Ok(imm_value(imm, lane)),
            _ => {
                let ty = op.ty().unwrap_or(ElementType::UD);
                Ok(decode(self.read_bits(op, width, k, lane)?, ty))
            }
        }
    }

    /// Store `bits` into component `k`, lane `lane` of the destination
    fn write_lane(&mut self, inst: &Instruction, k: u32, lane: u32, bits: u64) -> Result<()> {
        match &inst.dst {
            Operand::None | Operand::Arch(ArchReg::Null, _) => Ok(()),
            Operand::Vgrf(r) | Operand::Fixed(r) => {
                let byte = lane_byte(r, inst.exec_size as u32, k, lane);
                self.store(&inst.dst, byte, r.ty.size(), bits)
            }
            other => Err(InterpError::Unsupported(format!("destination {}", other))),
        }
    }

    fn exec_alu(&mut self, inst: &Instruction) -> Result<()> {
        let width = inst.exec_size as u32;
        let dst_ty = inst.dst.ty().unwrap_or(ElementType::UD);
        let mut results = Vec::with_capacity(width as usize);

        for lane in 0..width {
            let enabled = self.lane_enabled(inst, lane)?;
            if !enabled && inst.opcode != Opcode::Sel {
                continue;
            }

            if inst.opcode == Opcode::Mov && is_raw_copy(inst, &inst.srcs[0], dst_ty) {
                let bits = self.read_bits(&inst.srcs[0], width, 0, lane)?;
                let flag = inst
                    .cond_mod
                    .map(|cond| compare(cond, decode(bits, dst_ty), Value::Int(0)));
                results.push((lane, bits, flag));
                continue;
            }

            let mut values = [Value::Int(0); 3];
            for (i, src) in inst.srcs.iter().enumerate() {
                values[i] = self.read_value(src, width, 0, lane)?;
            }

            let (value, flag) = match inst.opcode {
                Opcode::Sel => {
                    let picked = match inst.cond_mod {
                        Some(CondMod::L | CondMod::LE) => min(values[0], values[1]),
                        Some(CondMod::G | CondMod::GE) => max(values[0], values[1]),
                        Some(_) => {
                            return Err(InterpError::Unsupported(format!(
                                "{}: selection by equality",
                                inst
                            )));
                        }
                        None => {
                            let src = if enabled { &inst.srcs[0] } else { &inst.srcs[1] };
                            if is_raw_copy(inst, src, dst_ty) {
                                let bits = self.read_bits(src, width, 0, lane)?;
                                results.push((lane, bits, None));
                                continue;
                            }
                            if enabled { values[0] } else { values[1] }
                        }
                    };
                    (picked, None)
                }
                Opcode::Cmp => {
                    let cond = inst.cond_mod.ok_or_else(|| {
                        InterpError::Unsupported(format!("{}: comparison without condition", inst))
                    })?;
                    let pass = compare(cond, values[0], values[1]);
                    (Value::Int(if pass { -1 } else { 0 }), Some(pass))
                }
                _ => {
                    let value = evaluate(inst.opcode, &values, &inst.srcs)?;
                    let flag = inst
                        .cond_mod
                        .map(|cond| compare(cond, value, Value::Int(0)));
                    (value, flag)
                }
            };

            let value = if inst.saturate { saturate(value) } else { value };
            results.push((lane, encode(value, dst_ty), flag));
        }

        for (lane, bits, flag) in results {
            self.write_lane(inst, 0, lane, bits)?;
            if let Some(pass) = flag {
                self.set_flag_bit(inst.flag_subreg, inst.group as u32 + lane, pass)?;
            }
        }
        Ok(())
    }

    fn exec_mov_indirect(&mut self, inst: &Instruction) -> Result<()> {
        let width = inst.exec_size as u32;
        let region = &inst.srcs[0];
        let length = inst.size_read(0);
        let dst_ty = inst.dst.ty().unwrap_or(ElementType::UD);
        let mut results = Vec::with_capacity(width as usize);

        for lane in 0..width {
            if !self.lane_enabled(inst, lane)? {
                continue;
            }
            let offset = self.read_value(&inst.srcs[1], width, 0, lane)?.as_i64();
            let offset = u32::try_from(offset)
                .ok()
                .filter(|o| o + dst_ty.size() <= length)
                .ok_or_else(|| InterpError::OutOfBounds {
                    operand: region.to_string(),
                    offset: offset as u32,
                    size: length,
                })?;
            results.push((lane, self.load(region, offset, dst_ty.size())?));
        }

        for (lane, bits) in results {
            self.write_lane(inst, 0, lane, bits)?;
        }
        Ok(())
    }

    /// Payload of one lane: every component of every data source, in order
    fn payload(&self, inst: &Instruction, lane: u32) -> Result<Vec<(u64, Value)>> {
        let width = inst.exec_size as u32;
        let mut payload = Vec::new();
        for (i, src) in inst.srcs.iter().enumerate() {
            if inst.is_control_source(i) || src.is_none() {
                continue;
            }
            for k in 0..inst.components_read(i) {
                payload.push((
                    self.read_bits(src, width, k, lane)?,
                    self.read_value(src, width, k, lane)?,
                ));
            }
        }
        Ok(payload)
    }

    fn exec_message(&mut self, inst: &Instruction) -> Result<()> {
        let width = inst.exec_size as u32;
        let dst_ty = inst.dst.ty().unwrap_or(ElementType::UD);
        let dst_comps = inst.dst_components();
        let mut results = Vec::new();

        for lane in 0..width {
            if !self.lane_enabled(inst, lane)? {
                continue;
            }
            let payload = self.payload(inst, lane)?;
            match inst.opcode {
                Opcode::UntypedSurfaceWrite | Opcode::FbWrite => {
                    let channel = inst.group as u32 + lane;
                    self.writes.push(MessageWrite {
                        opcode: inst.opcode,
                        channel,
                        values: payload.iter().map(|(bits, _)| *bits).collect(),
                    });
                }
                Opcode::UntypedSurfaceRead => {
                    let address = payload.first().map(|(_, v)| v.as_i64()).unwrap_or(0);
                    let surface = control(inst, 1)? as i64;
                    for m in 0..dst_comps {
                        let value = address.wrapping_mul(m as i64 + 1).wrapping_add(surface);
                        results.push((m, lane, encode(Value::Int(value), dst_ty)));
                    }
                }
                _ => {
                    // Sampler: a fixed weighted sum of the payload
                    for m in 0..dst_comps {
                        let value: f64 = payload
                            .iter()
                            .enumerate()
                            .map(|(j, (_, v))| v.as_f64() * (j as f64 + 1.0 + m as f64))
                            .sum();
                        results.push((m, lane, encode(Value::Float(value), dst_ty)));
                    }
                }
            }
        }

        for (m, lane, bits) in results {
            self.write_lane(inst, m, lane, bits)?;
        }
        Ok(())
    }
}

fn check_types(inst: &Instruction) -> Result<()> {
    let operands = std::iter::once(&inst.dst).chain(inst.srcs.iter());
    for op in operands {
        if op.ty() == Some(ElementType::HF) {
            return Err(InterpError::Unsupported(format!("{}: half-float operand", inst)));
        }
    }
    Ok(())
}

/// Same-typed register moves copy bits without a round trip through a value
fn is_raw_copy(inst: &Instruction, src: &Operand, dst_ty: ElementType) -> bool {
    !inst.saturate && src.reg().is_some() && src.ty() == Some(dst_ty)
}

fn control(inst: &Instruction, slot: usize) -> Result<u32> {
    match inst.srcs.get(slot) {
        Some(Operand::Imm(imm)) => imm.as_u32().ok_or_else(|| {
            InterpError::Unsupported(format!("{}: control operand {}", inst, slot))
        }),
        _ => Err(InterpError::Unsupported(format!(
            "{}: control operand {}",
            inst, slot
        ))),
    }
}

/// Byte of component `k`, lane `lane` relative to the operand's storage base
fn lane_byte(r: &RegRef, width: u32, k: u32, lane: u32) -> u32 {
    k * r.component_size(width) + lane * r.stride as u32 * r.ty.size()
}

fn type_mask(ty: ElementType) -> u64 {
    match ty.size() {
        8 => u64::MAX,
        n => (1u64 << (8 * n)) - 1,
    }
}

fn imm_value(imm: &Immediate, lane: u32) -> Value {
    match *imm {
        Immediate::D(v) => Value::Int(v as i64),
        Immediate::UD(v) => Value::Int(v as i64),
        Immediate::W(v) => Value::Int(v as i64),
        Immediate::UW(v) => Value::Int(v as i64),
        Immediate::F(v) => Value::Float(v as f64),
        Immediate::DF(v) => Value::Float(v),
        Immediate::Q(v) => Value::Int(v),
        Immediate::UQ(v) => Value::Int(v as i64),
        Immediate::Vector(v) => Value::Int(v[(lane % 8) as usize] as i64),
        Immediate::VectorFloat(v) => Value::Float(v[(lane % 4) as usize] as f64),
    }
}

fn decode(bits: u64, ty: ElementType) -> Value {
    match ty {
        ElementType::UB => Value::Int(bits as u8 as i64),
        ElementType::B => Value::Int(bits as u8 as i8 as i64),
        ElementType::UW => Value::Int(bits as u16 as i64),
        ElementType::W => Value::Int(bits as u16 as i16 as i64),
        ElementType::UD => Value::Int(bits as u32 as i64),
        ElementType::D => Value::Int(bits as u32 as i32 as i64),
        ElementType::UQ | ElementType::Q => Value::Int(bits as i64),
        ElementType::F => Value::Float(f32::from_bits(bits as u32) as f64),
        ElementType::DF => Value::Float(f64::from_bits(bits)),
        // Rejected by `check_types`
        ElementType::HF => Value::Int(bits as u16 as i64),
    }
}

fn encode(value: Value, ty: ElementType) -> u64 {
    match ty {
        ElementType::F => (value.as_f64() as f32).to_bits() as u64,
        ElementType::DF => value.as_f64().to_bits(),
        _ => {
            let bits = match value {
                Value::Int(v) => v as u64,
                Value::Float(v) if ty.is_signed() => v as i64 as u64,
                Value::Float(v) => v as u64,
            };
            bits & type_mask(ty)
        }
    }
}

fn saturate(value: Value) -> Value {
    match value {
        Value::Float(v) if v.is_nan() => Value::Float(0.0),
        Value::Float(v) => Value::Float(v.clamp(0.0, 1.0)),
        other => other,
    }
}

fn compare(cond: CondMod, a: Value, b: Value) -> bool {
    if a.is_float() || b.is_float() {
        let (a, b) = (a.as_f64(), b.as_f64());
        match cond {
            CondMod::Z => a == b,
            CondMod::NZ => a != b,
            CondMod::G => a > b,
            CondMod::GE => a >= b,
            CondMod::L => a < b,
            CondMod::LE => a <= b,
        }
    } else {
        let (a, b) = (a.as_i64(), b.as_i64());
        match cond {
            CondMod::Z => a == b,
            CondMod::NZ => a != b,
            CondMod::G => a > b,
            CondMod::GE => a >= b,
            CondMod::L => a < b,
            CondMod::LE => a <= b,
        }
    }
}

fn min(a: Value, b: Value) -> Value {
    if compare(CondMod::L, b, a) { b } else { a }
}

fn max(a: Value, b: Value) -> Value {
    if compare(CondMod::G, b, a) { b } else { a }
}

fn unsigned_bits(value: Value, src: &Operand) -> u64 {
    let ty = src.ty().unwrap_or(ElementType::UD);
    value.as_i64() as u64 & type_mask(ty)
}

/// Lane-wise result of an arithmetic or math opcode
fn evaluate(opcode: Opcode, v: &[Value; 3], srcs: &[Operand]) -> Result<Value> {
    let float = srcs
        .iter()
        .zip(v.iter())
        .any(|(src, value)| !src.is_none() && value.is_float());
    let (a, b, c) = (v[0], v[1], v[2]);

    let value = match opcode {
        Opcode::Not => Value::Int(!a.as_i64()),
        Opcode::And => Value::Int(a.as_i64() & b.as_i64()),
        Opcode::Or => Value::Int(a.as_i64() | b.as_i64()),
        Opcode::Xor => Value::Int(a.as_i64() ^ b.as_i64()),
        Opcode::Shl => Value::Int(a.as_i64().wrapping_shl((b.as_i64() & 63) as u32)),
        Opcode::Shr => Value::Int((unsigned_bits(a, &srcs[0]) >> (b.as_i64() & 63)) as i64),
        Opcode::Asr => Value::Int(a.as_i64() >> (b.as_i64() & 63)),
        Opcode::Mov if float => Value::Float(a.as_f64()),
        Opcode::Mov => a,
        Opcode::Add if float => Value::Float(a.as_f64() + b.as_f64()),
        Opcode::Add => Value::Int(a.as_i64().wrapping_add(b.as_i64())),
        Opcode::Mul if float => Value::Float(a.as_f64() * b.as_f64()),
        Opcode::Mul => Value::Int(a.as_i64().wrapping_mul(b.as_i64())),
        Opcode::Avg if float => Value::Float((a.as_f64() + b.as_f64()) / 2.0),
        Opcode::Avg => Value::Int(a.as_i64().wrapping_add(b.as_i64()).wrapping_add(1) >> 1),
        Opcode::Frc => Value::Float(a.as_f64() - a.as_f64().floor()),
        Opcode::Rndd => Value::Float(a.as_f64().floor()),
        Opcode::Mad if float => Value::Float(a.as_f64() + b.as_f64() * c.as_f64()),
        Opcode::Mad => Value::Int(a.as_i64().wrapping_add(b.as_i64().wrapping_mul(c.as_i64()))),
        Opcode::Lrp => {
            let t = a.as_f64();
            Value::Float(t * b.as_f64() + (1.0 - t) * c.as_f64())
        }
        Opcode::Bfe => {
            let width = (a.as_i64() & 31) as u32;
            let offset = (b.as_i64() & 31) as u32;
            let mask = (1u64 << width) - 1;
            Value::Int(((unsigned_bits(c, &srcs[2]) >> offset) & mask) as i64)
        }
        Opcode::Rcp => Value::Float(1.0 / a.as_f64()),
        Opcode::Rsq => Value::Float(1.0 / a.as_f64().sqrt()),
        Opcode::Sqrt => Value::Float(a.as_f64().sqrt()),
        Opcode::Exp2 => Value::Float(a.as_f64().exp2()),
        Opcode::Log2 => Value::Float(a.as_f64().log2()),
        Opcode::Sin => Value::Float(a.as_f64().sin()),
        Opcode::Cos => Value::Float(a.as_f64().cos()),
        Opcode::Pow => Value::Float(a.as_f64().powf(b.as_f64())),
        Opcode::IntQuotient => Value::Int(a.as_i64().checked_div(b.as_i64()).unwrap_or(-1)),
        Opcode::IntRemainder => Value::Int(a.as_i64().checked_rem(b.as_i64()).unwrap_or(a.as_i64())),
        other => {
            return Err(InterpError::Unsupported(format!(
                "{} is not an arithmetic opcode",
                other
            )));
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanelegal_mir::{Predicate, ProgramBuilder};

    fn f32_lanes(machine: &Machine, nr: u32) -> Vec<f32> {
        machine
            .vgrf_bytes(nr)
            .unwrap()
            .chunks(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn f32_bytes(values: impl IntoIterator<Item = f32>) -> Vec<u8> {
        values.into_iter().flat_map(f32::to_le_bytes).collect()
    }

    #[test]
    fn test_add_immediate() {
        let program = ProgramBuilder::new()
            .vgrfs(&[1, 1])
            .instr(Instruction::new(
                Opcode::Add,
                8,
                Operand::vgrf(0, ElementType::F),
                [Operand::vgrf(1, ElementType::F), Operand::imm_f(0.5)],
            ))
            .build();
        let mut machine = Machine::new(&program);
        machine
            .set_vgrf_bytes(1, &f32_bytes((0..8).map(|i| i as f32)))
            .unwrap();
        machine.run(&program).unwrap();
        assert_eq!(
            f32_lanes(&machine, 0),
            vec![0.5, 1.5, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5]
        );
    }

    #[test]
    fn test_cmp_writes_flag_and_predicate_reads_it() {
        let program = ProgramBuilder::new()
            .vgrfs(&[1, 1])
            .instr(
                Instruction::new(
                    Opcode::Cmp,
                    8,
                    Operand::null(),
                    [Operand::vgrf(1, ElementType::F), Operand::imm_f(3.5)],
                )
                .with_cond_mod(CondMod::G, 0),
            )
            .instr(
                Instruction::new(
                    Opcode::Mov,
                    8,
                    Operand::vgrf(0, ElementType::F),
                    [Operand::imm_f(9.0)],
                )
                .with_predicate(Predicate::normal(0)),
            )
            .build();
        let mut machine = Machine::new(&program);
        machine
            .set_vgrf_bytes(1, &f32_bytes((0..8).map(|i| i as f32)))
            .unwrap();
        machine.run(&program).unwrap();

        assert_eq!(machine.flags()[0], 0xf0);
        assert_eq!(
            f32_lanes(&machine, 0),
            vec![0.0, 0.0, 0.0, 0.0, 9.0, 9.0, 9.0, 9.0]
        );
    }

    #[test]
    fn test_sel_with_predicate_picks_sources() {
        let program = ProgramBuilder::new()
            .vgrfs(&[1])
            .instr(
                Instruction::new(
                    Opcode::Sel,
                    8,
                    Operand::vgrf(0, ElementType::D),
                    [Operand::imm_d(1), Operand::imm_d(2)],
                )
                .with_predicate(Predicate::inverted(1)),
            )
            .build();
        let mut machine = Machine::new(&program);
        machine.set_flags([0, 0x0f]);
        machine.run(&program).unwrap();
        let lanes: Vec<i32> = machine
            .vgrf_bytes(0)
            .unwrap()
            .chunks(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(lanes, vec![2, 2, 2, 2, 1, 1, 1, 1]);
    }

    #[test]
    fn test_overlapping_operands_read_old_values() {
        // Shift every lane down by one, in place
        let program = ProgramBuilder::new()
            .vgrfs(&[1])
            .instr(Instruction::new(
                Opcode::Mov,
                4,
                Operand::vgrf(0, ElementType::F),
                [Operand::Vgrf(RegRef::new(0, ElementType::F).with_offset(4))],
            ))
            .build();
        let mut machine = Machine::new(&program);
        machine
            .set_vgrf_bytes(0, &f32_bytes((1..=8).map(|i| i as f32)))
            .unwrap();
        machine.run(&program).unwrap();
        assert_eq!(
            f32_lanes(&machine, 0),
            vec![2.0, 3.0, 4.0, 5.0, 5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn test_fb_write_logs_channels_in_order() {
        let fb = Instruction::new(
            Opcode::FbWrite,
            8,
            Operand::None,
            [
                Operand::vgrf(0, ElementType::F),
                Operand::None,
                Operand::None,
                Operand::imm_ud(0),
                Operand::imm_ud(1),
            ],
        )
        .with_group(8);
        let program = ProgramBuilder::new().vgrfs(&[1]).instr(fb).build();
        let mut machine = Machine::new(&program);
        machine.run(&program).unwrap();

        let channels: Vec<u32> = machine.writes().iter().map(|w| w.channel).collect();
        assert_eq!(channels, (8..16).collect::<Vec<_>>());
        assert!(machine.writes().iter().all(|w| w.values == vec![0]));
    }

    #[test]
    fn test_mov_indirect_reads_region() {
        let program = ProgramBuilder::new()
            .vgrfs(&[1, 1, 1])
            .instr(Instruction::new(
                Opcode::MovIndirect,
                8,
                Operand::vgrf(0, ElementType::UD),
                [
                    Operand::vgrf(1, ElementType::UD),
                    Operand::vgrf(2, ElementType::UD),
                    Operand::imm_ud(32),
                ],
            ))
            .build();
        let mut machine = Machine::new(&program);
        let region: Vec<u8> = (0..8u32).flat_map(|v| (v * 10).to_le_bytes()).collect();
        let offsets: Vec<u8> = (0..8u32).flat_map(|l| ((7 - l) * 4).to_le_bytes()).collect();
        machine.set_vgrf_bytes(1, &region).unwrap();
        machine.set_vgrf_bytes(2, &offsets).unwrap();
        machine.run(&program).unwrap();

        let lanes: Vec<u32> = machine
            .vgrf_bytes(0)
            .unwrap()
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(lanes, vec![70, 60, 50, 40, 30, 20, 10, 0]);
    }

    #[test]
    fn test_register_mov_with_cond_mod_writes_flag() {
        let program = ProgramBuilder::new()
            .vgrfs(&[1, 1])
            .instr(
                Instruction::new(
                    Opcode::Mov,
                    8,
                    Operand::vgrf(0, ElementType::UD),
                    [Operand::vgrf(1, ElementType::UD)],
                )
                .with_cond_mod(CondMod::Z, 1),
            )
            .build();
        let source: Vec<u8> = (0..8u32)
            .map(|lane| if lane % 2 == 0 { 0 } else { 5 })
            .flat_map(u32::to_le_bytes)
            .collect();
        let mut machine = Machine::new(&program);
        machine.set_vgrf_bytes(1, &source).unwrap();
        machine.set_flags([0, 0xffff_ffff]);
        machine.run(&program).unwrap();

        // Zero lanes set their bit, the rest clear it; lanes past 8 keep theirs
        assert_eq!(machine.flags(), [0, 0xffff_ff55]);
        assert_eq!(machine.vgrf_bytes(0), Some(source.as_slice()));
    }

    #[test]
    fn test_half_float_is_unsupported() {
        let program = ProgramBuilder::new()
            .vgrfs(&[1])
            .instr(Instruction::new(
                Opcode::Mov,
                8,
                Operand::vgrf(0, ElementType::HF),
                [Operand::vgrf(0, ElementType::HF)],
            ))
            .build();
        let mut machine = Machine::new(&program);
        assert!(matches!(
            machine.run(&program),
            Err(InterpError::Unsupported(_))
        ));
    }

    #[test]
    fn test_out_of_bounds_access() {
        let program = ProgramBuilder::new()
            .vgrfs(&[1])
            .instr(Instruction::new(
                Opcode::Mov,
                16,
                Operand::vgrf(0, ElementType::F),
                [Operand::imm_f(1.0)],
            ))
            .build();
        let mut machine = Machine::new(&program);
        assert!(matches!(
            machine.run(&program),
            Err(InterpError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_registers_grow_with_program() {
        let mut program = ProgramBuilder::new().vgrfs(&[1]).build();
        let mut machine = Machine::new(&program);
        program.vgrfs.declare(2);
        machine.run(&program).unwrap();
        assert_eq!(machine.vgrf_bytes(1).map(<[u8]>::len), Some(64));
    }
}
