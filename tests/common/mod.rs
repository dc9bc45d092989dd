//! Shared helpers for integration tests: a deterministic pseudo-random
//! generator and random program construction.
#![allow(dead_code)]

use lanelegal::Machine;
use lanelegal::interp::FIXED_REGISTER_UNITS;
use lanelegal::mir::{
    CondMod, ElementType, Immediate, Instruction, Opcode, Operand, Predicate, Program,
    ProgramBuilder, RegRef, UNIT_BYTES, units_for_bytes,
};

/// xorshift64* generator
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    /// Uniform in `0..n`
    pub fn below(&mut self, n: u32) -> u32 {
        (self.next_u64() % n as u64) as u32
    }

    /// True with probability `num / den`
    pub fn chance(&mut self, num: u32, den: u32) -> bool {
        self.below(den) < num
    }

    pub fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[self.below(items.len() as u32) as usize]
    }

    /// Small float with a short binary expansion
    pub fn small_f64(&mut self) -> f64 {
        (self.below(64) as f64 - 32.0) / 4.0
    }
}

/// Program under construction plus the element type each register holds
#[derive(Default)]
pub struct Generated {
    pub sizes: Vec<u32>,
    pub types: Vec<ElementType>,
    pub instructions: Vec<Instruction>,
}

impl Generated {
    pub fn reg(&mut self, units: u32, ty: ElementType) -> u32 {
        self.sizes.push(units.max(1));
        self.types.push(ty);
        self.sizes.len() as u32 - 1
    }

    pub fn build(&self) -> Program {
        self.instructions
            .iter()
            .cloned()
            .fold(ProgramBuilder::new().vgrfs(&self.sizes), |b, inst| {
                b.instr(inst)
            })
            .build()
    }
}

const ANY_TYPES: &[ElementType] = &[
    ElementType::F,
    ElementType::DF,
    ElementType::D,
    ElementType::UD,
    ElementType::W,
];
const INT_TYPES: &[ElementType] = &[ElementType::D, ElementType::UD, ElementType::W];
const FLOAT_TYPES: &[ElementType] = &[ElementType::F, ElementType::DF];
const MATH_OPCODES: &[Opcode] = &[
    Opcode::Rcp,
    Opcode::Rsq,
    Opcode::Sqrt,
    Opcode::Exp2,
    Opcode::Log2,
    Opcode::Sin,
    Opcode::Cos,
    Opcode::Pow,
];

fn immediate(rng: &mut XorShift, ty: ElementType) -> Operand {
    let imm = match ty {
        ElementType::F => Immediate::F(rng.small_f64() as f32),
        ElementType::DF => Immediate::DF(rng.small_f64()),
        ElementType::D => Immediate::D(rng.below(200) as i32 - 100),
        ElementType::UD => Immediate::UD(rng.below(1000)),
        _ if rng.chance(1, 2) => {
            let mut v = [0i8; 8];
            for e in v.iter_mut() {
                *e = rng.below(16) as i8 - 8;
            }
            Immediate::Vector(v)
        }
        _ => Immediate::W(rng.below(200) as i16 - 100),
    };
    Operand::Imm(imm)
}

/// A data source of type `ty` read at `exec` lanes
fn source(rng: &mut XorShift, code: &mut Generated, ty: ElementType, exec: u32) -> Operand {
    match rng.below(24) {
        0..=9 => {
            let nr = code.reg(units_for_bytes(exec * ty.size()), ty);
            Operand::vgrf(nr, ty)
        }
        10..=12 => {
            let nr = code.reg(1, ty);
            let element = rng.below(UNIT_BYTES / ty.size());
            Operand::Vgrf(
                RegRef::new(nr, ty)
                    .with_stride(0)
                    .with_offset(element * ty.size()),
            )
        }
        13 | 14 => {
            let nr = code.reg(units_for_bytes(exec * 2 * ty.size()), ty);
            Operand::Vgrf(RegRef::new(nr, ty).with_stride(2))
        }
        // Read-only fixed register, odd numbers included
        15 => {
            let units = units_for_bytes(exec * ty.size());
            Operand::fixed(rng.below(FIXED_REGISTER_UNITS - units), ty)
        }
        16..=19 => immediate(rng, ty),
        _ if ty.size() == 4 && !ty.is_float() => {
            Operand::flag(rng.below(2) as u8).retype(ty)
        }
        _ => immediate(rng, ty),
    }
}

/// One random lane-wise instruction, possibly predicated or flag-writing
fn alu(rng: &mut XorShift, code: &mut Generated) -> Instruction {
    let exec = rng.pick(&[8u32, 16, 32]);
    let (opcode, ty) = match rng.below(12) {
        0 => (Opcode::Mov, rng.pick(ANY_TYPES)),
        1 | 2 => (Opcode::Add, rng.pick(ANY_TYPES)),
        3 => (Opcode::Mul, rng.pick(ANY_TYPES)),
        4 => (Opcode::Mad, rng.pick(FLOAT_TYPES)),
        5 => (Opcode::Sel, rng.pick(ANY_TYPES)),
        6 => (Opcode::Cmp, rng.pick(ANY_TYPES)),
        7 => (rng.pick(&[Opcode::And, Opcode::Xor]), rng.pick(INT_TYPES)),
        8 => (Opcode::Frc, ElementType::F),
        9 | 10 => (rng.pick(MATH_OPCODES), ElementType::F),
        _ => (Opcode::IntQuotient, ElementType::D),
    };

    let mut srcs: Vec<Operand> = (0..opcode.arity())
        .map(|_| source(rng, code, ty, exec))
        .collect();

    let dst_units = units_for_bytes(exec * ty.size());
    let dst = match rng.below(10) {
        // In place over a packed source
        0 | 1 if matches!(srcs[0], Operand::Vgrf(r) if r.stride == 1) => srcs[0],
        // Destination one unit below the first source, in the same register
        2 | 3 => {
            let nr = code.reg(dst_units + 1, ty);
            srcs[0] = Operand::Vgrf(RegRef::new(nr, ty).with_offset(UNIT_BYTES));
            Operand::vgrf(nr, ty)
        }
        4 if opcode == Opcode::Cmp => Operand::null(),
        5 => {
            let nr = code.reg(units_for_bytes(exec * 2 * ty.size()), ty);
            Operand::Vgrf(RegRef::new(nr, ty).with_stride(2))
        }
        _ => Operand::vgrf(code.reg(dst_units, ty), ty),
    };

    let mut inst = Instruction::new(opcode, exec as u8, dst, srcs);
    match opcode {
        Opcode::Cmp => {
            let cond = rng.pick(&[CondMod::L, CondMod::GE, CondMod::Z, CondMod::NZ]);
            inst = inst.with_cond_mod(cond, rng.below(2) as u8);
        }
        Opcode::Sel if rng.chance(1, 3) => {
            inst = inst.with_cond_mod(rng.pick(&[CondMod::L, CondMod::G]), 0);
        }
        Opcode::Sel | Opcode::IntQuotient => {}
        _ if MATH_OPCODES.contains(&opcode) => {}
        _ if rng.chance(1, 5) => {
            inst = inst.with_cond_mod(rng.pick(&[CondMod::G, CondMod::Z]), rng.below(2) as u8);
        }
        _ => {}
    }
    if rng.chance(1, 4) {
        let flag = rng.below(2) as u8;
        inst = inst.with_predicate(if rng.chance(1, 2) {
            Predicate::normal(flag)
        } else {
            Predicate::inverted(flag)
        });
    }
    if rng.chance(1, 10) {
        inst = inst.with_force_writemask_all();
    }
    inst
}

/// Explicit-lod sample with a multi-component coordinate
fn sample(rng: &mut XorShift, code: &mut Generated) -> Instruction {
    let exec = rng.pick(&[8u32, 16, 32]);
    let coords = 1 + rng.below(4);
    let coord = code.reg(units_for_bytes(coords * exec * 4), ElementType::F);
    let lod = source(rng, code, ElementType::F, exec);
    let dst = code.reg(units_for_bytes(4 * exec * 4), ElementType::F);
    Instruction::new(
        Opcode::Txl,
        exec as u8,
        Operand::vgrf(dst, ElementType::F),
        [
            Operand::vgrf(coord, ElementType::F),
            lod,
            Operand::None,
            Operand::imm_ud(coords),
            Operand::imm_ud(0),
        ],
    )
    .with_dst_components(4)
}

/// Surface write of a random number of components
fn surface_write(rng: &mut XorShift, code: &mut Generated) -> Instruction {
    let exec = rng.pick(&[8u32, 16, 32]);
    let comps = 1 + rng.below(4);
    let address = source(rng, code, ElementType::UD, exec);
    let data = code.reg(units_for_bytes(comps * exec * 4), ElementType::F);
    Instruction::new(
        Opcode::UntypedSurfaceWrite,
        exec as u8,
        Operand::None,
        [
            address,
            Operand::vgrf(data, ElementType::F),
            Operand::imm_ud(1),
            Operand::imm_ud(comps),
        ],
    )
}

/// Gradient sample with separate coordinate and derivative payloads
fn sample_gradient(rng: &mut XorShift, code: &mut Generated) -> Instruction {
    let f = ElementType::F;
    let exec = rng.pick(&[8u32, 16, 32]);
    let coords = 1 + rng.below(3);
    let grads = 1 + rng.below(2);
    let coord = code.reg(units_for_bytes(coords * exec * 4), f);
    let grad = code.reg(units_for_bytes(2 * grads * exec * 4), f);
    let dst = code.reg(units_for_bytes(4 * exec * 4), f);
    Instruction::new(
        Opcode::Txd,
        exec as u8,
        Operand::vgrf(dst, f),
        [
            Operand::vgrf(coord, f),
            Operand::vgrf(grad, f),
            Operand::None,
            Operand::imm_ud(coords),
            Operand::imm_ud(grads),
        ],
    )
    .with_dst_components(4)
}

/// Multisample fetch with integer coordinates and a sample index
fn fetch_multisample(rng: &mut XorShift, code: &mut Generated) -> Instruction {
    let ud = ElementType::UD;
    let exec = rng.pick(&[8u32, 16, 32]);
    let coords = 1 + rng.below(3);
    let coord = code.reg(units_for_bytes(coords * exec * 4), ud);
    let index = source(rng, code, ud, exec);
    let dst = code.reg(units_for_bytes(4 * exec * 4), ElementType::F);
    Instruction::new(
        Opcode::TxfMs,
        exec as u8,
        Operand::vgrf(dst, ElementType::F),
        [
            Operand::vgrf(coord, ud),
            Operand::None,
            index,
            Operand::imm_ud(coords),
            Operand::imm_ud(0),
        ],
    )
    .with_dst_components(4)
}

/// Framebuffer write of a color with optional alpha and depth
fn framebuffer_write(rng: &mut XorShift, code: &mut Generated) -> Instruction {
    let f = ElementType::F;
    let exec = rng.pick(&[8u32, 16, 32]);
    let comps = 1 + rng.below(4);
    let color = code.reg(units_for_bytes(comps * exec * 4), f);
    let mut optional = || {
        if rng.chance(1, 2) {
            source(rng, code, f, exec)
        } else {
            Operand::None
        }
    };
    let alpha = optional();
    let depth = optional();
    Instruction::new(
        Opcode::FbWrite,
        exec as u8,
        Operand::None,
        [
            Operand::vgrf(color, f),
            alpha,
            depth,
            Operand::imm_ud(0),
            Operand::imm_ud(comps),
        ],
    )
}

/// Per-lane gather out of a two-unit region. The offsets are masked to
/// dword multiples inside the region first, so the gather stays in bounds.
fn gather(rng: &mut XorShift, code: &mut Generated) -> [Instruction; 2] {
    let (f, ud) = (ElementType::F, ElementType::UD);
    let exec = rng.pick(&[8u32, 16, 32]);
    let units = units_for_bytes(exec * 4);
    let raw = code.reg(units, ud);
    let offsets = code.reg(units, ud);
    let region = code.reg(2, f);
    let dst = code.reg(units, f);
    [
        Instruction::new(
            Opcode::And,
            exec as u8,
            Operand::vgrf(offsets, ud),
            [Operand::vgrf(raw, ud), Operand::imm_ud(2 * UNIT_BYTES - 4)],
        ),
        Instruction::new(
            Opcode::MovIndirect,
            exec as u8,
            Operand::vgrf(dst, f),
            [
                Operand::vgrf(region, f),
                Operand::vgrf(offsets, ud),
                Operand::imm_ud(2 * UNIT_BYTES),
            ],
        ),
    ]
}

/// Random straight-line program of roughly `count` instructions
pub fn random_program(rng: &mut XorShift, count: usize) -> Generated {
    let mut code = Generated::default();
    for _ in 0..count {
        match rng.below(12) {
            0 => {
                let inst = sample(rng, &mut code);
                code.instructions.push(inst);
            }
            1 => {
                let inst = surface_write(rng, &mut code);
                code.instructions.push(inst);
            }
            2 => {
                let inst = match rng.below(3) {
                    0 => sample_gradient(rng, &mut code),
                    1 => fetch_multisample(rng, &mut code),
                    _ => framebuffer_write(rng, &mut code),
                };
                code.instructions.push(inst);
            }
            3 => {
                let pair = gather(rng, &mut code);
                code.instructions.extend(pair);
            }
            _ => {
                let inst = alu(rng, &mut code);
                code.instructions.push(inst);
            }
        }
    }
    code
}

/// Fill every register of `code` with random values of its element type
pub fn randomize(rng: &mut XorShift, code: &Generated, machine: &mut Machine) {
    for (nr, (&units, &ty)) in code.sizes.iter().zip(&code.types).enumerate() {
        let elements = units * UNIT_BYTES / ty.size();
        let mut bytes = Vec::with_capacity((units * UNIT_BYTES) as usize);
        for _ in 0..elements {
            match ty {
                ElementType::F => bytes.extend((rng.small_f64() as f32).to_le_bytes()),
                ElementType::DF => bytes.extend(rng.small_f64().to_le_bytes()),
                _ => {
                    let raw = rng.next_u64().to_le_bytes();
                    bytes.extend(&raw[..ty.size() as usize]);
                }
            }
        }
        machine
            .set_vgrf_bytes(nr as u32, &bytes)
            .expect("register exists");
    }
    machine.set_flags([rng.next_u64() as u32, rng.next_u64() as u32]);
    for chunk in machine.grf_bytes_mut().chunks_exact_mut(4) {
        chunk.copy_from_slice(&(rng.small_f64() as f32).to_le_bytes());
    }
}

/// Registers of `dataflow_program`, four units each
pub const DATAFLOW_REGISTERS: u32 = 6;

fn vector_float(rng: &mut XorShift) -> Operand {
    let mut v = [0f32; 4];
    for e in v.iter_mut() {
        *e = rng.small_f64() as f32;
    }
    Operand::Imm(Immediate::VectorFloat(v))
}

/// Half of register `nr`: lanes 0-15 or 16-31 of a 32-lane float
fn half(rng: &mut XorShift, nr: u32) -> Operand {
    let offset = rng.below(2) * 2 * UNIT_BYTES;
    Operand::Vgrf(RegRef::new(nr, ElementType::F).with_offset(offset))
}

/// Straight-line and structured code over a few float registers that are
/// repeatedly redefined, with every result eventually written to a surface.
/// Registers start initialized from vector immediates, so the write log
/// depends only on the code.
pub fn dataflow_program(rng: &mut XorShift, count: usize) -> Program {
    let f = ElementType::F;
    let mut builder = ProgramBuilder::new()
        .vgrfs(&[4; DATAFLOW_REGISTERS as usize])
        .block("entry");
    for nr in 0..DATAFLOW_REGISTERS {
        builder = builder.instr(Instruction::new(
            Opcode::Mov,
            32,
            Operand::vgrf(nr, f),
            [vector_float(rng)],
        ));
    }

    let mut open: Vec<Opcode> = Vec::new();
    let mut writes = 0u32;
    let surface_write = |data: Operand, address: u32| {
        Instruction::new(
            Opcode::UntypedSurfaceWrite,
            16,
            Operand::None,
            [Operand::imm_ud(address), data, Operand::imm_ud(0), Operand::imm_ud(1)],
        )
    };

    for _ in 0..count {
        match rng.below(12) {
            0 if open.len() < 2 => {
                let opener = rng.pick(&[Opcode::If, Opcode::Do]);
                builder = builder.instr(Instruction::marker(opener, 32));
                open.push(opener);
            }
            1 if !open.is_empty() => {
                if let Some(opener) = open.pop() {
                    let closer = if opener == Opcode::If {
                        Opcode::EndIf
                    } else {
                        Opcode::While
                    };
                    builder = builder.instr(Instruction::marker(closer, 32));
                }
            }
            2..=6 => {
                let opcode = rng.pick(&[Opcode::Add, Opcode::Mul, Opcode::Mad]);
                let dst = rng.below(DATAFLOW_REGISTERS);
                let mut srcs = vec![Operand::vgrf(rng.below(DATAFLOW_REGISTERS), f)];
                srcs.push(if rng.chance(1, 2) {
                    Operand::vgrf(rng.below(DATAFLOW_REGISTERS), f)
                } else {
                    Operand::imm_f(rng.small_f64() as f32)
                });
                if opcode == Opcode::Mad {
                    srcs.push(Operand::vgrf(rng.below(DATAFLOW_REGISTERS), f));
                }
                builder = builder.instr(Instruction::new(opcode, 32, Operand::vgrf(dst, f), srcs));
            }
            7 | 8 => {
                let dst = rng.below(DATAFLOW_REGISTERS);
                let src = rng.below(DATAFLOW_REGISTERS);
                builder = builder.instr(Instruction::new(
                    Opcode::Add,
                    16,
                    half(rng, dst),
                    [half(rng, src), vector_float(rng)],
                ));
            }
            _ => {
                let src = rng.below(DATAFLOW_REGISTERS);
                builder = builder.instr(surface_write(half(rng, src), writes));
                writes += 1;
            }
        }
    }

    while let Some(opener) = open.pop() {
        let closer = if opener == Opcode::If {
            Opcode::EndIf
        } else {
            Opcode::While
        };
        builder = builder.instr(Instruction::marker(closer, 32));
    }
    for nr in 0..DATAFLOW_REGISTERS {
        for h in 0..2 {
            let data = Operand::Vgrf(RegRef::new(nr, f).with_offset(h * 2 * UNIT_BYTES));
            builder = builder.instr(surface_write(data, writes));
            writes += 1;
        }
    }
    builder.build()
}
