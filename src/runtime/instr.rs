use super::registers::Register;

/// Operation selected by the top 4 bits of an instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    Br = 0x0,
    Add = 0x1,
    Ld = 0x2,
    St = 0x3,
    Jsr = 0x4,
    And = 0x5,
    Ldr = 0x6,
    Str = 0x7,
    Rti = 0x8,
    Not = 0x9,
    Ldi = 0xA,
    Sti = 0xB,
    Jmp = 0xC,
    Res = 0xD,
    Lea = 0xE,
    Trap = 0xF,
}

impl Opcode {
    const TABLE: [Opcode; 16] = [
        Opcode::Br,
        Opcode::Add,
        Opcode::Ld,
        Opcode::St,
        Opcode::Jsr,
        Opcode::And,
        Opcode::Ldr,
        Opcode::Str,
        Opcode::Rti,
        Opcode::Not,
        Opcode::Ldi,
        Opcode::Sti,
        Opcode::Jmp,
        Opcode::Res,
        Opcode::Lea,
        Opcode::Trap,
    ];

    #[inline]
    pub fn of(instr: u16) -> Self {
        // Shifted value is always < 16
        Self::TABLE[(instr >> 12) as usize]
    }
}

/// Second operand of `ADD` and `AND`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operand {
    Register(Register),
    /// Already sign-extended.
    Immediate(u16),
}

/// Destination of `JSR` (offset) or `JSRR` (register).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JsrTarget {
    /// Already sign-extended.
    Offset(u16),
    Register(Register),
}

/// A decoded instruction word.
///
/// All offsets and immediates are sign-extended to 16 bits during decoding.
#[rustfmt::skip]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Instruction {
    Br { nzp: u16, offset: u16 },
    Add { dr: Register, sr1: Register, op2: Operand },
    Ld { dr: Register, offset: u16 },
    St { sr: Register, offset: u16 },
    Jsr { target: JsrTarget },
    And { dr: Register, sr1: Register, op2: Operand },
    Ldr { dr: Register, base: Register, offset: u16 },
    Str { sr: Register, base: Register, offset: u16 },
    Rti,
    Not { dr: Register, sr: Register },
    Ldi { dr: Register, offset: u16 },
    Sti { sr: Register, offset: u16 },
    Jmp { base: Register },
    Res,
    Lea { dr: Register, offset: u16 },
    Trap { vect: u8 },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Br { .. } => Opcode::Br,
            Self::Add { .. } => Opcode::Add,
            Self::Ld { .. } => Opcode::Ld,
            Self::St { .. } => Opcode::St,
            Self::Jsr { .. } => Opcode::Jsr,
            Self::And { .. } => Opcode::And,
            Self::Ldr { .. } => Opcode::Ldr,
            Self::Str { .. } => Opcode::Str,
            Self::Rti => Opcode::Rti,
            Self::Not { .. } => Opcode::Not,
            Self::Ldi { .. } => Opcode::Ldi,
            Self::Sti { .. } => Opcode::Sti,
            Self::Jmp { .. } => Opcode::Jmp,
            Self::Res => Opcode::Res,
            Self::Lea { .. } => Opcode::Lea,
            Self::Trap { .. } => Opcode::Trap,
        }
    }
}

impl From<u16> for Instruction {
    fn from(instr: u16) -> Self {
        let reg = |shift| Register::from_field(instr, shift);
        let pc_offset9 = || s_ext(instr, 9);
        let operand = || {
            // Check if imm
            if instr & 0b100000 == 0 {
                Operand::Register(reg(0))
            } else {
                Operand::Immediate(s_ext(instr, 5))
            }
        };

        match Opcode::of(instr) {
            Opcode::Br => Self::Br {
                nzp: (instr >> 9) & 0b111,
                offset: pc_offset9(),
            },
            Opcode::Add => Self::Add {
                dr: reg(9),
                sr1: reg(6),
                op2: operand(),
            },
            Opcode::Ld => Self::Ld {
                dr: reg(9),
                offset: pc_offset9(),
            },
            Opcode::St => Self::St {
                sr: reg(9),
                offset: pc_offset9(),
            },
            Opcode::Jsr => Self::Jsr {
                target: if instr & 0x800 == 0 {
                    JsrTarget::Register(reg(6))
                } else {
                    JsrTarget::Offset(s_ext(instr, 11))
                },
            },
            Opcode::And => Self::And {
                dr: reg(9),
                sr1: reg(6),
                op2: operand(),
            },
            Opcode::Ldr => Self::Ldr {
                dr: reg(9),
                base: reg(6),
                offset: s_ext(instr, 6),
            },
            Opcode::Str => Self::Str {
                sr: reg(9),
                base: reg(6),
                offset: s_ext(instr, 6),
            },
            Opcode::Rti => Self::Rti,
            Opcode::Not => Self::Not {
                dr: reg(9),
                sr: reg(6),
            },
            Opcode::Ldi => Self::Ldi {
                dr: reg(9),
                offset: pc_offset9(),
            },
            Opcode::Sti => Self::Sti {
                sr: reg(9),
                offset: pc_offset9(),
            },
            Opcode::Jmp => Self::Jmp { base: reg(6) },
            Opcode::Res => Self::Res,
            Opcode::Lea => Self::Lea {
                dr: reg(9),
                offset: pc_offset9(),
            },
            Opcode::Trap => Self::Trap {
                vect: (instr & 0xFF) as u8,
            },
        }
    }
}

/// Sign-extend the lowest `bits` bits of `val` to 16 bits.
///
/// Bits above the field are ignored.
#[inline]
pub fn s_ext(val: u16, bits: u32) -> u16 {
    debug_assert!(bits > 0 && bits < 16);
    // Sign bit
    let sign = val & (1u16 << (bits - 1));
    // Bits lower than sign bit
    let magnitude = val & ((1u16 << bits) - 1);
    // Positive input: all bits unset; 0x0000
    // Negative input: sign bit and above will be set, lower bits will be reset
    //      Eg. bits=14 -> 0xE000
    let sign_extension = (!sign).wrapping_add(1); // sign * -1
    magnitude | sign_extension
}
