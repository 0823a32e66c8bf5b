use std::cmp::Ordering;
use std::fmt;

/// One of the eight general purpose registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    /// Holds the return address after `JSR`/`JSRR`.
    R7,
}

impl Register {
    pub const ALL: [Register; 8] = [
        Register::R0,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
    ];

    /// Register encoded by the 3-bit field of `instr` starting at bit `shift`.
    #[inline]
    pub fn from_field(instr: u16, shift: u32) -> Self {
        Self::ALL[((instr >> shift) & 0b111) as usize]
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", *self as u8)
    }
}

/// Condition code.
///
/// Discriminants match the `nzp` mask layout of `BR`, so a branch is taken when
/// `mask & flag as u16 != 0`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunFlag {
    N = 0b100,
    Z = 0b010,
    P = 0b001,
    /// No flag-affecting instruction has executed yet.
    Uninit = 0b000,
}

impl RunFlag {
    /// Classify a produced value by its sign.
    pub fn of(val: u16) -> Self {
        match (val as i16).cmp(&0) {
            Ordering::Less => RunFlag::N,
            Ordering::Equal => RunFlag::Z,
            Ordering::Greater => RunFlag::P,
        }
    }
}

/// General purpose registers, program counter and condition code.
#[derive(Clone, Debug)]
pub struct Registers {
    reg: [u16; 8],
    pc: u16,
    flag: RunFlag,
}

impl Registers {
    pub fn new(pc: u16) -> Self {
        Self {
            reg: [0; 8],
            pc,
            flag: RunFlag::Uninit,
        }
    }

    #[inline]
    pub fn get(&self, reg: Register) -> u16 {
        self.reg[reg as usize]
    }

    #[inline]
    pub fn set(&mut self, reg: Register, val: u16) {
        self.reg[reg as usize] = val;
    }

    /// Recompute the condition code from the value currently stored in `reg`.
    ///
    /// Must be called after the destination register has been written.
    #[inline]
    pub fn update_flags(&mut self, reg: Register) {
        self.flag = RunFlag::of(self.get(reg));
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    /// Returns the current PC and moves it to the next word.
    #[inline]
    pub fn advance_pc(&mut self) -> u16 {
        let addr = self.pc;
        self.pc = self.pc.wrapping_add(1);
        addr
    }

    pub fn flag(&self) -> RunFlag {
        self.flag
    }
}
