mod instr;
mod memory;
mod registers;
mod trap;

use std::fmt;
use std::io::{self, Write};

use miette::Diagnostic;

pub use self::instr::{Instruction, JsrTarget, Opcode, Operand};
pub use self::memory::{Memory, KBDR, KBSR, MEMORY_MAX};
pub use self::registers::{Register, Registers, RunFlag};
pub use self::trap::{TrapVect, END_OF_INPUT, IN_PROMPT};
use crate::input::Input;
use crate::output::tprintln;
use crate::Image;

/// Conventional address user programs start at.
pub const PC_START: u16 = 0x3000;

/// Represents complete program state during runtime.
pub struct RunState {
    /// System memory - 128KB in size.
    mem: Memory,
    /// Registers, program counter and condition code
    reg: Registers,
    /// Cleared by `HALT`
    running: bool,
    /// Where traps write characters to
    out: Box<dyn Write>,
    /// Print every executed instruction
    trace: bool,
}

/// Unrecoverable condition, after which execution cannot continue.
#[derive(Debug)]
pub enum Fault {
    /// Fetched `RTI` or the reserved opcode, which have no defined behavior.
    Undefined { opcode: Opcode, addr: u16 },
    /// Program output could not be written.
    Io(io::Error),
}

impl RunState {
    pub fn new(keyboard: Box<dyn Input>, out: Box<dyn Write>) -> Self {
        Self {
            mem: Memory::new(keyboard),
            reg: Registers::new(PC_START),
            running: true,
            out,
            trace: false,
        }
    }

    /// Copy image into memory at its origin. Returns amount of words which fit.
    pub fn load(&mut self, image: &Image) -> usize {
        self.mem.load(image.orig(), image.words())
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pc(&self) -> u16 {
        self.reg.pc()
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.reg.set_pc(pc);
    }

    pub fn reg(&self, reg: Register) -> u16 {
        self.reg.get(reg)
    }

    pub fn flag(&self) -> RunFlag {
        self.reg.flag()
    }

    /// Inspect memory, without triggering any device.
    pub fn mem(&self, addr: u16) -> u16 {
        self.mem.peek(addr)
    }

    /// Run until `HALT`, or until a fault.
    pub fn run(&mut self) -> Result<(), Fault> {
        while self.running {
            self.step()?;
        }
        Ok(())
    }

    /// Fetch, decode and execute a single instruction.
    pub fn step(&mut self) -> Result<(), Fault> {
        // PC incremented before instruction is performed
        let addr = self.reg.advance_pc();
        let word = self.mem.read(addr);
        let instr = Instruction::from(word);
        if self.trace {
            tprintln!("0x{:04x}  0x{:04x}  {:?}", addr, word, instr);
        }
        self.execute(instr, addr)
    }

    fn execute(&mut self, instr: Instruction, addr: u16) -> Result<(), Fault> {
        match instr {
            Instruction::Br { nzp, offset } => self.br(nzp, offset),
            Instruction::Add { dr, sr1, op2 } => self.add(dr, sr1, op2),
            Instruction::Ld { dr, offset } => self.ld(dr, offset),
            Instruction::St { sr, offset } => self.st(sr, offset),
            Instruction::Jsr { target } => self.jsr(target),
            Instruction::And { dr, sr1, op2 } => self.and(dr, sr1, op2),
            Instruction::Ldr { dr, base, offset } => self.ldr(dr, base, offset),
            Instruction::Str { sr, base, offset } => self.str(sr, base, offset),
            Instruction::Not { dr, sr } => self.not(dr, sr),
            Instruction::Ldi { dr, offset } => self.ldi(dr, offset),
            Instruction::Sti { sr, offset } => self.sti(sr, offset),
            Instruction::Jmp { base } => self.jmp(base),
            Instruction::Lea { dr, offset } => self.lea(dr, offset),
            Instruction::Trap { vect } => self.trap(vect)?,
            Instruction::Rti | Instruction::Res => {
                return Err(Fault::Undefined {
                    opcode: instr.opcode(),
                    addr,
                });
            }
        }
        Ok(())
    }

    #[inline]
    fn set_result(&mut self, dr: Register, val: u16) {
        self.reg.set(dr, val);
        self.reg.update_flags(dr);
    }

    #[inline]
    fn pc_relative(&self, offset: u16) -> u16 {
        self.reg.pc().wrapping_add(offset)
    }

    fn operand(&self, op2: Operand) -> u16 {
        match op2 {
            Operand::Register(sr2) => self.reg.get(sr2),
            Operand::Immediate(imm) => imm,
        }
    }

    fn br(&mut self, nzp: u16, offset: u16) {
        if self.reg.flag() as u16 & nzp != 0 {
            self.reg.set_pc(self.pc_relative(offset));
        }
    }

    fn add(&mut self, dr: Register, sr1: Register, op2: Operand) {
        let res = self.reg.get(sr1).wrapping_add(self.operand(op2));
        self.set_result(dr, res);
    }

    fn and(&mut self, dr: Register, sr1: Register, op2: Operand) {
        let res = self.reg.get(sr1) & self.operand(op2);
        self.set_result(dr, res);
    }

    fn not(&mut self, dr: Register, sr: Register) {
        let res = !self.reg.get(sr);
        self.set_result(dr, res);
    }

    fn jmp(&mut self, base: Register) {
        self.reg.set_pc(self.reg.get(base));
    }

    fn jsr(&mut self, target: JsrTarget) {
        self.reg.set(Register::R7, self.reg.pc());
        let pc = match target {
            JsrTarget::Offset(offset) => self.pc_relative(offset),
            JsrTarget::Register(base) => self.reg.get(base),
        };
        self.reg.set_pc(pc);
    }

    fn ld(&mut self, dr: Register, offset: u16) {
        let val = self.mem.read(self.pc_relative(offset));
        self.set_result(dr, val);
    }

    fn ldi(&mut self, dr: Register, offset: u16) {
        let ptr = self.mem.read(self.pc_relative(offset));
        let val = self.mem.read(ptr);
        self.set_result(dr, val);
    }

    fn ldr(&mut self, dr: Register, base: Register, offset: u16) {
        let ptr = self.reg.get(base).wrapping_add(offset);
        let val = self.mem.read(ptr);
        self.set_result(dr, val);
    }

    fn lea(&mut self, dr: Register, offset: u16) {
        let val = self.pc_relative(offset);
        self.set_result(dr, val);
    }

    fn st(&mut self, sr: Register, offset: u16) {
        self.mem.write(self.pc_relative(offset), self.reg.get(sr));
    }

    fn sti(&mut self, sr: Register, offset: u16) {
        let ptr = self.mem.read(self.pc_relative(offset));
        self.mem.write(ptr, self.reg.get(sr));
    }

    fn str(&mut self, sr: Register, base: Register, offset: u16) {
        let ptr = self.reg.get(base).wrapping_add(offset);
        self.mem.write(ptr, self.reg.get(sr));
    }
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("mem", &self.mem)
            .field("reg", &self.reg)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl From<io::Error> for Fault {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined { opcode, addr } => write!(
                f,
                "Fetched undefined opcode {:?} (0x{:x}) at address 0x{:04x}",
                opcode, *opcode as u8, addr
            ),
            Self::Io(err) => write!(f, "Failed to write program output: {err}"),
        }
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Undefined { .. } => None,
            Self::Io(err) => Some(err),
        }
    }
}

impl Diagnostic for Fault {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self {
            Self::Undefined { .. } => "runtime::undefined_opcode",
            Self::Io(_) => "runtime::io",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match self {
            Self::Undefined { .. } => {
                "RTI and the reserved opcode cannot be executed; \
                 check that control flow does not run into data"
            }
            Self::Io(_) => return None,
        };
        Some(Box::new(help))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use proptest::prelude::*;

    use super::*;
    use crate::input::Scripted;
    use Register::*;

    /// Output sink which can be read back after being handed to a machine.
    #[derive(Clone, Default)]
    pub(crate) struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Capture {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Machine with `program` loaded at [`PC_START`].
    pub(crate) fn machine(program: &[u16], input: Scripted) -> (RunState, Capture) {
        let out = Capture::default();
        let mut state = RunState::new(Box::new(input), Box::new(out.clone()));
        state.load(&Image::new(PC_START, program.to_vec()));
        (state, out)
    }

    fn steps(state: &mut RunState, count: usize) {
        for _ in 0..count {
            state.step().unwrap();
        }
    }

    #[test]
    fn runs_add_program_to_halt() {
        // AND R0, R0, #0 ; ADD R0, R0, #5 ; HALT
        let (mut state, out) = machine(&[0x5020, 0x1025, 0xf025], Scripted::default());
        state.run().unwrap();
        assert_eq!(state.reg(R0), 5);
        assert_eq!(state.flag(), RunFlag::P);
        assert!(!state.is_running());
        assert_eq!(state.pc(), 0x3003);
        assert!(out.contents().contains("Halted"));
    }

    #[test]
    fn runs_hello_program() {
        // LEA R0, #2 ; PUTS ; HALT ; "Hi!"
        let mut program = vec![0xe002, 0xf022, 0xf025];
        program.extend("Hi!".bytes().map(u16::from));
        program.push(0);
        let (mut state, out) = machine(&program, Scripted::default());
        state.run().unwrap();
        assert!(out.contents().starts_with("Hi!\n"));
    }

    #[test]
    fn add_wraps_without_overflow() {
        // LD R1, #2 ; ADD R2, R1, #1 ; HALT ; .FILL x7fff
        let (mut state, _) = machine(&[0x2202, 0x1461, 0xf025, 0x7fff], Scripted::default());
        steps(&mut state, 2);
        assert_eq!(state.reg(R2), 0x8000);
        assert_eq!(state.flag(), RunFlag::N);

        // ADD R3, R2, R2
        let (mut state, _) = machine(&[0x2202, 0x1461, 0x1682, 0x7fff], Scripted::default());
        steps(&mut state, 3);
        assert_eq!(state.reg(R3), 0x0000);
        assert_eq!(state.flag(), RunFlag::Z);
    }

    #[test]
    fn and_with_register_and_not() {
        // LD R1, #3 ; AND R2, R1, R1 ; NOT R3, R2 ; HALT ; .FILL x00f0
        let program = [0x2203, 0x5441, 0x96bf, 0xf025, 0x00f0];
        let (mut state, _) = machine(&program, Scripted::default());
        steps(&mut state, 2);
        assert_eq!(state.reg(R2), 0x00f0);
        assert_eq!(state.flag(), RunFlag::P);
        steps(&mut state, 1);
        assert_eq!(state.reg(R3), 0xff0f);
        assert_eq!(state.flag(), RunFlag::N);
    }

    #[test]
    fn branch_follows_condition_code() {
        // AND R0, R0, #0 ; BRz #1 ; HALT ; BRp #-2 ; BRnz #-4
        let program = [0x5020, 0x0401, 0xf025, 0x03fe, 0x0dfc];
        let (mut state, _) = machine(&program, Scripted::default());
        steps(&mut state, 2);
        assert_eq!(state.pc(), 0x3003);
        // Not taken
        steps(&mut state, 1);
        assert_eq!(state.pc(), 0x3004);
        // Taken backwards
        steps(&mut state, 1);
        assert_eq!(state.pc(), 0x3001);
    }

    #[test]
    fn branch_never_taken_before_first_flag() {
        // BRnzp #5
        let (mut state, _) = machine(&[0x0e05], Scripted::default());
        steps(&mut state, 1);
        assert_eq!(state.pc(), 0x3001);
    }

    #[test]
    fn jsr_and_ret_round_trip() {
        // JSR #1 ; HALT ; RET
        let (mut state, _) = machine(&[0x4801, 0xf025, 0xc1c0], Scripted::default());
        steps(&mut state, 1);
        assert_eq!(state.pc(), 0x3002);
        assert_eq!(state.reg(R7), 0x3001);
        steps(&mut state, 1);
        assert_eq!(state.pc(), 0x3001);
        state.run().unwrap();
        assert!(!state.is_running());
    }

    #[test]
    fn jsrr_jumps_to_register() {
        // LEA R2, #2 ; JSRR R2 ; HALT ; RET
        let (mut state, _) = machine(&[0xe402, 0x4080, 0xf025, 0xc1c0], Scripted::default());
        steps(&mut state, 2);
        assert_eq!(state.pc(), 0x3003);
        assert_eq!(state.reg(R7), 0x3002);
        steps(&mut state, 1);
        assert_eq!(state.pc(), 0x3002);
    }

    #[test]
    fn jsrr_through_r7_continues_after_call() {
        // JSRR R7
        let (mut state, _) = machine(&[0x41c0], Scripted::default());
        steps(&mut state, 1);
        assert_eq!(state.reg(R7), 0x3001);
        assert_eq!(state.pc(), 0x3001);
    }

    #[test]
    fn stores_do_not_touch_flags() {
        // ST R0, #4 ; LEA R1, #4 ; STR R1, R1, #-1 ; JMP R1
        let program = [0x3004, 0xe204, 0x727f, 0xc040];
        let (mut state, _) = machine(&program, Scripted::default());
        steps(&mut state, 1);
        assert_eq!(state.flag(), RunFlag::Uninit);

        steps(&mut state, 1);
        assert_eq!(state.reg(R1), 0x3006);
        assert_eq!(state.flag(), RunFlag::P);

        steps(&mut state, 2);
        assert_eq!(state.mem(0x3005), 0x3006);
        assert_eq!(state.pc(), 0x3006);
        assert_eq!(state.flag(), RunFlag::P);
    }

    #[test]
    fn ldr_with_negative_offset() {
        // LEA R1, #3 ; LDR R0, R1, #-1 ; HALT ; .FILL x8001
        let (mut state, _) = machine(&[0xe203, 0x607f, 0xf025, 0x8001], Scripted::default());
        steps(&mut state, 2);
        assert_eq!(state.reg(R0), 0x8001);
        assert_eq!(state.flag(), RunFlag::N);
    }

    #[test]
    fn ldi_reads_through_pointer() {
        // LDI R0, #1 ; HALT ; .FILL x4000
        let (mut state, _) = machine(&[0xa001, 0xf025, 0x4000], Scripted::default());
        state.mem.write(0x4000, 0);
        steps(&mut state, 1);
        assert_eq!(state.reg(R0), 0);
        assert_eq!(state.flag(), RunFlag::Z);
    }

    #[test]
    fn ldi_through_keyboard_status_polls_once() {
        // LDI R0, #1 ; HALT ; .FILL KBSR
        let input = Scripted::new("ab");
        let (mut state, _) = machine(&[0xa001, 0xf025, KBSR], input.clone());
        steps(&mut state, 1);
        assert_eq!(state.reg(R0), 0x8000);
        assert_eq!(state.flag(), RunFlag::N);
        // Only the second access reaches the device
        assert_eq!(input.len(), 1);
        assert_eq!(state.mem(KBDR), b'a' as u16);
    }

    #[test]
    fn sti_writes_only_target() {
        // LD R1, #2 ; STI R1, #2 ; HALT ; .FILL x1234 ; .FILL x4000
        let program = [0x2202, 0xb202, 0xf025, 0x1234, 0x4000];
        let (mut state, _) = machine(&program, Scripted::default());
        steps(&mut state, 1);
        let before: Vec<u16> = (0..=u16::MAX).map(|addr| state.mem(addr)).collect();
        steps(&mut state, 1);
        for addr in 0..=u16::MAX {
            let expected = if addr == 0x4000 {
                0x1234
            } else {
                before[addr as usize]
            };
            assert_eq!(state.mem(addr), expected, "address 0x{addr:04x}");
        }
    }

    #[test]
    fn keyboard_polled_through_ldi() {
        // LDI R0, #1 ; LDI R1, #1 ; .FILL KBSR ; .FILL KBDR
        let input = Scripted::default();
        let program = [0xa001, 0xa201, KBSR, KBDR];
        let (mut state, _) = machine(&program, input.clone());
        steps(&mut state, 1);
        assert_eq!(state.reg(R0), 0);
        assert_eq!(state.flag(), RunFlag::Z);

        input.push("y");
        state.set_pc(PC_START);
        steps(&mut state, 2);
        assert_eq!(state.reg(R0), 0x8000);
        assert_eq!(state.reg(R1), b'y' as u16);
    }

    #[test]
    fn undefined_opcodes_fault() {
        for word in [0x8000, 0xdfff] {
            let (mut state, _) = machine(&[word], Scripted::default());
            let err = state.run().unwrap_err();
            let Fault::Undefined { opcode, addr } = &err else {
                panic!("expected undefined opcode fault, got {err:?}");
            };
            assert_eq!(*opcode as u16, word >> 12);
            assert_eq!(*addr, PC_START);
            assert_eq!(state.pc(), PC_START + 1);
            assert_eq!(state.flag(), RunFlag::Uninit);
            for reg in Register::ALL {
                assert_eq!(state.reg(reg), 0);
            }
        }
    }

    #[test]
    fn fault_renders_as_diagnostic() {
        let fault = Fault::Undefined {
            opcode: Opcode::Res,
            addr: 0x3010,
        };
        assert_eq!(
            fault.to_string(),
            "Fetched undefined opcode Res (0xd) at address 0x3010"
        );
        assert_eq!(
            fault.code().map(|code| code.to_string()).as_deref(),
            Some("runtime::undefined_opcode")
        );
    }

    proptest! {
        #[test]
        fn flag_matches_loaded_value(val: u16, dr in 0..8u16) {
            // LD DR, #1 ; HALT ; .FILL val
            let ld = 0x2001 | dr << 9;
            let (mut state, _) = machine(&[ld, 0xf025, val], Scripted::default());
            state.step().unwrap();
            let flag = state.flag();
            prop_assert_eq!((flag as u8).count_ones(), 1);
            prop_assert_eq!(flag == RunFlag::Z, val == 0);
            prop_assert_eq!(flag == RunFlag::N, val & 0x8000 != 0);
        }

        #[test]
        fn add_immediate_matches_signed_arithmetic(val: u16, imm in -16i16..16) {
            // LD R1, #2 ; ADD R0, R1, #imm ; HALT ; .FILL val
            let add = 0x1060 | (imm as u16 & 0x1f);
            let (mut state, _) = machine(&[0x2202, add, 0xf025, val], Scripted::default());
            state.step().unwrap();
            state.step().unwrap();
            prop_assert_eq!(state.reg(R0), val.wrapping_add(imm as u16));
            prop_assert_eq!(state.flag(), RunFlag::of(state.reg(R0)));
        }
    }
}
