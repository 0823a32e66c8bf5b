// Loading
mod image;
pub use image::Image;

// Running
mod runtime;
pub use runtime::{
    Fault, Instruction, JsrTarget, Memory, Opcode, Operand, Register, Registers, RunFlag,
    RunState, TrapVect, END_OF_INPUT, IN_PROMPT, KBDR, KBSR, MEMORY_MAX, PC_START,
};
pub mod input;
mod term;
pub use term::{CrlfWriter, RawMode};

mod output;
pub use output::Output;

mod error;

pub mod env;
