use std::io::{self, Write};

use colored::Colorize;

use super::registers::Register;
use super::RunState;
use crate::output::Output;

/// Prompt printed by the `IN` trap.
pub const IN_PROMPT: &str = "Enter a character: ";

/// Value stored in `R0` when a read trap hits the end of input.
pub const END_OF_INPUT: u16 = 0xFFFF;

/// Service routines reachable through `TRAP`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TrapVect {
    Getc = 0x20,
    Out = 0x21,
    Puts = 0x22,
    In = 0x23,
    Putsp = 0x24,
    Halt = 0x25,
}

impl TryFrom<u8> for TrapVect {
    type Error = ();
    fn try_from(vect: u8) -> Result<Self, Self::Error> {
        Ok(match vect {
            0x20 => Self::Getc,
            0x21 => Self::Out,
            0x22 => Self::Puts,
            0x23 => Self::In,
            0x24 => Self::Putsp,
            0x25 => Self::Halt,
            _ => return Err(()),
        })
    }
}

impl RunState {
    /// Unknown vectors are ignored.
    pub(super) fn trap(&mut self, vect: u8) -> io::Result<()> {
        let Ok(vect) = TrapVect::try_from(vect) else {
            return Ok(());
        };
        match vect {
            TrapVect::Getc => {
                let ch = self.read_input();
                self.reg.set(Register::R0, ch);
            }
            TrapVect::Out => {
                let chr = (self.reg.get(Register::R0) & 0xFF) as u8;
                self.out.write_all(&[chr])?;
            }
            TrapVect::Puts => {
                let chars: Vec<u8> = self
                    .string_at(self.reg.get(Register::R0))
                    .map(|chr_raw| (chr_raw & 0xFF) as u8)
                    .collect();
                self.out.write_all(&chars)?;
            }
            TrapVect::In => {
                self.out.write_all(IN_PROMPT.as_bytes())?;
                self.out.flush()?;
                let ch = self.read_input();
                self.reg.set(Register::R0, ch);
                if ch != END_OF_INPUT {
                    self.out.write_all(&[ch as u8])?;
                }
            }
            TrapVect::Putsp => {
                let chars: Vec<u8> = self
                    .string_at(self.reg.get(Register::R0))
                    .flat_map(|chr_raw| {
                        let high = (chr_raw >> 8) as u8;
                        [Some((chr_raw & 0xFF) as u8), (high != 0).then_some(high)]
                    })
                    .flatten()
                    .collect();
                self.out.write_all(&chars)?;
            }
            TrapVect::Halt => {
                if Output::is_minimal() {
                    writeln!(self.out, "\n{:>12}", "Halted")?;
                } else {
                    writeln!(self.out, "\n{:>12}", "Halted".cyan())?;
                }
                self.running = false;
            }
        }
        self.out.flush()
    }

    /// Cells from `start` up to (not including) the first zero cell, wrapping around memory.
    fn string_at(&self, start: u16) -> impl Iterator<Item = u16> + '_ {
        (0..=u16::MAX)
            .map(move |offset| self.mem.peek(start.wrapping_add(offset)))
            .take_while(|chr_raw| *chr_raw != 0)
    }

    // Read one byte from the keyboard, blocking
    fn read_input(&mut self) -> u16 {
        match self.mem.keyboard().read_char() {
            Some(ch) => ch as u16,
            None => END_OF_INPUT,
        }
    }
}
