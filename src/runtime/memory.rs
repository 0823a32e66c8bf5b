use std::fmt;

use crate::input::Input;

/// LC3 can address 128KB of memory.
pub const MEMORY_MAX: usize = 0x10000;

/// Keyboard status register. Bit 15 is set when a character has been read.
pub const KBSR: u16 = 0xFE00;
/// Keyboard data register. Holds the last character read.
pub const KBDR: u16 = 0xFE02;

/// System memory, with the keyboard device mapped into it.
pub struct Memory {
    /// Always exactly `MEMORY_MAX` cells, so any `u16` is a valid index.
    cells: Box<[u16]>,
    keyboard: Box<dyn Input>,
}

impl Memory {
    pub fn new(keyboard: Box<dyn Input>) -> Self {
        Self {
            cells: vec![0; MEMORY_MAX].into_boxed_slice(),
            keyboard,
        }
    }

    /// Read a cell as the running program sees it.
    ///
    /// Reading [`KBSR`] first polls the keyboard, latching any pending character into [`KBDR`].
    pub fn read(&mut self, addr: u16) -> u16 {
        if addr == KBSR {
            self.poll_keyboard();
        }
        self.cells[addr as usize]
    }

    /// Read a cell without any device side effects.
    #[inline]
    pub fn peek(&self, addr: u16) -> u16 {
        self.cells[addr as usize]
    }

    #[inline]
    pub fn write(&mut self, addr: u16, val: u16) {
        self.cells[addr as usize] = val;
    }

    /// Copy `words` into memory starting at `orig`.
    ///
    /// Returns the amount of words written; anything past the end of memory is dropped.
    pub fn load(&mut self, orig: u16, words: &[u16]) -> usize {
        let orig = orig as usize;
        let len = words.len().min(MEMORY_MAX - orig);
        self.cells[orig..orig + len].copy_from_slice(&words[..len]);
        len
    }

    pub fn keyboard(&mut self) -> &mut dyn Input {
        self.keyboard.as_mut()
    }

    fn poll_keyboard(&mut self) {
        let ch = if self.keyboard.poll_available() {
            self.keyboard.read_char()
        } else {
            None
        };
        match ch {
            Some(ch) => {
                self.cells[KBSR as usize] = 1 << 15;
                self.cells[KBDR as usize] = ch as u16;
            }
            None => self.cells[KBSR as usize] = 0,
        }
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.cells.iter().filter(|cell| **cell != 0).count();
        f.debug_struct("Memory")
            .field("nonzero_cells", &used)
            .finish_non_exhaustive()
    }
}
