use std::borrow::Cow;
use std::cell::RefCell;
use std::str::Chars;

use colored::{ColoredString, Colorize};

use crate::runtime::{Register, RunState};
use crate::term;

/// Print a line of instruction trace to stderr.
macro_rules! tprintln {
    ( $fmt:literal $($tt:tt)* ) => {{
        let s = format!(
            concat!($fmt, "\n")
            $($tt)*
        );
        $crate::output::Output::Trace.print_str(&s);
    }};
}
pub(crate) use tprintln;

#[derive(Clone, Copy, Debug)]
pub enum Output {
    /// Machine state shown to the user, on stdout.
    Normal,
    /// Instruction trace, on stderr.
    Trace,
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl Output {
    thread_local! {
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    pub fn print_str(&self, string: &str) {
        match self {
            Self::Normal => {
                if Self::is_minimal() {
                    print_colorless(string);
                } else {
                    print!("{}", string);
                }
            }
            Self::Trace => {
                // Line ends are not translated by a terminal in raw mode
                let string = if term::is_raw_mode() {
                    Cow::Owned(string.replace('\n', "\r\n"))
                } else {
                    Cow::Borrowed(string)
                };
                // Always remove color if `--minimal`
                if Self::is_minimal() {
                    eprint_colorless(&string);
                } else {
                    eprint!("{}", ColoredString::from(&*string).blue());
                }
            }
        }
    }

    pub fn print_registers(&self, state: &RunState) {
        if Self::is_minimal() {
            for reg in Register::ALL {
                self.print_str(&format!("{} {}\n", reg, state.reg(reg)));
            }
            self.print_str(&format!("PC {}\n", state.pc()));
            self.print_str(&format!("CC {:03b}\n", state.flag() as u8));
            return;
        }

        self.print_str("\x1b[2m┌────────────────────────────────────┐\x1b[0m\n");
        self.print_str(
            "\x1b[2m│        \x1b[3mhex     int    uint    char\x1b[0m\x1b[2m │\x1b[0m\n",
        );
        for reg in Register::ALL {
            self.print_str("\x1b[2m│\x1b[0m");
            self.print_str(&format!(" \x1b[1m{}\x1b[0m  ", reg));
            self.print_integer(state.reg(reg));
            self.print_str(" \x1b[2m│\x1b[0m\n");
        }
        self.print_str("\x1b[2m│\x1b[0m");
        self.print_str(&format!(" \x1b[1mPC\x1b[0m  0x{:04x}", state.pc()));
        self.print_str("                ");
        self.print_str(&format!(" \x1b[1mCC\x1b[0m  {:03b}", state.flag() as u8));
        self.print_str(" \x1b[2m│\x1b[0m\n");
        self.print_str("\x1b[2m└────────────────────────────────────┘\x1b[0m\n");
    }

    fn print_integer(&self, value: u16) {
        self.print_str(&format!("0x{:04x}  ", value));
        self.print_str(&format!("{:-6}  ", value as i16));
        self.print_str(&format!("{:-6}  ", value));
        self.print_char_display(value);
    }

    fn print_char_display(&self, value: u16) {
        self.print_str("   ");
        // Print 3 characters
        match value {
            // ASCII control characters which are arbitrarily considered significant
            0x00 => self.print_str("NUL"),
            0x08 => self.print_str("BS "),
            0x09 => self.print_str("HT "),
            0x0a => self.print_str("LF "),
            0x0d => self.print_str("CR "),
            0x1b => self.print_str("ESC"),
            0x7f => self.print_str("DEL"),

            // Space
            0x20 => self.print_str("[_]"),

            // Printable ASCII characters
            0x21..=0x7e => self.print_str(&format!("{:<3}", value as u8 as char)),

            // Any ASCII character not already matched (unimportant control characters)
            0x00..=0x7f => self.print_str("\x1b[2m───\x1b[0m"),
            // Any non-ASCII character
            0x0080.. => self.print_str("\x1b[2m┄┄┄\x1b[0m"),
        }
    }
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl<'a> Iterator for Decolored<'a> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}

fn print_colorless(string: &str) {
    print!("{}", Decolored::new(string).collect::<String>());
}

fn eprint_colorless(string: &str) {
    eprint!("{}", Decolored::new(string).collect::<String>());
}
