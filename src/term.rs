use std::io::{self, Write};

use crossterm::{
    event::{self, Event, KeyEvent},
    terminal,
};

/// Exit status used when the user interrupts the machine with `Ctrl+C`.
const INTERRUPT_EXIT_CODE: i32 = 130;

/// Similar to [`crossterm::event::KeyCode`] but only contains keys a program can receive.
#[derive(Debug, PartialEq, Eq)]
pub enum Key {
    Enter,
    Backspace,
    Tab,
    Esc,
    Char(char),
}

impl Key {
    pub fn into_char(self) -> char {
        match self {
            Key::Enter => '\n',
            Key::Backspace => '\x08',
            Key::Tab => '\t',
            Key::Esc => '\x1b',
            Key::Char(ch) => ch,
        }
    }
}

/// Keeps the terminal in raw mode (no echo, no line buffering) until dropped.
///
/// Output processing is disabled too, so anything printed meanwhile must end lines with `\r\n`.
/// See [`CrlfWriter`].
#[derive(Debug)]
pub struct RawMode {
    _private: (),
}

impl RawMode {
    /// Must only be called if terminal is NOT in raw mode.
    pub fn enable() -> io::Result<Self> {
        debug_assert!(
            !is_raw_mode(),
            "terminal should not be in raw mode to enable raw mode",
        );
        terminal::enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

pub fn is_raw_mode() -> bool {
    terminal::is_raw_mode_enabled().is_ok_and(|is| is)
}

/// Read next key from interactive terminal, blocking.
///
/// Events are consumed until a key event is read as a valid [`Key`].
///
/// Caller must ensure terminal is in raw mode.
///
/// `Ctrl+C` will always return the terminal to normal state and exit.
pub fn read_key() -> io::Result<Key> {
    loop {
        let event = event::read()?;
        if let Ok(key) = event.try_into() {
            return Ok(key);
        }
    }
}

/// Writer which ends lines with `\r\n`, for output to a terminal in raw mode.
#[derive(Debug)]
pub struct CrlfWriter<W> {
    inner: W,
}

impl<W: Write> CrlfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for line in buf.split_inclusive(|byte| *byte == b'\n') {
            match line.strip_suffix(b"\n") {
                Some(line) => {
                    self.inner.write_all(line)?;
                    self.inner.write_all(b"\r\n")?;
                }
                None => self.inner.write_all(line)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl TryFrom<Event> for Key {
    type Error = ();
    fn try_from(event: Event) -> Result<Self, Self::Error> {
        if let Event::Key(event) = event {
            if let Ok(key) = event.try_into() {
                return Ok(key);
            }
        }
        Err(())
    }
}

impl TryFrom<KeyEvent> for Key {
    type Error = ();
    fn try_from(event: KeyEvent) -> Result<Self, Self::Error> {
        use event::{KeyCode, KeyEventKind, KeyModifiers as Mod};

        if matches!(event.kind, KeyEventKind::Release) {
            return Err(());
        }

        let key = match (event.modifiers, event.code) {
            // Ctrl+C
            (Mod::CONTROL, KeyCode::Char('c')) => {
                // Generic cleanup; `RawMode` guard is not dropped on exit
                let _ = io::stdout().flush();
                let _ = terminal::disable_raw_mode();
                println!();
                std::process::exit(INTERRUPT_EXIT_CODE);
            }

            (_, KeyCode::Enter) | (_, KeyCode::Char('\n')) => Key::Enter,
            (_, KeyCode::Backspace) => Key::Backspace,
            (_, KeyCode::Tab) => Key::Tab,
            (_, KeyCode::Esc) => Key::Esc,

            // Normal character
            (Mod::NONE | Mod::SHIFT, KeyCode::Char(ch)) => Key::Char(ch),

            _ => return Err(()),
        };

        Ok(key)
    }
}
