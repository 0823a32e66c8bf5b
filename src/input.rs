//! Keyboard sources for the machine.
//!
//! The memory-mapped keyboard registers poll an [`Input`] without blocking, while the `GETC` and
//! `IN` traps block on it until a character arrives.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, IsTerminal as _};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use crate::term;

/// Source of keyboard characters.
pub trait Input {
    /// Whether a character can be read without blocking.
    ///
    /// Must never block. A character which made this return `true` is kept for the next
    /// [`Input::read_char`].
    fn poll_available(&mut self) -> bool;

    /// Read the next character, blocking until one is available.
    ///
    /// `None` indicates end of input.
    fn read_char(&mut self) -> Option<u8>;
}

/// Keyboard attached to the process: an interactive terminal if there is one, otherwise piped
/// stdin.
///
/// An interactive terminal must already be held in raw mode, see [`Terminal`].
pub fn stdin() -> Box<dyn Input> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        Box::new(Terminal::spawn())
    } else {
        Box::new(Piped::spawn(stdin))
    }
}

/// Bytes arriving from a reader thread.
#[derive(Debug)]
struct Feed {
    receiver: Receiver<u8>,
    /// Byte received while polling.
    peeked: Option<u8>,
}

impl Feed {
    /// Spawn `reader` with the sending half of the feed.
    fn spawn<F>(reader: F) -> Self
    where
        F: FnOnce(Sender<u8>) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || reader(sender));
        Self {
            receiver,
            peeked: None,
        }
    }

    fn poll_available(&mut self) -> bool {
        if self.peeked.is_some() {
            return true;
        }
        match self.receiver.try_recv() {
            Ok(byte) => {
                self.peeked = Some(byte);
                true
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }

    fn read_char(&mut self) -> Option<u8> {
        self.peeked.take().or_else(|| self.receiver.recv().ok())
    }
}

/// Interactive terminal, read key by key.
///
/// Must only be spawned while the terminal is held in raw mode (see
/// [`RawMode`](crate::term::RawMode)). Otherwise the terminal echoes typed keys and delivers
/// them a line at a time. Keys are read on a background thread, so that `Ctrl+C` is handled even
/// while the program never touches the keyboard.
#[derive(Debug)]
pub struct Terminal {
    feed: Feed,
}

impl Terminal {
    pub fn spawn() -> Self {
        Self {
            feed: Feed::spawn(forward_keys),
        }
    }
}

/// Send every key typed as UTF-8, until the terminal fails or the machine stops.
fn forward_keys(sender: Sender<u8>) {
    while let Ok(key) = term::read_key() {
        let mut bytes = [0u8; 4];
        for byte in key.into_char().encode_utf8(&mut bytes).as_bytes() {
            // Receiver dropped: machine has stopped
            if sender.send(*byte).is_err() {
                return;
            }
        }
    }
}

impl Input for Terminal {
    fn poll_available(&mut self) -> bool {
        self.feed.poll_available()
    }

    fn read_char(&mut self) -> Option<u8> {
        self.feed.read_char()
    }
}

/// Stdin which is not attached to a terminal, i.e. piped.
///
/// Bytes are read on a background thread, so that polling never blocks.
#[derive(Debug)]
pub struct Piped {
    feed: Feed,
}

impl Piped {
    pub fn spawn(stdin: io::Stdin) -> Self {
        Self::from_reader(stdin)
    }

    fn from_reader<R>(mut reader: R) -> Self
    where
        R: io::Read + Send + 'static,
    {
        let feed = Feed::spawn(move |sender| {
            let mut buf = [0u8; 256];
            loop {
                let count = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(count) => count,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                };
                for byte in &buf[..count] {
                    // Receiver dropped: machine has stopped
                    if sender.send(*byte).is_err() {
                        return;
                    }
                }
            }
        });
        Self { feed }
    }
}

impl Input for Piped {
    fn poll_available(&mut self) -> bool {
        self.feed.poll_available()
    }

    fn read_char(&mut self) -> Option<u8> {
        self.feed.read_char()
    }
}

/// Fixed sequence of bytes, given ahead of time.
///
/// Clones share the same queue, so more input can be pushed after the source has been handed to
/// a machine.
#[derive(Clone, Debug, Default)]
pub struct Scripted {
    queue: Rc<RefCell<VecDeque<u8>>>,
}

impl Scripted {
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        let scripted = Self::default();
        scripted.push(bytes);
        scripted
    }

    pub fn push(&self, bytes: impl AsRef<[u8]>) {
        self.queue
            .borrow_mut()
            .extend(bytes.as_ref().iter().copied());
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

impl Input for Scripted {
    fn poll_available(&mut self) -> bool {
        !self.is_empty()
    }

    fn read_char(&mut self) -> Option<u8> {
        self.queue.borrow_mut().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_is_shared_between_clones() {
        let handle = Scripted::default();
        let mut input = handle.clone();
        assert!(!input.poll_available());
        assert_eq!(input.read_char(), None);

        handle.push("ab");
        assert!(input.poll_available());
        // Polling does not consume
        assert!(input.poll_available());
        assert_eq!(input.read_char(), Some(b'a'));
        assert_eq!(handle.len(), 1);
        assert_eq!(input.read_char(), Some(b'b'));
        assert!(!input.poll_available());
    }

    #[test]
    fn piped_latches_polled_byte() {
        let mut input = Piped::from_reader(io::Cursor::new(b"xy".to_vec()));
        assert_eq!(input.read_char(), Some(b'x'));
        // Wait for the reader thread to deliver the rest
        while !input.poll_available() {
            thread::yield_now();
        }
        assert!(input.poll_available());
        assert_eq!(input.read_char(), Some(b'y'));
        assert_eq!(input.read_char(), None);
        assert!(!input.poll_available());
    }

    #[test]
    fn feed_forwards_multibyte_characters() {
        let mut feed = Feed::spawn(|sender| {
            let mut bytes = [0u8; 4];
            for byte in 'é'.encode_utf8(&mut bytes).as_bytes() {
                sender.send(*byte).unwrap();
            }
        });
        assert_eq!(feed.read_char(), Some(0xc3));
        assert_eq!(feed.read_char(), Some(0xa9));
        assert_eq!(feed.read_char(), None);
    }
}
