//! Memory mapped console.
//!
//! Reading the I/O cell of the active mode prompts the operator for a hex
//! value, writing it echoes the value back. Everything else about the cell
//! behaves like ordinary memory.

use std::collections::VecDeque;
use std::io::{self, BufRead, StdinLock, Stdout, Write};

use log::*;

use crate::memory::{Address, Memory, Mode, OutOfRange, Word};

/// Operator side of the machine: typed input plus an output sink.
pub trait Console: Write {
    /// Next whitespace delimited token typed by the operator, `None` once
    /// input is exhausted.
    fn next_token(&mut self) -> io::Result<Option<String>>;

    /// Blocks until the operator asks for the next cycle.
    fn wait_for_continue(&mut self) -> io::Result<()>;
}

/// A [`Console`] over any buffered reader and writer.
#[derive(Debug)]
pub struct BufferedConsole<R, W> {
    reader: R,
    writer: W,
    pending: VecDeque<String>,
}

pub type StdConsole = BufferedConsole<StdinLock<'static>, Stdout>;

impl<R: BufRead, W: Write> BufferedConsole<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            pending: VecDeque::new(),
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl StdConsole {
    /// Console on the process' stdin and stdout
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Write for BufferedConsole<R, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<R: BufRead, W: Write> Console for BufferedConsole<R, W> {
    fn next_token(&mut self) -> io::Result<Option<String>> {
        while self.pending.is_empty() {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.pending
                .extend(line.split_whitespace().map(String::from));
        }

        Ok(self.pending.pop_front())
    }

    fn wait_for_continue(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        Ok(())
    }
}

/// Parses one operator token as a hex word of the given width.
///
/// # Examples
///
/// - `1F`
/// - `0xFFFE`
pub fn parse_input(token: &str, mode: Mode) -> Option<Word> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);

    if digits.is_empty()
        || digits.len() > mode.hex_digits()
        || !digits.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return None;
    }

    let raw = u32::from_str_radix(digits, 16).ok()?;
    Some(mode.narrow(raw as Word))
}

/// Prompts until the operator enters a valid hex word.
///
/// # Errors
///
/// Fails with [`io::ErrorKind::UnexpectedEof`] when input runs out first.
pub fn read_input<C: Console>(console: &mut C, mode: Mode) -> io::Result<Word> {
    loop {
        writeln!(console, "input: ")?;
        console.flush()?;

        let token = console.next_token()?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "operator input closed")
        })?;

        match parse_input(&token, mode) {
            Some(value) => return Ok(value),
            None => warn!(
                "Discarding input `{}`, expected up to {} hex digits",
                token,
                mode.hex_digits()
            ),
        }
    }
}

fn range_error(err: OutOfRange) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err)
}

/// Fills the I/O cell from the operator before it is read.
pub fn before_read<C: Console>(
    console: &mut C,
    memory: &mut Memory,
    mode: Mode,
    address: Address,
) -> io::Result<()> {
    if address != mode.io_address() {
        return Ok(());
    }

    let value = read_input(console, mode)?;
    memory.write(mode, address, value).map_err(range_error)?;
    writeln!(console)?;

    debug!("Console input {}", mode.hex(value));
    Ok(())
}

/// Echoes the I/O cell after it was written.
pub fn after_write<C: Console>(
    console: &mut C,
    memory: &Memory,
    mode: Mode,
    address: Address,
) -> io::Result<()> {
    if address != mode.io_address() {
        return Ok(());
    }

    let value = memory.read(mode, address).map_err(range_error)?;
    writeln!(console, "output: {}({})\n", mode.hex(value), value)
}
