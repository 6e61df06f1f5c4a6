//! Memory image loader.
//!
//! ```text
//! program Echo
//! /*
//!  * Reads a value from the console cell and writes it back.
//!  */
//! 10: 8AFF   // lod R[A], FF
//! 11: 9AFF   // str R[A], FF
//! 12: 0000   // hlt
//! ```
//!
//! Each cell line is `ADDRESS:VALUE` in hex. A four digit value fills a
//! 16-bit cell, an eight digit value fills a 32-bit cell.

use std::borrow::Cow;
use std::error;
use std::path::Path;
use std::str::FromStr;
use std::{fmt, fs, str::Lines};

use color_eyre::eyre::{eyre, Report, Result as EyreResult, WrapErr};

use super::{Address, Memory, Mode, Word};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    InvalidAddress { address: usize },
    MalformedAddress,
    MalformedValue,
    MissingSeparator,
    InvalidComment,
    UnterminatedComment,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::InvalidAddress { address } => {
                write!(f, "memory has no address `0x{:X}`", address)
            }
            ParseErrorKind::MalformedAddress => f.write_str("invalid memory address"),
            ParseErrorKind::MalformedValue => f.write_str("invalid memory value"),
            ParseErrorKind::MissingSeparator => f.write_str("missing `:` separator"),
            ParseErrorKind::InvalidComment => f.write_str("invalid line in multi line comment"),
            ParseErrorKind::UnterminatedComment => f.write_str("unterminated multi line comment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    kind: ParseErrorKind,
    context: Option<Cow<'static, str>>,
    line_nr: usize,
}

impl ParseError {
    fn new<C, S>(kind: ParseErrorKind, context: C, line_nr: usize) -> Self
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            context: context.into().map(|inner| inner.into()),
            line_nr,
        }
    }

    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    pub fn line_nr(&self) -> usize {
        self.line_nr
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(
                f,
                "error [ln: {}]: {} - {}",
                self.line_nr, self.kind, context
            )
        } else {
            write!(f, "error [ln: {}]: {}", self.line_nr, self.kind)
        }
    }
}

impl error::Error for ParseError {}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug)]
pub struct Parser<'a, 'm> {
    lines: Lines<'a>,
    line_nr: usize,
    in_comment: bool,
    memory: &'m mut Memory,
}

impl<'a, 'm> Parser<'a, 'm> {
    /// Creates a new parser for `data` which will try to populate `memory`.
    pub fn new(data: &'a str, memory: &'m mut Memory) -> Self {
        Self {
            lines: data.lines(),
            line_nr: 0,
            in_comment: false,
            memory,
        }
    }

    /// Consumes `self` and tries to parse all of the image into memory.
    ///
    /// # Errors
    ///
    /// All errors which may occur are collected and returned at the end.
    /// Cells on valid lines are written even if other lines fail.
    pub fn parse(mut self) -> Result<(), Vec<ParseError>> {
        let mut errors = Vec::new();

        while let Some(res) = self.parse_next_line() {
            if let Err(err) = res {
                log::error!("{}", err);
                errors.push(err);
            }
        }

        if self.in_comment {
            let err = ParseError::new(
                ParseErrorKind::UnterminatedComment,
                "image ended inside `/*`",
                self.line_nr,
            );
            log::error!("{}", err);
            errors.push(err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Tries to parse the next line. Each cell should be located on its own
    /// line.
    fn parse_next_line(&mut self) -> Option<Result<()>> {
        let line = self.lines.next()?.trim();
        self.line_nr += 1;

        if self.in_comment {
            Some(self.parse_comment_body(line))
        } else if line.starts_with("/*") {
            // A line that also closes the comment stands on its own
            self.in_comment = !(line.len() >= 4 && line.ends_with("*/"));
            Some(Ok(()))
        } else if line.is_empty()
            || line.starts_with("//")
            || line.starts_with("program")
            || line.starts_with("function")
        {
            // Comment, declaration or empty line; skip
            Some(Ok(()))
        } else {
            Some(self.parse_cell(line))
        }
    }

    /// Handles a line inside `/* ... */`. Body lines have to start with `*`.
    fn parse_comment_body(&mut self, line: &str) -> Result<()> {
        if line.starts_with('*') && line.ends_with("*/") {
            self.in_comment = false;
            Ok(())
        } else if line.is_empty() || line.starts_with('*') || line.starts_with("/*") {
            Ok(())
        } else {
            Err(ParseError::new(
                ParseErrorKind::InvalidComment,
                format!("`{}` does not start with `*`", line),
                self.line_nr,
            ))
        }
    }

    /// Tries to parse line as a cell assignment.
    ///
    /// # Examples
    ///
    /// - `10:7A05`
    /// - `11: 9AFF // str R[A], FF`
    /// - `0200:0FFF0000`
    fn parse_cell(&mut self, line: &str) -> Result<()> {
        let (address, rest) = line.split_once(':').ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::MissingSeparator,
                format!("expected `ADDRESS:VALUE`, found `{}`", line),
                self.line_nr,
            )
        })?;

        if !is_hex(address) || !(2..=4).contains(&address.len()) {
            return Err(ParseError::new(
                ParseErrorKind::MalformedAddress,
                format!("`{}` is not a 2 to 4 digit hex address", address),
                self.line_nr,
            ));
        }

        let rest = rest.trim_start();
        let (value, trailing) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        let trailing = trailing.trim();
        if !trailing.is_empty() && !trailing.starts_with("//") {
            return Err(ParseError::new(
                ParseErrorKind::MalformedValue,
                format!("unexpected `{}` after value", trailing),
                self.line_nr,
            ));
        }

        let mode = match value.len() {
            4 => Mode::Bits16,
            8 => Mode::Bits32,
            _ => {
                return Err(ParseError::new(
                    ParseErrorKind::MalformedValue,
                    format!("`{}` is neither 4 nor 8 hex digits", value),
                    self.line_nr,
                ))
            }
        };
        if !is_hex(value) {
            return Err(ParseError::new(
                ParseErrorKind::MalformedValue,
                format!("`{}` is not hex", value),
                self.line_nr,
            ));
        }

        // Both were checked to be at most 4 / 8 hex digits
        let address = usize::from_str_radix(address, 16).unwrap_or(usize::MAX);
        let value = u32::from_str_radix(value, 16).unwrap_or_default() as Word;
        if address > mode.max_address() as usize {
            return Err(ParseError::new(
                ParseErrorKind::InvalidAddress { address },
                format!("a {} value needs an address up to 0x{:X}", mode, mode.max_address()),
                self.line_nr,
            ));
        }

        let address = address as Address;
        let line_nr = self.line_nr;
        self.memory.write(mode, address, value).map_err(|err| {
            ParseError::new(
                ParseErrorKind::InvalidAddress {
                    address: err.address,
                },
                err.to_string(),
                line_nr,
            )
        })?;

        log::info!(
            "[{}] M[{:0aw$X}] <- {}",
            self.line_nr,
            address,
            mode.hex(value),
            aw = mode.address_digits()
        );

        Ok(())
    }
}

fn report(errors: Vec<ParseError>) -> Report {
    let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
    eyre!(
        "memory image has {} error(s):\n{}",
        errors.len(),
        lines.join("\n")
    )
}

impl Memory {
    /// Loads a memory image on top of the current contents.
    pub fn load(&mut self, data: &str) -> EyreResult<()> {
        Parser::new(data, self).parse().map_err(report)
    }

    /// Reads and loads a memory image file into fresh memory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> EyreResult<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read `{}`", path.display()))?;

        let mut memory = Self::default();
        memory
            .load(&data)
            .wrap_err_with(|| format!("failed to load `{}`", path.display()))?;
        Ok(memory)
    }
}

impl FromStr for Memory {
    type Err = Report;

    fn from_str(data: &str) -> EyreResult<Self> {
        let mut memory = Self::default();
        memory.load(data)?;
        Ok(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    fn errors(data: &str) -> Vec<ParseErrorKind> {
        let mut mem = Memory::default();
        match Parser::new(data, &mut mem).parse() {
            Ok(()) => Vec::new(),
            Err(errors) => errors.iter().map(ParseError::kind).collect(),
        }
    }

    #[test]
    fn parse_cells() -> Result<()> {
        let data = r#"
            10:7A05
            11:0000
        "#;

        let mem = Memory::from_str(data)?;

        assert_eq!(mem.read(Mode::Bits16, 0x10)?, 0x7A05);
        assert_eq!(mem.read(Mode::Bits16, 0x11)?, 0x0000);
        assert_eq!(mem.populated(Mode::Bits16).count(), 1);

        Ok(())
    }

    #[test]
    fn parse_assembler_output() -> Result<()> {
        let data = r#"
            program Echo
            10: 8AFF
            11: 9AFF   // str R[A], FF
            function Unused
            12: 0000
        "#;

        let mem = Memory::from_str(data)?;

        assert_eq!(Mode::Bits16.unsigned(mem.read(Mode::Bits16, 0x10)?), 0x8AFF);
        assert_eq!(Mode::Bits16.unsigned(mem.read(Mode::Bits16, 0x11)?), 0x9AFF);

        Ok(())
    }

    #[test]
    fn parse_comments() -> Result<()> {
        let data = r#"
            // single line
            /* one line block */
            /*
             * block body
             *
             */
            10:1234
            /*
             * closing on a body line */
            11:5678
        "#;

        let mem = Memory::from_str(data)?;

        assert_eq!(mem.read(Mode::Bits16, 0x10)?, 0x1234);
        assert_eq!(mem.read(Mode::Bits16, 0x11)?, 0x5678);

        Ok(())
    }

    #[test]
    fn parse_wide_cells() -> Result<()> {
        let data = r#"
            10:0FFF
            10:00000FFF
            FFFF:80000000
        "#;

        let mem = Memory::from_str(data)?;

        assert_eq!(mem.read(Mode::Bits16, 0x10)?, 0x0FFF);
        assert_eq!(mem.read(Mode::Bits32, 0x10)?, 0x0FFF);
        assert_eq!(mem.read(Mode::Bits16, 0x20)?, 0x0FFF); // overlaid by the wide cell
        assert_eq!(mem.read(Mode::Bits32, 0xFFFF)?, i32::MIN);

        Ok(())
    }

    #[test]
    fn parse_non_hex_address() {
        assert_eq!(errors("ZZ:0000"), vec![ParseErrorKind::MalformedAddress]);
        assert_eq!(errors("1:0000"), vec![ParseErrorKind::MalformedAddress]);
        assert!(Memory::from_str("ZZ:0000\n").is_err());
    }

    #[test]
    fn parse_bad_values() {
        assert_eq!(errors("10:7A0"), vec![ParseErrorKind::MalformedValue]);
        assert_eq!(errors("10:7AG5"), vec![ParseErrorKind::MalformedValue]);
        assert_eq!(errors("10:7A05 junk"), vec![ParseErrorKind::MalformedValue]);
        assert_eq!(errors("10-7A05"), vec![ParseErrorKind::MissingSeparator]);
    }

    #[test]
    fn parse_out_of_range() {
        assert_eq!(
            errors("100:1234"),
            vec![ParseErrorKind::InvalidAddress { address: 0x100 }]
        );
        assert_eq!(errors("0100:00001234"), Vec::new());
    }

    #[test]
    fn parse_bad_comments() {
        assert_eq!(
            errors("/*\n * fine\n not fine\n */"),
            vec![ParseErrorKind::InvalidComment]
        );
        assert_eq!(
            errors("/*\n * never closed\n"),
            vec![ParseErrorKind::UnterminatedComment]
        );
    }

    #[test]
    fn parse_collects_all_errors() {
        let mut mem = Memory::default();
        let errors = Parser::new("ZZ:0000\n10:1111\n11:22\n", &mut mem)
            .parse()
            .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line_nr(), 1);
        assert_eq!(errors[1].line_nr(), 3);
        assert_eq!(errors[1].kind(), ParseErrorKind::MalformedValue);
    }

    #[test]
    fn parse_sample_programs() -> Result<()> {
        for image in &[
            include_str!("../../programs/countdown.toy"),
            include_str!("../../programs/echo.toy"),
            include_str!("../../programs/multiply.toy"),
            include_str!("../../programs/wide.toy"),
        ] {
            let mem = Memory::from_str(image)?;
            assert_ne!(mem.read(Mode::Bits16, 0x10)?, 0);
        }

        Ok(())
    }
}
