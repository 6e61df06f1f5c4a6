//! Coloured dump of the machine after each cycle.

use std::fmt;
use std::io::{self, Write};
use std::ops::RangeInclusive;

use crate::memory::{Address, Memory, Mode};
use crate::processor::{Access, Processor, REGISTER_COUNT};

/// Default number of cells shown on each side of a memory window
pub const DEFAULT_WINDOW: u16 = 6;

/// ANSI foreground colours used by the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Colour {
    /// Written register or cell, explicitly set PC
    Red,
    /// Advanced PC, cell at PC
    Yellow,
    /// First source register, read cell
    Blue,
    /// Second source register
    BrightBlue,
    White,
}

impl Colour {
    pub const fn code(self) -> &'static str {
        match self {
            Colour::Red => "\x1b[31m",
            Colour::Yellow => "\x1b[33m",
            Colour::Blue => "\x1b[34m",
            Colour::BrightBlue => "\x1b[94m",
            Colour::White => "\x1b[97m",
        }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// What happened to a register during the last cycle. Exactly one applies,
/// in declaration order of precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Written,
    FirstRead,
    SecondRead,
    Untouched,
}

impl Category {
    pub fn of(access: &Access, register: usize) -> Self {
        if access.written == Some(register) {
            Category::Written
        } else if access.first_read == Some(register) {
            Category::FirstRead
        } else if access.second_read == Some(register) {
            Category::SecondRead
        } else {
            Category::Untouched
        }
    }

    pub const fn colour(self) -> Colour {
        match self {
            Category::Written => Colour::Red,
            Category::FirstRead => Colour::Blue,
            Category::SecondRead => Colour::BrightBlue,
            Category::Untouched => Colour::White,
        }
    }
}

pub fn pc_colour(cpu: &Processor) -> Colour {
    if cpu.halted {
        Colour::White
    } else if cpu.pc_modified {
        Colour::Red
    } else if cpu.old_pc != cpu.pc {
        Colour::Yellow
    } else {
        Colour::White
    }
}

/// Colour of a cell in a memory window. Unlike registers, the PC marker
/// wins over reads and writes.
pub fn cell_colour(cpu: &Processor, address: Address) -> Colour {
    if address == cpu.pc {
        Colour::Yellow
    } else if cpu.access.memory_read == Some(address) {
        Colour::Blue
    } else if cpu.access.memory_written == Some(address) {
        Colour::Red
    } else {
        Colour::White
    }
}

/// Cells shown around `centre`: `half` on each side, shifted to stay inside
/// the address space. The 16-bit window never shows the console cell at the
/// very top.
pub fn window(mode: Mode, centre: Address, half: u16) -> RangeInclusive<Address> {
    let top = match mode {
        Mode::Bits16 => mode.io_address() as u32 - 1,
        Mode::Bits32 => mode.max_address() as u32,
    };
    let span = 2 * half as u32;
    if span >= top {
        return 0..=top as Address;
    }

    let start = (centre as u32).saturating_sub(half as u32);
    let (start, end) = if start + span > top {
        (top - span, top)
    } else {
        (start, start + span)
    };

    start as Address..=end as Address
}

fn range_error(err: crate::memory::OutOfRange) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err)
}

pub fn render_registers<W: Write + ?Sized>(out: &mut W, cpu: &Processor) -> io::Result<()> {
    let white = Colour::White;
    let pc = pc_colour(cpu);
    let wide = cpu.mode == Mode::Bits32;

    if wide {
        write!(out, "      {}PC{}", pc, white)?;
    } else {
        write!(out, "    {}PC{}", pc, white)?;
    }
    for i in 0..REGISTER_COUNT {
        let colour = Category::of(&cpu.access, i).colour();
        if wide {
            write!(out, ",    {}R[{:02X}]{}", colour, i, white)?;
        } else {
            write!(out, ", {}R[{:X}]{}", colour, i, white)?;
        }
    }

    write!(
        out,
        "\n    {}{:0w$X}{}",
        pc,
        cpu.pc,
        white,
        w = cpu.mode.address_digits()
    )?;
    for (i, value) in cpu.registers.iter().enumerate() {
        let colour = Category::of(&cpu.access, i).colour();
        write!(out, ", {}{}{}", colour, cpu.mode.hex(*value), white)?;
    }

    writeln!(out)
}

pub fn render_window<W: Write + ?Sized>(
    out: &mut W,
    cpu: &Processor,
    memory: &Memory,
    centre: Address,
    half: u16,
) -> io::Result<()> {
    let white = Colour::White;
    let mode = cpu.mode;
    let cells = window(mode, centre, half);
    let w = mode.address_digits();

    for address in cells.clone() {
        let colour = cell_colour(cpu, address);
        let lead = match (address == *cells.start(), mode) {
            (true, Mode::Bits16) => "    ",
            (true, Mode::Bits32) => "     ",
            (false, Mode::Bits16) => ", ",
            (false, Mode::Bits32) => ",   ",
        };
        write!(out, "{}{}M[{:0w$X}]{}", lead, colour, address, white, w = w)?;
    }
    writeln!(out)?;

    for address in cells.clone() {
        let colour = cell_colour(cpu, address);
        let lead = match (address == *cells.start(), mode) {
            (true, Mode::Bits16) => "     ",
            (true, Mode::Bits32) => "    ",
            (false, _) => ",  ",
        };
        let value = memory.read(mode, address).map_err(range_error)?;
        write!(out, "{}{}{}{}", lead, colour, mode.hex(value), white)?;
    }

    writeln!(out)
}

/// Prints the registers and the memory around PC and the last access, or
/// the halt banner.
pub fn render_cycle<W: Write + ?Sized>(
    out: &mut W,
    cpu: &Processor,
    memory: &Memory,
    half: u16,
) -> io::Result<()> {
    if cpu.halted {
        return writeln!(out, "{}Cpu has halted{}", Colour::Red, Colour::White);
    }

    writeln!(out, "Cpu state:\n  Registers:")?;
    render_registers(out, cpu)?;

    writeln!(out, "\n  Memory near PC:")?;
    render_window(out, cpu, memory, cpu.pc, half)?;

    if let Some(address) = cpu.access.memory_read {
        writeln!(out, "\n  Memory near last read:")?;
        render_window(out, cpu, memory, address, half)?;
    }

    if let Some(address) = cpu.access.memory_written {
        writeln!(out, "\n  Memory near last write:")?;
        render_window(out, cpu, memory, address, half)?;
    }

    writeln!(out)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::BufferedConsole;
    use color_eyre::eyre::Result;
    use std::io::Cursor;
    use std::str::FromStr;

    fn render(cpu: &Processor, memory: &Memory) -> Result<String> {
        let mut out = Vec::new();
        render_cycle(&mut out, cpu, memory, DEFAULT_WINDOW)?;
        Ok(String::from_utf8(out)?)
    }

    fn stepped(image: &str) -> Result<(Processor, Memory)> {
        let mut mem = Memory::from_str(image)?;
        let mut cpu = Processor::default();
        let mut con = BufferedConsole::new(Cursor::new(String::new()), Vec::new());
        cpu.step(&mut mem, &mut con)?;
        Ok((cpu, mem))
    }

    #[test]
    fn test_window_middle() {
        assert_eq!(window(Mode::Bits16, 0x40, 6), 0x3A..=0x46);
        assert_eq!(window(Mode::Bits32, 0x1000, 2), 0x0FFE..=0x1002);
    }

    #[test]
    fn test_window_clipped_low() {
        assert_eq!(window(Mode::Bits16, 0x02, 6), 0x00..=0x0C);
        assert_eq!(window(Mode::Bits32, 0x00, 6), 0x00..=0x0C);
    }

    #[test]
    fn test_window_clipped_high() {
        // The console cell is left out at the top of the 16-bit space
        assert_eq!(window(Mode::Bits16, 0xFF, 6), 0xF2..=0xFE);
        assert_eq!(window(Mode::Bits16, 0xFA, 6), 0xF2..=0xFE);
        assert_eq!(window(Mode::Bits32, 0xFFFF, 6), 0xFFF3..=0xFFFF);
    }

    #[test]
    fn test_window_wider_than_memory() {
        assert_eq!(window(Mode::Bits16, 0x80, 200), 0x00..=0xFE);
    }

    #[test]
    fn test_category_precedence() {
        let access = Access {
            first_read: Some(1),
            second_read: Some(1),
            written: Some(1),
            ..Access::default()
        };
        assert_eq!(Category::of(&access, 1), Category::Written);

        let access = Access {
            first_read: Some(2),
            second_read: Some(2),
            written: Some(3),
            ..Access::default()
        };
        assert_eq!(Category::of(&access, 2), Category::FirstRead);
        assert_eq!(Category::of(&access, 4), Category::Untouched);

        let access = Access {
            second_read: Some(5),
            ..Access::default()
        };
        assert_eq!(Category::of(&access, 5).colour(), Colour::BrightBlue);
    }

    #[test]
    fn test_register_colours() -> Result<()> {
        let (cpu, mem) = stepped("10:1312\n")?;
        let out = render(&cpu, &mem)?;

        assert!(out.contains("\x1b[31mR[3]\x1b[97m"));
        assert!(out.contains("\x1b[34mR[1]\x1b[97m"));
        assert!(out.contains("\x1b[94mR[2]\x1b[97m"));
        assert!(out.contains("\x1b[97mR[4]\x1b[97m"));

        Ok(())
    }

    #[test]
    fn test_pc_colour() -> Result<()> {
        let (cpu, _) = stepped("10:7105\n")?;
        assert_eq!(pc_colour(&cpu), Colour::Yellow);

        let (cpu, _) = stepped("10:C020\n")?;
        assert_eq!(pc_colour(&cpu), Colour::Red);

        assert_eq!(pc_colour(&Processor::default()), Colour::White);

        Ok(())
    }

    #[test]
    fn test_cell_colours() -> Result<()> {
        let (mut cpu, _) = stepped("10:8A30\n")?;
        assert_eq!(cell_colour(&cpu, 0x30), Colour::Blue);
        assert_eq!(cell_colour(&cpu, 0x11), Colour::Yellow);

        cpu.pc = 0x30;
        assert_eq!(cell_colour(&cpu, 0x30), Colour::Yellow);

        let (cpu, _) = stepped("10:9A31\n")?;
        assert_eq!(cell_colour(&cpu, 0x31), Colour::Red);
        assert_eq!(cell_colour(&cpu, 0x32), Colour::White);

        Ok(())
    }

    #[test]
    fn test_render_sections() -> Result<()> {
        let (cpu, mem) = stepped("10:7A05\n")?;
        let out = render(&cpu, &mem)?;
        assert!(out.starts_with("Cpu state:\n  Registers:\n"));
        assert!(out.contains("Memory near PC:"));
        assert!(!out.contains("Memory near last read:"));
        assert!(!out.contains("Memory near last write:"));
        assert!(out.contains("\x1b[33m11\x1b[97m"));
        assert!(out.contains("\x1b[31m0005\x1b[97m"));

        let (cpu, mem) = stepped("10:8A30\n")?;
        assert!(render(&cpu, &mem)?.contains("Memory near last read:"));

        let (cpu, mem) = stepped("10:9A31\n")?;
        assert!(render(&cpu, &mem)?.contains("Memory near last write:"));

        Ok(())
    }

    #[test]
    fn test_render_window_rows() -> Result<()> {
        let mut mem = Memory::default();
        mem.write(Mode::Bits16, 0x00, 0x7A05)?;
        let mut cpu = Processor::new(0x00);
        cpu.access.memory_read = Some(0x01);

        let mut out = Vec::new();
        render_window(&mut out, &cpu, &mem, 0x00, 1)?;
        let out = String::from_utf8(out)?;

        assert_eq!(
            out,
            "    \x1b[33mM[00]\x1b[97m, \x1b[34mM[01]\x1b[97m, \x1b[97mM[02]\x1b[97m\n     \x1b[33m7A05\x1b[97m,  \x1b[34m0000\x1b[97m,  \x1b[97m0000\x1b[97m\n"
        );

        Ok(())
    }

    #[test]
    fn test_render_32_bit() -> Result<()> {
        let (cpu, mem) = stepped("10:0FFF\n")?;
        let out = render(&cpu, &mem)?;

        assert!(out.contains("R[0F]"));
        assert!(out.contains("\x1b[31m0010\x1b[97m"));
        assert!(out.contains("M[0010]"));
        assert!(out.contains("00000000"));

        Ok(())
    }

    #[test]
    fn test_render_halted() -> Result<()> {
        let (cpu, mem) = stepped("10:0000\n")?;
        assert_eq!(render(&cpu, &mem)?, "\x1b[31mCpu has halted\x1b[97m\n");

        Ok(())
    }
}
