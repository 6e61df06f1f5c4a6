use std::{error, fmt};

pub mod parse;

pub type Byte = u8; // 1 byte
/// A register or memory value, sign-extended from the active word width
pub type Word = i32;
/// A cell index in the active mode's address space
pub type Address = u16;

/// Bytes backing both views. The 32-bit view is the larger one.
pub const MEMORY_BYTES: usize = Mode::Bits32.cells() * Mode::Bits32.cell_bytes();

/// Word width the machine is currently running at.
///
/// Both modes share one byte buffer: switching reinterprets the bytes, it
/// never copies or clears them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Bits16,
    Bits32,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Bits16
    }
}

impl Mode {
    /// Number of addressable cells
    pub const fn cells(self) -> usize {
        match self {
            Self::Bits16 => 0x100,
            Self::Bits32 => 0x1_0000,
        }
    }

    pub const fn max_address(self) -> Address {
        (self.cells() - 1) as Address
    }

    /// Size of one cell in the backing buffer
    pub const fn cell_bytes(self) -> usize {
        match self {
            Self::Bits16 => 2,
            Self::Bits32 => 4,
        }
    }

    /// The memory mapped console cell. There is no formula for this, each
    /// width has its own address.
    pub const fn io_address(self) -> Address {
        match self {
            Self::Bits16 => 0xFF,
            Self::Bits32 => 0x7F,
        }
    }

    /// Hex digits needed to print a full word
    pub const fn hex_digits(self) -> usize {
        match self {
            Self::Bits16 => 4,
            Self::Bits32 => 8,
        }
    }

    /// Hex digits needed to print an address
    pub const fn address_digits(self) -> usize {
        match self {
            Self::Bits16 => 2,
            Self::Bits32 => 4,
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            Self::Bits16 => Self::Bits32,
            Self::Bits32 => Self::Bits16,
        }
    }

    /// Truncates `value` to this width and sign-extends it back.
    pub const fn narrow(self, value: Word) -> Word {
        match self {
            Self::Bits16 => value as i16 as Word,
            Self::Bits32 => value,
        }
    }

    /// The unsigned bit pattern of `value` at this width.
    pub const fn unsigned(self, value: Word) -> u32 {
        match self {
            Self::Bits16 => value as u16 as u32,
            Self::Bits32 => value as u32,
        }
    }

    /// Wraps `value` into this mode's address space.
    pub const fn wrap_address(self, value: Word) -> Address {
        (value as u32 & self.max_address() as u32) as Address
    }

    /// Formats `value` as a zero padded hex word of this width.
    pub fn hex(self, value: Word) -> HexWord {
        HexWord { mode: self, value }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits16 => f.write_str("16-bit"),
            Self::Bits32 => f.write_str("32-bit"),
        }
    }
}

/// Display adapter returned by [`Mode::hex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexWord {
    mode: Mode,
    value: Word,
}

impl fmt::Display for HexWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0width$X}",
            self.mode.unsigned(self.value),
            width = self.mode.hex_digits()
        )
    }
}

/// An access outside the addressable range of a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutOfRange {
    pub mode: Mode,
    pub address: usize,
}

impl fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory has no {} address `0x{:X}`",
            self.mode, self.address
        )
    }
}

impl error::Error for OutOfRange {}

/// Emulates the memory of the machine.
///
/// One little endian byte buffer viewed either as 256 16-bit cells or as
/// 65536 32-bit cells. The 16-bit cell `n` lives at bytes `2n..2n+2` and
/// the 32-bit cell `n` at bytes `4n..4n+4`, so both views overlap at the
/// bottom of the buffer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Memory {
    /// The actual data of the memory
    data: Vec<Byte>,
}

impl Default for Memory {
    /// Initializes zeroed memory
    fn default() -> Self {
        Memory {
            data: vec![0; MEMORY_BYTES],
        }
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("bytes", &self.data.len())
            .field("populated16", &self.populated(Mode::Bits16).count())
            .finish()
    }
}

impl Memory {
    /// Byte offset of a cell in the backing buffer
    fn offset(mode: Mode, address: Address) -> Result<usize, OutOfRange> {
        let address = address as usize;
        if address < mode.cells() {
            Ok(address * mode.cell_bytes())
        } else {
            Err(OutOfRange { mode, address })
        }
    }

    /// Reads a cell, sign-extended to a [`Word`]
    pub fn read(&self, mode: Mode, address: Address) -> Result<Word, OutOfRange> {
        let offset = Self::offset(mode, address)?;
        let value = match mode {
            Mode::Bits16 => i16::from_le_bytes([self.data[offset], self.data[offset + 1]]) as Word,
            Mode::Bits32 => i32::from_le_bytes([
                self.data[offset],
                self.data[offset + 1],
                self.data[offset + 2],
                self.data[offset + 3],
            ]),
        };
        Ok(value)
    }

    /// Writes the low bits of `value` into a cell (little endian)
    pub fn write(&mut self, mode: Mode, address: Address, value: Word) -> Result<(), OutOfRange> {
        let offset = Self::offset(mode, address)?;
        match mode {
            Mode::Bits16 => {
                self.data[offset..offset + 2].copy_from_slice(&(value as i16).to_le_bytes())
            }
            Mode::Bits32 => self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes()),
        }
        Ok(())
    }

    /// Writes consecutive cells starting at `position`
    pub fn write_slice(
        &mut self,
        mode: Mode,
        position: Address,
        words: &[Word],
    ) -> Result<(), OutOfRange> {
        for (i, word) in words.iter().enumerate() {
            let address = position as usize + i;
            if address >= mode.cells() {
                return Err(OutOfRange { mode, address });
            }
            self.write(mode, address as Address, *word)?;
        }
        Ok(())
    }

    /// Non-zero cells of the given view, in address order
    pub fn populated(&self, mode: Mode) -> impl Iterator<Item = (Address, Word)> + '_ {
        (0..mode.cells()).filter_map(move |address| {
            let address = address as Address;
            match self.read(mode, address) {
                Ok(0) | Err(_) => None,
                Ok(value) => Some((address, value)),
            }
        })
    }
}

/// Writes a block of words directly into the memory
#[macro_export]
macro_rules! write_words {
    ( $mem:ident : $mode:expr, $pos:expr => $( $word:expr ),+ $(,)? ) => {
        $mem.write_slice($mode, $pos, &[
            $(
                $word as $crate::memory::Word,
            )+
        ])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn test_read_write_16() -> Result<()> {
        let mut mem = Memory::default();
        mem.write(Mode::Bits16, 0x10, 0x7A05)?;
        assert_eq!(mem.read(Mode::Bits16, 0x10)?, 0x7A05);
        assert_eq!(mem.data[0x20], 0x05); // little endian
        assert_eq!(mem.data[0x21], 0x7A);

        Ok(())
    }

    #[test]
    fn test_read_16_sign_extends() -> Result<()> {
        let mut mem = Memory::default();
        mem.write(Mode::Bits16, 0x20, 0xFFFE)?;
        assert_eq!(mem.read(Mode::Bits16, 0x20)?, -2);

        Ok(())
    }

    #[test]
    fn test_views_overlap() -> Result<()> {
        let mut mem = Memory::default();
        mem.write(Mode::Bits32, 0x08, 0x1234_5678)?;
        assert_eq!(mem.read(Mode::Bits16, 0x10)?, 0x5678);
        assert_eq!(mem.read(Mode::Bits16, 0x11)?, 0x1234);

        mem.write(Mode::Bits16, 0x11, 0xABCD)?;
        assert_eq!(Mode::Bits32.unsigned(mem.read(Mode::Bits32, 0x08)?), 0xABCD_5678);

        Ok(())
    }

    #[test]
    fn test_io_cells_overlap() -> Result<()> {
        let mut mem = Memory::default();
        mem.write(Mode::Bits32, Mode::Bits32.io_address(), 0x0001_0002)?;
        assert_eq!(mem.read(Mode::Bits16, 0xFE)?, 0x0002);
        assert_eq!(mem.read(Mode::Bits16, Mode::Bits16.io_address())?, 0x0001);

        Ok(())
    }

    #[test]
    fn test_range_check() {
        let mut mem = Memory::default();
        assert_eq!(
            mem.read(Mode::Bits16, 0x100),
            Err(OutOfRange {
                mode: Mode::Bits16,
                address: 0x100
            })
        );
        assert!(mem.write(Mode::Bits16, 0x100, 1).is_err());
        assert!(mem.write(Mode::Bits32, 0xFFFF, 1).is_ok());
        assert!(mem.write_slice(Mode::Bits16, 0xFF, &[1, 2]).is_err());
    }

    #[test]
    fn test_mode_helpers() {
        assert_eq!(Mode::Bits16.narrow(0x1_8000), -0x8000);
        assert_eq!(Mode::Bits32.narrow(0x1_8000), 0x1_8000);
        assert_eq!(Mode::Bits16.wrap_address(0x123), 0x23);
        assert_eq!(Mode::Bits32.wrap_address(-1), 0xFFFF);
        assert_eq!(Mode::Bits16.hex(-1).to_string(), "FFFF");
        assert_eq!(Mode::Bits32.hex(0x1F).to_string(), "0000001F");
        assert_eq!(Mode::Bits16.toggled(), Mode::Bits32);
        assert_eq!(MEMORY_BYTES, 0x4_0000);
    }

    #[test]
    fn test_write_words() -> Result<()> {
        let mut mem = Memory::default();
        mem.write_slice(Mode::Bits16, 0x10, &[0x7A05, 0x1AAB, 0x0000])?;

        let mut mem2 = Memory::default();
        write_words!(mem2 : Mode::Bits16, 0x10 => 0x7A05, 0x1AAB, 0x0000)?;

        assert_eq!(mem, mem2);
        assert_eq!(
            mem.populated(Mode::Bits16).collect::<Vec<_>>(),
            vec![(0x10, 0x7A05), (0x11, 0x1AAB)]
        );

        Ok(())
    }
}
