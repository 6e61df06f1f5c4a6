//! Instruction words.
//!
//! ```text
//!  15    12 11     8 7      4 3      0
//! +--------+--------+--------+--------+
//! | opcode |   d    |   s    |   t    |
//! +--------+--------+--------+--------+
//!                   |      addr       |
//!                   +-----------------+
//! ```

use std::convert::TryFrom;
use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::MODE_SWITCH;
use crate::memory::{Address, Mode};

/// Operand layout of an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// No operands
    Bare,
    /// `R[d]`
    R,
    /// `R[d], R[t]`
    RR,
    /// `R[d], R[s], R[t]`
    RRR,
    /// `R[d], addr`
    RA,
}

macro_rules! opcodes {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $repr:literal => $mnemonic:literal ( $format:ident ) , )+ ) => {
        /// The instruction set, selected by the top nibble of a word
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(TryFromPrimitive, IntoPrimitive)]
        pub enum Opcode {
            $(
                $( #[doc = $doc] )+
                $name = $repr,
            )+
        }

        impl Opcode {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $( Self::$name => $mnemonic , )+
                }
            }

            pub fn format(&self) -> Format {
                match self {
                    $( Self::$name => Format::$format , )+
                }
            }
        }

        impl ::std::fmt::Display for Opcode {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.mnemonic())
            }
        }
    }
}

opcodes! {
    /// Stop the machine, or switch word width on `0x0FFF`
    Halt = 0x0 => "hlt" (Bare),
    /// R[d] <- R[s] + R[t]
    Add = 0x1 => "add" (RRR),
    /// R[d] <- R[s] - R[t]
    Sub = 0x2 => "sub" (RRR),
    /// R[d] <- R[s] & R[t]
    And = 0x3 => "and" (RRR),
    /// R[d] <- R[s] ^ R[t]
    Xor = 0x4 => "xor" (RRR),
    /// R[d] <- R[s] << R[t]
    ShiftLeft = 0x5 => "asl" (RRR),
    /// R[d] <- R[s] >> R[t], arithmetic
    ShiftRight = 0x6 => "asr" (RRR),
    /// R[d] <- addr
    LoadAddress = 0x7 => "lda" (RA),
    /// R[d] <- M[addr]
    Load = 0x8 => "lod" (RA),
    /// M[addr] <- R[d]
    Store = 0x9 => "str" (RA),
    /// R[d] <- M[R[t]]
    LoadIndirect = 0xA => "ldi" (RR),
    /// M[R[t]] <- R[d]
    StoreIndirect = 0xB => "sti" (RR),
    /// if (R[d] == 0) PC <- addr
    BranchZero = 0xC => "brz" (RA),
    /// if (R[d] > 0) PC <- addr
    BranchPositive = 0xD => "brp" (RA),
    /// PC <- R[d]
    Jump = 0xE => "jmp" (R),
    /// R[d] <- PC + 1; PC <- addr
    Call = 0xF => "jsr" (RA),
}

/// A decoded instruction word.
///
/// The operand nibbles are kept raw; for [`Format::RA`] the `s` and `t`
/// nibbles together form the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub d: u8,
    pub s: u8,
    pub t: u8,
    /// The full fetched word
    pub word: u32,
}

impl Instruction {
    /// Splits a fetched word into opcode and operands.
    ///
    /// In 32-bit mode only the halt / mode switch opcode exists, every other
    /// top nibble is returned as `Err(opcode)`.
    pub fn decode(mode: Mode, word: u32) -> Result<Self, u8> {
        let opcode = match mode {
            Mode::Bits16 => ((word >> 12) & 0xF) as u8,
            Mode::Bits32 => (word >> 28) as u8,
        };
        let opcode = match (mode, Opcode::try_from(opcode)) {
            (Mode::Bits16, Ok(opcode)) | (Mode::Bits32, Ok(opcode @ Opcode::Halt)) => opcode,
            (_, Ok(_)) => return Err(opcode),
            (_, Err(err)) => return Err(err.number),
        };

        Ok(Self {
            opcode,
            d: ((word >> 8) & 0xF) as u8,
            s: ((word >> 4) & 0xF) as u8,
            t: (word & 0xF) as u8,
            word,
        })
    }

    /// Builds a 16-bit instruction from its fields.
    pub fn new(opcode: Opcode, d: u8, s: u8, t: u8) -> Self {
        let word = (u8::from(opcode) as u32) << 12
            | ((d & 0xF) as u32) << 8
            | ((s & 0xF) as u32) << 4
            | (t & 0xF) as u32;

        Self {
            opcode,
            d: d & 0xF,
            s: s & 0xF,
            t: t & 0xF,
            word,
        }
    }

    /// Builds a 16-bit instruction with an address operand.
    pub fn with_address(opcode: Opcode, d: u8, address: u8) -> Self {
        Self::new(opcode, d, address >> 4, address & 0xF)
    }

    /// The 8-bit immediate / address operand
    pub fn address(&self) -> Address {
        ((self.s as Address) << 4) | self.t as Address
    }

    pub fn is_mode_switch(&self) -> bool {
        self.opcode == Opcode::Halt && self.word == MODE_SWITCH
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mode_switch() {
            return f.write_str("hlt (switch width)");
        }

        match self.opcode.format() {
            Format::Bare => write!(f, "{}", self.opcode),
            Format::R => write!(f, "{} R[{:X}]", self.opcode, self.d),
            Format::RR => write!(f, "{} R[{:X}], R[{:X}]", self.opcode, self.d, self.t),
            Format::RRR => write!(
                f,
                "{} R[{:X}], R[{:X}], R[{:X}]",
                self.opcode, self.d, self.s, self.t
            ),
            Format::RA => write!(f, "{} R[{:X}], {:02X}", self.opcode, self.d, self.address()),
        }
    }
}
