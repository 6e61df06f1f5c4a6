use std::{error, fmt, io};

use crate::console::{self, Console};
use crate::memory::{Address, Memory, Mode, Word};
use crate::trace;
use color_eyre::eyre::{Result, WrapErr};
use log::*;

pub mod decode;

use decode::{Instruction, Opcode};

/// The first instruction is fetched from here
pub const ENTRYPOINT: Address = 0x10;
pub const REGISTER_COUNT: usize = 16;
/// Halt word that switches word width instead of halting
pub const MODE_SWITCH: u32 = 0x0FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecErrorKind {
    InvalidOpcode { opcode: u8, word: u32 },
    InvalidRegister { index: usize },
    AddressOutOfRange { address: usize },
    /// Operator input ended while the console cell was being read
    InputClosed,
    Console,
}

impl fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecErrorKind::InvalidOpcode { opcode, word } => {
                write!(f, "invalid opcode `0x{:X}` in word `0x{:X}`", opcode, word)
            }
            ExecErrorKind::InvalidRegister { index } => {
                write!(f, "invalid cpu register `R[{}]` accessed", index)
            }
            ExecErrorKind::AddressOutOfRange { address } => {
                write!(f, "memory has no address `0x{:X}`", address)
            }
            ExecErrorKind::InputClosed => f.write_str("console input closed"),
            ExecErrorKind::Console => f.write_str("console failure"),
        }
    }
}

/// A fatal execution error. The processor is left as it was when the error
/// occurred.
#[derive(Debug)]
pub struct ExecError {
    kind: ExecErrorKind,
    mode: Mode,
    pc: Address,
    source: Option<io::Error>,
}

impl ExecError {
    pub fn kind(&self) -> ExecErrorKind {
        self.kind
    }

    /// Program counter of the failing instruction
    pub fn pc(&self) -> Address {
        self.pc
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error [pc: {:0w$X}, {}]: {}",
            self.pc,
            self.mode,
            self.kind,
            w = self.mode.address_digits()
        )
    }
}

impl error::Error for ExecError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &(dyn error::Error + 'static))
    }
}

/// Registers and addresses touched during the current cycle.
///
/// Only used for highlighting in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Access {
    /// First source register
    pub first_read: Option<usize>,
    /// Second source register
    pub second_read: Option<usize>,
    /// Destination register, never register 0
    pub written: Option<usize>,
    pub memory_read: Option<Address>,
    /// Last written address, never the console cell
    pub memory_written: Option<Address>,
}

/// Run loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Render the trace after every cycle
    pub trace: bool,
    /// Wait for the operator after every cycle
    pub single_step: bool,
    /// Cells shown on each side of a memory window
    pub window: u16,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            trace: true,
            single_step: false,
            window: trace::DEFAULT_WINDOW,
        }
    }
}

/// Emulates the CPU of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Processor {
    /// Active word width
    pub mode: Mode,
    /// Program counter
    pub pc: Address,
    /// Program counter before its last write
    pub old_pc: Address,
    /// Set when the current instruction wrote the program counter
    pub pc_modified: bool,
    /// Termination flag
    pub halted: bool,
    /// Register 0 reads as zero after every cycle
    pub registers: [Word; REGISTER_COUNT],
    pub access: Access,
}

impl Default for Processor {
    /// Initializes a new CPU
    fn default() -> Self {
        Self::new(ENTRYPOINT)
    }
}

impl Processor {
    /// Initializes a new 16-bit CPU
    /// @param entrypoint The start of the program
    pub fn new(entrypoint: Address) -> Self {
        Self {
            mode: Mode::Bits16,
            pc: entrypoint,
            old_pc: entrypoint,
            pc_modified: false,
            halted: false,
            registers: [0; REGISTER_COUNT],
            access: Access::default(),
        }
    }

    fn error(&self, kind: ExecErrorKind) -> ExecError {
        ExecError {
            kind,
            mode: self.mode,
            pc: self.pc,
            source: None,
        }
    }

    fn console_error(&self, err: io::Error) -> ExecError {
        let kind = if err.kind() == io::ErrorKind::UnexpectedEof {
            ExecErrorKind::InputClosed
        } else {
            ExecErrorKind::Console
        };

        ExecError {
            source: Some(err),
            ..self.error(kind)
        }
    }

    /// Reads a register. `second` marks the second source operand.
    pub fn read_register(&mut self, index: usize, second: bool) -> Result<Word, ExecError> {
        if index >= REGISTER_COUNT {
            return Err(self.error(ExecErrorKind::InvalidRegister { index }));
        }

        if second {
            self.access.second_read = Some(index);
        } else {
            self.access.first_read = Some(index);
        }

        Ok(self.registers[index])
    }

    /// Writes a register, truncated to the active width. Writes to register
    /// 0 are allowed but not highlighted.
    pub fn write_register(&mut self, index: usize, value: Word) -> Result<(), ExecError> {
        if index >= REGISTER_COUNT {
            return Err(self.error(ExecErrorKind::InvalidRegister { index }));
        }

        if index != 0 {
            self.access.written = Some(index);
        }
        self.registers[index] = self.mode.narrow(value);

        Ok(())
    }

    /// Reads a memory cell, asking the operator first if it is the console
    /// cell.
    pub fn read_memory<C: Console>(
        &mut self,
        memory: &mut Memory,
        console: &mut C,
        address: Address,
    ) -> Result<Word, ExecError> {
        let mode = self.mode;
        console::before_read(console, memory, mode, address)
            .map_err(|err| self.console_error(err))?;

        let value = memory.read(mode, address).map_err(|err| {
            self.error(ExecErrorKind::AddressOutOfRange {
                address: err.address,
            })
        })?;
        self.access.memory_read = Some(address);

        Ok(value)
    }

    /// Writes a memory cell, echoing it if it is the console cell.
    pub fn write_memory<C: Console>(
        &mut self,
        memory: &mut Memory,
        console: &mut C,
        address: Address,
        value: Word,
    ) -> Result<(), ExecError> {
        let mode = self.mode;
        memory.write(mode, address, value).map_err(|err| {
            self.error(ExecErrorKind::AddressOutOfRange {
                address: err.address,
            })
        })?;

        // The echo already shows console writes
        if address != mode.io_address() {
            self.access.memory_written = Some(address);
        }

        console::after_write(console, memory, mode, address).map_err(|err| self.console_error(err))
    }

    /// Moves the program counter. An explicit write during an instruction
    /// suppresses the increment at the end of the cycle.
    pub fn write_pc(&mut self, target: Address, cycle_increment: bool) {
        if self.halted || (self.pc_modified && cycle_increment) {
            return;
        }

        self.old_pc = self.pc;
        self.pc = target;
        self.pc_modified |= !cycle_increment;
    }

    /// Executes a single instruction
    pub fn execute_instruction<C: Console>(
        &mut self,
        instruction: Instruction,
        memory: &mut Memory,
        console: &mut C,
    ) -> Result<(), ExecError> {
        let d = instruction.d as usize;
        let t = instruction.t as usize;
        let address = instruction.address();

        match instruction.opcode {
            Opcode::Halt if instruction.is_mode_switch() => {
                self.mode = self.mode.toggled();
                // The same PC now indexes the other view
                let pc = self.mode.wrap_address(self.pc as Word);
                self.write_pc(pc, false);

                info!("Switched to {} mode at PC 0x{:X}", self.mode, pc);
            }
            Opcode::Halt => {
                self.halted = true; // set termination flag

                info!("Halted at PC 0x{:X}", self.pc);
            }
            Opcode::Add => self.arithmetic(&instruction, Word::wrapping_add)?,
            Opcode::Sub => self.arithmetic(&instruction, Word::wrapping_sub)?,
            Opcode::And => self.arithmetic(&instruction, |a, b| a & b)?,
            Opcode::Xor => self.arithmetic(&instruction, |a, b| a ^ b)?,
            Opcode::ShiftLeft => {
                self.arithmetic(&instruction, |a, b| a.wrapping_shl(b as u32))?
            }
            Opcode::ShiftRight => {
                self.arithmetic(&instruction, |a, b| a.wrapping_shr(b as u32))?
            }
            Opcode::LoadAddress => {
                self.write_register(d, address as Word)?;

                debug!("  R[{:X}] <- {:02X}", d, address);
            }
            Opcode::Load => {
                let value = self.read_memory(memory, console, address)?;
                self.write_register(d, value)?;

                debug!("  R[{:X}] <- M[{:02X}]: {}", d, address, value);
            }
            Opcode::Store => {
                let value = self.read_register(d, false)?;
                self.write_memory(memory, console, address, value)?;

                debug!("  M[{:02X}] <- R[{:X}]: {}", address, d, value);
            }
            Opcode::LoadIndirect => {
                let target = self.read_register(t, false)?;
                let target = self.mode.wrap_address(target);
                let value = self.read_memory(memory, console, target)?;
                self.write_register(d, value)?;

                debug!("  R[{:X}] <- M[{:02X}]: {}", d, target, value);
            }
            Opcode::StoreIndirect => {
                let value = self.read_register(d, false)?;
                let target = self.read_register(t, true)?;
                let target = self.mode.wrap_address(target);
                self.write_memory(memory, console, target, value)?;

                debug!("  M[{:02X}] <- R[{:X}]: {}", target, d, value);
            }
            Opcode::BranchZero => {
                let value = self.read_register(d, false)?;
                if value == 0 {
                    self.write_pc(address, false);
                }

                debug!("  R[{:X}] == 0: {}", d, value == 0);
            }
            Opcode::BranchPositive => {
                let value = self.read_register(d, false)?;
                if value > 0 {
                    self.write_pc(address, false);
                }

                debug!("  R[{:X}] > 0: {}", d, value > 0);
            }
            Opcode::Jump => {
                let target = self.read_register(d, false)?;
                let target = self.mode.wrap_address(target);
                self.write_pc(target, false);
            }
            Opcode::Call => {
                let link = self.pc as Word + 1;
                self.write_register(d, link)?;
                self.write_pc(address, false);
            }
        }

        Ok(())
    }

    /// `R[d] <- op(R[s], R[t])` on sign-extended values, truncated on write
    fn arithmetic<F>(&mut self, instruction: &Instruction, op: F) -> Result<(), ExecError>
    where
        F: Fn(Word, Word) -> Word,
    {
        let a = self.read_register(instruction.s as usize, false)?;
        let b = self.read_register(instruction.t as usize, true)?;
        let result = op(a, b);
        self.write_register(instruction.d as usize, result)?;

        debug!(
            "  {} {}: {}",
            a,
            b,
            self.registers[instruction.d as usize]
        );

        Ok(())
    }

    /// Advances the program counter unless it was written, and resets
    /// register 0.
    fn end_cycle(&mut self) {
        let next = self.mode.wrap_address(self.pc as Word + 1);
        self.write_pc(next, true);
        self.registers[0] = 0;
    }

    /// Runs one fetch, decode, execute cycle. Does nothing once halted.
    pub fn step<C: Console>(&mut self, memory: &mut Memory, console: &mut C) -> Result<(), ExecError> {
        if self.halted {
            return Ok(());
        }

        self.access = Access::default();
        self.pc_modified = false;

        let word = memory.read(self.mode, self.pc).map_err(|err| {
            self.error(ExecErrorKind::AddressOutOfRange {
                address: err.address,
            })
        })?;
        let word = self.mode.unsigned(word);
        let instruction = Instruction::decode(self.mode, word)
            .map_err(|opcode| self.error(ExecErrorKind::InvalidOpcode { opcode, word }))?;

        debug!(
            "{:0w$X}: {}",
            self.pc,
            instruction,
            w = self.mode.address_digits()
        );

        self.execute_instruction(instruction, memory, console)?;
        self.end_cycle();

        Ok(())
    }

    /// Run program until the machine halts, rendering the trace after every
    /// cycle if enabled.
    pub fn execute_until_halt<C: Console>(
        &mut self,
        memory: &mut Memory,
        console: &mut C,
        options: &RunOptions,
    ) -> Result<()> {
        while !self.halted {
            self.step(memory, console)
                .wrap_err("execution stopped")?;

            if options.trace {
                trace::render_cycle(console, self, memory, options.window)
                    .wrap_err("failed to render trace")?;
            }

            if options.single_step {
                console
                    .wait_for_continue()
                    .wrap_err("failed to wait for the operator")?;
            }
        }

        info!("Program terminated at PC 0x{:X}", self.pc);

        Ok(())
    }
}
