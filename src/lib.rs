//! Emulator for the TOY teaching machine.
//!
//! A [`memory::Memory`] image is loaded from `AA:DDDD` text, then a
//! [`processor::Processor`] runs it cycle by cycle. The machine starts with
//! 16-bit words and can switch to 32-bit words over the same memory.

pub mod console;
pub mod memory;
pub mod processor;
pub mod trace;
