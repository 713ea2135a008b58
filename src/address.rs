//! The machine's flat address space. An `Address` names a byte in one of three regions,
//! the register file, the stack, or program memory, and converts to and from the `Word`
//! values that programs manipulate through `LEA` and dereferencing.

use std::fmt::{Display, Formatter};

use crate::bytecode::{Word, WORD_BYTES};

pub const REGISTER_BASE : Word = 0x1000;
pub const STACK_BASE    : Word = 0x1_0000;
pub const PROGRAM_BASE  : Word = 0x10_0000;
pub const PROGRAM_LIMIT : Word = 0x1000_0000;

/// The largest stack that fits between the stack base and program memory.
pub const MAX_STACK_SIZE: usize = (PROGRAM_BASE - STACK_BASE) as usize;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Address {
  /// A byte offset into the register file.
  Register(usize),
  /// A byte offset into the stack buffer.
  Stack(usize),
  /// A byte offset into program memory.
  Program(usize),
}

impl Address {
  /// The address of the first byte of the register with 0-based index `index`.
  pub fn register(index: usize) -> Address {
    Address::Register(index * WORD_BYTES)
  }

  /// The address of the program word at `slot`.
  pub fn program_slot(slot: usize) -> Address {
    Address::Program(slot * WORD_BYTES)
  }

  /// Classifies a word by region. Whether the offset lies inside the region's current extent is
  /// checked on access, since the stack and program sizes are only known to the machine.
  pub fn from_word(word: Word) -> Option<Address> {
    match word {
      w if w >= REGISTER_BASE && w < STACK_BASE    => Some(Address::Register((w - REGISTER_BASE) as usize)),
      w if w >= STACK_BASE    && w < PROGRAM_BASE  => Some(Address::Stack((w - STACK_BASE) as usize)),
      w if w >= PROGRAM_BASE  && w < PROGRAM_LIMIT => Some(Address::Program((w - PROGRAM_BASE) as usize)),
      _                                            => None
    }
  }

  pub fn to_word(&self) -> Word {
    match self {
      Address::Register(offset) => REGISTER_BASE + *offset as Word,
      Address::Stack(offset)    => STACK_BASE    + *offset as Word,
      Address::Program(offset)  => PROGRAM_BASE  + *offset as Word,
    }
  }

  pub fn offset(&self) -> usize {
    match self {
      | Address::Register(offset)
      | Address::Stack(offset)
      | Address::Program(offset) => *offset
    }
  }
}

impl Display for Address {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Address::Register(offset) => write!(f, "REG[{:#x}]", offset),
      Address::Stack(offset)    => write!(f, "STACK[{:#x}]", offset),
      Address::Program(offset)  => write!(f, "CODE[{:#x}]", offset),
    }
  }
}
