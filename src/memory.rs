//! Register file, stack, and the byte-addressed view over them and program memory.

use std::cmp::min;
use std::fmt::{Display, Formatter};
use std::ops::Range;

use prettytable::{format as TableFormat, Table};

use crate::address::{Address, MAX_STACK_SIZE, PROGRAM_BASE, STACK_BASE};
use crate::bytecode::{Word, WORD_BYTES};
use crate::error::VMError;

pub const REGISTER_COUNT     : usize = 8;
/// R0 receives the return value of `CALL`.
pub const ACCUMULATOR        : usize = 0;
/// R1 through R6 carry `CALL` arguments, in order.
pub const ARGUMENT_REGISTERS : usize = 6;
pub const STACK_POINTER      : usize = REGISTER_COUNT - 1;

pub const REGISTER_NAMES: [&str; REGISTER_COUNT] = ["R0", "R1", "R2", "R3", "R4", "R5", "R6", "SP"];

const REGISTER_FILE_BYTES: usize = REGISTER_COUNT * WORD_BYTES;

// region Display helpers

lazy_static! {
  pub(crate) static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

/// Builds a two column table of labelled words, marking the row at `highlight`.
pub(crate) fn make_word_table(rows: &[(String, Word)], highlight: Option<usize>) -> Table {
  let mut table = Table::new();

  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(row![ubr->"Location", ubl->"Contents"]);

  for (i, (label, value)) in rows.iter().enumerate() {
    match Some(i) == highlight {

      true  => {
        table.add_row(row![r->format!("* --> {} =", label), format!("{:#x}", value)]);
      }

      false => {
        table.add_row(row![r->format!("{} =", label), format!("{:#x}", value)]);
      }

    }
  }
  table
}

// endregion

/**
  The register file is kept as a little-endian byte image, so that a copy of fewer than eight
  bytes into or out of a register touches its low-order bytes, and a byte address may point
  into the middle of a register.
*/
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RegisterFile {
  bytes: [u8; REGISTER_FILE_BYTES],
}

impl RegisterFile {
  pub fn new() -> RegisterFile {
    RegisterFile {
      bytes: [0; REGISTER_FILE_BYTES]
    }
  }

  /// Panics if `index` is not less than `REGISTER_COUNT`.
  pub fn get(&self, index: usize) -> Word {
    let mut word = [0u8; WORD_BYTES];
    word.copy_from_slice(&self.bytes[index * WORD_BYTES..(index + 1) * WORD_BYTES]);
    Word::from_le_bytes(word)
  }

  /// Panics if `index` is not less than `REGISTER_COUNT`.
  pub fn set(&mut self, index: usize, value: Word) {
    self.bytes[index * WORD_BYTES..(index + 1) * WORD_BYTES].copy_from_slice(&value.to_le_bytes());
  }

  pub fn stack_pointer(&self) -> Word {
    self.get(STACK_POINTER)
  }

  pub fn set_stack_pointer(&mut self, value: Word) {
    self.set(STACK_POINTER, value)
  }

  /// The values of all registers, R0 first and SP last.
  pub fn values(&self) -> Vec<Word> {
    (0..REGISTER_COUNT).map(|index| self.get(index)).collect()
  }

  fn rows(&self) -> Vec<(String, Word)> {
    REGISTER_NAMES.iter()
                  .zip(self.values())
                  .map(|(name, value)| (name.to_string(), value))
                  .collect()
  }

  pub(crate) fn make_table(&self) -> Table {
    make_word_table(&self.rows(), None)
  }
}

impl Default for RegisterFile {
  fn default() -> Self {
    RegisterFile::new()
  }
}

/// The debug dump: one `NAME: 0x...` line per register, R0 through R6 and then SP.
impl Display for RegisterFile {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for (name, value) in self.rows() {
      writeln!(f, "{}: {:#x}", name, value)?;
    }
    Ok(())
  }
}

/// A fixed-size stack growing downward from `STACK_BASE + len`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Stack {
  bytes: Vec<u8>,
}

impl Stack {
  pub fn new(size: usize) -> Stack {
    Stack {
      bytes: vec![0; size]
    }
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  pub fn base(&self) -> Word {
    STACK_BASE
  }

  /// One past the last byte, the initial stack pointer.
  pub fn end(&self) -> Word {
    STACK_BASE + self.bytes.len() as Word
  }

  /// The whole words between `stack_pointer` and the end of the stack, top first.
  pub fn live_words(&self, stack_pointer: Word) -> Vec<(Word, Word)> {
    let mut words = Vec::new();
    let mut address = stack_pointer;
    while address >= self.base()
      && address.checked_add(WORD_BYTES as Word).map_or(false, |end| end <= self.end())
    {
      let offset = (address - self.base()) as usize;
      let mut word = [0u8; WORD_BYTES];
      word.copy_from_slice(&self.bytes[offset..offset + WORD_BYTES]);
      words.push((address, Word::from_le_bytes(word)));
      address += WORD_BYTES as Word;
    }
    words
  }
}

/// Byte-addressed access to the registers, the stack, and the read-only program words.
#[derive(Clone, Debug)]
pub struct Memory {
  pub registers : RegisterFile,
  pub stack     : Stack,
  code          : Vec<Word>,
}

impl Memory {
  /// The stack is at most `MAX_STACK_SIZE` bytes, so it never reaches program memory.
  pub fn new(stack_size: usize) -> Memory {
    let mut memory = Memory {
      registers : RegisterFile::new(),
      stack     : Stack::new(min(stack_size, MAX_STACK_SIZE)),
      code      : vec![],
    };
    memory.registers.set_stack_pointer(memory.stack.end());
    memory
  }

  /// Replaces the program and resets registers and stack.
  pub fn load(&mut self, code: &[Word]) {
    self.registers = RegisterFile::new();
    self.stack     = Stack::new(self.stack.len());
    self.code      = code.to_vec();
    self.registers.set_stack_pointer(self.stack.end());
  }

  pub fn code(&self) -> &[Word] {
    &self.code
  }

  /// The byte range `offset..offset + length` if it lies within `extent` bytes.
  fn span(offset: usize, length: usize, extent: usize) -> Option<Range<usize>> {
    let end = offset.checked_add(length)?;
    match end <= extent {
      true  => Some(offset..end),
      false => None
    }
  }

  pub fn read_bytes(&self, address: Word, buffer: &mut [u8]) -> Result<(), VMError> {
    let length  = buffer.len();
    let invalid = || VMError::InvalidDereference { address, length };

    match Address::from_word(address).ok_or_else(invalid)? {

      Address::Register(offset) => {
        let range = Memory::span(offset, length, REGISTER_FILE_BYTES).ok_or_else(invalid)?;
        buffer.copy_from_slice(&self.registers.bytes[range]);
      }

      Address::Stack(offset) => {
        let range = Memory::span(offset, length, self.stack.len()).ok_or_else(invalid)?;
        buffer.copy_from_slice(&self.stack.bytes[range]);
      }

      Address::Program(offset) => {
        let extent = self.code.len() * WORD_BYTES;
        let range  = Memory::span(offset, length, extent).ok_or_else(invalid)?;
        for (byte, position) in buffer.iter_mut().zip(range) {
          *byte = self.code[position / WORD_BYTES].to_le_bytes()[position % WORD_BYTES];
        }
      }

    }
    Ok(())
  }

  pub fn write_bytes(&mut self, address: Word, bytes: &[u8]) -> Result<(), VMError> {
    let length  = bytes.len();
    let invalid = || VMError::InvalidDereference { address, length };

    match Address::from_word(address).ok_or_else(invalid)? {

      Address::Register(offset) => {
        let range = Memory::span(offset, length, REGISTER_FILE_BYTES).ok_or_else(invalid)?;
        self.registers.bytes[range].copy_from_slice(bytes);
      }

      Address::Stack(offset) => {
        let range = Memory::span(offset, length, self.stack.len()).ok_or_else(invalid)?;
        self.stack.bytes[range].copy_from_slice(bytes);
      }

      Address::Program(_) => {
        return Err(VMError::ReadOnlyWrite(address));
      }

    }
    Ok(())
  }

  pub fn read_word(&self, address: Word) -> Result<Word, VMError> {
    let mut word = [0u8; WORD_BYTES];
    self.read_bytes(address, &mut word)?;
    Ok(Word::from_le_bytes(word))
  }

  pub fn write_word(&mut self, address: Word, value: Word) -> Result<(), VMError> {
    self.write_bytes(address, &value.to_le_bytes())
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::address::REGISTER_BASE;

  #[test]
  fn registers_are_little_endian() {
    let mut memory = Memory::new(64);
    memory.registers.set(1, 0x1122_3344_5566_7788);

    let mut low = [0u8; 2];
    memory.read_bytes(Address::register(1).to_word(), &mut low).unwrap();
    assert_eq!(low, [0x88, 0x77]);

    memory.write_bytes(Address::register(1).to_word(), &[0xAA]).unwrap();
    assert_eq!(memory.registers.get(1), 0x1122_3344_5566_77AA);
  }

  #[test]
  fn stack_pointer_starts_past_the_end() {
    let memory = Memory::new(1024);
    assert_eq!(memory.registers.stack_pointer(), STACK_BASE + 1024);
    assert_eq!(memory.stack.end(), STACK_BASE + 1024);
  }

  #[test]
  fn stack_stops_short_of_program_memory() {
    let memory = Memory::new(usize::max_value());
    assert_eq!(memory.stack.len(), MAX_STACK_SIZE);
    assert_eq!(memory.stack.end(), PROGRAM_BASE);
  }

  #[test]
  fn stack_words() {
    let mut memory = Memory::new(32);
    let top = memory.stack.end() - 8;
    memory.write_word(top, 42).unwrap();

    assert_eq!(memory.read_word(top).unwrap(), 42);
    assert_eq!(memory.stack.live_words(top), vec![(top, 42)]);

    // Straddling the end of the stack.
    assert_eq!(
      memory.read_word(top + 4),
      Err(VMError::InvalidDereference { address: top + 4, length: 8 })
    );
  }

  #[test]
  fn program_is_read_only() {
    let mut memory = Memory::new(32);
    memory.load(&[0x0102, 7]);

    assert_eq!(memory.read_word(PROGRAM_BASE + 8).unwrap(), 7);
    let mut byte = [0u8; 1];
    memory.read_bytes(PROGRAM_BASE + 1, &mut byte).unwrap();
    assert_eq!(byte, [0x01]);

    assert_eq!(memory.write_word(PROGRAM_BASE, 1), Err(VMError::ReadOnlyWrite(PROGRAM_BASE)));
    assert!(memory.read_word(PROGRAM_BASE + 16).is_err());
  }

  #[test]
  fn unmapped_addresses() {
    let memory = Memory::new(32);
    assert_eq!(memory.read_word(0), Err(VMError::InvalidDereference { address: 0, length: 8 }));
    // Past the last register.
    let past = REGISTER_BASE + (REGISTER_COUNT * WORD_BYTES) as Word;
    assert!(memory.read_word(past).is_err());
  }

  #[test]
  fn register_dump_is_one_line_per_register() {
    let mut registers = RegisterFile::new();
    registers.set(ACCUMULATOR, 0xff);
    registers.set_stack_pointer(0x10400);
    let dump = registers.to_string();
    let lines: Vec<&str> = dump.lines().collect();

    assert_eq!(lines.len(), REGISTER_COUNT);
    assert_eq!(lines[0], "R0: 0xff");
    assert_eq!(lines[1], "R1: 0x0");
    assert_eq!(lines[7], "SP: 0x10400");
  }

  #[test]
  fn register_table_lists_every_register() {
    let table = RegisterFile::new().make_table().to_string();

    for name in REGISTER_NAMES.iter() {
      assert!(table.contains(&format!("{} =", name)));
    }
  }
}
