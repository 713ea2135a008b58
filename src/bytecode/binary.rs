/*!
  This module is responsible for the encoding and decoding of binary instructions.

  An instruction word is laid out as follows, least significant bit first:

  ```text
    [OpCode:8][Source:4][Destination:4][Deref:2][Immediate:1][Size:5][Unused:40]
  ```

  and is stored XOR-ed with `INSTRUCTION_MASK`. Immediate literals that follow an instruction
  are stored as plain words.
*/
use std::cmp::min;
use std::convert::TryFrom;

use super::{Operation, Instruction, DerefMode, OperandMetadata};
use crate::error::VMError;

// If you change this you must also change `encode_instruction` and `decode_instruction`.
pub type Word = u64;
pub const WORD_BYTES: usize = std::mem::size_of::<Word>();

/// Fixed mask applied to every instruction word. It only scrambles the format; it is not a key.
pub const INSTRUCTION_MASK: Word = 5432167890123456789;

/**
  A register selector as written at encode call sites: registers count from 1, and 0 means the
  operand is an immediate literal in the following program word.
*/
pub type Selector = u8;

const OPCODE_MASK      : Word = 0xFF;
const SOURCE_SHIFT     : u32  = 8;
const DESTINATION_SHIFT: u32  = 12;
const REGISTER_MASK    : Word = 0xF;
const DEREF_SHIFT      : u32  = 16;
const DEREF_MASK       : Word = 0x3;
const IMMEDIATE_SHIFT  : u32  = 18;
const SIZE_SHIFT       : u32  = 19;
const SIZE_MASK        : Word = 0x1F;

/**
  Packs an operation and its operands into a masked instruction word. `first` is the
  destination selector and `second` the source selector; both are decremented to 0-based
  indices. The immediate flag is set exactly when `second` is 0.
*/
pub fn encode_instruction(
    first     : Selector,
    second    : Selector,
    operation : Operation,
    metadata  : OperandMetadata
  ) -> Word
{
  let immediate   = second == 0;
  let destination = first.wrapping_sub(1);
  let source      = second.saturating_sub(1);
  let size        = min(metadata.size.max(1) as usize, WORD_BYTES) as Word;

  let word =
      ( operation.code()               as Word)
    | (((source      as Word) & REGISTER_MASK) << SOURCE_SHIFT)
    | (((destination as Word) & REGISTER_MASK) << DESTINATION_SHIFT)
    | (((metadata.deref.bits() as Word) & DEREF_MASK) << DEREF_SHIFT)
    | ((immediate    as Word) << IMMEDIATE_SHIFT)
    | ((size & SIZE_MASK) << SIZE_SHIFT);

  word ^ INSTRUCTION_MASK
}

/// Unmasks and unpacks an instruction word. The size field is clamped to between one byte and
/// the word size.
pub fn decode_instruction(word: Word) -> Result<Instruction, VMError> {
  let word = word ^ INSTRUCTION_MASK;

  let code   = (word & OPCODE_MASK) as u8;
  let opcode = Operation::try_from(code).map_err(|_| VMError::UnknownOpcode(code))?;
  let size   = ((word >> SIZE_SHIFT) & SIZE_MASK) as usize;

  Ok(Instruction {
    opcode,
    immediate   : (word >> IMMEDIATE_SHIFT) & 1 == 1,
    size        : min(size.max(1), WORD_BYTES) as u8,
    deref       : DerefMode::from_bits(((word >> DEREF_SHIFT) & DEREF_MASK) as u8),
    destination : ((word >> DESTINATION_SHIFT) & REGISTER_MASK) as u8,
    source      : ((word >> SOURCE_SHIFT) & REGISTER_MASK) as u8,
  })
}

/// Determines from an encoded word whether a literal word follows it, without checking the opcode.
pub fn is_double_word_instruction(word: Word) -> bool {
  ((word ^ INSTRUCTION_MASK) >> IMMEDIATE_SHIFT) & 1 == 1
}
