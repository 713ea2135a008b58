/*!

  The VM uses a 64 bit little-endian word size. Every instruction is one word; an instruction
  with an immediate operand is followed by one more word holding the literal, unencoded. The
  sizes of instruction components are as follows:

    Opcode:          8 bits
    Register index:  4 bits (two of them)
    Deref mode:      2 bits
    Immediate flag:  1 bit
    Operand size:    5 bits (1 to 8 bytes)

  As with the opcode enum, the instruction is not stored as a Rust enum carrying its operands.
  A decoded `Instruction` is a plain struct of the unpacked fields, and the program itself is
  just a slice of words, so that immediates can sit inline between instructions.

*/

mod binary;
mod instruction;
pub mod assembly;
pub mod builder;

pub use binary::{encode_instruction, decode_instruction, is_double_word_instruction,
                 Word, Selector, WORD_BYTES, INSTRUCTION_MASK};
pub use instruction::{Instruction, Operation, DerefMode, OperandKind, OperandMetadata};
pub use assembly::assemble;
