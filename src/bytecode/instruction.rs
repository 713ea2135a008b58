use std::cmp::min;
use std::fmt::{Display, Formatter};
use std::ops::BitOr;

use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};
use num_enum::{TryFromPrimitive, IntoPrimitive};

use super::binary::WORD_BYTES;

/**
  Opcodes of the virtual machine.

  The discriminants are the opcode bytes written into the low eight bits of an instruction
  word, so they are part of the binary format and must not be renumbered. Zero is not an
  opcode, which makes an all-zero unmasked word an `UnknownOpcode` rather than a silent `MOV`.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum Operation {
  // Data movement and arithmetic: destination, source //
  #[strum(to_string = "MOV")]  Mov  = 1,
  #[strum(to_string = "ADD")]  Add  = 2,
  #[strum(to_string = "SUB")]  Sub  = 3,
  #[strum(to_string = "AND")]  And  = 4,
  #[strum(to_string = "XOR")]  Xor  = 5,
  #[strum(to_string = "LEA")]  Lea  = 6,
  #[strum(to_string = "CMP")]  Cmp  = 7,

  // Control flow: source only //
  #[strum(to_string = "JNE")]  Jne  = 8,
  #[strum(to_string = "JMP")]  Jmp  = 9,
  #[strum(to_string = "CALL")] Call = 10,

  // Stack: one register, the other side is the top of the stack //
  #[strum(to_string = "PUSH")] Push = 11,
  #[strum(to_string = "POP")]  Pop  = 12,

  #[strum(to_string = "RET")]  Ret  = 13,
}

impl Operation {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /// The number of operands the operation takes in assembly.
  pub fn arity(&self) -> usize {
    match self {
      | Operation::Mov
      | Operation::Add
      | Operation::Sub
      | Operation::And
      | Operation::Xor
      | Operation::Lea
      | Operation::Cmp  => 2,

      | Operation::Jne
      | Operation::Jmp
      | Operation::Call
      | Operation::Push
      | Operation::Pop  => 1,

      Operation::Ret    => 0
    }
  }

  /// Whether the interpreter resolves a destination address for this operation.
  pub fn uses_destination(&self) -> bool {
    match self {
      | Operation::Jne
      | Operation::Jmp
      | Operation::Call
      | Operation::Ret => false,
      _                => true
    }
  }

  /// Whether the interpreter resolves a source address for this operation.
  pub fn uses_source(&self) -> bool {
    *self != Operation::Ret
  }

  pub fn is_jump(&self) -> bool {
    *self == Operation::Jmp || *self == Operation::Jne
  }
}

/**
  Selects which resolved operand addresses are read as pointers before use. The discriminants
  are the two-bit field of the instruction word.
*/
#[derive(TryFromPrimitive, IntoPrimitive, Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum DerefMode {
  None        = 0,
  Source      = 1,
  Destination = 2,
  Both        = 3,
}

impl DerefMode {
  /// Interprets the low two bits of `bits`.
  pub fn from_bits(bits: u8) -> DerefMode {
    match bits & 0x3 {
      0 => DerefMode::None,
      1 => DerefMode::Source,
      2 => DerefMode::Destination,
      _ => DerefMode::Both
    }
  }

  pub fn from_sides(source: bool, destination: bool) -> DerefMode {
    let bits = (source as u8) | ((destination as u8) << 1);
    DerefMode::from_bits(bits)
  }

  pub fn bits(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn dereferences_source(&self) -> bool {
    self.bits() & DerefMode::Source.bits() != 0
  }

  pub fn dereferences_destination(&self) -> bool {
    self.bits() & DerefMode::Destination.bits() != 0
  }
}

impl BitOr for DerefMode {
  type Output = DerefMode;

  fn bitor(self, rhs: DerefMode) -> DerefMode {
    DerefMode::from_bits(self.bits() | rhs.bits())
  }
}

/// Describes an operand at an encode call site: a value of some width in bytes, or a pointer to
/// a value of that width.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum OperandKind {
  Value(u8),
  Pointer(u8),
}

impl OperandKind {
  pub fn width(&self) -> u8 {
    match self {
      OperandKind::Value(width) | OperandKind::Pointer(width) => *width
    }
  }

  pub fn is_pointer(&self) -> bool {
    match self {
      OperandKind::Pointer(_) => true,
      OperandKind::Value(_)   => false
    }
  }
}

impl Default for OperandKind {
  /// A full machine word.
  fn default() -> Self {
    OperandKind::Value(WORD_BYTES as u8)
  }
}

/// The operand width and dereference mode carried by an instruction word.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct OperandMetadata {
  pub size  : u8,
  pub deref : DerefMode,
}

impl OperandMetadata {
  /// The size is clamped to between one byte and the machine word size.
  pub fn new(size: u8, deref: DerefMode) -> OperandMetadata {
    OperandMetadata {
      size: min(size.max(1), WORD_BYTES as u8),
      deref
    }
  }

  /**
    Derives the metadata from the kinds of the first operand and, optionally, a second one. The
    size is the width of the first kind. The dereference mode follows this table:

    | first   | second  | mode        |
    |---------|---------|-------------|
    | pointer | pointer | both        |
    | pointer | none    | source      |
    | pointer | value   | destination |
    | any     | pointer | source      |
    | value   | other   | none        |

    A lone pointer kind dereferences the source because unary operations other than `POP` act on
    their source.
  */
  pub fn from_kinds(first: OperandKind, second: Option<OperandKind>) -> OperandMetadata {
    let second_is_pointer = second.map_or(false, |kind| kind.is_pointer());
    let deref =
      match (first.is_pointer(), second) {
        (true, Some(_)) if second_is_pointer => DerefMode::Both,
        (true, None)                         => DerefMode::Source,
        (true, Some(_))                      => DerefMode::Destination,
        (false, _) if second_is_pointer      => DerefMode::Source,
        _                                    => DerefMode::None
      };

    OperandMetadata::new(first.width(), deref)
  }
}

impl Default for OperandMetadata {
  fn default() -> Self {
    OperandMetadata::from_kinds(OperandKind::default(), None)
  }
}

/**
  The decoded fields of an instruction word. Register indices are 0-based. For unary
  operations both indices hold the same register; for immediate instructions the source index
  is meaningless and the literal is the next program word.
*/
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct Instruction {
  pub opcode      : Operation,
  pub immediate   : bool,
  pub size        : u8,
  pub deref       : DerefMode,
  pub destination : u8,
  pub source      : u8,
}

impl Instruction {
  /// The number of program words the instruction occupies.
  pub fn length(&self) -> usize {
    match self.immediate {
      true  => 2,
      false => 1
    }
  }

  pub fn metadata(&self) -> OperandMetadata {
    OperandMetadata::new(self.size, self.deref)
  }

  fn fmt_operand(f: &mut Formatter<'_>, index: u8, immediate: bool, pointer: bool)
    -> std::fmt::Result
  {
    if pointer {
      write!(f, "*")?;
    }
    match (immediate, index) {
      (true, _) => write!(f, "IMM"),
      (_, 7)    => write!(f, "SP"),
      (_, i)    => write!(f, "R{}", i)
    }
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.opcode)?;
    if self.opcode == Operation::Ret {
      return Ok(());
    }
    if self.size as usize != WORD_BYTES {
      write!(f, ".{}", self.size)?;
    }
    write!(f, " ")?;

    match self.opcode {

      Operation::Pop => {
        Instruction::fmt_operand(f, self.destination, false, self.deref != DerefMode::None)
      }

      op if op.arity() == 1 => {
        Instruction::fmt_operand(f, self.source, self.immediate, self.deref.dereferences_source())
      }

      _ => {
        Instruction::fmt_operand(f, self.destination, false, self.deref.dereferences_destination())?;
        write!(f, ", ")?;
        Instruction::fmt_operand(f, self.source, self.immediate, self.deref.dereferences_source())
      }

    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::convert::TryFrom;
  use std::str::FromStr;

  #[test]
  fn opcode_round_trips_through_text_and_byte() {
    let op = Operation::from_str("CALL").unwrap();
    assert_eq!(op, Operation::Call);
    assert_eq!(op.to_string(), "CALL");
    assert_eq!(Operation::try_from(op.code()).unwrap(), Operation::Call);
    assert!(Operation::try_from(0u8).is_err());
    assert!(Operation::try_from(14u8).is_err());
  }

  #[test]
  fn arity_and_operand_use() {
    assert_eq!(Operation::Cmp.arity(), 2);
    assert_eq!(Operation::Pop.arity(), 1);
    assert_eq!(Operation::Ret.arity(), 0);
    assert!(Operation::Push.uses_destination());
    assert!(!Operation::Jmp.uses_destination());
    assert!(Operation::Jmp.uses_source());
    assert!(!Operation::Ret.uses_source());
  }

  #[test]
  fn deref_mode_sides() {
    assert_eq!(DerefMode::from_sides(true, true), DerefMode::Both);
    assert_eq!(DerefMode::Source | DerefMode::Destination, DerefMode::Both);
    assert!(DerefMode::Both.dereferences_source());
    assert!(DerefMode::Destination.dereferences_destination());
    assert!(!DerefMode::Destination.dereferences_source());
    assert_eq!(DerefMode::from_bits(0b110), DerefMode::Destination);
  }

  #[test]
  fn metadata_from_kinds() {
    use OperandKind::*;

    let meta = |first, second| OperandMetadata::from_kinds(first, second).deref;
    assert_eq!(meta(Pointer(8), Some(Pointer(8))), DerefMode::Both);
    assert_eq!(meta(Pointer(8), None),             DerefMode::Source);
    assert_eq!(meta(Pointer(8), Some(Value(8))),   DerefMode::Destination);
    assert_eq!(meta(Value(8),   Some(Pointer(4))), DerefMode::Source);
    assert_eq!(meta(Value(8),   Some(Value(8))),   DerefMode::None);
    assert_eq!(meta(Value(2),   None),             DerefMode::None);

    assert_eq!(OperandMetadata::from_kinds(Value(2), None).size, 2);
    assert_eq!(OperandMetadata::from_kinds(Pointer(16), None).size, 8);
    assert_eq!(OperandMetadata::from_kinds(Value(0), None).size, 1);
    assert_eq!(OperandMetadata::default(), OperandMetadata::new(8, DerefMode::None));
  }

  #[test]
  fn display_in_assembly_syntax() {
    let mov = Instruction {
      opcode: Operation::Mov,
      immediate: false,
      size: 4,
      deref: DerefMode::Source,
      destination: 1,
      source: 7,
    };
    assert_eq!(mov.to_string(), "MOV.4 R1, *SP");

    let push = Instruction { opcode: Operation::Push, immediate: true, size: 8, ..mov };
    assert_eq!(push.to_string(), "PUSH *IMM");

    let pop = Instruction {
      opcode: Operation::Pop, immediate: false, size: 8, deref: DerefMode::None,
      destination: 2, source: 2
    };
    assert_eq!(pop.to_string(), "POP R2");
    let pointer_pop = Instruction { deref: DerefMode::Source, ..pop };
    assert_eq!(pointer_pop.to_string(), "POP *R2");
    assert_eq!(Instruction { opcode: Operation::Ret, ..pop }.to_string(), "RET");
  }
}
