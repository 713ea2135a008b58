/*!
  One encoding function per opcode, for building programs directly in Rust.

  ```ignore
  let program = vec![
    mov(R1, IMM), 5,
    mov(R2, IMM), 5,
    cmp(R1, R2),
    jne(IMM), 9,
    mov(R0, IMM), 1,
  ];
  ```

  Each function has an `_as` twin that takes operand kinds, from which the operand size and
  dereference mode are derived (see `OperandMetadata::from_kinds`). The plain functions use a
  full-word value operand.
*/

use super::{encode_instruction, Operation, OperandKind, OperandMetadata, Selector, Word};

pub const IMM : Selector = 0;
pub const R0  : Selector = 1;
pub const R1  : Selector = 2;
pub const R2  : Selector = 3;
pub const R3  : Selector = 4;
pub const R4  : Selector = 5;
pub const R5  : Selector = 6;
pub const R6  : Selector = 7;
pub const SP  : Selector = 8;

macro_rules! binary_instruction {
  ($name:ident, $typed:ident, $operation:expr) => {
    pub fn $name(first: Selector, second: Selector) -> Word {
      encode_instruction(first, second, $operation, OperandMetadata::default())
    }

    pub fn $typed(first: Selector, second: Selector, kind: OperandKind, other: Option<OperandKind>)
      -> Word
    {
      encode_instruction(first, second, $operation, OperandMetadata::from_kinds(kind, other))
    }
  };
}

// Unary instructions repeat their one selector in both fields.
macro_rules! unary_instruction {
  ($name:ident, $typed:ident, $operation:expr) => {
    pub fn $name(selector: Selector) -> Word {
      encode_instruction(selector, selector, $operation, OperandMetadata::default())
    }

    pub fn $typed(selector: Selector, kind: OperandKind) -> Word {
      encode_instruction(selector, selector, $operation, OperandMetadata::from_kinds(kind, None))
    }
  };
}

binary_instruction!(mov, mov_as, Operation::Mov);
binary_instruction!(add, add_as, Operation::Add);
binary_instruction!(sub, sub_as, Operation::Sub);
binary_instruction!(and, and_as, Operation::And);
binary_instruction!(xor, xor_as, Operation::Xor);
binary_instruction!(lea, lea_as, Operation::Lea);
binary_instruction!(cmp, cmp_as, Operation::Cmp);

unary_instruction!(jmp,  jmp_as,  Operation::Jmp);
unary_instruction!(jne,  jne_as,  Operation::Jne);
unary_instruction!(call, call_as, Operation::Call);
unary_instruction!(push, push_as, Operation::Push);
unary_instruction!(pop,  pop_as,  Operation::Pop);

/// `RET` takes no operands. It is encoded with register selectors so that it never claims a
/// literal word.
pub fn ret() -> Word {
  encode_instruction(R0, R0, Operation::Ret, OperandMetadata::default())
}
