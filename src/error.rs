//! Error types for execution, native function registration, and assembly.

use thiserror::Error;

use crate::bytecode::{Operation, Word};

/// Errors that halt execution. The failing access itself never takes effect.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum VMError {
  /// The opcode byte of a fetched word names no operation.
  #[error("unknown opcode {0:#04x}")]
  UnknownOpcode(u8),

  /// A register operand index lies outside the register file.
  #[error("register index {0} is outside the register file")]
  InvalidRegister(u8),

  /// A push would move the stack pointer below the base of the stack.
  #[error("stack overflow: cannot push {size} bytes with SP = {stack_pointer:#x}")]
  StackOverflow { stack_pointer: Word, size: u8 },

  /// A pop would move the stack pointer past the end of the stack.
  #[error("stack underflow: cannot pop {size} bytes with SP = {stack_pointer:#x}")]
  StackUnderflow { stack_pointer: Word, size: u8 },

  /// A jump target lies past the end of the program.
  #[error("jump target {target} is outside the program of {length} words")]
  OutOfBoundsJump { target: Word, length: usize },

  /// An access of `length` bytes at `address` is not contained in any memory region.
  #[error("address {address:#x} does not hold {length} bytes of machine memory")]
  InvalidDereference { address: Word, length: usize },

  /// A write targeted program memory.
  #[error("address {0:#x} is in read-only program memory")]
  ReadOnlyWrite(Word),

  /// CALL was given a value that is not the handle of a registered native function.
  #[error("no native function is registered at {0:#x}")]
  UnknownNativeFunction(Word),
}

/// Errors from `NativeTable::register`.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum RegistrationError {
  #[error("a native function named `{0}` is already registered")]
  Duplicate(String),

  #[error("native function `{name}` declares {arity} arguments, at most {max} are supported")]
  InvalidArity { name: String, arity: usize, max: usize },
}

/// Errors from the assembler. Line numbers count from 1.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum AssemblyError {
  #[error("error on line {line}: cannot parse `{text}`")]
  Syntax { line: usize, text: String },

  #[error("error on line {line}: {name} is not an operation")]
  NotAnOperation { line: usize, name: String },

  #[error("error on line {line}: {operation} requires {expected} operands but was given {found}")]
  WrongArity { line: usize, operation: Operation, expected: usize, found: usize },

  #[error("error on line {line}: operand width {width} is not between 1 and 8")]
  InvalidWidth { line: usize, width: String },

  #[error("error on line {line}: {operation} cannot write to an immediate operand")]
  ImmediateDestination { line: usize, operation: Operation },

  #[error("error on line {line}: label `{label}` is not defined")]
  UndefinedLabel { line: usize, label: String },

  #[error("error on line {line}: label `{label}` is already defined")]
  DuplicateLabel { line: usize, label: String },

  #[error("error on line {line}: no native function named `{name}` is registered")]
  UnknownNative { line: usize, name: String },
}
