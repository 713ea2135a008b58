/*!
  The human readable textual form of bytecode is called assembly. This module parses assembly
  with `nom`, one line at a time, and leverages the `strum` derives of `Operation` to map
  mnemonics to opcodes.

  ```text
  ; Count R2 up to 3.
          MOV R1, #3
          MOV R3, #1
  again:  ADD R2, R3
          SUB R1, R3
          CMP R1, R0
          JNE @again
          RET
  ```

  An instruction is a mnemonic, an optional operand width in bytes (`MOV.4`), and up to two
  comma separated operands, destination first. Operands are registers `R0`-`R6` and `SP`,
  literals `#42`, `#0x2A` or `#-1`, label references `@again`, which stand for the label's
  program slot, and native function references `&add`, which stand for the function's handle.
  A leading `*` reads the operand as a pointer. Everything after `;` is a comment.
*/

use std::collections::HashMap;
use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::{tag, tag_no_case},
  character::complete::{
    alpha1,
    alphanumeric1,
    char as one_char,
    digit1,
    hex_digit1,
    space0
  },
  combinator::{all_consuming, map, map_res, opt, recognize},
  error::ErrorKind,
  multi::{many0, separated_list},
  sequence::{delimited, pair, preceded, terminated, tuple},
  IResult
};

use super::builder::{IMM, R0, SP};
use super::{encode_instruction, DerefMode, OperandMetadata, Operation, Selector, Word, WORD_BYTES};
use crate::error::AssemblyError;
use crate::native::NativeTable;

type ParseResult<'a, O> = IResult<&'a str, O, (&'a str, ErrorKind)>;

#[derive(Clone, Debug, Eq, PartialEq)]
enum OperandSyntax<'a> {
  Register(Selector),
  Literal(Word),
  Label(&'a str),
  Native(&'a str),
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Operand<'a> {
  pointer : bool,
  syntax  : OperandSyntax<'a>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct InstructionSyntax<'a> {
  mnemonic : &'a str,
  width    : Option<&'a str>,
  operands : Vec<Operand<'a>>,
}

impl<'a> InstructionSyntax<'a> {
  /// The number of program words the instruction will occupy: any operand that is not a register
  /// is carried as a literal word.
  fn length(&self) -> usize {
    let has_literal =
      self.operands
          .iter()
          .any(|operand| match operand.syntax {
            OperandSyntax::Register(_) => false,
            _                          => true
          });
    match has_literal {
      true  => 2,
      false => 1
    }
  }
}

struct LineSyntax<'a> {
  label       : Option<&'a str>,
  instruction : Option<InstructionSyntax<'a>>,
}

// region Parsers

fn identifier<'a>(input: &'a str) -> ParseResult<'a, &'a str> {
  recognize(
    pair(
      alt((alpha1, tag("_"))),
      many0(alt((alphanumeric1, tag("_"))))
    )
  )(input)
}

fn number<'a>(input: &'a str) -> ParseResult<'a, Word> {
  alt((
    map_res(
      preceded(tag_no_case("0x"), hex_digit1),
      |digits: &str| Word::from_str_radix(digits, 16)
    ),
    map_res(digit1, |digits: &str| digits.parse::<Word>())
  ))(input)
}

fn literal<'a>(input: &'a str) -> ParseResult<'a, Word> {
  map(
    pair(opt(one_char('-')), number),
    |(sign, value): (Option<char>, Word)| match sign {
      Some(_) => value.wrapping_neg(),
      None    => value
    }
  )(input)
}

/// `R0` through `R6` and `SP`, as 1-based selectors.
fn register<'a>(input: &'a str) -> ParseResult<'a, Selector> {
  alt((
    map(tag_no_case("sp"), |_: &str| SP),
    map_res(
      preceded(alt((one_char('R'), one_char('r'))), digit1),
      |digits: &str| match digits.parse::<u8>() {
        Ok(index) if index < SP - 1 => Ok(index + 1),
        _                           => Err(())
      }
    )
  ))(input)
}

fn operand<'a>(input: &'a str) -> ParseResult<'a, Operand<'a>> {
  map(
    pair(
      opt(one_char('*')),
      alt((
        map(register, OperandSyntax::Register),
        map(preceded(one_char('#'), literal), OperandSyntax::Literal),
        map(preceded(one_char('@'), identifier), OperandSyntax::Label),
        map(preceded(one_char('&'), identifier), OperandSyntax::Native)
      ))
    ),
    |(star, syntax): (Option<char>, OperandSyntax<'a>)| Operand { pointer: star.is_some(), syntax }
  )(input)
}

fn instruction<'a>(input: &'a str) -> ParseResult<'a, InstructionSyntax<'a>> {
  map(
    tuple((
      alpha1,
      opt(preceded(one_char('.'), digit1)),
      space0,
      separated_list(delimited(space0, one_char(','), space0), operand)
    )),
    |(mnemonic, width, _, operands)| InstructionSyntax { mnemonic, width, operands }
  )(input)
}

/// A whole line, with its comment already removed.
fn line<'a>(input: &'a str) -> ParseResult<'a, LineSyntax<'a>> {
  all_consuming(
    map(
      tuple((
        space0,
        opt(terminated(identifier, pair(space0, one_char(':')))),
        space0,
        opt(instruction),
        space0
      )),
      |(_, label, _, instruction, _)| LineSyntax { label, instruction }
    )
  )(input)
}

// endregion

// region Encoding

/// A register operand yields its selector; anything else yields `IMM` and the literal word.
fn selector_or_literal(
    line     : usize,
    operand  : &Operand,
    labels   : &HashMap<&str, usize>,
    natives  : &NativeTable
  ) -> Result<(Selector, Option<Word>), AssemblyError>
{
  match &operand.syntax {

    OperandSyntax::Register(selector) => Ok((*selector, None)),

    OperandSyntax::Literal(value) => Ok((IMM, Some(*value))),

    OperandSyntax::Label(label) => {
      let slot = labels.get(label).ok_or_else(|| AssemblyError::UndefinedLabel {
        line,
        label: label.to_string()
      })?;
      Ok((IMM, Some(*slot as Word)))
    }

    OperandSyntax::Native(name) => {
      let handle = natives.get_handle(name).ok_or_else(|| AssemblyError::UnknownNative {
        line,
        name: name.to_string()
      })?;
      Ok((IMM, Some(handle)))
    }

  }
}

fn parse_width(line: usize, width: Option<&str>) -> Result<u8, AssemblyError> {
  match width {
    None         => Ok(WORD_BYTES as u8),
    Some(digits) => {
      match digits.parse::<u8>() {
        Ok(size) if size >= 1 && size as usize <= WORD_BYTES => Ok(size),
        _ => Err(AssemblyError::InvalidWidth { line, width: digits.to_string() })
      }
    }
  }
}

/// Appends the encoded instruction, and its literal word if it has one, to `program`.
fn encode_syntax(
    line        : usize,
    instruction : &InstructionSyntax,
    labels      : &HashMap<&str, usize>,
    natives     : &NativeTable,
    program     : &mut Vec<Word>
  ) -> Result<(), AssemblyError>
{
  let operation =
    Operation::from_str(&instruction.mnemonic.to_ascii_uppercase())
      .map_err(|_| AssemblyError::NotAnOperation { line, name: instruction.mnemonic.to_string() })?;

  if instruction.operands.len() != operation.arity() {
    return Err(AssemblyError::WrongArity {
      line,
      operation,
      expected: operation.arity(),
      found: instruction.operands.len()
    });
  }
  let size = parse_width(line, instruction.width)?;

  let (first, second, deref, literal) =
    match (operation, instruction.operands.as_slice()) {

      (Operation::Pop, [destination]) => {
        let (selector, literal) = selector_or_literal(line, destination, labels, natives)?;
        if literal.is_some() {
          return Err(AssemblyError::ImmediateDestination { line, operation });
        }
        // A pointer POP reads through the address on top of the stack, as `pop_as` encodes it.
        (selector, selector, DerefMode::from_sides(destination.pointer, false), None)
      }

      (_, [source]) => {
        let (selector, literal) = selector_or_literal(line, source, labels, natives)?;
        (selector, selector, DerefMode::from_sides(source.pointer, false), literal)
      }

      (_, [destination, source]) => {
        let (first, immediate) = selector_or_literal(line, destination, labels, natives)?;
        if immediate.is_some() {
          return Err(AssemblyError::ImmediateDestination { line, operation });
        }
        let (second, literal) = selector_or_literal(line, source, labels, natives)?;
        (first, second, DerefMode::from_sides(source.pointer, destination.pointer), literal)
      }

      // RET
      _ => (R0, R0, DerefMode::None, None)

    };

  program.push(encode_instruction(first, second, operation, OperandMetadata::new(size, deref)));
  if let Some(value) = literal {
    program.push(value);
  }
  Ok(())
}

// endregion

/**
  Assembles `text` into program words. Native function references are resolved against
  `natives`, so functions must be registered before assembling code that names them.

  The first pass parses every line and assigns program slots to labels; the second encodes,
  so labels may be referenced before they are defined.
*/
pub fn assemble(text: &str, natives: &NativeTable) -> Result<Vec<Word>, AssemblyError> {
  let mut labels: HashMap<&str, usize> = HashMap::new();
  let mut parsed: Vec<(usize, InstructionSyntax)> = vec![];
  let mut slot = 0usize;

  for (index, raw_line) in text.lines().enumerate() {
    let line_number = index + 1;
    let code =
      match raw_line.find(';') {
        Some(position) => &raw_line[..position],
        None           => raw_line
      };

    let syntax =
      match line(code) {
        Ok((_rest, syntax)) => syntax,
        Err(_e) => {
          return Err(AssemblyError::Syntax { line: line_number, text: raw_line.trim().to_string() });
        }
      };

    if let Some(label) = syntax.label {
      if labels.insert(label, slot).is_some() {
        return Err(AssemblyError::DuplicateLabel { line: line_number, label: label.to_string() });
      }
    }

    if let Some(instruction) = syntax.instruction {
      slot += instruction.length();
      parsed.push((line_number, instruction));
    }
  }

  let mut program = Vec::with_capacity(slot);
  for (line_number, instruction) in parsed.iter() {
    encode_syntax(*line_number, instruction, &labels, natives, &mut program)?;
  }

  log::debug!("Assembled {} lines into {} words", text.lines().count(), program.len());
  Ok(program)
}
