//! Structures and functions for the register virtual machine: the fetch-decode-execute loop,
//! operand resolution, and opcode semantics.

use std::fmt::{Display, Formatter};

use crate::address::Address;
use crate::bytecode::{decode_instruction, Instruction, Operation, Word, WORD_BYTES};
use crate::config::MachineConfig;
use crate::error::VMError;
use crate::memory::{
  make_word_table, Memory, RegisterFile, TABLE_DISPLAY_FORMAT,
  ACCUMULATOR, ARGUMENT_REGISTERS, REGISTER_COUNT
};
use crate::native::NativeTable;

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum MachineState {
  Running,
  /// Terminal. Reached through `RET`, by running off the end of the program, or on an error.
  Halted,
}

impl Display for MachineState {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      MachineState::Running => write!(f, "Running"),
      MachineState::Halted  => write!(f, "Halted")
    }
  }
}

/// What the loop does after an instruction has taken effect.
enum Flow {
  Next,
  Jump(usize),
  Halt,
}

pub struct RVM {
  config    : MachineConfig,
  memory    : Memory,
  natives   : NativeTable,

  // Registers outside the register file //
  counter   : usize, // Index of the next program word
  zero_flag : bool,  // Written by CMP, read by JNE
  state     : MachineState,
}

impl RVM {

  // region Construction and inspection

  pub fn new(config: MachineConfig) -> RVM {
    RVM::with_natives(config, NativeTable::new())
  }

  pub fn with_natives(config: MachineConfig, natives: NativeTable) -> RVM {
    RVM {
      memory    : Memory::new(config.stack_size()),
      config,
      natives,
      counter   : 0,
      zero_flag : false,
      state     : MachineState::Running,
    }
  }

  /// Loads a program, resetting the registers, the stack, the counter, and the zero flag.
  pub fn load(&mut self, program: &[Word]) {
    self.memory.load(program);
    self.counter   = 0;
    self.zero_flag = false;
    self.state     = MachineState::Running;
    log::debug!("Loaded {} program words", program.len());
  }

  pub fn natives(&self) -> &NativeTable {
    &self.natives
  }

  pub fn natives_mut(&mut self) -> &mut NativeTable {
    &mut self.natives
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn registers(&self) -> &RegisterFile {
    &self.memory.registers
  }

  /// The value of the register with 0-based index `index`. Panics if the index is out of range.
  pub fn register(&self, index: usize) -> Word {
    self.memory.registers.get(index)
  }

  pub fn counter(&self) -> usize {
    self.counter
  }

  pub fn zero_flag(&self) -> bool {
    self.zero_flag
  }

  pub fn state(&self) -> MachineState {
    self.state
  }

  // endregion

  // region Execution

  /// Runs until the machine halts. With `dump_registers` configured, prints the register file on
  /// normal termination.
  pub fn run(&mut self) -> Result<(), VMError> {
    while self.step()? == MachineState::Running {}

    if self.config.dump_registers {
      print!("{}", self.memory.registers);
    }
    Ok(())
  }

  /**
    Executes one instruction. Stepping a halted machine does nothing. An error halts the machine
    at the failing instruction; effects of that instruction that precede the failing access,
    such as the stack pointer decrement of `PUSH`, remain.
  */
  pub fn step(&mut self) -> Result<MachineState, VMError> {
    if self.state == MachineState::Halted {
      return Ok(MachineState::Halted);
    }

    match self.try_step() {
      Ok(state) => Ok(state),
      Err(e)    => {
        log::warn!("Execution stopped at word {}: {}", self.counter, e);
        self.state = MachineState::Halted;
        Err(e)
      }
    }
  }

  fn try_step(&mut self) -> Result<MachineState, VMError> {
    let length = self.memory.code().len();
    if self.counter >= length {
      return Ok(self.halt());
    }

    let instruction = decode_instruction(self.memory.code()[self.counter])?;
    log::trace!("{:>4}: {}", self.counter, instruction);

    match self.execute(&instruction)? {
      Flow::Next         => self.counter += instruction.length(),
      Flow::Jump(target) => self.counter  = target,
      Flow::Halt         => self.state    = MachineState::Halted,
    }

    #[cfg(feature = "trace_computation")] println!("{}", self);

    match self.state == MachineState::Halted || self.counter >= length {
      true  => Ok(self.halt()),
      false => Ok(MachineState::Running)
    }
  }

  fn halt(&mut self) -> MachineState {
    log::debug!("Halted at word {}", self.counter);
    self.state = MachineState::Halted;
    MachineState::Halted
  }

  fn execute(&mut self, instruction: &Instruction) -> Result<Flow, VMError> {
    let size = instruction.size as usize;

    match instruction.opcode {

      | Operation::Mov
      | Operation::Push
      | Operation::Pop => {
        if instruction.opcode == Operation::Pop {
          self.check_pop(instruction.size)?;
        }
        let (source, destination) = self.operands(instruction)?;

        let mut buffer = [0u8; WORD_BYTES];
        self.memory.read_bytes(source, &mut buffer[..size])?;
        self.memory.write_bytes(destination, &buffer[..size])?;

        if instruction.opcode == Operation::Pop {
          let stack_pointer = self.memory.registers.stack_pointer();
          self.memory.registers.set_stack_pointer(stack_pointer.wrapping_add(size as Word));
        }
      }

      | Operation::Add
      | Operation::Sub
      | Operation::And
      | Operation::Xor => {
        let (source, destination) = self.operands(instruction)?;
        let value  = self.memory.read_word(source)?;
        let target = self.memory.read_word(destination)?;

        let result =
          match instruction.opcode {
            Operation::Add => target.wrapping_add(value),
            Operation::Sub => target.wrapping_sub(value),
            Operation::And => target & value,
            _              => target ^ value,
          };
        self.memory.write_word(destination, result)?;
      }

      Operation::Lea => {
        let (source, destination) = self.operands(instruction)?;
        self.memory.write_word(destination, source)?;
      }

      Operation::Cmp => {
        let (source, destination) = self.operands(instruction)?;
        let value  = self.memory.read_word(source)?;
        let target = self.memory.read_word(destination)?;
        self.zero_flag = target.wrapping_sub(value) == 0;
      }

      | Operation::Jmp
      | Operation::Jne => {
        let source = self.source_operand(instruction)?;
        if instruction.opcode == Operation::Jmp || !self.zero_flag {
          let target = self.memory.read_word(source)?;
          let length = self.memory.code().len();
          // Jumping to the end is a way to stop.
          if target > length as Word {
            return Err(VMError::OutOfBoundsJump { target, length });
          }
          return Ok(Flow::Jump(target as usize));
        }
      }

      Operation::Call => {
        let source = self.source_operand(instruction)?;
        let handle = self.memory.read_word(source)?;

        let mut arguments = [0 as Word; ARGUMENT_REGISTERS];
        for (i, argument) in arguments.iter_mut().enumerate() {
          *argument = self.memory.registers.get(i + 1);
        }

        let function = self.natives.lookup(handle).ok_or(VMError::UnknownNativeFunction(handle))?;
        log::debug!(
          "CALL {} with {:?}",
          function.signature,
          &arguments[..function.signature.arity]
        );
        let result = function.call(&arguments);
        self.memory.registers.set(ACCUMULATOR, result);
      }

      Operation::Ret => {
        return Ok(Flow::Halt);
      }

    }

    Ok(Flow::Next)
  }

  // endregion

  // region Operand resolution

  /// Resolves both operand addresses, then applies the dereference mode.
  fn operands(&mut self, instruction: &Instruction) -> Result<(Word, Word), VMError> {
    let mut source      = self.source_address(instruction)?;
    let mut destination = self.destination_address(instruction)?;

    if instruction.deref.dereferences_source() {
      source = self.memory.read_word(source)?;
    }
    if instruction.deref.dereferences_destination() {
      destination = self.memory.read_word(destination)?;
    }
    Ok((source, destination))
  }

  /// Resolves the source address alone, for operations without a destination.
  fn source_operand(&self, instruction: &Instruction) -> Result<Word, VMError> {
    let source = self.source_address(instruction)?;
    match instruction.deref.dereferences_source() {
      true  => self.memory.read_word(source),
      false => Ok(source)
    }
  }

  fn source_address(&self, instruction: &Instruction) -> Result<Word, VMError> {
    match (instruction.opcode, instruction.immediate) {
      (Operation::Pop, _) => Ok(self.memory.registers.stack_pointer()),
      (_, true)           => Ok(Address::program_slot(self.counter + 1).to_word()),
      (_, false)          => RVM::register_address(instruction.source)
    }
  }

  /// For `PUSH`, this decrements the stack pointer.
  fn destination_address(&mut self, instruction: &Instruction) -> Result<Word, VMError> {
    match instruction.opcode {

      Operation::Push => {
        let stack_pointer = self.memory.registers.stack_pointer();
        let base          = self.memory.stack.base();
        let top =
          stack_pointer
            .checked_sub(instruction.size as Word)
            .filter(|top| *top >= base)
            .ok_or(VMError::StackOverflow { stack_pointer, size: instruction.size })?;

        self.memory.registers.set_stack_pointer(top);
        Ok(top)
      }

      _ => RVM::register_address(instruction.destination)

    }
  }

  fn check_pop(&self, size: u8) -> Result<(), VMError> {
    let stack_pointer = self.memory.registers.stack_pointer();
    match stack_pointer.checked_add(size as Word) {
      Some(end) if end <= self.memory.stack.end() => Ok(()),
      _ => Err(VMError::StackUnderflow { stack_pointer, size })
    }
  }

  fn register_address(index: u8) -> Result<Word, VMError> {
    match (index as usize) < REGISTER_COUNT {
      true  => Ok(Address::register(index as usize).to_word()),
      false => Err(VMError::InvalidRegister(index))
    }
  }

  // endregion

}

impl Display for RVM {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let register_table = self.memory.registers.make_table();
    let stack_rows: Vec<(String, Word)> =
      self.memory
          .stack
          .live_words(self.memory.registers.stack_pointer())
          .into_iter()
          .map(|(address, value)| (format!("{:#x}", address), value))
          .collect();
    let stack_table = make_word_table(&stack_rows, Some(0));

    let mut combined_table = table!([register_table, stack_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Stack"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(
      f,
      "State: {}\tCounter: {}\tZero flag: {}\n{}",
      self.state, self.counter, self.zero_flag as u8, combined_table
    )
  }
}

/**
  Runs `program` to completion on a fresh machine with default configuration and the given
  native functions. With `debug` set, the register file is printed to standard output when the
  program terminates normally.
*/
pub fn run_program(program: &[Word], natives: NativeTable, debug: bool) -> Result<RVM, VMError> {
  let config      = MachineConfig::default().with_register_dump(debug);
  let mut machine = RVM::with_natives(config, natives);

  machine.load(program);
  machine.run()?;
  Ok(machine)
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::address::{PROGRAM_BASE, REGISTER_BASE, STACK_BASE};
  use crate::bytecode::builder::*;
  use crate::bytecode::{encode_instruction, OperandKind, OperandMetadata, INSTRUCTION_MASK};
  use crate::memory::STACK_POINTER;

  fn run(program: &[Word]) -> RVM {
    run_program(program, NativeTable::new(), false).unwrap()
  }

  fn run_with(config: MachineConfig, program: &[Word]) -> (RVM, Result<(), VMError>) {
    let mut machine = RVM::new(config);
    machine.load(program);
    let result = machine.run();
    (machine, result)
  }

  fn run_err(program: &[Word]) -> VMError {
    run_with(MachineConfig::default(), program).1.unwrap_err()
  }

  #[test]
  fn mov_then_cmp_sets_zero_flag() {
    let machine = run(&[
      mov(R1, IMM), 9,
      mov(R2, R1),
      cmp(R1, R2),
    ]);
    assert_eq!(machine.register(2), 9);
    assert!(machine.zero_flag());

    let machine = run(&[
      mov(R1, IMM), 9,
      cmp(R1, R2),
    ]);
    assert!(!machine.zero_flag());
  }

  #[test]
  fn add_then_sub_restores() {
    let machine = run(&[
      mov(R1, IMM), 100,
      mov(R2, IMM), 0xFFFF_FFFF_FFFF_FFF0,
      add(R1, R2),
      sub(R1, R2),
    ]);
    assert_eq!(machine.register(1), 100);
  }

  #[test]
  fn bitwise_operations() {
    let machine = run(&[
      mov(R1, IMM), 0b1100,
      mov(R2, IMM), 0b1010,
      and(R1, R2),
      mov(R3, IMM), 0b1100,
      xor(R3, R2),
    ]);
    assert_eq!(machine.register(1), 0b1000);
    assert_eq!(machine.register(3), 0b0110);
  }

  #[test]
  fn arithmetic_wraps() {
    let machine = run(&[
      mov(R1, IMM), Word::max_value(),
      add(R1, IMM), 2,
    ]);
    assert_eq!(machine.register(1), 1);
  }

  #[test]
  fn push_then_pop() {
    let machine = run(&[
      mov(R1, IMM), 0xDEAD,
      push(R1),
      pop(R2),
      push(IMM), 7,
      pop(R3),
    ]);
    assert_eq!(machine.register(2), 0xDEAD);
    assert_eq!(machine.register(3), 7);
    assert_eq!(machine.register(STACK_POINTER), STACK_BASE + 1024);
  }

  #[test]
  fn push_moves_the_stack_pointer_by_size() {
    let mut machine = RVM::new(MachineConfig::default());
    machine.load(&[
      mov(R1, IMM), 0x1_2345,
      push_as(R1, OperandKind::Value(2)),
      pop_as(R2, OperandKind::Value(2)),
    ]);

    machine.step().unwrap();
    machine.step().unwrap();
    assert_eq!(machine.register(STACK_POINTER), STACK_BASE + 1022);
    assert_eq!(machine.memory().read_word(STACK_BASE + 1016).unwrap() >> 48, 0x2345);

    machine.run().unwrap();
    assert_eq!(machine.register(2), 0x2345);
    assert_eq!(machine.register(STACK_POINTER), STACK_BASE + 1024);
  }

  #[test]
  fn narrow_mov_copies_low_bytes() {
    let machine = run(&[
      mov(R1, IMM), Word::max_value(),
      mov(R2, IMM), 0x1234_5678,
      mov_as(R1, R2, OperandKind::Value(1), None),
    ]);
    assert_eq!(machine.register(1), 0xFFFF_FFFF_FFFF_FF78);
  }

  #[test]
  fn jne_not_taken_after_equal_compare() {
    let machine = run(&[
      mov(R1, IMM), 5,   // 0
      mov(R2, IMM), 5,   // 2
      cmp(R1, R2),       // 4
      jne(IMM), 9,       // 5
      mov(R0, IMM), 1,   // 7
    ]);
    assert_eq!(machine.register(0), 1);
    assert_eq!(machine.state(), MachineState::Halted);
  }

  #[test]
  fn jne_taken_after_unequal_compare() {
    let machine = run(&[
      mov(R1, IMM), 5,
      mov(R2, IMM), 6,
      cmp(R1, R2),
      jne(IMM), 9,
      mov(R0, IMM), 1,
    ]);
    assert_eq!(machine.register(0), 0);
  }

  #[test]
  fn jmp_ignores_the_flag() {
    let machine = run(&[
      cmp(R1, R2),      // 0: equal, flag set
      mov(R4, IMM), 6,  // 1
      jmp(R4),          // 3
      mov(R0, IMM), 1,  // 4
      jmp(IMM), 11,     // 6
      mov(R1, IMM), 1,  // 8
      ret(),            // 10
    ]);
    assert_eq!(machine.register(0), 0);
    assert_eq!(machine.register(1), 0);
    assert_eq!(machine.counter(), 11);
  }

  #[test]
  fn loop_counts_down() {
    // R1 = 3; do { R2 += 1; R1 -= 1 } while R1 != 0
    let machine = run(&[
      mov(R1, IMM), 3,  // 0
      mov(R3, IMM), 1,  // 2
      add(R2, R3),      // 4
      sub(R1, R3),      // 5
      cmp(R1, R0),      // 6
      jne(IMM), 4,      // 7
    ]);
    assert_eq!(machine.register(2), 3);
    assert_eq!(machine.register(1), 0);
  }

  #[test]
  fn call_native_add() {
    let mut natives = NativeTable::new();
    let handle = natives.register("add", 2, |args| args[0] + args[1]).unwrap();

    let machine = run_program(&[
      mov(R3, IMM), handle,
      mov(R1, IMM), 3,
      mov(R2, IMM), 4,
      call(R3),
    ], natives, false).unwrap();

    assert_eq!(machine.register(0), 7);
  }

  #[test]
  fn call_immediate_handle() {
    let mut natives = NativeTable::new();
    let handle = natives.register("answer", 0, |args| 40 + args.len() as Word).unwrap();

    let machine = run_program(&[call(IMM), handle], natives, false).unwrap();
    assert_eq!(machine.register(0), 40);
  }

  #[test]
  fn ret_halts_immediately() {
    let machine = run(&[
      mov(R1, IMM), 1,
      ret(),
      mov(R1, IMM), 0xBAD,
    ]);
    assert_eq!(machine.register(1), 1);
    assert_eq!(machine.counter(), 2);
    assert_eq!(machine.state(), MachineState::Halted);
  }

  #[test]
  fn lea_and_dereference() {
    let machine = run(&[
      mov(R2, IMM), 0x55,
      lea(R1, R2),
      mov_as(R3, R1, OperandKind::Value(8), Some(OperandKind::Pointer(8))),
      mov_as(R1, IMM, OperandKind::Pointer(8), Some(OperandKind::Value(8))), 0x66,
    ]);
    assert_eq!(machine.register(1), REGISTER_BASE + 16);
    assert_eq!(machine.register(3), 0x55);
    assert_eq!(machine.register(2), 0x66);
  }

  #[test]
  fn pointer_to_pointer_copy() {
    let machine = run(&[
      mov(R1, IMM), 0x77,
      lea(R4, R1),
      lea(R5, R2),
      mov_as(R5, R4, OperandKind::Pointer(8), Some(OperandKind::Pointer(8))),
    ]);
    assert_eq!(machine.register(2), 0x77);
  }

  #[test]
  fn jump_to_end_halts() {
    let machine = run(&[jmp(IMM), 3, ret()]);
    assert_eq!(machine.counter(), 3);
    assert_eq!(machine.state(), MachineState::Halted);
  }

  #[test]
  fn empty_program_halts() {
    let mut machine = RVM::new(MachineConfig::default());
    machine.load(&[]);
    assert_eq!(machine.step(), Ok(MachineState::Halted));
    assert_eq!(machine.step(), Ok(MachineState::Halted));
  }

  // region Errors

  #[test]
  fn invalid_register() {
    let word = encode_instruction(10, R1, Operation::Mov, OperandMetadata::default());
    assert_eq!(run_err(&[word]), VMError::InvalidRegister(9));
    // POP has no immediate form; the wrapped destination index is rejected.
    assert_eq!(run_err(&[push(R1), pop(IMM)]), VMError::InvalidRegister(0xF));
  }

  #[test]
  fn stack_overflow() {
    let config = MachineConfig::default().with_stack_size(8);
    let (machine, result) = run_with(config, &[push(R1), push(R1)]);

    assert_eq!(result, Err(VMError::StackOverflow { stack_pointer: STACK_BASE, size: 8 }));
    assert_eq!(machine.state(), MachineState::Halted);
    assert_eq!(machine.counter(), 1);
  }

  #[test]
  fn stack_underflow() {
    assert_eq!(
      run_err(&[pop(R1)]),
      VMError::StackUnderflow { stack_pointer: STACK_BASE + 1024, size: 8 }
    );
  }

  #[test]
  fn out_of_bounds_jump() {
    assert_eq!(run_err(&[jmp(IMM), 100]), VMError::OutOfBoundsJump { target: 100, length: 2 });
  }

  #[test]
  fn invalid_dereference() {
    let word = mov_as(R1, R2, OperandKind::Value(8), Some(OperandKind::Pointer(8)));
    assert_eq!(run_err(&[word]), VMError::InvalidDereference { address: 0, length: 8 });
  }

  #[test]
  fn missing_literal() {
    assert_eq!(
      run_err(&[mov(R1, IMM)]),
      VMError::InvalidDereference { address: PROGRAM_BASE + 8, length: 8 }
    );
  }

  #[test]
  fn program_memory_is_read_only() {
    let write = mov_as(R1, IMM, OperandKind::Pointer(8), Some(OperandKind::Value(8)));
    assert_eq!(
      run_err(&[lea(R1, IMM), 0, write, 5]),
      VMError::ReadOnlyWrite(PROGRAM_BASE + 8)
    );
  }

  #[test]
  fn unknown_native_function() {
    assert_eq!(
      run_err(&[mov(R1, IMM), 0x1234, call(R1)]),
      VMError::UnknownNativeFunction(0x1234)
    );
  }

  #[test]
  fn unknown_opcode() {
    assert_eq!(run_err(&[INSTRUCTION_MASK]), VMError::UnknownOpcode(0));
  }

  #[test]
  fn error_halts_the_machine() {
    let mut machine = RVM::new(MachineConfig::default());
    machine.load(&[pop(R1), mov(R1, IMM), 1]);

    assert!(machine.step().is_err());
    assert_eq!(machine.step(), Ok(MachineState::Halted));
    assert_eq!(machine.register(1), 0);
  }

  // endregion

  #[test]
  fn display_shows_state() {
    let machine = run(&[push(IMM), 0xABC]);
    let text = machine.to_string();

    assert!(text.starts_with("State: Halted"));
    assert!(text.contains("0xabc"));
  }

  #[test]
  fn pointer_pop_reads_through_the_top_of_the_stack() {
    let machine = run(&[
      mov(R2, IMM), 0x99,
      lea(R4, R2),
      push(R4),
      pop_as(R3, OperandKind::Pointer(8)),
    ]);

    assert_eq!(machine.register(3), 0x99);
    assert_eq!(machine.registers().stack_pointer(), STACK_BASE + 1024);
  }

  #[test]
  fn debug_run_dumps_and_finishes() {
    let machine = run_program(&[mov(R1, IMM), 5, ret()], NativeTable::new(), true).unwrap();

    assert_eq!(machine.state(), MachineState::Halted);
    assert_eq!(machine.register(1), 5);
    assert!(machine.registers().to_string().contains("R1: 0x5"));
  }
}
