/*!
  A minimal register virtual machine. Programs are slices of 64 bit words, each instruction
  bit-packed into one word with an optional inline immediate word after it. The machine has
  eight registers (R0 through R6 and the stack pointer SP), a downward growing stack, a zero flag
  set by `CMP`, and a table of native functions reachable through `CALL`.

  Programs are built either with the encoding functions in `bytecode::builder` or from text with
  `bytecode::assemble`.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;
extern crate strum;
extern crate strum_macros;

mod address;
pub mod bytecode;
mod config;
mod error;
mod memory;
mod native;
mod rvm;

pub use crate::address::{Address, MAX_STACK_SIZE, PROGRAM_BASE, PROGRAM_LIMIT, REGISTER_BASE, STACK_BASE};
pub use crate::config::{MachineConfig, DEFAULT_STACK_SIZE};
pub use crate::error::{AssemblyError, RegistrationError, VMError};
pub use crate::memory::{Memory, RegisterFile, Stack, REGISTER_COUNT, REGISTER_NAMES};
pub use crate::native::{NativeFunction, NativeSignature, NativeTable, NATIVE_BASE};
pub use crate::rvm::{run_program, MachineState, RVM};
