//! Machine configuration.
//!
//! Values come from, highest priority first:
//! 1. Environment variables (`RVM_STACK_SIZE`, `RVM_DUMP_REGISTERS`), via `from_env`
//! 2. Builder-style setters
//! 3. Built-in defaults
//!
//! The `trace_computation` Cargo feature is the compile-time counterpart: it prints the machine
//! state after every instruction.

use std::cmp::min;
use std::env;

use crate::address::MAX_STACK_SIZE;

pub const DEFAULT_STACK_SIZE: usize = 1024;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct MachineConfig {
  /// Size of the stack in bytes, at most `MAX_STACK_SIZE`. Only set through `with_stack_size`.
  stack_size         : usize,
  /// Print the register file when a run terminates.
  pub dump_registers : bool,
}

impl MachineConfig {
  pub fn new() -> MachineConfig {
    MachineConfig::default()
  }

  pub fn with_stack_size(mut self, stack_size: usize) -> MachineConfig {
    self.stack_size = min(stack_size, MAX_STACK_SIZE);
    self
  }

  pub fn stack_size(&self) -> usize {
    self.stack_size
  }

  pub fn with_register_dump(mut self, dump_registers: bool) -> MachineConfig {
    self.dump_registers = dump_registers;
    self
  }

  /// Applies environment overrides on top of `self`. Unparsable values are ignored with a warning.
  pub fn from_env(self) -> MachineConfig {
    let mut config = self;

    if let Ok(text) = env::var("RVM_STACK_SIZE") {
      match text.trim().parse::<usize>() {
        Ok(size) => config = config.with_stack_size(size),
        Err(e)   => log::warn!("Ignoring RVM_STACK_SIZE={:?}: {}", text, e),
      }
    }

    if let Ok(text) = env::var("RVM_DUMP_REGISTERS") {
      config.dump_registers = parse_flag(&text);
    }

    config
  }
}

impl Default for MachineConfig {
  fn default() -> Self {
    MachineConfig {
      stack_size     : DEFAULT_STACK_SIZE,
      dump_registers : false,
    }
  }
}

fn parse_flag(text: &str) -> bool {
  match text.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => true,
    _                           => false
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let config = MachineConfig::default();
    assert_eq!(config.stack_size, 1024);
    assert!(!config.dump_registers);
  }

  #[test]
  fn stack_size_is_clamped() {
    let config = MachineConfig::new().with_stack_size(usize::max_value());
    assert_eq!(config.stack_size(), MAX_STACK_SIZE);
  }

  #[test]
  fn flags() {
    assert!(parse_flag(" TRUE "));
    assert!(parse_flag("1"));
    assert!(!parse_flag("0"));
    assert!(!parse_flag("nope"));
  }
}
