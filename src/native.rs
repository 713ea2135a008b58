/*!
  Native functions callable from bytecode through `CALL`.

  A native function is registered under a name with a declared arity and receives a handle, an
  opaque word that programs load into a register (as an immediate, for example) and pass to
  `CALL`. The table is a convenience wrapper around a `BiMap` between interned names and
  handles, plus the functions themselves in registration order.

  Handles are spaced one word apart starting at `NATIVE_BASE`, which lies outside every memory
  region, so a handle can never be mistaken for a dereferenceable address.
*/

use std::fmt::{Display, Formatter};

use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::bytecode::{Word, WORD_BYTES};
use crate::error::RegistrationError;
use crate::memory::ARGUMENT_REGISTERS;

pub const NATIVE_BASE: Word = 0x7000_0000;

pub type NativeFn = Box<dyn Fn(&[Word]) -> Word>;

/// A name and an arity, displayed as `name/arity`. Clones are cheap.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct NativeSignature {
  pub name  : DefaultAtom,
  pub arity : usize,
}

impl Display for NativeSignature {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.name, self.arity)
  }
}

pub struct NativeFunction {
  pub signature : NativeSignature,
  function      : NativeFn,
}

impl NativeFunction {
  /// Calls the function with the first `arity` words of `arguments`.
  pub fn call(&self, arguments: &[Word]) -> Word {
    (self.function)(&arguments[..self.signature.arity.min(arguments.len())])
  }
}

pub struct NativeTable {
  symbols   : BiMap<DefaultAtom, Word>,
  functions : Vec<NativeFunction>,
}

impl NativeTable {

  pub fn new() -> NativeTable {
    NativeTable {
      symbols   : BiMap::new(),
      functions : vec![]
    }
  }

  /**
    Registers `function` under `name`, returning its handle. The arity is the number of argument
    registers, starting at R1, that are passed to the function on `CALL`.
  */
  pub fn register<F>(&mut self, name: &str, arity: usize, function: F)
    -> Result<Word, RegistrationError>
    where F: Fn(&[Word]) -> Word + 'static
  {
    if arity > ARGUMENT_REGISTERS {
      return Err(RegistrationError::InvalidArity {
        name: name.to_string(),
        arity,
        max: ARGUMENT_REGISTERS
      });
    }

    let name   = DefaultAtom::from(name);
    let handle = NATIVE_BASE + (self.functions.len() * WORD_BYTES) as Word;

    if self.symbols.insert_no_overwrite(name.clone(), handle).is_err() {
      return Err(RegistrationError::Duplicate(name.to_string()));
    }

    log::debug!("Registered native function {}/{} at {:#x}", name, arity, handle);
    self.functions.push(NativeFunction {
      signature: NativeSignature { name, arity },
      function: Box::new(function)
    });
    Ok(handle)
  }

  pub fn get_handle(&self, name: &str) -> Option<Word> {
    self.symbols.get_by_left(&DefaultAtom::from(name)).cloned()
  }

  pub fn get_symbol(&self, handle: Word) -> Option<DefaultAtom> {
    self.symbols.get_by_right(&handle).cloned()
  }

  pub fn lookup(&self, handle: Word) -> Option<&NativeFunction> {
    let offset = handle.checked_sub(NATIVE_BASE)?;
    if offset % WORD_BYTES as Word != 0 {
      return None;
    }
    self.functions.get((offset / WORD_BYTES as Word) as usize)
  }

  pub fn len(&self) -> usize {
    self.functions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.functions.is_empty()
  }
}

impl Default for NativeTable {
  fn default() -> Self {
    NativeTable::new()
  }
}
