//! Runs an assembly program on the register machine and prints the registers when it halts.
//!
//! Usage: `rvm [FILE]`. Without a file a small demonstration program is run. Set `RUST_LOG` to
//! see the machine's log output, and `RVM_STACK_SIZE` or `RVM_DUMP_REGISTERS` to override the
//! machine configuration.

use std::env;
use std::fs;
use std::process;

use rvm::bytecode::assemble;
use rvm::{MachineConfig, NativeTable, RegistrationError, RVM};

const DEMO_PROGRAM: &str = "
; Sums 5 + 4 + 3 + 2 + 1 into R2, then asks the host to add 100 to it.
        MOV R1, #5
        MOV R3, #1
again:  ADD R2, R1
        SUB R1, R3
        CMP R1, R0
        JNE @again

        PUSH R2
        POP.4 R4          ; low half only
        MOV R1, R4
        MOV R2, #100
        CALL &add
        MOV R1, R0
        CALL &print
        RET
";

fn make_natives() -> Result<NativeTable, RegistrationError> {
  let mut natives = NativeTable::new();

  natives.register("add", 2, |args| args[0].wrapping_add(args[1]))?;
  natives.register("sub", 2, |args| args[0].wrapping_sub(args[1]))?;
  natives.register("print", 1, |args| {
    println!("{:#x}", args[0]);
    args[0]
  })?;

  Ok(natives)
}

fn main() {
  env_logger::init();

  #[cfg(feature = "trace_computation")]
  println!("Computation Tracing ENABLED");

  let text =
    match env::args().nth(1) {
      Some(path) => {
        match fs::read_to_string(&path) {
          Ok(text) => text,
          Err(e)   => {
            eprintln!("Could not read {}: {}", path, e);
            process::exit(1);
          }
        }
      }
      None => DEMO_PROGRAM.to_string()
    };

  let natives =
    match make_natives() {
      Ok(natives) => natives,
      Err(e)      => {
        eprintln!("{}", e);
        process::exit(1);
      }
    };

  let program =
    match assemble(&text, &natives) {
      Ok(program) => program,
      Err(e)      => {
        eprintln!("Assembly failed: {}", e);
        process::exit(1);
      }
    };

  let config      = MachineConfig::default().with_register_dump(true).from_env();
  let mut machine = RVM::with_natives(config, natives);

  machine.load(&program);
  if let Err(e) = machine.run() {
    eprintln!("Execution failed at word {}: {}", machine.counter(), e);
    eprintln!("{}", machine);
    process::exit(1);
  }
}
