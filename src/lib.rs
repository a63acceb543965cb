//! A small Lua-like scripting core: a logos lexer, a single-pass compiler
//! that emits bytecode over a constant pool and a global table, and a stack
//! VM that executes it.
//!
//! ```
//! use lunette::vm::{Capture, Vm};
//!
//! let out = Capture::new();
//! let mut vm = Vm::with_output(out.clone());
//! lunette::run(&mut vm, r#"print("hi")"#).unwrap();
//! assert_eq!(out.contents(), "hi\n");
//! ```

pub mod compiler;
pub mod diagnostic;
pub mod error;
pub mod lexer;
pub mod program;
pub mod span;
pub mod value;
pub mod vm;

pub use compiler::{CompileError, compile, compile_with_globals};
pub use error::{Error, Result};
pub use program::{Globals, Op, Program};
pub use value::Value;
pub use vm::{RuntimeError, Vm, VmConfig, VmError};

/// Compile `source` and run it on `vm`. The returned program carries the
/// globals as the run left them.
pub fn run(vm: &mut Vm, source: &str) -> Result<Program> {
    let mut program = compile(source)?;
    vm.execute(&mut program)?;
    Ok(program)
}
