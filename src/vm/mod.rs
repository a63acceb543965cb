mod arith;
mod builtins;

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::program::{Op, Program};
use crate::span::Span;
use crate::value::{CallContext, Function, Value};

/// Default operand stack size in slots.
pub const STACK_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },
    #[error("attempt to call a {type_name} value")]
    CallNonFunction { type_name: &'static str },
    #[error("attempt to call '{name}', a script function the VM cannot enter")]
    UnboundFunction { name: String },
    #[error("attempt to perform arithmetic on a {type_name} value")]
    Arithmetic { type_name: &'static str },
    #[error("attempt to perform bitwise operation on a {type_name} value")]
    Bitwise { type_name: &'static str },
    #[error("number has no integer representation")]
    NoIntegerRepresentation,
    #[error("attempt to concatenate a {type_name} value")]
    Concat { type_name: &'static str },
    #[error("attempt to compare {left} with {right}")]
    Compare { left: &'static str, right: &'static str },
    #[error("attempt to get length of a {type_name} value")]
    Length { type_name: &'static str },
    #[error("stack overflow ({capacity} slots)")]
    StackOverflow { capacity: usize },
    #[error("malformed program: {0}")]
    MalformedProgram(String),
    #[error("write to output failed: {0}")]
    Output(#[from] io::Error),
    #[error("{0}")]
    Native(String),
}

type VmResult<T> = Result<T, VmError>;

/// A fault together with where it happened.
#[derive(Debug, thiserror::Error)]
#[error("runtime error at instruction {ip}: {source}")]
pub struct RuntimeError {
    pub ip: usize,
    /// The instruction that faulted; `None` when execution ran off the code.
    pub op: Option<Op>,
    pub span: Option<Span>,
    pub source: VmError,
}

#[derive(Debug, Clone, Copy)]
pub struct VmConfig {
    pub stack_capacity: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig { stack_capacity: STACK_CAPACITY }
    }
}

/// Cloneable in-memory sink; every clone appends to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    pub fn new() -> Self {
        Capture::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Flow {
    Next(usize),
    Halt,
}

/// Stack machine that runs one `Program` at a time. The operand stack is
/// allocated once; natives registered here are defined as globals of each
/// program before it runs.
pub struct Vm {
    config: VmConfig,
    stack: Box<[Value]>,
    sp: usize,
    natives: Vec<(String, Value)>,
    out: Box<dyn Write>,
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

impl Vm {
    /// A VM printing to standard output with the default stack.
    pub fn new() -> Self {
        Vm::with_config(VmConfig::default(), Box::new(io::stdout()))
    }

    pub fn with_output(out: impl Write + 'static) -> Self {
        Vm::with_config(VmConfig::default(), Box::new(out))
    }

    pub fn with_config(config: VmConfig, out: Box<dyn Write>) -> Self {
        let mut vm = Vm {
            config,
            stack: vec![Value::Nil; config.stack_capacity].into_boxed_slice(),
            sp: 0,
            natives: Vec::new(),
            out,
        };
        vm.define("print", Value::native("print", builtins::print));
        vm
    }

    /// Make a host function callable from scripts under `name`.
    pub fn register<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, VmError> + 'static,
    {
        self.define(name, Value::native(name, func));
    }

    /// Install `value` as the global `name` of every program this VM runs.
    pub fn define(&mut self, name: &str, value: Value) {
        match self.natives.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.natives.push((name.to_string(), value)),
        }
    }

    /// Values left on the operand stack by the last run.
    pub fn stack(&self) -> &[Value] {
        &self.stack[..self.sp]
    }

    /// Run `program` from its first instruction until `Exit`. Globals the
    /// program assigned before a fault stay assigned.
    pub fn execute(&mut self, program: &mut Program) -> Result<(), RuntimeError> {
        for (name, value) in &self.natives {
            program.globals.set(name, value.clone());
        }
        self.reset();
        tracing::debug!(ops = program.code.len(), stack = self.config.stack_capacity, "executing program");

        let mut ip = 0;
        loop {
            let Some(&op) = program.code.get(ip) else {
                return Err(RuntimeError {
                    ip,
                    op: None,
                    span: None,
                    source: VmError::MalformedProgram("execution ran past the last instruction".into()),
                });
            };
            tracing::trace!(ip, %op, sp = self.sp, "dispatch");
            match self.step(program, op, ip) {
                Ok(Flow::Next(next)) => ip = next,
                Ok(Flow::Halt) => {
                    self.out.flush().map_err(|e| RuntimeError {
                        ip,
                        op: Some(op),
                        span: program.span_at(ip),
                        source: e.into(),
                    })?;
                    tracing::debug!(sp = self.sp, "program exited");
                    return Ok(());
                }
                Err(source) => {
                    tracing::debug!(ip, %op, error = %source, "runtime fault");
                    return Err(RuntimeError { ip, op: Some(op), span: program.span_at(ip), source });
                }
            }
        }
    }

    fn step(&mut self, program: &mut Program, op: Op, ip: usize) -> VmResult<Flow> {
        match op {
            Op::Exit => return Ok(Flow::Halt),
            Op::LoadConst(ci) => {
                let value = constant(&program.constants, ci)?.clone();
                self.push(value)?;
            }
            Op::LoadGlobal(ci) => {
                let name = constant(&program.constants, ci)?.as_str()?;
                let value = program.globals.get(name);
                self.push(value)?;
            }
            Op::SetGlobal(ci) => {
                let value = self.pop()?;
                let name = constant(&program.constants, ci)?.as_str()?;
                program.globals.set(name, value);
            }
            Op::GetLocal(slot) => {
                let value = self.slot(slot)?.clone();
                self.push(value)?;
            }
            Op::SetLocal(slot) => {
                let value = self.pop()?;
                *self.slot_mut(slot)? = value;
            }
            Op::Pop(n) => {
                let n = n as usize;
                if n > self.sp {
                    return Err(underflow());
                }
                self.truncate(self.sp - n);
            }
            Op::Call(base, argc) => self.call(base as usize, argc as usize)?,

            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::IDiv
            | Op::Mod
            | Op::Pow
            | Op::Concat
            | Op::Eq
            | Op::Ne
            | Op::Lt
            | Op::Le
            | Op::Gt
            | Op::Ge
            | Op::BAnd
            | Op::BOr
            | Op::BXor
            | Op::Shl
            | Op::Shr => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(arith::binary(op, &a, &b)?)?;
            }
            Op::Neg | Op::Not | Op::Len | Op::BNot => {
                let a = self.pop()?;
                self.push(arith::unary(op, &a)?)?;
            }

            Op::Jump(target) => return Ok(Flow::Next(target as usize)),
            Op::JumpIfFalse(target) => {
                if !self.pop()?.is_truthy() {
                    return Ok(Flow::Next(target as usize));
                }
            }
            Op::JumpIfFalseOrPop(target) => {
                if !self.peek()?.is_truthy() {
                    return Ok(Flow::Next(target as usize));
                }
                self.pop()?;
            }
            Op::JumpIfTrueOrPop(target) => {
                if self.peek()?.is_truthy() {
                    return Ok(Flow::Next(target as usize));
                }
                self.pop()?;
            }
        }
        Ok(Flow::Next(ip + 1))
    }

    /// The callee sits in `base` with its arguments directly above; the
    /// result replaces the callee.
    fn call(&mut self, base: usize, argc: usize) -> VmResult<()> {
        if base + argc + 1 != self.sp {
            return Err(VmError::MalformedProgram(format!(
                "call frame at slot {base} with {argc} arguments does not end at stack top {}",
                self.sp
            )));
        }
        let result = match &self.stack[base] {
            Value::Function(Function::Native(native)) => {
                let native = Rc::clone(native);
                tracing::trace!(name = %native.name, argc, "native call");
                let mut ctx = CallContext { out: &mut *self.out };
                native.call(&mut ctx, &self.stack[base + 1..self.sp])?
            }
            Value::Function(Function::Script(script)) => {
                return Err(VmError::UnboundFunction { name: script.name.clone() });
            }
            other => return Err(VmError::CallNonFunction { type_name: other.type_name() }),
        };
        self.truncate(base + 1);
        self.stack[base] = result;
        Ok(())
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp == self.stack.len() {
            return Err(VmError::StackOverflow { capacity: self.stack.len() });
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        if self.sp == 0 {
            return Err(underflow());
        }
        self.sp -= 1;
        Ok(std::mem::take(&mut self.stack[self.sp]))
    }

    fn peek(&self) -> VmResult<&Value> {
        self.sp.checked_sub(1).map(|top| &self.stack[top]).ok_or_else(underflow)
    }

    fn slot(&self, slot: u16) -> VmResult<&Value> {
        self.stack[..self.sp].get(slot as usize).ok_or_else(|| bad_slot(slot))
    }

    fn slot_mut(&mut self, slot: u16) -> VmResult<&mut Value> {
        self.stack[..self.sp].get_mut(slot as usize).ok_or_else(|| bad_slot(slot))
    }

    /// Drop everything at or above `len`, releasing shared values.
    fn truncate(&mut self, len: usize) {
        for v in &mut self.stack[len..self.sp] {
            *v = Value::Nil;
        }
        self.sp = len;
    }

    fn reset(&mut self) {
        self.truncate(0);
    }
}

fn constant(constants: &[Value], ci: u16) -> VmResult<&Value> {
    constants
        .get(ci as usize)
        .ok_or_else(|| VmError::MalformedProgram(format!("constant {ci} out of range")))
}

fn underflow() -> VmError {
    VmError::MalformedProgram("operand stack underflow".into())
}

fn bad_slot(slot: u16) -> VmError {
    VmError::MalformedProgram(format!("local slot {slot} is not live"))
}
