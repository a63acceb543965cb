use std::collections::HashMap;
use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::span::Span;
use crate::value::Value;

/// Largest number of entries the constant pool and the global table may
/// hold; indices must fit the 16-bit operands.
pub const MAX_INDEX_ENTRIES: usize = u16::MAX as usize;

/// One bytecode instruction. Operands are unsigned indices into the
/// constant pool, the operand stack, or the code itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Op {
    /// Halt the loop.
    Exit,
    /// Push `constants[ci]`.
    LoadConst(u16),
    /// Push the global named by the string constant `constants[ci]`.
    LoadGlobal(u16),
    /// Pop into the global named by `constants[ci]`.
    SetGlobal(u16),
    /// Push a copy of the local in stack slot `slot`.
    GetLocal(u16),
    /// Pop into the local in stack slot `slot`.
    SetLocal(u16),
    /// Drop `n` values.
    Pop(u16),
    /// Call the value in slot `base` with the `argc` values above it; the
    /// result replaces the callee and the stack ends at `base + 1`.
    Call(u16, u8),

    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,

    Neg,
    Not,
    Len,
    BNot,

    /// Unconditional jump to an absolute code index.
    Jump(u32),
    /// Pop; jump when the value is falsy.
    JumpIfFalse(u32),
    /// Jump keeping the top when it is falsy, otherwise pop it (`and`).
    JumpIfFalseOrPop(u32),
    /// Jump keeping the top when it is truthy, otherwise pop it (`or`).
    JumpIfTrueOrPop(u32),
}

impl Op {
    /// Net change in stack depth when execution falls through to the next
    /// instruction.
    pub fn stack_effect(self) -> isize {
        match self {
            Op::Exit | Op::Jump(_) => 0,
            Op::LoadConst(_) | Op::LoadGlobal(_) | Op::GetLocal(_) => 1,
            Op::SetGlobal(_) | Op::SetLocal(_) => -1,
            Op::Pop(n) => -(n as isize),
            Op::Call(_, argc) => -(argc as isize),
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
            | Op::Shr => -1,
            Op::Neg | Op::Not | Op::Len | Op::BNot => 0,
            Op::JumpIfFalse(_) | Op::JumpIfFalseOrPop(_) | Op::JumpIfTrueOrPop(_) => -1,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Exit => "EXIT",
            Op::LoadConst(_) => "LOADCONST",
            Op::LoadGlobal(_) => "LOADGLOBAL",
            Op::SetGlobal(_) => "SETGLOBAL",
            Op::GetLocal(_) => "GETLOCAL",
            Op::SetLocal(_) => "SETLOCAL",
            Op::Pop(_) => "POP",
            Op::Call(..) => "CALL",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::IDiv => "IDIV",
            Op::Mod => "MOD",
            Op::Pow => "POW",
            Op::Concat => "CONCAT",
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::Lt => "LT",
            Op::Le => "LE",
            Op::Gt => "GT",
            Op::Ge => "GE",
            Op::BAnd => "BAND",
            Op::BOr => "BOR",
            Op::BXor => "BXOR",
            Op::Shl => "SHL",
            Op::Shr => "SHR",
            Op::Neg => "NEG",
            Op::Not => "NOT",
            Op::Len => "LEN",
            Op::BNot => "BNOT",
            Op::Jump(_) => "JUMP",
            Op::JumpIfFalse(_) => "JUMPIFFALSE",
            Op::JumpIfFalseOrPop(_) => "JUMPIFFALSEORPOP",
            Op::JumpIfTrueOrPop(_) => "JUMPIFTRUEORPOP",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.mnemonic();
        match *self {
            Op::LoadConst(i) | Op::LoadGlobal(i) | Op::SetGlobal(i) | Op::GetLocal(i) | Op::SetLocal(i) | Op::Pop(i) => {
                write!(f, "{name} {i}")
            }
            Op::Call(base, argc) => write!(f, "{name} {base} {argc}"),
            Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfFalseOrPop(t) | Op::JumpIfTrueOrPop(t) => {
                write!(f, "{name} {t}")
            }
            _ => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Global {
    pub name: String,
    pub value: Value,
}

/// Name → value table for top-level variables. Insertion order is the order
/// names were first referenced and fixes each global's index.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Globals {
    entries: Vec<Global>,
}

impl Globals {
    pub fn new() -> Self {
        Globals::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|g| g.name == name)
    }

    /// Index of `name`, appending it with a `Nil` placeholder on first sight.
    pub fn intern(&mut self, name: &str) -> usize {
        match self.index_of(name) {
            Some(i) => i,
            None => {
                self.entries.push(Global { name: name.into(), value: Value::Nil });
                self.entries.len() - 1
            }
        }
    }

    /// The value bound to `name`, `Nil` when absent.
    pub fn get(&self, name: &str) -> Value {
        self.index_of(name)
            .map(|i| self.entries[i].value.clone())
            .unwrap_or_default()
    }

    pub fn set(&mut self, name: &str, value: Value) {
        let i = self.intern(name);
        self.entries[i].value = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Global> {
        self.entries.iter()
    }
}

/// Hashable identity of a constant; two values with the same key are
/// structurally equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Nil,
    Boolean(bool),
    Number(u64),
    String(String),
}

impl ConstKey {
    fn of(value: &Value) -> Option<ConstKey> {
        match value {
            Value::Nil => Some(ConstKey::Nil),
            Value::Boolean(b) => Some(ConstKey::Boolean(*b)),
            // NaN equals nothing, so it never shares a slot
            Value::Number(n) if n.is_nan() => None,
            // 0.0 == -0.0
            Value::Number(n) if *n == 0.0 => Some(ConstKey::Number(0f64.to_bits())),
            Value::Number(n) => Some(ConstKey::Number(n.to_bits())),
            Value::String(s) => Some(ConstKey::String(s.to_string())),
            Value::Function(_) => None,
        }
    }
}

/// De-duplicating constant table built up by the compiler.
#[derive(Debug, Default)]
pub struct ConstantPool {
    values: Vec<Value>,
    index: HashMap<ConstKey, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        ConstantPool::default()
    }

    /// Index of `value`, reusing a structurally equal entry. `None` once the
    /// pool is full.
    pub fn add(&mut self, value: Value) -> Option<u16> {
        let key = ConstKey::of(&value);
        if let Some(i) = key.as_ref().and_then(|k| self.index.get(k)) {
            return Some(*i);
        }
        if self.values.len() >= MAX_INDEX_ENTRIES {
            return None;
        }
        let i = self.values.len() as u16;
        self.values.push(value);
        if let Some(k) = key {
            self.index.insert(k, i);
        }
        Some(i)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Compiler output: constant pool, global table and code. Every index an
/// `Op` embeds is valid for the tables of the same `Program`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Program {
    pub constants: Vec<Value>,
    pub globals: Globals,
    pub code: Vec<Op>,
    /// Source span of each instruction, parallel to `code`.
    #[serde(skip)]
    pub spans: Vec<Span>,
}

impl Program {
    pub fn new(globals: Globals) -> Self {
        Program { constants: Vec::new(), globals, code: Vec::new(), spans: Vec::new() }
    }

    /// Where the instruction at `ip` came from, when known.
    pub fn span_at(&self, ip: usize) -> Option<Span> {
        self.spans.get(ip).copied()
    }

    /// Human-readable listing: constants, globals, then numbered code.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "constants ({}):", self.constants.len());
        for (i, c) in self.constants.iter().enumerate() {
            let _ = writeln!(out, "  [{i}] {}", constant_repr(c));
        }
        let _ = writeln!(out, "globals ({}):", self.globals.len());
        for (i, g) in self.globals.iter().enumerate() {
            let _ = writeln!(out, "  [{i}] {}", g.name);
        }
        let _ = writeln!(out, "code ({}):", self.code.len());
        for (ip, op) in self.code.iter().enumerate() {
            let _ = write!(out, "  {ip:>4}  {op}");
            match *op {
                Op::LoadConst(i) | Op::LoadGlobal(i) | Op::SetGlobal(i) => {
                    if let Some(c) = self.constants.get(i as usize) {
                        let _ = write!(out, "\t; {}", constant_repr(c));
                    }
                }
                _ => {}
            }
            out.push('\n');
        }
        out
    }
}

fn constant_repr(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_deduplicated() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.add(Value::from("hi")), Some(0));
        assert_eq!(pool.add(Value::Number(1.0)), Some(1));
        assert_eq!(pool.add(Value::from("hi")), Some(0));
        assert_eq!(pool.add(Value::Number(1.0)), Some(1));
        assert_eq!(pool.add(Value::Nil), Some(2));
        assert_eq!(pool.add(Value::Nil), Some(2));
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn functions_are_never_shared() {
        let mut pool = ConstantPool::new();
        let f = Value::native("f", |_, _| Ok(Value::Nil));
        assert_eq!(pool.add(f.clone()), Some(0));
        assert_eq!(pool.add(f), Some(1));
    }

    #[test]
    fn constant_pool_overflow() {
        let mut pool = ConstantPool::new();
        for i in 0..MAX_INDEX_ENTRIES {
            assert!(pool.add(Value::Number(i as f64)).is_some());
        }
        assert_eq!(pool.add(Value::Number(-1.0)), None);
        // existing entries still resolve
        assert_eq!(pool.add(Value::Number(7.0)), Some(7));
    }

    #[test]
    fn globals_keep_first_reference_order() {
        let mut g = Globals::new();
        assert_eq!(g.intern("print"), 0);
        assert_eq!(g.intern("x"), 1);
        assert_eq!(g.intern("print"), 0);
        assert!(g.get("x").is_nil());
        g.set("x", Value::Number(3.0));
        assert_eq!(g.get("x"), Value::Number(3.0));
        assert_eq!(g.index_of("x"), Some(1));
        assert!(g.get("missing").is_nil());
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn stack_effects() {
        assert_eq!(Op::LoadConst(0).stack_effect(), 1);
        assert_eq!(Op::Call(0, 3).stack_effect(), -3);
        assert_eq!(Op::Add.stack_effect(), -1);
        assert_eq!(Op::Neg.stack_effect(), 0);
        assert_eq!(Op::Pop(2).stack_effect(), -2);
    }

    #[test]
    fn disassembly_listing() {
        let mut p = Program::default();
        p.globals.intern("print");
        p.constants = vec![Value::from("print"), Value::from("hi")];
        p.code = vec![Op::LoadGlobal(0), Op::LoadConst(1), Op::Call(0, 1), Op::Exit];
        let text = p.disassemble();
        assert!(text.contains("[0] print"), "{text}");
        assert!(text.contains("LOADGLOBAL 0\t; \"print\""), "{text}");
        assert!(text.contains("CALL 0 1"), "{text}");
        assert!(text.contains("EXIT"), "{text}");
    }

    #[test]
    fn program_serializes() {
        let mut p = Program::default();
        p.constants.push(Value::Number(2.0));
        p.code = vec![Op::LoadConst(0), Op::Exit];
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["constants"][0], 2.0);
        assert_eq!(json["code"][0]["LoadConst"], 0);
        assert_eq!(json["code"][1], "Exit");
    }
}
