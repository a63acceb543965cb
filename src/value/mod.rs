use std::fmt;
use std::io::Write;
use std::rc::Rc;

use serde::{Serialize, Serializer};

use crate::vm::VmError;

/// A runtime value. Scalars copy; strings and functions share ownership, so
/// pushing a constant never aliases the constant pool's storage mutably.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Function(Function),
}

/// Host state a native function may touch while it runs.
pub struct CallContext<'a> {
    pub out: &'a mut dyn Write,
}

pub type NativeFn = dyn Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, VmError>;

/// A callable supplied by the host.
pub struct NativeFunction {
    pub name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn call(&self, ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, VmError> {
        (self.func)(ctx, args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A function defined in script: an entry point into a program's code plus
/// the values it captured. The single-frame VM does not enter these yet.
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    pub name: String,
    pub entry: usize,
    pub arity: u8,
    pub captured: Vec<Value>,
}

#[derive(Debug, Clone)]
pub enum Function {
    Native(Rc<NativeFunction>),
    Script(Rc<ScriptFunction>),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Native(f) => &f.name,
            Function::Script(f) => &f.name,
        }
    }
}

impl Value {
    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, VmError> + 'static,
    {
        Value::Function(Function::Native(Rc::new(NativeFunction {
            name: name.into(),
            func: Box::new(func),
        })))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    /// Lua truthiness: only `nil` and `false` are false.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Result<bool, VmError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(mismatch("boolean", other)),
        }
    }

    pub fn as_number(&self) -> Result<f64, VmError> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(mismatch("number", other)),
        }
    }

    /// Strings as-is; numbers coerce to their textual form.
    pub fn as_string(&self) -> Result<Rc<str>, VmError> {
        match self {
            Value::String(s) => Ok(Rc::clone(s)),
            Value::Number(n) => Ok(format_number(*n).into()),
            other => Err(mismatch("string", other)),
        }
    }

    /// Borrow a string without coercion.
    pub fn as_str(&self) -> Result<&str, VmError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", other)),
        }
    }
}

fn mismatch(expected: &'static str, found: &Value) -> VmError {
    VmError::TypeMismatch { expected, found: found.type_name() }
}

/// Numbers that hold an integer print without a fraction, like Lua's `%.14g`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan".into() } else { "nan".into() };
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            // functions are never compared
            _ => false,
        }
    }
}

/// `tostring` rendering, total over every variant.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Function(func) => write!(f, "function: {}", func.name()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Function(func) => serializer.serialize_str(&format!("function: {}", func.name())),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}
