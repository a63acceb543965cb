use std::cmp::Ordering;

use crate::program::Op;
use crate::value::Value;

use super::{VmError, VmResult};

pub(super) fn binary(op: Op, a: &Value, b: &Value) -> VmResult<Value> {
    Ok(match op {
        Op::Add => {
            let (x, y) = numbers(a, b)?;
            Value::Number(x + y)
        }
        Op::Sub => {
            let (x, y) = numbers(a, b)?;
            Value::Number(x - y)
        }
        Op::Mul => {
            let (x, y) = numbers(a, b)?;
            Value::Number(x * y)
        }
        Op::Div => {
            let (x, y) = numbers(a, b)?;
            Value::Number(x / y)
        }
        Op::IDiv => {
            let (x, y) = numbers(a, b)?;
            Value::Number((x / y).floor())
        }
        Op::Mod => {
            let (x, y) = numbers(a, b)?;
            Value::Number(floored_mod(x, y))
        }
        Op::Pow => {
            let (x, y) = numbers(a, b)?;
            Value::Number(x.powf(y))
        }
        Op::Concat => concat(a, b)?,
        Op::Eq => Value::Boolean(a == b),
        Op::Ne => Value::Boolean(a != b),
        Op::Lt => Value::Boolean(compare(a, b)? == Some(Ordering::Less)),
        Op::Le => Value::Boolean(matches!(compare(a, b)?, Some(Ordering::Less | Ordering::Equal))),
        Op::Gt => Value::Boolean(compare(a, b)? == Some(Ordering::Greater)),
        Op::Ge => Value::Boolean(matches!(compare(a, b)?, Some(Ordering::Greater | Ordering::Equal))),
        Op::BAnd => {
            let (x, y) = integers(a, b)?;
            Value::Number((x & y) as f64)
        }
        Op::BOr => {
            let (x, y) = integers(a, b)?;
            Value::Number((x | y) as f64)
        }
        Op::BXor => {
            let (x, y) = integers(a, b)?;
            Value::Number((x ^ y) as f64)
        }
        Op::Shl => {
            let (x, y) = integers(a, b)?;
            Value::Number(shift_left(x, y) as f64)
        }
        Op::Shr => {
            let (x, y) = integers(a, b)?;
            Value::Number(shift_left(x, y.saturating_neg()) as f64)
        }
        other => return Err(VmError::MalformedProgram(format!("{} is not a binary operator", other.mnemonic()))),
    })
}

pub(super) fn unary(op: Op, a: &Value) -> VmResult<Value> {
    Ok(match op {
        Op::Neg => match a {
            Value::Number(n) => Value::Number(-n),
            other => return Err(VmError::Arithmetic { type_name: other.type_name() }),
        },
        Op::Not => Value::Boolean(!a.is_truthy()),
        Op::Len => match a {
            Value::String(s) => Value::Number(s.len() as f64),
            other => return Err(VmError::Length { type_name: other.type_name() }),
        },
        Op::BNot => Value::Number(!integer(a)? as f64),
        other => return Err(VmError::MalformedProgram(format!("{} is not a unary operator", other.mnemonic()))),
    })
}

fn numbers(a: &Value, b: &Value) -> VmResult<(f64, f64)> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok((*x, *y)),
        (Value::Number(_), other) | (other, _) => Err(VmError::Arithmetic { type_name: other.type_name() }),
    }
}

/// Remainder with the sign of the divisor.
fn floored_mod(a: f64, b: f64) -> f64 {
    let m = a % b;
    if m != 0.0 && (m < 0.0) != (b < 0.0) { m + b } else { m }
}

fn integer(v: &Value) -> VmResult<i64> {
    match v {
        Value::Number(n) => {
            // 2^63 itself is out of range
            if n.fract() == 0.0 && *n >= -9_223_372_036_854_775_808.0 && *n < 9_223_372_036_854_775_808.0 {
                Ok(*n as i64)
            } else {
                Err(VmError::NoIntegerRepresentation)
            }
        }
        other => Err(VmError::Bitwise { type_name: other.type_name() }),
    }
}

fn integers(a: &Value, b: &Value) -> VmResult<(i64, i64)> {
    Ok((integer(a)?, integer(b)?))
}

/// Logical shift; negative counts shift the other way and counts of 64 or
/// more clear every bit.
fn shift_left(x: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((x as u64) << n) as i64
    } else {
        ((x as u64) >> -n) as i64
    }
}

fn concat(a: &Value, b: &Value) -> VmResult<Value> {
    let piece = |v: &Value| match v {
        Value::String(_) | Value::Number(_) => v.as_string(),
        other => Err(VmError::Concat { type_name: other.type_name() }),
    };
    let (x, y) = (piece(a)?, piece(b)?);
    let mut joined = String::with_capacity(x.len() + y.len());
    joined.push_str(&x);
    joined.push_str(&y);
    Ok(Value::from(joined))
}

/// `None` when either side is NaN.
fn compare(a: &Value, b: &Value) -> VmResult<Option<Ordering>> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(x.partial_cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(Some(x.as_bytes().cmp(y.as_bytes()))),
        _ => Err(VmError::Compare { left: a.type_name(), right: b.type_name() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn floored_modulo_follows_divisor_sign() {
        assert_eq!(floored_mod(7.0, 3.0), 1.0);
        assert_eq!(floored_mod(-7.0, 3.0), 2.0);
        assert_eq!(floored_mod(7.0, -3.0), -2.0);
        assert_eq!(floored_mod(6.0, 3.0), 0.0);
        assert!(floored_mod(1.0, 0.0).is_nan());
    }

    #[test]
    fn integer_division_floors() {
        assert_eq!(binary(Op::IDiv, &num(-7.0), &num(2.0)).unwrap(), num(-4.0));
        assert_eq!(binary(Op::Div, &num(1.0), &num(0.0)).unwrap(), num(f64::INFINITY));
    }

    #[test]
    fn shifts() {
        assert_eq!(shift_left(1, 3), 8);
        assert_eq!(shift_left(8, -3), 1);
        assert_eq!(shift_left(-1, -60), 15);
        assert_eq!(shift_left(1, 64), 0);
        assert_eq!(shift_left(1, i64::MIN), 0);
        assert_eq!(binary(Op::Shr, &num(-1.0), &num(63.0)).unwrap(), num(1.0));
    }

    #[test]
    fn integer_conversion_bounds() {
        assert_eq!(integer(&num(-0.0)).unwrap(), 0);
        assert!(integer(&num(9_223_372_036_854_775_808.0)).is_err());
        assert!(integer(&num(f64::NAN)).is_err());
        assert!(integer(&num(f64::INFINITY)).is_err());
    }

    #[test]
    fn arithmetic_names_the_offending_operand() {
        let err = binary(Op::Add, &num(1.0), &Value::Boolean(true)).unwrap_err();
        assert!(matches!(err, VmError::Arithmetic { type_name: "boolean" }));
        let err = binary(Op::Mul, &Value::Nil, &num(1.0)).unwrap_err();
        assert!(matches!(err, VmError::Arithmetic { type_name: "nil" }));
    }

    #[test]
    fn concat_formats_numbers() {
        assert_eq!(binary(Op::Concat, &num(1.0), &num(2.5)).unwrap(), Value::from("12.5"));
        assert!(binary(Op::Concat, &Value::from("a"), &Value::Boolean(false)).is_err());
    }

    #[test]
    fn nan_compares_false() {
        let nan = num(f64::NAN);
        assert_eq!(binary(Op::Eq, &nan, &nan).unwrap(), Value::Boolean(false));
        assert_eq!(binary(Op::Lt, &nan, &num(1.0)).unwrap(), Value::Boolean(false));
        assert_eq!(binary(Op::Le, &nan, &nan).unwrap(), Value::Boolean(false));
        assert_eq!(binary(Op::Ge, &num(1.0), &nan).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn non_operators_are_rejected() {
        assert!(binary(Op::Neg, &num(1.0), &num(1.0)).is_err());
        assert!(unary(Op::Add, &num(1.0)).is_err());
    }
}
