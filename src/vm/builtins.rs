use std::fmt::Write as _;

use crate::value::{CallContext, Value};

use super::VmError;

/// `print(...)`: every argument in `tostring` form, tab separated, then a
/// newline. Returns nil.
pub(super) fn print(ctx: &mut CallContext<'_>, args: &[Value]) -> Result<Value, VmError> {
    let mut line = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        let _ = write!(line, "{arg}");
    }
    line.push('\n');
    ctx.out.write_all(line.as_bytes())?;
    Ok(Value::Nil)
}
