/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    /// One line, for listings.
    pub short: &'static str,
    /// Full explanation for `--explain`.
    pub long: &'static str,
}

/// Every stable diagnostic code.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Lexer ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "LUN-L001",
        short: "unexpected character",
        long: r#"## LUN-L001: unexpected character

A character that cannot start any token was found.

**Example:**

    x = 1 @ 2

`@` is not an operator. Outside strings and comments only names,
numbers, punctuation and whitespace may appear.
"#,
    },
    ErrorEntry {
        code: "LUN-L002",
        short: "unterminated string",
        long: r#"## LUN-L002: unterminated string

A string literal was opened with `"` or `'` and the source ended
before the matching quote.

**Example:**

    print("hello)

**Fix:** close the string with the same quote that opened it. A
literal newline may be embedded by escaping it with `\`.
"#,
    },
    ErrorEntry {
        code: "LUN-L003",
        short: "malformed number",
        long: r#"## LUN-L003: malformed number

A numeric literal is not well formed: an exponent without digits,
a hex prefix without digits, or letters glued to the digits.

**Examples:**

    x = 1e
    x = 0x
    x = 3abc
"#,
    },
    // ── Syntax ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "LUN-S001",
        short: "unexpected token",
        long: r#"## LUN-S001: unexpected token

The compiler expected one construct and found a different token.
The message names both.

**Example:**

    x + 1

An expression on its own is not a statement. Assign it (`y = x + 1`)
or pass it to a call (`print(x + 1)`).
"#,
    },
    ErrorEntry {
        code: "LUN-S002",
        short: "unexpected end of input",
        long: r#"## LUN-S002: unexpected end of input

The source ended in the middle of a construct: an unclosed call,
an operator with no right operand, or a block with no `end`.

**Example:**

    if x then print(x)
"#,
    },
    ErrorEntry {
        code: "LUN-S003",
        short: "unsupported statement",
        long: r#"## LUN-S003: unsupported statement

The statement is valid Lua but this compiler does not generate code
for it. Supported statements are assignment to a name, calls, `local`,
`do ... end`, `if ... end` and `while ... end`.

Function definitions, `for`, `repeat`, `return`, `break`, `goto` and
labels are rejected.
"#,
    },
    ErrorEntry {
        code: "LUN-S004",
        short: "unsupported expression",
        long: r#"## LUN-S004: unsupported expression

Table constructors (`{}`), anonymous functions and varargs (`...`)
are not compiled.
"#,
    },
    ErrorEntry {
        code: "LUN-S005",
        short: "too many constants",
        long: r#"## LUN-S005: too many constants

A program may hold at most 65535 distinct constants, because the
instructions address them with 16-bit operands. Equal literals share
one entry.
"#,
    },
    ErrorEntry {
        code: "LUN-S006",
        short: "too many globals",
        long: r#"## LUN-S006: too many globals

A program may name at most 65535 distinct globals.
"#,
    },
    ErrorEntry {
        code: "LUN-S007",
        short: "too many locals",
        long: r#"## LUN-S007: too many locals

At most 200 local variables may be in scope at once. Wrap groups of
locals in `do ... end` blocks so they are released sooner.
"#,
    },
    ErrorEntry {
        code: "LUN-S008",
        short: "too many arguments",
        long: r#"## LUN-S008: too many arguments

A call may pass at most 255 arguments.
"#,
    },
    ErrorEntry {
        code: "LUN-S009",
        short: "expression too complex",
        long: r#"## LUN-S009: expression too complex

The expression nests parentheses or operators too deeply. Split it
across several assignments.
"#,
    },
    ErrorEntry {
        code: "LUN-S010",
        short: "blocks nested too deeply",
        long: r#"## LUN-S010: blocks nested too deeply

`do`, `if` and `while` blocks may nest at most 200 deep. Move inner
work into separate top-level statements.
"#,
    },
    // ── Runtime ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "LUN-R001",
        short: "type mismatch",
        long: r#"## LUN-R001: type mismatch

A value of one type was used where another was required, for example
a global name constant that is not a string, or a host function
receiving an argument of the wrong type.
"#,
    },
    ErrorEntry {
        code: "LUN-R002",
        short: "call of a non-function value",
        long: r#"## LUN-R002: call of a non-function value

The callee of a call is not a function.

**Example:**

    nosuch("x")

Undefined globals read as `nil`, so calling a misspelled or
unregistered name reports `attempt to call a nil value`.
"#,
    },
    ErrorEntry {
        code: "LUN-R003",
        short: "call of an unbound script function",
        long: r#"## LUN-R003: call of an unbound script function

The callee is a script function, which the single-frame VM cannot
enter. Only host-provided functions can be called.
"#,
    },
    ErrorEntry {
        code: "LUN-R004",
        short: "arithmetic on a non-number",
        long: r#"## LUN-R004: arithmetic on a non-number

Arithmetic operators accept numbers only. Strings are not coerced.

**Example:**

    x = "1" + 1
"#,
    },
    ErrorEntry {
        code: "LUN-R005",
        short: "bitwise operation on a non-integer",
        long: r#"## LUN-R005: bitwise operation on a non-integer

Bitwise operators need numbers with an exact 64-bit integer value.

**Examples:**

    x = 1.5 | 0
    x = "3" & 1
"#,
    },
    ErrorEntry {
        code: "LUN-R006",
        short: "concatenation of a non-string",
        long: r#"## LUN-R006: concatenation of a non-string

`..` joins strings and numbers. Any other operand is an error.

**Example:**

    x = "a" .. nil
"#,
    },
    ErrorEntry {
        code: "LUN-R007",
        short: "invalid comparison",
        long: r#"## LUN-R007: invalid comparison

`<`, `<=`, `>` and `>=` compare two numbers or two strings. Mixed or
other operands are an error. `==` and `~=` accept anything.
"#,
    },
    ErrorEntry {
        code: "LUN-R008",
        short: "length of a non-string",
        long: r#"## LUN-R008: length of a non-string

`#` applies to strings only and yields their length in bytes.
"#,
    },
    ErrorEntry {
        code: "LUN-R009",
        short: "stack overflow",
        long: r#"## LUN-R009: stack overflow

The operand stack has a fixed number of slots (256 by default).
Deeply nested calls with many arguments, or many live locals, can
exhaust it. The CLI accepts `--stack-size` to change the limit.
"#,
    },
    ErrorEntry {
        code: "LUN-R010",
        short: "malformed program",
        long: r#"## LUN-R010: malformed program

The bytecode is inconsistent: an index out of range, a stack
underflow, a call frame that does not match the stack, or code with
no `EXIT`. The compiler never produces such programs; hand-built
ones can.
"#,
    },
    ErrorEntry {
        code: "LUN-R011",
        short: "output failed",
        long: r#"## LUN-R011: output failed

Writing to the output sink failed, for example because standard
output was closed.
"#,
    },
    ErrorEntry {
        code: "LUN-R012",
        short: "host function error",
        long: r#"## LUN-R012: host function error

A function registered by the host reported an error. The message is
the host's own.
"#,
    },
];

/// Look up an error entry by code (e.g. `"LUN-R002"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_code() {
        let e = lookup("LUN-R002").expect("LUN-R002 should be in registry");
        assert_eq!(e.code, "LUN-R002");
        assert!(e.long.contains("LUN-R002"));
        assert_eq!(lookup("lun-r002").map(|e| e.code), Some("LUN-R002"));
    }

    #[test]
    fn lookup_unknown_returns_none() {
        assert!(lookup("LUN-X999").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn all_codes_unique() {
        let mut codes: Vec<&str> = REGISTRY.iter().map(|e| e.code).collect();
        codes.sort_unstable();
        let len_before = codes.len();
        codes.dedup();
        assert_eq!(codes.len(), len_before, "duplicate codes in registry");
    }

    #[test]
    fn every_entry_explains_itself() {
        for entry in REGISTRY {
            assert!(!entry.short.is_empty(), "{} missing short description", entry.code);
            assert!(entry.long.starts_with(&format!("## {}", entry.code)), "{} heading", entry.code);
        }
    }
}
