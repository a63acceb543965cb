pub mod ansi;
pub mod json;
pub mod registry;

use crate::compiler::{CompileError, SyntaxError, SyntaxErrorKind};
use crate::error::Error;
use crate::lexer::{LexError, LexErrorKind};
use crate::span::Span;
use crate::vm::{RuntimeError, VmError};

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub is_primary: bool,
}

/// A renderable error report: stable code, message, source labels and
/// hints. Renderers live in `ansi` and `json`.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<&'static str>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: true });
        self
    }

    pub fn with_secondary_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: false });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// ---- From impls for the pipeline's error types ----

impl From<&LexError> for Diagnostic {
    fn from(e: &LexError) -> Self {
        let (code, message) = match e.kind {
            LexErrorKind::UnknownCharacter => ("LUN-L001", format!("unexpected character '{}'", e.snippet)),
            LexErrorKind::UnterminatedString => ("LUN-L002", "unterminated string".to_string()),
            LexErrorKind::MalformedNumber => ("LUN-L003", format!("malformed number '{}'", e.snippet)),
        };
        let span = Span::new(e.span.start, e.span.end.max(e.span.start + 1));
        let mut d = Diagnostic::error(message).with_code(code).with_span(span, "here");
        if e.kind == LexErrorKind::UnterminatedString {
            d = d.with_suggestion("close the string with the quote that opened it");
        }
        d
    }
}

impl From<&SyntaxError> for Diagnostic {
    fn from(e: &SyntaxError) -> Self {
        let code = match e.kind {
            SyntaxErrorKind::UnexpectedToken { .. } => "LUN-S001",
            SyntaxErrorKind::UnexpectedEof { .. } => "LUN-S002",
            SyntaxErrorKind::UnsupportedStatement(_) => "LUN-S003",
            SyntaxErrorKind::UnsupportedExpression(_) => "LUN-S004",
            SyntaxErrorKind::TooManyConstants => "LUN-S005",
            SyntaxErrorKind::TooManyGlobals => "LUN-S006",
            SyntaxErrorKind::TooManyLocals => "LUN-S007",
            SyntaxErrorKind::TooManyArguments => "LUN-S008",
            SyntaxErrorKind::ExpressionTooComplex => "LUN-S009",
            SyntaxErrorKind::BlockTooDeep => "LUN-S010",
        };
        let mut d = Diagnostic::error(e.kind.to_string()).with_code(code).with_span(e.span, "here");
        if let Some(opener) = e.opened_at {
            d = d.with_secondary_span(opener, "block opened here");
        }
        match e.kind {
            SyntaxErrorKind::UnsupportedStatement(_) => {
                d.with_note("statements compiled here: assignment, call, local, do, if, while")
            }
            SyntaxErrorKind::UnexpectedEof { .. } => d.with_note("the source ended before this construct was complete"),
            _ => d,
        }
    }
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        match e {
            CompileError::Lex(e) => e.into(),
            CompileError::Syntax(e) => e.into(),
        }
    }
}

/// Stable code for a VM fault.
pub fn vm_error_code(e: &VmError) -> &'static str {
    match e {
        VmError::TypeMismatch { .. } => "LUN-R001",
        VmError::CallNonFunction { .. } => "LUN-R002",
        VmError::UnboundFunction { .. } => "LUN-R003",
        VmError::Arithmetic { .. } => "LUN-R004",
        VmError::Bitwise { .. } | VmError::NoIntegerRepresentation => "LUN-R005",
        VmError::Concat { .. } => "LUN-R006",
        VmError::Compare { .. } => "LUN-R007",
        VmError::Length { .. } => "LUN-R008",
        VmError::StackOverflow { .. } => "LUN-R009",
        VmError::MalformedProgram(_) => "LUN-R010",
        VmError::Output(_) => "LUN-R011",
        VmError::Native(_) => "LUN-R012",
    }
}

impl From<&RuntimeError> for Diagnostic {
    fn from(e: &RuntimeError) -> Self {
        let mut d = Diagnostic::error(e.source.to_string()).with_code(vm_error_code(&e.source));
        if let Some(span) = e.span {
            d = d.with_span(span, "while evaluating this");
        }
        match e.op {
            Some(op) => d = d.with_note(format!("at instruction {} ({op})", e.ip)),
            None => d = d.with_note(format!("at instruction {}", e.ip)),
        }
        match &e.source {
            VmError::CallNonFunction { type_name: "nil" } => {
                d.with_suggestion("undefined globals read as nil; check the name or register it with the host")
            }
            VmError::StackOverflow { .. } => d.with_suggestion("raise the limit with --stack-size"),
            _ => d,
        }
    }
}

impl From<&Error> for Diagnostic {
    fn from(e: &Error) -> Self {
        match e {
            Error::Compile(e) => e.into(),
            Error::Runtime(e) => e.into(),
        }
    }
}
