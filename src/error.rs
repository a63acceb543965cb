use crate::compiler::CompileError;
use crate::lexer::LexError;
use crate::span::Span;
use crate::vm::RuntimeError;

/// Any failure between source text and a finished run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<LexError> for Error {
    fn from(e: LexError) -> Self {
        Error::Compile(e.into())
    }
}

impl Error {
    /// Source location of the failure, when one is known.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Compile(e) => Some(e.span()),
            Error::Runtime(e) => e.span,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
