mod scope;

use crate::lexer::{LexError, Lexer, Token};
use crate::program::{ConstantPool, Globals, MAX_INDEX_ENTRIES, Op, Program};
use crate::span::Span;
use crate::value::Value;

use scope::Scope;

pub use scope::MAX_LOCALS;

/// Most arguments a single call may pass; the count travels in one byte.
pub const MAX_ARGUMENTS: usize = u8::MAX as usize;

/// Deepest nesting of sub-expressions the compiler follows before giving up.
const MAX_NESTING: usize = 200;

/// Deepest nesting of `do`, `if` and `while` blocks.
const MAX_BLOCK_NESTING: usize = 200;

/// Priority of unary operators: binds tighter than every binary operator
/// except `^`.
const UNARY_PRIORITY: u8 = 11;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyntaxErrorKind {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: &'static str, found: String },
    #[error("expected {expected}, found end of input")]
    UnexpectedEof { expected: &'static str },
    #[error("'{0}' statements are not supported")]
    UnsupportedStatement(&'static str),
    #[error("'{0}' is not supported in expressions")]
    UnsupportedExpression(&'static str),
    #[error("more than 65535 distinct constants")]
    TooManyConstants,
    #[error("more than 65535 globals")]
    TooManyGlobals,
    #[error("more than 200 local variables in scope")]
    TooManyLocals,
    #[error("more than 255 arguments in one call")]
    TooManyArguments,
    #[error("expression nests too deeply")]
    ExpressionTooComplex,
    #[error("blocks nest more than 200 deep")]
    BlockTooDeep,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("syntax error at offset {}: {kind}", .span.start)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub span: Span,
    /// The keyword that opened a block left unclosed.
    pub opened_at: Option<Span>,
}

/// Anything that stops a source from becoming a `Program`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::Lex(e) => e.span,
            CompileError::Syntax(e) => e.span,
        }
    }
}

type Result<T> = std::result::Result<T, CompileError>;

/// Where an assignment stores its value.
#[derive(Debug, Clone, Copy)]
enum Target {
    Local(u16),
    Global(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BOr,
    BXor,
    BAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Concat,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
}

impl BinOp {
    fn from_token(token: &Token) -> Option<BinOp> {
        Some(match token {
            Token::Or => BinOp::Or,
            Token::And => BinOp::And,
            Token::Eq => BinOp::Eq,
            Token::NotEq => BinOp::Ne,
            Token::Less => BinOp::Lt,
            Token::LessEq => BinOp::Le,
            Token::Greater => BinOp::Gt,
            Token::GreaterEq => BinOp::Ge,
            Token::Pipe => BinOp::BOr,
            Token::Tilde => BinOp::BXor,
            Token::Amp => BinOp::BAnd,
            Token::ShiftLeft => BinOp::Shl,
            Token::ShiftRight => BinOp::Shr,
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            Token::DotDot => BinOp::Concat,
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::SlashSlash => BinOp::IDiv,
            Token::Percent => BinOp::Mod,
            Token::Caret => BinOp::Pow,
            _ => return None,
        })
    }

    /// (left, right) binding priorities. A right priority below the left
    /// one makes the operator right associative.
    fn priority(self) -> (u8, u8) {
        match self {
            BinOp::Or => (1, 1),
            BinOp::And => (2, 2),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => (3, 3),
            BinOp::BOr => (4, 4),
            BinOp::BXor => (5, 5),
            BinOp::BAnd => (6, 6),
            BinOp::Shl | BinOp::Shr => (7, 7),
            BinOp::Add | BinOp::Sub => (8, 8),
            BinOp::Concat => (9, 8),
            BinOp::Mul | BinOp::Div | BinOp::IDiv | BinOp::Mod => (10, 10),
            BinOp::Pow => (12, 11),
        }
    }

    /// The opcode for this operator; `None` for the short-circuit ones,
    /// which compile to jumps.
    fn op(self) -> Option<Op> {
        Some(match self {
            BinOp::Eq => Op::Eq,
            BinOp::Ne => Op::Ne,
            BinOp::Lt => Op::Lt,
            BinOp::Le => Op::Le,
            BinOp::Gt => Op::Gt,
            BinOp::Ge => Op::Ge,
            BinOp::BOr => Op::BOr,
            BinOp::BXor => Op::BXor,
            BinOp::BAnd => Op::BAnd,
            BinOp::Shl => Op::Shl,
            BinOp::Shr => Op::Shr,
            BinOp::Add => Op::Add,
            BinOp::Sub => Op::Sub,
            BinOp::Concat => Op::Concat,
            BinOp::Mul => Op::Mul,
            BinOp::Div => Op::Div,
            BinOp::IDiv => Op::IDiv,
            BinOp::Mod => Op::Mod,
            BinOp::Pow => Op::Pow,
            BinOp::And | BinOp::Or => return None,
        })
    }
}

fn unary_op(token: &Token) -> Option<Op> {
    match token {
        Token::Minus => Some(Op::Neg),
        Token::Not => Some(Op::Not),
        Token::Hash => Some(Op::Len),
        Token::Tilde => Some(Op::BNot),
        _ => None,
    }
}

/// Single-pass compiler: pulls tokens from the lexer and emits code as it
/// recognises each construct. There is no syntax tree.
pub struct Compiler<'src> {
    lexer: Lexer<'src>,
    current: (Token, Span),
    constants: ConstantPool,
    globals: Globals,
    code: Vec<Op>,
    spans: Vec<Span>,
    scope: Scope,
    /// Operand-stack depth at the current point of the code.
    depth: usize,
    nesting: usize,
    blocks: usize,
    /// Highest code index any jump was patched to.
    last_label: usize,
}

impl<'src> Compiler<'src> {
    pub fn new(source: &'src str, globals: Globals) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Compiler {
            lexer,
            current,
            constants: ConstantPool::new(),
            globals,
            code: Vec::new(),
            spans: Vec::new(),
            scope: Scope::default(),
            depth: 0,
            nesting: 0,
            blocks: 0,
            last_label: 0,
        })
    }

    /// Compile the whole chunk and hand back the finished program.
    pub fn compile_chunk(mut self) -> Result<Program> {
        while self.current.0 != Token::Eof {
            self.statement()?;
        }
        Ok(self.finish())
    }

    // ---- Token cursor ----

    fn advance(&mut self) -> Result<(Token, Span)> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn check(&self, token: &Token) -> bool {
        self.current.0 == *token
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<Span> {
        if self.check(&token) {
            Ok(self.advance()?.1)
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// `expect`, remembering where the construct being closed began.
    fn expect_close(&mut self, token: Token, expected: &'static str, opener: Span) -> Result<Span> {
        self.expect(token, expected).map_err(|e| match e {
            CompileError::Syntax(mut e) => {
                e.opened_at = Some(opener);
                CompileError::Syntax(e)
            }
            other => other,
        })
    }

    fn expect_name(&mut self, expected: &'static str) -> Result<(String, Span)> {
        if matches!(self.current.0, Token::Ident(_)) {
            if let (Token::Ident(name), span) = self.advance()? {
                return Ok((name, span));
            }
        }
        Err(self.unexpected(expected))
    }

    fn unexpected(&self, expected: &'static str) -> CompileError {
        let (token, span) = &self.current;
        let kind = match token {
            Token::Eof => SyntaxErrorKind::UnexpectedEof { expected },
            other => SyntaxErrorKind::UnexpectedToken { expected, found: other.to_string() },
        };
        self.error(kind, *span)
    }

    fn error(&self, kind: SyntaxErrorKind, span: Span) -> CompileError {
        SyntaxError { kind, span, opened_at: None }.into()
    }

    // ---- Emission ----

    fn emit(&mut self, op: Op, span: Span) -> usize {
        let at = self.code.len();
        self.code.push(op);
        self.spans.push(span);
        self.depth = self.depth.saturating_add_signed(op.stack_effect());
        at
    }

    fn here(&self, span: Span) -> Result<u32> {
        u32::try_from(self.code.len()).map_err(|_| self.error(SyntaxErrorKind::ExpressionTooComplex, span))
    }

    /// Point the jump at `at` to the next instruction to be emitted.
    fn patch(&mut self, at: usize) -> Result<()> {
        let target = self.here(self.spans[at])?;
        self.code[at] = match self.code[at] {
            Op::Jump(_) => Op::Jump(target),
            Op::JumpIfFalse(_) => Op::JumpIfFalse(target),
            Op::JumpIfFalseOrPop(_) => Op::JumpIfFalseOrPop(target),
            Op::JumpIfTrueOrPop(_) => Op::JumpIfTrueOrPop(target),
            other => other,
        };
        self.last_label = self.last_label.max(self.code.len());
        Ok(())
    }

    fn constant(&mut self, value: Value, span: Span) -> Result<u16> {
        match self.constants.add(value) {
            Some(ci) => Ok(ci),
            None => Err(self.error(SyntaxErrorKind::TooManyConstants, span)),
        }
    }

    fn load_constant(&mut self, value: Value, span: Span) -> Result<()> {
        let ci = self.constant(value, span)?;
        self.emit(Op::LoadConst(ci), span);
        Ok(())
    }

    /// Register `name` as a global and return the index of the string
    /// constant the VM uses to find it.
    fn global_name(&mut self, name: &str, span: Span) -> Result<u16> {
        if self.globals.index_of(name).is_none() && self.globals.len() >= MAX_INDEX_ENTRIES {
            return Err(self.error(SyntaxErrorKind::TooManyGlobals, span));
        }
        self.globals.intern(name);
        self.constant(Value::from(name), span)
    }

    fn resolve(&mut self, name: &str, span: Span) -> Result<Target> {
        match self.scope.resolve(name) {
            Some(slot) => Ok(Target::Local(slot)),
            None => Ok(Target::Global(self.global_name(name, span)?)),
        }
    }

    fn load_name(&mut self, name: &str, span: Span) -> Result<()> {
        let op = match self.resolve(name, span)? {
            Target::Local(slot) => Op::GetLocal(slot),
            Target::Global(ci) => Op::LoadGlobal(ci),
        };
        self.emit(op, span);
        Ok(())
    }

    fn store(&mut self, target: Target, span: Span) {
        let op = match target {
            Target::Local(slot) => Op::SetLocal(slot),
            Target::Global(ci) => Op::SetGlobal(ci),
        };
        self.emit(op, span);
    }

    // ---- Statements ----

    fn statement(&mut self) -> Result<()> {
        let span = self.current.1;
        match self.current.0 {
            Token::Semicolon => {
                self.advance()?;
                Ok(())
            }
            Token::Local => self.local_statement(),
            Token::Do => {
                self.advance()?;
                self.block()?;
                self.expect_close(Token::End, "'end' to close 'do'", span)?;
                Ok(())
            }
            Token::If => self.if_statement(),
            Token::While => self.while_statement(),
            Token::Ident(_) => self.name_statement(),
            Token::Function
            | Token::For
            | Token::Repeat
            | Token::Return
            | Token::Goto
            | Token::Break
            | Token::DoubleColon => {
                Err(self.error(SyntaxErrorKind::UnsupportedStatement(self.current.0.text()), span))
            }
            _ => Err(self.unexpected("statement")),
        }
    }

    fn block_end(&self) -> bool {
        matches!(self.current.0, Token::End | Token::Else | Token::Elseif | Token::Until | Token::Eof)
    }

    /// Statements up to a block terminator, in a fresh scope.
    fn block(&mut self) -> Result<()> {
        self.blocks += 1;
        if self.blocks > MAX_BLOCK_NESTING {
            return Err(self.error(SyntaxErrorKind::BlockTooDeep, self.current.1));
        }
        self.scope.enter();
        while !self.block_end() {
            self.statement()?;
        }
        self.blocks -= 1;
        let dropped = self.scope.leave();
        if dropped > 0 {
            let span = self.current.1;
            // dropped never exceeds MAX_LOCALS
            self.emit(Op::Pop(dropped as u16), span);
        }
        Ok(())
    }

    fn local_statement(&mut self) -> Result<()> {
        self.advance()?;
        if self.check(&Token::Function) {
            return Err(self.error(SyntaxErrorKind::UnsupportedStatement("local function"), self.current.1));
        }
        let (name, span) = self.expect_name("name after 'local'")?;
        if self.check(&Token::Assign) {
            self.advance()?;
            self.expression()?;
        } else {
            self.load_constant(Value::Nil, span)?;
        }
        let slot = u16::try_from(self.depth - 1)
            .map_err(|_| self.error(SyntaxErrorKind::ExpressionTooComplex, span))?;
        if !self.scope.declare(&name, slot) {
            return Err(self.error(SyntaxErrorKind::TooManyLocals, span));
        }
        Ok(())
    }

    /// `name = expr` or a call used as a statement.
    fn name_statement(&mut self) -> Result<()> {
        let (name, span) = self.expect_name("name")?;
        match self.current.0 {
            Token::LParen => {
                self.call(&name, span)?;
                // the result of a call statement is discarded
                self.emit(Op::Pop(1), span);
                Ok(())
            }
            Token::Assign => {
                self.advance()?;
                let target = self.resolve(&name, span)?;
                self.expression()?;
                self.store(target, span);
                Ok(())
            }
            _ => Err(self.unexpected("'=' or '(' after name")),
        }
    }

    fn if_statement(&mut self) -> Result<()> {
        let span = self.advance()?.1;
        self.expression()?;
        self.expect(Token::Then, "'then' after condition")?;
        let mut skip = self.emit(Op::JumpIfFalse(0), span);
        self.block()?;

        let mut exits = Vec::new();
        loop {
            match self.current.0 {
                Token::Elseif => {
                    let span = self.current.1;
                    exits.push(self.emit(Op::Jump(0), span));
                    self.patch(skip)?;
                    self.advance()?;
                    self.expression()?;
                    self.expect(Token::Then, "'then' after condition")?;
                    skip = self.emit(Op::JumpIfFalse(0), span);
                    self.block()?;
                }
                Token::Else => {
                    let else_span = self.current.1;
                    exits.push(self.emit(Op::Jump(0), else_span));
                    self.patch(skip)?;
                    self.advance()?;
                    self.block()?;
                    self.expect_close(Token::End, "'end' to close 'if'", span)?;
                    break;
                }
                _ => {
                    self.expect_close(Token::End, "'end' to close 'if'", span)?;
                    self.patch(skip)?;
                    break;
                }
            }
        }
        for exit in exits {
            self.patch(exit)?;
        }
        Ok(())
    }

    fn while_statement(&mut self) -> Result<()> {
        let span = self.advance()?.1;
        let top = self.here(span)?;
        self.expression()?;
        self.expect(Token::Do, "'do' after loop condition")?;
        let exit = self.emit(Op::JumpIfFalse(0), span);
        self.block()?;
        self.expect_close(Token::End, "'end' to close 'while'", span)?;
        self.emit(Op::Jump(top), span);
        self.patch(exit)
    }

    // ---- Expressions ----

    fn expression(&mut self) -> Result<()> {
        self.subexpression(0)
    }

    /// Precedence climbing: compile one operand, then every binary operator
    /// whose left priority exceeds `limit`.
    fn subexpression(&mut self, limit: u8) -> Result<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(self.error(SyntaxErrorKind::ExpressionTooComplex, self.current.1));
        }

        if let Some(op) = unary_op(&self.current.0) {
            let span = self.advance()?.1;
            self.subexpression(UNARY_PRIORITY)?;
            self.emit(op, span);
        } else {
            self.primary()?;
        }

        while let Some(binop) = BinOp::from_token(&self.current.0) {
            let (left, right) = binop.priority();
            if left <= limit {
                break;
            }
            let span = self.advance()?.1;
            match binop.op() {
                Some(op) => {
                    self.subexpression(right)?;
                    self.emit(op, span);
                }
                None => {
                    let jump = if binop == BinOp::And {
                        Op::JumpIfFalseOrPop(0)
                    } else {
                        Op::JumpIfTrueOrPop(0)
                    };
                    let at = self.emit(jump, span);
                    self.subexpression(right)?;
                    self.patch(at)?;
                }
            }
        }

        self.nesting -= 1;
        Ok(())
    }

    fn primary(&mut self) -> Result<()> {
        let span = self.current.1;
        match self.current.0 {
            Token::Number(_) | Token::Str(_) | Token::True | Token::False | Token::Nil => {
                let (token, span) = self.advance()?;
                self.load_constant(token.literal(), span)
            }
            Token::Ident(_) => {
                let (name, span) = self.expect_name("name")?;
                if self.check(&Token::LParen) {
                    self.call(&name, span)
                } else {
                    self.load_name(&name, span)
                }
            }
            Token::LParen => {
                self.advance()?;
                self.expression()?;
                self.expect(Token::RParen, "')' to close parenthesis")?;
                Ok(())
            }
            Token::Ellipsis | Token::LBrace | Token::Function => {
                Err(self.error(SyntaxErrorKind::UnsupportedExpression(self.current.0.text()), span))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// `name(args)`: callee, then each argument left to right, then `Call`
    /// naming the callee's slot. Leaves exactly the result on the stack.
    fn call(&mut self, name: &str, span: Span) -> Result<()> {
        let base = u16::try_from(self.depth)
            .map_err(|_| self.error(SyntaxErrorKind::ExpressionTooComplex, span))?;
        self.load_name(name, span)?;
        self.expect(Token::LParen, "'(' to open argument list")?;

        let mut argc = 0usize;
        if !self.check(&Token::RParen) {
            loop {
                if argc == MAX_ARGUMENTS {
                    return Err(self.error(SyntaxErrorKind::TooManyArguments, self.current.1));
                }
                self.expression()?;
                argc += 1;
                if !self.check(&Token::Comma) {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(Token::RParen, "')' to close argument list")?;
        // argc <= MAX_ARGUMENTS
        self.emit(Op::Call(base, argc as u8), span);
        Ok(())
    }

    /// Terminate the code with `Exit`. Discards at the very end are dropped
    /// unless a jump lands on them.
    fn finish(mut self) -> Program {
        while matches!(self.code.last(), Some(Op::Pop(_))) && self.last_label < self.code.len() {
            self.code.pop();
            self.spans.pop();
        }
        let span = self.current.1;
        self.emit(Op::Exit, span);
        Program {
            constants: self.constants.into_values(),
            globals: self.globals,
            code: self.code,
            spans: self.spans,
        }
    }
}

/// Compile a source string into a program with a fresh global table.
pub fn compile(source: &str) -> Result<Program> {
    compile_with_globals(source, Globals::new())
}

/// Compile against an existing global table, so names the host registered
/// keep their indices.
pub fn compile_with_globals(source: &str, globals: Globals) -> Result<Program> {
    let program = Compiler::new(source, globals)?.compile_chunk()?;
    tracing::debug!(
        constants = program.constants.len(),
        globals = program.globals.len(),
        ops = program.code.len(),
        "compiled chunk"
    );
    Ok(program)
}
