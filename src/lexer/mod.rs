use logos::Logos;

use crate::span::Span;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LexErrorKind {
    #[default]
    UnknownCharacter,
    UnterminatedString,
    MalformedNumber,
}

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t\r\n\f\v]+")]
#[logos(skip(r"--[^\n]*", allow_greedy = true))]
pub enum Token {
    /// End of input. Never produced by the logos automaton itself; the
    /// pull-based `Lexer` returns it once the source is exhausted.
    Eof,

    // Reserved words
    #[token("and")]
    And,
    #[token("break")]
    Break,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elseif")]
    Elseif,
    #[token("end")]
    End,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("goto")]
    Goto,
    #[token("if")]
    If,
    #[token("in")]
    In,
    #[token("local")]
    Local,
    #[token("nil")]
    Nil,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("repeat")]
    Repeat,
    #[token("return")]
    Return,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("until")]
    Until,
    #[token("while")]
    While,

    // Arithmetic
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("#")]
    Hash,

    // Bitwise
    #[token("&")]
    Amp,
    #[token("~")]
    Tilde,
    #[token("|")]
    Pipe,
    #[token("<<")]
    ShiftLeft,
    #[token(">>")]
    ShiftRight,

    // Comparison and assignment
    #[token("==")]
    Eq,
    #[token("~=")]
    NotEq,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Assign,

    // Brackets and punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("::")]
    DoubleColon,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("...")]
    Ellipsis,

    // Literals
    #[regex(r"[0-9]|\.[0-9]", lex_number)]
    Number(f64),

    #[token("\"", lex_string)]
    #[token("'", lex_string)]
    Str(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl Token {
    /// The literal payload carried by this token: the number, the decoded
    /// string, the boolean of `true`/`false`, the name of an identifier, or
    /// `Nil` for everything else.
    pub fn literal(&self) -> Value {
        match self {
            Token::Number(n) => Value::Number(*n),
            Token::Str(s) | Token::Ident(s) => Value::from(s.as_str()),
            Token::True => Value::Boolean(true),
            Token::False => Value::Boolean(false),
            _ => Value::Nil,
        }
    }

    /// Source form of fixed tokens, used in error messages.
    pub fn text(&self) -> &'static str {
        match self {
            Token::Eof => "<eof>",
            Token::And => "and",
            Token::Break => "break",
            Token::Do => "do",
            Token::Else => "else",
            Token::Elseif => "elseif",
            Token::End => "end",
            Token::False => "false",
            Token::For => "for",
            Token::Function => "function",
            Token::Goto => "goto",
            Token::If => "if",
            Token::In => "in",
            Token::Local => "local",
            Token::Nil => "nil",
            Token::Not => "not",
            Token::Or => "or",
            Token::Repeat => "repeat",
            Token::Return => "return",
            Token::Then => "then",
            Token::True => "true",
            Token::Until => "until",
            Token::While => "while",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::SlashSlash => "//",
            Token::Percent => "%",
            Token::Caret => "^",
            Token::Hash => "#",
            Token::Amp => "&",
            Token::Tilde => "~",
            Token::Pipe => "|",
            Token::ShiftLeft => "<<",
            Token::ShiftRight => ">>",
            Token::Eq => "==",
            Token::NotEq => "~=",
            Token::LessEq => "<=",
            Token::GreaterEq => ">=",
            Token::Less => "<",
            Token::Greater => ">",
            Token::Assign => "=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::DoubleColon => "::",
            Token::Semicolon => ";",
            Token::Colon => ":",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::DotDot => "..",
            Token::Ellipsis => "...",
            Token::Number(_) => "<number>",
            Token::Str(_) => "<string>",
            Token::Ident(_) => "<name>",
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Eof => write!(f, "<eof>"),
            Token::Number(n) => write!(f, "number {}", Value::Number(*n)),
            Token::Str(s) => write!(f, "string {:?}", s),
            Token::Ident(name) => write!(f, "name '{}'", name),
            other => write!(f, "'{}'", other.text()),
        }
    }
}

/// Number mode. Entered on a digit or on `.` followed by a digit; consumes
/// the integer part, an optional fraction and an optional exponent.
fn lex_number(lex: &mut logos::Lexer<'_, Token>) -> Result<f64, LexErrorKind> {
    let first = lex.slice().as_bytes()[0];
    let rest = lex.remainder().as_bytes();
    let mut n = 0;

    if first == b'0' && matches!(rest.first(), Some(b'x' | b'X')) {
        n += 1;
        let digits_start = n;
        while n < rest.len() && rest[n].is_ascii_hexdigit() {
            n += 1;
        }
        let digits = std::str::from_utf8(&rest[digits_start..n]).map_err(|_| LexErrorKind::MalformedNumber)?;
        let trailing = trailing_name_len(&rest[n..]);
        lex.bump(n + trailing);
        if digits.is_empty() || trailing > 0 {
            return Err(LexErrorKind::MalformedNumber);
        }
        return u64::from_str_radix(digits, 16)
            .map(|v| v as f64)
            .map_err(|_| LexErrorKind::MalformedNumber);
    }

    let mut seen_dot = first == b'.';
    while n < rest.len() {
        match rest[n] {
            b'0'..=b'9' => n += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                n += 1;
            }
            _ => break,
        }
    }

    if matches!(rest.get(n), Some(b'e' | b'E')) {
        n += 1;
        if matches!(rest.get(n), Some(b'+' | b'-')) {
            n += 1;
        }
        let exp_start = n;
        while n < rest.len() && rest[n].is_ascii_digit() {
            n += 1;
        }
        if n == exp_start {
            lex.bump(n + trailing_name_len(&rest[n..]));
            return Err(LexErrorKind::MalformedNumber);
        }
    }

    let trailing = trailing_name_len(&rest[n..]);
    lex.bump(n + trailing);
    if trailing > 0 {
        return Err(LexErrorKind::MalformedNumber);
    }
    lex.slice().parse::<f64>().map_err(|_| LexErrorKind::MalformedNumber)
}

/// Length of an identifier-like run glued onto a number (`3abc`).
fn trailing_name_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count()
}

/// String mode. The opening quote has been matched; consumes up to the
/// matching unescaped quote and decodes escapes.
fn lex_string(lex: &mut logos::Lexer<'_, Token>) -> Result<String, LexErrorKind> {
    let quote = lex.slice().chars().next().unwrap_or('"');
    let mut out = String::new();
    let mut chars = lex.remainder().char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == quote {
            lex.bump(i + c.len_utf8());
            return Ok(out);
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some((_, 'a')) => out.push('\u{07}'),
            Some((_, 'b')) => out.push('\u{08}'),
            Some((_, 'f')) => out.push('\u{0C}'),
            Some((_, 'n')) => out.push('\n'),
            Some((_, 'r')) => out.push('\r'),
            Some((_, 't')) => out.push('\t'),
            Some((_, 'v')) => out.push('\u{0B}'),
            Some((_, '\\')) => out.push('\\'),
            Some((_, '"')) => out.push('"'),
            Some((_, '\'')) => out.push('\''),
            // escaped newline continues the string on the next line
            Some((_, '\n')) => {}
            Some((_, '\r')) => {
                chars.next_if(|&(_, c)| c == '\n');
            }
            Some((_, other)) => {
                out.push('\\');
                out.push(other);
            }
            None => break,
        }
    }

    lex.bump(lex.remainder().len());
    Err(LexErrorKind::UnterminatedString)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{} at offset {}: '{}'", kind_message(.kind), .span.start, .snippet)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
    pub snippet: String,
}

fn kind_message(kind: &LexErrorKind) -> &'static str {
    match kind {
        LexErrorKind::UnknownCharacter => "unexpected character",
        LexErrorKind::UnterminatedString => "unterminated string",
        LexErrorKind::MalformedNumber => "malformed number",
    }
}

impl LexError {
    pub fn position(&self) -> usize {
        self.span.start
    }

    /// The offending character for `UnknownCharacter` errors.
    pub fn character(&self) -> Option<char> {
        self.snippet.chars().next()
    }
}

/// Pull-based token source with the contract the compiler relies on:
/// `next_token` is called until it yields `Token::Eof`, and keeps yielding
/// `Token::Eof` after that.
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, Token>,
    source: &'src str,
    done: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer { inner: Token::lexer(source), source, done: false }
    }

    pub fn next_token(&mut self) -> Result<(Token, Span), LexError> {
        if self.done {
            return Ok((Token::Eof, Span::at(self.source.len())));
        }
        match self.inner.next() {
            Some(Ok(token)) => Ok((token, self.inner.span().into())),
            Some(Err(kind)) => {
                let span: Span = self.inner.span().into();
                Err(LexError { kind, span, snippet: self.snippet(kind, span) })
            }
            None => {
                self.done = true;
                Ok((Token::Eof, Span::at(self.source.len())))
            }
        }
    }

    fn snippet(&self, kind: LexErrorKind, span: Span) -> String {
        let text = &self.source[span.start..span.end];
        match kind {
            // keep the opening of a runaway string short
            LexErrorKind::UnterminatedString => text.chars().take(16).collect(),
            _ => text.to_string(),
        }
    }
}

/// Lex a whole source into tokens with positions. The trailing `Eof` is not
/// included.
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let (token, span) = lexer.next_token()?;
        if token == Token::Eof {
            break;
        }
        tokens.push((token, span));
    }
    tracing::debug!(count = tokens.len(), "lexed source");
    Ok(tokens)
}
