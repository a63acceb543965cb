use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, CommandFactory, Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use lunette::diagnostic::{Diagnostic, ansi::AnsiRenderer, json, registry};
use lunette::vm::{STACK_CAPACITY, Vm, VmConfig};
use lunette::{Error, compile, lexer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// One token per line with its byte span.
    Tokens,
    /// Disassembled program listing.
    Bytecode,
    /// The compiled program as JSON.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DiagnosticFormat {
    Ansi,
    Json,
}

/// Compile and run Lua-like scripts on the lunette bytecode VM.
#[derive(Debug, Parser)]
#[command(name = "lunette", version)]
struct Cli {
    /// Script to run; `-` reads standard input.
    file: Option<PathBuf>,

    /// Run CODE instead of a file.
    #[arg(short = 'e', long = "eval", value_name = "CODE", conflicts_with = "file")]
    eval: Option<String>,

    /// Print an intermediate form instead of running.
    #[arg(long, value_enum)]
    emit: Option<Emit>,

    /// Operand stack size in slots.
    #[arg(long, value_name = "SLOTS", default_value_t = STACK_CAPACITY as u32,
          value_parser = clap::value_parser!(u32).range(1..=1_048_576))]
    stack_size: u32,

    /// How errors are reported on stderr.
    #[arg(long, value_enum, default_value_t = DiagnosticFormat::Ansi)]
    diagnostics: DiagnosticFormat,

    /// Never colour diagnostics.
    #[arg(long)]
    no_color: bool,

    /// Explain a diagnostic code such as LUN-R002 and exit.
    #[arg(long, value_name = "CODE", exclusive = true)]
    explain: Option<String>,

    /// More logging on stderr (-v debug, -vv trace). LUNETTE_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("LUNETTE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

/// `Ok(None)` when neither a file nor `-e` was given.
fn read_source(cli: &Cli) -> Result<Option<String>, String> {
    if let Some(code) = &cli.eval {
        return Ok(Some(code.clone()));
    }
    match &cli.file {
        Some(path) if path.as_os_str() == "-" => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .map_err(|e| format!("error reading standard input: {e}"))?;
            Ok(Some(source))
        }
        Some(path) => std::fs::read_to_string(path)
            .map(Some)
            .map_err(|e| format!("error reading {}: {e}", path.display())),
        None => Ok(None),
    }
}

fn report(cli: &Cli, source: &str, err: &Error) {
    let diagnostic = Diagnostic::from(err).with_source(source);
    match cli.diagnostics {
        DiagnosticFormat::Json => eprintln!("{}", json::render(&diagnostic)),
        DiagnosticFormat::Ansi => {
            let use_color = !cli.no_color && std::env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal();
            eprint!("{}", AnsiRenderer { use_color }.render(&diagnostic));
        }
    }
}

fn explain(code: &str) -> ExitCode {
    match registry::lookup(code) {
        Some(entry) => {
            print!("{}", entry.long);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("unknown diagnostic code '{code}'");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum Failure {
    #[error(transparent)]
    Script(#[from] Error),
    #[error("error writing output: {0}")]
    Output(#[from] io::Error),
}

fn emit(mode: Emit, source: &str, out: &mut dyn Write) -> Result<(), Failure> {
    match mode {
        Emit::Tokens => {
            for (token, span) in lexer::lex(source).map_err(Error::from)? {
                writeln!(out, "{span}\t{token}")?;
            }
        }
        Emit::Bytecode => write!(out, "{}", compile(source).map_err(Error::from)?.disassemble())?,
        Emit::Json => {
            let program = compile(source).map_err(Error::from)?;
            serde_json::to_writer_pretty(&mut *out, &program).map_err(io::Error::from)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(code) = &cli.explain {
        return explain(code);
    }

    let source = match read_source(&cli) {
        Ok(Some(source)) => source,
        Ok(None) => {
            let _ = Cli::command().print_help();
            return ExitCode::from(2);
        }
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.emit {
        Some(mode) => emit(mode, &source, &mut io::stdout().lock()),
        None => {
            let config = VmConfig { stack_capacity: cli.stack_size as usize };
            let mut vm = Vm::with_config(config, Box::new(io::stdout()));
            lunette::run(&mut vm, &source).map(|_| ()).map_err(Failure::from)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Script(err)) => {
            tracing::debug!(error = %err, "run failed");
            report(&cli, &source, &err);
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn emit_writes_listing() {
        let mut out = Vec::new();
        emit(Emit::Bytecode, "print(1)", &mut out).unwrap();
        let listing = String::from_utf8(out).unwrap();
        assert!(listing.contains("LOADGLOBAL 0"));
    }

    #[test]
    fn emit_reports_write_failure() {
        for mode in [Emit::Json, Emit::Bytecode, Emit::Tokens] {
            let err = emit(mode, "x = 1", &mut Closed).unwrap_err();
            assert!(matches!(err, Failure::Output(_)), "{mode:?}: {err:?}");
        }
    }

    #[test]
    fn emit_passes_compile_errors_through() {
        let err = emit(Emit::Json, "x = = 1", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Failure::Script(Error::Compile(_))));
    }
}
