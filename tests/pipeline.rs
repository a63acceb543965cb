use lunette::vm::{Capture, Vm, VmConfig};
use lunette::{CompileError, Error, Op, Value, VmError, compile};

fn run(source: &str) -> (Result<lunette::Program, Error>, String) {
    let out = Capture::new();
    let mut vm = Vm::with_output(out.clone());
    let result = lunette::run(&mut vm, source);
    (result, out.contents())
}

fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(path).expect("fixture readable")
}

#[test]
fn hello_world_bytecode_and_output() {
    let program = compile(&fixture("hello.lua")).unwrap();
    assert_eq!(program.code, vec![Op::LoadGlobal(0), Op::LoadConst(1), Op::Call(0, 1), Op::Exit]);

    let (result, out) = run(&fixture("hello.lua"));
    result.unwrap();
    assert_eq!(out, "hi\n");
}

#[test]
fn loop_fixture() {
    let (result, out) = run(&fixture("loop.lua"));
    let program = result.unwrap();
    assert_eq!(out, "total\t20\n");
    assert_eq!(program.globals.get("total"), Value::Number(20.0));
    // `i` is local and never becomes a global
    assert_eq!(program.globals.index_of("i"), None);
}

#[test]
fn fault_keeps_earlier_effects() {
    let (result, out) = run(&fixture("fault.lua"));
    assert_eq!(out, "before\n");
    match result {
        Err(Error::Runtime(e)) => {
            assert!(matches!(e.source, VmError::CallNonFunction { type_name: "nil" }));
            assert_eq!(e.op, Some(Op::Call(0, 1)));
        }
        other => panic!("expected a runtime error, got {:?}", other.map(|p| p.code)),
    }
}

#[test]
fn compile_errors_do_not_run_anything() {
    let (result, out) = run("print(\"side effect\")\nx = = 2");
    assert!(matches!(result, Err(Error::Compile(CompileError::Syntax(_)))));
    assert_eq!(out, "");
}

#[test]
fn lex_errors_surface_through_run() {
    let (result, _) = run("x = 'unterminated");
    assert!(matches!(result, Err(Error::Compile(CompileError::Lex(_)))));
    let err = result.unwrap_err();
    assert_eq!(err.span().map(|s| s.start), Some(4));
}

#[test]
fn expression_semantics() {
    let (result, out) = run(
        r#"
        print(2 + 3 * 4, 2 ^ 3 ^ 2, 10 / 4, 10 // 4, -10 % 3)
        print("con" .. "cat", #"four", 0x10, 1e2, .5)
        print(1 < 2 and "yes" or "no", nil == false, not nil)
        print(5 & 3, 5 | 3, 5 ~ 3, ~5, 1 << 3, -1 >> 62)
        "#,
    );
    result.unwrap();
    assert_eq!(
        out,
        "14\t512\t2.5\t2\t2\n\
         concat\t4\t16\t100\t0.5\n\
         yes\tfalse\ttrue\n\
         1\t7\t6\t-6\t8\t3\n"
    );
}

#[test]
fn host_functions_and_globals() {
    let out = Capture::new();
    let mut vm = Vm::with_output(out.clone());
    vm.register("double", |_, args| Ok(Value::Number(args[0].as_number()? * 2.0)));
    vm.define("answer", Value::Number(42.0));
    let program = lunette::run(&mut vm, "x = double(answer) print(x)").unwrap();
    assert_eq!(out.contents(), "84\n");
    assert_eq!(program.globals.get("x"), Value::Number(84.0));
}

#[test]
fn small_stack_overflows() {
    let out = Capture::new();
    let mut vm = Vm::with_config(VmConfig { stack_capacity: 3 }, Box::new(out));
    let err = lunette::run(&mut vm, "print(1, 2, 3)").unwrap_err();
    match err {
        Error::Runtime(e) => assert!(matches!(e.source, VmError::StackOverflow { capacity: 3 })),
        other => panic!("expected stack overflow, got {other}"),
    }
}

#[test]
fn disassembly_lists_every_section() {
    let listing = compile(r#"print("hi")"#).unwrap().disassemble();
    assert!(listing.contains("constants (2):"));
    assert!(listing.contains("globals (1):"));
    assert!(listing.contains("code (4):"));
    assert!(listing.contains("CALL 0 1"));
}
