use std::io::Write;
use std::process::{Command, Stdio};

fn lunette() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lunette"))
}

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

// --- Running ---

#[test]
fn runs_a_file() {
    let out = lunette().arg(fixture("hello.lua")).output().expect("failed to run lunette");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "hi\n");
}

#[test]
fn runs_inline_code() {
    let out = lunette().args(["-e", "print(2 + 3 * 4)"]).output().expect("failed to run lunette");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "14\n");
}

#[test]
fn runs_standard_input() {
    let mut child = lunette()
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("failed to run lunette");
    child.stdin.take().unwrap().write_all(b"print('from stdin')").unwrap();
    let out = child.wait_with_output().expect("failed to wait on lunette");
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "from stdin\n");
}

#[test]
fn runs_a_temp_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "local a = 'x'\nprint(a .. a)").unwrap();
    let out = lunette().arg(file.path()).output().expect("failed to run lunette");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "xx\n");
}

#[test]
fn missing_file_fails() {
    let out = lunette().arg("/definitely/not/here.lua").output().expect("failed to run lunette");
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("error reading"));
}

#[test]
fn no_source_prints_usage() {
    let out = lunette().output().expect("failed to run lunette");
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Usage"));
}

// --- Emit ---

#[test]
fn emit_bytecode() {
    let out = lunette().args(["-e", "print(\"hi\")", "--emit", "bytecode"]).output().expect("failed to run lunette");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("LOADGLOBAL 0"), "got: {stdout}");
    assert!(stdout.contains("CALL 0 1"), "got: {stdout}");
    assert!(stdout.contains("EXIT"), "got: {stdout}");
}

#[test]
fn emit_tokens() {
    let out = lunette().args(["-e", "x = 1", "--emit", "tokens"]).output().expect("failed to run lunette");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, ["0..1\tname 'x'", "2..3\t'='", "4..5\tnumber 1"]);
}

#[test]
fn emit_json() {
    let out = lunette().args(["-e", "print(\"hi\")", "--emit", "json"]).output().expect("failed to run lunette");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("valid JSON");
    assert_eq!(v["constants"][0], "print");
    assert_eq!(v["globals"][0]["name"], "print");
    assert_eq!(v["code"].as_array().unwrap().len(), 4);
}

// --- Errors ---

#[test]
fn runtime_error_reports_location() {
    let out = lunette().arg("--no-color").arg(fixture("fault.lua")).output().expect("failed to run lunette");
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "before\n");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error[LUN-R002]: attempt to call a nil value"), "got: {stderr}");
    assert!(stderr.contains("--> 3:1"), "got: {stderr}");
    assert!(stderr.contains("missing(x)"), "got: {stderr}");
}

#[test]
fn syntax_error_as_json() {
    let out = lunette()
        .args(["-e", "x = (1 + 2", "--diagnostics", "json"])
        .output()
        .expect("failed to run lunette");
    assert_eq!(out.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&out.stderr).expect("valid JSON");
    assert_eq!(v["code"], "LUN-S002");
    assert_eq!(v["labels"][0]["line"], 1);
}

#[test]
fn stack_size_flag() {
    let out = lunette().args(["-e", "print(1, 2)", "--stack-size", "2", "--no-color"]).output().expect("failed to run lunette");
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("LUN-R009"));

    let out = lunette().args(["-e", "print(1)", "--stack-size", "0"]).output().expect("failed to run lunette");
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn explain_known_and_unknown_codes() {
    let out = lunette().args(["--explain", "LUN-S003"]).output().expect("failed to run lunette");
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("unsupported statement"));

    let out = lunette().args(["--explain", "LUN-ZZZZ"]).output().expect("failed to run lunette");
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn verbose_logging_goes_to_stderr() {
    let out = lunette()
        .args(["-v", "-e", "print('x')"])
        .env_remove("LUNETTE_LOG")
        .output()
        .expect("failed to run lunette");
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "x\n");
    assert!(String::from_utf8_lossy(&out.stderr).contains("compiled chunk"));
}
