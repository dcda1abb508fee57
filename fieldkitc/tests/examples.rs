use assert_cmd::Command as AssertCommand;
use predicates::prelude::*;
use std::{path::Path, sync::OnceLock};

static LOGGER_INIT: OnceLock<()> = OnceLock::new();

fn setup_logging() {
    LOGGER_INIT.get_or_init(|| {
        env_logger::builder().is_test(true).init();
    });
}

fn workspace_root() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("crate lives inside the workspace")
}

/// `fieldkitc` run from the workspace root with a demo source as last arg.
fn fieldkitc(args: &[&str], demo: &str) -> AssertCommand {
    setup_logging();
    let source = Path::new("demos").join(format!("{demo}.kit"));
    log::info!("Running fieldkitc {args:?} on {}", source.display());

    let mut cmd = AssertCommand::new(env!("CARGO_BIN_EXE_fieldkitc"));
    cmd.current_dir(workspace_root());
    cmd.args(args).arg(source);
    cmd
}

#[test]
fn test_check_window() {
    fieldkitc(&["check"], "window")
        .assert()
        .success()
        .stdout(predicate::str::contains("All field defaults are valid"));
}

#[test]
fn test_defaults_window() {
    fieldkitc(&["defaults"], "window")
        .assert()
        .success()
        .stdout(predicate::str::contains("  width: Uint16 = 640\n"))
        .stdout(predicate::str::contains("  pixels: Uint32 = 307200\n"))
        .stdout(predicate::str::contains("  visible: Bool\n"))
        .stdout(predicate::str::contains("  margin: Margin = Margin { top: 4, left: 2 }\n"))
        .stdout(predicate::str::contains("  Point_default() = Point(0, -1)"));
}

#[test]
fn test_compile_window() -> Result<(), Box<dyn std::error::Error>> {
    let output = std::env::temp_dir().join(format!("fieldkit_window_{}.c", std::process::id()));
    let output_arg = output.to_string_lossy().into_owned();

    fieldkitc(&["compile", "-o", &output_arg], "window")
        .assert()
        .success();

    let c_code = std::fs::read_to_string(&output)?;
    assert!(c_code.contains("#include \"stdio.h\""));
    assert!(c_code.contains("struct Window Window_default(void) {"));
    assert!(c_code.contains("        .window = Window_default(),\n"));
    assert!(c_code.contains("        .title = \"untitled\",\n"));
    assert!(c_code.contains("        .margin = (struct Margin){ .top = 4, .left = 2 },\n"));
    assert!(!c_code.contains("Margin_default"));

    if let Err(err) = std::fs::remove_file(&output) {
        log::error!("Failed to remove C source file: {err}");
    }
    Ok(())
}

#[test]
fn test_missing_default() {
    fieldkitc(&["check"], "missing_default")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "field `handle` has no default value and its type `Handle` does not implement `Default`",
        ))
        .stderr(predicate::str::contains("aborting due to 1 previous error"));
}

#[test]
fn test_bad_defaults_report_every_field() {
    fieldkitc(&["check"], "bad_defaults")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[overflowing_literals]"))
        .stderr(predicate::str::contains("expected `CString`, found"))
        .stderr(predicate::str::contains("not a constant expression"))
        .stderr(predicate::str::contains("malformed default value"))
        .stderr(predicate::str::contains("default values of `Settings` contain errors"))
        .stderr(predicate::str::contains("retries").not());
}

#[test]
fn test_allow_flag_downgrades_overflow() {
    // only the overflow lint is silenced; the other fields still fail
    fieldkitc(&["-A", "overflowing_literals", "check"], "bad_defaults")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[overflowing_literals]").not());
}

#[test]
fn test_unknown_lint_flag() {
    fieldkitc(&["--deny", "no_such_lint", "check"], "window")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown lint `no_such_lint`"));
}
