//! CLI smoke tests: verify basic binary behavior.

use std::io::Write;
use std::process::{Command, Stdio};

fn cli_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_soulframe"))
}

#[test]
fn test_help_flag() {
    let output = cli_bin().arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Expected usage info in --help output");
    assert!(stdout.contains("--responder"));
}

#[test]
fn test_version_flag() {
    let output = cli_bin().arg("--version").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("soulframe"), "Expected binary name in --version output");
}

#[test]
fn test_unknown_platform_fails() {
    let output = cli_bin()
        .args(["--platform", "watch", "--responder", "mock"])
        .output()
        .expect("failed to run");
    assert!(!output.status.success());
}

#[test]
fn test_mock_conversation_over_stdin() {
    let mut child = cli_bin()
        .args([
            "--config",
            "/tmp/nonexistent_soulframe_config_12345.toml",
            "--responder",
            "mock",
        ])
        .env_remove("SOULFRAME_DB")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to run");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"hello there\n/mode lockdown\nare you there?\nquit\n")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("You said: \"hello there\""), "{}", stdout);
    assert!(stdout.contains("[mode: LOCKDOWN]"), "{}", stdout);
}
