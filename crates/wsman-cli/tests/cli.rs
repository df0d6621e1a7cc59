//! Smoke tests for the wsman binary's argument surface.

use assert_cmd::Command;

#[test]
fn missing_args_is_a_usage_error() {
    Command::cargo_bin("wsman")
        .unwrap()
        .assert()
        .failure()
        .code(2);
}

#[test]
fn missing_command_is_a_usage_error() {
    Command::cargo_bin("wsman")
        .unwrap()
        .args(["-U", "http://host:5985/wsman", "-u", "admin", "-p", "pw"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn help_mentions_the_endpoint_flag() {
    let assert = Command::cargo_bin("wsman").unwrap().arg("--help").assert();
    let output = assert.get_output().stdout.clone();
    let help = String::from_utf8(output).unwrap();
    assert!(help.contains("--url"));
    assert!(help.contains("--powershell"));
}
