//! CLI smoke tests - run the compiled binary against throwaway configs.
//!
//! No platform tokens or network access required: every scenario either
//! exits before connecting or points at a config with no channels.

use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;

/// Env overrides that would leak the developer's setup into the tests.
const OVERRIDES: &[&str] = &[
    "CLAWGATE_CHANNELS_DISCORD_TOKEN",
    "CLAWGATE_CHANNELS_DISCORD_ENABLED",
    "CLAWGATE_CHANNELS_DISCORD_ALLOW_FROM",
    "CLAWGATE_CHANNELS_TELEGRAM_TOKEN",
    "CLAWGATE_CHANNELS_TELEGRAM_ENABLED",
    "CLAWGATE_CHANNELS_TELEGRAM_ALLOW_FROM",
    "CLAWGATE_BUS_BUFFER_SIZE",
    "CLAWGATE_LOG_LEVEL",
    "CLAWGATE_LOG_FORMAT",
];

/// Helper: run clawgate with given args and return (exit_code, stdout, stderr).
fn run_cli(args: &[&str]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_clawgate");
    let mut cmd = Command::new(bin);
    cmd.args(args).env("RUST_LOG", "off");
    for var in OVERRIDES {
        cmd.env_remove(var);
    }
    let output = cmd.output().expect("failed to execute clawgate binary");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn config_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

// ============================================================================
// Help & Version
// ============================================================================

#[test]
fn cli_no_args_shows_help() {
    let (code, stdout, _stderr) = run_cli(&[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("clawgate"));
}

#[test]
fn cli_help_lists_commands() {
    let (code, stdout, _stderr) = run_cli(&["--help"]);
    assert_eq!(code, 0);
    for command in ["gateway", "channels", "config", "version"] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn cli_version_command() {
    let (code, stdout, _stderr) = run_cli(&["version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("clawgate"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn cli_config_check_valid_file() {
    let file = config_file(
        r#"{"channels": {"telegram": {"enabled": true, "token": "1:x", "allow_from": ["7"]}}}"#,
    );
    let path = file.path().to_str().unwrap();
    let (code, stdout, _stderr) = run_cli(&["config", "check", "--config", path]);
    assert_eq!(code, 0, "stdout: {}", stdout);
    assert!(stdout.contains("Configuration looks good!"));
}

#[test]
fn cli_config_check_reports_typo() {
    let file = config_file(r#"{"channels": {"discord": {"enabled": true, "tokn": "x"}}}"#);
    let path = file.path().to_str().unwrap();
    let (code, stdout, _stderr) = run_cli(&["config", "check", "--config", path]);
    assert_ne!(code, 0);
    assert!(stdout.contains("channels.discord.tokn"));
    assert!(stdout.contains("did you mean 'token'?"));
}

// ============================================================================
// Channels & Gateway
// ============================================================================

#[test]
fn cli_channels_lists_platforms() {
    let file = config_file(r#"{"channels": {"discord": {"enabled": false, "token": "x"}}}"#);
    let path = file.path().to_str().unwrap();
    let (code, stdout, _stderr) = run_cli(&["channels", "--config", path]);
    assert_eq!(code, 0);
    assert!(stdout.contains("discord"));
    assert!(stdout.contains("disabled"));
    assert!(stdout.contains("telegram"));
    assert!(stdout.contains("not configured"));
}

#[test]
fn cli_gateway_without_channels_exits_with_error() {
    let file = config_file("{}");
    let path = file.path().to_str().unwrap();
    let (code, _stdout, stderr) = run_cli(&["gateway", "--config", path]);
    assert_ne!(code, 0);
    assert!(stderr.contains("No channels configured"), "stderr: {}", stderr);
}
