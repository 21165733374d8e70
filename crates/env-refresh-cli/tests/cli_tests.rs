//! CLI integration tests for env-refresh.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that need no live store.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the env-refresh binary.
fn cmd() -> Command {
    Command::cargo_bin("env-refresh").unwrap()
}

/// A valid configuration with only the graph store.
fn graph_config() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "graph:").unwrap();
    writeln!(file, "  source: {{ url: \"http://dev-gremlin:8182/gremlin\" }}").unwrap();
    writeln!(file, "  target: {{ url: \"http://preprod-gremlin:8182/gremlin\" }}").unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_subcommands_accept_store_selection() {
    for subcommand in ["run", "verify", "health-check"] {
        cmd()
            .args([subcommand, "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--stores"));
    }
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("env-refresh"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flag_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: config.yaml]"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_config_without_stores_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "output_dir: ./out").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_same_source_and_target_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "graph:").unwrap();
    writeln!(file, "  source: {{ url: \"http://gremlin:8182/gremlin\" }}").unwrap();
    writeln!(file, "  target: {{ url: \"http://gremlin:8182/gremlin\" }}").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(1);
}

#[test]
fn test_unknown_store_exits_with_code_1() {
    let file = graph_config();
    cmd()
        .args(["-c", file.path().to_str().unwrap(), "run", "--stores", "graph,redis"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown store 'redis'"));
}

#[test]
fn test_unconfigured_store_exits_with_code_1() {
    let file = graph_config();
    cmd()
        .args(["-c", file.path().to_str().unwrap(), "verify", "--stores", "document"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not configured"));
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
