// crates/trust-gate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Entry Point Tests
// Description: Unit tests for argument parsing and error formatting.
// Purpose: Keep the command surface and failure messages stable.
// Dependencies: trust-gate-cli main helpers, clap
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use clap::Parser;
use trust_gate_sync::SyncError;

use super::Cli;
use super::Commands;
use super::ConfigCommand;
use super::SecretCommand;
use super::SyncCommand;
use super::output_error;
use super::sync_failed;

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn sync_once_accepts_dry_run_and_global_config() {
    let cli = Cli::try_parse_from(["trust-gate", "sync", "once", "--dry-run", "--config", "/etc/trust-gate.toml"])
        .unwrap();
    assert_eq!(cli.config, Some(PathBuf::from("/etc/trust-gate.toml")));
    match cli.command {
        Some(Commands::Sync {
            command: SyncCommand::Once(command),
        }) => {
            assert!(command.dry_run);
            assert!(!command.no_wait);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn secret_subcommands_parse() {
    let cli = Cli::try_parse_from(["trust-gate", "secret", "show"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Secret {
            command: SecretCommand::Show
        })
    ));

    let cli = Cli::try_parse_from(["trust-gate", "secret", "rotate", "--no-wait"]).unwrap();
    match cli.command {
        Some(Commands::Secret {
            command: SecretCommand::Rotate(command),
        }) => assert!(command.no_wait),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn authorize_collects_request_fields() {
    let cli = Cli::try_parse_from([
        "trust-gate",
        "authorize",
        "--method-arn",
        "arn:aws:execute-api:us-east-1:123456789012:a1b2c3d4e5/prod/GET/orders/7",
        "--token",
        "Bearer abc",
    ])
    .unwrap();
    match cli.command {
        Some(Commands::Authorize(command)) => {
            assert_eq!(command.path, "");
            assert_eq!(command.token.as_deref(), Some("Bearer abc"));
            assert!(command.method_arn.is_some());
            assert!(command.peer_ip.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn config_validate_and_version_parse() {
    let cli = Cli::try_parse_from(["trust-gate", "config", "validate"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Config {
            command: ConfigCommand::Validate
        })
    ));
    let cli = Cli::try_parse_from(["trust-gate", "--version"]).unwrap();
    assert!(cli.show_version);
    assert!(cli.command.is_none());
}

#[test]
fn unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["trust-gate", "sync", "forever"]).is_err());
}

// ============================================================================
// SECTION: Messages
// ============================================================================

#[test]
fn sync_failure_message_carries_code() {
    let err = sync_failed(&SyncError::LeaseLost("held by sync-b".to_string()));
    let message = err.to_string();
    assert!(message.starts_with("Sync failed (lease_lost)"), "{message}");
    assert!(message.contains("sync-b"));
}

#[test]
fn output_error_names_stream() {
    let err = std::io::Error::other("pipe closed");
    assert_eq!(output_error("stdout", &err), "Failed to write to stdout: pipe closed");
    assert_eq!(output_error("socket", &err), "Failed to write to output: pipe closed");
}
