// crates/trust-gate-cli/src/main.rs
// ============================================================================
// Module: Trust Gate CLI Entry Point
// Description: Command dispatcher for the authorizer and origin synchronizer.
// Purpose: Run the authorizer endpoint, drive sync runs, and provision secrets.
// Dependencies: clap, trust-gate-authorizer, trust-gate-config, trust-gate-core,
//               trust-gate-sync, serde, thiserror, tokio
// ============================================================================

//! ## Overview
//! `trust-gate serve` runs the HTTP authorizer and, when a `[sync]` section
//! is configured, the background synchronizer. The remaining subcommands are
//! operator tools: one-shot or dry-run syncs, secret rotation and
//! provisioning, single authorization checks, and config validation. All
//! user-facing strings go through the [`t!`](trust_gate_cli::t) catalog.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use thiserror::Error;
use trust_gate_authorizer::AuthorizationRequest;
use trust_gate_authorizer::AuthzAuditSink;
use trust_gate_authorizer::SourceAttributes;
use trust_gate_authorizer::TokenAuthorizer;
use trust_gate_authorizer::authorizer_router;
use trust_gate_authorizer::build_authorizer;
use trust_gate_authorizer::serve_authorizer;
use trust_gate_cli::t;
use trust_gate_cli::wiring::SecretProvisioning;
use trust_gate_cli::wiring::SyncPlanView;
use trust_gate_cli::wiring::SyncReportView;
use trust_gate_cli::wiring::audit_sink;
use trust_gate_cli::wiring::config_summary;
use trust_gate_cli::wiring::open_store;
use trust_gate_cli::wiring::process_env;
use trust_gate_config::TrustGateConfig;
use trust_gate_core::Clock;
use trust_gate_core::JsonLinesAuditSink;
use trust_gate_core::SystemClock;
use trust_gate_core::TrustState;
use trust_gate_sync::SyncAuditSink;
use trust_gate_sync::SyncError;
use trust_gate_sync::SyncTrigger;
use trust_gate_sync::Synchronizer;
use trust_gate_sync::spawn_scheduler;
use trust_gate_sync::synchronizer_from_config;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "trust-gate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Config file path (overrides `TRUST_GATE_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the authorizer endpoint and the background synchronizer.
    Serve(ServeCommand),
    /// Origin trust synchronization.
    Sync {
        /// Selected sync subcommand.
        #[command(subcommand)]
        command: SyncCommand,
    },
    /// Edge secret administration.
    Secret {
        /// Selected secret subcommand.
        #[command(subcommand)]
        command: SecretCommand,
    },
    /// Evaluate one authorization request and print the decision.
    Authorize(AuthorizeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Run the authorizer without the background synchronizer.
    #[arg(long, action = ArgAction::SetTrue)]
    no_sync: bool,
}

/// Sync subcommands.
#[derive(Subcommand, Debug)]
enum SyncCommand {
    /// Run a single sync pass.
    Once(SyncOnceCommand),
}

/// Arguments for `sync once`.
#[derive(Args, Debug)]
struct SyncOnceCommand {
    /// Fetch and diff only; publish and commit nothing.
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Return after widening instead of waiting out the grace window.
    #[arg(long, action = ArgAction::SetTrue)]
    no_wait: bool,
}

/// Secret subcommands.
#[derive(Subcommand, Debug)]
enum SecretCommand {
    /// Print the active edge secret for edge provisioning.
    Show,
    /// Issue a new edge secret and roll it out to every origin.
    Rotate(RotateCommand),
}

/// Arguments for `secret rotate`.
#[derive(Args, Debug)]
struct RotateCommand {
    /// Return after widening instead of waiting out the grace window.
    #[arg(long, action = ArgAction::SetTrue)]
    no_wait: bool,
}

/// Arguments for `authorize`.
#[derive(Args, Debug)]
struct AuthorizeCommand {
    /// Request path.
    #[arg(long, default_value = "")]
    path: String,
    /// Bearer token, with or without the `Bearer ` prefix.
    #[arg(long)]
    token: Option<String>,
    /// Gateway method ARN, used when `--path` is empty.
    #[arg(long)]
    method_arn: Option<String>,
    /// Client IP recorded in the audit event.
    #[arg(long)]
    peer_ip: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the config file.
    Validate,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for catalog messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a catalog message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let config = load_config(cli.config)?;
    match command {
        Commands::Serve(command) => command_serve(&config, &command).await,
        Commands::Sync {
            command: SyncCommand::Once(command),
        } => command_sync_once(&config, &command).await,
        Commands::Secret {
            command: SecretCommand::Show,
        } => command_secret_show(&config),
        Commands::Secret {
            command: SecretCommand::Rotate(command),
        } => command_secret_rotate(&config, &command).await,
        Commands::Authorize(command) => command_authorize(&config, command).await,
        Commands::Config {
            command: ConfigCommand::Validate,
        } => command_config_validate(&config),
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let help = Cli::command().render_help().to_string();
    write_stdout_line(&help).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Loads configuration from `--config`, the environment, or the default path.
fn load_config(path: Option<PathBuf>) -> CliResult<TrustGateConfig> {
    TrustGateConfig::load(path.as_deref()).map_err(|err| CliError::new(t!("config.load_failed", error = err)))
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(config: &TrustGateConfig, command: &ServeCommand) -> CliResult<ExitCode> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let audit = open_audit(config)?;
    let authorizer = open_authorizer(config, Arc::clone(&clock), &audit)?;
    for (domain, err) in authorizer.prewarm_keys().await {
        write_stderr_line(&t!("serve.prewarm_failed", domain = domain, error = err))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    let router = authorizer_router(Arc::new(authorizer), config.server.max_body_bytes);

    let scheduler = match (&config.sync, command.no_sync) {
        (Some(sync), false) => {
            let synchronizer = open_synchronizer(config, clock, &audit).await?;
            let interval = Duration::from_secs(sync.interval_secs);
            Some(spawn_scheduler(Arc::new(synchronizer), interval))
        }
        _ => None,
    };

    write_stderr_line(&t!("serve.listening", bind = config.server.bind, sync = scheduler.is_some()))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    let served = serve_authorizer(&config.server.bind, router, shutdown_signal()).await;

    if let Some((handle, task)) = scheduler {
        handle.shutdown();
        task.await.map_err(|err| CliError::new(t!("serve.scheduler_failed", error = err)))?;
    }
    served.map_err(|err| CliError::new(t!("serve.failed", error = err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Resolves once the process receives Ctrl-C.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        let _ = write_stderr_line(&t!("serve.signal_failed", error = err));
    }
}

// ============================================================================
// SECTION: Sync Commands
// ============================================================================

/// Executes `sync once`.
async fn command_sync_once(config: &TrustGateConfig, command: &SyncOnceCommand) -> CliResult<ExitCode> {
    let audit = open_audit(config)?;
    let synchronizer = open_synchronizer(config, Arc::new(SystemClock), &audit).await?;
    if command.dry_run {
        let plan = synchronizer.plan(SyncTrigger::Operator).await.map_err(|err| sync_failed(&err))?;
        write_json(&SyncPlanView::from(plan.as_ref()))?;
        return Ok(ExitCode::SUCCESS);
    }
    run_sync(&synchronizer, SyncTrigger::Operator, command.no_wait).await
}

/// Executes `secret rotate`.
async fn command_secret_rotate(config: &TrustGateConfig, command: &RotateCommand) -> CliResult<ExitCode> {
    let audit = open_audit(config)?;
    let synchronizer = open_synchronizer(config, Arc::new(SystemClock), &audit).await?;
    run_sync(&synchronizer, SyncTrigger::RotateSecret, command.no_wait).await
}

/// Runs the synchronizer and prints the report.
async fn run_sync(synchronizer: &Synchronizer, trigger: SyncTrigger, no_wait: bool) -> CliResult<ExitCode> {
    let report = if no_wait {
        synchronizer.run_once(trigger).await
    } else {
        synchronizer.run_until_settled(trigger).await
    }
    .map_err(|err| sync_failed(&err))?;
    write_json(&SyncReportView::from(&report))?;
    Ok(ExitCode::SUCCESS)
}

/// Formats a synchronizer failure.
fn sync_failed(err: &SyncError) -> CliError {
    CliError::new(t!("sync.failed", code = err.code(), error = err))
}

// ============================================================================
// SECTION: Secret Commands
// ============================================================================

/// Executes `secret show`.
fn command_secret_show(config: &TrustGateConfig) -> CliResult<ExitCode> {
    let store = open_store(&config.store).map_err(|err| CliError::new(t!("store.open_failed", error = err)))?;
    let state = TrustState::new(Arc::clone(&store));
    let record = state
        .load_secret()
        .map_err(|err| CliError::new(t!("store.read_failed", error = err)))?
        .ok_or_else(|| CliError::new(t!("secret.missing")))?;
    write_json(&SecretProvisioning::new(&record, store.as_ref()))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Authorize Command
// ============================================================================

/// Executes `authorize`; exits non-zero on deny.
async fn command_authorize(config: &TrustGateConfig, command: AuthorizeCommand) -> CliResult<ExitCode> {
    let audit = open_audit(config)?;
    let authorizer = open_authorizer(config, Arc::new(SystemClock), &audit)?;
    let request = AuthorizationRequest {
        path: command.path,
        bearer_token: command.token,
        source_attributes: SourceAttributes {
            peer_ip: command.peer_ip,
            request_id: None,
            method_arn: command.method_arn,
        },
    };
    let response = authorizer.authorize(&request).await;
    write_json(&response)?;
    Ok(if response.is_allowed() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Executes `config validate`; loading already validated the file.
fn command_config_validate(config: &TrustGateConfig) -> CliResult<ExitCode> {
    let (domains, origins, store) = config_summary(config);
    write_stdout_line(&t!("config.validate.ok", domains = domains, origins = origins, store = store))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Component Helpers
// ============================================================================

/// Opens the configured audit sink.
fn open_audit(config: &TrustGateConfig) -> CliResult<Arc<JsonLinesAuditSink>> {
    audit_sink(&config.audit).map_err(|err| CliError::new(t!("audit.open_failed", error = err)))
}

/// Builds the token authorizer with the configured audit sink.
fn open_authorizer(
    config: &TrustGateConfig,
    clock: Arc<dyn Clock>,
    audit: &Arc<JsonLinesAuditSink>,
) -> CliResult<TokenAuthorizer> {
    let authorizer = build_authorizer(&config.authorizer, clock, process_env)
        .map_err(|err| CliError::new(t!("serve.init_failed", error = err)))?;
    Ok(authorizer.with_audit(Arc::clone(audit) as Arc<dyn AuthzAuditSink>))
}

/// Builds the synchronizer over the configured store and origins.
async fn open_synchronizer(
    config: &TrustGateConfig,
    clock: Arc<dyn Clock>,
    audit: &Arc<JsonLinesAuditSink>,
) -> CliResult<Synchronizer> {
    let sync = config.sync.as_ref().ok_or_else(|| CliError::new(t!("sync.not_configured")))?;
    let store = open_store(&config.store).map_err(|err| CliError::new(t!("store.open_failed", error = err)))?;
    let (synchronizer, _origins) = synchronizer_from_config(sync, TrustState::new(store), clock)
        .await
        .map_err(|err| CliError::new(t!("serve.sync_init_failed", error = err)))?;
    Ok(synchronizer.with_audit(Arc::clone(audit) as Arc<dyn SyncAuditSink>))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a value as pretty JSON to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(t!("output.serialize_failed", error = err)))?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stdout" => t!("output.stream.stdout"),
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.unknown"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
