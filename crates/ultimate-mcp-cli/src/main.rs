// crates/ultimate-mcp-cli/src/main.rs
// ============================================================================
// Module: Ultimate MCP CLI Entry Point
// Description: Command dispatcher for serving and operator workflows.
// Purpose: Provide a safe CLI for the server, token issuance, and config.
// Dependencies: clap, tokio, ultimate-mcp-{config, core, server}
// ============================================================================

//! ## Overview
//! The CLI starts the platform server, issues signed tokens with the
//! configured key, and validates configuration. Exit codes are stable for
//! scripting: 0 success, 2 invalid arguments, 3 dependency unavailable,
//! 4 configuration rejected, 1 unspecified failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use ultimate_mcp_config::PlatformConfig;
use ultimate_mcp_core::RevocationStore;
use ultimate_mcp_core::Role;
use ultimate_mcp_core::TokenService;
use ultimate_mcp_core::UserId;
use ultimate_mcp_server::PlatformServer;
use ultimate_mcp_server::ServerError;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Invalid arguments.
const EXIT_USAGE: u8 = 2;
/// Dependency unavailable.
const EXIT_DEPENDENCY: u8 = 3;
/// Configuration rejected.
const EXIT_CONFIG: u8 = 4;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "ultimate-mcp", version, about = "Ultimate MCP coding platform")]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the platform server.
    Serve,
    /// Token operations using the configured signing key.
    Token {
        /// Selected token subcommand.
        #[command(subcommand)]
        command: TokenCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Token subcommands.
#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Issue a signed token and print it to stdout.
    Issue(TokenIssueCommand),
}

/// Configuration for `token issue`.
#[derive(Args, Debug)]
struct TokenIssueCommand {
    /// Subject user id.
    #[arg(long)]
    user: String,
    /// Roles to grant (repeatable): viewer, developer, admin.
    #[arg(long = "role", required = true)]
    roles: Vec<String>,
    /// Token lifetime in hours (defaults to the configured lifetime).
    #[arg(long)]
    ttl_hours: Option<u64>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the environment configuration.
    Check,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures mapped to exit codes.
#[derive(Debug, Error)]
enum CliError {
    /// Invalid arguments beyond clap's own parsing.
    #[error("{0}")]
    Usage(String),
    /// Configuration rejected.
    #[error("{0}")]
    Config(String),
    /// Dependency unavailable at startup.
    #[error("{0}")]
    Dependency(String),
    /// Unspecified failure.
    #[error("{0}")]
    Other(String),
}

impl CliError {
    const fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => EXIT_USAGE,
            Self::Config(_) => EXIT_CONFIG,
            Self::Dependency(_) => EXIT_DEPENDENCY,
            Self::Other(_) => 1,
        }
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ultimate-mcp: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Serve => command_serve().await,
        Commands::Token {
            command: TokenCommand::Issue(command),
        } => command_token_issue(&command),
        Commands::Config {
            command: ConfigCommand::Check,
        } => command_config_check(),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Loads config, builds the server, and serves until failure.
async fn command_serve() -> Result<(), CliError> {
    let config = PlatformConfig::from_env().map_err(|err| CliError::Config(err.to_string()))?;
    let server =
        PlatformServer::from_config(config).map_err(|err| map_server_error(&err))?;
    server.serve().await.map_err(|err| map_server_error(&err))
}

/// Issues a signed token locally with the configured key.
fn command_token_issue(command: &TokenIssueCommand) -> Result<(), CliError> {
    let config = PlatformConfig::from_env().map_err(|err| CliError::Config(err.to_string()))?;
    let mut roles = Vec::with_capacity(command.roles.len());
    for label in &command.roles {
        let role = Role::parse(label)
            .ok_or_else(|| CliError::Usage(format!("unknown role {label:?}")))?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }

    let tokens = TokenService::from_secret(
        &config.auth.signing_key,
        config.auth.token_ttl_hours,
        Arc::new(RevocationStore::new()),
    )
    .map_err(|err| CliError::Config(err.to_string()))?;
    let token = tokens
        .issue(&UserId::new(command.user.clone()), &roles, command.ttl_hours)
        .map_err(|err| CliError::Other(err.to_string()))?;
    println!("{token}");
    Ok(())
}

/// Validates the environment configuration and prints a summary.
fn command_config_check() -> Result<(), CliError> {
    let config = PlatformConfig::from_env().map_err(|err| CliError::Config(err.to_string()))?;
    let summary = serde_json::json!({
        "environment": config.environment,
        "bind": format!("{}:{}", config.server.bind_addr, config.server.port),
        "graph_uri": config.graph.uri,
        "exec_workers": config.exec.workers,
        "rate_limit_per_minute": config.rate_limit.per_minute,
    });
    println!("{summary}");
    Ok(())
}

/// Maps server lifecycle errors onto CLI exit classes.
fn map_server_error(err: &ServerError) -> CliError {
    match err {
        ServerError::Config(message) => CliError::Config(message.clone()),
        ServerError::Dependency(message) => CliError::Dependency(message.clone()),
        ServerError::Init(message) | ServerError::Transport(message) => {
            CliError::Other(message.clone())
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
