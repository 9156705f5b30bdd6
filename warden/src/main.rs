//! `warden` command-line entry point.
//!
//! Runs single agent turns and exposes the sandbox and path confinement
//! directly for inspection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;

use warden::agent::{Agent, build_registry};
use warden::core::permissions::{Confirmer, DenyConfirmer, PermissionMode};
use warden::exit_codes;
use warden::io::config::{DEFAULT_CONFIG_FILE, WardenConfig, load_config, write_config};
use warden::io::confirm::TerminalConfirmer;
use warden::io::paths::resolve_in_roots;
use warden::io::sandbox::{Sandbox, SandboxPolicy};
use warden::logging;

#[derive(Parser)]
#[command(
    name = "warden",
    version,
    about = "Sandboxed tool orchestration for a ReAct agent"
)]
struct Cli {
    /// Config file to read (missing file means defaults).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the tool descriptions shown to the model.
    Tools,
    /// Run one agent turn and print the answer.
    Respond {
        message: String,
        #[arg(long, default_value = "cli")]
        session: String,
    },
    /// Run a command through the sandbox and print the outcome as JSON.
    Exec {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        argv: Vec<String>,
    },
    /// Resolve a relative path against the configured read (or write) roots.
    Resolve {
        path: String,
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Tools => cmd_tools(&load_config(&cli.config)?),
        Command::Respond { message, session } => {
            cmd_respond(&load_config(&cli.config)?, &message, &session)
        }
        Command::Exec { argv } => cmd_exec(&load_config(&cli.config)?, &argv),
        Command::Resolve { path, write } => cmd_resolve(&load_config(&cli.config)?, &path, write),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &WardenConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_tools(cfg: &WardenConfig) -> Result<i32> {
    let registry = build_registry(cfg, Box::new(DenyConfirmer))?;
    println!("{}", registry.describe_tools());
    Ok(exit_codes::OK)
}

fn cmd_respond(cfg: &WardenConfig, message: &str, session: &str) -> Result<i32> {
    let confirmer: Box<dyn Confirmer> = match cfg.safety.permission_mode {
        PermissionMode::Ask => Box::new(TerminalConfirmer::stdio()),
        PermissionMode::Deny | PermissionMode::Auto => Box::new(DenyConfirmer),
    };
    let agent = Agent::with_confirmer(cfg, confirmer)?;
    let answer = agent.respond(message, session)?;
    println!("{answer}");
    Ok(exit_codes::OK)
}

fn cmd_exec(cfg: &WardenConfig, argv: &[String]) -> Result<i32> {
    let sandbox = Sandbox::new(SandboxPolicy::from_config(&cfg.safety)?);
    let outcome = sandbox.execute(argv);
    println!("{}", outcome.normalized());
    if outcome.is_blocked() {
        return Ok(exit_codes::BLOCKED);
    }
    Ok(exit_codes::OK)
}

fn cmd_resolve(cfg: &WardenConfig, path: &str, write: bool) -> Result<i32> {
    let access = &cfg.tools.file_access;
    let roots = if write {
        &access.allowed_write_paths
    } else {
        &access.allowed_read_paths
    };
    match resolve_in_roots(roots, path) {
        Ok(resolved) => {
            println!("{}", resolved.display());
            Ok(exit_codes::OK)
        }
        Err(err) => {
            debug!(err = %err, "path rejected");
            eprintln!("{err}");
            Ok(exit_codes::BLOCKED)
        }
    }
}
