use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use davgate_core::{LogLevel, Principal, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod server;

use commands::lock::{LockArgs, RefreshArgs, UnlockArgs};
use commands::props::{DecideArgs, DelPropArgs, PropsArgs, SetPropArgs};
use commands::resource::{CopyArgs, LsArgs, MoveArgs, PathArgs, PutArgs};
use commands::Session;
use server::DavServer;

/// Davgate command line interface
///
/// Runs single operations against a policy-gated storage root as a given
/// principal.
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[clap(long)]
    config: Option<PathBuf>,

    /// Storage root; overrides the configuration
    #[clap(long)]
    root: Option<PathBuf>,

    /// The calling principal
    #[clap(long)]
    user: String,

    /// Log level; overrides the configuration
    #[clap(long)]
    log_level: Option<LogLevel>,

    /// Lock token presented with mutations
    #[clap(long)]
    lock_token: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a collection
    Ls(LsArgs),

    /// Show a resource's metadata
    Stat(PathArgs),

    /// Create a collection
    Mkdir(PathArgs),

    /// Print a resource's content
    Cat(PathArgs),

    /// Write a resource's content
    Put(PutArgs),

    /// Remove a resource and everything beneath it
    Rm(PathArgs),

    /// Move a resource
    Mv(MoveArgs),

    /// Copy a resource
    Cp(CopyArgs),

    /// List a resource's dead properties
    Props(PropsArgs),

    /// Set a dead property
    Setprop(SetPropArgs),

    /// Remove a dead property
    Delprop(DelPropArgs),

    /// Show the policy decision for an action
    Decide(DecideArgs),

    /// Lock a resource
    Lock(LockArgs),

    /// Refresh a lock
    Refresh(RefreshArgs),

    /// Release a lock
    Unlock(UnlockArgs),

    /// List active locks
    Locks,
}

fn init_logging(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<ServerConfig> {
    let mut config =
        ServerConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    config
        .apply_env()
        .context("invalid environment override")?;

    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    init_logging(config.logging.level);

    let server = DavServer::new(config)?;
    let session = Session {
        server: &server,
        principal: Principal::new(cli.user),
        lock_token: cli.lock_token,
    };

    match &cli.command {
        Commands::Ls(args) => commands::resource::execute_ls(&session, args),
        Commands::Stat(args) => commands::resource::execute_stat(&session, args),
        Commands::Mkdir(args) => commands::resource::execute_mkdir(&session, args),
        Commands::Cat(args) => commands::resource::execute_cat(&session, args),
        Commands::Put(args) => commands::resource::execute_put(&session, args),
        Commands::Rm(args) => commands::resource::execute_rm(&session, args),
        Commands::Mv(args) => commands::resource::execute_mv(&session, args),
        Commands::Cp(args) => commands::resource::execute_cp(&session, args),
        Commands::Props(args) => commands::props::execute_props(&session, args),
        Commands::Setprop(args) => commands::props::execute_setprop(&session, args),
        Commands::Delprop(args) => commands::props::execute_delprop(&session, args),
        Commands::Decide(args) => commands::props::execute_decide(&session, args),
        Commands::Lock(args) => commands::lock::execute_lock(&session, args),
        Commands::Refresh(args) => commands::lock::execute_refresh(&session, args),
        Commands::Unlock(args) => commands::lock::execute_unlock(&session, args),
        Commands::Locks => commands::lock::execute_locks(&session),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}
