//! groundloop — bounded goal loop over fresh agent sessions
//!
//! Usage:
//!   groundloop                         → run the loop with ./groundloop.toml
//!   groundloop run --max-iterations 5  → run with an override
//!   groundloop state                   → print durable state
//!   groundloop tools [--json]          → list the assembled tool registry
//!   groundloop dump-config             → print the effective config as TOML
//!   groundloop version                 → show version

use anyhow::Context;
use clap::{Parser, Subcommand};
use groundloop::{build_engine, config_base_dir, logging, App, Overrides};
use groundloop_core::{LoopConfig, StateStore, TerminalStatus};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "groundloop",
    about = "Bounded goal loop: fresh agent session per iteration, durable state in between",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (TOML)
    #[arg(short, long, global = true, default_value = "groundloop.toml")]
    config: PathBuf,

    /// Override run.max_iterations
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    /// Override paths.workspace_root
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// API key for the engine (otherwise read from engine.api_key_env)
    #[arg(long, global = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the loop until success or the iteration budget is spent (default)
    Run,
    /// Print the durable state file
    State,
    /// List the tools a session would see
    Tools {
        /// Print full definitions as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the effective configuration
    DumpConfig,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    if let Commands::Version = command {
        println!("groundloop {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let overrides = Overrides {
        max_iterations: cli.max_iterations,
        workspace: cli.workspace,
        api_key: cli.api_key,
    };
    let base_dir = config_base_dir(&cli.config);

    // Logging depends on the config, so the load is reported after init.
    let loaded = LoopConfig::read(&cli.config);
    let mut config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => LoopConfig::default(),
    };
    overrides.apply(&mut config);

    let log_dir = config
        .paths
        .log_dir
        .as_ref()
        .map(|d| config.resolve(&base_dir, d));
    let _guard = logging::init(log_dir.as_deref());

    match loaded {
        Ok(Some(_)) => info!("loaded config from {}", cli.config.display()),
        Ok(None) => info!("no config at {}, using defaults", cli.config.display()),
        Err(e) => warn!("{}, using defaults", e),
    }

    match command {
        Commands::DumpConfig => {
            print!("{}", config.to_toml());
        }
        Commands::State => {
            let store = StateStore::load(config.resolve(&base_dir, &config.paths.state_file)).await;
            println!("{}", store.snapshot().await.to_pretty_json());
        }
        Commands::Tools { json } => {
            let app = App::assemble(config, &base_dir).await?;
            if json {
                let defs = app.tools.definitions();
                println!("{}", serde_json::to_string_pretty(&defs)?);
            } else {
                for name in app.tools.list() {
                    let Some(tool) = app.tools.get(name) else { continue };
                    let mode = if tool.is_read_only() { "ro" } else { "rw" };
                    let summary = tool.description().lines().next().unwrap_or_default();
                    println!("{:<24} {}  {}", name, mode, summary);
                }
            }
        }
        Commands::Run => {
            let engine = build_engine(&config.engine, overrides.api_key.clone())?;
            let app = App::assemble(config, &base_dir).await?;
            info!(
                "starting loop: max_iterations={}, tools={} ({} bridged)",
                app.config.run.max_iterations,
                app.tools.len(),
                app.bridged_tools
            );
            let report = app.run(engine).await.context("loop failed")?;
            match report.status {
                TerminalStatus::Succeeded => println!(
                    "succeeded after {} iteration(s) ({} aborted)",
                    report.iterations, report.aborted_turns
                ),
                TerminalStatus::Exhausted => println!(
                    "exhausted {} iteration(s) without success ({} aborted)",
                    report.iterations, report.aborted_turns
                ),
            }
        }
        Commands::Version => {}
    }

    Ok(())
}
