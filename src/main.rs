//! sfxmix CLI
//!
//! Command-line interface for rendering audio edit chains.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;

use sfxmix::cli::{commands, Cli, Commands};
use sfxmix::TruncationOptions;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    #[cfg(feature = "signal-cleanup")]
    install_interrupt_cleanup();

    info!("sfxmix v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd, cli.config.as_deref()),
        None => {
            println!("sfxmix v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = commands::load_config(config_path)?;

    match cmd {
        Commands::Run { recipe } => commands::run_recipe(config, &recipe),
        Commands::Concat { inputs, output } => commands::concat(config, &inputs, &output),
        Commands::Graph { name, options } => commands::graph(&config, &name, &options),
        Commands::Probe { path } => commands::probe(&config, &path),
        Commands::Truncated {
            files,
            tail_ms,
            threshold_db,
        } => commands::truncated(
            config,
            &files,
            &TruncationOptions {
                tail_ms,
                threshold_db,
            },
        ),
    }
}

/// Remove scratch directories on Ctrl-C; `Drop` never runs on that path.
#[cfg(feature = "signal-cleanup")]
fn install_interrupt_cleanup() {
    std::thread::spawn(|| {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                log::warn!("Interrupt cleanup unavailable: {}", e);
                return;
            }
        };
        if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
            let removed = sfxmix::pipeline::purge_live_dirs();
            log::warn!("Interrupted; removed {} scratch director(ies)", removed);
            std::process::exit(130);
        }
    });
}
